//! Coded blocks and the working collection of them.
//!
//! A [`Block`] is a `(c, d)` pair with `d = c · D` for the original source
//! matrix `D`; every producer of a `Block` in this crate (the source
//! adapter, [`crate::sim::replenish`]) derives `d` from `c` by construction,
//! so the invariant never needs runtime checking.
//!
//! [`BlockList`] is an amortized-growth collection of shared handles to
//! blocks. A C implementation of this structure would carry a `cleanup`
//! flag tracking which of several `BlockList`s sharing the same blocks is
//! responsible for freeing them, with the invariant "at most one
//! `cleanup=true` list at a time". In safe Rust that entire bookkeeping
//! collapses into `Arc<Block>`: every list holds clones of the same
//! reference-counted handles, a block's storage is freed exactly when its
//! last `Arc` drops, and there is no flag to get wrong. `shallow_copy` is
//! just `Clone`.

use std::sync::Arc;

use crate::field::Elem;
use crate::prng::Prng;

/// A coded block: coefficients over the original `N` unit blocks, and the
/// resulting data row.
#[derive(Debug, Clone)]
pub struct Block {
    /// Coefficient row, length `coeff_count`.
    pub c: Vec<Elem>,
    /// Data row, length `block_length`.
    pub d: Vec<Elem>,
}

impl Block {
    pub fn new(c: Vec<Elem>, d: Vec<Elem>) -> Self {
        Block { c, d }
    }

    #[inline]
    pub fn coeff_count(&self) -> usize {
        self.c.len()
    }

    #[inline]
    pub fn block_length(&self) -> usize {
        self.d.len()
    }
}

/// Which row of a [`Block`] a [`crate::matrix::Matrix`] view row reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    Coefficients,
    Data,
}

/// Errors surfaced by [`BlockList`] operations.
#[derive(Debug, thiserror::Error)]
pub enum BlockListError {
    #[error("drop: index {index} out of range (count={count})")]
    OutOfRange { index: usize, count: usize },
    #[error("random_sample: sample size {size} exceeds list size {count}")]
    SampleTooLarge { size: usize, count: usize },
    #[error("operation requires a non-empty list")]
    Empty,
}

/// An amortized-growth collection of shared block handles.
#[derive(Debug, Clone, Default)]
pub struct BlockList {
    blocks: Vec<Arc<Block>>,
}

impl BlockList {
    /// New, empty list. `capacity` is a hint; callers that know the block
    /// count up front (e.g. the source adapter) should pass it to avoid
    /// reallocating while filling the list.
    pub fn with_capacity(capacity: usize) -> Self {
        BlockList { blocks: Vec::with_capacity(capacity) }
    }

    pub fn new() -> Self {
        BlockList { blocks: Vec::new() }
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.blocks.capacity()
    }

    pub fn blocks(&self) -> &[Arc<Block>] {
        &self.blocks
    }

    /// Amortized O(1). `Vec::push` already doubles capacity on overflow, the
    /// same growth policy as the C original's `realloc`-and-double.
    pub fn append(&mut self, blk: Arc<Block>) {
        self.blocks.push(blk);
    }

    /// Remove and return the block at `index`, shifting the tail left by
    /// one. `cleanup`/freeing is implicit: the returned `Arc` may still be
    /// held elsewhere, or may be the last handle and drop immediately.
    pub fn drop(&mut self, index: usize) -> Result<Arc<Block>, BlockListError> {
        let count = self.blocks.len();
        if index >= count {
            return Err(BlockListError::OutOfRange { index, count });
        }
        Ok(self.blocks.remove(index))
    }

    /// A uniformly chosen block, without removing it.
    pub fn random_block(&self, rng: &mut impl Prng) -> Result<Arc<Block>, BlockListError> {
        if self.blocks.is_empty() {
            return Err(BlockListError::Empty);
        }
        let idx = (rng.next_u32() as u64 * self.blocks.len() as u64 >> 32) as usize;
        Ok(Arc::clone(&self.blocks[idx]))
    }

    /// Drop a single uniformly-chosen block, returning it.
    pub fn random_drop(&mut self, rng: &mut impl Prng) -> Result<Arc<Block>, BlockListError> {
        if self.blocks.is_empty() {
            return Err(BlockListError::Empty);
        }
        let idx = (rng.next_u32() as u64 * self.blocks.len() as u64 >> 32) as usize;
        self.drop(idx)
    }

    /// Scan indices in order, dropping each with probability `p`, up to
    /// `max` drops. The scan index is adjusted on each drop so it remains
    /// correct: a dropped element shifts the tail left into the current
    /// position, so the scan must not advance past it.
    pub fn random_drop_p(&mut self, p: f64, max: usize, rng: &mut impl Prng) -> usize {
        let mut dropped = 0usize;
        let mut i = 0usize;
        while i < self.blocks.len() && dropped < max {
            if rng.next_unit() < p {
                self.blocks.remove(i);
                dropped += 1;
                // do not advance i: the next element has shifted into i
            } else {
                i += 1;
            }
        }
        dropped
    }

    /// A new list of `k` distinct blocks chosen uniformly without
    /// replacement: copy the handle array, Fisher–Yates shuffle, truncate.
    pub fn random_sample(&self, k: usize, rng: &mut impl Prng) -> Result<BlockList, BlockListError> {
        if k > self.blocks.len() {
            return Err(BlockListError::SampleTooLarge { size: k, count: self.blocks.len() });
        }
        let mut copy = self.blocks.clone();
        rng.shuffle(&mut copy);
        copy.truncate(k);
        Ok(BlockList { blocks: copy })
    }

    /// A new, independent list over the same block handles (a "view").
    pub fn shallow_copy(&self) -> BlockList {
        self.clone()
    }

    /// Build a view [`crate::matrix::Matrix`] whose rows point at each
    /// block's coefficient or data row, in order — zero-copy (rows hold
    /// `Arc<Block>` clones, not copies of the underlying `Vec`).
    pub fn to_matrix(&self, mode: Selector) -> Result<crate::matrix::Matrix, crate::matrix::MatrixError> {
        crate::matrix::Matrix::from_shared(&self.blocks, mode)
    }

    /// Build both the coefficient and data views at once.
    pub fn to_matrices(
        &self,
    ) -> Result<(crate::matrix::Matrix, crate::matrix::Matrix), crate::matrix::MatrixError> {
        Ok((
            crate::matrix::Matrix::from_shared(&self.blocks, Selector::Coefficients)?,
            crate::matrix::Matrix::from_shared(&self.blocks, Selector::Data)?,
        ))
    }
}

impl FromIterator<Arc<Block>> for BlockList {
    fn from_iter<T: IntoIterator<Item = Arc<Block>>>(iter: T) -> Self {
        BlockList { blocks: iter.into_iter().collect() }
    }
}
