//! Source adapter: turns a raw byte buffer into an owned data matrix `D`
//! (padded to a multiple of `N` rows) plus the initial [`BlockList`] of `N`
//! unit blocks — `c_i = e_i`, `d_i` = row `i` of `D`.
//!
//! The original C `File` type `mmap`s the input and carries a padding count
//! so the tail can be truncated back off on save; this module copies the
//! bytes into an owned buffer instead (`mmap` has no safe, portable
//! equivalent, and the sizes this crate targets don't need it).

use std::sync::Arc;

use crate::block::{Block, BlockList};
use crate::field::Elem;
use crate::matrix::{Matrix, MatrixError};

/// Errors surfaced while building or saving a [`Source`].
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("n must be at least 1")]
    ZeroRows,
    #[error(transparent)]
    Matrix(#[from] MatrixError),
}

/// An in-memory source file split into `n` rows of `block_length` elements
/// each, with the trailing padding tracked so it can be stripped on save.
pub struct Source {
    /// The padded data, `n x block_length`, each row a unit block's `d`.
    pub data: Matrix,
    /// Number of rows, i.e. the number of unit blocks the source splits into.
    pub n: usize,
    /// Element width of each row.
    pub block_length: usize,
    /// Original byte length before padding.
    pub original_len: usize,
}

impl Source {
    /// Split `bytes` into `n` rows, padding the final row with zeros if
    /// `bytes.len()` isn't a multiple of `n * size_of::<Elem>()`.
    pub fn from_bytes(bytes: &[u8], n: usize) -> Result<Source, SourceError> {
        if n == 0 {
            return Err(SourceError::ZeroRows);
        }
        let elem_bytes = std::mem::size_of::<Elem>();
        let total_elems = bytes.len().div_ceil(elem_bytes);
        let block_length = total_elems.div_ceil(n).max(1);
        let padded_elems = n * block_length;

        let mut elems = vec![0 as Elem; padded_elems];
        for (i, chunk) in bytes.chunks(elem_bytes).enumerate() {
            let mut buf = [0u8; 2];
            buf[..chunk.len()].copy_from_slice(chunk);
            elems[i] = Elem::from_le_bytes(elem_bytes_array(buf));
        }

        let data = Matrix::from_flat(elems, n, block_length)?;
        Ok(Source { data, n, block_length, original_len: bytes.len() })
    }

    /// The initial `BlockList`: `N` unit blocks, `c_i` the `i`-th standard
    /// basis vector, `d_i` row `i` of `data`.
    pub fn initial_blocks(&self) -> BlockList {
        let mut bl = BlockList::with_capacity(self.n);
        for i in 0..self.n {
            let mut c = vec![0 as Elem; self.n];
            c[i] = 1;
            let d = self.data.row(i).to_vec();
            bl.append(Arc::new(Block::new(c, d)));
        }
        bl
    }

    /// Serialize `m` (an `n x block_length` decoded matrix) back to bytes,
    /// truncated to [`Source::original_len`].
    pub fn to_bytes(m: &Matrix, original_len: usize) -> Result<Vec<u8>, SourceError> {
        let elem_bytes = std::mem::size_of::<Elem>();
        let mut flat = vec![0 as Elem; m.nrows() * m.ncols()];
        m.flatten_into(&mut flat)?;
        let mut out = Vec::with_capacity(flat.len() * elem_bytes);
        for e in flat {
            out.extend_from_slice(&elem_to_le_bytes(e)[..elem_bytes]);
        }
        out.truncate(original_len);
        Ok(out)
    }
}

#[cfg(feature = "q256")]
fn elem_bytes_array(buf: [u8; 2]) -> [u8; 1] {
    [buf[0]]
}
#[cfg(not(feature = "q256"))]
fn elem_bytes_array(buf: [u8; 2]) -> [u8; 2] {
    buf
}

#[cfg(feature = "q256")]
fn elem_to_le_bytes(e: Elem) -> [u8; 2] {
    [e, 0]
}
#[cfg(not(feature = "q256"))]
fn elem_to_le_bytes(e: Elem) -> [u8; 2] {
    e.to_le_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_multiple_needs_no_padding() {
        let elem_bytes = std::mem::size_of::<Elem>();
        let n = 4;
        let bytes = vec![7u8; n * elem_bytes * 3];
        let src = Source::from_bytes(&bytes, n).unwrap();
        assert_eq!(src.n, n);
        assert_eq!(src.block_length, 3);
        assert_eq!(src.original_len, bytes.len());
    }

    #[test]
    fn ragged_tail_is_zero_padded() {
        let bytes = vec![9u8; 7];
        let src = Source::from_bytes(&bytes, 3).unwrap();
        assert_eq!(src.n, 3);
        assert!(src.block_length >= 1);
        assert_eq!(src.original_len, 7);
    }

    #[test]
    fn initial_blocks_are_the_standard_basis() {
        let elem_bytes = std::mem::size_of::<Elem>();
        let n = 5;
        let bytes = vec![3u8; n * elem_bytes * 2];
        let src = Source::from_bytes(&bytes, n).unwrap();
        let bl = src.initial_blocks();
        assert_eq!(bl.count(), n);
        let coeffs = bl.to_matrix(crate::block::Selector::Coefficients).unwrap();
        for i in 0..n {
            for j in 0..n {
                let expect = if i == j { 1 } else { 0 };
                assert_eq!(coeffs.get(i, j), expect as Elem);
            }
        }
    }

    #[test]
    fn round_trip_through_bytes_recovers_original() {
        let elem_bytes = std::mem::size_of::<Elem>();
        let n = 4;
        let bytes: Vec<u8> = (0..(n * elem_bytes * 5) as u32).map(|x| (x % 251) as u8).collect();
        let src = Source::from_bytes(&bytes, n).unwrap();
        let out = Source::to_bytes(&src.data, src.original_len).unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn zero_rows_is_rejected() {
        assert!(matches!(Source::from_bytes(&[1, 2, 3], 0), Err(SourceError::ZeroRows)));
    }
}
