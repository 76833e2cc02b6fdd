//! Dense matrices over [`crate::field`], with serial, blocked, and
//! `rayon`-parallel multiply, Gauss–Jordan inversion, and random fill.
//!
//! The C original represents a matrix as an array of row pointers, each
//! either owning its storage or borrowing it from an external buffer — this
//! indirection is what lets [`crate::block::BlockList::to_matrix`] assemble a matrix over
//! scattered block rows with no copy. This module reproduces that shape
//! safely: each row is either [`RowData::Owned`] or a zero-copy
//! [`RowData::Shared`] handle into a block (`Arc<Block>`, not a raw
//! pointer/lifetime borrow, so `Matrix` itself stays `'static`, `Send`, and
//! `Sync`). Mutating operations require `Owned` rows and return
//! [`MatrixError::ReadOnlyView`] otherwise — stricter than the C original,
//! which would silently corrupt the aliased block if you wrote through a
//! view row.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use crate::block::{Block, Selector};
use crate::field::{self, Elem};
use crate::prng::Prng;

/// Conservative default worker count for [`pmul`]'s thread pool — cheap
/// enough to not oversubscribe a small machine, wide enough to show a
/// speedup over [`mul`] on anything with more than one core.
const DEFAULT_NCPUS: usize = 2;
/// Default row-blocking factor; 1 means the non-blocked kernel.
const DEFAULT_BLOCK_SIZE: usize = 1;

static NCPUS: AtomicUsize = AtomicUsize::new(DEFAULT_NCPUS);
static BLOCK_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_BLOCK_SIZE);

/// Current worker-pool width used by [`pmul`]. Read once per call, so
/// changing it mid-call has no effect on that call.
pub fn ncpus() -> usize {
    NCPUS.load(Ordering::Relaxed)
}

/// Set the worker-pool width used by subsequent [`pmul`] calls. Takes effect
/// on the next call; an in-flight `pmul` has already captured its value.
pub fn set_ncpus(n: usize) {
    NCPUS.store(n.max(1), Ordering::Relaxed);
}

/// Current blocking factor used by [`mul`]/[`pmul`].
pub fn block_size() -> usize {
    BLOCK_SIZE.load(Ordering::Relaxed)
}

/// Set the blocking factor used by subsequent [`mul`]/[`pmul`] calls.
pub fn set_block_size(n: usize) {
    BLOCK_SIZE.store(n.max(1), Ordering::Relaxed);
}

/// Errors surfaced by matrix operations.
#[derive(Debug, thiserror::Error)]
pub enum MatrixError {
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: (usize, usize), got: (usize, usize) },
    #[error("cannot write through a read-only (block-backed) view row")]
    ReadOnlyView,
    #[error("flatten buffer length {got} does not match nrows*ncols={expected}")]
    FlattenLenMismatch { expected: usize, got: usize },
    #[error("failed to create worker pool: {0}")]
    PoolCreation(String),
    #[error("all blocks in a shared-row matrix must have equal row length")]
    InconsistentBlockWidth,
}

#[derive(Debug, Clone)]
enum RowData {
    Owned(Vec<Elem>),
    Shared(Arc<Block>, Selector),
}

impl RowData {
    #[inline]
    fn as_slice(&self) -> &[Elem] {
        match self {
            RowData::Owned(v) => v,
            RowData::Shared(b, Selector::Coefficients) => &b.c,
            RowData::Shared(b, Selector::Data) => &b.d,
        }
    }

    #[inline]
    fn as_mut_slice(&mut self) -> Option<&mut [Elem]> {
        match self {
            RowData::Owned(v) => Some(v),
            RowData::Shared(..) => None,
        }
    }
}

/// A dense matrix over [`crate::field`].
#[derive(Debug)]
pub struct Matrix {
    nrows: usize,
    ncols: usize,
    rows: Vec<RowData>,
}

impl Matrix {
    /// A fresh, owned, zero-filled `nrows x ncols` matrix.
    pub fn owned(nrows: usize, ncols: usize) -> Matrix {
        let rows = (0..nrows).map(|_| RowData::Owned(vec![0; ncols])).collect();
        Matrix { nrows, ncols, rows }
    }

    /// An owned `n x n` identity matrix.
    pub fn identity(n: usize) -> Matrix {
        let mut m = Matrix::owned(n, n);
        m.set_identity().expect("freshly-owned matrix is writable");
        m
    }

    /// Build an owned matrix from explicit rows (all must share `ncols`).
    pub fn from_owned_rows(rows: Vec<Vec<Elem>>) -> Result<Matrix, MatrixError> {
        let ncols = rows.first().map(|r| r.len()).unwrap_or(0);
        for r in &rows {
            if r.len() != ncols {
                return Err(MatrixError::ShapeMismatch {
                    expected: (rows.len(), ncols),
                    got: (rows.len(), r.len()),
                });
            }
        }
        let nrows = rows.len();
        Ok(Matrix { nrows, ncols, rows: rows.into_iter().map(RowData::Owned).collect() })
    }

    /// Build an owned matrix by chunking a flat, row-major buffer.
    pub fn from_flat(data: Vec<Elem>, nrows: usize, ncols: usize) -> Result<Matrix, MatrixError> {
        if data.len() != nrows * ncols {
            return Err(MatrixError::ShapeMismatch {
                expected: (nrows, ncols),
                got: (1, data.len()),
            });
        }
        let rows = data.chunks(ncols).map(|c| RowData::Owned(c.to_vec())).collect();
        Ok(Matrix { nrows, ncols, rows })
    }

    /// Build a zero-copy view over a [`crate::block::BlockList`]'s blocks:
    /// shape `(count, K)` for [`Selector::Coefficients`], `(count, L)` for
    /// [`Selector::Data`].
    pub(crate) fn from_shared(blocks: &[Arc<Block>], mode: Selector) -> Result<Matrix, MatrixError> {
        let ncols = match blocks.first() {
            None => 0,
            Some(b) => match mode {
                Selector::Coefficients => b.coeff_count(),
                Selector::Data => b.block_length(),
            },
        };
        if cfg!(debug_assertions) {
            for b in blocks {
                let w = match mode {
                    Selector::Coefficients => b.coeff_count(),
                    Selector::Data => b.block_length(),
                };
                if w != ncols {
                    return Err(MatrixError::InconsistentBlockWidth);
                }
            }
        }
        let rows = blocks.iter().map(|b| RowData::Shared(Arc::clone(b), mode)).collect();
        Ok(Matrix { nrows: blocks.len(), ncols, rows })
    }

    #[inline]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    #[inline]
    pub fn get(&self, r: usize, c: usize) -> Elem {
        self.rows[r].as_slice()[c]
    }

    /// Write `v` at `(r, c)`. Fails if this row is a read-only block view.
    #[inline]
    pub fn set(&mut self, r: usize, c: usize, v: Elem) -> Result<(), MatrixError> {
        self.rows[r].as_mut_slice().ok_or(MatrixError::ReadOnlyView)?[c] = v;
        Ok(())
    }

    #[inline]
    pub fn row(&self, r: usize) -> &[Elem] {
        self.rows[r].as_slice()
    }

    #[inline]
    pub fn row_mut(&mut self, r: usize) -> Result<&mut [Elem], MatrixError> {
        self.rows[r].as_mut_slice().ok_or(MatrixError::ReadOnlyView)
    }

    /// Disjoint mutable access to rows `i` and `j` (`i != j`), in that order.
    fn two_rows_mut(&mut self, i: usize, j: usize) -> Result<(&mut [Elem], &mut [Elem]), MatrixError> {
        debug_assert_ne!(i, j);
        let (lo, hi) = if i < j { (i, j) } else { (j, i) };
        let (left, right) = self.rows.split_at_mut(hi);
        let lo_row = left[lo].as_mut_slice().ok_or(MatrixError::ReadOnlyView)?;
        let hi_row = right[0].as_mut_slice().ok_or(MatrixError::ReadOnlyView)?;
        if i < j {
            Ok((lo_row, hi_row))
        } else {
            Ok((hi_row, lo_row))
        }
    }

    /// Write 1 on `(i,i)` for `i < min(nrows,ncols)`, 0 elsewhere.
    pub fn set_identity(&mut self) -> Result<(), MatrixError> {
        let lim = self.nrows.min(self.ncols);
        for i in 0..self.nrows {
            let row = self.row_mut(i)?;
            for (c, v) in row.iter_mut().enumerate() {
                *v = if c == i && i < lim { 1 } else { 0 };
            }
        }
        Ok(())
    }

    /// Zero every element — the C original's `set_zero`, used by [`mul`]'s
    /// blocked kernel and by callers wanting a clean scratch matrix.
    pub fn zero_fill(&mut self) -> Result<(), MatrixError> {
        for i in 0..self.nrows {
            self.row_mut(i)?.iter_mut().for_each(|v| *v = 0);
        }
        Ok(())
    }

    /// Bulk-copy `src` into `self`; shapes must match exactly.
    pub fn copy_from(&mut self, src: &Matrix) -> Result<(), MatrixError> {
        if self.nrows != src.nrows || self.ncols != src.ncols {
            return Err(MatrixError::ShapeMismatch {
                expected: (self.nrows, self.ncols),
                got: (src.nrows, src.ncols),
            });
        }
        for i in 0..self.nrows {
            self.row_mut(i)?.copy_from_slice(src.row(i));
        }
        Ok(())
    }

    /// A fully independent, all-`Owned` copy: materializes any `Shared`
    /// rows by cloning their underlying slice. Used before mutating
    /// operations (e.g. [`invert`]) on a matrix that might be a block view.
    pub fn to_owned_matrix(&self) -> Matrix {
        let rows = self.rows.iter().map(|r| RowData::Owned(r.as_slice().to_vec())).collect();
        Matrix { nrows: self.nrows, ncols: self.ncols, rows }
    }

    /// Copy into a flat, row-major buffer: raw contiguous elements, no
    /// header — the on-disk/on-wire layout everything else in this crate
    /// assumes.
    pub fn flatten_into(&self, out: &mut [Elem]) -> Result<(), MatrixError> {
        let expected = self.nrows * self.ncols;
        if out.len() != expected {
            return Err(MatrixError::FlattenLenMismatch { expected, got: out.len() });
        }
        for (i, chunk) in out.chunks_mut(self.ncols).enumerate() {
            chunk.copy_from_slice(self.row(i));
        }
        Ok(())
    }
}

fn check_mul_shapes(a: &Matrix, b: &Matrix, c: &Matrix) -> Result<(), MatrixError> {
    if a.ncols != b.nrows {
        return Err(MatrixError::ShapeMismatch { expected: (a.nrows, a.ncols), got: (b.nrows, b.ncols) });
    }
    if c.nrows != a.nrows || c.ncols != b.ncols {
        return Err(MatrixError::ShapeMismatch {
            expected: (a.nrows, b.ncols),
            got: (c.nrows, c.ncols),
        });
    }
    Ok(())
}

/// `C[i,j] = sum_k A[i,k] * B[k,j]` over GF(q). Dispatches to a blocked or
/// non-blocked kernel depending on [`block_size`]: blocking trades a little
/// loop overhead for better cache reuse on the inner `j0` sweep.
pub fn mul(a: &Matrix, b: &Matrix, c: &mut Matrix) -> Result<(), MatrixError> {
    check_mul_shapes(a, b, c)?;
    if block_size() == 1 {
        mul_nonblocked(a, b, c, 0, a.nrows)
    } else {
        mul_blocked(a, b, c, 0, a.nrows)
    }
}

fn mul_nonblocked(a: &Matrix, b: &Matrix, c: &mut Matrix, row_from: usize, row_to: usize) -> Result<(), MatrixError> {
    let cols1 = a.ncols;
    let cols2 = b.ncols;
    for i in row_from..row_to {
        for j in 0..cols2 {
            let mut s: Elem = 0;
            for k in 0..cols1 {
                field::addto_mul(&mut s, a.get(i, k), b.get(k, j));
            }
            c.set(i, j, s)?;
        }
    }
    Ok(())
}

fn mul_blocked(a: &Matrix, b: &Matrix, c: &mut Matrix, row_from: usize, row_to: usize) -> Result<(), MatrixError> {
    let bsz = block_size();
    let cols1 = a.ncols;
    let cols2 = b.ncols;

    for i in row_from..row_to {
        c.row_mut(i)?.iter_mut().for_each(|v| *v = 0);
    }

    let mut i = row_from;
    while i < row_to {
        let li = (i + bsz).min(row_to);
        let mut k = 0;
        while k < cols1 {
            let lk = (k + bsz).min(cols1);
            let mut j = 0;
            while j < cols2 {
                let lj = (j + bsz).min(cols2);
                for i0 in i..li {
                    for k0 in k..lk {
                        let e1 = a.get(i0, k0);
                        if e1 == 0 {
                            continue;
                        }
                        for j0 in j..lj {
                            let mut acc = c.get(i0, j0);
                            field::addto_mul(&mut acc, e1, b.get(k0, j0));
                            c.set(i0, j0, acc)?;
                        }
                    }
                }
                j += bsz;
            }
            k += bsz;
        }
        i += bsz;
    }
    Ok(())
}

/// Parallel multiply: partitions `A`'s rows into bands of [`block_size`]
/// rows (or a single row when `block_size() == 1`) and fans them out to a
/// `rayon` pool of width [`ncpus`]. With `ncpus() == 1` this delegates to
/// [`mul`] directly rather than paying for a single-thread pool. Each task
/// writes a disjoint row-range of `C`; the pool's implicit join at the end
/// of `install` is the synchronization point. Result is bit-identical to
/// [`mul`] for any `ncpus`/`block_size`, since both partition the same
/// accumulation — only the order operations run in changes, not what they
/// compute.
pub fn pmul(a: &Matrix, b: &Matrix, c: &mut Matrix) -> Result<(), MatrixError> {
    check_mul_shapes(a, b, c)?;

    let cpus = ncpus();
    if cpus == 1 {
        return mul(a, b, c);
    }

    let bsz = block_size();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(cpus)
        .build()
        .map_err(|e| MatrixError::PoolCreation(e.to_string()))?;

    let nrows = c.nrows;
    let cols2 = c.ncols;

    if bsz == 1 {
        // Each chunk of `c.rows` is a single disjoint &mut [RowData] row;
        // read-only `a`/`b` are captured by reference (Matrix is Send+Sync:
        // Arc<Block>, not a raw pointer, backs any Shared row).
        let result: Result<(), MatrixError> = pool.install(|| {
            c.rows
                .par_chunks_mut(1)
                .enumerate()
                .try_for_each(|(i, chunk)| -> Result<(), MatrixError> {
                    let out = chunk[0].as_mut_slice().ok_or(MatrixError::ReadOnlyView)?;
                    for j in 0..cols2 {
                        let mut s: Elem = 0;
                        for k in 0..a.ncols {
                            field::addto_mul(&mut s, a.get(i, k), b.get(k, j));
                        }
                        out[j] = s;
                    }
                    Ok(())
                })
        });
        return result;
    }

    // Blocked path: the cache-blocking inner loop needs random access across
    // a whole band (not just a disjoint row at a time), so each band is
    // computed into its own owned scratch matrix — avoids aliasing the
    // shared `&mut Matrix` across `rayon` tasks — then copied back.
    let band = bsz;
    let nbands = (nrows + band - 1) / band;
    let row_from_of = |bi: usize| bi * band;
    let row_to_of = |bi: usize| ((bi + 1) * band).min(nrows);

    let scratch: Vec<Matrix> = pool.install(|| {
        (0..nbands)
            .into_par_iter()
            .map(|bi| {
                let from = row_from_of(bi);
                let to = row_to_of(bi);
                let mut band_c = Matrix::owned(to - from, cols2);
                mul_blocked_band(a, b, &mut band_c, from, to).expect("band shapes are consistent");
                band_c
            })
            .collect()
    });

    for (bi, band_c) in scratch.into_iter().enumerate() {
        let from = row_from_of(bi);
        for (local, i) in (from..row_to_of(bi)).enumerate() {
            c.row_mut(i)?.copy_from_slice(band_c.row(local));
        }
    }

    Ok(())
}

/// Blocked kernel over output rows `[row_from, row_to)`, writing into a
/// freshly-owned `band_c` matrix indexed from 0 (used by the parallel
/// blocked path, which computes each band into its own scratch matrix to
/// avoid aliasing `&mut Matrix` across `rayon` tasks).
fn mul_blocked_band(a: &Matrix, b: &Matrix, band_c: &mut Matrix, row_from: usize, row_to: usize) -> Result<(), MatrixError> {
    let bsz = block_size();
    let cols1 = a.ncols;
    let cols2 = b.ncols;

    let mut i = row_from;
    while i < row_to {
        let li = (i + bsz).min(row_to);
        let mut k = 0;
        while k < cols1 {
            let lk = (k + bsz).min(cols1);
            let mut j = 0;
            while j < cols2 {
                let lj = (j + bsz).min(cols2);
                for i0 in i..li {
                    for k0 in k..lk {
                        let e1 = a.get(i0, k0);
                        if e1 == 0 {
                            continue;
                        }
                        for j0 in j..lj {
                            let mut acc = band_c.get(i0 - row_from, j0);
                            field::addto_mul(&mut acc, e1, b.get(k0, j0));
                            band_c.set(i0 - row_from, j0, acc)?;
                        }
                    }
                }
                j += bsz;
            }
            k += bsz;
        }
        i += bsz;
    }
    Ok(())
}

/// Gauss–Jordan inversion. `a` must be square `n x n`; both `a` and `r` must
/// be `Owned`-row matrices (a block view must be materialized via
/// [`Matrix::to_owned_matrix`] first). `r` is reset to the identity and then
/// accumulates `a`'s inverse; `a` itself is consumed by the elimination.
/// Returns `Ok(false)` — not an error — on a zero pivot; no row-switching is
/// attempted, so a matrix that is invertible only after reordering rows is
/// reported singular here.
pub fn invert(a: &mut Matrix, r: &mut Matrix) -> Result<bool, MatrixError> {
    let n = a.nrows;
    if a.ncols != n {
        return Err(MatrixError::ShapeMismatch { expected: (n, n), got: (a.nrows, a.ncols) });
    }
    if r.nrows != n || r.ncols != n {
        return Err(MatrixError::ShapeMismatch { expected: (n, n), got: (r.nrows, r.ncols) });
    }
    r.set_identity()?;

    // Forward elimination.
    for i in 0..n {
        let p = a.get(i, i);
        if p == 0 {
            tracing::debug!(i, "invert: zero pivot, failing fast (no row-switch)");
            return Ok(false);
        }
        {
            let row = a.row_mut(i)?;
            for v in row[i..].iter_mut() {
                *v = field::div(*v, p);
            }
        }
        {
            let row = r.row_mut(i)?;
            for v in row.iter_mut() {
                *v = field::div(*v, p);
            }
        }

        for rr in (i + 1)..n {
            let h = a.get(rr, i);
            if h == 0 {
                continue;
            }
            let (row_i, row_r) = a.two_rows_mut(i, rr)?;
            for c in i..n {
                field::addto_mul(&mut row_r[c], row_i[c], h);
            }
            let (ri_i, ri_r) = r.two_rows_mut(i, rr)?;
            for c in 0..n {
                field::addto_mul(&mut ri_r[c], ri_i[c], h);
            }
        }
    }

    // Back-substitution.
    for i in (0..n).rev() {
        for rr in (0..i).rev() {
            let h = a.get(rr, i);
            if h == 0 {
                continue;
            }
            a.set(rr, i, 0)?;
            let (ri_i, ri_r) = r.two_rows_mut(i, rr)?;
            for c in 0..n {
                field::addto_mul(&mut ri_r[c], ri_i[c], h);
            }
        }
    }

    Ok(true)
}

/// Generate random `n x n` matrices until one inverts, returning
/// `(matrix, inverse, retries)`. `retries` is the count of singular
/// matrices discarded before success — the C original's encode CLI prints
/// this as "Singular matrices generated: N".
pub fn random_invertible(n: usize, rng: &mut impl Prng) -> (Matrix, Matrix, usize) {
    let mut retries = 0usize;
    loop {
        let mut m = Matrix::owned(n, n);
        rand_matr(&mut m, rng).expect("owned matrix is writable");
        let mut scratch = m.to_owned_matrix();
        let mut inv = Matrix::owned(n, n);
        if invert(&mut scratch, &mut inv).expect("square shapes by construction") {
            return (m, inv, retries);
        }
        retries += 1;
    }
}

/// Fill every element independently and uniformly over GF(q).
pub fn rand_matr(m: &mut Matrix, rng: &mut impl Prng) -> Result<(), MatrixError> {
    for i in 0..m.nrows {
        let row = m.row_mut(i)?;
        for v in row.iter_mut() {
            *v = rng.next_fq();
        }
    }
    Ok(())
}

/// Sparse fill: each element is `0` with probability `p`, else uniform over
/// GF(q) — or, if `nonzero_only`, uniform over GF(q)* (used for coding
/// vectors, where a forced-nonzero first entry keeps a replenished block
/// from being a pure duplicate of one already in the working set).
pub fn rand_matr_sparse(m: &mut Matrix, p: f64, nonzero_only: bool, rng: &mut impl Prng) -> Result<(), MatrixError> {
    for i in 0..m.nrows {
        let row = m.row_mut(i)?;
        for v in row.iter_mut() {
            *v = if rng.next_unit() < p {
                0
            } else if nonzero_only {
                loop {
                    let x = rng.next_fq();
                    if x != 0 {
                        break x;
                    }
                }
            } else {
                rng.next_fq()
            };
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prng::Mt19937;

    fn fixture_d() -> Matrix {
        Matrix::from_owned_rows(vec![
            vec![1, 2, 3, 4],
            vec![5, 6, 7, 8],
            vec![9, 10, 11, 12],
            vec![13, 14, 15, 16],
        ])
        .unwrap()
    }

    #[test]
    fn identity_is_left_and_right_neutral() {
        let a = fixture_d();
        let i4 = Matrix::identity(4);
        let mut c1 = Matrix::owned(4, 4);
        let mut c2 = Matrix::owned(4, 4);
        mul(&i4, &a, &mut c1).unwrap();
        mul(&a, &i4, &mut c2).unwrap();
        for r in 0..4 {
            for c in 0..4 {
                assert_eq!(c1.get(r, c), a.get(r, c));
                assert_eq!(c2.get(r, c), a.get(r, c));
            }
        }
    }

    #[test]
    fn identity_coefficients_round_trip() {
        let d = fixture_d();
        let c = Matrix::identity(4);
        let mut coded = Matrix::owned(4, 4);
        mul(&c, &d, &mut coded).unwrap();
        for r in 0..4 {
            for k in 0..4 {
                assert_eq!(coded.get(r, k), d.get(r, k));
            }
        }
        let mut c_scratch = c.to_owned_matrix();
        let mut inv = Matrix::owned(4, 4);
        assert!(invert(&mut c_scratch, &mut inv).unwrap());
        let mut decoded = Matrix::owned(4, 4);
        mul(&inv, &coded, &mut decoded).unwrap();
        for r in 0..4 {
            for k in 0..4 {
                assert_eq!(decoded.get(r, k), d.get(r, k));
            }
        }
    }

    #[test]
    fn random_invertible_coefficients_round_trip() {
        let n = 8;
        let mut rng = Mt19937::from_seed(2024);
        let (c1, _discard, _retries) = random_invertible(n, &mut rng);
        let mut d = Matrix::owned(n, n);
        rand_matr(&mut d, &mut rng).unwrap();

        let mut coded = Matrix::owned(n, n);
        mul(&c1, &d, &mut coded).unwrap();

        let mut c1_scratch = c1.to_owned_matrix();
        let mut inv = Matrix::owned(n, n);
        assert!(invert(&mut c1_scratch, &mut inv).unwrap());

        let mut decoded = Matrix::owned(n, n);
        mul(&inv, &coded, &mut decoded).unwrap();

        for r in 0..n {
            for k in 0..n {
                assert_eq!(decoded.get(r, k), d.get(r, k));
            }
        }
    }

    #[test]
    fn singular_matrix_detected() {
        let c = Matrix::from_owned_rows(vec![vec![1, 2, 3], vec![2, 4, 6], vec![0, 0, 1]]).unwrap();
        let mut scratch = c.to_owned_matrix();
        let mut inv = Matrix::owned(3, 3);
        assert_eq!(invert(&mut scratch, &mut inv).unwrap(), false);
    }

    #[test]
    fn invert_round_trip_whenever_it_succeeds() {
        let n = 6;
        let mut rng = Mt19937::from_seed(11);
        for _ in 0..10 {
            let (a, inv, _retries) = random_invertible(n, &mut rng);
            let mut lhs = Matrix::owned(n, n);
            let mut rhs = Matrix::owned(n, n);
            mul(&a, &inv, &mut lhs).unwrap();
            mul(&inv, &a, &mut rhs).unwrap();
            for r in 0..n {
                for c in 0..n {
                    let expect = if r == c { 1 } else { 0 };
                    assert_eq!(lhs.get(r, c), expect as Elem);
                    assert_eq!(rhs.get(r, c), expect as Elem);
                }
            }
        }
    }

    #[test]
    fn associativity_mul_a_b_v_equals_mul_a_bv() {
        let n = 5;
        let mut rng = Mt19937::from_seed(99);
        let mut a = Matrix::owned(n, n);
        let mut b = Matrix::owned(n, n);
        let mut v = Matrix::owned(1, n);
        rand_matr(&mut a, &mut rng).unwrap();
        rand_matr(&mut b, &mut rng).unwrap();
        rand_matr(&mut v, &mut rng).unwrap();

        let mut ab = Matrix::owned(n, n);
        mul(&a, &b, &mut ab).unwrap();
        let mut lhs = Matrix::owned(1, n);
        mul(&v, &ab, &mut lhs).unwrap();

        let mut bv = Matrix::owned(1, n);
        mul(&v, &b, &mut bv).unwrap();
        let mut rhs = Matrix::owned(1, n);
        mul(&bv, &a, &mut rhs).unwrap();

        for c in 0..n {
            assert_eq!(lhs.get(0, c), rhs.get(0, c));
        }
    }

    #[test]
    fn blocked_matches_nonblocked() {
        let n = 10;
        let mut rng = Mt19937::from_seed(321);
        let mut a = Matrix::owned(n, n);
        let mut b = Matrix::owned(n, n);
        rand_matr(&mut a, &mut rng).unwrap();
        rand_matr(&mut b, &mut rng).unwrap();

        set_block_size(1);
        let mut c_nonblk = Matrix::owned(n, n);
        mul(&a, &b, &mut c_nonblk).unwrap();

        set_block_size(3);
        let mut c_blk = Matrix::owned(n, n);
        mul(&a, &b, &mut c_blk).unwrap();
        set_block_size(1);

        for r in 0..n {
            for c in 0..n {
                assert_eq!(c_nonblk.get(r, c), c_blk.get(r, c));
            }
        }
    }

    #[test]
    fn pmul_agrees_with_mul_for_various_tunings() {
        let n = 12;
        let mut rng = Mt19937::from_seed(555);
        let mut a = Matrix::owned(n, n);
        let mut b = Matrix::owned(n, n);
        rand_matr(&mut a, &mut rng).unwrap();
        rand_matr(&mut b, &mut rng).unwrap();

        set_block_size(1);
        let mut serial = Matrix::owned(n, n);
        mul(&a, &b, &mut serial).unwrap();

        for &(cpus, bsz) in &[(1usize, 1usize), (2, 1), (4, 1), (2, 4), (3, 5)] {
            set_ncpus(cpus);
            set_block_size(bsz);
            let mut parallel = Matrix::owned(n, n);
            pmul(&a, &b, &mut parallel).unwrap();
            for r in 0..n {
                for c in 0..n {
                    assert_eq!(parallel.get(r, c), serial.get(r, c), "cpus={cpus} bsz={bsz}");
                }
            }
        }
        set_ncpus(DEFAULT_NCPUS);
        set_block_size(DEFAULT_BLOCK_SIZE);
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let a = Matrix::owned(2, 3);
        let b = Matrix::owned(4, 5);
        let mut c = Matrix::owned(2, 5);
        assert!(matches!(mul(&a, &b, &mut c), Err(MatrixError::ShapeMismatch { .. })));
    }

    #[test]
    fn sparse_fill_converges_to_requested_zero_fraction() {
        let mut rng = Mt19937::from_seed(2718);
        let mut m = Matrix::owned(200, 200);
        let p = 0.3;
        rand_matr_sparse(&mut m, p, false, &mut rng).unwrap();
        let total = 200 * 200;
        let zeros = (0..200).flat_map(|r| (0..200).map(move |c| (r, c))).filter(|&(r, c)| m.get(r, c) == 0).count();
        let frac = zeros as f64 / total as f64;
        assert!((frac - p).abs() < 0.03, "fraction of zeros {frac} too far from {p}");
    }

    #[test]
    fn shared_rows_reject_writes() {
        let b = Arc::new(Block::new(vec![1, 0, 0], vec![42, 43]));
        let mut m = Matrix::from_shared(&[b], Selector::Coefficients).unwrap();
        assert!(matches!(m.set(0, 0, 5), Err(MatrixError::ReadOnlyView)));
    }
}
