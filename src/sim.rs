//! The gather/replenish control loop: rebuilding a decodable basis from a
//! pool of coded blocks, and topping that pool back up after loss.
//!
//! Both operate purely in terms of [`BlockList`] and [`Matrix`]; neither
//! touches the network/loss model directly (that lives in the `rnc-sim`
//! binary's drop-then-replenish loop).

use crate::block::{Block, BlockList};
use crate::field::Elem;
use crate::matrix::{self, Matrix, MatrixError};
use crate::prng::Prng;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error(transparent)]
    Matrix(#[from] MatrixError),
}

/// Attempt to assemble a working set of `n` blocks from `src` whose
/// coefficient rows form an invertible `n x n` matrix.
///
/// Returns `(None, wasted)` if `src` has fewer than `n` blocks or no
/// invertible subset could be found before `src` was exhausted; otherwise
/// `(Some(ws), wasted)` where `wasted` is the number of candidate blocks
/// swapped out along the way because the basis they formed was singular.
pub fn gather_working_set(src: &BlockList, n: usize, rng: &mut impl Prng) -> Result<(Option<BlockList>, usize), SimError> {
    if src.count() < n {
        return Ok((None, 0));
    }

    let mut spare = src.shallow_copy();
    let mut ws = BlockList::with_capacity(n);
    for _ in 0..n {
        ws.append(spare.random_drop(rng).expect("spare.count() >= n > 0"));
    }

    let mut wasted = 0usize;
    loop {
        let coeffs = ws.to_matrix(crate::block::Selector::Coefficients)?;
        let mut scratch = coeffs.to_owned_matrix();
        let mut inv = Matrix::owned(n, n);
        if matrix::invert(&mut scratch, &mut inv)? {
            return Ok((Some(ws), wasted));
        }
        tracing::debug!(wasted, "gather_working_set: candidate basis singular, swapping a block");
        if spare.is_empty() {
            return Ok((None, wasted));
        }
        // discard one candidate from the working set and pull a replacement from spare
        let replace_idx = (rng.next_u32() as u64 * ws.count() as u64 >> 32) as usize;
        ws.drop(replace_idx).expect("replace_idx < ws.count()");
        ws.append(spare.random_drop(rng).expect("spare is non-empty"));
        wasted += 1;
    }
}

/// Top up `dst` with freshly coded blocks drawn as sparse random linear
/// combinations of a working set gathered from `src`, until `dst` holds `r`
/// blocks. A no-op if `src` already holds more than `t` blocks.
pub fn replenish(
    src: &BlockList,
    dst: &mut BlockList,
    n: usize,
    t: usize,
    r: usize,
    a: f64,
    rng: &mut impl Prng,
) -> Result<(), SimError> {
    if src.count() > t {
        return Ok(());
    }

    let (ws, wasted) = gather_working_set(src, n, rng)?;
    let ws = match ws {
        Some(ws) => ws,
        None => {
            tracing::info!(wasted, "replenish: could not gather an invertible working set, no-op");
            return Ok(());
        }
    };

    let c = ws.to_matrix(crate::block::Selector::Coefficients)?;
    let d = ws.to_matrix(crate::block::Selector::Data)?;
    let m = d.ncols();

    let before = dst.count();
    let p_zero = 1.0 - (a / n as f64);
    while dst.count() < r {
        let mut row_m = Matrix::owned(1, n);
        matrix::rand_matr_sparse(&mut row_m, p_zero, true, rng)?;

        let mut cp = Matrix::owned(1, n);
        matrix::mul(&row_m, &c, &mut cp)?;
        let mut dp = Matrix::owned(1, m);
        matrix::mul(&row_m, &d, &mut dp)?;

        let mut cvec = vec![0 as Elem; n];
        cp.flatten_into(&mut cvec)?;
        let mut dvec = vec![0 as Elem; m];
        dp.flatten_into(&mut dvec)?;

        dst.append(Arc::new(Block::new(cvec, dvec)));
    }

    tracing::info!(before, after = dst.count(), wasted, "replenish: topped up destination set");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prng::Mt19937;

    fn identity_blocklist(n: usize) -> BlockList {
        let mut bl = BlockList::with_capacity(n);
        for i in 0..n {
            let mut c = vec![0 as Elem; n];
            c[i] = 1;
            let mut d = vec![0 as Elem; n];
            d[i] = 1;
            bl.append(Arc::new(Block::new(c, d)));
        }
        bl
    }

    #[test]
    fn gather_finds_an_invertible_basis_among_redundant_blocks() {
        let n = 16;
        let mut rng = Mt19937::from_seed(7);
        let base = identity_blocklist(n);
        let mut coded = BlockList::with_capacity(2 * n);
        replenish(&base, &mut coded, n, n, 2 * n, 4.0, &mut rng).unwrap();
        assert_eq!(coded.count(), 2 * n);

        let (ws, _wasted) = gather_working_set(&coded, n, &mut rng).unwrap();
        let ws = ws.expect("2N coded blocks over a full-rank basis should yield an invertible working set");
        let coeffs = ws.to_matrix(crate::block::Selector::Coefficients).unwrap();
        let mut scratch = coeffs.to_owned_matrix();
        let mut inv = Matrix::owned(n, n);
        assert!(matrix::invert(&mut scratch, &mut inv).unwrap());
    }

    #[test]
    fn gather_returns_none_when_source_too_small() {
        let bl = identity_blocklist(3);
        let mut rng = Mt19937::from_seed(1);
        let (ws, wasted) = gather_working_set(&bl, 10, &mut rng).unwrap();
        assert!(ws.is_none());
        assert_eq!(wasted, 0);
    }

    #[test]
    fn replenish_under_repeated_loss_stays_bounded_or_dies() {
        let n = 16;
        let a = 4.0;
        let t = 20;
        let r = 24;
        let f = 0.1;
        let mut rng = Mt19937::from_seed(1);

        let base = identity_blocklist(n);
        let mut pool = BlockList::with_capacity(r);
        replenish(&base, &mut pool, n, n, r, a, &mut rng).unwrap();

        let mut dead_at: Option<usize> = None;
        for step in 0..50 {
            pool.random_drop_p(f, pool.count(), &mut rng);
            if pool.count() < n {
                dead_at = Some(step);
                break;
            }
            replenish(&pool.shallow_copy(), &mut pool, n, t, r, a, &mut rng).unwrap();
            assert!(pool.count() <= r, "blockcount exceeded redundancy target R at step {step}");
        }
        let _ = dead_at; // dying before step 50 or surviving all of them are both acceptable outcomes
    }

    #[test]
    fn replenish_is_a_noop_once_source_exceeds_threshold() {
        let n = 4;
        let mut rng = Mt19937::from_seed(3);
        let base = identity_blocklist(n);
        let mut dst = BlockList::new();
        replenish(&base, &mut dst, n, 0, 0, 2.0, &mut rng).unwrap();
        assert_eq!(dst.count(), 0, "src.count() > t should make replenish a no-op");
    }
}
