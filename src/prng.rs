//! PRNG adapter: the contract every source of randomness in this crate is
//! written against, plus a default Mersenne-Twister-family implementation.
//!
//! No global generator exists anywhere in this crate — every consumer takes
//! `&mut impl Prng` explicitly. State is thread-local by convention: a
//! `Prng` is never shared across `pmul`'s worker tasks, which is naturally
//! the case since nothing in `pmul` draws randomness at all.

use crate::field::{Elem, Q};
use rand_mt::Mt19937GenRand32;

/// Contract for a streamable, explicitly-stateful pseudo-random generator.
///
/// Implementors need only provide [`Prng::from_seed`] and
/// [`Prng::next_u32`]; `next_fq`, `next_unit`, and `shuffle` are derived from
/// those two and are correct for any conforming `next_u32`.
pub trait Prng {
    /// Deterministic initialization from a seed: the same seed and the same
    /// sequence of calls must reproduce the same outputs.
    fn from_seed(seed: u32) -> Self
    where
        Self: Sized;

    /// Uniform over the full range of `u32`.
    fn next_u32(&mut self) -> u32;

    /// Uniform over `[0, Q)`. Exact (not approximate) because `Q` is a power
    /// of two dividing `2^32`.
    #[inline]
    fn next_fq(&mut self) -> Elem {
        (self.next_u32() % (Q as u32)) as Elem
    }

    /// Uniform over `[0, 1)`.
    #[inline]
    fn next_unit(&mut self) -> f64 {
        self.next_u32() as f64 / 4294967296.0_f64 // 2^32
    }

    /// In-place Fisher–Yates shuffle.
    fn shuffle<T>(&mut self, slice: &mut [T]) {
        let n = slice.len();
        for i in (1..n).rev() {
            let j = (self.next_u32() as u64 * (i as u64 + 1) >> 32) as usize;
            slice.swap(i, j);
        }
    }
}

/// Default `Prng` implementation: a Mersenne-Twister-family generator
/// (`rand_mt`'s MT19937) carrying explicit state. This struct only adapts
/// it to the [`Prng`] contract above; the generator's internal recurrence
/// is somebody else's problem.
pub struct Mt19937 {
    inner: Mt19937GenRand32,
}

impl Prng for Mt19937 {
    fn from_seed(seed: u32) -> Self {
        Mt19937 { inner: Mt19937GenRand32::new(seed) }
    }

    #[inline]
    fn next_u32(&mut self) -> u32 {
        use rand::RngCore;
        self.inner.next_u32()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let mut a = Mt19937::from_seed(1234);
        let mut b = Mt19937::from_seed(1234);
        for _ in 0..100 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn different_seed_diverges() {
        let mut a = Mt19937::from_seed(1);
        let mut b = Mt19937::from_seed(2);
        let seq_a: Vec<u32> = (0..16).map(|_| a.next_u32()).collect();
        let seq_b: Vec<u32> = (0..16).map(|_| b.next_u32()).collect();
        assert_ne!(seq_a, seq_b);
    }

    #[test]
    fn next_fq_stays_in_range() {
        let mut rng = Mt19937::from_seed(7);
        for _ in 0..2000 {
            assert!((rng.next_fq() as usize) < Q);
        }
    }

    #[test]
    fn next_unit_stays_in_unit_interval() {
        let mut rng = Mt19937::from_seed(9);
        for _ in 0..1000 {
            let u = rng.next_unit();
            assert!((0.0..1.0).contains(&u));
        }
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let mut rng = Mt19937::from_seed(42);
        let mut v: Vec<u32> = (0..50).collect();
        let mut sorted = v.clone();
        rng.shuffle(&mut v);
        sorted.sort_unstable();
        let mut v_sorted = v.clone();
        v_sorted.sort_unstable();
        assert_eq!(sorted, v_sorted);
    }

    #[test]
    fn shuffle_is_deterministic_given_seed() {
        let mut a = Mt19937::from_seed(77);
        let mut b = Mt19937::from_seed(77);
        let mut va: Vec<u32> = (0..30).collect();
        let mut vb = va.clone();
        a.shuffle(&mut va);
        b.shuffle(&mut vb);
        assert_eq!(va, vb);
    }
}
