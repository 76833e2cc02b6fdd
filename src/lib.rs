//! Crate root: public surface and crate-wide invariants.
//!
//! This module is the single canonical entry-point for downstream users of
//! the library. It re-exports the submodules implementing the finite-field
//! arithmetic layer, the dense matrix kernels, the block-set algebra, the
//! source adapter, and the simulation driver.
//!
//! ## Invariants
//!
//! - **Field.** The scalar type is [`field::Elem`], `u8` (GF(256)) under the
//!   `q256` feature or `u16` (GF(65536)) by default — a single build-time
//!   switch, never chosen at runtime. We `#![forbid(unsafe_code)]` throughout.
//! - **Tables.** [`field::init`] must run before any arithmetic op; every op
//!   in this crate calls it itself, so callers never need to.
//! - **Randomness.** No global generator exists anywhere in this crate: every
//!   consumer takes `&mut impl prng::Prng` explicitly; a `Prng` is never
//!   shared across a [`matrix::pmul`] call's worker tasks.
//! - **Block invariant.** For every [`block::Block`] `(c, d)` produced in
//!   this crate, `d = c · D` for the originating source matrix `D` — held by
//!   construction in [`source::Source::initial_blocks`] and [`sim::replenish`],
//!   never checked at runtime.
//! - **Concurrency.** [`matrix::ncpus`]/[`matrix::block_size`] are read once
//!   per [`matrix::pmul`] call; callers must not mutate them mid-call.
//!
//! If any invariant is violated at runtime, the failure mode is a typed
//! error from the owning module's `thiserror` enum — never UB.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

/// Finite-field arithmetic: element type, tables, add/mul/div/inv.
pub mod field;
/// Explicit-state pseudo-random generator contract and default implementation.
pub mod prng;
/// Dense matrices over [`field`]: identity, copy, multiply, inversion.
pub mod matrix;
/// Coded blocks and the amortized-growth collection of them.
pub mod block;
/// Raw-byte source adapter: padding, initial block construction, save.
pub mod source;
/// Gather-working-set and replenish: the end-to-end simulation driver.
pub mod sim;

pub use block::{Block, BlockList, BlockListError, Selector};
pub use field::{Elem, FieldError, G, Q};
pub use matrix::{Matrix, MatrixError};
pub use prng::{Mt19937, Prng};
pub use sim::SimError;
pub use source::{Source, SourceError};
