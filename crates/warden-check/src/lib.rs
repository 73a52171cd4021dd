//! Verification pipeline: instrumentation, translation, bounded model
//! checking, and counterexample reconstruction.
//!
//! The pieces, in pipeline order:
//!
//! 1. [`checks`] — safety-check instrumentation over the IR: error
//!    sinks, division by zero, signed overflow. Each registered check
//!    gets an integer error code; error blocks carry it.
//! 2. [`translate`] — the instruction translator: per-instruction
//!    transition formulas over warden-core expressions, including the
//!    `Bool`/`Bv(1)` coercion discipline and the float predicate
//!    tables.
//! 3. [`memory`] — the memory-model interface the translator delegates
//!    pointer operations to, with the `simple` (havoc) and `flat`
//!    (array-backed) models.
//! 4. [`solver`] — the oracle interface plus a propagation-based
//!    built-in oracle.
//! 5. [`bmc`] — path enumeration up to a bound, formula assembly, and
//!    the final [`Verdict`].
//! 6. [`trace`] — replaying a model over the failing path into
//!    source-level events.

pub mod bmc;
pub mod checks;
mod error;
pub mod memory;
pub mod solver;
pub mod trace;
pub mod translate;
mod verdict;

pub use error::CheckError;
pub use verdict::Verdict;
