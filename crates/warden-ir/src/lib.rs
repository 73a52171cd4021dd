//! LLVM-style intermediate representation for the warden verifier.
//!
//! This crate models the slice of IR the verification pipeline consumes:
//! a [`Module`] of functions and globals, functions as lists of basic
//! blocks over SSA values, and typed instructions with simple pointer
//! semantics. It also provides:
//!
//! - a parser for a textual `.ll`-style subset ([`parse_module`]),
//! - CFG construction over petgraph ([`Cfg`]),
//! - block-splitting and error-block utilities used by the check
//!   instrumentation,
//! - the `-inline` / `-inline-globals` transforms.
//!
//! The IR is deliberately small: functions are expected to be inlined
//! into `main` before translation, aggregates are out of scope, and
//! pointers are opaque (`ptr`), with meaning assigned by the memory
//! model at translation time.

mod cfg;
mod error;
mod func;
mod inst;
mod module;
mod parse;
mod transform;
mod types;

pub use cfg::Cfg;
pub use error::{IrError, ParseError};
pub use func::{Block, BlockId, Function, Param, ValueId, ValueInfo};
pub use inst::{
    BinOp, CastOp, DebugLoc, FCmpPred, ICmpPred, Inst, InstKind, Operand, Terminator,
};
pub use module::{Global, GlobalInit, Module};
pub use parse::parse_module;
pub use transform::{inline_functions, inline_globals};
pub use types::IrType;

/// Function names recognized as verification error sinks.
pub const ERROR_FUNCTIONS: &[&str] = &[
    "__VERIFIER_error",
    "__assert_fail",
    "__gazer_error",
    "reach_error",
];

/// Prefix of the nondeterministic-input producers (`__VERIFIER_nondet_int`
/// and friends).
pub const NONDET_PREFIX: &str = "__VERIFIER_nondet_";

/// Prefix of the overflow predicate intrinsics inserted by the
/// signed-overflow check (`warden.overflow.<op>.i<N>`).
pub const OVERFLOW_PREFIX: &str = "warden.overflow.";

/// Masks a constant to the low `bits` bits (no-op at 128).
pub fn mask_to(value: u128, bits: u32) -> u128 {
    if bits >= 128 {
        value
    } else {
        value & ((1u128 << bits) - 1)
    }
}
