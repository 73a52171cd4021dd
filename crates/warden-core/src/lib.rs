//! Core expression infrastructure for the warden verifier.
//!
//! This crate holds the pieces every other component shares:
//!
//! - a small semantic type lattice ([`Type`]) interned per [`Context`],
//! - an immutable, hash-consed expression DAG ([`ExprKind`], [`ExprId`]),
//! - the simplifying builder, the only sanctioned way to create
//!   expressions (see the `builder` module),
//! - literal values with bit-exact bitvector and IEEE float semantics
//!   ([`LiteralValue`]),
//! - valuations and literal reduction of expressions under a valuation.
//!
//! # Design: index handles, one context per job
//!
//! Types, variables, and expressions are stored in vectors owned by a
//! [`Context`] and referenced through `u32` index newtypes. Two
//! structurally equal expressions always receive the same [`ExprId`], so
//! identity comparison is structural comparison. Handles from different
//! contexts must never be mixed; the context is created once per
//! verification job and dropped with everything it owns.

mod builder;
mod context;
mod error;
pub mod eval;
mod expr;
mod literal;
mod types;
mod valuation;

pub use context::{Context, VarId, Variable};
pub use error::CoreError;
pub use expr::{ExprDisplay, ExprId, ExprKind, ExprNode};
pub use literal::{FloatPrecision, LiteralValue, RoundingMode};
pub use types::{Type, TypeId};
pub use valuation::{Valuation, VariableAssignment};
