//! Core error types for warden-core.
//!
//! Uses `thiserror` for structured, matchable error variants. Only
//! recoverable conditions live here; violations of builder invariants
//! are programmer bugs and panic instead.

use thiserror::Error;

/// Core errors produced by the warden-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Attempting to declare a variable name that already exists in the
    /// context.
    #[error("duplicate variable name: '{name}'")]
    DuplicateVariable { name: String },

    /// A variable name was looked up but never declared.
    #[error("unknown variable: '{name}'")]
    UnknownVariable { name: String },
}
