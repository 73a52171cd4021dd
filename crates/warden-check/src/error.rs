//! Error types for the verification pipeline.
//!
//! `Unsupported` downgrades the verdict to `Unknown`; `Reconstruction`
//! downgrades a counterexample to a trace-less `Fail`. Type invariant
//! violations inside the expression builder are not represented here —
//! they are programmer bugs and panic.

use thiserror::Error;

use warden_core::CoreError;

/// Recoverable failures in instrumentation, translation, or trace
/// reconstruction.
#[derive(Debug, Error)]
pub enum CheckError {
    /// An IR construct the translator does not model. The verdict for
    /// the affected function becomes `Unknown`.
    #[error("unsupported construct: {0}")]
    Unsupported(String),

    /// A malformed input reached translation (missing variable,
    /// malformed intrinsic name).
    #[error("translation error: {0}")]
    Translation(String),

    /// The model could not be replayed over the counterexample path.
    #[error("trace reconstruction failed: {0}")]
    Reconstruction(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}
