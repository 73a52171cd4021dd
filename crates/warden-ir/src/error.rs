//! Error types for warden-ir.

use thiserror::Error;

/// A syntax error in textual IR input, with the 1-based source line.
#[derive(Debug, Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: u32,
    pub message: String,
}

impl ParseError {
    pub fn new(line: u32, message: impl Into<String>) -> ParseError {
        ParseError {
            line,
            message: message.into(),
        }
    }
}

/// Errors from IR transforms.
#[derive(Debug, Error)]
pub enum IrError {
    /// The inliner found a (mutually) recursive call chain.
    #[error("cannot inline recursive function '{function}'")]
    RecursiveFunction { function: String },

    /// A call references a function the module does not contain.
    #[error("call to unknown function '{function}'")]
    UnknownFunction { function: String },

    /// Inlining gave up before reaching a fixpoint.
    #[error("inlining did not converge after {iterations} iterations")]
    InliningDidNotConverge { iterations: usize },
}
