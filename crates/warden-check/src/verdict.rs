//! Verification verdicts.

use serde::Serialize;

use crate::trace::Trace;

/// Outcome of checking one program against the registered checks.
#[derive(Debug, Serialize)]
pub enum Verdict {
    /// No error location is reachable within the bound.
    Success,
    /// A counterexample was found. `trace` is `None` when the model
    /// could not be replayed into a trace.
    Fail { code: u32, trace: Option<Trace> },
    /// The oracle could not decide some path, or the translator hit an
    /// unsupported construct.
    Unknown,
    /// The oracle gave up on time.
    Timeout,
    /// No counterexample found, but some path was cut off by the bound.
    BoundReached,
    /// An internal invariant failed; the message is diagnostic only.
    InternalError(String),
}

impl Verdict {
    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::Success)
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Verdict::Fail { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_for_machine_readable_output() {
        let json = serde_json::to_string(&Verdict::Success).unwrap();
        assert_eq!(json, "\"Success\"");

        let fail = Verdict::Fail {
            code: 2,
            trace: None,
        };
        let json = serde_json::to_string(&fail).unwrap();
        assert!(json.contains("\"code\":2"));
        assert!(fail.is_fail() && !fail.is_success());
    }
}
