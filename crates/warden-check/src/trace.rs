//! Counterexample traces and their reconstruction.
//!
//! Given the failing path's locations, the per-edge variable
//! assignments the translator produced, and the oracle's model, the
//! builder replays the path: each assignment's right-hand side is
//! reduced to a literal under the running valuation, values of IR
//! registers that map to source variables become `Assign` events, and
//! the terminal error block becomes an `AssertionFailure`. A value the
//! model does not determine is reported as undefined, never fabricated.
//!
//! Functions the inliner spliced into `main` keep their provenance on
//! the value table; when the replay crosses such a boundary the trace
//! gets a `FunctionEntry`/`FunctionReturn` pair (no return is emitted
//! when the failure happens inside the callee).

use serde::Serialize;

use warden_core::eval;
use warden_core::{Context, LiteralValue, Valuation, VariableAssignment};

use crate::error::CheckError;

/// A source-level value in a trace, coerced to the source-preferred
/// form: bitvectors are shown as signed integers of their declared
/// width, floats as their numeric value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TraceValue {
    Bool(bool),
    Int(i128),
    Float(f64),
    Undefined,
}

impl TraceValue {
    /// Coerces a model literal to its source-preferred rendition.
    pub fn from_literal(value: &LiteralValue) -> TraceValue {
        match value {
            LiteralValue::Bool(b) => TraceValue::Bool(*b),
            LiteralValue::Bv { .. } => match value.as_signed() {
                Some(v) => TraceValue::Int(v),
                None => TraceValue::Undefined,
            },
            LiteralValue::Int(v) => TraceValue::Int(*v),
            LiteralValue::Float { .. } => match value.as_float_bits() {
                Some((warden_core::FloatPrecision::Single, bits)) => {
                    TraceValue::Float(f32::from_bits(bits as u32) as f64)
                }
                Some((warden_core::FloatPrecision::Double, bits)) => {
                    TraceValue::Float(f64::from_bits(bits as u64))
                }
                _ => TraceValue::Undefined,
            },
        }
    }
}

impl std::fmt::Display for TraceValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceValue::Bool(b) => write!(f, "{b}"),
            TraceValue::Int(v) => write!(f, "{v}"),
            TraceValue::Float(v) => write!(f, "{v}"),
            TraceValue::Undefined => write!(f, "undefined"),
        }
    }
}

/// One source-visible event on the counterexample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TraceEvent {
    FunctionEntry {
        function: String,
        args: Vec<(String, TraceValue)>,
    },
    Assign {
        variable: String,
        value: TraceValue,
        line: Option<u32>,
    },
    FunctionReturn {
        function: String,
        value: Option<TraceValue>,
    },
    AssertionFailure {
        code: u32,
        line: Option<u32>,
    },
}

impl std::fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceEvent::FunctionEntry { function, args } => {
                write!(f, "call {function}(")?;
                for (i, (name, value)) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name} = {value}")?;
                }
                write!(f, ")")
            }
            TraceEvent::Assign {
                variable,
                value,
                line,
            } => {
                write!(f, "{variable} := {value}")?;
                if let Some(line) = line {
                    write!(f, " (at line {line})")?;
                }
                Ok(())
            }
            TraceEvent::FunctionReturn { function, value } => match value {
                Some(v) => write!(f, "return {v} from {function}"),
                None => write!(f, "return from {function}"),
            },
            TraceEvent::AssertionFailure { code, line } => {
                write!(f, "assertion failure (error code {code})")?;
                if let Some(line) = line {
                    write!(f, " (at line {line})")?;
                }
                Ok(())
            }
        }
    }
}

/// A nondeterministic input consumed along the path, in consumption
/// order; feeds the test-harness generator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HarnessInput {
    pub function: String,
    pub value: TraceValue,
}

/// An ordered counterexample trace.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct Trace {
    pub events: Vec<TraceEvent>,
    pub inputs: Vec<HarnessInput>,
}

/// One symbolic step handed to the reconstructor: the assignment plus
/// what the IR knew about its origin.
#[derive(Debug, Clone)]
pub struct TraceStep {
    pub assignment: VariableAssignment,
    /// Source variable name, when debug info maps the assigned IR value
    /// back to one.
    pub source: Option<String>,
    /// Inlined function the assigned value originated from, `None` for
    /// the checked function itself.
    pub scope: Option<String>,
    pub line: Option<u32>,
}

/// Inputs to one reconstruction: the path's blocks, per-block steps,
/// and the terminal error information.
pub struct PathInfo {
    pub function: String,
    /// Formal parameters of the checked function: (source name, var).
    pub params: Vec<(String, warden_core::VarId)>,
    /// Per-location step lists; `steps[i]` belongs to the edge entering
    /// location `i`.
    pub steps: Vec<Vec<TraceStep>>,
    pub error_code: u32,
    pub error_line: Option<u32>,
    /// Nondet producers consumed on the path, in order.
    pub nondet: Vec<(String, warden_core::VarId)>,
}

/// Replays `model` over the path, producing the event sequence.
///
/// Fails with [`CheckError::Reconstruction`] when the model is
/// inconsistent with the replayed path (a replayed value disagrees
/// with the model's binding for the same variable); missing model
/// values are not an error, they surface as `undefined`.
pub fn build_trace(
    ctx: &Context,
    info: &PathInfo,
    model: &Valuation,
) -> Result<Trace, CheckError> {
    let mut running = model.clone();
    let mut events = Vec::new();
    let mut assigned = Vec::new();

    let args = info
        .params
        .iter()
        .map(|(name, var)| {
            let value = running
                .get(*var)
                .map(TraceValue::from_literal)
                .unwrap_or(TraceValue::Undefined);
            (name.clone(), value)
        })
        .collect();
    events.push(TraceEvent::FunctionEntry {
        function: info.function.clone(),
        args,
    });

    let mut current_scope: Option<String> = None;
    for steps in &info.steps {
        for step in steps {
            // Crossing an inlined-callee boundary: close the scope we
            // were in, open the one this step belongs to. Formal
            // argument values were substituted away by the inliner, so
            // an inlined entry carries no argument list.
            if step.scope != current_scope {
                if let Some(left) = current_scope.take() {
                    events.push(TraceEvent::FunctionReturn {
                        function: left,
                        value: None,
                    });
                }
                if let Some(entered) = &step.scope {
                    events.push(TraceEvent::FunctionEntry {
                        function: entered.clone(),
                        args: Vec::new(),
                    });
                }
                current_scope = step.scope.clone();
            }

            let variable = step.assignment.variable();
            let reduced = eval::evaluate(ctx, step.assignment.value(), &running);
            // Last write wins: later steps on the same edge overwrite.
            if let Some(value) = reduced {
                running.bind(variable, value);
                if !assigned.contains(&variable) {
                    assigned.push(variable);
                }
            }
            if let Some(source) = &step.source {
                let value = reduced
                    .as_ref()
                    .map(TraceValue::from_literal)
                    .unwrap_or(TraceValue::Undefined);
                events.push(TraceEvent::Assign {
                    variable: source.clone(),
                    value,
                    line: step.line,
                });
            }
        }
    }

    // The replayed values must agree with whatever the model claims for
    // the same variables; a mismatch means the model does not describe
    // this path.
    for variable in assigned {
        if let (Some(replayed), Some(claimed)) = (running.get(variable), model.get(variable)) {
            if replayed != claimed {
                return Err(CheckError::Reconstruction(format!(
                    "model value {claimed} for '{}' contradicts replayed value {replayed}",
                    ctx.var(variable).name()
                )));
            }
        }
    }

    events.push(TraceEvent::AssertionFailure {
        code: info.error_code,
        line: info.error_line,
    });

    let inputs = info
        .nondet
        .iter()
        .map(|(function, var)| HarnessInput {
            function: function.clone(),
            value: running
                .get(*var)
                .map(TraceValue::from_literal)
                .unwrap_or(TraceValue::Undefined),
        })
        .collect();

    Ok(Trace { events, inputs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::TypeId;

    #[test]
    fn replays_assignments_and_reports_source_writes() {
        let mut ctx = Context::new();
        let ty = ctx.bv_type(32);
        let a = ctx.declare_variable("a", ty).unwrap();
        let b = ctx.declare_variable("b", ty).unwrap();
        let ar = ctx.var_ref(a);
        let one = ctx.bv_lit(1, 32);
        let sum = ctx.add(ar, one);

        let mut model = Valuation::new();
        model.bind(a, LiteralValue::bv(32, 41));

        let info = PathInfo {
            function: "main".into(),
            params: vec![],
            steps: vec![vec![TraceStep {
                assignment: VariableAssignment::new(&ctx, b, sum),
                source: Some("b".into()),
                scope: None,
                line: Some(4),
            }]],
            error_code: 1,
            error_line: Some(7),
            nondet: vec![("__VERIFIER_nondet_int".into(), a)],
        };

        let trace = build_trace(&ctx, &info, &model).unwrap();
        assert_eq!(trace.events.len(), 3);
        assert_eq!(
            trace.events[1],
            TraceEvent::Assign {
                variable: "b".into(),
                value: TraceValue::Int(42),
                line: Some(4),
            }
        );
        assert_eq!(
            trace.events[2],
            TraceEvent::AssertionFailure {
                code: 1,
                line: Some(7),
            }
        );
        assert_eq!(trace.inputs[0].value, TraceValue::Int(41));
    }

    #[test]
    fn missing_model_values_become_undefined() {
        let mut ctx = Context::new();
        let ty = ctx.bv_type(32);
        let a = ctx.declare_variable("a", ty).unwrap();
        let b = ctx.declare_variable("b", ty).unwrap();
        let ar = ctx.var_ref(a);

        let info = PathInfo {
            function: "main".into(),
            params: vec![],
            steps: vec![vec![TraceStep {
                assignment: VariableAssignment::new(&ctx, b, ar),
                source: Some("b".into()),
                scope: None,
                line: None,
            }]],
            error_code: 1,
            error_line: None,
            nondet: vec![],
        };

        let trace = build_trace(&ctx, &info, &Valuation::new()).unwrap();
        assert_eq!(
            trace.events[1],
            TraceEvent::Assign {
                variable: "b".into(),
                value: TraceValue::Undefined,
                line: None,
            }
        );
    }

    #[test]
    fn last_write_wins_within_an_edge() {
        let mut ctx = Context::new();
        let ty = ctx.bv_type(32);
        let b = ctx.declare_variable("b", ty).unwrap();
        let one = ctx.bv_lit(1, 32);
        let two = ctx.bv_lit(2, 32);

        let info = PathInfo {
            function: "main".into(),
            params: vec![],
            steps: vec![vec![
                TraceStep {
                    assignment: VariableAssignment::new(&ctx, b, one),
                    source: Some("b".into()),
                    scope: None,
                    line: None,
                },
                TraceStep {
                    assignment: VariableAssignment::new(&ctx, b, two),
                    source: Some("b".into()),
                    scope: None,
                    line: None,
                },
            ]],
            error_code: 1,
            error_line: None,
            nondet: vec![],
        };

        let trace = build_trace(&ctx, &info, &Valuation::new()).unwrap();
        // Both writes are visible as events; the final binding is 2.
        let assigns: Vec<_> = trace
            .events
            .iter()
            .filter_map(|e| match e {
                TraceEvent::Assign { value, .. } => Some(value.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(assigns, vec![TraceValue::Int(1), TraceValue::Int(2)]);
    }

    #[test]
    fn inlined_scopes_emit_entry_and_return_events() {
        let mut ctx = Context::new();
        let ty = ctx.bv_type(32);
        let a = ctx.declare_variable("a", ty).unwrap();
        let r = ctx.declare_variable("inc.r", ty).unwrap();
        let b = ctx.declare_variable("b", ty).unwrap();
        let ar = ctx.var_ref(a);
        let rr = ctx.var_ref(r);
        let one = ctx.bv_lit(1, 32);
        let sum = ctx.add(ar, one);

        let mut model = Valuation::new();
        model.bind(a, LiteralValue::bv(32, 4));

        // a := 4 in main, r := a + 1 inside inlined `inc`, b := r back
        // in main.
        let info = PathInfo {
            function: "main".into(),
            params: vec![],
            steps: vec![vec![
                TraceStep {
                    assignment: VariableAssignment::new(&ctx, r, sum),
                    source: Some("r".into()),
                    scope: Some("inc".into()),
                    line: None,
                },
                TraceStep {
                    assignment: VariableAssignment::new(&ctx, b, rr),
                    source: Some("b".into()),
                    scope: None,
                    line: None,
                },
            ]],
            error_code: 1,
            error_line: None,
            nondet: vec![],
        };

        let trace = build_trace(&ctx, &info, &model).unwrap();
        let shapes: Vec<String> = trace.events.iter().map(|e| e.to_string()).collect();
        assert_eq!(
            shapes,
            vec![
                "call main()",
                "call inc()",
                "r := 5",
                "return from inc",
                "b := 5",
                "assertion failure (error code 1)",
            ]
        );
    }

    #[test]
    fn failure_inside_an_inlined_callee_emits_no_return() {
        let mut ctx = Context::new();
        let ty = ctx.bv_type(32);
        let r = ctx.declare_variable("check.r", ty).unwrap();
        let one = ctx.bv_lit(1, 32);

        let info = PathInfo {
            function: "main".into(),
            params: vec![],
            steps: vec![vec![TraceStep {
                assignment: VariableAssignment::new(&ctx, r, one),
                source: Some("r".into()),
                scope: Some("check".into()),
                line: None,
            }]],
            error_code: 1,
            error_line: None,
            nondet: vec![],
        };

        let trace = build_trace(&ctx, &info, &Valuation::new()).unwrap();
        assert!(trace.events.iter().any(|e| matches!(
            e,
            TraceEvent::FunctionEntry { function, .. } if function == "check"
        )));
        assert!(!trace
            .events
            .iter()
            .any(|e| matches!(e, TraceEvent::FunctionReturn { .. })));
    }

    #[test]
    fn parameters_are_reported_on_entry() {
        let mut ctx = Context::new();
        let a = ctx.declare_variable("argc", TypeId::BOOL).unwrap();
        let mut model = Valuation::new();
        model.bind(a, LiteralValue::Bool(true));

        let info = PathInfo {
            function: "main".into(),
            params: vec![("argc".into(), a)],
            steps: vec![],
            error_code: 3,
            error_line: None,
            nondet: vec![],
        };
        let trace = build_trace(&ctx, &info, &model).unwrap();
        assert_eq!(
            trace.events[0],
            TraceEvent::FunctionEntry {
                function: "main".into(),
                args: vec![("argc".into(), TraceValue::Bool(true))],
            }
        );
    }
}
