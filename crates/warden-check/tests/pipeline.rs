//! End-to-end pipeline tests: parse, instrument, model-check, and
//! reconstruct traces over small programs.
//!
//! These mirror the tool's acceptance scenarios: reachable assertion
//! failures produce `Fail` with a replayable trace, unreachable guards
//! verify, the flat memory model disambiguates pointer targets, and
//! the built-in oracle stays conservative where propagation cannot
//! decide a path.

use warden_check::bmc::{check_module, BmcSettings};
use warden_check::checks::CheckRegistry;
use warden_check::memory::MemoryModelKind;
use warden_check::solver::{Oracle, PropagationOracle, SolverResult};
use warden_check::trace::{TraceEvent, TraceValue};
use warden_check::translate::TranslateSettings;
use warden_check::Verdict;
use warden_core::Context;
use warden_ir::parse_module;

fn verify(source: &str, settings: BmcSettings) -> (Verdict, CheckRegistry) {
    let mut module = parse_module(source).expect("test program parses");
    let registry = CheckRegistry::with_default_checks();
    registry.run(&mut module);
    let mut oracle = PropagationOracle::new();
    let verdict = check_module(&module, &mut oracle, &settings);
    (verdict, registry)
}

fn verify_default(source: &str) -> (Verdict, CheckRegistry) {
    verify(source, BmcSettings::default())
}

/// An oracle scripted to refute every path; used where the built-in
/// propagation is too weak to pin the expected verdict.
struct RefuteAll;

impl Oracle for RefuteAll {
    fn check(&mut self, _ctx: &mut Context, _formula: warden_core::ExprId) -> SolverResult {
        SolverResult::Unsat
    }
}

#[test]
fn nondet_guard_is_reachable_at_zero() {
    // a = nondet(); if (a == 0) error();
    let src = r#"
define i32 @main() {
entry:
  %a = call i32 @__VERIFIER_nondet_int()
  %cond = icmp eq i32 %a, 0
  br i1 %cond, label %bad, label %good
bad:
  call void @__VERIFIER_error()
  unreachable
good:
  ret i32 0
}

declare i32 @__VERIFIER_nondet_int()
declare void @__VERIFIER_error()
"#;
    let (verdict, registry) = verify_default(src);
    let Verdict::Fail { code, trace } = verdict else {
        panic!("expected Fail, got {verdict:?}");
    };
    assert_eq!(registry.message_for_code(code), "Assertion failure");

    let trace = trace.expect("trace is reconstructible");
    // The counterexample input is a = 0.
    assert_eq!(trace.inputs.len(), 1);
    assert_eq!(trace.inputs[0].function, "__VERIFIER_nondet_int");
    assert_eq!(trace.inputs[0].value, TraceValue::Int(0));

    assert!(matches!(
        trace.events.first(),
        Some(TraceEvent::FunctionEntry { function, .. }) if function == "main"
    ));
    assert!(matches!(
        trace.events.last(),
        Some(TraceEvent::AssertionFailure { .. })
    ));
}

#[test]
fn copied_value_guard_is_unreachable() {
    // a = nondet(); b = a; if (a != b) error();
    let src = r#"
define i32 @main() {
entry:
  %a = call i32 @__VERIFIER_nondet_int()
  br label %next
next:
  %b = phi i32 [ %a, %entry ]
  %cond = icmp ne i32 %a, %b
  br i1 %cond, label %bad, label %good
bad:
  call void @__VERIFIER_error()
  unreachable
good:
  ret i32 0
}

declare i32 @__VERIFIER_nondet_int()
declare void @__VERIFIER_error()
"#;
    let (verdict, _) = verify_default(src);
    assert!(verdict.is_success(), "expected Success, got {verdict:?}");
}

const POINTER_SELECT: &str = r#"
@b = global i32 1
@c = global i32 2

define i32 @main() {
entry:
  %a = call i32 @__VERIFIER_nondet_int()
  %cond = icmp eq i32 %a, 0
  %p = select i1 %cond, ptr @b, ptr @c
  %v = load i32, ptr %p
  %big = icmp sgt i32 %v, 3
  br i1 %big, label %bad, label %good
bad:
  call void @__VERIFIER_error()
  unreachable
good:
  ret i32 0
}

declare i32 @__VERIFIER_nondet_int()
declare void @__VERIFIER_error()
"#;

#[test]
fn flat_memory_disambiguates_pointer_targets() {
    // *p is 1 or 2 either way, never above 3.
    let settings = BmcSettings {
        memory: MemoryModelKind::Flat,
        ..Default::default()
    };
    let (verdict, _) = verify(POINTER_SELECT, settings);
    assert!(verdict.is_success(), "expected Success, got {verdict:?}");
}

#[test]
fn simple_memory_stays_conservative_on_loads() {
    // Havocked loads cannot refute the guard; the verdict degrades to
    // Unknown instead of a spurious result either way.
    let (verdict, _) = verify_default(POINTER_SELECT);
    assert!(
        matches!(verdict, Verdict::Unknown),
        "expected Unknown, got {verdict:?}"
    );
}

const PHI_JOIN: &str = r#"
define i32 @main() {
entry:
  %a = call i32 @__VERIFIER_nondet_int()
  %cond = icmp eq i32 %a, 0
  br i1 %cond, label %then, label %else
then:
  %b1 = add i32 %a, 1
  br label %join
else:
  %b2 = add i32 %a, 2
  br label %join
join:
  %b = phi i32 [ %b1, %then ], [ %b2, %else ]
  %bad = icmp sgt i32 %a, %b
  br i1 %bad, label %fail, label %good
fail:
  call void @reach_error()
  unreachable
good:
  ret i32 0
}

declare i32 @__VERIFIER_nondet_int()
declare void @reach_error()
"#;

#[test]
fn phi_join_guard_with_scripted_oracle_is_safe() {
    // With every path refuted by the oracle, the driver reports
    // Success and the phi/branch plumbing is exercised end to end.
    let mut module = parse_module(PHI_JOIN).unwrap();
    let registry = CheckRegistry::with_default_checks();
    registry.run(&mut module);
    let mut oracle = RefuteAll;
    let verdict = check_module(&module, &mut oracle, &BmcSettings::default());
    assert!(verdict.is_success(), "expected Success, got {verdict:?}");
}

#[test]
fn phi_join_guard_with_builtin_oracle_is_conservative() {
    // Propagation cannot refute the else-path (a > a + 2 needs
    // arithmetic reasoning), so the built-in oracle must stay Unknown
    // rather than claim either verdict.
    let (verdict, _) = verify_default(PHI_JOIN);
    assert!(
        matches!(verdict, Verdict::Unknown),
        "expected Unknown, got {verdict:?}"
    );
}

#[test]
fn division_by_zero_is_detected() {
    let src = r#"
define i32 @main() {
entry:
  %x = call i32 @__VERIFIER_nondet_int()
  %y = sdiv i32 %x, 0
  ret i32 %y
}

declare i32 @__VERIFIER_nondet_int()
"#;
    let (verdict, registry) = verify_default(src);
    let Verdict::Fail { code, .. } = verdict else {
        panic!("expected Fail, got {verdict:?}");
    };
    assert_eq!(registry.message_for_code(code), "Division by zero");
}

#[test]
fn division_by_nonzero_constant_is_safe() {
    let src = r#"
define i32 @main() {
entry:
  %x = call i32 @__VERIFIER_nondet_int()
  %y = sdiv i32 %x, 2
  ret i32 %y
}

declare i32 @__VERIFIER_nondet_int()
"#;
    let (verdict, _) = verify_default(src);
    assert!(verdict.is_success(), "expected Success, got {verdict:?}");
}

#[test]
fn signed_overflow_at_int_max_is_detected() {
    // x = INT_MAX; y = x + 1;
    let src = r#"
define i32 @main() {
entry:
  %y = add nsw i32 2147483647, 1
  ret i32 %y
}
"#;
    let (verdict, registry) = verify_default(src);
    let Verdict::Fail { code, .. } = verdict else {
        panic!("expected Fail, got {verdict:?}");
    };
    assert_eq!(registry.message_for_code(code), "Signed integer overflow");
}

#[test]
fn small_nsw_addition_is_safe() {
    let src = r#"
define i32 @main() {
entry:
  %y = add nsw i32 40, 2
  ret i32 %y
}
"#;
    let (verdict, _) = verify_default(src);
    assert!(verdict.is_success(), "expected Success, got {verdict:?}");
}

#[test]
fn program_without_errors_verifies() {
    let src = r#"
define i32 @main() {
entry:
  %a = add i32 1, 2
  ret i32 %a
}
"#;
    let (verdict, _) = verify_default(src);
    assert!(verdict.is_success());
}

#[test]
fn infinite_loop_hits_the_bound() {
    let src = r#"
define void @main() {
entry:
  br label %loop
loop:
  br label %loop
}
"#;
    let settings = BmcSettings {
        bound: 10,
        ..Default::default()
    };
    let (verdict, _) = verify(src, settings);
    assert!(
        matches!(verdict, Verdict::BoundReached),
        "expected BoundReached, got {verdict:?}"
    );
}

#[test]
fn uninlined_call_degrades_to_unknown() {
    let src = r#"
define void @check(i32 %v) {
entry:
  %c = icmp eq i32 %v, 7
  br i1 %c, label %bad, label %good
bad:
  call void @__VERIFIER_error()
  unreachable
good:
  ret void
}

define i32 @main() {
entry:
  %a = call i32 @__VERIFIER_nondet_int()
  call void @check(i32 %a)
  ret i32 0
}

declare i32 @__VERIFIER_nondet_int()
declare void @__VERIFIER_error()
"#;
    let (verdict, _) = verify_default(src);
    assert!(
        matches!(verdict, Verdict::Unknown),
        "expected Unknown, got {verdict:?}"
    );
}

#[test]
fn inlined_call_exposes_the_failure() {
    let src = r#"
define void @check(i32 %v) {
entry:
  %c = icmp eq i32 %v, 7
  br i1 %c, label %bad, label %good
bad:
  call void @__VERIFIER_error()
  unreachable
good:
  ret void
}

define i32 @main() {
entry:
  %a = call i32 @__VERIFIER_nondet_int()
  call void @check(i32 %a)
  ret i32 0
}

declare i32 @__VERIFIER_nondet_int()
declare void @__VERIFIER_error()
"#;
    let mut module = parse_module(src).unwrap();
    warden_ir::inline_functions(&mut module).unwrap();
    let registry = CheckRegistry::with_default_checks();
    registry.run(&mut module);
    let mut oracle = PropagationOracle::new();
    let verdict = check_module(&module, &mut oracle, &BmcSettings::default());

    let Verdict::Fail { code, trace } = verdict else {
        panic!("expected Fail, got {verdict:?}");
    };
    assert_eq!(registry.message_for_code(code), "Assertion failure");
    let trace = trace.expect("trace is reconstructible");
    assert_eq!(trace.inputs[0].value, TraceValue::Int(7));

    // The spliced callee keeps its provenance: the trace reports
    // entering `check`, and no return, since the failure is inside it.
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
fn switch_cases_constrain_the_path() {
    // Only the case value 3 reaches the error sink.
    let src = r#"
define i32 @main() {
entry:
  %a = call i32 @__VERIFIER_nondet_int()
  switch i32 %a, label %good [ i32 3, label %bad i32 4, label %good ]
bad:
  call void @__VERIFIER_error()
  unreachable
good:
  ret i32 0
}

declare i32 @__VERIFIER_nondet_int()
declare void @__VERIFIER_error()
"#;
    let (verdict, _) = verify_default(src);
    let Verdict::Fail { trace, .. } = verdict else {
        panic!("expected Fail, got {verdict:?}");
    };
    let trace = trace.expect("trace is reconstructible");
    assert_eq!(trace.inputs[0].value, TraceValue::Int(3));
}

#[test]
fn possible_nan_input_stays_unknown() {
    // fcmp uno is reachable exactly when the input is NaN; propagation
    // cannot produce one, so the verdict is conservatively Unknown.
    let src = r#"
define i32 @main() {
entry:
  %x = call double @__VERIFIER_nondet_double()
  %c = fcmp uno double %x, %x
  br i1 %c, label %bad, label %good
bad:
  call void @__VERIFIER_error()
  unreachable
good:
  ret i32 0
}

declare double @__VERIFIER_nondet_double()
declare void @__VERIFIER_error()
"#;
    let (verdict, _) = verify_default(src);
    assert!(
        matches!(verdict, Verdict::Unknown),
        "expected Unknown, got {verdict:?}"
    );
}

#[test]
fn math_int_add_has_no_wraparound_overflow_path() {
    // The overflow check still instruments the nsw addition, but
    // mathematical integers never wrap, so the error block is
    // unreachable and the program verifies.
    let src = r#"
define i32 @main() {
entry:
  %x = call i32 @__VERIFIER_nondet_int()
  %y = add nsw i32 %x, 1
  ret i32 %y
}

declare i32 @__VERIFIER_nondet_int()
"#;
    let settings = BmcSettings {
        translate: TranslateSettings {
            math_int: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let (verdict, _) = verify(src, settings);
    assert!(verdict.is_success(), "expected Success, got {verdict:?}");
}
