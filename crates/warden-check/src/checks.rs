//! Safety-check instrumentation.
//!
//! Each check rewrites a function so that violating the checked
//! property means reaching an error block tagged with the check's
//! error code. Codes are assigned by the [`CheckRegistry`] at
//! registration time and map back to human-readable messages when a
//! counterexample is reported.

use tracing::debug;

use warden_ir::{
    BinOp, Function, Inst, InstKind, IrType, Module, Operand, Terminator, ERROR_FUNCTIONS,
    OVERFLOW_PREFIX,
};

/// One instrumentation pass over a function.
pub trait Check {
    /// Stable name for diagnostics.
    fn name(&self) -> &'static str;

    /// The message reported when this check's error block is reached.
    fn error_description(&self) -> &'static str;

    /// Rewrites `func`, tagging new error blocks with `code`. Returns
    /// `true` if anything changed.
    fn mark(&self, func: &mut Function, code: u32) -> bool;
}

/// Registry of enabled checks; the error code of a check is fixed when
/// it is added.
#[derive(Default)]
pub struct CheckRegistry {
    checks: Vec<Box<dyn Check>>,
}

impl CheckRegistry {
    pub fn new() -> CheckRegistry {
        CheckRegistry::default()
    }

    /// The default check set of the verifier, in registration order:
    /// assertion failures, division by zero, signed overflow.
    pub fn with_default_checks() -> CheckRegistry {
        let mut registry = CheckRegistry::new();
        registry.add(Box::new(AssertionFailCheck));
        registry.add(Box::new(DivisionByZeroCheck));
        registry.add(Box::new(SignedOverflowCheck));
        registry
    }

    /// Registers a check, assigning its error code. Codes start at 1;
    /// 0 is reserved for "no error".
    pub fn add(&mut self, check: Box<dyn Check>) -> u32 {
        self.checks.push(check);
        self.checks.len() as u32
    }

    /// The message for an error code, or a placeholder for codes no
    /// check owns.
    pub fn message_for_code(&self, code: u32) -> &'static str {
        code.checked_sub(1)
            .and_then(|i| self.checks.get(i as usize))
            .map(|c| c.error_description())
            .unwrap_or("Unknown failure")
    }

    /// Runs every registered check over every function definition.
    pub fn run(&self, module: &mut Module) {
        for func in module.functions.values_mut() {
            if func.is_declaration() {
                continue;
            }
            for (index, check) in self.checks.iter().enumerate() {
                let code = index as u32 + 1;
                if check.mark(func, code) {
                    debug!(check = check.name(), function = %func.name, "instrumented");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Assertion failures
// ---------------------------------------------------------------------------

/// Rewrites calls to recognized error sinks (`__VERIFIER_error` and
/// friends) into unconditional branches to a fresh error block. The
/// remainder of the block is dead and dropped.
pub struct AssertionFailCheck;

impl Check for AssertionFailCheck {
    fn name(&self) -> &'static str {
        "assertion-fail"
    }

    fn error_description(&self) -> &'static str {
        "Assertion failure"
    }

    fn mark(&self, func: &mut Function, code: u32) -> bool {
        let mut changed = false;
        for block_index in 0..func.blocks.len() {
            let position = func.blocks[block_index].insts.iter().position(|inst| {
                matches!(
                    &inst.kind,
                    InstKind::Call { callee, .. } if ERROR_FUNCTIONS.contains(&callee.as_str())
                )
            });
            let Some(position) = position else { continue };

            let line = func.blocks[block_index].insts[position]
                .loc
                .map(|l| l.line);
            let error_block = func.create_error_block("assert_fail", code);
            func.blocks[error_block.0 as usize].error_line = line;
            let block = &mut func.blocks[block_index];
            block.insts.truncate(position);
            block.terminator = Terminator::Br {
                target: error_block,
            };
            changed = true;
        }
        changed
    }
}

// ---------------------------------------------------------------------------
// Division by zero
// ---------------------------------------------------------------------------

/// Guards every integer division and remainder with `divisor != 0`,
/// branching to an error block when the guard fails.
pub struct DivisionByZeroCheck;

impl Check for DivisionByZeroCheck {
    fn name(&self) -> &'static str {
        "div-by-zero"
    }

    fn error_description(&self) -> &'static str {
        "Division by zero"
    }

    fn mark(&self, func: &mut Function, code: u32) -> bool {
        let mut changed = false;
        let mut guard_count = 0usize;

        // Work (block, start) pairs: splitting pushes the instruction
        // under test into a fresh block, so scanning resumes there.
        let mut work: Vec<(usize, usize)> =
            (0..func.blocks.len()).map(|b| (b, 0)).collect();

        while let Some((block_index, start)) = work.pop() {
            let found = func.blocks[block_index]
                .insts
                .iter()
                .enumerate()
                .skip(start)
                .find_map(|(i, inst)| match &inst.kind {
                    InstKind::Binary {
                        op, result, rhs, ..
                    } if op.is_int_division() => Some((i, *result, rhs.clone(), inst.loc)),
                    _ => None,
                });
            let Some((position, div_result, divisor, loc)) = found else { continue };

            let bits = divisor_bits(func, &divisor);
            let block_id = warden_ir::BlockId(block_index as u32);
            let error_block = func.create_error_block("divzero", code);
            func.blocks[error_block.0 as usize].error_line = loc.map(|l| l.line);
            let tail = func.split_block(block_id, position);

            let guard = func.add_synthetic_value(format!("divguard{guard_count}"), IrType::I1);
            // The guard belongs to whatever (inlined) function the
            // division came from.
            func.values[guard.0 as usize].scope =
                func.values[div_result.0 as usize].scope.clone();
            guard_count += 1;
            func.blocks[block_index].insts.push(Inst::new(InstKind::ICmp {
                pred: warden_ir::ICmpPred::Ne,
                result: guard,
                lhs: divisor,
                rhs: Operand::ConstInt { bits, value: 0 },
            }));
            func.blocks[block_index].terminator = Terminator::CondBr {
                cond: Operand::Value(guard),
                then_target: tail,
                else_target: error_block,
            };

            changed = true;
            // The division itself is now the tail's first instruction.
            work.push((tail.0 as usize, 1));
        }
        changed
    }
}

fn divisor_bits(func: &Function, divisor: &Operand) -> u32 {
    match divisor {
        Operand::Value(v) => func.value_ty(*v).int_bits().unwrap_or(32),
        Operand::ConstInt { bits, .. } => *bits,
        _ => 32,
    }
}

// ---------------------------------------------------------------------------
// Signed integer overflow
// ---------------------------------------------------------------------------

/// Instruments `nsw`-flagged `add`/`sub`/`mul` with a
/// `warden.overflow.<op>.i<N>` predicate call and a branch to an error
/// block when the predicate reports a wrap.
pub struct SignedOverflowCheck;

impl Check for SignedOverflowCheck {
    fn name(&self) -> &'static str {
        "signed-overflow"
    }

    fn error_description(&self) -> &'static str {
        "Signed integer overflow"
    }

    fn mark(&self, func: &mut Function, code: u32) -> bool {
        let mut changed = false;
        let mut check_count = 0usize;

        let mut work: Vec<(usize, usize)> =
            (0..func.blocks.len()).map(|b| (b, 0)).collect();

        while let Some((block_index, start)) = work.pop() {
            let found = func.blocks[block_index]
                .insts
                .iter()
                .enumerate()
                .skip(start)
                .find_map(|(i, inst)| match &inst.kind {
                    InstKind::Binary {
                        op: op @ (BinOp::Add | BinOp::Sub | BinOp::Mul),
                        nsw: true,
                        result,
                        lhs,
                        rhs,
                    } => Some((i, *op, *result, lhs.clone(), rhs.clone(), inst.loc)),
                    _ => None,
                });
            let Some((position, op, result, lhs, rhs, loc)) = found else { continue };

            let bits = func.value_ty(result).int_bits().unwrap_or(32);
            let intrinsic = format!(
                "{}{}.i{}",
                OVERFLOW_PREFIX,
                match op {
                    BinOp::Add => "sadd",
                    BinOp::Sub => "ssub",
                    _ => "smul",
                },
                bits
            );

            let block_id = warden_ir::BlockId(block_index as u32);
            let error_block = func.create_error_block("ovr", code);
            func.blocks[error_block.0 as usize].error_line = loc.map(|l| l.line);
            let tail = func.split_block(block_id, position);

            let ok = func.add_synthetic_value(format!("ovr_check{check_count}"), IrType::I1);
            func.values[ok.0 as usize].scope = func.values[result.0 as usize].scope.clone();
            check_count += 1;
            func.blocks[block_index].insts.push(Inst::new(InstKind::Call {
                result: Some(ok),
                callee: intrinsic,
                args: vec![lhs, rhs],
            }));
            func.blocks[block_index].terminator = Terminator::CondBr {
                cond: Operand::Value(ok),
                then_target: tail,
                else_target: error_block,
            };

            changed = true;
            work.push((tail.0 as usize, 1));
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_ir::parse_module;

    #[test]
    fn codes_are_assigned_at_registration() {
        let mut registry = CheckRegistry::new();
        let a = registry.add(Box::new(AssertionFailCheck));
        let b = registry.add(Box::new(DivisionByZeroCheck));
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(registry.message_for_code(1), "Assertion failure");
        assert_eq!(registry.message_for_code(2), "Division by zero");
        assert_eq!(registry.message_for_code(99), "Unknown failure");
    }

    #[test]
    fn error_calls_become_error_blocks() {
        let src = r#"
define void @main(i1 %c) {
entry:
  br i1 %c, label %bad, label %ok
bad:
  call void @__VERIFIER_error()
  unreachable
ok:
  ret void
}

declare void @__VERIFIER_error()
"#;
        let mut module = parse_module(src).unwrap();
        let registry = CheckRegistry::with_default_checks();
        registry.run(&mut module);

        let main = module.function("main").unwrap();
        let bad = main.block_by_label("bad").unwrap();
        assert!(main.block(bad).insts.is_empty());
        let Terminator::Br { target } = main.block(bad).terminator else {
            panic!("expected branch to error block");
        };
        assert_eq!(main.block(target).error_code, Some(1));
    }

    #[test]
    fn divisions_get_nonzero_guards() {
        let src = r#"
define i32 @main(i32 %a, i32 %b) {
entry:
  %q = sdiv i32 %a, %b
  ret i32 %q
}
"#;
        let mut module = parse_module(src).unwrap();
        let registry = CheckRegistry::with_default_checks();
        registry.run(&mut module);

        let main = module.function("main").unwrap();
        let entry = main.block(main.entry());
        // Entry now ends in the guard and a conditional branch.
        let Some(Inst {
            kind:
                InstKind::ICmp {
                    pred: warden_ir::ICmpPred::Ne,
                    rhs: Operand::ConstInt { value: 0, .. },
                    ..
                },
            ..
        }) = entry.insts.last()
        else {
            panic!("expected divisor guard, got {:?}", entry.insts.last());
        };
        let Terminator::CondBr { else_target, then_target, .. } = entry.terminator else {
            panic!("expected conditional branch");
        };
        assert_eq!(main.block(else_target).error_code, Some(2));
        // The division moved to the fall-through block.
        assert!(matches!(
            main.block(then_target).insts[0].kind,
            InstKind::Binary {
                op: BinOp::SDiv,
                ..
            }
        ));
    }

    #[test]
    fn each_division_is_guarded_once() {
        let src = r#"
define i32 @main(i32 %a, i32 %b) {
entry:
  %q = sdiv i32 %a, %b
  %r = urem i32 %a, %q
  ret i32 %r
}
"#;
        let mut module = parse_module(src).unwrap();
        let registry = CheckRegistry::with_default_checks();
        registry.run(&mut module);

        let main = module.function("main").unwrap();
        let error_blocks = main
            .blocks
            .iter()
            .filter(|b| b.error_code == Some(2))
            .count();
        assert_eq!(error_blocks, 2);
    }

    #[test]
    fn nsw_arithmetic_gets_overflow_predicates() {
        let src = r#"
define i32 @main(i32 %a) {
entry:
  %b = add nsw i32 %a, 1
  ret i32 %b
}
"#;
        let mut module = parse_module(src).unwrap();
        let registry = CheckRegistry::with_default_checks();
        registry.run(&mut module);

        let main = module.function("main").unwrap();
        let entry = main.block(main.entry());
        let Some(Inst {
            kind: InstKind::Call { callee, .. },
            ..
        }) = entry.insts.last()
        else {
            panic!("expected overflow predicate call");
        };
        assert_eq!(callee, "warden.overflow.sadd.i32");
        let Terminator::CondBr { else_target, .. } = entry.terminator else {
            panic!("expected conditional branch");
        };
        assert_eq!(main.block(else_target).error_code, Some(3));
    }

    #[test]
    fn unflagged_arithmetic_is_untouched() {
        let src = r#"
define i32 @main(i32 %a) {
entry:
  %b = add i32 %a, 1
  ret i32 %b
}
"#;
        let mut module = parse_module(src).unwrap();
        let registry = CheckRegistry::with_default_checks();
        registry.run(&mut module);

        let main = module.function("main").unwrap();
        assert_eq!(main.blocks.len(), 1);
    }
}
