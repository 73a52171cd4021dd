//! Module transforms behind `-inline` and `-inline-globals`.
//!
//! The verifier core assumes functions are inlined into `main` before
//! translation; [`inline_functions`] performs that splicing for
//! non-recursive direct calls. [`inline_globals`] turns module globals
//! into `main`-local allocas with an initializing store, which lets the
//! flat memory model treat them like any other stack slot.

use crate::error::IrError;
use crate::func::{BlockId, Function, ValueId};
use crate::inst::{Inst, InstKind, Operand, Terminator};
use crate::module::{GlobalInit, Module};
use crate::types::IrType;

/// Upper bound on splice rounds; a module needing more is (mutually)
/// recursive.
const MAX_INLINE_ROUNDS: usize = 64;

/// Inlines every direct call from `main` to a defined function,
/// repeating until none remain (nested calls surface after splicing).
pub fn inline_functions(module: &mut Module) -> Result<(), IrError> {
    for _ in 0..MAX_INLINE_ROUNDS {
        let Some((block, index, callee)) = find_inlinable_call(module) else {
            return Ok(());
        };
        if callee == "main" {
            return Err(IrError::RecursiveFunction { function: callee });
        }
        let callee_fn = module
            .functions
            .get(&callee)
            .cloned()
            .ok_or_else(|| IrError::UnknownFunction {
                function: callee.clone(),
            })?;
        let caller = module
            .functions
            .get_mut("main")
            .expect("inlining requires a main function");
        splice_call(caller, block, index, &callee_fn);
    }
    Err(IrError::InliningDidNotConverge {
        iterations: MAX_INLINE_ROUNDS,
    })
}

fn find_inlinable_call(module: &Module) -> Option<(BlockId, usize, String)> {
    let main = module.function("main")?;
    for block in main.block_ids() {
        for (index, inst) in main.block(block).insts.iter().enumerate() {
            if let InstKind::Call { callee, .. } = &inst.kind {
                if module.is_defined(callee) {
                    return Some((block, index, callee.clone()));
                }
            }
        }
    }
    None
}

/// Splices `callee` in place of the call at `caller[block][index]`.
fn splice_call(caller: &mut Function, block: BlockId, index: usize, callee: &Function) {
    let call_inst = caller.block(block).insts[index].clone();
    let InstKind::Call { result, args, .. } = call_inst.kind else {
        panic!("splice_call target is not a call instruction");
    };

    // Split off everything after the call, then drop the call itself.
    let cont = caller.split_block(block, index + 1);
    caller.block_mut(block).insts.pop();

    // Parameters substitute to the call arguments; every other callee
    // value gets a fresh slot in the caller (source names preserved so
    // the trace still maps inlined variables).
    let mut value_map: Vec<Option<Operand>> = vec![None; callee.values.len()];
    for (param, arg) in callee.params.iter().zip(args.iter()) {
        value_map[param.value.0 as usize] = Some(arg.clone());
    }
    for (i, info) in callee.values.iter().enumerate() {
        if value_map[i].is_some() {
            continue;
        }
        let id = ValueId(caller.values.len() as u32);
        caller.values.push(crate::func::ValueInfo {
            name: format!("{}.{}", callee.name, info.name),
            ty: info.ty,
            source_name: info.source_name.clone(),
            // Nested inlining keeps the innermost originating function.
            scope: info.scope.clone().or_else(|| Some(callee.name.clone())),
        });
        value_map[i] = Some(Operand::Value(id));
    }

    let map_operand = |op: &Operand| -> Operand {
        match op {
            Operand::Value(v) => value_map[v.0 as usize]
                .clone()
                .expect("callee value mapped"),
            other => other.clone(),
        }
    };
    let map_result = |v: ValueId| -> ValueId {
        match value_map[v.0 as usize] {
            Some(Operand::Value(id)) => id,
            _ => panic!("callee result value substituted by a constant"),
        }
    };

    // Fresh blocks for the callee body.
    let mut block_map: Vec<BlockId> = Vec::with_capacity(callee.blocks.len());
    for cb in &callee.blocks {
        let label = caller.fresh_label(&format!("{}.{}", callee.name, cb.label));
        let id = caller.add_block(label);
        caller.block_mut(id).error_code = cb.error_code;
        caller.block_mut(id).error_line = cb.error_line;
        block_map.push(id);
    }

    // The original block now jumps into the inlined entry.
    caller.block_mut(block).terminator = Terminator::Br {
        target: block_map[callee.entry().0 as usize],
    };

    let mut returns: Vec<(Option<Operand>, BlockId)> = Vec::new();
    for (i, cb) in callee.blocks.iter().enumerate() {
        let target = block_map[i];
        let mut insts = Vec::with_capacity(cb.insts.len());
        for inst in &cb.insts {
            insts.push(Inst {
                kind: remap_inst(&inst.kind, &map_operand, &map_result, &block_map),
                loc: inst.loc,
            });
        }
        let terminator = match &cb.terminator {
            Terminator::Ret { value } => {
                returns.push((value.as_ref().map(&map_operand), target));
                Terminator::Br { target: cont }
            }
            Terminator::Br { target } => Terminator::Br {
                target: block_map[target.0 as usize],
            },
            Terminator::CondBr {
                cond,
                then_target,
                else_target,
            } => Terminator::CondBr {
                cond: map_operand(cond),
                then_target: block_map[then_target.0 as usize],
                else_target: block_map[else_target.0 as usize],
            },
            Terminator::Switch {
                value,
                bits,
                default,
                cases,
            } => Terminator::Switch {
                value: map_operand(value),
                bits: *bits,
                default: block_map[default.0 as usize],
                cases: cases
                    .iter()
                    .map(|(k, b)| (*k, block_map[b.0 as usize]))
                    .collect(),
            },
            Terminator::Unreachable => Terminator::Unreachable,
        };
        let cb_out = caller.block_mut(target);
        cb_out.insts = insts;
        cb_out.terminator = terminator;
    }

    // The call's result becomes a phi over the returned values.
    if let Some(result) = result {
        let incoming: Vec<(Operand, BlockId)> = returns
            .iter()
            .filter_map(|(v, b)| v.clone().map(|v| (v, *b)))
            .collect();
        if !incoming.is_empty() {
            caller
                .block_mut(cont)
                .insts
                .insert(0, Inst::new(InstKind::Phi { result, incoming }));
        }
    }
}

fn remap_inst(
    kind: &InstKind,
    map_operand: &dyn Fn(&Operand) -> Operand,
    map_result: &dyn Fn(ValueId) -> ValueId,
    block_map: &[BlockId],
) -> InstKind {
    match kind {
        InstKind::Binary {
            op,
            nsw,
            result,
            lhs,
            rhs,
        } => InstKind::Binary {
            op: *op,
            nsw: *nsw,
            result: map_result(*result),
            lhs: map_operand(lhs),
            rhs: map_operand(rhs),
        },
        InstKind::ICmp {
            pred,
            result,
            lhs,
            rhs,
        } => InstKind::ICmp {
            pred: *pred,
            result: map_result(*result),
            lhs: map_operand(lhs),
            rhs: map_operand(rhs),
        },
        InstKind::FCmp {
            pred,
            result,
            lhs,
            rhs,
        } => InstKind::FCmp {
            pred: *pred,
            result: map_result(*result),
            lhs: map_operand(lhs),
            rhs: map_operand(rhs),
        },
        InstKind::Select {
            result,
            cond,
            then_value,
            else_value,
        } => InstKind::Select {
            result: map_result(*result),
            cond: map_operand(cond),
            then_value: map_operand(then_value),
            else_value: map_operand(else_value),
        },
        InstKind::Cast { op, result, value } => InstKind::Cast {
            op: *op,
            result: map_result(*result),
            value: map_operand(value),
        },
        InstKind::Phi { result, incoming } => InstKind::Phi {
            result: map_result(*result),
            incoming: incoming
                .iter()
                .map(|(v, b)| (map_operand(v), block_map[b.0 as usize]))
                .collect(),
        },
        InstKind::Call {
            result,
            callee,
            args,
        } => InstKind::Call {
            result: result.map(map_result),
            callee: callee.clone(),
            args: args.iter().map(map_operand).collect(),
        },
        InstKind::Load { result, address } => InstKind::Load {
            result: map_result(*result),
            address: map_operand(address),
        },
        InstKind::Store { value, address } => InstKind::Store {
            value: map_operand(value),
            address: map_operand(address),
        },
        InstKind::Alloca { result, allocated } => InstKind::Alloca {
            result: map_result(*result),
            allocated: *allocated,
        },
        InstKind::GetElementPtr {
            result,
            base,
            indices,
        } => InstKind::GetElementPtr {
            result: map_result(*result),
            base: map_operand(base),
            indices: indices.iter().map(map_operand).collect(),
        },
        InstKind::PtrCast { result, value } => InstKind::PtrCast {
            result: map_result(*result),
            value: map_operand(value),
        },
    }
}

/// Rewrites globals referenced only from `main` into entry-block allocas
/// with an initializing store.
pub fn inline_globals(module: &mut Module) {
    let candidates: Vec<String> = module
        .globals
        .keys()
        .filter(|name| !referenced_outside_main(module, name))
        .cloned()
        .collect();

    for name in candidates {
        let global = module.globals.shift_remove(&name).expect("candidate exists");
        let Some(main) = module.functions.get_mut("main") else {
            return;
        };
        if main.is_declaration() {
            return;
        }

        let addr = main.add_synthetic_value(format!("{name}.addr"), IrType::Ptr);
        let init = match (global.init, global.ty) {
            (GlobalInit::Int(v), IrType::Int { bits }) => Operand::ConstInt {
                bits,
                value: crate::mask_to(v, bits),
            },
            (GlobalInit::Float(v), IrType::Float64) => Operand::ConstFloat {
                double: true,
                bits: v.to_bits(),
            },
            (GlobalInit::Float(v), IrType::Float32) => Operand::ConstFloat {
                double: false,
                bits: (v as f32).to_bits() as u64,
            },
            (GlobalInit::Zero, IrType::Int { bits }) => Operand::ConstInt { bits, value: 0 },
            (GlobalInit::Zero, IrType::Float64) => Operand::ConstFloat {
                double: true,
                bits: 0,
            },
            (GlobalInit::Zero, IrType::Float32) => Operand::ConstFloat {
                double: false,
                bits: 0,
            },
            (init, ty) => {
                // Pointer-typed or mismatched globals stay module-level.
                module.globals.insert(
                    name.clone(),
                    crate::module::Global {
                        name: name.clone(),
                        ty,
                        init,
                    },
                );
                continue;
            }
        };

        let entry = main.entry();
        main.block_mut(entry).insts.splice(
            0..0,
            [
                Inst::new(InstKind::Alloca {
                    result: addr,
                    allocated: global.ty,
                }),
                Inst::new(InstKind::Store {
                    value: init,
                    address: Operand::Value(addr),
                }),
            ],
        );

        for block in 0..main.blocks.len() {
            rewrite_global_refs(&mut main.blocks[block], &name, addr);
        }
    }
}

fn referenced_outside_main(module: &Module, global: &str) -> bool {
    module
        .functions
        .values()
        .filter(|f| f.name != "main" && !f.is_declaration())
        .any(|f| {
            f.blocks.iter().any(|b| {
                b.insts
                    .iter()
                    .any(|inst| inst_references_global(&inst.kind, global))
                    || terminator_references_global(&b.terminator, global)
            })
        })
}

fn inst_references_global(kind: &InstKind, global: &str) -> bool {
    let is_ref = |op: &Operand| matches!(op, Operand::Global(g) if g == global);
    match kind {
        InstKind::Binary { lhs, rhs, .. }
        | InstKind::ICmp { lhs, rhs, .. }
        | InstKind::FCmp { lhs, rhs, .. } => is_ref(lhs) || is_ref(rhs),
        InstKind::Select {
            cond,
            then_value,
            else_value,
            ..
        } => is_ref(cond) || is_ref(then_value) || is_ref(else_value),
        InstKind::Cast { value, .. } | InstKind::PtrCast { value, .. } => is_ref(value),
        InstKind::Phi { incoming, .. } => incoming.iter().any(|(v, _)| is_ref(v)),
        InstKind::Call { args, .. } => args.iter().any(is_ref),
        InstKind::Load { address, .. } => is_ref(address),
        InstKind::Store { value, address } => is_ref(value) || is_ref(address),
        InstKind::Alloca { .. } => false,
        InstKind::GetElementPtr { base, indices, .. } => {
            is_ref(base) || indices.iter().any(is_ref)
        }
    }
}

fn terminator_references_global(term: &Terminator, global: &str) -> bool {
    let is_ref = |op: &Operand| matches!(op, Operand::Global(g) if g == global);
    match term {
        Terminator::CondBr { cond, .. } => is_ref(cond),
        Terminator::Switch { value, .. } => is_ref(value),
        Terminator::Ret { value: Some(v) } => is_ref(v),
        _ => false,
    }
}

fn rewrite_global_refs(block: &mut crate::func::Block, global: &str, addr: ValueId) {
    let rewrite = |op: &mut Operand| {
        if matches!(op, Operand::Global(g) if g == global) {
            *op = Operand::Value(addr);
        }
    };
    for inst in &mut block.insts {
        match &mut inst.kind {
            InstKind::Binary { lhs, rhs, .. }
            | InstKind::ICmp { lhs, rhs, .. }
            | InstKind::FCmp { lhs, rhs, .. } => {
                rewrite(lhs);
                rewrite(rhs);
            }
            InstKind::Select {
                cond,
                then_value,
                else_value,
                ..
            } => {
                rewrite(cond);
                rewrite(then_value);
                rewrite(else_value);
            }
            InstKind::Cast { value, .. } | InstKind::PtrCast { value, .. } => rewrite(value),
            InstKind::Phi { incoming, .. } => {
                for (v, _) in incoming.iter_mut() {
                    rewrite(v);
                }
            }
            InstKind::Call { args, .. } => {
                for a in args.iter_mut() {
                    rewrite(a);
                }
            }
            InstKind::Load { address, .. } => rewrite(address),
            InstKind::Store { value, address } => {
                rewrite(value);
                rewrite(address);
            }
            InstKind::Alloca { .. } => {}
            InstKind::GetElementPtr { base, indices, .. } => {
                rewrite(base);
                for i in indices.iter_mut() {
                    rewrite(i);
                }
            }
        }
    }
    match &mut block.terminator {
        Terminator::CondBr { cond, .. } => rewrite(cond),
        Terminator::Switch { value, .. } => rewrite(value),
        Terminator::Ret { value: Some(v) } => rewrite(v),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_module;

    #[test]
    fn inlines_a_direct_call() {
        let src = r#"
define i32 @inc(i32 %x) {
entry:
  %r = add i32 %x, 1
  ret i32 %r
}

define i32 @main() {
entry:
  %a = call i32 @inc(i32 41)
  ret i32 %a
}
"#;
        let mut module = parse_module(src).unwrap();
        inline_functions(&mut module).unwrap();

        let main = module.function("main").unwrap();
        // No calls to defined functions remain.
        for block in main.block_ids() {
            for inst in &main.block(block).insts {
                if let InstKind::Call { callee, .. } = &inst.kind {
                    assert!(!module.is_defined(callee), "call to {callee} not inlined");
                }
            }
        }
        // The spliced body brought the add along.
        let has_add = main.blocks.iter().any(|b| {
            b.insts.iter().any(|i| {
                matches!(
                    i.kind,
                    InstKind::Binary {
                        op: crate::inst::BinOp::Add,
                        ..
                    }
                )
            })
        });
        assert!(has_add);
    }

    #[test]
    fn recursion_is_rejected() {
        let src = r#"
define i32 @main() {
entry:
  %a = call i32 @main()
  ret i32 %a
}
"#;
        let mut module = parse_module(src).unwrap();
        let err = inline_functions(&mut module).unwrap_err();
        assert!(matches!(err, IrError::RecursiveFunction { .. }));
    }

    #[test]
    fn inline_globals_rewrites_references() {
        let src = r#"
@g = global i32 7

define i32 @main() {
entry:
  %v = load i32, ptr @g
  ret i32 %v
}
"#;
        let mut module = parse_module(src).unwrap();
        inline_globals(&mut module);
        assert!(module.globals.is_empty());

        let main = module.function("main").unwrap();
        let entry = main.block(main.entry());
        assert!(matches!(entry.insts[0].kind, InstKind::Alloca { .. }));
        assert!(matches!(entry.insts[1].kind, InstKind::Store { .. }));
        match &entry.insts[2].kind {
            InstKind::Load { address, .. } => {
                assert!(matches!(address, Operand::Value(_)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
