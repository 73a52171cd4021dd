//! Literal reduction of expressions under a valuation.
//!
//! [`evaluate`] substitutes a [`Valuation`] into an expression and
//! reduces it to a literal, memoizing by expression identity so shared
//! sub-DAGs are visited once. The arithmetic goes through the same
//! helpers the constant folder uses, so the two can never disagree on a
//! value.
//!
//! `None` means the expression does not reduce: a variable is unbound,
//! an `Undef` is reached, a division hits a zero divisor, or the
//! expression contains kinds outside the literal domain (array terms
//! with symbolic indices). Callers decide what "undefined" means — the
//! trace reconstructor records it instead of fabricating a value.

use std::collections::HashMap;

use crate::builder::{fold_bv_arith, fold_compare, fold_int_arith};
use crate::context::Context;
use crate::expr::{ExprId, ExprKind};
use crate::literal::{
    self, FloatArithOp, FloatCmpOp, LiteralValue,
};
use crate::valuation::Valuation;

/// Reduces `expr` to a literal under `valuation`, if possible.
pub fn evaluate(ctx: &Context, expr: ExprId, valuation: &Valuation) -> Option<LiteralValue> {
    let mut memo = HashMap::new();
    eval_rec(ctx, expr, valuation, &mut memo)
}

fn eval_rec(
    ctx: &Context,
    expr: ExprId,
    valuation: &Valuation,
    memo: &mut HashMap<ExprId, Option<LiteralValue>>,
) -> Option<LiteralValue> {
    if let Some(cached) = memo.get(&expr) {
        return *cached;
    }
    let result = eval_uncached(ctx, expr, valuation, memo);
    memo.insert(expr, result);
    result
}

fn eval_uncached(
    ctx: &Context,
    expr: ExprId,
    valuation: &Valuation,
    memo: &mut HashMap<ExprId, Option<LiteralValue>>,
) -> Option<LiteralValue> {
    let node = ctx.expr(expr);
    let kind = node.kind;
    match kind {
        ExprKind::Undef => None,
        ExprKind::Literal(value) => Some(value),
        ExprKind::VarRef(var) => valuation.get(var).copied(),

        ExprKind::Not => {
            let b = eval_rec(ctx, node.operand(0), valuation, memo)?.as_bool()?;
            Some(LiteralValue::Bool(!b))
        }

        // A conjunction is false as soon as one operand is false, even
        // if others do not reduce; fully true only when all reduce true.
        ExprKind::And => {
            let operands = ctx.expr(expr).operands.clone();
            let mut all_true = true;
            for op in operands {
                match eval_rec(ctx, op, valuation, memo).and_then(|v| v.as_bool()) {
                    Some(false) => return Some(LiteralValue::Bool(false)),
                    Some(true) => {}
                    None => all_true = false,
                }
            }
            all_true.then_some(LiteralValue::Bool(true))
        }

        ExprKind::Or => {
            let operands = ctx.expr(expr).operands.clone();
            let mut all_false = true;
            for op in operands {
                match eval_rec(ctx, op, valuation, memo).and_then(|v| v.as_bool()) {
                    Some(true) => return Some(LiteralValue::Bool(true)),
                    Some(false) => {}
                    None => all_false = false,
                }
            }
            all_false.then_some(LiteralValue::Bool(false))
        }

        ExprKind::Xor => {
            let a = eval_rec(ctx, node.operand(0), valuation, memo)?.as_bool()?;
            let b = eval_rec(ctx, node.operand(1), valuation, memo)?.as_bool()?;
            Some(LiteralValue::Bool(a ^ b))
        }

        ExprKind::Imply => {
            let left = eval_rec(ctx, node.operand(0), valuation, memo).and_then(|v| v.as_bool());
            let right = eval_rec(ctx, node.operand(1), valuation, memo).and_then(|v| v.as_bool());
            match (left, right) {
                (Some(false), _) | (_, Some(true)) => Some(LiteralValue::Bool(true)),
                (Some(true), Some(r)) => Some(LiteralValue::Bool(r)),
                _ => None,
            }
        }

        ExprKind::Eq | ExprKind::NotEq => {
            let a = eval_rec(ctx, node.operand(0), valuation, memo)?;
            let b = eval_rec(ctx, node.operand(1), valuation, memo)?;
            let equal = a == b;
            Some(LiteralValue::Bool(if matches!(kind, ExprKind::Eq) {
                equal
            } else {
                !equal
            }))
        }

        ExprKind::Add
        | ExprKind::Sub
        | ExprKind::Mul
        | ExprKind::SDiv
        | ExprKind::UDiv
        | ExprKind::SRem
        | ExprKind::URem
        | ExprKind::Shl
        | ExprKind::LShr
        | ExprKind::AShr
        | ExprKind::BAnd
        | ExprKind::BOr
        | ExprKind::BXor => {
            let a = eval_rec(ctx, node.operand(0), valuation, memo)?;
            let b = eval_rec(ctx, node.operand(1), valuation, memo)?;
            match (a, b) {
                (
                    LiteralValue::Bv { width, bits: av },
                    LiteralValue::Bv { bits: bv, .. },
                ) => fold_bv_arith(&kind, width, av, bv).map(|bits| LiteralValue::bv(width, bits)),
                (LiteralValue::Int(av), LiteralValue::Int(bv)) => {
                    fold_int_arith(&kind, av, bv).map(LiteralValue::Int)
                }
                _ => None,
            }
        }

        ExprKind::SLt
        | ExprKind::SLtEq
        | ExprKind::SGt
        | ExprKind::SGtEq
        | ExprKind::ULt
        | ExprKind::ULtEq
        | ExprKind::UGt
        | ExprKind::UGtEq => {
            let a = eval_rec(ctx, node.operand(0), valuation, memo)?;
            let b = eval_rec(ctx, node.operand(1), valuation, memo)?;
            fold_compare(&kind, &a, &b).map(LiteralValue::Bool)
        }

        ExprKind::ZExt => {
            let width = ctx.ty(node.ty).bv_width()?;
            let (_, bits) = eval_rec(ctx, node.operand(0), valuation, memo)?.as_bv()?;
            Some(LiteralValue::bv(width, bits))
        }

        ExprKind::SExt => {
            let width = ctx.ty(node.ty).bv_width()?;
            let (from, bits) = eval_rec(ctx, node.operand(0), valuation, memo)?.as_bv()?;
            let value = literal::to_signed(bits, from);
            Some(LiteralValue::bv(width, literal::from_signed(value, width)))
        }

        ExprKind::Extract { offset, width } => {
            let (_, bits) = eval_rec(ctx, node.operand(0), valuation, memo)?.as_bv()?;
            Some(LiteralValue::bv(width, bits >> offset))
        }

        ExprKind::FIsNan => {
            let v = eval_rec(ctx, node.operand(0), valuation, memo)?;
            Some(LiteralValue::Bool(v.is_nan()))
        }

        ExprKind::FIsInf => {
            let v = eval_rec(ctx, node.operand(0), valuation, memo)?;
            Some(LiteralValue::Bool(v.is_infinity()))
        }

        ExprKind::FAdd { rm }
        | ExprKind::FSub { rm }
        | ExprKind::FMul { rm }
        | ExprKind::FDiv { rm } => {
            let op = match kind {
                ExprKind::FAdd { .. } => FloatArithOp::Add,
                ExprKind::FSub { .. } => FloatArithOp::Sub,
                ExprKind::FMul { .. } => FloatArithOp::Mul,
                _ => FloatArithOp::Div,
            };
            let (precision, a) =
                eval_rec(ctx, node.operand(0), valuation, memo)?.as_float_bits()?;
            let (_, b) = eval_rec(ctx, node.operand(1), valuation, memo)?.as_float_bits()?;
            literal::fold_float_arith(precision, op, rm, a, b)
                .map(|bits| LiteralValue::Float { precision, bits })
        }

        ExprKind::FEq | ExprKind::FGt | ExprKind::FGtEq | ExprKind::FLt | ExprKind::FLtEq => {
            let op = match kind {
                ExprKind::FEq => FloatCmpOp::Eq,
                ExprKind::FGt => FloatCmpOp::Gt,
                ExprKind::FGtEq => FloatCmpOp::GtEq,
                ExprKind::FLt => FloatCmpOp::Lt,
                _ => FloatCmpOp::LtEq,
            };
            let (precision, a) =
                eval_rec(ctx, node.operand(0), valuation, memo)?.as_float_bits()?;
            let (_, b) = eval_rec(ctx, node.operand(1), valuation, memo)?.as_float_bits()?;
            literal::fold_float_cmp(precision, op, a, b).map(LiteralValue::Bool)
        }

        ExprKind::Select => {
            let cond = eval_rec(ctx, node.operand(0), valuation, memo)?.as_bool()?;
            let chosen = if cond { node.operand(1) } else { node.operand(2) };
            eval_rec(ctx, chosen, valuation, memo)
        }

        // Array terms carry no literal representation; the builder's
        // read-over-write rewriting is the only reduction they get.
        ExprKind::ArrayRead | ExprKind::ArrayWrite => None,
    }
}
