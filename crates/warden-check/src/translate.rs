//! Instruction-to-expression translation.
//!
//! [`FunctionEncoder`] declares one context variable per named IR value
//! and turns each instruction into a transition formula: `v = rhs`
//! becomes `Eq(v, rhs)` (`FEq` for float-typed `v`), branch guards
//! become the branch condition or its negation, phis resolve against
//! the incoming edge. Pointer-flavored instructions are delegated to
//! the [`MemoryModel`].
//!
//! # Coercions
//!
//! The IR spells booleans as `i1`, the logic distinguishes `Bool` from
//! `Bv(1)`. [`as_bool`] and [`as_bv`] are the two canonical coercions;
//! both recognize their own output shape, so round-tripping a value
//! through them returns the original expression identity.

use tracing::trace;

use warden_core::{
    Context, ExprId, ExprKind, FloatPrecision, LiteralValue, RoundingMode, Type, TypeId, VarId,
    VariableAssignment,
};
use warden_ir::{
    BinOp, BlockId, CastOp, FCmpPred, Function, ICmpPred, Inst, InstKind, IrType, Module,
    Operand, Terminator, ValueId, NONDET_PREFIX, OVERFLOW_PREFIX,
};

use crate::error::CheckError;
use crate::memory::{MemOutcome, MemoryModel};

/// Translator configuration, set from the CLI flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct TranslateSettings {
    /// Model IR integers as mathematical integers instead of
    /// bitvectors (`-math-int`). Bitwise operations become unsupported.
    pub math_int: bool,
    /// Collapse float predicates assuming no NaN can occur
    /// (`-assume-no-nan` in the original tool).
    pub assume_no_nan: bool,
}

/// One encoded instruction: its transition formula, and the assignment
/// it performs, if it is an assignment.
pub struct Encoded {
    pub formula: ExprId,
    pub assignment: Option<VariableAssignment>,
}

impl Encoded {
    fn trivial(ctx: &mut Context) -> Encoded {
        Encoded {
            formula: ctx.true_expr(),
            assignment: None,
        }
    }
}

impl From<MemOutcome> for Encoded {
    fn from(outcome: MemOutcome) -> Encoded {
        Encoded {
            formula: outcome.formula,
            assignment: outcome.assignment,
        }
    }
}

/// Per-function translation state: the value-to-variable map plus the
/// memory model.
pub struct FunctionEncoder<'a> {
    ctx: Context,
    module: &'a Module,
    func: &'a Function,
    settings: TranslateSettings,
    memory: Box<dyn MemoryModel>,
    variables: Vec<Option<VarId>>,
    nondet: Vec<(String, VarId)>,
}

impl<'a> FunctionEncoder<'a> {
    /// Takes ownership of the context, declares a variable for every
    /// typed value of `func`, and lets the memory model register its
    /// own state.
    pub fn new(
        mut ctx: Context,
        module: &'a Module,
        func: &'a Function,
        mut memory: Box<dyn MemoryModel>,
        settings: TranslateSettings,
    ) -> Result<FunctionEncoder<'a>, CheckError> {
        let mut variables = vec![None; func.values.len()];
        for (index, info) in func.values.iter().enumerate() {
            let Some(ty) = semantic_type(&mut ctx, memory.as_mut(), info.ty, settings) else {
                continue;
            };
            let var = ctx
                .declare_variable(&info.name, ty)
                .map_err(|e| CheckError::Translation(e.to_string()))?;
            variables[index] = Some(var);
        }
        memory.initialize(&mut ctx, module, func)?;
        Ok(FunctionEncoder {
            ctx,
            module,
            func,
            settings,
            memory,
            variables,
            nondet: Vec::new(),
        })
    }

    /// The context variable backing an IR value, if it has one.
    pub fn variable(&self, value: ValueId) -> Option<VarId> {
        self.variables[value.0 as usize]
    }

    pub fn ctx(&mut self) -> &mut Context {
        &mut self.ctx
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn into_context(self) -> Context {
        self.ctx
    }

    /// Resets per-path state (memory version, nondet record) before
    /// encoding a path.
    pub fn begin_path(&mut self) {
        self.memory.begin_path(&mut self.ctx);
        self.nondet.clear();
    }

    /// Nondet producers consumed since the last [`begin_path`], in
    /// order.
    pub fn take_nondet(&mut self) -> Vec<(String, VarId)> {
        std::mem::take(&mut self.nondet)
    }

    // -----------------------------------------------------------------------
    // Instruction encoding
    // -----------------------------------------------------------------------

    /// Encodes one non-terminator instruction. `pred` names the edge a
    /// phi resolves against; every other instruction ignores it.
    pub fn encode_step(
        &mut self,
        inst: &Inst,
        pred: Option<BlockId>,
    ) -> Result<Encoded, CheckError> {
        match &inst.kind {
            InstKind::Binary {
                op,
                result,
                lhs,
                rhs,
                ..
            } => self.encode_binary(*op, *result, lhs, rhs),
            InstKind::ICmp {
                pred: cmp,
                result,
                lhs,
                rhs,
            } => self.encode_icmp(*cmp, *result, lhs, rhs),
            InstKind::FCmp {
                pred: cmp,
                result,
                lhs,
                rhs,
            } => self.encode_fcmp(*cmp, *result, lhs, rhs),
            InstKind::Select {
                result,
                cond,
                then_value,
                else_value,
            } => self.encode_select(*result, cond, then_value, else_value),
            InstKind::Cast { op, result, value } => self.encode_cast(*op, *result, value),
            InstKind::Phi { result, incoming } => {
                let pred = pred.ok_or_else(|| {
                    CheckError::Translation("phi encountered without a known predecessor".into())
                })?;
                self.encode_phi(*result, incoming, pred)
            }
            InstKind::Call {
                result,
                callee,
                args,
            } => self.encode_call(*result, callee, args),
            InstKind::Load { result, address } => {
                let address = self.operand(address)?;
                let var = self.require_var(*result)?;
                Ok(self.memory.handle_load(&mut self.ctx, var, address)?.into())
            }
            InstKind::Store { value, address } => {
                let value = self.operand(value)?;
                let address = self.operand(address)?;
                Ok(self.memory.handle_store(&mut self.ctx, value, address)?.into())
            }
            InstKind::Alloca { result, .. } => {
                let var = self.require_var(*result)?;
                Ok(self.memory.handle_alloca(&mut self.ctx, var)?.into())
            }
            InstKind::GetElementPtr {
                result,
                base,
                indices,
            } => {
                let base = self.operand(base)?;
                let indices = indices
                    .iter()
                    .map(|i| self.operand(i))
                    .collect::<Result<Vec<_>, _>>()?;
                let var = self.require_var(*result)?;
                Ok(self
                    .memory
                    .handle_getelementptr(&mut self.ctx, var, base, &indices)?
                    .into())
            }
            InstKind::PtrCast { result, value } => {
                let value = self.operand(value)?;
                let var = self.require_var(*result)?;
                Ok(self
                    .memory
                    .handle_pointer_cast(&mut self.ctx, var, value)?
                    .into())
            }
        }
    }

    /// Encodes the guard of the edge `terminator --succ_index--> _`.
    pub fn edge_guard(
        &mut self,
        terminator: &Terminator,
        succ_index: usize,
    ) -> Result<ExprId, CheckError> {
        match terminator {
            Terminator::Br { .. } => Ok(self.ctx.true_expr()),
            Terminator::CondBr { cond, .. } => {
                let cond = self.operand(cond)?;
                let cond = as_bool(&mut self.ctx, cond);
                match succ_index {
                    0 => Ok(cond),
                    1 => Ok(self.ctx.not(cond)),
                    other => Err(CheckError::Translation(format!(
                        "conditional branch has no successor {other}"
                    ))),
                }
            }
            Terminator::Switch {
                value,
                bits,
                cases,
                ..
            } => {
                let value = self.operand(value)?;
                if succ_index == 0 {
                    // The default edge: the value matches no case.
                    let mut guards = Vec::with_capacity(cases.len());
                    for (case, _) in cases {
                        let case = self.case_literal(*case, *bits);
                        guards.push(self.ctx.not_eq(value, case));
                    }
                    Ok(self.ctx.and_many(&guards))
                } else {
                    let (case, _) = cases.get(succ_index - 1).ok_or_else(|| {
                        CheckError::Translation(format!(
                            "switch has no successor {succ_index}"
                        ))
                    })?;
                    let case = self.case_literal(*case, *bits);
                    Ok(self.ctx.eq(value, case))
                }
            }
            Terminator::Ret { .. } | Terminator::Unreachable => Err(CheckError::Translation(
                "terminator has no outgoing edges".into(),
            )),
        }
    }

    // -----------------------------------------------------------------------
    // Per-shape encoders
    // -----------------------------------------------------------------------

    fn encode_binary(
        &mut self,
        op: BinOp,
        result: ValueId,
        lhs: &Operand,
        rhs: &Operand,
    ) -> Result<Encoded, CheckError> {
        let var = self.require_var(result)?;
        let lhs = self.operand(lhs)?;
        let rhs = self.operand(rhs)?;

        if op.is_float() {
            let rm = RoundingMode::NearestTiesToEven;
            let expr = match op {
                BinOp::FAdd => self.ctx.fadd(lhs, rhs, rm),
                BinOp::FSub => self.ctx.fsub(lhs, rhs, rm),
                BinOp::FMul => self.ctx.fmul(lhs, rhs, rm),
                _ => self.ctx.fdiv(lhs, rhs, rm),
            };
            return Ok(self.assign(var, expr));
        }

        if op.is_logic() && self.func.value_ty(result).is_i1() {
            let lhs = as_bool(&mut self.ctx, lhs);
            let rhs = as_bool(&mut self.ctx, rhs);
            let expr = match op {
                BinOp::And => self.ctx.and(lhs, rhs),
                BinOp::Or => self.ctx.or(lhs, rhs),
                _ => self.ctx.xor(lhs, rhs),
            };
            return Ok(self.assign(var, expr));
        }

        if self.settings.math_int {
            let expr = match op {
                BinOp::Add => int_binary(&mut self.ctx, lhs, rhs, Context::add),
                BinOp::Sub => int_binary(&mut self.ctx, lhs, rhs, Context::sub),
                BinOp::Mul => int_binary(&mut self.ctx, lhs, rhs, Context::mul),
                BinOp::SDiv => int_binary(&mut self.ctx, lhs, rhs, Context::sdiv),
                BinOp::SRem => int_binary(&mut self.ctx, lhs, rhs, Context::srem),
                other => {
                    return Err(CheckError::Unsupported(format!(
                        "'{}' under -math-int",
                        other.mnemonic()
                    )))
                }
            };
            return Ok(self.assign(var, expr));
        }

        let width = self
            .func
            .value_ty(result)
            .int_bits()
            .ok_or_else(|| CheckError::Translation("arithmetic on non-integer value".into()))?;
        let lhs = as_bv(&mut self.ctx, lhs, width);
        let rhs = as_bv(&mut self.ctx, rhs, width);
        let expr = match op {
            BinOp::Add => self.ctx.add(lhs, rhs),
            BinOp::Sub => self.ctx.sub(lhs, rhs),
            BinOp::Mul => self.ctx.mul(lhs, rhs),
            BinOp::SDiv => self.ctx.sdiv(lhs, rhs),
            BinOp::UDiv => self.ctx.udiv(lhs, rhs),
            BinOp::SRem => self.ctx.srem(lhs, rhs),
            BinOp::URem => self.ctx.urem(lhs, rhs),
            BinOp::Shl => self.ctx.shl(lhs, rhs),
            BinOp::LShr => self.ctx.lshr(lhs, rhs),
            BinOp::AShr => self.ctx.ashr(lhs, rhs),
            BinOp::And => self.ctx.band(lhs, rhs),
            BinOp::Or => self.ctx.bor(lhs, rhs),
            BinOp::Xor => self.ctx.bxor(lhs, rhs),
            BinOp::FAdd | BinOp::FSub | BinOp::FMul | BinOp::FDiv => unreachable!(),
        };
        Ok(self.assign(var, expr))
    }

    fn encode_icmp(
        &mut self,
        pred: ICmpPred,
        result: ValueId,
        lhs: &Operand,
        rhs: &Operand,
    ) -> Result<Encoded, CheckError> {
        let var = self.require_var(result)?;
        let mut lhs = self.operand(lhs)?;
        let mut rhs = self.operand(rhs)?;

        // Ordered predicates on i1 need the one-bit vector view;
        // equality works on `Bool` directly.
        let bool_operands = self.ctx.ty(self.ctx.expr_ty(lhs)).is_bool();
        if bool_operands && !matches!(pred, ICmpPred::Eq | ICmpPred::Ne) {
            lhs = as_bv(&mut self.ctx, lhs, 1);
            rhs = as_bv(&mut self.ctx, rhs, 1);
        }

        if self.ctx.ty(self.ctx.expr_ty(lhs)).is_int() {
            if matches!(
                pred,
                ICmpPred::Ugt | ICmpPred::Uge | ICmpPred::Ult | ICmpPred::Ule
            ) {
                return Err(CheckError::Unsupported(format!(
                    "unsigned comparison '{}' under -math-int",
                    pred.mnemonic()
                )));
            }
        }

        let expr = match pred {
            ICmpPred::Eq => self.ctx.eq(lhs, rhs),
            ICmpPred::Ne => self.ctx.not_eq(lhs, rhs),
            ICmpPred::Ugt => self.ctx.ugt(lhs, rhs),
            ICmpPred::Uge => self.ctx.ugt_eq(lhs, rhs),
            ICmpPred::Ult => self.ctx.ult(lhs, rhs),
            ICmpPred::Ule => self.ctx.ult_eq(lhs, rhs),
            ICmpPred::Sgt => self.ctx.sgt(lhs, rhs),
            ICmpPred::Sge => self.ctx.sgt_eq(lhs, rhs),
            ICmpPred::Slt => self.ctx.slt(lhs, rhs),
            ICmpPred::Sle => self.ctx.slt_eq(lhs, rhs),
        };
        Ok(self.assign(var, expr))
    }

    fn encode_fcmp(
        &mut self,
        pred: FCmpPred,
        result: ValueId,
        lhs: &Operand,
        rhs: &Operand,
    ) -> Result<Encoded, CheckError> {
        let var = self.require_var(result)?;
        let lhs = self.operand(lhs)?;
        let rhs = self.operand(rhs)?;

        let core = match pred {
            FCmpPred::Oeq | FCmpPred::Ueq => Some(self.ctx.f_eq(lhs, rhs)),
            FCmpPred::Ogt | FCmpPred::Ugt => Some(self.ctx.f_gt(lhs, rhs)),
            FCmpPred::Oge | FCmpPred::Uge => Some(self.ctx.f_gt_eq(lhs, rhs)),
            FCmpPred::Olt | FCmpPred::Ult => Some(self.ctx.f_lt(lhs, rhs)),
            FCmpPred::Ole | FCmpPred::Ule => Some(self.ctx.f_lt_eq(lhs, rhs)),
            FCmpPred::One | FCmpPred::Une => {
                let eq = self.ctx.f_eq(lhs, rhs);
                Some(self.ctx.not(eq))
            }
            _ => None,
        };

        let expr = if pred == FCmpPred::False {
            self.ctx.false_expr()
        } else if pred == FCmpPred::True {
            self.ctx.true_expr()
        } else if self.settings.assume_no_nan {
            match pred {
                FCmpPred::Ord => self.ctx.true_expr(),
                FCmpPred::Uno => self.ctx.false_expr(),
                _ => core.expect("core comparison exists for non-ord predicates"),
            }
        } else if pred == FCmpPred::Ord {
            let l = self.ctx.f_is_nan(lhs);
            let r = self.ctx.f_is_nan(rhs);
            let nl = self.ctx.not(l);
            let nr = self.ctx.not(r);
            self.ctx.and(nl, nr)
        } else if pred == FCmpPred::Uno {
            let l = self.ctx.f_is_nan(lhs);
            let r = self.ctx.f_is_nan(rhs);
            self.ctx.or(l, r)
        } else if pred.is_ordered() {
            // An ordered comparison can only hold without NaN operands.
            let l = self.ctx.f_is_nan(lhs);
            let r = self.ctx.f_is_nan(rhs);
            let nl = self.ctx.not(l);
            let nr = self.ctx.not(r);
            let core = core.expect("ordered predicate has a core comparison");
            self.ctx.and_many(&[nl, nr, core])
        } else {
            // An unordered comparison also holds when an operand is NaN.
            let l = self.ctx.f_is_nan(lhs);
            let r = self.ctx.f_is_nan(rhs);
            let core = core.expect("unordered predicate has a core comparison");
            self.ctx.or_many(&[l, r, core])
        };

        Ok(self.assign(var, expr))
    }

    fn encode_select(
        &mut self,
        result: ValueId,
        cond: &Operand,
        then_value: &Operand,
        else_value: &Operand,
    ) -> Result<Encoded, CheckError> {
        let var = self.require_var(result)?;
        let ty = self.ctx.var(var).ty();
        let cond = self.operand(cond)?;
        let cond = as_bool(&mut self.ctx, cond);
        let then_value = self.operand(then_value)?;
        let then_value = cast_result(&mut self.ctx, then_value, ty);
        let else_value = self.operand(else_value)?;
        let else_value = cast_result(&mut self.ctx, else_value, ty);
        let expr = self.ctx.select(cond, then_value, else_value);
        Ok(self.assign(var, expr))
    }

    fn encode_cast(
        &mut self,
        op: CastOp,
        result: ValueId,
        value: &Operand,
    ) -> Result<Encoded, CheckError> {
        let var = self.require_var(result)?;
        let value = self.operand(value)?;

        if self.settings.math_int && self.ctx.ty(self.ctx.expr_ty(value)).is_int() {
            // Widening is the identity on mathematical integers;
            // truncation has no faithful rendition.
            return match op {
                CastOp::ZExt | CastOp::SExt => Ok(self.assign(var, value)),
                CastOp::Trunc => Err(CheckError::Unsupported("'trunc' under -math-int".into())),
            };
        }

        let from_width = match *self.ctx.ty(self.ctx.expr_ty(value)) {
            Type::Bool => 1,
            Type::Bv { width } => width,
            ref other => {
                return Err(CheckError::Unsupported(format!(
                    "integer cast from {other:?}"
                )))
            }
        };
        let int_op = as_bv(&mut self.ctx, value, from_width);

        let target = self.ctx.var(var).ty();
        let expr = match *self.ctx.ty(target) {
            Type::Bool => {
                // trunc to i1 keeps the low bit.
                let bit = self.ctx.extract(int_op, 0, 1);
                as_bool(&mut self.ctx, bit)
            }
            Type::Bv { width } => match op {
                CastOp::ZExt => self.ctx.zext(int_op, width),
                CastOp::SExt => self.ctx.sext(int_op, width),
                CastOp::Trunc => self.ctx.trunc(int_op, width),
            },
            ref other => {
                return Err(CheckError::Unsupported(format!(
                    "integer cast to {other:?}"
                )))
            }
        };
        Ok(self.assign(var, expr))
    }

    fn encode_phi(
        &mut self,
        result: ValueId,
        incoming: &[(Operand, BlockId)],
        pred: BlockId,
    ) -> Result<Encoded, CheckError> {
        let var = self.require_var(result)?;
        let (value, _) = incoming
            .iter()
            .find(|(_, block)| *block == pred)
            .ok_or_else(|| {
                CheckError::Translation(format!(
                    "phi has no incoming value for predecessor '{}'",
                    self.func.block(pred).label
                ))
            })?;
        let ty = self.ctx.var(var).ty();
        let value = self.operand(value)?;
        let value = cast_result(&mut self.ctx, value, ty);
        Ok(self.assign(var, value))
    }

    fn encode_call(
        &mut self,
        result: Option<ValueId>,
        callee: &str,
        args: &[Operand],
    ) -> Result<Encoded, CheckError> {
        if warden_ir::ERROR_FUNCTIONS.contains(&callee) {
            // Error sinks are rewritten by the instrumentation pass; a
            // residual call is a no-op here.
            return Ok(Encoded::trivial(&mut self.ctx));
        }

        if let Some(rest) = callee.strip_prefix(OVERFLOW_PREFIX) {
            let result = result.ok_or_else(|| {
                CheckError::Translation("overflow predicate call without a result".into())
            })?;
            return self.encode_overflow_predicate(rest, result, args);
        }

        if self.module.is_defined(callee) {
            return Err(CheckError::Unsupported(format!(
                "call to defined function '@{callee}' (inline functions before verification)"
            )));
        }

        if let Some(result) = result {
            let var = self.require_var(result)?;
            if callee.starts_with(NONDET_PREFIX) {
                trace!(callee, "nondet input");
                self.nondet.push((callee.to_string(), var));
                return Ok(Encoded::trivial(&mut self.ctx));
            }
            // Unknown external with a result: delegate, leaving the
            // result unconstrained unless the memory model knows better.
            return Ok(self.memory.handle_call(&mut self.ctx, Some(var))?.into());
        }

        Ok(self.memory.handle_call(&mut self.ctx, None)?.into())
    }

    /// Encodes `warden.overflow.<op>.i<N>(a, b)`: the result is `true`
    /// iff the operation does NOT wrap, checked by redoing it at double
    /// width.
    fn encode_overflow_predicate(
        &mut self,
        name: &str,
        result: ValueId,
        args: &[Operand],
    ) -> Result<Encoded, CheckError> {
        let var = self.require_var(result)?;
        let (op_name, width) = name
            .split_once(".i")
            .and_then(|(op, w)| w.parse::<u32>().ok().map(|w| (op, w)))
            .ok_or_else(|| {
                CheckError::Translation(format!("malformed overflow intrinsic '{name}'"))
            })?;
        if width > 64 {
            return Err(CheckError::Unsupported(format!(
                "overflow predicate on i{width}"
            )));
        }
        let signed = match op_name {
            "sadd" | "ssub" | "smul" => true,
            "uadd" | "usub" | "umul" => false,
            other => {
                return Err(CheckError::Translation(format!(
                    "unknown overflow operation '{other}'"
                )))
            }
        };
        if args.len() != 2 {
            return Err(CheckError::Translation(
                "overflow predicate takes two operands".into(),
            ));
        }

        // Mathematical integers never wrap: the predicate is trivially
        // satisfied under -math-int.
        if self.settings.math_int {
            let t = self.ctx.true_expr();
            return Ok(self.assign(var, t));
        }

        let lhs = self.operand(&args[0])?;
        let lhs = as_bv(&mut self.ctx, lhs, width);
        let rhs = self.operand(&args[1])?;
        let rhs = as_bv(&mut self.ctx, rhs, width);

        let wide = width * 2;
        let extend = |ctx: &mut Context, e: ExprId| {
            if signed {
                ctx.sext(e, wide)
            } else {
                ctx.zext(e, wide)
            }
        };
        let wl = extend(&mut self.ctx, lhs);
        let wr = extend(&mut self.ctx, rhs);
        let (exact, wrapped) = match op_name {
            "sadd" | "uadd" => (self.ctx.add(wl, wr), self.ctx.add(lhs, rhs)),
            "ssub" | "usub" => (self.ctx.sub(wl, wr), self.ctx.sub(lhs, rhs)),
            _ => (self.ctx.mul(wl, wr), self.ctx.mul(lhs, rhs)),
        };
        let rewidened = extend(&mut self.ctx, wrapped);
        let ok = self.ctx.eq(exact, rewidened);
        Ok(self.assign(var, ok))
    }

    // -----------------------------------------------------------------------
    // Operands and helpers
    // -----------------------------------------------------------------------

    /// Translates an operand reference into an expression.
    pub fn operand(&mut self, op: &Operand) -> Result<ExprId, CheckError> {
        match op {
            Operand::Value(v) => {
                let var = self.require_var(*v)?;
                Ok(self.ctx.var_ref(var))
            }
            Operand::ConstInt { bits: 1, value } => Ok(self.ctx.bool_lit(*value != 0)),
            Operand::ConstInt { bits, value } => {
                if self.settings.math_int {
                    let signed = LiteralValue::bv(*bits, *value)
                        .as_signed()
                        .expect("bitvector literal has a signed view");
                    Ok(self.ctx.int_lit(signed))
                } else {
                    Ok(self.ctx.bv_lit(*value, *bits))
                }
            }
            Operand::ConstFloat { double: true, bits } => {
                Ok(self.ctx.float_lit(FloatPrecision::Double, *bits as u128))
            }
            Operand::ConstFloat {
                double: false,
                bits,
            } => Ok(self.ctx.float_lit(FloatPrecision::Single, *bits as u128)),
            Operand::Global(name) => self.memory.global_address(&mut self.ctx, name),
            Operand::NullPtr => Ok(self.memory.null_pointer(&mut self.ctx)),
            Operand::Undef(ty) => {
                let ty = semantic_type(&mut self.ctx, self.memory.as_mut(), *ty, self.settings)
                    .ok_or_else(|| {
                        CheckError::Translation("undef of void type".into())
                    })?;
                Ok(self.ctx.undef(ty))
            }
        }
    }

    fn case_literal(&mut self, case: u128, bits: u32) -> ExprId {
        if self.settings.math_int {
            let signed = LiteralValue::bv(bits, case)
                .as_signed()
                .expect("bitvector literal has a signed view");
            self.ctx.int_lit(signed)
        } else {
            self.ctx.bv_lit(case, bits)
        }
    }

    fn require_var(&self, value: ValueId) -> Result<VarId, CheckError> {
        self.variables[value.0 as usize].ok_or_else(|| {
            CheckError::Translation(format!(
                "value '%{}' has no variable (void-typed?)",
                self.func.value(value).name
            ))
        })
    }

    /// `var = expr`, with `FEq` for float-typed variables.
    fn assign(&mut self, var: VarId, expr: ExprId) -> Encoded {
        let var_ref = self.ctx.var_ref(var);
        let formula = if self.ctx.ty(self.ctx.expr_ty(var_ref)).is_float() {
            self.ctx.f_eq(var_ref, expr)
        } else {
            self.ctx.eq(var_ref, expr)
        };
        Encoded {
            formula,
            assignment: Some(VariableAssignment::new(&self.ctx, var, expr)),
        }
    }
}

/// Maps an IR type to its semantic type: `i1` is `Bool`, `iN` is
/// `Bv(N)` (or `Int` under `-math-int`), floats map by precision,
/// pointers are the memory model's choice. `None` for `void`.
pub fn semantic_type(
    ctx: &mut Context,
    memory: &mut dyn MemoryModel,
    ty: IrType,
    settings: TranslateSettings,
) -> Option<TypeId> {
    match ty {
        IrType::Int { bits: 1 } => Some(TypeId::BOOL),
        IrType::Int { bits } => {
            if settings.math_int {
                Some(TypeId::INT)
            } else {
                Some(ctx.bv_type(bits))
            }
        }
        IrType::Float32 => Some(TypeId::FLOAT_SINGLE),
        IrType::Float64 => Some(TypeId::FLOAT_DOUBLE),
        IrType::Ptr => Some(memory.pointer_type(ctx)),
        IrType::Void => None,
    }
}

/// Coerces an expression to `Bool`: the identity on booleans, `e ≠ 0`
/// on bitvectors (and on mathematical integers under `-math-int`).
///
/// Recognizes the output of [`as_bv`] so the round trip
/// `as_bool(as_bv(e, w))` returns `e` itself.
///
/// # Panics
///
/// On operands that are neither boolean nor numeric; such a call is a
/// translator bug.
pub fn as_bool(ctx: &mut Context, e: ExprId) -> ExprId {
    match *ctx.ty(ctx.expr_ty(e)) {
        Type::Bool => e,
        Type::Bv { width } => {
            let select_parts = {
                let node = ctx.expr(e);
                if node.kind == ExprKind::Select {
                    Some((node.operand(0), node.operand(1), node.operand(2)))
                } else {
                    None
                }
            };
            if let Some((cond, then_e, else_e)) = select_parts {
                let then_is_one =
                    ctx.literal(then_e).and_then(LiteralValue::as_bv) == Some((width, 1));
                let else_is_zero =
                    ctx.literal(else_e).and_then(LiteralValue::as_bv) == Some((width, 0));
                if then_is_one && else_is_zero && ctx.ty(ctx.expr_ty(cond)).is_bool() {
                    return cond;
                }
            }
            let zero = ctx.bv_lit(0, width);
            ctx.not_eq(e, zero)
        }
        Type::Int => {
            let zero = ctx.int_lit(0);
            ctx.not_eq(e, zero)
        }
        ref other => panic!("as_bool applied to {other:?}-typed expression"),
    }
}

/// Coerces an expression to `Bv(width)`: the identity on same-width
/// bitvectors, `Select(e, 1, 0)` on booleans.
///
/// Recognizes the output of [`as_bool`] at width 1 so the round trip
/// `as_bv(as_bool(e), 1)` returns `e` itself.
///
/// # Panics
///
/// On a width mismatch or non-boolean, non-bitvector operand.
pub fn as_bv(ctx: &mut Context, e: ExprId, width: u32) -> ExprId {
    match *ctx.ty(ctx.expr_ty(e)) {
        Type::Bv { width: w } if w == width => e,
        Type::Bool => {
            if width == 1 {
                let noteq_parts = {
                    let node = ctx.expr(e);
                    if node.kind == ExprKind::NotEq {
                        Some((node.operand(0), node.operand(1)))
                    } else {
                        None
                    }
                };
                if let Some((lhs, rhs)) = noteq_parts {
                    let zero = Some((1u32, 0u128));
                    if ctx.literal(rhs).and_then(LiteralValue::as_bv) == zero
                        && ctx.ty(ctx.expr_ty(lhs)).bv_width() == Some(1)
                    {
                        return lhs;
                    }
                    if ctx.literal(lhs).and_then(LiteralValue::as_bv) == zero
                        && ctx.ty(ctx.expr_ty(rhs)).bv_width() == Some(1)
                    {
                        return rhs;
                    }
                }
            }
            let one = ctx.bv_lit(1, width);
            let zero = ctx.bv_lit(0, width);
            ctx.select(e, one, zero)
        }
        ref other => panic!("as_bv({width}) applied to {other:?}-typed expression"),
    }
}

/// Dispatches into [`as_bool`] / [`as_bv`] according to the target
/// type. Float and array targets must already match exactly.
pub fn cast_result(ctx: &mut Context, e: ExprId, ty: TypeId) -> ExprId {
    match *ctx.ty(ty) {
        Type::Bool => as_bool(ctx, e),
        Type::Bv { width } => as_bv(ctx, e, width),
        Type::Int => match ctx.ty(ctx.expr_ty(e)) {
            Type::Int => e,
            Type::Bool => {
                let one = ctx.int_lit(1);
                let zero = ctx.int_lit(0);
                ctx.select(e, one, zero)
            }
            other => panic!("cannot cast {other:?}-typed expression to Int"),
        },
        _ => {
            assert!(
                ctx.expr_ty(e) == ty,
                "cast_result to {} requires matching operand type",
                ctx.type_name(ty)
            );
            e
        }
    }
}

fn int_binary(
    ctx: &mut Context,
    lhs: ExprId,
    rhs: ExprId,
    op: fn(&mut Context, ExprId, ExprId) -> ExprId,
) -> ExprId {
    let lhs = cast_result(ctx, lhs, TypeId::INT);
    let rhs = cast_result(ctx, rhs, TypeId::INT);
    op(ctx, lhs, rhs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SimpleMemoryModel;
    use warden_ir::parse_module;

    fn encode_main(
        source: &str,
        settings: TranslateSettings,
    ) -> (Context, Vec<Result<Encoded, CheckError>>) {
        let module = parse_module(source).unwrap();
        let func = module.function("main").unwrap();
        let mut encoder = FunctionEncoder::new(
            Context::new(),
            &module,
            func,
            Box::new(SimpleMemoryModel::new()),
            settings,
        )
        .unwrap();
        encoder.begin_path();
        let results: Vec<_> = func
            .block(func.entry())
            .insts
            .iter()
            .map(|inst| encoder.encode_step(inst, None))
            .collect();
        (encoder.into_context(), results)
    }

    #[test]
    fn arithmetic_assignment_shape() {
        let src = r#"
define i32 @main(i32 %a, i32 %b) {
entry:
  %c = add i32 %a, %b
  ret i32 %c
}
"#;
        let (ctx, results) = encode_main(src, TranslateSettings::default());
        let encoded = results.into_iter().next().unwrap().unwrap();
        assert_eq!(
            ctx.display(encoded.formula).to_string(),
            "Eq(c, Add(a, b))"
        );
        assert!(encoded.assignment.is_some());
    }

    #[test]
    fn one_bit_logic_uses_boolean_connectives() {
        let src = r#"
define i1 @main(i1 %p, i1 %q) {
entry:
  %r = and i1 %p, %q
  %s = xor i1 %r, true
  ret i1 %s
}
"#;
        let (ctx, results) = encode_main(src, TranslateSettings::default());
        let and = results[0].as_ref().unwrap();
        assert_eq!(ctx.display(and.formula).to_string(), "Eq(r, And(p, q))");
        // xor with true folds to a negation.
        let xor = results[1].as_ref().unwrap();
        assert_eq!(ctx.display(xor.formula).to_string(), "Eq(s, Not(r))");
    }

    #[test]
    fn wide_logic_uses_bitvector_ops() {
        let src = r#"
define i8 @main(i8 %p, i8 %q) {
entry:
  %r = and i8 %p, %q
  ret i8 %r
}
"#;
        let (ctx, results) = encode_main(src, TranslateSettings::default());
        let and = results[0].as_ref().unwrap();
        assert_eq!(ctx.display(and.formula).to_string(), "Eq(r, BAnd(p, q))");
    }

    #[test]
    fn icmp_follows_the_predicate_table() {
        let src = r#"
define void @main(i32 %a, i32 %b) {
entry:
  %c1 = icmp eq i32 %a, %b
  %c2 = icmp ne i32 %a, %b
  %c3 = icmp ugt i32 %a, %b
  %c4 = icmp uge i32 %a, %b
  %c5 = icmp ult i32 %a, %b
  %c6 = icmp ule i32 %a, %b
  %c7 = icmp sgt i32 %a, %b
  %c8 = icmp sge i32 %a, %b
  %c9 = icmp slt i32 %a, %b
  %c10 = icmp sle i32 %a, %b
  ret void
}
"#;
        let (ctx, results) = encode_main(src, TranslateSettings::default());
        let shapes: Vec<String> = results
            .iter()
            .map(|r| ctx.display(r.as_ref().unwrap().formula).to_string())
            .collect();
        assert_eq!(
            shapes,
            vec![
                "Eq(c1, Eq(a, b))",
                "Eq(c2, NotEq(a, b))",
                "Eq(c3, UGt(a, b))",
                "Eq(c4, UGtEq(a, b))",
                "Eq(c5, ULt(a, b))",
                "Eq(c6, ULtEq(a, b))",
                "Eq(c7, SGt(a, b))",
                "Eq(c8, SGtEq(a, b))",
                "Eq(c9, SLt(a, b))",
                "Eq(c10, SLtEq(a, b))",
            ]
        );
    }

    #[test]
    fn ordered_fcmp_requires_nan_freedom() {
        let src = r#"
define void @main(double %x, double %y) {
entry:
  %c = fcmp olt double %x, %y
  ret void
}
"#;
        let (ctx, results) = encode_main(src, TranslateSettings::default());
        let formula = ctx.display(results[0].as_ref().unwrap().formula).to_string();
        assert_eq!(
            formula,
            "Eq(c, And(Not(FIsNan(x)), Not(FIsNan(y)), FLt(x, y)))"
        );
    }

    #[test]
    fn unordered_fcmp_admits_nan() {
        let src = r#"
define void @main(double %x, double %y) {
entry:
  %c = fcmp une double %x, %y
  ret void
}
"#;
        let (ctx, results) = encode_main(src, TranslateSettings::default());
        let formula = ctx.display(results[0].as_ref().unwrap().formula).to_string();
        assert_eq!(
            formula,
            "Eq(c, Or(FIsNan(x), FIsNan(y), Not(FEq(x, y))))"
        );
    }

    #[test]
    fn assume_no_nan_collapses_predicates() {
        let src = r#"
define void @main(double %x, double %y) {
entry:
  %c1 = fcmp ord double %x, %y
  %c2 = fcmp uno double %x, %y
  %c3 = fcmp ult double %x, %y
  ret void
}
"#;
        let settings = TranslateSettings {
            assume_no_nan: true,
            ..Default::default()
        };
        let (ctx, results) = encode_main(src, settings);
        let shapes: Vec<String> = results
            .iter()
            .map(|r| ctx.display(r.as_ref().unwrap().formula).to_string())
            .collect();
        assert_eq!(
            shapes,
            vec!["Eq(c1, true)", "Eq(c2, false)", "Eq(c3, FLt(x, y))"]
        );
    }

    #[test]
    fn float_assignment_uses_float_equality() {
        let src = r#"
define double @main(double %x) {
entry:
  %y = fadd double %x, 1.5
  ret double %y
}
"#;
        let (ctx, results) = encode_main(src, TranslateSettings::default());
        let formula = ctx.display(results[0].as_ref().unwrap().formula).to_string();
        assert_eq!(formula, "FEq(y, FAdd[RNE](x, 1.5f64))");
    }

    #[test]
    fn casts_map_to_extend_and_extract() {
        let src = r#"
define void @main(i8 %a, i32 %b) {
entry:
  %w = zext i8 %a to i32
  %s = sext i8 %a to i32
  %t = trunc i32 %b to i8
  ret void
}
"#;
        let (ctx, results) = encode_main(src, TranslateSettings::default());
        let shapes: Vec<String> = results
            .iter()
            .map(|r| ctx.display(r.as_ref().unwrap().formula).to_string())
            .collect();
        assert_eq!(
            shapes,
            vec![
                "Eq(w, ZExt(a, Bv32))",
                "Eq(s, SExt(a, Bv32))",
                "Eq(t, Extract(b, 0, 8))",
            ]
        );
    }

    #[test]
    fn nondet_calls_leave_the_result_free() {
        let src = r#"
define i32 @main() {
entry:
  %a = call i32 @__VERIFIER_nondet_int()
  ret i32 %a
}

declare i32 @__VERIFIER_nondet_int()
"#;
        let (ctx, results) = encode_main(src, TranslateSettings::default());
        let encoded = results.into_iter().next().unwrap().unwrap();
        assert_eq!(ctx.display(encoded.formula).to_string(), "true");
        assert!(encoded.assignment.is_none());
    }

    #[test]
    fn calls_to_defined_functions_are_unsupported() {
        let src = r#"
define i32 @helper() {
entry:
  ret i32 1
}

define i32 @main() {
entry:
  %a = call i32 @helper()
  ret i32 %a
}
"#;
        let module = parse_module(src).unwrap();
        let func = module.function("main").unwrap();
        let mut encoder = FunctionEncoder::new(
            Context::new(),
            &module,
            func,
            Box::new(SimpleMemoryModel::new()),
            TranslateSettings::default(),
        )
        .unwrap();
        encoder.begin_path();
        let result = encoder.encode_step(&func.block(func.entry()).insts[0], None);
        assert!(matches!(result, Err(CheckError::Unsupported(_))));
    }

    #[test]
    fn overflow_predicate_encodes_double_width_check() {
        let src = r#"
define void @main(i32 %a, i32 %b) {
entry:
  %ok = call i1 @warden.overflow.sadd.i32(i32 %a, i32 %b)
  ret void
}
"#;
        let (ctx, results) = encode_main(src, TranslateSettings::default());
        let formula = ctx.display(results[0].as_ref().unwrap().formula).to_string();
        assert_eq!(
            formula,
            "Eq(ok, Eq(Add(SExt(a, Bv64), SExt(b, Bv64)), SExt(Add(a, b), Bv64)))"
        );
    }

    #[test]
    fn coercion_round_trips_are_identities() {
        let mut ctx = Context::new();
        let b = ctx.declare_variable("b", TypeId::BOOL).unwrap();
        let b = ctx.var_ref(b);
        let bv1_ty = ctx.bv_type(1);
        let x = ctx.declare_variable("x", bv1_ty).unwrap();
        let x = ctx.var_ref(x);
        let bv8_ty = ctx.bv_type(8);
        let y = ctx.declare_variable("y", bv8_ty).unwrap();
        let y = ctx.var_ref(y);

        // as_bool(as_bv(e, w)) == e for boolean e.
        let as_vec = as_bv(&mut ctx, b, 8);
        assert_eq!(as_bool(&mut ctx, as_vec), b);

        // as_bv(as_bool(e), 1) == e for 1-bit e.
        let as_b = as_bool(&mut ctx, x);
        assert_eq!(as_bv(&mut ctx, as_b, 1), x);

        // as_bv on a same-width vector is the identity.
        assert_eq!(as_bv(&mut ctx, y, 8), y);
    }

    #[test]
    fn math_int_models_integers_mathematically() {
        let src = r#"
define i32 @main(i32 %a) {
entry:
  %b = add i32 %a, 1
  ret i32 %b
}
"#;
        let settings = TranslateSettings {
            math_int: true,
            ..Default::default()
        };
        let (ctx, results) = encode_main(src, settings);
        let formula = ctx.display(results[0].as_ref().unwrap().formula).to_string();
        assert_eq!(formula, "Eq(b, Add(a, 1))");
        let a = ctx.lookup_variable("a").unwrap();
        assert_eq!(ctx.var(a).ty(), TypeId::INT);
    }

    #[test]
    fn translation_is_deterministic() {
        // Two fresh contexts over the same module produce identity-equal
        // DAGs: same expression ids, same arena size.
        let src = r#"
define i32 @main(i32 %a, i32 %b) {
entry:
  %c = add i32 %a, %b
  %d = icmp slt i32 %c, %a
  %e = select i1 %d, i32 %a, i32 %c
  ret i32 %e
}
"#;
        let (ctx1, results1) = encode_main(src, TranslateSettings::default());
        let (ctx2, results2) = encode_main(src, TranslateSettings::default());

        let ids1: Vec<_> = results1.iter().map(|r| r.as_ref().unwrap().formula).collect();
        let ids2: Vec<_> = results2.iter().map(|r| r.as_ref().unwrap().formula).collect();
        assert_eq!(ids1, ids2);
        assert_eq!(ctx1.expr_count(), ctx2.expr_count());
    }

    #[test]
    fn math_int_rejects_bitwise_ops() {
        let src = r#"
define i32 @main(i32 %a) {
entry:
  %b = shl i32 %a, 1
  ret i32 %b
}
"#;
        let settings = TranslateSettings {
            math_int: true,
            ..Default::default()
        };
        let (_, results) = encode_main(src, settings);
        assert!(matches!(
            results.into_iter().next().unwrap(),
            Err(CheckError::Unsupported(_))
        ));
    }
}
