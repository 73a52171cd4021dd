//! Simplifying expression builder.
//!
//! These methods on [`Context`] are the only public way to create
//! expressions. Every constructor:
//!
//! 1. type-checks its operands against the per-kind invariants
//!    (violations are programmer errors and panic),
//! 2. folds literal operands with bit-exact semantics,
//! 3. applies a bounded set of algebraic identities (`Not(Not x) = x`,
//!    `And`/`Or` flattening and unit elimination, `Xor` with a constant,
//!    `Eq(x, x)` for pure atoms, `Select` on a constant condition,
//!    `Extract(e, 0, width(e)) = e`, read-over-write on arrays).
//!
//! Correctness never depends on a fold firing; everything not listed
//! here is left symbolic.

use smallvec::{smallvec, SmallVec};

use crate::context::Context;
use crate::expr::{ExprId, ExprKind};
use crate::literal::{
    self, FloatArithOp, FloatCmpOp, FloatPrecision, LiteralValue, RoundingMode,
};
use crate::types::{Type, TypeId};

impl Context {
    // -----------------------------------------------------------------------
    // Literals and nullary expressions
    // -----------------------------------------------------------------------

    /// Interns a literal expression of the value's type.
    pub fn lit(&mut self, value: LiteralValue) -> ExprId {
        let ty = self.literal_type(&value);
        self.intern(ExprKind::Literal(value), ty, SmallVec::new())
    }

    pub fn true_expr(&mut self) -> ExprId {
        self.lit(LiteralValue::Bool(true))
    }

    pub fn false_expr(&mut self) -> ExprId {
        self.lit(LiteralValue::Bool(false))
    }

    pub fn bool_lit(&mut self, value: bool) -> ExprId {
        self.lit(LiteralValue::Bool(value))
    }

    pub fn bv_lit(&mut self, bits: u128, width: u32) -> ExprId {
        self.lit(LiteralValue::bv(width, bits))
    }

    pub fn int_lit(&mut self, value: i128) -> ExprId {
        self.lit(LiteralValue::Int(value))
    }

    pub fn float_lit(&mut self, precision: FloatPrecision, bits: u128) -> ExprId {
        self.lit(LiteralValue::Float { precision, bits })
    }

    /// The (per-type unique) undefined value.
    pub fn undef(&mut self, ty: TypeId) -> ExprId {
        self.intern(ExprKind::Undef, ty, SmallVec::new())
    }

    // -----------------------------------------------------------------------
    // Boolean connectives
    // -----------------------------------------------------------------------

    pub fn not(&mut self, op: ExprId) -> ExprId {
        self.check_bool(op, "Not");
        if let Some(b) = self.literal(op).and_then(LiteralValue::as_bool) {
            return self.bool_lit(!b);
        }
        if self.expr(op).kind == ExprKind::Not {
            return self.expr(op).operand(0);
        }
        self.intern(ExprKind::Not, TypeId::BOOL, smallvec![op])
    }

    pub fn and(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.and_many(&[left, right])
    }

    /// N-ary conjunction in normal form: nested `And`s are flattened,
    /// `true` operands dropped, any `false` short-circuits. Zero
    /// operands yield `true`, one yields the operand itself.
    pub fn and_many(&mut self, ops: &[ExprId]) -> ExprId {
        let mut flat: SmallVec<[ExprId; 2]> = SmallVec::with_capacity(ops.len());
        for &op in ops {
            self.check_bool(op, "And");
            let node = self.expr(op);
            match &node.kind {
                ExprKind::Literal(LiteralValue::Bool(false)) => return self.false_expr(),
                ExprKind::Literal(LiteralValue::Bool(true)) => {}
                ExprKind::And => flat.extend(node.operands.iter().copied()),
                _ => flat.push(op),
            }
        }
        match flat.len() {
            0 => self.true_expr(),
            1 => flat[0],
            _ => self.intern(ExprKind::And, TypeId::BOOL, flat),
        }
    }

    pub fn or(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.or_many(&[left, right])
    }

    /// N-ary disjunction, symmetric with [`and_many`](Self::and_many).
    pub fn or_many(&mut self, ops: &[ExprId]) -> ExprId {
        let mut flat: SmallVec<[ExprId; 2]> = SmallVec::with_capacity(ops.len());
        for &op in ops {
            self.check_bool(op, "Or");
            let node = self.expr(op);
            match &node.kind {
                ExprKind::Literal(LiteralValue::Bool(true)) => return self.true_expr(),
                ExprKind::Literal(LiteralValue::Bool(false)) => {}
                ExprKind::Or => flat.extend(node.operands.iter().copied()),
                _ => flat.push(op),
            }
        }
        match flat.len() {
            0 => self.false_expr(),
            1 => flat[0],
            _ => self.intern(ExprKind::Or, TypeId::BOOL, flat),
        }
    }

    pub fn xor(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.check_bool(left, "Xor");
        self.check_bool(right, "Xor");
        match self.literal(left).and_then(LiteralValue::as_bool) {
            Some(true) => return self.not(right),
            Some(false) => return right,
            None => {}
        }
        match self.literal(right).and_then(LiteralValue::as_bool) {
            Some(true) => return self.not(left),
            Some(false) => return left,
            None => {}
        }
        self.intern(ExprKind::Xor, TypeId::BOOL, smallvec![left, right])
    }

    pub fn imply(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.check_bool(left, "Imply");
        self.check_bool(right, "Imply");
        match self.literal(left).and_then(LiteralValue::as_bool) {
            Some(false) => return self.true_expr(),
            Some(true) => return right,
            None => {}
        }
        if self.literal(right).and_then(LiteralValue::as_bool) == Some(true) {
            return self.true_expr();
        }
        self.intern(ExprKind::Imply, TypeId::BOOL, smallvec![left, right])
    }

    // -----------------------------------------------------------------------
    // Equality
    // -----------------------------------------------------------------------

    pub fn eq(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.check_same_type(left, right, "Eq");
        if left == right && self.expr(left).kind.is_pure_atom() {
            return self.true_expr();
        }
        if let (Some(a), Some(b)) = (self.literal(left), self.literal(right)) {
            let folded = a == b;
            return self.bool_lit(folded);
        }
        self.intern(ExprKind::Eq, TypeId::BOOL, smallvec![left, right])
    }

    pub fn not_eq(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.check_same_type(left, right, "NotEq");
        if left == right && self.expr(left).kind.is_pure_atom() {
            return self.false_expr();
        }
        if let (Some(a), Some(b)) = (self.literal(left), self.literal(right)) {
            let folded = a != b;
            return self.bool_lit(folded);
        }
        self.intern(ExprKind::NotEq, TypeId::BOOL, smallvec![left, right])
    }

    // -----------------------------------------------------------------------
    // Bitvector / integer arithmetic
    // -----------------------------------------------------------------------

    pub fn add(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.arith(ExprKind::Add, left, right)
    }

    pub fn sub(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.arith(ExprKind::Sub, left, right)
    }

    pub fn mul(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.arith(ExprKind::Mul, left, right)
    }

    pub fn sdiv(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.arith(ExprKind::SDiv, left, right)
    }

    pub fn udiv(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.arith(ExprKind::UDiv, left, right)
    }

    pub fn srem(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.arith(ExprKind::SRem, left, right)
    }

    pub fn urem(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.arith(ExprKind::URem, left, right)
    }

    pub fn shl(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.arith(ExprKind::Shl, left, right)
    }

    pub fn lshr(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.arith(ExprKind::LShr, left, right)
    }

    pub fn ashr(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.arith(ExprKind::AShr, left, right)
    }

    pub fn band(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.arith(ExprKind::BAnd, left, right)
    }

    pub fn bor(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.arith(ExprKind::BOr, left, right)
    }

    pub fn bxor(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.arith(ExprKind::BXor, left, right)
    }

    fn arith(&mut self, kind: ExprKind, left: ExprId, right: ExprId) -> ExprId {
        self.check_same_type(left, right, kind.name());
        let ty = self.expr_ty(left);
        match *self.ty(ty) {
            Type::Bv { width } => {
                if let (Some(a), Some(b)) = (
                    self.literal(left).and_then(LiteralValue::as_bv),
                    self.literal(right).and_then(LiteralValue::as_bv),
                ) {
                    if let Some(bits) = fold_bv_arith(&kind, width, a.1, b.1) {
                        return self.bv_lit(bits, width);
                    }
                }
            }
            Type::Int => {
                assert!(
                    int_arith_supported(&kind),
                    "type error in {}: operation is not defined on Int",
                    kind.name()
                );
                if let (Some(a), Some(b)) = (
                    self.literal(left).and_then(LiteralValue::as_int),
                    self.literal(right).and_then(LiteralValue::as_int),
                ) {
                    if let Some(v) = fold_int_arith(&kind, a, b) {
                        return self.int_lit(v);
                    }
                }
            }
            _ => panic!(
                "type error in {}: operands must be bitvectors, got {}",
                kind.name(),
                self.type_name(ty)
            ),
        }
        self.intern(kind, ty, smallvec![left, right])
    }

    // -----------------------------------------------------------------------
    // Comparisons
    // -----------------------------------------------------------------------

    pub fn slt(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.compare(ExprKind::SLt, left, right)
    }

    pub fn slt_eq(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.compare(ExprKind::SLtEq, left, right)
    }

    pub fn sgt(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.compare(ExprKind::SGt, left, right)
    }

    pub fn sgt_eq(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.compare(ExprKind::SGtEq, left, right)
    }

    pub fn ult(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.compare(ExprKind::ULt, left, right)
    }

    pub fn ult_eq(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.compare(ExprKind::ULtEq, left, right)
    }

    pub fn ugt(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.compare(ExprKind::UGt, left, right)
    }

    pub fn ugt_eq(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.compare(ExprKind::UGtEq, left, right)
    }

    fn compare(&mut self, kind: ExprKind, left: ExprId, right: ExprId) -> ExprId {
        self.check_same_type(left, right, kind.name());
        let ty = self.expr_ty(left);
        let signed = matches!(
            kind,
            ExprKind::SLt | ExprKind::SLtEq | ExprKind::SGt | ExprKind::SGtEq
        );
        match *self.ty(ty) {
            Type::Bv { .. } => {}
            Type::Int => assert!(
                signed,
                "type error in {}: unsigned comparison is not defined on Int",
                kind.name()
            ),
            _ => panic!(
                "type error in {}: operands must be bitvectors, got {}",
                kind.name(),
                self.type_name(ty)
            ),
        }
        if let (Some(a), Some(b)) = (self.literal(left), self.literal(right)) {
            if let Some(folded) = fold_compare(&kind, a, b) {
                return self.bool_lit(folded);
            }
        }
        self.intern(kind, TypeId::BOOL, smallvec![left, right])
    }

    // -----------------------------------------------------------------------
    // Width-changing casts
    // -----------------------------------------------------------------------

    /// Zero extension to a strictly larger width.
    pub fn zext(&mut self, op: ExprId, width: u32) -> ExprId {
        let from = self.check_bv(op, "ZExt");
        assert!(
            width > from,
            "type error in ZExt: target width {width} must exceed operand width {from}"
        );
        if let Some((_, bits)) = self.literal(op).and_then(LiteralValue::as_bv) {
            return self.bv_lit(bits, width);
        }
        let ty = self.bv_type(width);
        self.intern(ExprKind::ZExt, ty, smallvec![op])
    }

    /// Sign extension to a strictly larger width.
    pub fn sext(&mut self, op: ExprId, width: u32) -> ExprId {
        let from = self.check_bv(op, "SExt");
        assert!(
            width > from,
            "type error in SExt: target width {width} must exceed operand width {from}"
        );
        if let Some((_, bits)) = self.literal(op).and_then(LiteralValue::as_bv) {
            let value = literal::to_signed(bits, from);
            return self.bv_lit(literal::from_signed(value, width), width);
        }
        let ty = self.bv_type(width);
        self.intern(ExprKind::SExt, ty, smallvec![op])
    }

    /// Bit extraction; `Extract(e, 0, width(e))` is the identity.
    pub fn extract(&mut self, op: ExprId, offset: u32, width: u32) -> ExprId {
        let from = self.check_bv(op, "Extract");
        assert!(width > 0, "type error in Extract: width must be positive");
        assert!(
            offset + width <= from,
            "type error in Extract: offset {offset} + width {width} exceeds operand width {from}"
        );
        if offset == 0 && width == from {
            return op;
        }
        if let Some((_, bits)) = self.literal(op).and_then(LiteralValue::as_bv) {
            return self.bv_lit(literal::mask(bits >> offset, width), width);
        }
        let ty = self.bv_type(width);
        self.intern(ExprKind::Extract { offset, width }, ty, smallvec![op])
    }

    /// Truncation is extraction of the low bits.
    pub fn trunc(&mut self, op: ExprId, width: u32) -> ExprId {
        self.extract(op, 0, width)
    }

    // -----------------------------------------------------------------------
    // Floats
    // -----------------------------------------------------------------------

    pub fn f_is_nan(&mut self, op: ExprId) -> ExprId {
        self.check_float(op, "FIsNan");
        if let Some(lit) = self.literal(op) {
            let folded = lit.is_nan();
            return self.bool_lit(folded);
        }
        self.intern(ExprKind::FIsNan, TypeId::BOOL, smallvec![op])
    }

    pub fn f_is_inf(&mut self, op: ExprId) -> ExprId {
        self.check_float(op, "FIsInf");
        if let Some(lit) = self.literal(op) {
            let folded = lit.is_infinity();
            return self.bool_lit(folded);
        }
        self.intern(ExprKind::FIsInf, TypeId::BOOL, smallvec![op])
    }

    pub fn fadd(&mut self, left: ExprId, right: ExprId, rm: RoundingMode) -> ExprId {
        self.float_arith(ExprKind::FAdd { rm }, FloatArithOp::Add, left, right)
    }

    pub fn fsub(&mut self, left: ExprId, right: ExprId, rm: RoundingMode) -> ExprId {
        self.float_arith(ExprKind::FSub { rm }, FloatArithOp::Sub, left, right)
    }

    pub fn fmul(&mut self, left: ExprId, right: ExprId, rm: RoundingMode) -> ExprId {
        self.float_arith(ExprKind::FMul { rm }, FloatArithOp::Mul, left, right)
    }

    pub fn fdiv(&mut self, left: ExprId, right: ExprId, rm: RoundingMode) -> ExprId {
        self.float_arith(ExprKind::FDiv { rm }, FloatArithOp::Div, left, right)
    }

    fn float_arith(
        &mut self,
        kind: ExprKind,
        op: FloatArithOp,
        left: ExprId,
        right: ExprId,
    ) -> ExprId {
        let precision = self.check_float(left, kind.name());
        self.check_same_type(left, right, kind.name());
        let rm = kind
            .rounding_mode()
            .unwrap_or(RoundingMode::NearestTiesToEven);
        if let (Some((_, a)), Some((_, b))) = (
            self.literal(left).and_then(LiteralValue::as_float_bits),
            self.literal(right).and_then(LiteralValue::as_float_bits),
        ) {
            if let Some(bits) = literal::fold_float_arith(precision, op, rm, a, b) {
                return self.float_lit(precision, bits);
            }
        }
        let ty = self.expr_ty(left);
        self.intern(kind, ty, smallvec![left, right])
    }

    pub fn f_eq(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.float_compare(ExprKind::FEq, FloatCmpOp::Eq, left, right)
    }

    pub fn f_gt(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.float_compare(ExprKind::FGt, FloatCmpOp::Gt, left, right)
    }

    pub fn f_gt_eq(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.float_compare(ExprKind::FGtEq, FloatCmpOp::GtEq, left, right)
    }

    pub fn f_lt(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.float_compare(ExprKind::FLt, FloatCmpOp::Lt, left, right)
    }

    pub fn f_lt_eq(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.float_compare(ExprKind::FLtEq, FloatCmpOp::LtEq, left, right)
    }

    fn float_compare(
        &mut self,
        kind: ExprKind,
        op: FloatCmpOp,
        left: ExprId,
        right: ExprId,
    ) -> ExprId {
        let precision = self.check_float(left, kind.name());
        self.check_same_type(left, right, kind.name());
        if let (Some((_, a)), Some((_, b))) = (
            self.literal(left).and_then(LiteralValue::as_float_bits),
            self.literal(right).and_then(LiteralValue::as_float_bits),
        ) {
            if let Some(folded) = literal::fold_float_cmp(precision, op, a, b) {
                return self.bool_lit(folded);
            }
        }
        self.intern(kind, TypeId::BOOL, smallvec![left, right])
    }

    // -----------------------------------------------------------------------
    // Ternary
    // -----------------------------------------------------------------------

    pub fn select(&mut self, cond: ExprId, then: ExprId, elze: ExprId) -> ExprId {
        self.check_bool(cond, "Select");
        self.check_same_type(then, elze, "Select");
        match self.literal(cond).and_then(LiteralValue::as_bool) {
            Some(true) => return then,
            Some(false) => return elze,
            None => {}
        }
        if then == elze {
            return then;
        }
        let ty = self.expr_ty(then);
        self.intern(ExprKind::Select, ty, smallvec![cond, then, elze])
    }

    /// Array read with read-over-write chasing: writes at literal
    /// indices provably distinct from a literal read index are skipped,
    /// and a read at the identical index returns the written value.
    pub fn array_read(&mut self, array: ExprId, index: ExprId) -> ExprId {
        let (index_ty, elem_ty) = self.check_array(array, "ArrayRead");
        assert!(
            self.expr_ty(index) == index_ty,
            "type error in ArrayRead: index type mismatch"
        );
        let mut current = array;
        loop {
            let node = self.expr(current);
            if node.kind != ExprKind::ArrayWrite {
                break;
            }
            let (base, written_at, value) = (node.operand(0), node.operand(1), node.operand(2));
            if written_at == index {
                return value;
            }
            match (self.literal(written_at), self.literal(index)) {
                (Some(a), Some(b)) if a == b => return value,
                (Some(_), Some(_)) => {
                    // Definitely distinct literal indices: the write
                    // cannot alias this read.
                    current = base;
                }
                _ => break,
            }
        }
        self.intern(ExprKind::ArrayRead, elem_ty, smallvec![current, index])
    }

    pub fn array_write(&mut self, array: ExprId, index: ExprId, value: ExprId) -> ExprId {
        let (index_ty, elem_ty) = self.check_array(array, "ArrayWrite");
        assert!(
            self.expr_ty(index) == index_ty,
            "type error in ArrayWrite: index type mismatch"
        );
        assert!(
            self.expr_ty(value) == elem_ty,
            "type error in ArrayWrite: element type mismatch"
        );
        let ty = self.expr_ty(array);
        self.intern(ExprKind::ArrayWrite, ty, smallvec![array, index, value])
    }

    // -----------------------------------------------------------------------
    // Type-check helpers
    // -----------------------------------------------------------------------

    fn check_bool(&self, e: ExprId, who: &str) {
        assert!(
            self.ty(self.expr_ty(e)).is_bool(),
            "type error in {who}: expected Bool operand, got {}",
            self.type_name(self.expr_ty(e))
        );
    }

    fn check_bv(&self, e: ExprId, who: &str) -> u32 {
        match self.ty(self.expr_ty(e)) {
            Type::Bv { width } => *width,
            other => panic!(
                "type error in {who}: expected bitvector operand, got {other:?}"
            ),
        }
    }

    fn check_float(&self, e: ExprId, who: &str) -> FloatPrecision {
        match self.ty(self.expr_ty(e)) {
            Type::Float { precision } => *precision,
            other => panic!("type error in {who}: expected float operand, got {other:?}"),
        }
    }

    fn check_array(&self, e: ExprId, who: &str) -> (TypeId, TypeId) {
        match self.ty(self.expr_ty(e)) {
            Type::Array { index, elem } => (*index, *elem),
            other => panic!("type error in {who}: expected array operand, got {other:?}"),
        }
    }

    fn check_same_type(&self, a: ExprId, b: ExprId, who: &str) {
        assert!(
            self.expr_ty(a) == self.expr_ty(b),
            "type error in {who}: operand types differ ({} vs {})",
            self.type_name(self.expr_ty(a)),
            self.type_name(self.expr_ty(b))
        );
    }
}

// ---------------------------------------------------------------------------
// Literal folding tables
// ---------------------------------------------------------------------------

/// Folds a bitvector arithmetic kind; `None` for division or remainder
/// by zero, which stay symbolic.
pub(crate) fn fold_bv_arith(kind: &ExprKind, width: u32, a: u128, b: u128) -> Option<u128> {
    Some(match kind {
        ExprKind::Add => literal::bv_add(a, b, width),
        ExprKind::Sub => literal::bv_sub(a, b, width),
        ExprKind::Mul => literal::bv_mul(a, b, width),
        ExprKind::SDiv if b != 0 => literal::bv_sdiv(a, b, width),
        ExprKind::UDiv if b != 0 => literal::bv_udiv(a, b, width),
        ExprKind::SRem if b != 0 => literal::bv_srem(a, b, width),
        ExprKind::URem if b != 0 => literal::bv_urem(a, b, width),
        ExprKind::SDiv | ExprKind::UDiv | ExprKind::SRem | ExprKind::URem => return None,
        ExprKind::Shl => literal::bv_shl(a, b, width),
        ExprKind::LShr => literal::bv_lshr(a, b, width),
        ExprKind::AShr => literal::bv_ashr(a, b, width),
        ExprKind::BAnd => a & b,
        ExprKind::BOr => a | b,
        ExprKind::BXor => a ^ b,
        _ => return None,
    })
}

/// The arithmetic subset defined on mathematical integers.
pub(crate) fn int_arith_supported(kind: &ExprKind) -> bool {
    matches!(
        kind,
        ExprKind::Add | ExprKind::Sub | ExprKind::Mul | ExprKind::SDiv | ExprKind::SRem
    )
}

/// Folds an integer arithmetic kind; `None` on division by zero or
/// `i128` overflow (the value then stays symbolic).
pub(crate) fn fold_int_arith(kind: &ExprKind, a: i128, b: i128) -> Option<i128> {
    match kind {
        ExprKind::Add => a.checked_add(b),
        ExprKind::Sub => a.checked_sub(b),
        ExprKind::Mul => a.checked_mul(b),
        ExprKind::SDiv if b != 0 => a.checked_div(b),
        ExprKind::SRem if b != 0 => a.checked_rem(b),
        _ => None,
    }
}

/// Folds a signed or unsigned comparison on two literals.
pub(crate) fn fold_compare(kind: &ExprKind, a: &LiteralValue, b: &LiteralValue) -> Option<bool> {
    use std::cmp::Ordering;
    let ordering = match kind {
        ExprKind::SLt | ExprKind::SLtEq | ExprKind::SGt | ExprKind::SGtEq => {
            a.as_signed()?.cmp(&b.as_signed()?)
        }
        _ => {
            let (_, av) = a.as_bv()?;
            let (_, bv) = b.as_bv()?;
            av.cmp(&bv)
        }
    };
    Some(match kind {
        ExprKind::SLt | ExprKind::ULt => ordering == Ordering::Less,
        ExprKind::SLtEq | ExprKind::ULtEq => ordering != Ordering::Greater,
        ExprKind::SGt | ExprKind::UGt => ordering == Ordering::Greater,
        ExprKind::SGtEq | ExprKind::UGtEq => ordering != Ordering::Less,
        _ => return None,
    })
}
