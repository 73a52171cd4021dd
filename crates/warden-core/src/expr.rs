//! Hash-consed expression DAG.
//!
//! Expression nodes are immutable records in the context's arena: a kind
//! tag (with small per-kind payloads), a result type, and an ordered
//! operand list of [`ExprId`]s. Structurally equal sub-DAGs share one
//! arena slot, so `ExprId` equality *is* structural equality.
//!
//! Nothing in this module creates expressions; construction goes through
//! the simplifying builder on [`Context`](crate::Context).

use std::fmt;

use smallvec::SmallVec;

use crate::context::{Context, VarId};
use crate::literal::{LiteralValue, RoundingMode};
use crate::types::TypeId;

/// Unique identifier of an interned expression within a context.
///
/// Because the arena hash-conses on `(kind, type, operands)`, comparing
/// two `ExprId`s from the same context compares the expressions
/// structurally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub u32);

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExprId({})", self.0)
    }
}

/// Expression kind tag with per-kind payload.
///
/// The kind set is closed; per-kind operand and type invariants are
/// enforced by the builder (violations are programmer errors and panic).
/// Every payload is plain data, so kinds are `Copy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExprKind {
    // -- Nullary --
    Undef,
    Literal(LiteralValue),
    VarRef(VarId),

    // -- Unary --
    Not,
    ZExt,
    SExt,
    Extract { offset: u32, width: u32 },
    FIsNan,
    FIsInf,

    // -- Bitvector / integer arithmetic --
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    SRem,
    URem,
    Shl,
    LShr,
    AShr,
    BAnd,
    BOr,
    BXor,

    // -- Boolean binary --
    Xor,
    Imply,

    // -- Comparisons --
    Eq,
    NotEq,
    SLt,
    SLtEq,
    SGt,
    SGtEq,
    ULt,
    ULtEq,
    UGt,
    UGtEq,
    FEq,
    FGt,
    FGtEq,
    FLt,
    FLtEq,

    // -- Float arithmetic (rounding mode payload) --
    FAdd { rm: RoundingMode },
    FSub { rm: RoundingMode },
    FMul { rm: RoundingMode },
    FDiv { rm: RoundingMode },

    // -- Ternary --
    Select,
    ArrayRead,
    ArrayWrite,

    // -- N-ary boolean (flattened) --
    And,
    Or,
}

impl ExprKind {
    /// Printable operator name.
    pub fn name(&self) -> &'static str {
        match self {
            ExprKind::Undef => "undef",
            ExprKind::Literal(_) => "literal",
            ExprKind::VarRef(_) => "varref",
            ExprKind::Not => "Not",
            ExprKind::ZExt => "ZExt",
            ExprKind::SExt => "SExt",
            ExprKind::Extract { .. } => "Extract",
            ExprKind::FIsNan => "FIsNan",
            ExprKind::FIsInf => "FIsInf",
            ExprKind::Add => "Add",
            ExprKind::Sub => "Sub",
            ExprKind::Mul => "Mul",
            ExprKind::SDiv => "SDiv",
            ExprKind::UDiv => "UDiv",
            ExprKind::SRem => "SRem",
            ExprKind::URem => "URem",
            ExprKind::Shl => "Shl",
            ExprKind::LShr => "LShr",
            ExprKind::AShr => "AShr",
            ExprKind::BAnd => "BAnd",
            ExprKind::BOr => "BOr",
            ExprKind::BXor => "BXor",
            ExprKind::Xor => "Xor",
            ExprKind::Imply => "Imply",
            ExprKind::Eq => "Eq",
            ExprKind::NotEq => "NotEq",
            ExprKind::SLt => "SLt",
            ExprKind::SLtEq => "SLtEq",
            ExprKind::SGt => "SGt",
            ExprKind::SGtEq => "SGtEq",
            ExprKind::ULt => "ULt",
            ExprKind::ULtEq => "ULtEq",
            ExprKind::UGt => "UGt",
            ExprKind::UGtEq => "UGtEq",
            ExprKind::FEq => "FEq",
            ExprKind::FGt => "FGt",
            ExprKind::FGtEq => "FGtEq",
            ExprKind::FLt => "FLt",
            ExprKind::FLtEq => "FLtEq",
            ExprKind::FAdd { .. } => "FAdd",
            ExprKind::FSub { .. } => "FSub",
            ExprKind::FMul { .. } => "FMul",
            ExprKind::FDiv { .. } => "FDiv",
            ExprKind::Select => "Select",
            ExprKind::ArrayRead => "ArrayRead",
            ExprKind::ArrayWrite => "ArrayWrite",
            ExprKind::And => "And",
            ExprKind::Or => "Or",
        }
    }

    /// Returns the literal payload, if this is a literal node.
    pub fn literal(&self) -> Option<&LiteralValue> {
        match self {
            ExprKind::Literal(v) => Some(v),
            _ => None,
        }
    }

    /// Returns `true` for `VarRef` and `Literal`: the "pure" kinds for
    /// which `Eq(x, x)` may fold unconditionally.
    pub fn is_pure_atom(&self) -> bool {
        matches!(self, ExprKind::VarRef(_) | ExprKind::Literal(_))
    }

    /// Rounding mode payload of a float arithmetic kind.
    pub fn rounding_mode(&self) -> Option<RoundingMode> {
        match self {
            ExprKind::FAdd { rm }
            | ExprKind::FSub { rm }
            | ExprKind::FMul { rm }
            | ExprKind::FDiv { rm } => Some(*rm),
            _ => None,
        }
    }
}

/// One record in the expression arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprNode {
    pub kind: ExprKind,
    pub ty: TypeId,
    pub operands: SmallVec<[ExprId; 2]>,
}

impl ExprNode {
    pub fn operand(&self, index: usize) -> ExprId {
        self.operands[index]
    }
}

/// Borrowing pretty-printer for an expression; obtained via
/// [`Context::display`](crate::Context::display).
///
/// The format is a compact functional notation:
/// `Eq(x, Add(y, 3bv32))`, `FAdd[RNE](a, b)`, `Extract(v, 0, 8)`.
pub struct ExprDisplay<'a> {
    pub(crate) ctx: &'a Context,
    pub(crate) expr: ExprId,
}

impl fmt::Display for ExprDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_expr(self.ctx, self.expr, f)
    }
}

fn write_expr(ctx: &Context, id: ExprId, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let node = ctx.expr(id);
    match &node.kind {
        ExprKind::Undef => write!(f, "undef"),
        ExprKind::Literal(value) => write!(f, "{value}"),
        ExprKind::VarRef(var) => write!(f, "{}", ctx.var(*var).name()),
        ExprKind::Extract { offset, width } => {
            write!(f, "Extract(")?;
            write_expr(ctx, node.operand(0), f)?;
            write!(f, ", {offset}, {width})")
        }
        ExprKind::ZExt | ExprKind::SExt => {
            write!(f, "{}(", node.kind.name())?;
            write_expr(ctx, node.operand(0), f)?;
            write!(f, ", {})", ctx.type_name(node.ty))
        }
        kind => {
            write!(f, "{}", kind.name())?;
            if let Some(rm) = kind.rounding_mode() {
                write!(f, "[{}]", rm.short_name())?;
            }
            write!(f, "(")?;
            for (i, op) in node.operands.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write_expr(ctx, *op, f)?;
            }
            write!(f, ")")
        }
    }
}
