//! The per-job interning context.
//!
//! A [`Context`] owns three arenas: the type table, the variable table,
//! and the expression arena. Every handle (`TypeId`, `VarId`, `ExprId`)
//! indexes into its owning context; handles from different contexts must
//! never be mixed. All maps iterate deterministically, so repeated runs
//! over the same input produce identity-equal DAGs.
//!
//! The context is single-threaded by design: one verification job, one
//! context, no interior mutability.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::CoreError;
use crate::expr::{ExprDisplay, ExprId, ExprKind, ExprNode};
use crate::literal::{FloatPrecision, LiteralValue};
use crate::types::{Type, TypeId};

/// Unique identifier for a variable within a [`Context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(pub u32);

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VarId({})", self.0)
    }
}

/// A named, typed symbol.
///
/// Identity is the [`VarId`]; no two variables in a context share a
/// name. The canonical `VarRef` expression is created when the variable
/// is declared and never changes.
#[derive(Debug, Clone)]
pub struct Variable {
    name: String,
    ty: TypeId,
    ref_expr: ExprId,
}

impl Variable {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> TypeId {
        self.ty
    }

    /// The canonical reference expression of this variable.
    pub fn ref_expr(&self) -> ExprId {
        self.ref_expr
    }
}

/// Interner and arena for types, variables, and expressions.
///
/// Created once per verification job. The type table is seeded with the
/// fixed-arity builtins at the [`TypeId`] constant indices; `Bv` and
/// `Array` types intern on demand.
pub struct Context {
    types: Vec<Type>,
    type_map: HashMap<Type, TypeId>,
    variables: Vec<Variable>,
    variable_names: IndexMap<String, VarId>,
    exprs: Vec<ExprNode>,
    expr_map: HashMap<(ExprKind, TypeId, SmallVec<[ExprId; 2]>), ExprId>,
}

impl Context {
    /// Creates an empty context with the builtin types pre-interned.
    pub fn new() -> Context {
        let types = vec![
            Type::Bool,
            Type::Int,
            Type::Real,
            Type::Float {
                precision: FloatPrecision::Half,
            },
            Type::Float {
                precision: FloatPrecision::Single,
            },
            Type::Float {
                precision: FloatPrecision::Double,
            },
            Type::Float {
                precision: FloatPrecision::Quad,
            },
        ];
        let type_map = types
            .iter()
            .enumerate()
            .map(|(i, ty)| (*ty, TypeId(i as u32)))
            .collect();

        Context {
            types,
            type_map,
            variables: Vec::new(),
            variable_names: IndexMap::new(),
            exprs: Vec::new(),
            expr_map: HashMap::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Types
    // -----------------------------------------------------------------------

    /// Interns a type descriptor, returning the existing id for equal
    /// descriptors.
    pub fn intern_type(&mut self, ty: Type) -> TypeId {
        if let Type::Bv { width } = ty {
            assert!(width > 0, "bitvector width must be positive");
        }
        if let Some(id) = self.type_map.get(&ty) {
            return *id;
        }
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        self.type_map.insert(ty, id);
        id
    }

    /// The interned `Bv` type of the given width.
    pub fn bv_type(&mut self, width: u32) -> TypeId {
        self.intern_type(Type::Bv { width })
    }

    /// The interned `Array` type with the given component types.
    pub fn array_type(&mut self, index: TypeId, elem: TypeId) -> TypeId {
        assert!(
            (index.0 as usize) < self.types.len() && (elem.0 as usize) < self.types.len(),
            "array component types must belong to this context"
        );
        self.intern_type(Type::Array { index, elem })
    }

    pub fn float_type(&self, precision: FloatPrecision) -> TypeId {
        match precision {
            FloatPrecision::Half => TypeId::FLOAT_HALF,
            FloatPrecision::Single => TypeId::FLOAT_SINGLE,
            FloatPrecision::Double => TypeId::FLOAT_DOUBLE,
            FloatPrecision::Quad => TypeId::FLOAT_QUAD,
        }
    }

    /// Looks up a type by id.
    pub fn ty(&self, id: TypeId) -> &Type {
        &self.types[id.0 as usize]
    }

    /// Human-readable type name: `Bool`, `Bv32`, `Float64`,
    /// `[Bv64 -> Bv8]`.
    pub fn type_name(&self, id: TypeId) -> String {
        match self.ty(id) {
            Type::Bool => "Bool".into(),
            Type::Bv { width } => format!("Bv{width}"),
            Type::Int => "Int".into(),
            Type::Real => "Real".into(),
            Type::Float { precision } => format!("Float{precision}"),
            Type::Array { index, elem } => {
                format!("[{} -> {}]", self.type_name(*index), self.type_name(*elem))
            }
        }
    }

    /// The type of a literal value, interning `Bv` types as needed.
    pub fn literal_type(&mut self, value: &LiteralValue) -> TypeId {
        match value {
            LiteralValue::Bool(_) => TypeId::BOOL,
            LiteralValue::Bv { width, .. } => self.bv_type(*width),
            LiteralValue::Int(_) => TypeId::INT,
            LiteralValue::Float { precision, .. } => self.float_type(*precision),
        }
    }

    // -----------------------------------------------------------------------
    // Variables
    // -----------------------------------------------------------------------

    /// Declares a fresh variable, creating its canonical `VarRef`
    /// expression.
    ///
    /// Returns [`CoreError::DuplicateVariable`] if the name is taken.
    pub fn declare_variable(&mut self, name: &str, ty: TypeId) -> Result<VarId, CoreError> {
        if self.variable_names.contains_key(name) {
            return Err(CoreError::DuplicateVariable {
                name: name.to_string(),
            });
        }
        let id = VarId(self.variables.len() as u32);
        let ref_expr = self.intern(ExprKind::VarRef(id), ty, SmallVec::new());
        self.variables.push(Variable {
            name: name.to_string(),
            ty,
            ref_expr,
        });
        self.variable_names.insert(name.to_string(), id);
        Ok(id)
    }

    /// Looks up a variable by id.
    pub fn var(&self, id: VarId) -> &Variable {
        &self.variables[id.0 as usize]
    }

    /// The canonical reference expression of a variable.
    pub fn var_ref(&self, id: VarId) -> ExprId {
        self.variables[id.0 as usize].ref_expr
    }

    /// Looks up a variable's id by name.
    pub fn lookup_variable(&self, name: &str) -> Option<VarId> {
        self.variable_names.get(name).copied()
    }

    /// Iterates all declared variables in declaration order.
    pub fn variables(&self) -> impl Iterator<Item = (VarId, &Variable)> + '_ {
        self.variables
            .iter()
            .enumerate()
            .map(|(i, v)| (VarId(i as u32), v))
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    /// Raw interning: returns an existing node with identical
    /// `(kind, type, operands)` or allocates a new one.
    ///
    /// Crate-private on purpose: the simplifying builder is the only
    /// public constructor, so every interned node is well-typed and
    /// normalized.
    pub(crate) fn intern(
        &mut self,
        kind: ExprKind,
        ty: TypeId,
        operands: SmallVec<[ExprId; 2]>,
    ) -> ExprId {
        debug_assert!(
            operands.iter().all(|op| (op.0 as usize) < self.exprs.len()),
            "operands must already be interned (the DAG is acyclic by construction)"
        );
        let key = (kind, ty, operands);
        if let Some(id) = self.expr_map.get(&key) {
            return *id;
        }
        let id = ExprId(self.exprs.len() as u32);
        let (kind, ty, operands) = key.clone();
        self.exprs.push(ExprNode { kind, ty, operands });
        self.expr_map.insert(key, id);
        id
    }

    /// Looks up an expression node by id.
    pub fn expr(&self, id: ExprId) -> &ExprNode {
        &self.exprs[id.0 as usize]
    }

    /// Shorthand for the result type of an expression.
    pub fn expr_ty(&self, id: ExprId) -> TypeId {
        self.exprs[id.0 as usize].ty
    }

    /// Shorthand for the literal payload of an expression, if any.
    pub fn literal(&self, id: ExprId) -> Option<&LiteralValue> {
        self.exprs[id.0 as usize].kind.literal()
    }

    /// A borrowing [`Display`](fmt::Display) wrapper for an expression.
    pub fn display(&self, id: ExprId) -> ExprDisplay<'_> {
        ExprDisplay { ctx: self, expr: id }
    }

    /// Number of interned expressions (used by tests and diagnostics).
    pub fn expr_count(&self) -> usize {
        self.exprs.len()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_types_are_pre_interned() {
        let mut ctx = Context::new();
        assert_eq!(ctx.intern_type(Type::Bool), TypeId::BOOL);
        assert_eq!(ctx.intern_type(Type::Int), TypeId::INT);
        assert_eq!(ctx.intern_type(Type::Real), TypeId::REAL);
        assert_eq!(
            ctx.float_type(FloatPrecision::Double),
            TypeId::FLOAT_DOUBLE
        );
    }

    #[test]
    fn bv_types_intern_structurally() {
        let mut ctx = Context::new();
        let a = ctx.bv_type(32);
        let b = ctx.bv_type(32);
        let c = ctx.bv_type(8);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(ctx.ty(a).bv_width(), Some(32));
    }

    #[test]
    fn array_types_intern_structurally() {
        let mut ctx = Context::new();
        let idx = ctx.bv_type(64);
        let elem = ctx.bv_type(8);
        let a = ctx.array_type(idx, elem);
        let b = ctx.array_type(idx, elem);
        assert_eq!(a, b);
        assert_eq!(ctx.type_name(a), "[Bv64 -> Bv8]");
    }

    #[test]
    #[should_panic(expected = "bitvector width must be positive")]
    fn zero_width_bv_is_rejected() {
        let mut ctx = Context::new();
        ctx.bv_type(0);
    }

    #[test]
    fn declare_variable_creates_ref_expr() {
        let mut ctx = Context::new();
        let ty = ctx.bv_type(32);
        let v = ctx.declare_variable("x", ty).unwrap();
        let r = ctx.var_ref(v);
        assert_eq!(ctx.expr(r).kind, ExprKind::VarRef(v));
        assert_eq!(ctx.expr_ty(r), ty);
        assert_eq!(ctx.var(v).name(), "x");
    }

    #[test]
    fn duplicate_variable_name_is_rejected() {
        let mut ctx = Context::new();
        ctx.declare_variable("x", TypeId::BOOL).unwrap();
        let err = ctx.declare_variable("x", TypeId::BOOL).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateVariable { name } if name == "x"));
    }

    #[test]
    fn lookup_variable_by_name() {
        let mut ctx = Context::new();
        let v = ctx.declare_variable("flag", TypeId::BOOL).unwrap();
        assert_eq!(ctx.lookup_variable("flag"), Some(v));
        assert_eq!(ctx.lookup_variable("other"), None);
    }

    #[test]
    fn interning_deduplicates_expressions() {
        let mut ctx = Context::new();
        let a = ctx.bv_lit(1, 32);
        let b = ctx.bv_lit(1, 32);
        assert_eq!(a, b);
        let c = ctx.bv_lit(2, 32);
        assert_ne!(a, c);
    }
}
