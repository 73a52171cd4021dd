//! Valuations: total maps from variables to literal values.
//!
//! A [`Valuation`] is what the oracle hands back on a `Sat` answer and
//! what the trace reconstructor threads through a counterexample path.
//! [`VariableAssignment`] is one symbolic update along a path edge.

use indexmap::IndexMap;

use crate::context::{Context, VarId};
use crate::expr::ExprId;
use crate::literal::LiteralValue;

/// A mapping from variables to literal values.
///
/// Insertion order is preserved, which keeps diagnostics and harness
/// output deterministic.
#[derive(Debug, Clone, Default)]
pub struct Valuation {
    values: IndexMap<VarId, LiteralValue>,
}

impl Valuation {
    pub fn new() -> Valuation {
        Valuation::default()
    }

    /// Binds a variable; later bindings overwrite earlier ones.
    pub fn bind(&mut self, variable: VarId, value: LiteralValue) {
        self.values.insert(variable, value);
    }

    pub fn get(&self, variable: VarId) -> Option<&LiteralValue> {
        self.values.get(&variable)
    }

    pub fn contains(&self, variable: VarId) -> bool {
        self.values.contains_key(&variable)
    }

    pub fn iter(&self) -> impl Iterator<Item = (VarId, &LiteralValue)> + '_ {
        self.values.iter().map(|(v, lit)| (*v, lit))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One symbolic update `variable := value` along a path edge.
///
/// Invariant: the variable and the value expression share a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableAssignment {
    variable: VarId,
    value: ExprId,
}

impl VariableAssignment {
    /// Creates an assignment, checking the type invariant.
    pub fn new(ctx: &Context, variable: VarId, value: ExprId) -> VariableAssignment {
        assert!(
            ctx.var(variable).ty() == ctx.expr_ty(value),
            "assignment type mismatch for variable '{}'",
            ctx.var(variable).name()
        );
        VariableAssignment { variable, value }
    }

    pub fn variable(&self) -> VarId {
        self.variable
    }

    pub fn value(&self) -> ExprId {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeId;

    #[test]
    fn bind_and_lookup() {
        let mut ctx = Context::new();
        let ty = ctx.bv_type(32);
        let x = ctx.declare_variable("x", ty).unwrap();
        let y = ctx.declare_variable("y", ty).unwrap();

        let mut val = Valuation::new();
        val.bind(x, LiteralValue::bv(32, 1));
        assert_eq!(val.get(x), Some(&LiteralValue::bv(32, 1)));
        assert_eq!(val.get(y), None);

        // Later bindings overwrite.
        val.bind(x, LiteralValue::bv(32, 2));
        assert_eq!(val.get(x), Some(&LiteralValue::bv(32, 2)));
        assert_eq!(val.len(), 1);
    }

    #[test]
    fn assignment_requires_matching_types() {
        let mut ctx = Context::new();
        let ty = ctx.bv_type(32);
        let x = ctx.declare_variable("x", ty).unwrap();
        let value = ctx.bv_lit(5, 32);
        let assign = VariableAssignment::new(&ctx, x, value);
        assert_eq!(assign.variable(), x);
        assert_eq!(assign.value(), value);
    }

    #[test]
    #[should_panic(expected = "assignment type mismatch")]
    fn assignment_rejects_mismatched_types() {
        let mut ctx = Context::new();
        let x = ctx.declare_variable("x", TypeId::BOOL).unwrap();
        let value = ctx.bv_lit(5, 32);
        VariableAssignment::new(&ctx, x, value);
    }
}
