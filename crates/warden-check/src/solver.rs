//! Oracle interface and the built-in propagation oracle.
//!
//! The external SMT backend is consumed through the [`Oracle`] trait:
//! `check(formula)` returns `Sat` with a model, `Unsat`, `Unknown`, or
//! `Timeout`. [`PropagationOracle`] is a deliberately incomplete
//! reference implementation that makes the tool end-to-end runnable:
//!
//! 1. split the top-level conjunction,
//! 2. propagate `Eq(var, literal)` bindings and variable-variable
//!    equalities to a fixpoint by substitution and refolding,
//! 3. default the remaining free variables,
//! 4. verify the candidate model by evaluation.
//!
//! When propagation alone gets stuck, the oracle case-splits on a
//! bounded number of undecided boolean variables (branch conditions)
//! and recurses; a split is `Unsat` only if both branches are, `Sat`
//! as soon as one branch verifies a model.
//!
//! It answers `Sat` only when propagation reduced every conjunct to
//! `true` under the returned bindings (or a completed model evaluates
//! the whole formula to `true`), and `Unsat` only when refolding
//! reduces every branch to the `false` literal; everything else is
//! `Unknown`.

use std::collections::HashMap;

use tracing::debug;

use warden_core::{
    eval, Context, ExprId, ExprKind, LiteralValue, Type, Valuation, VarId,
};

/// Outcome of one oracle query.
#[derive(Debug)]
pub enum SolverResult {
    Sat(Valuation),
    Unsat,
    Unknown,
    Timeout,
}

/// External decision procedure interface.
pub trait Oracle {
    fn check(&mut self, ctx: &mut Context, formula: ExprId) -> SolverResult;
}

/// The built-in propagation-based oracle.
#[derive(Default)]
pub struct PropagationOracle {
    _private: (),
}

impl PropagationOracle {
    pub fn new() -> PropagationOracle {
        PropagationOracle::default()
    }
}

/// Splitting is bounded: 2^8 propagation runs at the very worst.
const MAX_SPLIT_DEPTH: usize = 8;

impl Oracle for PropagationOracle {
    fn check(&mut self, ctx: &mut Context, formula: ExprId) -> SolverResult {
        let conjuncts: Vec<ExprId> = match &ctx.expr(formula).kind {
            ExprKind::And => ctx.expr(formula).operands.to_vec(),
            _ => vec![formula],
        };
        solve(ctx, formula, conjuncts, Propagation::new(), 0)
    }
}

fn solve(
    ctx: &mut Context,
    formula: ExprId,
    mut conjuncts: Vec<ExprId>,
    mut state: Propagation,
    depth: usize,
) -> SolverResult {
    // Propagate to a fixpoint: every round substitutes the current
    // knowledge into each conjunct, refolds, and harvests new facts.
    let round_cap = conjuncts.len() + 8;
    for _ in 0..round_cap {
        let mut progress = false;
        let mut remaining = Vec::with_capacity(conjuncts.len());
        for conjunct in conjuncts.drain(..) {
            let reduced = state.substitute(ctx, conjunct);
            match state.absorb(ctx, reduced) {
                Absorbed::False => {
                    debug!("conjunct refolded to false, branch is unsatisfiable");
                    return SolverResult::Unsat;
                }
                Absorbed::True => progress = true,
                Absorbed::NewFact => progress = true,
                Absorbed::Kept(e) => remaining.push(e),
            }
        }
        conjuncts = remaining;
        if !progress {
            break;
        }
    }

    // Every conjunct reduced to `true` under the harvested bindings:
    // the formula is satisfiable by construction. Unconstrained
    // variables get type defaults (array-typed ones have no literal
    // form and stay out of the model).
    if conjuncts.is_empty() {
        let mut model = Valuation::new();
        for var in free_variables(ctx, formula) {
            if let Some(value) = state.value_of(var).or_else(|| default_value(ctx, var)) {
                model.bind(var, value);
            }
        }
        return SolverResult::Sat(model);
    }

    // Some conjuncts are undecided; a fully defaulted model may still
    // happen to satisfy them, which evaluation verifies end to end.
    let mut model = Valuation::new();
    let mut complete = true;
    for var in free_variables(ctx, formula) {
        match state.value_of(var).or_else(|| default_value(ctx, var)) {
            Some(value) => model.bind(var, value),
            None => complete = false,
        }
    }
    if complete {
        if let Some(LiteralValue::Bool(true)) = eval::evaluate(ctx, formula, &model) {
            return SolverResult::Sat(model);
        }
        // `false` under an arbitrary completion proves nothing; fall
        // through to splitting.
    }

    // Case-split on an undecided boolean variable of the remaining
    // conjuncts (typically a branch condition).
    if depth < MAX_SPLIT_DEPTH {
        if let Some(split) = pick_split_variable(ctx, &mut state, &conjuncts) {
            debug!(var = %ctx.var(split).name(), depth, "case-splitting");
            let mut any_unknown = false;
            for value in [true, false] {
                let mut branch_state = state.clone();
                branch_state.bind(split, LiteralValue::Bool(value));
                match solve(ctx, formula, conjuncts.clone(), branch_state, depth + 1) {
                    SolverResult::Sat(model) => return SolverResult::Sat(model),
                    SolverResult::Unsat => {}
                    SolverResult::Unknown => any_unknown = true,
                    SolverResult::Timeout => return SolverResult::Timeout,
                }
            }
            if !any_unknown {
                return SolverResult::Unsat;
            }
        }
    }

    SolverResult::Unknown
}

/// The first unbound boolean variable occurring in the undecided
/// conjuncts, if any.
fn pick_split_variable(
    ctx: &Context,
    state: &mut Propagation,
    conjuncts: &[ExprId],
) -> Option<VarId> {
    for &conjunct in conjuncts {
        for var in free_variables(ctx, conjunct) {
            if ctx.ty(ctx.var(var).ty()).is_bool() && state.value_of(var).is_none() {
                return Some(var);
            }
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Propagation state
// ---------------------------------------------------------------------------

enum Absorbed {
    True,
    False,
    NewFact,
    Kept(ExprId),
}

#[derive(Clone)]
struct Propagation {
    /// Union-find over variables known equal to each other.
    parents: HashMap<VarId, VarId>,
    /// Literal bindings, keyed by class representative.
    bindings: HashMap<VarId, LiteralValue>,
}

impl Propagation {
    fn new() -> Propagation {
        Propagation {
            parents: HashMap::new(),
            bindings: HashMap::new(),
        }
    }

    fn find(&mut self, var: VarId) -> VarId {
        let mut root = var;
        while let Some(&parent) = self.parents.get(&root) {
            root = parent;
        }
        // Path compression.
        let mut cursor = var;
        while let Some(&parent) = self.parents.get(&cursor) {
            self.parents.insert(cursor, root);
            cursor = parent;
        }
        root
    }

    fn union(&mut self, a: VarId, b: VarId) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        // Keep an existing binding on the surviving root.
        if let Some(value) = self.bindings.remove(&ra) {
            self.bindings.entry(rb).or_insert(value);
        }
        self.parents.insert(ra, rb);
        true
    }

    fn bind(&mut self, var: VarId, value: LiteralValue) -> bool {
        let root = self.find(var);
        self.bindings.insert(root, value).is_none()
    }

    fn value_of(&mut self, var: VarId) -> Option<LiteralValue> {
        let root = self.find(var);
        self.bindings.get(&root).copied()
    }

    /// Classifies a reduced conjunct, harvesting bindings and
    /// equalities.
    fn absorb(&mut self, ctx: &mut Context, conjunct: ExprId) -> Absorbed {
        match literal_bool(ctx, conjunct) {
            Some(true) => return Absorbed::True,
            Some(false) => return Absorbed::False,
            None => {}
        }

        let node = ctx.expr(conjunct);
        match &node.kind {
            // A bare boolean variable must hold.
            ExprKind::VarRef(var) => {
                let var = *var;
                if self.bind(var, LiteralValue::Bool(true)) {
                    Absorbed::NewFact
                } else {
                    Absorbed::True
                }
            }
            ExprKind::Not => {
                let inner = node.operand(0);
                if let ExprKind::VarRef(var) = ctx.expr(inner).kind {
                    if self.bind(var, LiteralValue::Bool(false)) {
                        return Absorbed::NewFact;
                    }
                    return Absorbed::True;
                }
                Absorbed::Kept(conjunct)
            }
            ExprKind::Eq => {
                let (lhs, rhs) = (node.operand(0), node.operand(1));
                let lk = ctx.expr(lhs).kind.clone();
                let rk = ctx.expr(rhs).kind.clone();
                match (lk, rk) {
                    (ExprKind::VarRef(a), ExprKind::VarRef(b)) => {
                        if self.union(a, b) {
                            Absorbed::NewFact
                        } else {
                            Absorbed::True
                        }
                    }
                    (ExprKind::VarRef(v), ExprKind::Literal(lit))
                    | (ExprKind::Literal(lit), ExprKind::VarRef(v)) => {
                        if self.bind(v, lit) {
                            Absorbed::NewFact
                        } else {
                            // A second, conflicting binding would have
                            // refolded to `false` during substitution.
                            Absorbed::True
                        }
                    }
                    // `Eq(true, e)` is `e`; `Eq(false, e)` is `Not(e)`.
                    (ExprKind::Literal(LiteralValue::Bool(b)), _) => {
                        let rewritten = if b { rhs } else { ctx.not(rhs) };
                        self.absorb(ctx, rewritten)
                    }
                    (_, ExprKind::Literal(LiteralValue::Bool(b))) => {
                        let rewritten = if b { lhs } else { ctx.not(lhs) };
                        self.absorb(ctx, rewritten)
                    }
                    _ => Absorbed::Kept(conjunct),
                }
            }
            _ => Absorbed::Kept(conjunct),
        }
    }

    /// Substitutes known bindings and class representatives into an
    /// expression, refolding through the builder.
    fn substitute(&mut self, ctx: &mut Context, expr: ExprId) -> ExprId {
        let mut memo = HashMap::new();
        self.substitute_rec(ctx, expr, &mut memo)
    }

    fn substitute_rec(
        &mut self,
        ctx: &mut Context,
        expr: ExprId,
        memo: &mut HashMap<ExprId, ExprId>,
    ) -> ExprId {
        if let Some(&done) = memo.get(&expr) {
            return done;
        }
        let node = ctx.expr(expr).clone();
        let result = match &node.kind {
            ExprKind::VarRef(var) => {
                let root = self.find(*var);
                match self.bindings.get(&root) {
                    Some(value) => ctx.lit(*value),
                    None if root != *var => ctx.var_ref(root),
                    None => expr,
                }
            }
            ExprKind::Literal(_) | ExprKind::Undef => expr,
            _ => {
                let operands: Vec<ExprId> = node
                    .operands
                    .iter()
                    .map(|&op| self.substitute_rec(ctx, op, memo))
                    .collect();
                if operands.as_slice() == node.operands.as_slice() {
                    expr
                } else {
                    rebuild(ctx, &node, &operands)
                }
            }
        };
        memo.insert(expr, result);
        result
    }
}

/// Reconstructs an expression through the folding builder after operand
/// substitution. Extension kinds read their target width off the
/// original node's type.
fn rebuild(ctx: &mut Context, node: &warden_core::ExprNode, ops: &[ExprId]) -> ExprId {
    match &node.kind {
        ExprKind::Not => ctx.not(ops[0]),
        ExprKind::And => ctx.and_many(ops),
        ExprKind::Or => ctx.or_many(ops),
        ExprKind::Xor => ctx.xor(ops[0], ops[1]),
        ExprKind::Imply => ctx.imply(ops[0], ops[1]),
        ExprKind::Eq => ctx.eq(ops[0], ops[1]),
        ExprKind::NotEq => ctx.not_eq(ops[0], ops[1]),
        ExprKind::Add => ctx.add(ops[0], ops[1]),
        ExprKind::Sub => ctx.sub(ops[0], ops[1]),
        ExprKind::Mul => ctx.mul(ops[0], ops[1]),
        ExprKind::SDiv => ctx.sdiv(ops[0], ops[1]),
        ExprKind::UDiv => ctx.udiv(ops[0], ops[1]),
        ExprKind::SRem => ctx.srem(ops[0], ops[1]),
        ExprKind::URem => ctx.urem(ops[0], ops[1]),
        ExprKind::Shl => ctx.shl(ops[0], ops[1]),
        ExprKind::LShr => ctx.lshr(ops[0], ops[1]),
        ExprKind::AShr => ctx.ashr(ops[0], ops[1]),
        ExprKind::BAnd => ctx.band(ops[0], ops[1]),
        ExprKind::BOr => ctx.bor(ops[0], ops[1]),
        ExprKind::BXor => ctx.bxor(ops[0], ops[1]),
        ExprKind::SLt => ctx.slt(ops[0], ops[1]),
        ExprKind::SLtEq => ctx.slt_eq(ops[0], ops[1]),
        ExprKind::SGt => ctx.sgt(ops[0], ops[1]),
        ExprKind::SGtEq => ctx.sgt_eq(ops[0], ops[1]),
        ExprKind::ULt => ctx.ult(ops[0], ops[1]),
        ExprKind::ULtEq => ctx.ult_eq(ops[0], ops[1]),
        ExprKind::UGt => ctx.ugt(ops[0], ops[1]),
        ExprKind::UGtEq => ctx.ugt_eq(ops[0], ops[1]),
        ExprKind::FEq => ctx.f_eq(ops[0], ops[1]),
        ExprKind::FGt => ctx.f_gt(ops[0], ops[1]),
        ExprKind::FGtEq => ctx.f_gt_eq(ops[0], ops[1]),
        ExprKind::FLt => ctx.f_lt(ops[0], ops[1]),
        ExprKind::FLtEq => ctx.f_lt_eq(ops[0], ops[1]),
        ExprKind::FIsNan => ctx.f_is_nan(ops[0]),
        ExprKind::FIsInf => ctx.f_is_inf(ops[0]),
        ExprKind::FAdd { rm } => ctx.fadd(ops[0], ops[1], *rm),
        ExprKind::FSub { rm } => ctx.fsub(ops[0], ops[1], *rm),
        ExprKind::FMul { rm } => ctx.fmul(ops[0], ops[1], *rm),
        ExprKind::FDiv { rm } => ctx.fdiv(ops[0], ops[1], *rm),
        ExprKind::ZExt => {
            let width = ctx.ty(node.ty).bv_width().expect("ZExt produces a bitvector");
            ctx.zext(ops[0], width)
        }
        ExprKind::SExt => {
            let width = ctx.ty(node.ty).bv_width().expect("SExt produces a bitvector");
            ctx.sext(ops[0], width)
        }
        ExprKind::Extract { offset, width } => ctx.extract(ops[0], *offset, *width),
        ExprKind::Select => ctx.select(ops[0], ops[1], ops[2]),
        ExprKind::ArrayRead => ctx.array_read(ops[0], ops[1]),
        ExprKind::ArrayWrite => ctx.array_write(ops[0], ops[1], ops[2]),
        ExprKind::Undef | ExprKind::Literal(_) | ExprKind::VarRef(_) => {
            unreachable!("nullary kinds are handled before rebuild")
        }
    }
}

/// Collects the free variables of an expression.
pub fn free_variables(ctx: &Context, expr: ExprId) -> Vec<VarId> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    let mut stack = vec![expr];
    while let Some(e) = stack.pop() {
        if !seen.insert(e) {
            continue;
        }
        let node = ctx.expr(e);
        if let ExprKind::VarRef(var) = node.kind {
            if !out.contains(&var) {
                out.push(var);
            }
        }
        stack.extend(node.operands.iter().copied());
    }
    out.sort();
    out
}

fn literal_bool(ctx: &Context, expr: ExprId) -> Option<bool> {
    ctx.literal(expr).and_then(LiteralValue::as_bool)
}

/// Type-directed default for a variable the formula does not constrain.
fn default_value(ctx: &Context, var: VarId) -> Option<LiteralValue> {
    match *ctx.ty(ctx.var(var).ty()) {
        Type::Bool => Some(LiteralValue::Bool(false)),
        Type::Bv { width } => Some(LiteralValue::bv(width, 0)),
        Type::Int => Some(LiteralValue::Int(0)),
        Type::Float { precision } => Some(LiteralValue::Float { precision, bits: 0 }),
        // Arrays have no literal representation; a formula still
        // mentioning one cannot be completed into a checkable model.
        Type::Array { .. } | Type::Real => None,
    }
}
