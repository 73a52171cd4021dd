//! Bounded model checking over the instrumented CFG.
//!
//! Enumerates acyclic paths from the entry block to each error block
//! (depth-first, bounded by `bound` blocks per path; a path revisiting
//! a block is cut there, since one variable per SSA value cannot carry
//! two loop iterations), builds the path formula as the conjunction of
//! per-instruction encodings and edge guards, and asks the oracle. The
//! first satisfiable path yields a `Fail` verdict with a reconstructed
//! trace; if every path is refuted the verdict is `Success`,
//! downgraded to `BoundReached` when anything was cut off and to
//! `Unknown` when the oracle could not decide some path.

use tracing::{debug, warn};

use warden_core::Context;
use warden_ir::{BlockId, Cfg, Function, Module};

use crate::error::CheckError;
use crate::memory::MemoryModelKind;
use crate::solver::{Oracle, SolverResult};
use crate::trace::{build_trace, PathInfo, TraceStep};
use crate::translate::{FunctionEncoder, TranslateSettings};
use crate::verdict::Verdict;

/// Driver configuration.
#[derive(Debug, Clone, Copy)]
pub struct BmcSettings {
    /// Maximum number of blocks on one path.
    pub bound: usize,
    pub memory: MemoryModelKind,
    pub translate: TranslateSettings,
}

impl Default for BmcSettings {
    fn default() -> Self {
        BmcSettings {
            bound: 100,
            memory: MemoryModelKind::Simple,
            translate: TranslateSettings::default(),
        }
    }
}

/// Hard cap on enumerated paths; hitting it is reported like hitting
/// the bound.
const MAX_PATHS: usize = 10_000;

/// Checks the `main` function of an instrumented module. The `code` on
/// a `Fail` verdict is the error block's tag; mapping it back to a
/// check message is the caller's business (via
/// [`CheckRegistry::message_for_code`](crate::checks::CheckRegistry::message_for_code)).
pub fn check_module(
    module: &Module,
    oracle: &mut dyn Oracle,
    settings: &BmcSettings,
) -> Verdict {
    let Some(func) = module.function("main") else {
        return Verdict::InternalError("module has no 'main' function".into());
    };
    if func.is_declaration() {
        return Verdict::InternalError("'main' is only declared, not defined".into());
    }

    // A residual call to a defined function hides arbitrary behavior
    // (including error locations inside the callee); without inlining
    // the verdict cannot be trusted on any path.
    for block in func.block_ids() {
        for inst in &func.block(block).insts {
            if let warden_ir::InstKind::Call { callee, .. } = &inst.kind {
                if module.is_defined(callee) {
                    warn!(
                        callee = %callee,
                        "call to a defined function; inline functions before verification"
                    );
                    return Verdict::Unknown;
                }
            }
        }
    }

    let mut encoder = match FunctionEncoder::new(
        Context::new(),
        module,
        func,
        settings.memory.instantiate(),
        settings.translate,
    ) {
        Ok(encoder) => encoder,
        Err(CheckError::Unsupported(what)) => {
            warn!(%what, "unsupported construct, verdict is unknown");
            return Verdict::Unknown;
        }
        Err(err) => return Verdict::InternalError(err.to_string()),
    };

    let cfg = Cfg::new(func);
    let mut bound_hit = false;
    let mut unknown_seen = false;
    let mut paths_seen = 0usize;

    let mut stack: Vec<Vec<BlockId>> = vec![vec![func.entry()]];
    while let Some(path) = stack.pop() {
        let last = *path.last().expect("paths are non-empty");

        if func.block(last).is_error_block() {
            paths_seen += 1;
            if paths_seen > MAX_PATHS {
                bound_hit = true;
                break;
            }
            match check_path(&mut encoder, func, &path, oracle) {
                Ok(PathVerdict::Counterexample(verdict)) => return verdict,
                Ok(PathVerdict::Refuted) => {}
                Ok(PathVerdict::Undecided) => unknown_seen = true,
                Ok(PathVerdict::Timeout) => return Verdict::Timeout,
                Err(CheckError::Unsupported(what)) => {
                    warn!(%what, "unsupported construct, verdict is unknown");
                    return Verdict::Unknown;
                }
                Err(err) => return Verdict::InternalError(err.to_string()),
            }
            continue;
        }

        if path.len() >= settings.bound {
            bound_hit = true;
            continue;
        }
        for (succ, _) in cfg.successors(last) {
            // Cycles are cut at the first revisit; the conclusion then
            // degrades to BoundReached rather than Success.
            if path.contains(&succ) {
                bound_hit = true;
                continue;
            }
            let mut extended = path.clone();
            extended.push(succ);
            stack.push(extended);
        }
    }

    if unknown_seen {
        Verdict::Unknown
    } else if bound_hit {
        Verdict::BoundReached
    } else {
        Verdict::Success
    }
}

enum PathVerdict {
    Counterexample(Verdict),
    Refuted,
    Undecided,
    Timeout,
}

fn check_path(
    encoder: &mut FunctionEncoder<'_>,
    func: &Function,
    path: &[BlockId],
    oracle: &mut dyn Oracle,
) -> Result<PathVerdict, CheckError> {
    debug!(
        path = %path
            .iter()
            .map(|b| func.block(*b).label.as_str())
            .collect::<Vec<_>>()
            .join(" -> "),
        "checking error path"
    );

    encoder.begin_path();
    let mut conjuncts = Vec::new();
    let mut steps: Vec<Vec<TraceStep>> = Vec::with_capacity(path.len());

    for (i, &block) in path.iter().enumerate() {
        let pred = if i == 0 { None } else { Some(path[i - 1]) };
        let mut block_steps = Vec::new();
        for inst in &func.block(block).insts {
            let encoded = encoder.encode_step(inst, pred)?;
            conjuncts.push(encoded.formula);
            if let Some(assignment) = encoded.assignment {
                let (source, scope) = match inst.result() {
                    Some(r) => {
                        let info = func.value(r);
                        (info.source_name.clone(), info.scope.clone())
                    }
                    None => (None, None),
                };
                block_steps.push(TraceStep {
                    assignment,
                    source,
                    scope,
                    line: inst.loc.map(|l| l.line),
                });
            }
        }
        steps.push(block_steps);

        if i + 1 < path.len() {
            let succ_index = successor_index(func, block, path[i + 1])?;
            let guard = encoder.edge_guard(&func.block(block).terminator, succ_index)?;
            conjuncts.push(guard);
        }
    }

    let formula = encoder.ctx().and_many(&conjuncts);
    match oracle.check(encoder.ctx(), formula) {
        SolverResult::Sat(model) => {
            let error_block = func.block(*path.last().expect("non-empty path"));
            let code = error_block.error_code.unwrap_or(0);
            let info = PathInfo {
                function: func.name.clone(),
                params: func
                    .params
                    .iter()
                    .filter_map(|p| encoder.variable(p.value).map(|v| (p.name.clone(), v)))
                    .collect(),
                steps,
                error_code: code,
                error_line: error_block.error_line,
                nondet: encoder.take_nondet(),
            };
            let trace = match build_trace(encoder.context(), &info, &model) {
                Ok(trace) => Some(trace),
                Err(err) => {
                    warn!(%err, "counterexample trace is unavailable");
                    None
                }
            };
            Ok(PathVerdict::Counterexample(Verdict::Fail { code, trace }))
        }
        SolverResult::Unsat => Ok(PathVerdict::Refuted),
        SolverResult::Unknown => Ok(PathVerdict::Undecided),
        SolverResult::Timeout => Ok(PathVerdict::Timeout),
    }
}

/// The position of `target` in `block`'s successor list, which selects
/// the branch guard.
fn successor_index(func: &Function, block: BlockId, target: BlockId) -> Result<usize, CheckError> {
    func.block(block)
        .terminator
        .successors()
        .iter()
        .position(|s| *s == target)
        .ok_or_else(|| {
            CheckError::Translation(format!(
                "'{}' is not a successor of '{}'",
                func.block(target).label,
                func.block(block).label
            ))
        })
}
