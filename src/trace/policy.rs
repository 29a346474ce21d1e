//! Prediction policies driving the trace grower.
//!
//! Every policy answers `predict(block) -> Option<BlockId>`; the grower is
//! parameterized over the [`Predictor`] trait. `prepare` runs once per
//! function so the static policy can rebuild its branch-direction table —
//! the table never outlives the function pass.

use crate::analysis::{edge_probability, BranchProbability, FunctionAnalysis};
use crate::ir::{BlockId, Function, Opcode};

use super::brdir::BranchDirectionTable;
use super::hazard::contains_hazard;

/// Per-function context handed to policies.
pub struct PredictorCtx<'a> {
    pub func: &'a Function,
    pub analysis: &'a FunctionAnalysis,
}

pub trait Predictor {
    fn prepare(&mut self, _cx: &PredictorCtx<'_>) {}

    /// The likely successor of `block`, or `None` to end the trace.
    fn predict(&self, cx: &PredictorCtx<'_>, block: BlockId) -> Option<BlockId>;
}

/// The `base` policy: never extends a trace past its seed.
#[derive(Debug, Default)]
pub struct BasePolicy;

impl Predictor for BasePolicy {
    fn predict(&self, _cx: &PredictorCtx<'_>, _block: BlockId) -> Option<BlockId> {
        None
    }
}

/// Profile-guided policy: take the most probable successor when it clears
/// the threshold (0.6 by default).
#[derive(Debug)]
pub struct ProfilePolicy {
    pub threshold: BranchProbability,
}

impl Default for ProfilePolicy {
    fn default() -> Self {
        ProfilePolicy {
            threshold: BranchProbability::from_float(0.6),
        }
    }
}

/// Most probable successor of `block` with its probability.
fn best_successor(
    cx: &PredictorCtx<'_>,
    block: BlockId,
) -> Option<(BlockId, BranchProbability)> {
    let mut best: Option<(BlockId, BranchProbability)> = None;
    for succ in cx.func.successors(block) {
        let prob = edge_probability(cx.func, block, succ);
        if best.map_or(true, |(_, bp)| prob > bp) {
            best = Some((succ, prob));
        }
    }
    best
}

impl Predictor for ProfilePolicy {
    fn predict(&self, cx: &PredictorCtx<'_>, block: BlockId) -> Option<BlockId> {
        let (succ, prob) = best_successor(cx, block)?;
        (prob >= self.threshold).then_some(succ)
    }
}

/// Hazard filtering shared by the static and hybrid policies for
/// conditional branches: `Err(())` means "do not extend", `Ok(Some)` means
/// the filter already decided, `Ok(None)` leaves the decision open.
fn filter_conditional(
    cx: &PredictorCtx<'_>,
    block: BlockId,
) -> Result<Option<BlockId>, ()> {
    let term = cx.func.terminator(block).ok_or(())?;
    if cx.func.opcode(term) != Some(&Opcode::CondBr) {
        return Ok(None);
    }
    let targets = &cx.func.inst(term).unwrap().targets;
    let hazards = [
        contains_hazard(cx.func, targets[0]),
        contains_hazard(cx.func, targets[1]),
    ];
    match hazards {
        [true, true] => Err(()),
        [true, false] => Ok(Some(targets[1])),
        [false, true] => Ok(Some(targets[0])),
        [false, false] => Ok(None),
    }
}

/// Static-heuristic policy: hazard filtering plus the branch-direction
/// table built during `prepare`.
#[derive(Debug, Default)]
pub struct StaticPolicy {
    table: BranchDirectionTable,
}

impl Predictor for StaticPolicy {
    fn prepare(&mut self, cx: &PredictorCtx<'_>) {
        self.table = BranchDirectionTable::build(cx.func, cx.analysis);
    }

    fn predict(&self, cx: &PredictorCtx<'_>, block: BlockId) -> Option<BlockId> {
        if contains_hazard(cx.func, block) {
            return None;
        }
        match filter_conditional(cx, block) {
            Err(()) => return None,
            Ok(Some(decided)) => return Some(decided),
            Ok(None) => {}
        }

        let term = cx.func.terminator(block)?;
        if cx.func.opcode(term) == Some(&Opcode::CondBr) {
            let cond = cx.func.operand(term, 0);
            if let Some(cond_inst) = cx.func.inst(cond) {
                if cond_inst.operands.len() == 2 {
                    let key = (cond_inst.operands[0], cond_inst.operands[1]);
                    if let Some((_, taken_second)) = self.table.lookup(key) {
                        let targets = &cx.func.inst(term).unwrap().targets;
                        return Some(targets[taken_second as usize]);
                    }
                }
            }
        }

        cx.func
            .successors(block)
            .into_iter()
            .find(|&succ| !contains_hazard(cx.func, succ))
    }
}

/// Hybrid policy: the static policy's hazard filtering combined with the
/// profile rule for the non-hazardous case.
#[derive(Debug)]
pub struct HazardProfilePolicy {
    pub threshold: BranchProbability,
}

impl Default for HazardProfilePolicy {
    fn default() -> Self {
        HazardProfilePolicy {
            threshold: BranchProbability::from_float(0.6),
        }
    }
}

impl Predictor for HazardProfilePolicy {
    fn predict(&self, cx: &PredictorCtx<'_>, block: BlockId) -> Option<BlockId> {
        if contains_hazard(cx.func, block) {
            return None;
        }
        match filter_conditional(cx, block) {
            Err(()) => return None,
            Ok(Some(decided)) => return Some(decided),
            Ok(None) => {}
        }
        let (succ, prob) = best_successor(cx, block)?;
        (prob >= self.threshold && !contains_hazard(cx.func, succ)).then_some(succ)
    }
}
