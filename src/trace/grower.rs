//! Trace growing.
//!
//! `grow` extends a trace from a seed block by repeatedly asking the policy
//! for the likely successor. The visited set is shared across all `grow`
//! calls of one function pass, which keeps traces disjoint; a prediction
//! that dominates the current block closes a loop back edge and ends the
//! trace instead.

use std::collections::HashSet;

use crate::ir::BlockId;

use super::policy::{Predictor, PredictorCtx};
use super::Trace;

#[derive(Debug, Default)]
pub struct TraceGrower {
    visited: HashSet<BlockId>,
}

impl TraceGrower {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_visited(&self, block: BlockId) -> bool {
        self.visited.contains(&block)
    }

    pub fn grow<P: Predictor>(
        &mut self,
        cx: &PredictorCtx<'_>,
        policy: &P,
        seed: BlockId,
    ) -> Trace {
        let mut blocks = vec![seed];
        let mut current = seed;
        loop {
            self.visited.insert(current);
            let Some(next) = policy.predict(cx, current) else {
                break;
            };
            if self.visited.contains(&next) {
                break;
            }
            if cx.analysis.doms.dominates(next, current) {
                break;
            }
            blocks.push(next);
            current = next;
        }
        Trace { blocks }
    }
}
