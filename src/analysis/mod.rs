//! CFG analyses the passes consume: dominators, post-dominators, the
//! natural-loop forest, branch probabilities, and profile counts.
//!
//! [`FunctionAnalysis`] bundles the per-function results. It owns plain data
//! (block and value ids only), so a pass may compute it once and then mutate
//! the function, as long as the mutations leave the CFG shape intact — the
//! FP-LICM rewriter only inserts and moves instructions, never edges.

pub mod dom;
pub mod loops;
pub mod prob;

pub use dom::{DomTree, PostDomTree};
pub use loops::{Loop, LoopForest, LoopId};
pub use prob::{edge_probability, profile_count, BranchProbability};

use crate::ir::Function;

pub struct FunctionAnalysis {
    pub doms: DomTree,
    pub postdoms: PostDomTree,
    pub loops: LoopForest,
}

impl FunctionAnalysis {
    pub fn compute(func: &Function) -> Self {
        let doms = DomTree::compute(func);
        let postdoms = PostDomTree::compute(func);
        let loops = LoopForest::compute(func, &doms);
        log::debug!(
            "analysis for @{}: {} blocks, {} loops",
            func.name,
            func.num_blocks(),
            loops.loops.len()
        );
        FunctionAnalysis {
            doms,
            postdoms,
            loops,
        }
    }
}
