//! Frequent-path discovery inside a loop.
//!
//! Starting at the header, the walk follows every successor edge whose
//! branch probability is at least 0.8 and stops once it returns to the
//! header. Loops are expected to have a frequent path; when the walk dies
//! out (or cycles without reaching the header) the loop is left alone.

use std::collections::HashSet;

use crate::analysis::{edge_probability, BranchProbability, Loop};
use crate::ir::{BlockId, Function};

pub struct FrequentPath {
    /// Membership set.
    pub blocks: HashSet<BlockId>,
    /// Discovery order, header first; used for deterministic iteration.
    pub order: Vec<BlockId>,
}

impl FrequentPath {
    pub fn contains(&self, b: BlockId) -> bool {
        self.blocks.contains(&b)
    }
}

/// Walk the frequent path of `lp`. Returns `None` when the walk cannot
/// close the cycle back to the header.
pub fn discover(func: &Function, lp: &Loop) -> Option<FrequentPath> {
    let threshold = BranchProbability::from_float(0.8);
    let mut blocks = HashSet::new();
    let mut order = vec![lp.header];
    blocks.insert(lp.header);

    let mut current = lp.header;
    // The walk touches each block at most once; more steps means a cycle
    // that never returns to the header.
    for _ in 0..func.num_blocks() {
        let mut next = None;
        for succ in func.successors(current) {
            if edge_probability(func, current, succ) >= threshold {
                if blocks.insert(succ) {
                    order.push(succ);
                }
                next = Some(succ);
            }
        }
        match next {
            Some(b) if b == lp.header => {
                return Some(FrequentPath { blocks, order });
            }
            Some(b) => current = b,
            None => break,
        }
    }
    log::warn!(
        "@{}: loop at ^{} has no frequent path",
        func.name,
        func.block(lp.header).name
    );
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::FunctionAnalysis;
    use crate::ir::parse_module;

    const SKEWED_LOOP: &str = "
func @skew(%c: i1, %d: i1) {
entry:
  br ^header
header:
  condbr %c, ^freq, ^rare !prob 0.9, 0.1
freq:
  br ^latch
rare:
  br ^latch
latch:
  condbr %d, ^header, ^exit !prob 0.95, 0.05
exit:
  ret
}
";

    #[test]
    fn walk_follows_likely_edges_back_to_header() {
        let module = parse_module(SKEWED_LOOP).unwrap();
        let f = &module.functions[0];
        let analysis = FunctionAnalysis::compute(f);
        let lp = &analysis.loops.loops[0];
        let path = discover(f, lp).unwrap();

        let name = |b: BlockId| f.block(b).name.as_str();
        let names: Vec<&str> = path.order.iter().map(|&b| name(b)).collect();
        assert_eq!(names, ["header", "freq", "latch"]);
        assert!(!path.contains(f.block_by_name("rare").unwrap()));
    }

    #[test]
    fn threshold_admits_exactly_point_eight() {
        let module = parse_module(
            "
func @edge(%c: i1) {
entry:
  br ^header
header:
  condbr %c, ^header, ^exit !prob 0.8, 0.2
exit:
  ret
}
",
        )
        .unwrap();
        let f = &module.functions[0];
        let analysis = FunctionAnalysis::compute(f);
        let path = discover(f, &analysis.loops.loops[0]).unwrap();
        assert_eq!(path.order, vec![f.block_by_name("header").unwrap()]);
    }

    #[test]
    fn balanced_branches_abort_the_walk() {
        let module = parse_module(
            "
func @flat(%c: i1, %d: i1) {
entry:
  br ^header
header:
  condbr %c, ^a, ^b !prob 0.5, 0.5
a:
  br ^latch
b:
  br ^latch
latch:
  condbr %d, ^header, ^exit !prob 0.9, 0.1
exit:
  ret
}
",
        )
        .unwrap();
        let f = &module.functions[0];
        let analysis = FunctionAnalysis::compute(f);
        assert!(discover(f, &analysis.loops.loops[0]).is_none());
    }
}
