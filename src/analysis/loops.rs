//! Natural-loop forest.
//!
//! A natural loop is identified by a back edge `tail -> header` where the
//! header dominates the tail; its body is every block that reaches the tail
//! without passing through the header. Loops sharing a header are merged
//! (one loop may have several latches). Nesting is recovered from body
//! inclusion, and each loop reports the pre-header the FP-LICM rewriter
//! hoists into: the unique outside predecessor of the header whose only
//! successor is the header.

use std::collections::HashSet;

use crate::ir::{BlockId, Function};

use super::dom::DomTree;

/// Index of a loop within its [`LoopForest`].
pub type LoopId = usize;

pub struct Loop {
    pub header: BlockId,
    pub preheader: Option<BlockId>,
    /// Header first, remaining members in function order.
    pub blocks: Vec<BlockId>,
    block_set: HashSet<BlockId>,
    pub parent: Option<LoopId>,
    pub subloops: Vec<LoopId>,
    /// Nesting depth; outermost loops have depth 1.
    pub depth: u32,
}

impl Loop {
    pub fn contains(&self, b: BlockId) -> bool {
        self.block_set.contains(&b)
    }

    /// A loop is innermost iff it has no sub-loops.
    pub fn is_innermost(&self) -> bool {
        self.subloops.is_empty()
    }

    /// Whether `v`, as an operand, is invariant with respect to this loop:
    /// constants, arguments, and instructions defined outside the loop.
    pub fn is_invariant(&self, func: &Function, v: crate::ir::ValueId) -> bool {
        match func.parent(v) {
            Some(block) => !self.contains(block),
            // Arguments, constants, and detached instructions.
            None => true,
        }
    }
}

pub struct LoopForest {
    pub loops: Vec<Loop>,
    /// Innermost containing loop per block.
    loop_of: Vec<Option<LoopId>>,
}

impl LoopForest {
    pub fn compute(func: &Function, doms: &DomTree) -> Self {
        let preds = func.predecessors();

        // Collect back edges grouped by header.
        let mut headers: Vec<BlockId> = Vec::new();
        let mut latches: Vec<Vec<BlockId>> = Vec::new();
        for tail in func.blocks() {
            for header in func.successors(tail) {
                if doms.dominates(header, tail) {
                    match headers.iter().position(|&h| h == header) {
                        Some(i) => latches[i].push(tail),
                        None => {
                            headers.push(header);
                            latches.push(vec![tail]);
                        }
                    }
                }
            }
        }

        // Loop bodies: reverse walk from each latch, stopping at the header.
        let mut loops: Vec<Loop> = headers
            .iter()
            .zip(&latches)
            .map(|(&header, latches)| {
                let mut body = HashSet::new();
                body.insert(header);
                let mut worklist: Vec<BlockId> = Vec::new();
                for &latch in latches {
                    if body.insert(latch) {
                        worklist.push(latch);
                    }
                }
                while let Some(block) = worklist.pop() {
                    for &pred in &preds[block.index()] {
                        if body.insert(pred) {
                            worklist.push(pred);
                        }
                    }
                }
                let mut blocks: Vec<BlockId> = body.iter().copied().collect();
                blocks.sort();
                blocks.retain(|&b| b != header);
                blocks.insert(0, header);
                Loop {
                    header,
                    preheader: None,
                    blocks,
                    block_set: body,
                    parent: None,
                    subloops: Vec::new(),
                    depth: 1,
                }
            })
            .collect();

        // Nesting: the parent of a loop is the smallest strictly larger loop
        // containing its header.
        let sizes: Vec<usize> = loops.iter().map(|l| l.block_set.len()).collect();
        for i in 0..loops.len() {
            let mut parent: Option<LoopId> = None;
            for j in 0..loops.len() {
                if i == j || !loops[j].block_set.contains(&loops[i].header) {
                    continue;
                }
                if sizes[j] <= sizes[i] {
                    continue;
                }
                if parent.map_or(true, |p| sizes[j] < sizes[p]) {
                    parent = Some(j);
                }
            }
            loops[i].parent = parent;
        }
        for i in 0..loops.len() {
            if let Some(p) = loops[i].parent {
                loops[p].subloops.push(i);
            }
        }
        for i in 0..loops.len() {
            let mut depth = 1;
            let mut cursor = loops[i].parent;
            while let Some(p) = cursor {
                depth += 1;
                cursor = loops[p].parent;
            }
            loops[i].depth = depth;
        }

        // Pre-headers.
        for l in loops.iter_mut() {
            let outside: Vec<BlockId> = preds[l.header.index()]
                .iter()
                .copied()
                .filter(|p| !l.block_set.contains(p))
                .collect();
            if let [single] = outside.as_slice() {
                if func.successors(*single).len() == 1 {
                    l.preheader = Some(*single);
                }
            }
        }

        // Innermost loop per block: the containing loop with the fewest
        // member blocks.
        let mut loop_of = vec![None; func.num_blocks()];
        for (slot, entry) in loop_of.iter_mut().enumerate() {
            let b = BlockId(slot as u32);
            let mut best: Option<LoopId> = None;
            for (i, l) in loops.iter().enumerate() {
                if l.contains(b) && best.map_or(true, |p| sizes[i] < sizes[p]) {
                    best = Some(i);
                }
            }
            *entry = best;
        }

        LoopForest { loops, loop_of }
    }

    /// Innermost loop containing `b`, if any.
    pub fn loop_of(&self, b: BlockId) -> Option<LoopId> {
        self.loop_of[b.index()]
    }

    /// `inSubLoop`: `b` belongs to `l` but its innermost loop is deeper.
    pub fn in_sub_loop(&self, b: BlockId, l: LoopId) -> bool {
        debug_assert!(self.loops[l].contains(b));
        self.loop_of(b) != Some(l)
    }

    /// Loop indices sorted by descending depth (sub-loops before parents);
    /// ties keep discovery order.
    pub fn by_depth_descending(&self) -> Vec<LoopId> {
        let mut order: Vec<LoopId> = (0..self.loops.len()).collect();
        order.sort_by_key(|&i| std::cmp::Reverse(self.loops[i].depth));
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::parse_module;

    const NESTED: &str = "
func @n(%c: i1, %d: i1) {
entry:
  br ^outer
outer:
  condbr %c, ^inner, ^exit
inner:
  condbr %d, ^inner, ^latch
latch:
  br ^outer
exit:
  ret
}
";

    #[test]
    fn finds_nested_loops_with_depths() {
        let module = parse_module(NESTED).unwrap();
        let f = &module.functions[0];
        let doms = DomTree::compute(f);
        let forest = LoopForest::compute(f, &doms);
        assert_eq!(forest.loops.len(), 2);

        let outer_header = f.block_by_name("outer").unwrap();
        let inner_header = f.block_by_name("inner").unwrap();
        let outer = forest.loops.iter().position(|l| l.header == outer_header).unwrap();
        let inner = forest.loops.iter().position(|l| l.header == inner_header).unwrap();

        assert_eq!(forest.loops[outer].depth, 1);
        assert_eq!(forest.loops[inner].depth, 2);
        assert_eq!(forest.loops[inner].parent, Some(outer));
        assert!(forest.loops[outer].subloops.contains(&inner));
        assert!(!forest.loops[outer].is_innermost());
        assert!(forest.loops[inner].is_innermost());

        // Depth order puts the inner loop first.
        assert_eq!(forest.by_depth_descending()[0], inner);
    }

    #[test]
    fn innermost_membership_and_sub_loop_test() {
        let module = parse_module(NESTED).unwrap();
        let f = &module.functions[0];
        let doms = DomTree::compute(f);
        let forest = LoopForest::compute(f, &doms);

        let outer_header = f.block_by_name("outer").unwrap();
        let inner_header = f.block_by_name("inner").unwrap();
        let outer = forest.loops.iter().position(|l| l.header == outer_header).unwrap();

        assert_eq!(forest.loop_of(outer_header), Some(outer));
        assert!(forest.in_sub_loop(inner_header, outer));
        assert!(!forest.in_sub_loop(outer_header, outer));
        assert_eq!(forest.loop_of(f.block_by_name("exit").unwrap()), None);
    }

    #[test]
    fn preheader_is_unique_outside_predecessor() {
        let module = parse_module(
            "
func @p(%c: i1) {
entry:
  br ^header
header:
  condbr %c, ^header, ^exit
exit:
  ret
}
",
        )
        .unwrap();
        let f = &module.functions[0];
        let doms = DomTree::compute(f);
        let forest = LoopForest::compute(f, &doms);
        assert_eq!(forest.loops.len(), 1);
        assert_eq!(forest.loops[0].preheader, f.block_by_name("entry"));
    }

    #[test]
    fn loop_invariance_of_operands() {
        let module = parse_module(
            "
func @inv(%p: ptr, %c: i1) {
entry:
  %base: i64 = load %p
  br ^header
header:
  %x: i64 = add %base, 1
  condbr %c, ^header, ^exit
exit:
  ret
}
",
        )
        .unwrap();
        let f = &module.functions[0];
        let doms = DomTree::compute(f);
        let forest = LoopForest::compute(f, &doms);
        let l = &forest.loops[0];
        assert!(l.is_invariant(f, f.value_by_name("base").unwrap()));
        assert!(l.is_invariant(f, f.value_by_name("p").unwrap()));
        assert!(!l.is_invariant(f, f.value_by_name("x").unwrap()));
    }
}
