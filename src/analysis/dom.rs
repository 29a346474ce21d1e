//! Dominator and post-dominator trees.
//!
//! Both are computed with the Cooper-Harvey-Kennedy iterative algorithm over
//! RPO numbering. The post-dominator tree runs the same worker on the
//! reversed CFG with a virtual exit node joining every block that has no
//! successors.

use crate::ir::{BlockId, Function};

const UNDEF: usize = usize::MAX;

/// Intersect two dominator fingers using RPO numbering.
fn intersect(mut finger1: usize, mut finger2: usize, idom: &[usize], rpo_number: &[usize]) -> usize {
    while finger1 != finger2 {
        while rpo_number[finger1] > rpo_number[finger2] {
            finger1 = idom[finger1];
        }
        while rpo_number[finger2] > rpo_number[finger1] {
            finger2 = idom[finger2];
        }
    }
    finger1
}

fn reverse_postorder(n: usize, entry: usize, succs: &[Vec<usize>]) -> Vec<usize> {
    let mut visited = vec![false; n];
    let mut postorder = Vec::with_capacity(n);
    // Iterative DFS; the second stack entry flag marks post-visit.
    let mut stack = vec![(entry, false)];
    while let Some((node, processed)) = stack.pop() {
        if processed {
            postorder.push(node);
            continue;
        }
        if visited[node] {
            continue;
        }
        visited[node] = true;
        stack.push((node, true));
        for &succ in succs[node].iter().rev() {
            if !visited[succ] {
                stack.push((succ, false));
            }
        }
    }
    postorder.reverse();
    postorder
}

/// Compute immediate dominators; `idom[entry] == entry`, unreachable blocks
/// stay `UNDEF`.
fn compute_idom(n: usize, entry: usize, preds: &[Vec<usize>], succs: &[Vec<usize>]) -> Vec<usize> {
    let rpo = reverse_postorder(n, entry, succs);
    let mut rpo_number = vec![UNDEF; n];
    for (order, &node) in rpo.iter().enumerate() {
        rpo_number[node] = order;
    }

    let mut idom = vec![UNDEF; n];
    if rpo.is_empty() {
        return idom;
    }
    idom[entry] = entry;

    let mut changed = true;
    while changed {
        changed = false;
        for &b in rpo.iter().skip(1) {
            let mut new_idom = UNDEF;
            for &p in &preds[b] {
                if idom[p] != UNDEF {
                    new_idom = if new_idom == UNDEF {
                        p
                    } else {
                        intersect(new_idom, p, &idom, &rpo_number)
                    };
                }
            }
            if new_idom != UNDEF && idom[b] != new_idom {
                idom[b] = new_idom;
                changed = true;
            }
        }
    }
    idom
}

fn chain_dominates(idom: &[usize], a: usize, mut b: usize) -> bool {
    loop {
        if a == b {
            return true;
        }
        let up = idom[b];
        if up == UNDEF || up == b {
            return false;
        }
        b = up;
    }
}

/// Forward dominator tree: `dominates(a, b)` iff every path from the entry
/// to `b` passes through `a`.
pub struct DomTree {
    idom: Vec<usize>,
}

impl DomTree {
    pub fn compute(func: &Function) -> Self {
        let n = func.num_blocks();
        let mut succs = vec![Vec::new(); n];
        let mut preds = vec![Vec::new(); n];
        for b in func.blocks() {
            for s in func.successors(b) {
                succs[b.index()].push(s.index());
                preds[s.index()].push(b.index());
            }
        }
        DomTree {
            idom: compute_idom(n, 0, &preds, &succs),
        }
    }

    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        chain_dominates(&self.idom, a.index(), b.index())
    }

    /// Immediate dominator, if any (the entry has none).
    pub fn idom(&self, b: BlockId) -> Option<BlockId> {
        let up = self.idom[b.index()];
        if up == UNDEF || up == b.index() {
            None
        } else {
            Some(BlockId(up as u32))
        }
    }
}

/// Post-dominator tree: `post_dominates(a, b)` iff every path from `b` to
/// function exit passes through `a`.
pub struct PostDomTree {
    // Indices 0..n are blocks; index n is the virtual exit.
    ipdom: Vec<usize>,
    virtual_exit: usize,
}

impl PostDomTree {
    pub fn compute(func: &Function) -> Self {
        let n = func.num_blocks();
        let virtual_exit = n;
        // Reversed CFG with the virtual exit as entry.
        let mut succs = vec![Vec::new(); n + 1];
        let mut preds = vec![Vec::new(); n + 1];
        for b in func.blocks() {
            let fsuccs = func.successors(b);
            if fsuccs.is_empty() {
                succs[virtual_exit].push(b.index());
                preds[b.index()].push(virtual_exit);
            }
            for s in fsuccs {
                succs[s.index()].push(b.index());
                preds[b.index()].push(s.index());
            }
        }
        PostDomTree {
            ipdom: compute_idom(n + 1, virtual_exit, &preds, &succs),
            virtual_exit,
        }
    }

    pub fn post_dominates(&self, a: BlockId, b: BlockId) -> bool {
        if a.index() == self.virtual_exit || b.index() == self.virtual_exit {
            return false;
        }
        chain_dominates(&self.ipdom, a.index(), b.index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::parse_module;

    const DIAMOND: &str = "
func @d(%c: i1) {
entry:
  condbr %c, ^left, ^right
left:
  br ^join
right:
  br ^join
join:
  ret
}
";

    #[test]
    fn diamond_dominators() {
        let module = parse_module(DIAMOND).unwrap();
        let f = &module.functions[0];
        let doms = DomTree::compute(f);
        let b = |name: &str| f.block_by_name(name).unwrap();
        assert!(doms.dominates(b("entry"), b("join")));
        assert!(doms.dominates(b("entry"), b("left")));
        assert!(!doms.dominates(b("left"), b("join")));
        assert!(doms.dominates(b("join"), b("join")));
        assert_eq!(doms.idom(b("join")), Some(b("entry")));
    }

    #[test]
    fn diamond_post_dominators() {
        let module = parse_module(DIAMOND).unwrap();
        let f = &module.functions[0];
        let pdoms = PostDomTree::compute(f);
        let b = |name: &str| f.block_by_name(name).unwrap();
        assert!(pdoms.post_dominates(b("join"), b("entry")));
        assert!(pdoms.post_dominates(b("join"), b("left")));
        assert!(!pdoms.post_dominates(b("left"), b("entry")));
    }

    #[test]
    fn loop_header_dominates_body() {
        let module = parse_module(
            "
func @l(%c: i1) {
entry:
  br ^header
header:
  condbr %c, ^body, ^exit
body:
  br ^header
exit:
  ret
}
",
        )
        .unwrap();
        let f = &module.functions[0];
        let doms = DomTree::compute(f);
        let b = |name: &str| f.block_by_name(name).unwrap();
        assert!(doms.dominates(b("header"), b("body")));
        assert!(!doms.dominates(b("body"), b("header")));
    }
}
