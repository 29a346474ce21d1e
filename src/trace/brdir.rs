//! Static branch-direction table.
//!
//! For every conditional branch fed by a two-operand comparison, five
//! prioritized heuristics vote on the likely direction. Votes are keyed by
//! the comparison's `(op0, op1)` value identities, so two branches comparing
//! the same values share an entry. The table is monotone: an entry is only
//! overwritten by an equal or stronger (lower-numbered) priority.
//!
//! Direction flag `false` selects the branch's first successor (label1),
//! `true` the second (label2).

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::analysis::FunctionAnalysis;
use crate::ir::{BlockId, FloatPred, Function, IntPred, Opcode, ValueId};

/// Heuristic priorities, 1 = strongest.
const PRI_POINTER: u8 = 1;
const PRI_LOOP_HEADER: u8 = 2;
const PRI_OPCODE: u8 = 3;
const PRI_GUARD: u8 = 4;
const PRI_LOOP: u8 = 5;

#[derive(Debug, Default)]
pub struct BranchDirectionTable {
    map: HashMap<(ValueId, ValueId), (u8, bool)>,
}

impl BranchDirectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn lookup(&self, key: (ValueId, ValueId)) -> Option<(u8, bool)> {
        self.map.get(&key).copied()
    }

    fn record(&mut self, key: (ValueId, ValueId), priority: u8, taken_second: bool) {
        match self.map.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert((priority, taken_second));
            }
            Entry::Occupied(mut slot) => {
                if priority <= slot.get().0 {
                    slot.insert((priority, taken_second));
                }
            }
        }
    }

    /// Populate the table for one function. Conditional branches whose
    /// condition is not a two-operand comparison are skipped.
    pub fn build(func: &Function, analysis: &FunctionAnalysis) -> Self {
        let mut table = BranchDirectionTable::new();

        for block in func.blocks() {
            let Some(term) = func.terminator(block) else {
                continue;
            };
            if func.opcode(term) != Some(&Opcode::CondBr) {
                continue;
            }
            let cond = func.operand(term, 0);
            let Some(cond_inst) = func.inst(cond) else {
                continue;
            };
            if cond_inst.operands.len() != 2 {
                continue;
            }
            let (op0, op1) = (cond_inst.operands[0], cond_inst.operands[1]);
            let key = (op0, op1);
            let succs = [
                func.inst(term).unwrap().targets[0],
                func.inst(term).unwrap().targets[1],
            ];

            match cond_inst.op {
                Opcode::ICmp(pred) => {
                    table.apply_pointer(func, key, pred);
                    table.apply_int_opcode(func, key, pred);
                }
                Opcode::FCmp(pred) => {
                    table.apply_float_opcode(func, key, pred);
                }
                _ => continue,
            }

            table.apply_loop_header(analysis, key, succs);
            table.apply_guard(func, analysis, key, succs);
            table.apply_loop(analysis, key, succs);
        }

        log::debug!(
            "@{}: branch-direction table has {} entries",
            func.name,
            table.len()
        );
        table
    }

    /// Pointer heuristic: pointers rarely compare equal.
    fn apply_pointer(&mut self, func: &Function, key: (ValueId, ValueId), pred: IntPred) {
        if !func.ty(key.0).is_pointer() && !func.ty(key.1).is_pointer() {
            return;
        }
        match pred {
            IntPred::Eq => self.record(key, PRI_POINTER, true),
            IntPred::Ne => self.record(key, PRI_POINTER, false),
            _ => {}
        }
    }

    /// Opcode heuristic, integer flavor: comparisons against zero.
    fn apply_int_opcode(&mut self, func: &Function, key: (ValueId, ValueId), pred: IntPred) {
        if func.is_zero_const(key.0) {
            match pred {
                IntPred::Sgt | IntPred::Ugt => self.record(key, PRI_OPCODE, true),
                IntPred::Sle | IntPred::Ule => self.record(key, PRI_OPCODE, false),
                _ => {}
            }
        }
        if func.is_zero_const(key.1) {
            match pred {
                IntPred::Slt | IntPred::Ult => self.record(key, PRI_OPCODE, true),
                IntPred::Sge | IntPred::Uge => self.record(key, PRI_OPCODE, false),
                _ => {}
            }
        }
    }

    /// Opcode heuristic, floating flavor: equality without a zero test,
    /// relational against zero mirroring the integer rules.
    fn apply_float_opcode(&mut self, func: &Function, key: (ValueId, ValueId), pred: FloatPred) {
        match pred {
            FloatPred::Oeq | FloatPred::Ueq => self.record(key, PRI_OPCODE, true),
            FloatPred::One | FloatPred::Une => self.record(key, PRI_OPCODE, false),
            _ => {}
        }
        if func.is_zero_const(key.0) {
            match pred {
                FloatPred::Ogt | FloatPred::Ugt => self.record(key, PRI_OPCODE, true),
                FloatPred::Ole | FloatPred::Ule => self.record(key, PRI_OPCODE, false),
                _ => {}
            }
        }
        if func.is_zero_const(key.1) {
            match pred {
                FloatPred::Olt | FloatPred::Ult => self.record(key, PRI_OPCODE, true),
                FloatPred::Oge | FloatPred::Uge => self.record(key, PRI_OPCODE, false),
                _ => {}
            }
        }
    }

    /// Loop-header heuristic: prefer the successor that is a loop
    /// pre-header, when exactly one side is.
    fn apply_loop_header(
        &mut self,
        analysis: &FunctionAnalysis,
        key: (ValueId, ValueId),
        succs: [BlockId; 2],
    ) {
        let is_preheader =
            |b: BlockId| analysis.loops.loops.iter().any(|l| l.preheader == Some(b));
        match (is_preheader(succs[0]), is_preheader(succs[1])) {
            (true, false) => self.record(key, PRI_LOOP_HEADER, false),
            (false, true) => self.record(key, PRI_LOOP_HEADER, true),
            _ => {}
        }
    }

    /// Guard heuristic: prefer the successor that post-dominates a block
    /// using one of the compared values, when exactly one side does.
    fn apply_guard(
        &mut self,
        func: &Function,
        analysis: &FunctionAnalysis,
        key: (ValueId, ValueId),
        succs: [BlockId; 2],
    ) {
        let mut use_blocks: Vec<BlockId> = Vec::new();
        for &operand in &[key.0, key.1] {
            for &user in func.users(operand) {
                if let Some(parent) = func.parent(user) {
                    if !use_blocks.contains(&parent) {
                        use_blocks.push(parent);
                    }
                }
            }
        }
        let leads_to_use = |succ: BlockId| {
            use_blocks
                .iter()
                .any(|&b| analysis.postdoms.post_dominates(succ, b))
        };
        match (leads_to_use(succs[0]), leads_to_use(succs[1])) {
            (true, false) => self.record(key, PRI_GUARD, false),
            (false, true) => self.record(key, PRI_GUARD, true),
            _ => {}
        }
    }

    /// Loop heuristic: prefer the successor inside a loop, when exactly one
    /// side is a loop member.
    fn apply_loop(
        &mut self,
        analysis: &FunctionAnalysis,
        key: (ValueId, ValueId),
        succs: [BlockId; 2],
    ) {
        let in_loop = |b: BlockId| analysis.loops.loop_of(b).is_some();
        match (in_loop(succs[0]), in_loop(succs[1])) {
            (true, false) => self.record(key, PRI_LOOP, false),
            (false, true) => self.record(key, PRI_LOOP, true),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::parse_module;

    fn build_for(text: &str) -> (crate::ir::Module, BranchDirectionTable) {
        let module = parse_module(text).unwrap();
        let analysis = FunctionAnalysis::compute(&module.functions[0]);
        let table = BranchDirectionTable::build(&module.functions[0], &analysis);
        (module, table)
    }

    #[test]
    fn pointer_inequality_predicts_first_successor() {
        // icmp ne on pointers yields (priority 1, direction false).
        let (module, table) = build_for(
            "
func @ptrcmp(%p: ptr, %q: ptr) {
entry:
  %cond: i1 = icmp ne %p, %q
  condbr %cond, ^l1, ^l2
l1:
  ret
l2:
  ret
}
",
        );
        let f = &module.functions[0];
        let key = (
            f.value_by_name("p").unwrap(),
            f.value_by_name("q").unwrap(),
        );
        assert_eq!(table.lookup(key), Some((1, false)));
    }

    #[test]
    fn zero_compare_opcode_heuristic() {
        let (module, table) = build_for(
            "
func @z(%n: i64) {
entry:
  %cond: i1 = icmp slt %n, 0
  condbr %cond, ^neg, ^pos
neg:
  ret
pos:
  ret
}
",
        );
        let f = &module.functions[0];
        let n = f.value_by_name("n").unwrap();
        let zero = f.operands(f.value_by_name("cond").unwrap())[1];
        assert_eq!(table.lookup((n, zero)), Some((3, true)));
    }

    #[test]
    fn stronger_priorities_are_never_overwritten() {
        // The same operand pair feeds two branches; the pointer heuristic
        // (priority 1) from the first must survive the second's weaker votes.
        let (module, table) = build_for(
            "
func @m(%p: ptr, %q: ptr, %c: i1) {
entry:
  %a: i1 = icmp eq %p, %q
  condbr %a, ^mid, ^out
mid:
  %b: i1 = icmp ne %p, %q
  condbr %b, ^loop, ^out
loop:
  condbr %c, ^loop, ^out
out:
  ret
}
",
        );
        let f = &module.functions[0];
        let key = (
            f.value_by_name("p").unwrap(),
            f.value_by_name("q").unwrap(),
        );
        // Both branches vote at priority 1; the later (ne -> false) wins the
        // equal-priority overwrite. A weaker loop heuristic vote cannot.
        let (priority, _) = table.lookup(key).unwrap();
        assert_eq!(priority, 1);
    }

    #[test]
    fn loop_member_successor_wins_at_priority_five() {
        // Diamond so the guard heuristic stays symmetric; only the loop
        // heuristic can break the tie.
        let (module, table) = build_for(
            "
func @l(%a: i64, %b: i64, %c: i1) {
entry:
  %cond: i1 = icmp eq %a, %b
  condbr %cond, ^bypass, ^loop
bypass:
  br ^join
loop:
  condbr %c, ^loop, ^join
join:
  ret
}
",
        );
        let f = &module.functions[0];
        let key = (
            f.value_by_name("a").unwrap(),
            f.value_by_name("b").unwrap(),
        );
        assert_eq!(table.lookup(key), Some((5, true)));
    }

    #[test]
    fn non_comparison_conditions_are_skipped() {
        let (_, table) = build_for(
            "
func @s(%c: i1) {
entry:
  condbr %c, ^a, ^b
a:
  ret
b:
  ret
}
",
        );
        assert!(table.is_empty());
    }
}
