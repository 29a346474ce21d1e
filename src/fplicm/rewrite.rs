//! The SSA-preserving hoist transformation.
//!
//! Correctness variant, per unique address: a `home` alloca and a hoisted
//! load + store land in the pre-header, in-loop reads of the address are
//! redirected to `home`, and every defeater gains a follow-up store that
//! refreshes `home` with the value it just wrote. Defeater stores keep
//! their original destination, so the real address still sees every write.
//!
//! Performance variant, per candidate: the load and its almost-invariant
//! chain move into the pre-header, the chain tail is parked in `home`, a
//! reload at the tail's former position feeds the remaining in-loop users,
//! and each defeater gets a remapped clone of the chain plus a store of the
//! cloned tail into `home`. An empty chain degenerates into the correctness
//! rewrite.
//!
//! All candidates are validated before the first mutation; a validation
//! failure leaves the loop untouched.

use std::collections::HashMap;

use crate::error::RewriteAbort;
use crate::ir::{BlockId, Function, Opcode, Ty, ValueId};

use super::candidates::HoistCandidate;

/// The fix-up clones substitute the defeating store's value for the hoisted
/// load, so the two must agree on type. Checked for every candidate up
/// front so a failure aborts the whole loop with no partial write.
pub fn validate(func: &Function, candidates: &[HoistCandidate]) -> Result<(), RewriteAbort> {
    for candidate in candidates {
        let expected = func.ty(candidate.load);
        for &defeater in &candidate.defeaters {
            let found = func.ty(func.operand(defeater, 0));
            if found != expected {
                return Err(RewriteAbort::OperandTypeMismatch {
                    expected: expected.name().to_string(),
                    found: found.name().to_string(),
                });
            }
        }
    }
    Ok(())
}

fn new_store(func: &mut Function, value: ValueId, addr: ValueId) -> ValueId {
    func.new_inst(
        "",
        Ty::Void,
        Opcode::Store { atomic: false },
        vec![value, addr],
        vec![],
    )
}

/// Correctness rewrite: one home slot per unique address.
pub fn rewrite_correctness(
    func: &mut Function,
    preheader: BlockId,
    candidates: &[HoistCandidate],
) {
    // Group candidates by address, keeping first-encounter order; the first
    // load of each group is the one that gets hoisted.
    let mut groups: Vec<(ValueId, Vec<&HoistCandidate>)> = Vec::new();
    for candidate in candidates {
        match groups.iter_mut().find(|(addr, _)| *addr == candidate.addr) {
            Some((_, group)) => group.push(candidate),
            None => groups.push((candidate.addr, vec![candidate])),
        }
    }

    for (addr, group) in groups {
        let load = group[0].load;
        hoist_single_load(func, preheader, load, addr, &collect_defeaters(&group));
    }
}

fn collect_defeaters(group: &[&HoistCandidate]) -> Vec<ValueId> {
    let mut defeaters = Vec::new();
    for candidate in group {
        for &d in &candidate.defeaters {
            if !defeaters.contains(&d) {
                defeaters.push(d);
            }
        }
    }
    defeaters
}

/// The chain-less hoist shared by the correctness variant and the
/// performance variant's degenerate case.
fn hoist_single_load(
    func: &mut Function,
    preheader: BlockId,
    load: ValueId,
    addr: ValueId,
    defeaters: &[ValueId],
) {
    let load_ty = func.ty(load);
    let home_name = func.fresh_name("home");
    let home = func.new_inst(home_name, Ty::Ptr, Opcode::Alloca(load_ty), vec![], vec![]);
    func.insert_before_terminator(home, preheader);

    let hoist_name = func.fresh_name("hoist");
    let hoisted = func.new_inst(
        hoist_name,
        load_ty,
        Opcode::Load { atomic: false },
        vec![addr],
        vec![],
    );
    func.insert_before_terminator(hoisted, preheader);

    let park = new_store(func, hoisted, home);
    func.insert_before_terminator(park, preheader);

    // Reads of the address (in the loop and beyond) now go through the
    // home slot. Only load users are redirected: defeater stores keep
    // writing the real address, and the pre-header's hoisting load is
    // untouched.
    let readers: Vec<ValueId> = func
        .users(addr)
        .iter()
        .copied()
        .filter(|&user| {
            matches!(func.opcode(user), Some(Opcode::Load { .. }))
                && func.parent(user) != Some(preheader)
        })
        .collect();
    for reader in readers {
        func.replace_operand(reader, addr, home);
    }

    // Each defeater refreshes the home slot with the value it just wrote.
    for &defeater in defeaters {
        let value = func.operand(defeater, 0);
        let fixup = new_store(func, value, home);
        func.insert_after(fixup, defeater);
    }
}

/// Performance rewrite: hoist the load plus its almost-invariant chain.
pub fn rewrite_performance(
    func: &mut Function,
    preheader: BlockId,
    candidates: &[HoistCandidate],
) {
    for candidate in candidates {
        if candidate.chain.is_empty() {
            hoist_single_load(
                func,
                preheader,
                candidate.load,
                candidate.addr,
                &candidate.defeaters,
            );
            continue;
        }
        hoist_chain(func, preheader, candidate);
    }
}

fn hoist_chain(func: &mut Function, preheader: BlockId, candidate: &HoistCandidate) {
    let tail = *candidate.chain.last().unwrap();
    let tail_ty = func.ty(tail);

    let home_name = func.fresh_name("home");
    let home = func.new_inst(home_name, Ty::Ptr, Opcode::Alloca(tail_ty), vec![], vec![]);
    func.insert_before_terminator(home, preheader);

    let park = new_store(func, tail, home);
    func.insert_before_terminator(park, preheader);

    // Reload at the tail's original position, before the chain moves out.
    let reload_name = func.fresh_name("reload");
    let reload = func.new_inst(
        reload_name,
        tail_ty,
        Opcode::Load { atomic: false },
        vec![home],
        vec![],
    );
    func.insert_after(reload, tail);

    func.move_before(candidate.load, home);
    for &link in &candidate.chain {
        func.move_before(link, home);
    }

    // Downstream in-loop users of the tail read the home slot instead. The
    // parking store sits in the pre-header and keeps the tail itself.
    func.replace_uses_outside_block(tail, reload, preheader);

    // Fix-up: clone the chain before each defeater, sourcing the hoisted
    // load from the value the store wrote, then refresh the home slot.
    for &defeater in &candidate.defeaters {
        let mut vmap: HashMap<ValueId, ValueId> = HashMap::new();
        vmap.insert(candidate.load, func.operand(defeater, 0));
        for &link in &candidate.chain {
            let clone = func.clone_inst(link);
            func.remap_operands(clone, &vmap);
            func.insert_before(clone, defeater);
            vmap.insert(link, clone);
        }
        let fixup = new_store(func, vmap[&tail], home);
        func.insert_before(fixup, defeater);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::FunctionAnalysis;
    use crate::fplicm::candidates::find_candidates;
    use crate::fplicm::freq_path::discover;
    use crate::ir::verify::verify_function;
    use crate::ir::parse_module;

    const HOIST_LOOP: &str = "
func @hoist(%slot: ptr, %c: i1, %d: i1) {
entry:
  br ^header
header:
  condbr %c, ^freq, ^rare !prob 0.9, 0.1
freq:
  %x: i32 = load %slot
  br ^latch
rare:
  store 5:i32, %slot
  br ^latch
latch:
  condbr %d, ^header, ^exit !prob 0.95, 0.05
exit:
  ret
}
";

    fn apply(text: &str, performance: bool) -> crate::ir::Module {
        let mut module = parse_module(text).unwrap();
        let func = &mut module.functions[0];
        let analysis = FunctionAnalysis::compute(func);
        let lp = &analysis.loops.loops[0];
        let preheader = lp.preheader.unwrap();
        let path = discover(func, lp).unwrap();
        let candidates = find_candidates(func, lp, &path, performance);
        assert!(!candidates.is_empty());
        validate(func, &candidates).unwrap();
        if performance {
            rewrite_performance(func, preheader, &candidates);
        } else {
            rewrite_correctness(func, preheader, &candidates);
        }
        verify_function(func).unwrap();
        module
    }

    #[test]
    fn correctness_rewrite_builds_home_slot() {
        let module = apply(HOIST_LOOP, false);
        let f = &module.functions[0];
        let entry = f.block_by_name("entry").unwrap();

        // Pre-header gains alloca + hoisting load + store before its branch.
        let insts = f.block(entry).insts();
        assert_eq!(insts.len(), 4);
        assert!(matches!(f.opcode(insts[0]), Some(Opcode::Alloca(Ty::I32))));
        assert!(matches!(f.opcode(insts[1]), Some(Opcode::Load { .. })));
        assert!(matches!(f.opcode(insts[2]), Some(Opcode::Store { .. })));
        let home = insts[0];
        let slot = f.value_by_name("slot").unwrap();
        assert_eq!(f.operand(insts[1], 0), slot);
        assert_eq!(f.operands(insts[2]), &[insts[1], home]);

        // The in-loop load now reads the home slot.
        let x = f.value_by_name("x").unwrap();
        assert_eq!(f.operand(x, 0), home);

        // The defeater block gained a follow-up store into home.
        let rare = f.block_by_name("rare").unwrap();
        let rare_insts = f.block(rare).insts();
        assert_eq!(rare_insts.len(), 3);
        assert!(matches!(f.opcode(rare_insts[1]), Some(Opcode::Store { .. })));
        assert_eq!(f.operand(rare_insts[1], 1), home);
        // It stores the same value the original store wrote, and the
        // original store still writes the real address.
        assert_eq!(f.operand(rare_insts[1], 0), f.operand(rare_insts[0], 0));
        assert_eq!(f.operand(rare_insts[0], 1), slot);
    }

    #[test]
    fn correctness_rewrite_shares_home_between_same_address_loads() {
        let text = HOIST_LOOP.replace(
            "  %x: i32 = load %slot\n",
            "  %x: i32 = load %slot\n  %x2: i32 = load %slot\n",
        );
        let module = apply(&text, false);
        let f = &module.functions[0];
        let entry = f.block_by_name("entry").unwrap();
        // Exactly one home slot despite two candidate loads.
        let allocas = f
            .block(entry)
            .insts()
            .iter()
            .filter(|&&i| matches!(f.opcode(i), Some(Opcode::Alloca(_))))
            .count();
        assert_eq!(allocas, 1);
        // Both loads read the home slot.
        let home = f.block(entry).insts()[0];
        assert_eq!(f.operand(f.value_by_name("x").unwrap(), 0), home);
        assert_eq!(f.operand(f.value_by_name("x2").unwrap(), 0), home);
    }

    const CHAIN_LOOP: &str = "
func @chain(%slot: ptr, %q: ptr, %c: i1, %d: i1) {
entry:
  br ^header
header:
  condbr %c, ^freq, ^rare !prob 0.9, 0.1
freq:
  %x: i32 = load %slot
  %y: i32 = add %x, 1:i32
  store %y, %q
  br ^latch
rare:
  store 5:i32, %slot
  br ^latch
latch:
  condbr %d, ^header, ^exit !prob 0.95, 0.05
exit:
  ret
}
";

    #[test]
    fn performance_rewrite_hoists_the_chain() {
        // The chain moves to the pre-header; a reload of
        // home replaces in-loop uses of y; the defeater gets cloned fix-up.
        let module = apply(CHAIN_LOOP, true);
        let f = &module.functions[0];
        let entry = f.block_by_name("entry").unwrap();
        let x = f.value_by_name("x").unwrap();
        let y = f.value_by_name("y").unwrap();

        // Pre-header: load, add, alloca, store-to-home, branch.
        let insts = f.block(entry).insts();
        assert_eq!(insts.len(), 5);
        assert_eq!(insts[0], x);
        assert_eq!(insts[1], y);
        assert!(matches!(f.opcode(insts[2]), Some(Opcode::Alloca(Ty::I32))));
        let home = insts[2];
        assert_eq!(f.operands(insts[3]), &[y, home]);

        // The frequent block now reloads from home and stores the reload.
        let freq = f.block_by_name("freq").unwrap();
        let freq_insts = f.block(freq).insts();
        assert_eq!(freq_insts.len(), 2);
        let reload = freq_insts[0];
        assert!(matches!(f.opcode(reload), Some(Opcode::Load { .. })));
        assert_eq!(f.operand(reload, 0), home);
        let user_store = freq_insts[1];
        assert_eq!(f.operand(user_store, 0), reload);

        // Defeater fix-up: cloned add sourced from the stored value, then a
        // store of the clone into home, all before the original store...
        let rare = f.block_by_name("rare").unwrap();
        let rare_insts = f.block(rare).insts();
        assert_eq!(rare_insts.len(), 4);
        let clone = rare_insts[0];
        assert!(matches!(f.opcode(clone), Some(Opcode::Bin(_))));
        let original_store = rare_insts[2];
        assert_eq!(f.operand(clone, 0), f.operand(original_store, 0));
        let refresh = rare_insts[1];
        assert_eq!(f.operands(refresh), &[clone, home]);
        // ...and the original store is retained.
        let slot = f.value_by_name("slot").unwrap();
        assert_eq!(f.operand(original_store, 1), slot);
    }

    #[test]
    fn type_mismatch_aborts_validation() {
        let module = parse_module(
            "
func @bad(%slot: ptr, %c: i1, %d: i1) {
entry:
  br ^header
header:
  condbr %c, ^freq, ^rare !prob 0.9, 0.1
freq:
  %x: i32 = load %slot
  br ^latch
rare:
  store 5, %slot
  br ^latch
latch:
  condbr %d, ^header, ^exit !prob 0.95, 0.05
exit:
  ret
}
",
        )
        .unwrap();
        let f = &module.functions[0];
        let analysis = FunctionAnalysis::compute(f);
        let lp = &analysis.loops.loops[0];
        let path = discover(f, lp).unwrap();
        let candidates = find_candidates(f, lp, &path, false);
        // The store writes an i64 literal where the load reads i32.
        assert!(validate(f, &candidates).is_err());
    }
}
