//! Hoist candidate analysis.
//!
//! A candidate is a load in a frequent-path block whose address is written
//! only on the infrequent path: any store writing the address from a
//! frequent block disqualifies the load, and the infrequent writers become
//! the candidate's defeaters (each will need fix-up code).
//!
//! The performance variant additionally grows the load's almost-invariant
//! chain: frequent-path consumers whose operands are all loop-invariant or
//! earlier chain members. The breadth-first construction keeps the chain in
//! dataflow order.

use std::collections::{HashSet, VecDeque};

use crate::analysis::Loop;
use crate::ir::{Function, Opcode, ValueId};

use super::freq_path::FrequentPath;

#[derive(Debug)]
pub struct HoistCandidate {
    pub load: ValueId,
    pub addr: ValueId,
    /// Infrequent-path stores that may invalidate the hoisted value.
    pub defeaters: Vec<ValueId>,
    /// Almost-invariant consumers in dataflow order (empty in the
    /// correctness variant; excludes the load itself).
    pub chain: Vec<ValueId>,
}

/// Collect the loop's hoist candidates, walking frequent blocks in
/// discovery order.
pub fn find_candidates(
    func: &Function,
    lp: &Loop,
    path: &FrequentPath,
    with_chains: bool,
) -> Vec<HoistCandidate> {
    let mut candidates = Vec::new();
    for &block in &path.order {
        for &inst in func.block(block).insts() {
            if !matches!(func.opcode(inst), Some(Opcode::Load { .. })) {
                continue;
            }
            let addr = func.operand(inst, 0);
            let mut defeaters = Vec::new();
            let mut disqualified = false;
            for &user in func.users(addr) {
                if !matches!(func.opcode(user), Some(Opcode::Store { .. })) {
                    continue;
                }
                // A store that forwards the pointer as a value does not
                // write through it.
                if func.operand(user, 1) != addr {
                    continue;
                }
                let Some(parent) = func.parent(user) else {
                    continue;
                };
                if path.contains(parent) {
                    disqualified = true;
                    break;
                }
                if lp.contains(parent) && !defeaters.contains(&user) {
                    defeaters.push(user);
                }
            }
            if disqualified || defeaters.is_empty() {
                continue;
            }
            let chain = if with_chains {
                grow_chain(func, lp, path, inst, addr)
            } else {
                Vec::new()
            };
            candidates.push(HoistCandidate {
                load: inst,
                addr,
                defeaters,
                chain,
            });
        }
    }
    candidates
}

/// Breadth-first walk over the load's consumers. A consumer joins the chain
/// when it sits on the frequent path, is not a store or phi, and every one
/// of its operands is loop-invariant or already almost-invariant.
fn grow_chain(
    func: &Function,
    lp: &Loop,
    path: &FrequentPath,
    load: ValueId,
    addr: ValueId,
) -> Vec<ValueId> {
    let mut almost_invariant: HashSet<ValueId> = HashSet::new();
    almost_invariant.insert(addr);
    almost_invariant.insert(load);

    let mut chain = Vec::new();
    let mut queue: VecDeque<ValueId> = func.users(load).iter().copied().collect();

    while let Some(consumer) = queue.pop_front() {
        if almost_invariant.contains(&consumer) {
            continue;
        }
        let Some(parent) = func.parent(consumer) else {
            continue;
        };
        if !path.contains(parent) {
            continue;
        }
        // Stores stay put (they are defeat-checked separately) and phis are
        // pinned to their block head.
        if matches!(
            func.opcode(consumer),
            Some(Opcode::Store { .. }) | Some(Opcode::Phi)
        ) {
            continue;
        }
        let invariant = func
            .operands(consumer)
            .iter()
            .all(|&op| lp.is_invariant(func, op) || almost_invariant.contains(&op));
        if !invariant {
            continue;
        }
        chain.push(consumer);
        almost_invariant.insert(consumer);
        queue.extend(func.users(consumer).iter().copied());
    }

    if !chain.is_empty() {
        log::debug!(
            "@{}: chain for %{}: {:?}",
            func.name,
            func.value(load).name,
            chain
                .iter()
                .map(|&c| func.value(c).name.clone())
                .collect::<Vec<_>>()
        );
    }
    chain
}
