//! Hazard classification for trace eligibility.
//!
//! A block is hazardous when it contains a control-flow boundary (call,
//! return, indirect branch), a synchronization instruction, or an ambiguous
//! store — one whose destination cannot be proven to be a compile-time-known
//! local slot.

use crate::ir::{BlockId, Function, Opcode, ValueId};

/// Whether `block` contains any trace hazard.
pub fn contains_hazard(func: &Function, block: BlockId) -> bool {
    for &inst in func.block(block).insts() {
        let op = func.opcode(inst).expect("block lists only instructions");
        if op.is_atomic() {
            return true;
        }
        match op {
            Opcode::Call | Opcode::Ret | Opcode::IndirectBr => return true,
            Opcode::Store { .. } => {
                if !is_known_local(func, func.operand(inst, 1)) {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}

/// A store destination is provably local when it is an alloca directly, or a
/// getelementptr with all-constant indices whose base is an alloca.
fn is_known_local(func: &Function, dest: ValueId) -> bool {
    match func.opcode(dest) {
        Some(Opcode::Alloca(_)) => true,
        Some(Opcode::GetElementPtr) => {
            let base = func.operand(dest, 0);
            matches!(func.opcode(base), Some(Opcode::Alloca(_)))
                && func.operands(dest)[1..]
                    .iter()
                    .all(|&idx| func.const_value(idx).is_some())
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::parse_module;

    fn hazard_of(body: &str) -> bool {
        let text = format!(
            "func @f(%p: ptr, %v: i32) {{\nentry:\n  %s: ptr = alloca i32\n  br ^b\nb:\n{}\n  br ^exit\nexit:\n  ret\n}}",
            body
        );
        let module = parse_module(&text).unwrap();
        let f = &module.functions[0];
        contains_hazard(f, f.block_by_name("b").unwrap())
    }

    #[test]
    fn calls_returns_and_indirect_branches_are_hazards() {
        assert!(hazard_of("  call @external()"));
        let module = parse_module("func @f() {\nentry:\n  ret\n}").unwrap();
        let f = &module.functions[0];
        assert!(contains_hazard(f, f.entry_block()));
    }

    #[test]
    fn atomics_are_hazards() {
        assert!(hazard_of("  fence"));
        assert!(hazard_of("  %old: i32 = atomicrmw add %s, %v"));
        assert!(hazard_of("  %r: i32 = cmpxchg %s, %v, %v"));
        assert!(hazard_of("  %x: i32 = load atomic %s"));
    }

    #[test]
    fn store_to_alloca_is_not_a_hazard() {
        assert!(!hazard_of("  store %v, %s"));
        assert!(!hazard_of("  %q: ptr = gep %s, 0, 4\n  store %v, %q"));
    }

    #[test]
    fn ambiguous_stores_are_hazards() {
        // Unknown pointer (argument).
        assert!(hazard_of("  store %v, %p"));
        // GEP with a non-constant index.
        assert!(hazard_of("  %i: i64 = load %s\n  %q: ptr = gep %s, %i\n  store %v, %q"));
        // GEP off a non-alloca base.
        assert!(hazard_of("  %q: ptr = gep %p, 0\n  store %v, %q"));
    }

    #[test]
    fn plain_arithmetic_is_not_a_hazard() {
        assert!(!hazard_of("  %x: i32 = add %v, 1:i32"));
    }
}
