//! Structural IR checks run after rewriting in tests.
//!
//! Not a full semantic verifier: it checks the invariants the hoist rewriter
//! relies on — terminator placement, parent links, and def-use symmetry.

use super::{Function, Module, ValueId};
use crate::error::HotpathError;

pub fn verify_module(module: &Module) -> Result<(), HotpathError> {
    for func in &module.functions {
        verify_function(func)?;
    }
    Ok(())
}

pub fn verify_function(func: &Function) -> Result<(), HotpathError> {
    let malformed = |reason: String| HotpathError::MalformedIr { reason };

    for block in func.blocks() {
        let insts = func.block(block).insts();
        if insts.is_empty() {
            return Err(malformed(format!(
                "{}: block '{}' is empty",
                func.name,
                func.block(block).name
            )));
        }
        for (i, &inst) in insts.iter().enumerate() {
            let Some(data) = func.inst(inst) else {
                return Err(malformed(format!(
                    "{}: block '{}' lists a non-instruction value",
                    func.name,
                    func.block(block).name
                )));
            };
            if data.block != Some(block) {
                return Err(malformed(format!(
                    "{}: instruction %{} has a stale parent link",
                    func.name,
                    func.value(inst).name
                )));
            }
            let is_last = i + 1 == insts.len();
            if data.op.is_terminator() != is_last {
                return Err(malformed(format!(
                    "{}: block '{}' has a misplaced terminator",
                    func.name,
                    func.block(block).name
                )));
            }
        }
    }

    // Def-use symmetry: operand lists and user lists must agree on use counts.
    for v in 0..func.num_values() {
        let v = ValueId(v as u32);
        if let Some(data) = func.inst(v) {
            if data.op == super::Opcode::Phi && data.operands.len() != data.targets.len() {
                return Err(malformed(format!(
                    "{}: phi %{} has mismatched arms",
                    func.name,
                    func.value(v).name
                )));
            }
            for &operand in &data.operands {
                let uses_in_list = func.users(operand).iter().filter(|&&u| u == v).count();
                let uses_in_inst = data.operands.iter().filter(|&&o| o == operand).count();
                if uses_in_list != uses_in_inst {
                    return Err(malformed(format!(
                        "{}: def-use mismatch between %{} and its operand",
                        func.name,
                        func.value(v).name
                    )));
                }
            }
        }
    }

    Ok(())
}
