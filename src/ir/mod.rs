//! SSA intermediate representation the optimization passes operate on.
//!
//! The IR is deliberately small: functions hold a flat value table (arguments,
//! interned constants, and instructions all share the [`ValueId`] space) plus
//! an ordered list of basic blocks. Def-use back-edges are maintained by the
//! mutators, so passes can walk `users(v)` without rescanning the function.
//!
//! The text format (values `%name`, blocks `^name`, comments `;`) is handled
//! by [`parser`]; [`Function`]'s `Display` impl prints the same format back.
//! Profile metadata rides along in the IR itself: blocks may carry a
//! `!count N` execution count and conditional branches a `!prob p0, p1`
//! weight annotation, which the analysis layer turns into fixed-point branch
//! probabilities.

use std::collections::HashMap;
use std::fmt;

pub mod parser;
pub mod verify;

pub use parser::parse_module;

/// Function-unique identity of a value (argument, constant, or instruction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

impl ValueId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Function-unique identity of a basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Value types. `Ptr` is untyped like a modern opaque pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ty {
    I1,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Ptr,
    Void,
}

impl Ty {
    pub fn is_pointer(self) -> bool {
        self == Ty::Ptr
    }

    pub fn is_float(self) -> bool {
        matches!(self, Ty::F32 | Ty::F64)
    }

    pub fn name(self) -> &'static str {
        match self {
            Ty::I1 => "i1",
            Ty::I8 => "i8",
            Ty::I16 => "i16",
            Ty::I32 => "i32",
            Ty::I64 => "i64",
            Ty::F32 => "f32",
            Ty::F64 => "f64",
            Ty::Ptr => "ptr",
            Ty::Void => "void",
        }
    }

    pub fn from_name(s: &str) -> Option<Ty> {
        Some(match s {
            "i1" => Ty::I1,
            "i8" => Ty::I8,
            "i16" => Ty::I16,
            "i32" => Ty::I32,
            "i64" => Ty::I64,
            "f32" => Ty::F32,
            "f64" => Ty::F64,
            "ptr" => Ty::Ptr,
            "void" => Ty::Void,
            _ => return None,
        })
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Constant payloads. Constants are interned per function so that two
/// textual occurrences of the same literal share a [`ValueId`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstValue {
    Int(i64),
    Float(f64),
    Null,
}

impl ConstValue {
    pub fn is_zero(&self) -> bool {
        match *self {
            ConstValue::Int(v) => v == 0,
            ConstValue::Float(v) => v == 0.0,
            ConstValue::Null => true,
        }
    }
}

/// Integer comparison predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntPred {
    Eq,
    Ne,
    Sgt,
    Sge,
    Slt,
    Sle,
    Ugt,
    Uge,
    Ult,
    Ule,
}

impl IntPred {
    pub fn name(self) -> &'static str {
        match self {
            IntPred::Eq => "eq",
            IntPred::Ne => "ne",
            IntPred::Sgt => "sgt",
            IntPred::Sge => "sge",
            IntPred::Slt => "slt",
            IntPred::Sle => "sle",
            IntPred::Ugt => "ugt",
            IntPred::Uge => "uge",
            IntPred::Ult => "ult",
            IntPred::Ule => "ule",
        }
    }

    pub fn from_name(s: &str) -> Option<IntPred> {
        Some(match s {
            "eq" => IntPred::Eq,
            "ne" => IntPred::Ne,
            "sgt" => IntPred::Sgt,
            "sge" => IntPred::Sge,
            "slt" => IntPred::Slt,
            "sle" => IntPred::Sle,
            "ugt" => IntPred::Ugt,
            "uge" => IntPred::Uge,
            "ult" => IntPred::Ult,
            "ule" => IntPred::Ule,
            _ => return None,
        })
    }
}

/// Floating-point comparison predicates (ordered and unordered flavors).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatPred {
    Oeq,
    One,
    Ogt,
    Oge,
    Olt,
    Ole,
    Ueq,
    Une,
    Ugt,
    Uge,
    Ult,
    Ule,
}

impl FloatPred {
    pub fn name(self) -> &'static str {
        match self {
            FloatPred::Oeq => "oeq",
            FloatPred::One => "one",
            FloatPred::Ogt => "ogt",
            FloatPred::Oge => "oge",
            FloatPred::Olt => "olt",
            FloatPred::Ole => "ole",
            FloatPred::Ueq => "ueq",
            FloatPred::Une => "une",
            FloatPred::Ugt => "ugt",
            FloatPred::Uge => "uge",
            FloatPred::Ult => "ult",
            FloatPred::Ule => "ule",
        }
    }

    pub fn from_name(s: &str) -> Option<FloatPred> {
        Some(match s {
            "oeq" => FloatPred::Oeq,
            "one" => FloatPred::One,
            "ogt" => FloatPred::Ogt,
            "oge" => FloatPred::Oge,
            "olt" => FloatPred::Olt,
            "ole" => FloatPred::Ole,
            "ueq" => FloatPred::Ueq,
            "une" => FloatPred::Une,
            "ugt" => FloatPred::Ugt,
            "uge" => FloatPred::Uge,
            "ult" => FloatPred::Ult,
            "ule" => FloatPred::Ule,
            _ => return None,
        })
    }
}

/// Binary arithmetic and bitwise operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Sdiv,
    Udiv,
    Srem,
    Urem,
    And,
    Or,
    Xor,
    Shl,
    Lshr,
    Ashr,
    Fadd,
    Fsub,
    Fmul,
    Fdiv,
}

impl BinOp {
    pub fn name(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Sdiv => "sdiv",
            BinOp::Udiv => "udiv",
            BinOp::Srem => "srem",
            BinOp::Urem => "urem",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Shl => "shl",
            BinOp::Lshr => "lshr",
            BinOp::Ashr => "ashr",
            BinOp::Fadd => "fadd",
            BinOp::Fsub => "fsub",
            BinOp::Fmul => "fmul",
            BinOp::Fdiv => "fdiv",
        }
    }

    pub fn from_name(s: &str) -> Option<BinOp> {
        Some(match s {
            "add" => BinOp::Add,
            "sub" => BinOp::Sub,
            "mul" => BinOp::Mul,
            "sdiv" => BinOp::Sdiv,
            "udiv" => BinOp::Udiv,
            "srem" => BinOp::Srem,
            "urem" => BinOp::Urem,
            "and" => BinOp::And,
            "or" => BinOp::Or,
            "xor" => BinOp::Xor,
            "shl" => BinOp::Shl,
            "lshr" => BinOp::Lshr,
            "ashr" => BinOp::Ashr,
            "fadd" => BinOp::Fadd,
            "fsub" => BinOp::Fsub,
            "fmul" => BinOp::Fmul,
            "fdiv" => BinOp::Fdiv,
            _ => return None,
        })
    }
}

/// Instruction opcodes.
#[derive(Debug, Clone, PartialEq)]
pub enum Opcode {
    /// Stack slot; carries the allocated type (the result is `ptr`).
    Alloca(Ty),
    Load { atomic: bool },
    /// Operand 0 is the stored value, operand 1 the destination address.
    Store { atomic: bool },
    /// Operand 0 is the base address, remaining operands are indices.
    GetElementPtr,
    Bin(BinOp),
    ICmp(IntPred),
    FCmp(FloatPred),
    Br,
    CondBr,
    IndirectBr,
    Ret,
    Call,
    Phi,
    CmpXchg,
    AtomicRmw(BinOp),
    Fence,
}

impl Opcode {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Opcode::Br | Opcode::CondBr | Opcode::IndirectBr | Opcode::Ret
        )
    }

    /// Whether this instruction is a synchronization operation.
    pub fn is_atomic(&self) -> bool {
        matches!(
            self,
            Opcode::Load { atomic: true }
                | Opcode::Store { atomic: true }
                | Opcode::CmpXchg
                | Opcode::AtomicRmw(_)
                | Opcode::Fence
        )
    }
}

/// Instruction payload inside a [`ValueData`].
#[derive(Debug, Clone, PartialEq)]
pub struct InstData {
    pub op: Opcode,
    pub operands: Vec<ValueId>,
    /// Successor blocks for branches; incoming blocks for phis.
    pub targets: Vec<BlockId>,
    /// Optional branch weights aligned with `targets` (raw fractions; the
    /// analysis layer converts to fixed-point probabilities).
    pub probs: Option<Vec<f64>>,
    /// Callee name for `call`.
    pub callee: Option<String>,
    /// Parent block; `None` while detached.
    pub block: Option<BlockId>,
}

/// What a value is.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    Arg,
    Const(ConstValue),
    Inst(InstData),
}

/// One entry in a function's value table.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueData {
    pub name: String,
    pub ty: Ty,
    pub kind: ValueKind,
}

/// A basic block: a name, an ordered instruction list, and an optional
/// profile execution count.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockData {
    pub name: String,
    insts: Vec<ValueId>,
    pub count: Option<u64>,
}

impl BlockData {
    pub fn insts(&self) -> &[ValueId] {
        &self.insts
    }
}

/// Key used to intern constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ConstKey {
    ty: Ty,
    bits: u64,
    tag: u8,
}

fn const_key(ty: Ty, value: &ConstValue) -> ConstKey {
    match *value {
        ConstValue::Int(v) => ConstKey { ty, bits: v as u64, tag: 0 },
        ConstValue::Float(v) => ConstKey { ty, bits: v.to_bits(), tag: 1 },
        ConstValue::Null => ConstKey { ty, bits: 0, tag: 2 },
    }
}

/// A module is an ordered list of functions.
#[derive(Debug, Default)]
pub struct Module {
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// A function: arguments, interned constants, instructions, blocks.
///
/// The value table is append-only, so a [`ValueId`] stays valid for the
/// function's lifetime even while the rewriter inserts and moves
/// instructions.
#[derive(Debug)]
pub struct Function {
    pub name: String,
    values: Vec<ValueData>,
    users: Vec<Vec<ValueId>>,
    blocks: Vec<BlockData>,
    args: Vec<ValueId>,
    consts: HashMap<ConstKey, ValueId>,
    next_tmp: u32,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Function {
            name: name.into(),
            values: Vec::new(),
            users: Vec::new(),
            blocks: Vec::new(),
            args: Vec::new(),
            consts: HashMap::new(),
            next_tmp: 0,
        }
    }

    // ---- construction ------------------------------------------------

    fn push_value(&mut self, data: ValueData) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(data);
        self.users.push(Vec::new());
        id
    }

    pub fn add_arg(&mut self, name: impl Into<String>, ty: Ty) -> ValueId {
        let id = self.push_value(ValueData {
            name: name.into(),
            ty,
            kind: ValueKind::Arg,
        });
        self.args.push(id);
        id
    }

    /// Intern a constant: repeated literals share one value identity.
    pub fn add_const(&mut self, value: ConstValue, ty: Ty) -> ValueId {
        let key = const_key(ty, &value);
        if let Some(&id) = self.consts.get(&key) {
            return id;
        }
        let id = self.push_value(ValueData {
            name: String::new(),
            ty,
            kind: ValueKind::Const(value),
        });
        self.consts.insert(key, id);
        id
    }

    pub fn add_block(&mut self, name: impl Into<String>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BlockData {
            name: name.into(),
            insts: Vec::new(),
            count: None,
        });
        id
    }

    /// Create a detached instruction. Operand uses are registered
    /// immediately; the instruction joins a block via one of the insert
    /// methods.
    pub fn new_inst(
        &mut self,
        name: impl Into<String>,
        ty: Ty,
        op: Opcode,
        operands: Vec<ValueId>,
        targets: Vec<BlockId>,
    ) -> ValueId {
        let id = self.push_value(ValueData {
            name: name.into(),
            ty,
            kind: ValueKind::Inst(InstData {
                op,
                operands: operands.clone(),
                targets,
                probs: None,
                callee: None,
                block: None,
            }),
        });
        for &operand in &operands {
            self.users[operand.index()].push(id);
        }
        id
    }

    /// Clone an instruction: same opcode, type, operands, and targets, but
    /// detached and with a fresh name. Uses of the operands are registered
    /// for the clone.
    pub fn clone_inst(&mut self, inst: ValueId) -> ValueId {
        let src = self.inst(inst).expect("clone of non-instruction").clone();
        let base = self.values[inst.index()].name.clone();
        let name = if base.is_empty() {
            String::new()
        } else {
            self.next_tmp += 1;
            format!("{}.{}", base, self.next_tmp)
        };
        let ty = self.values[inst.index()].ty;
        let id = self.push_value(ValueData {
            name,
            ty,
            kind: ValueKind::Inst(InstData { block: None, ..src.clone() }),
        });
        for &operand in &src.operands {
            self.users[operand.index()].push(id);
        }
        id
    }

    // ---- queries -----------------------------------------------------

    pub fn args(&self) -> &[ValueId] {
        &self.args
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn blocks(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len() as u32).map(BlockId)
    }

    pub fn block(&self, b: BlockId) -> &BlockData {
        &self.blocks[b.index()]
    }

    pub fn block_mut(&mut self, b: BlockId) -> &mut BlockData {
        &mut self.blocks[b.index()]
    }

    pub fn block_by_name(&self, name: &str) -> Option<BlockId> {
        self.blocks
            .iter()
            .position(|b| b.name == name)
            .map(|i| BlockId(i as u32))
    }

    pub fn entry_block(&self) -> BlockId {
        BlockId(0)
    }

    pub fn value(&self, v: ValueId) -> &ValueData {
        &self.values[v.index()]
    }

    pub fn value_by_name(&self, name: &str) -> Option<ValueId> {
        self.values
            .iter()
            .position(|v| v.name == name)
            .map(|i| ValueId(i as u32))
    }

    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    pub fn ty(&self, v: ValueId) -> Ty {
        self.values[v.index()].ty
    }

    pub fn inst(&self, v: ValueId) -> Option<&InstData> {
        match &self.values[v.index()].kind {
            ValueKind::Inst(data) => Some(data),
            _ => None,
        }
    }

    fn inst_mut(&mut self, v: ValueId) -> &mut InstData {
        match &mut self.values[v.index()].kind {
            ValueKind::Inst(data) => data,
            _ => panic!("value is not an instruction"),
        }
    }

    pub fn opcode(&self, v: ValueId) -> Option<&Opcode> {
        self.inst(v).map(|i| &i.op)
    }

    pub fn num_operands(&self, v: ValueId) -> usize {
        self.inst(v).map_or(0, |i| i.operands.len())
    }

    pub fn operand(&self, v: ValueId, i: usize) -> ValueId {
        self.inst(v).expect("operand of non-instruction").operands[i]
    }

    pub fn operands(&self, v: ValueId) -> &[ValueId] {
        self.inst(v).map_or(&[], |i| i.operands.as_slice())
    }

    /// Def-use back-edges: every instruction that has `v` among its
    /// operands, one entry per use, in insertion order.
    pub fn users(&self, v: ValueId) -> &[ValueId] {
        &self.users[v.index()]
    }

    pub fn parent(&self, v: ValueId) -> Option<BlockId> {
        self.inst(v).and_then(|i| i.block)
    }

    pub fn is_atomic(&self, v: ValueId) -> bool {
        self.opcode(v).is_some_and(|op| op.is_atomic())
    }

    pub fn const_value(&self, v: ValueId) -> Option<&ConstValue> {
        match &self.values[v.index()].kind {
            ValueKind::Const(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_zero_const(&self, v: ValueId) -> bool {
        self.const_value(v).is_some_and(|c| c.is_zero())
    }

    pub fn terminator(&self, b: BlockId) -> Option<ValueId> {
        let last = *self.blocks[b.index()].insts.last()?;
        self.opcode(last)
            .filter(|op| op.is_terminator())
            .map(|_| last)
    }

    /// Successors of a block in terminator order, duplicates removed.
    pub fn successors(&self, b: BlockId) -> Vec<BlockId> {
        let Some(term) = self.terminator(b) else {
            return Vec::new();
        };
        let mut succs = Vec::new();
        for &t in &self.inst(term).unwrap().targets {
            if !succs.contains(&t) {
                succs.push(t);
            }
        }
        succs
    }

    /// Predecessor lists for every block.
    pub fn predecessors(&self) -> Vec<Vec<BlockId>> {
        let mut preds = vec![Vec::new(); self.blocks.len()];
        for b in self.blocks() {
            for succ in self.successors(b) {
                preds[succ.index()].push(b);
            }
        }
        preds
    }

    pub fn set_probs(&mut self, term: ValueId, probs: Vec<f64>) {
        self.inst_mut(term).probs = Some(probs);
    }

    pub fn set_callee(&mut self, call: ValueId, callee: impl Into<String>) {
        self.inst_mut(call).callee = Some(callee.into());
    }

    // ---- mutators ----------------------------------------------------

    fn position_in_block(&self, inst: ValueId) -> (BlockId, usize) {
        let block = self
            .parent(inst)
            .expect("instruction is not attached to a block");
        let pos = self.blocks[block.index()]
            .insts
            .iter()
            .position(|&i| i == inst)
            .expect("parent block does not contain instruction");
        (block, pos)
    }

    /// Attach a detached instruction immediately before `anchor`.
    pub fn insert_before(&mut self, inst: ValueId, anchor: ValueId) {
        debug_assert!(self.parent(inst).is_none(), "instruction already attached");
        let (block, pos) = self.position_in_block(anchor);
        self.blocks[block.index()].insts.insert(pos, inst);
        self.inst_mut(inst).block = Some(block);
    }

    /// Attach a detached instruction immediately after `anchor`.
    pub fn insert_after(&mut self, inst: ValueId, anchor: ValueId) {
        debug_assert!(self.parent(inst).is_none(), "instruction already attached");
        let (block, pos) = self.position_in_block(anchor);
        self.blocks[block.index()].insts.insert(pos + 1, inst);
        self.inst_mut(inst).block = Some(block);
    }

    /// Attach a detached instruction just before the terminator of `block`.
    pub fn insert_before_terminator(&mut self, inst: ValueId, block: BlockId) {
        let term = self
            .terminator(block)
            .expect("block has no terminator to insert before");
        self.insert_before(inst, term);
    }

    /// Detach `inst` from its current position and re-attach it before
    /// `anchor` (possibly in a different block).
    pub fn move_before(&mut self, inst: ValueId, anchor: ValueId) {
        let (from, pos) = self.position_in_block(inst);
        self.blocks[from.index()].insts.remove(pos);
        self.inst_mut(inst).block = None;
        self.insert_before(inst, anchor);
    }

    fn remove_use(&mut self, user: ValueId, used: ValueId) {
        let list = &mut self.users[used.index()];
        if let Some(pos) = list.iter().position(|&u| u == user) {
            list.remove(pos);
        }
    }

    /// Replace every occurrence of `from` among `user`'s operands with `to`,
    /// keeping the def-use edges consistent.
    pub fn replace_operand(&mut self, user: ValueId, from: ValueId, to: ValueId) {
        let mut replaced = 0usize;
        {
            let data = self.inst_mut(user);
            for operand in data.operands.iter_mut() {
                if *operand == from {
                    *operand = to;
                    replaced += 1;
                }
            }
        }
        for _ in 0..replaced {
            self.remove_use(user, from);
            self.users[to.index()].push(user);
        }
    }

    /// Redirect all uses of `value` to `replacement`, except for uses inside
    /// `block`. Mirrors `Value::replaceUsesOutsideBlock`.
    pub fn replace_uses_outside_block(
        &mut self,
        value: ValueId,
        replacement: ValueId,
        block: BlockId,
    ) {
        let outside: Vec<ValueId> = self.users[value.index()]
            .iter()
            .copied()
            .filter(|&u| u != replacement && self.parent(u) != Some(block))
            .collect();
        for user in outside {
            self.replace_operand(user, value, replacement);
        }
    }

    /// Rewrite `inst`'s operands through `map` (operands absent from the map
    /// are left alone), keeping the def-use edges consistent.
    pub fn remap_operands(&mut self, inst: ValueId, map: &HashMap<ValueId, ValueId>) {
        let pairs: Vec<(ValueId, ValueId)> = self
            .inst(inst)
            .expect("remap of non-instruction")
            .operands
            .iter()
            .filter_map(|op| map.get(op).map(|&to| (*op, to)))
            .collect();
        for (from, to) in pairs {
            self.replace_operand(inst, from, to);
        }
    }

    /// Fresh printable name for synthesized instructions.
    pub fn fresh_name(&mut self, base: &str) -> String {
        self.next_tmp += 1;
        format!("{}.{}", base, self.next_tmp)
    }

    /// Fill in the operand list of an instruction created without operands.
    /// Used by the parser's deferred reference resolution.
    pub(crate) fn set_operands(&mut self, inst: ValueId, operands: Vec<ValueId>) {
        debug_assert!(self.inst(inst).is_some_and(|i| i.operands.is_empty()));
        for &operand in &operands {
            self.users[operand.index()].push(inst);
        }
        self.inst_mut(inst).operands = operands;
    }
}

// ---- printing --------------------------------------------------------

impl Function {
    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, v: ValueId) -> fmt::Result {
        match &self.values[v.index()].kind {
            ValueKind::Const(ConstValue::Int(val)) => {
                write!(f, "{}", val)?;
                if self.ty(v) != Ty::I64 {
                    write!(f, ":{}", self.ty(v))?;
                }
                Ok(())
            }
            ValueKind::Const(ConstValue::Float(val)) => {
                write!(f, "{:?}", val)?;
                if self.ty(v) != Ty::F64 {
                    write!(f, ":{}", self.ty(v))?;
                }
                Ok(())
            }
            ValueKind::Const(ConstValue::Null) => write!(f, "null"),
            _ => write!(f, "%{}", self.values[v.index()].name),
        }
    }

    fn fmt_inst(&self, f: &mut fmt::Formatter<'_>, id: ValueId) -> fmt::Result {
        let data = self.inst(id).unwrap();
        let val = &self.values[id.index()];
        write!(f, "  ")?;
        if val.ty != Ty::Void {
            write!(f, "%{}: {} = ", val.name, val.ty)?;
        }
        let write_ops = |f: &mut fmt::Formatter<'_>, sep_first: bool| -> fmt::Result {
            for (i, &op) in data.operands.iter().enumerate() {
                if i > 0 || sep_first {
                    write!(f, ", ")?;
                }
                self.fmt_operand(f, op)?;
            }
            Ok(())
        };
        match &data.op {
            Opcode::Alloca(ty) => write!(f, "alloca {}", ty)?,
            Opcode::Load { atomic } => {
                write!(f, "load{} ", if *atomic { " atomic" } else { "" })?;
                write_ops(f, false)?;
            }
            Opcode::Store { atomic } => {
                write!(f, "store{} ", if *atomic { " atomic" } else { "" })?;
                write_ops(f, false)?;
            }
            Opcode::GetElementPtr => {
                write!(f, "gep ")?;
                write_ops(f, false)?;
            }
            Opcode::Bin(op) => {
                write!(f, "{} ", op.name())?;
                write_ops(f, false)?;
            }
            Opcode::ICmp(pred) => {
                write!(f, "icmp {} ", pred.name())?;
                write_ops(f, false)?;
            }
            Opcode::FCmp(pred) => {
                write!(f, "fcmp {} ", pred.name())?;
                write_ops(f, false)?;
            }
            Opcode::Br => write!(f, "br ^{}", self.blocks[data.targets[0].index()].name)?,
            Opcode::CondBr => {
                write!(f, "condbr ")?;
                self.fmt_operand(f, data.operands[0])?;
                write!(
                    f,
                    ", ^{}, ^{}",
                    self.blocks[data.targets[0].index()].name,
                    self.blocks[data.targets[1].index()].name
                )?;
                if let Some(probs) = &data.probs {
                    write!(f, " !prob {}, {}", probs[0], probs[1])?;
                }
            }
            Opcode::IndirectBr => {
                write!(f, "indirectbr ")?;
                self.fmt_operand(f, data.operands[0])?;
                write!(f, ", [")?;
                for (i, t) in data.targets.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "^{}", self.blocks[t.index()].name)?;
                }
                write!(f, "]")?;
            }
            Opcode::Ret => {
                write!(f, "ret")?;
                if !data.operands.is_empty() {
                    write!(f, " ")?;
                    self.fmt_operand(f, data.operands[0])?;
                }
            }
            Opcode::Call => {
                write!(f, "call @{}(", data.callee.as_deref().unwrap_or("?"))?;
                write_ops(f, false)?;
                write!(f, ")")?;
            }
            Opcode::Phi => {
                write!(f, "phi ")?;
                for i in 0..data.operands.len() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "[")?;
                    self.fmt_operand(f, data.operands[i])?;
                    write!(f, ", ^{}]", self.blocks[data.targets[i].index()].name)?;
                }
            }
            Opcode::CmpXchg => {
                write!(f, "cmpxchg ")?;
                write_ops(f, false)?;
            }
            Opcode::AtomicRmw(op) => {
                write!(f, "atomicrmw {} ", op.name())?;
                write_ops(f, false)?;
            }
            Opcode::Fence => write!(f, "fence")?,
        }
        writeln!(f)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "func @{}(", self.name)?;
        for (i, &arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "%{}: {}", self.values[arg.index()].name, self.ty(arg))?;
        }
        writeln!(f, ") {{")?;
        for block in &self.blocks {
            write!(f, "{}:", block.name)?;
            if let Some(count) = block.count {
                write!(f, " !count {}", count)?;
            }
            writeln!(f)?;
            for &inst in &block.insts {
                self.fmt_inst(f, inst)?;
            }
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, func) in self.functions.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", func)?;
        }
        Ok(())
    }
}

// Block attachment helper used by the parser.
impl Function {
    /// Append a detached instruction at the end of `block`.
    pub fn push_inst(&mut self, block: BlockId, inst: ValueId) {
        debug_assert!(self.parent(inst).is_none(), "instruction already attached");
        self.blocks[block.index()].insts.push(inst);
        self.inst_mut(inst).block = Some(block);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn two_block_func() -> (Function, ValueId, ValueId, BlockId, BlockId) {
        let mut f = Function::new("t");
        let p = f.add_arg("p", Ty::Ptr);
        let entry = f.add_block("entry");
        let exit = f.add_block("exit");
        let ld = f.new_inst("x", Ty::I32, Opcode::Load { atomic: false }, vec![p], vec![]);
        f.push_inst(entry, ld);
        let br = f.new_inst("", Ty::Void, Opcode::Br, vec![], vec![exit]);
        f.push_inst(entry, br);
        let ret = f.new_inst("", Ty::Void, Opcode::Ret, vec![ld], vec![]);
        f.push_inst(exit, ret);
        (f, p, ld, entry, exit)
    }

    #[test]
    fn def_use_edges_track_operands() {
        let (f, p, ld, _, _) = two_block_func();
        assert_eq!(f.users(p), &[ld]);
        assert_eq!(f.users(ld).len(), 1);
    }

    #[test]
    fn successors_come_from_terminator() {
        let (f, _, _, entry, exit) = two_block_func();
        assert_eq!(f.successors(entry), vec![exit]);
        assert!(f.successors(exit).is_empty());
        assert_eq!(f.predecessors()[exit.index()], vec![entry]);
    }

    #[test]
    fn insert_and_move_preserve_order() {
        let (mut f, p, ld, entry, _) = two_block_func();
        let ld2 = f.new_inst("y", Ty::I32, Opcode::Load { atomic: false }, vec![p], vec![]);
        f.insert_after(ld2, ld);
        assert_eq!(f.block(entry).insts()[1], ld2);
        f.move_before(ld2, ld);
        assert_eq!(f.block(entry).insts()[0], ld2);
        assert_eq!(f.parent(ld2), Some(entry));
    }

    #[test]
    fn replace_uses_outside_block_spares_the_block() {
        let (mut f, p, ld, entry, _) = two_block_func();
        let home = f.new_inst("home", Ty::Ptr, Opcode::Alloca(Ty::I32), vec![], vec![]);
        f.insert_before(home, ld);
        // ld (in entry) keeps its use of p; a load in exit would be rewritten.
        f.replace_uses_outside_block(p, home, entry);
        assert_eq!(f.operand(ld, 0), p);

        let ret = f.terminator(f.block_by_name("exit").unwrap()).unwrap();
        f.replace_uses_outside_block(ld, home, entry);
        assert_eq!(f.operand(ret, 0), home);
        assert!(f.users(ld).is_empty());
        assert!(f.users(home).contains(&ret));
    }

    #[test]
    fn clone_registers_uses_and_remap_rewrites_them() {
        let (mut f, p, ld, _, _) = two_block_func();
        let clone = f.clone_inst(ld);
        assert_eq!(f.operands(clone), &[p]);
        assert_eq!(f.users(p).len(), 2);

        let q = f.add_arg("q", Ty::Ptr);
        let mut map = HashMap::new();
        map.insert(p, q);
        f.remap_operands(clone, &map);
        assert_eq!(f.operands(clone), &[q]);
        assert_eq!(f.users(p).len(), 1);
        assert_eq!(f.users(q), &[clone]);
    }

    #[test]
    fn constants_are_interned() {
        let mut f = Function::new("c");
        let a = f.add_const(ConstValue::Int(0), Ty::I64);
        let b = f.add_const(ConstValue::Int(0), Ty::I64);
        let c = f.add_const(ConstValue::Int(0), Ty::I32);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(f.is_zero_const(a));
    }
}
