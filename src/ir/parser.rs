//! Text-format parser for the hotpath IR.
//!
//! The format mirrors what the `Display` impls print:
//!
//! ```text
//! ; comments start with a semicolon
//! func @sum(%n: i64, %p: ptr) {
//! entry: !count 100
//!   %c: i1 = icmp slt %n, 0
//!   condbr %c, ^neg, ^body !prob 0.1, 0.9
//! body:
//!   %x: i32 = load %p
//!   ret %x
//! neg:
//!   ret
//! }
//! ```
//!
//! Values are `%name`, blocks `^name`. Integer literals default to `i64` and
//! float literals to `f64`; a `:ty` suffix overrides (`0:i32`). Values may be
//! referenced before their definition (phis); references are resolved after
//! the whole function has been read.

use std::collections::HashMap;

use super::*;
use crate::error::HotpathError;

pub fn parse_module(text: &str) -> Result<Module, HotpathError> {
    Parser::new(text).parse()
}

#[derive(Debug, Clone)]
enum ProtoOperand {
    Ref(String),
    Int(i64, Ty),
    Float(f64, Ty),
    Null,
}

#[derive(Debug)]
struct ProtoInst {
    line: usize,
    result: Option<(String, Ty)>,
    op: Opcode,
    operands: Vec<ProtoOperand>,
    targets: Vec<String>,
    probs: Option<Vec<f64>>,
    callee: Option<String>,
    block: usize,
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Parser { text, pos: 0 }
    }

    fn parse(mut self) -> Result<Module, HotpathError> {
        let mut module = Module::new();
        self.skip_whitespace();
        while !self.is_eof() {
            module.functions.push(self.parse_function()?);
            self.skip_whitespace();
        }
        Ok(module)
    }

    // ---- lexing helpers ----------------------------------------------

    fn is_eof(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn current_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.pos += ch.len_utf8();
        }
    }

    fn line(&self) -> usize {
        self.text[..self.pos].chars().filter(|&c| c == '\n').count() + 1
    }

    fn err(&self, message: impl Into<String>) -> HotpathError {
        HotpathError::Parse {
            line: self.line(),
            message: message.into(),
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch == ';' {
                while let Some(c) = self.current_char() {
                    self.advance();
                    if c == '\n' {
                        break;
                    }
                }
            } else if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn try_read(&mut self, ch: char) -> bool {
        self.skip_whitespace();
        if self.current_char() == Some(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> Result<(), HotpathError> {
        if !self.try_read(ch) {
            return Err(self.err(format!(
                "expected '{}' but found {:?}",
                ch,
                self.current_char()
            )));
        }
        Ok(())
    }

    fn read_identifier(&mut self) -> Result<&'a str, HotpathError> {
        self.skip_whitespace();
        let start = self.pos;
        match self.current_char() {
            Some(ch) if ch.is_alphabetic() || ch == '_' => {}
            other => return Err(self.err(format!("expected identifier, found {:?}", other))),
        }
        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' || ch == '.' {
                self.advance();
            } else {
                break;
            }
        }
        Ok(&self.text[start..self.pos])
    }

    fn read_type(&mut self) -> Result<Ty, HotpathError> {
        let name = self.read_identifier()?;
        Ty::from_name(name).ok_or_else(|| self.err(format!("unknown type '{}'", name)))
    }

    fn read_value_name(&mut self) -> Result<&'a str, HotpathError> {
        self.expect('%')?;
        self.read_identifier()
    }

    fn read_block_name(&mut self) -> Result<&'a str, HotpathError> {
        self.expect('^')?;
        self.read_identifier()
    }

    fn read_number_token(&mut self) -> Result<&'a str, HotpathError> {
        self.skip_whitespace();
        let start = self.pos;
        if self.current_char() == Some('-') {
            self.advance();
        }
        let mut seen_digit = false;
        while let Some(ch) = self.current_char() {
            if ch.is_ascii_digit() || ch == '.' {
                seen_digit |= ch.is_ascii_digit();
                self.advance();
            } else {
                break;
            }
        }
        if !seen_digit {
            return Err(self.err("expected a numeric literal"));
        }
        Ok(&self.text[start..self.pos])
    }

    fn read_u64(&mut self) -> Result<u64, HotpathError> {
        let tok = self.read_number_token()?;
        tok.parse::<u64>()
            .map_err(|_| self.err(format!("invalid count '{}'", tok)))
    }

    fn read_f64(&mut self) -> Result<f64, HotpathError> {
        let tok = self.read_number_token()?;
        tok.parse::<f64>()
            .map_err(|_| self.err(format!("invalid number '{}'", tok)))
    }

    fn read_operand(&mut self) -> Result<ProtoOperand, HotpathError> {
        self.skip_whitespace();
        match self.current_char() {
            Some('%') => {
                let name = self.read_value_name()?;
                Ok(ProtoOperand::Ref(name.to_string()))
            }
            Some('n')
                if self.rest().starts_with("null")
                    && !self.rest()[4..]
                        .chars()
                        .next()
                        .is_some_and(|c| c.is_alphanumeric() || c == '_') =>
            {
                for _ in 0..4 {
                    self.advance();
                }
                Ok(ProtoOperand::Null)
            }
            Some(c) if c == '-' || c.is_ascii_digit() => {
                let tok = self.read_number_token()?;
                let is_float = tok.contains('.');
                let ty = if self.try_read(':') {
                    Some(self.read_type()?)
                } else {
                    None
                };
                if is_float {
                    let v = tok
                        .parse::<f64>()
                        .map_err(|_| self.err(format!("invalid float '{}'", tok)))?;
                    Ok(ProtoOperand::Float(v, ty.unwrap_or(Ty::F64)))
                } else {
                    let v = tok
                        .parse::<i64>()
                        .map_err(|_| self.err(format!("invalid integer '{}'", tok)))?;
                    Ok(ProtoOperand::Int(v, ty.unwrap_or(Ty::I64)))
                }
            }
            other => Err(self.err(format!("expected operand, found {:?}", other))),
        }
    }

    // ---- grammar -----------------------------------------------------

    fn parse_function(&mut self) -> Result<Function, HotpathError> {
        let kw = self.read_identifier()?;
        if kw != "func" {
            return Err(self.err(format!("expected 'func', found '{}'", kw)));
        }
        self.expect('@')?;
        let name = self.read_identifier()?.to_string();
        let mut func = Function::new(name);

        self.expect('(')?;
        let mut value_names: HashMap<String, ValueId> = HashMap::new();
        if !self.try_read(')') {
            loop {
                let arg_name = self.read_value_name()?.to_string();
                self.expect(':')?;
                let ty = self.read_type()?;
                let id = func.add_arg(arg_name.clone(), ty);
                if value_names.insert(arg_name.clone(), id).is_some() {
                    return Err(self.err(format!("duplicate value '%{}'", arg_name)));
                }
                if self.try_read(')') {
                    break;
                }
                self.expect(',')?;
            }
        }
        self.expect('{')?;

        let mut block_names: HashMap<String, BlockId> = HashMap::new();
        let mut protos: Vec<ProtoInst> = Vec::new();
        let mut current_block: Option<BlockId> = None;

        loop {
            if self.try_read('}') {
                break;
            }
            self.skip_whitespace();
            if self.is_eof() {
                return Err(self.err("unexpected end of input inside function body"));
            }
            if self.current_char() == Some('%') {
                let block = current_block
                    .ok_or_else(|| self.err("instruction before the first block label"))?;
                let proto = self.parse_def_inst(block.index())?;
                protos.push(proto);
                continue;
            }
            let save = self.pos;
            let word = self.read_identifier()?;
            if self.try_read(':') {
                // Block label.
                let id = func.add_block(word);
                if block_names.insert(word.to_string(), id).is_some() {
                    return Err(self.err(format!("duplicate block '{}'", word)));
                }
                if self.try_read('!') {
                    let attr = self.read_identifier()?;
                    if attr != "count" {
                        return Err(self.err(format!("unknown block attribute '!{}'", attr)));
                    }
                    func.block_mut(id).count = Some(self.read_u64()?);
                }
                current_block = Some(id);
            } else {
                // Void instruction; re-parse from the mnemonic.
                self.pos = save;
                let block = current_block
                    .ok_or_else(|| self.err("instruction before the first block label"))?;
                let proto = self.parse_void_inst(block.index())?;
                protos.push(proto);
            }
        }

        self.lower(&mut func, protos, &mut value_names, &block_names)?;
        Ok(func)
    }

    fn parse_def_inst(&mut self, block: usize) -> Result<ProtoInst, HotpathError> {
        let line = self.line();
        let name = self.read_value_name()?.to_string();
        self.expect(':')?;
        let ty = self.read_type()?;
        self.expect('=')?;
        let mnemonic = self.read_identifier()?;
        let mut operands = Vec::new();
        let mut targets = Vec::new();
        let mut callee = None;

        let op = match mnemonic {
            "alloca" => Opcode::Alloca(self.read_type()?),
            "load" => {
                let atomic = self.try_keyword("atomic");
                operands.push(self.read_operand()?);
                Opcode::Load { atomic }
            }
            "gep" => {
                operands.push(self.read_operand()?);
                while self.try_read(',') {
                    operands.push(self.read_operand()?);
                }
                Opcode::GetElementPtr
            }
            "icmp" => {
                let pred = self.read_identifier()?;
                let pred = IntPred::from_name(pred)
                    .ok_or_else(|| self.err(format!("unknown icmp predicate '{}'", pred)))?;
                operands.push(self.read_operand()?);
                self.expect(',')?;
                operands.push(self.read_operand()?);
                Opcode::ICmp(pred)
            }
            "fcmp" => {
                let pred = self.read_identifier()?;
                let pred = FloatPred::from_name(pred)
                    .ok_or_else(|| self.err(format!("unknown fcmp predicate '{}'", pred)))?;
                operands.push(self.read_operand()?);
                self.expect(',')?;
                operands.push(self.read_operand()?);
                Opcode::FCmp(pred)
            }
            "call" => {
                self.expect('@')?;
                callee = Some(self.read_identifier()?.to_string());
                self.expect('(')?;
                if !self.try_read(')') {
                    loop {
                        operands.push(self.read_operand()?);
                        if self.try_read(')') {
                            break;
                        }
                        self.expect(',')?;
                    }
                }
                Opcode::Call
            }
            "phi" => {
                loop {
                    self.expect('[')?;
                    operands.push(self.read_operand()?);
                    self.expect(',')?;
                    targets.push(self.read_block_name()?.to_string());
                    self.expect(']')?;
                    if !self.try_read(',') {
                        break;
                    }
                }
                Opcode::Phi
            }
            "cmpxchg" => {
                operands.push(self.read_operand()?);
                self.expect(',')?;
                operands.push(self.read_operand()?);
                self.expect(',')?;
                operands.push(self.read_operand()?);
                Opcode::CmpXchg
            }
            "atomicrmw" => {
                let op = self.read_identifier()?;
                let op = BinOp::from_name(op)
                    .ok_or_else(|| self.err(format!("unknown atomicrmw operator '{}'", op)))?;
                operands.push(self.read_operand()?);
                self.expect(',')?;
                operands.push(self.read_operand()?);
                Opcode::AtomicRmw(op)
            }
            other => {
                let op = BinOp::from_name(other)
                    .ok_or_else(|| self.err(format!("unknown opcode '{}'", other)))?;
                operands.push(self.read_operand()?);
                self.expect(',')?;
                operands.push(self.read_operand()?);
                Opcode::Bin(op)
            }
        };

        Ok(ProtoInst {
            line,
            result: Some((name, ty)),
            op,
            operands,
            targets,
            probs: None,
            callee,
            block,
        })
    }

    fn parse_void_inst(&mut self, block: usize) -> Result<ProtoInst, HotpathError> {
        let line = self.line();
        let mnemonic = self.read_identifier()?;
        let mut operands = Vec::new();
        let mut targets = Vec::new();
        let mut probs = None;
        let mut callee = None;

        let op = match mnemonic {
            "store" => {
                let atomic = self.try_keyword("atomic");
                operands.push(self.read_operand()?);
                self.expect(',')?;
                operands.push(self.read_operand()?);
                Opcode::Store { atomic }
            }
            "br" => {
                targets.push(self.read_block_name()?.to_string());
                Opcode::Br
            }
            "condbr" => {
                operands.push(self.read_operand()?);
                self.expect(',')?;
                targets.push(self.read_block_name()?.to_string());
                self.expect(',')?;
                targets.push(self.read_block_name()?.to_string());
                if self.try_read('!') {
                    let attr = self.read_identifier()?;
                    if attr != "prob" {
                        return Err(self.err(format!("unknown branch attribute '!{}'", attr)));
                    }
                    let p0 = self.read_f64()?;
                    self.expect(',')?;
                    let p1 = self.read_f64()?;
                    probs = Some(vec![p0, p1]);
                }
                Opcode::CondBr
            }
            "indirectbr" => {
                operands.push(self.read_operand()?);
                self.expect(',')?;
                self.expect('[')?;
                loop {
                    targets.push(self.read_block_name()?.to_string());
                    if self.try_read(']') {
                        break;
                    }
                    self.expect(',')?;
                }
                Opcode::IndirectBr
            }
            "ret" => {
                self.skip_to_line_content();
                if matches!(self.current_char(), Some('%') | Some('-') | Some('n'))
                    || self.current_char().is_some_and(|c| c.is_ascii_digit())
                {
                    operands.push(self.read_operand()?);
                }
                Opcode::Ret
            }
            "fence" => Opcode::Fence,
            "call" => {
                self.expect('@')?;
                callee = Some(self.read_identifier()?.to_string());
                self.expect('(')?;
                if !self.try_read(')') {
                    loop {
                        operands.push(self.read_operand()?);
                        if self.try_read(')') {
                            break;
                        }
                        self.expect(',')?;
                    }
                }
                Opcode::Call
            }
            other => return Err(self.err(format!("unknown opcode '{}'", other))),
        };

        Ok(ProtoInst {
            line,
            result: None,
            op,
            operands,
            targets,
            probs,
            callee,
            block,
        })
    }

    /// Skip spaces within the current line only (used by `ret`, whose operand
    /// is optional and must not be grabbed from the next line).
    fn skip_to_line_content(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch == ' ' || ch == '\t' {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn try_keyword(&mut self, kw: &str) -> bool {
        self.skip_whitespace();
        let rest = self.rest();
        if rest.starts_with(kw) {
            let after = rest[kw.len()..].chars().next();
            if !after.is_some_and(|c| c.is_alphanumeric() || c == '_') {
                self.pos += kw.len();
                return true;
            }
        }
        false
    }

    // ---- deferred resolution -----------------------------------------

    fn lower(
        &self,
        func: &mut Function,
        protos: Vec<ProtoInst>,
        value_names: &mut HashMap<String, ValueId>,
        block_names: &HashMap<String, BlockId>,
    ) -> Result<(), HotpathError> {
        let resolve_block = |name: &str, line: usize| -> Result<BlockId, HotpathError> {
            block_names.get(name).copied().ok_or(HotpathError::Parse {
                line,
                message: format!("unknown block '^{}'", name),
            })
        };

        // First pass: create every instruction (operands deferred) so that
        // forward references, e.g. phis over loop-carried values, resolve.
        let mut ids = Vec::with_capacity(protos.len());
        for proto in &protos {
            let (name, ty) = match &proto.result {
                Some((name, ty)) => (name.clone(), *ty),
                None => (String::new(), Ty::Void),
            };
            let targets = proto
                .targets
                .iter()
                .map(|t| resolve_block(t, proto.line))
                .collect::<Result<Vec<_>, _>>()?;
            let id = func.new_inst(name.clone(), ty, proto.op.clone(), vec![], targets);
            if let Some(probs) = &proto.probs {
                func.set_probs(id, probs.clone());
            }
            if let Some(callee) = &proto.callee {
                func.set_callee(id, callee.clone());
            }
            func.push_inst(BlockId(proto.block as u32), id);
            if !name.is_empty() && value_names.insert(name.clone(), id).is_some() {
                return Err(HotpathError::Parse {
                    line: proto.line,
                    message: format!("duplicate value '%{}'", name),
                });
            }
            ids.push(id);
        }

        // Second pass: resolve operand references and intern literals.
        for (proto, &id) in protos.iter().zip(&ids) {
            let mut operands = Vec::with_capacity(proto.operands.len());
            for operand in &proto.operands {
                let resolved = match operand {
                    ProtoOperand::Ref(name) => {
                        *value_names.get(name).ok_or(HotpathError::Parse {
                            line: proto.line,
                            message: format!("unknown value '%{}'", name),
                        })?
                    }
                    ProtoOperand::Int(v, ty) => func.add_const(ConstValue::Int(*v), *ty),
                    ProtoOperand::Float(v, ty) => func.add_const(ConstValue::Float(*v), *ty),
                    ProtoOperand::Null => func.add_const(ConstValue::Null, Ty::Ptr),
                };
                operands.push(resolved);
            }
            func.set_operands(id, operands);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOOP_FUNC: &str = r"
; simple counted loop with profile metadata
func @count(%n: i64, %p: ptr) {
entry: !count 1
  br ^header
header: !count 100
  %i: i64 = phi [0, ^entry], [%next, ^latch]
  %c: i1 = icmp slt %i, %n
  condbr %c, ^body, ^exit !prob 0.99, 0.01
body:
  %x: i32 = load %p
  br ^latch
latch:
  %next: i64 = add %i, 1
  br ^header
exit:
  ret
}
";

    #[test]
    fn parses_loop_function() {
        let module = parse_module(LOOP_FUNC).unwrap();
        assert_eq!(module.functions.len(), 1);
        let f = &module.functions[0];
        assert_eq!(f.name, "count");
        assert_eq!(f.num_blocks(), 5);

        let header = f.block_by_name("header").unwrap();
        assert_eq!(f.block(header).count, Some(100));
        let term = f.terminator(header).unwrap();
        assert_eq!(f.inst(term).unwrap().probs, Some(vec![0.99, 0.01]));

        // The phi's forward reference to %next resolved.
        let phi = f.value_by_name("i").unwrap();
        let next = f.value_by_name("next").unwrap();
        assert!(f.operands(phi).contains(&next));
        assert!(f.users(next).contains(&phi));
    }

    #[test]
    fn interns_literals_and_types() {
        let module = parse_module(LOOP_FUNC).unwrap();
        let f = &module.functions[0];
        let phi = f.value_by_name("i").unwrap();
        let zero = f.operand(phi, 0);
        assert!(f.is_zero_const(zero));
        assert_eq!(f.ty(zero), Ty::I64);
    }

    #[test]
    fn round_trips_through_display() {
        let module = parse_module(LOOP_FUNC).unwrap();
        let printed = module.to_string();
        let reparsed = parse_module(&printed).unwrap();
        assert_eq!(reparsed.to_string(), printed);
    }

    #[test]
    fn rejects_unknown_value() {
        let err = parse_module("func @f() {\nentry:\n  ret %nope\n}").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("unknown value"), "{}", msg);
    }

    #[test]
    fn rejects_unknown_opcode() {
        assert!(parse_module("func @f() {\nentry:\n  frobnicate\n}").is_err());
    }
}
