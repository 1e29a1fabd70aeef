//! Recursive-descent parser producing [`il_core::Module`] (spec §4.1).
//!
//! Mirrors `original_source`'s `Cursor`/`TokenStream` shape: the whole input
//! is tokenized up front (see [`crate::lexer`]) and the parser walks the
//! token slice with a plain cursor. Per-function state (temp-id map,
//! pending-branch list) lives in locals scoped to `parse_function`, so a
//! failure partway through a function rolls back atomically for free: the
//! half-built `Function` is simply dropped, never reaching the module.
//!
//! Two textual conventions resolve ambiguities in the scenario prose (spec
//! §8) that aren't pinned down by the formal grammar: block labels and the
//! targets of `br`/`cbr`/`switch.i32` are bare identifiers (matching S1's
//! `br loop(0, 0)`); the targets of exception-handling terminators
//! (`eh.push`, `resume.label`) carry the `^` sigil (matching S2's
//! `eh.push ^h` / `resume.label t, ^recover`) — "exception-handling
//! terminators" in the serializer contract describes the *instruction*, not
//! whether the target block happens to be a handler.

use std::collections::HashMap;

use il_core::{
    BasicBlockData, BlockId, BlockParam, Diagnostic, Extern, FloatPredicate, Function,
    FunctionAttrs, Global, IntPredicate, Instruction, Linkage, Module, Opcode, Param, ParamAttrs,
    SourceLoc, Ty, TrapKind, Value, ValueId, IL_VERSION,
};

use crate::lexer::{self, TokKind, Token};

/// A forward branch target awaiting resolution once every block in the
/// enclosing function has been registered (spec §4.1 "pending-branch list").
struct PendingTarget {
    name: String,
    line: u32,
    col: u32,
}

struct Parser<'a> {
    toks: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(toks: &'a [Token]) -> Self {
        Parser { toks, pos: 0 }
    }

    fn peek(&self) -> &TokKind {
        &self.toks[self.pos].kind
    }

    fn peek_at(&self, offset: usize) -> &TokKind {
        &self.toks[(self.pos + offset).min(self.toks.len() - 1)].kind
    }

    fn here(&self) -> (u32, u32) {
        (self.toks[self.pos].line, self.toks[self.pos].col)
    }

    fn bump(&mut self) -> Token {
        let t = self.toks[self.pos].clone();
        if !matches!(t.kind, TokKind::Eof) {
            self.pos += 1;
        }
        t
    }

    fn err(&self, message: impl Into<String>) -> Diagnostic {
        let (line, col) = self.here();
        Diagnostic::syntax(message).with_loc(SourceLoc { file: 0, line, col })
    }

    fn expect_ident(&mut self) -> Result<String, Diagnostic> {
        match self.peek().clone() {
            TokKind::Ident(s) => {
                self.bump();
                Ok(s)
            }
            other => Err(self.err(format!("expected identifier, found {other}"))),
        }
    }

    fn expect_kind_eq(&mut self, want: &str) -> Result<(), Diagnostic> {
        match self.peek() {
            TokKind::Ident(s) if s == want => {
                self.bump();
                Ok(())
            }
            other => Err(self.err(format!("expected `{want}`, found {other}"))),
        }
    }

    fn expect_punct(&mut self, want: &TokKind) -> Result<(), Diagnostic> {
        if self.peek() == want {
            self.bump();
            Ok(())
        } else {
            let other = self.peek().clone();
            Err(self.err(format!("expected {want}, found {other}")))
        }
    }

    fn at_ident(&self, want: &str) -> bool {
        matches!(self.peek(), TokKind::Ident(s) if s == want)
    }

    fn parse_ty(&mut self) -> Result<Ty, Diagnostic> {
        let name = self.expect_ident()?;
        Ty::from_mnemonic(&name).ok_or_else(|| self.err(format!("unknown type `{name}`")))
    }

    fn parse_string(&mut self) -> Result<String, Diagnostic> {
        match self.peek().clone() {
            TokKind::Str(s) => {
                self.bump();
                Ok(s)
            }
            other => Err(self.err(format!("expected string literal, found {other}"))),
        }
    }

    // ---- module head -------------------------------------------------

    fn parse_module(&mut self) -> Result<Module, Diagnostic> {
        let mut module = Module::new();

        if self.at_ident("il") {
            self.bump();
            module.version = self.parse_string()?;
        } else {
            module.version = IL_VERSION.to_string();
        }

        if self.at_ident("target") {
            self.bump();
            module.target = Some(self.parse_string()?);
        }

        loop {
            match self.peek() {
                TokKind::Eof => break,
                TokKind::Ident(s) if s == "extern" => {
                    module.externs.push(self.parse_extern()?);
                }
                TokKind::Ident(s) if s == "global" => {
                    module.globals.push(self.parse_global()?);
                }
                TokKind::Ident(s) if s == "func" => {
                    module.functions.push(self.parse_function()?);
                }
                other => {
                    let other = other.clone();
                    return Err(self.err(format!(
                        "expected `extern`, `global`, or `func`, found {other}"
                    )));
                }
            }
        }

        Ok(module)
    }

    fn parse_extern(&mut self) -> Result<Extern, Diagnostic> {
        self.expect_kind_eq("extern")?;
        self.expect_punct(&TokKind::At)?;
        let name = self.expect_ident()?;
        self.expect_punct(&TokKind::LParen)?;
        let mut param_tys = Vec::new();
        while !matches!(self.peek(), TokKind::RParen) {
            param_tys.push(self.parse_ty()?);
            if matches!(self.peek(), TokKind::Comma) {
                self.bump();
            } else {
                break;
            }
        }
        self.expect_punct(&TokKind::RParen)?;
        self.expect_punct(&TokKind::Arrow)?;
        let ret_ty = self.parse_ty()?;
        Ok(Extern { name, ret_ty, param_tys })
    }

    fn parse_global(&mut self) -> Result<Global, Diagnostic> {
        self.expect_kind_eq("global")?;
        let linkage = if self.at_ident("export") {
            self.bump();
            Linkage::Export
        } else {
            Linkage::Internal
        };
        self.expect_kind_eq("const")?;
        let ty = self.parse_ty()?;
        self.expect_punct(&TokKind::At)?;
        let name = self.expect_ident()?;
        self.expect_punct(&TokKind::Eq)?;
        let init = match (ty, self.peek().clone()) {
            (Ty::Str, TokKind::Str(s)) => {
                self.bump();
                s.into_bytes()
            }
            (Ty::F64, TokKind::Float(f)) => {
                self.bump();
                f.to_le_bytes().to_vec()
            }
            (_, TokKind::Int(n)) => {
                self.bump();
                n.to_le_bytes().to_vec()
            }
            (_, other) => return Err(self.err(format!("malformed global initializer, found {other}"))),
        };
        self.expect_punct(&TokKind::Semi)?;
        Ok(Global { name, ty, linkage, init })
    }

    // ---- functions -----------------------------------------------------

    fn parse_param_attrs(&mut self) -> ParamAttrs {
        let mut attrs = ParamAttrs::default();
        loop {
            match self.peek() {
                TokKind::Ident(s) if s == "noalias" => {
                    attrs.noalias = true;
                    self.bump();
                }
                TokKind::Ident(s) if s == "nocapture" => {
                    attrs.nocapture = true;
                    self.bump();
                }
                TokKind::Ident(s) if s == "nonnull" => {
                    attrs.nonnull = true;
                    self.bump();
                }
                _ => break,
            }
        }
        attrs
    }

    fn parse_function_attrs(&mut self) -> FunctionAttrs {
        let mut attrs = FunctionAttrs::default();
        loop {
            match self.peek() {
                TokKind::Ident(s) if s == "nothrow" => {
                    attrs.nothrow = true;
                    self.bump();
                }
                TokKind::Ident(s) if s == "readonly" => {
                    attrs.readonly = true;
                    self.bump();
                }
                TokKind::Ident(s) if s == "pure" => {
                    attrs.pure = true;
                    self.bump();
                }
                _ => break,
            }
        }
        attrs
    }

    fn parse_function(&mut self) -> Result<Function, Diagnostic> {
        self.expect_kind_eq("func")?;
        let linkage = if self.at_ident("export") {
            self.bump();
            Linkage::Export
        } else if self.at_ident("import") {
            self.bump();
            Linkage::Import
        } else {
            Linkage::Internal
        };
        self.expect_punct(&TokKind::At)?;
        let name = self.expect_ident()?;
        self.expect_punct(&TokKind::LParen)?;

        let mut params = Vec::new();
        let mut next_id = 0u32;
        while !matches!(self.peek(), TokKind::RParen) {
            let pname = self.expect_ident()?;
            self.expect_punct(&TokKind::Colon)?;
            let ty = self.parse_ty()?;
            let attrs = self.parse_param_attrs();
            params.push(Param { name: pname, ty, id: ValueId(next_id as usize), attrs });
            next_id += 1;
            if matches!(self.peek(), TokKind::Comma) {
                self.bump();
            } else {
                break;
            }
        }
        self.expect_punct(&TokKind::RParen)?;
        self.expect_punct(&TokKind::Arrow)?;
        let ret_ty = self.parse_ty()?;
        let attrs = self.parse_function_attrs();

        let mut func = Function::new(name, linkage, ret_ty, params.clone());
        func.attrs = attrs;
        for p in &params {
            func.value_names.insert(p.id, p.name.clone());
        }

        if !matches!(self.peek(), TokKind::LBrace) {
            return Ok(func);
        }
        self.bump();

        let mut temp_map: HashMap<String, ValueId> = HashMap::new();
        for p in &params {
            temp_map.insert(p.name.clone(), p.id);
        }
        let mut label_to_id: HashMap<String, BlockId> = HashMap::new();
        let mut pending: Vec<(BlockId, usize, Vec<PendingTarget>)> = Vec::new();

        loop {
            if matches!(self.peek(), TokKind::RBrace) {
                self.bump();
                break;
            }
            if self.at_ident(".loc") {
                self.skip_loc_directive()?;
                continue;
            }

            let is_handler = if self.at_ident("handler") {
                self.bump();
                true
            } else {
                false
            };
            let label = self.expect_ident()?;
            let mut block = BasicBlockData::new(label.clone());
            block.is_handler = is_handler;

            if matches!(self.peek(), TokKind::LParen) {
                self.bump();
                while !matches!(self.peek(), TokKind::RParen) {
                    let pname = self.expect_ident()?;
                    self.expect_punct(&TokKind::Colon)?;
                    let ty = self.parse_ty()?;
                    let id = func.fresh_value_id();
                    temp_map.insert(pname.clone(), id);
                    func.value_names.insert(id, pname.clone());
                    block.params.push(BlockParam { name: pname, ty, id });
                    if matches!(self.peek(), TokKind::Comma) {
                        self.bump();
                    } else {
                        break;
                    }
                }
                self.expect_punct(&TokKind::RParen)?;
            }
            self.expect_punct(&TokKind::Colon)?;

            let block_id = func.blocks.push(block);
            label_to_id.insert(label, block_id);

            let mut pending_loc: Option<SourceLoc> = None;
            loop {
                if matches!(self.peek(), TokKind::RBrace) {
                    break;
                }
                if self.at_ident(".loc") {
                    pending_loc = Some(self.parse_loc_directive()?);
                    continue;
                }
                if self.looks_like_block_header() {
                    break;
                }

                let (mut instr, targets) = self.parse_instruction(&mut func, &mut temp_map)?;
                instr.loc = pending_loc.take();
                let idx = func.blocks[block_id].instructions.len();
                func.blocks[block_id].instructions.push(instr);
                if !targets.is_empty() {
                    pending.push((block_id, idx, targets));
                }
            }
        }

        for (block_id, idx, targets) in pending {
            let mut resolved = Vec::with_capacity(targets.len());
            for t in targets {
                match label_to_id.get(&t.name) {
                    Some(id) => resolved.push(*id),
                    None => {
                        return Err(Diagnostic::syntax(format!(
                            "branch to undefined block `{}`",
                            t.name
                        ))
                        .with_loc(SourceLoc { file: 0, line: t.line, col: t.col })
                        .with_function(func.name.clone()));
                    }
                }
            }
            func.blocks[block_id].instructions[idx].successors = resolved;
        }

        Ok(func)
    }

    /// Lookahead to decide whether we've reached the next block header
    /// rather than another instruction: `ident :`, `ident (`, or `handler`.
    fn looks_like_block_header(&self) -> bool {
        if self.at_ident("handler") {
            return true;
        }
        matches!(self.peek(), TokKind::Ident(_))
            && matches!(self.peek_at(1), TokKind::Colon | TokKind::LParen)
            && !matches!(self.peek(), TokKind::Ident(s) if is_opcode_start(s))
    }

    fn skip_loc_directive(&mut self) -> Result<(), Diagnostic> {
        self.parse_loc_directive().map(|_| ())
    }

    fn parse_loc_directive(&mut self) -> Result<SourceLoc, Diagnostic> {
        self.expect_kind_eq(".loc")?;
        let file = self.expect_int()? as u32;
        let line = self.expect_int()? as u32;
        let col = self.expect_int()? as u32;
        Ok(SourceLoc { file, line, col })
    }

    fn expect_int(&mut self) -> Result<i64, Diagnostic> {
        match self.peek().clone() {
            TokKind::Int(n) => {
                self.bump();
                Ok(n)
            }
            other => Err(self.err(format!("expected integer, found {other}"))),
        }
    }

    fn parse_value(&mut self, temp_map: &HashMap<String, ValueId>) -> Result<Value, Diagnostic> {
        match self.peek().clone() {
            TokKind::Temp(name) => {
                self.bump();
                match temp_map.get(&name) {
                    Some(id) => Ok(Value::Temp(*id)),
                    None => Err(self.err(format!("use of undefined temporary `%{name}`"))),
                }
            }
            TokKind::Int(n) => {
                self.bump();
                Ok(Value::const_int(n))
            }
            TokKind::Float(f) => {
                self.bump();
                Ok(Value::const_float(f))
            }
            TokKind::Str(s) => {
                self.bump();
                Ok(Value::const_str(s))
            }
            TokKind::At => {
                self.bump();
                let name = self.expect_ident()?;
                Ok(Value::GlobalAddr(name))
            }
            TokKind::Ident(s) if s == "null" => {
                self.bump();
                Ok(Value::Null)
            }
            other => Err(self.err(format!("expected operand, found {other}"))),
        }
    }

    /// Parses exactly one instruction (not its trailing `;`'s block-boundary
    /// lookahead), returning unresolved branch-target strings alongside it.
    fn parse_instruction(
        &mut self,
        func: &mut Function,
        temp_map: &mut HashMap<String, ValueId>,
    ) -> Result<(Instruction, Vec<PendingTarget>), Diagnostic> {
        let mut dest: Option<(String, Option<Ty>)> = None;
        if let TokKind::Temp(name) = self.peek().clone() {
            self.bump();
            let mut ty = None;
            // optional "[: ty]" explicit result-type annotation
            if matches!(self.peek(), TokKind::LBracket) {
                self.bump();
                self.expect_punct(&TokKind::Colon)?;
                ty = Some(self.parse_ty()?);
                self.expect_punct(&TokKind::RBracket)?;
            }
            self.expect_punct(&TokKind::Eq)?;
            dest = Some((name, ty));
        }

        let mnemonic = self.expect_ident()?;
        let mut targets = Vec::new();

        let (opcode, result_ty_default) = opcode_from_mnemonic(&mnemonic)
            .ok_or_else(|| self.err(format!("unknown opcode `{mnemonic}`")))?;

        let mut instr = Instruction::new(opcode, result_ty_default.unwrap_or(Ty::Void));

        match opcode {
            Opcode::IAddOvf
            | Opcode::ISubOvf
            | Opcode::IMulOvf
            | Opcode::IAdd
            | Opcode::ISub
            | Opcode::IMul
            | Opcode::SDivChk0
            | Opcode::SRemChk0
            | Opcode::UDivChk0
            | Opcode::URemChk0
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor
            | Opcode::Shl
            | Opcode::LShr
            | Opcode::AShr
            | Opcode::FAdd
            | Opcode::FSub
            | Opcode::FMul
            | Opcode::FDiv
            | Opcode::ICmp(_)
            | Opcode::FCmp(_) => {
                let a = self.parse_value(temp_map)?;
                self.expect_punct(&TokKind::Comma)?;
                let b = self.parse_value(temp_map)?;
                instr.operands = vec![a, b];
            }
            Opcode::Zext1 | Opcode::Alloca | Opcode::Load | Opcode::TrapFromErr => {
                instr.operands = vec![self.parse_value(temp_map)?];
            }
            Opcode::Store => {
                let value = self.parse_value(temp_map)?;
                self.expect_punct(&TokKind::Comma)?;
                let addr = self.parse_value(temp_map)?;
                instr.operands = vec![value, addr];
            }
            Opcode::ConstStr => {
                instr.operands = vec![self.parse_value(temp_map)?];
            }
            Opcode::Call => {
                self.expect_punct(&TokKind::At)?;
                let callee = self.expect_ident()?;
                instr.callee = Some(callee);
                self.expect_punct(&TokKind::LParen)?;
                let mut args = Vec::new();
                while !matches!(self.peek(), TokKind::RParen) {
                    args.push(self.parse_value(temp_map)?);
                    if matches!(self.peek(), TokKind::Comma) {
                        self.bump();
                    } else {
                        break;
                    }
                }
                self.expect_punct(&TokKind::RParen)?;
                instr.operands = args;
            }
            Opcode::Br => {
                let (line, col) = self.here();
                let name = self.expect_ident()?;
                targets.push(PendingTarget { name, line, col });
                instr.branch_args = vec![self.parse_optional_args(temp_map)?];
            }
            Opcode::CBr => {
                let cond = self.parse_value(temp_map)?;
                instr.operands = vec![cond];
                self.expect_punct(&TokKind::Comma)?;
                let (l1, c1) = self.here();
                let then_name = self.expect_ident()?;
                let then_args = self.parse_optional_args(temp_map)?;
                self.expect_punct(&TokKind::Comma)?;
                let (l2, c2) = self.here();
                let else_name = self.expect_ident()?;
                let else_args = self.parse_optional_args(temp_map)?;
                targets.push(PendingTarget { name: then_name, line: l1, col: c1 });
                targets.push(PendingTarget { name: else_name, line: l2, col: c2 });
                instr.branch_args = vec![then_args, else_args];
            }
            Opcode::SwitchI32 => {
                let scrut = self.parse_value(temp_map)?;
                instr.operands = vec![scrut];
                self.expect_punct(&TokKind::Comma)?;
                let (l0, c0) = self.here();
                let default_name = self.expect_ident()?;
                targets.push(PendingTarget { name: default_name, line: l0, col: c0 });
                while matches!(self.peek(), TokKind::Comma) {
                    self.bump();
                    let case_val = self.expect_int()?;
                    self.expect_punct(&TokKind::Arrow)?;
                    let (l, c) = self.here();
                    let case_label = self.expect_ident()?;
                    instr.switch_cases.push(case_val);
                    targets.push(PendingTarget { name: case_label, line: l, col: c });
                }
            }
            Opcode::Ret => {
                if !matches!(self.peek(), TokKind::Semi) {
                    instr.operands = vec![self.parse_value(temp_map)?];
                }
            }
            Opcode::Trap | Opcode::EhPop | Opcode::EhEntry => {}
            Opcode::TrapKind(_) => {
                let token = self.expect_ident()?;
                let kind = TrapKind::from_token(&token)
                    .ok_or_else(|| self.err(format!("unknown trap kind `{token}`")))?;
                instr.opcode = Opcode::TrapKind(kind);
            }
            Opcode::ResumeSame | Opcode::ResumeNext => {
                instr.operands = vec![self.parse_value(temp_map)?];
            }
            Opcode::ResumeLabel => {
                let tok = self.parse_value(temp_map)?;
                instr.operands = vec![tok];
                self.expect_punct(&TokKind::Comma)?;
                let (line, col) = self.here();
                let name = self.expect_label()?;
                targets.push(PendingTarget { name, line, col });
            }
            Opcode::EhPush => {
                let (line, col) = self.here();
                let name = self.expect_label()?;
                targets.push(PendingTarget { name, line, col });
            }
        }

        self.expect_punct(&TokKind::Semi)?;

        if let Some((name, explicit_ty)) = dest {
            let id = func.fresh_value_id();
            temp_map.insert(name.clone(), id);
            func.value_names.insert(id, name);
            instr.result = Some(id);
            if let Some(ty) = explicit_ty {
                instr.result_ty = ty;
            }
        }

        Ok((instr, targets))
    }

    fn parse_optional_args(&mut self, temp_map: &HashMap<String, ValueId>) -> Result<Vec<Value>, Diagnostic> {
        if !matches!(self.peek(), TokKind::LParen) {
            return Ok(Vec::new());
        }
        self.bump();
        let mut args = Vec::new();
        while !matches!(self.peek(), TokKind::RParen) {
            args.push(self.parse_value(temp_map)?);
            if matches!(self.peek(), TokKind::Comma) {
                self.bump();
            } else {
                break;
            }
        }
        self.expect_punct(&TokKind::RParen)?;
        Ok(args)
    }

    fn expect_label(&mut self) -> Result<String, Diagnostic> {
        match self.peek().clone() {
            TokKind::Label(s) => {
                self.bump();
                Ok(s)
            }
            other => Err(self.err(format!("expected `^label`, found {other}"))),
        }
    }

}

fn is_opcode_start(s: &str) -> bool {
    opcode_from_mnemonic(s).is_some()
}

/// Maps a mnemonic to its opcode and the opcode's default result type, the
/// same table the lexer-level lookahead in [`Parser::looks_like_block_header`]
/// consults to distinguish an instruction from a block header.
fn opcode_from_mnemonic(s: &str) -> Option<(Opcode, Option<Ty>)> {
    let op = match s {
        "iadd.ovf" => Opcode::IAddOvf,
        "isub.ovf" => Opcode::ISubOvf,
        "imul.ovf" => Opcode::IMulOvf,
        "iadd" => Opcode::IAdd,
        "isub" => Opcode::ISub,
        "imul" => Opcode::IMul,
        "sdiv.chk0" => Opcode::SDivChk0,
        "srem.chk0" => Opcode::SRemChk0,
        "udiv.chk0" => Opcode::UDivChk0,
        "urem.chk0" => Opcode::URemChk0,
        "and" => Opcode::And,
        "or" => Opcode::Or,
        "xor" => Opcode::Xor,
        "shl" => Opcode::Shl,
        "lshr" => Opcode::LShr,
        "ashr" => Opcode::AShr,
        "fadd" => Opcode::FAdd,
        "fsub" => Opcode::FSub,
        "fmul" => Opcode::FMul,
        "fdiv" => Opcode::FDiv,
        "zext1" => Opcode::Zext1,
        "alloca" => Opcode::Alloca,
        "load" => Opcode::Load,
        "store" => Opcode::Store,
        "const_str" => Opcode::ConstStr,
        "call" => Opcode::Call,
        "br" => Opcode::Br,
        "cbr" => Opcode::CBr,
        "switch.i32" => Opcode::SwitchI32,
        "ret" => Opcode::Ret,
        "trap" => Opcode::Trap,
        "trap.kind" => Opcode::TrapKind(TrapKind::Explicit),
        "trap.from_err" => Opcode::TrapFromErr,
        "resume.same" => Opcode::ResumeSame,
        "resume.next" => Opcode::ResumeNext,
        "resume.label" => Opcode::ResumeLabel,
        "eh.push" => Opcode::EhPush,
        "eh.pop" => Opcode::EhPop,
        "eh.entry" => Opcode::EhEntry,
        _ => {
            if let Some(p) = IntPredicate::from_mnemonic(s) {
                Opcode::ICmp(p)
            } else if let Some(p) = FloatPredicate::from_mnemonic(s) {
                Opcode::FCmp(p)
            } else {
                return None;
            }
        }
    };
    let default_ty = op.default_result_ty();
    Some((op, default_ty))
}

/// Parses a complete module from IL text (spec §4.1).
///
/// Per §7's error policy the parser fails at the first error; the `Vec` in
/// the return type matches the shape of every other fallible stage in this
/// crate family (the linker does accumulate more than one) rather than
/// signalling that this parser recovers from errors, which it does not.
#[tracing::instrument(skip_all, fields(bytes = src.len()))]
pub fn parse(src: &str) -> Result<Module, Vec<Diagnostic>> {
    let toks = lexer::lex(src).map_err(|e| {
        vec![Diagnostic::syntax(e.message).with_loc(SourceLoc { file: 0, line: e.line, col: e.col })]
    })?;
    tracing::debug!(tokens = toks.len(), "lexed module source");
    let mut parser = Parser::new(&toks);
    parser.parse_module().map_err(|d| vec![d])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_s1_arithmetic_and_control_flow() {
        let src = r#"
            func @main() -> i64 {
                entry:
                    br loop(0, 0);
                loop(sum: i64, i: i64):
                    %c = scmp_lt %i, 3;
                    cbr %c, body(%sum, %i), done(%sum);
                body(s: i64, k: i64):
                    %s2 = iadd.ovf %s, %k;
                    %k2 = iadd.ovf %k, 1;
                    br loop(%s2, %k2);
                done(r: i64):
                    ret %r;
            }
        "#;
        let module = parse(src).expect("S1 should parse");
        let f = module.function("main").unwrap();
        assert_eq!(f.blocks.len(), 4);
        for b in f.blocks.iter() {
            assert!(b.is_terminated());
        }
    }

    #[test]
    fn parses_s2_trap_and_handler() {
        let src = r#"
            func @main() -> i64 {
                entry:
                    eh.push ^h;
                    %x = sdiv.chk0 7, 0;
                    eh.pop;
                    ret 0;
                handler h(e: error, t: resume_tok):
                    resume.label %t, ^recover;
                recover:
                    ret 42;
            }
        "#;
        let module = parse(src).expect("S2 should parse");
        let f = module.function("main").unwrap();
        assert_eq!(f.blocks.len(), 3);
        assert!(f.blocks[BlockId(1)].is_handler);
    }

    #[test]
    fn reports_undefined_branch_target() {
        let src = r#"
            func @main() -> i64 {
                entry:
                    br nowhere();
            }
        "#;
        let err = parse(src).unwrap_err();
        assert_eq!(err.len(), 1);
        assert!(err[0].message.contains("nowhere"));
    }

    #[test]
    fn parses_extern_and_global() {
        let src = r#"
            extern @puts(str) -> i64;
            global export const i64 @counter = 0;
            func import @puts(str) -> i64;
        "#;
        let module = parse(src).unwrap();
        assert_eq!(module.externs.len(), 1);
        assert_eq!(module.globals.len(), 1);
        assert!(module.function("puts").unwrap().is_import());
    }
}
