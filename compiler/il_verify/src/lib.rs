//! The verifier (spec §4.2): `verify(module) -> Result<(), Diagnostic>`.
//!
//! Checks every invariant the data model (spec §3) requires of a module
//! before any downstream pass — transform, link, or VM execution — may run.
//! Fails with the first error encountered, carrying a source location when
//! one is available (spec §7 "Parser and verifier fail at the first error").

mod dom;

use std::collections::{HashMap, HashSet};

use il_core::{BlockId, Diagnostic, Function, Module, Opcode, Ty, Value, ValueId};

/// Verifies every invariant spec §4.2 names. Returns the first violation
/// found; does not attempt to collect more than one (unlike the linker,
/// which gives the user a complete picture per spec §4.5/§7).
#[tracing::instrument(skip_all, fields(functions = module.functions.len()))]
pub fn verify(module: &Module) -> Result<(), Diagnostic> {
    verify_module_names(module)?;
    verify_globals(module)?;
    for f in &module.functions {
        verify_function(module, f)?;
    }
    Ok(())
}

fn verify_module_names(module: &Module) -> Result<(), Diagnostic> {
    let mut seen = HashSet::new();
    for name in module.all_names() {
        if !seen.insert(name) {
            return Err(Diagnostic::verifier(format!(
                "duplicate name `{name}` at module scope"
            )));
        }
    }
    Ok(())
}

fn verify_globals(module: &Module) -> Result<(), Diagnostic> {
    for g in &module.globals {
        let expected = match g.ty {
            Ty::Str => None, // variable-length UTF-8 payload
            Ty::F64 | Ty::I1 | Ty::I32 | Ty::I64 | Ty::Ptr => Some(8usize),
            Ty::Error | Ty::ResumeTok | Ty::Void => Some(0usize),
        };
        if let Some(expected) = expected {
            if !g.init.is_empty() && g.init.len() != expected {
                return Err(Diagnostic::verifier(format!(
                    "global `@{}` initializer length {} does not match type `{}`",
                    g.name,
                    g.init.len(),
                    g.ty
                )));
            }
        }
    }
    Ok(())
}

/// Per-function SSA id -> type table, covering function parameters, block
/// parameters, and instruction results. Built once up front so every later
/// check can look up a temporary's type in O(1).
fn build_value_types(f: &Function) -> HashMap<ValueId, Ty> {
    let mut tys = HashMap::new();
    for p in &f.params {
        tys.insert(p.id, p.ty);
    }
    for blk in f.blocks.iter() {
        for p in &blk.params {
            tys.insert(p.id, p.ty);
        }
        for instr in &blk.instructions {
            if let Some(id) = instr.result {
                tys.insert(id, instr.result_ty);
            }
        }
    }
    tys
}

fn value_ty(v: &Value, tys: &HashMap<ValueId, Ty>, module: &Module) -> Option<Ty> {
    match v {
        Value::Temp(id) => tys.get(id).copied(),
        Value::ConstStr(_) => Some(Ty::Str),
        Value::Null => Some(Ty::Ptr),
        Value::GlobalAddr(name) => module.global(name).map(|g| g.ty).or(Some(Ty::Ptr)),
        // Bare integer/float literals carry no fixed width on their own;
        // the verifier accepts them against any operand slot of the
        // matching numeric family (spec §3 "constants carry their literal
        // payload").
        Value::ConstInt(_) | Value::ConstFloat(_) => None,
    }
}

fn verify_function(module: &Module, f: &Function) -> Result<(), Diagnostic> {
    let err = |msg: String| Diagnostic::verifier(msg).with_function(f.name.clone());

    if f.is_import() {
        if !f.blocks.is_empty() {
            return Err(err(format!("import function `@{}` must have no blocks", f.name)));
        }
        return Ok(());
    }
    if f.blocks.is_empty() {
        return Err(err(format!(
            "non-import function `@{}` must have at least one block",
            f.name
        )));
    }

    verify_unique_labels(f).map_err(|e| e.with_function(f.name.clone()))?;
    verify_unique_value_ids(f).map_err(|e| e.with_function(f.name.clone()))?;

    let tys = build_value_types(f);
    let entry = f.entry_block().expect("non-empty blocks checked above");
    let dom = dom::compute(f, entry);

    for blk in f.blocks.iter() {
        verify_block_termination(blk).map_err(|e| {
            e.with_function(f.name.clone()).with_block(blk.label.clone())
        })?;
        verify_handler_shape(f, blk).map_err(|e| {
            e.with_function(f.name.clone()).with_block(blk.label.clone())
        })?;
        verify_eh_balance(blk).map_err(|e| {
            e.with_function(f.name.clone()).with_block(blk.label.clone())
        })?;

        if !dom.is_reachable(block_id_of(f, blk)) {
            continue;
        }

        for (idx, instr) in blk.instructions.iter().enumerate() {
            verify_operand_types(module, instr, &tys)
                .map_err(|e| decorate(e, f, blk, instr))?;
            verify_branch_arity(f, instr).map_err(|e| decorate(e, f, blk, instr))?;
            verify_dominance(f, &dom, &tys, block_id_of(f, blk), idx, instr)
                .map_err(|e| decorate(e, f, blk, instr))?;
        }
    }

    Ok(())
}

fn decorate(
    e: Diagnostic,
    f: &Function,
    blk: &il_core::BasicBlockData,
    instr: &il_core::Instruction,
) -> Diagnostic {
    let e = e.with_function(f.name.clone()).with_block(blk.label.clone());
    match instr.loc {
        Some(loc) => e.with_loc(loc),
        None => e,
    }
}

fn block_id_of(f: &Function, blk: &il_core::BasicBlockData) -> BlockId {
    f.block_by_label(&blk.label).expect("block came from this function's own block list")
}

fn verify_unique_labels(f: &Function) -> Result<(), Diagnostic> {
    let mut seen = HashSet::new();
    for blk in f.blocks.iter() {
        if !seen.insert(blk.label.as_str()) {
            return Err(Diagnostic::verifier(format!(
                "duplicate block label `{}`",
                blk.label
            )));
        }
    }
    Ok(())
}

fn verify_unique_value_ids(f: &Function) -> Result<(), Diagnostic> {
    let mut seen = HashSet::new();
    for p in &f.params {
        if !seen.insert(p.id) {
            return Err(Diagnostic::verifier(format!(
                "duplicate SSA id for parameter `{}`",
                p.name
            )));
        }
    }
    for blk in f.blocks.iter() {
        for p in &blk.params {
            if !seen.insert(p.id) {
                return Err(Diagnostic::verifier(format!(
                    "duplicate SSA id for block parameter `{}` in `{}`",
                    p.name, blk.label
                )));
            }
        }
        for instr in &blk.instructions {
            if let Some(id) = instr.result {
                if !seen.insert(id) {
                    return Err(Diagnostic::verifier(format!(
                        "duplicate SSA id defined twice in block `{}`",
                        blk.label
                    )));
                }
            }
        }
    }
    Ok(())
}

fn verify_block_termination(blk: &il_core::BasicBlockData) -> Result<(), Diagnostic> {
    if blk.instructions.is_empty() {
        return Err(Diagnostic::verifier(format!(
            "block `{}` has no instructions",
            blk.label
        )));
    }
    for (i, instr) in blk.instructions.iter().enumerate() {
        let is_last = i + 1 == blk.instructions.len();
        if instr.is_terminator() && !is_last {
            return Err(Diagnostic::verifier(format!(
                "block `{}` has a terminator before its last instruction",
                blk.label
            )));
        }
        if !instr.is_terminator() && is_last {
            return Err(Diagnostic::verifier(format!(
                "block `{}` does not end in a terminator",
                blk.label
            )));
        }
    }
    Ok(())
}

/// Handler-block shape (spec §4.2): `eh.entry` is the first instruction of
/// its handler block; handler blocks carry exactly the `(error,
/// resume_tok)` parameter prefix.
fn verify_handler_shape(
    _f: &Function,
    blk: &il_core::BasicBlockData,
) -> Result<(), Diagnostic> {
    if !blk.is_handler {
        return Ok(());
    }
    if blk.params.len() < 2 || blk.params[0].ty != Ty::Error || blk.params[1].ty != Ty::ResumeTok {
        return Err(Diagnostic::verifier(format!(
            "handler block `{}` must declare `(error, resume_tok)` parameters",
            blk.label
        )));
    }
    if !matches!(blk.instructions.first().map(|i| i.opcode), Some(Opcode::EhEntry)) {
        return Err(Diagnostic::verifier(format!(
            "handler block `{}` must begin with `eh.entry`",
            blk.label
        )));
    }
    Ok(())
}

/// A local (intra-block) push/pop balance check (spec §4.2: "balanced on
/// every path (not globally counted but locally tracked when the pass
/// runs)").
fn verify_eh_balance(blk: &il_core::BasicBlockData) -> Result<(), Diagnostic> {
    let mut depth = 0i32;
    for instr in &blk.instructions {
        match instr.opcode {
            Opcode::EhPush => depth += 1,
            Opcode::EhPop => {
                depth -= 1;
                if depth < 0 {
                    return Err(Diagnostic::verifier(format!(
                        "`eh.pop` in block `{}` has no matching `eh.push`",
                        blk.label
                    )));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn verify_branch_arity(f: &Function, instr: &il_core::Instruction) -> Result<(), Diagnostic> {
    for (succ, args) in instr.successors.iter().zip(instr.branch_args.iter()) {
        let target = &f.blocks[*succ];
        if target.params.len() != args.len() {
            return Err(Diagnostic::verifier(format!(
                "branch to `{}` passes {} argument(s), expected {}",
                target.label,
                args.len(),
                target.params.len()
            )));
        }
    }
    Ok(())
}

fn is_int_opcode(op: Opcode) -> bool {
    matches!(
        op,
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
    )
}

fn is_float_opcode(op: Opcode) -> bool {
    matches!(op, Opcode::FAdd | Opcode::FSub | Opcode::FMul | Opcode::FDiv)
}

/// Checks each instruction's operand/result types against its opcode's type
/// rule (spec §4.2), including call operand types against the callee
/// signature. Constant operands whose type is ambiguous on their own
/// (`ConstInt`, `ConstFloat`) are accepted against any slot of the matching
/// numeric family; see [`value_ty`].
fn verify_operand_types(
    module: &Module,
    instr: &il_core::Instruction,
    tys: &HashMap<ValueId, Ty>,
) -> Result<(), Diagnostic> {
    let check_kind = |v: &Value, want_int: bool, want_float: bool| -> Result<(), Diagnostic> {
        match value_ty(v, tys, module) {
            Some(t) if want_int && !t.is_integer() => Err(Diagnostic::verifier(format!(
                "expected an integer operand, found `{t}`"
            ))),
            Some(t) if want_float && !t.is_float() => Err(Diagnostic::verifier(format!(
                "expected an `f64` operand, found `{t}`"
            ))),
            _ => Ok(()),
        }
    };

    if is_int_opcode(instr.opcode) {
        for op in &instr.operands {
            check_kind(op, true, false)?;
        }
    } else if is_float_opcode(instr.opcode) {
        for op in &instr.operands {
            check_kind(op, false, true)?;
        }
    }

    if let Opcode::Call = instr.opcode {
        let callee = instr.callee.as_deref().unwrap_or_default();
        let (param_tys, ret_ty): (Vec<Ty>, Ty) = if let Some(target) = module.function(callee) {
            (target.params.iter().map(|p| p.ty).collect(), target.ret_ty)
        } else if let Some(ext) = module.extern_decl(callee) {
            (ext.param_tys.clone(), ext.ret_ty)
        } else {
            return Err(Diagnostic::verifier(format!(
                "call to undeclared function `@{callee}`"
            )));
        };
        if param_tys.len() != instr.operands.len() {
            return Err(Diagnostic::verifier(format!(
                "call to `@{callee}` passes {} argument(s), expected {}",
                instr.operands.len(),
                param_tys.len()
            )));
        }
        for (arg, want) in instr.operands.iter().zip(param_tys.iter()) {
            if let Some(got) = value_ty(arg, tys, module) {
                if got != *want {
                    return Err(Diagnostic::verifier(format!(
                        "call to `@{callee}` passes `{got}` where `{want}` was expected"
                    )));
                }
            }
        }
        if instr.result.is_some() && ret_ty != instr.result_ty {
            return Err(Diagnostic::verifier(format!(
                "call to `@{callee}` result type `{}` does not match declared return type `{ret_ty}`",
                instr.result_ty
            )));
        }
    }

    if let Opcode::ResumeSame | Opcode::ResumeNext | Opcode::ResumeLabel = instr.opcode {
        if let Some(tok) = instr.operands.first() {
            if let Some(t) = value_ty(tok, tys, module) {
                if t != Ty::ResumeTok {
                    return Err(Diagnostic::verifier(
                        "`resume.*` operand must be a `resume_tok`".to_string(),
                    ));
                }
            }
        }
    }

    Ok(())
}

/// Every temporary use must be dominated by its definition (spec §4.2).
/// Function parameters dominate the whole function; a block parameter
/// dominates its own block (and everything that block dominates); an
/// instruction result dominates later instructions in the same block and
/// every block its defining block strictly dominates.
fn verify_dominance(
    f: &Function,
    dom: &dom::DomInfo,
    tys: &HashMap<ValueId, Ty>,
    use_block: BlockId,
    use_idx: usize,
    instr: &il_core::Instruction,
) -> Result<(), Diagnostic> {
    let mut check = |v: &Value| -> Result<(), Diagnostic> {
        let id = match v.as_temp() {
            Some(id) => id,
            None => return Ok(()),
        };
        if !tys.contains_key(&id) {
            return Err(Diagnostic::verifier(format!(
                "use of undefined temporary `%{}`",
                id.0
            )));
        }
        if f.params.iter().any(|p| p.id == id) {
            return Ok(());
        }
        let (def_block, def_idx) = locate_definition(f, id)
            .expect("value_ty membership implies a definition exists");
        let ok = match def_idx {
            None => dom.dominates(def_block, use_block),
            Some(def_idx) => {
                if def_block == use_block {
                    def_idx < use_idx
                } else {
                    dom.dominates(def_block, use_block)
                }
            }
        };
        if ok {
            Ok(())
        } else {
            Err(Diagnostic::verifier(format!(
                "use of `%{}` is not dominated by its definition",
                id.0
            )))
        }
    };

    for op in &instr.operands {
        check(op)?;
    }
    for args in &instr.branch_args {
        for arg in args {
            check(arg)?;
        }
    }
    Ok(())
}

/// Finds where `id` is defined: `(block, None)` for a block parameter
/// (available from block entry), `(block, Some(instruction_index))` for an
/// instruction result.
fn locate_definition(f: &Function, id: ValueId) -> Option<(BlockId, Option<usize>)> {
    for (block_id, blk) in f.blocks.iter_enumerated() {
        if blk.params.iter().any(|p| p.id == id) {
            return Some((block_id, None));
        }
        for (idx, instr) in blk.instructions.iter().enumerate() {
            if instr.result == Some(id) {
                return Some((block_id, Some(idx)));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use il_core::Linkage;
    use il_io::parse;

    #[test]
    fn accepts_s1_arithmetic_and_control_flow() {
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
        let module = parse(src).unwrap();
        verify(&module).expect("S1 should verify");
    }

    #[test]
    fn accepts_s2_trap_and_handler() {
        let src = r#"
            func @main() -> i64 {
                entry:
                    eh.push ^h;
                    %x = sdiv.chk0 7, 0;
                    eh.pop;
                    ret 0;
                handler h(e: error, t: resume_tok):
                    eh.entry;
                    resume.label %t, ^recover;
                recover:
                    ret 42;
            }
        "#;
        let module = parse(src).unwrap();
        verify(&module).expect("S2 should verify");
    }

    #[test]
    fn rejects_branch_arity_mismatch() {
        let src = r#"
            func @main() -> i64 {
                entry:
                    br next(1);
                next(x: i64, y: i64):
                    ret %x;
            }
        "#;
        let module = parse(src).unwrap();
        let err = verify(&module).unwrap_err();
        assert!(err.message.contains("argument"));
    }

    #[test]
    fn rejects_use_not_dominated_by_definition() {
        let mut module = il_core::Module::new();
        let mut f = il_core::Function::new("main", Linkage::Internal, Ty::I64, vec![]);
        let entry = f.blocks.push(il_core::BasicBlockData::new("entry"));
        let left = f.blocks.push(il_core::BasicBlockData::new("left"));
        let join = f.blocks.push(il_core::BasicBlockData::new("join"));

        // entry: cbr true, left(), join()
        let mut cbr =
            il_core::Instruction::new(Opcode::CBr, Ty::Void).with_operands(vec![Value::ConstInt(1)]);
        cbr.successors = vec![left, join];
        cbr.branch_args = vec![vec![], vec![]];
        f.blocks[entry].instructions.push(cbr);

        // left: %v = iadd.ovf 1, 1; br join()
        let v = f.fresh_value_id();
        let def = il_core::Instruction::new(Opcode::IAddOvf, Ty::I64)
            .with_result(v)
            .with_operands(vec![Value::ConstInt(1), Value::ConstInt(1)]);
        f.blocks[left].instructions.push(def);
        let mut br = il_core::Instruction::new(Opcode::Br, Ty::Void);
        br.successors = vec![join];
        br.branch_args = vec![vec![]];
        f.blocks[left].instructions.push(br);

        // join: ret %v   (not dominated: `left` does not dominate `join`)
        f.blocks[join]
            .instructions
            .push(il_core::Instruction::new(Opcode::Ret, Ty::Void).with_operands(vec![Value::Temp(v)]));

        module.functions.push(f);

        let err = verify(&module).unwrap_err();
        assert!(err.message.contains("not dominated"));
    }
}
