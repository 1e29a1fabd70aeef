//! Canonical textual serializer (spec §4.1), the writer counterpart of
//! [`crate::parse`]. Deterministic: the same [`Module`] always produces the
//! same text, which is what the linker's determinism law (spec §4.5) and
//! the round-trip law (spec §8) both rest on.

use std::fmt::Write as _;

use il_core::{
    BasicBlockData, Extern, Function, FunctionAttrs, Global, Instruction, Linkage, Module, Opcode,
    Param, Ty, Value, ValueId,
};

/// Serializer configuration. `canonical` sorts externs by name (spec §4.1
/// "Externs may be printed in declaration order or sorted (canonical
/// mode)"); the linker always serializes in canonical mode to get its
/// byte-identical-output determinism law for free.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerializeOptions {
    pub canonical: bool,
}

/// Serializes a module to its canonical IL text form.
#[tracing::instrument(skip_all, fields(functions = module.functions.len(), canonical = opts.canonical))]
pub fn serialize(module: &Module, opts: &SerializeOptions) -> String {
    let mut out = String::new();

    writeln!(out, "il {}", escape_str(&module.version)).unwrap();
    if let Some(target) = &module.target {
        writeln!(out, "target {}", escape_str(target)).unwrap();
    }

    let mut externs: Vec<&Extern> = module.externs.iter().collect();
    if opts.canonical {
        externs.sort_by(|a, b| a.name.cmp(&b.name));
    }
    if !externs.is_empty() {
        out.push('\n');
    }
    for e in externs {
        write_extern(&mut out, e);
    }

    if !module.globals.is_empty() {
        out.push('\n');
    }
    for g in &module.globals {
        write_global(&mut out, g);
    }

    for f in &module.functions {
        out.push('\n');
        write_function(&mut out, f);
    }

    tracing::debug!(bytes = out.len(), "serialized module");
    out
}

fn write_extern(out: &mut String, e: &Extern) {
    let params = e
        .param_tys
        .iter()
        .map(|t| t.mnemonic())
        .collect::<Vec<_>>()
        .join(", ");
    writeln!(out, "extern @{}({}) -> {};", e.name, params, e.ret_ty).unwrap();
}

fn write_global(out: &mut String, g: &Global) {
    let linkage = if g.linkage == Linkage::Export { "export " } else { "" };
    let init = format_global_init(g);
    writeln!(out, "global {}const {} @{} = {};", linkage, g.ty, g.name, init).unwrap();
}

fn format_global_init(g: &Global) -> String {
    match g.ty {
        Ty::Str => escape_str(&String::from_utf8_lossy(&g.init)),
        Ty::F64 => {
            let mut bytes = [0u8; 8];
            let n = g.init.len().min(8);
            bytes[..n].copy_from_slice(&g.init[..n]);
            format_float(f64::from_le_bytes(bytes))
        }
        _ => {
            let mut bytes = [0u8; 8];
            let n = g.init.len().min(8);
            bytes[..n].copy_from_slice(&g.init[..n]);
            i64::from_le_bytes(bytes).to_string()
        }
    }
}

fn write_function(out: &mut String, f: &Function) {
    write!(out, "func ").unwrap();
    if let Some(kw) = f.linkage.keyword() {
        write!(out, "{} ", kw).unwrap();
    }
    let params = f
        .params
        .iter()
        .map(format_param)
        .collect::<Vec<_>>()
        .join(", ");
    write!(out, "@{}({}) -> {}", f.name, params, f.ret_ty).unwrap();
    write_function_attrs(out, &f.attrs);

    if f.is_import() || f.blocks.is_empty() {
        writeln!(out, ";").unwrap();
        return;
    }

    writeln!(out, " {{").unwrap();
    for blk in f.blocks.iter() {
        write_block(out, f, blk);
    }
    writeln!(out, "}}").unwrap();
}

fn format_param(p: &Param) -> String {
    let mut s = format!("{}: {}", p.name, p.ty);
    if p.attrs.noalias {
        s.push_str(" noalias");
    }
    if p.attrs.nocapture {
        s.push_str(" nocapture");
    }
    if p.attrs.nonnull {
        s.push_str(" nonnull");
    }
    s
}

fn write_function_attrs(out: &mut String, attrs: &FunctionAttrs) {
    if attrs.nothrow {
        write!(out, " nothrow").unwrap();
    }
    if attrs.readonly {
        write!(out, " readonly").unwrap();
    }
    if attrs.pure {
        write!(out, " pure").unwrap();
    }
}

fn write_block(out: &mut String, f: &Function, blk: &BasicBlockData) {
    write!(out, "    ").unwrap();
    if blk.is_handler {
        write!(out, "handler ").unwrap();
    }
    write!(out, "{}", blk.label).unwrap();
    if !blk.params.is_empty() {
        let params = blk
            .params
            .iter()
            .map(|p| format!("{}: {}", p.name, p.ty))
            .collect::<Vec<_>>()
            .join(", ");
        write!(out, "({params})").unwrap();
    }
    writeln!(out, ":").unwrap();

    for instr in &blk.instructions {
        write_instruction(out, f, instr);
    }
}

fn write_instruction(out: &mut String, f: &Function, instr: &Instruction) {
    if let Some(loc) = instr.loc {
        writeln!(out, "        .loc {} {} {};", loc.file, loc.line, loc.col).unwrap();
    }

    write!(out, "        ").unwrap();
    if let Some(id) = instr.result {
        write!(out, "%{}", temp_name(f, id)).unwrap();
        if Some(instr.result_ty) != instr.opcode.default_result_ty() {
            write!(out, "[: {}]", instr.result_ty).unwrap();
        }
        write!(out, " = ").unwrap();
    }
    write!(out, "{}", instr.opcode.mnemonic()).unwrap();
    write_operands(out, f, instr);
    writeln!(out, ";").unwrap();
}

fn write_operands(out: &mut String, f: &Function, instr: &Instruction) {
    match instr.opcode {
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
            write!(
                out,
                " {}, {}",
                format_value(f, &instr.operands[0]),
                format_value(f, &instr.operands[1])
            )
            .unwrap();
        }
        Opcode::Zext1 | Opcode::Alloca | Opcode::Load | Opcode::TrapFromErr | Opcode::ConstStr => {
            write!(out, " {}", format_value(f, &instr.operands[0])).unwrap();
        }
        Opcode::Store => {
            write!(
                out,
                " {}, {}",
                format_value(f, &instr.operands[0]),
                format_value(f, &instr.operands[1])
            )
            .unwrap();
        }
        Opcode::Call => {
            let callee = instr.callee.as_deref().unwrap_or("");
            let args = instr
                .operands
                .iter()
                .map(|v| format_value(f, v))
                .collect::<Vec<_>>()
                .join(", ");
            write!(out, " @{callee}({args})").unwrap();
        }
        Opcode::Br => {
            write!(out, " {}", f.blocks[instr.successors[0]].label).unwrap();
            write_args(out, f, &instr.branch_args[0]);
        }
        Opcode::CBr => {
            write!(out, " {}", format_value(f, &instr.operands[0])).unwrap();
            write!(out, ", {}", f.blocks[instr.successors[0]].label).unwrap();
            write_args(out, f, &instr.branch_args[0]);
            write!(out, ", {}", f.blocks[instr.successors[1]].label).unwrap();
            write_args(out, f, &instr.branch_args[1]);
        }
        Opcode::SwitchI32 => {
            write!(
                out,
                " {}, {}",
                format_value(f, &instr.operands[0]),
                f.blocks[instr.successors[0]].label
            )
            .unwrap();
            for (case_val, succ) in instr.switch_cases.iter().zip(instr.successors.iter().skip(1)) {
                write!(out, ", {} -> {}", case_val, f.blocks[*succ].label).unwrap();
            }
        }
        Opcode::Ret => {
            if let Some(v) = instr.operands.first() {
                write!(out, " {}", format_value(f, v)).unwrap();
            }
        }
        Opcode::Trap | Opcode::EhPop | Opcode::EhEntry => {}
        Opcode::TrapKind(kind) => {
            write!(out, " {}", kind.token()).unwrap();
        }
        Opcode::ResumeSame | Opcode::ResumeNext => {
            write!(out, " {}", format_value(f, &instr.operands[0])).unwrap();
        }
        Opcode::ResumeLabel => {
            write!(
                out,
                " {}, ^{}",
                format_value(f, &instr.operands[0]),
                f.blocks[instr.successors[0]].label
            )
            .unwrap();
        }
        Opcode::EhPush => {
            write!(out, " ^{}", f.blocks[instr.successors[0]].label).unwrap();
        }
    }
}

fn write_args(out: &mut String, f: &Function, args: &[Value]) {
    if args.is_empty() {
        return;
    }
    let s = args
        .iter()
        .map(|v| format_value(f, v))
        .collect::<Vec<_>>()
        .join(", ");
    write!(out, "({s})").unwrap();
}

fn format_value(f: &Function, v: &Value) -> String {
    match v {
        Value::Temp(id) => format!("%{}", temp_name(f, *id)),
        Value::ConstInt(n) => n.to_string(),
        Value::ConstFloat(x) => format_float(*x),
        Value::ConstStr(s) => escape_str(s),
        Value::GlobalAddr(name) => format!("@{name}"),
        Value::Null => "null".to_string(),
    }
}

fn temp_name(f: &Function, id: ValueId) -> String {
    f.value_names
        .get(&id)
        .cloned()
        .unwrap_or_else(|| format!("t{}", id.0))
}

/// Formats a float with enough precision to round-trip and always with a
/// `.`/`e` marker, since the lexer only recognises `3.0`/`3e0` as a float
/// token — a bare `3` would come back as `ConstInt` on re-parse.
fn format_float(v: f64) -> String {
    let s = format!("{v}");
    if s.contains('.') || s.contains('e') || s.contains('E') || s.contains("inf") || s.contains("NaN") {
        s
    } else {
        format!("{s}.0")
    }
}

/// Escapes a string literal using exactly the escapes `crate::lexer`
/// understands (`\n \t \r \0 \" \\`); anything else passes through
/// unescaped, including embedded NULs represented as the `\0` escape.
fn escape_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;

    #[test]
    fn float_without_fraction_gets_marker() {
        assert_eq!(format_float(3.0), "3.0");
        assert_eq!(format_float(3.5), "3.5");
    }

    #[test]
    fn escapes_quotes_and_newlines() {
        assert_eq!(escape_str("a\"b\nc"), "\"a\\\"b\\nc\"");
    }

    #[test]
    fn serializes_and_reparses_s1() {
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
        let m1 = parse(src).unwrap();
        let text1 = serialize(&m1, &SerializeOptions::default());
        let m2 = parse(&text1).expect("serialized S1 should re-parse");
        let text2 = serialize(&m2, &SerializeOptions::default());
        assert_eq!(text1, text2);
    }

    #[test]
    fn round_trips_handler_block_and_resume() {
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
        let m1 = parse(src).unwrap();
        let text1 = serialize(&m1, &SerializeOptions::default());
        assert!(text1.contains("handler h"));
        assert!(text1.contains("eh.push ^h"));
        assert!(text1.contains("resume.label %t, ^recover"));
        let m2 = parse(&text1).expect("should re-parse");
        let text2 = serialize(&m2, &SerializeOptions::default());
        assert_eq!(text1, text2);
    }

    #[test]
    fn round_trips_global_and_extern_linkage() {
        let src = r#"
            extern @puts(str) -> i64;
            global export const i64 @counter = 7;
            global const f64 @pi = 3.5;
            func import @puts(str) -> i64;
        "#;
        let m1 = parse(src).unwrap();
        let text1 = serialize(&m1, &SerializeOptions::default());
        assert!(text1.contains("global export const i64 @counter = 7;"));
        assert!(text1.contains("global const f64 @pi = 3.5;"));
        assert!(text1.contains("func import @puts(str) -> i64;"));
        let m2 = parse(&text1).unwrap();
        assert_eq!(m2.externs.len(), 1);
        assert_eq!(m2.globals.len(), 2);
    }

    #[test]
    fn canonical_mode_sorts_externs_by_name() {
        let src = r#"
            extern @zeta() -> void;
            extern @alpha() -> void;
            func @main() -> i64 { entry: ret 0; }
        "#;
        let m = parse(src).unwrap();
        let text = serialize(&m, &SerializeOptions { canonical: true });
        let alpha_pos = text.find("@alpha").unwrap();
        let zeta_pos = text.find("@zeta").unwrap();
        assert!(alpha_pos < zeta_pos);
    }

    #[test]
    fn round_trips_switch_i32_cases() {
        let src = r#"
            func @main(x: i32) -> i64 {
                entry:
                    switch.i32 %x, default, 0 -> zero, 1 -> one;
                default:
                    ret 99;
                zero:
                    ret 0;
                one:
                    ret 1;
            }
        "#;
        let m1 = parse(src).unwrap();
        let text1 = serialize(&m1, &SerializeOptions::default());
        assert!(text1.contains("switch.i32 %x, default, 0 -> zero, 1 -> one;"));
        let m2 = parse(&text1).unwrap();
        let text2 = serialize(&m2, &SerializeOptions::default());
        assert_eq!(text1, text2);
    }

    #[test]
    fn round_trips_trap_kind_token() {
        let src = r#"
            func @main() -> i64 {
                entry:
                    trap.kind DivByZero;
            }
        "#;
        let m1 = parse(src).unwrap();
        let text1 = serialize(&m1, &SerializeOptions::default());
        assert!(text1.contains("trap.kind DivByZero;"));
    }

    /// Scenario S6 (spec §8): a module whose three functions carry internal,
    /// export, and import linkage respectively must have all three survive
    /// a serialize/parse round trip.
    #[test]
    fn s6_round_trips_internal_export_and_import_linkage() {
        let src = r#"
            func @private_helper() -> i64 {
                entry:
                    ret 1;
            }
            func export @public_api() -> i64 {
                entry:
                    ret 2;
            }
            func import @needs_linking() -> i64;
        "#;
        let m1 = parse(src).unwrap();
        assert_eq!(m1.function("private_helper").unwrap().linkage, il_core::Linkage::Internal);
        assert_eq!(m1.function("public_api").unwrap().linkage, il_core::Linkage::Export);
        assert_eq!(m1.function("needs_linking").unwrap().linkage, il_core::Linkage::Import);

        let text1 = serialize(&m1, &SerializeOptions::default());
        assert!(text1.contains("func @private_helper("));
        assert!(text1.contains("func export @public_api("));
        assert!(text1.contains("func import @needs_linking("));

        let m2 = parse(&text1).unwrap();
        assert_eq!(m2.function("private_helper").unwrap().linkage, il_core::Linkage::Internal);
        assert_eq!(m2.function("public_api").unwrap().linkage, il_core::Linkage::Export);
        assert_eq!(m2.function("needs_linking").unwrap().linkage, il_core::Linkage::Import);

        let text2 = serialize(&m2, &SerializeOptions::default());
        assert_eq!(text1, text2);
    }
}
