//! The module linker (spec §4.5): merges an ordered list of modules into a
//! single module, or reports every diagnostic it can find in one pass
//! (spec §7 "The linker collects all errors before returning").

pub mod thunk;

use std::collections::{HashMap, HashSet};

use il_core::{Diagnostic, Extern, Function, Global, Linkage, Module, Opcode, Ty, Value};

/// Links `modules`, in input order, into a single module (spec §4.5 steps
/// 1–11). `modules[0]` is not privileged; the **entry module** is whichever
/// one defines a non-import `main`, wherever it falls in the list.
#[tracing::instrument(skip_all, fields(modules = modules.len()))]
pub fn link(mut modules: Vec<Module>) -> Result<Module, Vec<Diagnostic>> {
    let entry_idx = find_entry_module(&modules)?;

    let mut errors: Vec<Diagnostic> = Vec::new();

    let exports = build_export_index(&modules, &mut errors);
    resolve_imports(&modules, entry_idx, &exports, &mut errors);

    let used = reserved_names(&modules[entry_idx], &exports);
    let rename_maps = rename_colliding_internals(&mut modules, entry_idx, &used);
    apply_call_renames(&mut modules, &rename_maps);

    let merged_externs = merge_externs(&modules, &mut errors);
    let (merged_globals, global_rename_maps) = merge_globals(&modules, entry_idx, &mut errors);
    apply_global_renames(&mut modules, &global_rename_maps);

    let init_fns = collect_init_functions(&modules, entry_idx);

    let thunk_redirects = build_bool_thunks(&modules, entry_idx, &exports, &mut errors);
    let thunk_rename: HashMap<String, String> = thunk_redirects
        .iter()
        .map(|(import_name, (thunk_name, _))| (import_name.clone(), thunk_name.clone()))
        .collect();
    let thunk_maps = vec![thunk_rename; modules.len()];
    apply_call_renames(&mut modules, &thunk_maps);

    if !errors.is_empty() {
        return Err(errors);
    }

    let mut merged_functions = assemble_functions(modules, entry_idx);
    merged_functions.extend(thunk_redirects.into_values().map(|(_, f)| f));

    inject_init_calls(&mut merged_functions, &init_fns);

    let merged = Module {
        version: il_core::IL_VERSION.to_string(),
        target: None,
        externs: merged_externs,
        globals: merged_globals,
        functions: merged_functions,
    };

    Ok(merged)
}

fn find_entry_module(modules: &[Module]) -> Result<usize, Vec<Diagnostic>> {
    let mut found = None;
    for (idx, m) in modules.iter().enumerate() {
        if m.functions.iter().any(|f| f.name == "main" && !f.is_import()) {
            if found.is_some() {
                return Err(vec![Diagnostic::link("more than one module defines `main`")]);
            }
            found = Some(idx);
        }
    }
    found.ok_or_else(|| vec![Diagnostic::link("no module defines `main`")])
}

/// name -> module index exporting it (spec §4.5 step 2).
fn build_export_index(modules: &[Module], errors: &mut Vec<Diagnostic>) -> HashMap<String, usize> {
    let mut exports = HashMap::new();
    for (idx, m) in modules.iter().enumerate() {
        for f in &m.functions {
            if f.linkage == Linkage::Export {
                if exports.insert(f.name.clone(), idx).is_some() {
                    errors.push(Diagnostic::link(format!("duplicate export `{}`", f.name)));
                }
            }
        }
    }
    exports
}

/// Verifies every import is resolvable: an export anywhere, or (fallback)
/// an internal `main`-module function of the same name (spec §4.5 step 3).
fn resolve_imports(
    modules: &[Module],
    entry_idx: usize,
    exports: &HashMap<String, usize>,
    errors: &mut Vec<Diagnostic>,
) {
    for m in modules {
        for f in &m.functions {
            if f.linkage != Linkage::Import {
                continue;
            }
            let resolved = exports.contains_key(&f.name)
                || modules[entry_idx].functions.iter().any(|ef| ef.name == f.name && !ef.is_import());
            if !resolved {
                errors.push(Diagnostic::link(format!("unresolved import `{}`", f.name)));
            }
        }
    }
}

/// Names an internal-linkage rename must avoid colliding with (spec §4.5
/// step 4): every export, plus every function defined in the entry module.
fn reserved_names(entry_module: &Module, exports: &HashMap<String, usize>) -> HashSet<String> {
    let mut used: HashSet<String> = exports.keys().cloned().collect();
    used.extend(entry_module.functions.iter().map(|f| f.name.clone()));
    used
}

/// Renames internal-linkage functions from non-entry modules whose name
/// collides with a reserved name, to `m<idx>$<old>` (spec §4.5 step 5).
/// Returns one rename map per module index (empty for the entry module).
fn rename_colliding_internals(
    modules: &mut [Module],
    entry_idx: usize,
    used: &HashSet<String>,
) -> Vec<HashMap<String, String>> {
    let mut maps = vec![HashMap::new(); modules.len()];
    for (idx, m) in modules.iter_mut().enumerate() {
        if idx == entry_idx {
            continue;
        }
        for f in m.functions.iter_mut() {
            if f.linkage == Linkage::Internal && used.contains(&f.name) {
                let new_name = format!("m{idx}${}", f.name);
                maps[idx].insert(f.name.clone(), new_name.clone());
                f.name = new_name;
            }
        }
    }
    maps
}

/// Rewrites every `call`'s callee per `maps[module_idx]`, within that
/// module only (internal-linkage renames are only ever called from within
/// their own module).
fn apply_call_renames(modules: &mut [Module], maps: &[HashMap<String, String>]) {
    for (idx, m) in modules.iter_mut().enumerate() {
        let Some(map) = maps.get(idx) else { continue };
        if map.is_empty() {
            continue;
        }
        for f in m.functions.iter_mut() {
            for blk in f.blocks.iter_mut() {
                for instr in blk.instructions.iter_mut() {
                    if instr.opcode == Opcode::Call {
                        if let Some(callee) = instr.callee.clone() {
                            if let Some(new_name) = map.get(&callee) {
                                instr.callee = Some(new_name.clone());
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Merges externs by name; a redeclaration must match kind-for-kind (spec
/// §4.5 step 6).
fn merge_externs(modules: &[Module], errors: &mut Vec<Diagnostic>) -> Vec<Extern> {
    let mut merged: Vec<Extern> = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();
    for m in modules {
        for e in &m.externs {
            if let Some(&existing) = seen.get(&e.name) {
                let prior = &merged[existing];
                if prior.ret_ty != e.ret_ty || prior.param_tys != e.param_tys {
                    errors.push(Diagnostic::link(format!(
                        "extern `{}` redeclared with a different signature",
                        e.name
                    )));
                }
            } else {
                seen.insert(e.name.clone(), merged.len());
                merged.push(e.clone());
            }
        }
    }
    merged
}

/// Merges globals by name; a non-entry-module collision is renamed with the
/// module prefix (spec §4.5 step 7). Entry-module name collisions are a
/// genuine error (the entry module's globals are never renamed away).
fn merge_globals(
    modules: &[Module],
    entry_idx: usize,
    errors: &mut Vec<Diagnostic>,
) -> (Vec<Global>, Vec<HashMap<String, String>>) {
    let mut merged: Vec<Global> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut rename_maps = vec![HashMap::new(); modules.len()];

    for (idx, m) in modules.iter().enumerate() {
        for g in &m.globals {
            let mut g = g.clone();
            if seen.contains(&g.name) {
                if idx == entry_idx {
                    errors.push(Diagnostic::link(format!("duplicate global `{}`", g.name)));
                } else {
                    let new_name = format!("m{idx}${}", g.name);
                    rename_maps[idx].insert(g.name.clone(), new_name.clone());
                    g.name = new_name;
                }
            }
            seen.insert(g.name.clone());
            merged.push(g);
        }
    }
    (merged, rename_maps)
}

/// Rewrites `GlobalAddr` operands per `maps[module_idx]`.
fn apply_global_renames(modules: &mut [Module], maps: &[HashMap<String, String>]) {
    for (idx, m) in modules.iter_mut().enumerate() {
        let Some(map) = maps.get(idx) else { continue };
        if map.is_empty() {
            continue;
        }
        for f in m.functions.iter_mut() {
            for blk in f.blocks.iter_mut() {
                for instr in blk.instructions.iter_mut() {
                    for op in instr.operands.iter_mut() {
                        if let Value::GlobalAddr(name) = op {
                            if let Some(new_name) = map.get(name) {
                                *name = new_name.clone();
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Collects init-function names in input order (spec §4.5 step 8): every
/// non-import function in a non-entry module whose (post-rename) name ends
/// in `$init`.
fn collect_init_functions(modules: &[Module], entry_idx: usize) -> Vec<String> {
    let mut names = Vec::new();
    for (idx, m) in modules.iter().enumerate() {
        if idx == entry_idx {
            continue;
        }
        for f in &m.functions {
            if !f.is_import() && f.name.ends_with("$init") {
                names.push(f.name.clone());
            }
        }
    }
    names
}

/// Assembles the merged non-import function list in order: entry module
/// first, then the rest in input order (spec §4.5 step 9).
fn assemble_functions(modules: Vec<Module>, entry_idx: usize) -> Vec<Function> {
    let mut out = Vec::new();
    let mut modules: Vec<Option<Module>> = modules.into_iter().map(Some).collect();

    let entry_module = modules[entry_idx].take().expect("entry module present");
    out.extend(entry_module.functions.into_iter().filter(|f| !f.is_import()));

    for slot in modules.into_iter() {
        let Some(m) = slot else { continue };
        out.extend(m.functions.into_iter().filter(|f| !f.is_import()));
    }
    out
}

/// Prepends a sequence of void-returning init calls to `main`'s entry block
/// (spec §4.5 step 10).
fn inject_init_calls(functions: &mut [Function], init_fns: &[String]) {
    if init_fns.is_empty() {
        return;
    }
    let Some(main_fn) = functions.iter_mut().find(|f| f.name == "main") else { return };
    let Some(entry) = main_fn.entry_block() else { return };
    let calls: Vec<il_core::Instruction> = init_fns
        .iter()
        .map(|name| il_core::Instruction::new(Opcode::Call, Ty::Void).with_callee(name.clone()))
        .collect();
    let entry_instrs = &mut main_fn.blocks[entry].instructions;
    for (i, call) in calls.into_iter().enumerate() {
        entry_instrs.insert(i, call);
    }
}

/// Generates a bool thunk (spec §4.5 step 11) for each import whose
/// declared signature disagrees with its resolved target's only in
/// boolean representation, and records the redirect every caller of the
/// import needs. Returns `import_name -> (thunk_name, thunk_function)`.
fn build_bool_thunks(
    modules: &[Module],
    entry_idx: usize,
    exports: &HashMap<String, usize>,
    errors: &mut Vec<Diagnostic>,
) -> HashMap<String, (String, Function)> {
    let mut thunks = HashMap::new();
    let mut seen_names: HashSet<String> = HashSet::new();

    for m in modules {
        for import in &m.functions {
            if import.linkage != Linkage::Import || !seen_names.insert(import.name.clone()) {
                continue;
            }

            let target = exports
                .get(&import.name)
                .and_then(|&idx| modules[idx].functions.iter().find(|f| f.name == import.name))
                .or_else(|| {
                    modules[entry_idx]
                        .functions
                        .iter()
                        .find(|f| f.name == import.name && !f.is_import())
                });
            let Some(target) = target else { continue };

            let import_params: Vec<Ty> = import.params.iter().map(|p| p.ty).collect();
            let target_params: Vec<Ty> = target.params.iter().map(|p| p.ty).collect();

            match thunk::compare_signatures(import.ret_ty, &import_params, target.ret_ty, &target_params) {
                thunk::SignatureCompat::Identical => {}
                thunk::SignatureCompat::Incompatible => {
                    errors.push(Diagnostic::link(format!(
                        "import `{}` signature does not match its resolved export",
                        import.name
                    )));
                }
                thunk::SignatureCompat::BoolMismatch => {
                    let thunk_fn = thunk::build_bool_thunk(
                        &target.name,
                        import.ret_ty,
                        &import_params,
                        target.ret_ty,
                        &target_params,
                    );
                    let thunk_name = thunk_fn.name.clone();
                    thunks.insert(import.name.clone(), (thunk_name, thunk_fn));
                }
            }
        }
    }
    thunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use il_io::parse;

    fn m(src: &str) -> Module {
        parse(src).unwrap()
    }

    #[test]
    fn single_module_links_to_itself() {
        let a = m(r#"
            func @main() -> i64 {
                entry:
                    ret 0;
            }
        "#);
        let before = il_io::serialize(&a, &il_io::SerializeOptions { canonical: true });
        let linked = link(vec![a]).unwrap();
        let after = il_io::serialize(&linked, &il_io::SerializeOptions { canonical: true });
        assert_eq!(before, after);
    }

    #[test]
    fn missing_main_is_an_error() {
        let a = m(r#"
            func @helper() -> i64 {
                entry:
                    ret 0;
            }
        "#);
        assert!(link(vec![a]).is_err());
    }

    #[test]
    fn resolves_import_against_export_and_drops_import_decl() {
        let a = m(r#"
            import func @helper() -> i64;
            func @main() -> i64 {
                entry:
                    %v = call @helper();
                    ret %v;
            }
        "#);
        let b = m(r#"
            export func @helper() -> i64 {
                entry:
                    ret 42;
            }
        "#);
        let linked = link(vec![a, b]).unwrap();
        assert!(linked.functions.iter().all(|f| !f.is_import()));
        assert!(linked.function("helper").is_some());
        assert!(linked.function("main").is_some());
    }

    #[test]
    fn renames_colliding_internal_function_and_fixes_call_sites() {
        let a = m(r#"
            func @helper() -> i64 {
                entry:
                    ret 1;
            }
            func @main() -> i64 {
                entry:
                    %v = call @helper();
                    ret %v;
            }
        "#);
        let b = m(r#"
            func @helper() -> i64 {
                entry:
                    ret 2;
            }
            func @uses_helper() -> i64 {
                entry:
                    %v = call @helper();
                    ret %v;
            }
        "#);
        let linked = link(vec![a, b]).unwrap();
        assert!(linked.function("helper").is_some());
        assert!(linked.function("m1$helper").is_some());
        let uses = linked.function("m1$uses_helper").or_else(|| linked.function("uses_helper")).unwrap();
        let entry = uses.entry_block().unwrap();
        let call = uses.blocks[entry].instructions.iter().find(|i| i.opcode == Opcode::Call).unwrap();
        assert_eq!(call.callee.as_deref(), Some("m1$helper"));
    }

    #[test]
    fn conflicting_extern_signatures_error() {
        let a = m(r#"
            extern func @puts(str) -> i64;
            func @main() -> i64 {
                entry:
                    ret 0;
            }
        "#);
        let b = m(r#"
            extern func @puts(i64) -> i64;
        "#);
        assert!(link(vec![a, b]).is_err());
    }

    #[test]
    fn collects_init_functions_and_injects_calls_into_main() {
        let a = m(r#"
            func @main() -> i64 {
                entry:
                    ret 0;
            }
        "#);
        let b = m(r#"
            func @mod$init() -> void {
                entry:
                    ret;
            }
        "#);
        let linked = link(vec![a, b]).unwrap();
        let main_fn = linked.function("main").unwrap();
        let entry = main_fn.entry_block().unwrap();
        let first = &main_fn.blocks[entry].instructions[0];
        assert_eq!(first.opcode, Opcode::Call);
        assert_eq!(first.callee.as_deref(), Some("mod$init"));
    }

    #[test]
    fn bool_mismatched_import_gets_a_thunk() {
        let a = m(r#"
            import func @predicate(i64) -> i64;
            func @main() -> i64 {
                entry:
                    %v = call @predicate(1);
                    ret %v;
            }
        "#);
        let b = m(r#"
            export func @predicate(x: i1) -> i1 {
                entry:
                    ret %x;
            }
        "#);
        let linked = link(vec![a, b]).unwrap();
        assert!(linked.function("predicate$bool_thunk").is_some());
        let main_fn = linked.function("main").unwrap();
        let entry = main_fn.entry_block().unwrap();
        let call = main_fn.blocks[entry].instructions.iter().find(|i| i.opcode == Opcode::Call).unwrap();
        assert_eq!(call.callee.as_deref(), Some("predicate$bool_thunk"));
    }
}
