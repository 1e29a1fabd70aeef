//! Dead store elimination (spec §4.4): an intra-block backward scan plus a
//! cross-block forward dataflow restricted to non-escaping allocas, so that
//! a call's conservative memory clobber (spec "calls conservatively clobber
//! memory unless BasicAA says otherwise") never has to be modeled for the
//! only addresses the cross-block variant reasons about.

use std::collections::HashMap;

use il_analysis::{AliasResult, AnalysisManager, BasicAA, ModRefInfo};
use il_core::{BlockId, Function, Module, Opcode, Value, ValueId};

/// Runs both DSE variants over every function in `module`. Returns whether
/// anything changed.
#[tracing::instrument(skip_all, fields(functions = module.functions.len()))]
pub fn run(module: &mut Module, analyses: &AnalysisManager) -> bool {
    let mut changed = false;
    let functions: Vec<String> = module.functions.iter().map(|f| f.name.clone()).collect();
    for name in functions {
        let aa = {
            let f = module.function(&name).expect("function present by name");
            analyses.alias(f)
        };
        let modref = module_modref(module, &name);
        let f = module.function_mut(&name).unwrap();
        changed |= intra_block(f, &modref, &aa);
        let f = module.function_mut(&name).unwrap();
        changed |= cross_block(f, &aa, analyses);
    }
    changed
}

/// A thin wrapper letting the intra-block pass call `call_modref` without
/// borrowing the whole module immutably alongside a mutable function
/// borrow; captured up front per function.
struct ModRefLookup(HashMap<String, ModRefInfo>);

fn module_modref(module: &Module, _current_fn: &str) -> ModRefLookup {
    let mut map = HashMap::new();
    for f in &module.functions {
        map.insert(f.name.clone(), il_analysis::alias::call_modref(module, &f.name));
    }
    ModRefLookup(map)
}

impl ModRefLookup {
    fn of(&self, callee: &str) -> ModRefInfo {
        self.0.get(callee).copied().unwrap_or(ModRefInfo::MOD_REF)
    }
}

/// Intra-block DSE (spec §4.4): "a store to address P is dead when, before
/// any load that may alias P, another store to an alias of P occurs."
fn intra_block(f: &mut Function, modref: &ModRefLookup, aa: &BasicAA) -> bool {
    let mut erase: Vec<(BlockId, usize)> = Vec::new();

    for (block_id, block) in f.blocks.iter_enumerated() {
        // Stores seen so far walking backward, not yet proven read.
        let mut covering: Vec<(Value, usize)> = Vec::new();
        for idx in (0..block.instructions.len()).rev() {
            let instr = &block.instructions[idx];
            match instr.opcode {
                Opcode::Store => {
                    let addr = &instr.operands[1];
                    let dead = covering
                        .iter()
                        .any(|(a, _)| aa.alias(a, addr) == AliasResult::MustAlias);
                    if dead {
                        erase.push((block_id, idx));
                    } else {
                        covering.push((addr.clone(), idx));
                    }
                }
                Opcode::Load => {
                    let addr = &instr.operands[0];
                    covering.retain(|(a, _)| aa.alias(a, addr) == AliasResult::NoAlias);
                }
                Opcode::Call => {
                    let callee = instr.callee.as_deref().unwrap_or("");
                    let mr = modref.of(callee);
                    if mr.refs || mr.modifies {
                        covering.clear();
                    }
                }
                _ => {}
            }
        }
    }

    if erase.is_empty() {
        return false;
    }
    erase.sort_by(|a, b| b.1.cmp(&a.1));
    for (block_id, idx) in erase {
        f.blocks[block_id].instructions.remove(idx);
    }
    true
}

/// Cross-block DSE (spec §4.4): "forward dataflow on non-escaping allocas
/// to detect stores overwritten on all subsequent paths before any read."
///
/// Implemented as a backward must-dataflow per alloca: `dead_on_entry(B)`
/// means every path leaving the entry of `B` reaches another store to the
/// alloca (or the function's end) before any load of it. A store is
/// eliminated when, scanning its block backward, `dead_on_entry` of
/// whatever comes after it is already `true` at the point just past the
/// store.
fn cross_block(f: &mut Function, aa: &BasicAA, analyses: &AnalysisManager) -> bool {
    let cfg = analyses.cfg(f);
    let allocas: Vec<ValueId> = aa.non_escaping_allocas().collect();
    if allocas.is_empty() {
        return false;
    }

    let mut changed = false;
    for alloca in allocas {
        let addr = Value::Temp(alloca);
        let blocks: Vec<BlockId> = cfg.rpo.clone();

        // `dead_on_entry[b]`: optimistic initial guess, refined to a fixed
        // point. A block with no successors in the CFG (its terminator
        // returns or traps) is dead-after by construction: nothing reads a
        // non-escaping alloca once the function has returned.
        let mut dead_on_entry: HashMap<BlockId, bool> = blocks.iter().map(|&b| (b, true)).collect();

        for _ in 0..=blocks.len() {
            let mut stable = true;
            for &b in &blocks {
                let succs = cfg.successors(b);
                let dead_after = if succs.is_empty() {
                    true
                } else {
                    succs.iter().all(|s| dead_on_entry.get(s).copied().unwrap_or(false))
                };
                let new_entry = transfer(f, b, &addr, aa, dead_after);
                if dead_on_entry.get(&b).copied() != Some(new_entry) {
                    dead_on_entry.insert(b, new_entry);
                    stable = false;
                }
            }
            if stable {
                break;
            }
        }

        let mut erase: Vec<(BlockId, usize)> = Vec::new();
        for &b in &blocks {
            let succs = cfg.successors(b);
            let dead_after = if succs.is_empty() {
                true
            } else {
                succs.iter().all(|s| dead_on_entry.get(s).copied().unwrap_or(false))
            };
            collect_dead_stores(f, b, &addr, aa, dead_after, &mut erase);
        }
        if !erase.is_empty() {
            erase.sort_by(|a, b| b.1.cmp(&a.1));
            for (block_id, idx) in erase {
                f.blocks[block_id].instructions.remove(idx);
            }
            changed = true;
        }
    }
    changed
}

/// The per-block transfer function: given whether the alloca is dead
/// immediately after this block, returns whether it is dead on entry.
fn transfer(f: &Function, b: BlockId, addr: &Value, aa: &BasicAA, dead_after: bool) -> bool {
    let mut state = dead_after;
    for instr in f.blocks[b].instructions.iter().rev() {
        state = step(instr, addr, aa, state);
    }
    state
}

fn step(instr: &il_core::Instruction, addr: &Value, aa: &BasicAA, state: bool) -> bool {
    match instr.opcode {
        Opcode::Load => {
            let load_addr = &instr.operands[0];
            if aa.alias(addr, load_addr) != AliasResult::NoAlias {
                false
            } else {
                state
            }
        }
        Opcode::Store => {
            let store_addr = &instr.operands[1];
            if aa.alias(addr, store_addr) == AliasResult::MustAlias {
                true
            } else {
                state
            }
        }
        _ => state,
    }
}

fn collect_dead_stores(
    f: &Function,
    b: BlockId,
    addr: &Value,
    aa: &BasicAA,
    dead_after: bool,
    erase: &mut Vec<(BlockId, usize)>,
) {
    let mut state = dead_after;
    for idx in (0..f.blocks[b].instructions.len()).rev() {
        let instr = &f.blocks[b].instructions[idx];
        if instr.opcode == Opcode::Store {
            let store_addr = &instr.operands[1];
            if aa.alias(addr, store_addr) == AliasResult::MustAlias {
                if state {
                    erase.push((b, idx));
                }
                state = true;
                continue;
            }
        }
        state = step(instr, addr, aa, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use il_analysis::AnalysisManager;
    use il_io::parse;

    #[test]
    fn intra_block_removes_overwritten_store() {
        let src = r#"
            func @main() -> i64 {
                entry:
                    %p = alloca;
                    store 1, %p;
                    store 2, %p;
                    %v = load %p;
                    ret %v;
            }
        "#;
        let mut module = parse(src).unwrap();
        let aa = BasicAA::compute(module.function("main").unwrap());
        let modref = module_modref(&module, "main");
        let changed = intra_block(module.function_mut("main").unwrap(), &modref, &aa);
        assert!(changed);
        let f = module.function("main").unwrap();
        let entry = f.entry_block().unwrap();
        let store_count = f.blocks[entry]
            .instructions
            .iter()
            .filter(|i| i.opcode == Opcode::Store)
            .count();
        assert_eq!(store_count, 1);
    }

    #[test]
    fn intra_block_keeps_store_read_before_overwrite() {
        let src = r#"
            func @main() -> i64 {
                entry:
                    %p = alloca;
                    store 1, %p;
                    %v = load %p;
                    store 2, %p;
                    ret %v;
            }
        "#;
        let mut module = parse(src).unwrap();
        let aa = BasicAA::compute(module.function("main").unwrap());
        let modref = module_modref(&module, "main");
        let changed = intra_block(module.function_mut("main").unwrap(), &modref, &aa);
        assert!(!changed);
    }

    #[test]
    fn cross_block_removes_store_overwritten_on_every_path() {
        let src = r#"
            func @main(cond: i1) -> i64 {
                entry:
                    %p = alloca;
                    store 1, %p;
                    cbr %cond, left(), right();
                left:
                    store 2, %p;
                    br join();
                right:
                    store 3, %p;
                    br join();
                join:
                    %v = load %p;
                    ret %v;
            }
        "#;
        let mut module = parse(src).unwrap();
        let mgr = AnalysisManager::new();
        let aa = il_analysis::BasicAA::compute(module.function("main").unwrap());
        let changed = cross_block(module.function_mut("main").unwrap(), &aa, &mgr);
        assert!(changed);
        let f = module.function("main").unwrap();
        let entry = f.entry_block().unwrap();
        assert!(!f.blocks[entry].instructions.iter().any(|i| i.opcode == Opcode::Store));
    }

    #[test]
    fn cross_block_keeps_store_read_on_some_path() {
        let src = r#"
            func @main(cond: i1) -> i64 {
                entry:
                    %p = alloca;
                    store 1, %p;
                    cbr %cond, left(), right();
                left:
                    %v = load %p;
                    br join(%v);
                right:
                    br join(0);
                join(r: i64):
                    ret %r;
            }
        "#;
        let mut module = parse(src).unwrap();
        let mgr = AnalysisManager::new();
        let aa = il_analysis::BasicAA::compute(module.function("main").unwrap());
        let changed = cross_block(module.function_mut("main").unwrap(), &aa, &mgr);
        assert!(!changed);
    }
}
