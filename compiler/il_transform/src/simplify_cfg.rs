//! SimplifyCFG (spec §4.4): four CFG-shape rewrites, all guarded by a
//! global exception-handling check — "no block containing `eh.entry`,
//! `eh.push`, `eh.pop`, or a `resume.*` terminator is modified, and no edge
//! into or out of such a block is merged or redirected" (spec §9's first
//! Open Question: this guard is opcode-set matching, a known brittleness
//! this implementation inherits deliberately rather than redesigning).

use std::collections::{HashMap, HashSet};

use il_analysis::AnalysisManager;
use il_core::{BlockId, Function, Instruction, Module, Opcode, Ty, Value, ValueId};

/// Per-run rewrite counters, surfaced so tests (spec S5) can assert that
/// the EH guard left every count at zero.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub identical_successors_collapsed: usize,
    pub empty_blocks_spliced: usize,
    pub blocks_merged: usize,
    pub unreachable_blocks_deleted: usize,
}

impl Stats {
    pub fn changed(&self) -> bool {
        *self != Stats::default()
    }
}

/// Runs SimplifyCFG over every function in `module` to a local fixed
/// point. Returns the aggregate stats across all functions.
#[tracing::instrument(skip_all, fields(functions = module.functions.len()))]
pub fn run(module: &mut Module, analyses: &AnalysisManager) -> Stats {
    let mut total = Stats::default();
    for f in module.functions.iter_mut() {
        loop {
            let stats = run_function(f, analyses);
            total.identical_successors_collapsed += stats.identical_successors_collapsed;
            total.empty_blocks_spliced += stats.empty_blocks_spliced;
            total.blocks_merged += stats.blocks_merged;
            total.unreachable_blocks_deleted += stats.unreachable_blocks_deleted;
            if !stats.changed() {
                break;
            }
            analyses.invalidate_all();
        }
    }
    total
}

fn run_function(f: &mut Function, analyses: &AnalysisManager) -> Stats {
    let mut stats = Stats::default();
    stats.identical_successors_collapsed += collapse_identical_successors(f);
    stats.empty_blocks_spliced += splice_empty_blocks(f);
    stats.blocks_merged += merge_single_pred_blocks(f, analyses);
    stats.unreachable_blocks_deleted += delete_unreachable(f, analyses);
    stats
}

fn is_eh_sensitive_block(blk: &il_core::BasicBlockData) -> bool {
    blk.is_handler || blk.instructions.iter().any(|i| i.is_eh_sensitive())
}

/// Rewrite 1: a `cbr` whose two successors are the same label becomes an
/// unconditional `br`, preserving the shared argument list.
fn collapse_identical_successors(f: &mut Function) -> usize {
    let mut count = 0;
    for block_id in f.blocks.indices() {
        if is_eh_sensitive_block(&f.blocks[block_id]) {
            continue;
        }
        let Some(last) = f.blocks[block_id].instructions.last() else { continue };
        if last.opcode != Opcode::CBr || last.successors[0] != last.successors[1] {
            continue;
        }
        let target = last.successors[0];
        let args = last.branch_args[0].clone();
        let loc = last.loc;
        let idx = f.blocks[block_id].instructions.len() - 1;
        let mut br = Instruction::new(Opcode::Br, Ty::Void);
        br.successors.push(target);
        br.branch_args.push(args);
        br.loc = loc;
        f.blocks[block_id].instructions[idx] = br;
        count += 1;
    }
    count
}

/// Rewrite 2: an empty block (no instructions other than an unconditional
/// terminator, no block-parameters) is spliced out: every predecessor
/// branches directly to its successor instead.
fn splice_empty_blocks(f: &mut Function) -> usize {
    let mut count = 0;
    let empties: Vec<(BlockId, BlockId, Vec<Value>)> = f
        .blocks
        .iter_enumerated()
        .filter_map(|(id, blk)| {
            if is_eh_sensitive_block(blk) || !blk.params.is_empty() || blk.instructions.len() != 1 {
                return None;
            }
            let only = &blk.instructions[0];
            if only.opcode != Opcode::Br {
                return None;
            }
            // Never splice a block into itself (a single-block infinite
            // loop with no parameters would otherwise dangle).
            if only.successors[0] == id {
                return None;
            }
            Some((id, only.successors[0], only.branch_args[0].clone()))
        })
        .collect();

    if empties.is_empty() {
        return 0;
    }
    let redirect: HashMap<BlockId, (BlockId, Vec<Value>)> = empties
        .into_iter()
        .map(|(from, to, args)| (from, (to, args)))
        .collect();

    for block_id in f.blocks.indices() {
        if is_eh_sensitive_block(&f.blocks[block_id]) {
            continue;
        }
        let Some(last_idx) = last_instr_index(&f.blocks[block_id]) else { continue };
        let instr = &mut f.blocks[block_id].instructions[last_idx];
        if !instr.is_terminator() {
            continue;
        }
        for i in 0..instr.successors.len() {
            let target = instr.successors[i];
            if target == block_id {
                continue;
            }
            if let Some((real_target, forwarded_args)) = redirect.get(&target) {
                instr.successors[i] = *real_target;
                instr.branch_args[i] = forwarded_args.clone();
                count += 1;
            }
        }
    }
    count
}

fn last_instr_index(blk: &il_core::BasicBlockData) -> Option<usize> {
    (!blk.instructions.is_empty()).then(|| blk.instructions.len() - 1)
}

/// Rewrite 3: a block with a single predecessor whose terminator is an
/// unconditional branch to it is merged into that predecessor.
fn merge_single_pred_blocks(f: &mut Function, analyses: &AnalysisManager) -> usize {
    let mut count = 0;
    loop {
        let cfg = analyses.cfg(f);
        let entry = f.entry_block();
        let mut candidate = None;
        for &block_id in &cfg.rpo {
            if Some(block_id) == entry {
                continue;
            }
            if is_eh_sensitive_block(&f.blocks[block_id]) {
                continue;
            }
            let preds = cfg.predecessors(block_id);
            if preds.len() != 1 {
                continue;
            }
            let pred = preds[0];
            if is_eh_sensitive_block(&f.blocks[pred]) {
                continue;
            }
            let Some(last) = f.blocks[pred].instructions.last() else { continue };
            if last.opcode == Opcode::Br && last.successors[0] == block_id {
                candidate = Some((pred, block_id));
                break;
            }
        }

        let Some((pred, succ)) = candidate else { break };

        let br = f.blocks[pred].instructions.pop().expect("checked above");
        let args = br.branch_args[0].clone();
        let params: Vec<ValueId> = f.blocks[succ].params.iter().map(|p| p.id).collect();
        let subst: HashMap<ValueId, Value> = params.into_iter().zip(args).collect();

        let mut moved = std::mem::take(&mut f.blocks[succ].instructions);
        for instr in moved.iter_mut() {
            for (id, value) in &subst {
                instr.replace_value(*id, value);
            }
        }
        f.blocks[pred].instructions.append(&mut moved);

        // `succ` is now unreachable (its only predecessor no longer
        // branches to it); leave removal to `delete_unreachable` so block
        // ids already referenced elsewhere stay valid during this pass.
        f.blocks[succ].params.clear();
        f.blocks[succ].instructions.push(Instruction::new(Opcode::Trap, Ty::Void));
        analyses.invalidate_all();
        count += 1;
    }
    count
}

/// Rewrite 4: blocks unreachable from the entry block are deleted. Block
/// ids are renumbered; every successor reference elsewhere in the function
/// is rewritten accordingly.
fn delete_unreachable(f: &mut Function, analyses: &AnalysisManager) -> usize {
    let cfg = analyses.cfg(f);
    let reachable: HashSet<BlockId> = cfg.rpo.iter().copied().collect();
    let all: Vec<BlockId> = f.blocks.indices().collect();
    // Handler blocks are reached only via `eh.push`, which the CFG (built
    // purely from terminator successors) does not model as an edge, so they
    // never appear in `reachable`; `is_eh_sensitive_block` (which checks
    // `is_handler`) keeps them out of `to_delete` regardless.
    let to_delete: Vec<BlockId> = all
        .iter()
        .copied()
        .filter(|b| !reachable.contains(b) && !is_eh_sensitive_block(&f.blocks[*b]))
        .collect();

    if to_delete.is_empty() {
        return 0;
    }
    let to_delete_set: HashSet<BlockId> = to_delete.iter().copied().collect();

    let mut remap: HashMap<BlockId, BlockId> = HashMap::new();
    let mut kept = il_utils::index_vec::IdxVec::new();
    for (old_id, blk) in std::mem::take(&mut f.blocks).into_iter_enumerated() {
        if to_delete_set.contains(&old_id) {
            continue;
        }
        let new_id = kept.push(blk);
        remap.insert(old_id, new_id);
    }
    f.blocks = kept;

    for blk in f.blocks.iter_mut() {
        for instr in blk.instructions.iter_mut() {
            for succ in instr.successors.iter_mut() {
                if let Some(&new_id) = remap.get(succ) {
                    *succ = new_id;
                }
            }
        }
    }

    analyses.invalidate_all();
    to_delete.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use il_io::parse;

    #[test]
    fn collapses_identical_cbr_successors() {
        let src = r#"
            func @main(x: i1) -> i64 {
                entry:
                    cbr %x, same(1), same(1);
                same(v: i64):
                    ret %v;
            }
        "#;
        let mut module = parse(src).unwrap();
        let mgr = AnalysisManager::new();
        let stats = run(&mut module, &mgr);
        assert_eq!(stats.identical_successors_collapsed, 1);
        let f = module.function("main").unwrap();
        let entry = f.entry_block().unwrap();
        assert_eq!(f.blocks[entry].instructions.last().unwrap().opcode, Opcode::Br);
    }

    #[test]
    fn splices_empty_block() {
        let src = r#"
            func @main() -> i64 {
                entry:
                    br mid();
                mid:
                    br done();
                done:
                    ret 0;
            }
        "#;
        let mut module = parse(src).unwrap();
        let mgr = AnalysisManager::new();
        let stats = run(&mut module, &mgr);
        assert!(stats.empty_blocks_spliced >= 1);
        let f = module.function("main").unwrap();
        let entry = f.entry_block().unwrap();
        let target = f.blocks[entry].instructions[0].successors[0];
        assert_eq!(f.blocks[target].label, "done");
    }

    #[test]
    fn merges_single_predecessor_block() {
        let src = r#"
            func @main() -> i64 {
                entry:
                    %a = iadd.ovf 1, 1;
                    br next(%a);
                next(v: i64):
                    %b = iadd.ovf %v, 1;
                    ret %b;
            }
        "#;
        let mut module = parse(src).unwrap();
        let mgr = AnalysisManager::new();
        let stats = run(&mut module, &mgr);
        assert!(stats.blocks_merged >= 1);
        let f = module.function("main").unwrap();
        assert_eq!(f.blocks.len(), 1);
    }

    #[test]
    fn deletes_unreachable_block() {
        let src = r#"
            func @main() -> i64 {
                entry:
                    ret 0;
                dead:
                    ret 1;
            }
        "#;
        let mut module = parse(src).unwrap();
        let mgr = AnalysisManager::new();
        let stats = run(&mut module, &mgr);
        assert_eq!(stats.unreachable_blocks_deleted, 1);
        let f = module.function("main").unwrap();
        assert_eq!(f.blocks.len(), 1);
    }

    #[test]
    fn eh_guard_leaves_handler_block_untouched() {
        let src = r#"
            func @main() -> i64 {
                entry:
                    eh.push ^h;
                    %x = sdiv.chk0 7, 0;
                    eh.pop;
                    ret 0;
                handler h(e: error, t: resume_tok):
                    eh.entry;
                    resume.next %t;
            }
        "#;
        let mut module = parse(src).unwrap();
        let mgr = AnalysisManager::new();
        let before = il_io::serialize(&module, &il_io::SerializeOptions::default());
        let stats = run(&mut module, &mgr);
        let after = il_io::serialize(&module, &il_io::SerializeOptions::default());
        assert_eq!(stats, Stats::default());
        assert_eq!(before, after);
    }
}
