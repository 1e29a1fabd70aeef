//! Peephole simplification (spec §4.4, module pass): algebraic identities
//! from a static rule table, plus conditional-branch collapse.

use std::collections::HashMap;

use il_core::{BlockId, Function, Instruction, Module, Opcode, Value, ValueId};

/// Runs peephole simplification over every function in `module`. Returns
/// whether anything changed.
#[tracing::instrument(skip_all, fields(functions = module.functions.len()))]
pub fn run(module: &mut Module) -> bool {
    let mut changed = false;
    for f in module.functions.iter_mut() {
        changed |= run_function(f);
    }
    changed
}

fn run_function(f: &mut Function) -> bool {
    let mut changed = algebraic_identities(f);
    changed |= collapse_conditional_branches(f);
    changed
}

/// The rule table from spec §4.4: `x+0 -> x`, `x*1 -> x`, `x*0 -> 0`,
/// `x&0 -> 0`, `x|0 -> x`, `x^0 -> x`, `x-0 -> x`. Each rule matches an
/// opcode plus a constant-operand position; the replacement either
/// forwards the other operand or substitutes a fresh constant.
fn algebraic_identities(f: &mut Function) -> bool {
    let mut subst: HashMap<ValueId, Value> = HashMap::new();
    let mut erase: Vec<(BlockId, usize)> = Vec::new();

    for (block_id, block) in f.blocks.iter_enumerated() {
        for (idx, instr) in block.instructions.iter().enumerate() {
            if let Some(result) = instr.result {
                if let Some(rewrite) = identity_rewrite(instr) {
                    subst.insert(result, rewrite);
                    erase.push((block_id, idx));
                }
            }
        }
    }

    if erase.is_empty() {
        return false;
    }

    apply_subst(f, &subst);
    erase_instructions(f, erase);
    true
}

/// Returns the replacement value for `instr` if it matches one of the
/// algebraic identities, without looking at any other instruction (unlike
/// constant folding, these rules fire even when only one operand is a
/// literal).
fn identity_rewrite(instr: &Instruction) -> Option<Value> {
    let lhs = instr.operands.first()?;
    let rhs = instr.operands.get(1)?;
    match instr.opcode {
        Opcode::IAdd | Opcode::IAddOvf => {
            if is_const_int(rhs, 0) {
                Some(lhs.clone())
            } else if is_const_int(lhs, 0) {
                Some(rhs.clone())
            } else {
                None
            }
        }
        Opcode::ISub | Opcode::ISubOvf => is_const_int(rhs, 0).then(|| lhs.clone()),
        Opcode::IMul | Opcode::IMulOvf => {
            if is_const_int(rhs, 0) || is_const_int(lhs, 0) {
                Some(Value::ConstInt(0))
            } else if is_const_int(rhs, 1) {
                Some(lhs.clone())
            } else if is_const_int(lhs, 1) {
                Some(rhs.clone())
            } else {
                None
            }
        }
        Opcode::And => {
            if is_const_int(rhs, 0) || is_const_int(lhs, 0) {
                Some(Value::ConstInt(0))
            } else {
                None
            }
        }
        Opcode::Or => {
            if is_const_int(rhs, 0) {
                Some(lhs.clone())
            } else if is_const_int(lhs, 0) {
                Some(rhs.clone())
            } else {
                None
            }
        }
        Opcode::Xor => {
            if is_const_int(rhs, 0) {
                Some(lhs.clone())
            } else if is_const_int(lhs, 0) {
                Some(rhs.clone())
            } else {
                None
            }
        }
        _ => None,
    }
}

fn is_const_int(v: &Value, want: i64) -> bool {
    v.as_const_int() == Some(want)
}

fn apply_subst(f: &mut Function, subst: &HashMap<ValueId, Value>) {
    for block in f.blocks.iter_mut() {
        for instr in block.instructions.iter_mut() {
            for (id, value) in subst {
                instr.replace_value(*id, value);
            }
        }
    }
}

fn erase_instructions(f: &mut Function, mut erase: Vec<(BlockId, usize)>) {
    erase.sort_by(|a, b| b.1.cmp(&a.1));
    for (block_id, idx) in erase {
        f.blocks[block_id].instructions.remove(idx);
    }
}

/// Conditional-branch collapse (spec §4.4): rewrites a `cbr` to a `br` when
/// the predicate is known, and merges a `cbr` whose two successors are the
/// same label into a single `br`.
fn collapse_conditional_branches(f: &mut Function) -> bool {
    let mut changed = false;
    let mut erase_compare: Vec<(BlockId, usize)> = Vec::new();

    let use_counts = count_uses(f);

    for block_id in f.blocks.indices() {
        let same_target = {
            let blk = &f.blocks[block_id];
            let Some(term_idx) = last_index(blk) else { continue };
            let instr = &blk.instructions[term_idx];
            if instr.opcode != Opcode::CBr {
                continue;
            }
            instr.successors[0] == instr.successors[1]
        };

        if same_target {
            let blk = &mut f.blocks[block_id];
            let term_idx = blk.instructions.len() - 1;
            let target = blk.instructions[term_idx].successors[0];
            let args = blk.instructions[term_idx].branch_args[0].clone();
            let mut br = Instruction::new(Opcode::Br, il_core::Ty::Void);
            br.successors.push(target);
            br.branch_args.push(args);
            br.loc = blk.instructions[term_idx].loc;
            blk.instructions[term_idx] = br;
            changed = true;
            continue;
        }

        let known = {
            let blk = &f.blocks[block_id];
            let Some(term_idx) = last_index(blk) else { continue };
            let instr = &blk.instructions[term_idx];
            if instr.opcode != Opcode::CBr {
                continue;
            }
            known_predicate(f, instr, &use_counts)
        };

        let Some((taken_bool, compare_loc)) = known else { continue };

        if let Some((def_block, def_idx)) = compare_loc {
            erase_compare.push((def_block, def_idx));
        }

        let blk = &mut f.blocks[block_id];
        let term_idx = blk.instructions.len() - 1;
        let instr = &blk.instructions[term_idx];
        let (target, args) = if taken_bool {
            (instr.successors[0], instr.branch_args[0].clone())
        } else {
            (instr.successors[1], instr.branch_args[1].clone())
        };
        let mut br = Instruction::new(Opcode::Br, il_core::Ty::Void);
        br.successors.push(target);
        br.branch_args.push(args);
        br.loc = instr.loc;
        blk.instructions[term_idx] = br;
        changed = true;
    }

    if !erase_compare.is_empty() {
        erase_instructions(f, erase_compare);
        changed = true;
    }

    changed
}

fn last_index(blk: &il_core::BasicBlockData) -> Option<usize> {
    (!blk.instructions.is_empty()).then(|| blk.instructions.len() - 1)
}

/// If `instr` (a `cbr`) has a statically known predicate, returns `(taken,
/// defining_compare_to_erase)`. The defining compare is only erased when it
/// has exactly one use (this branch) per spec §4.4.
fn known_predicate(
    f: &Function,
    instr: &Instruction,
    use_counts: &HashMap<ValueId, usize>,
) -> Option<(bool, Option<(BlockId, usize)>)> {
    match &instr.operands[0] {
        Value::ConstInt(c) => Some((*c != 0, None)),
        Value::Temp(id) => {
            let (def_block, def_idx) = locate_definition(f, *id)?;
            let def = &f.blocks[def_block].instructions[def_idx];
            let taken = match def.opcode {
                Opcode::ICmp(pred) => {
                    let a = def.operands[0].as_const_int()?;
                    let b = def.operands[1].as_const_int()?;
                    pred.eval(a, b)
                }
                Opcode::FCmp(pred) => {
                    let a = def.operands[0].as_const_float()?;
                    let b = def.operands[1].as_const_float()?;
                    pred.eval(a, b)
                }
                _ => return None,
            };
            // Only erase the compare when it has exactly one use (spec
            // §4.4: "has exactly one use"), i.e. this branch is its sole
            // consumer.
            let erase = (use_counts.get(id).copied().unwrap_or(0) == 1)
                .then_some((def_block, def_idx));
            Some((taken, erase))
        }
        _ => None,
    }
}

fn locate_definition(f: &Function, id: ValueId) -> Option<(BlockId, usize)> {
    for (block_id, blk) in f.blocks.iter_enumerated() {
        for (idx, instr) in blk.instructions.iter().enumerate() {
            if instr.result == Some(id) {
                return Some((block_id, idx));
            }
        }
    }
    None
}

fn count_uses(f: &Function) -> HashMap<ValueId, usize> {
    let mut counts: HashMap<ValueId, usize> = HashMap::new();
    let mut bump = |v: &Value, counts: &mut HashMap<ValueId, usize>| {
        if let Value::Temp(id) = v {
            *counts.entry(*id).or_insert(0) += 1;
        }
    };
    for block in f.blocks.iter() {
        for instr in &block.instructions {
            for op in &instr.operands {
                bump(op, &mut counts);
            }
            for args in &instr.branch_args {
                for arg in args {
                    bump(arg, &mut counts);
                }
            }
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use il_io::parse;

    #[test]
    fn folds_add_zero_and_mul_one() {
        let src = r#"
            func @main(x: i64) -> i64 {
                entry:
                    %a = iadd.ovf %x, 0;
                    %b = imul.ovf %a, 1;
                    ret %b;
            }
        "#;
        let mut module = parse(src).unwrap();
        assert!(run(&mut module));
        let f = module.function("main").unwrap();
        let entry = f.entry_block().unwrap();
        assert_eq!(f.blocks[entry].instructions.len(), 1);
        assert_eq!(f.blocks[entry].instructions[0].operands[0], Value::Temp(f.params[0].id));
    }

    #[test]
    fn collapses_constant_conditional_branch() {
        let src = r#"
            func @main() -> i64 {
                entry:
                    cbr 1, a(), b();
                a:
                    ret 1;
                b:
                    ret 2;
            }
        "#;
        let mut module = parse(src).unwrap();
        assert!(run(&mut module));
        let f = module.function("main").unwrap();
        let entry = f.entry_block().unwrap();
        let term = f.blocks[entry].instructions.last().unwrap();
        assert_eq!(term.opcode, Opcode::Br);
        assert_eq!(f.blocks[term.successors[0]].label, "a");
    }

    #[test]
    fn collapses_identical_successors() {
        let src = r#"
            func @main(x: i1) -> i64 {
                entry:
                    cbr %x, same(1), same(1);
                same(v: i64):
                    ret %v;
            }
        "#;
        let mut module = parse(src).unwrap();
        assert!(run(&mut module));
        let f = module.function("main").unwrap();
        let entry = f.entry_block().unwrap();
        let term = f.blocks[entry].instructions.last().unwrap();
        assert_eq!(term.opcode, Opcode::Br);
    }

    #[test]
    fn erases_single_use_compare_feeding_collapsed_branch() {
        let src = r#"
            func @main() -> i64 {
                entry:
                    %c = scmp_lt 1, 3;
                    cbr %c, a(), b();
                a:
                    ret 1;
                b:
                    ret 2;
            }
        "#;
        let mut module = parse(src).unwrap();
        assert!(run(&mut module));
        let f = module.function("main").unwrap();
        let entry = f.entry_block().unwrap();
        assert_eq!(f.blocks[entry].instructions.len(), 1);
    }
}
