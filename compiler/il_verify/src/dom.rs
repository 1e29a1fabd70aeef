//! A minimal CFG/dominator computation private to the verifier.
//!
//! Deliberately not shared with `il_analysis`: the verifier must be able to
//! check a function that has never been analyzed (and may never be, if it's
//! only ever parsed and verified once), so it keeps its own small
//! predecessor/dominator builder rather than depending on the analysis
//! manager's cached, transform-invalidated analyses.

use std::collections::HashMap;

use il_core::{BlockId, Function};

pub struct DomInfo {
    idom: HashMap<BlockId, BlockId>,
    /// Blocks reachable from the entry block, in reverse-postorder.
    pub rpo: Vec<BlockId>,
}

impl DomInfo {
    /// Whether `a` dominates `b`. Blocks unreachable from entry (absent
    /// from `rpo`) are never considered dominated by anything; callers
    /// should treat unreachable code leniently rather than ask this.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let mut cur = b;
        loop {
            if cur == a {
                return true;
            }
            match self.idom.get(&cur) {
                Some(&p) if p != cur => cur = p,
                _ => return false,
            }
        }
    }

    pub fn is_reachable(&self, b: BlockId) -> bool {
        self.idom.contains_key(&b)
    }
}

fn successors_of(f: &Function, id: BlockId) -> Vec<BlockId> {
    f.blocks[id]
        .terminator()
        .map(|t| t.successors.clone())
        .unwrap_or_default()
}

fn reverse_postorder(f: &Function, entry: BlockId) -> Vec<BlockId> {
    let mut visited = std::collections::HashSet::new();
    let mut postorder = Vec::new();

    fn visit(
        f: &Function,
        id: BlockId,
        visited: &mut std::collections::HashSet<BlockId>,
        postorder: &mut Vec<BlockId>,
    ) {
        if !visited.insert(id) {
            return;
        }
        for succ in successors_of(f, id) {
            visit(f, succ, visited, postorder);
        }
        postorder.push(id);
    }

    visit(f, entry, &mut visited, &mut postorder);
    postorder.reverse();
    postorder
}

fn predecessors(f: &Function, rpo: &[BlockId]) -> HashMap<BlockId, Vec<BlockId>> {
    let reachable: std::collections::HashSet<BlockId> = rpo.iter().copied().collect();
    let mut preds: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
    for &b in rpo {
        for succ in successors_of(f, b) {
            if reachable.contains(&succ) {
                preds.entry(succ).or_default().push(b);
            }
        }
    }
    preds
}

/// Computes dominance for the blocks of `f` reachable from `entry`, using
/// the standard iterative Cooper/Harvey/Kennedy algorithm over a
/// reverse-postorder numbering.
pub fn compute(f: &Function, entry: BlockId) -> DomInfo {
    let rpo = reverse_postorder(f, entry);
    let rpo_index: HashMap<BlockId, usize> =
        rpo.iter().enumerate().map(|(i, &b)| (b, i)).collect();
    let preds = predecessors(f, &rpo);

    let mut idom: HashMap<BlockId, BlockId> = HashMap::new();
    idom.insert(entry, entry);

    let mut changed = true;
    while changed {
        changed = false;
        for &b in &rpo {
            if b == entry {
                continue;
            }
            let mut new_idom: Option<BlockId> = None;
            for &p in preds.get(&b).into_iter().flatten() {
                if idom.contains_key(&p) {
                    new_idom = Some(match new_idom {
                        None => p,
                        Some(cur) => intersect(cur, p, &idom, &rpo_index),
                    });
                }
            }
            if let Some(new_idom) = new_idom {
                if idom.get(&b) != Some(&new_idom) {
                    idom.insert(b, new_idom);
                    changed = true;
                }
            }
        }
    }

    DomInfo { idom, rpo }
}

fn intersect(
    mut a: BlockId,
    mut b: BlockId,
    idom: &HashMap<BlockId, BlockId>,
    rpo_index: &HashMap<BlockId, usize>,
) -> BlockId {
    while a != b {
        while rpo_index[&a] > rpo_index[&b] {
            a = idom[&a];
        }
        while rpo_index[&b] > rpo_index[&a] {
            b = idom[&b];
        }
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use il_core::{Function, Instruction, Linkage, Opcode, Ty, Value};

    fn diamond() -> (Function, BlockId, BlockId, BlockId, BlockId) {
        let mut f = Function::new("f", Linkage::Internal, Ty::I64, vec![]);
        let entry = f.blocks.push(il_core::BasicBlockData::new("entry"));
        let left = f.blocks.push(il_core::BasicBlockData::new("left"));
        let right = f.blocks.push(il_core::BasicBlockData::new("right"));
        let join = f.blocks.push(il_core::BasicBlockData::new("join"));

        let mut cbr = Instruction::new(Opcode::CBr, Ty::Void).with_operands(vec![Value::ConstInt(1)]);
        cbr.successors = vec![left, right];
        cbr.branch_args = vec![vec![], vec![]];
        f.blocks[entry].instructions.push(cbr);

        let mut br_l = Instruction::new(Opcode::Br, Ty::Void);
        br_l.successors = vec![join];
        br_l.branch_args = vec![vec![]];
        f.blocks[left].instructions.push(br_l);

        let mut br_r = Instruction::new(Opcode::Br, Ty::Void);
        br_r.successors = vec![join];
        br_r.branch_args = vec![vec![]];
        f.blocks[right].instructions.push(br_r);

        f.blocks[join]
            .instructions
            .push(Instruction::new(Opcode::Ret, Ty::Void));

        (f, entry, left, right, join)
    }

    #[test]
    fn entry_dominates_everything() {
        let (f, entry, left, right, join) = diamond();
        let dom = compute(&f, entry);
        assert!(dom.dominates(entry, left));
        assert!(dom.dominates(entry, right));
        assert!(dom.dominates(entry, join));
    }

    #[test]
    fn diamond_join_is_dominated_only_by_entry_and_itself() {
        let (f, entry, left, right, join) = diamond();
        let dom = compute(&f, entry);
        assert!(!dom.dominates(left, join));
        assert!(!dom.dominates(right, join));
        assert!(dom.dominates(join, join));
        assert!(dom.dominates(entry, join));
    }
}
