//! The control-flow graph analysis (spec §4.3): predecessors, successors,
//! and a reverse-postorder numbering, built from each block's terminator.
//!
//! Stores indices only (`BlockId`s), never references into the function —
//! "non-owning pointers into the function" per spec.

use std::collections::{HashMap, HashSet};

use il_core::{BlockId, Function};

#[derive(Debug, Clone)]
pub struct Cfg {
    pub entry: BlockId,
    preds: HashMap<BlockId, Vec<BlockId>>,
    succs: HashMap<BlockId, Vec<BlockId>>,
    /// Blocks reachable from `entry`, in reverse postorder.
    pub rpo: Vec<BlockId>,
}

impl Cfg {
    #[tracing::instrument(skip_all, fields(function = %f.name))]
    pub fn compute(f: &Function) -> Cfg {
        let entry = f.entry_block().expect("verified function has an entry block");
        let rpo = reverse_postorder(f, entry);
        let reachable: HashSet<BlockId> = rpo.iter().copied().collect();

        let mut succs: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        let mut preds: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        for &b in &rpo {
            let s = successors_of(f, b);
            for &t in &s {
                if reachable.contains(&t) {
                    preds.entry(t).or_default().push(b);
                }
            }
            succs.insert(b, s);
        }

        tracing::debug!(blocks = rpo.len(), total_blocks = f.blocks.len(), "cfg computed");
        Cfg { entry, preds, succs, rpo }
    }

    pub fn successors(&self, b: BlockId) -> &[BlockId] {
        self.succs.get(&b).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn predecessors(&self, b: BlockId) -> &[BlockId] {
        self.preds.get(&b).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_reachable(&self, b: BlockId) -> bool {
        self.preds.contains_key(&b) || b == self.entry
    }
}

pub(crate) fn successors_of(f: &Function, id: BlockId) -> Vec<BlockId> {
    f.blocks[id]
        .terminator()
        .map(|t| t.successors.clone())
        .unwrap_or_default()
}

pub(crate) fn reverse_postorder(f: &Function, entry: BlockId) -> Vec<BlockId> {
    let mut visited = HashSet::new();
    let mut postorder = Vec::new();

    fn visit(f: &Function, id: BlockId, visited: &mut HashSet<BlockId>, postorder: &mut Vec<BlockId>) {
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

#[cfg(test)]
mod tests {
    use super::*;
    use il_io::parse;

    #[test]
    fn computes_preds_and_succs_for_s1_loop() {
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
        let f = module.function("main").unwrap();
        let cfg = Cfg::compute(f);

        let loop_bb = f.block_by_label("loop").unwrap();
        let body = f.block_by_label("body").unwrap();
        let entry = f.block_by_label("entry").unwrap();

        // `loop` has two predecessors: `entry` and `body` (the back-edge).
        assert_eq!(cfg.predecessors(loop_bb).len(), 2);
        assert!(cfg.predecessors(loop_bb).contains(&entry));
        assert!(cfg.predecessors(loop_bb).contains(&body));
        assert_eq!(cfg.successors(entry), &[loop_bb]);
    }
}
