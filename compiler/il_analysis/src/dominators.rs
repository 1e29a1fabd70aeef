//! The dominator tree (spec §4.3): computed by the standard iterative
//! dataflow algorithm, using the CFG's reverse-postorder.

use std::collections::HashMap;

use il_core::{BlockId, Function};

use crate::cfg::Cfg;

#[derive(Debug, Clone)]
pub struct Dominators {
    idom: HashMap<BlockId, BlockId>,
}

impl Dominators {
    #[tracing::instrument(skip_all, fields(function = %f.name))]
    pub fn compute(f: &Function, cfg: &Cfg) -> Dominators {
        let rpo_index: HashMap<BlockId, usize> =
            cfg.rpo.iter().enumerate().map(|(i, &b)| (b, i)).collect();

        let mut idom: HashMap<BlockId, BlockId> = HashMap::new();
        idom.insert(cfg.entry, cfg.entry);

        let mut changed = true;
        while changed {
            changed = false;
            for &b in &cfg.rpo {
                if b == cfg.entry {
                    continue;
                }
                let mut new_idom: Option<BlockId> = None;
                for &p in cfg.predecessors(b) {
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

        tracing::debug!(reachable = idom.len(), "dominator tree computed");
        Dominators { idom }
    }

    /// The immediate dominator of `b`, or `None` for the entry block or an
    /// unreachable block.
    pub fn idom(&self, b: BlockId) -> Option<BlockId> {
        match self.idom.get(&b) {
            Some(&p) if p != b => Some(p),
            _ => None,
        }
    }

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
    use il_io::parse;

    #[test]
    fn body_does_not_dominate_done_in_s1() {
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
        let dom = Dominators::compute(f, &cfg);

        let entry = f.block_by_label("entry").unwrap();
        let loop_bb = f.block_by_label("loop").unwrap();
        let body = f.block_by_label("body").unwrap();
        let done = f.block_by_label("done").unwrap();

        assert!(dom.dominates(entry, loop_bb));
        assert!(dom.dominates(loop_bb, done));
        assert!(!dom.dominates(body, done));
    }
}
