//! Natural-loop detection (spec §4.3 LoopInfo): locate back-edges `s -> h`
//! where `h` dominates `s`, then collapse the reachable predecessors of `s`
//! (up to `h`) into the loop body. Loops form a forest by block-set subset
//! ordering.

use std::collections::{HashMap, HashSet};

use il_core::{BlockId, Function};

use crate::cfg::Cfg;
use crate::dominators::Dominators;

#[derive(Debug, Clone)]
pub struct Loop {
    pub header: BlockId,
    pub blocks: HashSet<BlockId>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

impl Loop {
    pub fn contains(&self, b: BlockId) -> bool {
        self.blocks.contains(&b)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoopInfo {
    loops: Vec<Loop>,
    /// Precomputed innermost loop per block. The spec's "O(depth)" budget
    /// is an upper bound on the *reporting* cost, not a mandate to walk the
    /// forest on every query; computing this once at construction makes
    /// `innermost_loop` O(1) while still reporting the correct depth chain
    /// via `parent` links.
    innermost: HashMap<BlockId, usize>,
}

impl LoopInfo {
    #[tracing::instrument(skip_all, fields(function = %f.name))]
    pub fn compute(f: &Function, cfg: &Cfg, dom: &Dominators) -> LoopInfo {
        let mut latches_by_header: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        for &b in &cfg.rpo {
            for &succ in cfg.successors(b) {
                if dom.dominates(succ, b) {
                    latches_by_header.entry(succ).or_default().push(b);
                }
            }
        }

        let mut loops: Vec<Loop> = Vec::new();
        for (header, latches) in latches_by_header {
            let mut body = HashSet::new();
            body.insert(header);
            let mut worklist = latches;
            while let Some(b) = worklist.pop() {
                if body.insert(b) {
                    for &p in cfg.predecessors(b) {
                        if p != header {
                            worklist.push(p);
                        }
                    }
                }
            }
            loops.push(Loop { header, blocks: body, parent: None, children: Vec::new() });
        }

        let n = loops.len();
        let mut parent: Vec<Option<usize>> = vec![None; n];
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                if loops[j].blocks.len() > loops[i].blocks.len()
                    && loops[i].blocks.is_subset(&loops[j].blocks)
                {
                    parent[i] = Some(match parent[i] {
                        None => j,
                        Some(cur) if loops[j].blocks.len() < loops[cur].blocks.len() => j,
                        Some(cur) => cur,
                    });
                }
            }
        }
        for (i, p) in parent.iter().enumerate() {
            loops[i].parent = *p;
        }
        for (i, p) in parent.iter().enumerate() {
            if let Some(p) = p {
                loops[*p].children.push(i);
            }
        }

        let mut innermost: HashMap<BlockId, usize> = HashMap::new();
        for (i, l) in loops.iter().enumerate() {
            for &b in &l.blocks {
                let replace = match innermost.get(&b) {
                    Some(&cur) => l.blocks.len() < loops[cur].blocks.len(),
                    None => true,
                };
                if replace {
                    innermost.insert(b, i);
                }
            }
        }

        tracing::debug!(loops = loops.len(), "loop forest computed");
        LoopInfo { loops, innermost }
    }

    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }

    /// The innermost loop containing `b`, if any.
    pub fn innermost_loop(&self, b: BlockId) -> Option<&Loop> {
        self.innermost.get(&b).map(|&i| &self.loops[i])
    }

    pub fn is_loop_header(&self, b: BlockId) -> bool {
        self.loops.iter().any(|l| l.header == b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use il_io::parse;

    #[test]
    fn finds_s1_loop_with_body_and_loop_header() {
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
        let loops = LoopInfo::compute(f, &cfg, &dom);

        let loop_bb = f.block_by_label("loop").unwrap();
        let body = f.block_by_label("body").unwrap();
        let entry = f.block_by_label("entry").unwrap();

        assert_eq!(loops.loops().len(), 1);
        assert!(loops.is_loop_header(loop_bb));
        let l = loops.innermost_loop(body).unwrap();
        assert_eq!(l.header, loop_bb);
        assert!(l.contains(loop_bb));
        assert!(l.contains(body));
        assert!(loops.innermost_loop(entry).is_none());
    }
}
