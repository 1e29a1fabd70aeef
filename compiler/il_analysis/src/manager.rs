//! The analysis manager (spec §4.3): memoizes each analysis per function so
//! a fixed-point `PassManager` loop does not recompute the CFG, dominator
//! tree, loop forest, or alias summary on every iteration.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use il_core::Function;

use crate::alias::BasicAA;
use crate::cfg::Cfg;
use crate::dominators::Dominators;
use crate::loops::LoopInfo;

#[derive(Default, Clone)]
struct FunctionAnalyses {
    cfg: Option<Rc<Cfg>>,
    dominators: Option<Rc<Dominators>>,
    loops: Option<Rc<LoopInfo>>,
    alias: Option<Rc<BasicAA>>,
}

/// Which analyses a transform pass left intact. Anything derived from block
/// structure (CFG, Dominators, LoopInfo) is invalidated as a group; a pass
/// that only rewrites operands within existing blocks can preserve all of
/// it.
#[derive(Debug, Clone, Copy)]
pub struct PreservedAnalyses {
    pub cfg: bool,
    pub alias: bool,
}

impl PreservedAnalyses {
    pub const ALL: PreservedAnalyses = PreservedAnalyses { cfg: true, alias: true };
    pub const NONE: PreservedAnalyses = PreservedAnalyses { cfg: false, alias: false };
}

/// Per-module cache of per-function analyses, keyed by function name.
#[derive(Default)]
pub struct AnalysisManager {
    cache: RefCell<HashMap<String, FunctionAnalyses>>,
}

impl AnalysisManager {
    pub fn new() -> Self {
        AnalysisManager { cache: RefCell::new(HashMap::new()) }
    }

    pub fn cfg(&self, f: &Function) -> Rc<Cfg> {
        let mut cache = self.cache.borrow_mut();
        let entry = cache.entry(f.name.clone()).or_default();
        if entry.cfg.is_none() {
            entry.cfg = Some(Rc::new(Cfg::compute(f)));
        }
        entry.cfg.clone().unwrap()
    }

    pub fn dominators(&self, f: &Function) -> Rc<Dominators> {
        let cfg = self.cfg(f);
        let mut cache = self.cache.borrow_mut();
        let entry = cache.entry(f.name.clone()).or_default();
        if entry.dominators.is_none() {
            entry.dominators = Some(Rc::new(Dominators::compute(f, &cfg)));
        }
        entry.dominators.clone().unwrap()
    }

    pub fn loops(&self, f: &Function) -> Rc<LoopInfo> {
        let cfg = self.cfg(f);
        let dom = self.dominators(f);
        let mut cache = self.cache.borrow_mut();
        let entry = cache.entry(f.name.clone()).or_default();
        if entry.loops.is_none() {
            entry.loops = Some(Rc::new(LoopInfo::compute(f, &cfg, &dom)));
        }
        entry.loops.clone().unwrap()
    }

    pub fn alias(&self, f: &Function) -> Rc<BasicAA> {
        let mut cache = self.cache.borrow_mut();
        let entry = cache.entry(f.name.clone()).or_default();
        if entry.alias.is_none() {
            entry.alias = Some(Rc::new(BasicAA::compute(f)));
        }
        entry.alias.clone().unwrap()
    }

    /// Drop cached analyses for `f` per what a pass reports it preserved.
    pub fn invalidate(&self, f: &Function, preserved: PreservedAnalyses) {
        let mut cache = self.cache.borrow_mut();
        if let Some(entry) = cache.get_mut(&f.name) {
            if !preserved.cfg {
                entry.cfg = None;
                entry.dominators = None;
                entry.loops = None;
            }
            if !preserved.alias {
                entry.alias = None;
            }
        }
    }

    /// Drop every cached analysis for every function, e.g. after linking
    /// replaces the module wholesale.
    pub fn invalidate_all(&self) {
        self.cache.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use il_io::parse;

    #[test]
    fn caches_cfg_across_repeated_queries() {
        let src = r#"
            func @main() -> i64 {
                entry:
                    ret 0;
            }
        "#;
        let module = parse(src).unwrap();
        let f = module.function("main").unwrap();
        let mgr = AnalysisManager::new();

        let a = mgr.cfg(f);
        let b = mgr.cfg(f);
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn invalidate_drops_cfg_but_keeps_alias() {
        let src = r#"
            func @main() -> i64 {
                entry:
                    ret 0;
            }
        "#;
        let module = parse(src).unwrap();
        let f = module.function("main").unwrap();
        let mgr = AnalysisManager::new();

        let cfg_before = mgr.cfg(f);
        let alias_before = mgr.alias(f);
        mgr.invalidate(f, PreservedAnalyses { cfg: false, alias: true });
        let cfg_after = mgr.cfg(f);
        let alias_after = mgr.alias(f);

        assert!(!Rc::ptr_eq(&cfg_before, &cfg_after));
        assert!(Rc::ptr_eq(&alias_before, &alias_after));
    }
}
