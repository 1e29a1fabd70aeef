//! The pass manager (spec §4.4): an ordered pass sequence re-run to a
//! configurable fixed point, re-verifying between passes in debug builds.

use il_analysis::AnalysisManager;
use il_core::Module;

use crate::{const_fold, dse, peephole, simplify_cfg};

/// Which bundled passes a [`PassManager`] run includes, in a fixed order
/// matching spec §4.4's listing: constant folding, peephole, dead store
/// elimination, then SimplifyCFG.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub const_fold: bool,
    pub peephole: bool,
    pub dse: bool,
    pub simplify_cfg: bool,
    /// Re-run the whole pipeline while any pass in the previous round
    /// changed the module, up to this many rounds.
    pub max_iterations: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            const_fold: true,
            peephole: true,
            dse: true,
            simplify_cfg: true,
            max_iterations: 16,
        }
    }
}

/// Aggregate counters for one [`PassManager::run`] call, for callers (e.g.
/// `ilc`'s `--stats` output) that want a summary of what fired.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunStats {
    pub iterations: usize,
    pub const_fold_changed: usize,
    pub peephole_changed: usize,
    pub dse_changed: usize,
    pub simplify_cfg: simplify_cfg::Stats,
}

pub struct PassManager {
    config: PipelineConfig,
    analyses: AnalysisManager,
}

impl PassManager {
    pub fn new(config: PipelineConfig) -> Self {
        PassManager { config, analyses: AnalysisManager::new() }
    }

    /// Runs the configured passes over `module` to a fixed point (or until
    /// `max_iterations` rounds have run). In debug builds, re-verifies the
    /// module after every individual pass so a miscompile is caught at the
    /// pass that introduced it rather than surfacing later as a VM trap.
    #[tracing::instrument(skip_all, fields(functions = module.functions.len()))]
    pub fn run(&self, module: &mut Module) -> RunStats {
        let mut stats = RunStats::default();

        for _ in 0..self.config.max_iterations {
            stats.iterations += 1;
            let mut changed = false;

            if self.config.const_fold {
                if const_fold::run(module) {
                    stats.const_fold_changed += 1;
                    changed = true;
                }
                self.reverify(module, "const_fold");
            }

            if self.config.peephole {
                if peephole::run(module) {
                    stats.peephole_changed += 1;
                    changed = true;
                }
                self.reverify(module, "peephole");
            }

            if self.config.dse {
                self.analyses.invalidate_all();
                if dse::run(module, &self.analyses) {
                    stats.dse_changed += 1;
                    changed = true;
                }
                self.reverify(module, "dse");
            }

            if self.config.simplify_cfg {
                self.analyses.invalidate_all();
                let round = simplify_cfg::run(module, &self.analyses);
                if round.changed() {
                    changed = true;
                }
                stats.simplify_cfg.identical_successors_collapsed += round.identical_successors_collapsed;
                stats.simplify_cfg.empty_blocks_spliced += round.empty_blocks_spliced;
                stats.simplify_cfg.blocks_merged += round.blocks_merged;
                stats.simplify_cfg.unreachable_blocks_deleted += round.unreachable_blocks_deleted;
                self.reverify(module, "simplify_cfg");
            }

            self.analyses.invalidate_all();
            if !changed {
                break;
            }
        }

        stats
    }

    #[cfg(debug_assertions)]
    fn reverify(&self, module: &Module, pass_name: &str) {
        if let Err(diag) = il_verify::verify(module) {
            panic!("il_transform pass `{pass_name}` produced an invalid module: {diag}");
        }
    }

    #[cfg(not(debug_assertions))]
    fn reverify(&self, _module: &Module, _pass_name: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use il_io::parse;

    #[test]
    fn runs_to_a_fixed_point_and_reports_changes() {
        let src = r#"
            func @main(x: i1) -> i64 {
                entry:
                    %a = iadd.ovf 1, 2;
                    %b = imul.ovf %a, 1;
                    cbr %x, same(%b), same(%b);
                same(v: i64):
                    ret %v;
            }
        "#;
        let mut module = parse(src).unwrap();
        let mgr = PassManager::new(PipelineConfig::default());
        let stats = mgr.run(&mut module);

        assert!(stats.const_fold_changed >= 1);
        assert!(stats.peephole_changed >= 1);
        assert_eq!(stats.simplify_cfg.identical_successors_collapsed, 1);

        let f = module.function("main").unwrap();
        let entry = f.entry_block().unwrap();
        assert_eq!(f.blocks[entry].instructions.last().unwrap().opcode, il_core::Opcode::Br);
    }

    #[test]
    fn stable_module_converges_in_one_round() {
        let src = r#"
            func @main() -> i64 {
                entry:
                    ret 0;
            }
        "#;
        let mut module = parse(src).unwrap();
        let mgr = PassManager::new(PipelineConfig::default());
        let stats = mgr.run(&mut module);
        assert_eq!(stats.iterations, 1);
    }
}
