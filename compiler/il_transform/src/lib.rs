//! Transform passes (spec §4.4): constant folding, peephole simplification,
//! dead store elimination, SimplifyCFG, and the pass manager that sequences
//! them to a fixed point.

pub mod const_fold;
pub mod dse;
pub mod pass_manager;
pub mod peephole;
pub mod simplify_cfg;

pub use pass_manager::{PassManager, PipelineConfig, RunStats};
