//! The analysis framework (spec §4.3): a CFG, a dominator tree, a loop
//! forest, and a basic alias/ModRef classifier, each available standalone
//! or memoized per-function through [`AnalysisManager`].

pub mod alias;
pub mod cfg;
pub mod dominators;
pub mod loops;
pub mod manager;

pub use alias::{AliasResult, BasicAA, ModRefInfo};
pub use cfg::Cfg;
pub use dominators::Dominators;
pub use loops::{Loop, LoopInfo};
pub use manager::{AnalysisManager, PreservedAnalyses};
