//! The pluggable debug controller (spec §4.6 "Debugging"): label and
//! source-line breakpoints plus a step budget, grounded on
//! `examples/original_source/src/vm/debug/VMDebug.cpp`'s `handleDebugBreak`
//! and `processDebugControl`, and on the sentinels in
//! `examples/original_source/src/vm/VMConstants.hpp`.

use std::collections::HashSet;

use il_core::SourceLoc;

/// Why the VM handed control back to the embedder instead of completing
/// the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    /// A breakpoint on a block label was hit.
    Breakpoint,
    /// The configured step budget was exhausted with more work left to do.
    StepBudget,
    /// The embedder's interrupt hook asked execution to yield (spec §4.6
    /// "interpreter safety limits": a cooperative cancellation point
    /// checked every `interrupt_check_interval` steps).
    Interrupted,
}

/// One debug action the embedder asked for after a pause, grounded on
/// `VMDebug.cpp`'s `DebugScript::nextAction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugAction {
    /// Run until the next breakpoint or budget exhaustion.
    Continue,
    /// Execute exactly one more instruction, then pause again.
    StepInstruction,
    /// Re-arm the step budget for `n` more instructions before pausing.
    StepN(u64),
}

/// Breakpoints and step-budget state the VM's run loop consults before
/// every instruction.
pub struct DebugController {
    label_breakpoints: HashSet<String>,
    /// `(file, line)` source breakpoints.
    source_breakpoints: HashSet<(u32, u32)>,
    /// Instructions left to execute before the next automatic pause;
    /// `None` means unlimited (spec §4.6 "a budget of instructions,
    /// decremented once per step").
    budget_remaining: Option<u64>,
}

impl DebugController {
    pub fn new() -> DebugController {
        DebugController {
            label_breakpoints: HashSet::new(),
            source_breakpoints: HashSet::new(),
            budget_remaining: None,
        }
    }

    pub fn break_on_label(&mut self, label: impl Into<String>) {
        self.label_breakpoints.insert(label.into());
    }

    pub fn break_at_source(&mut self, file: u32, line: u32) {
        self.source_breakpoints.insert((file, line));
    }

    pub fn set_step_budget(&mut self, n: u64) {
        self.budget_remaining = Some(n);
    }

    /// Called once per instruction, before it executes. Returns the pause
    /// reason if the VM should stop here. `is_block_entry` restricts label
    /// breakpoints to the block's first instruction — otherwise every
    /// instruction inside a breakpointed block would re-trigger the same
    /// pause and the run could never advance past it.
    pub fn check(&mut self, block_label: &str, is_block_entry: bool, loc: Option<SourceLoc>) -> Option<PauseReason> {
        if is_block_entry && self.label_breakpoints.contains(block_label) {
            return Some(PauseReason::Breakpoint);
        }
        if let Some(loc) = loc {
            if self.source_breakpoints.contains(&(loc.file, loc.line)) {
                return Some(PauseReason::Breakpoint);
            }
        }
        if let Some(remaining) = self.budget_remaining {
            if remaining == 0 {
                return Some(PauseReason::StepBudget);
            }
            self.budget_remaining = Some(remaining - 1);
        }
        None
    }

    /// Applies the embedder's chosen action after a pause (spec §4.6
    /// "resumable after a pause"), re-arming the budget as requested.
    pub fn apply(&mut self, action: DebugAction) {
        match action {
            DebugAction::Continue => self.budget_remaining = None,
            DebugAction::StepInstruction => self.budget_remaining = Some(0),
            DebugAction::StepN(n) => self.budget_remaining = Some(n),
        }
    }
}

impl Default for DebugController {
    fn default() -> Self {
        DebugController::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_breakpoint_fires_only_on_block_entry() {
        let mut dbg = DebugController::new();
        dbg.break_on_label("loop");
        assert_eq!(dbg.check("loop", true, None), Some(PauseReason::Breakpoint));
        assert_eq!(dbg.check("loop", false, None), None);
        assert_eq!(dbg.check("entry", true, None), None);
    }

    #[test]
    fn step_budget_counts_down_then_pauses() {
        let mut dbg = DebugController::new();
        dbg.set_step_budget(2);
        assert_eq!(dbg.check("b", true, None), None);
        assert_eq!(dbg.check("b", true, None), None);
        assert_eq!(dbg.check("b", true, None), Some(PauseReason::StepBudget));
    }
}
