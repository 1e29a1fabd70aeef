//! A single in-flight call (spec §4.6): "a pointer to its function, a
//! register file indexed by SSA id, a staged parameters area for pending
//! block-argument transfers, a current block pointer, and an instruction
//! pointer within the block."

use il_core::{BlockId, Function};

use crate::eh::HandlerStack;
use crate::slot::Slot;

/// One call-in-progress. Registers are indexed directly by `ValueId::0`;
/// the vector is sized to the function's value-id count so every access is
/// a plain index, never a hash lookup.
pub struct Frame<'m> {
    pub func: &'m Function,
    pub regs: Vec<Slot>,
    pub block: BlockId,
    pub ip: usize,
    /// Set by a taken branch; transferred into `regs` as the first action
    /// on entering `block` (spec §4.6 "Block-parameter semantics"), then
    /// cleared.
    pub pending_args: Option<Vec<Slot>>,
    pub handlers: HandlerStack,
    /// The SSA id in the *caller's* frame that this call's result should
    /// land in, if any; `None` for the outermost frame the VM was asked to
    /// run.
    pub call_result_id: Option<il_core::ValueId>,
}

impl<'m> Frame<'m> {
    pub fn new(func: &'m Function, entry: BlockId, call_result_id: Option<il_core::ValueId>) -> Frame<'m> {
        let reg_count = func
            .blocks
            .iter()
            .flat_map(|b| b.instructions.iter().filter_map(|i| i.result))
            .chain(func.blocks.iter().flat_map(|b| b.params.iter().map(|p| p.id)))
            .chain(func.params.iter().map(|p| p.id))
            .map(|id| id.0 + 1)
            .max()
            .unwrap_or(0);
        Frame {
            func,
            regs: vec![Slot::NULL; reg_count],
            block: entry,
            ip: 0,
            pending_args: None,
            handlers: HandlerStack::default(),
            call_result_id,
        }
    }

    /// Recycles `self` for a fresh call, reusing the register-file
    /// allocation (spec §5 "recycled frames reuse allocations to amortise
    /// cost").
    pub fn reset_for(&mut self, func: &'m Function, entry: BlockId, call_result_id: Option<il_core::ValueId>) {
        self.func = func;
        let reg_count = self.regs.len().max(1);
        self.regs.clear();
        self.regs.resize(reg_count, Slot::NULL);
        self.block = entry;
        self.ip = 0;
        self.pending_args = None;
        self.handlers = HandlerStack::default();
        self.call_result_id = call_result_id;
    }

    pub fn ensure_reg(&mut self, idx: usize) {
        if self.regs.len() <= idx {
            self.regs.resize(idx + 1, Slot::NULL);
        }
    }

    /// Applies any staged block-argument transfer for the block the frame
    /// is currently positioned at, clearing the staging slot afterwards
    /// (spec §4.6: "staged values are transferred into the register file
    /// as the first action, and the staging slots are cleared").
    pub fn transfer_pending_args(&mut self) {
        let Some(args) = self.pending_args.take() else { return };
        let params = &self.func.blocks[self.block].params;
        for (p, v) in params.iter().zip(args) {
            self.ensure_reg(p.id.0);
            self.regs[p.id.0] = v;
        }
    }
}
