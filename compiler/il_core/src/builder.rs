//! A small imperative builder for constructing functions block by block.
//!
//! Grounded on the pattern other frontends (lowerers, tests, the VM's own
//! scenario tests) need: push a block, append instructions to "the current
//! block", move on. `il_core` itself never needs more than this; a real
//! BASIC lowerer would build its own higher-level builder on top.

use crate::block::{BasicBlockData, BlockParam};
use crate::function::Function;
use crate::ids::{BlockId, ValueId};
use crate::instr::{Instruction, Opcode};
use crate::ty::Ty;
use crate::value::Value;

pub struct FunctionBuilder<'f> {
    func: &'f mut Function,
    current: Option<BlockId>,
}

impl<'f> FunctionBuilder<'f> {
    pub fn new(func: &'f mut Function) -> Self {
        FunctionBuilder {
            func,
            current: None,
        }
    }

    /// Append a new block and make it current. Returns its id.
    pub fn block(&mut self, label: impl Into<String>) -> BlockId {
        let id = self.func.blocks.push(BasicBlockData::new(label));
        self.current = Some(id);
        id
    }

    /// Add a parameter to the current block, returning its fresh SSA id.
    pub fn block_param(&mut self, name: impl Into<String>, ty: Ty) -> ValueId {
        let id = self.func.fresh_value_id();
        let cur = self.current.expect("block_param called with no current block");
        self.func.blocks[cur].params.push(BlockParam {
            name: name.into(),
            ty,
            id,
        });
        id
    }

    pub fn mark_handler(&mut self) {
        let cur = self.current.expect("mark_handler called with no current block");
        self.func.blocks[cur].is_handler = true;
    }

    /// Append an instruction that defines a new SSA value, returning that
    /// value as an operand-ready [`Value::Temp`].
    pub fn push_value(&mut self, mut instr: Instruction) -> Value {
        let id = self.func.fresh_value_id();
        instr.result = Some(id);
        self.push(instr);
        Value::Temp(id)
    }

    /// Append an instruction (typically a terminator, or `store`, which
    /// defines no result).
    pub fn push(&mut self, instr: Instruction) {
        let cur = self.current.expect("push called with no current block");
        self.func.blocks[cur].instructions.push(instr);
    }

    pub fn current_block(&self) -> BlockId {
        self.current.expect("no current block")
    }

    /// Switch the insertion point to a previously created block.
    pub fn switch_to(&mut self, block: BlockId) {
        self.current = Some(block);
    }

    // Convenience terminators -------------------------------------------------

    pub fn br(&mut self, target: BlockId, args: Vec<Value>) {
        let mut instr = Instruction::new(Opcode::Br, Ty::Void);
        instr.successors.push(target);
        instr.branch_args.push(args);
        self.push(instr);
    }

    pub fn cbr(
        &mut self,
        cond: Value,
        then_bb: BlockId,
        then_args: Vec<Value>,
        else_bb: BlockId,
        else_args: Vec<Value>,
    ) {
        let mut instr = Instruction::new(Opcode::CBr, Ty::Void).with_operands(vec![cond]);
        instr.successors = vec![then_bb, else_bb];
        instr.branch_args = vec![then_args, else_args];
        self.push(instr);
    }

    pub fn ret(&mut self, value: Option<Value>) {
        let operands = value.into_iter().collect();
        self.push(Instruction::new(Opcode::Ret, Ty::Void).with_operands(operands));
    }
}
