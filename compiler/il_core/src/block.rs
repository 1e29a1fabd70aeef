use crate::ids::ValueId;
use crate::instr::Instruction;
use crate::ty::Ty;

/// A formal parameter of a basic block, receiving its value from the
/// branch-argument list of each predecessor edge (spec §3, §9 "Block
/// parameters instead of phi nodes").
#[derive(Debug, Clone)]
pub struct BlockParam {
    pub name: String,
    pub ty: Ty,
    pub id: ValueId,
}

/// A basic block (spec §3 "BasicBlock").
#[derive(Debug, Clone)]
pub struct BasicBlockData {
    pub label: String,
    pub params: Vec<BlockParam>,
    pub instructions: Vec<Instruction>,
    /// Handler blocks are prefixed with `handler` in the text format and
    /// carry the fixed `(error, resume_tok)` parameter prefix (spec §4.1,
    /// §4.2 EH constraints).
    pub is_handler: bool,
}

impl BasicBlockData {
    pub fn new(label: impl Into<String>) -> Self {
        BasicBlockData {
            label: label.into(),
            params: Vec::new(),
            instructions: Vec::new(),
            is_handler: false,
        }
    }

    /// The block's terminator, if one has been appended yet. A block under
    /// construction may be briefly un-terminated; the verifier is the
    /// authority on requiring exactly one by the time a function is handed
    /// to it (spec §4.2).
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|i| i.is_terminator())
    }

    pub fn is_terminated(&self) -> bool {
        self.terminator().is_some()
    }
}
