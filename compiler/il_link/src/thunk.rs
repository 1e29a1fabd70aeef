//! Boolean-representation interop thunks (spec §4.5 step 11, §4.7): a
//! separately unit-testable generator so the linker can call it as a plain
//! function rather than inlining the logic into the merge step.

use il_core::builder::FunctionBuilder;
use il_core::{Function, Instruction, IntPredicate, Linkage, Opcode, Param, ParamAttrs, Ty, Value, ValueId};

/// Whether two type kinds disagree only in boolean representation (`i1` vs
/// `i64`) — the only mismatch a thunk may paper over (spec §4.5 step 11).
fn is_bool_repr_pair(a: Ty, b: Ty) -> bool {
    matches!((a, b), (Ty::I1, Ty::I64) | (Ty::I64, Ty::I1))
}

/// The outcome of comparing an import's declared signature against the
/// signature of what it actually resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureCompat {
    /// Identical signatures; no thunk needed.
    Identical,
    /// Differs only in `i1`/`i64` representation at one or more positions;
    /// a bool thunk bridges the gap.
    BoolMismatch,
    /// Differs in some other way; not resolvable by a thunk.
    Incompatible,
}

/// Compares an import's declared `(return, params)` against the resolved
/// target's actual `(return, params)`.
pub fn compare_signatures(
    import_ret: Ty,
    import_params: &[Ty],
    target_ret: Ty,
    target_params: &[Ty],
) -> SignatureCompat {
    if import_params.len() != target_params.len() {
        return SignatureCompat::Incompatible;
    }
    let mut any_bool_mismatch = false;
    for (&a, &b) in import_params.iter().zip(target_params) {
        if a != b {
            if is_bool_repr_pair(a, b) {
                any_bool_mismatch = true;
            } else {
                return SignatureCompat::Incompatible;
            }
        }
    }
    if import_ret != target_ret {
        if is_bool_repr_pair(import_ret, target_ret) {
            any_bool_mismatch = true;
        } else {
            return SignatureCompat::Incompatible;
        }
    }
    if any_bool_mismatch {
        SignatureCompat::BoolMismatch
    } else {
        SignatureCompat::Identical
    }
}

/// Builds the thunk function for `target_name` (spec §4.5 step 11): carries
/// the import's declared signature, converts each parameter to the target's
/// representation (`icmp_ne 0` for `i64`→`i1`, `zext1` for `i1`→`i64`),
/// calls `target_name`, converts the return value by the same rule, and
/// returns. Named `<target_name>$bool_thunk`, internal linkage.
pub fn build_bool_thunk(
    target_name: &str,
    import_ret: Ty,
    import_params: &[Ty],
    target_ret: Ty,
    target_params: &[Ty],
) -> Function {
    let params: Vec<Param> = import_params
        .iter()
        .enumerate()
        .map(|(i, &ty)| Param {
            name: format!("a{i}"),
            ty,
            id: ValueId(i),
            attrs: ParamAttrs::default(),
        })
        .collect();

    let mut f = Function::new(format!("{target_name}$bool_thunk"), Linkage::Internal, import_ret, params);
    let mut b = FunctionBuilder::new(&mut f);
    b.block("entry");

    let mut call_args = Vec::with_capacity(import_params.len());
    for (i, (&import_ty, &target_ty)) in import_params.iter().zip(target_params).enumerate() {
        let raw = Value::Temp(ValueId(i));
        let converted = convert(&mut b, raw, import_ty, target_ty);
        call_args.push(converted);
    }

    let call = Instruction::new(Opcode::Call, target_ret)
        .with_callee(target_name.to_string())
        .with_operands(call_args);

    if target_ret == Ty::Void {
        b.push(call);
        b.ret(None);
    } else {
        let raw_result = b.push_value(call);
        let ret_val = convert(&mut b, raw_result, target_ret, import_ret);
        b.ret(Some(ret_val));
    }

    f
}

/// Converts `value` from `from_ty`'s representation to `to_ty`'s, per the
/// fixed discipline: `i1`→`i64` is `zext1`, `i64`→`i1` is `icmp_ne 0`. A
/// no-op when the types already agree.
fn convert(b: &mut FunctionBuilder<'_>, value: Value, from_ty: Ty, to_ty: Ty) -> Value {
    if from_ty == to_ty {
        return value;
    }
    match (from_ty, to_ty) {
        (Ty::I64, Ty::I1) => {
            b.push_value(Instruction::new(Opcode::ICmp(IntPredicate::Ne), Ty::I1).with_operands(vec![value, Value::ConstInt(0)]))
        }
        (Ty::I1, Ty::I64) => b.push_value(Instruction::new(Opcode::Zext1, Ty::I64).with_operands(vec![value])),
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_signatures_need_no_thunk() {
        assert_eq!(
            compare_signatures(Ty::I64, &[Ty::I64], Ty::I64, &[Ty::I64]),
            SignatureCompat::Identical
        );
    }

    #[test]
    fn bool_representation_mismatch_is_bridgeable() {
        assert_eq!(
            compare_signatures(Ty::I1, &[Ty::I64], Ty::I64, &[Ty::I1]),
            SignatureCompat::BoolMismatch
        );
    }

    #[test]
    fn non_bool_mismatch_is_incompatible() {
        assert_eq!(
            compare_signatures(Ty::I64, &[], Ty::F64, &[]),
            SignatureCompat::Incompatible
        );
    }

    #[test]
    fn builds_thunk_with_converted_call_and_return() {
        let f = build_bool_thunk("target", Ty::I64, &[Ty::I1], Ty::I1, &[Ty::I64]);
        assert_eq!(f.name, "target$bool_thunk");
        assert_eq!(f.linkage, Linkage::Internal);
        assert_eq!(f.ret_ty, Ty::I64);
        assert_eq!(f.params[0].ty, Ty::I1);

        let entry = f.entry_block().unwrap();
        let instrs = &f.blocks[entry].instructions;
        // param (i1) -> zext1 -> i64 into the call, call returns i1, then
        // icmp_ne 0 converts it back to i64 for the return.
        assert!(instrs.iter().any(|i| i.opcode == Opcode::Zext1));
        assert!(instrs.iter().any(|i| i.opcode == Opcode::Call));
        assert!(instrs.iter().any(|i| matches!(i.opcode, Opcode::ICmp(IntPredicate::Ne))));
        assert_eq!(instrs.last().unwrap().opcode, Opcode::Ret);
    }
}
