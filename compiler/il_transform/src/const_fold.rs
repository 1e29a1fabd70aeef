//! Constant folding (spec §4.4, module pass): folds integer/float arithmetic
//! and a small set of runtime math intrinsics whose operands are all
//! literal, preserving the VM's trap semantics (an overflow that would trap
//! at runtime is never silently folded away).

use std::collections::HashMap;

use il_core::{Function, Instruction, IntPredicate, Module, Opcode, Value, ValueId};
use il_utils::idx::Idx;

/// Runs constant folding over every function in `module`. Returns whether
/// anything changed.
#[tracing::instrument(skip_all, fields(functions = module.functions.len()))]
pub fn run(module: &mut Module) -> bool {
    let mut changed = false;
    for f in module.functions.iter_mut() {
        changed |= run_function(f);
    }
    changed
}

fn run_function(f: &mut Function) -> bool {
    let mut subst: HashMap<ValueId, Value> = HashMap::new();
    let mut folded: Vec<(usize, usize)> = Vec::new();

    for (block_idx, block) in f.blocks.iter().enumerate() {
        for (instr_idx, instr) in block.instructions.iter().enumerate() {
            if instr.is_terminator() {
                continue;
            }
            if let Some(value) = try_fold(instr, &subst) {
                if let Some(result) = instr.result {
                    subst.insert(result, value);
                    folded.push((block_idx, instr_idx));
                }
            }
        }
    }

    if folded.is_empty() {
        return false;
    }

    for block in f.blocks.iter_mut() {
        for instr in block.instructions.iter_mut() {
            for (id, value) in &subst {
                instr.replace_value(*id, value);
            }
        }
    }

    let mut by_block: HashMap<usize, Vec<usize>> = HashMap::new();
    for (b, i) in folded {
        by_block.entry(b).or_default().push(i);
    }
    for (block_idx, mut idxs) in by_block {
        idxs.sort_unstable_by(|a, b| b.cmp(a));
        let block = &mut f.blocks[il_core::BlockId::new(block_idx)];
        for i in idxs {
            block.instructions.remove(i);
        }
    }

    true
}

fn resolve(v: &Value, subst: &HashMap<ValueId, Value>) -> Value {
    match v {
        Value::Temp(id) => subst.get(id).cloned().unwrap_or_else(|| v.clone()),
        other => other.clone(),
    }
}

fn try_fold(instr: &Instruction, subst: &HashMap<ValueId, Value>) -> Option<Value> {
    match instr.opcode {
        Opcode::IAddOvf | Opcode::ISubOvf | Opcode::IMulOvf => {
            let (a, b) = int_operands(instr, subst)?;
            match instr.opcode {
                Opcode::IAddOvf => a.checked_add(b).map(Value::ConstInt),
                Opcode::ISubOvf => a.checked_sub(b).map(Value::ConstInt),
                Opcode::IMulOvf => a.checked_mul(b).map(Value::ConstInt),
                _ => unreachable!(),
            }
        }
        Opcode::IAdd => int_operands(instr, subst).map(|(a, b)| Value::ConstInt(a.wrapping_add(b))),
        Opcode::ISub => int_operands(instr, subst).map(|(a, b)| Value::ConstInt(a.wrapping_sub(b))),
        Opcode::IMul => int_operands(instr, subst).map(|(a, b)| Value::ConstInt(a.wrapping_mul(b))),
        Opcode::SDivChk0 => {
            let (a, b) = int_operands(instr, subst)?;
            if b == 0 || (a == i64::MIN && b == -1) {
                None
            } else {
                Some(Value::ConstInt(a / b))
            }
        }
        Opcode::SRemChk0 => {
            let (a, b) = int_operands(instr, subst)?;
            if b == 0 || (a == i64::MIN && b == -1) {
                None
            } else {
                Some(Value::ConstInt(a % b))
            }
        }
        Opcode::UDivChk0 => {
            let (a, b) = int_operands(instr, subst)?;
            if b == 0 {
                None
            } else {
                Some(Value::ConstInt(((a as u64) / (b as u64)) as i64))
            }
        }
        Opcode::URemChk0 => {
            let (a, b) = int_operands(instr, subst)?;
            if b == 0 {
                None
            } else {
                Some(Value::ConstInt(((a as u64) % (b as u64)) as i64))
            }
        }
        Opcode::And => int_operands(instr, subst).map(|(a, b)| Value::ConstInt(a & b)),
        Opcode::Or => int_operands(instr, subst).map(|(a, b)| Value::ConstInt(a | b)),
        Opcode::Xor => int_operands(instr, subst).map(|(a, b)| Value::ConstInt(a ^ b)),
        Opcode::Shl => int_operands(instr, subst).map(|(a, b)| Value::ConstInt(a.wrapping_shl(b as u32 & 63))),
        Opcode::LShr => {
            int_operands(instr, subst).map(|(a, b)| Value::ConstInt(((a as u64).wrapping_shr(b as u32 & 63)) as i64))
        }
        Opcode::AShr => int_operands(instr, subst).map(|(a, b)| Value::ConstInt(a.wrapping_shr(b as u32 & 63))),
        Opcode::FAdd => float_operands(instr, subst).map(|(a, b)| Value::ConstFloat(a + b)),
        Opcode::FSub => float_operands(instr, subst).map(|(a, b)| Value::ConstFloat(a - b)),
        Opcode::FMul => float_operands(instr, subst).map(|(a, b)| Value::ConstFloat(a * b)),
        Opcode::FDiv => float_operands(instr, subst).map(|(a, b)| {
            let r = a / b;
            Value::ConstFloat(r)
        }).filter(|v| matches!(v, Value::ConstFloat(f) if f.is_finite())),
        Opcode::ICmp(pred) => {
            let (a, b) = int_operands(instr, subst)?;
            Some(Value::ConstInt(pred.eval(a, b) as i64))
        }
        Opcode::FCmp(pred) => {
            let (a, b) = float_operands(instr, subst)?;
            Some(Value::ConstInt(pred.eval(a, b) as i64))
        }
        Opcode::Zext1 => {
            let v = resolve(instr.operands.first()?, subst);
            v.as_const_int().map(Value::ConstInt)
        }
        Opcode::Call => fold_intrinsic(instr, subst),
        _ => None,
    }
}

fn int_operands(instr: &Instruction, subst: &HashMap<ValueId, Value>) -> Option<(i64, i64)> {
    let a = resolve(instr.operands.first()?, subst).as_const_int()?;
    let b = resolve(instr.operands.get(1)?, subst).as_const_int()?;
    Some((a, b))
}

fn float_operands(instr: &Instruction, subst: &HashMap<ValueId, Value>) -> Option<(f64, f64)> {
    let a = resolve(instr.operands.first()?, subst).as_const_float()?;
    let b = resolve(instr.operands.get(1)?, subst).as_const_float()?;
    Some((a, b))
}

/// Recognised runtime math intrinsics (spec §4.4): modelled as calls to a
/// fixed set of names, folded only when operands are literal and the
/// domain precondition holds.
fn fold_intrinsic(instr: &Instruction, subst: &HashMap<ValueId, Value>) -> Option<Value> {
    let callee = instr.callee.as_deref()?;
    match callee {
        "abs_i64" => {
            let a = resolve(instr.operands.first()?, subst).as_const_int()?;
            if a == i64::MIN {
                None
            } else {
                Some(Value::ConstInt(a.abs()))
            }
        }
        "abs_f64" => {
            let a = resolve(instr.operands.first()?, subst).as_const_float()?;
            finite(a.abs())
        }
        "floor" => finite(resolve(instr.operands.first()?, subst).as_const_float()?.floor()),
        "ceil" => finite(resolve(instr.operands.first()?, subst).as_const_float()?.ceil()),
        "trunc" => finite(resolve(instr.operands.first()?, subst).as_const_float()?.trunc()),
        "sqrt" => {
            let a = resolve(instr.operands.first()?, subst).as_const_float()?;
            if a < 0.0 {
                None
            } else {
                finite(a.sqrt())
            }
        }
        "pow" => {
            let (a, b) = float_operands(instr, subst)?;
            if b.fract() != 0.0 || b.abs() > 16.0 {
                None
            } else {
                finite(a.powf(b))
            }
        }
        "round_even" => finite(resolve(instr.operands.first()?, subst).as_const_float()?.round_ties_even()),
        "sin" => {
            let a = resolve(instr.operands.first()?, subst).as_const_float()?;
            (a == 0.0).then_some(Value::ConstFloat(0.0))
        }
        "cos" => {
            let a = resolve(instr.operands.first()?, subst).as_const_float()?;
            (a == 0.0).then_some(Value::ConstFloat(1.0))
        }
        _ => None,
    }
}

fn finite(v: f64) -> Option<Value> {
    v.is_finite().then_some(Value::ConstFloat(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use il_core::{Linkage, Ty};
    use il_io::parse;

    #[test]
    fn folds_addition_and_removes_compare() {
        let src = r#"
            func @main() -> i64 {
                entry:
                    %a = iadd.ovf 1, 2;
                    ret %a;
            }
        "#;
        let mut module = parse(src).unwrap();
        assert!(run(&mut module));
        let f = module.function("main").unwrap();
        let entry = f.entry_block().unwrap();
        assert_eq!(f.blocks[entry].instructions.len(), 1);
        assert_eq!(f.blocks[entry].instructions[0].operands[0], Value::ConstInt(3));
    }

    #[test]
    fn does_not_fold_overflowing_add() {
        let src = r#"
            func @main() -> i64 {
                entry:
                    %a = iadd.ovf 9223372036854775807, 1;
                    ret %a;
            }
        "#;
        let mut module = parse(src).unwrap();
        assert!(!run(&mut module));
        let f = module.function("main").unwrap();
        let entry = f.entry_block().unwrap();
        assert_eq!(f.blocks[entry].instructions[0].opcode, Opcode::IAddOvf);
    }

    #[test]
    fn does_not_fold_division_by_zero() {
        let src = r#"
            func @main() -> i64 {
                entry:
                    %a = sdiv.chk0 7, 0;
                    ret %a;
            }
        "#;
        let mut module = parse(src).unwrap();
        assert!(!run(&mut module));
    }

    #[test]
    fn folds_abs_i64_but_not_int_min() {
        let mut f = il_core::Function::new("f", Linkage::Internal, Ty::I64, vec![]);
        let mut b = il_core::builder::FunctionBuilder::new(&mut f);
        b.block("entry");
        let call = b.push_value(
            il_core::Instruction::new(Opcode::Call, Ty::I64)
                .with_callee("abs_i64")
                .with_operands(vec![Value::ConstInt(i64::MIN)]),
        );
        b.ret(Some(call));
        let mut module = il_core::Module::new();
        module.functions.push(f);
        assert!(!run(&mut module));
    }
}
