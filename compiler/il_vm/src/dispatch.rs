//! Instruction execution (spec §4.6 "Dispatch"): the opcode handlers shared
//! by all three dispatch strategies, plus the table/switch/threaded
//! selection itself.
//!
//! Every handler has the same signature and is the single source of truth
//! for an opcode's behaviour; `table`, `switch`, and `threaded` modes only
//! differ in *how* they pick a handler for the current instruction, never
//! in what the handler does, which is what spec §8's "dispatch-mode
//! independence" law requires.

use il_core::{BlockId, Diagnostic, Instruction, Opcode, TrapKind, Value};

use crate::exec_cache::ResolvedOp;
use crate::slot::Slot;
use crate::vm::Vm;

/// What should happen to the current frame after one instruction executes.
pub enum Flow<'m> {
    Continue,
    Branch { target: BlockId, args: Vec<Slot> },
    /// Jump to an exact `(block, instruction index)` with no block-argument
    /// transfer, for `resume.same`/`resume.next` (spec §4.6): unlike
    /// `Branch`, the target need not be a block's first instruction, so
    /// there are no staged arguments to move into registers.
    Goto { block: BlockId, ip: usize },
    Return(Option<Slot>),
    /// Call a module-defined function: push a new frame and suspend the
    /// current one until it returns (spec §4.6 "execution-stack vector").
    Call { callee: &'m il_core::Function, args: Vec<Slot>, result_id: Option<il_core::ValueId> },
    Trapped(Diagnostic),
    Pause(crate::debug::PauseReason),
}

pub type OpHandler = for<'m> fn(&mut Vm<'m>, &Instruction) -> Flow<'m>;

/// A stable, contiguous slot per opcode *family* (comparison and trap-kind
/// payloads don't get their own slot; the handler reads the payload off
/// the instruction itself). Used to index the table/threaded dispatch
/// arrays.
pub fn opcode_slot(op: Opcode) -> usize {
    match op {
        Opcode::IAddOvf => 0,
        Opcode::ISubOvf => 1,
        Opcode::IMulOvf => 2,
        Opcode::IAdd => 3,
        Opcode::ISub => 4,
        Opcode::IMul => 5,
        Opcode::SDivChk0 => 6,
        Opcode::SRemChk0 => 7,
        Opcode::UDivChk0 => 8,
        Opcode::URemChk0 => 9,
        Opcode::And => 10,
        Opcode::Or => 11,
        Opcode::Xor => 12,
        Opcode::Shl => 13,
        Opcode::LShr => 14,
        Opcode::AShr => 15,
        Opcode::FAdd => 16,
        Opcode::FSub => 17,
        Opcode::FMul => 18,
        Opcode::FDiv => 19,
        Opcode::ICmp(_) => 20,
        Opcode::FCmp(_) => 21,
        Opcode::Zext1 => 22,
        Opcode::Alloca => 23,
        Opcode::Load => 24,
        Opcode::Store => 25,
        Opcode::ConstStr => 26,
        Opcode::Call => 27,
        Opcode::Br => 28,
        Opcode::CBr => 29,
        Opcode::SwitchI32 => 30,
        Opcode::Ret => 31,
        Opcode::Trap => 32,
        Opcode::TrapKind(_) => 33,
        Opcode::TrapFromErr => 34,
        Opcode::ResumeSame => 35,
        Opcode::ResumeNext => 36,
        Opcode::ResumeLabel => 37,
        Opcode::EhPush => 38,
        Opcode::EhPop => 39,
        Opcode::EhEntry => 40,
    }
}

pub const NUM_OPCODE_SLOTS: usize = 41;

/// The table-dispatch array: one function pointer per slot, in
/// `opcode_slot` order.
pub fn build_table() -> [OpHandler; NUM_OPCODE_SLOTS] {
    [
        op_int_binop,
        op_int_binop,
        op_int_binop,
        op_int_binop,
        op_int_binop,
        op_int_binop,
        op_int_binop,
        op_int_binop,
        op_int_binop,
        op_int_binop,
        op_int_binop,
        op_int_binop,
        op_int_binop,
        op_int_binop,
        op_int_binop,
        op_int_binop,
        op_float_binop,
        op_float_binop,
        op_float_binop,
        op_float_binop,
        op_icmp,
        op_fcmp,
        op_zext1,
        op_alloca,
        op_load,
        op_store,
        op_const_str,
        op_call,
        op_br,
        op_cbr,
        op_switch_i32,
        op_ret,
        op_trap,
        op_trap_kind,
        op_trap_from_err,
        op_resume_same,
        op_resume_next,
        op_resume_label,
        op_eh_push,
        op_eh_pop,
        op_eh_entry,
    ]
}

/// `switch` dispatch mode: a literal `match` over the opcode, each arm
/// calling the same handler the table uses.
pub fn exec_switch<'m>(vm: &mut Vm<'m>, instr: &Instruction) -> Flow<'m> {
    match instr.opcode {
        Opcode::IAddOvf
        | Opcode::ISubOvf
        | Opcode::IMulOvf
        | Opcode::IAdd
        | Opcode::ISub
        | Opcode::IMul
        | Opcode::SDivChk0
        | Opcode::SRemChk0
        | Opcode::UDivChk0
        | Opcode::URemChk0
        | Opcode::And
        | Opcode::Or
        | Opcode::Xor
        | Opcode::Shl
        | Opcode::LShr
        | Opcode::AShr => op_int_binop(vm, instr),
        Opcode::FAdd | Opcode::FSub | Opcode::FMul | Opcode::FDiv => op_float_binop(vm, instr),
        Opcode::ICmp(_) => op_icmp(vm, instr),
        Opcode::FCmp(_) => op_fcmp(vm, instr),
        Opcode::Zext1 => op_zext1(vm, instr),
        Opcode::Alloca => op_alloca(vm, instr),
        Opcode::Load => op_load(vm, instr),
        Opcode::Store => op_store(vm, instr),
        Opcode::ConstStr => op_const_str(vm, instr),
        Opcode::Call => op_call(vm, instr),
        Opcode::Br => op_br(vm, instr),
        Opcode::CBr => op_cbr(vm, instr),
        Opcode::SwitchI32 => op_switch_i32(vm, instr),
        Opcode::Ret => op_ret(vm, instr),
        Opcode::Trap => op_trap(vm, instr),
        Opcode::TrapKind(_) => op_trap_kind(vm, instr),
        Opcode::TrapFromErr => op_trap_from_err(vm, instr),
        Opcode::ResumeSame => op_resume_same(vm, instr),
        Opcode::ResumeNext => op_resume_next(vm, instr),
        Opcode::ResumeLabel => op_resume_label(vm, instr),
        Opcode::EhPush => op_eh_push(vm, instr),
        Opcode::EhPop => op_eh_pop(vm, instr),
        Opcode::EhEntry => op_eh_entry(vm, instr),
    }
}

// ---------------------------------------------------------------------
// Pure arithmetic, reused by both dispatch modes and grounded directly on
// `il_transform::const_fold`'s semantics (spec §8 "constant folding is
// observationally equivalent to VM execution").
// ---------------------------------------------------------------------

fn eval_int_binop(op: Opcode, a: i64, b: i64) -> Result<i64, (TrapKind, &'static str)> {
    use TrapKind::*;
    match op {
        Opcode::IAddOvf => a.checked_add(b).ok_or((IntegerOverflow, "iadd.ovf overflowed")),
        Opcode::ISubOvf => a.checked_sub(b).ok_or((IntegerOverflow, "isub.ovf overflowed")),
        Opcode::IMulOvf => a.checked_mul(b).ok_or((IntegerOverflow, "imul.ovf overflowed")),
        Opcode::IAdd => Ok(a.wrapping_add(b)),
        Opcode::ISub => Ok(a.wrapping_sub(b)),
        Opcode::IMul => Ok(a.wrapping_mul(b)),
        Opcode::SDivChk0 => {
            if b == 0 {
                Err((DivideByZero, "sdiv.chk0 by zero"))
            } else if a == i64::MIN && b == -1 {
                Err((IntegerOverflow, "sdiv.chk0 INT_MIN / -1 overflowed"))
            } else {
                Ok(a / b)
            }
        }
        Opcode::SRemChk0 => {
            if b == 0 {
                Err((DivideByZero, "srem.chk0 by zero"))
            } else if a == i64::MIN && b == -1 {
                Err((IntegerOverflow, "srem.chk0 INT_MIN / -1 overflowed"))
            } else {
                Ok(a % b)
            }
        }
        Opcode::UDivChk0 => {
            if b == 0 {
                Err((DivideByZero, "udiv.chk0 by zero"))
            } else {
                Ok(((a as u64) / (b as u64)) as i64)
            }
        }
        Opcode::URemChk0 => {
            if b == 0 {
                Err((DivideByZero, "urem.chk0 by zero"))
            } else {
                Ok(((a as u64) % (b as u64)) as i64)
            }
        }
        Opcode::And => Ok(a & b),
        Opcode::Or => Ok(a | b),
        Opcode::Xor => Ok(a ^ b),
        Opcode::Shl => Ok(a.wrapping_shl(b as u32 & 63)),
        Opcode::LShr => Ok(((a as u64).wrapping_shr(b as u32 & 63)) as i64),
        Opcode::AShr => Ok(a.wrapping_shr(b as u32 & 63)),
        _ => unreachable!("not an integer binop"),
    }
}

fn eval_float_binop(op: Opcode, a: f64, b: f64) -> f64 {
    match op {
        Opcode::FAdd => a + b,
        Opcode::FSub => a - b,
        Opcode::FMul => a * b,
        Opcode::FDiv => a / b,
        _ => unreachable!("not a float binop"),
    }
}

/// General (uncached) operand resolution: matches the `Value` variant
/// directly. Used for branch-argument lists, which the `BlockExecCache`
/// doesn't cover (only an instruction's own `operands` are classified), and
/// as the `Cold` fallback for the cached path below.
fn resolve_value<'m>(vm: &Vm<'m>, v: &Value) -> Slot {
    match v {
        Value::Temp(id) => vm.top_frame().regs.get(id.0).copied().unwrap_or(Slot::NULL),
        Value::ConstInt(n) => Slot::from_i64(*n),
        Value::ConstFloat(f) => Slot::from_f64(*f),
        Value::ConstStr(_) => Slot::NULL, // only meaningful as `const_str`'s own operand
        Value::GlobalAddr(name) => {
            Slot::from_handle(vm.memory().address_of_global(name).unwrap_or(0))
        }
        Value::Null => Slot::NULL,
    }
}

/// Resolves `instr.operands[idx]`, reading the `BlockExecCache`'s
/// pre-resolved form (spec §4.6 "the evaluator reads the resolved form in
/// the hot path") instead of re-matching `v`'s variant: a register index or
/// embedded immediate is read directly, and only a `Cold` classification
/// (global address, string literal, null) falls back to the general
/// resolver.
fn resolve<'m>(vm: &Vm<'m>, v: &Value, idx: usize) -> Slot {
    match vm.resolved_op(idx) {
        ResolvedOp::Reg(id) => vm.top_frame().regs.get(id.0).copied().unwrap_or(Slot::NULL),
        ResolvedOp::ImmI64(n) => Slot::from_i64(n),
        ResolvedOp::ImmF64(f) => Slot::from_f64(f),
        ResolvedOp::Cold => resolve_value(vm, v),
    }
}

fn write_result<'m>(vm: &mut Vm<'m>, instr: &Instruction, value: Slot) {
    if let Some(id) = instr.result {
        vm.top_frame_mut().ensure_reg(id.0);
        vm.top_frame_mut().regs[id.0] = value;
    }
}

fn trap<'m>(vm: &Vm<'m>, kind: TrapKind, message: impl Into<String>) -> Flow<'m> {
    Flow::Trapped(vm.decorate_trap(kind, message))
}

// ---------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------

fn op_int_binop<'m>(vm: &mut Vm<'m>, instr: &Instruction) -> Flow<'m> {
    let a = resolve(vm, &instr.operands[0], 0).as_i64();
    let b = resolve(vm, &instr.operands[1], 1).as_i64();
    match eval_int_binop(instr.opcode, a, b) {
        Ok(v) => {
            write_result(vm, instr, Slot::from_i64(v));
            Flow::Continue
        }
        Err((kind, msg)) => trap(vm, kind, msg),
    }
}

fn op_float_binop<'m>(vm: &mut Vm<'m>, instr: &Instruction) -> Flow<'m> {
    let a = resolve(vm, &instr.operands[0], 0).as_f64();
    let b = resolve(vm, &instr.operands[1], 1).as_f64();
    let v = eval_float_binop(instr.opcode, a, b);
    write_result(vm, instr, Slot::from_f64(v));
    Flow::Continue
}

fn op_icmp<'m>(vm: &mut Vm<'m>, instr: &Instruction) -> Flow<'m> {
    let Opcode::ICmp(pred) = instr.opcode else { unreachable!() };
    let a = resolve(vm, &instr.operands[0], 0).as_i64();
    let b = resolve(vm, &instr.operands[1], 1).as_i64();
    write_result(vm, instr, Slot::from_bool(pred.eval(a, b)));
    Flow::Continue
}

fn op_fcmp<'m>(vm: &mut Vm<'m>, instr: &Instruction) -> Flow<'m> {
    let Opcode::FCmp(pred) = instr.opcode else { unreachable!() };
    let a = resolve(vm, &instr.operands[0], 0).as_f64();
    let b = resolve(vm, &instr.operands[1], 1).as_f64();
    write_result(vm, instr, Slot::from_bool(pred.eval(a, b)));
    Flow::Continue
}

fn op_zext1<'m>(vm: &mut Vm<'m>, instr: &Instruction) -> Flow<'m> {
    let v = resolve(vm, &instr.operands[0], 0);
    write_result(vm, instr, Slot::from_i64(v.as_i64()));
    Flow::Continue
}

fn op_alloca<'m>(vm: &mut Vm<'m>, instr: &Instruction) -> Flow<'m> {
    let addr = vm.memory_mut().alloca();
    write_result(vm, instr, Slot::from_handle(addr));
    Flow::Continue
}

fn op_load<'m>(vm: &mut Vm<'m>, instr: &Instruction) -> Flow<'m> {
    let addr = resolve(vm, &instr.operands[0], 0).as_handle();
    match vm.memory().load(addr) {
        Ok(v) => {
            write_result(vm, instr, v);
            Flow::Continue
        }
        Err(diag) => Flow::Trapped(vm.decorate_diag(diag)),
    }
}

fn op_store<'m>(vm: &mut Vm<'m>, instr: &Instruction) -> Flow<'m> {
    let value = resolve(vm, &instr.operands[0], 0);
    let addr = resolve(vm, &instr.operands[1], 1).as_handle();
    match vm.memory_mut().store(addr, value) {
        Ok(()) => Flow::Continue,
        Err(diag) => Flow::Trapped(vm.decorate_diag(diag)),
    }
}

fn op_const_str<'m>(vm: &mut Vm<'m>, instr: &Instruction) -> Flow<'m> {
    let Some(Value::ConstStr(s)) = instr.operands.first() else {
        unreachable!("const_str's operand is always a string literal")
    };
    let handle = vm.literals_mut().intern(s.clone());
    write_result(vm, instr, Slot::from_handle(handle));
    Flow::Continue
}

fn op_call<'m>(vm: &mut Vm<'m>, instr: &Instruction) -> Flow<'m> {
    let callee_name = instr.callee.as_deref().expect("call always names a callee");
    let args: Vec<Slot> = instr.operands.iter().enumerate().map(|(i, v)| resolve(vm, v, i)).collect();

    if let Some(func) = vm.module().function(callee_name) {
        if !func.is_import() {
            return Flow::Call { callee: func, args, result_id: instr.result };
        }
    }
    if let Some(value) = crate::intrinsics::eval(callee_name, &args) {
        write_result(vm, instr, value);
        return Flow::Continue;
    }
    match vm.bridge().call(callee_name, &args) {
        Ok(Some(value)) => {
            write_result(vm, instr, value);
            Flow::Continue
        }
        Ok(None) => Flow::Continue,
        Err(diag) => Flow::Trapped(vm.decorate_diag(diag)),
    }
}

fn branch_args<'m>(vm: &Vm<'m>, args: &[Value]) -> Vec<Slot> {
    // Not covered by the BlockExecCache (it only classifies `operands`),
    // so this always takes the general path.
    args.iter().map(|v| resolve_value(vm, v)).collect()
}

fn op_br<'m>(vm: &mut Vm<'m>, instr: &Instruction) -> Flow<'m> {
    let target = instr.successors[0];
    let args = branch_args(vm, &instr.branch_args[0]);
    Flow::Branch { target, args }
}

fn op_cbr<'m>(vm: &mut Vm<'m>, instr: &Instruction) -> Flow<'m> {
    let cond = resolve(vm, &instr.operands[0], 0).as_bool();
    let idx = if cond { 0 } else { 1 };
    let target = instr.successors[idx];
    let args = branch_args(vm, &instr.branch_args[idx]);
    Flow::Branch { target, args }
}

fn op_switch_i32<'m>(vm: &mut Vm<'m>, instr: &Instruction) -> Flow<'m> {
    let scrutinee = resolve(vm, &instr.operands[0], 0).as_i64();
    let idx = instr
        .switch_cases
        .iter()
        .position(|&case| case == scrutinee)
        .map(|i| i + 1) // successors[0] is the default edge
        .unwrap_or(0);
    let target = instr.successors[idx];
    let args = branch_args(vm, &instr.branch_args[idx]);
    Flow::Branch { target, args }
}

fn op_ret<'m>(vm: &mut Vm<'m>, instr: &Instruction) -> Flow<'m> {
    let value = instr.operands.first().map(|v| resolve(vm, v, 0));
    Flow::Return(value)
}

fn op_trap<'m>(vm: &mut Vm<'m>, _instr: &Instruction) -> Flow<'m> {
    trap(vm, TrapKind::Explicit, "explicit `trap`")
}

fn op_trap_kind<'m>(vm: &mut Vm<'m>, instr: &Instruction) -> Flow<'m> {
    let Opcode::TrapKind(kind) = instr.opcode else { unreachable!() };
    trap(vm, kind, format!("trap.kind {}", kind.token()))
}

fn op_trap_from_err<'m>(vm: &mut Vm<'m>, instr: &Instruction) -> Flow<'m> {
    let handle = resolve(vm, &instr.operands[0], 0).as_handle();
    let diag = vm
        .eh_tables()
        .error(handle)
        .cloned()
        .unwrap_or_else(|| Diagnostic::trap(TrapKind::RuntimeHelperError, "trap.from_err: unknown error handle"));
    Flow::Trapped(diag)
}

fn op_resume_same<'m>(vm: &mut Vm<'m>, instr: &Instruction) -> Flow<'m> {
    let handle = resolve(vm, &instr.operands[0], 0).as_handle();
    match vm.eh_tables().resume_token(handle) {
        Some(tok) => Flow::Goto { block: tok.block, ip: tok.instr_idx },
        None => trap(vm, TrapKind::RuntimeHelperError, "resume.same: unknown resume token"),
    }
}

fn op_resume_next<'m>(vm: &mut Vm<'m>, instr: &Instruction) -> Flow<'m> {
    let handle = resolve(vm, &instr.operands[0], 0).as_handle();
    match vm.eh_tables().resume_token(handle) {
        Some(tok) => Flow::Goto { block: tok.block, ip: tok.instr_idx + 1 },
        None => trap(vm, TrapKind::RuntimeHelperError, "resume.next: unknown resume token"),
    }
}

fn op_resume_label<'m>(vm: &mut Vm<'m>, instr: &Instruction) -> Flow<'m> {
    let handle = resolve(vm, &instr.operands[0], 0).as_handle();
    if vm.eh_tables().resume_token(handle).is_none() {
        return trap(vm, TrapKind::RuntimeHelperError, "resume.label: unknown resume token");
    }
    Flow::Branch { target: instr.successors[0], args: Vec::new() }
}

fn op_eh_push<'m>(vm: &mut Vm<'m>, instr: &Instruction) -> Flow<'m> {
    vm.top_frame_mut().handlers.push(instr.successors[0]);
    Flow::Continue
}

fn op_eh_pop<'m>(vm: &mut Vm<'m>, _instr: &Instruction) -> Flow<'m> {
    vm.top_frame_mut().handlers.pop();
    Flow::Continue
}

fn op_eh_entry<'m>(_vm: &mut Vm<'m>, _instr: &Instruction) -> Flow<'m> {
    Flow::Continue
}
