//! Scalability stress tests (SPEC_FULL §1 "Test tooling"), grounded on
//! `examples/original_source/src/tests/perf/stress_scalability.cpp`'s five
//! scenarios: large CFGs, deep loop nesting, recursion-depth limits, and
//! switch-heavy dispatch. Expressed as correctness-plus-timeout-bound tests
//! rather than a criterion benchmark, matching the original's "deterministic
//! and complete within a reasonable time" framing, since no pack repo this
//! close to the domain pulls in a benchmarking crate for this purpose.

use std::time::{Duration, Instant};

use il_analysis::AnalysisManager;
use il_core::builder::FunctionBuilder;
use il_core::{Function, Instruction, IntPredicate, Linkage, Opcode, Param, ParamAttrs, Ty, Value, ValueId};
use il_verify::verify;
use il_vm::{RunOutcome, Vm, VmOptions};

/// "Large CFG stress": a linear chain of many blocks, each incrementing an
/// accumulator and branching to the next, large enough to surface O(n^2)
/// block-lookup or hash-collision regressions without taking more than a
/// couple of seconds to build, verify, and run.
#[test]
fn large_linear_chain_scales_without_quadratic_blowup() {
    const CHAIN_LEN: usize = 4000;

    let mut f = Function::new("main", Linkage::Internal, Ty::I64, vec![]);
    let mut b = FunctionBuilder::new(&mut f);

    let mut blocks = Vec::with_capacity(CHAIN_LEN + 1);
    for i in 0..=CHAIN_LEN {
        blocks.push(b.block(format!("b{i}")));
    }
    let acc_param_per_block: Vec<ValueId> = blocks
        .iter()
        .map(|&blk| {
            b.switch_to(blk);
            b.block_param("acc", Ty::I64)
        })
        .collect();

    for i in 0..CHAIN_LEN {
        b.switch_to(blocks[i]);
        let next = b.push_value(
            Instruction::new(Opcode::IAddOvf, Ty::I64)
                .with_operands(vec![Value::Temp(acc_param_per_block[i]), Value::ConstInt(1)]),
        );
        b.br(blocks[i + 1], vec![next]);
    }
    b.switch_to(*blocks.last().unwrap());
    b.ret(Some(Value::Temp(*acc_param_per_block.last().unwrap())));

    let mut module = il_core::Module {
        version: il_core::IL_VERSION.to_string(),
        target: None,
        externs: vec![],
        globals: vec![],
        functions: vec![],
    };
    module.functions.push(f);

    let start = Instant::now();
    verify(&module).expect("large linear chain should verify");
    let mut vm = Vm::new(&module, VmOptions::default());
    let result = vm.run("main", vec![]).expect("large linear chain should not trap");
    let elapsed = start.elapsed();

    match result {
        RunOutcome::Completed(Some(slot)) => assert_eq!(slot.as_i64(), CHAIN_LEN as i64),
        other => panic!("expected a completed run with a result, got {other:?}"),
    }
    assert!(elapsed < Duration::from_secs(5), "large chain took too long: {elapsed:?}");
}

/// "Deep nesting stress": nested loops (an outer loop whose body is itself
/// an inner loop), validating that `LoopInfo` builds a two-level forest and
/// that the VM produces the arithmetically correct total.
#[test]
fn nested_loops_build_a_two_level_loop_forest_and_compute_correctly() {
    const OUTER: i64 = 40;
    const INNER: i64 = 40;

    let mut f = Function::new("main", Linkage::Internal, Ty::I64, vec![]);
    let mut b = FunctionBuilder::new(&mut f);

    let entry = b.block("entry");
    let outer_head = b.block("outer_head");
    let outer_i = b.block_param("i", Ty::I64);
    let outer_acc = b.block_param("acc", Ty::I64);
    let outer_body = b.block("outer_body");
    let inner_head = b.block("inner_head");
    let inner_j = b.block_param("j", Ty::I64);
    let inner_acc = b.block_param("acc", Ty::I64);
    let inner_body = b.block("inner_body");
    let outer_latch = b.block("outer_latch");
    let latch_acc = b.block_param("acc", Ty::I64);
    let done = b.block("done");
    let done_acc = b.block_param("acc", Ty::I64);

    b.switch_to(entry);
    b.br(outer_head, vec![Value::ConstInt(0), Value::ConstInt(0)]);

    b.switch_to(outer_head);
    let outer_cond = b.push_value(
        Instruction::new(Opcode::ICmp(IntPredicate::Slt), Ty::I1)
            .with_operands(vec![Value::Temp(outer_i), Value::ConstInt(OUTER)]),
    );
    b.cbr(outer_cond, outer_body, vec![], done, vec![Value::Temp(outer_acc)]);

    b.switch_to(outer_body);
    b.br(inner_head, vec![Value::ConstInt(0), Value::Temp(outer_acc)]);

    b.switch_to(inner_head);
    let inner_cond = b.push_value(
        Instruction::new(Opcode::ICmp(IntPredicate::Slt), Ty::I1)
            .with_operands(vec![Value::Temp(inner_j), Value::ConstInt(INNER)]),
    );
    b.cbr(inner_cond, inner_body, vec![], outer_latch, vec![Value::Temp(inner_acc)]);

    b.switch_to(inner_body);
    let acc2 = b.push_value(
        Instruction::new(Opcode::IAddOvf, Ty::I64).with_operands(vec![Value::Temp(inner_acc), Value::ConstInt(1)]),
    );
    let j2 = b.push_value(
        Instruction::new(Opcode::IAddOvf, Ty::I64).with_operands(vec![Value::Temp(inner_j), Value::ConstInt(1)]),
    );
    b.br(inner_head, vec![j2, acc2]);

    b.switch_to(outer_latch);
    let i2 = b.push_value(
        Instruction::new(Opcode::IAddOvf, Ty::I64).with_operands(vec![Value::Temp(outer_i), Value::ConstInt(1)]),
    );
    b.br(outer_head, vec![i2, Value::Temp(latch_acc)]);

    b.switch_to(done);
    b.ret(Some(Value::Temp(done_acc)));

    let module = single_function_module(f);
    verify(&module).expect("nested loop should verify");

    let analyses = AnalysisManager::new();
    let loops = analyses.loops(module.function("main").unwrap());
    assert_eq!(loops.loops().len(), 2, "expected exactly an outer and an inner loop");

    let mut vm = Vm::new(&module, VmOptions::default());
    match vm.run("main", vec![]).expect("nested loop should not trap") {
        RunOutcome::Completed(Some(slot)) => assert_eq!(slot.as_i64(), OUTER * INNER),
        other => panic!("expected a completed run with a result, got {other:?}"),
    }
}

/// "Switch/branch heavy stress": a `switch.i32` with many cases, checked at
/// a sample of inputs plus the default edge (not every case, to keep the
/// test itself fast) to validate the dispatch table doesn't corrupt case
/// ordering at scale.
#[test]
fn switch_with_many_cases_dispatches_correctly() {
    const CASES: i64 = 1500;

    let param = Param { name: "x".to_string(), ty: Ty::I32, id: ValueId(0), attrs: ParamAttrs::default() };
    let mut f = Function::new("main", Linkage::Internal, Ty::I64, vec![param]);
    let mut b = FunctionBuilder::new(&mut f);

    let entry = b.block("entry");
    let default_blk = b.block("default");
    b.ret(Some(Value::ConstInt(-1)));

    let mut case_blocks = Vec::with_capacity(CASES as usize);
    for i in 0..CASES {
        let blk = b.block(format!("case{i}"));
        b.ret(Some(Value::ConstInt(i)));
        case_blocks.push(blk);
    }

    b.switch_to(entry);
    let mut instr = Instruction::new(Opcode::SwitchI32, Ty::Void).with_operands(vec![Value::Temp(ValueId(0))]);
    instr.successors.push(default_blk);
    instr.branch_args.push(vec![]);
    for (i, &blk) in case_blocks.iter().enumerate() {
        instr.successors.push(blk);
        instr.branch_args.push(vec![]);
        instr.switch_cases.push(i as i64);
    }
    b.push(instr);

    let module = single_function_module(f);
    verify(&module).expect("large switch should verify");

    for &sample in &[0i64, 1, 749, 1499, CASES /* out of range -> default */] {
        let mut vm = Vm::new(&module, VmOptions::default());
        let expected = if sample < CASES { sample } else { -1 };
        match vm.run("main", vec![il_vm::Slot::from_i64(sample)]).expect("switch run should not trap") {
            RunOutcome::Completed(Some(slot)) => assert_eq!(slot.as_i64(), expected, "case {sample} dispatched wrong"),
            other => panic!("expected a completed run with a result, got {other:?}"),
        }
    }
}

/// "Stack limit stress": recursive calls must trip the configured
/// recursion-depth trap rather than overflowing the host stack.
#[test]
fn deep_recursion_trips_the_configured_recursion_limit() {
    let param = Param { name: "n".to_string(), ty: Ty::I64, id: ValueId(0), attrs: ParamAttrs::default() };
    let mut f = Function::new("main", Linkage::Internal, Ty::I64, vec![param]);
    let mut b = FunctionBuilder::new(&mut f);

    let entry = b.block("entry");
    let base = b.block("base");
    let recurse = b.block("recurse");

    b.switch_to(entry);
    let is_zero = b.push_value(
        Instruction::new(Opcode::ICmp(IntPredicate::Sle), Ty::I1)
            .with_operands(vec![Value::Temp(ValueId(0)), Value::ConstInt(0)]),
    );
    b.cbr(is_zero, base, vec![], recurse, vec![]);

    b.switch_to(base);
    b.ret(Some(Value::ConstInt(0)));

    b.switch_to(recurse);
    let n_minus_1 = b.push_value(
        Instruction::new(Opcode::ISubOvf, Ty::I64).with_operands(vec![Value::Temp(ValueId(0)), Value::ConstInt(1)]),
    );
    let call = Instruction::new(Opcode::Call, Ty::I64)
        .with_callee("main".to_string())
        .with_operands(vec![n_minus_1]);
    let result = b.push_value(call);
    let incremented = b.push_value(
        Instruction::new(Opcode::IAddOvf, Ty::I64).with_operands(vec![result, Value::ConstInt(1)]),
    );
    b.ret(Some(incremented));

    let module = single_function_module(f);
    verify(&module).expect("recursive function should verify");

    let options = VmOptions { max_recursion_depth: 50, ..VmOptions::default() };
    let mut vm = Vm::new(&module, options);
    let err = vm.run("main", vec![il_vm::Slot::from_i64(10_000)]).expect_err("recursion depth should trap");
    assert!(err.is_trap());
}

fn single_function_module(f: Function) -> il_core::Module {
    il_core::Module {
        version: il_core::IL_VERSION.to_string(),
        target: None,
        externs: vec![],
        globals: vec![],
        functions: vec![f],
    }
}
