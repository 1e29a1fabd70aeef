//! The interpreter itself (spec §4.6): owns the execution-stack vector,
//! memory, literal cache, exception-handling tables, the runtime bridge,
//! and the optional trace/debug seams, and drives a function to
//! completion or to the next pause point one instruction at a time.

use il_core::{Diagnostic, Function, Module, TrapKind};

use crate::bridge::RuntimeBridge;
use crate::debug::{DebugAction, DebugController, PauseReason};
use crate::dispatch::{self, Flow};
use crate::eh::{EhTables, ResumeToken};
use crate::exec_cache::{ExecCaches, ResolvedOp};
use crate::frame::Frame;
use crate::memory::Memory;
use crate::options::{DispatchMode, VmOptions};
use crate::slot::Slot;
use crate::strings::LiteralCache;
use crate::trace::TraceSink;

/// How a [`Vm::run`] or [`Vm::resume`] call ended.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(Option<Slot>),
    Paused(PauseReason),
}

enum StepResult {
    Keep,
    Pause(PauseReason),
    Done(Result<Option<Slot>, Diagnostic>),
}

pub struct Vm<'m> {
    module: &'m Module,
    memory: Memory,
    literals: LiteralCache,
    eh: EhTables,
    bridge: RuntimeBridge,
    exec_caches: ExecCaches,
    dispatch_table: [dispatch::OpHandler; dispatch::NUM_OPCODE_SLOTS],
    stack: Vec<Frame<'m>>,
    spare_frames: Vec<Frame<'m>>,
    options: VmOptions,
    trace: Option<TraceSink>,
    debug: Option<DebugController>,
    interrupt: Option<Box<dyn FnMut() -> bool>>,
    step_count: u64,
    /// The current instruction's pre-resolved operands (spec §4.6
    /// "BlockExecCache"), copied out of the cache before dispatch so the
    /// hot-path handlers in `dispatch` read a plain indexed slot instead of
    /// re-matching each operand's `Value` variant. Reused across steps to
    /// avoid a fresh allocation per instruction.
    current_ops: Vec<ResolvedOp>,
}

impl<'m> Vm<'m> {
    pub fn new(module: &'m Module, options: VmOptions) -> Vm<'m> {
        let mut literals = LiteralCache::build(module);
        let memory = Memory::new(module, &mut literals);
        Vm {
            module,
            memory,
            literals,
            eh: EhTables::new(),
            bridge: RuntimeBridge::new(),
            exec_caches: ExecCaches::new(),
            dispatch_table: dispatch::build_table(),
            stack: Vec::with_capacity(options.exec_stack_initial_capacity),
            spare_frames: Vec::with_capacity(options.frame_pool_size),
            options,
            trace: None,
            debug: None,
            interrupt: None,
            step_count: 0,
            current_ops: Vec::new(),
        }
    }

    pub fn with_trace(&mut self, trace: TraceSink) -> &mut Self {
        self.trace = Some(trace);
        self
    }

    pub fn with_debug(&mut self, debug: DebugController) -> &mut Self {
        self.debug = Some(debug);
        self
    }

    pub fn set_interrupt_hook(&mut self, hook: Box<dyn FnMut() -> bool>) {
        self.interrupt = Some(hook);
    }

    pub fn register_extern(&mut self, name: impl Into<String>, f: crate::bridge::HostFn) {
        self.bridge.register(name, f);
    }

    pub fn module(&self) -> &'m Module {
        self.module
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn literals_mut(&mut self) -> &mut LiteralCache {
        &mut self.literals
    }

    pub fn eh_tables(&self) -> &EhTables {
        &self.eh
    }

    pub fn bridge(&self) -> &RuntimeBridge {
        &self.bridge
    }

    pub fn top_frame(&self) -> &Frame<'m> {
        self.stack.last().expect("a handler only runs while a frame is active")
    }

    pub fn top_frame_mut(&mut self) -> &mut Frame<'m> {
        self.stack.last_mut().expect("a handler only runs while a frame is active")
    }

    /// The `idx`-th operand's pre-resolved form for the instruction
    /// currently dispatching, or `Cold` if `idx` is out of range (operand
    /// lists covered by the cache never grow between when it's populated
    /// and when a handler reads it, so this only happens for opcodes that
    /// read a branch-argument list instead of `operands`).
    pub(crate) fn resolved_op(&self, idx: usize) -> ResolvedOp {
        self.current_ops.get(idx).copied().unwrap_or(ResolvedOp::Cold)
    }

    /// Adds function/block context to a trap raised deep inside a helper
    /// (memory, literal cache) that doesn't itself know where it's being
    /// called from (spec §6, mirroring `OpHelpers.cpp`'s `trapWithMessage`).
    pub fn decorate_diag(&self, diag: Diagnostic) -> Diagnostic {
        let top = self.top_frame();
        diag.with_function(top.func.name.clone()).with_block(top.func.blocks[top.block].label.clone())
    }

    pub fn decorate_trap(&self, kind: TrapKind, message: impl Into<String>) -> Diagnostic {
        self.decorate_diag(Diagnostic::trap(kind, message))
    }

    fn take_frame(&mut self, func: &'m Function, entry: il_core::BlockId, call_result_id: Option<il_core::ValueId>) -> Frame<'m> {
        match self.spare_frames.pop() {
            Some(mut f) => {
                f.reset_for(func, entry, call_result_id);
                f
            }
            None => Frame::new(func, entry, call_result_id),
        }
    }

    fn recycle_frame(&mut self, frame: Frame<'m>) {
        if self.spare_frames.len() < self.options.frame_pool_size {
            self.spare_frames.push(frame);
        }
    }

    /// Runs `name` to completion or to the first pause point, passing
    /// `args` as its parameters.
    pub fn run(&mut self, name: &str, args: Vec<Slot>) -> Result<RunOutcome, Diagnostic> {
        let func = self
            .module
            .function(name)
            .ok_or_else(|| Diagnostic::link(format!("unknown function `{name}`")))?;
        let entry = func
            .entry_block()
            .ok_or_else(|| Diagnostic::verifier(format!("function `{name}` has no blocks")))?;
        let mut frame = self.take_frame(func, entry, None);
        for (p, v) in func.params.iter().zip(args) {
            frame.ensure_reg(p.id.0);
            frame.regs[p.id.0] = v;
        }
        self.stack.push(frame);
        self.drive()
    }

    /// Continues a paused run after the embedder decides on a [`DebugAction`].
    pub fn resume(&mut self, action: DebugAction) -> Result<RunOutcome, Diagnostic> {
        if let Some(debug) = self.debug.as_mut() {
            debug.apply(action);
        }
        self.drive()
    }

    fn drive(&mut self) -> Result<RunOutcome, Diagnostic> {
        loop {
            match self.step_once() {
                StepResult::Keep => {}
                StepResult::Pause(reason) => return Ok(RunOutcome::Paused(reason)),
                StepResult::Done(outcome) => return outcome.map(RunOutcome::Completed),
            }
        }
    }

    fn step_once(&mut self) -> StepResult {
        let top = self.stack.last().expect("drive only runs with a non-empty stack");
        let func = top.func;
        let block = top.block;
        let ip = top.ip;
        let block_data = &func.blocks[block];
        let Some(instr) = block_data.instructions.get(ip) else {
            unreachable!("a verified function's blocks are always terminated");
        };
        let label = block_data.label.clone();
        let loc = instr.loc;

        if let Some(reason) = self.debug.as_mut().and_then(|d| d.check(&label, ip == 0, loc)) {
            return StepResult::Pause(reason);
        }

        self.step_count += 1;
        if self.options.interrupt_check_interval > 0 && self.step_count % self.options.interrupt_check_interval == 0 {
            if let Some(hook) = self.interrupt.as_mut() {
                if hook() {
                    return StepResult::Pause(PauseReason::Interrupted);
                }
            }
        }

        if let Some(trace) = self.trace.as_mut() {
            trace.on_step(&func.name, &label, &instr.opcode.mnemonic(), loc);
        }

        // The BlockExecCache is built (and its resolved-operand array
        // copied into `current_ops`) on every step, independent of dispatch
        // mode: spec §4.6 describes it as the hot path's operand-resolution
        // accelerator, not a `threaded`-only mechanism. `threaded` mode
        // additionally reuses the cache's pre-resolved handler pointer.
        let threaded_handler = {
            let cache = self.exec_caches.get_or_build(func, block, &self.dispatch_table);
            let cached = &cache.instrs[ip];
            self.current_ops.clear();
            self.current_ops.extend_from_slice(&cached.resolved_ops);
            cached.handler
        };

        let flow = match self.options.dispatch_mode {
            DispatchMode::Switch => dispatch::exec_switch(self, instr),
            DispatchMode::Table => {
                let handler = self.dispatch_table[dispatch::opcode_slot(instr.opcode)];
                handler(self, instr)
            }
            DispatchMode::Threaded => threaded_handler(self, instr),
        };
        self.apply_flow(flow)
    }

    fn apply_flow(&mut self, flow: Flow<'m>) -> StepResult {
        match flow {
            Flow::Continue => {
                self.top_frame_mut().ip += 1;
                StepResult::Keep
            }
            Flow::Branch { target, args } => {
                let frame = self.top_frame_mut();
                frame.block = target;
                frame.ip = 0;
                frame.pending_args = Some(args);
                frame.transfer_pending_args();
                StepResult::Keep
            }
            Flow::Goto { block, ip } => {
                let frame = self.top_frame_mut();
                frame.block = block;
                frame.ip = ip;
                StepResult::Keep
            }
            Flow::Return(value) => {
                let popped = self.stack.pop().expect("returning frame is on the stack");
                match self.stack.last_mut() {
                    Some(caller) => {
                        if let Some(id) = popped.call_result_id {
                            caller.ensure_reg(id.0);
                            caller.regs[id.0] = value.unwrap_or(Slot::NULL);
                        }
                        caller.ip += 1;
                        self.recycle_frame(popped);
                        StepResult::Keep
                    }
                    None => {
                        self.recycle_frame(popped);
                        StepResult::Done(Ok(value))
                    }
                }
            }
            Flow::Call { callee, args, result_id } => {
                if self.stack.len() >= self.options.max_recursion_depth {
                    let diag = self.decorate_trap(
                        TrapKind::CallStackOverflow,
                        format!("maximum recursion depth ({}) exceeded", self.options.max_recursion_depth),
                    );
                    return self.apply_flow(Flow::Trapped(diag));
                }
                let entry = callee
                    .entry_block()
                    .expect("a callable function always has an entry block");
                let mut frame = self.take_frame(callee, entry, result_id);
                for (p, v) in callee.params.iter().zip(args) {
                    frame.ensure_reg(p.id.0);
                    frame.regs[p.id.0] = v;
                }
                self.stack.push(frame);
                StepResult::Keep
            }
            Flow::Trapped(diag) => self.handle_trap(diag),
            Flow::Pause(reason) => StepResult::Pause(reason),
        }
    }

    /// Unwinds frames looking for a live handler (spec §4.6 "Exception-
    /// handling contract"): a trap pops handlers off the current frame
    /// first, then whole frames, until one supplies a handler block or the
    /// stack empties and the trap becomes the run's result.
    fn handle_trap(&mut self, diag: Diagnostic) -> StepResult {
        loop {
            let Some(top) = self.stack.last_mut() else {
                return StepResult::Done(Err(diag));
            };
            if let Some(handler_block) = top.handlers.take_innermost() {
                let error_handle = self.eh.push_error(diag);
                let resume_handle = self.eh.push_resume_token(ResumeToken { block: top.block, instr_idx: top.ip });
                let top = self.stack.last_mut().expect("checked above");
                top.block = handler_block;
                top.ip = 0;
                let params = top.func.blocks[handler_block].params.clone();
                if let Some(p0) = params.first() {
                    top.ensure_reg(p0.id.0);
                    top.regs[p0.id.0] = Slot::from_handle(error_handle);
                }
                if let Some(p1) = params.get(1) {
                    top.ensure_reg(p1.id.0);
                    top.regs[p1.id.0] = Slot::from_handle(resume_handle);
                }
                return StepResult::Keep;
            }
            let popped = self.stack.pop().unwrap();
            self.recycle_frame(popped);
            if self.stack.is_empty() {
                return StepResult::Done(Err(diag));
            }
        }
    }
}
