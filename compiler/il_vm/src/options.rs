//! VM configuration (spec §4.6 "Interpreter safety limits", §3.7 dispatch
//! strategy). Defaults are carried over from
//! `examples/original_source/src/vm/VMConstants.hpp` so a module that
//! behaves within the original's limits behaves the same way here.

/// Which of the three required-equivalent dispatch strategies executes a
/// run (spec §8 "dispatch-mode independence": all three must agree on
/// observable outcomes for every scenario).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// A literal `match` over the opcode.
    Switch,
    /// An array of function pointers indexed by a per-opcode slot.
    #[default]
    Table,
    /// Like `Table`, but the handler pointer is pre-resolved once per
    /// instruction in the function's execution cache.
    Threaded,
}

/// Construction-time VM configuration.
#[derive(Debug, Clone, Copy)]
pub struct VmOptions {
    pub dispatch_mode: DispatchMode,
    /// Maximum live call-stack depth before a recursion-depth trap fires
    /// (`kMaxRecursionDepth` in the original).
    pub max_recursion_depth: usize,
    /// How many steps run between interrupt/cooperative-yield checks
    /// (`kDefaultInterruptCheckInterval`).
    pub interrupt_check_interval: u64,
    /// Initial capacity reserved for the execution-stack vector
    /// (`kExecStackInitialCapacity`).
    pub exec_stack_initial_capacity: usize,
    /// How many retired frames are kept for reuse instead of being
    /// dropped (`kStackBufferPoolSize`/`kRegisterFilePoolSize`).
    pub frame_pool_size: usize,
}

impl Default for VmOptions {
    fn default() -> Self {
        VmOptions {
            dispatch_mode: DispatchMode::default(),
            max_recursion_depth: 1000,
            interrupt_check_interval: 10_000,
            exec_stack_initial_capacity: 64,
            frame_pool_size: 16,
        }
    }
}
