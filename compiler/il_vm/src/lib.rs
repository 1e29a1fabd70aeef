//! The register-style interpreter (spec §4.6): executes a verified,
//! already-linked [`il_core::Module`] directly, without lowering to native
//! code. Three dispatch strategies (table, switch, threaded) are required
//! to agree on every observable outcome (spec §8); all three share the same
//! per-opcode handlers in [`dispatch`].
//!
//! Grounded on `tidec`'s crate layout (one module per concern, a thin
//! `lib.rs` that only declares and re-exports) and, for VM-internal data
//! structures with no teacher counterpart, on
//! `examples/original_source/src/vm/*`.

pub mod bridge;
pub mod debug;
pub mod dispatch;
pub mod eh;
pub mod exec_cache;
pub mod frame;
pub mod intrinsics;
pub mod memory;
pub mod options;
pub mod slot;
pub mod strings;
pub mod trace;
pub mod vm;

pub use bridge::{HostFn, RuntimeBridge};
pub use debug::{DebugAction, DebugController, PauseReason};
pub use eh::{EhTables, ResumeToken};
pub use frame::Frame;
pub use memory::Memory;
pub use options::{DispatchMode, VmOptions};
pub use slot::{Slot, SlotView};
pub use strings::LiteralCache;
pub use trace::{SourceManager, TraceConfig, TraceMode, TraceSink};
pub use vm::{RunOutcome, Vm};
