//! The runtime bridge (spec §4.6 "Call resolution order", third and last
//! step): host functions the embedder registers under an extern's name,
//! for BASIC standard-library calls (`PRINT`, `INPUT`, file I/O, ...) that
//! have no IL-level definition and aren't a recognized [`crate::intrinsics`]
//! entry.
//!
//! Grounded on `examples/original_source/src/vm/OpHelpers.cpp`'s pattern of
//! trapping with a descriptive message, never panicking, when a host call
//! fails or is unknown.

use std::collections::HashMap;

use il_core::{Diagnostic, TrapKind};

use crate::slot::Slot;

/// A host function the bridge can dispatch an `extern` call to. Takes the
/// resolved argument slots, returns the result slot (or `None` for a
/// `void`-returning extern), or a [`Diagnostic`] to trap with.
pub type HostFn = Box<dyn Fn(&[Slot]) -> Result<Option<Slot>, Diagnostic>>;

/// A table of host functions keyed by extern name, consulted as the last
/// step of call resolution.
#[derive(Default)]
pub struct RuntimeBridge {
    hosts: HashMap<String, HostFn>,
}

impl RuntimeBridge {
    pub fn new() -> RuntimeBridge {
        RuntimeBridge::default()
    }

    pub fn register(&mut self, name: impl Into<String>, f: HostFn) {
        self.hosts.insert(name.into(), f);
    }

    pub fn call(&self, name: &str, args: &[Slot]) -> Result<Option<Slot>, Diagnostic> {
        match self.hosts.get(name) {
            Some(f) => f(args),
            None => Err(Diagnostic::trap(
                TrapKind::RuntimeHelperError,
                format!("call to unresolved extern `{name}`"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_extern_traps() {
        let bridge = RuntimeBridge::new();
        let err = bridge.call("puts", &[]).unwrap_err();
        assert!(err.is_trap());
    }

    #[test]
    fn registered_extern_runs() {
        let mut bridge = RuntimeBridge::new();
        bridge.register("double", Box::new(|args| Ok(Some(Slot::from_i64(args[0].as_i64() * 2)))));
        let v = bridge.call("double", &[Slot::from_i64(21)]).unwrap().unwrap();
        assert_eq!(v.as_i64(), 42);
    }
}
