//! The VM's flat memory model backing `alloca`/`load`/`store` (spec §4.6
//! "Memory").
//!
//! The core IL has no struct/array layout rules of its own — those belong
//! to the native code generators' ABI layer, explicitly out of scope here
//! (spec §1) — so this model is the simplest one that gives `alloca`,
//! `load`, and `store` well-defined, traceable semantics: a flat vector of
//! 8-byte cells, addressed by cell index with index `0` reserved as the
//! null pointer. Each module-level global is materialised into its own
//! cell at VM construction; `alloca` grows the heap by one cell per call.
//! A cell is read/written as either its `i64` or `f64` view, matching
//! [`crate::slot::Slot`]'s own bit-cast discipline.

use std::rc::Rc;

use il_core::{Diagnostic, Module, Ty, TrapKind};

use crate::slot::Slot;
use crate::strings::LiteralCache;

/// A flat, cell-addressed memory: globals occupy the low cells (in module
/// declaration order), `alloca` appends beyond them.
pub struct Memory {
    cells: Vec<Slot>,
    global_base: std::collections::HashMap<String, usize>,
}

impl Memory {
    /// Reserves cell `0` as null and materialises every global's initial
    /// value (spec §3 Global: "initializer bytes (may be empty)" — an empty
    /// initializer zero-fills the cell). A `str`-typed global is interned
    /// into `literals` the same way a `const_str` operand is (spec §4.6),
    /// so its cell holds a valid string handle rather than a reinterpreted
    /// byte pattern.
    pub fn new(module: &Module, literals: &mut LiteralCache) -> Memory {
        let mut cells = vec![Slot::NULL];
        let mut global_base = std::collections::HashMap::new();
        for g in &module.globals {
            let idx = cells.len();
            global_base.insert(g.name.clone(), idx);
            let value = if g.ty == Ty::Str {
                let s: Rc<str> = String::from_utf8_lossy(&g.init).into_owned().into();
                Slot::from_handle(literals.intern(s))
            } else if g.init.len() >= 8 {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&g.init[..8]);
                Slot::from_i64(i64::from_le_bytes(bytes))
            } else {
                Slot::NULL
            };
            cells.push(value);
        }
        Memory { cells, global_base }
    }

    pub fn address_of_global(&self, name: &str) -> Option<usize> {
        self.global_base.get(name).copied()
    }

    /// Allocates one fresh cell, returning its address. Real allocation
    /// sizes are an ABI concern the core IL doesn't model (see module
    /// doc); every `alloca` reserves exactly one cell regardless of the
    /// requested byte count.
    pub fn alloca(&mut self) -> usize {
        let addr = self.cells.len();
        self.cells.push(Slot::NULL);
        addr
    }

    pub fn load(&self, addr: usize) -> Result<Slot, Diagnostic> {
        if addr == 0 {
            return Err(Diagnostic::trap(
                TrapKind::NullOrUnalignedAccess,
                "load from null pointer",
            ));
        }
        self.cells.get(addr).copied().ok_or_else(|| {
            Diagnostic::trap(TrapKind::BoundsCheckFailure, format!("load out of bounds at {addr}"))
        })
    }

    pub fn store(&mut self, addr: usize, value: Slot) -> Result<(), Diagnostic> {
        if addr == 0 {
            return Err(Diagnostic::trap(
                TrapKind::NullOrUnalignedAccess,
                "store to null pointer",
            ));
        }
        match self.cells.get_mut(addr) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(Diagnostic::trap(
                TrapKind::BoundsCheckFailure,
                format!("store out of bounds at {addr}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use il_core::{Global, Linkage, Module};

    #[test]
    fn alloca_then_store_then_load_round_trips() {
        let mut literals = LiteralCache::build(&Module::new());
        let mut mem = Memory::new(&Module::new(), &mut literals);
        let addr = mem.alloca();
        mem.store(addr, Slot::from_i64(42)).unwrap();
        assert_eq!(mem.load(addr).unwrap().as_i64(), 42);
    }

    #[test]
    fn null_load_traps() {
        let mut literals = LiteralCache::build(&Module::new());
        let mem = Memory::new(&Module::new(), &mut literals);
        let err = mem.load(0).unwrap_err();
        assert!(err.is_trap());
    }

    #[test]
    fn str_global_cell_holds_a_valid_literal_handle() {
        let mut module = Module::new();
        module.globals.push(Global {
            name: "greeting".into(),
            ty: Ty::Str,
            linkage: Linkage::Internal,
            init: b"hello".to_vec(),
        });
        let mut literals = LiteralCache::build(&module);
        let mem = Memory::new(&module, &mut literals);
        let addr = mem.address_of_global("greeting").unwrap();
        let handle = mem.load(addr).unwrap().as_handle();
        assert_eq!(literals.get(handle).map(|s| s.as_ref()), Some("hello"));
    }
}
