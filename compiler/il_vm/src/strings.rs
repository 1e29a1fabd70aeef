//! The per-VM string literal cache (spec §4.6): every `const_str` operand
//! in the module is materialised once, at VM construction, into a cache
//! keyed by byte sequence (embedded NULs preserved — `Rc<str>` is plain
//! UTF-8 and a NUL byte is valid UTF-8). Handler re-executions look the
//! handle up again rather than retaining/releasing per use.
//!
//! A string value in a register is the handle (an index into this cache),
//! matching [`crate::slot::Slot`]'s "opaque address" model for `str`.

use std::collections::HashMap;
use std::rc::Rc;

use il_core::{Instruction, Module, Opcode, Value};

pub struct LiteralCache {
    strings: Vec<Rc<str>>,
    by_bytes: HashMap<Vec<u8>, usize>,
}

impl LiteralCache {
    /// Walks every instruction in the module and interns the literal
    /// operand of every `const_str` (spec §4.6 "at VM construction time").
    pub fn build(module: &Module) -> LiteralCache {
        let mut cache = LiteralCache { strings: Vec::new(), by_bytes: HashMap::new() };
        for f in &module.functions {
            for blk in f.blocks.iter() {
                for instr in &blk.instructions {
                    cache.intern_const_str(instr);
                }
            }
        }
        cache
    }

    fn intern_const_str(&mut self, instr: &Instruction) {
        if instr.opcode != Opcode::ConstStr {
            return;
        }
        if let Some(Value::ConstStr(s)) = instr.operands.first() {
            self.intern(s.clone());
        }
    }

    /// Interns `s`, returning the same handle for byte-identical input on
    /// every call (spec §8 VM laws, "literal cache").
    pub fn intern(&mut self, s: Rc<str>) -> usize {
        let key = s.as_bytes().to_vec();
        if let Some(&idx) = self.by_bytes.get(&key) {
            return idx;
        }
        let idx = self.strings.len();
        self.by_bytes.insert(key, idx);
        self.strings.push(s);
        idx
    }

    pub fn get(&self, handle: usize) -> Option<&Rc<str>> {
        self.strings.get(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_bytes_share_a_handle() {
        let mut cache = LiteralCache { strings: Vec::new(), by_bytes: HashMap::new() };
        let a = cache.intern(Rc::from("hello"));
        let b = cache.intern(Rc::from("hello"));
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_bytes_get_distinct_handles() {
        let mut cache = LiteralCache { strings: Vec::new(), by_bytes: HashMap::new() };
        let a = cache.intern(Rc::from("hello"));
        let b = cache.intern(Rc::from("world"));
        assert_ne!(a, b);
    }
}
