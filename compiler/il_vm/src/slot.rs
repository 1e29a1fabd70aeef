//! The packed tagged register slot (spec §4.6): "an `i64` payload and an
//! `f64` payload aliased through bit-casting; typed reads choose the field
//! per the opcode's result type."
//!
//! A real union would need `unsafe` to read the inactive field; instead a
//! single 64-bit store backs both views, and `as_f64`/`from_f64` perform the
//! bit-cast explicitly via `f64::to_bits`/`from_bits`, which is exactly the
//! "explicit, only used at load/store boundaries" bit-casting spec §4.6
//! calls for, without `unsafe`.
//!
//! Booleans live as 0/1 in the `i64` view; pointers, string handles,
//! error handles, and resume-token handles are all indices into per-`Vm`
//! side tables (see [`crate::memory`], [`crate::strings`], [`crate::eh`]) —
//! the "opaque address" spec §3 describes for `ptr`/`str`/`error`/
//! `resume_tok`.
use il_core::Ty;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Slot {
    bits: i64,
}

impl Slot {
    pub const NULL: Slot = Slot { bits: 0 };

    pub fn from_i64(v: i64) -> Slot {
        Slot { bits: v }
    }

    pub fn from_f64(v: f64) -> Slot {
        Slot { bits: v.to_bits() as i64 }
    }

    pub fn from_bool(v: bool) -> Slot {
        Slot { bits: v as i64 }
    }

    /// An index into a side table (string/pointer/error/resume-token
    /// handle), stored as a plain `i64` the way the real runtime stores an
    /// address.
    pub fn from_handle(idx: usize) -> Slot {
        Slot { bits: idx as i64 }
    }

    pub fn as_i64(self) -> i64 {
        self.bits
    }

    pub fn as_f64(self) -> f64 {
        f64::from_bits(self.bits as u64)
    }

    pub fn as_bool(self) -> bool {
        self.bits != 0
    }

    pub fn as_handle(self) -> usize {
        self.bits as usize
    }

    /// Reads the slot's `i64` view or `f64` view depending on `ty`, the
    /// dispatch the VM's load/store and tracing paths need (spec §4.6
    /// "typed reads choose the field per the opcode's result type").
    pub fn read_as(self, ty: Ty) -> SlotView {
        match ty {
            Ty::F64 => SlotView::Float(self.as_f64()),
            _ => SlotView::Int(self.as_i64()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlotView {
    Int(i64),
    Float(f64),
}

impl std::fmt::Display for SlotView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotView::Int(v) => write!(f, "{v}"),
            SlotView::Float(v) => write!(f, "{v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_bits_round_trip() {
        let s = Slot::from_f64(3.5);
        assert_eq!(s.as_f64(), 3.5);
    }

    #[test]
    fn bool_lives_as_zero_or_one() {
        assert_eq!(Slot::from_bool(true).as_i64(), 1);
        assert_eq!(Slot::from_bool(false).as_i64(), 0);
    }
}
