//! BasicAA / ModRef (spec §4.3): a conservative alias classifier driven by
//! pointer provenance (`alloca` vs. `global` vs. `null`) and escape through
//! `store`, `call`, or `ret`, plus a call's ModRef summary driven by the
//! callee's [`FunctionAttrs`].

use std::collections::{HashMap, HashSet};

use il_core::{Function, FunctionAttrs, Module, Opcode, Value, ValueId};

/// The aliasing relationship between two pointer-typed values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasResult {
    MustAlias,
    MayAlias,
    NoAlias,
}

/// Whether a call may read and/or write through memory, independent of any
/// specific pointer pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModRefInfo {
    pub modifies: bool,
    pub refs: bool,
}

impl ModRefInfo {
    pub const NONE: ModRefInfo = ModRefInfo { modifies: false, refs: false };
    pub const REF: ModRefInfo = ModRefInfo { modifies: false, refs: true };
    pub const MOD: ModRefInfo = ModRefInfo { modifies: true, refs: false };
    pub const MOD_REF: ModRefInfo = ModRefInfo { modifies: true, refs: true };
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Provenance {
    Alloca(ValueId),
    Global(String),
    Null,
    Unknown,
}

/// Per-function alias classifier, built once from a single pass over the
/// function's instructions.
#[derive(Debug, Clone)]
pub struct BasicAA {
    provenance: HashMap<ValueId, Provenance>,
    /// Allocas whose address has been stored through a pointer, passed to a
    /// call, or returned; once an alloca escapes it may alias anything.
    escaped: HashSet<ValueId>,
}

impl BasicAA {
    #[tracing::instrument(skip_all, fields(function = %f.name))]
    pub fn compute(f: &Function) -> BasicAA {
        let mut provenance = HashMap::new();
        for blk in f.blocks.iter() {
            for instr in &blk.instructions {
                if instr.opcode == Opcode::Alloca {
                    if let Some(id) = instr.result {
                        provenance.insert(id, Provenance::Alloca(id));
                    }
                }
            }
        }

        let mut escaped = HashSet::new();
        for blk in f.blocks.iter() {
            for instr in &blk.instructions {
                match instr.opcode {
                    // `store value, addr`: the stored *value*, if itself a
                    // pointer, escapes into the memory `addr` points at.
                    Opcode::Store => {
                        if let Some(value) = instr.operands.first() {
                            mark_escaped(value, &provenance, &mut escaped);
                        }
                    }
                    Opcode::Call => {
                        for arg in &instr.operands {
                            mark_escaped(arg, &provenance, &mut escaped);
                        }
                    }
                    Opcode::Ret => {
                        if let Some(v) = instr.operands.first() {
                            mark_escaped(v, &provenance, &mut escaped);
                        }
                    }
                    _ => {}
                }
            }
        }

        tracing::debug!(allocas = provenance.len(), escaped = escaped.len(), "alias summary computed");
        BasicAA { provenance, escaped }
    }

    fn provenance_of(&self, v: &Value) -> Provenance {
        match v {
            Value::Temp(id) => self.provenance.get(id).cloned().unwrap_or(Provenance::Unknown),
            Value::GlobalAddr(name) => Provenance::Global(name.clone()),
            Value::Null => Provenance::Null,
            _ => Provenance::Unknown,
        }
    }

    fn has_escaped(&self, id: ValueId) -> bool {
        self.escaped.contains(&id)
    }

    /// Every `alloca` result id in the function whose address never
    /// escaped (spec §4.4 DSE cross-block variant: "non-escaping
    /// allocas"). A non-escaping alloca can only be read or written by
    /// `load`/`store` instructions in this function, never by an opaque
    /// call, which is what makes cross-block dead-store analysis sound
    /// without tracking calls at all.
    pub fn non_escaping_allocas(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.provenance.keys().copied().filter(|id| !self.escaped.contains(id))
    }

    /// Classify the relationship between two pointer-typed operands.
    pub fn alias(&self, a: &Value, b: &Value) -> AliasResult {
        match (self.provenance_of(a), self.provenance_of(b)) {
            (Provenance::Null, Provenance::Null) => AliasResult::MustAlias,
            (Provenance::Alloca(x), Provenance::Alloca(y)) if x == y => AliasResult::MustAlias,
            (Provenance::Global(x), Provenance::Global(y)) if x == y => AliasResult::MustAlias,
            (Provenance::Alloca(x), Provenance::Alloca(y)) => {
                if self.has_escaped(x) || self.has_escaped(y) {
                    AliasResult::MayAlias
                } else {
                    AliasResult::NoAlias
                }
            }
            (Provenance::Alloca(x), Provenance::Global(_))
            | (Provenance::Global(_), Provenance::Alloca(x)) => {
                if self.has_escaped(x) {
                    AliasResult::MayAlias
                } else {
                    AliasResult::NoAlias
                }
            }
            (Provenance::Alloca(x), Provenance::Null) | (Provenance::Null, Provenance::Alloca(x)) => {
                if self.has_escaped(x) {
                    AliasResult::MayAlias
                } else {
                    AliasResult::NoAlias
                }
            }
            (Provenance::Global(_), Provenance::Null) | (Provenance::Null, Provenance::Global(_)) => {
                AliasResult::NoAlias
            }
            _ => AliasResult::MayAlias,
        }
    }
}

fn mark_escaped(v: &Value, provenance: &HashMap<ValueId, Provenance>, escaped: &mut HashSet<ValueId>) {
    if let Value::Temp(id) = v {
        if let Some(Provenance::Alloca(alloca_id)) = provenance.get(id) {
            escaped.insert(*alloca_id);
        }
    }
}

/// The ModRef summary for a direct call to `callee`. Imports and externs
/// carry no attribute bundle, so calls through them are conservatively
/// `MOD_REF`; `pure` implies neither, `readonly` implies `REF` only.
pub fn call_modref(module: &Module, callee: &str) -> ModRefInfo {
    match module.function(callee).map(|f| f.attrs) {
        Some(FunctionAttrs { pure: true, .. }) => ModRefInfo::NONE,
        Some(FunctionAttrs { readonly: true, .. }) => ModRefInfo::REF,
        _ => ModRefInfo::MOD_REF,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use il_io::parse;

    #[test]
    fn distinct_non_escaping_allocas_do_not_alias() {
        let src = r#"
            func @main() -> i64 {
                entry:
                    %p = alloca;
                    %q = alloca;
                    store 1, %p;
                    store 2, %q;
                    %v = load %p;
                    ret %v;
            }
        "#;
        let module = parse(src).unwrap();
        let f = module.function("main").unwrap();
        let aa = BasicAA::compute(f);

        let mut p = None;
        let mut q = None;
        for blk in f.blocks.iter() {
            for instr in &blk.instructions {
                if instr.opcode == Opcode::Alloca {
                    if p.is_none() {
                        p = instr.result;
                    } else {
                        q = instr.result;
                    }
                }
            }
        }
        let p = Value::Temp(p.unwrap());
        let q = Value::Temp(q.unwrap());

        assert_eq!(aa.alias(&p, &p), AliasResult::MustAlias);
        assert_eq!(aa.alias(&p, &q), AliasResult::NoAlias);
    }

    #[test]
    fn pure_function_has_no_modref() {
        let src = r#"
            func @pure_fn() -> i64 {
                entry:
                    ret 0;
            }
        "#;
        let mut module = parse(src).unwrap();
        module.function_mut("pure_fn").unwrap().attrs.pure = true;
        assert_eq!(call_modref(&module, "pure_fn"), ModRefInfo::NONE);
    }

    #[test]
    fn unknown_callee_is_conservatively_modref() {
        let module = Module::new();
        assert_eq!(call_modref(&module, "unknown"), ModRefInfo::MOD_REF);
    }
}
