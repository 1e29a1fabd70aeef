use std::collections::HashMap;

use il_utils::index_vec::IdxVec;

use crate::block::BasicBlockData;
use crate::ids::{BlockId, ValueId};
use crate::linkage::Linkage;
use crate::ty::Ty;

/// A formal parameter of a function.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Ty,
    pub id: ValueId,
    pub attrs: ParamAttrs,
}

/// Advisory parameter attributes (spec §3). The verifier does not enforce
/// these; optimisation passes may assume them, and the serializer round
/// trips them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParamAttrs {
    pub noalias: bool,
    pub nocapture: bool,
    pub nonnull: bool,
}

/// Advisory function attributes (spec §3). Same non-enforcement contract
/// as [`ParamAttrs`]; consumed by `il_analysis`'s ModRef classifier (spec
/// §4.3).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FunctionAttrs {
    pub nothrow: bool,
    pub readonly: bool,
    pub pure: bool,
}

/// A function definition or import declaration (spec §3 "Function").
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub linkage: Linkage,
    pub ret_ty: Ty,
    pub params: Vec<Param>,
    /// Empty when `linkage == Linkage::Import`; non-empty otherwise (spec
    /// §3, enforced by `il_verify`, not by construction, so that parsers
    /// can build up a function incrementally).
    pub blocks: IdxVec<BlockId, BasicBlockData>,
    /// Debug-only mapping from SSA id to a source-level name, used by the
    /// serializer to emit named temporaries instead of bare numbers.
    pub value_names: HashMap<ValueId, String>,
    pub attrs: FunctionAttrs,
    next_value_id: u32,
}

impl Function {
    #[tracing::instrument(skip_all, fields(params = params.len()))]
    pub fn new(name: impl Into<String>, linkage: Linkage, ret_ty: Ty, params: Vec<Param>) -> Self {
        let name = name.into();
        let next_value_id = params.iter().map(|p| p.id.0 as u32 + 1).max().unwrap_or(0);
        tracing::debug!(%name, ?linkage, "function shell created");
        Function {
            name,
            linkage,
            ret_ty,
            params,
            blocks: IdxVec::new(),
            value_names: HashMap::new(),
            attrs: FunctionAttrs::default(),
            next_value_id,
        }
    }

    /// Allocate a fresh SSA id, unique within this function.
    pub fn fresh_value_id(&mut self) -> ValueId {
        let id = ValueId(self.next_value_id as usize);
        self.next_value_id += 1;
        id
    }

    pub fn is_import(&self) -> bool {
        self.linkage == Linkage::Import
    }

    pub fn block_by_label(&self, label: &str) -> Option<BlockId> {
        self.blocks
            .iter_enumerated()
            .find(|(_, b)| b.label == label)
            .map(|(id, _)| id)
    }

    pub fn entry_block(&self) -> Option<BlockId> {
        self.blocks.indices().next()
    }
}
