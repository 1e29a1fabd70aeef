use il_utils::define_idx;

define_idx!(
    /// A basic block, indexed within the [`crate::function::Function`] that owns it.
    pub struct BlockId
);

define_idx!(
    /// An SSA identifier, indexed within the [`crate::function::Function`] that owns it.
    ///
    /// Assigned both to instruction results and to block parameters; spec §3
    /// requires every such id to be unique within its function.
    pub struct ValueId
);

define_idx!(
    /// A function, indexed within the [`crate::module::Module`] that owns it.
    pub struct FuncId
);
