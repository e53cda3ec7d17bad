//! Instruction nodes and their def-use records.

use std::fmt;

use crate::ir::{BlockId, ConstValue, DataType, InstructionKind, SideEffects};

/// Stable identifier of an instruction within its graph.
///
/// Ids are dense indices into the graph's instruction arena and are never
/// reused, even after the instruction is removed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId(pub(crate) u32);

impl InstrId {
    /// Creates an id from a raw arena index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Returns the raw arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}", self.0)
    }
}

impl fmt::Display for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}", self.0)
    }
}

/// A back-reference from a value to one input slot of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Use {
    /// The instruction that consumes the value.
    pub user: InstrId,
    /// The input (or environment) slot holding the value.
    pub slot: usize,
}

/// Snapshot of the values live at an instruction, used to rebuild interpreter
/// state on deoptimization.
///
/// Slots map to virtual registers; `None` marks a dead register.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    pub(crate) values: Vec<Option<InstrId>>,
}

impl Environment {
    /// Returns the recorded values.
    #[must_use]
    pub fn values(&self) -> &[Option<InstrId>] {
        &self.values
    }

    /// Returns the number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the snapshot has no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A node of the instruction graph.
///
/// Fields are private to the `ir` module: every change to inputs, uses,
/// placement or barrier metadata goes through [`crate::ir::Graph`], which
/// keeps both sides of each def-use edge in sync.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub(crate) id: InstrId,
    pub(crate) block: Option<BlockId>,
    pub(crate) kind: InstructionKind,
    pub(crate) ty: DataType,
    pub(crate) side_effects: SideEffects,
    pub(crate) inputs: Vec<InstrId>,
    pub(crate) uses: Vec<Use>,
    pub(crate) env_uses: Vec<Use>,
    pub(crate) environment: Option<Environment>,
    pub(crate) dex_pc: u32,
    pub(crate) prev: Option<InstrId>,
    pub(crate) next: Option<InstrId>,
}

impl Instruction {
    pub(crate) fn new(id: InstrId, kind: InstructionKind, ty: DataType, inputs: Vec<InstrId>) -> Self {
        Self {
            id,
            block: None,
            side_effects: kind.default_side_effects(),
            kind,
            ty,
            inputs,
            uses: Vec::new(),
            env_uses: Vec::new(),
            environment: None,
            dex_pc: 0,
            prev: None,
            next: None,
        }
    }

    /// Returns the instruction id.
    #[must_use]
    pub const fn id(&self) -> InstrId {
        self.id
    }

    /// Returns the owning block, or `None` once the instruction was removed.
    #[must_use]
    pub const fn block(&self) -> Option<BlockId> {
        self.block
    }

    /// Returns `true` while the instruction is part of a block.
    #[must_use]
    pub const fn is_attached(&self) -> bool {
        self.block.is_some()
    }

    /// Returns the op-kind.
    #[must_use]
    pub const fn kind(&self) -> &InstructionKind {
        &self.kind
    }

    /// Returns the declared result type.
    #[must_use]
    pub const fn ty(&self) -> DataType {
        self.ty
    }

    /// Returns the side-effect descriptor.
    #[must_use]
    pub const fn side_effects(&self) -> SideEffects {
        self.side_effects
    }

    /// Returns the ordered inputs.
    #[must_use]
    pub fn inputs(&self) -> &[InstrId] {
        &self.inputs
    }

    /// Returns input `slot`.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is out of range.
    #[must_use]
    pub fn input(&self, slot: usize) -> InstrId {
        self.inputs[slot]
    }

    /// Returns the regular (non-environment) uses.
    #[must_use]
    pub fn uses(&self) -> &[Use] {
        &self.uses
    }

    /// Returns the environment uses.
    #[must_use]
    pub fn env_uses(&self) -> &[Use] {
        &self.env_uses
    }

    /// Returns `true` if any instruction or environment refers to this value.
    #[must_use]
    pub fn has_uses(&self) -> bool {
        !self.uses.is_empty() || !self.env_uses.is_empty()
    }

    /// Returns `true` if exactly one regular use exists, ignoring environments.
    #[must_use]
    pub fn has_only_one_non_environment_use(&self) -> bool {
        self.uses.len() == 1
    }

    /// Returns the deoptimization snapshot, if any.
    #[must_use]
    pub const fn environment(&self) -> Option<&Environment> {
        self.environment.as_ref()
    }

    /// Returns the bytecode program counter this instruction was built from.
    #[must_use]
    pub const fn dex_pc(&self) -> u32 {
        self.dex_pc
    }

    /// Returns the previous instruction in the block body.
    #[must_use]
    pub const fn prev(&self) -> Option<InstrId> {
        self.prev
    }

    /// Returns the next instruction in the block body.
    #[must_use]
    pub const fn next(&self) -> Option<InstrId> {
        self.next
    }

    /// Returns `true` for phis.
    #[must_use]
    pub const fn is_phi(&self) -> bool {
        matches!(self.kind, InstructionKind::Phi)
    }

    /// Returns the constant value if this is a constant.
    #[must_use]
    pub const fn as_constant(&self) -> Option<ConstValue> {
        self.kind.as_constant()
    }

    /// Returns `true` if this is the integral constant `value`.
    #[must_use]
    pub fn is_int_constant(&self, value: i64) -> bool {
        self.as_constant()
            .and_then(|c| c.as_i64())
            .is_some_and(|v| v == value)
    }

    /// Returns `true` if this reference-typed value may be null.
    ///
    /// Non-reference values are never null.
    #[must_use]
    pub fn can_be_null(&self) -> bool {
        if !self.ty.is_reference() {
            return false;
        }
        match self.kind {
            InstructionKind::NullCheck
            | InstructionKind::NewInstance { .. }
            | InstructionKind::NewArray { .. }
            | InstructionKind::LoadClass { .. }
            | InstructionKind::RefreshedObject(_) => false,
            InstructionKind::Parameter { non_null, .. } => !non_null,
            InstructionKind::BoundType { can_be_null } => can_be_null,
            _ => true,
        }
    }
}
