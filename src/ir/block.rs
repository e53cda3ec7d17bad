//! Basic blocks.

use std::fmt;

use crate::ir::{InstrId, LoopId};

/// Identifier of a basic block.
///
/// Block ids form a dense index space into the graph's block table. A
/// removed block leaves a hole; ids are positions, not identities.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) u32);

impl BlockId {
    /// Creates a block id from a raw index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Returns the raw index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

/// A basic block: phis, a linked body of instructions and CFG edges.
///
/// For a block ending in `If`, successor 0 is the true target and successor 1
/// the false target.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub(crate) id: BlockId,
    pub(crate) phis: Vec<InstrId>,
    pub(crate) first: Option<InstrId>,
    pub(crate) last: Option<InstrId>,
    pub(crate) predecessors: Vec<BlockId>,
    pub(crate) successors: Vec<BlockId>,
    pub(crate) dominator: Option<BlockId>,
    pub(crate) dominated: Vec<BlockId>,
    pub(crate) loop_id: Option<LoopId>,
    pub(crate) is_catch: bool,
}

impl BasicBlock {
    pub(crate) fn new(id: BlockId) -> Self {
        Self {
            id,
            phis: Vec::new(),
            first: None,
            last: None,
            predecessors: Vec::new(),
            successors: Vec::new(),
            dominator: None,
            dominated: Vec::new(),
            loop_id: None,
            is_catch: false,
        }
    }

    /// Returns the block id.
    #[must_use]
    pub const fn id(&self) -> BlockId {
        self.id
    }

    /// Returns the phis of this block.
    #[must_use]
    pub fn phis(&self) -> &[InstrId] {
        &self.phis
    }

    /// Returns the first body instruction.
    #[must_use]
    pub const fn first_instruction(&self) -> Option<InstrId> {
        self.first
    }

    /// Returns the last body instruction, normally the control-flow instruction.
    #[must_use]
    pub const fn last_instruction(&self) -> Option<InstrId> {
        self.last
    }

    /// Returns the predecessors in edge order.
    #[must_use]
    pub fn predecessors(&self) -> &[BlockId] {
        &self.predecessors
    }

    /// Returns the successors in edge order.
    #[must_use]
    pub fn successors(&self) -> &[BlockId] {
        &self.successors
    }

    /// Returns the immediate dominator computed by the last rebuild.
    #[must_use]
    pub const fn dominator(&self) -> Option<BlockId> {
        self.dominator
    }

    /// Returns the blocks immediately dominated by this one.
    #[must_use]
    pub fn dominated_blocks(&self) -> &[BlockId] {
        &self.dominated
    }

    /// Returns the innermost loop containing this block.
    #[must_use]
    pub const fn loop_id(&self) -> Option<LoopId> {
        self.loop_id
    }

    /// Returns `true` for exception handler entry blocks.
    #[must_use]
    pub const fn is_catch_block(&self) -> bool {
        self.is_catch
    }

    /// Returns the position of `pred` among the predecessors.
    #[must_use]
    pub fn predecessor_index(&self, pred: BlockId) -> Option<usize> {
        self.predecessors.iter().position(|&p| p == pred)
    }

    /// Returns the single successor of a block ending in `Goto`.
    #[must_use]
    pub fn single_successor(&self) -> Option<BlockId> {
        match self.successors.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }
}
