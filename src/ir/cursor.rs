//! Forward iteration over a block body that tolerates edits at the cursor.

use crate::{
    ir::{BlockId, Graph, InstrId},
    Result,
};

/// Walks the body of one block in program order.
///
/// The cursor remembers the successor of the current instruction before the
/// caller gets to mutate anything, so removing or replacing the current
/// instruction does not end the walk. Instructions inserted after the current
/// one are visited; instructions inserted before it are not.
#[derive(Debug, Clone, Copy)]
pub struct InstructionCursor {
    current: Option<InstrId>,
    next: Option<InstrId>,
}

impl InstructionCursor {
    /// Positions a cursor on the first body instruction of `block`.
    #[must_use]
    pub fn new(graph: &Graph, block: BlockId) -> Self {
        let current = graph.block(block).first_instruction();
        Self {
            current,
            next: current.and_then(|id| graph.instr(id).next()),
        }
    }

    /// Returns the instruction under the cursor.
    #[must_use]
    pub const fn current(&self) -> Option<InstrId> {
        self.current
    }

    /// Returns `true` once the walk is over.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.current.is_none()
    }

    /// Steps to the next instruction.
    ///
    /// If the current instruction is still attached, its live successor is
    /// used so that freshly inserted followers get visited. Otherwise the
    /// successor saved on the previous step takes over.
    pub fn advance(&mut self, graph: &Graph) {
        let next = match self.current {
            Some(id) if graph.instr(id).is_attached() => graph.instr(id).next(),
            _ => self.next,
        };
        // A saved successor may have been removed meanwhile.
        let next = next.filter(|&id| graph.instr(id).is_attached());
        self.current = next;
        self.next = next.and_then(|id| graph.instr(id).next());
    }
}

impl Graph {
    /// Removes the instruction under the cursor and advances past it.
    ///
    /// # Errors
    ///
    /// Returns an error if the instruction still has uses.
    pub fn remove_current(&mut self, cursor: &mut InstructionCursor) -> Result<()> {
        if let Some(id) = cursor.current {
            cursor.next = self.instr(id).next();
            self.remove_instruction(id)?;
        }
        cursor.advance(self);
        Ok(())
    }
}
