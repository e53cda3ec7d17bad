//! Textual dump of a graph, used in logs and test failure messages.

use std::fmt;

use crate::ir::{Graph, InstrId};

impl Graph {
    fn fmt_instruction(&self, f: &mut fmt::Formatter<'_>, id: InstrId) -> fmt::Result {
        let instr = self.instr(id);
        write!(f, "    {id}: {} = {:?}", instr.ty(), instr.kind())?;
        for (slot, input) in instr.inputs().iter().enumerate() {
            let sep = if slot == 0 { " " } else { ", " };
            write!(f, "{sep}{input}")?;
        }
        if let Some(env) = instr.environment() {
            write!(f, " env[")?;
            for (slot, value) in env.values().iter().enumerate() {
                if slot > 0 {
                    write!(f, ", ")?;
                }
                match value {
                    Some(v) => write!(f, "{v}")?,
                    None => write!(f, "_")?,
                }
            }
            write!(f, "]")?;
        }
        writeln!(f)
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Graph {} ({} blocks, {} loops):",
            self.name(),
            self.block_ids().count(),
            self.loops().len()
        )?;

        for id in self.block_ids() {
            let block = self.block(id);
            write!(f, "  {id}")?;
            if id == self.entry_block() {
                write!(f, " [entry]")?;
            }
            if Some(id) == self.exit_block() {
                write!(f, " [exit]")?;
            }
            if block.is_catch_block() {
                write!(f, " [catch]")?;
            }
            write!(f, " preds={:?} succs={:?}", block.predecessors(), block.successors())?;
            if let Some(dom) = block.dominator() {
                write!(f, " idom={dom}")?;
            }
            if let Some(l) = block.loop_id() {
                write!(f, " loop={l}")?;
            }
            writeln!(f)?;

            for &phi in block.phis() {
                self.fmt_instruction(f, phi)?;
            }
            for instr in self.instructions(id) {
                self.fmt_instruction(f, instr)?;
            }
        }
        Ok(())
    }
}
