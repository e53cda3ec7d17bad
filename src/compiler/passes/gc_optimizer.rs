//! Read-barrier merging for back-to-back reference reads.
//!
//! With Baker read barriers every reference field read checks the holder's
//! mark state. Two adjacent reads of reference fields off the same object can
//! share one check: a [`RefreshedObject`](InstructionKind::RefreshedObject)
//! on the holder performs it once, and both reads then load from the
//! refreshed object without a barrier of their own.
//!
//! ```text
//! f1 = InstanceFieldGet [obj] (barrier)      r  = RefreshedObject [obj]
//! f2 = InstanceFieldGet [obj] (barrier)  =>  f1 = InstanceFieldGet [r]
//!                                            f2 = InstanceFieldGet [r]
//! ```
//!
//! Only pairs are merged. After a merge the scan restarts its pairing with
//! the next read, so three adjacent reads become one pair and a lone read.

use tracing::{debug, trace};

use crate::{
    compiler::{context::PassContext, events::EventKind, pass::OptimizationPass},
    ir::{DataType, Graph, InstrId, InstructionKind},
    Result,
};

const NAME: &str = "gc_optimizer";

/// Merges the read barriers of adjacent reference reads from one object.
pub struct GcOptimizerPass;

impl Default for GcOptimizerPass {
    fn default() -> Self {
        Self::new()
    }
}

impl GcOptimizerPass {
    /// Creates a new read-barrier merge pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Returns the holder of a reference field read that emits its own barrier.
    fn barrier_read_holder(graph: &Graph, id: InstrId) -> Option<InstrId> {
        let instr = graph.instr(id);
        match instr.kind() {
            InstructionKind::InstanceFieldGet {
                needs_read_barrier: true,
                ..
            } if instr.ty() == DataType::Reference => Some(instr.input(0)),
            _ => None,
        }
    }

    /// Returns `true` for field reads whose barrier was merged away.
    fn is_merged_read(graph: &Graph, id: InstrId) -> bool {
        matches!(
            graph.instr(id).kind(),
            InstructionKind::InstanceFieldGet {
                needs_read_barrier: false,
                ..
            }
        )
    }
}

impl OptimizationPass for GcOptimizerPass {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Lets adjacent reference reads from one object share a read barrier"
    }

    fn run(&mut self, graph: &mut Graph, ctx: &mut PassContext) -> Result<bool> {
        graph.check_analyses()?;
        if !ctx.target.supports_read_barrier_merge() {
            debug!(isa = %ctx.target.isa, "read barrier merging not supported");
            return Ok(false);
        }
        let state = ctx.target.read_barrier_state();

        let blocks = graph.reverse_post_order().to_vec();
        let mut changed = false;
        for block in blocks {
            let body: Vec<InstrId> = graph.instructions(block).collect();
            let mut prev: Option<InstrId> = None;
            for current in body {
                let pair = prev.and_then(|p| {
                    let holder = Self::barrier_read_holder(graph, p)?;
                    (Self::barrier_read_holder(graph, current) == Some(holder)).then_some((p, holder))
                });
                if let Some((first, holder)) = pair {
                    let refreshed = graph.insert_before(
                        first,
                        InstructionKind::RefreshedObject(state),
                        DataType::Reference,
                        vec![holder],
                    )?;
                    graph.set_dex_pc(refreshed, graph.instr(first).dex_pc());
                    for read in [first, current] {
                        graph.replace_input(read, 0, refreshed)?;
                        graph.set_needs_read_barrier(read, false)?;
                    }
                    trace!(%first, second = %current, %holder, "read barriers merged");
                    ctx.record(EventKind::ReadBarrierMerged, NAME, graph.name(), current);
                    changed = true;
                }

                prev = if Self::is_merged_read(graph, current) {
                    None
                } else {
                    Some(current)
                };
            }
        }
        Ok(changed)
    }
}
