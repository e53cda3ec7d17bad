//! Loop-invariant operand regrouping.
//!
//! For an associative and commutative operation nested as
//! `op(op(a, b), inv)` where `inv` and one of `a`, `b` are loop invariant,
//! the operands are exchanged so that the two invariant values meet in the
//! inner operation:
//!
//! ```text
//! t = a + b        // b invariant, a varies
//! u = t + inv      // inv invariant
//! ```
//!
//! becomes
//!
//! ```text
//! t = inv + b      // fully invariant, hoistable
//! u = t + a
//! ```
//!
//! Nothing is hoisted here; the rewrite only shapes the expression tree for a
//! later code motion pass.

use tracing::trace;

use crate::{
    compiler::{context::PassContext, events::EventKind, pass::OptimizationPass},
    ir::{BinaryOp, BlockId, Graph, InstrId, InstructionCursor, InstructionKind, LoopId},
    Result,
};

const NAME: &str = "licg";

/// Operand regrouping pass for loop-invariant code motion.
pub struct LicgPass {
    swaps_at_current_position: usize,
}

impl Default for LicgPass {
    fn default() -> Self {
        Self::new()
    }
}

impl LicgPass {
    /// Creates a new regrouping pass.
    #[must_use]
    pub fn new() -> Self {
        Self {
            swaps_at_current_position: 0,
        }
    }

    /// Rescans `block` until no swap happens or the swap cap is reached.
    fn visit_block(&mut self, graph: &mut Graph, ctx: &PassContext, block: BlockId) -> Result<bool> {
        let cap = ctx.config.max_same_position_swaps;
        let mut changed = false;
        self.swaps_at_current_position = 0;
        loop {
            let mut swapped = false;
            let mut cursor = InstructionCursor::new(graph, block);
            while let Some(id) = cursor.current() {
                if try_swap_operands(graph, id)? {
                    trace!(%id, %block, "regrouped invariant operands");
                    ctx.record(EventKind::LoopInvariantRegrouped, NAME, graph.name(), id);
                    self.swaps_at_current_position += 1;
                    swapped = true;
                }
                cursor.advance(graph);
            }
            changed |= swapped;
            if !swapped || self.swaps_at_current_position >= cap {
                break;
            }
        }
        Ok(changed)
    }
}

impl OptimizationPass for LicgPass {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Regroups associative operands so loop-invariant values are computed together"
    }

    fn run(&mut self, graph: &mut Graph, ctx: &mut PassContext) -> Result<bool> {
        graph.check_analyses()?;

        // Post-order reaches inner loop headers before the loops around them.
        let loops: Vec<LoopId> = graph
            .post_order()
            .filter_map(|block| {
                graph
                    .loop_of(block)
                    .filter(|info| info.header() == block)
                    .map(|info| info.id())
            })
            .collect();

        let mut changed = false;
        for loop_id in loops {
            let info = graph.loop_info(loop_id);
            if info.contains_irreducible_loop() {
                continue;
            }
            let blocks: Vec<BlockId> = info
                .blocks()
                .iter()
                .map(BlockId::new)
                .filter(|&b| graph.block(b).loop_id() == Some(loop_id))
                .collect();
            for block in blocks {
                changed |= self.visit_block(graph, ctx, block)?;
            }
        }
        Ok(changed)
    }
}

/// Returns `true` for values a code motion pass could compute before the
/// loop around them.
fn is_swap_candidate(graph: &Graph, id: InstrId) -> bool {
    match graph.instr(id).block().and_then(|b| graph.block(b).loop_id()) {
        None => true,
        Some(loop_id) => graph.inputs_defined_outside_loop(id, loop_id),
    }
}

fn regroupable(op: BinaryOp) -> bool {
    matches!(
        op,
        BinaryOp::Add | BinaryOp::Mul | BinaryOp::And | BinaryOp::Or | BinaryOp::Xor | BinaryOp::Min | BinaryOp::Max
    )
}

/// Regroups the operands of `id` if it matches the pattern.
fn try_swap_operands(graph: &mut Graph, id: InstrId) -> Result<bool> {
    let instr = graph.instr(id);
    let InstructionKind::Binary(op) = *instr.kind() else {
        return Ok(false);
    };
    if !regroupable(op) || !instr.ty().is_integral() {
        return Ok(false);
    }
    let [left, right] = *instr.inputs() else {
        return Ok(false);
    };

    let (invariant, invariant_slot, inner) =
        if graph.is_binary(left, op) && is_swap_candidate(graph, right) {
            (right, 1, left)
        } else if is_swap_candidate(graph, left) && graph.is_binary(right, op) {
            (left, 0, right)
        } else {
            return Ok(false);
        };

    let [inner_left, inner_right] = *graph.instr(inner).inputs() else {
        return Ok(false);
    };
    let (dependant, dependant_slot) = match (
        is_swap_candidate(graph, inner_left),
        is_swap_candidate(graph, inner_right),
    ) {
        (false, true) => (inner_left, 0),
        (true, false) => (inner_right, 1),
        _ => return Ok(false),
    };

    // The inner result must not be observed anywhere else.
    if !graph.instr(inner).has_only_one_non_environment_use() {
        return Ok(false);
    }

    // The inner operation can only follow a body instruction of the outer one's block.
    let same_block = graph.instr(invariant).block() == graph.instr(id).block();
    let needs_move = !graph.strictly_dominates(invariant, inner);
    if needs_move && (!same_block || graph.instr(invariant).is_phi()) {
        return Ok(false);
    }

    if needs_move {
        graph.move_after(inner, invariant)?;
    }
    graph.replace_input(inner, dependant_slot, invariant)?;
    graph.replace_input(id, invariant_slot, dependant)?;
    Ok(true)
}
