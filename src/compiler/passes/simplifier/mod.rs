//! Target-specific instruction fusion.
//!
//! Each supported instruction set gets a visitor that recognizes pairs of
//! generic instructions its hardware executes as one:
//!
//! | Target | Fusions | Gate |
//! |--------|---------|------|
//! | arm64 | BIC / ORN / EON, vector multiply-accumulate | none |
//! | x86, x86_64 | ANDN, BLSR, BLSMSK | `AVX2` or `BMI` |
//! | riscv64 | ANDN / ORN / XNOR | `ZBB` |
//! | riscv64 | SH1ADD / SH2ADD / SH3ADD | `ZBA` |
//!
//! A fusion folds an intermediate value into its consumer. The intermediate
//! must have exactly one non-environment use, so the fused instruction never
//! recomputes something another instruction still needs. After the fusion
//! the intermediate is removed only if nothing, not even a deoptimization
//! environment, refers to it any more.

mod arm64;
mod riscv64;
mod x86;

use tracing::{debug, trace};

use crate::{
    compiler::{context::PassContext, events::EventKind, pass::OptimizationPass},
    ir::{BinaryOp, Graph, InstrId, InstructionCursor, InstructionKind, UnaryOp},
    target::{InstructionSet, TargetConfig},
    Result,
};

const NAME: &str = "instruction_simplifier_arch";

/// Rewrites one instruction for a target. Returns `true` on a fusion.
type Visitor = fn(&mut Graph, &TargetConfig, InstrId) -> Result<bool>;

/// Target-specific instruction simplifier.
///
/// Returns `false` without touching the graph on targets that have no
/// fusions.
pub struct InstructionSimplifierArchPass;

impl Default for InstructionSimplifierArchPass {
    fn default() -> Self {
        Self::new()
    }
}

impl InstructionSimplifierArchPass {
    /// Creates a new target simplifier pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn visitor_for(isa: InstructionSet) -> Option<Visitor> {
        match isa {
            InstructionSet::Arm64 => Some(arm64::visit),
            InstructionSet::X86 | InstructionSet::X86_64 => Some(x86::visit),
            InstructionSet::Riscv64 => Some(riscv64::visit),
            InstructionSet::Arm | InstructionSet::Thumb2 | InstructionSet::None => None,
        }
    }
}

impl OptimizationPass for InstructionSimplifierArchPass {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Fuses instruction pairs into target-specific instructions"
    }

    fn run(&mut self, graph: &mut Graph, ctx: &mut PassContext) -> Result<bool> {
        let Some(visit) = Self::visitor_for(ctx.target.isa) else {
            debug!(isa = %ctx.target.isa, "no target simplifications");
            return Ok(false);
        };
        graph.check_analyses()?;

        let mut changed = false;
        let order = graph.reverse_post_order().to_vec();
        for block in order {
            let mut cursor = InstructionCursor::new(graph, block);
            while let Some(id) = cursor.current() {
                if visit(graph, &ctx.target, id)? {
                    trace!(%id, isa = %ctx.target.isa, "fused");
                    ctx.record(EventKind::ArchSimplification, NAME, graph.name(), id);
                    changed = true;
                }
                cursor.advance(graph);
            }
        }
        Ok(changed)
    }
}

/// Removes a fused-away intermediate once nothing refers to it.
fn remove_if_unused(graph: &mut Graph, id: InstrId) -> Result<()> {
    if graph.instr(id).is_attached() && !graph.instr(id).has_uses() {
        graph.remove_instruction(id)?;
    }
    Ok(())
}

fn is_not(graph: &Graph, id: InstrId) -> bool {
    matches!(graph.instr(id).kind(), InstructionKind::Unary(UnaryOp::Not))
}

/// Returns `(not, other)` when exactly one operand of the two-input
/// instruction `id` is a single-use bitwise complement.
///
/// Two complements are left alone; De Morgan rewriting handles that shape
/// better than a negated-operand instruction.
fn single_negated_operand(graph: &Graph, id: InstrId) -> Option<(InstrId, InstrId)> {
    let [left, right] = *graph.instr(id).inputs() else {
        return None;
    };
    let (not, other) = match (is_not(graph, left), is_not(graph, right)) {
        (true, false) => (left, right),
        (false, true) => (right, left),
        _ => return None,
    };
    graph
        .instr(not)
        .has_only_one_non_environment_use()
        .then_some((not, other))
}

/// Rewrites `And`/`Or`/`Xor` with one complemented operand into
/// [`InstructionKind::BitwiseNegatedRight`].
fn try_merge_negated_input(graph: &mut Graph, id: InstrId) -> Result<bool> {
    let instr = graph.instr(id);
    let InstructionKind::Binary(op) = *instr.kind() else {
        return Ok(false);
    };
    if !op.is_bitwise() || !instr.ty().is_int_or_long() {
        return Ok(false);
    }
    let Some((not, other)) = single_negated_operand(graph, id) else {
        return Ok(false);
    };

    let negated = graph.instr(not).input(0);
    let ty = graph.instr(id).ty();
    graph.replace_with_new(id, InstructionKind::BitwiseNegatedRight(op), ty, vec![other, negated])?;
    remove_if_unused(graph, not)?;
    Ok(true)
}

/// Returns `x` if `id` computes `x - 1` as `Add(x, -1)` or `Sub(x, 1)`.
fn decrement_of(graph: &Graph, id: InstrId) -> Option<InstrId> {
    let instr = graph.instr(id);
    let [lhs, rhs] = *instr.inputs() else {
        return None;
    };
    match instr.kind().as_binary()? {
        BinaryOp::Add => {
            let constant = graph.constant_right(id)?;
            let value = graph.least_constant_left(id)?;
            graph.instr(constant).is_int_constant(-1).then_some(value)
        }
        BinaryOp::Sub => graph.instr(rhs).is_int_constant(1).then_some(lhs),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        compiler::config::PipelineConfig,
        ir::{BlockId, DataType},
    };

    /// Runs the pass over a single-block graph and verifies the result.
    pub(crate) fn simplify(graph: &mut Graph, target: TargetConfig) -> (bool, PassContext) {
        graph.rebuild_analyses().unwrap();
        let mut ctx = PassContext::new(target, PipelineConfig::default());
        let changed = InstructionSimplifierArchPass::new().run(graph, &mut ctx).unwrap();
        graph.verify().unwrap();
        (changed, ctx)
    }

    /// Builds `op(x, Not(y))` followed by a return of the result.
    pub(crate) fn negated_operand(op: BinaryOp, ty: DataType) -> (Graph, InstrId, InstrId) {
        let mut graph = Graph::new("negated");
        let entry: BlockId = graph.entry_block();
        let x = graph.add_parameter(ty).unwrap();
        let y = graph.add_parameter(ty).unwrap();
        let not = graph
            .append(entry, InstructionKind::Unary(UnaryOp::Not), ty, vec![y])
            .unwrap();
        let result = graph
            .append(entry, InstructionKind::Binary(op), ty, vec![x, not])
            .unwrap();
        let ret = graph
            .append(entry, InstructionKind::Return, DataType::Void, vec![result])
            .unwrap();
        graph.set_exit_block(entry);
        (graph, not, ret)
    }

    #[test]
    fn targets_without_fusions_do_nothing() {
        let (mut graph, not, _) = negated_operand(BinaryOp::And, DataType::Int32);
        let (changed, ctx) = simplify(&mut graph, TargetConfig::thumb2());
        assert!(!changed);
        assert!(graph.instr(not).is_attached());
        assert!(ctx.events.is_empty());
    }

    #[test]
    fn double_complement_is_left_alone() {
        let mut graph = Graph::new("demorgan");
        let entry = graph.entry_block();
        let x = graph.add_parameter(DataType::Int32).unwrap();
        let y = graph.add_parameter(DataType::Int32).unwrap();
        let not = InstructionKind::Unary(UnaryOp::Not);
        let nx = graph.append(entry, not, DataType::Int32, vec![x]).unwrap();
        let ny = graph.append(entry, not, DataType::Int32, vec![y]).unwrap();
        let or = graph
            .append(entry, InstructionKind::Binary(BinaryOp::Or), DataType::Int32, vec![nx, ny])
            .unwrap();
        graph.append(entry, InstructionKind::Return, DataType::Void, vec![or]).unwrap();

        let (changed, _) = simplify(&mut graph, TargetConfig::arm64());
        assert!(!changed);
        assert!(graph.instr(or).is_attached());
    }
}
