//! Constant folding and absorbing-input simplification.
//!
//! This pass replaces instructions by the constant they compute:
//!
//! ## Static evaluation
//! Every input is a constant. Unary and binary arithmetic, conditions,
//! three-way compares and type conversions are evaluated with the run-time
//! semantics of the source language (see [`crate::ir::evaluate_binary`]).
//! A `DivZeroCheck` of a non-zero constant is dropped.
//!
//! ## Absorbing inputs
//! One input alone decides the result:
//! - `x * 0`, `x & 0`, `x & ~x`, `x ^ x`, `x - x` → `0` (integral only)
//! - `x | -1` → `-1`
//! - `0 << x`, `0 >> x`, `0 >>> x`, `0 ror x` → `0`
//! - `0 % x`, `x % 1`, `x % -1`, `x % x` → `0`
//! - `Above(0, x)`, `Below(x, 0)` → `false`;
//!   `AboveOrEqual(x, 0)`, `BelowOrEqual(0, x)` → `true`
//! - `Compare` against a NaN constant → the bias result
//! - `x == null` / `x != null` for a non-null `x` → `false` / `true`
//!
//! ## Branch propagation
//! An `If` on a boolean parameter, or on `x == c` / `x != c`, tells the
//! successors what `x` is. Uses of `x` dominated by the successor that
//! implies the value are rewritten to the constant. A successor that can also
//! be entered from somewhere other than the branch block is left alone: its
//! dominated region is not restricted to the branch outcome.

use tracing::trace;

use crate::{
    compiler::{context::PassContext, events::EventKind, pass::OptimizationPass},
    ir::{
        convert, evaluate_binary, evaluate_compare, evaluate_condition, evaluate_unary, BinaryOp,
        BlockId, ComparisonBias, ConditionKind, ConstValue, DataType, Graph, InstrId,
        InstructionCursor, InstructionKind, UnaryOp,
    },
    Result,
};

const NAME: &str = "constant_folding";

/// Constant folding pass.
///
/// Visits blocks in reverse post-order and each block front to back, so a
/// value folded early in a block can feed a fold later in the same block.
pub struct ConstantFoldingPass;

impl Default for ConstantFoldingPass {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantFoldingPass {
    /// Creates a new constant folding pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Rewrites one instruction. Returns `true` if the graph changed.
    fn visit(
        graph: &mut Graph,
        ctx: &PassContext,
        cursor: &mut InstructionCursor,
        id: InstrId,
    ) -> Result<bool> {
        if let Some(value) = static_evaluation(graph, id) {
            let constant = graph.constant(value, graph.instr(id).ty())?;
            trace!(%id, %value, "folded");
            ctx.record(EventKind::ConstantFolded, NAME, graph.name(), id);
            graph.replace_uses_with(id, constant);
            graph.remove_current(cursor)?;
            return Ok(true);
        }

        if let Some(input) = redundant_zero_check(graph, id) {
            trace!(%id, "dropped zero check of non-zero constant");
            ctx.record(EventKind::ConstantFolded, NAME, graph.name(), id);
            graph.replace_uses_with(id, input);
            graph.remove_current(cursor)?;
            return Ok(true);
        }

        if let Some(value) = absorbing_value(graph, id) {
            let constant = graph.constant(value, graph.instr(id).ty())?;
            trace!(%id, %value, "absorbed");
            ctx.record(EventKind::AbsorbingInputSimplified, NAME, graph.name(), id);
            graph.replace_uses_with(id, constant);
            graph.remove_current(cursor)?;
            return Ok(true);
        }

        let changed = matches!(graph.instr(id).kind(), InstructionKind::If)
            && propagate_branch_values(graph, ctx, id)?;
        cursor.advance(graph);
        Ok(changed)
    }
}

impl OptimizationPass for ConstantFoldingPass {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Folds constant expressions, absorbing inputs and branch-implied values"
    }

    fn run(&mut self, graph: &mut Graph, ctx: &mut PassContext) -> Result<bool> {
        graph.check_analyses()?;

        let mut changed = false;
        let order = graph.reverse_post_order().to_vec();
        for block in order {
            let mut cursor = InstructionCursor::new(graph, block);
            while let Some(id) = cursor.current() {
                changed |= Self::visit(graph, ctx, &mut cursor, id)?;
            }
        }
        Ok(changed)
    }
}

/// Evaluates an instruction whose inputs are all constants.
fn static_evaluation(graph: &Graph, id: InstrId) -> Option<ConstValue> {
    let instr = graph.instr(id);
    let ty = instr.ty();
    let constants = instr
        .inputs()
        .iter()
        .map(|&input| graph.instr(input).as_constant())
        .collect::<Option<Vec<_>>>()?;

    let value = match (*instr.kind(), constants.as_slice()) {
        (InstructionKind::Unary(op), [value]) => evaluate_unary(op, ty, *value)?,
        (InstructionKind::Binary(op), [lhs, rhs]) => evaluate_binary(op, ty, *lhs, *rhs)?,
        (InstructionKind::Condition { kind, bias }, [lhs, rhs]) => {
            ConstValue::Int(i32::from(evaluate_condition(kind, bias, *lhs, *rhs)?))
        }
        (InstructionKind::Compare { bias }, [lhs, rhs]) => {
            ConstValue::Int(evaluate_compare(bias, *lhs, *rhs)?)
        }
        (InstructionKind::TypeConversion, [value]) => convert(*value, ty)?,
        _ => return None,
    };
    value.fits(ty).then_some(value)
}

/// Returns the checked value of a `DivZeroCheck` that can never throw.
fn redundant_zero_check(graph: &Graph, id: InstrId) -> Option<InstrId> {
    let instr = graph.instr(id);
    if !matches!(instr.kind(), InstructionKind::DivZeroCheck) {
        return None;
    }
    let input = *instr.inputs().first()?;
    let value = graph.instr(input).as_constant()?;
    (value.as_i64()? != 0).then_some(input)
}

/// Builds the integral constant `value` in the representation of `ty`.
fn integral(ty: DataType, value: i64) -> Option<ConstValue> {
    let constant = match ty.kind() {
        DataType::Int32 => ConstValue::Int(value as i32),
        DataType::Int64 => ConstValue::Long(value),
        _ => return None,
    };
    let constant = constant.normalize(ty);
    constant.fits(ty).then_some(constant)
}

fn boolean(value: bool) -> Option<ConstValue> {
    Some(ConstValue::Int(i32::from(value)))
}

/// Finds the result of an instruction that one of its inputs decides alone.
fn absorbing_value(graph: &Graph, id: InstrId) -> Option<ConstValue> {
    let instr = graph.instr(id);
    let [lhs, rhs] = *instr.inputs() else {
        return None;
    };
    let ty = instr.ty();
    let lhs_const = graph.instr(lhs).as_constant();
    let rhs_const = graph.instr(rhs).as_constant();
    let is_zero = |c: Option<ConstValue>| c.and_then(|c| c.as_i64()) == Some(0);

    match *instr.kind() {
        InstructionKind::Binary(op) => {
            if !ty.is_integral() {
                return None;
            }
            match op {
                BinaryOp::Mul | BinaryOp::And if is_zero(lhs_const) || is_zero(rhs_const) => {
                    integral(ty, 0)
                }
                BinaryOp::And if is_complement_of(graph, lhs, rhs) => integral(ty, 0),
                BinaryOp::Or
                    if lhs_const.is_some_and(|c| c.is_minus_one())
                        || rhs_const.is_some_and(|c| c.is_minus_one()) =>
                {
                    integral(ty, -1)
                }
                BinaryOp::Xor | BinaryOp::Sub if lhs == rhs => integral(ty, 0),
                BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr | BinaryOp::Ror
                    if is_zero(lhs_const) =>
                {
                    integral(ty, 0)
                }
                BinaryOp::Rem
                    if is_zero(lhs_const)
                        || lhs == rhs
                        || rhs_const.is_some_and(|c| c.is_one() || c.is_minus_one()) =>
                {
                    integral(ty, 0)
                }
                _ => None,
            }
        }
        InstructionKind::Condition { kind, .. } => {
            if graph.instr(lhs).ty().is_integral() {
                match kind {
                    ConditionKind::Above if is_zero(lhs_const) => return boolean(false),
                    ConditionKind::Below if is_zero(rhs_const) => return boolean(false),
                    ConditionKind::AboveOrEqual if is_zero(rhs_const) => return boolean(true),
                    ConditionKind::BelowOrEqual if is_zero(lhs_const) => return boolean(true),
                    _ => {}
                }
            }
            let compared_with_null = match (lhs_const, rhs_const) {
                (Some(ConstValue::Null), None) => Some(rhs),
                (None, Some(ConstValue::Null)) => Some(lhs),
                _ => None,
            };
            let other = compared_with_null?;
            if graph.instr(other).can_be_null() || !graph.instr(other).ty().is_reference() {
                return None;
            }
            match kind {
                ConditionKind::Equal => boolean(false),
                ConditionKind::NotEqual => boolean(true),
                _ => None,
            }
        }
        InstructionKind::Compare { bias } => {
            let nan = lhs_const.is_some_and(|c| c.is_nan()) || rhs_const.is_some_and(|c| c.is_nan());
            if !nan {
                return None;
            }
            match bias {
                ComparisonBias::GtBias => Some(ConstValue::Int(1)),
                ComparisonBias::LtBias => Some(ConstValue::Int(-1)),
                ComparisonBias::NoBias => None,
            }
        }
        _ => None,
    }
}

/// Returns `true` if one operand is the bitwise complement of the other.
fn is_complement_of(graph: &Graph, a: InstrId, b: InstrId) -> bool {
    let negates = |not: InstrId, value: InstrId| {
        let instr = graph.instr(not);
        matches!(instr.kind(), InstructionKind::Unary(UnaryOp::Not))
            && instr.inputs().first() == Some(&value)
    };
    negates(a, b) || negates(b, a)
}

/// Propagates the values an `If` implies into the regions its successors dominate.
fn propagate_branch_values(graph: &mut Graph, ctx: &PassContext, branch: InstrId) -> Result<bool> {
    let Some(block) = graph.instr(branch).block() else {
        return Ok(false);
    };
    let [true_succ, false_succ] = *graph.block(block).successors() else {
        return Ok(false);
    };
    let Some(&condition) = graph.instr(branch).inputs().first() else {
        return Ok(false);
    };

    let cond = graph.instr(condition);
    if matches!(cond.kind(), InstructionKind::Parameter { .. }) && cond.ty() == DataType::Bool {
        let on_true = graph.constant(ConstValue::Int(1), DataType::Bool)?;
        let on_false = graph.constant(ConstValue::Int(0), DataType::Bool)?;
        let replaced = propagate(graph, ctx, block, true_succ, condition, on_true)
            + propagate(graph, ctx, block, false_succ, condition, on_false);
        return Ok(replaced > 0);
    }

    let equal = match cond.kind() {
        InstructionKind::Condition {
            kind: ConditionKind::Equal,
            ..
        } => true,
        InstructionKind::Condition {
            kind: ConditionKind::NotEqual,
            ..
        } => false,
        _ => return Ok(false),
    };
    let (Some(mut variable), Some(mut constant)) =
        (graph.least_constant_left(condition), graph.constant_right(condition))
    else {
        return Ok(false);
    };

    // `Compare(a, c) == 0` and `Compare(c, a) == 0` both mean `a == c`.
    if matches!(graph.instr(variable).kind(), InstructionKind::Compare { .. }) {
        if !graph.instr(constant).is_int_constant(0) {
            return Ok(false);
        }
        let [lhs, rhs] = *graph.instr(variable).inputs() else {
            return Ok(false);
        };
        (variable, constant) = if graph.instr(rhs).as_constant().is_some() {
            (lhs, rhs)
        } else if graph.instr(lhs).as_constant().is_some() {
            (rhs, lhs)
        } else {
            return Ok(false);
        };
    }

    let variable_ty = graph.instr(variable).ty();
    if graph.instr(variable).as_constant().is_some()
        || !(variable_ty.is_integral() || variable_ty.is_reference())
    {
        return Ok(false);
    }

    let (equal_succ, unequal_succ) = if equal {
        (true_succ, false_succ)
    } else {
        (false_succ, true_succ)
    };
    let mut replaced = propagate(graph, ctx, block, equal_succ, variable, constant);

    // A boolean that is not 0 is 1 and the other way round.
    if variable_ty == DataType::Bool {
        if let Some(value) = graph.instr(constant).as_constant().and_then(|c| c.as_int()) {
            if value == 0 || value == 1 {
                let opposite = graph.constant(ConstValue::Int(1 - value), DataType::Bool)?;
                replaced += propagate(graph, ctx, block, unequal_succ, variable, opposite);
            }
        }
    }
    Ok(replaced > 0)
}

/// Replaces the uses of `variable` dominated by `target` with `value`.
fn propagate(
    graph: &mut Graph,
    ctx: &PassContext,
    branch_block: BlockId,
    target: BlockId,
    variable: InstrId,
    value: InstrId,
) -> usize {
    if graph.block(target).predecessors() != [branch_block] {
        trace!(%target, %variable, "not propagating into shared successor");
        return 0;
    }
    let replaced = graph.replace_uses_dominated_by(variable, value, target);
    for _ in 0..replaced {
        ctx.record(EventKind::PropagatedIfValue, NAME, graph.name(), variable);
    }
    if replaced > 0 {
        trace!(%variable, %value, %target, replaced, "propagated branch value");
    }
    replaced
}
