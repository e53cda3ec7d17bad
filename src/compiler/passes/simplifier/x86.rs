//! x86 and x86-64 bit manipulation fusions (BMI1).

use crate::{
    compiler::passes::simplifier::{decrement_of, remove_if_unused, single_negated_operand},
    ir::{BinaryOp, Graph, InstrId, InstructionKind},
    target::{IsaFeatures, TargetConfig},
    Result,
};

pub(super) fn visit(graph: &mut Graph, target: &TargetConfig, id: InstrId) -> Result<bool> {
    if !target.has_feature(IsaFeatures::AVX2) && !target.has_feature(IsaFeatures::BMI) {
        return Ok(false);
    }
    let instr = graph.instr(id);
    if !instr.ty().is_int_or_long() {
        return Ok(false);
    }
    match instr.kind().as_binary() {
        Some(BinaryOp::And) => {
            if try_combine_and_not(graph, id)? {
                return Ok(true);
            }
            try_lowest_set_bit(graph, id, InstructionKind::ClearLowestSetBit)
        }
        Some(BinaryOp::Xor) => try_lowest_set_bit(graph, id, InstructionKind::MaskUpToLowestSetBit),
        _ => Ok(false),
    }
}

/// `x & ~y` → `ANDN y, x`.
fn try_combine_and_not(graph: &mut Graph, id: InstrId) -> Result<bool> {
    let Some((not, other)) = single_negated_operand(graph, id) else {
        return Ok(false);
    };
    let negated = graph.instr(not).input(0);
    let ty = graph.instr(id).ty();
    graph.replace_with_new(id, InstructionKind::AndNot, ty, vec![negated, other])?;
    remove_if_unused(graph, not)?;
    Ok(true)
}

/// `x & (x - 1)` → `BLSR x` and `x ^ (x - 1)` → `BLSMSK x`.
fn try_lowest_set_bit(graph: &mut Graph, id: InstrId, fused: InstructionKind) -> Result<bool> {
    let [left, right] = *graph.instr(id).inputs() else {
        return Ok(false);
    };
    let is_decrement_of = |value: InstrId, decrement: InstrId| {
        graph.instr(decrement).has_only_one_non_environment_use()
            && decrement_of(graph, decrement) == Some(value)
    };
    let (value, decrement) = if is_decrement_of(left, right) {
        (left, right)
    } else if is_decrement_of(right, left) {
        (right, left)
    } else {
        return Ok(false);
    };

    let ty = graph.instr(id).ty();
    graph.replace_with_new(id, fused, ty, vec![value])?;
    remove_if_unused(graph, decrement)?;
    Ok(true)
}
