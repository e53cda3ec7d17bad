//! RISC-V 64 fusions from the Zba and Zbb extensions.

use crate::{
    compiler::passes::simplifier::{remove_if_unused, try_merge_negated_input},
    ir::{BinaryOp, DataType, Graph, InstrId, InstructionKind},
    target::{IsaFeatures, TargetConfig},
    Result,
};

pub(super) fn visit(graph: &mut Graph, target: &TargetConfig, id: InstrId) -> Result<bool> {
    match graph.instr(id).kind().as_binary() {
        Some(BinaryOp::And | BinaryOp::Or | BinaryOp::Xor) if target.has_feature(IsaFeatures::ZBB) => {
            try_merge_negated_input(graph, id)
        }
        Some(BinaryOp::Add) if target.has_feature(IsaFeatures::ZBA) => try_shift_add(graph, id),
        _ => Ok(false),
    }
}

/// Returns the shifted value and distance of `Shl(x, 1..=3)`.
fn small_left_shift(graph: &Graph, id: InstrId) -> Option<(InstrId, u8)> {
    let instr = graph.instr(id);
    if !graph.is_binary(id, BinaryOp::Shl) || instr.ty() != DataType::Int64 {
        return None;
    }
    let [value, distance] = *instr.inputs() else {
        return None;
    };
    let distance = graph.instr(distance).as_constant()?.as_int()?;
    (1..=3).contains(&distance).then_some((value, distance as u8))
}

/// `Add(Shl(x, d), y)` → `SHdADD x, y` for 64-bit values.
///
/// Int32 additions are skipped: the fused form would need an extra sign
/// extension.
fn try_shift_add(graph: &mut Graph, id: InstrId) -> Result<bool> {
    let instr = graph.instr(id);
    if instr.ty() != DataType::Int64 {
        return Ok(false);
    }
    let [left, right] = *instr.inputs() else {
        return Ok(false);
    };
    // Adding a shift to itself keeps two independent shifts in flight.
    if left == right {
        return Ok(false);
    }
    let single_use_shift = |candidate: InstrId| {
        graph
            .instr(candidate)
            .has_only_one_non_environment_use()
            .then(|| small_left_shift(graph, candidate))
            .flatten()
    };
    let (shift, (shifted, distance), addend) = if let Some(found) = single_use_shift(left) {
        (left, found, right)
    } else if let Some(found) = single_use_shift(right) {
        (right, found, left)
    } else {
        return Ok(false);
    };

    graph.replace_with_new(
        id,
        InstructionKind::ShiftAdd { distance },
        DataType::Int64,
        vec![shifted, addend],
    )?;
    remove_if_unused(graph, shift)?;
    Ok(true)
}
