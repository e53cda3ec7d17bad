//! AArch64 fusions.

use crate::{
    compiler::passes::simplifier::{remove_if_unused, try_merge_negated_input},
    ir::{AccumulateOp, DataType, Graph, InstrId, InstructionKind, VectorShape},
    target::TargetConfig,
    Result,
};

pub(super) fn visit(graph: &mut Graph, _target: &TargetConfig, id: InstrId) -> Result<bool> {
    match graph.instr(id).kind() {
        InstructionKind::Binary(_) => try_merge_negated_input(graph, id),
        InstructionKind::VecAdd(_) | InstructionKind::VecSub(_) => {
            try_combine_multiply_accumulate(graph, id)
        }
        _ => Ok(false),
    }
}

/// Lane types MLA / MLS accept.
fn supports_multiply_accumulate(shape: VectorShape) -> bool {
    matches!(
        shape.packed_type,
        DataType::Uint8 | DataType::Int8 | DataType::Uint16 | DataType::Int16 | DataType::Int32
    )
}

/// Folds a single-use `VecMul` into the `VecAdd` or `VecSub` consuming it.
///
/// `acc + a * b` and `a * b + acc` both fuse; `acc - a * b` fuses but
/// `a * b - acc` has no multiply-subtract form.
fn try_combine_multiply_accumulate(graph: &mut Graph, id: InstrId) -> Result<bool> {
    let instr = graph.instr(id);
    let (op, shape) = match *instr.kind() {
        InstructionKind::VecAdd(shape) => (AccumulateOp::Add, shape),
        InstructionKind::VecSub(shape) => (AccumulateOp::Sub, shape),
        _ => return Ok(false),
    };
    let [left, right] = *instr.inputs() else {
        return Ok(false);
    };
    if left == right {
        return Ok(false);
    }

    let is_mul = |candidate: InstrId| {
        let mul = graph.instr(candidate);
        matches!(mul.kind(), InstructionKind::VecMul(s) if supports_multiply_accumulate(*s))
            && mul.has_only_one_non_environment_use()
    };
    let (mul, accumulator) = if is_mul(right) {
        (right, left)
    } else if op == AccumulateOp::Add && is_mul(left) {
        (left, right)
    } else {
        return Ok(false);
    };

    let [mul_lhs, mul_rhs] = *graph.instr(mul).inputs() else {
        return Ok(false);
    };
    let ty = graph.instr(id).ty();
    graph.replace_with_new(
        id,
        InstructionKind::VecMultiplyAccumulate { op, shape },
        ty,
        vec![accumulator, mul_lhs, mul_rhs],
    )?;
    remove_if_unused(graph, mul)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compiler::passes::simplifier::tests::{negated_operand, simplify},
        ir::{BinaryOp, BlockId},
    };

    fn vector_graph(packed: DataType, sub: bool, mul_on_left: bool) -> (Graph, InstrId, InstrId) {
        let shape = VectorShape::new(packed, 4);
        let mut graph = Graph::new("mla");
        let entry: BlockId = graph.entry_block();
        let array = graph.add_parameter(DataType::Reference).unwrap();
        let index = graph.add_parameter(DataType::Int32).unwrap();
        let a = graph
            .append(entry, InstructionKind::VecLoad(shape), DataType::Float64, vec![array, index])
            .unwrap();
        let b = graph
            .append(entry, InstructionKind::VecLoad(shape), DataType::Float64, vec![array, index])
            .unwrap();
        let acc = graph
            .append(entry, InstructionKind::VecLoad(shape), DataType::Float64, vec![array, index])
            .unwrap();
        let mul = graph
            .append(entry, InstructionKind::VecMul(shape), DataType::Float64, vec![a, b])
            .unwrap();
        let kind = if sub {
            InstructionKind::VecSub(shape)
        } else {
            InstructionKind::VecAdd(shape)
        };
        let inputs = if mul_on_left { vec![mul, acc] } else { vec![acc, mul] };
        let combined = graph.append(entry, kind, DataType::Float64, inputs).unwrap();
        let store = graph
            .append(
                entry,
                InstructionKind::VecStore(shape),
                DataType::Void,
                vec![array, index, combined],
            )
            .unwrap();
        graph.append(entry, InstructionKind::ReturnVoid, DataType::Void, vec![]).unwrap();
        graph.set_exit_block(entry);
        (graph, mul, store)
    }

    #[test]
    fn bic_replaces_and_not() {
        let (mut graph, not, ret) = negated_operand(BinaryOp::And, DataType::Int64);
        let (changed, ctx) = simplify(&mut graph, TargetConfig::arm64());
        assert!(changed);
        assert!(!graph.instr(not).is_attached());
        let fused = graph.instr(ret).input(0);
        assert_eq!(
            *graph.instr(fused).kind(),
            InstructionKind::BitwiseNegatedRight(BinaryOp::And)
        );
        assert_eq!(ctx.events.len(), 1);
    }

    #[test]
    fn multiply_add_fuses() {
        let (mut graph, mul, store) = vector_graph(DataType::Int16, false, true);
        let (changed, _) = simplify(&mut graph, TargetConfig::arm64());
        assert!(changed);
        assert!(!graph.instr(mul).is_attached());
        let fused = graph.instr(store).input(2);
        assert!(matches!(
            graph.instr(fused).kind(),
            InstructionKind::VecMultiplyAccumulate {
                op: AccumulateOp::Add,
                ..
            }
        ));
        assert_eq!(graph.instr(fused).inputs().len(), 3);
    }

    #[test]
    fn product_minus_accumulator_is_kept() {
        let (mut graph, mul, _) = vector_graph(DataType::Int32, true, true);
        let (changed, _) = simplify(&mut graph, TargetConfig::arm64());
        assert!(!changed);
        assert!(graph.instr(mul).is_attached());
    }

    #[test]
    fn wide_lanes_are_not_fused() {
        let (mut graph, mul, _) = vector_graph(DataType::Int64, false, false);
        let (changed, _) = simplify(&mut graph, TargetConfig::arm64());
        assert!(!changed);
        assert!(graph.instr(mul).is_attached());
    }
}
