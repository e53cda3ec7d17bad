//! Integration tests for target-specific instruction fusion.

use optigraph::{ir::AccumulateOp, prelude::*};

/// `return x <op> ~y` over `ty`.
fn negated_operand(op: BinaryOp, ty: DataType) -> Result<(Graph, InstrId, InstrId)> {
    let mut graph = Graph::new("negated");
    let entry = graph.entry_block();
    let x = graph.add_parameter(ty)?;
    let y = graph.add_parameter(ty)?;
    let not = graph.append(entry, InstructionKind::Unary(UnaryOp::Not), ty, vec![y])?;
    let result = graph.append(entry, InstructionKind::Binary(op), ty, vec![x, not])?;
    let ret = graph.append(entry, InstructionKind::Return, DataType::Void, vec![result])?;
    graph.set_exit_block(entry);
    Ok((graph, not, ret))
}

fn simplify(graph: &mut Graph, target: TargetConfig) -> Result<(bool, PassContext)> {
    graph.rebuild_analyses()?;
    let mut ctx = PassContext::new(target, PipelineConfig::default());
    let changed = InstructionSimplifierArchPass::new().run(graph, &mut ctx)?;
    graph.verify()?;
    Ok((changed, ctx))
}

fn fused_kind(graph: &Graph, ret: InstrId) -> InstructionKind {
    *graph.instr(graph.instr(ret).input(0)).kind()
}

#[test]
fn test_and_not_across_targets() -> Result<()> {
    let cases = [
        (
            TargetConfig::arm64(),
            Some(InstructionKind::BitwiseNegatedRight(BinaryOp::And)),
        ),
        (TargetConfig::x86_64(IsaFeatures::BMI), Some(InstructionKind::AndNot)),
        (TargetConfig::x86(IsaFeatures::AVX2), Some(InstructionKind::AndNot)),
        (
            TargetConfig::riscv64(IsaFeatures::ZBB),
            Some(InstructionKind::BitwiseNegatedRight(BinaryOp::And)),
        ),
        (TargetConfig::x86_64(IsaFeatures::empty()), None),
        (TargetConfig::riscv64(IsaFeatures::ZBA), None),
        (TargetConfig::thumb2(), None),
    ];

    for (target, expected) in cases {
        let (mut graph, not, ret) = negated_operand(BinaryOp::And, DataType::Int32)?;
        let (changed, ctx) = simplify(&mut graph, target)?;
        assert_eq!(changed, expected.is_some(), "{}", target.isa);
        match expected {
            Some(kind) => {
                assert_eq!(fused_kind(&graph, ret), kind, "{}", target.isa);
                assert!(!graph.instr(not).is_attached());
                assert_eq!(ctx.events.count_kind(EventKind::ArchSimplification), 1);
            }
            None => {
                assert!(graph.instr(not).is_attached());
                assert!(ctx.events.is_empty());
            }
        }
    }
    Ok(())
}

#[test]
fn test_and_not_operand_order() -> Result<()> {
    let (mut graph, not, ret) = negated_operand(BinaryOp::And, DataType::Int64)?;
    let y = graph.instr(not).input(0);
    let x = graph.parameters()[0];
    simplify(&mut graph, TargetConfig::x86_64(IsaFeatures::BMI))?;

    // ANDN negates its first operand.
    let fused = graph.instr(ret).input(0);
    assert_eq!(graph.instr(fused).inputs(), &[y, x]);

    let (mut graph, not, ret) = negated_operand(BinaryOp::Or, DataType::Int64)?;
    let y = graph.instr(not).input(0);
    let x = graph.parameters()[0];
    simplify(&mut graph, TargetConfig::arm64())?;

    // ORN negates its second operand.
    let fused = graph.instr(ret).input(0);
    assert_eq!(graph.instr(fused).inputs(), &[x, y]);
    Ok(())
}

#[test]
fn test_shared_complement_is_not_fused() -> Result<()> {
    let mut graph = Graph::new("shared");
    let entry = graph.entry_block();
    let x = graph.add_parameter(DataType::Int32)?;
    let y = graph.add_parameter(DataType::Int32)?;
    let not = graph.append(entry, InstructionKind::Unary(UnaryOp::Not), DataType::Int32, vec![y])?;
    let and = graph.append(
        entry,
        InstructionKind::Binary(BinaryOp::And),
        DataType::Int32,
        vec![x, not],
    )?;
    let both = graph.append(
        entry,
        InstructionKind::Binary(BinaryOp::Add),
        DataType::Int32,
        vec![and, not],
    )?;
    graph.append(entry, InstructionKind::Return, DataType::Void, vec![both])?;
    graph.set_exit_block(entry);

    let (changed, _) = simplify(&mut graph, TargetConfig::arm64())?;
    assert!(!changed);
    assert_eq!(*graph.instr(and).kind(), InstructionKind::Binary(BinaryOp::And));
    assert_eq!(graph.instr(not).uses().len(), 2);
    Ok(())
}

#[test]
fn test_environment_keeps_the_intermediate_alive() -> Result<()> {
    let (mut graph, not, ret) = negated_operand(BinaryOp::Xor, DataType::Int32)?;
    let check = graph.insert_before(ret, InstructionKind::SuspendCheck, DataType::Void, vec![])?;
    graph.set_environment(check, vec![Some(not), None])?;

    let (changed, _) = simplify(&mut graph, TargetConfig::arm64())?;
    assert!(changed);
    assert_eq!(
        fused_kind(&graph, ret),
        InstructionKind::BitwiseNegatedRight(BinaryOp::Xor)
    );
    // The deoptimization snapshot still records the complement.
    assert!(graph.instr(not).is_attached());
    assert_eq!(graph.instr(not).env_uses().len(), 1);
    assert!(graph.instr(not).uses().is_empty());
    Ok(())
}

#[test]
fn test_lowest_set_bit_on_x86() -> Result<()> {
    let mut graph = Graph::new("blsr");
    let entry = graph.entry_block();
    let x = graph.add_parameter(DataType::Int64)?;
    let one = graph.long_constant(1)?;
    let decrement = graph.append(
        entry,
        InstructionKind::Binary(BinaryOp::Sub),
        DataType::Int64,
        vec![x, one],
    )?;
    let and = graph.append(
        entry,
        InstructionKind::Binary(BinaryOp::And),
        DataType::Int64,
        vec![x, decrement],
    )?;
    let ret = graph.append(entry, InstructionKind::Return, DataType::Void, vec![and])?;
    graph.set_exit_block(entry);

    let (changed, _) = simplify(&mut graph, TargetConfig::x86_64(IsaFeatures::BMI))?;
    assert!(changed);
    assert_eq!(fused_kind(&graph, ret), InstructionKind::ClearLowestSetBit);
    assert_eq!(graph.instr(graph.instr(ret).input(0)).inputs(), &[x]);
    assert!(!graph.instr(decrement).is_attached());
    Ok(())
}

#[test]
fn test_scaled_index_on_riscv64() -> Result<()> {
    let mut graph = Graph::new("sh2add");
    let entry = graph.entry_block();
    let base = graph.add_parameter(DataType::Int64)?;
    let index = graph.add_parameter(DataType::Int64)?;
    let two = graph.int_constant(2)?;
    let shl = graph.append(
        entry,
        InstructionKind::Binary(BinaryOp::Shl),
        DataType::Int64,
        vec![index, two],
    )?;
    let add = graph.append(
        entry,
        InstructionKind::Binary(BinaryOp::Add),
        DataType::Int64,
        vec![shl, base],
    )?;
    let ret = graph.append(entry, InstructionKind::Return, DataType::Void, vec![add])?;
    graph.set_exit_block(entry);

    let (changed, ctx) = simplify(&mut graph, TargetConfig::riscv64(IsaFeatures::ZBA | IsaFeatures::ZBB))?;
    assert!(changed);
    assert_eq!(fused_kind(&graph, ret), InstructionKind::ShiftAdd { distance: 2 });
    let fused = graph.instr(ret).input(0);
    assert_eq!(graph.instr(fused).inputs(), &[index, base]);
    assert!(!graph.instr(shl).is_attached());
    assert_eq!(ctx.events.count_kind(EventKind::ArchSimplification), 1);
    Ok(())
}

#[test]
fn test_vector_multiply_subtract() -> Result<()> {
    let shape = VectorShape::new(DataType::Int8, 16);
    let mut graph = Graph::new("mls");
    let entry = graph.entry_block();
    let array = graph.add_parameter(DataType::Reference)?;
    let index = graph.add_parameter(DataType::Int32)?;
    let load = |graph: &mut Graph| {
        graph.append(entry, InstructionKind::VecLoad(shape), DataType::Float64, vec![array, index])
    };
    let acc = load(&mut graph)?;
    let a = load(&mut graph)?;
    let b = load(&mut graph)?;
    let mul = graph.append(entry, InstructionKind::VecMul(shape), DataType::Float64, vec![a, b])?;
    let sub = graph.append(entry, InstructionKind::VecSub(shape), DataType::Float64, vec![acc, mul])?;
    let store = graph.append(
        entry,
        InstructionKind::VecStore(shape),
        DataType::Void,
        vec![array, index, sub],
    )?;
    graph.append(entry, InstructionKind::ReturnVoid, DataType::Void, vec![])?;
    graph.set_exit_block(entry);

    assert!(!simplify(&mut graph, TargetConfig::x86_64(IsaFeatures::AVX2))?.0);
    assert!(simplify(&mut graph, TargetConfig::arm64())?.0);

    let fused = graph.instr(store).input(2);
    assert_eq!(
        *graph.instr(fused).kind(),
        InstructionKind::VecMultiplyAccumulate {
            op: AccumulateOp::Sub,
            shape
        }
    );
    assert_eq!(graph.instr(fused).inputs(), &[acc, a, b]);
    assert!(!graph.instr(mul).is_attached());
    Ok(())
}
