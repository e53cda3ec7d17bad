//! Integration tests for constant folding.
//!
//! Covers static evaluation with managed-runtime arithmetic, absorbing
//! inputs, and values implied by a branch condition in the successors the
//! branch dominates.

use optigraph::prelude::*;
use proptest::prelude::*;

fn fold(graph: &mut Graph) -> Result<(bool, PassContext)> {
    graph.rebuild_analyses()?;
    let mut ctx = PassContext::new(TargetConfig::arm64(), PipelineConfig::default());
    let changed = ConstantFoldingPass::new().run(graph, &mut ctx)?;
    graph.verify()?;
    Ok((changed, ctx))
}

/// Builds `return op(lhs, rhs)` over two constants and folds it.
fn fold_binary(op: BinaryOp, lhs: ConstValue, rhs: ConstValue, ty: DataType) -> Result<Option<ConstValue>> {
    let mut graph = Graph::new("binary");
    let entry = graph.entry_block();
    let rhs_ty = if op.is_shift() { DataType::Int32 } else { ty };
    let a = graph.constant(lhs, ty)?;
    let b = graph.constant(rhs, rhs_ty)?;
    let result = graph.append(entry, InstructionKind::Binary(op), ty, vec![a, b])?;
    let ret = graph.append(entry, InstructionKind::Return, DataType::Void, vec![result])?;
    graph.set_exit_block(entry);
    fold(&mut graph)?;
    Ok(graph.instr(graph.instr(ret).input(0)).as_constant())
}

/// `entry: if (x == c) then left else right`, each arm returning `arm(x)`.
struct Branch {
    graph: Graph,
    x: InstrId,
    left_ret: InstrId,
    right_ret: InstrId,
}

fn branch_on_equality(kind: ConditionKind, ty: DataType, constant: i32) -> Result<Branch> {
    let mut graph = Graph::new("branch");
    let entry = graph.entry_block();
    let left = graph.add_block();
    let right = graph.add_block();
    let exit = graph.add_block();
    graph.add_edge(entry, left)?;
    graph.add_edge(entry, right)?;
    graph.add_edge(left, exit)?;
    graph.add_edge(right, exit)?;

    let x = graph.add_parameter(ty)?;
    let c = graph.constant(ConstValue::Int(constant), ty)?;
    let one = graph.constant(ConstValue::Int(1), ty)?;
    let test = graph.append(
        entry,
        InstructionKind::Condition {
            kind,
            bias: ComparisonBias::NoBias,
        },
        DataType::Bool,
        vec![x, c],
    )?;
    graph.append(entry, InstructionKind::If, DataType::Void, vec![test])?;

    let sum = graph.append(left, InstructionKind::Binary(BinaryOp::Add), ty, vec![x, one])?;
    let left_ret = graph.append(left, InstructionKind::Return, DataType::Void, vec![sum])?;
    let right_ret = graph.append(right, InstructionKind::Return, DataType::Void, vec![x])?;
    graph.set_exit_block(exit);
    Ok(Branch {
        graph,
        x,
        left_ret,
        right_ret,
    })
}

fn returned(graph: &Graph, ret: InstrId) -> Option<ConstValue> {
    graph.instr(graph.instr(ret).input(0)).as_constant()
}

/// Stores each of `values` into its own field of `object` and ends the block
/// with a void return. Returns the stores.
fn publish(graph: &mut Graph, block: BlockId, object: InstrId, values: &[InstrId]) -> Result<Vec<InstrId>> {
    let mut stores = Vec::with_capacity(values.len());
    for (offset, &value) in (8..).step_by(8).zip(values) {
        let ty = graph.instr(value).ty();
        stores.push(graph.append(
            block,
            InstructionKind::InstanceFieldSet {
                field: FieldInfo::new(offset, 1, ty),
                write_barrier: WriteBarrierKind::DontEmit,
            },
            DataType::Void,
            vec![object, value],
        )?);
    }
    graph.append(block, InstructionKind::ReturnVoid, DataType::Void, vec![])?;
    graph.set_exit_block(block);
    Ok(stores)
}

fn stored(graph: &Graph, store: InstrId) -> Option<ConstValue> {
    graph.instr(graph.instr(store).input(1)).as_constant()
}

#[test]
fn test_integer_arithmetic_wraps() -> Result<()> {
    let int = |v| ConstValue::Int(v);
    assert_eq!(
        fold_binary(BinaryOp::Add, int(i32::MAX), int(1), DataType::Int32)?,
        Some(int(i32::MIN))
    );
    assert_eq!(
        fold_binary(BinaryOp::Div, int(i32::MIN), int(-1), DataType::Int32)?,
        Some(int(i32::MIN))
    );
    assert_eq!(
        fold_binary(BinaryOp::Rem, int(-7), int(2), DataType::Int32)?,
        Some(int(-1))
    );
    // Shift distances are masked to the operand width.
    assert_eq!(
        fold_binary(BinaryOp::Shl, int(1), int(33), DataType::Int32)?,
        Some(int(2))
    );
    assert_eq!(
        fold_binary(BinaryOp::UShr, ConstValue::Long(-1), int(60), DataType::Int64)?,
        Some(ConstValue::Long(15))
    );
    Ok(())
}

#[test]
fn test_division_by_zero_is_not_folded() -> Result<()> {
    assert_eq!(
        fold_binary(BinaryOp::Div, ConstValue::Int(1), ConstValue::Int(0), DataType::Int32)?,
        None
    );
    assert_eq!(
        fold_binary(BinaryOp::Rem, ConstValue::Long(9), ConstValue::Long(0), DataType::Int64)?,
        None
    );
    Ok(())
}

#[test]
fn test_floating_point_min_and_max() -> Result<()> {
    let min = fold_binary(
        BinaryOp::Min,
        ConstValue::Double(0.0),
        ConstValue::Double(-0.0),
        DataType::Float64,
    )?;
    assert!(matches!(min, Some(ConstValue::Double(v)) if v == 0.0 && v.is_sign_negative()));

    let max = fold_binary(
        BinaryOp::Max,
        ConstValue::Double(f64::NAN),
        ConstValue::Double(1.0),
        DataType::Float64,
    )?;
    assert!(matches!(max, Some(ConstValue::Double(v)) if v.is_nan()));
    Ok(())
}

#[test]
fn test_conversions_saturate() -> Result<()> {
    let mut graph = Graph::new("convert");
    let entry = graph.entry_block();
    let object = graph.add_parameter(DataType::Reference)?;
    let big = graph.double_constant(1.0e20)?;
    let nan = graph.float_constant(f32::NAN)?;
    let to_int = graph.append(entry, InstructionKind::TypeConversion, DataType::Int32, vec![big])?;
    let to_long = graph.append(entry, InstructionKind::TypeConversion, DataType::Int64, vec![nan])?;
    let stores = publish(&mut graph, entry, object, &[to_int, to_long])?;

    let (changed, ctx) = fold(&mut graph)?;
    assert!(changed);
    assert_eq!(stored(&graph, stores[0]), Some(ConstValue::Int(i32::MAX)));
    assert_eq!(stored(&graph, stores[1]), Some(ConstValue::Long(0)));
    assert_eq!(ctx.events.count_kind(EventKind::ConstantFolded), 2);
    Ok(())
}

#[test]
fn test_absorbing_inputs() -> Result<()> {
    let mut graph = Graph::new("absorbing");
    let entry = graph.entry_block();
    let object = graph.add_parameter(DataType::Reference)?;
    let x = graph.add_parameter(DataType::Int32)?;
    let minus_one = graph.int_constant(-1)?;
    let one = graph.int_constant(1)?;
    let binary = |op| InstructionKind::Binary(op);

    let or = graph.append(entry, binary(BinaryOp::Or), DataType::Int32, vec![x, minus_one])?;
    let xor = graph.append(entry, binary(BinaryOp::Xor), DataType::Int32, vec![x, x])?;
    let rem = graph.append(entry, binary(BinaryOp::Rem), DataType::Int32, vec![x, one])?;
    let stores = publish(&mut graph, entry, object, &[or, xor, rem])?;

    let (changed, ctx) = fold(&mut graph)?;
    assert!(changed);
    assert_eq!(stored(&graph, stores[0]), Some(ConstValue::Int(-1)));
    assert_eq!(stored(&graph, stores[1]), Some(ConstValue::Int(0)));
    assert_eq!(stored(&graph, stores[2]), Some(ConstValue::Int(0)));
    for value in [or, xor, rem] {
        assert!(!graph.instr(value).is_attached());
    }
    assert_eq!(ctx.events.count_kind(EventKind::AbsorbingInputSimplified), 3);
    assert_eq!(ctx.events.count_kind(EventKind::ConstantFolded), 0);
    Ok(())
}

#[test]
fn test_unsigned_comparisons_against_zero() -> Result<()> {
    let mut graph = Graph::new("unsigned");
    let entry = graph.entry_block();
    let object = graph.add_parameter(DataType::Reference)?;
    let x = graph.add_parameter(DataType::Int32)?;
    let zero = graph.int_constant(0)?;
    let condition = |kind| InstructionKind::Condition {
        kind,
        bias: ComparisonBias::NoBias,
    };
    let below = graph.append(entry, condition(ConditionKind::Below), DataType::Bool, vec![x, zero])?;
    let above_eq = graph.append(entry, condition(ConditionKind::AboveOrEqual), DataType::Bool, vec![x, zero])?;
    let stores = publish(&mut graph, entry, object, &[below, above_eq])?;

    let (changed, _) = fold(&mut graph)?;
    assert!(changed);
    assert_eq!(stored(&graph, stores[0]), Some(ConstValue::Int(0)));
    assert_eq!(stored(&graph, stores[1]), Some(ConstValue::Int(1)));
    Ok(())
}

#[test]
fn test_compare_with_nan_follows_bias() -> Result<()> {
    let mut graph = Graph::new("cmpg");
    let entry = graph.entry_block();
    let object = graph.add_parameter(DataType::Reference)?;
    let x = graph.add_parameter(DataType::Float64)?;
    let nan = graph.double_constant(f64::NAN)?;
    let gt = graph.append(
        entry,
        InstructionKind::Compare {
            bias: ComparisonBias::GtBias,
        },
        DataType::Int32,
        vec![x, nan],
    )?;
    let lt = graph.append(
        entry,
        InstructionKind::Compare {
            bias: ComparisonBias::LtBias,
        },
        DataType::Int32,
        vec![nan, x],
    )?;
    let stores = publish(&mut graph, entry, object, &[gt, lt])?;

    let (changed, _) = fold(&mut graph)?;
    assert!(changed);
    assert_eq!(stored(&graph, stores[0]), Some(ConstValue::Int(1)));
    assert_eq!(stored(&graph, stores[1]), Some(ConstValue::Int(-1)));
    Ok(())
}

#[test]
fn test_folded_constants_precede_their_users() -> Result<()> {
    let mut graph = Graph::new("order");
    let entry = graph.entry_block();
    let x = graph.add_parameter(DataType::Int32)?;
    let two = graph.int_constant(2)?;
    let three = graph.int_constant(3)?;
    let sum = graph.append(entry, InstructionKind::Binary(BinaryOp::Add), DataType::Int32, vec![two, three])?;
    let product = graph.append(entry, InstructionKind::Binary(BinaryOp::Mul), DataType::Int32, vec![sum, x])?;
    graph.append(entry, InstructionKind::Return, DataType::Void, vec![product])?;
    graph.set_exit_block(entry);

    // `fold` verifies that every definition dominates its uses.
    let (changed, _) = fold(&mut graph)?;
    assert!(changed);
    let five = graph.instr(product).input(0);
    assert_eq!(graph.instr(five).as_constant(), Some(ConstValue::Int(5)));

    let order: Vec<InstrId> = graph.instructions(entry).collect();
    let position = |id| order.iter().position(|&other| other == id);
    assert!(position(five) < position(product));
    assert_eq!(order[0], x);
    Ok(())
}

#[test]
fn test_equality_propagates_into_the_taken_arm() -> Result<()> {
    let Branch {
        mut graph,
        x,
        left_ret,
        right_ret,
    } = branch_on_equality(ConditionKind::Equal, DataType::Int32, 5)?;

    let (changed, ctx) = fold(&mut graph)?;
    assert!(changed);
    // `x + 1` under `x == 5` folds to 6 once `x` is known.
    assert_eq!(returned(&graph, left_ret), Some(ConstValue::Int(6)));
    assert_eq!(graph.instr(right_ret).input(0), x);
    assert_eq!(ctx.events.count_kind(EventKind::PropagatedIfValue), 1);
    assert_eq!(ctx.events.count_kind(EventKind::ConstantFolded), 1);
    Ok(())
}

#[test]
fn test_inequality_propagates_into_the_false_arm() -> Result<()> {
    let Branch {
        mut graph,
        x,
        left_ret,
        right_ret,
    } = branch_on_equality(ConditionKind::NotEqual, DataType::Int32, 5)?;

    fold(&mut graph)?;
    assert_eq!(graph.instr(graph.instr(left_ret).input(0)).inputs()[0], x);
    assert_eq!(returned(&graph, right_ret), Some(ConstValue::Int(5)));
    Ok(())
}

#[test]
fn test_compare_result_of_zero_propagates_either_operand_order() -> Result<()> {
    for constant_first in [false, true] {
        let mut graph = Graph::new("compare");
        let entry = graph.entry_block();
        let left = graph.add_block();
        let right = graph.add_block();
        graph.add_edge(entry, left)?;
        graph.add_edge(entry, right)?;

        let x = graph.add_parameter(DataType::Int32)?;
        let five = graph.int_constant(5)?;
        let zero = graph.int_constant(0)?;
        let one = graph.int_constant(1)?;
        let operands = if constant_first { vec![five, x] } else { vec![x, five] };
        let compare = graph.append(
            entry,
            InstructionKind::Compare {
                bias: ComparisonBias::NoBias,
            },
            DataType::Int32,
            operands,
        )?;
        let test = graph.append(
            entry,
            InstructionKind::Condition {
                kind: ConditionKind::Equal,
                bias: ComparisonBias::NoBias,
            },
            DataType::Bool,
            vec![compare, zero],
        )?;
        graph.append(entry, InstructionKind::If, DataType::Void, vec![test])?;
        let sum = graph.append(left, InstructionKind::Binary(BinaryOp::Add), DataType::Int32, vec![x, one])?;
        let left_ret = graph.append(left, InstructionKind::Return, DataType::Void, vec![sum])?;
        let right_ret = graph.append(right, InstructionKind::Return, DataType::Void, vec![x])?;

        let (changed, ctx) = fold(&mut graph)?;
        assert!(changed, "constant first: {constant_first}");
        assert_eq!(returned(&graph, left_ret), Some(ConstValue::Int(6)));
        assert_eq!(graph.instr(right_ret).input(0), x);
        assert_eq!(ctx.events.count_kind(EventKind::PropagatedIfValue), 1);
    }
    Ok(())
}

#[test]
fn test_boolean_inequality_fixes_both_arms() -> Result<()> {
    let Branch {
        mut graph,
        right_ret,
        ..
    } = branch_on_equality(ConditionKind::Equal, DataType::Bool, 0)?;

    let (_, ctx) = fold(&mut graph)?;
    // `b == 0` is false on the right arm, so `b` is 1 there.
    assert_eq!(returned(&graph, right_ret), Some(ConstValue::Int(1)));
    assert_eq!(ctx.events.count_kind(EventKind::PropagatedIfValue), 2);
    Ok(())
}

#[test]
fn test_no_propagation_into_merge_blocks() -> Result<()> {
    let mut graph = Graph::new("merge");
    let entry = graph.entry_block();
    let then = graph.add_block();
    let join = graph.add_block();
    graph.add_edge(entry, then)?;
    graph.add_edge(entry, join)?;
    graph.add_edge(then, join)?;

    let flag = graph.add_parameter(DataType::Bool)?;
    graph.append(entry, InstructionKind::If, DataType::Void, vec![flag])?;
    graph.append(then, InstructionKind::Goto, DataType::Void, vec![])?;
    let ret = graph.append(join, InstructionKind::Return, DataType::Void, vec![flag])?;
    graph.set_exit_block(join);

    let (changed, ctx) = fold(&mut graph)?;
    assert!(!changed);
    assert_eq!(graph.instr(ret).input(0), flag);
    assert!(ctx.events.is_empty());
    Ok(())
}

proptest! {
    #[test]
    fn prop_folded_int_arithmetic_matches_wrapping(
        a in any::<i32>(),
        b in any::<i32>(),
        op in prop::sample::select(vec![BinaryOp::Add, BinaryOp::Sub, BinaryOp::Mul, BinaryOp::Xor]),
    ) {
        let expected = match op {
            BinaryOp::Add => a.wrapping_add(b),
            BinaryOp::Sub => a.wrapping_sub(b),
            BinaryOp::Mul => a.wrapping_mul(b),
            _ => a ^ b,
        };
        let folded = fold_binary(op, ConstValue::Int(a), ConstValue::Int(b), DataType::Int32).unwrap();
        prop_assert_eq!(folded, Some(ConstValue::Int(expected)));
    }

    #[test]
    fn prop_folded_long_division_never_traps(a in any::<i64>(), b in any::<i64>()) {
        let folded = fold_binary(BinaryOp::Div, ConstValue::Long(a), ConstValue::Long(b), DataType::Int64).unwrap();
        if b == 0 {
            prop_assert_eq!(folded, None);
        } else {
            prop_assert_eq!(folded, Some(ConstValue::Long(a.wrapping_div(b))));
        }
    }
}
