//! Integration tests for graph construction and its derived analyses.
//!
//! These tests build small methods through the public API and check the
//! def-use bookkeeping, dominance and loop detection a pass relies on.

use optigraph::{
    ir::{BinaryOp, ComparisonBias, ConditionKind, DataType, Graph, InstructionKind, SideEffects},
    Error, Result,
};

/// `entry -> (left | right) -> join`, returning a phi of two values.
fn diamond() -> Result<(Graph, [optigraph::ir::BlockId; 4])> {
    let mut graph = Graph::new("diamond");
    let entry = graph.entry_block();
    let left = graph.add_block();
    let right = graph.add_block();
    let join = graph.add_block();
    graph.add_edge(entry, left)?;
    graph.add_edge(entry, right)?;
    graph.add_edge(left, join)?;
    graph.add_edge(right, join)?;

    let flag = graph.add_parameter(DataType::Bool)?;
    let one = graph.int_constant(1)?;
    let two = graph.int_constant(2)?;
    graph.append(entry, InstructionKind::If, DataType::Void, vec![flag])?;
    graph.append(left, InstructionKind::Goto, DataType::Void, vec![])?;
    graph.append(right, InstructionKind::Goto, DataType::Void, vec![])?;
    let phi = graph.add_phi(join, DataType::Int32, vec![one, two])?;
    graph.append(join, InstructionKind::Return, DataType::Void, vec![phi])?;
    graph.set_exit_block(join);
    graph.rebuild_analyses()?;
    Ok((graph, [entry, left, right, join]))
}

#[test]
fn test_def_use_lists_track_every_input() -> Result<()> {
    let mut graph = Graph::new("uses");
    let entry = graph.entry_block();
    let x = graph.add_parameter(DataType::Int32)?;
    let add = graph.append(
        entry,
        InstructionKind::Binary(BinaryOp::Add),
        DataType::Int32,
        vec![x, x],
    )?;
    graph.append(entry, InstructionKind::Return, DataType::Void, vec![add])?;

    assert_eq!(graph.instr(x).uses().len(), 2);
    assert_eq!(graph.instr(add).uses().len(), 1);
    assert!(graph.instr(add).has_only_one_non_environment_use());

    let zero = graph.int_constant(0)?;
    graph.replace_input(add, 1, zero)?;
    assert_eq!(graph.instr(x).uses().len(), 1);
    assert_eq!(graph.instr(add).inputs(), &[x, zero]);
    graph.verify()
}

#[test]
fn test_constants_are_interned_in_the_entry_block() -> Result<()> {
    let mut graph = Graph::new("constants");
    let a = graph.int_constant(42)?;
    let b = graph.int_constant(42)?;
    let long = graph.long_constant(42)?;
    assert_eq!(a, b);
    assert_ne!(a, long);
    assert_eq!(graph.instr(a).block(), Some(graph.entry_block()));

    // Positive and negative zero are distinct values.
    let pz = graph.double_constant(0.0)?;
    let nz = graph.double_constant(-0.0)?;
    assert_ne!(pz, nz);
    Ok(())
}

#[test]
fn test_late_constants_still_dominate_the_body() -> Result<()> {
    let mut graph = Graph::new("late");
    let entry = graph.entry_block();
    let x = graph.add_parameter(DataType::Int32)?;
    let neg = graph.append(
        entry,
        InstructionKind::Unary(optigraph::ir::UnaryOp::Neg),
        DataType::Int32,
        vec![x],
    )?;
    let ret = graph.append(entry, InstructionKind::Return, DataType::Void, vec![neg])?;
    graph.set_exit_block(entry);

    let seven = graph.int_constant(7)?;
    let y = graph.add_parameter(DataType::Int32)?;
    graph.replace_input(ret, 0, seven)?;
    assert_eq!(graph.instructions(entry).collect::<Vec<_>>(), vec![x, y, seven, neg, ret]);

    graph.rebuild_analyses()?;
    assert!(graph.strictly_dominates(seven, ret));
    graph.verify()
}

#[test]
fn test_removing_a_used_instruction_fails() -> Result<()> {
    let mut graph = Graph::new("remove");
    let entry = graph.entry_block();
    let x = graph.add_parameter(DataType::Int32)?;
    let neg = graph.append(
        entry,
        InstructionKind::Unary(optigraph::ir::UnaryOp::Neg),
        DataType::Int32,
        vec![x],
    )?;
    let ret = graph.append(entry, InstructionKind::Return, DataType::Void, vec![neg])?;

    assert!(matches!(
        graph.remove_instruction(neg),
        Err(Error::InvariantViolation { .. })
    ));
    graph.replace_input(ret, 0, x)?;
    graph.remove_instruction(neg)?;
    assert!(!graph.instr(neg).is_attached());
    assert_eq!(graph.remove_instruction(neg), Err(Error::InvalidInstruction(neg)));
    graph.verify()
}

#[test]
fn test_edge_changes_invalidate_analyses() -> Result<()> {
    let (mut graph, [_, left, _, join]) = diamond()?;
    assert!(graph.analyses_valid());
    graph.check_analyses()?;

    let extra = graph.split_edge(left, join)?;
    assert_eq!(graph.check_analyses(), Err(Error::StaleAnalysis));
    graph.rebuild_analyses()?;
    assert!(graph.dominates(left, extra));
    graph.verify()
}

#[test]
fn test_dominance_in_a_diamond() -> Result<()> {
    let (graph, [entry, left, right, join]) = diamond()?;

    assert_eq!(graph.reverse_post_order().first(), Some(&entry));
    assert_eq!(graph.block(join).dominator(), Some(entry));
    assert!(graph.dominates(entry, join));
    assert!(!graph.dominates(left, join));
    assert!(!graph.strictly_dominates_block(right, right));
    assert!(graph.loops().is_empty());

    let path = graph.path_between(left, join);
    assert!(path.contains(left.index()));
    assert!(path.contains(join.index()));
    assert!(!path.contains(right.index()));
    Ok(())
}

#[test]
fn test_natural_loop_detection() -> Result<()> {
    let mut graph = Graph::new("loop");
    let entry = graph.entry_block();
    let header = graph.add_block();
    let body = graph.add_block();
    let exit = graph.add_block();
    graph.add_edge(entry, header)?;
    graph.add_edge(header, body)?;
    graph.add_edge(header, exit)?;
    graph.add_edge(body, header)?;

    let n = graph.add_parameter(DataType::Int32)?;
    let zero = graph.int_constant(0)?;
    let one = graph.int_constant(1)?;
    graph.append(entry, InstructionKind::Goto, DataType::Void, vec![])?;
    let i = graph.add_phi(header, DataType::Int32, vec![zero])?;
    let test = graph.append(
        header,
        InstructionKind::Condition {
            kind: ConditionKind::LessThan,
            bias: ComparisonBias::NoBias,
        },
        DataType::Bool,
        vec![i, n],
    )?;
    graph.append(header, InstructionKind::If, DataType::Void, vec![test])?;
    let next = graph.append(
        body,
        InstructionKind::Binary(BinaryOp::Add),
        DataType::Int32,
        vec![i, one],
    )?;
    graph.append(body, InstructionKind::Goto, DataType::Void, vec![])?;
    graph.set_phi_input(i, 1, next)?;
    graph.append(exit, InstructionKind::ReturnVoid, DataType::Void, vec![])?;
    graph.set_exit_block(exit);
    graph.rebuild_analyses()?;
    graph.verify()?;

    assert_eq!(graph.loops().len(), 1);
    let info = graph.loop_of(body).ok_or(Error::InvalidBlock(body))?;
    assert_eq!(info.header(), header);
    assert!(info.contains(header));
    assert!(info.contains(body));
    assert!(!info.contains(exit));
    assert!(graph.loop_of(exit).is_none());

    let loop_id = info.id();
    assert!(graph.is_defined_in_loop(next, loop_id));
    assert!(!graph.is_defined_in_loop(n, loop_id));
    Ok(())
}

#[test]
fn test_side_effects_follow_the_instruction_kind() -> Result<()> {
    let mut graph = Graph::new("effects");
    let entry = graph.entry_block();
    let alloc = graph.append(
        entry,
        InstructionKind::NewInstance { class: 7 },
        DataType::Reference,
        vec![],
    )?;
    let call = graph.append(entry, InstructionKind::Invoke { method: 1 }, DataType::Void, vec![])?;
    let x = graph.add_parameter(DataType::Int32)?;
    let add = graph.append(
        entry,
        InstructionKind::Binary(BinaryOp::Add),
        DataType::Int32,
        vec![x, x],
    )?;

    assert!(graph.instr(alloc).side_effects().can_trigger_gc());
    assert!(graph.instr(call).side_effects().can_trigger_gc());
    assert!(!graph.instr(add).side_effects().can_trigger_gc());

    graph.set_side_effects(add, SideEffects::CAN_TRIGGER_GC);
    assert!(graph.instr(add).side_effects().can_trigger_gc());
    Ok(())
}
