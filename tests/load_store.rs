//! Integration tests for heap location collection and alias queries.

use optigraph::{
    analysis::{
        calculate_escape, does_not_escape, ExecutionSubgraph, HeapLocationKind, NotUsableReason, SuccessorSet,
    },
    ir::MonitorKind,
    prelude::*,
};

/// Single-block method; `build` appends the accesses before the return.
fn method(build: impl FnOnce(&mut Graph, BlockId) -> Result<()>) -> Result<Graph> {
    let mut graph = Graph::new("heap");
    let entry = graph.entry_block();
    build(&mut graph, entry)?;
    graph.append(entry, InstructionKind::ReturnVoid, DataType::Void, vec![])?;
    graph.set_exit_block(entry);
    graph.rebuild_analyses()?;
    Ok(graph)
}

fn int_field(offset: u32) -> FieldInfo {
    FieldInfo::new(offset, 3, DataType::Int32)
}

fn set_field(graph: &mut Graph, block: BlockId, object: InstrId, field: FieldInfo, value: InstrId) -> Result<InstrId> {
    graph.append(
        block,
        InstructionKind::InstanceFieldSet {
            field,
            write_barrier: WriteBarrierKind::EmitWithNullCheck,
        },
        DataType::Void,
        vec![object, value],
    )
}

fn get_field(graph: &mut Graph, block: BlockId, object: InstrId, field: FieldInfo) -> Result<InstrId> {
    graph.append(
        block,
        InstructionKind::InstanceFieldGet {
            field,
            needs_read_barrier: false,
        },
        field.field_type,
        vec![object],
    )
}

fn analyse(graph: &Graph) -> HeapLocationCollector {
    match LoadStoreAnalysis::run(graph, 32) {
        LoadStoreAnalysisResult::Usable(collector) => collector,
        LoadStoreAnalysisResult::NotUsable(reason) => panic!("analysis gave up: {reason}"),
    }
}

#[test]
fn test_pass_publishes_the_collector() -> Result<()> {
    let mut graph = method(|graph, block| {
        let obj = graph.add_parameter(DataType::Reference)?;
        let one = graph.int_constant(1)?;
        set_field(graph, block, obj, int_field(8), one)?;
        get_field(graph, block, obj, int_field(8))?;
        Ok(())
    })?;

    let mut ctx = PassContext::new(TargetConfig::arm64(), PipelineConfig::default());
    assert!(!LoadStoreAnalysisPass::new().run(&mut graph, &mut ctx)?);
    let result = ctx.artifacts.load_store.as_ref().ok_or(Error::StaleAnalysis)?;
    assert!(result.is_usable());
    // The store and the load name one location.
    assert_eq!(result.collector().map(|c| c.number_of_heap_locations()), Some(1));
    Ok(())
}

#[test]
fn test_array_indices() -> Result<()> {
    let mut ids = Vec::new();
    let graph = method(|graph, block| {
        let array = graph.add_parameter(DataType::Reference)?;
        let i = graph.add_parameter(DataType::Int32)?;
        let zero = graph.int_constant(0)?;
        let one = graph.int_constant(1)?;
        let before = graph.append(
            block,
            InstructionKind::Binary(BinaryOp::Sub),
            DataType::Int32,
            vec![i, one],
        )?;
        let store = InstructionKind::ArraySet {
            component: DataType::Int32,
            write_barrier: WriteBarrierKind::DontEmit,
            needs_type_check: false,
        };
        ids.push(graph.append(block, store, DataType::Void, vec![array, zero, one])?);
        for index in [one, i, before] {
            ids.push(graph.append(block, InstructionKind::ArrayGet, DataType::Int32, vec![array, index])?);
        }
        Ok(())
    })?;

    let collector = analyse(&graph);
    let location = |access| collector.array_heap_location(&graph, access).ok_or(Error::InvalidInstruction(access));
    let [at0, at1, at_i, at_i_minus_1] = [location(ids[0])?, location(ids[1])?, location(ids[2])?, location(ids[3])?];

    assert!(!collector.may_alias(at0, at1)?);
    assert!(collector.may_alias(at0, at_i)?);
    assert!(!collector.may_alias(at_i, at_i_minus_1)?);
    assert!(collector.may_alias(at1, at_i_minus_1)?);
    assert!(collector.heap_location(at0)?.is_array());
    assert_eq!(collector.heap_location(at0)?.kind(), HeapLocationKind::ArrayElement);
    Ok(())
}

#[test]
fn test_static_fields_live_on_the_class() -> Result<()> {
    let mut loads = Vec::new();
    let graph = method(|graph, block| {
        let one = graph.int_constant(1)?;
        let class = graph.append(block, InstructionKind::LoadClass { class: 3 }, DataType::Reference, vec![])?;
        graph.append(
            block,
            InstructionKind::StaticFieldSet {
                field: int_field(16),
                write_barrier: WriteBarrierKind::DontEmit,
            },
            DataType::Void,
            vec![class, one],
        )?;
        let obj = graph.add_parameter(DataType::Reference)?;
        get_field(graph, block, obj, int_field(16))?;
        loads.push(class);
        loads.push(obj);
        Ok(())
    })?;

    let collector = analyse(&graph);
    let field = int_field(16);
    let on_class = collector
        .field_heap_location(&graph, loads[0], &field)
        .ok_or(Error::InvalidInstruction(loads[0]))?;
    let on_object = collector
        .field_heap_location(&graph, loads[1], &field)
        .ok_or(Error::InvalidInstruction(loads[1]))?;
    assert_eq!(collector.heap_location(on_class)?.kind(), HeapLocationKind::StaticField);
    assert!(!collector.may_alias(on_class, on_object)?);
    Ok(())
}

#[test]
fn test_escape_of_allocations() -> Result<()> {
    let mut ids = Vec::new();
    let graph = method(|graph, block| {
        let holder = graph.add_parameter(DataType::Reference)?;
        let kept = graph.append(block, InstructionKind::NewInstance { class: 1 }, DataType::Reference, vec![])?;
        let published = graph.append(block, InstructionKind::NewInstance { class: 1 }, DataType::Reference, vec![])?;
        let field = FieldInfo::new(8, 1, DataType::Reference);
        let seven = graph.int_constant(7)?;
        set_field(graph, block, kept, int_field(12), seven)?;
        set_field(graph, block, holder, field, published)?;
        ids.extend([holder, kept, published]);
        Ok(())
    })?;
    let [holder, kept, published] = [ids[0], ids[1], ids[2]];

    assert!(calculate_escape(&graph, kept).is_singleton);
    assert!(does_not_escape(&graph, kept));
    assert!(!calculate_escape(&graph, published).is_singleton);
    // Parameters existed before the method started.
    assert!(!calculate_escape(&graph, holder).is_singleton);

    let collector = analyse(&graph);
    let info = collector
        .find_reference_info_of(&graph, kept)
        .ok_or(Error::InvalidInstruction(kept))?;
    assert!(info.is_singleton_and_not_returned());
    Ok(())
}

#[test]
fn test_analysis_gives_up() -> Result<()> {
    let volatile = method(|graph, block| {
        let obj = graph.add_parameter(DataType::Reference)?;
        let one = graph.int_constant(1)?;
        set_field(graph, block, obj, int_field(8).volatile(), one)?;
        Ok(())
    })?;
    assert!(matches!(
        LoadStoreAnalysis::run(&volatile, 32),
        LoadStoreAnalysisResult::NotUsable(NotUsableReason::VolatileAccess)
    ));

    let locked = method(|graph, block| {
        let obj = graph.add_parameter(DataType::Reference)?;
        let one = graph.int_constant(1)?;
        graph.append(
            block,
            InstructionKind::MonitorOperation(MonitorKind::Enter),
            DataType::Void,
            vec![obj],
        )?;
        set_field(graph, block, obj, int_field(8), one)?;
        Ok(())
    })?;
    assert!(matches!(
        LoadStoreAnalysis::run(&locked, 32),
        LoadStoreAnalysisResult::NotUsable(NotUsableReason::MonitorOperations)
    ));

    let crowded = method(|graph, block| {
        let obj = graph.add_parameter(DataType::Reference)?;
        let one = graph.int_constant(1)?;
        for offset in [8, 12, 16] {
            set_field(graph, block, obj, int_field(offset), one)?;
        }
        Ok(())
    })?;
    assert!(LoadStoreAnalysis::run(&crowded, 3).is_usable());
    assert!(matches!(
        LoadStoreAnalysis::run(&crowded, 2),
        LoadStoreAnalysisResult::NotUsable(NotUsableReason::TooManyHeapLocations)
    ));

    // The pass reads its limit from the pipeline configuration.
    let mut crowded = crowded;
    let config = PipelineConfig::default().with_max_heap_locations(2);
    let mut ctx = PassContext::new(TargetConfig::arm64(), config);
    LoadStoreAnalysisPass::new().run(&mut crowded, &mut ctx)?;
    assert!(matches!(
        ctx.artifacts.load_store,
        Some(LoadStoreAnalysisResult::NotUsable(NotUsableReason::TooManyHeapLocations))
    ));
    Ok(())
}

#[test]
fn test_successor_filter_excludes_the_other_arm() -> Result<()> {
    let mut graph = Graph::new("arms");
    let entry = graph.entry_block();
    let left = graph.add_block();
    let right = graph.add_block();
    let join = graph.add_block();
    for (from, to) in [(entry, left), (entry, right), (left, join), (right, join)] {
        graph.add_edge(from, to)?;
    }
    graph.set_exit_block(join);
    graph.rebuild_analyses()?;

    let only_first: SuccessorSet = 0b01;
    let mut subgraph = ExecutionSubgraph::new(&graph);
    subgraph.limit_block_successors(entry, only_first);
    subgraph.finalize(&graph);

    assert!(subgraph.is_valid());
    assert!(subgraph.contains_block(left));
    assert!(subgraph.contains_block(join));
    assert!(!subgraph.contains_block(right));
    assert_eq!(subgraph.unreachable_blocks().collect::<Vec<_>>(), vec![right]);
    assert_eq!(subgraph.excluded_cohorts().len(), 1);
    Ok(())
}
