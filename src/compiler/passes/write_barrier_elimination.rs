//! Write-barrier elision for reference stores.
//!
//! A reference store into an object marks the object's card for the
//! collector. When several stores hit the same base object with no
//! GC-triggering instruction in between, one barrier covers all of them: the
//! first store keeps a barrier (without its null check, since a later store
//! relies on it unconditionally) and the others drop theirs.
//!
//! The pass walks blocks in reverse post-order carrying, per block, the set of
//! base objects whose barrier is already pending:
//!
//! - a block starts with the intersection of its predecessors' sets; loop
//!   headers and catch blocks start empty
//! - any instruction that can trigger GC empties the set
//! - a store of the null constant, or of a non-reference value, needs no
//!   barrier at all
//!
//! Array stores never take the reduced form: an earlier array store that
//! another store relies on keeps its null-checking barrier.
//!
//! Decisions are recomputed from scratch on every run and applied at the end,
//! so running the pass twice changes nothing the second time.

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::{
    compiler::{context::PassContext, events::EventKind, pass::OptimizationPass},
    ir::{BlockId, ConstValue, DataType, Graph, InstrId, InstructionKind, WriteBarrierKind},
    Result,
};

const NAME: &str = "write_barrier_elimination";

/// Base object -> stores whose barrier is pending for it.
type PendingBarriers = FxHashMap<InstrId, Vec<InstrId>>;

/// The parts of a store the elision looks at.
struct Store {
    base: InstrId,
    needs_barrier: bool,
    is_array: bool,
}

/// Removes write barriers made redundant by an earlier store to the same object.
pub struct WriteBarrierEliminationPass;

impl Default for WriteBarrierEliminationPass {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteBarrierEliminationPass {
    /// Creates a new write-barrier elimination pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn as_store(graph: &Graph, id: InstrId) -> Option<Store> {
        let instr = graph.instr(id);
        let (stored_type, value_slot, is_array) = match instr.kind() {
            InstructionKind::InstanceFieldSet { field, .. } | InstructionKind::StaticFieldSet { field, .. } => {
                (field.field_type, 1, false)
            }
            InstructionKind::ArraySet { component, .. } => (*component, 2, true),
            _ => return None,
        };
        let value = graph.instr(instr.input(value_slot));
        let stores_null = matches!(value.as_constant(), Some(ConstValue::Null));
        Some(Store {
            base: graph.original_reference(instr.input(0)),
            needs_barrier: stored_type == DataType::Reference && !stores_null,
            is_array,
        })
    }

    fn is_loop_header(graph: &Graph, block: BlockId) -> bool {
        graph.loop_of(block).is_some_and(|info| info.header() == block)
    }

    /// Bases pending on every incoming edge, with the stores from all edges.
    fn pending_at_entry(graph: &Graph, block: BlockId, pending: &[PendingBarriers]) -> PendingBarriers {
        let mut merged = PendingBarriers::default();
        let node = graph.block(block);
        if node.is_catch_block() || Self::is_loop_header(graph, block) {
            return merged;
        }
        let Some((&first, rest)) = node.predecessors().split_first() else {
            return merged;
        };
        for (&base, stores) in &pending[first.index()] {
            let mut union = stores.clone();
            let mut on_every_edge = true;
            for pred in rest {
                match pending[pred.index()].get(&base) {
                    Some(more) => union.extend(more.iter().filter(|s| !stores.contains(s))),
                    None => {
                        on_every_edge = false;
                        break;
                    }
                }
            }
            if on_every_edge {
                union.sort_unstable();
                union.dedup();
                merged.insert(base, union);
            }
        }
        merged
    }

    /// Computes the barrier kind of every store in the method.
    fn decide(graph: &Graph) -> FxHashMap<InstrId, WriteBarrierKind> {
        let mut decisions = FxHashMap::default();
        let mut pending = vec![PendingBarriers::default(); graph.block_capacity()];

        for &block in graph.reverse_post_order() {
            let mut current = Self::pending_at_entry(graph, block, &pending);
            for id in graph.instructions(block) {
                if graph.instr(id).side_effects().can_trigger_gc() {
                    current.clear();
                }
                let Some(store) = Self::as_store(graph, id) else {
                    continue;
                };
                if !store.needs_barrier {
                    decisions.insert(id, WriteBarrierKind::DontEmit);
                    continue;
                }
                match current.get(&store.base) {
                    Some(earlier) => {
                        if !store.is_array {
                            for &covering in earlier.iter() {
                                if Self::as_store(graph, covering).is_some_and(|s| !s.is_array) {
                                    decisions.insert(covering, WriteBarrierKind::EmitNoNullCheck);
                                }
                            }
                        }
                        trace!(%id, base = %store.base, "write barrier covered by an earlier store");
                        decisions.insert(id, WriteBarrierKind::DontEmit);
                    }
                    None => {
                        decisions.insert(id, WriteBarrierKind::EmitWithNullCheck);
                        current.insert(store.base, vec![id]);
                    }
                }
            }
            pending[block.index()] = current;
        }
        decisions
    }
}

impl OptimizationPass for WriteBarrierEliminationPass {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Removes write barriers covered by an earlier store to the same object"
    }

    fn run(&mut self, graph: &mut Graph, ctx: &mut PassContext) -> Result<bool> {
        graph.check_analyses()?;
        let decisions = Self::decide(graph);

        let order: Vec<InstrId> = graph
            .reverse_post_order()
            .iter()
            .flat_map(|&block| graph.instructions(block))
            .filter(|id| decisions.contains_key(id))
            .collect();

        let mut changed = false;
        for id in order {
            let kind = decisions[&id];
            if graph.set_write_barrier_kind(id, kind)? {
                changed = true;
                if kind == WriteBarrierKind::DontEmit {
                    ctx.record(EventKind::RemovedWriteBarrier, NAME, graph.name(), id);
                }
            }
        }
        debug!(method = graph.name(), stores = decisions.len(), changed, "write barriers decided");
        Ok(changed)
    }
}
