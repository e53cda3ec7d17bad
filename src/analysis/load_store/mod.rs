//! Heap location collection and alias analysis for load/store optimization.
//!
//! The analysis names every memory cell class the method touches (a field of
//! some base reference, a static field, or a run of array elements) and
//! decides for each pair of such locations whether they may overlap. Base
//! references allocated in the method additionally get escape facts: a
//! singleton cannot alias anything else, and the [`ExecutionSubgraph`] of a
//! reference marks the executions in which it has not escaped yet.
//!
//! The result is either a [`HeapLocationCollector`] ready for queries, or the
//! reason why a load/store optimizer would gain nothing from it.
//!
//! # Usage
//!
//! ```rust,ignore
//! use optigraph::analysis::{LoadStoreAnalysis, LoadStoreAnalysisResult};
//!
//! if let LoadStoreAnalysisResult::Usable(collector) = LoadStoreAnalysis::run(&graph, 32) {
//!     for i in 0..collector.number_of_heap_locations() {
//!         println!("{:?}", collector.heap_location(i)?);
//!     }
//! }
//! ```

mod escape;
mod heap;
mod subgraph;

use strum::Display;

pub use escape::{calculate_escape, does_not_escape, visit_escapes, SingletonState};
pub use heap::{
    can_array_elements_alias, HeapLocation, HeapLocationCollector, HeapLocationKind, ReferenceInfo, SCALAR,
};
pub use subgraph::{ExcludedCohort, ExecutionSubgraph, SuccessorSet, MAX_FILTERABLE_SUCCESSORS};

use crate::ir::Graph;

/// Why the heap locations of a method are not worth optimizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum NotUsableReason {
    /// More distinct locations than the analysis tracks.
    TooManyHeapLocations,
    /// Nothing is stored, so no load can be replaced by a stored value.
    NoHeapStores,
    /// A volatile field access orders memory in ways the analysis ignores.
    VolatileAccess,
    /// A monitor enter or exit orders memory in ways the analysis ignores.
    MonitorOperations,
    /// The method never returns, so escapes cannot be bounded.
    NoExitBlock,
}

/// Outcome of [`LoadStoreAnalysis::run`].
#[derive(Debug, Clone)]
pub enum LoadStoreAnalysisResult {
    /// The collected locations with a complete aliasing matrix.
    Usable(HeapLocationCollector),
    /// The analysis gave up.
    NotUsable(NotUsableReason),
}

impl LoadStoreAnalysisResult {
    /// Returns the collector if the analysis succeeded.
    #[must_use]
    pub fn collector(&self) -> Option<&HeapLocationCollector> {
        match self {
            Self::Usable(collector) => Some(collector),
            Self::NotUsable(_) => None,
        }
    }

    /// Returns `true` if the analysis succeeded.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Usable(_))
    }
}

/// Entry point of the load/store analysis.
pub struct LoadStoreAnalysis;

impl LoadStoreAnalysis {
    /// Collects the heap locations of `graph` and builds their aliasing matrix.
    ///
    /// Blocks are visited in reverse post-order, so derived analyses must be
    /// current. At most `max_locations` locations are tracked.
    #[must_use]
    pub fn run(graph: &Graph, max_locations: usize) -> LoadStoreAnalysisResult {
        if graph.exit_block().is_none() {
            return LoadStoreAnalysisResult::NotUsable(NotUsableReason::NoExitBlock);
        }

        let mut collector = HeapLocationCollector::new(max_locations);
        for &block in graph.reverse_post_order() {
            collector.visit_block(graph, block);
        }

        let reason = if collector.overflowed() {
            Some(NotUsableReason::TooManyHeapLocations)
        } else if !collector.has_heap_stores() {
            Some(NotUsableReason::NoHeapStores)
        } else if collector.has_volatile() {
            Some(NotUsableReason::VolatileAccess)
        } else if collector.has_monitor_operations() {
            Some(NotUsableReason::MonitorOperations)
        } else {
            None
        };
        if let Some(reason) = reason {
            return LoadStoreAnalysisResult::NotUsable(reason);
        }

        collector.build_aliasing_matrix(graph);
        LoadStoreAnalysisResult::Usable(collector)
    }
}
