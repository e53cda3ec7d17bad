//! Analyses consumed by the optimization passes.
//!
//! The analyses here only read the graph. Their results are either returned
//! to the caller or stored in the pass context by the pass that runs them.
//!
//! # Architecture
//!
//! - [`loops`] - loop statistics, trip counts and per-target transformation
//!   policies
//! - [`load_store`] - heap locations, escape facts and the aliasing matrix

pub mod load_store;
pub mod loops;

pub use load_store::{
    calculate_escape, can_array_elements_alias, does_not_escape, visit_escapes, ExcludedCohort,
    ExecutionSubgraph, HeapLocation, HeapLocationCollector, HeapLocationKind, LoadStoreAnalysis,
    LoadStoreAnalysisResult, NotUsableReason, ReferenceInfo, SingletonState, SuccessorSet,
};
pub use loops::{
    policy_for, ArchDefaultPolicy, Arm64Policy, BasicInductionOracle, FixedTripCounts, InductionRangeOracle,
    LoopAnalysis, LoopAnalysisInfo, LoopTransformPolicy, NoInductionInfo, NoOptsPolicy, X86_64Policy,
};
