//! # optigraph Prelude
//!
//! This module provides a convenient prelude for the most commonly used types
//! and traits of the library. Import it to build graphs, configure a target
//! and run the optimization pipeline.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all optigraph operations
pub use crate::Error;

/// The result type used throughout optigraph
pub use crate::Result;

// ================================================================================================
// Graph
// ================================================================================================

/// The instruction graph and its handles
pub use crate::ir::{BlockId, Graph, InstrId, InstructionCursor, LoopId};

/// Instruction kinds, operators and types
pub use crate::ir::{
    BinaryOp, ComparisonBias, ConditionKind, ConstValue, DataType, FieldInfo, InstructionKind, UnaryOp,
    VectorShape, WriteBarrierKind,
};

// ================================================================================================
// Target
// ================================================================================================

/// Code generation target description
pub use crate::target::{CollectorKind, GcConfig, InstructionSet, IsaFeatures, TargetConfig};

// ================================================================================================
// Pipeline
// ================================================================================================

/// Pass framework, pipeline and statistics
pub use crate::compiler::{
    EventKind, EventLog, OptimizationPass, PassContext, PassKind, Pipeline, PipelineConfig, PipelineReport,
};

/// The built-in passes
pub use crate::compiler::{
    ConstantFoldingPass, GcOptimizerPass, InstructionSimplifierArchPass, LicgPass, LoadStoreAnalysisPass,
    LoopPolicyPass, WriteBarrierEliminationPass,
};

// ================================================================================================
// Analyses
// ================================================================================================

/// Loop and load/store analyses
pub use crate::analysis::{
    HeapLocationCollector, InductionRangeOracle, LoadStoreAnalysis, LoadStoreAnalysisResult, LoopTransformPolicy,
};
