//! Pass framework and optimization pipeline.
//!
//! This module sits between the [`crate::ir`] graph and the code generator:
//!
//! - [`crate::ir`] - the SSA graph and its derived dominance and loop data
//! - [`crate::analysis`] - read-only analyses consumed by the passes
//! - [`compiler`](self) - passes, their shared context and the pipeline
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Optimization Pipeline                       │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  PassContext                  Per-method state                   │
//! │    ├─ TargetConfig            (ISA, features, collector)         │
//! │    ├─ PipelineConfig          (pass selection, limits)           │
//! │    ├─ InductionRangeOracle    (trip counts)                      │
//! │    ├─ PassArtifacts           (load/store analysis result)       │
//! │    └─ EventLog                                                   │
//! │                                                                  │
//! │  Pipeline                     Each pass runs exactly once        │
//! │    ├─ rebuild stale dominance and loop data before a pass        │
//! │    ├─ skip passes needing an exit block on non-returning methods │
//! │    └─ verify the graph after a pass (optional)                   │
//! │                                                                  │
//! │  OptimizationPass trait       Interface for all passes           │
//! │                                                                  │
//! │  Passes (7 built-in)                                             │
//! │    ├─ Value: constant folding, operand regrouping                │
//! │    ├─ Target: instruction fusion, loop policy                    │
//! │    ├─ Memory: load/store analysis                                │
//! │    └─ GC: write-barrier elision, read-barrier merging            │
//! │                                                                  │
//! │  compile_methods              One pipeline per method on rayon   │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod context;
mod events;
mod pass;
pub mod passes;
mod pipeline;

pub use config::PipelineConfig;
pub use context::{PassArtifacts, PassContext};
pub use events::{Event, EventBuilder, EventKind, EventLog, EventLogIter, EventSite, StatsSink};
pub use pass::OptimizationPass;
pub use passes::{
    ConstantFoldingPass, GcOptimizerPass, InstructionSimplifierArchPass, LicgPass, LoadStoreAnalysisPass,
    LoopPolicyPass, WriteBarrierEliminationPass,
};
pub use pipeline::{compile_methods, has_arch_simplifier, PassKind, PassOutcome, Pipeline, PipelineReport};
