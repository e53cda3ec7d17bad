//! Per-method state shared by the passes of one pipeline run.
//!
//! A [`PassContext`] carries everything a pass may consult besides the graph
//! itself: the target description, the pipeline configuration, the
//! induction-variable oracle, the statistics log and the artifacts that one
//! pass produces for a later consumer.

use std::sync::Arc;

use crate::{
    analysis::{BasicInductionOracle, InductionRangeOracle, LoadStoreAnalysisResult},
    compiler::{config::PipelineConfig, events::EventKind, events::EventLog},
    ir::InstrId,
    target::TargetConfig,
};

/// Analysis results handed from one pass to later passes or to the caller.
#[derive(Debug, Default)]
pub struct PassArtifacts {
    /// Heap locations and aliasing computed by the load/store analysis pass.
    pub load_store: Option<LoadStoreAnalysisResult>,
}

/// State shared by all passes that run over one method.
pub struct PassContext {
    /// The code generation target.
    pub target: TargetConfig,

    /// Pass selection and heuristic limits.
    pub config: PipelineConfig,

    /// Transformation statistics. Shared between contexts when methods are
    /// compiled in parallel.
    pub events: Arc<EventLog>,

    /// Artifacts produced for later consumers.
    pub artifacts: PassArtifacts,

    /// Trip count provider used by the loop policy.
    pub oracle: Box<dyn InductionRangeOracle>,
}

impl PassContext {
    /// Creates a context with a private event log and the basic induction oracle.
    #[must_use]
    pub fn new(target: TargetConfig, config: PipelineConfig) -> Self {
        Self::with_events(target, config, Arc::new(EventLog::new()))
    }

    /// Creates a context that records into a shared event log.
    #[must_use]
    pub fn with_events(target: TargetConfig, config: PipelineConfig, events: Arc<EventLog>) -> Self {
        Self {
            target,
            config,
            events,
            artifacts: PassArtifacts::default(),
            oracle: Box::new(BasicInductionOracle),
        }
    }

    /// Replaces the trip count oracle.
    #[must_use]
    pub fn with_oracle(mut self, oracle: impl InductionRangeOracle + 'static) -> Self {
        self.oracle = Box::new(oracle);
        self
    }

    /// Records one transformation event.
    pub fn record(&self, kind: EventKind, pass: &'static str, method: &str, at: InstrId) {
        self.events.record(kind).at(method, at).pass(pass);
    }
}

impl std::fmt::Debug for PassContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassContext")
            .field("target", &self.target)
            .field("config", &self.config)
            .field("events", &self.events.len())
            .field("artifacts", &self.artifacts)
            .finish_non_exhaustive()
    }
}
