//! Runs the load/store alias analysis and publishes its result.
//!
//! The pass never changes the graph. The collector (or the reason why the
//! method is not worth analyzing) is left in
//! [`PassArtifacts::load_store`](crate::compiler::PassArtifacts) for later
//! consumers.

use tracing::debug;

use crate::{
    analysis::{LoadStoreAnalysis, LoadStoreAnalysisResult},
    compiler::{context::PassContext, pass::OptimizationPass},
    ir::Graph,
    Result,
};

const NAME: &str = "load_store_analysis";

/// Collects heap locations and their aliasing matrix.
pub struct LoadStoreAnalysisPass;

impl Default for LoadStoreAnalysisPass {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadStoreAnalysisPass {
    /// Creates a new load/store analysis pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl OptimizationPass for LoadStoreAnalysisPass {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Collects heap locations and computes which of them may alias"
    }

    fn requires_exit_block(&self) -> bool {
        true
    }

    fn run(&mut self, graph: &mut Graph, ctx: &mut PassContext) -> Result<bool> {
        graph.check_analyses()?;
        let result = LoadStoreAnalysis::run(graph, ctx.config.max_heap_locations);
        match &result {
            LoadStoreAnalysisResult::Usable(collector) => debug!(
                method = graph.name(),
                locations = collector.number_of_heap_locations(),
                references = collector.reference_infos().len(),
                "heap locations collected"
            ),
            LoadStoreAnalysisResult::NotUsable(reason) => {
                debug!(method = graph.name(), %reason, "load/store analysis not usable");
            }
        }
        ctx.artifacts.load_store = Some(result);
        Ok(false)
    }
}
