//! Pass registry and the pipeline that runs passes over a method.
//!
//! A [`Pipeline`] is an ordered list of passes. Running it over a graph
//! executes every pass exactly once, in order, rebuilding stale dominance and
//! loop information in between and optionally verifying the graph after each
//! pass. The returned [`PipelineReport`] records which passes changed the
//! graph and which were skipped.
//!
//! Pipelines are built by hand, from the default order for a target with
//! [`Pipeline::for_target`], or from a comma-separated list of registry names
//! with [`Pipeline::from_names`]:
//!
//! ```rust
//! use optigraph::compiler::Pipeline;
//!
//! let pipeline = Pipeline::from_names("constant_folding, write_barrier_elimination")?;
//! assert_eq!(pipeline.pass_names(), vec!["constant_folding", "write_barrier_elimination"]);
//!
//! // Barrier elimination expects null stores to be folded already.
//! assert!(Pipeline::from_names("write_barrier_elimination,constant_folding").is_err());
//! # Ok::<(), optigraph::Error>(())
//! ```

use std::{str::FromStr, sync::Arc};

use rayon::prelude::*;
use strum::{Display, EnumIter, EnumString};
use tracing::{debug, debug_span};

use crate::{
    compiler::{
        config::PipelineConfig,
        context::PassContext,
        events::EventLog,
        pass::OptimizationPass,
        passes::{
            ConstantFoldingPass, GcOptimizerPass, InstructionSimplifierArchPass, LicgPass,
            LoadStoreAnalysisPass, LoopPolicyPass, WriteBarrierEliminationPass,
        },
    },
    ir::Graph,
    target::{InstructionSet, TargetConfig},
    Error, Result,
};

/// The passes known to the registry, by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum PassKind {
    /// Constant folding and absorbing-input simplification.
    ConstantFolding,
    /// Loop-invariant operand regrouping.
    Licg,
    /// Target-specific instruction fusion.
    InstructionSimplifierArch,
    /// Loop peeling and unrolling decisions.
    LoopPolicy,
    /// Heap location and aliasing analysis.
    LoadStoreAnalysis,
    /// Write-barrier elision.
    WriteBarrierElimination,
    /// Read-barrier merging.
    GcOptimizer,
}

impl PassKind {
    /// Returns the passes that must run before this one when both are scheduled.
    #[must_use]
    pub fn must_follow(self) -> &'static [PassKind] {
        match self {
            Self::WriteBarrierElimination => &[Self::ConstantFolding],
            Self::GcOptimizer => &[Self::WriteBarrierElimination],
            _ => &[],
        }
    }

    /// Creates a fresh instance of the pass.
    #[must_use]
    pub fn create(self) -> Box<dyn OptimizationPass> {
        match self {
            Self::ConstantFolding => Box::new(ConstantFoldingPass::new()),
            Self::Licg => Box::new(LicgPass::new()),
            Self::InstructionSimplifierArch => Box::new(InstructionSimplifierArchPass::new()),
            Self::LoopPolicy => Box::new(LoopPolicyPass::new()),
            Self::LoadStoreAnalysis => Box::new(LoadStoreAnalysisPass::new()),
            Self::WriteBarrierElimination => Box::new(WriteBarrierEliminationPass::new()),
            Self::GcOptimizer => Box::new(GcOptimizerPass::new()),
        }
    }
}

/// What happened to one pass during a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOutcome {
    /// The pass name.
    pub name: &'static str,
    /// Whether the pass reported a change.
    pub changed: bool,
    /// Whether the pass was skipped because the method has no exit block.
    pub skipped: bool,
}

/// Per-pass results of one pipeline run over one method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// Outcomes in execution order.
    pub outcomes: Vec<PassOutcome>,
}

impl PipelineReport {
    /// Returns true if any pass changed the graph.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.outcomes.iter().any(|o| o.changed)
    }

    /// Returns the outcome of the named pass.
    #[must_use]
    pub fn outcome(&self, name: &str) -> Option<&PassOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    /// Iterates the names of skipped passes.
    pub fn skipped(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.outcomes.iter().filter(|o| o.skipped).map(|o| o.name)
    }
}

/// An ordered list of passes.
#[derive(Default)]
pub struct Pipeline {
    passes: Vec<Box<dyn OptimizationPass>>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a pass.
    pub fn add(&mut self, pass: impl OptimizationPass + 'static) -> &mut Self {
        self.passes.push(Box::new(pass));
        self
    }

    /// Appends an already boxed pass.
    pub fn add_boxed(&mut self, pass: Box<dyn OptimizationPass>) -> &mut Self {
        self.passes.push(pass);
        self
    }

    /// Builds a pipeline from comma-separated registry names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownPass`] for a name missing from the registry and
    /// [`Error::PassOrdering`] if a pass is listed before one it must follow.
    pub fn from_names(names: &str) -> Result<Self> {
        let kinds = names
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| PassKind::from_str(name).map_err(|_| Error::UnknownPass(name.to_string())))
            .collect::<Result<Vec<_>>>()?;

        for (position, kind) in kinds.iter().enumerate() {
            for required in kind.must_follow() {
                if kinds[position..].contains(required) {
                    return Err(Error::PassOrdering {
                        pass: kind.to_string(),
                        requires: required.to_string(),
                    });
                }
            }
        }

        let mut pipeline = Self::new();
        for kind in kinds {
            pipeline.add_boxed(kind.create());
        }
        Ok(pipeline)
    }

    /// Builds the default pipeline for a target.
    ///
    /// The target simplifier is included only for instruction sets that have
    /// fusions, and read-barrier merging only where the collector and
    /// instruction set support it.
    #[must_use]
    pub fn for_target(target: &TargetConfig, config: &PipelineConfig) -> Self {
        let mut pipeline = Self::new();
        if config.enable_constant_folding {
            pipeline.add(ConstantFoldingPass::new());
        }
        if config.enable_licg {
            pipeline.add(LicgPass::new());
        }
        if config.enable_arch_simplifier && has_arch_simplifier(target.isa) {
            pipeline.add(InstructionSimplifierArchPass::new());
        }
        if config.enable_loop_policy {
            pipeline.add(LoopPolicyPass::new());
        }
        if config.enable_load_store_analysis {
            pipeline.add(LoadStoreAnalysisPass::new());
        }
        if config.enable_write_barrier_elimination {
            pipeline.add(WriteBarrierEliminationPass::new());
        }
        if config.enable_gc_optimizer && target.supports_read_barrier_merge() {
            pipeline.add(GcOptimizerPass::new());
        }
        pipeline
    }

    /// Returns the pass names in execution order.
    #[must_use]
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Returns the number of passes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Returns true if the pipeline has no passes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Runs every pass once over `graph`.
    ///
    /// # Errors
    ///
    /// Returns the first graph-invariant error raised by a pass or by
    /// verification; the graph must then be discarded.
    pub fn run(&mut self, graph: &mut Graph, ctx: &mut PassContext) -> Result<PipelineReport> {
        let span = debug_span!("pipeline", method = graph.name());
        let _guard = span.enter();

        let mut report = PipelineReport::default();
        for pass in &mut self.passes {
            let name = pass.name();
            if pass.requires_exit_block() && graph.exit_block().is_none() {
                debug!(pass = name, "skipped: method has no exit block");
                report.outcomes.push(PassOutcome {
                    name,
                    changed: false,
                    skipped: true,
                });
                continue;
            }

            if !graph.analyses_valid() {
                graph.rebuild_analyses()?;
            }

            let changed = pass.run(graph, ctx)?;
            debug!(pass = name, changed, "pass finished");

            if ctx.config.verify_after_each_pass {
                graph.verify()?;
            }
            report.outcomes.push(PassOutcome {
                name,
                changed,
                skipped: false,
            });
        }
        Ok(report)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.pass_names()).finish()
    }
}

/// Returns true if the target simplifier has fusions for `isa`.
#[must_use]
pub fn has_arch_simplifier(isa: InstructionSet) -> bool {
    matches!(
        isa,
        InstructionSet::Arm64 | InstructionSet::X86 | InstructionSet::X86_64 | InstructionSet::Riscv64
    )
}

/// Optimizes many methods in parallel, one pipeline per method.
///
/// `factory` builds the pipeline for each method; methods share nothing but
/// the event log.
pub fn compile_methods<F>(
    graphs: &mut [Graph],
    target: &TargetConfig,
    config: &PipelineConfig,
    events: &Arc<EventLog>,
    factory: F,
) -> Vec<Result<PipelineReport>>
where
    F: Fn() -> Pipeline + Sync,
{
    graphs
        .par_iter_mut()
        .map(|graph| {
            let mut pipeline = factory();
            let mut ctx = PassContext::with_events(*target, config.clone(), Arc::clone(events));
            pipeline.run(graph, &mut ctx)
        })
        .collect()
}
