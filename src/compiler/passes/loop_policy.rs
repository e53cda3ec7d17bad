//! Peeling and unrolling decisions for innermost loops.
//!
//! The pass does not transform loops. It measures each innermost loop, asks
//! the target's [`LoopTransformPolicy`] what would pay off and records the
//! answer on the loop as a [`LoopTransformDecision`], in order of preference:
//!
//! 1. full unrolling, when the trip count is known and the copies stay small
//! 2. peeling, when some exit test is loop invariant
//! 3. unrolling by the policy's scalar factor

use tracing::{debug, trace};

use crate::{
    analysis::{policy_for, LoopAnalysis, LoopAnalysisInfo, LoopTransformPolicy},
    compiler::{context::PassContext, events::EventKind, pass::OptimizationPass},
    ir::{Graph, LoopId, LoopTransformDecision},
    Result,
};

const NAME: &str = "loop_policy";

/// Annotates innermost loops with the transformation worth applying.
pub struct LoopPolicyPass;

impl Default for LoopPolicyPass {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopPolicyPass {
    /// Creates a new loop policy pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Chooses the transformation for one loop.
    #[must_use]
    pub fn decide(policy: &dyn LoopTransformPolicy, stats: &LoopAnalysisInfo) -> LoopTransformDecision {
        if policy.is_loop_non_beneficial_for_scalar_opts(stats) {
            return LoopTransformDecision::None;
        }

        if policy.is_loop_peeling_enabled() && !stats.has_instructions_preventing_scalar_peeling {
            if let Some(trip_count) = stats.trip_count.and_then(|t| u64::try_from(t).ok()) {
                if trip_count > 0 && policy.is_full_unrolling_beneficial(stats) {
                    return LoopTransformDecision::FullUnroll { trip_count };
                }
            }
            if stats.invariant_exits_num > 0 {
                return LoopTransformDecision::Peel;
            }
        }

        if !stats.has_instructions_preventing_scalar_unrolling {
            let factor = policy.scalar_unrolling_factor(stats);
            if factor != LoopAnalysisInfo::NO_UNROLLING_FACTOR {
                return LoopTransformDecision::Unroll { factor };
            }
        }
        LoopTransformDecision::None
    }

    /// Returns `true` if no other loop nests inside `id`.
    fn is_innermost(graph: &Graph, id: LoopId) -> bool {
        !graph.loops().iter().any(|l| l.outer() == Some(id))
    }
}

impl OptimizationPass for LoopPolicyPass {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Decides which innermost loops to peel or unroll"
    }

    fn run(&mut self, graph: &mut Graph, ctx: &mut PassContext) -> Result<bool> {
        graph.check_analyses()?;
        let policy = policy_for(ctx.target.isa);

        let headers: Vec<LoopId> = graph
            .post_order()
            .filter_map(|block| {
                graph
                    .loop_of(block)
                    .filter(|info| info.header() == block)
                    .map(|info| info.id())
            })
            .collect();

        let mut changed = false;
        for id in headers {
            let info = graph.loop_info(id);
            if info.is_irreducible() || !Self::is_innermost(graph, id) {
                continue;
            }
            let header = info.header();
            let stats = LoopAnalysis::calculate_loop_basic_properties(graph, id, ctx.oracle.as_ref());
            trace!(loop_id = %id, ?stats, "loop statistics");

            let decision = Self::decide(policy, &stats);
            if graph.set_loop_decision(id, decision) {
                debug!(loop_id = %id, %header, %decision, "loop annotated");
                ctx.events
                    .record(EventKind::LoopPolicyAnnotated)
                    .pass(NAME)
                    .message(format!("{} loop at {header}: {decision}", graph.name()));
                changed = true;
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{ArchDefaultPolicy, Arm64Policy, NoOptsPolicy},
        compiler::config::PipelineConfig,
        target::TargetConfig,
    };

    fn stats(instr_num: usize, trip_count: Option<i64>) -> LoopAnalysisInfo {
        LoopAnalysisInfo {
            instr_num,
            bb_num: 2,
            exits_num: 1,
            trip_count,
            ..LoopAnalysisInfo::default()
        }
    }

    #[test]
    fn preference_order() {
        let policy = ArchDefaultPolicy;
        assert_eq!(
            LoopPolicyPass::decide(&policy, &stats(4, Some(6))),
            LoopTransformDecision::FullUnroll { trip_count: 6 }
        );

        let mut invariant_exit = stats(10, Some(7));
        invariant_exit.invariant_exits_num = 1;
        assert_eq!(LoopPolicyPass::decide(&policy, &invariant_exit), LoopTransformDecision::Peel);

        assert_eq!(
            LoopPolicyPass::decide(&policy, &stats(10, Some(100))),
            LoopTransformDecision::Unroll { factor: 2 }
        );
        assert_eq!(LoopPolicyPass::decide(&policy, &stats(10, None)), LoopTransformDecision::None);
    }

    #[test]
    fn preventing_instructions_block_transformations() {
        let mut blocked = stats(4, Some(8));
        blocked.has_instructions_preventing_scalar_peeling = true;
        blocked.has_instructions_preventing_scalar_unrolling = true;
        blocked.invariant_exits_num = 1;
        assert_eq!(
            LoopPolicyPass::decide(&Arm64Policy, &blocked),
            LoopTransformDecision::None
        );
        assert_eq!(
            LoopPolicyPass::decide(&NoOptsPolicy, &stats(1, Some(2))),
            LoopTransformDecision::None
        );
    }

    #[test]
    fn annotation_is_recorded_once() {
        use crate::{analysis::loops::tests::counted_loop, ir::{ConditionKind, DataType}};

        let (mut graph, _, _, _) = counted_loop(DataType::Int32, 0, ConditionKind::LessThan, 8, 1);
        let mut ctx = PassContext::new(TargetConfig::arm64(), PipelineConfig::default());

        assert!(LoopPolicyPass::new().run(&mut graph, &mut ctx).unwrap());
        // 4 instructions * 8 trips = 32 < 35.
        assert_eq!(
            graph.loops()[0].decision(),
            LoopTransformDecision::FullUnroll { trip_count: 8 }
        );
        assert!(!LoopPolicyPass::new().run(&mut graph, &mut ctx).unwrap());
        assert_eq!(ctx.events.count_kind(EventKind::LoopPolicyAnnotated), 1);
    }
}
