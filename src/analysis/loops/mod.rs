//! Loop statistics and loop transformation heuristics.
//!
//! [`LoopAnalysis::calculate_loop_basic_properties`] condenses one loop into a
//! [`LoopAnalysisInfo`]: its size, its exits and, when the induction oracle
//! knows it, its trip count. A [`LoopTransformPolicy`] chosen by
//! [`policy_for`] then turns those numbers into peeling and unrolling
//! decisions for the target.
//!
//! # Example
//!
//! ```rust,ignore
//! use optigraph::analysis::{policy_for, LoopAnalysis, NoInductionInfo};
//! use optigraph::target::InstructionSet;
//!
//! let policy = policy_for(InstructionSet::Arm64);
//! for info in graph.loops() {
//!     let stats = LoopAnalysis::calculate_loop_basic_properties(&graph, info.id(), &NoInductionInfo);
//!     if !policy.is_loop_non_beneficial_for_scalar_opts(&stats) {
//!         println!("{}: factor {}", info.id(), policy.scalar_unrolling_factor(&stats));
//!     }
//! }
//! ```

mod induction;
mod policy;

pub use induction::{BasicInductionOracle, FixedTripCounts, InductionRangeOracle, NoInductionInfo};
pub use policy::{
    policy_for, ArchDefaultPolicy, Arm64Policy, LoopTransformPolicy, NoOptsPolicy, X86_64Policy,
};

use crate::ir::{BlockId, DataType, Graph, InstructionKind, LoopId};

/// Size and shape statistics of one loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopAnalysisInfo {
    /// Number of blocks in the loop, nested loops included.
    pub bb_num: usize,
    /// Number of non-phi instructions in the loop.
    pub instr_num: usize,
    /// Number of edges leaving the loop.
    pub exits_num: usize,
    /// Number of exit branches whose condition is computed outside the loop.
    pub invariant_exits_num: usize,
    /// Whether any instruction produces a 64-bit integer.
    pub has_long_type_instructions: bool,
    /// Whether an instruction forbids peeling the loop.
    pub has_instructions_preventing_scalar_peeling: bool,
    /// Whether an instruction forbids unrolling the loop.
    pub has_instructions_preventing_scalar_unrolling: bool,
    /// Iteration count, when statically known.
    pub trip_count: Option<i64>,
}

impl LoopAnalysisInfo {
    /// Unroll factor meaning "do not unroll".
    pub const NO_UNROLLING_FACTOR: u32 = 1;

    /// Returns `true` if the trip count is statically known.
    #[must_use]
    pub const fn has_known_trip_count(&self) -> bool {
        self.trip_count.is_some()
    }
}

/// Computes [`LoopAnalysisInfo`] for loops of a graph.
pub struct LoopAnalysis;

impl LoopAnalysis {
    /// Gathers the statistics of `loop_id`.
    ///
    /// Allocations and calls prevent both peeling and unrolling: copying them
    /// duplicates environments and safepoints the code generator must keep
    /// distinct.
    #[must_use]
    pub fn calculate_loop_basic_properties(
        graph: &Graph,
        loop_id: LoopId,
        oracle: &dyn InductionRangeOracle,
    ) -> LoopAnalysisInfo {
        let info = graph.loop_info(loop_id);
        let mut stats = LoopAnalysisInfo {
            trip_count: oracle.trip_count(graph, loop_id),
            ..LoopAnalysisInfo::default()
        };

        for index in info.blocks() {
            let block_id = BlockId::new(index);
            let block = graph.block(block_id);
            stats.bb_num += 1;

            for &succ in block.successors() {
                if info.contains(succ) {
                    continue;
                }
                stats.exits_num += 1;
                let invariant = block
                    .last_instruction()
                    .map(|last| graph.instr(last))
                    .filter(|last| matches!(last.kind(), InstructionKind::If))
                    .and_then(|last| last.inputs().first().copied())
                    .is_some_and(|condition| !graph.is_defined_in_loop(condition, loop_id));
                if invariant {
                    stats.invariant_exits_num += 1;
                }
            }

            for id in graph.instructions(block_id) {
                let instr = graph.instr(id);
                stats.instr_num += 1;
                if instr.ty() == DataType::Int64 {
                    stats.has_long_type_instructions = true;
                }
                if matches!(
                    instr.kind(),
                    InstructionKind::NewArray { .. }
                        | InstructionKind::NewInstance { .. }
                        | InstructionKind::Invoke { .. }
                ) {
                    stats.has_instructions_preventing_scalar_peeling = true;
                    stats.has_instructions_preventing_scalar_unrolling = true;
                }
            }
        }
        stats
    }

    /// Counts the non-phi instructions of one block.
    #[must_use]
    pub fn block_instruction_count(graph: &Graph, block: BlockId) -> usize {
        graph.instructions(block).count()
    }
}
