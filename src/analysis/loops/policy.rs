//! Per-architecture loop peeling and unrolling heuristics.

use crate::{
    analysis::loops::LoopAnalysisInfo,
    ir::{BinaryOp, BlockId, Graph, InstructionKind, UnaryOp},
    target::InstructionSet,
};

const NO_UNROLLING: u32 = LoopAnalysisInfo::NO_UNROLLING_FACTOR;

/// Target heuristics deciding which scalar and vector loop transformations pay off.
pub trait LoopTransformPolicy: Send + Sync {
    /// Returns `true` if the loop is too big, or otherwise unsuitable, for
    /// scalar peeling and unrolling.
    fn is_loop_non_beneficial_for_scalar_opts(&self, stats: &LoopAnalysisInfo) -> bool;

    /// Returns the scalar unroll factor, [`LoopAnalysisInfo::NO_UNROLLING_FACTOR`]
    /// when the loop should not be unrolled.
    fn scalar_unrolling_factor(&self, stats: &LoopAnalysisInfo) -> u32;

    /// Returns `true` if scalar loop peeling is enabled on this target.
    fn is_loop_peeling_enabled(&self) -> bool;

    /// Returns `true` if replacing the loop by straight-line copies is
    /// profitable. Only meaningful for loops with a known trip count.
    fn is_full_unrolling_beneficial(&self, stats: &LoopAnalysisInfo) -> bool;

    /// Returns the unroll factor of a vectorized loop whose body is `block`.
    ///
    /// `max_peel` is the number of scalar iterations peeled for alignment and
    /// `vector_length` the number of lanes per vector iteration.
    fn simd_unrolling_factor(
        &self,
        _graph: &Graph,
        _block: BlockId,
        _trip_count: Option<i64>,
        _max_peel: u32,
        _vector_length: u32,
    ) -> u32 {
        NO_UNROLLING
    }
}

/// Returns the policy for `isa`.
#[must_use]
pub fn policy_for(isa: InstructionSet) -> &'static dyn LoopTransformPolicy {
    match isa {
        InstructionSet::Arm64 => &Arm64Policy,
        InstructionSet::X86_64 => &X86_64Policy,
        InstructionSet::None => &NoOptsPolicy,
        InstructionSet::Arm | InstructionSet::Thumb2 | InstructionSet::X86 | InstructionSet::Riscv64 => {
            &ArchDefaultPolicy
        }
    }
}

fn is_loop_too_big(stats: &LoopAnalysisInfo, max_instructions: usize, max_blocks: usize) -> bool {
    stats.instr_num >= max_instructions || stats.bb_num >= max_blocks
}

/// Largest power of two not above `value`, 0 for 0.
const fn trunc_to_power_of_two(value: u32) -> u32 {
    if value == 0 {
        0
    } else {
        1 << (31 - value.leading_zeros())
    }
}

/// Heuristics for targets without a tuned policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchDefaultPolicy;

impl ArchDefaultPolicy {
    const MAX_BODY_SIZE_INSTR: usize = 17;
    const MAX_BODY_SIZE_BLOCKS: usize = 6;
    const FULL_UNROLL_MAX_INSTR: i64 = 35;
    const MAX_UNROLL_FACTOR: u32 = 2;
}

impl LoopTransformPolicy for ArchDefaultPolicy {
    fn is_loop_non_beneficial_for_scalar_opts(&self, stats: &LoopAnalysisInfo) -> bool {
        stats.has_long_type_instructions
            || is_loop_too_big(stats, Self::MAX_BODY_SIZE_INSTR, Self::MAX_BODY_SIZE_BLOCKS)
    }

    fn scalar_unrolling_factor(&self, stats: &LoopAnalysisInfo) -> u32 {
        let Some(trip_count) = stats.trip_count else {
            return NO_UNROLLING;
        };
        let factor = Self::MAX_UNROLL_FACTOR;
        if trip_count < i64::from(factor) || trip_count % i64::from(factor) != 0 {
            return NO_UNROLLING;
        }
        factor
    }

    fn is_loop_peeling_enabled(&self) -> bool {
        true
    }

    fn is_full_unrolling_beneficial(&self, stats: &LoopAnalysisInfo) -> bool {
        let Some(trip_count) = stats.trip_count else {
            return false;
        };
        let instructions = i64::try_from(stats.instr_num).unwrap_or(i64::MAX);
        trip_count.saturating_mul(instructions) < Self::FULL_UNROLL_MAX_INSTR
    }
}

/// AArch64 heuristics: larger scalar bodies, wide types allowed, vector unrolling.
#[derive(Debug, Clone, Copy, Default)]
pub struct Arm64Policy;

impl Arm64Policy {
    const SCALAR_MAX_BODY_SIZE_INSTR: usize = 40;
    const SCALAR_MAX_BODY_SIZE_BLOCKS: usize = 8;
    const SCALAR_UNROLL_FACTOR: u32 = 4;
    const SIMD_MAX_BODY_SIZE_INSTR: u32 = 50;
    const SIMD_MAX_UNROLL_FACTOR: u32 = 8;
}

impl LoopTransformPolicy for Arm64Policy {
    fn is_loop_non_beneficial_for_scalar_opts(&self, stats: &LoopAnalysisInfo) -> bool {
        is_loop_too_big(
            stats,
            Self::SCALAR_MAX_BODY_SIZE_INSTR,
            Self::SCALAR_MAX_BODY_SIZE_BLOCKS,
        )
    }

    fn scalar_unrolling_factor(&self, stats: &LoopAnalysisInfo) -> u32 {
        let Some(trip_count) = stats.trip_count else {
            return NO_UNROLLING;
        };
        let factor = Self::SCALAR_UNROLL_FACTOR;
        if trip_count < i64::from(factor) || trip_count % i64::from(factor) != 0 {
            return NO_UNROLLING;
        }
        factor
    }

    fn is_loop_peeling_enabled(&self) -> bool {
        true
    }

    fn is_full_unrolling_beneficial(&self, stats: &LoopAnalysisInfo) -> bool {
        ArchDefaultPolicy.is_full_unrolling_beneficial(stats)
    }

    fn simd_unrolling_factor(
        &self,
        graph: &Graph,
        block: BlockId,
        trip_count: Option<i64>,
        max_peel: u32,
        vector_length: u32,
    ) -> u32 {
        let Some(trip_count) = trip_count else {
            return NO_UNROLLING;
        };
        if vector_length == 0 {
            return NO_UNROLLING;
        }
        let minimum = 2 * i64::from(vector_length) + i64::from(max_peel);
        if trip_count < minimum {
            return NO_UNROLLING;
        }

        let instruction_count = u32::try_from(graph.instructions(block).count()).unwrap_or(u32::MAX);
        if instruction_count >= Self::SIMD_MAX_BODY_SIZE_INSTR {
            return NO_UNROLLING;
        }

        // At least one vector iteration must remain after unrolling, and the
        // unrolled body must stay under the size budget.
        let by_size = Self::SIMD_MAX_BODY_SIZE_INSTR / instruction_count.max(1);
        let by_trips = u32::try_from((trip_count - i64::from(max_peel)) / i64::from(vector_length))
            .unwrap_or(u32::MAX);
        trunc_to_power_of_two(by_size.min(by_trips).min(Self::SIMD_MAX_UNROLL_FACTOR)).max(NO_UNROLLING)
    }
}

/// x86-64 heuristics: scalar decisions as the default policy, vector
/// unrolling driven by an estimate of emitted machine instructions.
#[derive(Debug, Clone, Copy, Default)]
pub struct X86_64Policy;

impl X86_64Policy {
    /// log2 of the largest unroll factor.
    const MAX_UNROLL_FACTOR_LOG2: u32 = 2;
    const UNROLLED_MAX_BODY_SIZE_INSTR: u32 = 28;

    /// Approximate number of machine instructions emitted for `kind`.
    #[must_use]
    pub fn machine_instruction_count(kind: &InstructionKind) -> u32 {
        match kind {
            InstructionKind::Unary(UnaryOp::Abs) => 3,
            InstructionKind::Binary(op) => match op {
                BinaryOp::Div => 8,
                BinaryOp::Rem => 11,
                BinaryOp::Min | BinaryOp::Max => 2,
                _ => 1,
            },
            InstructionKind::DivZeroCheck => 2,
            InstructionKind::Condition { .. } => 3,
            InstructionKind::If => 2,
            InstructionKind::InstanceFieldGet { .. } => 2,
            _ => 1,
        }
    }

    /// Returns the unroll factor whose body fits the size budget, 1 if none does.
    ///
    /// The header is costed separately because unrolling does not copy it;
    /// suspend checks and gotos are ignored since the unrolled body keeps one
    /// of each.
    fn unrolling_factor(graph: &Graph, block: BlockId) -> u32 {
        let Some(info) = graph.loop_of(block) else {
            return NO_UNROLLING;
        };
        let header = info.header();

        let mut header_cost = 0u32;
        let mut body_cost = 0u32;
        for index in info.blocks() {
            let member = BlockId::new(index);
            let cost: u32 = graph
                .instructions(member)
                .map(|id| graph.instr(id).kind())
                .filter(|kind| !matches!(kind, InstructionKind::SuspendCheck | InstructionKind::Goto))
                .map(Self::machine_instruction_count)
                .sum();
            if member == header {
                header_cost = cost;
            } else {
                body_cost += cost;
            }
        }

        // 3 for the goto plus the compare and branch in the header.
        let Some(desired) = Self::UNROLLED_MAX_BODY_SIZE_INSTR.checked_sub(header_cost + 3) else {
            return NO_UNROLLING;
        };
        if desired < 2 * body_cost {
            return NO_UNROLLING;
        }
        let mut log2 = Self::MAX_UNROLL_FACTOR_LOG2;
        while log2 > 0 && (desired >> log2) < body_cost {
            log2 -= 1;
        }
        1 << log2
    }
}

impl LoopTransformPolicy for X86_64Policy {
    fn is_loop_non_beneficial_for_scalar_opts(&self, stats: &LoopAnalysisInfo) -> bool {
        ArchDefaultPolicy.is_loop_non_beneficial_for_scalar_opts(stats)
    }

    fn scalar_unrolling_factor(&self, stats: &LoopAnalysisInfo) -> u32 {
        ArchDefaultPolicy.scalar_unrolling_factor(stats)
    }

    fn is_loop_peeling_enabled(&self) -> bool {
        true
    }

    fn is_full_unrolling_beneficial(&self, stats: &LoopAnalysisInfo) -> bool {
        ArchDefaultPolicy.is_full_unrolling_beneficial(stats)
    }

    fn simd_unrolling_factor(
        &self,
        graph: &Graph,
        block: BlockId,
        trip_count: Option<i64>,
        max_peel: u32,
        vector_length: u32,
    ) -> u32 {
        if vector_length == 0 {
            return NO_UNROLLING;
        }
        let budget = Self::unrolling_factor(graph, block);
        match trip_count {
            None | Some(0) => budget.max(NO_UNROLLING),
            Some(trip_count) => {
                if trip_count < 2 * i64::from(vector_length) + i64::from(max_peel) || budget <= 1 {
                    return NO_UNROLLING;
                }
                let by_trips =
                    u32::try_from((trip_count - i64::from(max_peel)) / i64::from(vector_length))
                        .unwrap_or(u32::MAX);
                trunc_to_power_of_two(by_trips.min(budget)).max(NO_UNROLLING)
            }
        }
    }
}

/// Policy that disables every loop transformation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOptsPolicy;

impl LoopTransformPolicy for NoOptsPolicy {
    fn is_loop_non_beneficial_for_scalar_opts(&self, _stats: &LoopAnalysisInfo) -> bool {
        true
    }

    fn scalar_unrolling_factor(&self, _stats: &LoopAnalysisInfo) -> u32 {
        NO_UNROLLING
    }

    fn is_loop_peeling_enabled(&self) -> bool {
        false
    }

    fn is_full_unrolling_beneficial(&self, _stats: &LoopAnalysisInfo) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::loops::tests::counted_loop,
        ir::{ConditionKind, DataType},
    };

    fn stats(instr_num: usize, bb_num: usize, trip_count: Option<i64>) -> LoopAnalysisInfo {
        LoopAnalysisInfo {
            instr_num,
            bb_num,
            exits_num: 1,
            trip_count,
            ..LoopAnalysisInfo::default()
        }
    }

    #[test]
    fn power_of_two_truncation() {
        assert_eq!(trunc_to_power_of_two(0), 0);
        assert_eq!(trunc_to_power_of_two(1), 1);
        assert_eq!(trunc_to_power_of_two(7), 4);
        assert_eq!(trunc_to_power_of_two(8), 8);
    }

    #[test]
    fn default_policy_thresholds() {
        let policy = ArchDefaultPolicy;
        assert!(!policy.is_loop_non_beneficial_for_scalar_opts(&stats(16, 5, None)));
        assert!(policy.is_loop_non_beneficial_for_scalar_opts(&stats(17, 2, None)));
        assert!(policy.is_loop_non_beneficial_for_scalar_opts(&stats(4, 6, None)));

        let mut wide = stats(4, 2, None);
        wide.has_long_type_instructions = true;
        assert!(policy.is_loop_non_beneficial_for_scalar_opts(&wide));
        assert!(!Arm64Policy.is_loop_non_beneficial_for_scalar_opts(&wide));
    }

    #[test]
    fn scalar_factor_needs_divisible_trip_count() {
        let policy = ArchDefaultPolicy;
        assert_eq!(policy.scalar_unrolling_factor(&stats(4, 2, Some(10))), 2);
        assert_eq!(policy.scalar_unrolling_factor(&stats(4, 2, Some(9))), NO_UNROLLING);
        assert_eq!(policy.scalar_unrolling_factor(&stats(4, 2, Some(1))), NO_UNROLLING);
        assert_eq!(policy.scalar_unrolling_factor(&stats(4, 2, None)), NO_UNROLLING);

        assert_eq!(Arm64Policy.scalar_unrolling_factor(&stats(4, 2, Some(12))), 4);
        assert_eq!(Arm64Policy.scalar_unrolling_factor(&stats(4, 2, Some(6))), NO_UNROLLING);
        assert_eq!(Arm64Policy.scalar_unrolling_factor(&stats(4, 2, Some(10))), NO_UNROLLING);
    }

    #[test]
    fn full_unroll_threshold() {
        let policy = ArchDefaultPolicy;
        assert!(policy.is_full_unrolling_beneficial(&stats(4, 2, Some(8))));
        assert!(!policy.is_full_unrolling_beneficial(&stats(5, 2, Some(7))));
        assert!(!policy.is_full_unrolling_beneficial(&stats(1, 1, None)));
    }

    #[test]
    fn no_opts_disables_everything() {
        let policy = policy_for(InstructionSet::None);
        let small = stats(1, 1, Some(2));
        assert!(policy.is_loop_non_beneficial_for_scalar_opts(&small));
        assert!(!policy.is_loop_peeling_enabled());
        assert!(!policy.is_full_unrolling_beneficial(&small));
        assert_eq!(policy.scalar_unrolling_factor(&small), NO_UNROLLING);
    }

    #[test]
    fn arm64_simd_factor() {
        let (graph, _, body, _) = counted_loop(DataType::Int32, 0, ConditionKind::LessThan, 100, 1);
        let policy = policy_for(InstructionSet::Arm64);
        // Body holds 2 instructions: 50 / 2 = 25, (100 - 0) / 4 = 25, capped at 8.
        assert_eq!(policy.simd_unrolling_factor(&graph, body, Some(100), 0, 4), 8);
        // (20 - 2) / 4 = 4.
        assert_eq!(policy.simd_unrolling_factor(&graph, body, Some(20), 2, 4), 4);
        // Fewer than two vector iterations beyond the peel.
        assert_eq!(policy.simd_unrolling_factor(&graph, body, Some(9), 2, 4), NO_UNROLLING);
        assert_eq!(policy.simd_unrolling_factor(&graph, body, None, 0, 4), NO_UNROLLING);
    }

    #[test]
    fn x86_64_cost_model() {
        let (graph, _, body, _) = counted_loop(DataType::Int32, 0, ConditionKind::LessThan, 100, 1);
        // Header costs condition 3 + if 2; body costs one add.
        // desired = 28 - 5 - 3 = 20, 20 >> 2 = 5 >= 1 so the factor is 4.
        assert_eq!(X86_64Policy::unrolling_factor(&graph, body), 4);

        let policy = policy_for(InstructionSet::X86_64);
        assert_eq!(policy.simd_unrolling_factor(&graph, body, None, 0, 4), 4);
        assert_eq!(policy.simd_unrolling_factor(&graph, body, Some(12), 0, 4), 2);
        assert_eq!(policy.simd_unrolling_factor(&graph, body, Some(7), 0, 4), NO_UNROLLING);
        assert_eq!(
            X86_64Policy::machine_instruction_count(&InstructionKind::Binary(BinaryOp::Rem)),
            11
        );
    }

    #[test]
    fn factory_dispatch() {
        let small = stats(20, 2, None);
        // 20 instructions is too big by default but fine on arm64.
        assert!(policy_for(InstructionSet::Arm).is_loop_non_beneficial_for_scalar_opts(&small));
        assert!(policy_for(InstructionSet::Riscv64).is_loop_non_beneficial_for_scalar_opts(&small));
        assert!(!policy_for(InstructionSet::Arm64).is_loop_non_beneficial_for_scalar_opts(&small));
        assert!(policy_for(InstructionSet::X86_64).is_loop_peeling_enabled());
    }
}
