//! Trip count providers for the loop analysis.
//!
//! The loop analysis never derives iteration counts itself; it asks an
//! [`InductionRangeOracle`]. Three providers ship with the crate:
//!
//! - [`BasicInductionOracle`] recognizes the canonical counted loop whose
//!   header tests a linear induction variable against a constant bound
//! - [`FixedTripCounts`] answers from a table keyed by loop header, for
//!   callers that computed the counts elsewhere
//! - [`NoInductionInfo`] never knows a trip count

use rustc_hash::FxHashMap;

use crate::ir::{BinaryOp, BlockId, ConditionKind, DataType, Graph, InstrId, InstructionKind, LoopId};

/// Source of statically known loop trip counts.
pub trait InductionRangeOracle: Send + Sync {
    /// Returns how many times the body of `loop_id` executes, if known.
    fn trip_count(&self, graph: &Graph, loop_id: LoopId) -> Option<i64>;
}

/// Oracle that never knows a trip count.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInductionInfo;

impl InductionRangeOracle for NoInductionInfo {
    fn trip_count(&self, _graph: &Graph, _loop_id: LoopId) -> Option<i64> {
        None
    }
}

/// Oracle answering from a table of trip counts keyed by loop header.
#[derive(Debug, Clone, Default)]
pub struct FixedTripCounts {
    counts: FxHashMap<BlockId, i64>,
}

impl FixedTripCounts {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the trip count of the loop headed by `header`.
    #[must_use]
    pub fn with(mut self, header: BlockId, trip_count: i64) -> Self {
        self.counts.insert(header, trip_count);
        self
    }

    /// Records the trip count of the loop headed by `header`.
    pub fn insert(&mut self, header: BlockId, trip_count: i64) {
        self.counts.insert(header, trip_count);
    }
}

impl InductionRangeOracle for FixedTripCounts {
    fn trip_count(&self, graph: &Graph, loop_id: LoopId) -> Option<i64> {
        let header = graph.loops().get(loop_id.index())?.header();
        self.counts.get(&header).copied()
    }
}

/// Oracle for loops of the shape
///
/// ```text
/// pre:    goto header
/// header: i = phi(c0, i')
///         if (i <cond> c1) ...      // one edge stays in the loop
/// latch:  i' = i + s                // or i - s
///         goto header
/// ```
///
/// with `c0`, `c1` and `s` integer constants, a single back edge and a single
/// exit edge (the header test). The count is computed in 128-bit arithmetic
/// and rejected if the induction variable would wrap on the final step.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicInductionOracle;

/// A recognized counted loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CountedLoop {
    init: i128,
    bound: i128,
    stride: i128,
    /// The test that keeps the loop running, with the induction variable on the left.
    stay: ConditionKind,
    ty: DataType,
}

impl InductionRangeOracle for BasicInductionOracle {
    fn trip_count(&self, graph: &Graph, loop_id: LoopId) -> Option<i64> {
        let counted = recognize(graph, loop_id)?;
        let trips = evaluate(&counted)?;
        i64::try_from(trips).ok()
    }
}

fn int_constant(graph: &Graph, id: InstrId) -> Option<i128> {
    let instr = graph.instr(id);
    if !instr.ty().is_int_or_long() {
        return None;
    }
    instr.as_constant()?.as_i64().map(i128::from)
}

/// Predicate `p'` with `a p b == b p' a`.
const fn mirror(kind: ConditionKind) -> ConditionKind {
    match kind {
        ConditionKind::LessThan => ConditionKind::GreaterThan,
        ConditionKind::LessThanOrEqual => ConditionKind::GreaterThanOrEqual,
        ConditionKind::GreaterThan => ConditionKind::LessThan,
        ConditionKind::GreaterThanOrEqual => ConditionKind::LessThanOrEqual,
        ConditionKind::Below => ConditionKind::Above,
        ConditionKind::BelowOrEqual => ConditionKind::AboveOrEqual,
        ConditionKind::Above => ConditionKind::Below,
        ConditionKind::AboveOrEqual => ConditionKind::BelowOrEqual,
        other => other,
    }
}

/// Predicate `p'` with `a p' b == !(a p b)` for integer operands.
const fn negate(kind: ConditionKind) -> ConditionKind {
    match kind {
        ConditionKind::Equal => ConditionKind::NotEqual,
        ConditionKind::NotEqual => ConditionKind::Equal,
        ConditionKind::LessThan => ConditionKind::GreaterThanOrEqual,
        ConditionKind::LessThanOrEqual => ConditionKind::GreaterThan,
        ConditionKind::GreaterThan => ConditionKind::LessThanOrEqual,
        ConditionKind::GreaterThanOrEqual => ConditionKind::LessThan,
        ConditionKind::Below => ConditionKind::AboveOrEqual,
        ConditionKind::BelowOrEqual => ConditionKind::Above,
        ConditionKind::Above => ConditionKind::BelowOrEqual,
        ConditionKind::AboveOrEqual => ConditionKind::Below,
    }
}

fn recognize(graph: &Graph, loop_id: LoopId) -> Option<CountedLoop> {
    let info = graph.loops().get(loop_id.index())?;
    if info.is_irreducible() {
        return None;
    }
    let [latch] = *info.back_edges() else {
        return None;
    };
    let pre_header = info.pre_header()?;
    let header = graph.block(info.header());

    // Only the header test may leave the loop.
    let exits: usize = info
        .blocks()
        .iter()
        .map(|b| {
            graph
                .block(BlockId::new(b))
                .successors()
                .iter()
                .filter(|s| !info.contains(**s))
                .count()
        })
        .sum();
    if exits != 1 {
        return None;
    }

    let branch = graph.instr(header.last_instruction()?);
    if !matches!(branch.kind(), InstructionKind::If) {
        return None;
    }
    let condition = graph.instr(*branch.inputs().first()?);
    let InstructionKind::Condition { kind, .. } = *condition.kind() else {
        return None;
    };
    let [lhs, rhs] = *condition.inputs() else {
        return None;
    };

    let is_header_phi = |id: InstrId| header.phis().contains(&id);
    let (phi, bound, kind) = if is_header_phi(lhs) {
        (lhs, int_constant(graph, rhs)?, kind)
    } else if is_header_phi(rhs) {
        (rhs, int_constant(graph, lhs)?, mirror(kind))
    } else {
        return None;
    };
    if kind.is_unsigned() {
        return None;
    }

    let stay = match *header.successors() {
        [taken, _] if info.contains(taken) => kind,
        [_, fallthrough] if info.contains(fallthrough) => negate(kind),
        _ => return None,
    };

    let phi_instr = graph.instr(phi);
    let ty = phi_instr.ty();
    if !ty.is_int_or_long() {
        return None;
    }
    let init = int_constant(graph, *phi_instr.inputs().get(header.predecessor_index(pre_header)?)?)?;
    let update = graph.instr(*phi_instr.inputs().get(header.predecessor_index(latch)?)?);
    let [a, b] = *update.inputs() else {
        return None;
    };
    let stride = match *update.kind() {
        InstructionKind::Binary(BinaryOp::Add) if a == phi => int_constant(graph, b)?,
        InstructionKind::Binary(BinaryOp::Add) if b == phi => int_constant(graph, a)?,
        InstructionKind::Binary(BinaryOp::Sub) if a == phi => -int_constant(graph, b)?,
        _ => return None,
    };
    if stride == 0 {
        return None;
    }

    Some(CountedLoop {
        init,
        bound,
        stride,
        stay,
        ty,
    })
}

fn holds(kind: ConditionKind, lhs: i128, rhs: i128) -> bool {
    match kind {
        ConditionKind::Equal => lhs == rhs,
        ConditionKind::NotEqual => lhs != rhs,
        ConditionKind::LessThan => lhs < rhs,
        ConditionKind::LessThanOrEqual => lhs <= rhs,
        ConditionKind::GreaterThan => lhs > rhs,
        ConditionKind::GreaterThanOrEqual => lhs >= rhs,
        _ => false,
    }
}

/// Number of iterations of a recognized loop, or `None` if it never exits
/// without wrapping.
fn evaluate(counted: &CountedLoop) -> Option<i128> {
    let CountedLoop {
        init,
        bound,
        stride,
        stay,
        ty,
    } = *counted;

    if !holds(stay, init, bound) {
        return Some(0);
    }

    let trips = match stay {
        ConditionKind::LessThan if stride > 0 => (bound - init + stride - 1) / stride,
        ConditionKind::LessThanOrEqual if stride > 0 => (bound - init) / stride + 1,
        ConditionKind::GreaterThan if stride < 0 => (init - bound - stride - 1) / -stride,
        ConditionKind::GreaterThanOrEqual if stride < 0 => (init - bound) / -stride + 1,
        ConditionKind::NotEqual => {
            let distance = bound - init;
            if distance % stride != 0 || distance / stride <= 0 {
                return None;
            }
            distance / stride
        }
        ConditionKind::Equal => 1,
        _ => return None,
    };

    // The value produced by the last update must be representable.
    let last = init + trips * stride;
    let (min, max) = match ty {
        DataType::Int64 => (i128::from(i64::MIN), i128::from(i64::MAX)),
        _ => (i128::from(i32::MIN), i128::from(i32::MAX)),
    };
    (min..=max).contains(&last).then_some(trips)
}
