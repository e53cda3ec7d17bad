//! Escape analysis for references allocated in the method.
//!
//! A reference is a *singleton* when the allocating instruction is the only
//! name for the object: no phi or type refinement merges it with other
//! values, it is never stored into the heap and never passed to a call.
//! Singletons cannot alias any other reference.

use crate::ir::{Graph, InstrId, InstructionKind};

/// What escape analysis learned about one reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SingletonState {
    /// The reference is the only name of a method-local object.
    pub is_singleton: bool,
    /// Singleton, and never returned to the caller.
    pub is_singleton_and_not_returned: bool,
    /// Singleton, and not recorded in a deoptimization environment.
    pub is_singleton_and_not_deopt_visible: bool,
}

impl SingletonState {
    fn mark_all(&mut self, value: bool) {
        self.is_singleton = value;
        self.is_singleton_and_not_returned = value;
        self.is_singleton_and_not_deopt_visible = value;
    }
}

/// Returns `true` for allocations.
pub(crate) fn is_allocation(kind: &InstructionKind) -> bool {
    matches!(kind, InstructionKind::NewInstance { .. } | InstructionKind::NewArray { .. })
}

/// Returns `true` if `user` creates a second name for its reference inputs.
fn is_aliasing(kind: &InstructionKind) -> bool {
    matches!(
        kind,
        InstructionKind::Phi | InstructionKind::NullCheck | InstructionKind::BoundType { .. }
    )
}

/// Returns `true` if `user` publishes `reference` to the heap or a callee.
fn escapes_to_heap(graph: &Graph, user: InstrId, reference: InstrId) -> bool {
    let instr = graph.instr(user);
    let stored = |slot: usize| instr.inputs().get(slot) == Some(&reference);
    match instr.kind() {
        InstructionKind::Invoke { .. } => true,
        InstructionKind::InstanceFieldSet { .. } | InstructionKind::StaticFieldSet { .. } => stored(1),
        InstructionKind::ArraySet { .. } | InstructionKind::VecStore(_) => stored(2),
        _ => false,
    }
}

/// Computes the singleton state of `reference`.
#[must_use]
pub fn calculate_escape(graph: &Graph, reference: InstrId) -> SingletonState {
    let mut state = SingletonState::default();
    let instr = graph.instr(reference);
    if !is_allocation(instr.kind()) {
        return state;
    }
    state.mark_all(true);

    for use_ in instr.uses() {
        let user = graph.instr(use_.user);
        if is_aliasing(user.kind()) || escapes_to_heap(graph, use_.user, reference) {
            state.mark_all(false);
            return state;
        }
        if matches!(user.kind(), InstructionKind::Return) {
            state.is_singleton_and_not_returned = false;
        }
    }

    let deopt_visible = instr
        .env_uses()
        .iter()
        .any(|use_| matches!(graph.instr(use_.user).kind(), InstructionKind::Deoptimize));
    if deopt_visible {
        state.is_singleton_and_not_deopt_visible = false;
    }
    state
}

/// Returns `true` if `reference` is a singleton that is never returned.
#[must_use]
pub fn does_not_escape(graph: &Graph, reference: InstrId) -> bool {
    calculate_escape(graph, reference).is_singleton_and_not_returned
}

/// Calls `visitor` with every instruction through which `reference` escapes.
///
/// References that were not allocated in the method have escaped before the
/// method started, so the reference itself is reported first. Phis are
/// reported and not followed; callers that track merged names follow them
/// explicitly. Visiting stops early when `visitor` returns `false`.
pub fn visit_escapes(graph: &Graph, reference: InstrId, mut visitor: impl FnMut(InstrId) -> bool) {
    let instr = graph.instr(reference);
    if !is_allocation(instr.kind()) && !visitor(reference) {
        return;
    }
    for use_ in instr.uses() {
        if (is_aliasing(graph.instr(use_.user).kind()) || escapes_to_heap(graph, use_.user, reference))
            && !visitor(use_.user)
        {
            return;
        }
    }
    for use_ in instr.env_uses() {
        if matches!(graph.instr(use_.user).kind(), InstructionKind::Deoptimize) && !visitor(use_.user) {
            return;
        }
    }
}
