//! The interface every optimization pass implements.

use crate::{compiler::context::PassContext, ir::Graph, Result};

/// An optimization that rewrites one method's graph in place.
///
/// Passes run exactly once per pipeline position; the return value of
/// [`OptimizationPass::run`] feeds statistics and reports only and never
/// causes a pass to be re-scheduled.
///
/// # Failure
///
/// A pass that finds nothing to do, or whose analysis does not apply to the
/// method, returns `Ok(false)`. `Err` is reserved for broken graph invariants:
/// a skipped optimization is always safe, a corrupted graph never is.
///
/// # Derived data
///
/// The pipeline guarantees that dominance and loop information are current
/// when `run` is called. A pass that adds or removes blocks or edges leaves
/// them stale through the graph mutators and the pipeline rebuilds them
/// before the next pass.
pub trait OptimizationPass: Send {
    /// Unique snake-case name for logging and pass selection.
    fn name(&self) -> &'static str;

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }

    /// Whether the pass needs an exit block.
    ///
    /// The pipeline skips such passes on methods that never return.
    fn requires_exit_block(&self) -> bool {
        false
    }

    /// Runs the pass. Returns `true` if the graph or its annotations changed.
    ///
    /// # Errors
    ///
    /// Returns an error if a graph invariant is found broken.
    fn run(&mut self, graph: &mut Graph, ctx: &mut PassContext) -> Result<bool>;
}
