//! The built-in optimization passes.
//!
//! | Pass | Effect |
//! |------|--------|
//! | [`ConstantFoldingPass`] | folds constant expressions, absorbing inputs and branch-implied values |
//! | [`LicgPass`] | regroups operands so loop-invariant values meet |
//! | [`InstructionSimplifierArchPass`] | fuses instruction pairs the target executes as one |
//! | [`LoopPolicyPass`] | annotates innermost loops with peeling and unrolling decisions |
//! | [`LoadStoreAnalysisPass`] | publishes heap locations and their aliasing |
//! | [`WriteBarrierEliminationPass`] | drops write barriers covered by an earlier store |
//! | [`GcOptimizerPass`] | lets adjacent reference reads share a read barrier |

mod constant_folding;
mod gc_optimizer;
mod licg;
mod load_store_analysis;
mod loop_policy;
mod simplifier;
mod write_barrier_elimination;

pub use constant_folding::ConstantFoldingPass;
pub use gc_optimizer::GcOptimizerPass;
pub use licg::LicgPass;
pub use load_store_analysis::LoadStoreAnalysisPass;
pub use loop_policy::LoopPolicyPass;
pub use simplifier::InstructionSimplifierArchPass;
pub use write_barrier_elimination::WriteBarrierEliminationPass;
