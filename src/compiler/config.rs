//! Configuration for the optimization pipeline.
//!
//! This module provides the knobs that control which passes run and the
//! heuristic limits the passes apply.

/// Configuration for the optimization pipeline.
///
/// Controls pass selection, per-pass limits and debugging aids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Maximum operand swaps the reassociation pass performs at one
    /// instruction position before moving on (default: 20).
    pub max_same_position_swaps: usize,

    /// Maximum number of distinct heap locations the load/store analysis
    /// tracks before declaring the method unusable (default: 32).
    pub max_heap_locations: usize,

    /// Run [`crate::ir::Graph::verify`] after every pass (default: on in debug builds).
    pub verify_after_each_pass: bool,

    /// Enable constant folding.
    pub enable_constant_folding: bool,

    /// Enable loop-invariant operand regrouping.
    pub enable_licg: bool,

    /// Enable the target-specific instruction simplifier.
    pub enable_arch_simplifier: bool,

    /// Enable loop peeling and unrolling decisions.
    pub enable_loop_policy: bool,

    /// Enable load/store alias analysis.
    pub enable_load_store_analysis: bool,

    /// Enable write-barrier elimination.
    pub enable_write_barrier_elimination: bool,

    /// Enable read-barrier merging.
    pub enable_gc_optimizer: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_same_position_swaps: 20,
            max_heap_locations: 32,
            verify_after_each_pass: cfg!(debug_assertions),
            enable_constant_folding: true,
            enable_licg: true,
            enable_arch_simplifier: true,
            enable_loop_policy: true,
            enable_load_store_analysis: true,
            enable_write_barrier_elimination: true,
            enable_gc_optimizer: true,
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a "fast" configuration for quick compilation.
    ///
    /// Only the cheap local passes run: constant folding, the target
    /// simplifier and barrier elision. Loop decisions and alias analysis are
    /// skipped and no verification is done between passes.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            verify_after_each_pass: false,
            enable_licg: false,
            enable_loop_policy: false,
            enable_load_store_analysis: false,
            ..Self::default()
        }
    }

    /// Sets the reassociation swap cap.
    #[must_use]
    pub fn with_max_same_position_swaps(mut self, max: usize) -> Self {
        self.max_same_position_swaps = max;
        self
    }

    /// Sets the heap location limit of the load/store analysis.
    #[must_use]
    pub fn with_max_heap_locations(mut self, max: usize) -> Self {
        self.max_heap_locations = max;
        self
    }

    /// Enables or disables verification after each pass.
    #[must_use]
    pub fn with_verification(mut self, enabled: bool) -> Self {
        self.verify_after_each_pass = enabled;
        self
    }

    /// Enables or disables the read-barrier merge pass.
    #[must_use]
    pub fn with_gc_optimizer(mut self, enabled: bool) -> Self {
        self.enable_gc_optimizer = enabled;
        self
    }

    /// Enables or disables the load/store analysis.
    #[must_use]
    pub fn with_load_store_analysis(mut self, enabled: bool) -> Self {
        self.enable_load_store_analysis = enabled;
        self
    }
}
