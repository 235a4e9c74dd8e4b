//! Optimizer configuration.
//!
//! Every knob the passes read is a field here and is threaded explicitly
//! into [`optimize_function`](crate::optimize_function) and
//! [`optimize_module`](crate::optimize_module). Nothing is process-global,
//! so two modules can be optimized with different settings concurrently.

/// Unit of dataflow state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DataflowGranularity {
    /// Every basic block is a node. Back edges close all state.
    #[default]
    Block,
    /// Natural loops are collapsed into summarized region nodes so state
    /// can flow around them. Falls back to `Block` on irreducible CFGs.
    Region,
}

/// Configuration for the ARC optimizer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArcOptConfig {
    pub granularity: DataflowGranularity,
    /// Remove matched retain/release pairs.
    pub enable_pair_elimination: bool,
    /// Run the ownership peepholes (dead copies, redundant moves,
    /// ownership conversions, redundant phis) on functions in ownership
    /// form.
    pub enable_semantic_arc: bool,
    /// Restrict the ownership peepholes to dead-copy and
    /// ownership-conversion elimination.
    pub only_mandatory_peepholes: bool,
    /// Verify ownership after optimizing. Violations print and panic.
    pub verify_ownership: bool,
    /// Upper bound on analysis/elimination rounds per function.
    pub max_iterations: u32,
}

impl Default for ArcOptConfig {
    fn default() -> Self {
        Self {
            granularity: DataflowGranularity::Block,
            enable_pair_elimination: true,
            enable_semantic_arc: true,
            only_mandatory_peepholes: false,
            verify_ownership: cfg!(debug_assertions),
            max_iterations: 8,
        }
    }
}

impl ArcOptConfig {
    /// The minimal pipeline run at every optimization level.
    pub fn mandatory() -> Self {
        Self {
            enable_pair_elimination: false,
            only_mandatory_peepholes: true,
            ..Self::default()
        }
    }

    /// Region granularity and every peephole.
    pub fn aggressive() -> Self {
        Self {
            granularity: DataflowGranularity::Region,
            max_iterations: 16,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_granularity(mut self, granularity: DataflowGranularity) -> Self {
        self.granularity = granularity;
        self
    }

    #[must_use]
    pub fn with_pair_elimination(mut self, enabled: bool) -> Self {
        self.enable_pair_elimination = enabled;
        self
    }

    #[must_use]
    pub fn with_semantic_arc(mut self, enabled: bool) -> Self {
        self.enable_semantic_arc = enabled;
        self
    }

    #[must_use]
    pub fn with_only_mandatory_peepholes(mut self, only: bool) -> Self {
        self.only_mandatory_peepholes = only;
        self
    }

    #[must_use]
    pub fn with_verify_ownership(mut self, verify: bool) -> Self {
        self.verify_ownership = verify;
        self
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}
