//! ARC optimization and ownership verification for `sil_ir` functions.
//!
//! This crate provides:
//!
//! - **RC pair elimination** ([`eliminate_rc_pairs`]): a top-down and a
//!   bottom-up dataflow over reference-count states per RC identity
//!   ([`run_dataflow`]), closed into [`RcMatchingSet`]s whose increments
//!   and decrements can be deleted together. Loops can be summarized as
//!   regions ([`DataflowGranularity::Region`]) so pairs around a quiet loop
//!   still match.
//!
//! - **Ownership verification** ([`verify_function`]): the
//!   [`LinearLifetimeChecker`] proves each owned value and borrow scope is
//!   consumed exactly once on every path, with no use after the consume;
//!   [`GuaranteedPhiVerifier`] covers borrows passed through phis.
//!
//! - **Semantic-ARC peepholes** ([`run_semantic_arc`]): dead copies,
//!   redundant moves, ownership conversions and redundant phis, each
//!   guarded by the lifetime checker.
//!
//! - **Drivers** ([`optimize_function`], [`optimize_module`]) configured by
//!   [`ArcOptConfig`]. Module optimization runs functions in parallel.
//!
//! # Design
//!
//! Analyses are recomputed from the function they are handed. The one
//! exception is [`DominanceInfo`], which caches trees against the
//! function's CFG epoch. The only module-level state is the
//! [`DestructorAnalysis`] memo table in [`ArcContext`], which is shared
//! read-mostly across worker threads.
//!
//! # Crate Dependencies
//!
//! `sil_arc` depends on `sil_ir` for the IR, its ownership model and its
//! editing API.

pub mod barrier;
pub mod config;
pub mod dataflow;
pub mod destructor;
pub mod graph;
pub mod lifetime;
pub mod pair_elim;
pub mod pipeline;
pub mod rc_identity;
pub mod ref_count_state;
pub mod region;
pub mod semantic_arc;
pub mod transition;
pub mod verify;

#[cfg(test)]
mod test_helpers;

pub use barrier::{is_barrier_terminator, may_have_unknown_side_effects};
pub use config::{ArcOptConfig, DataflowGranularity};
pub use dataflow::{run_dataflow, BottomUpState, DataflowResult, TopDownState};
pub use destructor::{ArcContext, DestructorAnalysis};
pub use graph::{DeadEndBlocks, DominanceInfo, DominatorTree, PostDominatorTree};
pub use lifetime::{ErrorBehavior, LinearLifetimeChecker, LinearLifetimeError};
pub use pair_elim::{
    build_matching_sets, eliminate_pairs, eliminate_rc_pairs, MatchingSets, RcMatchingSet,
};
pub use pipeline::{optimize_function, optimize_module};
pub use rc_identity::RcIdentity;
pub use region::{LoopForest, NaturalLoop};
pub use semantic_arc::{run_semantic_arc, PeepholeStats};
pub use transition::{classify, classify_inst, NodeRef, TransitionKind};
pub use verify::{lifetime_uses, verify_function, verify_function_named, GuaranteedPhiVerifier};
