//! Optimizer entry points.
//!
//! [`optimize_function`] runs pair elimination and the ownership
//! peepholes on one function; [`optimize_module`] runs it over every
//! function of a module in parallel. Functions only share the read-only
//! [`ArcContext`], so each worker owns its function outright.

use rayon::prelude::*;

use sil_ir::{Function, Module};

use crate::lifetime::ErrorBehavior;
use crate::pair_elim::eliminate_rc_pairs;
use crate::semantic_arc::run_semantic_arc;
use crate::verify::{verify_function, verify_function_named};
use crate::{ArcContext, ArcOptConfig};

/// Optimize one function. Returns whether anything changed.
///
/// With [`ArcOptConfig::verify_ownership`] set, functions in ownership
/// form are verified afterwards and violations are fatal. In debug builds a
/// function that fails [`Function::validate`] is left untouched.
pub fn optimize_function(func: &mut Function, ctx: &ArcContext, config: &ArcOptConfig) -> bool {
    if cfg!(debug_assertions) {
        if let Err(err) = func.validate() {
            tracing::error!(
                function = func.name().raw(),
                %err,
                "malformed function before ARC optimization",
            );
            return false;
        }
    }

    let pairs = if config.enable_pair_elimination {
        eliminate_rc_pairs(func, ctx, config)
    } else {
        0
    };
    let peepholes = if config.enable_semantic_arc {
        run_semantic_arc(func, config).total()
    } else {
        0
    };

    if config.verify_ownership && func.has_ownership() {
        let behavior = ErrorBehavior::PRINT_MESSAGE_AND_ASSERT;
        match ctx.function_name(func.name()) {
            Some(name) => verify_function_named(func, name, behavior),
            None => verify_function(func, behavior),
        };
    }

    let changed = pairs + peepholes > 0;
    tracing::debug!(
        function = func.name().raw(),
        pairs,
        peepholes,
        changed,
        "ARC optimization done",
    );
    changed
}

/// Optimize every function of `module` in parallel. Returns the number of
/// functions that changed.
pub fn optimize_module(module: &mut Module, config: &ArcOptConfig) -> usize {
    let ctx = ArcContext::for_module(module);
    let changed: usize = module
        .functions
        .par_iter_mut()
        .map(|func| usize::from(optimize_function(func, &ctx, config)))
        .sum();
    tracing::debug!(
        functions = module.functions.len(),
        changed,
        "ARC module optimization done",
    );
    changed
}
