//! Matching sets and retain/release pair elimination.
//!
//! The dataflow relates each matched increment to the decrements it reaches
//! (bottom-up) and each matched decrement to the increments that reach it
//! (top-down). A matching set is the closure of one increment under both
//! relations: every increment in it is balanced by the decrements in it on
//! every path, so the whole set can be deleted together.
//!
//! A closed set is eliminated only when it is provably redundant:
//!
//! - every member was matched in both directions;
//! - every top-down state comes from a `StrongIncrement` (an entrance has
//!   no instruction to delete);
//! - no state saw nesting;
//! - either no use intervened anywhere (all states clean), or every
//!   top-down state is known safe, so something else holds the object alive
//!   across the uses.
//!
//! Sets rejected for nesting are counted as suppressed and logged.

use std::collections::BTreeSet;

use rustc_hash::FxHashSet;

use sil_ir::{Function, InstId, ValueId};

use crate::dataflow::{run_dataflow, DataflowResult};
use crate::graph::DominatorTree;
use crate::{ArcContext, ArcOptConfig, TransitionKind};

/// Increments and decrements of one root that balance each other.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RcMatchingSet {
    pub root: ValueId,
    pub increments: BTreeSet<InstId>,
    pub decrements: BTreeSet<InstId>,
}

impl RcMatchingSet {
    /// Every `(increment, decrement)` pair the set relates.
    pub fn pairs(&self) -> impl Iterator<Item = (InstId, InstId)> + '_ {
        self.increments
            .iter()
            .flat_map(|&i| self.decrements.iter().map(move |&d| (i, d)))
    }

    /// Increments and decrements together.
    pub fn members(&self) -> impl Iterator<Item = InstId> + '_ {
        self.increments.iter().chain(&self.decrements).copied()
    }
}

/// Output of [`build_matching_sets`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatchingSets {
    /// Sets that may be deleted.
    pub sets: Vec<RcMatchingSet>,
    /// Closed sets rejected because a state saw nesting.
    pub suppressed: usize,
}

/// Facts gathered while closing one set.
struct Closure {
    increments: BTreeSet<InstId>,
    decrements: BTreeSet<InstId>,
    complete: bool,
    nesting: bool,
    all_clean: bool,
    all_known_safe: bool,
}

fn close_over(result: &DataflowResult, start: InstId) -> Closure {
    let mut closure = Closure {
        increments: BTreeSet::from([start]),
        decrements: BTreeSet::new(),
        complete: true,
        nesting: false,
        all_clean: true,
        all_known_safe: true,
    };
    let mut incs = vec![start];
    let mut decs = Vec::new();

    loop {
        if let Some(inc) = incs.pop() {
            let Some(state) = result.inc_to_dec.get(&inc) else {
                closure.complete = false;
                continue;
            };
            closure.nesting |= state.nesting_detected;
            closure.all_clean &= state.is_clean();
            for &dec in &state.mutators {
                if closure.decrements.insert(dec) {
                    decs.push(dec);
                }
            }
        } else if let Some(dec) = decs.pop() {
            let Some(state) = result.dec_to_inc.get(&dec) else {
                closure.complete = false;
                continue;
            };
            if state.kind != TransitionKind::StrongIncrement {
                closure.complete = false;
            }
            closure.nesting |= state.nesting_detected;
            closure.all_clean &= state.is_clean();
            closure.all_known_safe &= state.known_safe;
            for &inc in &state.mutators {
                if closure.increments.insert(inc) {
                    incs.push(inc);
                }
            }
        } else {
            break;
        }
    }
    closure
}

/// Close every matched increment into a matching set and keep the sets
/// that can be deleted.
pub fn build_matching_sets(result: &DataflowResult) -> MatchingSets {
    let mut out = MatchingSets::default();
    let mut seen: FxHashSet<InstId> = FxHashSet::default();

    for &start in result.inc_to_dec.keys() {
        if seen.contains(&start) {
            continue;
        }
        let closure = close_over(result, start);
        seen.extend(closure.increments.iter().copied());

        let Some(&root) = result.roots.get(&start) else {
            continue;
        };
        let same_root = closure
            .increments
            .iter()
            .chain(&closure.decrements)
            .all(|m| result.roots.get(m) == Some(&root));

        if !closure.complete || !same_root {
            continue;
        }
        if closure.nesting {
            tracing::trace!(root = %root, "matching set suppressed by nesting");
            out.suppressed += 1;
            continue;
        }
        if closure.all_clean || closure.all_known_safe {
            out.sets.push(RcMatchingSet {
                root,
                increments: closure.increments,
                decrements: closure.decrements,
            });
        }
    }
    out
}

/// Delete every member of every set. Returns the number of instructions
/// removed.
pub fn eliminate_pairs(func: &mut Function, sets: &[RcMatchingSet]) -> usize {
    let mut removed = 0;
    for set in sets {
        for inst in set.members() {
            if func.try_inst(inst).is_some() {
                func.erase_inst(inst);
                removed += 1;
            }
        }
    }
    removed
}

/// Analyse and eliminate until nothing changes or the iteration bound is
/// hit. Returns the number of instructions removed.
pub fn eliminate_rc_pairs(func: &mut Function, ctx: &ArcContext, config: &ArcOptConfig) -> usize {
    let mut total = 0;
    let mut iterations = 0;

    while iterations < config.max_iterations {
        iterations += 1;
        let dom = DominatorTree::build(func);
        let result = run_dataflow(func, &dom, &ctx.destructors, config.granularity);
        let matching = build_matching_sets(&result);
        if matching.suppressed > 0 {
            tracing::debug!(
                function = func.name().raw(),
                suppressed = matching.suppressed,
                "nesting suppressed RC pair elimination",
            );
        }
        let removed = eliminate_pairs(func, &matching.sets);
        if removed == 0 {
            break;
        }
        total += removed;
    }

    if total > 0 {
        tracing::debug!(
            function = func.name().raw(),
            removed = total,
            iterations,
            "eliminated redundant RC pairs",
        );
    }
    total
}

#[cfg(test)]
mod tests;
