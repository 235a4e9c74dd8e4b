//! Linear lifetime checker.
//!
//! Given a value, its consuming uses and its non-consuming uses, checks that
//! the uses form a single well-nested lifetime over the CFG:
//!
//! - every path from the definition reaches exactly one consuming use
//!   (more is an over-consume, none is a leak unless the path ends in a
//!   dead-end block);
//! - no non-consuming use executes after a consuming use on the same path
//!   (use-after-free);
//! - no use executes where the value has not been defined
//!   (use outside lifetime).
//!
//! The live region is found by walking backward from every consuming block
//! to the definition. Facts are computed in full first; only then is the
//! caller's [`ErrorBehavior`] applied, so the same checker serves as a hard
//! verifier (print and panic) and as a silent precondition oracle for
//! peepholes (return the facts).

use std::cell::Cell;

use bitflags::bitflags;
use rustc_hash::{FxHashMap, FxHashSet};

use sil_ir::{Function, Operand, User, ValueDef, ValueId};

use crate::graph::{block_id, compute_predecessors, compute_successors, DeadEndBlocks};

bitflags! {
    /// What to do with ownership violations once they are known.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ErrorBehavior: u8 {
        /// Return the facts instead of panicking.
        const RETURN_FALSE = 1;
        /// Print a bracketed diagnostic to stderr.
        const PRINT_MESSAGE = 1 << 1;
        /// Panic on any violation not otherwise tolerated.
        const ASSERT = 1 << 2;
        /// Leaks alone never panic.
        const RETURN_FALSE_ON_LEAK = 1 << 3;
        /// Collect non-consuming uses outside the lifetime instead of
        /// reporting them.
        const STORE_NON_CONSUMING_USES_OUTSIDE_LIFETIME = 1 << 4;

        const PRINT_MESSAGE_AND_RETURN_FALSE = Self::PRINT_MESSAGE.bits() | Self::RETURN_FALSE.bits();
        const PRINT_MESSAGE_AND_ASSERT = Self::PRINT_MESSAGE.bits() | Self::ASSERT.bits();
        const RETURN_FALSE_ON_LEAK_ASSERT_OTHERWISE = Self::RETURN_FALSE_ON_LEAK.bits() | Self::ASSERT.bits();
    }
}

/// Violations found by one check.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LinearLifetimeError {
    pub found_use_after_free: bool,
    pub found_leak: bool,
    pub found_over_consume: bool,
    pub found_use_outside_of_lifetime: bool,
}

impl LinearLifetimeError {
    pub fn found_error(self) -> bool {
        self.found_use_after_free
            || self.found_leak
            || self.found_over_consume
            || self.found_use_outside_of_lifetime
    }

    /// Accumulate the facts of another check.
    pub fn merge(&mut self, other: LinearLifetimeError) {
        self.found_use_after_free |= other.found_use_after_free;
        self.found_leak |= other.found_leak;
        self.found_over_consume |= other.found_over_consume;
        self.found_use_outside_of_lifetime |= other.found_use_outside_of_lifetime;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Violation {
    Leak,
    OverConsume,
    UseAfterFree,
    UseOutsideOfLifetime,
}

/// One violation with its diagnostic text.
struct Finding {
    violation: Violation,
    message: String,
}

/// Checks linear lifetimes within one function.
///
/// Holds the CFG adjacency and the function's dead-end blocks, so one
/// checker can be reused for every value of a function.
pub struct LinearLifetimeChecker<'a> {
    func: &'a Function,
    dead_ends: &'a DeadEndBlocks,
    preds: Vec<Vec<usize>>,
    succs: Vec<Vec<usize>>,
    /// Function name shown in diagnostics.
    label: String,
    /// Diagnostic counter, printed as `Error#: N.` when enabled.
    counter: Option<Cell<u32>>,
}

/// Where a use sits relative to the value's definition.
#[derive(Clone, Copy)]
struct Def {
    block: usize,
    /// Instruction index of the defining instruction. `None` for arguments,
    /// which are defined before every instruction of their block.
    position: Option<usize>,
}

impl Def {
    fn of(func: &Function, value: ValueId) -> Self {
        match func.value(value).def {
            ValueDef::FunctionArg { .. } => Def {
                block: func.entry().index(),
                position: None,
            },
            ValueDef::BlockArg { block, .. } => Def {
                block: block.index(),
                position: None,
            },
            ValueDef::InstResult { inst, .. } => {
                let (block, position) = func.inst_position(inst);
                Def {
                    block: block.index(),
                    position: Some(position),
                }
            }
        }
    }

    /// Whether a use at `position` in the def block comes after the def.
    fn precedes(self, position: usize) -> bool {
        match self.position {
            Some(def) => def < position,
            None => true,
        }
    }
}

fn describe(user: User) -> String {
    match user {
        User::Inst(inst) => format!("{inst}"),
        User::Terminator(block) => format!("terminator of {block}"),
    }
}

impl<'a> LinearLifetimeChecker<'a> {
    pub fn new(func: &'a Function, dead_ends: &'a DeadEndBlocks) -> Self {
        Self {
            func,
            dead_ends,
            preds: compute_predecessors(func),
            succs: compute_successors(func),
            label: format!("fn#{}", func.name().raw()),
            counter: None,
        }
    }

    /// Show `name` instead of the interned index in diagnostics.
    #[must_use]
    pub fn with_function_name(mut self, name: &str) -> Self {
        self.label = name.to_owned();
        self
    }

    /// The function name printed in diagnostics.
    pub fn function_label(&self) -> &str {
        &self.label
    }

    /// Number the printed diagnostics.
    #[must_use]
    pub fn with_error_counter(mut self) -> Self {
        self.counter = Some(Cell::new(0));
        self
    }

    /// Check the lifetime of `def` given its split uses.
    pub fn check(
        &self,
        def: ValueId,
        consuming: &[Operand],
        non_consuming: &[Operand],
        behavior: ErrorBehavior,
    ) -> LinearLifetimeError {
        self.check_collecting(def, consuming, non_consuming, behavior, &mut Vec::new())
    }

    /// Like [`check`](Self::check), and with
    /// `STORE_NON_CONSUMING_USES_OUTSIDE_LIFETIME` pushes such uses to
    /// `outside` instead of reporting them.
    pub fn check_collecting(
        &self,
        def: ValueId,
        consuming: &[Operand],
        non_consuming: &[Operand],
        behavior: ErrorBehavior,
        outside: &mut Vec<Operand>,
    ) -> LinearLifetimeError {
        let findings = self.compute(def, consuming, non_consuming, behavior, outside);
        self.report(def, &findings, behavior)
    }

    // ── Fact computation ────────────────────────────────────────────

    fn compute(
        &self,
        value: ValueId,
        consuming: &[Operand],
        non_consuming: &[Operand],
        behavior: ErrorBehavior,
        outside: &mut Vec<Operand>,
    ) -> Vec<Finding> {
        let func = self.func;
        let def = Def::of(func, value);
        let mut findings = Vec::new();
        let mut finding = |violation, message: String| {
            findings.push(Finding { violation, message });
        };

        // Consuming uses: at most one per block, none before the def.
        let mut consuming_blocks: FxHashMap<usize, usize> = FxHashMap::default();
        for use_ in consuming {
            let (block, position) = func.user_position(use_.user);
            let block = block.index();
            if block == def.block && !def.precedes(position) {
                finding(
                    Violation::UseOutsideOfLifetime,
                    format!(
                        "Found consuming use before definition!\nValue: {value}\nUser: {}\n",
                        describe(use_.user)
                    ),
                );
                continue;
            }
            if let Some(&first) = consuming_blocks.get(&block) {
                finding(
                    Violation::OverConsume,
                    format!(
                        "Found over consume?!\nValue: {value}\nBlock: {}\nConsuming users at {first} and {position}\n",
                        block_id(block)
                    ),
                );
                consuming_blocks.insert(block, first.min(position));
            } else {
                consuming_blocks.insert(block, position);
            }
        }

        // Non-consuming uses that are not settled within their own block.
        let mut pending: Vec<(usize, Operand)> = Vec::new();
        for &use_ in non_consuming {
            let (block, position) = func.user_position(use_.user);
            let block = block.index();
            if block == def.block && !def.precedes(position) {
                finding(
                    Violation::UseOutsideOfLifetime,
                    format!(
                        "Found use before definition!\nValue: {value}\nUser: {}\n",
                        describe(use_.user)
                    ),
                );
                continue;
            }
            match consuming_blocks.get(&block) {
                Some(&consume) if position > consume => finding(
                    Violation::UseAfterFree,
                    format!(
                        "Found use after free?!\nValue: {value}\nUser: {}\nConsuming user at {consume}\n",
                        describe(use_.user)
                    ),
                ),
                Some(_) => {}
                None => pending.push((block, use_)),
            }
        }

        // Walk backward from every consuming block to the definition. The
        // blocks reached are the ones the value is live out of.
        let mut live_out: FxHashSet<usize> = FxHashSet::default();
        let mut worklist: Vec<usize> = Vec::new();
        for &block in consuming_blocks.keys() {
            if block != def.block {
                worklist.extend(self.preds[block].iter().copied());
            }
        }
        let mut reported_entry = false;
        while let Some(block) = worklist.pop() {
            if consuming_blocks.contains_key(&block) {
                // A consume reaches another consume, possibly itself
                // around a loop.
                if !live_out.contains(&block) {
                    finding(
                        Violation::OverConsume,
                        format!(
                            "Found over consume?!\nValue: {value}\nBlock: {}\nConsumed again on a path through this block\n",
                            block_id(block)
                        ),
                    );
                }
                live_out.insert(block);
                continue;
            }
            if !live_out.insert(block) {
                continue;
            }
            if block == def.block {
                continue;
            }
            if self.preds[block].is_empty() {
                if !reported_entry {
                    reported_entry = true;
                    finding(
                        Violation::UseOutsideOfLifetime,
                        format!(
                            "Value is used in a block its definition does not reach!\nValue: {value}\nReached: {}\n",
                            block_id(block)
                        ),
                    );
                }
                continue;
            }
            worklist.extend(self.preds[block].iter().copied());
        }

        // Leaks: leaving the live region into a block that neither keeps
        // the value alive nor consumes it.
        if consuming_blocks.is_empty() {
            if !self.dead_ends.is_dead_end(block_id(def.block)) {
                finding(
                    Violation::Leak,
                    format!(
                        "Found leak?!\nValue: {value}\nNo consuming use on any path from {}\n",
                        block_id(def.block)
                    ),
                );
            }
        } else {
            let mut sorted: Vec<usize> = live_out
                .iter()
                .copied()
                .filter(|b| !consuming_blocks.contains_key(b))
                .collect();
            sorted.sort_unstable();
            for block in sorted {
                for &succ in &self.succs[block] {
                    let keeps = live_out.contains(&succ) || consuming_blocks.contains_key(&succ);
                    if !keeps && !self.dead_ends.is_dead_end(block_id(succ)) {
                        finding(
                            Violation::Leak,
                            format!(
                                "Found leak?!\nValue: {value}\nEdge: {} -> {}\n",
                                block_id(block),
                                block_id(succ)
                            ),
                        );
                    }
                }
            }
        }

        // Non-consuming uses in blocks outside the live region.
        let after_consume = self.forward_reachable(consuming_blocks.keys().copied());
        for (block, use_) in pending {
            let inside = live_out.contains(&block)
                || (block == def.block && consuming_blocks.is_empty());
            if inside {
                continue;
            }
            if consuming_blocks.is_empty() && self.dead_ends.is_dead_end(block_id(block)) {
                continue;
            }
            if behavior.contains(ErrorBehavior::STORE_NON_CONSUMING_USES_OUTSIDE_LIFETIME) {
                outside.push(use_);
                continue;
            }
            let violation = if after_consume.contains(&block) {
                Violation::UseAfterFree
            } else {
                Violation::UseOutsideOfLifetime
            };
            finding(
                violation,
                format!(
                    "Found outside of lifetime use!\nValue: {value}\nUser: {}\n",
                    describe(use_.user)
                ),
            );
        }

        findings
    }

    /// Blocks strictly reachable from any of `from`.
    fn forward_reachable(&self, from: impl Iterator<Item = usize>) -> FxHashSet<usize> {
        let mut seen = FxHashSet::default();
        let mut worklist: Vec<usize> = from.flat_map(|b| self.succs[b].iter().copied()).collect();
        while let Some(block) = worklist.pop() {
            if seen.insert(block) {
                worklist.extend(self.succs[block].iter().copied());
            }
        }
        seen
    }

    // ── Reporting policy ────────────────────────────────────────────

    fn report(
        &self,
        value: ValueId,
        findings: &[Finding],
        behavior: ErrorBehavior,
    ) -> LinearLifetimeError {
        let mut error = LinearLifetimeError::default();
        let mut fatal = false;
        for f in findings {
            match f.violation {
                Violation::Leak => error.found_leak = true,
                Violation::OverConsume => error.found_over_consume = true,
                Violation::UseAfterFree => error.found_use_after_free = true,
                Violation::UseOutsideOfLifetime => error.found_use_outside_of_lifetime = true,
            }
            if behavior.contains(ErrorBehavior::PRINT_MESSAGE) {
                self.print(&f.message);
            }
            let tolerated = behavior.contains(ErrorBehavior::RETURN_FALSE)
                || (f.violation == Violation::Leak
                    && behavior.contains(ErrorBehavior::RETURN_FALSE_ON_LEAK));
            fatal |= !tolerated;
        }
        if fatal {
            tracing::error!(
                function = self.func.name().raw(),
                value = %value,
                ?error,
                "ownership verification failed"
            );
            panic!("Found ownership error?!");
        }
        error
    }

    fn print(&self, message: &str) {
        let name = &self.label;
        let prefix = self
            .counter
            .as_ref()
            .map_or_else(String::new, |c| format!("Error#: {}. ", c.get()));
        eprintln!("{prefix}Begin Error in Function: '{name}'");
        eprint!("{message}");
        eprintln!("{prefix}End Error in Function: '{name}'");
        if let Some(c) = &self.counter {
            c.set(c.get() + 1);
        }
    }
}
