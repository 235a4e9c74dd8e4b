//! Ownership verification.
//!
//! [`verify_function`] runs the linear lifetime checker over every value
//! whose lifetime is tracked:
//!
//! - owned values (function arguments, instruction results, phis), with
//!   every use inside a borrow scope of the value counted as a
//!   non-consuming use;
//! - borrow introducers: `begin_borrow` results and guaranteed phis, whose
//!   `end_borrow`s and reborrows are their consuming uses.
//!
//! Guaranteed phis also need the borrowed-from value to outlive them, which
//! no single value's uses show: the phi's scope ends in blocks the base
//! value never sees. [`GuaranteedPhiVerifier`] checks that separately.

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use sil_ir::{
    Function, InstKind, Operand, OperandOwnership, OwnershipKind, UseLists, User, ValueDef,
    ValueId,
};

use crate::graph::DeadEndBlocks;
use crate::lifetime::{ErrorBehavior, LinearLifetimeChecker, LinearLifetimeError};

/// Consuming and non-consuming uses of `value`.
///
/// Uses of values that borrow from `value` (through `begin_borrow` or a
/// guaranteed-forwarding instruction) are non-consuming uses of `value`,
/// including the `end_borrow` that closes the borrow.
pub fn lifetime_uses(
    func: &Function,
    uses: &UseLists,
    value: ValueId,
) -> (Vec<Operand>, Vec<Operand>) {
    let mut consuming = Vec::new();
    let mut non_consuming = Vec::new();
    let mut derived = Vec::new();
    let mut seen: FxHashSet<ValueId> = FxHashSet::default();

    let mut borrowed_results = |op: Operand, derived: &mut Vec<ValueId>| {
        let User::Inst(inst) = op.user else { return };
        if matches!(
            func.operand_ownership(op),
            OperandOwnership::Borrow | OperandOwnership::GuaranteedForwarding
        ) {
            for &r in func.inst_results(inst) {
                if seen.insert(r) {
                    derived.push(r);
                }
            }
        }
    };

    for &op in uses.of(value) {
        if func.operand_ownership(op).is_lifetime_ending() {
            consuming.push(op);
        } else {
            non_consuming.push(op);
            borrowed_results(op, &mut derived);
        }
    }
    while let Some(v) = derived.pop() {
        for &op in uses.of(v) {
            non_consuming.push(op);
            borrowed_results(op, &mut derived);
        }
    }
    (consuming, non_consuming)
}

/// Whether `value` starts its own borrow scope.
pub(crate) fn is_borrow_introducer(func: &Function, value: ValueId) -> bool {
    match func.value(value).def {
        ValueDef::InstResult { inst, .. } => {
            matches!(func.inst_kind(inst), InstKind::BeginBorrow { .. })
        }
        ValueDef::BlockArg { .. } => true,
        ValueDef::FunctionArg { .. } => false,
    }
}

/// Check every tracked value of `func`. Functions not in ownership form
/// are skipped.
pub fn verify_function(func: &Function, behavior: ErrorBehavior) -> LinearLifetimeError {
    verify(func, None, behavior)
}

/// Like [`verify_function`], with printed diagnostics naming the function
/// `name`.
pub fn verify_function_named(
    func: &Function,
    name: &str,
    behavior: ErrorBehavior,
) -> LinearLifetimeError {
    verify(func, Some(name), behavior)
}

/// Checker for `func`, labelled `name` when known.
fn checker_for<'a>(
    func: &'a Function,
    dead_ends: &'a DeadEndBlocks,
    name: Option<&str>,
) -> LinearLifetimeChecker<'a> {
    let checker = LinearLifetimeChecker::new(func, dead_ends);
    match name {
        Some(name) => checker.with_function_name(name),
        None => checker,
    }
}

fn verify(func: &Function, name: Option<&str>, behavior: ErrorBehavior) -> LinearLifetimeError {
    let mut error = LinearLifetimeError::default();
    if !func.has_ownership() {
        return error;
    }

    let dead_ends = DeadEndBlocks::compute(func);
    let checker = checker_for(func, &dead_ends, name);
    let uses = func.compute_uses();

    for value in func.live_values() {
        let tracked = match func.ownership(value) {
            OwnershipKind::Owned => true,
            OwnershipKind::Guaranteed => is_borrow_introducer(func, value),
            OwnershipKind::None | OwnershipKind::Unowned => false,
        };
        if !tracked {
            continue;
        }
        let (consuming, non_consuming) = lifetime_uses(func, &uses, value);
        error.merge(checker.check(value, &consuming, &non_consuming, behavior));
    }

    let mut phis = GuaranteedPhiVerifier::new(func, &checker, &uses);
    error.merge(phis.verify_all(behavior));

    if error.found_error() {
        tracing::debug!(
            function = func.name().raw(),
            ?error,
            "ownership verification found errors"
        );
    }
    error
}

// ── Guaranteed phis ─────────────────────────────────────────────────

/// Checks that every guaranteed phi ends its scope inside the lifetime of
/// the owned values it borrows from.
pub struct GuaranteedPhiVerifier<'c, 'a> {
    func: &'a Function,
    checker: &'c LinearLifetimeChecker<'a>,
    uses: &'c UseLists,
    /// `(phi, base)` pairs already checked.
    checked: FxHashSet<(ValueId, ValueId)>,
}

impl<'c, 'a> GuaranteedPhiVerifier<'c, 'a> {
    pub fn new(
        func: &'a Function,
        checker: &'c LinearLifetimeChecker<'a>,
        uses: &'c UseLists,
    ) -> Self {
        Self {
            func,
            checker,
            uses,
            checked: FxHashSet::default(),
        }
    }

    /// Number of distinct `(phi, base)` pairs checked so far.
    pub fn num_checked(&self) -> usize {
        self.checked.len()
    }

    /// Check every guaranteed phi of the function.
    pub fn verify_all(&mut self, behavior: ErrorBehavior) -> LinearLifetimeError {
        let mut error = LinearLifetimeError::default();
        for block in self.func.block_ids() {
            if block == self.func.entry() {
                continue;
            }
            for &phi in self.func.block_args(block) {
                if self.func.ownership(phi) == OwnershipKind::Guaranteed {
                    error.merge(self.verify_phi(phi, behavior));
                }
            }
        }
        error
    }

    /// Check one guaranteed phi against each base value of each incoming
    /// borrow.
    pub fn verify_phi(&mut self, phi: ValueId, behavior: ErrorBehavior) -> LinearLifetimeError {
        let mut error = LinearLifetimeError::default();
        let Some(incoming) = self.func.phi_incoming(phi) else {
            return error;
        };

        let mut phi_ends: Option<Vec<Operand>> = None;
        for (_, value) in incoming {
            for base in self.borrow_bases(value) {
                if !self.checked.insert((phi, base)) {
                    continue;
                }
                let ends = phi_ends.get_or_insert_with(|| {
                    lifetime_uses(self.func, self.uses, phi)
                        .0
                        .into_iter()
                        .filter(|&op| {
                            self.func.operand_ownership(op) == OperandOwnership::EndBorrow
                        })
                        .collect()
                });
                let (consuming, _) = lifetime_uses(self.func, self.uses, base);
                error.merge(self.checker.check(base, &consuming, ends.as_slice(), behavior));
            }
        }
        error
    }

    /// The owned values a guaranteed value ultimately borrows from.
    /// Guaranteed function arguments are borrowed for the whole function
    /// and need no check.
    fn borrow_bases(&self, value: ValueId) -> SmallVec<[ValueId; 2]> {
        let func = self.func;
        let mut bases = SmallVec::new();
        let mut seen: FxHashSet<ValueId> = FxHashSet::default();
        let mut worklist = vec![value];
        while let Some(v) = worklist.pop() {
            if !seen.insert(v) {
                continue;
            }
            if func.ownership(v) == OwnershipKind::Owned {
                bases.push(v);
                continue;
            }
            match func.value(v).def {
                ValueDef::FunctionArg { .. } => {}
                ValueDef::BlockArg { .. } => {
                    if let Some(incoming) = func.phi_incoming(v) {
                        worklist.extend(incoming.into_iter().map(|(_, inc)| inc));
                    }
                }
                ValueDef::InstResult { inst, .. } => {
                    if let Some(&operand) = func.inst_kind(inst).operands().first() {
                        worklist.push(operand);
                    }
                }
            }
        }
        bases
    }
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
