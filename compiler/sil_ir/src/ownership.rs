//! Operand ownership: how each use affects the lifetime of the value it reads.
//!
//! This is the IR's side of the ownership model. The linear lifetime checker
//! is only told which uses are consuming and which are not; deciding that is
//! a property of the instruction, the operand slot and the value's ownership
//! kind, and lives here.

use crate::{
    ArgConvention, Callee, Function, InstKind, Operand, OwnershipKind, Terminator, User,
};

/// Effect of one operand on the lifetime of the value it reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperandOwnership {
    /// The value is trivial or unowned; its lifetime is not tracked.
    TrivialUse,
    /// Reads the value at a single point.
    InstantaneousUse,
    /// Produces guaranteed results that borrow from the operand; uses of
    /// those results are uses of the operand.
    GuaranteedForwarding,
    /// Opens a borrow scope on the operand (`begin_borrow`).
    Borrow,
    /// Ends the value's lifetime and destroys it.
    DestroyingConsume,
    /// Ends the value's lifetime by moving it into a result, a phi, or out
    /// of the function.
    ForwardingConsume,
    /// Ends a borrow scope.
    EndBorrow,
    /// Passes a borrow into a guaranteed phi, ending this scope.
    Reborrow,
}

impl OperandOwnership {
    /// Whether this use ends the value's lifetime.
    #[inline]
    pub fn is_lifetime_ending(self) -> bool {
        matches!(
            self,
            OperandOwnership::DestroyingConsume
                | OperandOwnership::ForwardingConsume
                | OperandOwnership::EndBorrow
                | OperandOwnership::Reborrow
        )
    }
}

/// Ownership of a forwarding use: owned operands are consumed into the
/// result, guaranteed operands are borrowed by it.
fn forwarding(kind: OwnershipKind) -> OperandOwnership {
    match kind {
        OwnershipKind::Owned => OperandOwnership::ForwardingConsume,
        OwnershipKind::Guaranteed => OperandOwnership::GuaranteedForwarding,
        OwnershipKind::None | OwnershipKind::Unowned => OperandOwnership::TrivialUse,
    }
}

/// Ownership of a use that destroys owned values and only reads others.
fn destroying(kind: OwnershipKind) -> OperandOwnership {
    match kind {
        OwnershipKind::Owned => OperandOwnership::DestroyingConsume,
        OwnershipKind::Guaranteed => OperandOwnership::InstantaneousUse,
        OwnershipKind::None | OwnershipKind::Unowned => OperandOwnership::TrivialUse,
    }
}

impl Function {
    /// Classify one operand slot.
    ///
    /// Returns `TrivialUse` for stale operands (erased users, out-of-range
    /// indices).
    pub fn operand_ownership(&self, operand: Operand) -> OperandOwnership {
        let Some(value) = self.operand_value(operand) else {
            return OperandOwnership::TrivialUse;
        };
        let kind = self.ownership(value);
        if !kind.is_tracked() {
            return OperandOwnership::TrivialUse;
        }
        let index = operand.index as usize;
        match operand.user {
            User::Inst(inst) => inst_operand_ownership(&self.inst(inst).kind, index, kind),
            User::Terminator(block) => {
                terminator_operand_ownership(self.terminator(block), index, kind)
            }
        }
    }
}

fn inst_operand_ownership(inst: &InstKind, index: usize, kind: OwnershipKind) -> OperandOwnership {
    match inst {
        InstKind::StrongRetain { .. }
        | InstKind::RetainValue { .. }
        | InstKind::AllocRefDynamic { .. }
        | InstKind::RefToRawPointer { .. }
        | InstKind::CopyValue { .. }
        | InstKind::FixLifetime { .. } => OperandOwnership::InstantaneousUse,

        InstKind::StrongRelease { .. }
        | InstKind::ReleaseValue { .. }
        | InstKind::DestroyValue { .. } => destroying(kind),

        // The indirect callee slot follows the captures.
        InstKind::PartialApply { captures, .. } => {
            if index < captures.len() {
                destroying(kind)
            } else {
                OperandOwnership::InstantaneousUse
            }
        }

        InstKind::Apply { callee, args, .. } => match args.get(index) {
            Some(arg) if arg.convention == ArgConvention::Owned => destroying(kind),
            Some(_) => OperandOwnership::InstantaneousUse,
            None => {
                debug_assert!(matches!(callee, Callee::Indirect(_)));
                OperandOwnership::InstantaneousUse
            }
        },

        InstKind::Upcast { .. }
        | InstKind::UncheckedRefCast { .. }
        | InstKind::RawPointerToRef { .. }
        | InstKind::Struct { .. }
        | InstKind::Tuple { .. }
        | InstKind::Enum { .. }
        | InstKind::UncheckedEnumData { .. }
        | InstKind::MoveValue { .. } => forwarding(kind),

        InstKind::StructExtract { .. } | InstKind::TupleExtract { .. } => {
            OperandOwnership::GuaranteedForwarding
        }

        InstKind::UncheckedOwnershipConversion { to, .. } => match to {
            OwnershipKind::Owned => forwarding(kind),
            OwnershipKind::Guaranteed => OperandOwnership::GuaranteedForwarding,
            OwnershipKind::None | OwnershipKind::Unowned => OperandOwnership::InstantaneousUse,
        },

        InstKind::BeginBorrow { .. } => OperandOwnership::Borrow,
        InstKind::EndBorrow { .. } => OperandOwnership::EndBorrow,

        InstKind::AllocRef { .. } | InstKind::AllocBox | InstKind::IntegerLiteral { .. } => {
            OperandOwnership::TrivialUse
        }
    }
}

fn terminator_operand_ownership(
    term: &Terminator,
    index: usize,
    kind: OwnershipKind,
) -> OperandOwnership {
    let phi_operand = || match kind {
        OwnershipKind::Guaranteed => OperandOwnership::Reborrow,
        _ => forwarding(kind),
    };
    match term {
        Terminator::Br { .. } => phi_operand(),
        Terminator::CondBr { .. } => {
            if index == 0 {
                OperandOwnership::InstantaneousUse
            } else {
                phi_operand()
            }
        }
        Terminator::Return { .. }
        | Terminator::Throw { .. }
        | Terminator::Yield { .. }
        | Terminator::SwitchEnum { .. }
        | Terminator::CheckedCastBr { .. } => match kind {
            OwnershipKind::Owned => OperandOwnership::ForwardingConsume,
            _ => OperandOwnership::InstantaneousUse,
        },
        Terminator::Await { .. } => OperandOwnership::InstantaneousUse,
        Terminator::Unwind | Terminator::Unreachable => OperandOwnership::TrivialUse,
    }
}
