//! Barrier classification.
//!
//! A barrier may observe or change reference counts in ways the dataflow
//! cannot see, so no increment is matched to a decrement across one.
//!
//! Two checks:
//!
//! - [`is_barrier_terminator`]: every terminator except the two pure
//!   control transfers (`br`, `cond_br`).
//! - [`may_have_unknown_side_effects`]: calls that may release arbitrary
//!   objects, and releases whose destructor may have memory effects.

use sil_ir::{ArgConvention, Callee, Function, InstId, InstKind, SideEffects, Terminator};

use crate::DestructorAnalysis;

/// Whether `term` blocks matching across it.
pub fn is_barrier_terminator(term: &Terminator) -> bool {
    match term {
        Terminator::Br { .. } | Terminator::CondBr { .. } => false,
        Terminator::Return { .. }
        | Terminator::Throw { .. }
        | Terminator::Unwind
        | Terminator::Yield { .. }
        | Terminator::SwitchEnum { .. }
        | Terminator::CheckedCastBr { .. }
        | Terminator::Await { .. }
        | Terminator::Unreachable => true,
    }
}

/// Whether `inst` may have side effects that invalidate every tracked
/// reference count.
pub fn may_have_unknown_side_effects(
    func: &Function,
    inst: InstId,
    destructors: &DestructorAnalysis,
) -> bool {
    match func.inst_kind(inst) {
        InstKind::Apply {
            callee,
            args,
            effects,
            ..
        } => {
            *effects == SideEffects::Unknown
                || matches!(callee, Callee::Indirect(_))
                || callee.name().is_some_and(|n| n.is_autorelease_pool_call())
                || args.iter().any(|a| a.convention == ArgConvention::Owned)
        }

        InstKind::StrongRelease { operand }
        | InstKind::ReleaseValue { operand }
        | InstKind::DestroyValue { operand } => {
            destructors.may_have_memory_effects(func.value_type(*operand))
        }

        InstKind::StrongRetain { .. }
        | InstKind::RetainValue { .. }
        | InstKind::AllocRef { .. }
        | InstKind::AllocRefDynamic { .. }
        | InstKind::AllocBox
        | InstKind::PartialApply { .. }
        | InstKind::Upcast { .. }
        | InstKind::UncheckedRefCast { .. }
        | InstKind::RefToRawPointer { .. }
        | InstKind::RawPointerToRef { .. }
        | InstKind::Struct { .. }
        | InstKind::Tuple { .. }
        | InstKind::Enum { .. }
        | InstKind::UncheckedEnumData { .. }
        | InstKind::StructExtract { .. }
        | InstKind::TupleExtract { .. }
        | InstKind::CopyValue { .. }
        | InstKind::MoveValue { .. }
        | InstKind::BeginBorrow { .. }
        | InstKind::EndBorrow { .. }
        | InstKind::UncheckedOwnershipConversion { .. }
        | InstKind::FixLifetime { .. }
        | InstKind::IntegerLiteral { .. } => false,
    }
}
