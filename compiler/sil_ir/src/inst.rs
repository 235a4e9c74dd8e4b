//! Non-terminator instructions.
//!
//! [`InstKind`] is a closed enum. Passes that must account for every
//! instruction (the transition and barrier classifiers) match on it without a
//! wildcard arm, so adding a variant is a compile error until every
//! classifier has an answer for it.

use smallvec::{smallvec, SmallVec};

use crate::{ArgConvention, BlockId, Name, OwnershipKind, ResultConvention, SideEffects, ValueId};

/// Call target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Callee {
    /// Statically known function.
    Direct(Name),
    /// Function value (closure or witness lookup).
    Indirect(ValueId),
}

impl Callee {
    /// The known callee name, if any.
    pub fn name(self) -> Option<Name> {
        match self {
            Callee::Direct(name) => Some(name),
            Callee::Indirect(_) => None,
        }
    }
}

/// One call argument with its convention.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ApplyArg {
    pub value: ValueId,
    pub convention: ArgConvention,
}

/// Instruction payload.
///
/// Operand order (as seen by [`InstKind::operands`] and use lists) is the
/// field order below; for `Apply` and `PartialApply` an indirect callee
/// comes after the arguments.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum InstKind {
    // ── Reference counting ──────────────────────────────────────────
    /// `strong_retain %x`
    StrongRetain { operand: ValueId },
    /// `retain_value %x` (aggregates)
    RetainValue { operand: ValueId },
    /// `strong_release %x`
    StrongRelease { operand: ValueId },
    /// `release_value %x` (aggregates)
    ReleaseValue { operand: ValueId },

    // ── Allocation ──────────────────────────────────────────────────
    /// `%r = alloc_ref $Class`, produces +1.
    AllocRef { class: Name },
    /// `%r = alloc_ref_dynamic %metatype, $Class`, produces +1.
    AllocRefDynamic { class: Name, metatype: ValueId },
    /// `%r = alloc_box`, produces +1.
    AllocBox,

    // ── Calls ───────────────────────────────────────────────────────
    /// `%r... = apply callee(args...)`
    Apply {
        callee: Callee,
        args: Vec<ApplyArg>,
        results: SmallVec<[ResultConvention; 1]>,
        effects: SideEffects,
    },
    /// `%c = partial_apply callee(captures...)`, consumes owned captures
    /// and produces a +1 closure.
    PartialApply {
        callee: Callee,
        captures: Vec<ValueId>,
    },

    // ── Casts (identity preserving) ─────────────────────────────────
    Upcast { operand: ValueId },
    UncheckedRefCast { operand: ValueId },
    RefToRawPointer { operand: ValueId },
    RawPointerToRef { operand: ValueId },

    // ── Aggregates ──────────────────────────────────────────────────
    Struct { operands: Vec<ValueId> },
    Tuple { operands: Vec<ValueId> },
    Enum { case: u32, payload: Option<ValueId> },
    UncheckedEnumData { operand: ValueId, case: u32 },
    StructExtract { operand: ValueId, field: u32 },
    TupleExtract { operand: ValueId, index: u32 },

    // ── Ownership (OSSA) ────────────────────────────────────────────
    CopyValue { operand: ValueId },
    DestroyValue { operand: ValueId },
    MoveValue { operand: ValueId },
    BeginBorrow { operand: ValueId },
    EndBorrow { operand: ValueId },
    UncheckedOwnershipConversion { operand: ValueId, to: OwnershipKind },
    FixLifetime { operand: ValueId },

    // ── Literals ────────────────────────────────────────────────────
    IntegerLiteral { value: i64 },
}

impl InstKind {
    /// Values read by this instruction, in operand order.
    pub fn operands(&self) -> SmallVec<[ValueId; 4]> {
        match self {
            InstKind::StrongRetain { operand }
            | InstKind::RetainValue { operand }
            | InstKind::StrongRelease { operand }
            | InstKind::ReleaseValue { operand }
            | InstKind::Upcast { operand }
            | InstKind::UncheckedRefCast { operand }
            | InstKind::RefToRawPointer { operand }
            | InstKind::RawPointerToRef { operand }
            | InstKind::UncheckedEnumData { operand, .. }
            | InstKind::StructExtract { operand, .. }
            | InstKind::TupleExtract { operand, .. }
            | InstKind::CopyValue { operand }
            | InstKind::DestroyValue { operand }
            | InstKind::MoveValue { operand }
            | InstKind::BeginBorrow { operand }
            | InstKind::EndBorrow { operand }
            | InstKind::UncheckedOwnershipConversion { operand, .. }
            | InstKind::FixLifetime { operand } => smallvec![*operand],
            InstKind::AllocRefDynamic { metatype, .. } => smallvec![*metatype],
            InstKind::Enum { payload, .. } => payload.iter().copied().collect(),
            InstKind::Apply { callee, args, .. } => {
                let mut ops: SmallVec<[ValueId; 4]> = args.iter().map(|a| a.value).collect();
                if let Callee::Indirect(f) = callee {
                    ops.push(*f);
                }
                ops
            }
            InstKind::PartialApply { callee, captures } => {
                let mut ops: SmallVec<[ValueId; 4]> = captures.iter().copied().collect();
                if let Callee::Indirect(f) = callee {
                    ops.push(*f);
                }
                ops
            }
            InstKind::Struct { operands } | InstKind::Tuple { operands } => {
                operands.iter().copied().collect()
            }
            InstKind::AllocRef { .. } | InstKind::AllocBox | InstKind::IntegerLiteral { .. } => {
                SmallVec::new()
            }
        }
    }

    /// Mutable access to operand slots, in the same order as [`operands`](Self::operands).
    pub fn operands_mut(&mut self) -> SmallVec<[&mut ValueId; 4]> {
        match self {
            InstKind::StrongRetain { operand }
            | InstKind::RetainValue { operand }
            | InstKind::StrongRelease { operand }
            | InstKind::ReleaseValue { operand }
            | InstKind::Upcast { operand }
            | InstKind::UncheckedRefCast { operand }
            | InstKind::RefToRawPointer { operand }
            | InstKind::RawPointerToRef { operand }
            | InstKind::UncheckedEnumData { operand, .. }
            | InstKind::StructExtract { operand, .. }
            | InstKind::TupleExtract { operand, .. }
            | InstKind::CopyValue { operand }
            | InstKind::DestroyValue { operand }
            | InstKind::MoveValue { operand }
            | InstKind::BeginBorrow { operand }
            | InstKind::EndBorrow { operand }
            | InstKind::UncheckedOwnershipConversion { operand, .. }
            | InstKind::FixLifetime { operand } => smallvec![operand],
            InstKind::AllocRefDynamic { metatype, .. } => smallvec![metatype],
            InstKind::Enum { payload, .. } => payload.iter_mut().collect(),
            InstKind::Apply { callee, args, .. } => {
                let mut ops: SmallVec<[&mut ValueId; 4]> =
                    args.iter_mut().map(|a| &mut a.value).collect();
                if let Callee::Indirect(f) = callee {
                    ops.push(f);
                }
                ops
            }
            InstKind::PartialApply { callee, captures } => {
                let mut ops: SmallVec<[&mut ValueId; 4]> = captures.iter_mut().collect();
                if let Callee::Indirect(f) = callee {
                    ops.push(f);
                }
                ops
            }
            InstKind::Struct { operands } | InstKind::Tuple { operands } => {
                operands.iter_mut().collect()
            }
            InstKind::AllocRef { .. } | InstKind::AllocBox | InstKind::IntegerLiteral { .. } => {
                SmallVec::new()
            }
        }
    }

    /// Textual opcode used by the printer and in diagnostics.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            InstKind::StrongRetain { .. } => "strong_retain",
            InstKind::RetainValue { .. } => "retain_value",
            InstKind::StrongRelease { .. } => "strong_release",
            InstKind::ReleaseValue { .. } => "release_value",
            InstKind::AllocRef { .. } => "alloc_ref",
            InstKind::AllocRefDynamic { .. } => "alloc_ref_dynamic",
            InstKind::AllocBox => "alloc_box",
            InstKind::Apply { .. } => "apply",
            InstKind::PartialApply { .. } => "partial_apply",
            InstKind::Upcast { .. } => "upcast",
            InstKind::UncheckedRefCast { .. } => "unchecked_ref_cast",
            InstKind::RefToRawPointer { .. } => "ref_to_raw_pointer",
            InstKind::RawPointerToRef { .. } => "raw_pointer_to_ref",
            InstKind::Struct { .. } => "struct",
            InstKind::Tuple { .. } => "tuple",
            InstKind::Enum { .. } => "enum",
            InstKind::UncheckedEnumData { .. } => "unchecked_enum_data",
            InstKind::StructExtract { .. } => "struct_extract",
            InstKind::TupleExtract { .. } => "tuple_extract",
            InstKind::CopyValue { .. } => "copy_value",
            InstKind::DestroyValue { .. } => "destroy_value",
            InstKind::MoveValue { .. } => "move_value",
            InstKind::BeginBorrow { .. } => "begin_borrow",
            InstKind::EndBorrow { .. } => "end_borrow",
            InstKind::UncheckedOwnershipConversion { .. } => "unchecked_ownership_conversion",
            InstKind::FixLifetime { .. } => "fix_lifetime",
            InstKind::IntegerLiteral { .. } => "integer_literal",
        }
    }
}

/// An instruction slot in the function arena.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstData {
    pub kind: InstKind,
    /// Block the instruction lives in.
    pub block: BlockId,
    /// Result values, in result order.
    pub results: SmallVec<[ValueId; 1]>,
}
