//! Transition classifier.
//!
//! Maps every instruction and every function-entry argument to the
//! reference-count effect it has. A pure function of instruction shape: no
//! dataflow state, no caching.
//!
//! The match over [`InstKind`] has no wildcard arm. Adding an instruction to
//! the IR fails to compile here until it is given a transition.

use sil_ir::{ArgConvention, Callee, Function, InstId, InstKind, ResultConvention, ValueDef, ValueId};

/// Reference-count effect of a node.
///
/// Discriminant order is load-bearing: [`is_mutator`](Self::is_mutator) and
/// [`is_value_kind`](Self::is_value_kind) are range tests, so new kinds must
/// keep those ranges contiguous.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TransitionKind {
    Unknown = 0,
    /// `strong_retain`, `retain_value`.
    StrongIncrement = 1,
    /// `strong_release`, `release_value`.
    StrongDecrement = 2,
    /// Introduces a fresh +1 value.
    StrongEntrance = 3,
    /// `objc_autoreleasePoolPush` / `objc_autoreleasePoolPop`.
    AutoreleasePoolCall = 4,
}

impl TransitionKind {
    const MUTATOR_FIRST: u8 = TransitionKind::StrongIncrement as u8;
    const MUTATOR_LAST: u8 = TransitionKind::StrongDecrement as u8;
    const VALUE_FIRST: u8 = TransitionKind::StrongEntrance as u8;
    const VALUE_LAST: u8 = TransitionKind::StrongEntrance as u8;

    /// Increment or decrement: an instruction that changes a count.
    #[inline]
    pub fn is_mutator(self) -> bool {
        (Self::MUTATOR_FIRST..=Self::MUTATOR_LAST).contains(&(self as u8))
    }

    /// A transition that introduces a value rather than mutating one.
    #[inline]
    pub fn is_value_kind(self) -> bool {
        (Self::VALUE_FIRST..=Self::VALUE_LAST).contains(&(self as u8))
    }
}

/// A node the classifier accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Inst(InstId),
    /// A function-entry argument.
    Argument(ValueId),
}

/// Classify a node by its reference-count effect.
pub fn classify(func: &Function, node: NodeRef) -> TransitionKind {
    match node {
        NodeRef::Inst(inst) => classify_inst(func.inst_kind(inst)),
        NodeRef::Argument(value) => classify_argument(func, value),
    }
}

fn classify_argument(func: &Function, value: ValueId) -> TransitionKind {
    match func.value(value).def {
        ValueDef::FunctionArg {
            convention: ArgConvention::Owned,
            ..
        } if !func.value_type(value).is_trivial() => TransitionKind::StrongEntrance,
        ValueDef::FunctionArg { .. } | ValueDef::BlockArg { .. } | ValueDef::InstResult { .. } => {
            TransitionKind::Unknown
        }
    }
}

/// Classify one instruction.
pub fn classify_inst(kind: &InstKind) -> TransitionKind {
    match kind {
        InstKind::StrongRetain { .. } | InstKind::RetainValue { .. } => {
            TransitionKind::StrongIncrement
        }
        InstKind::StrongRelease { .. } | InstKind::ReleaseValue { .. } => {
            TransitionKind::StrongDecrement
        }

        InstKind::AllocRef { .. }
        | InstKind::AllocRefDynamic { .. }
        | InstKind::AllocBox
        | InstKind::PartialApply { .. } => TransitionKind::StrongEntrance,

        InstKind::Apply {
            callee, results, ..
        } => classify_apply(*callee, results),

        InstKind::Upcast { .. }
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
        | InstKind::DestroyValue { .. }
        | InstKind::MoveValue { .. }
        | InstKind::BeginBorrow { .. }
        | InstKind::EndBorrow { .. }
        | InstKind::UncheckedOwnershipConversion { .. }
        | InstKind::FixLifetime { .. }
        | InstKind::IntegerLiteral { .. } => TransitionKind::Unknown,
    }
}

/// A call is an entrance only when its callee is known and it returns
/// exactly one owned result. Calls returning several owned results are not
/// attributed to any one of them.
fn classify_apply(callee: Callee, results: &[ResultConvention]) -> TransitionKind {
    let Callee::Direct(name) = callee else {
        return TransitionKind::Unknown;
    };
    if name.is_autorelease_pool_call() {
        return TransitionKind::AutoreleasePoolCall;
    }
    let owned = results
        .iter()
        .filter(|&&r| r == ResultConvention::Owned)
        .count();
    if owned == 1 {
        TransitionKind::StrongEntrance
    } else {
        TransitionKind::Unknown
    }
}

/// The value an entrance introduces: the owned result of an entrance
/// instruction, or the argument itself.
pub(crate) fn entrance_value(func: &Function, inst: InstId) -> Option<ValueId> {
    match func.inst_kind(inst) {
        InstKind::Apply { results, .. } => results
            .iter()
            .position(|&r| r == ResultConvention::Owned)
            .and_then(|i| func.inst_results(inst).get(i).copied()),
        _ => func.inst_results(inst).first().copied(),
    }
}

/// The single operand a mutator acts on.
pub(crate) fn mutator_operand(kind: &InstKind) -> Option<ValueId> {
    match kind {
        InstKind::StrongRetain { operand }
        | InstKind::RetainValue { operand }
        | InstKind::StrongRelease { operand }
        | InstKind::ReleaseValue { operand } => Some(*operand),
        _ => None,
    }
}
