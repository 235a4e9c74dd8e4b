//! Shared test utilities for the ARC passes.
//!
//! Factory functions for functions, classes and contexts used across the
//! `graph`, `dataflow`, `pair_elim`, `lifetime`, `verify` and pipeline
//! tests. Only compiled in test builds.

use sil_ir::{
    BlockId, ClassDecl, DeinitEffects, Function, InstKind, Name, SideEffects, SilType, ValueId,
};

use crate::{ArcContext, DestructorAnalysis};

/// Shorthand for `BlockId::new(n)`.
pub(crate) fn b(n: u32) -> BlockId {
    BlockId::new(n)
}

/// Class whose deinit has no memory effects. Releasing it is not a barrier.
pub(crate) fn safe_class() -> Name {
    Name::from_raw(10)
}

/// Class with an arbitrary deinit. Releasing it is a barrier.
pub(crate) fn unsafe_class() -> Name {
    Name::from_raw(11)
}

/// Reference type of [`safe_class`].
pub(crate) fn ref_ty() -> SilType {
    SilType::Ref(safe_class())
}

/// Callee with declared `readnone` effects.
pub(crate) fn pure_fn() -> Name {
    Name::from_raw(20)
}

/// Callee with unknown effects.
pub(crate) fn opaque_fn() -> Name {
    Name::from_raw(21)
}

/// An empty function named `f`.
pub(crate) fn make_func(has_ownership: bool) -> Function {
    Function::new(Name::from_raw(5), has_ownership)
}

/// Class declarations for [`safe_class`] and [`unsafe_class`].
pub(crate) fn classes() -> Vec<ClassDecl> {
    vec![
        ClassDecl {
            name: safe_class(),
            superclass: None,
            is_final: true,
            deinit: DeinitEffects::None,
        },
        ClassDecl {
            name: unsafe_class(),
            superclass: None,
            is_final: true,
            deinit: DeinitEffects::Unknown,
        },
    ]
}

pub(crate) fn destructors() -> DestructorAnalysis {
    DestructorAnalysis::new(&classes())
}

pub(crate) fn ctx() -> ArcContext {
    ArcContext::new(&classes())
}

/// Emit a call with no arguments and the given effects at the end of `block`.
pub(crate) fn call(func: &mut Function, block: BlockId, effects: SideEffects) {
    let callee = match effects {
        SideEffects::Unknown => opaque_fn(),
        SideEffects::None | SideEffects::ReadOnly => pure_fn(),
    };
    func.builder(block).call(callee, &[], effects);
}

fn count(func: &Function, pred: impl Fn(&InstKind) -> bool) -> usize {
    func.block_ids()
        .flat_map(|bl| func.block_insts(bl).iter())
        .filter(|&&i| pred(func.inst_kind(i)))
        .count()
}

/// Count `strong_retain` / `retain_value` of `value` across the function.
pub(crate) fn count_retains(func: &Function, value: ValueId) -> usize {
    count(func, |k| {
        matches!(
            k,
            InstKind::StrongRetain { operand } | InstKind::RetainValue { operand }
                if *operand == value
        )
    })
}

/// Count `strong_release` / `release_value` of `value` across the function.
pub(crate) fn count_releases(func: &Function, value: ValueId) -> usize {
    count(func, |k| {
        matches!(
            k,
            InstKind::StrongRelease { operand } | InstKind::ReleaseValue { operand }
                if *operand == value
        )
    })
}

/// Count every retain and release in the function.
pub(crate) fn count_rc_ops(func: &Function) -> usize {
    count(func, |k| {
        matches!(
            k,
            InstKind::StrongRetain { .. }
                | InstKind::RetainValue { .. }
                | InstKind::StrongRelease { .. }
                | InstKind::ReleaseValue { .. }
        )
    })
}
