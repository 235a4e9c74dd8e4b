use pretty_assertions::assert_eq;
use sil_ir::{ArgConvention, SideEffects};

use crate::test_helpers::{
    b, count_rc_ops, count_releases, count_retains, ctx, destructors, make_func, pure_fn, ref_ty,
};
use crate::DataflowGranularity;

use super::*;

fn sets_of(func: &Function) -> MatchingSets {
    let dom = DominatorTree::build(func);
    let result = run_dataflow(func, &dom, &destructors(), DataflowGranularity::Block);
    build_matching_sets(&result)
}

#[test]
fn adjacent_pair_forms_one_set() {
    let mut func = make_func(false);
    let x = func.add_argument(ref_ty(), ArgConvention::Guaranteed);
    let mut bld = func.builder(b(0));
    let inc = bld.strong_retain(x);
    let dec = bld.strong_release(x);
    bld.return_(None);

    let matching = sets_of(&func);
    assert_eq!(matching.suppressed, 0);
    assert_eq!(matching.sets.len(), 1);
    let set = &matching.sets[0];
    assert_eq!(set.root, x);
    assert_eq!(set.pairs().collect::<Vec<_>>(), vec![(inc, dec)]);

    assert_eq!(eliminate_pairs(&mut func, &matching.sets), 2);
    assert_eq!(count_rc_ops(&func), 0);
}

/// One retain balanced by a release on each arm of a diamond.
#[test]
fn diamond_set_holds_both_releases() {
    let mut func = make_func(false);
    let x = func.add_argument(ref_ty(), ArgConvention::Guaranteed);
    let left = func.create_block();
    let right = func.create_block();
    let mut bld = func.builder(b(0));
    let c = bld.integer_literal(0);
    let inc = bld.strong_retain(x);
    bld.cond_br(c, left, &[], right, &[]);
    bld.position_at_end(left);
    let dec_l = bld.strong_release(x);
    bld.return_(None);
    bld.position_at_end(right);
    let dec_r = bld.strong_release(x);
    bld.return_(None);

    let matching = sets_of(&func);
    assert_eq!(matching.sets.len(), 1);
    let set = &matching.sets[0];
    assert_eq!(set.increments, BTreeSet::from([inc]));
    assert_eq!(set.decrements, BTreeSet::from([dec_l, dec_r]));
    assert_eq!(set.pairs().count(), 2);
}

/// `retain; retain; release` removes nothing and reports the nesting.
#[test]
fn nesting_is_suppressed() {
    let mut func = make_func(false);
    let x = func.add_argument(ref_ty(), ArgConvention::Guaranteed);
    let mut bld = func.builder(b(0));
    bld.strong_retain(x);
    bld.strong_retain(x);
    bld.strong_release(x);
    bld.return_(None);

    let matching = sets_of(&func);
    assert!(matching.sets.is_empty());
    assert!(matching.suppressed > 0);
}

/// A use between the pair on a value nothing else keeps alive blocks
/// elimination.
#[test]
fn used_and_unsafe_is_kept() {
    let mut func = make_func(false);
    let x = func.add_argument(ref_ty(), ArgConvention::Unowned);
    let mut bld = func.builder(b(0));
    bld.strong_retain(x);
    bld.call(pure_fn(), &[(x, ArgConvention::Guaranteed)], SideEffects::None);
    bld.strong_release(x);
    bld.return_(None);

    assert!(sets_of(&func).sets.is_empty());
}

/// The same use on a guaranteed argument is fine: the caller holds it.
#[test]
fn used_but_known_safe_is_eliminated() {
    let mut func = make_func(false);
    let x = func.add_argument(ref_ty(), ArgConvention::Guaranteed);
    let mut bld = func.builder(b(0));
    bld.strong_retain(x);
    bld.call(pure_fn(), &[(x, ArgConvention::Guaranteed)], SideEffects::None);
    bld.strong_release(x);
    bld.return_(None);

    assert_eq!(sets_of(&func).sets.len(), 1);
}

/// An allocation's entrance matched by its final release is never a set:
/// there is no increment to delete.
#[test]
fn entrance_is_not_eliminated() {
    let mut func = make_func(false);
    let mut bld = func.builder(b(0));
    let x = bld.alloc_ref(crate::test_helpers::safe_class());
    bld.strong_release(x);
    bld.return_(None);

    assert!(sets_of(&func).sets.is_empty());
}

#[test]
fn driver_reaches_fixed_point() {
    let mut func = make_func(false);
    let x = func.add_argument(ref_ty(), ArgConvention::Guaranteed);
    let y = func.add_argument(ref_ty(), ArgConvention::Guaranteed);
    let mut bld = func.builder(b(0));
    bld.strong_retain(x);
    bld.strong_retain(y);
    bld.strong_release(y);
    bld.strong_release(x);
    bld.return_(None);

    let ctx = ctx();
    let config = ArcOptConfig::default();
    assert_eq!(eliminate_rc_pairs(&mut func, &ctx, &config), 4);
    assert_eq!(count_retains(&func, x), 0);
    assert_eq!(count_releases(&func, y), 0);
    assert_eq!(eliminate_rc_pairs(&mut func, &ctx, &config), 0);
}

#[test]
fn zero_iterations_changes_nothing() {
    let mut func = make_func(false);
    let x = func.add_argument(ref_ty(), ArgConvention::Guaranteed);
    let mut bld = func.builder(b(0));
    bld.strong_retain(x);
    bld.strong_release(x);
    bld.return_(None);

    let config = ArcOptConfig::default().with_max_iterations(0);
    assert_eq!(eliminate_rc_pairs(&mut func, &ctx(), &config), 0);
    assert_eq!(count_rc_ops(&func), 2);
}
