use pretty_assertions::assert_eq;
use sil_ir::{ArgConvention, BlockId, OwnershipKind, SideEffects};

use crate::test_helpers::{b, call, destructors, make_func, pure_fn, ref_ty};

use super::*;

fn run(func: &Function, granularity: DataflowGranularity) -> DataflowResult {
    let dom = DominatorTree::build(func);
    run_dataflow(func, &dom, &destructors(), granularity)
}

fn set(insts: &[InstId]) -> crate::ref_count_state::InstSet {
    insts.iter().copied().collect()
}

/// `retain x; release x` with nothing in between matches in both
/// directions.
#[test]
fn adjacent_pair_matches_both_ways() {
    let mut func = make_func(false);
    let x = func.add_argument(ref_ty(), ArgConvention::Guaranteed);
    let mut bld = func.builder(b(0));
    let inc = bld.strong_retain(x);
    let dec = bld.strong_release(x);
    bld.return_(None);

    let result = run(&func, DataflowGranularity::Block);
    let td = &result.dec_to_inc[&dec];
    assert_eq!(td.kind, TransitionKind::StrongIncrement);
    assert_eq!(td.mutators, set(&[inc]));
    assert!(td.is_clean());
    assert!(td.known_safe);

    let bu = &result.inc_to_dec[&inc];
    assert_eq!(bu.mutators, set(&[dec]));
    assert!(bu.is_clean());
    assert_eq!(result.roots[&inc], x);
    assert!(result.nesting_roots.is_empty());
}

#[test]
fn unknown_call_blocks_matching() {
    let mut func = make_func(false);
    let x = func.add_argument(ref_ty(), ArgConvention::Guaranteed);
    func.builder(b(0)).strong_retain(x);
    call(&mut func, b(0), SideEffects::Unknown);
    let mut bld = func.builder(b(0));
    bld.strong_release(x);
    bld.return_(None);

    let result = run(&func, DataflowGranularity::Block);
    assert!(result.dec_to_inc.is_empty());
    assert!(result.inc_to_dec.is_empty());
}

/// A pure call reading `x` leaves the pair matched but used, with the
/// call as insertion point.
#[test]
fn intervening_use_marks_might_be_used() {
    let mut func = make_func(false);
    let x = func.add_argument(ref_ty(), ArgConvention::Guaranteed);
    let mut bld = func.builder(b(0));
    let inc = bld.strong_retain(x);
    let use_ = bld.call(pure_fn(), &[(x, ArgConvention::Guaranteed)], SideEffects::None);
    let dec = bld.strong_release(x);
    bld.return_(None);

    let result = run(&func, DataflowGranularity::Block);
    let td = &result.dec_to_inc[&dec];
    assert_eq!(td.lattice, TopDownLattice::MightBeUsed);
    assert_eq!(td.insertion_points, set(&[use_]));
    assert!(td.known_safe);

    let bu = &result.inc_to_dec[&inc];
    assert_eq!(bu.lattice, BottomUpLattice::MightBeUsed);
    assert_eq!(bu.insertion_points, set(&[use_]));
}

#[test]
fn unowned_argument_is_not_known_safe() {
    let mut func = make_func(false);
    let x = func.add_argument(ref_ty(), ArgConvention::Unowned);
    let mut bld = func.builder(b(0));
    bld.strong_retain(x);
    let dec = bld.strong_release(x);
    bld.return_(None);

    let result = run(&func, DataflowGranularity::Block);
    assert!(!result.dec_to_inc[&dec].known_safe);
}

/// The allocation owns `x` until `return` consumes it, so the retain in
/// between is known safe.
#[test]
fn live_entrance_makes_increment_known_safe() {
    let mut func = make_func(false);
    let mut bld = func.builder(b(0));
    let x = bld.alloc_ref(crate::test_helpers::safe_class());
    bld.strong_retain(x);
    let dec = bld.strong_release(x);
    bld.return_(Some(x));

    let result = run(&func, DataflowGranularity::Block);
    let td = &result.dec_to_inc[&dec];
    assert_eq!(td.kind, TransitionKind::StrongIncrement);
    assert!(td.known_safe);
}

#[test]
fn nested_increments_are_detected() {
    let mut func = make_func(false);
    let x = func.add_argument(ref_ty(), ArgConvention::Guaranteed);
    let mut bld = func.builder(b(0));
    bld.strong_retain(x);
    bld.strong_retain(x);
    bld.strong_release(x);
    bld.strong_release(x);
    bld.return_(None);

    let result = run(&func, DataflowGranularity::Block);
    assert!(result.nesting_roots.contains(&x));
    assert!(result.dec_to_inc.values().any(|s| s.nesting_detected));
}

/// Releases on both arms of a diamond merge into one bottom-up state
/// above the branch.
#[test]
fn diamond_merges_decrements() {
    let mut func = make_func(false);
    let x = func.add_argument(ref_ty(), ArgConvention::Guaranteed);
    let left = func.create_block();
    let right = func.create_block();
    let mut bld = func.builder(b(0));
    let c = bld.integer_literal(1);
    let inc = bld.strong_retain(x);
    bld.cond_br(c, left, &[], right, &[]);
    bld.position_at_end(left);
    let dec_l = bld.strong_release(x);
    bld.return_(None);
    bld.position_at_end(right);
    let dec_r = bld.strong_release(x);
    bld.return_(None);

    let result = run(&func, DataflowGranularity::Block);
    assert_eq!(result.dec_to_inc[&dec_l].mutators, set(&[inc]));
    assert_eq!(result.dec_to_inc[&dec_r].mutators, set(&[inc]));
    let bu = &result.inc_to_dec[&inc];
    assert_eq!(bu.mutators, set(&[dec_l, dec_r]));
    assert!(bu.is_clean());
}

/// A release on only one arm leaves nothing open at the join.
#[test]
fn one_sided_release_does_not_match_above_branch() {
    let mut func = make_func(false);
    let x = func.add_argument(ref_ty(), ArgConvention::Guaranteed);
    let left = func.create_block();
    let right = func.create_block();
    let mut bld = func.builder(b(0));
    let c = bld.integer_literal(1);
    let inc = bld.strong_retain(x);
    bld.cond_br(c, left, &[], right, &[]);
    bld.position_at_end(left);
    bld.strong_release(x);
    bld.return_(None);
    bld.position_at_end(right);
    bld.return_(None);

    let result = run(&func, DataflowGranularity::Block);
    assert!(!result.inc_to_dec.contains_key(&inc));
}

/// Branching `x` into a phi rooted at `x` is not a use.
#[test]
fn phi_with_same_root_is_transparent() {
    let mut func = make_func(false);
    let x = func.add_argument(ref_ty(), ArgConvention::Guaranteed);
    let next = func.create_block();
    let p = func.add_block_arg(next, ref_ty(), OwnershipKind::Guaranteed);
    let mut bld = func.builder(b(0));
    let inc = bld.strong_retain(x);
    bld.br(next, &[x]);
    bld.position_at_end(next);
    let dec = bld.strong_release(p);
    bld.return_(None);

    let result = run(&func, DataflowGranularity::Block);
    assert!(result.dec_to_inc[&dec].is_clean());
    assert!(result.inc_to_dec[&inc].is_clean());
}

/// bb0: retain x → bb1 ⇄ bb1 → bb2: release x. `body` fills the loop.
fn around_loop(body: impl FnOnce(&mut Function, ValueId, BlockId)) -> (Function, InstId, InstId) {
    let mut func = make_func(false);
    let x = func.add_argument(ref_ty(), ArgConvention::Guaranteed);
    let header = func.create_block();
    let exit = func.create_block();
    let mut bld = func.builder(b(0));
    let c = bld.integer_literal(0);
    let inc = bld.strong_retain(x);
    bld.br(header, &[]);
    body(&mut func, x, header);
    let mut bld = func.builder(header);
    bld.cond_br(c, header, &[], exit, &[]);
    bld.position_at_end(exit);
    let dec = bld.strong_release(x);
    bld.return_(None);
    (func, inc, dec)
}

#[test]
fn block_granularity_stops_at_loops() {
    let (func, inc, dec) = around_loop(|_, _, _| {});
    let result = run(&func, DataflowGranularity::Block);
    assert!(!result.dec_to_inc.contains_key(&dec));
    assert!(!result.inc_to_dec.contains_key(&inc));
}

#[test]
fn region_granularity_flows_around_quiet_loop() {
    let (func, inc, dec) = around_loop(|_, _, _| {});
    let result = run(&func, DataflowGranularity::Region);
    let td = &result.dec_to_inc[&dec];
    assert_eq!(td.mutators, set(&[inc]));
    assert!(td.is_clean());
    assert!(result.inc_to_dec[&inc].is_clean());
}

#[test]
fn loop_using_root_is_summarized_as_use() {
    let (func, inc, dec) = around_loop(|func, x, header| {
        func.builder(header)
            .call(pure_fn(), &[(x, ArgConvention::Guaranteed)], SideEffects::None);
    });
    let result = run(&func, DataflowGranularity::Region);
    let td = &result.dec_to_inc[&dec];
    assert_eq!(td.lattice, TopDownLattice::MightBeUsed);
    assert!(td.insertion_points.is_empty());
    assert!(!td.known_safe);
    assert_eq!(
        result.inc_to_dec[&inc].lattice,
        BottomUpLattice::MightBeUsed
    );
}

#[test]
fn loop_with_barrier_clears_state() {
    let (func, inc, dec) = around_loop(|func, _, header| {
        call(func, header, SideEffects::Unknown);
    });
    let result = run(&func, DataflowGranularity::Region);
    assert!(!result.dec_to_inc.contains_key(&dec));
    assert!(!result.inc_to_dec.contains_key(&inc));
}

/// A loop that releases `x` closes whatever was open on it.
#[test]
fn loop_mutating_root_closes_state() {
    let (func, inc, dec) = around_loop(|func, x, header| {
        func.builder(header).strong_release(x);
    });
    let result = run(&func, DataflowGranularity::Region);
    assert!(!result.dec_to_inc.contains_key(&dec));
    assert!(!result.inc_to_dec.contains_key(&inc));
}

/// An irreducible CFG falls back to block granularity instead of failing.
#[test]
fn irreducible_cfg_falls_back_to_blocks() {
    let mut func = make_func(false);
    let x = func.add_argument(ref_ty(), ArgConvention::Guaranteed);
    let left = func.create_block();
    let right = func.create_block();
    let mut bld = func.builder(b(0));
    let c = bld.integer_literal(0);
    let inc = bld.strong_retain(x);
    let dec = bld.strong_release(x);
    bld.cond_br(c, left, &[], right, &[]);
    bld.position_at_end(left);
    bld.cond_br(c, right, &[], left, &[]);
    bld.position_at_end(right);
    bld.cond_br(c, left, &[], right, &[]);

    let region = run(&func, DataflowGranularity::Region);
    let block = run(&func, DataflowGranularity::Block);
    assert_eq!(region.dec_to_inc.keys().collect::<Vec<_>>(), vec![&dec]);
    assert_eq!(block.inc_to_dec.keys().collect::<Vec<_>>(), vec![&inc]);
    assert_eq!(region.inc_to_dec.len(), block.inc_to_dec.len());
}
