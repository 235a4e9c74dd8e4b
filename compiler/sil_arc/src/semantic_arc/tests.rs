use pretty_assertions::assert_eq;
use sil_ir::{ArgConvention, Function, InstKind, OwnershipKind};

use crate::test_helpers::{b, make_func, ref_ty, safe_class};
use crate::verify::verify_function;

use super::*;

fn run(func: &mut Function) -> PeepholeStats {
    run_semantic_arc(func, &ArcOptConfig::default())
}

fn count_kind(func: &Function, pred: impl Fn(&InstKind) -> bool) -> usize {
    func.block_ids()
        .flat_map(|bl| func.block_insts(bl).iter())
        .filter(|&&i| pred(func.inst_kind(i)))
        .count()
}

fn assert_verifies(func: &Function) {
    assert!(!verify_function(func, ErrorBehavior::RETURN_FALSE).found_error());
}

// ── Dead copies ─────────────────────────────────────────────────────

/// x = alloc; c = copy x; fix_lifetime c; destroy c; destroy x
#[test]
fn dead_copy_is_removed() {
    let mut func = make_func(true);
    let mut bld = func.builder(b(0));
    let x = bld.alloc_ref(safe_class());
    let c = bld.copy_value(x);
    bld.fix_lifetime(c);
    bld.destroy_value(c);
    bld.destroy_value(x);
    bld.return_(None);
    assert_verifies(&func);

    let stats = run(&mut func);

    assert_eq!(stats.dead_copies, 1);
    assert_eq!(count_kind(&func, |k| matches!(k, InstKind::CopyValue { .. })), 0);
    assert_eq!(count_kind(&func, |k| matches!(k, InstKind::DestroyValue { .. })), 1);
    assert_verifies(&func);
}

/// The copy is read after the original is destroyed.
#[test]
fn copy_outliving_operand_is_kept() {
    let mut func = make_func(true);
    let mut bld = func.builder(b(0));
    let x = bld.alloc_ref(safe_class());
    let c = bld.copy_value(x);
    bld.destroy_value(x);
    bld.fix_lifetime(c);
    bld.destroy_value(c);
    bld.return_(None);

    assert_eq!(run(&mut func), PeepholeStats::default());
    assert_eq!(count_kind(&func, |k| matches!(k, InstKind::CopyValue { .. })), 1);
}

/// The copy escapes through the return, so it is not dead.
#[test]
fn copy_consumed_by_return_is_kept() {
    let mut func = make_func(true);
    let mut bld = func.builder(b(0));
    let x = bld.alloc_ref(safe_class());
    let c = bld.copy_value(x);
    bld.destroy_value(x);
    bld.return_(Some(c));

    assert_eq!(run(&mut func).dead_copies, 0);
}

/// Copies of a guaranteed argument can always read the argument.
#[test]
fn copy_of_guaranteed_argument_is_removed() {
    let mut func = make_func(true);
    let x = func.add_argument(ref_ty(), ArgConvention::Guaranteed);
    let mut bld = func.builder(b(0));
    let c = bld.copy_value(x);
    bld.fix_lifetime(c);
    bld.destroy_value(c);
    bld.return_(None);

    assert_eq!(run(&mut func).dead_copies, 1);
    assert_verifies(&func);
}

// ── Moves and conversions ───────────────────────────────────────────

fn moved() -> Function {
    let mut func = make_func(true);
    let mut bld = func.builder(b(0));
    let x = bld.alloc_ref(safe_class());
    bld.fix_lifetime(x);
    let m = bld.move_value(x);
    bld.fix_lifetime(m);
    bld.destroy_value(m);
    bld.return_(None);
    func
}

#[test]
fn redundant_move_is_removed() {
    let mut func = moved();
    assert_verifies(&func);

    assert_eq!(run(&mut func).redundant_moves, 1);
    assert_eq!(count_kind(&func, |k| matches!(k, InstKind::MoveValue { .. })), 0);
    assert_verifies(&func);
}

#[test]
fn moves_are_kept_in_mandatory_mode() {
    let mut func = moved();
    let stats = run_semantic_arc(&mut func, &ArcOptConfig::mandatory());
    assert_eq!(stats, PeepholeStats::default());
}

#[test]
fn same_kind_conversion_is_removed() {
    let mut func = make_func(true);
    let mut bld = func.builder(b(0));
    let x = bld.alloc_ref(safe_class());
    let r = bld.unchecked_ownership_conversion(x, OwnershipKind::Owned);
    bld.destroy_value(r);
    bld.return_(None);

    let stats = run_semantic_arc(&mut func, &ArcOptConfig::mandatory());
    assert_eq!(stats.ownership_conversions, 1);
    assert_verifies(&func);
}

/// Owned to guaranteed, read inside the owner's lifetime.
#[test]
fn owned_to_guaranteed_conversion_is_removed() {
    let mut func = make_func(true);
    let mut bld = func.builder(b(0));
    let x = bld.alloc_ref(safe_class());
    let r = bld.unchecked_ownership_conversion(x, OwnershipKind::Guaranteed);
    bld.fix_lifetime(r);
    bld.destroy_value(x);
    bld.return_(None);

    assert_eq!(run(&mut func).ownership_conversions, 1);
    assert_verifies(&func);
}

/// Returning the guaranteed result reads it; returning the owned operand
/// would consume it.
#[test]
fn owned_to_guaranteed_conversion_feeding_return_is_kept() {
    let mut func = make_func(true);
    let mut bld = func.builder(b(0));
    let x = bld.alloc_ref(safe_class());
    let r = bld.unchecked_ownership_conversion(x, OwnershipKind::Guaranteed);
    bld.destroy_value(x);
    bld.return_(Some(r));

    assert_eq!(run(&mut func).ownership_conversions, 0);
}

// ── Phis ────────────────────────────────────────────────────────────

/// bb0: x = alloc; br bb1(x)
/// bb1(p): destroy p; return
#[test]
fn single_incoming_owned_phi_is_removed() {
    let mut func = make_func(true);
    let next = func.create_block();
    let p = func.add_block_arg(next, ref_ty(), OwnershipKind::Owned);
    let mut bld = func.builder(b(0));
    let x = bld.alloc_ref(safe_class());
    bld.br(next, &[x]);
    bld.position_at_end(next);
    bld.destroy_value(p);
    bld.return_(None);

    assert_eq!(run(&mut func).redundant_phis, 1);
    assert!(func.block_args(next).is_empty());
    assert_verifies(&func);
}

/// Both arms of a diamond pass the same owned value to the join.
#[test]
fn diamond_phi_of_one_value_is_removed() {
    let mut func = make_func(true);
    let left = func.create_block();
    let right = func.create_block();
    let join = func.create_block();
    let p = func.add_block_arg(join, ref_ty(), OwnershipKind::Owned);
    let mut bld = func.builder(b(0));
    let x = bld.alloc_ref(safe_class());
    let c = bld.integer_literal(1);
    bld.cond_br(c, left, &[], right, &[]);
    bld.position_at_end(left);
    bld.br(join, &[x]);
    bld.position_at_end(right);
    bld.br(join, &[x]);
    bld.position_at_end(join);
    bld.destroy_value(p);
    bld.return_(None);
    assert_verifies(&func);

    assert_eq!(run(&mut func).redundant_phis, 1);
    assert_verifies(&func);
}

/// Different values flow in; the phi carries real information.
#[test]
fn phi_of_distinct_values_is_kept() {
    let mut func = make_func(true);
    let left = func.create_block();
    let right = func.create_block();
    let join = func.create_block();
    let p = func.add_block_arg(join, ref_ty(), OwnershipKind::Owned);
    let mut bld = func.builder(b(0));
    let c = bld.integer_literal(1);
    bld.cond_br(c, left, &[], right, &[]);
    bld.position_at_end(left);
    let x = bld.alloc_ref(safe_class());
    bld.br(join, &[x]);
    bld.position_at_end(right);
    let y = bld.alloc_ref(safe_class());
    bld.br(join, &[y]);
    bld.position_at_end(join);
    bld.destroy_value(p);
    bld.return_(None);

    assert_eq!(run(&mut func).redundant_phis, 0);
    assert_eq!(func.block_args(join).len(), 1);
}

#[test]
fn functions_without_ownership_are_untouched() {
    let mut func = make_func(false);
    let mut bld = func.builder(b(0));
    let x = bld.alloc_ref(safe_class());
    let c = bld.copy_value(x);
    bld.destroy_value(c);
    bld.return_(Some(x));

    assert_eq!(run(&mut func), PeepholeStats::default());
    assert_eq!(count_kind(&func, |k| matches!(k, InstKind::CopyValue { .. })), 1);
}

/// A copy with no result is malformed; the pass skips it instead of
/// indexing into the empty result list.
#[test]
fn resultless_copy_is_skipped() {
    let mut func = make_func(true);
    let mut bld = func.builder(b(0));
    let x = bld.alloc_ref(safe_class());
    bld.raw_inst(InstKind::CopyValue { operand: x }, &[]);
    bld.destroy_value(x);
    bld.return_(None);

    assert_eq!(run(&mut func), PeepholeStats::default());
    assert_eq!(count_kind(&func, |k| matches!(k, InstKind::CopyValue { .. })), 1);
}
