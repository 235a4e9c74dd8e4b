//! Property-based tests for RC pair elimination.
//!
//! Random small CFGs over three arguments whose conventions are drawn per
//! case, each block a run of retains, releases, reads and opaque calls.
//! Checked:
//! 1. Soundness: every matching set pairs RC operations on its own root and
//!    no instruction is in two sets. For each increment and decrement of a
//!    set, every program point on a path from one to the other that avoids
//!    the other set members is free of opaque calls, barrier terminators
//!    and unmatched RC operations on the root.
//! 2. Idempotence: a second optimization run changes nothing.
//! 3. Barrier table: only `br` and `cond_br` let matching cross them.
//!
//! A set is not a cartesian pairing. In
//! `retain x; br bb1; bb1: release x; opaque; retain x; br bb2; bb2: release x`
//! all four operations form one sound set. Taken literally, the outer
//! retain and outer release straddle the opaque call, but every path
//! between them runs through the inner release and retain, which close and
//! reopen the count around it. Only paths that avoid the other members say
//! what an increment and a decrement guard together.

#![allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]
#![allow(
    clippy::doc_markdown,
    clippy::redundant_closure_for_method_calls,
    reason = "Proptest macros generate code with these patterns"
)]

use std::collections::{BTreeSet, VecDeque};

use proptest::prelude::*;
use sil_arc::{
    build_matching_sets, is_barrier_terminator, optimize_function, run_dataflow, ArcContext,
    ArcOptConfig, DataflowGranularity, DominatorTree,
};
use sil_ir::{
    ArgConvention, BlockId, ClassDecl, DeinitEffects, Function, InstId, InstKind, Name,
    SideEffects, SilType, TerminatorKind, ValueId,
};

// -- Program Generation --

const CLASS: Name = Name::from_raw(10);
const PURE: Name = Name::from_raw(20);
const OPAQUE: Name = Name::from_raw(21);

#[derive(Clone, Copy, Debug)]
enum Op {
    Retain(usize),
    Release(usize),
    Read(usize),
    Opaque,
}

#[derive(Clone, Copy, Debug)]
enum Exit {
    Fallthrough,
    /// `cond_br` to the next block or to block `1 + n % (blocks - 1)`.
    Branch(usize),
}

#[derive(Clone, Debug)]
struct BlockSpec {
    ops: Vec<Op>,
    exit: Exit,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..3usize).prop_map(Op::Retain),
        3 => (0..3usize).prop_map(Op::Release),
        1 => (0..3usize).prop_map(Op::Read),
        1 => Just(Op::Opaque),
    ]
}

fn block_strategy() -> impl Strategy<Value = BlockSpec> {
    (
        prop::collection::vec(op_strategy(), 0..6),
        prop_oneof![
            Just(Exit::Fallthrough),
            (0..8usize).prop_map(Exit::Branch)
        ],
    )
        .prop_map(|(ops, exit)| BlockSpec { ops, exit })
}

#[derive(Clone, Debug)]
struct Program {
    conventions: [ArgConvention; 3],
    blocks: Vec<BlockSpec>,
}

fn convention_strategy() -> impl Strategy<Value = ArgConvention> {
    prop_oneof![
        Just(ArgConvention::Owned),
        Just(ArgConvention::Guaranteed),
        Just(ArgConvention::Unowned),
    ]
}

fn program_strategy() -> impl Strategy<Value = Program> {
    (
        prop::array::uniform3(convention_strategy()),
        prop::collection::vec(block_strategy(), 1..6),
    )
        .prop_map(|(conventions, blocks)| Program {
            conventions,
            blocks,
        })
}

fn classes() -> Vec<ClassDecl> {
    vec![ClassDecl {
        name: CLASS,
        superclass: None,
        is_final: true,
        deinit: DeinitEffects::None,
    }]
}

/// Lower a program. Every block is reachable through the fallthrough
/// chain; branches may form loops but never target the entry.
fn build(conventions: [ArgConvention; 3], program: &[BlockSpec]) -> (Function, Vec<ValueId>) {
    let mut func = Function::new(Name::from_raw(5), false);
    let args: Vec<ValueId> = conventions
        .iter()
        .map(|&convention| func.add_argument(SilType::Ref(CLASS), convention))
        .collect();
    let mut blocks = vec![func.entry()];
    for _ in 1..program.len() {
        blocks.push(func.create_block());
    }
    let cond = func.builder(blocks[0]).integer_literal(0);

    for (i, spec) in program.iter().enumerate() {
        let mut bld = func.builder(blocks[i]);
        for op in &spec.ops {
            match *op {
                Op::Retain(a) => {
                    bld.strong_retain(args[a]);
                }
                Op::Release(a) => {
                    bld.strong_release(args[a]);
                }
                Op::Read(a) => {
                    bld.call(PURE, &[(args[a], ArgConvention::Guaranteed)], SideEffects::None);
                }
                Op::Opaque => {
                    bld.call(OPAQUE, &[], SideEffects::Unknown);
                }
            }
        }
        if i + 1 == program.len() {
            bld.return_(None);
            continue;
        }
        match spec.exit {
            Exit::Fallthrough => bld.br(blocks[i + 1], &[]),
            Exit::Branch(n) => {
                let target = blocks[1 + n % (program.len() - 1)];
                bld.cond_br(cond, blocks[i + 1], &[], target, &[]);
            }
        }
    }
    (func, args)
}

fn rc_operand(func: &Function, inst: InstId) -> Option<(bool, ValueId)> {
    match *func.inst_kind(inst) {
        InstKind::StrongRetain { operand } | InstKind::RetainValue { operand } => {
            Some((true, operand))
        }
        InstKind::StrongRelease { operand } | InstKind::ReleaseValue { operand } => {
            Some((false, operand))
        }
        _ => None,
    }
}

fn is_opaque_call(func: &Function, inst: InstId) -> bool {
    matches!(
        func.inst_kind(inst),
        InstKind::Apply {
            effects: SideEffects::Unknown,
            ..
        }
    )
}

fn rc_op_count(func: &Function) -> usize {
    func.block_ids()
        .flat_map(|bl| func.block_insts(bl).iter())
        .filter(|&&i| rc_operand(func, i).is_some())
        .count()
}

/// A position in a block: an instruction index, or the terminator at
/// `block_insts(block).len()`.
type Point = (BlockId, usize);

fn point_successors(func: &Function, (block, index): Point) -> Vec<Point> {
    if index < func.block_insts(block).len() {
        vec![(block, index + 1)]
    } else {
        func.successors(block).into_iter().map(|s| (s, 0)).collect()
    }
}

fn point_predecessors(
    func: &Function,
    preds: &[Vec<BlockId>],
    (block, index): Point,
) -> Vec<Point> {
    if index > 0 {
        vec![(block, index - 1)]
    } else {
        preds[block.index()]
            .iter()
            .map(|&p| (p, func.block_insts(p).len()))
            .collect()
    }
}

fn member_at(
    func: &Function,
    members: &BTreeSet<InstId>,
    (block, index): Point,
) -> Option<InstId> {
    func.block_insts(block)
        .get(index)
        .copied()
        .filter(|inst| members.contains(inst))
}

/// Points reachable from `start` (exclusive) without stepping onto a set
/// member, and whether `target` was hit.
fn sweep(
    start: Point,
    target: InstId,
    members: &BTreeSet<InstId>,
    func: &Function,
    next: impl Fn(Point) -> Vec<Point>,
) -> (BTreeSet<Point>, bool) {
    let mut visited = BTreeSet::new();
    let mut hit = false;
    let mut queue: VecDeque<Point> = next(start).into();
    while let Some(point) = queue.pop_front() {
        if let Some(member) = member_at(func, members, point) {
            hit |= member == target;
            continue;
        }
        if visited.insert(point) {
            queue.extend(next(point));
        }
    }
    (visited, hit)
}

fn check_sets(func: &Function, granularity: DataflowGranularity) {
    let ctx = ArcContext::new(&classes());
    let dom = DominatorTree::build(func);
    let result = run_dataflow(func, &dom, &ctx.destructors, granularity);
    let matching = build_matching_sets(&result);

    let mut preds: Vec<Vec<BlockId>> = vec![Vec::new(); func.num_blocks()];
    for block in func.block_ids() {
        for succ in func.successors(block) {
            preds[succ.index()].push(block);
        }
    }

    let mut seen = BTreeSet::new();
    for set in &matching.sets {
        for &inc in &set.increments {
            assert_eq!(rc_operand(func, inc), Some((true, set.root)));
        }
        for &dec in &set.decrements {
            assert_eq!(rc_operand(func, dec), Some((false, set.root)));
        }
        for member in set.members() {
            assert!(seen.insert(member), "{member} is in two sets");
        }

        let members: BTreeSet<InstId> = set.members().collect();
        for (inc, dec) in set.pairs() {
            let (forward, reached) = sweep(func.inst_position(inc), dec, &members, func, |p| {
                point_successors(func, p)
            });
            if !reached {
                continue;
            }
            let (backward, _) = sweep(func.inst_position(dec), inc, &members, func, |p| {
                point_predecessors(func, &preds, p)
            });
            for &(block, index) in forward.intersection(&backward) {
                match func.block_insts(block).get(index) {
                    Some(&inst) => {
                        assert!(
                            !is_opaque_call(func, inst),
                            "{inc} and {dec} matched across opaque call {inst}"
                        );
                        assert!(
                            !matches!(rc_operand(func, inst), Some((_, v)) if v == set.root),
                            "{inc} and {dec} matched across unmatched RC op {inst}"
                        );
                    }
                    None => assert!(
                        !is_barrier_terminator(func.terminator(block)),
                        "{inc} and {dec} matched across the terminator of {block}"
                    ),
                }
            }
        }
    }
}

// -- Properties --

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn matching_sets_are_sound(program in program_strategy()) {
        let (func, _) = build(program.conventions, &program.blocks);
        check_sets(&func, DataflowGranularity::Block);
        check_sets(&func, DataflowGranularity::Region);
    }

    #[test]
    fn optimization_is_idempotent(
        program in program_strategy(),
        region in any::<bool>(),
    ) {
        let (mut func, _) = build(program.conventions, &program.blocks);
        let granularity = if region {
            DataflowGranularity::Region
        } else {
            DataflowGranularity::Block
        };
        let config = ArcOptConfig::default()
            .with_granularity(granularity)
            .with_max_iterations(64)
            .with_verify_ownership(false);
        let ctx = ArcContext::new(&classes());

        let before = rc_op_count(&func);
        optimize_function(&mut func, &ctx, &config);
        let after = rc_op_count(&func);
        prop_assert!(after <= before);

        prop_assert!(!optimize_function(&mut func, &ctx, &config));
        prop_assert_eq!(rc_op_count(&func), after);
    }
}

#[test]
fn only_branches_are_transparent() {
    for kind in TerminatorKind::ALL {
        let mut func = Function::new(Name::from_raw(5), false);
        let other = func.create_block();
        let entry = func.entry();
        let mut bld = func.builder(entry);
        let v = bld.integer_literal(0);
        match kind {
            TerminatorKind::Br => bld.br(other, &[]),
            TerminatorKind::CondBr => bld.cond_br(v, other, &[], other, &[]),
            TerminatorKind::Return => bld.return_(Some(v)),
            TerminatorKind::Throw => bld.throw(v),
            TerminatorKind::Unwind => bld.unwind(),
            TerminatorKind::Yield => bld.yield_(&[v], other, other),
            TerminatorKind::SwitchEnum => bld.switch_enum(v, &[(0, other)], None),
            TerminatorKind::CheckedCastBr => bld.checked_cast_br(v, other, other),
            TerminatorKind::Await => bld.await_(v, other, None),
            TerminatorKind::Unreachable => bld.unreachable(),
        }
        let term = func.terminator(entry);
        assert_eq!(term.kind(), kind);
        let transparent = matches!(kind, TerminatorKind::Br | TerminatorKind::CondBr);
        assert_eq!(is_barrier_terminator(term), !transparent, "{kind:?}");
    }
}

/// The smallest generated program: one adjacent pair on one argument.
#[test]
fn generated_adjacent_pair_is_eliminated() {
    let (mut func, _) = build(
        [ArgConvention::Guaranteed; 3],
        &[BlockSpec {
            ops: vec![Op::Retain(0), Op::Release(0)],
            exit: Exit::Fallthrough,
        }],
    );
    let ctx = ArcContext::new(&classes());
    let config = ArcOptConfig::default().with_verify_ownership(false);

    assert!(optimize_function(&mut func, &ctx, &config));
    assert_eq!(rc_op_count(&func), 0);
}

/// The interleaved set from the module docs passes the path check in both
/// granularities.
#[test]
fn interleaved_set_passes_path_check() {
    let (func, _) = build(
        [ArgConvention::Guaranteed; 3],
        &[
            BlockSpec {
                ops: vec![Op::Retain(0)],
                exit: Exit::Fallthrough,
            },
            BlockSpec {
                ops: vec![Op::Release(0), Op::Opaque, Op::Retain(0)],
                exit: Exit::Fallthrough,
            },
            BlockSpec {
                ops: vec![Op::Release(0)],
                exit: Exit::Fallthrough,
            },
        ],
    );
    check_sets(&func, DataflowGranularity::Block);
    check_sets(&func, DataflowGranularity::Region);
}
