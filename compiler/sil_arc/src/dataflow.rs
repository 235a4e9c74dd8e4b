//! Bidirectional reference-count dataflow.
//!
//! Finds which increments and decrements of the same identity root can be
//! matched. Two passes per function, each producing one half of the
//! matching relation:
//!
//! 1. **Top-down** (reverse postorder): increments and entrances open a
//!    state on their root; a decrement on a root with an open state closes
//!    it and records that state in [`DataflowResult::dec_to_inc`].
//!
//! 2. **Bottom-up** (postorder, instructions in reverse): decrements open a
//!    state; an increment on a root with an open state closes it and
//!    records the state in [`DataflowResult::inc_to_dec`].
//!
//! Between a mutator and its match, any other use of the root moves the
//! state to `MightBeUsed`. A barrier clears every open state. Seeing a
//! second mutator of the same kind on an open root sets
//! `nesting_detected` and records the root in
//! [`DataflowResult::nesting_roots`].
//!
//! # Joins
//!
//! A root is open at the top of a block only if it is open at the bottom
//! of every reachable predecessor with the same transition kind (bottom-up:
//! every successor). A predecessor not yet visited, which is a back edge in
//! block granularity, has nothing open, so nothing flows around loops.
//!
//! # Regions
//!
//! With [`DataflowGranularity::Region`], each natural loop is also a node:
//! state reaching the loop header from outside flows to the loop exits
//! transformed by a summary of the loop (roots it mutates are closed, roots
//! it uses become `MightBeUsed`, any barrier inside clears everything).
//! The loop body is still analysed on its own, with nothing open at the
//! header.
//!
//! The engine never reports errors. Anything it cannot justify is simply
//! left unmatched.

use std::collections::BTreeMap;

use im::OrdSet;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use sil_ir::{
    ArgConvention, Function, InstId, Operand, OperandOwnership, Terminator, User, ValueDef,
    ValueId,
};

use crate::barrier::{is_barrier_terminator, may_have_unknown_side_effects};
use crate::graph::{
    compute_postorder, compute_predecessors, compute_reverse_postorder, compute_successors,
    DominatorTree,
};
use crate::rc_identity::RcIdentity;
use crate::ref_count_state::{merge_maps, BottomUpLattice, RefCountState, StateMap, TopDownLattice};
use crate::region::{LoopForest, NaturalLoop};
use crate::transition::{classify, entrance_value, mutator_operand, NodeRef, TransitionKind};
use crate::{DataflowGranularity, DestructorAnalysis};

pub type TopDownState = RefCountState<TopDownLattice>;
pub type BottomUpState = RefCountState<BottomUpLattice>;

/// Matching relation computed by [`run_dataflow`].
#[derive(Clone, Debug, Default)]
pub struct DataflowResult {
    /// For each matched decrement, the top-down state it closed.
    pub dec_to_inc: BTreeMap<InstId, TopDownState>,
    /// For each matched increment, the bottom-up state it closed.
    pub inc_to_dec: BTreeMap<InstId, BottomUpState>,
    /// Roots on which nesting was detected.
    pub nesting_roots: FxHashSet<ValueId>,
    /// Identity root of every matched mutator.
    pub roots: BTreeMap<InstId, ValueId>,
}

// ── Per-instruction facts ───────────────────────────────────────────

/// Roots read by one instruction or terminator, each with whether the read
/// consumes the value.
type Uses = SmallVec<[(ValueId, bool); 2]>;

/// Everything the passes need to know about one instruction, computed once
/// and shared by both directions and by loop summaries.
struct InstFacts {
    inst: InstId,
    kind: TransitionKind,
    barrier: bool,
    /// Root a mutator acts on, or the root an entrance introduces.
    root: Option<ValueId>,
    /// Non-mutator reads. Operands forwarded into a result with the same
    /// root are not reads.
    uses: Uses,
    /// Results that are their own root.
    defs: SmallVec<[ValueId; 1]>,
}

struct BlockFacts {
    /// Block arguments that are their own root.
    arg_defs: SmallVec<[ValueId; 2]>,
    insts: Vec<InstFacts>,
    term_barrier: bool,
    term_uses: Uses,
}

fn push_use(uses: &mut Uses, root: ValueId, consuming: bool) {
    if let Some(entry) = uses.iter_mut().find(|(r, _)| *r == root) {
        entry.1 |= consuming;
    } else {
        uses.push((root, consuming));
    }
}

fn is_consuming(ownership: OperandOwnership) -> bool {
    matches!(
        ownership,
        OperandOwnership::DestroyingConsume | OperandOwnership::ForwardingConsume
    )
}

fn inst_facts(
    func: &Function,
    rc: &mut RcIdentity<'_>,
    destructors: &DestructorAnalysis,
    inst: InstId,
) -> InstFacts {
    let kind = classify(func, NodeRef::Inst(inst));
    let data = func.inst(inst);
    let root = match kind {
        TransitionKind::StrongIncrement | TransitionKind::StrongDecrement => {
            mutator_operand(&data.kind).map(|v| rc.root(v))
        }
        TransitionKind::StrongEntrance => entrance_value(func, inst).map(|v| rc.root(v)),
        TransitionKind::Unknown | TransitionKind::AutoreleasePoolCall => None,
    };

    let result_roots: SmallVec<[ValueId; 1]> = data.results.iter().map(|&r| rc.root(r)).collect();
    let defs = data
        .results
        .iter()
        .zip(&result_roots)
        .filter(|(r, root)| r == root)
        .map(|(&r, _)| r)
        .collect();

    let mut uses = Uses::new();
    if !kind.is_mutator() {
        for (index, value) in (0u32..).zip(data.kind.operands()) {
            let root = rc.root(value);
            if !result_roots.is_empty() && result_roots.iter().all(|&r| r == root) {
                continue;
            }
            let ownership = func.operand_ownership(Operand {
                user: User::Inst(inst),
                index,
            });
            push_use(&mut uses, root, is_consuming(ownership));
        }
    }

    InstFacts {
        inst,
        kind,
        barrier: may_have_unknown_side_effects(func, inst, destructors),
        root,
        uses,
        defs,
    }
}

/// The phi fed by operand `index` of a branch terminator.
pub(crate) fn phi_operand(func: &Function, term: &Terminator, index: usize) -> Option<ValueId> {
    match term {
        Terminator::Br { dest, .. } => func.block_args(*dest).get(index).copied(),
        Terminator::CondBr {
            true_dest,
            true_args,
            false_dest,
            ..
        } => {
            let index = index.checked_sub(1)?;
            if index < true_args.len() {
                func.block_args(*true_dest).get(index).copied()
            } else {
                func.block_args(*false_dest)
                    .get(index - true_args.len())
                    .copied()
            }
        }
        _ => None,
    }
}

fn collect_facts(
    func: &Function,
    rc: &mut RcIdentity<'_>,
    destructors: &DestructorAnalysis,
) -> Vec<BlockFacts> {
    let mut facts = Vec::with_capacity(func.num_blocks());
    for block in func.block_ids() {
        let mut arg_defs = SmallVec::new();
        for &arg in func.block_args(block) {
            if rc.root(arg) == arg {
                arg_defs.push(arg);
            }
        }
        let insts = func
            .block_insts(block)
            .iter()
            .map(|&inst| inst_facts(func, rc, destructors, inst))
            .collect();

        let term = func.terminator(block);
        let mut term_uses = Uses::new();
        for (index, value) in (0u32..).zip(term.operands()) {
            let root = rc.root(value);
            if let Some(phi) = phi_operand(func, term, index as usize) {
                if rc.root(phi) == root {
                    continue;
                }
            }
            let ownership = func.operand_ownership(Operand {
                user: User::Terminator(block),
                index,
            });
            push_use(&mut term_uses, root, is_consuming(ownership));
        }

        facts.push(BlockFacts {
            arg_defs,
            insts,
            term_barrier: is_barrier_terminator(term),
            term_uses,
        });
    }
    facts
}

// ── Loop summaries ──────────────────────────────────────────────────

/// What a loop does to the roots that are open when control enters it.
#[derive(Debug, Default)]
struct LoopSummary {
    has_barrier: bool,
    mutated: FxHashSet<ValueId>,
    used: FxHashSet<ValueId>,
    consumed: FxHashSet<ValueId>,
}

fn summarize_loop(l: &NaturalLoop, facts: &[BlockFacts]) -> LoopSummary {
    let mut summary = LoopSummary::default();
    for &block in &l.blocks {
        let block_facts = &facts[block];
        summary.has_barrier |= block_facts.term_barrier;
        let all_uses = block_facts
            .insts
            .iter()
            .flat_map(|f| f.uses.iter())
            .chain(block_facts.term_uses.iter());
        for &(root, consuming) in all_uses {
            summary.used.insert(root);
            if consuming {
                summary.consumed.insert(root);
            }
        }
        for f in &block_facts.insts {
            summary.has_barrier |= f.barrier;
            if f.kind.is_mutator() {
                if let Some(root) = f.root {
                    summary.mutated.insert(root);
                }
            }
        }
    }
    summary
}

// ── Block states ────────────────────────────────────────────────────

/// Top-down state at one program point.
#[derive(Clone, Debug, Default)]
struct TopDownBlockState {
    states: StateMap<TopDownLattice>,
    /// Roots kept alive by an entrance that has not been consumed yet.
    alive: OrdSet<ValueId>,
}

impl TopDownBlockState {
    fn merge(incoming: Vec<TopDownBlockState>) -> Self {
        let maps: Vec<_> = incoming.iter().map(|s| s.states.clone()).collect();
        let alive = incoming
            .into_iter()
            .map(|s| s.alive)
            .reduce(OrdSet::intersection)
            .unwrap_or_default();
        Self {
            states: merge_maps(&maps),
            alive,
        }
    }

    fn summarize(mut self, summary: &LoopSummary) -> Self {
        if summary.has_barrier {
            return Self::default();
        }
        for root in &summary.mutated {
            self.states.remove(root);
            self.alive.remove(root);
        }
        for root in &summary.used {
            if let Some(state) = self.states.get_mut(root) {
                state.record_use(None);
                state.known_safe = false;
            }
        }
        for root in &summary.consumed {
            self.alive.remove(root);
        }
        self
    }
}

fn summarize_bottom_up(
    mut states: StateMap<BottomUpLattice>,
    summary: &LoopSummary,
) -> StateMap<BottomUpLattice> {
    if summary.has_barrier {
        return StateMap::new();
    }
    for root in &summary.mutated {
        states.remove(root);
    }
    for root in &summary.used {
        if let Some(state) = states.get_mut(root) {
            state.record_use(None);
        }
    }
    states
}

// ── Transfer functions ──────────────────────────────────────────────

/// Roots of guaranteed function arguments: the caller keeps them alive for
/// the whole body.
type Pinned = FxHashSet<ValueId>;

fn top_down_uses(uses: &Uses, at: Option<InstId>, st: &mut TopDownBlockState) {
    for &(root, consuming) in uses {
        let closes_entrance = consuming
            && st
                .states
                .get(&root)
                .is_some_and(|s| s.kind == TransitionKind::StrongEntrance);
        if closes_entrance {
            st.states.remove(&root);
        } else if let Some(state) = st.states.get_mut(&root) {
            state.record_use(at);
            if consuming {
                state.known_safe = false;
            }
        }
        if consuming {
            st.alive.remove(&root);
        }
    }
}

fn top_down_inst(
    f: &InstFacts,
    st: &mut TopDownBlockState,
    pinned: &Pinned,
    result: &mut DataflowResult,
) {
    match f.kind {
        TransitionKind::StrongIncrement => {
            let Some(root) = f.root else { return };
            let mut state = TopDownState::new(TransitionKind::StrongIncrement, Some(f.inst));
            state.known_safe = st.alive.contains(&root) || pinned.contains(&root);
            if st
                .states
                .get(&root)
                .is_some_and(|s| s.kind == TransitionKind::StrongIncrement)
            {
                tracing::trace!(inst = %f.inst, root = %root, "top-down nesting");
                state.nesting_detected = true;
                result.nesting_roots.insert(root);
            }
            st.states.insert(root, state);
        }
        TransitionKind::StrongDecrement => {
            if let Some(root) = f.root {
                match st.states.remove(&root) {
                    Some(state) => {
                        tracing::trace!(inst = %f.inst, root = %root, "top-down match");
                        if state.kind == TransitionKind::StrongEntrance {
                            st.alive.remove(&root);
                        }
                        result.dec_to_inc.insert(f.inst, state);
                        result.roots.insert(f.inst, root);
                    }
                    None => {
                        st.alive.remove(&root);
                    }
                }
            }
            if f.barrier {
                st.states.clear();
            }
        }
        TransitionKind::StrongEntrance
        | TransitionKind::AutoreleasePoolCall
        | TransitionKind::Unknown => {
            top_down_uses(&f.uses, Some(f.inst), st);
            if f.barrier {
                st.states.clear();
            }
            if f.kind == TransitionKind::StrongEntrance {
                if let Some(root) = f.root {
                    st.states.insert(
                        root,
                        TopDownState::new(TransitionKind::StrongEntrance, Some(f.inst)),
                    );
                    st.alive.insert(root);
                }
            }
        }
    }
}

fn bottom_up_uses(uses: &Uses, at: Option<InstId>, states: &mut StateMap<BottomUpLattice>) {
    for &(root, _) in uses {
        if let Some(state) = states.get_mut(&root) {
            state.record_use(at);
        }
    }
}

fn bottom_up_inst(
    f: &InstFacts,
    states: &mut StateMap<BottomUpLattice>,
    pinned: &Pinned,
    result: &mut DataflowResult,
) {
    // Nothing is open above a root's definition.
    for def in &f.defs {
        states.remove(def);
    }
    if f.barrier {
        states.clear();
    }
    match f.kind {
        TransitionKind::StrongDecrement => {
            let Some(root) = f.root else { return };
            let mut state = BottomUpState::new(TransitionKind::StrongDecrement, Some(f.inst));
            state.known_safe = pinned.contains(&root);
            if states
                .get(&root)
                .is_some_and(|s| s.kind == TransitionKind::StrongDecrement)
            {
                tracing::trace!(inst = %f.inst, root = %root, "bottom-up nesting");
                state.nesting_detected = true;
                result.nesting_roots.insert(root);
            }
            states.insert(root, state);
        }
        TransitionKind::StrongIncrement => {
            let Some(root) = f.root else { return };
            if let Some(state) = states.remove(&root) {
                tracing::trace!(inst = %f.inst, root = %root, "bottom-up match");
                result.inc_to_dec.insert(f.inst, state);
                result.roots.insert(f.inst, root);
            }
        }
        TransitionKind::StrongEntrance
        | TransitionKind::AutoreleasePoolCall
        | TransitionKind::Unknown => bottom_up_uses(&f.uses, Some(f.inst), states),
    }
}

// ── Driver ──────────────────────────────────────────────────────────

struct Dataflow<'a> {
    func: &'a Function,
    facts: Vec<BlockFacts>,
    preds: Vec<Vec<usize>>,
    succs: Vec<Vec<usize>>,
    reachable: Vec<bool>,
    forest: Option<LoopForest>,
    summaries: Vec<LoopSummary>,
    pinned: Pinned,
    result: DataflowResult,
}

/// Run both passes over `func`.
pub fn run_dataflow(
    func: &Function,
    dom: &DominatorTree,
    destructors: &DestructorAnalysis,
    granularity: DataflowGranularity,
) -> DataflowResult {
    let mut rc = RcIdentity::new(func, dom);
    let facts = collect_facts(func, &mut rc, destructors);

    let forest = match granularity {
        DataflowGranularity::Block => None,
        DataflowGranularity::Region => {
            let forest = LoopForest::build(func, dom);
            if forest.is_none() {
                tracing::trace!(
                    function = func.name().raw(),
                    "irreducible CFG, falling back to block granularity"
                );
            }
            forest.filter(|f| !f.is_empty())
        }
    };
    let summaries = forest.as_ref().map_or_else(Vec::new, |f| {
        f.loops().iter().map(|l| summarize_loop(l, &facts)).collect()
    });

    let mut pinned = Pinned::default();
    let mut initial = TopDownBlockState::default();
    for &arg in func.arguments() {
        let root = rc.root(arg);
        if classify(func, NodeRef::Argument(arg)) == TransitionKind::StrongEntrance {
            initial
                .states
                .insert(root, TopDownState::new(TransitionKind::StrongEntrance, None));
            initial.alive.insert(root);
        } else if matches!(
            func.value(arg).def,
            ValueDef::FunctionArg {
                convention: ArgConvention::Guaranteed,
                ..
            }
        ) {
            pinned.insert(root);
        }
    }

    let mut reachable = vec![false; func.num_blocks()];
    for b in compute_postorder(func) {
        reachable[b] = true;
    }

    let mut engine = Dataflow {
        func,
        facts,
        preds: compute_predecessors(func),
        succs: compute_successors(func),
        reachable,
        forest,
        summaries,
        pinned,
        result: DataflowResult::default(),
    };
    engine.top_down(initial);
    engine.bottom_up();

    tracing::trace!(
        function = func.name().raw(),
        dec_to_inc = engine.result.dec_to_inc.len(),
        inc_to_dec = engine.result.inc_to_dec.len(),
        nesting = engine.result.nesting_roots.len(),
        "dataflow complete"
    );
    engine.result
}

impl Dataflow<'_> {
    fn num_loops(&self) -> usize {
        self.forest.as_ref().map_or(0, |f| f.loops().len())
    }

    fn header_loop(&self, block: usize) -> Option<usize> {
        self.forest.as_ref()?.loop_with_header(block)
    }

    // ── Top-down ────────────────────────────────────────────────────

    /// State along the edge `pred → block`: the predecessor's exit state, or
    /// the summarized state of the loop the edge leaves. `None` if not yet
    /// computed.
    fn top_down_edge(
        &self,
        pred: usize,
        block: usize,
        out: &[Option<TopDownBlockState>],
        loop_out: &[Option<TopDownBlockState>],
    ) -> Option<TopDownBlockState> {
        if let Some(l) = self
            .forest
            .as_ref()
            .and_then(|f| f.outermost_exited(pred, block))
        {
            return loop_out[l].clone();
        }
        out[pred].clone()
    }

    fn top_down_join(
        &self,
        block: usize,
        preds: impl Iterator<Item = usize>,
        out: &[Option<TopDownBlockState>],
        loop_out: &[Option<TopDownBlockState>],
    ) -> TopDownBlockState {
        let mut incoming = Vec::new();
        for pred in preds {
            match self.top_down_edge(pred, block, out, loop_out) {
                Some(state) => incoming.push(state),
                None => return TopDownBlockState::default(),
            }
        }
        TopDownBlockState::merge(incoming)
    }

    fn top_down(&mut self, initial: TopDownBlockState) {
        let entry = self.func.entry().index();
        let mut out: Vec<Option<TopDownBlockState>> = vec![None; self.func.num_blocks()];
        let mut loop_out: Vec<Option<TopDownBlockState>> = vec![None; self.num_loops()];

        for block in compute_reverse_postorder(self.func) {
            let preds: Vec<usize> = self.preds[block]
                .iter()
                .copied()
                .filter(|&p| self.reachable[p])
                .collect();

            if let Some(l) = self.header_loop(block) {
                if let Some(forest) = &self.forest {
                    let around = preds.iter().copied().filter(|&p| !forest.get(l).contains(p));
                    let entering = self.top_down_join(block, around, &out, &loop_out);
                    loop_out[l] = Some(entering.summarize(&self.summaries[l]));
                }
            }

            let mut st = if block == entry {
                initial.clone()
            } else {
                self.top_down_join(block, preds.into_iter(), &out, &loop_out)
            };

            let facts = &self.facts[block];
            for f in &facts.insts {
                top_down_inst(f, &mut st, &self.pinned, &mut self.result);
            }
            if facts.term_barrier {
                st = TopDownBlockState::default();
            } else {
                top_down_uses(&facts.term_uses, None, &mut st);
            }
            out[block] = Some(st);
        }
    }

    // ── Bottom-up ───────────────────────────────────────────────────

    /// State along the edge `block → succ` seen from below: the successor's
    /// entry state, or the summarized state of the loop the edge enters.
    fn bottom_up_edge(
        &self,
        block: usize,
        succ: usize,
        top: &[Option<StateMap<BottomUpLattice>>],
        loop_in: &[Option<StateMap<BottomUpLattice>>],
    ) -> Option<StateMap<BottomUpLattice>> {
        if let Some(l) = self
            .forest
            .as_ref()
            .and_then(|f| f.outermost_entered(block, succ))
        {
            return loop_in[l].clone();
        }
        top[succ].clone()
    }

    fn bottom_up_join(
        &self,
        edges: impl Iterator<Item = (usize, usize)>,
        top: &[Option<StateMap<BottomUpLattice>>],
        loop_in: &[Option<StateMap<BottomUpLattice>>],
    ) -> StateMap<BottomUpLattice> {
        let mut incoming = Vec::new();
        for (from, to) in edges {
            match self.bottom_up_edge(from, to, top, loop_in) {
                Some(states) => incoming.push(states),
                None => return StateMap::new(),
            }
        }
        merge_maps(&incoming)
    }

    fn bottom_up(&mut self) {
        let mut top: Vec<Option<StateMap<BottomUpLattice>>> = vec![None; self.func.num_blocks()];
        let mut loop_in: Vec<Option<StateMap<BottomUpLattice>>> = vec![None; self.num_loops()];

        for block in compute_postorder(self.func) {
            let facts = &self.facts[block];
            let mut states = if facts.term_barrier {
                StateMap::new()
            } else {
                let edges = self.succs[block].iter().map(|&s| (block, s));
                let mut states = self.bottom_up_join(edges, &top, &loop_in);
                bottom_up_uses(&facts.term_uses, None, &mut states);
                states
            };
            for f in facts.insts.iter().rev() {
                bottom_up_inst(f, &mut states, &self.pinned, &mut self.result);
            }
            for def in &facts.arg_defs {
                states.remove(def);
            }
            top[block] = Some(states);

            if let Some(l) = self.header_loop(block) {
                if let Some(forest) = &self.forest {
                    let exits = forest.get(l).exits.iter().copied();
                    let leaving = self.bottom_up_join(exits, &top, &loop_in);
                    loop_in[l] = Some(summarize_bottom_up(leaving, &self.summaries[l]));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests;
