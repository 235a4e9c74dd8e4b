//! Loop regions for region-granularity dataflow.
//!
//! A region is a natural loop: a header plus every block that reaches one
//! of its back edges without passing the header. Loops with distinct
//! headers are either nested or disjoint, so they form a forest.
//!
//! The dataflow collapses each loop into one node when state flows around
//! it. A CFG with a retreating edge whose target does not dominate its
//! source is irreducible; [`LoopForest::build`] returns `None` for it and
//! the dataflow falls back to block granularity.

use rustc_hash::FxHashMap;

use sil_ir::Function;

use crate::graph::{
    block_id, compute_predecessors, compute_reverse_postorder, compute_successors, DominatorTree,
};

/// One natural loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NaturalLoop {
    /// Block index of the header.
    pub header: usize,
    /// Membership by block index.
    body: Vec<bool>,
    /// Body blocks in reverse postorder.
    pub blocks: Vec<usize>,
    /// Edges `(inside, outside)` leaving the loop.
    pub exits: Vec<(usize, usize)>,
}

impl NaturalLoop {
    #[inline]
    pub fn contains(&self, block: usize) -> bool {
        self.body.get(block).copied().unwrap_or(false)
    }
}

/// All natural loops of a reducible function.
#[derive(Clone, Debug, Default)]
pub struct LoopForest {
    loops: Vec<NaturalLoop>,
    by_header: FxHashMap<usize, usize>,
}

impl LoopForest {
    /// Find every natural loop, or `None` if the CFG is irreducible.
    pub fn build(func: &Function, dom: &DominatorTree) -> Option<Self> {
        let n = func.num_blocks();
        let preds = compute_predecessors(func);
        let succs = compute_successors(func);
        let rpo = compute_reverse_postorder(func);
        let mut rpo_pos = vec![usize::MAX; n];
        for (pos, &b) in rpo.iter().enumerate() {
            rpo_pos[b] = pos;
        }

        // Back edges grouped by header, in header RPO order.
        let mut latches: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
        let mut headers = Vec::new();
        for &src in &rpo {
            for &dst in &succs[src] {
                if rpo_pos[dst] > rpo_pos[src] {
                    continue;
                }
                if !dom.dominates(block_id(dst), block_id(src)) {
                    return None;
                }
                let entry = latches.entry(dst).or_default();
                if entry.is_empty() {
                    headers.push(dst);
                }
                entry.push(src);
            }
        }
        headers.sort_by_key(|&h| rpo_pos[h]);

        let mut forest = LoopForest::default();
        for header in headers {
            let mut body = vec![false; n];
            body[header] = true;
            let mut worklist: Vec<usize> = latches.get(&header).cloned().unwrap_or_default();
            while let Some(b) = worklist.pop() {
                if body[b] || rpo_pos[b] == usize::MAX {
                    continue;
                }
                body[b] = true;
                worklist.extend(preds[b].iter().copied());
            }
            let blocks: Vec<usize> = rpo.iter().copied().filter(|&b| body[b]).collect();
            let exits = blocks
                .iter()
                .flat_map(|&b| succs[b].iter().map(move |&s| (b, s)))
                .filter(|&(_, s)| !body[s])
                .collect();
            forest.by_header.insert(header, forest.loops.len());
            forest.loops.push(NaturalLoop {
                header,
                body,
                blocks,
                exits,
            });
        }
        Some(forest)
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    pub fn loops(&self) -> &[NaturalLoop] {
        &self.loops
    }

    /// The loop headed by `block`, if any.
    pub fn loop_with_header(&self, block: usize) -> Option<usize> {
        self.by_header.get(&block).copied()
    }

    pub fn get(&self, index: usize) -> &NaturalLoop {
        &self.loops[index]
    }

    /// The outermost loop that contains `inside` but not `outside`: the
    /// region an edge `inside → outside` leaves.
    pub fn outermost_exited(&self, inside: usize, outside: usize) -> Option<usize> {
        self.loops
            .iter()
            .enumerate()
            .filter(|(_, l)| l.contains(inside) && !l.contains(outside))
            .max_by_key(|(_, l)| l.blocks.len())
            .map(|(i, _)| i)
    }

    /// The outermost loop that contains `inside` but not `outside`, entered
    /// by an edge `outside → inside`. Natural loops are entered only at
    /// their header.
    pub fn outermost_entered(&self, outside: usize, inside: usize) -> Option<usize> {
        self.outermost_exited(inside, outside)
            .filter(|&l| self.loops[l].header == inside)
    }
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
