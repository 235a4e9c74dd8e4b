//! Shared CFG analysis utilities for the ARC passes.
//!
//! Predecessors, traversal orders, dominator and post-dominator trees, and
//! dead-end block detection. Every pass depends on `graph`; no pass depends
//! on another pass.

use rustc_hash::FxHashSet;

use sil_ir::{BlockId, Function};

/// Compute the predecessor list for each block (deduplicated).
///
/// Returns a vector indexed by block index, where each entry is the
/// list of distinct predecessor block indices.
pub(crate) fn compute_predecessors(func: &Function) -> Vec<Vec<usize>> {
    let num_blocks = func.num_blocks();
    let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); num_blocks];

    for block in func.block_ids() {
        let mut seen = FxHashSet::default();
        for succ in func.successors(block) {
            let succ_idx = succ.index();
            if succ_idx < num_blocks && seen.insert(succ_idx) {
                predecessors[succ_idx].push(block.index());
            }
        }
    }

    predecessors
}

/// Successor lists indexed by block index (deduplicated, in terminator order).
pub(crate) fn compute_successors(func: &Function) -> Vec<Vec<usize>> {
    let num_blocks = func.num_blocks();
    func.block_ids()
        .map(|block| {
            let mut succs = Vec::new();
            for succ in func.successors(block) {
                let idx = succ.index();
                if idx < num_blocks && !succs.contains(&idx) {
                    succs.push(idx);
                }
            }
            succs
        })
        .collect()
}

/// Postorder over an adjacency list starting at `entry`.
///
/// Uses an iterative DFS with an explicit stack to avoid recursion depth
/// issues on deeply nested CFGs. Only visits nodes reachable from `entry`.
fn postorder_from(entry: usize, succs: &[Vec<usize>]) -> Vec<usize> {
    let num_nodes = succs.len();
    let mut visited = vec![false; num_nodes];
    let mut postorder = Vec::with_capacity(num_nodes);

    // Stack entries: (node, next successor to visit).
    if entry >= num_nodes {
        return postorder;
    }
    visited[entry] = true;
    let mut stack: Vec<(usize, usize)> = vec![(entry, 0)];

    while let Some(&mut (node, ref mut next)) = stack.last_mut() {
        if let Some(&succ) = succs[node].get(*next) {
            *next += 1;
            if succ < num_nodes && !visited[succ] {
                visited[succ] = true;
                stack.push((succ, 0));
            }
        } else {
            postorder.push(node);
            stack.pop();
        }
    }

    postorder
}

/// Compute a postorder traversal of the CFG starting from the entry block.
pub(crate) fn compute_postorder(func: &Function) -> Vec<usize> {
    postorder_from(func.entry().index(), &compute_successors(func))
}

/// Reverse postorder of the reachable blocks.
pub(crate) fn compute_reverse_postorder(func: &Function) -> Vec<usize> {
    let mut rpo = compute_postorder(func);
    rpo.reverse();
    rpo
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "block counts fit in u32"
)]
#[inline]
pub(crate) fn block_id(index: usize) -> BlockId {
    BlockId::new(index as u32)
}

// ── Cooper-Harvey-Kennedy ───────────────────────────────────────────

/// Immediate dominators over an arbitrary graph given its predecessor lists
/// and a reverse postorder starting at the root.
///
/// `idom[root] == Some(root)`; unreachable nodes stay `None`.
fn compute_idoms(preds: &[Vec<usize>], rpo: &[usize]) -> Vec<Option<usize>> {
    let n = preds.len();
    let mut idom: Vec<Option<usize>> = vec![None; n];
    let Some(&root) = rpo.first() else {
        return idom;
    };

    // Map node → RPO position for O(1) lookup
    let mut rpo_pos = vec![usize::MAX; n];
    for (pos, &node) in rpo.iter().enumerate() {
        rpo_pos[node] = pos;
    }

    idom[root] = Some(root);

    let mut changed = true;
    while changed {
        changed = false;
        for &node in &rpo[1..] {
            // Find first processed predecessor
            let Some(mut new_idom) = preds[node].iter().copied().find(|&p| idom[p].is_some())
            else {
                continue;
            };

            // Intersect with remaining processed predecessors
            for &pred in &preds[node] {
                if pred != new_idom && idom[pred].is_some() {
                    new_idom = intersect(pred, new_idom, &idom, &rpo_pos);
                }
            }

            if idom[node] != Some(new_idom) {
                idom[node] = Some(new_idom);
                changed = true;
            }
        }
    }

    idom
}

/// CHK intersect: walk two fingers upward until they meet.
///
/// Both `a` and `b` must be reachable from the root: their idom chain
/// always leads to the root, so `idom[x]` is always `Some` here.
fn intersect(mut a: usize, mut b: usize, idom: &[Option<usize>], rpo_pos: &[usize]) -> usize {
    while a != b {
        while rpo_pos[a] > rpo_pos[b] {
            let Some(next) = idom[a] else {
                debug_assert!(false, "intersect: broken idom chain at {a}");
                return a;
            };
            a = next;
        }
        while rpo_pos[b] > rpo_pos[a] {
            let Some(next) = idom[b] else {
                debug_assert!(false, "intersect: broken idom chain at {b}");
                return b;
            };
            b = next;
        }
    }
    a
}

/// Walk the idom chain from `b` looking for `a`.
fn chain_contains(idom: &[Option<usize>], a: usize, b: usize) -> bool {
    let mut current = b;
    loop {
        if current == a {
            return true;
        }
        match idom.get(current).copied().flatten() {
            Some(dom) if dom != current => current = dom,
            _ => return false,
        }
    }
}

// ── Dominators ──────────────────────────────────────────────────────

/// Dominator tree.
///
/// Uses the Cooper-Harvey-Kennedy iterative algorithm, which is simpler than
/// Lengauer-Tarjan and fast enough for typical function sizes. Converges in
/// O(n * d) where d is the loop nesting depth.
///
/// Reference: Cooper, Harvey and Kennedy, "A Simple, Fast Dominance Algorithm" (2001)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DominatorTree {
    /// Immediate dominator for each block, indexed by block index.
    /// `idom[entry] == Some(entry)`; unreachable blocks have `None`.
    idom: Vec<Option<usize>>,
}

impl DominatorTree {
    /// Build the dominator tree for a function.
    pub fn build(func: &Function) -> Self {
        let preds = compute_predecessors(func);
        let rpo = compute_reverse_postorder(func);
        Self {
            idom: compute_idoms(&preds, &rpo),
        }
    }

    /// Does block `a` dominate block `b`?
    ///
    /// A block dominates itself. Unreachable blocks are dominated by nothing
    /// but themselves.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        a == b || (self.is_reachable(b) && chain_contains(&self.idom, a.index(), b.index()))
    }

    /// Does `a` dominate `b` with `a != b`?
    pub fn properly_dominates(&self, a: BlockId, b: BlockId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Does the program point `(a_block, a_pos)` strictly precede and
    /// dominate `(b_block, b_pos)`? Positions index into a block's
    /// instruction list; a terminator sits at the list length.
    pub fn point_properly_dominates(
        &self,
        (a_block, a_pos): (BlockId, usize),
        (b_block, b_pos): (BlockId, usize),
    ) -> bool {
        if a_block == b_block {
            a_pos < b_pos
        } else {
            self.dominates(a_block, b_block)
        }
    }

    /// Immediate dominator of `block`, `None` for the entry and for
    /// unreachable blocks.
    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        match self.idom.get(block.index()).copied().flatten() {
            Some(dom) if dom != block.index() => Some(block_id(dom)),
            _ => None,
        }
    }

    /// Whether `block` is reachable from the entry.
    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.idom.get(block.index()).is_some_and(Option::is_some)
    }

    /// Return dominated blocks of `root` in preorder (for walking the subtree).
    pub fn dominated_preorder(&self, root: BlockId) -> Vec<BlockId> {
        let num_blocks = self.idom.len();
        let mut children: Vec<Vec<usize>> = vec![vec![]; num_blocks];
        for (idx, &idom) in self.idom.iter().enumerate() {
            if let Some(dom) = idom {
                if dom != idx {
                    children[dom].push(idx);
                }
            }
        }

        let mut result = Vec::new();
        if root.index() >= num_blocks {
            return result;
        }
        let mut stack = vec![root.index()];
        while let Some(idx) = stack.pop() {
            result.push(block_id(idx));
            // Push in reverse order so left children are visited first
            for &child in children[idx].iter().rev() {
                stack.push(child);
            }
        }
        result
    }
}

// ── Post-dominators ─────────────────────────────────────────────────

/// Post-dominator tree.
///
/// The same algorithm on the reverse CFG, rooted at a virtual exit node
/// (index `num_blocks`) that every block without successors flows into.
/// Blocks that cannot reach any such block (infinite loops) are
/// post-dominated by nothing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostDominatorTree {
    ipdom: Vec<Option<usize>>,
}

impl PostDominatorTree {
    pub fn build(func: &Function) -> Self {
        let n = func.num_blocks();
        let exit = n;
        let succs = compute_successors(func);

        // Reverse graph: successors in the reverse CFG are predecessors.
        let mut rev_succs: Vec<Vec<usize>> = vec![Vec::new(); n + 1];
        let mut rev_preds: Vec<Vec<usize>> = vec![Vec::new(); n + 1];
        for (block, block_succs) in succs.iter().enumerate() {
            if block_succs.is_empty() {
                rev_succs[exit].push(block);
                rev_preds[block].push(exit);
            }
            for &succ in block_succs {
                rev_succs[succ].push(block);
                rev_preds[block].push(succ);
            }
        }

        let mut rpo = postorder_from(exit, &rev_succs);
        rpo.reverse();
        Self {
            ipdom: compute_idoms(&rev_preds, &rpo),
        }
    }

    /// Does block `a` post-dominate block `b`?
    pub fn post_dominates(&self, a: BlockId, b: BlockId) -> bool {
        a == b
            || (self.ipdom.get(b.index()).is_some_and(Option::is_some)
                && chain_contains(&self.ipdom, a.index(), b.index()))
    }

    /// Immediate post-dominator, `None` when it is the virtual exit or when
    /// `block` cannot reach an exit.
    pub fn ipdom(&self, block: BlockId) -> Option<BlockId> {
        let exit = self.ipdom.len() - 1;
        match self.ipdom.get(block.index()).copied().flatten() {
            Some(p) if p != exit && p != block.index() => Some(block_id(p)),
            _ => None,
        }
    }
}

// ── Cached dominance ────────────────────────────────────────────────

/// Lazily computed dominance for one function, keyed on its CFG epoch.
///
/// A tree computed for an older epoch is discarded and rebuilt on the next
/// query. In debug builds a cached tree is checked against a fresh rebuild
/// before it is handed out.
#[derive(Debug, Default)]
pub struct DominanceInfo {
    dom: Option<(u64, DominatorTree)>,
    post_dom: Option<(u64, PostDominatorTree)>,
}

impl DominanceInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dominator tree for the current CFG of `func`.
    pub fn dominators(&mut self, func: &Function) -> &DominatorTree {
        let epoch = func.cfg_epoch();
        if self.dom.as_ref().is_some_and(|(cached, _)| *cached != epoch) {
            self.dom = None;
        }
        let (_, tree) = self.dom.get_or_insert_with(|| {
            tracing::trace!(function = func.name().raw(), epoch, "building dominator tree");
            (epoch, DominatorTree::build(func))
        });
        debug_assert!(
            *tree == DominatorTree::build(func),
            "stale dominator tree at epoch {epoch}"
        );
        tree
    }

    /// Post-dominator tree for the current CFG of `func`.
    pub fn post_dominators(&mut self, func: &Function) -> &PostDominatorTree {
        let epoch = func.cfg_epoch();
        if self
            .post_dom
            .as_ref()
            .is_some_and(|(cached, _)| *cached != epoch)
        {
            self.post_dom = None;
        }
        let (_, tree) = self
            .post_dom
            .get_or_insert_with(|| (epoch, PostDominatorTree::build(func)));
        debug_assert!(
            *tree == PostDominatorTree::build(func),
            "stale post-dominator tree at epoch {epoch}"
        );
        tree
    }

    /// Drop every cached tree.
    pub fn invalidate(&mut self) {
        self.dom = None;
        self.post_dom = None;
    }

    /// Whether the cached trees (if any) match a recomputation on `func`.
    pub fn verify(&self, func: &Function) -> bool {
        let dom_ok = self
            .dom
            .as_ref()
            .map_or(true, |(_, tree)| *tree == DominatorTree::build(func));
        let post_ok = self
            .post_dom
            .as_ref()
            .map_or(true, |(_, tree)| *tree == PostDominatorTree::build(func));
        dom_ok && post_ok
    }
}

// ── Dead-end blocks ─────────────────────────────────────────────────

/// Blocks from which no function exit (`return`, `throw`, `unwind`) is
/// reachable. Values may legitimately leak into them.
#[derive(Clone, Debug)]
pub struct DeadEndBlocks {
    dead_end: Vec<bool>,
}

impl DeadEndBlocks {
    pub fn compute(func: &Function) -> Self {
        let preds = compute_predecessors(func);
        let mut reaches_exit = vec![false; func.num_blocks()];
        let mut worklist: Vec<usize> = func
            .block_ids()
            .filter(|&b| func.terminator(b).kind().is_function_exit())
            .map(BlockId::index)
            .collect();
        for &b in &worklist {
            reaches_exit[b] = true;
        }
        while let Some(b) = worklist.pop() {
            for &p in &preds[b] {
                if !reaches_exit[p] {
                    reaches_exit[p] = true;
                    worklist.push(p);
                }
            }
        }
        Self {
            dead_end: reaches_exit.into_iter().map(|r| !r).collect(),
        }
    }

    pub fn is_dead_end(&self, block: BlockId) -> bool {
        self.dead_end.get(block.index()).copied().unwrap_or(false)
    }
}
