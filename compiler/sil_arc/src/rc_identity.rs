//! Reference-count identity roots.
//!
//! Two operations act on the same object when their operands resolve to the
//! same root. Resolution strips pointer casts and single-operand reference
//! forwarding, and sees through phis whose incoming values all share one
//! root defined above the phi.
//!
//! Resolution is bounded: after [`MAX_RECURSION_DEPTH`] steps the last value
//! reached is returned. A truncated walk yields a forwarding ancestor of the
//! input, never an unrelated value, so callers stay sound; they just match
//! less.

use rustc_hash::FxHashMap;

use sil_ir::{BlockId, Function, InstKind, ValueDef, ValueId};

use crate::graph::DominatorTree;

/// Maximum number of forwarding steps taken from one value.
pub const MAX_RECURSION_DEPTH: usize = 16;

/// Entries kept before the cache is cleared.
const CACHE_CAPACITY: usize = 64;

/// Identity-root resolver for one function.
pub struct RcIdentity<'a> {
    func: &'a Function,
    dom: &'a DominatorTree,
    cache: FxHashMap<ValueId, ValueId>,
}

impl<'a> RcIdentity<'a> {
    pub fn new(func: &'a Function, dom: &'a DominatorTree) -> Self {
        Self {
            func,
            dom,
            cache: FxHashMap::default(),
        }
    }

    /// The identity root of `value`.
    pub fn root(&mut self, value: ValueId) -> ValueId {
        if let Some(&root) = self.cache.get(&value) {
            return root;
        }
        let mut steps = 0;
        let root = self.strip(value, &mut steps);
        if self.cache.len() >= CACHE_CAPACITY {
            self.cache.clear();
        }
        self.cache.insert(value, root);
        root
    }

    fn strip(&self, value: ValueId, steps: &mut usize) -> ValueId {
        let mut current = value;
        while *steps < MAX_RECURSION_DEPTH {
            *steps += 1;
            if let Some(next) = self.forwarded_operand(current) {
                current = next;
                continue;
            }
            match self.phi_root(current, steps) {
                Some(root) if root != current => current = root,
                _ => break,
            }
        }
        current
    }

    /// The operand `value` forwards, if it is a cast or a single-operand
    /// reference wrapper.
    fn forwarded_operand(&self, value: ValueId) -> Option<ValueId> {
        let ValueDef::InstResult { inst, .. } = self.func.value(value).def else {
            return None;
        };
        match &self.func.try_inst(inst)?.kind {
            InstKind::Upcast { operand }
            | InstKind::UncheckedRefCast { operand }
            | InstKind::RefToRawPointer { operand }
            | InstKind::RawPointerToRef { operand }
            | InstKind::UncheckedEnumData { operand, .. }
            | InstKind::CopyValue { operand }
            | InstKind::MoveValue { operand }
            | InstKind::BeginBorrow { operand }
            | InstKind::UncheckedOwnershipConversion { operand, .. } => Some(*operand),
            InstKind::Enum { payload, .. } => *payload,
            InstKind::Struct { operands } | InstKind::Tuple { operands } => {
                let mut refs = operands
                    .iter()
                    .copied()
                    .filter(|&v| !self.func.value_type(v).is_trivial());
                match (refs.next(), refs.next()) {
                    (Some(only), None) => Some(only),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Common root of every incoming value of a phi, provided that root is
    /// defined in a block that properly dominates the phi's block.
    fn phi_root(&self, phi: ValueId, steps: &mut usize) -> Option<ValueId> {
        let ValueDef::BlockArg { block, .. } = self.func.value(phi).def else {
            return None;
        };
        let incoming = self.func.phi_incoming(phi)?;
        let mut common = None;
        for (_, value) in incoming {
            if value == phi {
                continue;
            }
            let root = self.strip(value, steps);
            if root == phi {
                continue;
            }
            match common {
                None => common = Some(root),
                Some(existing) if existing == root => {}
                Some(_) => return None,
            }
        }
        let root = common?;
        let def_block = self.def_block(root)?;
        self.dom.properly_dominates(def_block, block).then_some(root)
    }

    fn def_block(&self, value: ValueId) -> Option<BlockId> {
        match self.func.value(value).def {
            ValueDef::FunctionArg { .. } => Some(self.func.entry()),
            ValueDef::BlockArg { block, .. } => Some(block),
            ValueDef::InstResult { inst, .. } => self.func.try_inst(inst).map(|d| d.block),
        }
    }
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
