//! Semantic-ARC peepholes on functions in ownership form.
//!
//! Each rewrite removes an ownership instruction that does not change any
//! lifetime, and each is guarded by the linear lifetime checker in
//! `RETURN_FALSE` mode: the rewrite is planned against a snapshot, the
//! checker is asked whether the value that takes over still has a valid
//! lifetime, and only then is the function edited.
//!
//! - **Dead copies**: `%c = copy_value %x` whose only consuming uses are
//!   `destroy_value`s and whose other uses lie inside `%x`'s lifetime.
//!   The destroys and the copy go; uses of `%c` read `%x`.
//! - **Redundant moves**: `%m = move_value %x` is replaced by `%x`.
//! - **Ownership conversions**: `unchecked_ownership_conversion` to the
//!   operand's own kind, or owned to guaranteed when every use of the
//!   result sits inside the operand's lifetime.
//! - **Redundant phis**: a block argument whose incoming values are all one
//!   dominating value.
//!
//! [`ArcOptConfig::only_mandatory_peepholes`] keeps only dead copies and
//! ownership conversions.

use smallvec::SmallVec;

use sil_ir::{
    ArgConvention, BlockId, Function, InstId, InstKind, Operand, OwnershipKind, Terminator, UseLists,
    User, ValueDef, ValueId,
};

use crate::dataflow::phi_operand;
use crate::graph::{DeadEndBlocks, DominanceInfo, DominatorTree};
use crate::lifetime::{ErrorBehavior, LinearLifetimeChecker};
use crate::verify::{is_borrow_introducer, lifetime_uses};
use crate::ArcOptConfig;

/// Rewrites applied by one [`run_semantic_arc`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PeepholeStats {
    pub dead_copies: usize,
    pub redundant_moves: usize,
    pub ownership_conversions: usize,
    pub redundant_phis: usize,
}

impl PeepholeStats {
    pub fn total(self) -> usize {
        self.dead_copies + self.redundant_moves + self.ownership_conversions + self.redundant_phis
    }
}

/// One planned edit.
#[derive(Debug)]
enum Rewrite {
    DeadCopy {
        copy: InstId,
        result: ValueId,
        operand: ValueId,
        destroys: SmallVec<[InstId; 2]>,
    },
    /// Replace `result` with `operand` and erase `inst`.
    Forward {
        inst: InstId,
        result: ValueId,
        operand: ValueId,
        is_move: bool,
    },
    Phi {
        block: BlockId,
        index: usize,
        phi: ValueId,
        value: ValueId,
    },
}

/// Analyses of one unedited function.
struct Snapshot<'a> {
    func: &'a Function,
    uses: UseLists,
    checker: LinearLifetimeChecker<'a>,
    dom: &'a DominatorTree,
}

fn def_block(func: &Function, value: ValueId) -> BlockId {
    match func.value(value).def {
        ValueDef::FunctionArg { .. } => func.entry(),
        ValueDef::BlockArg { block, .. } => block,
        ValueDef::InstResult { inst, .. } => func.inst_position(inst).0,
    }
}

/// Whether `op` passes a value into `phi`.
fn feeds(func: &Function, op: Operand, phi: ValueId) -> bool {
    match op.user {
        User::Terminator(block) => {
            phi_operand(func, func.terminator(block), op.index as usize) == Some(phi)
        }
        User::Inst(_) => false,
    }
}

/// Whether `op` only reads its value, whatever that value's ownership.
fn reads_any_ownership(func: &Function, op: Operand) -> bool {
    match op.user {
        User::Inst(inst) => match func.inst_kind(inst) {
            InstKind::StrongRetain { .. }
            | InstKind::RetainValue { .. }
            | InstKind::AllocRefDynamic { .. }
            | InstKind::RefToRawPointer { .. }
            | InstKind::CopyValue { .. }
            | InstKind::FixLifetime { .. }
            | InstKind::BeginBorrow { .. } => true,
            InstKind::Apply { args, .. } => match args.get(op.index as usize) {
                Some(arg) => arg.convention != ArgConvention::Owned,
                None => true,
            },
            _ => false,
        },
        User::Terminator(block) => match func.terminator(block) {
            Terminator::CondBr { .. } => op.index == 0,
            Terminator::Await { .. } => true,
            _ => false,
        },
    }
}

impl Snapshot<'_> {
    /// Whether `value` stays alive across `non_consuming` with its current
    /// consuming uses.
    fn outlives(&self, value: ValueId, non_consuming: &[Operand]) -> bool {
        let func = self.func;
        match func.ownership(value) {
            OwnershipKind::Owned => {}
            OwnershipKind::Guaranteed => {
                if matches!(func.value(value).def, ValueDef::FunctionArg { .. }) {
                    return true;
                }
                if !is_borrow_introducer(func, value) {
                    return false;
                }
            }
            OwnershipKind::None | OwnershipKind::Unowned => return false,
        }
        let (consuming, _) = lifetime_uses(func, &self.uses, value);
        !self
            .checker
            .check(value, &consuming, non_consuming, ErrorBehavior::RETURN_FALSE)
            .found_error()
    }

    /// Whether `value` would have a valid lifetime if its uses were
    /// `consuming` plus `non_consuming`.
    fn valid_with(&self, value: ValueId, consuming: &[Operand], non_consuming: &[Operand]) -> bool {
        !self
            .checker
            .check(value, consuming, non_consuming, ErrorBehavior::RETURN_FALSE)
            .found_error()
    }

    /// `value` takes over the uses of `successor`, whose definition
    /// consumes `value` at `handoff`. Uses of `successor` in `handoff`
    /// position (a phi fed back into itself) disappear with it.
    fn can_extend(&self, value: ValueId, successor: ValueId, handoff: &[Operand]) -> bool {
        let (mut succ_consuming, succ_non) = lifetime_uses(self.func, &self.uses, successor);
        succ_consuming.retain(|&op| !feeds(self.func, op, successor));
        let (own_consuming, own_non) = lifetime_uses(self.func, &self.uses, value);
        if own_consuming.iter().any(|op| !handoff.contains(op)) {
            return false;
        }
        let mut non_consuming = own_non;
        non_consuming.extend(succ_non);
        self.valid_with(value, &succ_consuming, &non_consuming)
    }

    fn dead_copy(&self, copy: InstId, operand: ValueId, result: ValueId) -> Option<Rewrite> {
        let func = self.func;
        let mut destroys = SmallVec::new();
        for &op in self.uses.of(result) {
            let User::Inst(user) = op.user else {
                return None;
            };
            if matches!(func.inst_kind(user), InstKind::DestroyValue { .. }) {
                destroys.push(user);
            } else if func.operand_ownership(op).is_lifetime_ending() {
                return None;
            }
        }
        if destroys.is_empty() {
            return None;
        }
        let (_, non_consuming) = lifetime_uses(func, &self.uses, result);
        self.outlives(operand, &non_consuming).then_some(Rewrite::DeadCopy {
            copy,
            result,
            operand,
            destroys,
        })
    }

    fn forward(&self, inst: InstId, operand: ValueId, result: ValueId, is_move: bool) -> Option<Rewrite> {
        let rewrite = Rewrite::Forward {
            inst,
            result,
            operand,
            is_move,
        };
        let func = self.func;
        let handoff = [Operand {
            user: User::Inst(inst),
            index: 0,
        }];
        match (func.ownership(operand), func.ownership(result)) {
            (OwnershipKind::Owned, OwnershipKind::Owned) => {
                self.can_extend(operand, result, &handoff).then_some(rewrite)
            }
            (OwnershipKind::Owned, OwnershipKind::Guaranteed) => {
                // Uses of the owned operand must not start consuming it.
                let only_reads = self
                    .uses
                    .of(result)
                    .iter()
                    .all(|&op| reads_any_ownership(func, op));
                if !only_reads {
                    return None;
                }
                let (_, non_consuming) = lifetime_uses(func, &self.uses, result);
                self.outlives(operand, &non_consuming).then_some(rewrite)
            }
            (from, to) if from == to => Some(rewrite),
            _ => None,
        }
    }

    fn redundant_phi(&self, block: BlockId, index: usize, phi: ValueId) -> Option<Rewrite> {
        let func = self.func;
        let incoming = func.phi_incoming(phi)?;
        let mut values = incoming.iter().map(|&(_, v)| v).filter(|&v| v != phi);
        let value = values.next()?;
        if values.any(|v| v != value) {
            return None;
        }
        if !self.dom.properly_dominates(def_block(func, value), block) {
            return None;
        }
        let rewrite = Rewrite::Phi {
            block,
            index,
            phi,
            value,
        };
        let handoff: Vec<Operand> = self
            .uses
            .of(value)
            .iter()
            .copied()
            .filter(|&op| feeds(func, op, phi))
            .collect();
        match func.ownership(phi) {
            OwnershipKind::None | OwnershipKind::Unowned => Some(rewrite),
            OwnershipKind::Owned => {
                (func.ownership(value) == OwnershipKind::Owned && self.can_extend(value, phi, &handoff))
                    .then_some(rewrite)
            }
            OwnershipKind::Guaranteed => (is_borrow_introducer(func, value)
                && self.can_extend(value, phi, &handoff))
            .then_some(rewrite),
        }
    }

    fn find(&self, mandatory_only: bool) -> Option<Rewrite> {
        let func = self.func;
        for block in func.block_ids() {
            if !mandatory_only && block != func.entry() {
                for (index, &phi) in func.block_args(block).iter().enumerate() {
                    if let Some(rewrite) = self.redundant_phi(block, index, phi) {
                        return Some(rewrite);
                    }
                }
            }
            for &inst in func.block_insts(block) {
                // Every rewritten kind has exactly one result.
                let &[result] = func.inst_results(inst) else {
                    continue;
                };
                let found = match *func.inst_kind(inst) {
                    InstKind::CopyValue { operand } => self.dead_copy(inst, operand, result),
                    InstKind::UncheckedOwnershipConversion { operand, .. } => {
                        self.forward(inst, operand, result, false)
                    }
                    InstKind::MoveValue { operand } if !mandatory_only => {
                        self.forward(inst, operand, result, true)
                    }
                    _ => None,
                };
                if found.is_some() {
                    return found;
                }
            }
        }
        None
    }
}

fn apply(func: &mut Function, rewrite: Rewrite, stats: &mut PeepholeStats) {
    tracing::trace!(?rewrite, "semantic ARC rewrite");
    match rewrite {
        Rewrite::DeadCopy {
            copy,
            result,
            operand,
            destroys,
        } => {
            for destroy in destroys {
                func.erase_inst(destroy);
            }
            func.replace_all_uses_with(result, operand);
            func.erase_inst(copy);
            stats.dead_copies += 1;
        }
        Rewrite::Forward {
            inst,
            result,
            operand,
            is_move,
        } => {
            func.replace_all_uses_with(result, operand);
            func.erase_inst(inst);
            if is_move {
                stats.redundant_moves += 1;
            } else {
                stats.ownership_conversions += 1;
            }
        }
        Rewrite::Phi {
            block,
            index,
            phi,
            value,
        } => {
            func.replace_all_uses_with(phi, value);
            func.erase_block_arg(block, index);
            stats.redundant_phis += 1;
        }
    }
}

/// Run the peepholes to a fixed point. Functions not in ownership form are
/// left alone.
pub fn run_semantic_arc(func: &mut Function, config: &ArcOptConfig) -> PeepholeStats {
    let mut stats = PeepholeStats::default();
    if !func.has_ownership() {
        return stats;
    }
    // Peepholes leave the CFG unchanged.
    let mut dominance = DominanceInfo::new();
    loop {
        let rewrite = {
            let current: &Function = func;
            let dead_ends = DeadEndBlocks::compute(current);
            let snapshot = Snapshot {
                func: current,
                uses: current.compute_uses(),
                checker: LinearLifetimeChecker::new(current, &dead_ends),
                dom: dominance.dominators(current),
            };
            snapshot.find(config.only_mandatory_peepholes)
        };
        let Some(rewrite) = rewrite else { break };
        apply(func, rewrite, &mut stats);
    }
    if stats.total() > 0 {
        tracing::debug!(
            function = func.name().raw(),
            dead_copies = stats.dead_copies,
            redundant_moves = stats.redundant_moves,
            ownership_conversions = stats.ownership_conversions,
            redundant_phis = stats.redundant_phis,
            "semantic ARC peepholes",
        );
    }
    stats
}

#[cfg(test)]
mod tests;
