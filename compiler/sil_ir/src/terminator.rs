//! Block terminators.

use smallvec::{smallvec, SmallVec};

use crate::{BlockId, ValueId};

/// Block exit.
///
/// Only `Br` and `CondBr` pass block arguments as phi operands. The
/// destinations of the other multi-successor terminators receive their
/// block arguments as terminator results (the enum payload, the cast value,
/// the resumed value).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Terminator {
    /// Unconditional branch.
    Br { dest: BlockId, args: Vec<ValueId> },
    /// Two-way branch on a trivial condition.
    CondBr {
        cond: ValueId,
        true_dest: BlockId,
        true_args: Vec<ValueId>,
        false_dest: BlockId,
        false_args: Vec<ValueId>,
    },
    /// Function return.
    Return { value: Option<ValueId> },
    /// Error return.
    Throw { value: ValueId },
    /// Coroutine unwind.
    Unwind,
    /// Coroutine yield; control resumes in one of two blocks.
    Yield {
        values: Vec<ValueId>,
        resume: BlockId,
        unwind: BlockId,
    },
    /// Multi-way branch on an enum case.
    SwitchEnum {
        operand: ValueId,
        cases: Vec<(u32, BlockId)>,
        default: Option<BlockId>,
    },
    /// Dynamic cast with success and failure destinations.
    CheckedCastBr {
        operand: ValueId,
        success: BlockId,
        failure: BlockId,
    },
    /// Async suspension point.
    Await {
        operand: ValueId,
        resume: BlockId,
        error: Option<BlockId>,
    },
    /// Control never reaches the end of this block.
    Unreachable,
}

/// Fieldless mirror of [`Terminator`] for tables and classification tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TerminatorKind {
    Br,
    CondBr,
    Return,
    Throw,
    Unwind,
    Yield,
    SwitchEnum,
    CheckedCastBr,
    Await,
    Unreachable,
}

impl TerminatorKind {
    /// Every terminator kind.
    pub const ALL: [TerminatorKind; 10] = [
        TerminatorKind::Br,
        TerminatorKind::CondBr,
        TerminatorKind::Return,
        TerminatorKind::Throw,
        TerminatorKind::Unwind,
        TerminatorKind::Yield,
        TerminatorKind::SwitchEnum,
        TerminatorKind::CheckedCastBr,
        TerminatorKind::Await,
        TerminatorKind::Unreachable,
    ];

    /// Whether control leaves the function through this terminator.
    pub fn is_function_exit(self) -> bool {
        matches!(
            self,
            TerminatorKind::Return | TerminatorKind::Throw | TerminatorKind::Unwind
        )
    }
}

impl Terminator {
    pub fn kind(&self) -> TerminatorKind {
        match self {
            Terminator::Br { .. } => TerminatorKind::Br,
            Terminator::CondBr { .. } => TerminatorKind::CondBr,
            Terminator::Return { .. } => TerminatorKind::Return,
            Terminator::Throw { .. } => TerminatorKind::Throw,
            Terminator::Unwind => TerminatorKind::Unwind,
            Terminator::Yield { .. } => TerminatorKind::Yield,
            Terminator::SwitchEnum { .. } => TerminatorKind::SwitchEnum,
            Terminator::CheckedCastBr { .. } => TerminatorKind::CheckedCastBr,
            Terminator::Await { .. } => TerminatorKind::Await,
            Terminator::Unreachable => TerminatorKind::Unreachable,
        }
    }

    /// Successor blocks in terminator order. May contain duplicates.
    pub fn successors(&self) -> SmallVec<[BlockId; 4]> {
        match self {
            Terminator::Return { .. }
            | Terminator::Throw { .. }
            | Terminator::Unwind
            | Terminator::Unreachable => SmallVec::new(),
            Terminator::Br { dest, .. } => smallvec![*dest],
            Terminator::CondBr {
                true_dest,
                false_dest,
                ..
            } => smallvec![*true_dest, *false_dest],
            Terminator::Yield { resume, unwind, .. } => smallvec![*resume, *unwind],
            Terminator::SwitchEnum { cases, default, .. } => {
                let mut targets: SmallVec<[BlockId; 4]> = cases.iter().map(|&(_, b)| b).collect();
                targets.extend(default.iter().copied());
                targets
            }
            Terminator::CheckedCastBr {
                success, failure, ..
            } => smallvec![*success, *failure],
            Terminator::Await { resume, error, .. } => {
                let mut targets = smallvec![*resume];
                targets.extend(error.iter().copied());
                targets
            }
        }
    }

    /// Values read by this terminator, in operand order.
    pub fn operands(&self) -> SmallVec<[ValueId; 4]> {
        match self {
            Terminator::Br { args, .. } => args.iter().copied().collect(),
            Terminator::CondBr {
                cond,
                true_args,
                false_args,
                ..
            } => {
                let mut ops: SmallVec<[ValueId; 4]> = smallvec![*cond];
                ops.extend(true_args.iter().copied());
                ops.extend(false_args.iter().copied());
                ops
            }
            Terminator::Return { value } => value.iter().copied().collect(),
            Terminator::Throw { value } => smallvec![*value],
            Terminator::Yield { values, .. } => values.iter().copied().collect(),
            Terminator::SwitchEnum { operand, .. }
            | Terminator::CheckedCastBr { operand, .. }
            | Terminator::Await { operand, .. } => smallvec![*operand],
            Terminator::Unwind | Terminator::Unreachable => SmallVec::new(),
        }
    }

    /// Mutable operand slots, in the same order as [`operands`](Self::operands).
    pub fn operands_mut(&mut self) -> SmallVec<[&mut ValueId; 4]> {
        match self {
            Terminator::Br { args, .. } => args.iter_mut().collect(),
            Terminator::CondBr {
                cond,
                true_args,
                false_args,
                ..
            } => {
                let mut ops: SmallVec<[&mut ValueId; 4]> = smallvec![cond];
                ops.extend(true_args.iter_mut());
                ops.extend(false_args.iter_mut());
                ops
            }
            Terminator::Return { value } => value.iter_mut().collect(),
            Terminator::Throw { value } => smallvec![value],
            Terminator::Yield { values, .. } => values.iter_mut().collect(),
            Terminator::SwitchEnum { operand, .. }
            | Terminator::CheckedCastBr { operand, .. }
            | Terminator::Await { operand, .. } => smallvec![operand],
            Terminator::Unwind | Terminator::Unreachable => SmallVec::new(),
        }
    }

    /// Phi operands passed to each destination. Empty for terminators that
    /// do not pass phi operands.
    pub fn branch_args(&self) -> SmallVec<[(BlockId, &[ValueId]); 2]> {
        match self {
            Terminator::Br { dest, args } => smallvec![(*dest, args.as_slice())],
            Terminator::CondBr {
                true_dest,
                true_args,
                false_dest,
                false_args,
                ..
            } => smallvec![
                (*true_dest, true_args.as_slice()),
                (*false_dest, false_args.as_slice())
            ],
            Terminator::Return { .. }
            | Terminator::Throw { .. }
            | Terminator::Unwind
            | Terminator::Yield { .. }
            | Terminator::SwitchEnum { .. }
            | Terminator::CheckedCastBr { .. }
            | Terminator::Await { .. }
            | Terminator::Unreachable => SmallVec::new(),
        }
    }

    /// Whether this terminator passes phi operands (`Br` / `CondBr`).
    pub fn passes_phi_operands(&self) -> bool {
        matches!(self, Terminator::Br { .. } | Terminator::CondBr { .. })
    }

    /// Drop the phi operand at `index` on every edge to `dest`.
    pub(crate) fn remove_branch_arg(&mut self, dest: BlockId, index: usize) {
        match self {
            Terminator::Br { dest: d, args } => {
                if *d == dest && index < args.len() {
                    args.remove(index);
                }
            }
            Terminator::CondBr {
                true_dest,
                true_args,
                false_dest,
                false_args,
                ..
            } => {
                if *true_dest == dest && index < true_args.len() {
                    true_args.remove(index);
                }
                if *false_dest == dest && index < false_args.len() {
                    false_args.remove(index);
                }
            }
            Terminator::Return { .. }
            | Terminator::Throw { .. }
            | Terminator::Unwind
            | Terminator::Yield { .. }
            | Terminator::SwitchEnum { .. }
            | Terminator::CheckedCastBr { .. }
            | Terminator::Await { .. }
            | Terminator::Unreachable => {}
        }
    }

    /// Textual opcode used by the printer.
    pub fn mnemonic(&self) -> &'static str {
        match self.kind() {
            TerminatorKind::Br => "br",
            TerminatorKind::CondBr => "cond_br",
            TerminatorKind::Return => "return",
            TerminatorKind::Throw => "throw",
            TerminatorKind::Unwind => "unwind",
            TerminatorKind::Yield => "yield",
            TerminatorKind::SwitchEnum => "switch_enum",
            TerminatorKind::CheckedCastBr => "checked_cast_br",
            TerminatorKind::Await => "await",
            TerminatorKind::Unreachable => "unreachable",
        }
    }
}
