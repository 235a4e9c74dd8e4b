//! Structural IR errors reported by [`Function::validate`](crate::Function::validate).

use crate::{BlockId, ValueId};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum IrError {
    #[error("{block} branches to missing block {target}")]
    MissingBlock { block: BlockId, target: BlockId },

    #[error("{block} branches to the entry block")]
    BranchToEntry { block: BlockId },

    #[error("{block} passes {found} phi operands to {target}, which takes {expected}")]
    BranchArgCount {
        block: BlockId,
        target: BlockId,
        found: usize,
        expected: usize,
    },

    #[error("{block} reads {value}, which is not defined in this function")]
    UndefinedValue { block: BlockId, value: ValueId },
}
