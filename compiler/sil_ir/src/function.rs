//! Function bodies: the value, instruction and block arenas.
//!
//! Blocks are stored densely and never removed. Instructions live in a
//! slot arena; erasing one removes it from its block's instruction list and
//! tombstones the slot. Function arguments are the entry block's arguments.

use smallvec::SmallVec;

use crate::{
    ArgConvention, BlockId, InstData, InstId, InstKind, IrError, Name, OwnershipKind, SilType,
    Terminator, ValueId,
};

// ── Values ──────────────────────────────────────────────────────────

/// Where a value comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueDef {
    /// Function-entry argument (an argument of the entry block).
    FunctionArg { index: u32, convention: ArgConvention },
    /// Argument of a non-entry block.
    BlockArg { block: BlockId, index: u32 },
    /// Result of an instruction.
    InstResult { inst: InstId, index: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ValueData {
    pub def: ValueDef,
    pub ty: SilType,
    pub ownership: OwnershipKind,
}

// ── Blocks ──────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockData {
    pub args: Vec<ValueId>,
    pub insts: Vec<InstId>,
    pub terminator: Terminator,
}

// ── Uses ────────────────────────────────────────────────────────────

/// The instruction or terminator that reads an operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum User {
    Inst(InstId),
    /// The terminator of the given block.
    Terminator(BlockId),
}

/// One operand slot: a user plus the operand index within it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Operand {
    pub user: User,
    pub index: u32,
}

/// Use lists for every value of a function, computed in one walk.
///
/// A snapshot: mutating the function invalidates it.
#[derive(Clone, Debug, Default)]
pub struct UseLists {
    uses: Vec<SmallVec<[Operand; 2]>>,
}

impl UseLists {
    /// Operands that read `value`, in program order per block.
    pub fn of(&self, value: ValueId) -> &[Operand] {
        self.uses.get(value.index()).map_or(&[], SmallVec::as_slice)
    }

    /// Whether `value` has no uses.
    pub fn is_unused(&self, value: ValueId) -> bool {
        self.of(value).is_empty()
    }
}

// ── Function ────────────────────────────────────────────────────────

/// A function body in basic-block form.
#[derive(Clone, Debug)]
pub struct Function {
    name: Name,
    /// Whether the body is in ownership (OSSA) form and can be verified.
    has_ownership: bool,
    values: Vec<ValueData>,
    insts: Vec<Option<InstData>>,
    blocks: Vec<BlockData>,
    /// Bumped on every CFG-shape mutation; cached dominance keys on it.
    cfg_epoch: u64,
}

impl Function {
    /// Create a function with an empty entry block ending in `unreachable`.
    pub fn new(name: Name, has_ownership: bool) -> Self {
        Self {
            name,
            has_ownership,
            values: Vec::new(),
            insts: Vec::new(),
            blocks: vec![BlockData {
                args: Vec::new(),
                insts: Vec::new(),
                terminator: Terminator::Unreachable,
            }],
            cfg_epoch: 0,
        }
    }

    #[inline]
    pub fn name(&self) -> Name {
        self.name
    }

    #[inline]
    pub fn has_ownership(&self) -> bool {
        self.has_ownership
    }

    #[inline]
    pub fn entry(&self) -> BlockId {
        BlockId::new(0)
    }

    #[inline]
    pub fn cfg_epoch(&self) -> u64 {
        self.cfg_epoch
    }

    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// All block IDs in creation order.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "block counts fit in u32"
        )]
        (0..self.blocks.len()).map(|i| BlockId::new(i as u32))
    }

    #[inline]
    pub fn block(&self, block: BlockId) -> &BlockData {
        &self.blocks[block.index()]
    }

    #[inline]
    pub fn block_insts(&self, block: BlockId) -> &[InstId] {
        &self.blocks[block.index()].insts
    }

    #[inline]
    pub fn block_args(&self, block: BlockId) -> &[ValueId] {
        &self.blocks[block.index()].args
    }

    #[inline]
    pub fn terminator(&self, block: BlockId) -> &Terminator {
        &self.blocks[block.index()].terminator
    }

    #[inline]
    pub fn successors(&self, block: BlockId) -> SmallVec<[BlockId; 4]> {
        self.blocks[block.index()].terminator.successors()
    }

    /// Function-entry arguments.
    #[inline]
    pub fn arguments(&self) -> &[ValueId] {
        &self.blocks[0].args
    }

    #[inline]
    pub fn value(&self, value: ValueId) -> &ValueData {
        &self.values[value.index()]
    }

    #[inline]
    pub fn value_type(&self, value: ValueId) -> SilType {
        self.values[value.index()].ty
    }

    #[inline]
    pub fn ownership(&self, value: ValueId) -> OwnershipKind {
        self.values[value.index()].ownership
    }

    /// Instruction data, or `None` if the instruction was erased.
    #[inline]
    pub fn try_inst(&self, inst: InstId) -> Option<&InstData> {
        self.insts.get(inst.index()).and_then(Option::as_ref)
    }

    /// Instruction data.
    ///
    /// # Panics
    /// Panics if the instruction was erased. Instruction IDs taken from a
    /// block's instruction list are always live.
    pub fn inst(&self, inst: InstId) -> &InstData {
        match self.try_inst(inst) {
            Some(data) => data,
            None => panic!("instruction {inst} was erased"),
        }
    }

    #[inline]
    pub fn inst_kind(&self, inst: InstId) -> &InstKind {
        &self.inst(inst).kind
    }

    #[inline]
    pub fn inst_results(&self, inst: InstId) -> &[ValueId] {
        &self.inst(inst).results
    }

    /// Block and index within the block of a live instruction.
    pub fn inst_position(&self, inst: InstId) -> (BlockId, usize) {
        let block = self.inst(inst).block;
        let index = self.blocks[block.index()]
            .insts
            .iter()
            .position(|&i| i == inst)
            .unwrap_or(usize::MAX);
        (block, index)
    }

    /// The block a user lives in.
    pub fn user_block(&self, user: User) -> BlockId {
        match user {
            User::Inst(inst) => self.inst(inst).block,
            User::Terminator(block) => block,
        }
    }

    /// Block and position of a user. A terminator sits after the last
    /// instruction of its block.
    pub fn user_position(&self, user: User) -> (BlockId, usize) {
        match user {
            User::Inst(inst) => self.inst_position(inst),
            User::Terminator(block) => (block, self.blocks[block.index()].insts.len()),
        }
    }

    /// The value read by an operand slot.
    pub fn operand_value(&self, operand: Operand) -> Option<ValueId> {
        let index = operand.index as usize;
        match operand.user {
            User::Inst(inst) => self.try_inst(inst)?.kind.operands().get(index).copied(),
            User::Terminator(block) => self.blocks[block.index()]
                .terminator
                .operands()
                .get(index)
                .copied(),
        }
    }

    /// Whether `value` is a block argument fed only by `br` / `cond_br`.
    pub fn is_phi(&self, value: ValueId) -> bool {
        self.phi_incoming(value).is_some()
    }

    /// Incoming `(predecessor, value)` pairs of a phi, or `None` if `value`
    /// is not a phi. Predecessors are listed once per edge.
    pub fn phi_incoming(&self, value: ValueId) -> Option<SmallVec<[(BlockId, ValueId); 2]>> {
        let ValueDef::BlockArg { block, index } = self.values[value.index()].def else {
            return None;
        };
        let mut incoming = SmallVec::new();
        for pred in self.block_ids() {
            let term = &self.blocks[pred.index()].terminator;
            if !term.successors().contains(&block) {
                continue;
            }
            if !term.passes_phi_operands() {
                return None;
            }
            for (dest, args) in term.branch_args() {
                if dest == block {
                    incoming.push((pred, *args.get(index as usize)?));
                }
            }
        }
        if incoming.is_empty() {
            return None;
        }
        Some(incoming)
    }

    /// Every value currently defined: function arguments, block arguments
    /// and results of live instructions.
    pub fn live_values(&self) -> Vec<ValueId> {
        let mut values = Vec::with_capacity(self.values.len());
        for block in &self.blocks {
            values.extend(block.args.iter().copied());
            for &inst in &block.insts {
                if let Some(data) = self.try_inst(inst) {
                    values.extend(data.results.iter().copied());
                }
            }
        }
        values
    }

    /// Build use lists for every value.
    pub fn compute_uses(&self) -> UseLists {
        let mut uses: Vec<SmallVec<[Operand; 2]>> = vec![SmallVec::new(); self.values.len()];
        for (block_idx, block) in self.blocks.iter().enumerate() {
            for &inst in &block.insts {
                let Some(data) = self.try_inst(inst) else {
                    continue;
                };
                for (index, value) in (0u32..).zip(data.kind.operands()) {
                    if let Some(list) = uses.get_mut(value.index()) {
                        list.push(Operand {
                            user: User::Inst(inst),
                            index,
                        });
                    }
                }
            }
            #[expect(
                clippy::cast_possible_truncation,
                reason = "block counts fit in u32"
            )]
            let user = User::Terminator(BlockId::new(block_idx as u32));
            for (index, value) in (0u32..).zip(block.terminator.operands()) {
                if let Some(list) = uses.get_mut(value.index()) {
                    list.push(Operand { user, index });
                }
            }
        }
        UseLists { uses }
    }

    // ── Construction ────────────────────────────────────────────────

    fn push_value(&mut self, data: ValueData) -> ValueId {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "value counts fit in u32"
        )]
        let id = ValueId::new(self.values.len() as u32);
        self.values.push(data);
        id
    }

    /// Append a function-entry argument.
    pub fn add_argument(&mut self, ty: SilType, convention: ArgConvention) -> ValueId {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "argument counts fit in u32"
        )]
        let index = self.blocks[0].args.len() as u32;
        let id = self.push_value(ValueData {
            def: ValueDef::FunctionArg { index, convention },
            ty,
            ownership: convention.ownership(ty),
        });
        self.blocks[0].args.push(id);
        id
    }

    /// Create an empty block ending in `unreachable`.
    pub fn create_block(&mut self) -> BlockId {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "block counts fit in u32"
        )]
        let id = BlockId::new(self.blocks.len() as u32);
        self.blocks.push(BlockData {
            args: Vec::new(),
            insts: Vec::new(),
            terminator: Terminator::Unreachable,
        });
        self.cfg_epoch += 1;
        id
    }

    /// Append an argument to a non-entry block.
    pub fn add_block_arg(
        &mut self,
        block: BlockId,
        ty: SilType,
        ownership: OwnershipKind,
    ) -> ValueId {
        debug_assert_ne!(block, self.entry(), "use add_argument for the entry block");
        #[expect(
            clippy::cast_possible_truncation,
            reason = "argument counts fit in u32"
        )]
        let index = self.blocks[block.index()].args.len() as u32;
        let ownership = if ty.is_trivial() {
            OwnershipKind::None
        } else {
            ownership
        };
        let id = self.push_value(ValueData {
            def: ValueDef::BlockArg { block, index },
            ty,
            ownership,
        });
        self.blocks[block.index()].args.push(id);
        id
    }

    /// Append an instruction producing results of the given types and
    /// ownership kinds.
    pub(crate) fn append_inst(
        &mut self,
        block: BlockId,
        kind: InstKind,
        results: &[(SilType, OwnershipKind)],
    ) -> InstId {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "instruction counts fit in u32"
        )]
        let id = InstId::new(self.insts.len() as u32);
        let mut result_ids = SmallVec::new();
        for (index, &(ty, ownership)) in (0u32..).zip(results) {
            let ownership = if ty.is_trivial() {
                OwnershipKind::None
            } else {
                ownership
            };
            result_ids.push(self.push_value(ValueData {
                def: ValueDef::InstResult { inst: id, index },
                ty,
                ownership,
            }));
        }
        self.insts.push(Some(InstData {
            kind,
            block,
            results: result_ids,
        }));
        self.blocks[block.index()].insts.push(id);
        id
    }

    /// Replace a block's terminator.
    pub fn set_terminator(&mut self, block: BlockId, terminator: Terminator) {
        self.blocks[block.index()].terminator = terminator;
        self.cfg_epoch += 1;
    }

    // ── Mutation ────────────────────────────────────────────────────

    /// Remove an instruction from its block. Its results must be unused.
    pub fn erase_inst(&mut self, inst: InstId) {
        let Some(data) = self.insts.get_mut(inst.index()).and_then(Option::take) else {
            return;
        };
        self.blocks[data.block.index()].insts.retain(|&i| i != inst);
    }

    /// Remove the argument at `index` of `block` together with the matching
    /// phi operand on every incoming edge.
    pub fn erase_block_arg(&mut self, block: BlockId, index: usize) {
        if block == self.entry() || index >= self.blocks[block.index()].args.len() {
            return;
        }
        self.blocks[block.index()].args.remove(index);
        for &arg in &self.blocks[block.index()].args[index..] {
            if let ValueDef::BlockArg { index: i, .. } = &mut self.values[arg.index()].def {
                *i -= 1;
            }
        }
        for pred in &mut self.blocks {
            pred.terminator.remove_branch_arg(block, index);
        }
    }

    /// Rewrite every operand reading `old` to read `new` instead.
    pub fn replace_all_uses_with(&mut self, old: ValueId, new: ValueId) {
        for slot in self.insts.iter_mut().flatten() {
            for operand in slot.kind.operands_mut() {
                if *operand == old {
                    *operand = new;
                }
            }
        }
        for block in &mut self.blocks {
            for operand in block.terminator.operands_mut() {
                if *operand == old {
                    *operand = new;
                }
            }
        }
    }

    /// Check structural well-formedness: successor IDs in range, phi operand
    /// counts matching block arguments, operands referring to known values.
    pub fn validate(&self) -> Result<(), IrError> {
        for block in self.block_ids() {
            let data = &self.blocks[block.index()];
            for &inst in &data.insts {
                for value in self.inst(inst).kind.operands() {
                    if value.index() >= self.values.len() {
                        return Err(IrError::UndefinedValue { block, value });
                    }
                }
            }
            for value in data.terminator.operands() {
                if value.index() >= self.values.len() {
                    return Err(IrError::UndefinedValue { block, value });
                }
            }
            for target in data.terminator.successors() {
                if target.index() >= self.blocks.len() {
                    return Err(IrError::MissingBlock { block, target });
                }
                if target == self.entry() {
                    return Err(IrError::BranchToEntry { block });
                }
            }
            for (target, args) in data.terminator.branch_args() {
                let expected = self.blocks[target.index()].args.len();
                if args.len() != expected {
                    return Err(IrError::BranchArgCount {
                        block,
                        target,
                        found: args.len(),
                        expected,
                    });
                }
            }
        }
        Ok(())
    }
}
