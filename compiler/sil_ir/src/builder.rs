//! Instruction builder.
//!
//! Appends instructions to one block and derives result ownership from the
//! operands, so callers never state an ownership kind the IR would disagree
//! with.

use smallvec::SmallVec;

use crate::{
    ApplyArg, ArgConvention, BlockId, Callee, Function, InstId, InstKind, Name, OwnershipKind,
    ResultConvention, SideEffects, SilType, Terminator, ValueId,
};

/// Appends to the end of one block.
pub struct InstBuilder<'f> {
    func: &'f mut Function,
    block: BlockId,
}

impl Function {
    /// A builder appending to `block`.
    pub fn builder(&mut self, block: BlockId) -> InstBuilder<'_> {
        InstBuilder { func: self, block }
    }
}

impl InstBuilder<'_> {
    /// Switch to appending to another block.
    pub fn position_at_end(&mut self, block: BlockId) {
        self.block = block;
    }

    fn push(&mut self, kind: InstKind) -> InstId {
        self.func.append_inst(self.block, kind, &[])
    }

    fn push_one(&mut self, kind: InstKind, ty: SilType, ownership: OwnershipKind) -> ValueId {
        let inst = self.func.append_inst(self.block, kind, &[(ty, ownership)]);
        self.func.inst_results(inst)[0]
    }

    /// Ownership of a forwarding result: the kind of the first non-trivial
    /// operand.
    fn forwarded(&self, operands: &[ValueId]) -> OwnershipKind {
        operands
            .iter()
            .map(|&v| self.func.ownership(v))
            .find(|k| *k != OwnershipKind::None)
            .unwrap_or(OwnershipKind::None)
    }

    // ── Reference counting ──────────────────────────────────────────

    pub fn strong_retain(&mut self, operand: ValueId) -> InstId {
        self.push(InstKind::StrongRetain { operand })
    }

    pub fn retain_value(&mut self, operand: ValueId) -> InstId {
        self.push(InstKind::RetainValue { operand })
    }

    pub fn strong_release(&mut self, operand: ValueId) -> InstId {
        self.push(InstKind::StrongRelease { operand })
    }

    pub fn release_value(&mut self, operand: ValueId) -> InstId {
        self.push(InstKind::ReleaseValue { operand })
    }

    // ── Allocation ──────────────────────────────────────────────────

    pub fn alloc_ref(&mut self, class: Name) -> ValueId {
        self.push_one(
            InstKind::AllocRef { class },
            SilType::Ref(class),
            OwnershipKind::Owned,
        )
    }

    pub fn alloc_ref_dynamic(&mut self, class: Name, metatype: ValueId) -> ValueId {
        self.push_one(
            InstKind::AllocRefDynamic { class, metatype },
            SilType::Ref(class),
            OwnershipKind::Owned,
        )
    }

    pub fn alloc_box(&mut self) -> ValueId {
        self.push_one(InstKind::AllocBox, SilType::Aggregate, OwnershipKind::Owned)
    }

    // ── Calls ───────────────────────────────────────────────────────

    /// Emit an `apply` and return the instruction with its results.
    pub fn apply(
        &mut self,
        callee: Callee,
        args: &[(ValueId, ArgConvention)],
        results: &[(SilType, ResultConvention)],
        effects: SideEffects,
    ) -> (InstId, SmallVec<[ValueId; 1]>) {
        let result_info: SmallVec<[(SilType, OwnershipKind); 1]> = results
            .iter()
            .map(|&(ty, conv)| (ty, conv.ownership(ty)))
            .collect();
        let kind = InstKind::Apply {
            callee,
            args: args
                .iter()
                .map(|&(value, convention)| ApplyArg { value, convention })
                .collect(),
            results: results.iter().map(|&(_, conv)| conv).collect(),
            effects,
        };
        let inst = self.func.append_inst(self.block, kind, &result_info);
        (inst, self.func.inst_results(inst).iter().copied().collect())
    }

    /// Emit a direct call with no results.
    pub fn call(
        &mut self,
        callee: Name,
        args: &[(ValueId, ArgConvention)],
        effects: SideEffects,
    ) -> InstId {
        self.apply(Callee::Direct(callee), args, &[], effects).0
    }

    pub fn partial_apply(&mut self, callee: Callee, captures: &[ValueId]) -> ValueId {
        self.push_one(
            InstKind::PartialApply {
                callee,
                captures: captures.to_vec(),
            },
            SilType::Aggregate,
            OwnershipKind::Owned,
        )
    }

    // ── Casts ───────────────────────────────────────────────────────

    pub fn upcast(&mut self, operand: ValueId, class: Name) -> ValueId {
        let ownership = self.forwarded(&[operand]);
        self.push_one(InstKind::Upcast { operand }, SilType::Ref(class), ownership)
    }

    pub fn unchecked_ref_cast(&mut self, operand: ValueId, ty: SilType) -> ValueId {
        let ownership = self.forwarded(&[operand]);
        self.push_one(InstKind::UncheckedRefCast { operand }, ty, ownership)
    }

    pub fn ref_to_raw_pointer(&mut self, operand: ValueId) -> ValueId {
        self.push_one(
            InstKind::RefToRawPointer { operand },
            SilType::Trivial,
            OwnershipKind::None,
        )
    }

    /// A raw pointer carries no ownership, so the reference is unowned.
    pub fn raw_pointer_to_ref(&mut self, operand: ValueId, class: Name) -> ValueId {
        self.push_one(
            InstKind::RawPointerToRef { operand },
            SilType::Ref(class),
            OwnershipKind::Unowned,
        )
    }

    // ── Aggregates ──────────────────────────────────────────────────

    pub fn struct_(&mut self, operands: &[ValueId]) -> ValueId {
        let ownership = self.forwarded(operands);
        self.push_one(
            InstKind::Struct {
                operands: operands.to_vec(),
            },
            SilType::Aggregate,
            ownership,
        )
    }

    pub fn tuple(&mut self, operands: &[ValueId]) -> ValueId {
        let ownership = self.forwarded(operands);
        self.push_one(
            InstKind::Tuple {
                operands: operands.to_vec(),
            },
            SilType::Aggregate,
            ownership,
        )
    }

    pub fn enum_(&mut self, case: u32, payload: Option<ValueId>) -> ValueId {
        let ownership = self.forwarded(payload.as_slice());
        let ty = if payload.is_some() {
            SilType::Aggregate
        } else {
            SilType::Trivial
        };
        self.push_one(InstKind::Enum { case, payload }, ty, ownership)
    }

    pub fn unchecked_enum_data(&mut self, operand: ValueId, case: u32, ty: SilType) -> ValueId {
        let ownership = self.forwarded(&[operand]);
        self.push_one(InstKind::UncheckedEnumData { operand, case }, ty, ownership)
    }

    pub fn struct_extract(&mut self, operand: ValueId, field: u32, ty: SilType) -> ValueId {
        self.push_one(
            InstKind::StructExtract { operand, field },
            ty,
            OwnershipKind::Guaranteed,
        )
    }

    pub fn tuple_extract(&mut self, operand: ValueId, index: u32, ty: SilType) -> ValueId {
        self.push_one(
            InstKind::TupleExtract { operand, index },
            ty,
            OwnershipKind::Guaranteed,
        )
    }

    // ── Ownership ───────────────────────────────────────────────────

    pub fn copy_value(&mut self, operand: ValueId) -> ValueId {
        let ty = self.func.value_type(operand);
        self.push_one(InstKind::CopyValue { operand }, ty, OwnershipKind::Owned)
    }

    pub fn destroy_value(&mut self, operand: ValueId) -> InstId {
        self.push(InstKind::DestroyValue { operand })
    }

    pub fn move_value(&mut self, operand: ValueId) -> ValueId {
        let ty = self.func.value_type(operand);
        self.push_one(InstKind::MoveValue { operand }, ty, OwnershipKind::Owned)
    }

    pub fn begin_borrow(&mut self, operand: ValueId) -> ValueId {
        let ty = self.func.value_type(operand);
        self.push_one(
            InstKind::BeginBorrow { operand },
            ty,
            OwnershipKind::Guaranteed,
        )
    }

    pub fn end_borrow(&mut self, operand: ValueId) -> InstId {
        self.push(InstKind::EndBorrow { operand })
    }

    pub fn unchecked_ownership_conversion(
        &mut self,
        operand: ValueId,
        to: OwnershipKind,
    ) -> ValueId {
        let ty = self.func.value_type(operand);
        self.push_one(InstKind::UncheckedOwnershipConversion { operand, to }, ty, to)
    }

    pub fn fix_lifetime(&mut self, operand: ValueId) -> InstId {
        self.push(InstKind::FixLifetime { operand })
    }

    pub fn integer_literal(&mut self, value: i64) -> ValueId {
        self.push_one(
            InstKind::IntegerLiteral { value },
            SilType::Trivial,
            OwnershipKind::None,
        )
    }

    /// Append `kind` with the given results as-is. Nothing checks that the
    /// result list fits the kind.
    pub fn raw_inst(&mut self, kind: InstKind, results: &[(SilType, OwnershipKind)]) -> InstId {
        self.func.append_inst(self.block, kind, results)
    }

    // ── Terminators ─────────────────────────────────────────────────

    pub fn br(&mut self, dest: BlockId, args: &[ValueId]) {
        self.func.set_terminator(
            self.block,
            Terminator::Br {
                dest,
                args: args.to_vec(),
            },
        );
    }

    pub fn cond_br(
        &mut self,
        cond: ValueId,
        true_dest: BlockId,
        true_args: &[ValueId],
        false_dest: BlockId,
        false_args: &[ValueId],
    ) {
        self.func.set_terminator(
            self.block,
            Terminator::CondBr {
                cond,
                true_dest,
                true_args: true_args.to_vec(),
                false_dest,
                false_args: false_args.to_vec(),
            },
        );
    }

    pub fn return_(&mut self, value: Option<ValueId>) {
        self.func
            .set_terminator(self.block, Terminator::Return { value });
    }

    pub fn throw(&mut self, value: ValueId) {
        self.func.set_terminator(self.block, Terminator::Throw { value });
    }

    pub fn unwind(&mut self) {
        self.func.set_terminator(self.block, Terminator::Unwind);
    }

    pub fn unreachable(&mut self) {
        self.func.set_terminator(self.block, Terminator::Unreachable);
    }

    pub fn yield_(&mut self, values: &[ValueId], resume: BlockId, unwind: BlockId) {
        self.func.set_terminator(
            self.block,
            Terminator::Yield {
                values: values.to_vec(),
                resume,
                unwind,
            },
        );
    }

    pub fn switch_enum(
        &mut self,
        operand: ValueId,
        cases: &[(u32, BlockId)],
        default: Option<BlockId>,
    ) {
        self.func.set_terminator(
            self.block,
            Terminator::SwitchEnum {
                operand,
                cases: cases.to_vec(),
                default,
            },
        );
    }

    pub fn checked_cast_br(&mut self, operand: ValueId, success: BlockId, failure: BlockId) {
        self.func.set_terminator(
            self.block,
            Terminator::CheckedCastBr {
                operand,
                success,
                failure,
            },
        );
    }

    pub fn await_(&mut self, operand: ValueId, resume: BlockId, error: Option<BlockId>) {
        self.func.set_terminator(
            self.block,
            Terminator::Await {
                operand,
                resume,
                error,
            },
        );
    }
}
