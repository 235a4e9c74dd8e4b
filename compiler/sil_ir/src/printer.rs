//! Textual form of a function, for diagnostics and debug logs.

use std::fmt::{self, Write as _};

use crate::{
    ArgConvention, Callee, Function, InstKind, Name, OwnershipKind, SideEffects, SilType,
    SymbolTable, Terminator, ValueId,
};

/// Prints a function, resolving names through a symbol table when one is
/// available and falling back to raw indices otherwise.
pub struct FunctionDisplay<'a> {
    func: &'a Function,
    symbols: Option<&'a SymbolTable>,
}

impl Function {
    /// Display with names resolved through `symbols`.
    pub fn display<'a>(&'a self, symbols: &'a SymbolTable) -> FunctionDisplay<'a> {
        FunctionDisplay {
            func: self,
            symbols: Some(symbols),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        FunctionDisplay {
            func: self,
            symbols: None,
        }
        .fmt(f)
    }
}

fn ownership_str(kind: OwnershipKind) -> &'static str {
    match kind {
        OwnershipKind::None => "@none",
        OwnershipKind::Owned => "@owned",
        OwnershipKind::Guaranteed => "@guaranteed",
        OwnershipKind::Unowned => "@unowned",
    }
}

fn convention_str(conv: ArgConvention) -> &'static str {
    match conv {
        ArgConvention::Owned => "@owned",
        ArgConvention::Guaranteed => "@guaranteed",
        ArgConvention::Unowned => "@unowned",
    }
}

fn join(values: &[ValueId]) -> String {
    let mut out = String::new();
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{v}");
    }
    out
}

impl FunctionDisplay<'_> {
    fn name(&self, name: Name) -> String {
        match self.symbols {
            Some(symbols) => symbols.lookup(name).to_owned(),
            None => format!("sym{}", name.raw()),
        }
    }

    fn ty(&self, ty: SilType) -> String {
        match ty {
            SilType::Trivial => "$Builtin".to_owned(),
            SilType::Ref(class) => format!("${}", self.name(class)),
            SilType::Aggregate => "$Aggregate".to_owned(),
        }
    }

    fn callee(&self, callee: Callee) -> String {
        match callee {
            Callee::Direct(name) => format!("@{}", self.name(name)),
            Callee::Indirect(value) => value.to_string(),
        }
    }

    fn inst(&self, kind: &InstKind) -> String {
        let op = kind.mnemonic();
        match kind {
            InstKind::AllocRef { class } => format!("{op} ${}", self.name(*class)),
            InstKind::AllocRefDynamic { class, metatype } => {
                format!("{op} {metatype}, ${}", self.name(*class))
            }
            InstKind::AllocBox => op.to_owned(),
            InstKind::Apply {
                callee,
                args,
                effects,
                ..
            } => {
                let args: Vec<String> = args
                    .iter()
                    .map(|a| format!("{} {}", a.value, convention_str(a.convention)))
                    .collect();
                let effects = match effects {
                    SideEffects::None => " [readnone]",
                    SideEffects::ReadOnly => " [readonly]",
                    SideEffects::Unknown => "",
                };
                format!("{op} {}({}){effects}", self.callee(*callee), args.join(", "))
            }
            InstKind::PartialApply { callee, captures } => {
                format!("{op} {}({})", self.callee(*callee), join(captures))
            }
            InstKind::Struct { operands } | InstKind::Tuple { operands } => {
                format!("{op} ({})", join(operands))
            }
            InstKind::Enum { case, payload } => match payload {
                Some(p) => format!("{op} #{case}, {p}"),
                None => format!("{op} #{case}"),
            },
            InstKind::UncheckedEnumData { operand, case } => format!("{op} {operand}, #{case}"),
            InstKind::StructExtract { operand, field } => format!("{op} {operand}, #{field}"),
            InstKind::TupleExtract { operand, index } => format!("{op} {operand}, {index}"),
            InstKind::UncheckedOwnershipConversion { operand, to } => {
                format!("{op} {operand}, {}", ownership_str(*to))
            }
            InstKind::IntegerLiteral { value } => format!("{op} {value}"),
            InstKind::StrongRetain { operand }
            | InstKind::RetainValue { operand }
            | InstKind::StrongRelease { operand }
            | InstKind::ReleaseValue { operand }
            | InstKind::Upcast { operand }
            | InstKind::UncheckedRefCast { operand }
            | InstKind::RefToRawPointer { operand }
            | InstKind::RawPointerToRef { operand }
            | InstKind::CopyValue { operand }
            | InstKind::DestroyValue { operand }
            | InstKind::MoveValue { operand }
            | InstKind::BeginBorrow { operand }
            | InstKind::EndBorrow { operand }
            | InstKind::FixLifetime { operand } => format!("{op} {operand}"),
        }
    }

    fn terminator(term: &Terminator) -> String {
        let op = term.mnemonic();
        match term {
            Terminator::Br { dest, args } => format!("{op} {dest}({})", join(args)),
            Terminator::CondBr {
                cond,
                true_dest,
                true_args,
                false_dest,
                false_args,
            } => format!(
                "{op} {cond}, {true_dest}({}), {false_dest}({})",
                join(true_args),
                join(false_args)
            ),
            Terminator::Return { value: Some(v) } => format!("{op} {v}"),
            Terminator::Return { value: None } | Terminator::Unwind | Terminator::Unreachable => {
                op.to_owned()
            }
            Terminator::Throw { value } => format!("{op} {value}"),
            Terminator::Yield {
                values,
                resume,
                unwind,
            } => format!("{op} ({}), resume {resume}, unwind {unwind}", join(values)),
            Terminator::SwitchEnum {
                operand,
                cases,
                default,
            } => {
                let mut out = format!("{op} {operand}");
                for (case, dest) in cases {
                    let _ = write!(out, ", case #{case}: {dest}");
                }
                if let Some(d) = default {
                    let _ = write!(out, ", default {d}");
                }
                out
            }
            Terminator::CheckedCastBr {
                operand,
                success,
                failure,
            } => format!("{op} {operand}, {success}, {failure}"),
            Terminator::Await {
                operand,
                resume,
                error,
            } => match error {
                Some(e) => format!("{op} {operand}, resume {resume}, error {e}"),
                None => format!("{op} {operand}, resume {resume}"),
            },
        }
    }
}

impl fmt::Display for FunctionDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let func = self.func;
        let ossa = if func.has_ownership() { " [ossa]" } else { "" };
        writeln!(f, "sil{ossa} @{} {{", self.name(func.name()))?;
        for block in func.block_ids() {
            let args: Vec<String> = func
                .block_args(block)
                .iter()
                .map(|&a| {
                    let data = func.value(a);
                    format!("{a} : {} {}", ownership_str(data.ownership), self.ty(data.ty))
                })
                .collect();
            if args.is_empty() {
                writeln!(f, "{block}:")?;
            } else {
                writeln!(f, "{block}({}):", args.join(", "))?;
            }
            for &inst in func.block_insts(block) {
                let data = func.inst(inst);
                if data.results.is_empty() {
                    writeln!(f, "  {}", self.inst(&data.kind))?;
                } else {
                    writeln!(f, "  {} = {}", join(&data.results), self.inst(&data.kind))?;
                }
            }
            writeln!(f, "  {}", Self::terminator(func.terminator(block)))?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests;
