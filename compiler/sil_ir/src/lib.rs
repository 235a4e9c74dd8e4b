//! Ownership-annotated basic-block IR.
//!
//! This crate is the host IR for the ARC optimizer and ownership verifier in
//! `sil_arc`. It provides:
//!
//! - **Names** ([`Name`], [`SymbolTable`]): interned function, callee and
//!   class names. The autorelease pool entry points are pre-interned.
//!
//! - **Function bodies** ([`Function`]): arenas of values, instructions
//!   ([`InstKind`]) and blocks ending in a [`Terminator`]. Values carry a
//!   [`SilType`] and an [`OwnershipKind`].
//!
//! - **Ownership model** ([`OperandOwnership`]): which uses of a value
//!   consume it, which borrow it and which merely read it.
//!
//! - **Editing**: [`InstBuilder`] for construction and the three rewrites
//!   the optimizer performs: [`Function::erase_inst`],
//!   [`Function::erase_block_arg`] and [`Function::replace_all_uses_with`].
//!
//! # Design
//!
//! Arena plus index: instructions, values and blocks are addressed by
//! [`InstId`], [`ValueId`] and [`BlockId`]. Erased instructions leave a
//! tombstone so IDs held by an analysis stay unambiguous.

mod builder;
mod error;
mod function;
mod ids;
mod inst;
mod interner;
mod module;
mod name;
mod ownership;
mod printer;
mod terminator;
mod ty;

pub use builder::InstBuilder;
pub use error::IrError;
pub use function::{BlockData, Function, Operand, UseLists, User, ValueData, ValueDef};
pub use ids::{BlockId, InstId, ValueId};
pub use inst::{ApplyArg, Callee, InstData, InstKind};
pub use interner::{InternError, SymbolTable};
pub use module::{ClassDecl, DeinitEffects, Module};
pub use name::Name;
pub use ownership::OperandOwnership;
pub use printer::FunctionDisplay;
pub use terminator::{Terminator, TerminatorKind};
pub use ty::{ArgConvention, OwnershipKind, ResultConvention, SideEffects, SilType};
