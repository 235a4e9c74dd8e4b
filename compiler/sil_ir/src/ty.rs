//! Value types, ownership kinds and calling conventions.

use crate::Name;

/// The slice of a value's type the ARC passes care about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SilType {
    /// No reference counting: integers, raw pointers, metatypes.
    Trivial,
    /// A class reference. The class name drives destructor-effect queries.
    Ref(Name),
    /// A struct, tuple, enum or box that may hold references.
    Aggregate,
}

impl SilType {
    #[inline]
    pub fn is_trivial(self) -> bool {
        matches!(self, SilType::Trivial)
    }

    /// The class for a class reference, `None` otherwise.
    #[inline]
    pub fn class(self) -> Option<Name> {
        match self {
            SilType::Ref(class) => Some(class),
            SilType::Trivial | SilType::Aggregate => None,
        }
    }
}

/// Ownership kind of a value in ownership (OSSA) form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OwnershipKind {
    /// Trivial values; never checked.
    None,
    /// The holder must consume the value exactly once on every path.
    Owned,
    /// Borrowed; valid within the borrow scope that produced it.
    Guaranteed,
    /// No ownership claim. Must be copied before use as owned.
    Unowned,
}

impl OwnershipKind {
    /// Whether values of this kind have a linear lifetime to verify.
    #[inline]
    pub fn is_tracked(self) -> bool {
        matches!(self, OwnershipKind::Owned | OwnershipKind::Guaranteed)
    }
}

/// Convention for a function or call argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArgConvention {
    /// Callee receives +1 and must consume it.
    Owned,
    /// Caller keeps the value alive for the duration of the call.
    Guaranteed,
    /// No ownership transfer and no lifetime guarantee.
    Unowned,
}

impl ArgConvention {
    /// Ownership of the argument value as seen inside the callee.
    pub fn ownership(self, ty: SilType) -> OwnershipKind {
        if ty.is_trivial() {
            return OwnershipKind::None;
        }
        match self {
            ArgConvention::Owned => OwnershipKind::Owned,
            ArgConvention::Guaranteed => OwnershipKind::Guaranteed,
            ArgConvention::Unowned => OwnershipKind::Unowned,
        }
    }
}

/// Convention for a direct call result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResultConvention {
    /// Caller receives +1.
    Owned,
    /// Result is borrowed from an argument.
    Guaranteed,
    /// Caller receives +0 with no guarantee.
    Unowned,
}

impl ResultConvention {
    /// Ownership of the result value in the caller.
    pub fn ownership(self, ty: SilType) -> OwnershipKind {
        if ty.is_trivial() {
            return OwnershipKind::None;
        }
        match self {
            ResultConvention::Owned => OwnershipKind::Owned,
            ResultConvention::Guaranteed => OwnershipKind::Guaranteed,
            ResultConvention::Unowned => OwnershipKind::Unowned,
        }
    }
}

/// Declared memory effects of a call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SideEffects {
    /// Reads and writes nothing.
    None,
    /// May read memory, never writes or releases.
    ReadOnly,
    /// Anything can happen, including releasing arbitrary objects.
    #[default]
    Unknown,
}
