//! Interned symbol identifier.
//!
//! Function names, callee names and class names are all `Name`s. Comparing
//! two names is a single `u32` compare; the string lives in the
//! [`SymbolTable`](crate::SymbolTable).

use std::fmt;

/// Interned symbol.
///
/// Index 0 is the empty string. Indices 1 and 2 are the autorelease pool
/// entry points, pre-interned by every [`SymbolTable`](crate::SymbolTable)
/// so that callers can recognize them without a table lookup.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct Name(u32);

impl Name {
    /// Pre-interned empty string.
    pub const EMPTY: Name = Name(0);

    /// Pre-interned `objc_autoreleasePoolPush`.
    pub const AUTORELEASE_POOL_PUSH: Name = Name(1);

    /// Pre-interned `objc_autoreleasePoolPop`.
    pub const AUTORELEASE_POOL_POP: Name = Name(2);

    /// Get raw u32 value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Create from raw u32 value.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Name(raw)
    }

    /// Index into the symbol table's string storage.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Whether this is one of the two autorelease pool entry points.
    #[inline]
    pub fn is_autorelease_pool_call(self) -> bool {
        self == Self::AUTORELEASE_POOL_PUSH || self == Self::AUTORELEASE_POOL_POP
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.0)
    }
}

impl Default for Name {
    fn default() -> Self {
        Self::EMPTY
    }
}
