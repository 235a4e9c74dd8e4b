//! Symbol table for function, callee and class names.
//!
//! O(1) interning and lookup behind a single `RwLock`. Reads (the common case
//! once a module is built) take the shared lock only.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::Name;

struct SymbolStorage {
    /// Map from string content to index.
    map: FxHashMap<&'static str, u32>,
    /// Storage for string contents, indexed by `Name::index`.
    strings: Vec<&'static str>,
}

/// Error when interning a symbol fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InternError {
    /// More than `u32::MAX` distinct symbols.
    #[error("symbol table exceeded capacity: {count} symbols, max is {max}", max = u32::MAX)]
    Overflow { count: usize },
}

/// Interned symbols for one module.
///
/// Interned strings are leaked and live for the rest of the process, so
/// lookups hand out `&'static str`.
pub struct SymbolTable {
    storage: RwLock<SymbolStorage>,
}

impl SymbolTable {
    /// Strings interned at fixed indices, in `Name` order.
    const PRE_INTERNED: [&'static str; 3] =
        ["", "objc_autoreleasePoolPush", "objc_autoreleasePoolPop"];

    /// Create a table with the empty string and the autorelease pool entry
    /// points at their fixed indices.
    pub fn new() -> Self {
        let mut storage = SymbolStorage {
            map: FxHashMap::default(),
            strings: Vec::with_capacity(64),
        };
        for (index, s) in (0u32..).zip(Self::PRE_INTERNED) {
            storage.map.insert(s, index);
            storage.strings.push(s);
        }
        Self {
            storage: RwLock::new(storage),
        }
    }

    /// Try to intern a string, returning its Name or an error on overflow.
    pub fn try_intern(&self, s: &str) -> Result<Name, InternError> {
        // Fast path: already interned
        {
            let guard = self.storage.read();
            if let Some(&index) = guard.map.get(s) {
                return Ok(Name::from_raw(index));
            }
        }

        let mut guard = self.storage.write();

        // Double-check after acquiring write lock
        if let Some(&index) = guard.map.get(s) {
            return Ok(Name::from_raw(index));
        }

        let index = u32::try_from(guard.strings.len()).map_err(|_| InternError::Overflow {
            count: guard.strings.len(),
        })?;
        let leaked: &'static str = Box::leak(s.to_owned().into_boxed_str());
        guard.strings.push(leaked);
        guard.map.insert(leaked, index);
        Ok(Name::from_raw(index))
    }

    /// Intern a string, returning its Name.
    ///
    /// # Panics
    /// Panics if the table exceeds `u32::MAX` symbols.
    pub fn intern(&self, s: &str) -> Name {
        self.try_intern(s).unwrap_or_else(|e| panic!("{e}"))
    }

    /// Look up the string for a Name.
    ///
    /// Names not produced by this table resolve to `"<unknown>"`.
    pub fn lookup(&self, name: Name) -> &'static str {
        let guard = self.storage.read();
        guard.strings.get(name.index()).copied().unwrap_or("<unknown>")
    }

    /// Look up a string without interning it.
    pub fn get(&self, s: &str) -> Option<Name> {
        self.storage.read().map.get(s).map(|&i| Name::from_raw(i))
    }

    /// Number of interned symbols, including the pre-interned ones.
    pub fn len(&self) -> usize {
        self.storage.read().strings.len()
    }

    /// Whether only the pre-interned symbols are present.
    pub fn is_empty(&self) -> bool {
        self.len() <= Self::PRE_INTERNED.len()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolTable")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests;
