//! Modules: a symbol table, function bodies and class declarations.

use crate::{Function, Name, SymbolTable};

/// Memory effects of a class's own deinitializer body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DeinitEffects {
    /// Releases stored properties only; no other memory effects.
    None,
    /// Arbitrary effects.
    #[default]
    Unknown,
}

/// A class declaration, as far as destructor analysis needs it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClassDecl {
    pub name: Name,
    pub superclass: Option<Name>,
    /// No subclasses can exist outside the module.
    pub is_final: bool,
    pub deinit: DeinitEffects,
}

/// A compilation unit.
#[derive(Debug, Default)]
pub struct Module {
    pub symbols: SymbolTable,
    pub functions: Vec<Function>,
    pub classes: Vec<ClassDecl>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a name in this module's symbol table.
    pub fn intern(&self, s: &str) -> Name {
        self.symbols.intern(s)
    }

    /// Declare a class.
    pub fn add_class(&mut self, decl: ClassDecl) {
        self.classes.push(decl);
    }

    /// Add a function body and return its index.
    pub fn add_function(&mut self, func: Function) -> usize {
        self.functions.push(func);
        self.functions.len() - 1
    }

    /// Find a function by name.
    pub fn function(&self, name: Name) -> Option<&Function> {
        self.functions.iter().find(|f| f.name() == name)
    }
}
