//! Destructor-effect analysis.
//!
//! Answers "may releasing a value of this type run a destructor with memory
//! effects". A release whose destructor is effect-free cannot observe or
//! change any other reference count, so it is not a barrier.
//!
//! # Sharing
//!
//! One [`DestructorAnalysis`] is built per module and shared by every
//! function analysis, including those running on other rayon workers. The
//! memo table sits behind a `parking_lot::Mutex`; the lock is never held
//! while classifying, only while reading or publishing a result.

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use sil_ir::{ClassDecl, DeinitEffects, Module, Name, SilType};

/// Memoized destructor-effect queries over a module's class hierarchy.
#[derive(Debug)]
pub struct DestructorAnalysis {
    classes: FxHashMap<Name, ClassDecl>,
    subclasses: FxHashMap<Name, Vec<Name>>,
    cache: Mutex<FxHashMap<Name, bool>>,
}

impl DestructorAnalysis {
    pub fn new(classes: &[ClassDecl]) -> Self {
        let mut subclasses: FxHashMap<Name, Vec<Name>> = FxHashMap::default();
        for decl in classes {
            if let Some(superclass) = decl.superclass {
                subclasses.entry(superclass).or_default().push(decl.name);
            }
        }
        Self {
            classes: classes.iter().map(|d| (d.name, *d)).collect(),
            subclasses,
            cache: Mutex::new(FxHashMap::default()),
        }
    }

    /// Whether destroying a value of type `ty` may have memory effects
    /// beyond releasing what it owns.
    ///
    /// Trivial types have no destructor. Aggregates are conservatively
    /// assumed to hold anything.
    pub fn may_have_memory_effects(&self, ty: SilType) -> bool {
        match ty {
            SilType::Trivial => false,
            SilType::Aggregate => true,
            SilType::Ref(class) => self.class_may_have_effects(class),
        }
    }

    fn class_may_have_effects(&self, class: Name) -> bool {
        if let Some(&cached) = self.cache.lock().get(&class) {
            return cached;
        }
        let mut visiting = FxHashSet::default();
        let result = self.compute(class, &mut visiting);
        self.cache.lock().insert(class, result);
        result
    }

    /// A class is safe when its own deinit is effect-free, its superclass
    /// chain is safe, and every subclass that could be the dynamic type is
    /// safe. Unknown classes and cycles in the hierarchy are unsafe.
    fn compute(&self, class: Name, visiting: &mut FxHashSet<Name>) -> bool {
        if !visiting.insert(class) {
            return true;
        }
        let Some(decl) = self.classes.get(&class) else {
            return true;
        };
        if decl.deinit == DeinitEffects::Unknown {
            return true;
        }
        if let Some(superclass) = decl.superclass {
            if self.superclass_may_have_effects(superclass, visiting) {
                return true;
            }
        }
        if decl.is_final {
            return false;
        }
        self.subclasses
            .get(&class)
            .into_iter()
            .flatten()
            .any(|&sub| self.subclass_may_have_effects(sub, visiting))
    }

    fn superclass_may_have_effects(&self, class: Name, visiting: &mut FxHashSet<Name>) -> bool {
        let mut current = Some(class);
        while let Some(name) = current {
            if !visiting.insert(name) {
                return true;
            }
            let Some(decl) = self.classes.get(&name) else {
                return true;
            };
            if decl.deinit == DeinitEffects::Unknown {
                return true;
            }
            current = decl.superclass;
        }
        false
    }

    fn subclass_may_have_effects(&self, class: Name, visiting: &mut FxHashSet<Name>) -> bool {
        if !visiting.insert(class) {
            return true;
        }
        let Some(decl) = self.classes.get(&class) else {
            return true;
        };
        decl.deinit == DeinitEffects::Unknown
            || self
                .subclasses
                .get(&class)
                .into_iter()
                .flatten()
                .any(|&sub| self.subclass_may_have_effects(sub, visiting))
    }
}

/// Module-level collaborators shared by every function analysis.
#[derive(Debug)]
pub struct ArcContext {
    pub destructors: DestructorAnalysis,
    /// Resolved function names, for diagnostics.
    function_names: FxHashMap<Name, &'static str>,
}

impl ArcContext {
    pub fn new(classes: &[ClassDecl]) -> Self {
        Self {
            destructors: DestructorAnalysis::new(classes),
            function_names: FxHashMap::default(),
        }
    }

    pub fn for_module(module: &Module) -> Self {
        let mut ctx = Self::new(&module.classes);
        ctx.function_names = module
            .functions
            .iter()
            .map(|func| (func.name(), module.symbols.lookup(func.name())))
            .collect();
        ctx
    }

    /// The source name of a module function, if this context knows it.
    pub fn function_name(&self, name: Name) -> Option<&'static str> {
        self.function_names.get(&name).copied()
    }
}
