//! Per-identity reference-count state.
//!
//! One [`RefCountState`] tracks an open increment (top-down) or decrement
//! (bottom-up) on one identity root. Block states map roots to states and
//! are cloned at every block boundary, so every set inside is a persistent
//! `im` collection: cloning is O(1) and merging shares structure.

use im::{OrdMap, OrdSet};

use sil_ir::{InstId, ValueId};

use crate::TransitionKind;

/// Persistent set of instructions.
pub type InstSet = OrdSet<InstId>;

/// Lattice position of a top-down state. Later variants are more
/// conservative; merging takes the maximum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TopDownLattice {
    /// Seen the increment; nothing has used the root since.
    Incremented,
    /// The root was used after the increment.
    MightBeUsed,
}

/// Lattice position of a bottom-up state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BottomUpLattice {
    /// Seen the decrement; nothing uses the root before it.
    Decremented,
    /// The root is used before the decrement.
    MightBeUsed,
}

/// Shared behavior of the two lattices.
pub trait Lattice: Copy + Ord + std::fmt::Debug {
    /// The state right after the tracked mutator.
    const INITIAL: Self;
    /// The state after an intervening use.
    const USED: Self;
}

impl Lattice for TopDownLattice {
    const INITIAL: Self = TopDownLattice::Incremented;
    const USED: Self = TopDownLattice::MightBeUsed;
}

impl Lattice for BottomUpLattice {
    const INITIAL: Self = BottomUpLattice::Decremented;
    const USED: Self = BottomUpLattice::MightBeUsed;
}

/// State of one tracked identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefCountState<L> {
    /// Transition kind of the tracked instructions.
    pub kind: TransitionKind,
    /// The instructions that opened this state. More than one after a
    /// join where each predecessor opened its own.
    pub mutators: InstSet,
    pub lattice: L,
    /// Where a paired operation could be placed if it were moved: just
    /// past the last intervening use.
    pub insertion_points: InstSet,
    /// An enclosing owner keeps the object alive across every use.
    pub known_safe: bool,
    /// A second mutator of the same kind was seen while this one was open.
    pub nesting_detected: bool,
}

impl<L: Lattice> RefCountState<L> {
    /// A fresh state for one mutator.
    pub fn new(kind: TransitionKind, mutator: Option<InstId>) -> Self {
        Self {
            kind,
            mutators: mutator.into_iter().collect(),
            lattice: L::INITIAL,
            insertion_points: InstSet::new(),
            known_safe: false,
            nesting_detected: false,
        }
    }

    /// No use intervened between the mutator and the current point.
    #[inline]
    pub fn is_clean(&self) -> bool {
        self.lattice == L::INITIAL
    }

    /// Record a use of the root at `at`.
    pub fn record_use(&mut self, at: Option<InstId>) {
        self.lattice = L::USED;
        self.insertion_points = at.into_iter().collect();
    }

    /// Merge the state flowing in along another edge.
    ///
    /// Returns `false` when the two disagree on the transition kind; the
    /// caller must then drop the identity.
    pub fn merge(&mut self, other: &Self) -> bool {
        if self.kind != other.kind {
            return false;
        }
        self.mutators = self.mutators.clone().union(other.mutators.clone());
        self.lattice = self.lattice.max(other.lattice);
        self.insertion_points = self
            .insertion_points
            .clone()
            .intersection(other.insertion_points.clone());
        self.known_safe &= other.known_safe;
        self.nesting_detected |= other.nesting_detected;
        true
    }
}

/// Open states of one direction, keyed by identity root.
pub type StateMap<L> = OrdMap<ValueId, RefCountState<L>>;

/// Merge block states at a join: an identity stays open only if every
/// incoming state has it open with the same transition kind.
pub fn merge_maps<L: Lattice>(incoming: &[StateMap<L>]) -> StateMap<L> {
    let Some((first, rest)) = incoming.split_first() else {
        return StateMap::new();
    };
    let mut merged = first.clone();
    for other in rest {
        merged = merged
            .into_iter()
            .filter_map(|(root, mut state)| {
                let theirs = other.get(&root)?;
                state.merge(theirs).then_some((root, state))
            })
            .collect();
    }
    merged
}
