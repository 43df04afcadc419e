//! The animal entity and its locking discipline.
//!
//! An [`Animal`] is shared between worker threads through the live-entity
//! index. Its immutable identity (`key`, `kind`, `sex`) may be read freely
//! inside a read section; the mutable scalars live behind the per-animal
//! lock. Holding the lock and re-checking membership in the "all" view is
//! the only reliable liveness test: the index alone cannot stop a thread
//! from mutating an animal that a concurrent deleter just unlinked.
//!
//! Pairwise mutations take both locks in ascending key order, which keeps
//! every encounter deadlock-free regardless of how the dispatcher paired
//! the keys.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, MutexGuard};

/// The three animal species on the island.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Species {
    Gerbil,
    Cat,
    Snake,
}

impl Species {
    pub const ALL: [Species; 3] = [Species::Gerbil, Species::Cat, Species::Snake];

    pub fn name(self) -> &'static str {
        match self {
            Species::Gerbil => "gerbil",
            Species::Cat => "cat",
            Species::Snake => "snake",
        }
    }

    #[inline]
    fn bit(self) -> u8 {
        match self {
            Species::Gerbil => 1 << 0,
            Species::Cat => 1 << 1,
            Species::Snake => 1 << 2,
        }
    }
}

impl std::fmt::Display for Species {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Bitset over everything an animal may eat: the three species plus the two
/// vegetation resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DietMask(u8);

impl DietMask {
    pub const EMPTY: DietMask = DietMask(0);
    pub const FLOWERS: DietMask = DietMask(1 << 3);
    pub const TREES: DietMask = DietMask(1 << 4);

    pub const fn union(self, other: DietMask) -> DietMask {
        DietMask(self.0 | other.0)
    }

    pub fn species(species: Species) -> DietMask {
        DietMask(species.bit())
    }

    #[inline]
    pub fn eats_species(self, species: Species) -> bool {
        self.0 & species.bit() != 0
    }

    #[inline]
    pub fn eats_flowers(self) -> bool {
        self.0 & Self::FLOWERS.0 != 0
    }

    #[inline]
    pub fn eats_trees(self) -> bool {
        self.0 & Self::TREES.0 != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sex {
    Male,
    Female,
}

/// Per-species construction template, copied onto every newborn from the
/// config snapshot current at birth.
#[derive(Debug, Clone, Copy)]
pub struct AnimalKind {
    pub species: Species,
    pub diet: DietMask,
    /// Upper bound (exclusive) for a newborn's starting stamina.
    pub max_birth_stamina: u64,
    /// Modulus for the litter size rolled at mating. Must stay above zero
    /// for every live animal.
    pub max_pregnant: u64,
}

/// Mutable scalars, guarded by the animal's lock.
#[derive(Debug, Default)]
pub struct AnimalState {
    /// Zero means the animal dies at its next failed eat attempt.
    pub stamina: u64,
    /// Remaining births; only ever non-zero on females.
    pub nr_pregnant: u64,
}

/// Tombstone marker for one index view.
///
/// The marker flips exactly once, when the animal is deleted from that
/// view; a second removal attempt is a detectable no-op.
#[derive(Debug)]
pub struct ViewMarker(AtomicBool);

impl ViewMarker {
    fn new() -> Self {
        ViewMarker(AtomicBool::new(false))
    }

    #[inline]
    pub fn is_removed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Flip the marker. Returns `true` if this call performed the
    /// transition, `false` if the entry was already tombstoned.
    #[inline]
    pub(crate) fn tombstone(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }
}

/// Which index view a marker or operation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewSlot {
    All,
    Kind,
}

/// A live (or dying) animal.
///
/// Allocated on birth, handed to the index, and freed by the reclamation
/// domain one grace period after its removal from the "all" view.
pub struct Animal {
    key: u64,
    kind: AnimalKind,
    sex: Sex,
    state: Mutex<AnimalState>,
    all_marker: ViewMarker,
    kind_marker: ViewMarker,
}

impl Animal {
    pub(crate) fn new(key: u64, kind: AnimalKind, sex: Sex, stamina: u64) -> Self {
        Self {
            key,
            kind,
            sex,
            state: Mutex::new(AnimalState {
                stamina,
                nr_pregnant: 0,
            }),
            all_marker: ViewMarker::new(),
            kind_marker: ViewMarker::new(),
        }
    }

    #[inline]
    pub fn key(&self) -> u64 {
        self.key
    }

    #[inline]
    pub fn kind(&self) -> &AnimalKind {
        &self.kind
    }

    #[inline]
    pub fn species(&self) -> Species {
        self.kind.species
    }

    #[inline]
    pub fn sex(&self) -> Sex {
        self.sex
    }

    #[inline]
    pub(crate) fn marker(&self, slot: ViewSlot) -> &ViewMarker {
        match slot {
            ViewSlot::All => &self.all_marker,
            ViewSlot::Kind => &self.kind_marker,
        }
    }

    /// Liveness check: an animal is dead once it left the "all" view.
    /// Only meaningful as a post-lock re-check; see [`lock_test_single`].
    #[inline]
    pub fn is_removed(&self) -> bool {
        self.all_marker.is_removed()
    }

    /// Acquire the per-animal lock without the liveness re-check. Prefer
    /// [`lock_test_single`] anywhere the animal came out of the index.
    #[inline]
    pub(crate) fn lock(&self) -> MutexGuard<'_, AnimalState> {
        self.state.lock()
    }

    /// Momentary stamina reading, for display and tests. Takes the lock
    /// briefly; by return the value may already be stale.
    pub fn stamina(&self) -> u64 {
        self.state.lock().stamina
    }

    /// Momentary pregnancy reading; same caveat as [`stamina`](Self::stamina).
    pub fn nr_pregnant(&self) -> u64 {
        self.state.lock().nr_pregnant
    }
}

impl std::fmt::Debug for Animal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Animal")
            .field("key", &self.key)
            .field("species", &self.kind.species)
            .field("sex", &self.sex)
            .field("removed", &self.is_removed())
            .finish()
    }
}

/// Lock one animal and re-check that it is still live.
///
/// Returns the state guard on success; `None` (no lock held) if the animal
/// was removed between lookup and lock.
pub(crate) fn lock_test_single(animal: &Animal) -> Option<MutexGuard<'_, AnimalState>> {
    let guard = animal.state.lock();
    if animal.is_removed() {
        return None;
    }
    Some(guard)
}

/// Lock two animals in ascending key order and re-check both.
///
/// On success returns the guards in `(first, second)` argument order, with
/// acquisition ordered by key so that concurrent encounters over the same
/// pair cannot deadlock. On failure no lock is held.
pub(crate) fn lock_test_pair<'a>(
    first: &'a Animal,
    second: &'a Animal,
) -> Option<(MutexGuard<'a, AnimalState>, MutexGuard<'a, AnimalState>)> {
    let (lo, hi) = if first.key > second.key {
        (second, first)
    } else {
        (first, second)
    };

    let lo_guard = lo.state.lock();
    if lo.is_removed() {
        return None;
    }
    let hi_guard = hi.state.lock();
    if hi.is_removed() {
        return None;
    }

    if std::ptr::eq(lo, first) {
        Some((lo_guard, hi_guard))
    } else {
        Some((hi_guard, lo_guard))
    }
}
