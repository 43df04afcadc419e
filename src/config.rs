//! Versioned simulation configuration.
//!
//! The configuration is published as an immutable snapshot behind one
//! atomic pointer. Readers take no lock: inside a read section,
//! [`ConfigCell::snapshot`] is a single acquire load, and the returned
//! reference stays valid for the rest of that section even if a new
//! version is published meanwhile; the old snapshot is retired through
//! the reclamation domain, not freed in place.
//!
//! Updates are serialized by a publish mutex held across the whole
//! begin/commit window, so at most one draft is in flight. Committing
//! swaps the pointer and defers the free of the previous snapshot;
//! dropping the draft without committing abandons the edit.

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned};
use parking_lot::{Mutex, MutexGuard};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::Ordering;

use crate::animal::{AnimalKind, DietMask, Species};
use crate::vegetation::{DEFAULT_FLOWERS, DEFAULT_TREES};

pub const DEFAULT_STEP_DELAY_MS: u32 = 1000;
pub const DEFAULT_GERBIL_MAX_BIRTH_STAMINA: u64 = 70;
pub const DEFAULT_CAT_MAX_BIRTH_STAMINA: u64 = 80;
pub const DEFAULT_SNAKE_MAX_BIRTH_STAMINA: u64 = 30;

/// Everything the dispatcher and the interaction engine read per round.
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Upper bound on the random key space, and therefore on the expected
    /// population. Never shrinks across published versions.
    pub island_size: u64,
    pub step_delay_ms: u32,
    pub gerbil: AnimalKind,
    pub cat: AnimalKind,
    pub snake: AnimalKind,
}

impl GameConfig {
    #[inline]
    pub fn kind(&self, species: Species) -> &AnimalKind {
        match species {
            Species::Gerbil => &self.gerbil,
            Species::Cat => &self.cat,
            Species::Snake => &self.snake,
        }
    }

    #[inline]
    pub fn kind_mut(&mut self, species: Species) -> &mut AnimalKind {
        match species {
            Species::Gerbil => &mut self.gerbil,
            Species::Cat => &mut self.cat,
            Species::Snake => &mut self.snake,
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        GameConfig {
            island_size: 2 * (DEFAULT_FLOWERS + DEFAULT_TREES),
            step_delay_ms: DEFAULT_STEP_DELAY_MS,
            gerbil: AnimalKind {
                species: Species::Gerbil,
                diet: DietMask::FLOWERS.union(DietMask::TREES),
                max_birth_stamina: DEFAULT_GERBIL_MAX_BIRTH_STAMINA,
                max_pregnant: 10,
            },
            cat: AnimalKind {
                species: Species::Cat,
                diet: DietMask::species(Species::Gerbil),
                max_birth_stamina: DEFAULT_CAT_MAX_BIRTH_STAMINA,
                max_pregnant: 4,
            },
            snake: AnimalKind {
                species: Species::Snake,
                diet: DietMask::species(Species::Gerbil).union(DietMask::species(Species::Cat)),
                max_birth_stamina: DEFAULT_SNAKE_MAX_BIRTH_STAMINA,
                max_pregnant: 6,
            },
        }
    }
}

/// Shared cell holding the current configuration snapshot.
pub struct ConfigCell {
    current: Atomic<GameConfig>,
    publish: Mutex<()>,
}

impl ConfigCell {
    pub fn new(initial: GameConfig) -> Self {
        Self {
            current: Atomic::new(initial),
            publish: Mutex::new(()),
        }
    }

    /// Read the current snapshot.
    ///
    /// Wait-free. The reference is valid for the lifetime of `guard`; do
    /// not stash it beyond the read section.
    #[inline]
    pub fn snapshot<'g>(&self, guard: &'g Guard) -> &'g GameConfig {
        let shared = self.current.load(Ordering::Acquire, guard);
        // SAFETY: the cell is initialized at construction and the pointer
        // is only ever swapped, never nulled; the previous snapshot is
        // retired through the guard's domain, so it outlives this section.
        unsafe { shared.deref() }
    }

    /// Begin an update: lock out other writers and return an editable copy
    /// of the current snapshot.
    ///
    /// The publish lock is held by the returned guard until it is committed
    /// or dropped, so only one update is ever in flight.
    pub fn update(&self) -> ConfigUpdate<'_> {
        let permit = self.publish.lock();
        // SAFETY: we hold the publish lock, so the pointer cannot change
        // underneath us and its target cannot be retired (only a committing
        // writer retires snapshots). An unprotected guard is enough to
        // clone the current value.
        let draft = unsafe {
            let guard = epoch::unprotected();
            self.current.load(Ordering::Acquire, guard).deref().clone()
        };
        ConfigUpdate {
            cell: self,
            draft: Some(draft),
            _permit: permit,
        }
    }
}

impl Drop for ConfigCell {
    fn drop(&mut self) {
        // SAFETY: &mut self means no readers or writers remain; reclaim the
        // final snapshot directly.
        unsafe {
            let guard = epoch::unprotected();
            let shared = self.current.load(Ordering::Relaxed, guard);
            if !shared.is_null() {
                drop(shared.into_owned());
            }
        }
    }
}

/// An in-flight configuration edit.
///
/// Dereferences to the draft [`GameConfig`]. [`commit`](Self::commit)
/// publishes it atomically; dropping the value abandons the edit and frees
/// the draft. Either way the publish lock is released.
pub struct ConfigUpdate<'a> {
    cell: &'a ConfigCell,
    draft: Option<GameConfig>,
    _permit: MutexGuard<'a, ()>,
}

impl ConfigUpdate<'_> {
    /// Publish the draft.
    ///
    /// Readers either see the previous complete snapshot or the new one,
    /// never a torn mix. The old snapshot is freed one grace period after
    /// every read section that could have observed it has ended.
    pub fn commit(mut self, guard: &Guard) {
        let draft = self.draft.take().expect("draft consumed twice");
        let old = self
            .cell
            .current
            .swap(Owned::new(draft), Ordering::AcqRel, guard);
        // SAFETY: `old` was just unlinked from the cell and can no longer
        // be reached by new readers; existing readers are covered by the
        // grace period.
        unsafe {
            guard.defer_destroy(old);
        }
    }
}

impl Deref for ConfigUpdate<'_> {
    type Target = GameConfig;

    fn deref(&self) -> &GameConfig {
        self.draft.as_ref().expect("draft already committed")
    }
}

impl DerefMut for ConfigUpdate<'_> {
    fn deref_mut(&mut self) -> &mut GameConfig {
        self.draft.as_mut().expect("draft already committed")
    }
}
