//! Live-entity index: four concurrent views over the animal population.
//!
//! One "all" view plus one filtered mirror per species, each a hash table
//! keyed by the animal's 64-bit key under a salt fixed at startup. Readers
//! traverse bucket lists inside a read section and never block or are
//! blocked; mutators serialize per bucket on a small lock and retire
//! unlinked nodes through the reclamation domain, so a reader that raced a
//! removal keeps dereferencing a stable node until its section ends.
//!
//! Deletion is two-phase: the animal's per-view tombstone marker flips
//! first (the linearization point: new lookups skip the entry), then the
//! node is unlinked under the bucket lock. The marker doubles as the
//! existence re-check of the lock-test idiom: a thread that locked an
//! animal and finds its "all" marker flipped must back off without
//! touching it.
//!
//! An animal is present in "all" iff it is alive; its "kind" entry is a
//! strict subset in time (inserted after, removed before). The interaction
//! engine maintains that ordering; the index only provides the pieces.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ptr::NonNull;
use std::sync::atomic::Ordering;

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use parking_lot::Mutex;

use crate::animal::{Animal, Species, ViewSlot};

/// Buckets per view. Plenty for the default island; collisions degrade to
/// short list walks, never to errors.
const BUCKET_COUNT: usize = 4096;

/// `add_unique` found a live entry under the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collision;

impl fmt::Display for Collision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "an entry with this key is already present")
    }
}

impl std::error::Error for Collision {}

/// `remove` hit an entry that was already tombstoned.
///
/// Idempotent at the index level; the interaction engine treats it as an
/// invariant violation because its protocol never deletes twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlreadyRemoved;

impl fmt::Display for AlreadyRemoved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entry was already removed from this view")
    }
}

impl std::error::Error for AlreadyRemoved {}

struct Node {
    key: u64,
    animal: NonNull<Animal>,
    next: Atomic<Node>,
}

// SAFETY: the pointee is a shared, Sync animal owned by the index/engine
// protocol; nodes only ever hand out shared references to it.
unsafe impl Send for Node {}
unsafe impl Sync for Node {}

impl Node {
    /// # Safety
    ///
    /// The node must still be reachable from a bucket, or within the grace
    /// period of the guard that loaded it.
    #[inline]
    unsafe fn animal_ref<'g>(&'g self) -> &'g Animal {
        unsafe { self.animal.as_ref() }
    }
}

struct Bucket {
    head: Atomic<Node>,
    /// Serializes insert/unlink on this bucket. Readers never take it.
    write: Mutex<()>,
}

impl Bucket {
    fn new() -> Self {
        Self {
            head: Atomic::null(),
            write: Mutex::new(()),
        }
    }
}

/// One hash-table view (either "all" or one species mirror).
struct View {
    slot: ViewSlot,
    seed: u64,
    buckets: Box<[Bucket]>,
}

impl View {
    fn new(slot: ViewSlot, seed: u64) -> Self {
        let buckets: Vec<Bucket> = (0..BUCKET_COUNT).map(|_| Bucket::new()).collect();
        Self {
            slot,
            seed,
            buckets: buckets.into_boxed_slice(),
        }
    }

    #[inline]
    fn bucket(&self, key: u64) -> &Bucket {
        let mut hasher = DefaultHasher::new();
        self.seed.hash(&mut hasher);
        key.hash(&mut hasher);
        let hash = hasher.finish();
        &self.buckets[(hash as usize) & (BUCKET_COUNT - 1)]
    }

    fn lookup<'g>(&self, key: u64, guard: &'g Guard) -> Option<&'g Animal> {
        let mut cur = self.bucket(key).head.load(Ordering::Acquire, guard);
        // SAFETY: nodes loaded under the guard stay allocated for the whole
        // read section; see module docs.
        while let Some(node) = unsafe { cur.as_ref() } {
            if node.key == key {
                let animal = unsafe { node.animal_ref() };
                if !animal.marker(self.slot).is_removed() {
                    return Some(animal);
                }
            }
            cur = node.next.load(Ordering::Acquire, guard);
        }
        None
    }

    fn add_unique(&self, animal: &Animal, guard: &Guard) -> Result<(), Collision> {
        let key = animal.key();
        let bucket = self.bucket(key);
        let _write = bucket.write.lock();

        let mut cur = bucket.head.load(Ordering::Acquire, guard);
        // SAFETY: as in lookup; additionally the bucket lock freezes the
        // list shape while we scan.
        while let Some(node) = unsafe { cur.as_ref() } {
            if node.key == key && !unsafe { node.animal_ref() }.marker(self.slot).is_removed() {
                return Err(Collision);
            }
            cur = node.next.load(Ordering::Acquire, guard);
        }

        let new = Owned::new(Node {
            key,
            animal: NonNull::from(animal),
            next: Atomic::null(),
        });
        let head = bucket.head.load(Ordering::Acquire, guard);
        new.next.store(head, Ordering::Relaxed);
        bucket.head.store(new, Ordering::Release);
        Ok(())
    }

    fn remove(&self, animal: &Animal, guard: &Guard) -> Result<(), AlreadyRemoved> {
        let bucket = self.bucket(animal.key());
        let _write = bucket.write.lock();

        if !animal.marker(self.slot).tombstone() {
            return Err(AlreadyRemoved);
        }

        // Unlink the node. New lookups already skip it via the marker;
        // readers mid-traversal keep a valid node until their section ends.
        let mut link = &bucket.head;
        loop {
            let cur = link.load(Ordering::Acquire, guard);
            // SAFETY: bucket lock held; list shape is ours.
            let Some(node) = (unsafe { cur.as_ref() }) else {
                // Marker said live but no node: the engine inserted the
                // marker's owner somewhere else, which its protocol forbids.
                debug_assert!(false, "tombstoned an entry with no node in its bucket");
                return Ok(());
            };
            if std::ptr::eq(node.animal.as_ptr(), animal) {
                let next = node.next.load(Ordering::Acquire, guard);
                link.store(next, Ordering::Release);
                // SAFETY: the node is unlinked and unreachable to new
                // readers; free it after the grace period.
                unsafe {
                    guard.defer_destroy(cur);
                }
                return Ok(());
            }
            link = &node.next;
        }
    }

    fn iter<'g>(&'g self, guard: &'g Guard) -> ViewIter<'g> {
        ViewIter {
            view: self,
            guard,
            next_bucket: 0,
            cur: Shared::null(),
        }
    }
}

impl Drop for View {
    fn drop(&mut self) {
        // SAFETY: &mut self at drop means no concurrent access; walk every
        // bucket and free the nodes directly. The "all" view owns the
        // animals still linked in it (anything killed was retired through
        // the domain already and is not in any list).
        unsafe {
            let guard = epoch::unprotected();
            for bucket in self.buckets.iter() {
                let mut cur = bucket.head.load(Ordering::Relaxed, guard);
                while !cur.is_null() {
                    let next = cur.deref().next.load(Ordering::Relaxed, guard);
                    if self.slot == ViewSlot::All {
                        drop(Box::from_raw(cur.deref().animal.as_ptr()));
                    }
                    drop(cur.into_owned());
                    cur = next;
                }
            }
        }
    }
}

/// Iterator over the live entries of one view.
///
/// May miss entries inserted after the iteration started and may yield
/// entries a concurrent thread is deleting; callers mutate only after the
/// lock-test re-check.
pub struct ViewIter<'g> {
    view: &'g View,
    guard: &'g Guard,
    next_bucket: usize,
    cur: Shared<'g, Node>,
}

impl<'g> Iterator for ViewIter<'g> {
    type Item = &'g Animal;

    fn next(&mut self) -> Option<&'g Animal> {
        loop {
            // SAFETY: nodes stay allocated for the guard's read section.
            if let Some(node) = unsafe { self.cur.as_ref() } {
                self.cur = node.next.load(Ordering::Acquire, self.guard);
                let animal = unsafe { node.animal_ref() };
                if !animal.marker(self.view.slot).is_removed() {
                    return Some(animal);
                }
            } else if self.next_bucket < self.view.buckets.len() {
                self.cur = self.view.buckets[self.next_bucket]
                    .head
                    .load(Ordering::Acquire, self.guard);
                self.next_bucket += 1;
            } else {
                return None;
            }
        }
    }
}

/// The four views over the live population.
pub struct LiveIndex {
    all: View,
    gerbil: View,
    cat: View,
    snake: View,
}

impl LiveIndex {
    /// Build the views with a hash salt fixed for the process lifetime.
    pub fn new(seed: u64) -> Self {
        Self {
            all: View::new(ViewSlot::All, seed),
            gerbil: View::new(ViewSlot::Kind, seed),
            cat: View::new(ViewSlot::Kind, seed),
            snake: View::new(ViewSlot::Kind, seed),
        }
    }

    #[inline]
    fn kind_view(&self, species: Species) -> &View {
        match species {
            Species::Gerbil => &self.gerbil,
            Species::Cat => &self.cat,
            Species::Snake => &self.snake,
        }
    }

    /// Find a live animal by key in the "all" view. Wait-free; the
    /// reference is valid for the current read section only.
    #[inline]
    pub fn lookup<'g>(&self, key: u64, guard: &'g Guard) -> Option<&'g Animal> {
        self.all.lookup(key, guard)
    }

    /// Find a live animal by key in its species view.
    #[inline]
    pub fn lookup_kind<'g>(
        &self,
        species: Species,
        key: u64,
        guard: &'g Guard,
    ) -> Option<&'g Animal> {
        self.kind_view(species).lookup(key, guard)
    }

    /// Install an animal in the "all" view unless its key is taken.
    ///
    /// Crate-internal: the engine owns the insertion protocol (animals are
    /// heap allocations whose lifecycle the views and the reclamation
    /// domain manage between them).
    pub(crate) fn insert_all(&self, animal: &Animal, guard: &Guard) -> Result<(), Collision> {
        self.all.add_unique(animal, guard)
    }

    /// Install an animal in its species view unless its key is taken.
    pub(crate) fn insert_kind(&self, animal: &Animal, guard: &Guard) -> Result<(), Collision> {
        self.kind_view(animal.species()).add_unique(animal, guard)
    }

    /// Tombstone and unlink an animal from the "all" view.
    pub(crate) fn remove_all(&self, animal: &Animal, guard: &Guard) -> Result<(), AlreadyRemoved> {
        self.all.remove(animal, guard)
    }

    /// Tombstone and unlink an animal from its species view.
    pub(crate) fn remove_kind(
        &self,
        animal: &Animal,
        guard: &Guard,
    ) -> Result<(), AlreadyRemoved> {
        self.kind_view(animal.species()).remove(animal, guard)
    }

    /// Iterate the live entries of the "all" view.
    pub fn iter_all<'g>(&'g self, guard: &'g Guard) -> ViewIter<'g> {
        self.all.iter(guard)
    }

    /// Iterate the live entries of one species view.
    pub fn iter_kind<'g>(&'g self, species: Species, guard: &'g Guard) -> ViewIter<'g> {
        self.kind_view(species).iter(guard)
    }

    pub fn count_all(&self, guard: &Guard) -> usize {
        self.iter_all(guard).count()
    }

    pub fn count_kind(&self, species: Species, guard: &Guard) -> usize {
        self.iter_kind(species, guard).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animal::{AnimalKind, DietMask, Sex};
    use crate::reclaim::Domain;
    use std::sync::atomic::AtomicUsize;

    fn kind(species: Species) -> AnimalKind {
        AnimalKind {
            species,
            diet: DietMask::EMPTY,
            max_birth_stamina: 10,
            max_pregnant: 5,
        }
    }

    fn leak_animal(key: u64, species: Species) -> &'static Animal {
        Box::leak(Box::new(Animal::new(key, kind(species), Sex::Male, 3)))
    }

    /// Insert into both views the way the engine does (all first).
    fn install(index: &LiveIndex, animal: &Animal, guard: &Guard) {
        index.insert_all(animal, guard).expect("all insert");
        index.insert_kind(animal, guard).expect("kind insert");
    }

    #[test]
    fn test_lookup_hits_and_misses() {
        let domain = Domain::new();
        let reader = domain.register();
        let index = LiveIndex::new(0xfeed);
        let guard = reader.enter();

        let a = leak_animal(7, Species::Gerbil);
        install(&index, a, &guard);

        assert_eq!(index.lookup(7, &guard).unwrap().key(), 7);
        assert_eq!(
            index.lookup_kind(Species::Gerbil, 7, &guard).unwrap().key(),
            7
        );
        assert!(index.lookup(8, &guard).is_none());
        assert!(index.lookup_kind(Species::Cat, 7, &guard).is_none());
    }

    #[test]
    fn test_add_unique_collides_on_live_entry() {
        let domain = Domain::new();
        let reader = domain.register();
        let index = LiveIndex::new(1);
        let guard = reader.enter();

        let a = leak_animal(42, Species::Cat);
        let b = leak_animal(42, Species::Cat);
        install(&index, a, &guard);
        assert_eq!(index.insert_all(b, &guard), Err(Collision));
        // b was never installed; drop it ourselves.
        unsafe { drop(Box::from_raw(b as *const Animal as *mut Animal)) };
    }

    #[test]
    fn test_remove_is_idempotent_and_detectable() {
        let domain = Domain::new();
        let reader = domain.register();
        let index = LiveIndex::new(2);
        let guard = reader.enter();

        let a = leak_animal(9, Species::Snake);
        install(&index, a, &guard);

        assert!(index.remove_kind(a, &guard).is_ok());
        assert_eq!(index.remove_kind(a, &guard), Err(AlreadyRemoved));
        assert!(index.remove_all(a, &guard).is_ok());
        assert_eq!(index.remove_all(a, &guard), Err(AlreadyRemoved));
        assert!(index.lookup(9, &guard).is_none());
        // The animal was unlinked from both views; reclaim it by hand
        // since no engine deferred it in this test.
        drop(guard);
        unsafe { drop(Box::from_raw(a as *const Animal as *mut Animal)) };
        domain.barrier();
    }

    #[test]
    fn test_reused_key_after_removal() {
        let domain = Domain::new();
        let reader = domain.register();
        let index = LiveIndex::new(3);
        let guard = reader.enter();

        let a = leak_animal(5, Species::Gerbil);
        install(&index, a, &guard);
        index.remove_kind(a, &guard).unwrap();
        index.remove_all(a, &guard).unwrap();

        // Key 5 is free again.
        let b = leak_animal(5, Species::Gerbil);
        install(&index, b, &guard);
        let found = index.lookup(5, &guard).unwrap();
        assert!(std::ptr::eq(found, b));
        drop(guard);
        unsafe { drop(Box::from_raw(a as *const Animal as *mut Animal)) };
    }

    #[test]
    fn test_iterate_skips_removed() {
        let domain = Domain::new();
        let reader = domain.register();
        let index = LiveIndex::new(4);
        let guard = reader.enter();

        for key in 0..20 {
            install(&index, leak_animal(key, Species::Gerbil), &guard);
        }
        let doomed = index.lookup(13, &guard).unwrap();
        index.remove_kind(doomed, &guard).unwrap();
        index.remove_all(doomed, &guard).unwrap();

        let keys: Vec<u64> = index.iter_all(&guard).map(|a| a.key()).collect();
        assert_eq!(keys.len(), 19);
        assert!(!keys.contains(&13));
        assert_eq!(index.count_kind(Species::Gerbil, &guard), 19);
        let doomed_ptr = doomed as *const Animal as *mut Animal;
        drop(guard);
        unsafe { drop(Box::from_raw(doomed_ptr)) };
    }

    #[test]
    fn test_concurrent_add_unique_single_winner() {
        let domain = Domain::new();
        let index = LiveIndex::new(5);
        let wins = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..8 {
                let domain = &domain;
                let index = &index;
                let wins = &wins;
                s.spawn(move || {
                    let reader = domain.register();
                    let guard = reader.enter();
                    let candidate = leak_animal(77, Species::Cat);
                    match index.insert_all(candidate, &guard) {
                        Ok(()) => {
                            index.insert_kind(candidate, &guard).unwrap();
                            wins.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(Collision) => unsafe {
                            drop(Box::from_raw(candidate as *const Animal as *mut Animal));
                        },
                    }
                });
            }
        });

        assert_eq!(wins.load(Ordering::SeqCst), 1);
        let reader = domain.register();
        let guard = reader.enter();
        assert_eq!(index.count_all(&guard), 1);
        assert_eq!(index.count_kind(Species::Cat, &guard), 1);
    }

    #[test]
    fn test_concurrent_lookup_during_churn() {
        let domain = Domain::new();
        let index = LiveIndex::new(6);

        // Seed half the key space.
        {
            let reader = domain.register();
            let guard = reader.enter();
            for key in (0..100).step_by(2) {
                install(&index, leak_animal(key, Species::Gerbil), &guard);
            }
        }

        std::thread::scope(|s| {
            // Churn: remove and re-add entries.
            let dom = &domain;
            let idx = &index;
            s.spawn(move || {
                let reader = dom.register();
                for round in 0..50 {
                    let guard = reader.enter();
                    let key = (round % 50) * 2;
                    if let Some(a) = idx.lookup(key, &guard) {
                        idx.remove_kind(a, &guard).unwrap();
                        idx.remove_all(a, &guard).unwrap();
                        let ptr = a as *const Animal as *mut Animal;
                        // SAFETY: unlinked from both views under this guard.
                        unsafe {
                            guard.defer_unchecked(move || drop(Box::from_raw(ptr)));
                        }
                        let fresh = leak_animal(key, Species::Gerbil);
                        install(idx, fresh, &guard);
                    }
                }
            });
            // Readers: every observed animal is dereferenceable.
            for _ in 0..3 {
                let dom = &domain;
                let idx = &index;
                s.spawn(move || {
                    let reader = dom.register();
                    for _ in 0..200 {
                        let guard = reader.enter();
                        for key in 0..100 {
                            if let Some(a) = idx.lookup(key, &guard) {
                                assert_eq!(a.key(), key);
                            }
                        }
                    }
                });
            }
        });
        domain.barrier();
    }
}
