//! The interaction engine: eat, mate, birth, and the apocalypse.
//!
//! Every operation here runs inside a read section owned by the caller
//! (the `Guard` parameter) and follows one discipline: test what can be
//! tested lock-free, then take the per-animal locks in key order, then
//! re-check liveness before touching anything. A `false` return means the
//! encounter did not apply (wrong species, key taken, animal vanished
//! between lookup and lock) and is never an error.
//!
//! Index membership transitions happen with the subject's lock held:
//! births insert into "all" then "kind" while holding the child's lock, and
//! kills delete from "kind" then "all" while holding the victim's lock.
//! Both orders keep "all" a strict superset of "kind" at every instant a
//! reader can observe, which is what makes "still in the all view?" a
//! sound liveness check.

use crossbeam_epoch::Guard;
use tracing::{debug, error};

use crate::animal::{lock_test_pair, lock_test_single, Animal, AnimalState, Sex, Species};
use crate::rng;
use crate::world::World;

/// A broken protocol invariant. Aborts rather than unwinds so the process
/// state stays inspectable.
fn invariant_violation(msg: &str) -> ! {
    error!("invariant violation: {msg}");
    std::process::abort();
}

/// Remove an animal from the island and schedule its reclamation.
///
/// Caller must hold the animal's lock (witnessed by `_state`), having
/// re-checked liveness when acquiring it. Deletes the "kind" entry first:
/// removing "all" first would open a window where a racing birth claims
/// the key in "all" and then collides on the stale "kind" entry.
pub(crate) fn kill_animal(world: &World, guard: &Guard, animal: &Animal, _state: &mut AnimalState) {
    debug!("kill {} key={}", animal.species(), animal.key());
    if world.animals.remove_kind(animal, guard).is_err() {
        invariant_violation("kind entry already removed under a held lock");
    }
    if world.animals.remove_all(animal, guard).is_err() {
        invariant_violation("all entry already removed under a held lock");
    }
    let ptr = animal as *const Animal as *mut Animal;
    // SAFETY: unlinked from both views above; new readers cannot reach it
    // and current readers are covered by the grace period.
    unsafe {
        guard.defer_unchecked(move || drop(Box::from_raw(ptr)));
    }
}

/// Attempt to mate two animals.
///
/// Succeeds when they are the same species, opposite sex, both alive once
/// locked, and neither is pregnant; the female then rolls her litter
/// counter. Exactly one pregnancy transition can win per encounter because
/// both counters are checked under both locks.
pub fn try_mate(first: &Animal, second: Option<&Animal>) -> bool {
    let Some(second) = second else {
        return false;
    };
    // Immutable identity may be tested without locks.
    if first.species() != second.species() {
        return false;
    }
    if first.sex() == second.sex() {
        return false;
    }

    let Some((mut first_state, mut second_state)) = lock_test_pair(first, second) else {
        return false;
    };
    if first_state.nr_pregnant != 0 || second_state.nr_pregnant != 0 {
        return false;
    }
    let (female, female_state) = if first.sex() == Sex::Female {
        (first, &mut first_state)
    } else {
        (second, &mut second_state)
    };
    female_state.nr_pregnant = rng::below(female.kind().max_pregnant);
    true
}

enum Food {
    Flowers,
    Trees,
}

/// Herbivorous path: consume one unit of vegetation for one stamina.
/// The counter is checked and decremented before the stamina credit, all
/// under the vegetation lock inside the animal lock.
fn graze(world: &World, animal: &Animal, food: Food) -> bool {
    let Some(mut state) = lock_test_single(animal) else {
        return false;
    };
    let mut veg = world.vegetation.lock();
    let counter = match food {
        Food::Flowers => &mut veg.flowers,
        Food::Trees => &mut veg.trees,
    };
    if *counter == 0 {
        return false;
    }
    *counter -= 1;
    state.stamina += 1;
    true
}

/// One predation direction. The victim dies under both locks; the eater
/// gains a stamina point.
fn devour(world: &World, guard: &Guard, eater: &Animal, victim: &Animal) -> bool {
    if !eater.kind().diet.eats_species(victim.species()) {
        return false;
    }
    let Some((mut eater_state, mut victim_state)) = lock_test_pair(eater, victim) else {
        return false;
    };
    kill_animal(world, guard, victim, &mut victim_state);
    eater_state.stamina += 1;
    true
}

/// A fruitless encounter costs one stamina; reaching zero is death.
fn starve(world: &World, guard: &Guard, animal: &Animal) {
    let Some(mut state) = lock_test_single(animal) else {
        return;
    };
    state.stamina = state.stamina.saturating_sub(1);
    if state.stamina == 0 {
        kill_animal(world, guard, animal, &mut state);
    }
}

/// Attempt to feed during an encounter.
///
/// Alone (`second` is `None`), the animal grazes: flowers first, trees if
/// that failed. Paired, two independent predation attempts run: first
/// eats second (the surprise bonus), then second eats first; a kill in the
/// first direction simply makes the second fail its liveness re-check.
/// If nobody fed, every surviving participant loses a stamina point and
/// starved animals die on the spot.
pub fn try_eat(world: &World, guard: &Guard, first: &Animal, second: Option<&Animal>) -> bool {
    let mut fed = false;
    match second {
        None => {
            if first.kind().diet.eats_flowers() {
                fed = graze(world, first, Food::Flowers);
            }
            if !fed && first.kind().diet.eats_trees() {
                fed = graze(world, first, Food::Trees);
            }
        }
        Some(second) => {
            fed |= devour(world, guard, first, second);
            fed |= devour(world, guard, second, first);
        }
    }
    if !fed {
        starve(world, guard, first);
        if let Some(second) = second {
            starve(world, guard, second);
        }
    }
    fed
}

/// Attempt a birth from a pregnant parent at `new_key`.
pub fn try_birth(world: &World, guard: &Guard, parent: &Animal, new_key: u64) -> bool {
    // Cheap precheck; re-validated once the pair lock is held.
    if parent.lock().nr_pregnant == 0 {
        return false;
    }
    birth(world, guard, parent.species(), Some(parent), new_key)
}

/// Administrative spawn: same machinery as [`try_birth`] minus parent and
/// pregnancy bookkeeping.
pub fn god_spawn(world: &World, guard: &Guard, species: Species, new_key: u64) -> bool {
    birth(world, guard, species, None, new_key)
}

fn birth(
    world: &World,
    guard: &Guard,
    species: Species,
    parent: Option<&Animal>,
    new_key: u64,
) -> bool {
    let kind = *world.config.snapshot(guard).kind(species);
    assert!(kind.max_birth_stamina > 0, "config: zero max_birth_stamina");
    assert!(kind.max_pregnant > 0, "config: zero max_pregnant");

    let sex = if rng::coin() { Sex::Female } else { Sex::Male };
    let stamina = rng::below(kind.max_birth_stamina);
    let child_ptr = Box::into_raw(Box::new(Animal::new(new_key, kind, sex, stamina)));
    // SAFETY: freshly allocated, reachable only from this frame until the
    // index insert publishes it.
    let child = unsafe { &*child_ptr };

    // The child's lock is held across both inserts: between them the child
    // is visible in "all" but not yet in "kind", and the lock is what keeps
    // a concurrent killer from acting on that half-inserted state.
    match parent {
        Some(parent) => {
            let Some((mut parent_state, child_state)) = lock_test_pair(parent, child) else {
                // Parent died between lookup and lock.
                // SAFETY: the child never reached the index.
                unsafe { drop(Box::from_raw(child_ptr)) };
                return false;
            };
            if parent_state.nr_pregnant == 0 {
                // Another worker delivered the last birth since the precheck.
                drop(child_state);
                drop(parent_state);
                // SAFETY: as above.
                unsafe { drop(Box::from_raw(child_ptr)) };
                return false;
            }
            if world.animals.insert_all(child, guard).is_err() {
                drop(child_state);
                drop(parent_state);
                // SAFETY: as above.
                unsafe { drop(Box::from_raw(child_ptr)) };
                return false;
            }
            if world.animals.insert_kind(child, guard).is_err() {
                // No zombie kind entry can exist without a zombie all
                // entry, so a collision here is a broken protocol.
                invariant_violation("kind collision after winning the all-view insert");
            }
            parent_state.nr_pregnant -= 1;
            debug!(
                "birth {} key={} (parent {})",
                species,
                new_key,
                parent.key()
            );
            drop(child_state);
            true
        }
        None => {
            let Some(child_state) = lock_test_single(child) else {
                // SAFETY: the child never reached the index.
                unsafe { drop(Box::from_raw(child_ptr)) };
                return false;
            };
            if world.animals.insert_all(child, guard).is_err() {
                drop(child_state);
                // SAFETY: as above.
                unsafe { drop(Box::from_raw(child_ptr)) };
                return false;
            }
            if world.animals.insert_kind(child, guard).is_err() {
                invariant_violation("kind collision after winning the all-view insert");
            }
            debug!("god spawn {} key={}", species, new_key);
            drop(child_state);
            true
        }
    }
}

/// Kill every animal on the island.
///
/// Runs under a read section; each observed animal is locked and
/// re-checked before dying, so the sweep is safe even if workers were
/// still running (at shutdown they are not).
pub fn apocalypse(world: &World, guard: &Guard) {
    debug!("apocalypse");
    for animal in world.animals.iter_all(guard) {
        if let Some(mut state) = lock_test_single(animal) {
            kill_animal(world, guard, animal, &mut state);
        }
    }
}

/// Test-only spawn with every attribute pinned, bypassing the random
/// rolls of [`god_spawn`]. The allocation is owned by the index exactly
/// like a born animal's.
#[cfg(test)]
pub(crate) fn spawn_exact<'g>(
    world: &World,
    guard: &'g Guard,
    key: u64,
    kind: crate::animal::AnimalKind,
    sex: Sex,
    stamina: u64,
) -> &'g Animal {
    let ptr = Box::into_raw(Box::new(Animal::new(key, kind, sex, stamina)));
    // SAFETY: freed through a kill or the index teardown, like any birth.
    let animal = unsafe { &*ptr };
    world.animals.insert_all(animal, guard).expect("all insert");
    world
        .animals
        .insert_kind(animal, guard)
        .expect("kind insert");
    animal
}
