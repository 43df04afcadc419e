//! Menagerie - concurrent island-ecosystem simulator
//!
//! A pool of worker threads continuously mutates a population of
//! short-lived animals: random pairs of keys are resolved against a
//! shared live-entity index and the encounter plays out as a birth, a
//! meal or a mating. The interesting part is not the zoology but the
//! concurrent core underneath it:
//!
//! 1. **Deferred reclamation** (`reclaim`) - readers bracket their
//!    accesses in cheap read sections; deleted objects are freed only
//!    after every section that could have seen them has ended, so the hot
//!    lookup path carries no reference counts.
//! 2. **Live-entity index** (`index`) - four concurrent hash-map views
//!    (all animals plus one mirror per species) with wait-free lookup and
//!    iteration, insert-or-collide, and idempotent tombstoning.
//! 3. **Versioned configuration** (`config`) - an immutable snapshot
//!    behind one atomic pointer; wait-free readers, serialized writers.
//! 4. **Per-entity locking** (`animal`) - pairwise mutations lock both
//!    animals in ascending key order and re-check liveness after locking,
//!    which is what makes mutation safe against concurrent deletion.
//! 5. **Interaction engine** (`engine`) - eat / mate / birth, plus the
//!    shutdown apocalypse, composed from the pieces above.
//! 6. **Work pipeline** (`queue`, `dispatch`) - a dispatcher thread
//!    feeding per-worker MPSC queues, with sentinel-based shutdown.
//!
//! The binary (`main.rs`) wires these to a raw-mode terminal menu and a
//! once-a-second status printer.
//!
//! # Example
//!
//! ```rust
//! use menagerie::{engine, GameConfig, Species, World};
//!
//! let world = World::new(GameConfig::default(), 42);
//! let reader = world.domain.register();
//! {
//!     let guard = reader.enter();
//!     assert!(engine::god_spawn(&world, &guard, Species::Gerbil, 7));
//!     assert_eq!(world.animals.count_kind(Species::Gerbil, &guard), 1);
//!     engine::apocalypse(&world, &guard);
//! }
//! drop(reader);
//! world.teardown();
//! ```

pub mod animal;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod index;
pub mod queue;
pub mod reclaim;
pub mod rng;
pub mod ui;
pub mod vegetation;
pub mod world;

pub use animal::{Animal, AnimalKind, DietMask, Sex, Species};
pub use config::{ConfigCell, GameConfig};
pub use dispatch::{WorkerPool, DEFAULT_WORKERS};
pub use index::LiveIndex;
pub use queue::{WorkItem, WorkQueue};
pub use reclaim::{Domain, ThreadReader};
pub use vegetation::Vegetation;
pub use world::World;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_smoke() {
        let world = World::new(GameConfig::default(), 1);
        let reader = world.domain.register();
        let guard = reader.enter();
        assert_eq!(world.animals.count_all(&guard), 0);
        assert_eq!(world.config.snapshot(&guard).island_size, 2400);
    }

    #[test]
    fn test_spawn_and_teardown_leaves_nothing() {
        let world = World::new(GameConfig::default(), 2);
        let reader = world.domain.register();
        {
            let guard = reader.enter();
            for key in 0..25 {
                assert!(engine::god_spawn(&world, &guard, Species::Snake, key));
            }
            engine::apocalypse(&world, &guard);
            assert_eq!(world.animals.count_all(&guard), 0);
        }
        drop(reader);
        world.teardown();
    }
}
