//! Shared simulation state.
//!
//! One [`World`] owns every structure the threads share: the live-animal
//! index, the config cell, the vegetation counters, the reclamation domain
//! and the cross-thread flags. Threads hold it behind an `Arc`; after the
//! last thread is joined the caller unwraps it and tears the pieces down
//! in order (index and config before the domain, so their deferred frees
//! run when the domain drains).

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::config::{ConfigCell, GameConfig};
use crate::index::LiveIndex;
use crate::reclaim::Domain;
use crate::vegetation::Vegetation;

pub struct World {
    pub animals: LiveIndex,
    pub config: ConfigCell,
    pub vegetation: Vegetation,
    /// Set once; every thread loop polls it cooperatively.
    exit: AtomicBool,
    /// Set while a menu is open; the periodic printer skips its refresh.
    hide_output: AtomicBool,
    /// Serializes menu output against the periodic printer.
    pub print_lock: Mutex<()>,
    // Declared last: dropped after the index and config cell, so garbage
    // they retired in their lifetimes is released when the collector goes.
    pub domain: Domain,
}

impl World {
    pub fn new(config: GameConfig, index_seed: u64) -> Self {
        Self {
            animals: LiveIndex::new(index_seed),
            config: ConfigCell::new(config),
            vegetation: Vegetation::default(),
            exit: AtomicBool::new(false),
            hide_output: AtomicBool::new(false),
            print_lock: Mutex::new(()),
            domain: Domain::new(),
        }
    }

    #[inline]
    pub fn exit_requested(&self) -> bool {
        self.exit.load(Ordering::Acquire)
    }

    pub fn request_exit(&self) {
        self.exit.store(true, Ordering::Release);
    }

    #[inline]
    pub fn output_hidden(&self) -> bool {
        self.hide_output.load(Ordering::Acquire)
    }

    pub fn set_output_hidden(&self, hidden: bool) {
        self.hide_output.store(hidden, Ordering::Release);
    }

    /// Tear the world down in order: index views first, then the config
    /// cell, then drain the reclamation domain.
    ///
    /// Call with every simulation thread joined, normally right after the
    /// apocalypse; afterwards no animal or retired snapshot remains
    /// allocated.
    pub fn teardown(self) {
        let World {
            animals,
            config,
            vegetation,
            domain,
            ..
        } = self;
        drop(animals);
        drop(config);
        drop(vegetation);
        domain.barrier();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_default_clear() {
        let world = World::new(GameConfig::default(), 1);
        assert!(!world.exit_requested());
        assert!(!world.output_hidden());
        world.request_exit();
        world.set_output_hidden(true);
        assert!(world.exit_requested());
        assert!(world.output_hidden());
    }
}
