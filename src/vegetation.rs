//! Shared vegetation counters.
//!
//! Two counters under one lock, consumed by the herbivorous eat paths and
//! set directly from the god menu. Counters never wrap: the eat path checks
//! before decrementing, so zero means exhausted, not underflowed.

use parking_lot::{Mutex, MutexGuard};

pub const DEFAULT_FLOWERS: u64 = 1000;
pub const DEFAULT_TREES: u64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VegetationCounts {
    pub flowers: u64,
    pub trees: u64,
}

#[derive(Debug)]
pub struct Vegetation {
    counts: Mutex<VegetationCounts>,
}

impl Vegetation {
    pub fn new(flowers: u64, trees: u64) -> Self {
        Self {
            counts: Mutex::new(VegetationCounts { flowers, trees }),
        }
    }

    /// Lock the counters. Always acquired after the eating animal's own
    /// lock, never the other way around.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, VegetationCounts> {
        self.counts.lock()
    }

    /// Snapshot for the status printer.
    pub fn counts(&self) -> VegetationCounts {
        *self.counts.lock()
    }

    pub fn set_flowers(&self, flowers: u64) {
        self.counts.lock().flowers = flowers;
    }

    pub fn set_trees(&self, trees: u64) {
        self.counts.lock().trees = trees;
    }
}

impl Default for Vegetation {
    fn default() -> Self {
        Self::new(DEFAULT_FLOWERS, DEFAULT_TREES)
    }
}
