//! Deferred-reclamation domain.
//!
//! The simulation shares heap objects (animals, index nodes, config
//! snapshots) between threads without per-read reference counting. Readers
//! bracket their accesses in a *read section*; an object unlinked from the
//! shared structures is only freed once every read section that could have
//! observed it has ended. This module wraps `crossbeam-epoch` with an
//! explicit [`Domain`] so that thread registration and the shutdown drain
//! are visible, first-class operations rather than hidden thread-locals.
//!
//! # Usage
//!
//! ```text
//! let domain = Domain::new();
//! let reader = domain.register();      // once per thread
//! {
//!     let guard = reader.enter();      // read section opens
//!     // ... dereference index/config results, valid until drop ...
//! }                                    // read section closes
//! domain.barrier();                    // shutdown: drain deferred frees
//! ```
//!
//! Read sections are reentrant per thread and cost no shared atomics in the
//! common case. Readers never block writers and writers never block
//! readers; unlink-then-defer-free is the only write-side protocol.

use crossbeam_epoch::{Collector, Guard, LocalHandle};

/// Number of pin/flush rounds the shutdown barrier performs. Each round can
/// advance the global epoch and migrate one thread-local garbage bag, so a
/// generous fixed count drains everything once no other thread is pinned.
const BARRIER_ROUNDS: usize = 64;

/// A reclamation domain owning the garbage collector shared by every
/// structure in one [`World`](crate::world::World).
///
/// All read sections guarding a domain's objects must come from handles
/// registered with that same domain; guards from foreign collectors do not
/// hold its grace periods open.
pub struct Domain {
    collector: Collector,
}

impl Domain {
    pub fn new() -> Self {
        Self {
            collector: Collector::new(),
        }
    }

    /// Register the calling thread with the domain.
    ///
    /// The returned handle is not `Send`; each thread registers for itself
    /// and unregisters by dropping the handle.
    pub fn register(&self) -> ThreadReader {
        ThreadReader {
            handle: self.collector.register(),
        }
    }

    /// Drain deferred reclamations.
    ///
    /// Must only be called once every other registered thread has exited
    /// its read sections (in practice: after all simulation threads are
    /// joined). After it returns, objects retired before the call have been
    /// freed, up to garbage still buffered by the collector itself, which
    /// is released when the domain is dropped.
    pub fn barrier(&self) {
        let handle = self.collector.register();
        for _ in 0..BARRIER_ROUNDS {
            let guard = handle.pin();
            guard.flush();
        }
    }
}

impl Default for Domain {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-thread registration with a [`Domain`].
///
/// Dropping the reader unregisters the thread.
pub struct ThreadReader {
    handle: LocalHandle,
}

impl ThreadReader {
    /// Open a read section.
    ///
    /// References obtained from the index or the config cell under the
    /// returned [`Guard`] are valid until the guard drops, and no longer.
    /// Reentrant: nested guards on one thread are cheap.
    #[inline]
    pub fn enter(&self) -> Guard {
        self.handle.pin()
    }

    /// Whether this thread currently has a read section open.
    #[inline]
    pub fn in_read_section(&self) -> bool {
        self.handle.is_pinned()
    }
}
