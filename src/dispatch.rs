//! Worker pool and dispatcher.
//!
//! The dispatcher is a single thread that, every step, samples the current
//! configuration and hands each worker one randomized pair of keys from
//! the island's key space. Workers resolve the keys through the index
//! inside a read section and run the encounter: birth, then eat, then
//! mate, first that applies wins.
//!
//! Shutdown is cooperative. Whoever wants the simulation gone sets the
//! world's exit flag; the dispatcher notices between rounds, sends every
//! worker an exit sentinel through its own queue, and returns. Workers
//! drain their queues until the sentinel surfaces.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use crate::engine;
use crate::queue::{WorkItem, WorkQueue, WorkSender};
use crate::reclaim::ThreadReader;
use crate::rng;
use crate::world::World;

/// Default worker count, overridable with `-w`.
pub const DEFAULT_WORKERS: usize = 8;

/// Handles to the running worker threads plus one producer handle per
/// worker queue.
pub struct WorkerPool {
    senders: Vec<WorkSender>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers. Each owns its queue and registers itself
    /// with the reclamation domain for the life of the thread.
    pub fn spawn(world: &Arc<World>, count: usize) -> io::Result<WorkerPool> {
        let mut senders = Vec::with_capacity(count);
        let mut handles = Vec::with_capacity(count);
        for id in 0..count {
            let queue = WorkQueue::new();
            senders.push(queue.sender());
            let world = Arc::clone(world);
            let handle = thread::Builder::new()
                .name(format!("island-worker-{}", id))
                .spawn(move || worker_loop(world, id as u64, queue))?;
            handles.push(handle);
        }
        Ok(WorkerPool { senders, handles })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Producer handles, one per worker, in worker-id order.
    pub fn senders(&self) -> Vec<WorkSender> {
        self.senders.clone()
    }

    /// Wait for every worker to terminate. Callers send the exit
    /// sentinels first (normally the dispatcher's job).
    pub fn join(self) -> thread::Result<()> {
        for handle in self.handles {
            handle.join()?;
        }
        Ok(())
    }
}

fn worker_loop(world: Arc<World>, id: u64, queue: WorkQueue) {
    debug!("worker {} running", id);
    let reader = world.domain.register();
    rng::seed_thread(rng::clock_seed(id));

    loop {
        let Some(work) = queue.dequeue() else {
            // Queue empty; poll again.
            continue;
        };
        if do_work(&world, &reader, work) {
            break;
        }
    }

    debug!("worker {} exiting", id);
}

/// Run one work item. Returns `true` when the item was the exit sentinel.
fn do_work(world: &World, reader: &ThreadReader, work: WorkItem) -> bool {
    if work.exit {
        return true;
    }

    let guard = reader.enter();

    let first_hit = world.animals.lookup(work.first_key, &guard);
    let second_hit = world.animals.lookup(work.second_key, &guard);

    // Collapse to (first, second): a lone hit becomes first, and a pair
    // that resolved to the same animal becomes a single-animal encounter.
    let (first, second) = match (first_hit, second_hit) {
        (None, None) => return false,
        (Some(a), None) | (None, Some(a)) => (a, None),
        (Some(a), Some(b)) if std::ptr::eq(a, b) => (a, None),
        (Some(a), Some(b)) => (a, Some(b)),
    };

    if engine::try_birth(world, &guard, first, work.second_key) {
        return false;
    }
    if engine::try_eat(world, &guard, first, second) {
        return false;
    }
    let _ = engine::try_mate(first, second);
    false
}

/// Spawn the dispatcher thread.
///
/// Runs until the exit flag is set, then stops every worker by sentinel
/// and returns.
pub fn spawn_dispatcher(world: &Arc<World>, senders: Vec<WorkSender>) -> io::Result<JoinHandle<()>> {
    let world = Arc::clone(world);
    thread::Builder::new()
        .name("island-dispatch".to_string())
        .spawn(move || dispatch_loop(world, senders))
}

fn dispatch_loop(world: Arc<World>, senders: Vec<WorkSender>) {
    debug!("dispatch thread running");
    let reader = world.domain.register();
    rng::seed_thread(rng::clock_seed(0));

    while !world.exit_requested() {
        let (island_size, step_delay_ms) = {
            let guard = reader.enter();
            let config = world.config.snapshot(&guard);
            (config.island_size, config.step_delay_ms)
        };

        for sender in &senders {
            let item = WorkItem::pair(rng::below(island_size), rng::below(island_size));
            // A closed queue means the worker is already gone; shutdown
            // will confirm via join.
            let _ = sender.enqueue(item);
        }

        thread::sleep(Duration::from_millis(u64::from(step_delay_ms)));
    }

    for sender in &senders {
        let _ = sender.enqueue(WorkItem::exit_sentinel());
    }
    debug!("dispatch thread exiting");
}
