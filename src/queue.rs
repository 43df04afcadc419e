//! Per-worker work queues.
//!
//! Each worker owns one multi-producer/single-consumer queue. The
//! dispatcher is the steady producer; the shutdown path is a second
//! producer that enqueues an exit sentinel. Enqueue never blocks; the
//! consumer polls with a short timeout so an idle worker wakes at least
//! every [`POLL_INTERVAL`] to look again.

use std::fmt;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

/// How long a worker sleeps on an empty queue before re-polling.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One unit of work: a random pair of keys for a worker to resolve, or the
/// exit sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItem {
    pub first_key: u64,
    pub second_key: u64,
    pub exit: bool,
}

impl WorkItem {
    pub fn pair(first_key: u64, second_key: u64) -> Self {
        Self {
            first_key,
            second_key,
            exit: false,
        }
    }

    /// The sentinel a worker terminates on.
    pub fn exit_sentinel() -> Self {
        Self {
            first_key: 0,
            second_key: 0,
            exit: true,
        }
    }
}

/// Error returned when enqueueing to a worker that already went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueError;

impl fmt::Display for EnqueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker queue is closed")
    }
}

impl std::error::Error for EnqueueError {}

/// Producer handle; cloneable so the dispatcher and the stop path can both
/// feed the same worker.
#[derive(Clone)]
pub struct WorkSender {
    tx: Sender<WorkItem>,
}

impl WorkSender {
    /// Wait-free enqueue.
    pub fn enqueue(&self, item: WorkItem) -> Result<(), EnqueueError> {
        self.tx.send(item).map_err(|_| EnqueueError)
    }
}

/// The consumer end, owned by exactly one worker thread.
pub struct WorkQueue {
    tx: Sender<WorkItem>,
    rx: Receiver<WorkItem>,
}

impl WorkQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> WorkSender {
        WorkSender {
            tx: self.tx.clone(),
        }
    }

    /// Dequeue one item, waiting up to [`POLL_INTERVAL`].
    ///
    /// `None` means the poll timed out (or every producer vanished); the
    /// worker loop just tries again.
    pub fn dequeue(&self) -> Option<WorkItem> {
        match self.rx.recv_timeout(POLL_INTERVAL) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}
