//! Commands and internal events multiplexed by the watcher loop.

use tokio::sync::oneshot;

use super::delivery::SinkId;
use crate::types::ChangeSink;
use crate::types::DocKey;
use crate::Result;

/// Inbound commands submitted through the intake channel, processed by the
/// loop in arrival order. Subscription commands carry a oneshot so callers
/// observe a full loop round-trip; this is what makes the unwatch purge
/// guarantee visible to the caller.
#[derive(Debug)]
pub(crate) enum WatcherEvent {
    Watch {
        key: DocKey,
        known_revno: i64,
        sink: ChangeSink,
        done: oneshot::Sender<Result<()>>,
    },

    Unwatch {
        key: DocKey,
        sink: ChangeSink,
        done: oneshot::Sender<Result<()>>,
    },

    WatchCollection {
        collection: String,
        sink: ChangeSink,
        done: oneshot::Sender<Result<()>>,
    },

    UnwatchCollection {
        collection: String,
        sink: ChangeSink,
        done: oneshot::Sender<Result<()>>,
    },

    /// Request a sync cycle; never blocks the caller.
    StartSync,

    /// Request a sync cycle and signal `done` once one has completed.
    Sync { done: oneshot::Sender<()> },
}

/// Completion signal from a detached per-sink send task.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DeliveryDone {
    pub sink: SinkId,
    /// Matches the dispatch that spawned the task; a stale generation means
    /// the send was cancelled and its completion must be ignored.
    pub generation: u64,
    /// The sink's receiver was dropped while the send was in flight.
    pub closed: bool,
}

/// Externally observable lifecycle state of the watcher loop.
#[derive(Debug, Clone)]
pub enum Liveness {
    Running,
    /// The loop has exited; `None` on clean shutdown, otherwise the terminal
    /// error description.
    Dead(Option<String>),
}
