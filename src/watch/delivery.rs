//! Per-sink pending queues and non-blocking fan-out.
//!
//! Each sink has an independent queue of undelivered notifications and at
//! most one in-flight send, delegated to a detached task that signals back
//! through the loop's completion channel. A slow sink therefore delays only
//! its own notifications; it never stalls the loop or other sinks.

use std::collections::HashMap;
use std::collections::VecDeque;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use super::event::DeliveryDone;
use super::subscription::SubId;
use crate::types::Change;
use crate::types::ChangeSink;
use crate::types::DocKey;

pub(crate) type SinkId = u64;

/// One undelivered notification owed to a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingChange {
    pub sub: SubId,
    pub key: DocKey,
    pub revno: i64,
}

#[derive(Debug)]
struct InFlight {
    sub: SubId,
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Debug)]
struct SinkState {
    sender: ChangeSink,
    queue: VecDeque<PendingChange>,
    in_flight: Option<InFlight>,
    generation: u64,
    subscribers: usize,
}

/// All sinks the watcher currently knows about, keyed by an interned id.
/// Sink identity is channel identity; a state is garbage-collected once its
/// last subscription is gone and its queue has drained.
#[derive(Debug, Default)]
pub(crate) struct SinkTable {
    sinks: HashMap<SinkId, SinkState>,
    next_id: SinkId,
}

impl SinkTable {
    /// Finds the id of a sink already in the table.
    pub fn resolve(
        &self,
        sink: &ChangeSink,
    ) -> Option<SinkId> {
        self.sinks
            .iter()
            .find(|(_, state)| state.sender.same_channel(sink))
            .map(|(id, _)| *id)
    }

    /// Finds or registers the sink and returns its id.
    pub fn intern(
        &mut self,
        sink: &ChangeSink,
    ) -> SinkId {
        if let Some(id) = self.resolve(sink) {
            return id;
        }
        self.next_id += 1;
        let id = self.next_id;
        self.sinks.insert(
            id,
            SinkState {
                sender: sink.clone(),
                queue: VecDeque::new(),
                in_flight: None,
                generation: 0,
                subscribers: 0,
            },
        );
        id
    }

    pub fn add_subscriber(
        &mut self,
        id: SinkId,
    ) {
        if let Some(state) = self.sinks.get_mut(&id) {
            state.subscribers += 1;
        }
    }

    /// Queues a notification for one subscription and starts delivering it
    /// if the sink is idle.
    ///
    /// Collapse rule: when a change for the same `(subscription, key)` is
    /// already queued, the new revno replaces it in place; the newest value
    /// wins and the queue position is kept. This bounds memory by the number
    /// of distinct keys a sink is subscribed to.
    pub fn enqueue(
        &mut self,
        id: SinkId,
        sub: SubId,
        key: &DocKey,
        revno: i64,
        completions: &mpsc::UnboundedSender<DeliveryDone>,
    ) {
        let Some(state) = self.sinks.get_mut(&id) else {
            return;
        };
        let queued = state
            .queue
            .iter()
            .position(|pending| pending.sub == sub && pending.key == *key);
        match queued {
            Some(index) => state.queue[index].revno = revno,
            None => state.queue.push_back(PendingChange {
                sub,
                key: key.clone(),
                revno,
            }),
        }
        self.dispatch(id, completions);
    }

    /// Starts the next send for the sink unless one is already in flight.
    pub fn dispatch(
        &mut self,
        id: SinkId,
        completions: &mpsc::UnboundedSender<DeliveryDone>,
    ) {
        let Some(state) = self.sinks.get_mut(&id) else {
            return;
        };
        if state.in_flight.is_some() {
            return;
        }
        let Some(next) = state.queue.pop_front() else {
            self.maybe_gc(id);
            return;
        };

        state.generation += 1;
        let generation = state.generation;
        let change = Change {
            collection: next.key.collection.clone(),
            id: next.key.id.clone(),
            revno: next.revno,
        };
        let sender = state.sender.clone();
        let completions = completions.clone();
        let handle = tokio::spawn(async move {
            let closed = sender.send(change).await.is_err();
            let _ = completions.send(DeliveryDone {
                sink: id,
                generation,
                closed,
            });
        });
        state.in_flight = Some(InFlight {
            sub: next.sub,
            generation,
            handle,
        });
        trace!(sink = id, generation, "delivery dispatched");
    }

    /// Acknowledges a completion signal. Returns false when the signal is
    /// stale (the send it belongs to was cancelled) or the sink is gone.
    pub fn complete(
        &mut self,
        done: DeliveryDone,
    ) -> bool {
        let Some(state) = self.sinks.get_mut(&done.sink) else {
            return false;
        };
        let acknowledged = state
            .in_flight
            .as_ref()
            .map_or(false, |in_flight| in_flight.generation == done.generation);
        if acknowledged {
            state.in_flight = None;
        }
        acknowledged
    }

    /// Discards everything a removed subscription still owes its sink: the
    /// queued entries, and the in-flight send if it belongs to it. The
    /// aborted task is awaited so the next dispatch cannot overlap it.
    pub async fn purge_sub(
        &mut self,
        id: SinkId,
        sub: SubId,
        completions: &mpsc::UnboundedSender<DeliveryDone>,
    ) {
        let Some(state) = self.sinks.get_mut(&id) else {
            return;
        };
        state.queue.retain(|pending| pending.sub != sub);
        state.subscribers = state.subscribers.saturating_sub(1);
        let owns_in_flight = state
            .in_flight
            .as_ref()
            .map_or(false, |in_flight| in_flight.sub == sub);
        let aborted = if owns_in_flight {
            state.in_flight.take()
        } else {
            None
        };
        match aborted {
            Some(in_flight) => {
                in_flight.handle.abort();
                let _ = in_flight.handle.await;
                self.dispatch(id, completions);
            }
            None => self.maybe_gc(id),
        }
    }

    /// Forgets a sink entirely; used when its receiver was dropped.
    pub fn drop_sink(
        &mut self,
        id: SinkId,
    ) {
        self.sinks.remove(&id);
    }

    /// Aborts every in-flight send; used on loop shutdown.
    pub fn abort_all(&mut self) {
        for state in self.sinks.values_mut() {
            if let Some(in_flight) = state.in_flight.take() {
                in_flight.handle.abort();
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_count(
        &self,
        id: SinkId,
    ) -> usize {
        self.sinks.get(&id).map(|state| state.queue.len()).unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    fn maybe_gc(
        &mut self,
        id: SinkId,
    ) {
        if let Some(state) = self.sinks.get(&id) {
            if state.subscribers == 0 && state.queue.is_empty() && state.in_flight.is_none() {
                trace!(sink = id, "sink released");
                self.sinks.remove(&id);
            }
        }
    }
}
