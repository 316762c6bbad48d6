//! The watcher actor: public handle, control loop, log cursor, and
//! revision map.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio::time::sleep_until;
use tracing::debug;
use tracing::error;
use tracing::trace;
use tracing::warn;

use super::delivery::SinkTable;
use super::event::DeliveryDone;
use super::event::Liveness;
use super::event::WatcherEvent;
use super::subscription::SubEntry;
use super::subscription::SubscriptionTables;
use super::timer::PollTimer;
use crate::config::WatcherConfig;
use crate::storage::ChangeLog;
use crate::storage::DocumentStore;
use crate::types::ChangeSink;
use crate::types::DocKey;
use crate::types::DocumentId;
use crate::types::ABSENT_REVNO;
use crate::Error;
use crate::Result;
use crate::WatchError;

/// Cloneable handle to a running watcher actor.
///
/// All operations are submitted to the control loop over an unbounded
/// channel and processed in arrival order. Dropping the last handle shuts
/// the loop down.
#[derive(Debug, Clone)]
pub struct Watcher {
    event_tx: mpsc::UnboundedSender<WatcherEvent>,
    shutdown_tx: Arc<watch::Sender<()>>,
    liveness_rx: watch::Receiver<Liveness>,
}

impl Watcher {
    /// Spawns the watcher loop onto the current tokio runtime.
    ///
    /// The loop first positions its log cursor at the tail, so transactions
    /// committed before the watcher started stay invisible; a newly watched
    /// document is still brought up to date through a direct store lookup.
    pub fn spawn(
        log: Arc<dyn ChangeLog>,
        store: Arc<dyn DocumentStore>,
        config: Arc<WatcherConfig>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let (liveness_tx, liveness_rx) = watch::channel(Liveness::Running);

        let mut core = WatcherCore {
            log,
            store,
            event_rx,
            delivery_tx,
            delivery_rx,
            shutdown_rx,
            timer: PollTimer::new(&config.poll),
            cursor: 0,
            current: HashMap::new(),
            subs: SubscriptionTables::default(),
            sinks: SinkTable::default(),
            needs_sync: false,
            sync_waiters: Vec::new(),
        };

        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(async move { core.run().await })
                .catch_unwind()
                .await;
            let reason = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => {
                    error!("watcher loop terminated: {e}");
                    Some(e.to_string())
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!("watcher loop panicked: {message}");
                    Some(format!("watcher panicked: {message}"))
                }
            };
            let _ = liveness_tx.send(Liveness::Dead(reason));
        });

        Watcher {
            event_tx,
            shutdown_tx: Arc::new(shutdown_tx),
            liveness_rx,
        }
    }

    /// Subscribes `sink` to changes of one document.
    ///
    /// `known_revno` is the revision the subscriber claims to already know;
    /// [`ABSENT_REVNO`] means "nothing". When the watcher's view of the
    /// document differs, one catch-up [`crate::Change`] is queued right
    /// away. Re-subscribing an existing `(document, sink)` pair is a no-op.
    pub async fn watch(
        &self,
        collection: impl Into<String>,
        id: impl Into<DocumentId>,
        known_revno: i64,
        sink: ChangeSink,
    ) -> Result<()> {
        if known_revno < ABSENT_REVNO {
            return Err(WatchError::InvalidRevno(known_revno).into());
        }
        let key = DocKey::new(collection, id);
        self.command(|done| WatcherEvent::Watch {
            key,
            known_revno,
            sink,
            done,
        })
        .await
    }

    /// Removes a point subscription and purges any notification still
    /// pending for it. Once this returns, the sink will never receive
    /// another change for the document through this subscription.
    pub async fn unwatch(
        &self,
        collection: impl Into<String>,
        id: impl Into<DocumentId>,
        sink: ChangeSink,
    ) -> Result<()> {
        let key = DocKey::new(collection, id);
        self.command(|done| WatcherEvent::Unwatch { key, sink, done }).await
    }

    /// Subscribes `sink` to every change within a collection.
    pub async fn watch_collection(
        &self,
        collection: impl Into<String>,
        sink: ChangeSink,
    ) -> Result<()> {
        let collection = collection.into();
        self.command(|done| WatcherEvent::WatchCollection {
            collection,
            sink,
            done,
        })
        .await
    }

    /// Removes a collection subscription; same purge guarantee as
    /// [`Watcher::unwatch`].
    pub async fn unwatch_collection(
        &self,
        collection: impl Into<String>,
        sink: ChangeSink,
    ) -> Result<()> {
        let collection = collection.into();
        self.command(|done| WatcherEvent::UnwatchCollection {
            collection,
            sink,
            done,
        })
        .await
    }

    /// Requests that a sync cycle begin as soon as the loop is free.
    /// Concurrent requests coalesce; at least one cycle begins after the
    /// last call.
    pub fn start_sync(&self) -> Result<()> {
        self.event_tx
            .send(WatcherEvent::StartSync)
            .map_err(|_| Error::from(WatchError::Stopped))
    }

    /// Requests a sync cycle and waits until one has completed.
    ///
    /// Completion means the log has been consumed up to a point at least as
    /// recent as this call; it does not mean subscriber queues have drained.
    pub async fn sync(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.event_tx
            .send(WatcherEvent::Sync { done: done_tx })
            .map_err(|_| Error::from(WatchError::Stopped))?;
        if done_rx.await.is_ok() {
            return Ok(());
        }
        // The loop went away while we were waiting; report why.
        self.dead().await;
        match self.err() {
            Err(e) if !e.is_still_alive() => Err(e),
            _ => Err(WatchError::Stopped.into()),
        }
    }

    /// Shuts the loop down and waits for it to exit. Pending notification
    /// queues are discarded. Returns the terminal error if the loop had
    /// already died of one, `Ok(())` otherwise.
    pub async fn stop(&self) -> Result<()> {
        let _ = self.shutdown_tx.send(());
        self.dead().await;
        match self.err() {
            Err(e) if e.is_still_alive() => Ok(()),
            other => other,
        }
    }

    /// Reports the loop's fate: an [`WatchError::StillAlive`] error while it
    /// runs, `Ok(())` after a clean shutdown, or the terminal error.
    pub fn err(&self) -> Result<()> {
        match &*self.liveness_rx.borrow() {
            Liveness::Running => Err(WatchError::StillAlive.into()),
            Liveness::Dead(None) => Ok(()),
            Liveness::Dead(Some(reason)) => Err(Error::Fatal(reason.clone())),
        }
    }

    pub fn is_dead(&self) -> bool {
        matches!(&*self.liveness_rx.borrow(), Liveness::Dead(_))
    }

    /// Completes once the loop has exited, for callers awaiting termination.
    pub async fn dead(&self) {
        let mut liveness_rx = self.liveness_rx.clone();
        loop {
            if matches!(&*liveness_rx.borrow(), Liveness::Dead(_)) {
                return;
            }
            if liveness_rx.changed().await.is_err() {
                return;
            }
        }
    }

    async fn command(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<()>>) -> WatcherEvent,
    ) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.event_tx
            .send(build(done_tx))
            .map_err(|_| Error::from(WatchError::Stopped))?;
        match done_rx.await {
            Ok(reply) => reply,
            Err(_) => Err(WatchError::Stopped.into()),
        }
    }
}

/// The actor behind a [`Watcher`] handle. Sole owner and sole mutator of
/// the revision map, the subscriber tables, and the per-sink queues.
struct WatcherCore {
    log: Arc<dyn ChangeLog>,
    store: Arc<dyn DocumentStore>,

    event_rx: mpsc::UnboundedReceiver<WatcherEvent>,

    // Per-sink send tasks report back through this channel.
    delivery_tx: mpsc::UnboundedSender<DeliveryDone>,
    delivery_rx: mpsc::UnboundedReceiver<DeliveryDone>,

    shutdown_rx: watch::Receiver<()>,

    timer: PollTimer,

    /// Highest log ordinal consumed so far.
    cursor: u64,
    /// Last observed revno per document. Absence means "never seen";
    /// ABSENT_REVNO means "known to not exist".
    current: HashMap<DocKey, i64>,

    subs: SubscriptionTables,
    sinks: SinkTable,

    needs_sync: bool,
    sync_waiters: Vec<oneshot::Sender<()>>,
}

impl WatcherCore {
    async fn run(&mut self) -> Result<()> {
        // First-start policy: position at the tail so history that predates
        // the watcher stays invisible. Failing this read leaves no sane
        // starting point, so it is terminal.
        self.cursor = self
            .log
            .last_ordinal()
            .await
            .map_err(|e| Error::Fatal(format!("cannot position at log tail: {e}")))?;
        debug!(cursor = self.cursor, "watcher started at log tail");

        if self.timer.is_expired() {
            self.timer.reset();
        }

        loop {
            if self.needs_sync {
                self.needs_sync = false;
                match self.sync_cycle().await {
                    Ok(()) => {
                        for done in self.sync_waiters.drain(..) {
                            let _ = done.send(());
                        }
                        self.timer.reset();
                    }
                    Err(e) if e.is_fatal() => {
                        self.halt();
                        return Err(e);
                    }
                    // Transient; waiters stay queued until a cycle succeeds.
                    Err(e) => warn!("sync cycle failed, will retry: {e}"),
                }
            }

            let tick = sleep_until(self.timer.next_deadline());
            tokio::select! {
                biased;
                // P0: shutdown requested, or every handle dropped.
                _ = self.shutdown_rx.changed() => {
                    self.halt();
                    return Ok(());
                }
                // P1: periodic tick.
                _ = tick => {
                    trace!("poll tick");
                    self.needs_sync = true;
                    self.timer.reset();
                }
                // P2: a per-sink send finished.
                Some(done) = self.delivery_rx.recv() => {
                    self.handle_delivery_done(done);
                }
                // P3: caller commands, in arrival order.
                event = self.event_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => {
                            self.halt();
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    async fn handle_event(
        &mut self,
        event: WatcherEvent,
    ) {
        match event {
            WatcherEvent::Watch {
                key,
                known_revno,
                sink,
                done,
            } => {
                let reply = self.install_point(key, known_revno, sink).await;
                let _ = done.send(reply);
            }
            WatcherEvent::Unwatch { key, sink, done } => {
                let reply = self.remove_point(&key, &sink).await;
                let _ = done.send(reply);
            }
            WatcherEvent::WatchCollection {
                collection,
                sink,
                done,
            } => {
                let _ = done.send(self.install_collection(collection, sink));
            }
            WatcherEvent::UnwatchCollection {
                collection,
                sink,
                done,
            } => {
                let reply = self.remove_collection(&collection, &sink).await;
                let _ = done.send(reply);
            }
            WatcherEvent::StartSync => {
                self.needs_sync = true;
            }
            WatcherEvent::Sync { done } => {
                self.needs_sync = true;
                self.sync_waiters.push(done);
            }
        }
    }

    async fn install_point(
        &mut self,
        key: DocKey,
        known_revno: i64,
        sink: ChangeSink,
    ) -> Result<()> {
        let sink_id = self.sinks.intern(&sink);
        let Some(sub_id) = self.subs.add_point(key.clone(), sink_id) else {
            trace!(%key, "duplicate point subscription ignored");
            return Ok(());
        };
        self.sinks.add_subscriber(sink_id);
        debug!(%key, known_revno, "point subscription installed");

        let tracked = self.current.get(&key).copied();
        let revno = match tracked {
            Some(revno) => Some(revno),
            None => match self.store.current_revno(&key.collection, &key.id).await {
                Ok(found) => {
                    let revno = found.unwrap_or(ABSENT_REVNO);
                    self.current.insert(key.clone(), revno);
                    Some(revno)
                }
                Err(e) => {
                    // Best effort only: the next log record touching the
                    // document brings the sink up to date.
                    warn!(%key, "initial revno lookup failed: {e}");
                    None
                }
            },
        };
        if let Some(revno) = revno {
            if revno != known_revno {
                self.sinks.enqueue(sink_id, sub_id, &key, revno, &self.delivery_tx);
            }
        }
        Ok(())
    }

    async fn remove_point(
        &mut self,
        key: &DocKey,
        sink: &ChangeSink,
    ) -> Result<()> {
        let Some(sink_id) = self.sinks.resolve(sink) else {
            return Ok(());
        };
        let Some(sub_id) = self.subs.remove_point(key, sink_id) else {
            return Ok(());
        };
        self.sinks.purge_sub(sink_id, sub_id, &self.delivery_tx).await;
        debug!(%key, "point subscription removed");
        Ok(())
    }

    fn install_collection(
        &mut self,
        collection: String,
        sink: ChangeSink,
    ) -> Result<()> {
        let sink_id = self.sinks.intern(&sink);
        if self.subs.add_collection(collection.clone(), sink_id).is_none() {
            trace!(%collection, "duplicate collection subscription ignored");
            return Ok(());
        }
        self.sinks.add_subscriber(sink_id);
        debug!(%collection, "collection subscription installed");
        Ok(())
    }

    async fn remove_collection(
        &mut self,
        collection: &str,
        sink: &ChangeSink,
    ) -> Result<()> {
        let Some(sink_id) = self.sinks.resolve(sink) else {
            return Ok(());
        };
        let Some(sub_id) = self.subs.remove_collection(collection, sink_id) else {
            return Ok(());
        };
        self.sinks.purge_sub(sink_id, sub_id, &self.delivery_tx).await;
        debug!(%collection, "collection subscription removed");
        Ok(())
    }

    fn handle_delivery_done(
        &mut self,
        done: DeliveryDone,
    ) {
        if !self.sinks.complete(done) {
            return;
        }
        if done.closed {
            // The owner dropped the receiver without unwatching first.
            warn!(sink = done.sink, "sink closed by its owner, dropping its subscriptions");
            self.subs.remove_sink(done.sink);
            self.sinks.drop_sink(done.sink);
            return;
        }
        self.sinks.dispatch(done.sink, &self.delivery_tx);
    }

    /// One pass of the log reader: consume every record past the cursor and
    /// queue the induced notifications.
    async fn sync_cycle(&mut self) -> Result<()> {
        let window = self.log.read_after(self.cursor).await?;
        if window.gap {
            warn!(cursor = self.cursor, "change log gap observed, reconciling watched documents");
            if window.records.is_empty() {
                // The whole backlog was truncated; jump straight to the tail.
                self.cursor = self.log.last_ordinal().await?;
            }
        }
        let consumed = window.records.len();
        for record in window.records {
            for update in record.updates {
                self.observe_revno(DocKey::new(update.collection, update.id), update.revno);
            }
            self.cursor = record.ordinal;
        }
        if consumed > 0 {
            trace!(consumed, cursor = self.cursor, "log records consumed");
        }
        if window.gap {
            self.reconcile_watched().await;
        }
        Ok(())
    }

    fn observe_revno(
        &mut self,
        key: DocKey,
        revno: i64,
    ) {
        match self.current.get(&key) {
            // The transaction did not change the document; notify nobody.
            Some(&current) if current == revno => return,
            // Stale record read after a gap reconciliation jumped ahead.
            Some(&current) if revno != ABSENT_REVNO && revno < current => return,
            _ => {}
        }
        self.current.insert(key.clone(), revno);
        self.fan_out(&key, revno);
    }

    fn fan_out(
        &mut self,
        key: &DocKey,
        revno: i64,
    ) {
        // Point subscriptions first, then collection ones, each in arrival
        // order. A sink subscribed both ways gets the change twice: the two
        // subscriptions are independent.
        let targets: Vec<SubEntry> = self
            .subs
            .point_subs(key)
            .iter()
            .chain(self.subs.collection_subs(&key.collection).iter())
            .copied()
            .collect();
        for entry in targets {
            self.sinks.enqueue(entry.sink, entry.sub, key, revno, &self.delivery_tx);
        }
    }

    /// Gap recovery: re-read the store revno of every point-watched
    /// document and notify wherever the tracked value was stale. Documents
    /// watched only through collection subscriptions are reconciled lazily
    /// by the next record that touches them.
    async fn reconcile_watched(&mut self) {
        let keys: Vec<DocKey> = self.subs.point_keys().cloned().collect();
        for key in keys {
            let revno = match self.store.current_revno(&key.collection, &key.id).await {
                Ok(found) => found.unwrap_or(ABSENT_REVNO),
                Err(e) => {
                    warn!(%key, "reconciliation lookup failed: {e}");
                    continue;
                }
            };
            match self.current.get(&key) {
                Some(&current) if current == revno => continue,
                // Never seen and still absent: nothing is owed.
                None if revno == ABSENT_REVNO => continue,
                _ => {}
            }
            self.current.insert(key.clone(), revno);
            self.fan_out(&key, revno);
        }
    }

    fn halt(&mut self) {
        self.sinks.abort_all();
        self.sync_waiters.clear();
        debug!("watcher loop stopped");
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
