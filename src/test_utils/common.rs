use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::config::PollConfig;
use crate::config::WatcherConfig;
use crate::storage::MemoryStore;
use crate::types::Change;
use crate::types::DocumentId;
use crate::Watcher;

static LOGGER_INIT: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
}

/// Polling disabled: sync cycles run only on explicit request, so tests
/// control exactly when the log is consumed.
pub fn manual_config() -> Arc<WatcherConfig> {
    Arc::new(WatcherConfig {
        poll: PollConfig {
            interval_ms: 5_000,
            periodic: false,
        },
    })
}

pub fn periodic_config(interval_ms: u64) -> Arc<WatcherConfig> {
    Arc::new(WatcherConfig {
        poll: PollConfig {
            interval_ms,
            periodic: true,
        },
    })
}

/// A watcher wired to an in-memory store, the standard test fixture.
pub struct WatcherHarness {
    pub store: Arc<MemoryStore>,
    pub watcher: Watcher,
}

impl WatcherHarness {
    pub fn new() -> Self {
        Self::with_log_capacity(1_000)
    }

    pub fn with_log_capacity(max_records: usize) -> Self {
        enable_logger();
        let store = Arc::new(MemoryStore::new(max_records));
        let watcher = Watcher::spawn(store.clone(), store.clone(), manual_config());
        Self { store, watcher }
    }
}

/// A fresh single-item handoff sink.
pub fn sink() -> (mpsc::Sender<Change>, mpsc::Receiver<Change>) {
    mpsc::channel(1)
}

pub fn change(
    collection: &str,
    id: impl Into<DocumentId>,
    revno: i64,
) -> Change {
    Change {
        collection: collection.to_string(),
        id: id.into(),
        revno,
    }
}

pub async fn assert_change(
    changes: &mut mpsc::Receiver<Change>,
    want: Change,
) {
    match timeout(Duration::from_millis(500), changes.recv()).await {
        Ok(Some(got)) => assert_eq!(got, want, "watch reported a different change"),
        Ok(None) => panic!("change channel closed, want {want:?}"),
        Err(_) => panic!("watch reported nothing, want {want:?}"),
    }
}

pub async fn assert_no_change(changes: &mut mpsc::Receiver<Change>) {
    if let Ok(Some(got)) = timeout(Duration::from_millis(50), changes.recv()).await {
        panic!("watch reported {got:?}, want nothing");
    }
}

/// Receives exactly `count` changes, failing on timeout.
pub async fn drain(
    changes: &mut mpsc::Receiver<Change>,
    count: usize,
) -> Vec<Change> {
    let mut received = Vec::with_capacity(count);
    for _ in 0..count {
        match timeout(Duration::from_secs(5), changes.recv()).await {
            Ok(Some(got)) => received.push(got),
            Ok(None) => panic!("change channel closed after {} changes", received.len()),
            Err(_) => panic!(
                "not enough changes: got {}, want {}",
                received.len(),
                count
            ),
        }
    }
    received
}
