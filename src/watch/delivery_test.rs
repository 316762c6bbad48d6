use tokio::sync::mpsc;

use super::delivery::SinkTable;
use super::event::DeliveryDone;
use crate::test_utils::sink;
use crate::types::DocKey;

fn key(id: &str) -> DocKey {
    DocKey::new("test", id)
}

#[tokio::test]
async fn delivers_queued_changes_in_order() {
    let (tx, mut completions) = mpsc::unbounded_channel();
    let (sender, mut changes) = sink();

    let mut table = SinkTable::default();
    let id = table.intern(&sender);
    table.add_subscriber(id);

    table.enqueue(id, 1, &key("a"), 10, &tx);
    table.enqueue(id, 2, &key("b"), 20, &tx);

    assert_eq!(changes.recv().await.unwrap().revno, 10);
    let done = completions.recv().await.unwrap();
    assert!(table.complete(done));
    table.dispatch(id, &tx);

    assert_eq!(changes.recv().await.unwrap().revno, 20);
}

#[tokio::test]
async fn collapse_keeps_only_the_newest_revno() {
    let (tx, mut completions) = mpsc::unbounded_channel();
    let (sender, mut changes) = sink();

    let mut table = SinkTable::default();
    let id = table.intern(&sender);
    table.add_subscriber(id);

    // First change goes in flight; the rest pile up behind it.
    table.enqueue(id, 1, &key("a"), 10, &tx);
    table.enqueue(id, 1, &key("b"), 20, &tx);
    table.enqueue(id, 1, &key("b"), 21, &tx);
    table.enqueue(id, 1, &key("b"), 22, &tx);
    assert_eq!(table.pending_count(id), 1);

    assert_eq!(changes.recv().await.unwrap().revno, 10);
    let done = completions.recv().await.unwrap();
    assert!(table.complete(done));
    table.dispatch(id, &tx);

    assert_eq!(changes.recv().await.unwrap().revno, 22);
}

#[tokio::test]
async fn purge_discards_queued_and_in_flight_entries_of_the_subscription() {
    let (tx, mut completions) = mpsc::unbounded_channel();
    let (sender, mut changes) = sink();

    let mut table = SinkTable::default();
    let id = table.intern(&sender);
    table.add_subscriber(id);
    table.add_subscriber(id);

    // Fill the single-item buffer so the next dispatched send stays blocked.
    sender
        .send(crate::test_utils::change("test", "z", 1))
        .await
        .unwrap();

    table.enqueue(id, 1, &key("a"), 10, &tx);
    table.enqueue(id, 2, &key("b"), 20, &tx);
    table.enqueue(id, 1, &key("c"), 30, &tx);

    // Sub 1's queued entry for "c" vanishes and its blocked in-flight send
    // for "a" is aborted undelivered. Only sub 2's change may still arrive.
    table.purge_sub(id, 1, &tx).await;

    assert_eq!(changes.recv().await.unwrap().revno, 1);
    assert_eq!(changes.recv().await.unwrap().revno, 20);

    let done = completions.recv().await.unwrap();
    assert!(table.complete(done));
    table.dispatch(id, &tx);
    assert_eq!(table.pending_count(id), 0);
}

#[tokio::test]
async fn stale_completion_is_ignored() {
    let (tx, _completions) = mpsc::unbounded_channel();
    let (sender, _changes) = sink();

    let mut table = SinkTable::default();
    let id = table.intern(&sender);
    table.add_subscriber(id);

    table.enqueue(id, 1, &key("a"), 10, &tx);

    let stale = DeliveryDone {
        sink: id,
        generation: 99,
        closed: false,
    };
    assert!(!table.complete(stale));
}

#[tokio::test]
async fn sink_is_released_once_idle_and_unsubscribed() {
    let (tx, mut completions) = mpsc::unbounded_channel();
    let (sender, mut changes) = sink();

    let mut table = SinkTable::default();
    let id = table.intern(&sender);
    table.add_subscriber(id);

    table.enqueue(id, 1, &key("a"), 10, &tx);
    assert_eq!(changes.recv().await.unwrap().revno, 10);
    let done = completions.recv().await.unwrap();
    assert!(table.complete(done));

    table.purge_sub(id, 1, &tx).await;
    assert_eq!(table.sink_count(), 0);
}

#[tokio::test]
async fn closed_sink_is_reported_by_the_send_task() {
    let (tx, mut completions) = mpsc::unbounded_channel();
    let (sender, changes) = sink();
    drop(changes);

    let mut table = SinkTable::default();
    let id = table.intern(&sender);
    table.add_subscriber(id);

    table.enqueue(id, 1, &key("a"), 10, &tx);

    let done = completions.recv().await.unwrap();
    assert!(done.closed);
    assert!(table.complete(done));
    table.drop_sink(id);
    assert_eq!(table.sink_count(), 0);
}
