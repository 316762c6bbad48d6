//! In-memory document store with a capped transaction log.
//!
//! Mirrors the behaviour of a transaction-runner-backed store closely enough
//! for embedded deployments and tests: every call to [`MemoryStore::apply`]
//! commits one transaction, appends one log record listing the post-image
//! revno of every touched document, and evicts the oldest records once the
//! ring is full.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::storage::ChangeLog;
use crate::storage::DocumentStore;
use crate::storage::LogRecord;
use crate::storage::LogWindow;
use crate::storage::RevnoUpdate;
use crate::types::DocKey;
use crate::types::DocumentId;
use crate::types::ABSENT_REVNO;
use crate::Result;

/// One document operation inside a transaction.
#[derive(Debug, Clone)]
pub enum DocumentOp {
    /// Create the document. A no-op when it already exists; the log record
    /// still lists the unchanged revno (a non-mutating transaction).
    Insert { collection: String, id: DocumentId },
    /// Assign the document a fresh revno. Creates it when absent.
    Update { collection: String, id: DocumentId },
    /// Delete the document; the log record lists [`ABSENT_REVNO`].
    Remove { collection: String, id: DocumentId },
}

impl DocumentOp {
    pub fn insert(
        collection: impl Into<String>,
        id: impl Into<DocumentId>,
    ) -> Self {
        DocumentOp::Insert {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn update(
        collection: impl Into<String>,
        id: impl Into<DocumentId>,
    ) -> Self {
        DocumentOp::Update {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn remove(
        collection: impl Into<String>,
        id: impl Into<DocumentId>,
    ) -> Self {
        DocumentOp::Remove {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

#[derive(Default)]
struct StoreInner {
    docs: HashMap<DocKey, i64>,
    /// Highest revno ever assigned per collection. A re-inserted document
    /// always gets a revno above anything previously seen in its collection.
    high_revnos: HashMap<String, i64>,
    records: VecDeque<LogRecord>,
    /// Ordinal the next appended record will get; ordinals start at 1.
    next_ordinal: u64,
}

/// In-memory implementation of both storage seams, plus a writer API.
pub struct MemoryStore {
    max_records: usize,
    inner: Mutex<StoreInner>,
}

impl MemoryStore {
    /// `max_records` caps the transaction log ring; the oldest records are
    /// evicted beyond it, which is what produces gaps for slow readers.
    pub fn new(max_records: usize) -> Self {
        Self {
            max_records,
            inner: Mutex::new(StoreInner {
                next_ordinal: 1,
                ..StoreInner::default()
            }),
        }
    }

    /// Commits one transaction and appends one log record for it.
    /// Returns the post-image revno of each operation, in order.
    pub fn apply(
        &self,
        ops: Vec<DocumentOp>,
    ) -> Vec<i64> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");

        let mut revnos = Vec::with_capacity(ops.len());
        let mut updates = Vec::with_capacity(ops.len());
        for op in ops {
            let (key, revno) = match op {
                DocumentOp::Insert { collection, id } => {
                    let key = DocKey::new(collection, id);
                    let revno = match inner.docs.get(&key).copied() {
                        Some(existing) => existing,
                        None => Self::fresh_revno(&mut inner, &key),
                    };
                    (key, revno)
                }
                DocumentOp::Update { collection, id } => {
                    let key = DocKey::new(collection, id);
                    let revno = Self::fresh_revno(&mut inner, &key);
                    (key, revno)
                }
                DocumentOp::Remove { collection, id } => {
                    let key = DocKey::new(collection, id);
                    inner.docs.remove(&key);
                    (key, ABSENT_REVNO)
                }
            };
            revnos.push(revno);
            updates.push(RevnoUpdate {
                collection: key.collection,
                id: key.id,
                revno,
            });
        }

        let ordinal = inner.next_ordinal;
        inner.next_ordinal += 1;
        inner.records.push_back(LogRecord { ordinal, updates });
        while inner.records.len() > self.max_records {
            inner.records.pop_front();
        }

        revnos
    }

    pub fn insert(
        &self,
        collection: impl Into<String>,
        id: impl Into<DocumentId>,
    ) -> i64 {
        self.apply(vec![DocumentOp::insert(collection, id)])[0]
    }

    pub fn update(
        &self,
        collection: impl Into<String>,
        id: impl Into<DocumentId>,
    ) -> i64 {
        self.apply(vec![DocumentOp::update(collection, id)])[0]
    }

    pub fn remove(
        &self,
        collection: impl Into<String>,
        id: impl Into<DocumentId>,
    ) -> i64 {
        self.apply(vec![DocumentOp::remove(collection, id)])[0]
    }

    fn fresh_revno(
        inner: &mut StoreInner,
        key: &DocKey,
    ) -> i64 {
        let high = inner
            .high_revnos
            .entry(key.collection.clone())
            .or_insert(0);
        *high += 1;
        let revno = *high;
        inner.docs.insert(key.clone(), revno);
        revno
    }
}

#[async_trait]
impl ChangeLog for MemoryStore {
    async fn last_ordinal(&self) -> Result<u64> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        Ok(inner.next_ordinal - 1)
    }

    async fn read_after(
        &self,
        cursor: u64,
    ) -> Result<LogWindow> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        let gap = inner
            .records
            .front()
            .map_or(false, |oldest| oldest.ordinal > cursor + 1);
        let records = inner
            .records
            .iter()
            .filter(|record| record.ordinal > cursor)
            .cloned()
            .collect();
        Ok(LogWindow { records, gap })
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn current_revno(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> Result<Option<i64>> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        let key = DocKey::new(collection, id.clone());
        Ok(inner.docs.get(&key).copied())
    }
}
