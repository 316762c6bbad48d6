//! Core identity and notification types shared across the crate.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;

/// Revision number that denotes "the document does not exist", either
/// because it was never inserted or because it has been removed.
pub const ABSENT_REVNO: i64 = -1;

/// Identity of a document within its collection.
///
/// Stores commonly key documents by either a name or a numeric id, so both
/// forms are supported; equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentId {
    Text(String),
    Number(i64),
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        DocumentId::Text(id.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        DocumentId::Text(id)
    }
}

impl From<i64> for DocumentId {
    fn from(id: i64) -> Self {
        DocumentId::Number(id)
    }
}

impl From<i32> for DocumentId {
    fn from(id: i32) -> Self {
        DocumentId::Number(id as i64)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            DocumentId::Text(id) => write!(f, "{id}"),
            DocumentId::Number(id) => write!(f, "{id}"),
        }
    }
}

/// Fully qualified key of a watched document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocKey {
    pub collection: String,
    pub id: DocumentId,
}

impl DocKey {
    pub fn new(
        collection: impl Into<String>,
        id: impl Into<DocumentId>,
    ) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for DocKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Outward-facing notification that a document changed.
///
/// `revno` is the document's current revision number, or [`ABSENT_REVNO`]
/// when the document has been removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub collection: String,
    pub id: DocumentId,
    pub revno: i64,
}

/// Caller-owned delivery endpoint for [`Change`] notifications.
///
/// A bounded channel sender; create one with `tokio::sync::mpsc::channel(1)`
/// for single-item handoff semantics. The watcher holds a non-owning clone
/// and identifies subscriptions by channel identity
/// ([`mpsc::Sender::same_channel`]), so the same sink value may back many
/// subscriptions.
pub type ChangeSink = mpsc::Sender<Change>;
