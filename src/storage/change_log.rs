//! The transaction log seam.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::types::DocumentId;
use crate::Result;

/// Post-image revision of one document touched by a transaction.
/// `revno` is [`crate::ABSENT_REVNO`] when the transaction removed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevnoUpdate {
    pub collection: String,
    pub id: DocumentId,
    pub revno: i64,
}

/// One committed transaction, as recorded in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Position in the log; strictly increasing across records.
    pub ordinal: u64,
    pub updates: Vec<RevnoUpdate>,
}

/// Result of reading the log past a cursor.
#[derive(Debug, Clone, Default)]
pub struct LogWindow {
    /// Records with ordinal greater than the cursor, ascending.
    pub records: Vec<LogRecord>,
    /// True when the capped ring discarded records the reader had not yet
    /// consumed: the earliest still-visible ordinal is > cursor + 1.
    pub gap: bool,
}

/// An append-only, capped sequence of transaction records.
///
/// The log is a ring: old records are discarded to make room for new ones,
/// so a reader that falls behind observes a gap and must reconcile against
/// the store directly.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChangeLog: Send + Sync + 'static {
    /// Ordinal of the newest record, 0 when the log is empty.
    async fn last_ordinal(&self) -> Result<u64>;

    /// All records with ordinal greater than `cursor`, in ascending ordinal
    /// order, together with the gap indicator.
    async fn read_after(
        &self,
        cursor: u64,
    ) -> Result<LogWindow>;
}
