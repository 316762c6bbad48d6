//! The per-document lookup seam.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::types::DocumentId;
use crate::Result;

/// On-demand access to the current revision of a single document.
///
/// Used when the log references a document the watcher has not yet seen,
/// and to reconcile watched documents after a capped-log gap.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Current revno of the document, or `None` when it does not exist.
    async fn current_revno(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> Result<Option<i64>>;
}
