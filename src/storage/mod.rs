//! Storage seams consumed by the watcher.
//!
//! The watcher treats the document store as two narrow capabilities: an
//! append-only, capped transaction log ([`ChangeLog`]) and a per-document
//! revision lookup ([`DocumentStore`]). Both are traits so deployments can
//! plug in their own store; [`MemoryStore`] implements both in memory and
//! doubles as the test fixture.
mod change_log;
mod document_store;
mod memory;

pub use change_log::*;
pub use document_store::*;
pub use memory::*;
