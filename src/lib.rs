//! # docwatch
//!
//! A change watcher for document stores that expose a transaction log.
//!
//! Many independent subscribers can express interest in specific documents,
//! or in whole collections, and receive a [`Change`] whenever those documents
//! change, without each subscriber polling the store on its own. A single
//! background actor reads the transaction log, maintains revision state for
//! every observed document, and fans changes out to subscribers.
//!
//! ## Features
//! - **Single control loop**: all watcher state is confined to one actor;
//!   callers communicate by message passing
//! - **Capped-log aware**: ring truncation is detected and reconciled by
//!   re-reading the store, never silently leaving a stale revision behind
//! - **Non-blocking fan-out**: a slow subscriber delays only its own
//!   notifications, never the loop or other subscribers
//! - **Pluggable storage**: the log and the store are traits; an in-memory
//!   implementation ships with the crate
//!
//! ## Quick Start
//! ```no_run
//! use std::sync::Arc;
//!
//! use docwatch::config::WatcherConfig;
//! use docwatch::storage::MemoryStore;
//! use docwatch::Watcher;
//!
//! #[tokio::main]
//! async fn main() -> docwatch::Result<()> {
//!     let store = Arc::new(MemoryStore::new(10_000));
//!     let config = Arc::new(WatcherConfig::new()?.validate()?);
//!     let watcher = Watcher::spawn(store.clone(), store.clone(), config);
//!
//!     let (sink, mut changes) = tokio::sync::mpsc::channel(1);
//!     watcher.watch("machines", "0", -1, sink).await?;
//!
//!     while let Some(change) = changes.recv().await {
//!         println!("{}/{} is now at revno {}", change.collection, change.id, change.revno);
//!     }
//!     watcher.stop().await
//! }
//! ```

pub mod config;
pub mod storage;
pub mod watch;

mod constants;
mod errors;
mod types;

pub use errors::*;
pub use types::*;
pub use watch::Liveness;
pub use watch::Watcher;

//-----------------------------------------------------------
// Test utils
#[cfg(test)]
#[doc(hidden)]
pub mod test_utils;
