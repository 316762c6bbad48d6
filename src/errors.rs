//! Change Watcher Error Hierarchy
//!
//! Defines error types for the watcher, categorized by operational concern:
//! infrastructure failures against the backing store, configuration
//! validation failures, caller-facing subscription errors, and unrecoverable
//! conditions that terminate the watcher loop.

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (log reads, document lookups)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Configuration loading failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Caller-facing subscription and lifecycle errors
    #[error(transparent)]
    Watch(#[from] WatchError),

    /// Configuration validation failures
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Unrecoverable failures; the watcher loop terminates with this error
    #[error("Fatal error: {0}")]
    Fatal(String),
}

/// Failures while talking to the external store. These are transient: the
/// watcher logs them and retries on the next cycle.
#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error("change log read failed: {0}")]
    LogRead(String),

    #[error("document lookup failed: {0}")]
    DocumentLookup(String),
}

/// Errors reported to callers of the watcher handle.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Sentinel returned by `Watcher::err` while the loop is running
    #[error("watcher is still alive")]
    StillAlive,

    /// The watcher loop has exited; no further commands are accepted
    #[error("watcher has stopped")]
    Stopped,

    /// `known_revno` below -1 makes no sense; -1 already means "absent"
    #[error("revno {0} is invalid, the lowest valid revno is -1")]
    InvalidRevno(i64),
}

impl Error {
    /// Fatal errors terminate the watcher loop; everything else is retried
    /// or reported to the caller.
    pub(crate) fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal(_))
    }

    /// True when this is the `Watcher::err` liveness sentinel.
    pub fn is_still_alive(&self) -> bool {
        matches!(self, Error::Watch(WatchError::StillAlive))
    }
}
