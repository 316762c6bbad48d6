use std::time::Duration;

/// Default interval between periodic sync cycles.
pub(crate) const DEFAULT_POLL_INTERVAL_IN_MS: u64 = 5_000;

/// Deadline offset used to park the tick when periodic polling is disabled.
/// Cycles then run only on explicit `StartSync`/`Sync` requests.
pub(crate) const POLL_PARKED: Duration = Duration::from_secs(365 * 24 * 60 * 60);
