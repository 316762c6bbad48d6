use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_POLL_INTERVAL_IN_MS;
use crate::Error;
use crate::Result;

/// Controls how often the watcher polls the transaction log on its own.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PollConfig {
    /// Interval between periodic sync cycles, in milliseconds
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,

    /// When false, the watcher never polls on its own; sync cycles run only
    /// on explicit `StartSync`/`Sync` requests. Intended for tests.
    #[serde(default = "default_periodic")]
    pub periodic: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
            periodic: default_periodic(),
        }
    }
}

impl PollConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "poll.interval_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_IN_MS
}

fn default_periodic() -> bool {
    true
}
