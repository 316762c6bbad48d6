//! Configuration management for the change watcher.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Environment variable overrides
//! - Configuration file support
//! - Component-wise validation
mod poll;
pub use poll::*;

#[cfg(test)]
mod config_test;

use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Main configuration container for the watcher.
///
/// Configuration sources are merged in the following order (later sources
/// override earlier ones):
/// 1. Type defaults (lowest priority)
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables with `WATCHER__` prefix (highest priority)
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct WatcherConfig {
    /// Periodic polling parameters
    #[serde(default)]
    pub poll: PollConfig,
}

impl WatcherConfig {
    /// Creates a new configuration with hierarchical override support.
    ///
    /// This method does NOT validate the configuration; call `validate()`
    /// before using it.
    ///
    /// # Examples
    /// ```ignore
    /// // Load with default values only
    /// let cfg = WatcherConfig::new()?.validate()?;
    ///
    /// // Load with config file and environment variables
    /// std::env::set_var("CONFIG_PATH", "config/watcher.toml");
    /// std::env::set_var("WATCHER__POLL__INTERVAL_MS", "250");
    /// let cfg = WatcherConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("WATCHER")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validates all watcher configuration sections.
    pub fn validate(self) -> Result<Self> {
        self.poll.validate()?;
        Ok(self)
    }
}
