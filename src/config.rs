//! Factory configuration.
//!
//! Values come from, in increasing precedence: the defaults below, an
//! optional configuration file, and `SPILLWAY_`-prefixed environment
//! variables (`SPILLWAY_COMMIT_INTERVAL=0` turns spilling off).

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, SpillError};
use crate::store::StoreOptions;

/// Queues always spill at this size; it is not configurable.
pub const SPILL_THRESHOLD_FOR_QUEUES: i64 = 128;

const DEFAULT_SPILL_THRESHOLD_FOR_SETS: i64 = 16;
const DEFAULT_COMMIT_INTERVAL: i64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SpillConfig {
    /// Sets move to disk once they hold more members than this.
    pub spill_threshold_for_sets: i64,
    /// Mutations between commits of the disk store, and the size at which
    /// maps move to disk. Zero or less disables spilling altogether.
    pub commit_interval: i64,
    /// Directory for the temporary database; the OS temp dir when unset.
    pub spill_directory: Option<PathBuf>,
    /// Overrides the platform default for memory-mapped I/O.
    pub memory_mapped: Option<bool>,
}

impl Default for SpillConfig {
    fn default() -> Self {
        Self {
            spill_threshold_for_sets: DEFAULT_SPILL_THRESHOLD_FOR_SETS,
            commit_interval: DEFAULT_COMMIT_INTERVAL,
            spill_directory: None,
            memory_mapped: None,
        }
    }
}

impl SpillConfig {
    /// Everything stays in memory.
    pub fn in_memory() -> Self {
        Self {
            commit_interval: 0,
            ..Self::default()
        }
    }
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(config::File::from(file).required(false));
        }
        let loaded: Self = builder
            .add_source(config::Environment::with_prefix("SPILLWAY").try_parsing(true))
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }
    pub fn with_spill_threshold_for_sets(mut self, threshold: i64) -> Self {
        self.spill_threshold_for_sets = threshold;
        self
    }
    pub fn with_commit_interval(mut self, interval: i64) -> Self {
        self.commit_interval = interval;
        self
    }
    pub fn with_spill_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.spill_directory = Some(directory.into());
        self
    }
    pub fn with_memory_mapped(mut self, enabled: bool) -> Self {
        self.memory_mapped = Some(enabled);
        self
    }
    pub fn spilling_enabled(&self) -> bool {
        self.commit_interval > 0
    }
    pub fn validate(&self) -> Result<()> {
        if let Some(directory) = &self.spill_directory {
            if !directory.is_dir() {
                return Err(SpillError::Config(format!(
                    "spill directory {} does not exist",
                    directory.display()
                )));
            }
        }
        Ok(())
    }
    pub fn store_options(&self) -> StoreOptions {
        let defaults = StoreOptions::default();
        StoreOptions {
            directory: self.spill_directory.clone(),
            memory_mapped: self.memory_mapped.unwrap_or(defaults.memory_mapped),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = SpillConfig::default();
        assert_eq!(config.spill_threshold_for_sets, 16);
        assert_eq!(config.commit_interval, 10_000);
        assert!(config.spilling_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_in_memory() {
        assert!(!SpillConfig::in_memory().spilling_enabled());
    }

    #[test]
    fn test_config_missing_directory() {
        let config = SpillConfig::default().with_spill_directory("/definitely/not/here/spill");
        assert!(matches!(config.validate(), Err(SpillError::Config(_))));
    }

    #[test]
    fn test_config_store_options() {
        let options = SpillConfig::default()
            .with_memory_mapped(false)
            .store_options();
        assert!(!options.memory_mapped);
        assert_eq!(options.directory, None);
    }
}
