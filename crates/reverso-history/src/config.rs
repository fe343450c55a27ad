//! Engine configuration
//!
//! Settings are layered from an optional TOML file and `REVERSO_HISTORY_*`
//! environment variables, falling back to defaults for anything unset.

use std::path::Path;

use ::config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::checkpoint::DEFAULT_MAX_CHECKPOINTS;
use crate::error::{ConfigError, ConfigResult};
use crate::events::{DEFAULT_EVENT_CAPACITY, MAX_EVENT_CAPACITY};
use crate::store::DEFAULT_MAX_HISTORY_SIZE;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "REVERSO_HISTORY";

/// History engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Capacity of each of the undo and redo stacks
    pub max_history_size: usize,
    /// Number of retained checkpoints
    pub max_checkpoints: usize,
    /// Buffered events per subscriber
    pub event_channel_capacity: usize,
    /// Whether the engine starts enabled
    pub enabled: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        HistoryConfig {
            max_history_size: DEFAULT_MAX_HISTORY_SIZE,
            max_checkpoints: DEFAULT_MAX_CHECKPOINTS,
            event_channel_capacity: DEFAULT_EVENT_CAPACITY,
            enabled: true,
        }
    }
}

impl HistoryConfig {
    /// Load from an optional TOML file, then environment overrides
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let builder = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let loaded: HistoryConfig = builder.build()?.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Parse from a TOML string
    pub fn from_toml_str(source: &str) -> ConfigResult<Self> {
        let loaded: HistoryConfig = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Write as TOML, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        let toml = toml::to_string(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml)?;
        Ok(())
    }

    /// Reject settings the engine cannot honour
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_history_size == 0 {
            return Err(ConfigError::validation(
                "max_history_size must be greater than 0",
            ));
        }
        if self.max_checkpoints == 0 {
            return Err(ConfigError::validation(
                "max_checkpoints must be greater than 0",
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(ConfigError::validation(
                "event_channel_capacity must be greater than 0",
            ));
        }
        if self.event_channel_capacity > MAX_EVENT_CAPACITY {
            return Err(ConfigError::validation(format!(
                "event_channel_capacity must be at most {}",
                MAX_EVENT_CAPACITY
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let cfg = HistoryConfig::default();
        assert_eq!(cfg.max_history_size, 100);
        assert_eq!(cfg.max_checkpoints, 50);
        assert_eq!(cfg.event_channel_capacity, 1024);
        assert!(cfg.enabled);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial() {
        let cfg = HistoryConfig::from_toml_str("max_history_size = 10\n").unwrap();
        assert_eq!(cfg.max_history_size, 10);
        assert_eq!(cfg.max_checkpoints, 50);
    }

    #[test]
    fn test_validation_rejects_zero() {
        let err = HistoryConfig::from_toml_str("max_checkpoints = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_validation_rejects_oversized_event_channel() {
        let source = format!("event_channel_capacity = {}\n", MAX_EVENT_CAPACITY + 1);
        let err = HistoryConfig::from_toml_str(&source).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));

        let source = format!("event_channel_capacity = {}\n", MAX_EVENT_CAPACITY);
        assert!(HistoryConfig::from_toml_str(&source).is_ok());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("history.toml");
        let cfg = HistoryConfig {
            max_history_size: 7,
            max_checkpoints: 3,
            event_channel_capacity: 16,
            enabled: false,
        };
        cfg.save(&path).unwrap();

        let loaded = HistoryConfig::load(&path).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let loaded = HistoryConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, HistoryConfig::default());
    }
}
