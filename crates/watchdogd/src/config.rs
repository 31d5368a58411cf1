//! Daemon configuration.
//!
//! Loaded once at startup from an optional TOML file. Every field has a
//! default, so an empty file (or no file) is a valid configuration.
//!
//! ```toml
//! listen = "0.0.0.0:7070"
//! clean_interval_secs = 60
//! clean_bound_secs = 60
//! alert_queue_capacity = 10
//! alert_send_timeout_ms = 5000
//! notify_command = ["/usr/local/bin/page-oncall", "--team", "infra"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::server::DEFAULT_LISTEN_ADDR;
use crate::watcher::{ALERT_QUEUE_CAPACITY, ALERT_SEND_TIMEOUT, CLEAN_INTERVAL};

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {error}")]
    Read { path: PathBuf, error: String },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Watcher daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatcherConfig {
    /// Address the request listener binds to.
    pub listen: String,

    /// Seconds between sweeps.
    pub clean_interval_secs: u64,

    /// Nodes silent for longer than this many seconds are swept.
    pub clean_bound_secs: u64,

    /// Capacity of the alert hand-off queue.
    pub alert_queue_capacity: usize,

    /// How long an alert waits for queue space before being dropped.
    pub alert_send_timeout_ms: u64,

    /// External program (and arguments) invoked for every alert.
    pub notify_command: Option<Vec<String>>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN_ADDR.to_string(),
            clean_interval_secs: CLEAN_INTERVAL.as_secs(),
            clean_bound_secs: CLEAN_INTERVAL.as_secs(),
            alert_queue_capacity: ALERT_QUEUE_CAPACITY,
            alert_send_timeout_ms: u64::try_from(ALERT_SEND_TIMEOUT.as_millis()).unwrap_or(5000),
            notify_command: None,
        }
    }
}

impl WatcherConfig {
    /// Reads and validates a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parses and validates TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.trim().is_empty() {
            return Err(ConfigError::Invalid("listen address is empty".to_string()));
        }
        if self.clean_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "clean_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.alert_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "alert_queue_capacity must be at least 1".to_string(),
            ));
        }
        if matches!(&self.notify_command, Some(argv) if argv.is_empty()) {
            return Err(ConfigError::Invalid(
                "notify_command needs at least a program".to_string(),
            ));
        }
        Ok(())
    }

    pub fn clean_interval(&self) -> Duration {
        Duration::from_secs(self.clean_interval_secs)
    }

    pub fn clean_bound(&self) -> Duration {
        Duration::from_secs(self.clean_bound_secs)
    }

    pub fn alert_send_timeout(&self) -> Duration {
        Duration::from_millis(self.alert_send_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = WatcherConfig::from_toml_str("").unwrap();
        assert_eq!(config, WatcherConfig::default());
        assert_eq!(config.listen, DEFAULT_LISTEN_ADDR);
        assert_eq!(config.clean_interval(), Duration::from_secs(60));
        assert_eq!(config.alert_send_timeout(), Duration::from_secs(5));
        assert_eq!(config.alert_queue_capacity, 10);
    }

    #[test]
    fn test_partial_override() {
        let config = WatcherConfig::from_toml_str(
            "listen = \"127.0.0.1:9000\"\nclean_bound_secs = 300\nnotify_command = [\"notify-send\", \"watchdog\"]\n",
        )
        .unwrap();
        assert_eq!(config.listen, "127.0.0.1:9000");
        assert_eq!(config.clean_bound(), Duration::from_secs(300));
        assert_eq!(config.clean_interval_secs, 60);
        assert_eq!(
            config.notify_command,
            Some(vec!["notify-send".to_string(), "watchdog".to_string()])
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = WatcherConfig::from_toml_str("smtp_server = \"mail\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)), "got {err:?}");
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            WatcherConfig::from_toml_str("clean_interval_secs = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            WatcherConfig::from_toml_str("alert_queue_capacity = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            WatcherConfig::from_toml_str("notify_command = []"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "clean_interval_secs = 5").unwrap();

        let config = WatcherConfig::load(file.path()).unwrap();
        assert_eq!(config.clean_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_load_missing_file() {
        let err = WatcherConfig::load(Path::new("/nonexistent/watchdogd.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/watchdogd.toml"));
    }
}
