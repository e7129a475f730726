//! Persistent configuration for fludrive.
//!
//! Stored in `~/.fludrive/config.json`. The configuration holds the security
//! posture a session hands down to its platform proxy driver, and the knobs
//! of the scroll-until engine.
//!
//! # Example
//!
//! ```no_run
//! use fludrive_core::config::DriverConfig;
//!
//! // Load (returns defaults if file doesn't exist)
//! let config = DriverConfig::load();
//! println!("default frequency: {}", config.frequency);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

const CONFIG_DIR: &str = ".fludrive";
const CONFIG_FILENAME: &str = "config.json";

/// Returns the fludrive directory path (`~/.fludrive/`).
pub fn fludrive_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
}

/// Security flags a session propagates onto its proxy driver.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPolicy {
    /// Allow every insecure feature.
    #[serde(default)]
    pub relaxed_security_enabled: bool,
    /// Insecure features that stay denied even under relaxed security.
    #[serde(default)]
    pub deny_insecure: Vec<String>,
    /// Individually allowed insecure features.
    #[serde(default)]
    pub allow_insecure: Vec<String>,
}

/// What the scroll-until loop does when its condition waiter rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WaiterFailurePolicy {
    /// Treat the rejection as "not yet" and relaunch the waiter.
    #[default]
    KeepScrolling,
    /// Stop scrolling and return the rejection.
    Abort,
}

/// Driver-wide configuration, also returned as the session options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverConfig {
    #[serde(flatten)]
    pub security: SecurityPolicy,

    /// Gesture frequency used when a command does not name one.
    #[serde(default = "default_frequency")]
    pub frequency: u32,

    /// Duration of each scroll issued by the scroll-until loop.
    #[serde(default = "default_scroll_step_ms")]
    pub scroll_step_ms: u64,

    /// Pause after a failed scroll attempt before the next iteration.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default)]
    pub waiter_failure: WaiterFailurePolicy,
}

fn default_frequency() -> u32 {
    60
}

fn default_scroll_step_ms() -> u64 {
    100
}

fn default_retry_backoff_ms() -> u64 {
    100
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            security: SecurityPolicy::default(),
            frequency: default_frequency(),
            scroll_step_ms: default_scroll_step_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
            waiter_failure: WaiterFailurePolicy::default(),
        }
    }
}

impl DriverConfig {
    /// Load config from `~/.fludrive/config.json`.
    ///
    /// Returns [`Default`] if the file does not exist or cannot be parsed.
    pub fn load() -> Self {
        Self::load_from(&fludrive_dir().join(CONFIG_FILENAME)).unwrap_or_default()
    }

    /// Load config from an explicit path. Missing fields take their defaults.
    pub fn load_from(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(std::io::Error::other)
    }

    /// Save config to `~/.fludrive/config.json`.
    pub fn save(&self) -> std::io::Result<()> {
        let dir = fludrive_dir();
        std::fs::create_dir_all(&dir)?;
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(dir.join(CONFIG_FILENAME), json)
    }

    pub fn scroll_step(&self) -> Duration {
        Duration::from_millis(self.scroll_step_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = DriverConfig::default();
        assert_eq!(config.frequency, 60);
        assert_eq!(config.scroll_step(), Duration::from_millis(100));
        assert_eq!(config.waiter_failure, WaiterFailurePolicy::KeepScrolling);
        assert!(!config.security.relaxed_security_enabled);
    }

    #[test]
    fn deserialize_empty_json() {
        let loaded: DriverConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(loaded, DriverConfig::default());
    }

    #[test]
    fn security_flags_are_flattened() {
        let loaded: DriverConfig = serde_json::from_str(
            r#"{"relaxedSecurityEnabled": true, "denyInsecure": ["adb_shell"], "waiterFailure": "abort"}"#,
        )
        .unwrap();
        assert!(loaded.security.relaxed_security_enabled);
        assert_eq!(loaded.security.deny_insecure, vec!["adb_shell".to_string()]);
        assert!(loaded.security.allow_insecure.is_empty());
        assert_eq!(loaded.waiter_failure, WaiterFailurePolicy::Abort);
    }

    #[test]
    fn waiter_policy_uses_camel_case() {
        let json = serde_json::to_value(DriverConfig::default()).unwrap();
        assert_eq!(json["waiterFailure"], "keepScrolling");
        let policy: WaiterFailurePolicy = serde_json::from_str(r#""keepScrolling""#).unwrap();
        assert_eq!(policy, WaiterFailurePolicy::KeepScrolling);
        assert!(serde_json::from_str::<WaiterFailurePolicy>(r#""keep_scrolling""#).is_err());
    }

    #[test]
    fn load_from_missing_path_is_an_error() {
        let path = std::env::temp_dir().join("fludrive-no-such-config.json");
        assert!(DriverConfig::load_from(&path).is_err());
    }

    #[test]
    fn load_returns_default_for_missing_file() {
        // Should not panic whether or not a real config file exists.
        let _ = DriverConfig::load();
    }
}
