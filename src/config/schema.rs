//! Configuration schema for plugcache
//!
//! Configuration is stored at `~/.config/plugcache/config.toml`

use crate::lock::{DrainPolicy, DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache lock settings
    pub lock: LockConfig,

    /// Plugin cache settings
    pub cache: CacheConfig,

    /// Plugin discovery settings
    pub plugins: PluginsConfig,
}

/// General application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,

    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_format: "text".to_string(),
        }
    }
}

impl GeneralConfig {
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

/// Reader/writer lock settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Longest wait for a writer or for readers to drain, in milliseconds
    pub timeout_ms: u64,

    /// Sleep between lock polls, in milliseconds
    pub poll_interval_ms: u64,

    /// Which readers a writer waits for
    pub drain: DrainPolicy,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            drain: DrainPolicy::default(),
        }
    }
}

impl LockConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Plugin cache settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache directory (default: platform cache dir)
    pub dir: Option<PathBuf>,

    /// Runtime version plugins are built against (default: OS and architecture)
    pub runtime_version: Option<String>,

    /// Discard cached plugins on every load
    pub clear: bool,
}

impl CacheConfig {
    pub fn runtime_version(&self) -> String {
        self.runtime_version
            .clone()
            .unwrap_or_else(default_runtime_version)
    }
}

/// Runtime identity used when none is configured
pub fn default_runtime_version() -> String {
    format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
}

/// Plugin discovery settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Extra plugin roots, searched after the default one
    pub dirs: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [lock]
            drain = "snapshot"
            poll_interval_ms = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.lock.drain, DrainPolicy::Snapshot);
        assert_eq!(config.lock.poll_interval(), Duration::from_millis(50));
        assert_eq!(config.lock.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(config.general.log_format, "text");
        assert!(!config.cache.clear);
    }

    #[test]
    fn runtime_version_defaults_to_platform() {
        let mut cache = CacheConfig::default();
        assert_eq!(cache.runtime_version(), default_runtime_version());
        cache.runtime_version = Some("v18.0.0".to_string());
        assert_eq!(cache.runtime_version(), "v18.0.0");
    }

    #[test]
    fn json_log_format() {
        let general = GeneralConfig {
            log_format: "JSON".to_string(),
            ..GeneralConfig::default()
        };
        assert!(general.json_logs());
        assert!(!GeneralConfig::default().json_logs());
    }
}
