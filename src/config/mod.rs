//! Configuration management for plugcache

pub mod schema;

pub use schema::Config;

use crate::error::{PlugcacheError, PlugcacheResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Environment variable overriding the cache directory
pub const CACHE_DIR_ENV: &str = "PLUGCACHE_CACHE_DIR";

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "PLUGCACHE_CONFIG";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("plugcache")
            .join("config.toml")
    }

    /// Cache directory: environment override, then config, then platform default
    pub fn cache_dir(config: &Config) -> PathBuf {
        if let Some(dir) = std::env::var_os(CACHE_DIR_ENV).filter(|v| !v.is_empty()) {
            return PathBuf::from(dir);
        }
        if let Some(dir) = &config.cache.dir {
            return dir.clone();
        }
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("plugcache")
    }

    /// Default root for user-installed plugins
    pub fn plugins_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("plugcache")
            .join("plugins")
    }

    /// Every plugin root, default first
    pub fn plugin_dirs(config: &Config) -> Vec<PathBuf> {
        let mut dirs = vec![Self::plugins_dir()];
        for dir in &config.plugins.dirs {
            if !dirs.contains(dir) {
                dirs.push(dir.clone());
            }
        }
        dirs
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> PlugcacheResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> PlugcacheResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| PlugcacheError::io(format!("reading config from {}", path.display()), e))?;

        let config: Config = toml::from_str(&content).map_err(|e| PlugcacheError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if config.lock.poll_interval_ms == 0 {
            return Err(PlugcacheError::ConfigInvalid {
                path: path.to_path_buf(),
                reason: "lock.poll_interval_ms must be greater than zero".to_string(),
            });
        }
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> PlugcacheResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            PlugcacheError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> PlugcacheResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| PlugcacheError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::DrainPolicy;
    use serial_test::serial;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_default_when_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nonexistent.toml");
        let manager = ConfigManager::with_path(path);

        let config = manager.load().await.unwrap();
        assert_eq!(config, Config::default());
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");
        let manager = ConfigManager::with_path(path);

        let mut config = Config::default();
        config.lock.drain = DrainPolicy::Snapshot;
        config.cache.runtime_version = Some("v20".to_string());

        manager.save(&config).await.unwrap();
        let loaded = manager.load().await.unwrap();

        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn invalid_file_is_reported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[lock]\ndrain = \"sometimes\"\n").unwrap();

        let err = ConfigManager::with_path(path).load().await.unwrap_err();
        assert!(matches!(err, PlugcacheError::ConfigInvalid { .. }));
    }

    #[tokio::test]
    async fn zero_poll_interval_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[lock]\npoll_interval_ms = 0\n").unwrap();

        let err = ConfigManager::with_path(path).load().await.unwrap_err();
        assert!(err.to_string().contains("poll_interval_ms"));
    }

    #[test]
    #[serial]
    fn cache_dir_precedence() {
        let mut config = Config::default();
        config.cache.dir = Some(PathBuf::from("/from/config"));

        std::env::set_var(CACHE_DIR_ENV, "/from/env");
        assert_eq!(ConfigManager::cache_dir(&config), PathBuf::from("/from/env"));

        std::env::remove_var(CACHE_DIR_ENV);
        assert_eq!(ConfigManager::cache_dir(&config), PathBuf::from("/from/config"));

        config.cache.dir = None;
        assert!(ConfigManager::cache_dir(&config).ends_with("plugcache"));
    }

    #[test]
    fn plugin_dirs_start_with_default() {
        let mut config = Config::default();
        config.plugins.dirs = vec![PathBuf::from("/opt/plugins"), ConfigManager::plugins_dir()];

        let dirs = ConfigManager::plugin_dirs(&config);
        assert_eq!(
            dirs,
            vec![ConfigManager::plugins_dir(), PathBuf::from("/opt/plugins")]
        );
    }
}
