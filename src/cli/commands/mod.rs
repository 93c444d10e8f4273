//! CLI command implementations

pub mod cache;
pub mod commands;
pub mod config;
pub mod locks;
pub mod topics;
pub mod which;

pub use cache::execute as cache;
pub use commands::execute as commands;
pub use config::execute as config;
pub use locks::execute as locks;
pub use topics::execute as topics;
pub use which::execute as which;

use crate::config::{Config, ConfigManager};
use crate::error::PlugcacheResult;
use crate::lock::LockManager;
use crate::plugin::{
    clear_requested_by_env, BuiltinManager, CacheSettings, DirectoryManager, Manager,
    PluginCache, PluginKind, Plugins,
};
use crate::session::CommandSession;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Release of this binary, recorded in `plugins.json`
pub const CLI_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything a command needs from the process it runs in
pub struct CommandContext {
    pub config: Config,
    pub config_path: PathBuf,
    pub locks: LockManager,
}

impl CommandContext {
    pub fn new(config: Config, config_path: PathBuf) -> Self {
        let locks = Self::lock_manager(&config);
        Self {
            config,
            config_path,
            locks,
        }
    }

    /// Lock manager for this process, tuned by `[lock]`
    pub fn lock_manager(config: &Config) -> LockManager {
        LockManager::builder()
            .timeout(config.lock.timeout())
            .poll_interval(config.lock.poll_interval())
            .drain(config.lock.drain)
            .build()
    }

    pub fn cache_dir(&self) -> PathBuf {
        ConfigManager::cache_dir(&self.config)
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            dir: self.cache_dir(),
            cli_version: CLI_VERSION.to_string(),
            runtime_version: self.config.cache.runtime_version(),
            force_clear: self.config.cache.clear || clear_requested_by_env(),
            lock_timeout: Some(self.config.lock.timeout()),
        }
    }

    /// Managers in precedence order: builtin first, then user plugin roots
    pub fn managers(&self) -> Vec<Arc<dyn Manager>> {
        vec![
            Arc::new(BuiltinManager::new(CLI_VERSION)),
            Arc::new(DirectoryManager::new(
                "user",
                ConfigManager::plugin_dirs(&self.config),
                PluginKind::User,
            )),
        ]
    }

    /// Register this command as a reader of the cache
    pub async fn session(&self) -> PlugcacheResult<CommandSession> {
        let cache = PluginCache::new(self.cache_settings(), self.locks.clone());
        let plugins = Plugins::new(cache, self.managers());
        CommandSession::begin(&self.locks, plugins, Some(self.config.lock.timeout())).await
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}
