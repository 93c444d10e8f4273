//! Per-invocation use of the plugin cache
//!
//! A command registers as a reader of the cache lock for as long as it works
//! with plugin metadata, so a concurrent rebuild waits for it to finish.
//! [`ExitCleanup`] is the backstop for every path that skips
//! [`CommandSession::finish`].

use crate::error::PlugcacheResult;
use crate::lock::{LockManager, ReadLock, ReadOptions};
use crate::plugin::{PluginCache, Plugins};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// One command's reader registration on the cache lock
pub struct CommandSession {
    registration: ReadLock,
    plugins: Plugins,
}

impl CommandSession {
    /// Register as a reader of the cache lock guarding `plugins`
    pub async fn begin(
        locks: &LockManager,
        plugins: Plugins,
        timeout: Option<Duration>,
    ) -> PlugcacheResult<Self> {
        let lock_path = plugins.cache().settings().lock_path();
        let options = ReadOptions { timeout };
        let registration = locks.read(&lock_path, options).await?;
        debug!(pid = locks.pid(), "Session registered on {}", lock_path.display());
        Ok(Self {
            registration,
            plugins,
        })
    }

    pub fn lock_path(&self) -> &Path {
        self.registration.path()
    }

    /// Plugins, loaded through the cache on first use
    pub async fn plugins(&mut self) -> PlugcacheResult<&Plugins> {
        self.plugins.load().await?;
        Ok(&self.plugins)
    }

    pub fn cache_mut(&mut self) -> &mut PluginCache {
        self.plugins.cache_mut()
    }

    /// Drop the reader registration
    pub async fn finish(mut self) -> PlugcacheResult<()> {
        let path: PathBuf = self.lock_path().to_path_buf();
        self.registration.release().await?;
        debug!("Session finished on {}", path.display());
        Ok(())
    }
}

/// Releases every lock and registration of a manager when dropped
#[derive(Debug)]
pub struct ExitCleanup {
    locks: LockManager,
}

impl ExitCleanup {
    pub fn new(locks: LockManager) -> Self {
        Self { locks }
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }
}

impl Drop for ExitCleanup {
    fn drop(&mut self) {
        self.locks.dispose_all();
    }
}
