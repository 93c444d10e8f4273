//! Versioned plugin metadata cache
//!
//! Backed by `plugins.json` in the cache directory and coordinated across
//! processes through the `update.lock` reader/writer lock.
//!
//! The cache is only trusted when it was written by the same CLI release and
//! under the same host runtime version:
//!
//! | Mismatch | Effect |
//! |----------|--------|
//! | CLI version | plugin map discarded on load |
//! | runtime version | exclusive rebuild through the managers before any fetch |

use super::model::{CacheData, CachedPlugin};
use super::source::{Manager, PluginSource};
use crate::error::{PlugcacheError, PlugcacheResult};
use crate::lock::LockManager;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, warn};

/// File name of the cache inside the cache directory
pub const CACHE_FILE: &str = "plugins.json";

/// Lock path guarding the cache inside the cache directory
pub const LOCK_FILE: &str = "update.lock";

/// Environment variable forcing the cache to be discarded on load
pub const CLEAR_CACHE_ENV: &str = "PLUGCACHE_CLEAR_CACHE";

/// Everything the cache needs to know about the running CLI
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Directory holding `plugins.json` and `update.lock`
    pub dir: PathBuf,
    /// Release of the running CLI
    pub cli_version: String,
    /// Version of the host runtime plugins are built against
    pub runtime_version: String,
    /// Discard cached plugins on load regardless of version
    pub force_clear: bool,
    /// Bound on the writer-lock wait during a rebuild; manager default when unset
    pub lock_timeout: Option<Duration>,
}

impl CacheSettings {
    pub fn new(
        dir: impl Into<PathBuf>,
        cli_version: impl Into<String>,
        runtime_version: impl Into<String>,
    ) -> Self {
        Self {
            dir: dir.into(),
            cli_version: cli_version.into(),
            runtime_version: runtime_version.into(),
            force_clear: clear_requested_by_env(),
            lock_timeout: None,
        }
    }

    pub fn cache_file(&self) -> PathBuf {
        self.dir.join(CACHE_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }
}

/// Whether the environment asks for a cache clear
pub fn clear_requested_by_env() -> bool {
    std::env::var_os(CLEAR_CACHE_ENV).is_some_and(|v| !v.is_empty())
}

/// A plugin that survived name de-duplication in [`PluginCache::fetch_managers`]
#[derive(Clone)]
pub struct LoadedPlugin {
    pub source: Arc<dyn PluginSource>,
    pub cached: CachedPlugin,
    /// Name of the manager that listed it
    pub manager: String,
}

impl std::fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("path", &self.source.path())
            .field("kind", &self.source.kind())
            .field("name", &self.cached.name)
            .field("manager", &self.manager)
            .finish()
    }
}

/// Per-process view of the plugin cache
///
/// Loaded lazily on first access, mutated in memory and written back at most
/// once per [`PluginCache::fetch_managers`], and only when something changed.
#[derive(Debug)]
pub struct PluginCache {
    settings: CacheSettings,
    locks: LockManager,
    data: Option<CacheData>,
    dirty: bool,
}

impl PluginCache {
    pub fn new(settings: CacheSettings, locks: LockManager) -> Self {
        Self {
            settings,
            locks,
            data: None,
            dirty: false,
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn file(&self) -> PathBuf {
        self.settings.cache_file()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The cache contents, loading them on first access
    ///
    /// A missing file starts an empty cache. A file that is not valid JSON is
    /// logged and replaced on the next save. A cache written by another CLI
    /// release, or any cache while a clear is forced, has its plugins
    /// dropped; the recorded runtime version is kept.
    pub async fn load(&mut self) -> PlugcacheResult<&mut CacheData> {
        if self.data.is_none() {
            let data = self.read_from_disk().await?;
            self.data = Some(data);
        }
        self.data
            .as_mut()
            .ok_or_else(|| PlugcacheError::Internal("plugin cache not loaded".to_string()))
    }

    async fn read_from_disk(&self) -> PlugcacheResult<CacheData> {
        let file = self.file();
        let mut data = match fs::read_to_string(&file).await {
            Ok(content) => match serde_json::from_str::<CacheData>(&content) {
                Ok(data) => data,
                Err(e) => {
                    warn!("Ignoring unreadable plugin cache {}: {}", file.display(), e);
                    CacheData::new(&self.settings.cli_version)
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No plugin cache at {}", file.display());
                CacheData::new(&self.settings.cli_version)
            }
            Err(e) => {
                return Err(PlugcacheError::io(
                    format!("reading plugin cache {}", file.display()),
                    e,
                ))
            }
        };

        if data.version != self.settings.cli_version {
            info!(
                "Plugin cache written by {} (running {}), clearing",
                data.version, self.settings.cli_version
            );
            Self::reset(&mut data, &self.settings.cli_version);
        } else if self.settings.force_clear {
            info!("Plugin cache clear forced");
            Self::reset(&mut data, &self.settings.cli_version);
        }
        Ok(data)
    }

    fn reset(data: &mut CacheData, cli_version: &str) {
        data.version = cli_version.to_string();
        data.plugins.clear();
    }

    /// Drop every cached plugin, keeping the recorded runtime version
    pub async fn clear(&mut self) -> PlugcacheResult<()> {
        let version = self.settings.cli_version.clone();
        let data = self.load().await?;
        Self::reset(data, &version);
        self.dirty = true;
        Ok(())
    }

    /// Cached metadata for the plugin at `path`
    pub async fn plugin(&mut self, path: &Path) -> PlugcacheResult<Option<CachedPlugin>> {
        Ok(self.load().await?.plugins.get(path).cloned())
    }

    /// Insert or replace the metadata for `path`; written on the next save
    pub async fn update_plugin(&mut self, path: &Path, plugin: CachedPlugin) -> PlugcacheResult<()> {
        self.load().await?.plugins.insert(path.to_path_buf(), plugin);
        self.dirty = true;
        Ok(())
    }

    /// Remove plugins and write the cache immediately
    pub async fn delete_plugin(&mut self, paths: &[PathBuf]) -> PlugcacheResult<()> {
        let data = self.load().await?;
        for path in paths {
            if data.plugins.remove(path).is_some() {
                debug!("Removed {} from plugin cache", path.display());
            }
        }
        self.dirty = true;
        self.save().await;
        Ok(())
    }

    /// Metadata for one plugin, parsing it only on a cache miss
    ///
    /// A failing builtin plugin is an error. Any other plugin gets one repair
    /// attempt and one retry, then degrades to an empty placeholder so a
    /// single broken plugin cannot take the whole command surface down.
    pub async fn fetch(&mut self, source: &dyn PluginSource) -> PlugcacheResult<CachedPlugin> {
        let path = source.path();
        if let Some(cached) = self.plugin(path).await? {
            return Ok(cached);
        }

        debug!("Parsing {} plugin {}", source.kind(), path.display());
        let err = match source.convert_to_cached().await {
            Ok(plugin) => return self.store(path, plugin).await,
            Err(e) if source.kind().is_builtin() => return Err(e),
            Err(e) => e,
        };

        let err = if source.repair(&err).await {
            debug!("Repaired plugin {}, parsing again", path.display());
            match source.convert_to_cached().await {
                Ok(plugin) => return self.store(path, plugin).await,
                Err(e) => e,
            }
        } else {
            err
        };

        warn!("Error parsing plugin {}: {}", path.display(), err);
        self.store(path, CachedPlugin::placeholder(path)).await
    }

    async fn store(&mut self, path: &Path, plugin: CachedPlugin) -> PlugcacheResult<CachedPlugin> {
        self.update_plugin(path, plugin.clone()).await?;
        Ok(plugin)
    }

    /// Load every manager's plugins, rebuilding first if the runtime changed
    ///
    /// Managers are consulted in order and the first plugin to claim a name
    /// wins. Must be called by a registered reader of the cache lock (or by a
    /// process that holds no registration at all); the rebuild temporarily
    /// trades that registration for the writer lock.
    pub async fn fetch_managers(
        &mut self,
        managers: &[Arc<dyn Manager>],
    ) -> PlugcacheResult<Vec<LoadedPlugin>> {
        let runtime = self.settings.runtime_version.clone();
        let recorded = self.load().await?.runtime_version.clone();
        if recorded.as_deref() != Some(runtime.as_str()) {
            info!(
                "Runtime changed ({} -> {}), rebuilding plugins",
                recorded.as_deref().unwrap_or("none"),
                runtime
            );
            self.rebuild(managers).await?;
            self.load().await?.runtime_version = Some(runtime);
            self.dirty = true;
        }

        let mut plugins: Vec<LoadedPlugin> = Vec::new();
        let mut names = HashSet::new();
        for manager in managers {
            for source in manager.list().await? {
                let cached = self.fetch(&*source).await?;
                if !names.insert(cached.name.clone()) {
                    debug!(
                        "Skipping {} from {}: name {} already loaded",
                        source.path().display(),
                        manager.name(),
                        cached.name
                    );
                    continue;
                }
                plugins.push(LoadedPlugin {
                    source,
                    cached,
                    manager: manager.name().to_string(),
                });
            }
        }

        self.save().await;
        Ok(plugins)
    }

    async fn rebuild(&mut self, managers: &[Arc<dyn Manager>]) -> PlugcacheResult<()> {
        let lock_path = self.settings.lock_path();
        let upgrade = self
            .locks
            .upgrade(&lock_path, self.settings.lock_timeout)
            .await?;

        let mut outcome = Ok(());
        for manager in managers {
            debug!("Runtime change hook for {}", manager.name());
            if let Err(e) = manager.handle_node_version_change().await {
                outcome = Err(e);
                break;
            }
        }

        upgrade.downgrade().await?;
        outcome
    }

    /// Write the cache if anything changed; failures are logged, not returned
    pub async fn save(&mut self) {
        if !self.dirty {
            return;
        }
        let Some(data) = self.data.as_ref() else {
            return;
        };

        match write_atomically(&self.settings.dir, &self.file(), data).await {
            Ok(()) => {
                self.dirty = false;
                debug!("Saved plugin cache {}", self.file().display());
            }
            Err(e) => warn!("Failed to save plugin cache: {}", e),
        }
    }
}

async fn write_atomically(dir: &Path, file: &Path, data: &CacheData) -> PlugcacheResult<()> {
    fs::create_dir_all(dir)
        .await
        .map_err(|e| PlugcacheError::io(format!("creating cache dir {}", dir.display()), e))?;

    let content = serde_json::to_string_pretty(data)?;
    let tmp = dir.join(format!(".{}.{}.tmp", CACHE_FILE, std::process::id()));
    fs::write(&tmp, content)
        .await
        .map_err(|e| PlugcacheError::io(format!("writing {}", tmp.display()), e))?;
    if let Err(e) = fs::rename(&tmp, file).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(PlugcacheError::io(format!("replacing {}", file.display()), e));
    }
    Ok(())
}
