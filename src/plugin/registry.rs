//! Command lookup over the loaded plugins

use super::cache::{LoadedPlugin, PluginCache};
use super::model::{CachedCommand, CachedTopic};
use super::source::Manager;
use crate::error::PlugcacheResult;
use std::collections::HashSet;
use std::sync::Arc;

/// All plugins of this CLI, loaded once through the cache
pub struct Plugins {
    cache: PluginCache,
    managers: Vec<Arc<dyn Manager>>,
    plugins: Vec<LoadedPlugin>,
    loaded: bool,
}

impl Plugins {
    /// Managers are consulted in the given order; earlier ones win name clashes
    pub fn new(cache: PluginCache, managers: Vec<Arc<dyn Manager>>) -> Self {
        Self {
            cache,
            managers,
            plugins: vec![],
            loaded: false,
        }
    }

    pub async fn load(&mut self) -> PlugcacheResult<()> {
        if self.loaded {
            return Ok(());
        }
        self.plugins = self.cache.fetch_managers(&self.managers).await?;
        self.loaded = true;
        Ok(())
    }

    /// Plugins loaded so far; empty before [`Plugins::load`]
    pub fn loaded(&self) -> &[LoadedPlugin] {
        &self.plugins
    }

    pub fn cache(&self) -> &PluginCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut PluginCache {
        &mut self.cache
    }

    pub fn is_plugin_installed(&self, name: &str) -> bool {
        self.plugins.iter().any(|p| p.cached.name == name)
    }

    /// Every command of every loaded plugin
    pub fn commands(&self) -> Vec<&CachedCommand> {
        self.plugins
            .iter()
            .flat_map(|p| p.cached.commands.iter())
            .collect()
    }

    /// First command answering to `id`, by id or alias
    pub fn find_command(&self, id: &str) -> Option<(&LoadedPlugin, &CachedCommand)> {
        self.plugins.iter().find_map(|plugin| {
            plugin
                .cached
                .commands
                .iter()
                .find(|c| c.answers_to(id))
                .map(|c| (plugin, c))
        })
    }

    pub fn find_plugin_with_command(&self, id: &str) -> Option<&LoadedPlugin> {
        self.find_command(id).map(|(plugin, _)| plugin)
    }

    pub fn find_topic(&self, id: &str) -> Option<&CachedTopic> {
        if id.is_empty() {
            return None;
        }
        self.plugins
            .iter()
            .find_map(|p| p.cached.topics.iter().find(|t| t.id == id))
    }

    /// Topics below `id` in the first plugin that declares `id`
    pub fn subtopics_for_topic(&self, id: &str) -> Option<Vec<&CachedTopic>> {
        if id.is_empty() {
            return None;
        }
        let prefix = format!("{}:", id);
        let plugin = self
            .plugins
            .iter()
            .find(|p| p.cached.topics.iter().any(|t| t.id == id))?;
        Some(
            plugin
                .cached
                .topics
                .iter()
                .filter(|t| t.id.starts_with(&prefix))
                .collect(),
        )
    }

    /// Commands in `topic` across all plugins, first occurrence of an id wins
    pub fn commands_for_topic(&self, topic: &str) -> Vec<&CachedCommand> {
        let mut seen = HashSet::new();
        self.commands()
            .into_iter()
            .filter(|c| c.topic == topic)
            .filter(|c| seen.insert(c.id.clone()))
            .collect()
    }

    /// Visible top-level topics across all plugins, deduplicated by id
    pub fn root_topics(&self) -> Vec<&CachedTopic> {
        let mut seen = HashSet::new();
        self.plugins
            .iter()
            .flat_map(|p| p.cached.topics.iter())
            .filter(|t| !t.hidden && !t.id.contains(':'))
            .filter(|t| seen.insert(t.id.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::{FastClock, LockManager};
    use crate::plugin::cache::CacheSettings;
    use crate::plugin::manifest::MANIFEST_FILE;
    use crate::plugin::managers::{BuiltinManager, DirectoryManager};
    use crate::plugin::source::PluginKind;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    fn install(root: &Path, dir: &str, manifest: serde_json::Value) {
        let path = root.join(dir);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join(MANIFEST_FILE), manifest.to_string()).unwrap();
    }

    async fn loaded(root: &Path, cache_dir: &Path) -> Plugins {
        let settings = CacheSettings {
            dir: cache_dir.to_path_buf(),
            cli_version: "0.3.0".to_string(),
            runtime_version: "test".to_string(),
            force_clear: false,
            lock_timeout: None,
        };
        let locks = LockManager::builder()
            .clock(Arc::new(FastClock::new(Duration::ZERO)))
            .build();
        let managers: Vec<Arc<dyn Manager>> = vec![
            Arc::new(BuiltinManager::new("0.3.0")),
            Arc::new(DirectoryManager::new(
                "user",
                vec![root.to_path_buf()],
                PluginKind::User,
            )),
        ];
        let mut plugins = Plugins::new(PluginCache::new(settings, locks), managers);
        plugins.load().await.unwrap();
        plugins
    }

    #[tokio::test]
    async fn lookups_across_plugins() {
        let root = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        install(
            root.path(),
            "db",
            serde_json::json!({
                "name": "db",
                "version": "1.0.0",
                "topics": [{"topic": "db", "subtopics": {"migrate": {}}}],
                "commands": [
                    {"topic": "db", "command": "pull", "aliases": ["pull"]},
                    {"topic": "db:migrate", "command": "up"}
                ]
            }),
        );
        install(
            root.path(),
            "dup",
            serde_json::json!({
                "name": "db",
                "version": "9.9.9",
                "commands": [{"topic": "db", "command": "pull"}]
            }),
        );

        let plugins = loaded(root.path(), cache.path()).await;

        assert!(plugins.is_plugin_installed("db"));
        assert!(plugins.is_plugin_installed("builtin"));

        let (plugin, command) = plugins.find_command("pull").unwrap();
        assert_eq!(plugin.cached.version, "1.0.0");
        assert_eq!(command.id, "db:pull");
        assert_eq!(
            plugins.find_plugin_with_command("cache:clear").unwrap().manager,
            "builtin"
        );
        assert!(plugins.find_command("nope").is_none());

        assert!(plugins.find_topic("db").is_some());
        assert!(plugins.find_topic("").is_none());

        let subtopics: Vec<_> = plugins
            .subtopics_for_topic("db")
            .unwrap()
            .into_iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(subtopics, vec!["db:migrate"]);

        let in_db: Vec<_> = plugins
            .commands_for_topic("db")
            .into_iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(in_db, vec!["db:pull"]);

        let roots: Vec<_> = plugins.root_topics().into_iter().map(|t| t.id.as_str()).collect();
        assert_eq!(roots, vec!["cache", "config", "db"]);
    }

    #[tokio::test]
    async fn second_load_uses_cache() {
        let root = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        install(
            root.path(),
            "x",
            serde_json::json!({"name": "x", "commands": [{"topic": "x"}]}),
        );

        let first = loaded(root.path(), cache.path()).await;
        assert!(first.find_command("x").is_some());

        // Cached metadata is served even after the manifest disappears
        std::fs::write(root.path().join("x").join(MANIFEST_FILE), "{}").unwrap();
        let second = loaded(root.path(), cache.path()).await;
        assert!(second.find_command("x").is_some());
    }
}
