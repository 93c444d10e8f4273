//! Plugin managers shipped with the CLI

use super::manifest::{ManifestPlugin, MANIFEST_FILE};
use super::model::{CachedCommand, CachedPlugin, CachedTopic, Group};
use super::source::{Manager, PluginKind, PluginSource};
use crate::error::{PlugcacheError, PlugcacheResult};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

/// Cache key of the builtin plugin
pub const BUILTIN_PATH: &str = "builtin";

/// The CLI's own commands, exposed as a plugin like any other
#[derive(Debug, Clone)]
pub struct BuiltinPlugin {
    path: PathBuf,
    version: String,
}

impl BuiltinPlugin {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            path: PathBuf::from(BUILTIN_PATH),
            version: version.into(),
        }
    }
}

fn builtin_command(topic: &str, command: Option<&str>, description: &str) -> CachedCommand {
    let id = match command {
        Some(command) => format!("{}:{}", topic, command),
        None => topic.to_string(),
    };
    CachedCommand {
        id,
        topic: topic.to_string(),
        command: command.map(str::to_string),
        description: Some(description.to_string()),
        group: "system".to_string(),
        ..CachedCommand::default()
    }
}

#[async_trait]
impl PluginSource for BuiltinPlugin {
    fn path(&self) -> &Path {
        &self.path
    }

    fn kind(&self) -> PluginKind {
        PluginKind::Builtin
    }

    async fn convert_to_cached(&self) -> PlugcacheResult<CachedPlugin> {
        let commands = vec![
            builtin_command("commands", None, "List all available commands"),
            builtin_command("topics", None, "List topics or the subtopics of one"),
            builtin_command("which", None, "Show which plugin provides a command"),
            builtin_command("cache", Some("path"), "Print the plugin cache location"),
            builtin_command("cache", Some("show"), "Print the plugin cache contents"),
            builtin_command("cache", Some("clear"), "Drop cached plugin metadata"),
            builtin_command("locks", None, "Show holders of the cache lock"),
            builtin_command("config", Some("path"), "Print the config file location"),
            builtin_command("config", Some("show"), "Print the effective configuration"),
            builtin_command("config", Some("init"), "Write a default config file"),
        ];
        let topics = ["cache", "config"]
            .into_iter()
            .map(|id| CachedTopic {
                id: id.to_string(),
                topic: id.to_string(),
                description: None,
                hidden: false,
                group: "system".to_string(),
            })
            .collect();

        Ok(CachedPlugin {
            name: "builtin".to_string(),
            path: self.path.clone(),
            version: self.version.clone(),
            commands,
            topics,
            groups: vec![Group {
                key: "system".to_string(),
                name: "System".to_string(),
                deprecated: false,
            }],
        })
    }
}

/// Lists the builtin plugin
#[derive(Debug, Clone)]
pub struct BuiltinManager {
    plugin: Arc<BuiltinPlugin>,
}

impl BuiltinManager {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            plugin: Arc::new(BuiltinPlugin::new(version)),
        }
    }
}

#[async_trait]
impl Manager for BuiltinManager {
    fn name(&self) -> &str {
        "builtin"
    }

    async fn list(&self) -> PlugcacheResult<Vec<Arc<dyn PluginSource>>> {
        Ok(vec![self.plugin.clone() as Arc<dyn PluginSource>])
    }
}

/// Plugins installed as subdirectories of one or more plugin roots
///
/// Every subdirectory holding a `plugin.json` is a plugin. Roots are listed
/// in order and entries inside a root by name, so precedence is stable.
#[derive(Debug, Clone)]
pub struct DirectoryManager {
    name: String,
    roots: Vec<PathBuf>,
    kind: PluginKind,
}

impl DirectoryManager {
    pub fn new(name: impl Into<String>, roots: Vec<PathBuf>, kind: PluginKind) -> Self {
        Self {
            name: name.into(),
            roots,
            kind,
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    async fn plugin_dirs(root: &Path) -> PlugcacheResult<Vec<PathBuf>> {
        let mut entries = match fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Plugin root {} does not exist", root.display());
                return Ok(vec![]);
            }
            Err(e) => {
                return Err(PlugcacheError::io(
                    format!("reading plugin root {}", root.display()),
                    e,
                ))
            }
        };

        let mut dirs = vec![];
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PlugcacheError::io("reading plugin root entry", e))?
        {
            let path = entry.path();
            if path.join(MANIFEST_FILE).is_file() {
                dirs.push(path);
            }
        }
        dirs.sort();
        Ok(dirs)
    }
}

#[async_trait]
impl Manager for DirectoryManager {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list(&self) -> PlugcacheResult<Vec<Arc<dyn PluginSource>>> {
        let mut sources: Vec<Arc<dyn PluginSource>> = vec![];
        for root in &self.roots {
            for dir in Self::plugin_dirs(root).await? {
                let dir = std::path::absolute(&dir)
                    .map_err(|e| PlugcacheError::io(format!("resolving {}", dir.display()), e))?;
                sources.push(Arc::new(ManifestPlugin::new(dir, self.kind)));
            }
        }
        Ok(sources)
    }

    async fn handle_node_version_change(&self) -> PlugcacheResult<()> {
        info!(
            "Runtime changed; {} plugins will be re-read from {} root(s)",
            self.name,
            self.roots.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn install(root: &Path, dir: &str, name: &str) {
        let path = root.join(dir);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(
            path.join(MANIFEST_FILE),
            serde_json::json!({"name": name, "version": "1.0.0", "commands": []}).to_string(),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn lists_manifest_dirs_in_order() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        install(first.path(), "zeta", "zeta");
        install(first.path(), "alpha", "alpha");
        install(second.path(), "beta", "beta");
        std::fs::create_dir_all(first.path().join("not-a-plugin")).unwrap();

        let manager = DirectoryManager::new(
            "user",
            vec![
                first.path().to_path_buf(),
                second.path().to_path_buf(),
                first.path().join("missing"),
            ],
            PluginKind::User,
        );
        let sources = manager.list().await.unwrap();

        let names: Vec<_> = sources
            .iter()
            .map(|s| s.path().file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["alpha", "zeta", "beta"]);
        assert!(sources.iter().all(|s| s.path().is_absolute()));
        assert!(sources.iter().all(|s| s.kind() == PluginKind::User));
    }

    #[tokio::test]
    async fn builtin_describes_cli_commands() {
        let manager = BuiltinManager::new("0.3.0");
        let sources = manager.list().await.unwrap();
        assert_eq!(sources.len(), 1);
        assert!(sources[0].kind().is_builtin());

        let plugin = sources[0].convert_to_cached().await.unwrap();
        assert_eq!(plugin.version, "0.3.0");
        assert!(plugin.commands.iter().any(|c| c.id == "cache:clear"));
        assert!(plugin.topics.iter().any(|t| t.id == "cache"));
    }
}
