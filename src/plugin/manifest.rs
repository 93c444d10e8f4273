//! Plugins described by a `plugin.json` manifest
//!
//! The manifest is deserialized as-is and then normalized into cache form:
//! command ids are derived from topic and command name, `default` commands
//! gain their topic as an alias, and every topic a command lives in exists
//! (as a hidden topic if the manifest did not declare it).

use super::model::{CachedArg, CachedCommand, CachedFlag, CachedPlugin, CachedTopic, Group};
use super::source::{PluginKind, PluginSource};
use crate::error::{PlugcacheError, PlugcacheResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

/// Manifest file inside a plugin directory
pub const MANIFEST_FILE: &str = "plugin.json";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ManifestTopic {
    pub id: Option<String>,
    pub name: Option<String>,
    pub topic: Option<String>,
    pub description: Option<String>,
    pub hidden: bool,
    pub group: String,
    pub subtopics: BTreeMap<String, ManifestTopic>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ManifestCommand {
    pub id: Option<String>,
    pub topic: String,
    pub command: Option<String>,
    pub aliases: Vec<String>,
    pub args: Vec<CachedArg>,
    pub flags: BTreeMap<String, CachedFlag>,
    pub description: Option<String>,
    pub help: Option<String>,
    pub usage: Option<String>,
    pub hidden: bool,
    pub variable_args: bool,
    /// Deprecated: run this command when only the topic is given
    pub default: bool,
    pub group: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    pub commands: Option<Vec<ManifestCommand>>,
    pub topics: Vec<ManifestTopic>,
    pub groups: Vec<Group>,
}

impl Manifest {
    /// Normalize into the cached form for the plugin at `path`
    pub fn into_cached(self, path: &Path) -> PlugcacheResult<CachedPlugin> {
        let Some(commands) = self.commands else {
            return Err(PlugcacheError::plugin_parse(path, "no commands found"));
        };

        let commands: Vec<CachedCommand> = commands.into_iter().map(cache_command).collect();

        let mut topics = Vec::new();
        for topic in self.topics {
            flatten_topic(topic, None, &mut topics);
        }
        for command in &commands {
            if topics.iter().any(|t| t.id == command.topic) {
                continue;
            }
            topics.push(CachedTopic {
                id: command.topic.clone(),
                topic: command.topic.clone(),
                description: None,
                hidden: true,
                group: command.group.clone(),
            });
        }

        Ok(CachedPlugin {
            name: self.name,
            path: path.to_path_buf(),
            version: self.version,
            commands,
            topics,
            groups: self.groups,
        })
    }
}

fn command_id(command: &ManifestCommand) -> String {
    [Some(command.topic.as_str()), command.command.as_deref()]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(":")
}

fn cache_command(command: ManifestCommand) -> CachedCommand {
    let id = command
        .id
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| command_id(&command));

    let mut aliases = command.aliases;
    if command.default {
        warn!("default setting on {} is deprecated", command.topic);
        if !aliases.contains(&command.topic) {
            aliases.push(command.topic.clone());
        }
    }

    CachedCommand {
        id,
        topic: command.topic,
        command: command.command,
        aliases,
        args: command.args,
        flags: command.flags,
        description: command.description,
        help: command.help,
        usage: command.usage,
        hidden: command.hidden,
        variable_args: command.variable_args,
        group: command.group,
    }
}

fn flatten_topic(topic: ManifestTopic, prefix: Option<&str>, out: &mut Vec<CachedTopic>) {
    let own = topic
        .id
        .clone()
        .or_else(|| topic.topic.clone())
        .or_else(|| topic.name.clone())
        .unwrap_or_default();
    let id = match prefix {
        Some(prefix) => format!("{}:{}", prefix, own),
        None => own,
    };

    out.push(CachedTopic {
        id: id.clone(),
        topic: id.clone(),
        description: topic.description,
        hidden: topic.hidden,
        group: topic.group,
    });

    for (key, mut sub) in topic.subtopics {
        if sub.id.is_none() && sub.topic.is_none() && sub.name.is_none() {
            sub.id = Some(key);
        }
        flatten_topic(sub, Some(&id), out);
    }
}

/// A plugin directory holding a `plugin.json`
#[derive(Debug, Clone)]
pub struct ManifestPlugin {
    path: PathBuf,
    kind: PluginKind,
}

impl ManifestPlugin {
    pub fn new(path: impl Into<PathBuf>, kind: PluginKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.path.join(MANIFEST_FILE)
    }
}

#[async_trait]
impl PluginSource for ManifestPlugin {
    fn path(&self) -> &Path {
        &self.path
    }

    fn kind(&self) -> PluginKind {
        self.kind
    }

    async fn convert_to_cached(&self) -> PlugcacheResult<CachedPlugin> {
        let file = self.manifest_path();
        let content = match fs::read_to_string(&file).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PlugcacheError::plugin_parse(
                    &self.path,
                    format!("{} not found", MANIFEST_FILE),
                ))
            }
            Err(e) => {
                return Err(PlugcacheError::io(
                    format!("reading manifest {}", file.display()),
                    e,
                ))
            }
        };

        let manifest: Manifest = serde_json::from_str(&content)
            .map_err(|e| PlugcacheError::plugin_parse(&self.path, e.to_string()))?;
        manifest.into_cached(&self.path)
    }
}
