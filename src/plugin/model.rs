//! Persisted plugin metadata
//!
//! These types are the on-disk shape of `plugins.json`. Field names follow
//! the existing file format, so optional fields default when absent.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Positional argument of a command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CachedArg {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
    pub hidden: bool,
}

/// Flag of a command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CachedFlag {
    #[serde(rename = "char", skip_serializing_if = "Option::is_none")]
    pub short: Option<char>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub has_value: bool,
    pub required: bool,
    pub hidden: bool,
}

/// Command metadata as the CLI needs it without loading the plugin
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CachedCommand {
    pub id: String,
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub aliases: Vec<String>,
    pub args: Vec<CachedArg>,
    pub flags: BTreeMap<String, CachedFlag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,
    pub hidden: bool,
    pub variable_args: bool,
    pub group: String,
}

impl CachedCommand {
    /// Whether `id` names this command directly or through an alias
    pub fn answers_to(&self, id: &str) -> bool {
        self.id == id || self.aliases.iter().any(|a| a == id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CachedTopic {
    pub id: String,
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub hidden: bool,
    pub group: String,
}

/// Help-output grouping of commands and topics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Group {
    pub key: String,
    pub name: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
}

/// Everything one plugin contributes to the command surface
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CachedPlugin {
    pub name: String,
    pub path: PathBuf,
    pub version: String,
    pub commands: Vec<CachedCommand>,
    pub topics: Vec<CachedTopic>,
    pub groups: Vec<Group>,
}

impl CachedPlugin {
    /// Stand-in for a plugin that could not be parsed
    ///
    /// Named after its path so it never shadows a working plugin.
    pub fn placeholder(path: &Path) -> Self {
        Self {
            name: path.display().to_string(),
            path: path.to_path_buf(),
            ..Self::default()
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.version.is_empty() && self.commands.is_empty() && self.topics.is_empty()
    }
}

/// Contents of `plugins.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheData {
    /// CLI release that wrote the cache
    pub version: String,

    /// Host runtime version the cached metadata was built under
    #[serde(rename = "node_version", default)]
    pub runtime_version: Option<String>,

    /// Plugins keyed by absolute plugin path
    #[serde(default)]
    pub plugins: BTreeMap<PathBuf, CachedPlugin>,
}

impl CacheData {
    /// Empty cache for the given CLI release
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            runtime_version: None,
            plugins: BTreeMap::new(),
        }
    }
}
