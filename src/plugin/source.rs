//! Collaborator contracts for plugin discovery
//!
//! The cache never looks inside a plugin itself. A [`Manager`] knows where a
//! family of plugins lives, and each [`PluginSource`] knows how to turn one
//! plugin into [`CachedPlugin`] metadata.

use super::model::CachedPlugin;
use crate::error::{PlugcacheError, PlugcacheResult};
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Where a plugin comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginKind {
    /// Compiled into the CLI; a parse failure is a bug and is not masked
    Builtin,
    /// Installed by the user
    User,
}

impl PluginKind {
    pub fn is_builtin(self) -> bool {
        self == Self::Builtin
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Builtin => "builtin",
            Self::User => "user",
        };
        write!(f, "{}", name)
    }
}

/// One plugin on disk
#[async_trait]
pub trait PluginSource: Send + Sync {
    /// Absolute path identifying the plugin; the cache key
    fn path(&self) -> &Path;

    fn kind(&self) -> PluginKind;

    /// Parse the plugin into cacheable metadata (may be slow, may fail)
    async fn convert_to_cached(&self) -> PlugcacheResult<CachedPlugin>;

    /// One-shot attempt to fix whatever made parsing fail
    ///
    /// Returns true if parsing is worth retrying.
    async fn repair(&self, err: &PlugcacheError) -> bool {
        tracing::debug!("No repair available for {}: {}", self.path().display(), err);
        false
    }
}

/// A family of plugins sharing one location and install mechanism
#[async_trait]
pub trait Manager: Send + Sync {
    fn name(&self) -> &str;

    /// Candidate plugins, in precedence order
    async fn list(&self) -> PlugcacheResult<Vec<Arc<dyn PluginSource>>>;

    /// Rebuild anything that depends on the host runtime version
    ///
    /// Called with the writer lock held.
    async fn handle_node_version_change(&self) -> PlugcacheResult<()> {
        Ok(())
    }
}
