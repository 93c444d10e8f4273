//! Error types for plugcache
//!
//! All modules use `PlugcacheResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for plugcache operations
pub type PlugcacheResult<T> = Result<T, PlugcacheError>;

/// All errors that can occur in plugcache
#[derive(Error, Debug)]
pub enum PlugcacheError {
    // Lock errors
    #[error("Timed out waiting for lock {path}: held by process {pid}")]
    LockTimeout { path: PathBuf, pid: u32 },

    #[error("Timed out waiting for {path}: locked with an active writer (pid {pid})")]
    WriterTimeout { path: PathBuf, pid: u32 },

    #[error(
        "Timed out waiting for {path}: locked with {} active: {}",
        reader_noun(.pids),
        join_pids(.pids)
    )]
    ReadersTimeout { path: PathBuf, pids: Vec<u32> },

    // Plugin errors
    #[error("Error parsing plugin {path}: {reason}")]
    PluginParse { path: PathBuf, reason: String },

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

fn reader_noun(pids: &[u32]) -> &'static str {
    if pids.len() == 1 {
        "a reader"
    } else {
        "readers"
    }
}

fn join_pids(pids: &[u32]) -> String {
    pids.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

impl PlugcacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a plugin parse error
    pub fn plugin_parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::PluginParse {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Check if the error comes from an exhausted lock wait
    pub fn is_lock_timeout(&self) -> bool {
        matches!(
            self,
            Self::LockTimeout { .. } | Self::WriterTimeout { .. } | Self::ReadersTimeout { .. }
        )
    }

    /// PIDs of the processes that kept a lock busy until the timeout
    pub fn blocking_pids(&self) -> Vec<u32> {
        match self {
            Self::LockTimeout { pid, .. } | Self::WriterTimeout { pid, .. } => vec![*pid],
            Self::ReadersTimeout { pids, .. } => pids.clone(),
            _ => vec![],
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::LockTimeout { .. } | Self::WriterTimeout { .. } | Self::ReadersTimeout { .. } => {
                Some("Another plugcache process is busy. Retry, or run: plugcache locks --clear-stale")
            }
            Self::ConfigInvalid { .. } => Some("Run: plugcache config init --force"),
            Self::CommandNotFound(_) => Some("Run: plugcache commands"),
            Self::TopicNotFound(_) => Some("Run: plugcache topics"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readers_timeout_names_pids() {
        let err = PlugcacheError::ReadersTimeout {
            path: PathBuf::from("/tmp/update.lock"),
            pids: vec![101, 202],
        };
        let msg = err.to_string();
        assert!(msg.contains("/tmp/update.lock"));
        assert!(msg.contains("readers active: 101 202"));
    }

    #[test]
    fn single_reader_wording() {
        let err = PlugcacheError::ReadersTimeout {
            path: PathBuf::from("x"),
            pids: vec![7],
        };
        assert!(err.to_string().contains("a reader active: 7"));
    }

    #[test]
    fn lock_timeout_hint() {
        let err = PlugcacheError::WriterTimeout {
            path: PathBuf::from("x"),
            pid: 42,
        };
        assert!(err.is_lock_timeout());
        assert_eq!(err.blocking_pids(), vec![42]);
        assert!(err.hint().unwrap().contains("--clear-stale"));
    }

    #[test]
    fn lookup_hints_name_the_listing_command() {
        let topic = PlugcacheError::TopicNotFound("db".into());
        assert_eq!(topic.to_string(), "Topic not found: db");
        assert_eq!(topic.hint(), Some("Run: plugcache topics"));

        let command = PlugcacheError::CommandNotFound("db:pull".into());
        assert_eq!(command.hint(), Some("Run: plugcache commands"));
    }

    #[test]
    fn non_lock_errors() {
        let err = PlugcacheError::Internal("boom".into());
        assert!(!err.is_lock_timeout());
        assert!(err.blocking_pids().is_empty());
        assert_eq!(err.hint(), None);
    }
}
