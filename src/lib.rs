//! plugcache - versioned plugin metadata cache with a filesystem lock
//!
//! Short-lived CLI processes share one `plugins.json` describing every
//! installed plugin. Access is coordinated through a reader/writer lock made
//! of plain files and directories that tolerates crashed holders.

pub mod cli;
pub mod config;
pub mod error;
pub mod lock;
pub mod plugin;
pub mod session;

pub use error::{PlugcacheError, PlugcacheResult};
