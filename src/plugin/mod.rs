//! Plugin metadata, discovery and caching

pub mod cache;
pub mod managers;
pub mod manifest;
pub mod model;
pub mod registry;
pub mod source;

pub use cache::{
    clear_requested_by_env, CacheSettings, LoadedPlugin, PluginCache, CACHE_FILE, CLEAR_CACHE_ENV,
    LOCK_FILE,
};
pub use managers::{BuiltinManager, DirectoryManager};
pub use manifest::{Manifest, ManifestPlugin, MANIFEST_FILE};
pub use model::{CacheData, CachedCommand, CachedPlugin, CachedTopic, Group};
pub use registry::Plugins;
pub use source::{Manager, PluginKind, PluginSource};
