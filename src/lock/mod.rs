//! Filesystem reader/writer lock
//!
//! A portable, inspectable mutex built from ordinary files and directories,
//! shared by independent short-lived processes on one host.
//!
//! # Layout
//!
//! For a lock path `<path>`:
//!
//! | Path | Kind | Meaning |
//! |------|------|---------|
//! | `<path>.writer/` | directory | exclusive writer lock, `pid` file inside names the holder |
//! | `<path>.readers` | file | newline-separated PIDs of registered readers |
//! | `<path>.readers.lock/` | directory | sub-lock serializing edits of the readers file |
//!
//! Directory creation is the atomic step. A lock or registration whose PID is
//! no longer running is stale and is discarded by whichever process notices,
//! so a crashed holder never wedges the lock for longer than one access.
//!
//! Writers drain readers by sampling the readers file once per poll. The drain
//! is advisory: a reader may still register between the last sample and the
//! writer taking its directory lock.

pub mod clock;
mod guard;
mod mutex;
pub mod process;

pub use clock::{Clock, FastClock, TokioClock};
pub use guard::{DirectoryLock, ReadLock, Upgrade, WriteLock};
pub use mutex::{
    DrainPolicy, LockManager, LockManagerBuilder, LockStatus, ReadOptions, WriteOptions,
    DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT,
};
pub use process::{pid_active, ProcessProbe, StaticProbe, SystemProbe};

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// File inside a lock directory naming its owner
pub const PID_FILE: &str = "pid";

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

/// Directory lock held by the active writer of `path`
pub fn writer_path(path: &Path) -> PathBuf {
    with_suffix(path, ".writer")
}

/// Registry of reader PIDs for `path`
pub fn readers_path(path: &Path) -> PathBuf {
    with_suffix(path, ".readers")
}

/// Sub-lock guarding the readers file of `path`
pub fn readers_lock_path(path: &Path) -> PathBuf {
    with_suffix(path, ".readers.lock")
}
