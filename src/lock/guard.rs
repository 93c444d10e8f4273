//! Lock handles returned by [`LockManager`]

use super::mutex::LockManager;
use crate::error::PlugcacheResult;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// An acquired directory lock
///
/// `release` is idempotent and only ever removes a directory this handle's
/// manager still holds. Dropping an unreleased lock removes it synchronously.
#[derive(Debug)]
#[must_use = "the lock is released as soon as it is dropped"]
pub struct DirectoryLock {
    manager: LockManager,
    path: PathBuf,
    released: bool,
}

impl DirectoryLock {
    pub(crate) fn new(manager: LockManager, path: PathBuf) -> Self {
        Self {
            manager,
            path,
            released: false,
        }
    }

    /// The lock directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub async fn release(&mut self) -> PlugcacheResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.manager.release_directory(&self.path).await
    }
}

impl Drop for DirectoryLock {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            self.manager.release_directory_sync(&self.path);
        }
    }
}

/// Exclusive writer lock on a lock path
#[derive(Debug)]
#[must_use = "the writer lock is released as soon as it is dropped"]
pub struct WriteLock {
    path: PathBuf,
    lock: DirectoryLock,
}

impl WriteLock {
    pub(crate) fn new(path: PathBuf, lock: DirectoryLock) -> Self {
        Self { path, lock }
    }

    /// The lock path this writer holds
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn release(&mut self) -> PlugcacheResult<()> {
        self.lock.release().await
    }
}

/// Reader registration on a lock path
///
/// Unlike the exclusive locks this is not released on drop: removing a PID
/// from the readers file needs the readers sub-lock, which may have to be
/// waited for. Call [`ReadLock::release`], or rely on
/// [`LockManager::dispose_all`] at exit.
#[derive(Debug)]
#[must_use = "an unreleased registration blocks writers until dispose_all or exit"]
pub struct ReadLock {
    manager: LockManager,
    path: PathBuf,
    released: bool,
}

impl ReadLock {
    pub(crate) fn new(manager: LockManager, path: PathBuf) -> Self {
        Self {
            manager,
            path,
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unregister; a second call does nothing
    pub async fn release(&mut self) -> PlugcacheResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.manager.unread(&self.path).await
    }
}

/// Writer lock obtained through [`LockManager::upgrade`]
///
/// Dropping it without [`Upgrade::downgrade`] releases the writer lock but
/// leaves the process unregistered.
#[derive(Debug)]
#[must_use = "call downgrade() to give the writer lock back"]
pub struct Upgrade {
    manager: LockManager,
    lock: WriteLock,
    was_reader: bool,
    timeout: Duration,
}

impl Upgrade {
    pub(crate) fn new(
        manager: LockManager,
        lock: WriteLock,
        was_reader: bool,
        timeout: Duration,
    ) -> Self {
        Self {
            manager,
            lock,
            was_reader,
            timeout,
        }
    }

    pub fn path(&self) -> &Path {
        self.lock.path()
    }

    /// Release the writer lock and re-register as a reader if we were one
    pub async fn downgrade(mut self) -> PlugcacheResult<()> {
        self.lock.release().await?;
        if self.was_reader {
            let path = self.lock.path().to_path_buf();
            self.manager.wait_and_register(&path, self.timeout).await?;
        }
        Ok(())
    }
}
