//! Lock manager: directory locks, reader registry, writer drain

use super::clock::{Clock, TokioClock};
use super::guard::{DirectoryLock, ReadLock, Upgrade, WriteLock};
use super::process::{ProcessProbe, SystemProbe};
use super::{readers_lock_path, readers_path, writer_path, PID_FILE};
use crate::error::{PlugcacheError, PlugcacheResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, warn};

/// Default bound on any lock wait
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(60_000);

/// Default delay between polls of a contended lock
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1_000);

/// How a writer decides which readers it must wait for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrainPolicy {
    /// Re-sample the live reader set on every poll. A steady stream of new
    /// readers can hold the writer off until its timeout.
    #[default]
    Resample,
    /// Wait only for readers seen on the first sample. Readers arriving
    /// later do not delay the writer.
    Snapshot,
}

/// Options for [`LockManager::read`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions {
    /// Bound on the wait for an active writer; manager default when unset
    pub timeout: Option<Duration>,
}

impl ReadOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// Options for [`LockManager::write`] and [`LockManager::has_readers`]
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Bound on the whole acquisition; manager default when unset
    pub timeout: Option<Duration>,
    /// Do not wait on our own reader registration (lock upgrade)
    pub skip_own_pid: bool,
    /// Reader drain policy; manager default when unset
    pub drain: Option<DrainPolicy>,
}

impl WriteOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }

    pub fn skip_own_pid(mut self, skip: bool) -> Self {
        self.skip_own_pid = skip;
        self
    }

    pub fn drain(mut self, drain: DrainPolicy) -> Self {
        self.drain = Some(drain);
        self
    }
}

/// Snapshot of a lock path as found on disk, without pruning anything
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockStatus {
    /// Writer pid and whether it is running
    pub writer: Option<(u32, bool)>,
    /// Recorded reader pids and whether each is running
    pub readers: Vec<(u32, bool)>,
}

impl LockStatus {
    pub fn is_free(&self) -> bool {
        !self.writer.is_some_and(|(_, alive)| alive) && !self.readers.iter().any(|(_, alive)| *alive)
    }

    pub fn stale_entries(&self) -> usize {
        let writer = usize::from(self.writer.is_some_and(|(_, alive)| !alive));
        writer + self.readers.iter().filter(|(_, alive)| !alive).count()
    }
}

#[derive(Debug, Default)]
struct Held {
    dirs: HashSet<PathBuf>,
    readers: HashSet<PathBuf>,
}

struct Inner {
    pid: u32,
    timeout: Duration,
    poll_interval: Duration,
    drain: DrainPolicy,
    clock: Arc<dyn Clock>,
    probe: Arc<dyn ProcessProbe>,
    held: Mutex<Held>,
}

enum Owner {
    Live(u32),
    Initializing,
    Stale(Option<u32>),
    Gone,
}

/// Builder for [`LockManager`]
pub struct LockManagerBuilder {
    pid: u32,
    timeout: Duration,
    poll_interval: Duration,
    drain: DrainPolicy,
    clock: Arc<dyn Clock>,
    probe: Arc<dyn ProcessProbe>,
}

impl LockManagerBuilder {
    /// Identity recorded in pid files (defaults to this process)
    pub fn pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn drain(mut self, drain: DrainPolicy) -> Self {
        self.drain = drain;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn probe(mut self, probe: Arc<dyn ProcessProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn build(self) -> LockManager {
        LockManager {
            inner: Arc::new(Inner {
                pid: self.pid,
                timeout: self.timeout,
                poll_interval: self.poll_interval,
                drain: self.drain,
                clock: self.clock,
                probe: self.probe,
                held: Mutex::new(Held::default()),
            }),
        }
    }
}

/// Owner of every lock and reader registration this process holds
///
/// Cloning is cheap and clones share the held-lock table, so a guard can
/// always find its way back to the manager that issued it.
#[derive(Clone)]
pub struct LockManager {
    inner: Arc<Inner>,
}

impl fmt::Debug for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManager")
            .field("pid", &self.inner.pid)
            .field("timeout", &self.inner.timeout)
            .field("poll_interval", &self.inner.poll_interval)
            .field("drain", &self.inner.drain)
            .finish_non_exhaustive()
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    /// Manager for this process with production defaults
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> LockManagerBuilder {
        LockManagerBuilder {
            pid: std::process::id(),
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            drain: DrainPolicy::default(),
            clock: Arc::new(TokioClock),
            probe: Arc::new(SystemProbe),
        }
    }

    pub fn pid(&self) -> u32 {
        self.inner.pid
    }

    pub fn default_timeout(&self) -> Duration {
        self.inner.timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.inner.poll_interval
    }

    fn held(&self) -> MutexGuard<'_, Held> {
        self.inner.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_alive(&self, pid: u32) -> bool {
        pid == self.inner.pid || self.inner.probe.is_alive(pid)
    }

    async fn pause(&self, remaining: Duration) -> Duration {
        let interval = self.inner.poll_interval;
        self.inner.clock.sleep(interval).await;
        remaining.saturating_sub(interval)
    }

    /// Whether this manager currently holds a reader registration on `path`
    pub fn is_registered(&self, path: &Path) -> bool {
        self.held().readers.contains(path)
    }

    /// Whether this manager currently holds the directory lock at `dir`
    pub fn holds(&self, dir: &Path) -> bool {
        self.held().dirs.contains(dir)
    }

    /// Acquire the exclusive directory lock at `path`
    ///
    /// Waits in poll-interval steps while a live process holds it, up to
    /// `timeout`. A lock left behind by a dead process is removed and retried
    /// at once without spending any of the timeout.
    pub async fn acquire_directory_lock(
        &self,
        path: &Path,
        timeout: Duration,
    ) -> PlugcacheResult<DirectoryLock> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                PlugcacheError::io(format!("creating lock parent {}", parent.display()), e)
            })?;
        }

        let mut remaining = timeout;
        loop {
            match fs::create_dir(path).await {
                Ok(()) => return self.claim(path).await,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => {
                    return Err(PlugcacheError::io(
                        format!("creating lock {}", path.display()),
                        e,
                    ))
                }
            }

            match self.owner(path).await? {
                Owner::Live(pid) => {
                    if remaining.is_zero() {
                        return Err(PlugcacheError::LockTimeout {
                            path: path.to_path_buf(),
                            pid,
                        });
                    }
                    debug!(
                        "Waiting for lock {} held by {} ({}ms left)",
                        path.display(),
                        pid,
                        remaining.as_millis()
                    );
                    remaining = self.pause(remaining).await;
                }
                Owner::Initializing => {
                    // Resolves within one poll: either the pid appears or the
                    // directory ages into a stale one
                    self.inner.clock.sleep(self.inner.poll_interval).await;
                }
                Owner::Stale(pid) => {
                    debug!("Removing stale lock {} (pid {:?})", path.display(), pid);
                    remove_dir_if_present(path).await?;
                }
                Owner::Gone => {}
            }
        }
    }

    async fn claim(&self, path: &Path) -> PlugcacheResult<DirectoryLock> {
        if let Err(e) = fs::write(path.join(PID_FILE), self.inner.pid.to_string()).await {
            let _ = fs::remove_dir_all(path).await;
            return Err(PlugcacheError::io(
                format!("writing pid file in {}", path.display()),
                e,
            ));
        }
        self.held().dirs.insert(path.to_path_buf());
        debug!("Acquired lock {}", path.display());
        Ok(DirectoryLock::new(self.clone(), path.to_path_buf()))
    }

    async fn owner(&self, dir: &Path) -> PlugcacheResult<Owner> {
        match read_pid(&dir.join(PID_FILE)).await? {
            Some(Some(pid)) if self.is_alive(pid) => Ok(Owner::Live(pid)),
            Some(pid) => Ok(Owner::Stale(pid)),
            None => match fs::metadata(dir).await {
                Ok(meta) => {
                    let young = meta
                        .modified()
                        .ok()
                        .and_then(|m| m.elapsed().ok())
                        .is_some_and(|age| age < self.inner.poll_interval);
                    Ok(if young {
                        Owner::Initializing
                    } else {
                        Owner::Stale(None)
                    })
                }
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(Owner::Gone),
                Err(e) => Err(PlugcacheError::io(
                    format!("inspecting lock {}", dir.display()),
                    e,
                )),
            },
        }
    }

    /// Release a directory lock this manager holds; no-op otherwise
    pub(crate) async fn release_directory(&self, path: &Path) -> PlugcacheResult<()> {
        if !self.held().dirs.remove(path) {
            return Ok(());
        }
        remove_dir_if_present(path).await?;
        debug!("Released lock {}", path.display());
        Ok(())
    }

    pub(crate) fn release_directory_sync(&self, path: &Path) {
        if !self.held().dirs.remove(path) {
            return;
        }
        remove_dir_sync(path);
    }

    /// PID of the live writer on `path`, if any
    pub async fn writer_pid(&self, path: &Path) -> PlugcacheResult<Option<u32>> {
        let pid = read_pid(&writer_path(path).join(PID_FILE)).await?.flatten();
        Ok(pid.filter(|pid| self.is_alive(*pid)))
    }

    /// True iff `<path>.writer/pid` names a live process
    pub async fn has_writer(&self, path: &Path) -> PlugcacheResult<bool> {
        Ok(self.writer_pid(path).await?.is_some())
    }

    /// True iff any live process other than (optionally) us is registered
    pub async fn has_readers(&self, path: &Path, options: WriteOptions) -> PlugcacheResult<bool> {
        let timeout = options.timeout.unwrap_or(self.inner.timeout);
        let readers = self
            .active_readers(path, timeout, options.skip_own_pid)
            .await?;
        Ok(!readers.is_empty())
    }

    /// Live reader PIDs of `path`, pruning dead entries from the readers file
    pub async fn active_readers(
        &self,
        path: &Path,
        timeout: Duration,
        skip_own_pid: bool,
    ) -> PlugcacheResult<Vec<u32>> {
        let mut sub = self
            .acquire_directory_lock(&readers_lock_path(path), timeout)
            .await?;
        let outcome = self.prune_readers(path).await;
        let released = sub.release().await;
        let mut readers = outcome?;
        released?;

        if skip_own_pid {
            readers.retain(|pid| *pid != self.inner.pid);
        }
        Ok(readers)
    }

    async fn prune_readers(&self, path: &Path) -> PlugcacheResult<Vec<u32>> {
        let (recorded, garbled) = load_readers(path).await?;
        let active: Vec<u32> = recorded
            .iter()
            .copied()
            .filter(|pid| self.is_alive(*pid))
            .collect();
        if garbled || active.len() != recorded.len() {
            debug!(
                "Pruning readers of {}: {:?} -> {:?}",
                path.display(),
                recorded,
                active
            );
            store_readers(path, &active).await?;
        }
        Ok(active)
    }

    /// Register as a reader of `path`
    ///
    /// Waits while a live writer holds the lock. The returned guard removes
    /// the registration on [`ReadLock::release`]. An unreleased registration
    /// stays on disk until [`LockManager::dispose_all`] or until this process
    /// exits and another one prunes it.
    pub async fn read(&self, path: &Path, options: ReadOptions) -> PlugcacheResult<ReadLock> {
        let timeout = options.timeout.unwrap_or(self.inner.timeout);
        debug!("read {}", path.display());
        self.wait_and_register(path, timeout).await?;
        Ok(ReadLock::new(self.clone(), path.to_path_buf()))
    }

    pub(crate) async fn wait_and_register(
        &self,
        path: &Path,
        timeout: Duration,
    ) -> PlugcacheResult<()> {
        let mut remaining = timeout;
        while let Some(pid) = self.writer_pid(path).await? {
            if remaining.is_zero() {
                return Err(PlugcacheError::WriterTimeout {
                    path: path.to_path_buf(),
                    pid,
                });
            }
            debug!(
                "Waiting for writer {} on {} ({}ms left)",
                pid,
                path.display(),
                remaining.as_millis()
            );
            remaining = self.pause(remaining).await;
        }

        let mut sub = self
            .acquire_directory_lock(&readers_lock_path(path), timeout)
            .await?;
        let outcome = async {
            let (mut readers, _) = load_readers(path).await?;
            if !readers.contains(&self.inner.pid) {
                readers.push(self.inner.pid);
                store_readers(path, &readers).await?;
            }
            Ok::<_, PlugcacheError>(())
        }
        .await;
        let released = sub.release().await;
        outcome?;
        released?;

        self.held().readers.insert(path.to_path_buf());
        Ok(())
    }

    /// Drop our reader registration on `path`
    ///
    /// Idempotent: a process that is not registered leaves the file alone.
    pub async fn unread(&self, path: &Path) -> PlugcacheResult<()> {
        let mut sub = self
            .acquire_directory_lock(&readers_lock_path(path), self.inner.timeout)
            .await?;
        let outcome = async {
            let (readers, _) = load_readers(path).await?;
            if readers.contains(&self.inner.pid) {
                let rest: Vec<u32> = readers
                    .into_iter()
                    .filter(|pid| *pid != self.inner.pid)
                    .collect();
                store_readers(path, &rest).await?;
            }
            Ok::<_, PlugcacheError>(())
        }
        .await;
        let released = sub.release().await;
        outcome?;
        released?;

        self.held().readers.remove(path);
        debug!("unread {}", path.display());
        Ok(())
    }

    /// Take the exclusive writer lock on `path`
    ///
    /// First waits for the live reader set (minus ourselves with
    /// `skip_own_pid`) to drain, then acquires `<path>.writer` with whatever
    /// timeout is left.
    pub async fn write(&self, path: &Path, options: WriteOptions) -> PlugcacheResult<WriteLock> {
        let timeout = options.timeout.unwrap_or(self.inner.timeout);
        let drain = options.drain.unwrap_or(self.inner.drain);
        debug!("write {}", path.display());

        let mut remaining = timeout;
        let mut snapshot: Option<HashSet<u32>> = None;
        loop {
            let mut readers = self
                .active_readers(path, timeout, options.skip_own_pid)
                .await?;
            if drain == DrainPolicy::Snapshot {
                let first = snapshot.get_or_insert_with(|| readers.iter().copied().collect());
                readers.retain(|pid| first.contains(pid));
            }
            if readers.is_empty() {
                break;
            }
            if remaining.is_zero() {
                return Err(PlugcacheError::ReadersTimeout {
                    path: path.to_path_buf(),
                    pids: readers,
                });
            }
            debug!(
                "Waiting for readers {:?} on {} ({}ms left)",
                readers,
                path.display(),
                remaining.as_millis()
            );
            remaining = self.pause(remaining).await;
        }

        let lock = self
            .acquire_directory_lock(&writer_path(path), remaining)
            .await?;
        Ok(WriteLock::new(path.to_path_buf(), lock))
    }

    /// Trade our reader registration for the writer lock
    ///
    /// Drops the registration first so the drain does not wait on ourselves,
    /// then waits out every other reader. [`Upgrade::downgrade`] gives the
    /// writer lock back and registers us again if we were a reader before.
    pub async fn upgrade(&self, path: &Path, timeout: Option<Duration>) -> PlugcacheResult<Upgrade> {
        let timeout = timeout.unwrap_or(self.inner.timeout);
        let was_reader = self.is_registered(path);
        self.unread(path).await?;

        let options = WriteOptions {
            timeout: Some(timeout),
            skip_own_pid: true,
            drain: None,
        };
        match self.write(path, options).await {
            Ok(lock) => {
                info!("Upgraded to writer on {}", path.display());
                Ok(Upgrade::new(self.clone(), lock, was_reader, timeout))
            }
            Err(e) => {
                if was_reader {
                    if let Err(restore) = self.wait_and_register(path, timeout).await {
                        warn!("Failed to restore reader registration: {}", restore);
                    }
                }
                Err(e)
            }
        }
    }

    /// Read the state of `path` without changing anything
    pub async fn inspect(&self, path: &Path) -> PlugcacheResult<LockStatus> {
        let writer = read_pid(&writer_path(path).join(PID_FILE))
            .await?
            .flatten()
            .map(|pid| (pid, self.is_alive(pid)));
        let (readers, _) = load_readers(path).await?;
        let readers = readers
            .into_iter()
            .map(|pid| (pid, self.is_alive(pid)))
            .collect();
        Ok(LockStatus { writer, readers })
    }

    /// Remove a dead writer's lock and prune dead readers of `path`
    ///
    /// Returns the number of entries removed.
    pub async fn clear_stale(&self, path: &Path) -> PlugcacheResult<usize> {
        let before = self.inspect(path).await?;
        let writer_dir = writer_path(path);
        if let Some((pid, false)) = before.writer {
            info!("Removing stale writer lock {} (pid {})", writer_dir.display(), pid);
            remove_dir_if_present(&writer_dir).await?;
        }
        self.active_readers(path, self.inner.timeout, false).await?;
        Ok(before.stale_entries())
    }

    /// Synchronously release everything this manager still holds
    ///
    /// Meant for process exit: removes held directory locks, then removes our
    /// PID from every readers file we registered in. Never fails; problems
    /// are logged.
    pub fn dispose_all(&self) {
        let (dirs, readers) = {
            let mut held = self.held();
            (
                std::mem::take(&mut held.dirs),
                std::mem::take(&mut held.readers),
            )
        };

        for dir in &dirs {
            remove_dir_sync(dir);
        }
        for path in &readers {
            self.unread_sync(path);
        }
        if !dirs.is_empty() || !readers.is_empty() {
            debug!(
                "Disposed {} lock(s) and {} registration(s)",
                dirs.len(),
                readers.len()
            );
        }
    }

    fn unread_sync(&self, path: &Path) {
        let sub = readers_lock_path(path);
        // One attempt at the sub-lock; exit cleanup cannot wait
        let locked = std::fs::create_dir(&sub).is_ok();
        if locked {
            let _ = std::fs::write(sub.join(PID_FILE), self.inner.pid.to_string());
        } else {
            debug!("Readers of {} busy, unregistering without sub-lock", path.display());
        }

        let file = readers_path(path);
        match std::fs::read_to_string(&file) {
            Ok(content) => {
                let (readers, _) = parse_readers(&content);
                let rest: Vec<u32> = readers
                    .into_iter()
                    .filter(|pid| *pid != self.inner.pid)
                    .collect();
                let result = if rest.is_empty() {
                    std::fs::remove_file(&file)
                } else {
                    std::fs::write(&file, join_readers(&rest))
                };
                if let Err(e) = result {
                    debug!("Failed to update {}: {}", file.display(), e);
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => debug!("Failed to read {}: {}", file.display(), e),
        }

        if locked {
            remove_dir_sync(&sub);
        }
    }
}

/// Read a pid file: `None` when missing or not yet written, `Some(None)` when
/// unparsable
///
/// `claim` creates the file before its content lands, so a blank file is an
/// owner still initializing rather than a garbled one.
async fn read_pid(file: &Path) -> PlugcacheResult<Option<Option<u32>>> {
    match fs::read_to_string(file).await {
        Ok(content) if content.trim().is_empty() => Ok(None),
        Ok(content) => Ok(Some(content.trim().parse::<u32>().ok())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(PlugcacheError::io(
            format!("reading pid file {}", file.display()),
            e,
        )),
    }
}

/// Parse a readers file; the flag reports lines that were not PIDs
fn parse_readers(content: &str) -> (Vec<u32>, bool) {
    let mut garbled = false;
    let pids = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match line.parse::<u32>() {
            Ok(pid) if pid != 0 => Some(pid),
            _ => {
                garbled = true;
                None
            }
        })
        .collect();
    (pids, garbled)
}

fn join_readers(pids: &[u32]) -> String {
    pids.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

async fn load_readers(path: &Path) -> PlugcacheResult<(Vec<u32>, bool)> {
    let file = readers_path(path);
    match fs::read_to_string(&file).await {
        Ok(content) => Ok(parse_readers(&content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok((vec![], false)),
        Err(e) => Err(PlugcacheError::io(
            format!("reading readers file {}", file.display()),
            e,
        )),
    }
}

async fn store_readers(path: &Path, pids: &[u32]) -> PlugcacheResult<()> {
    let file = readers_path(path);
    let result = if pids.is_empty() {
        match fs::remove_file(&file).await {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            other => other,
        }
    } else {
        fs::write(&file, join_readers(pids)).await
    };
    result.map_err(|e| PlugcacheError::io(format!("writing readers file {}", file.display()), e))
}

async fn remove_dir_if_present(path: &Path) -> PlugcacheResult<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PlugcacheError::io(
            format!("removing lock {}", path.display()),
            e,
        )),
    }
}

fn remove_dir_sync(path: &Path) {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => debug!("Failed to remove lock {}: {}", path.display(), e),
    }
}
