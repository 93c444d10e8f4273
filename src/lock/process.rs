//! Process liveness checks
//!
//! A lock or reader registration is only honored while the process that
//! wrote it is still running. Everything here answers that one question.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

/// Answers whether a PID names a running process
pub trait ProcessProbe: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
}

/// Probe backed by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl ProcessProbe for SystemProbe {
    fn is_alive(&self, pid: u32) -> bool {
        pid_active(pid)
    }
}

/// Check if a process exists
///
/// PID 0 never counts as alive. No lock owner can have it, and on Unix
/// `kill(0, 0)` would test our own process group instead.
pub fn pid_active(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }

    #[cfg(unix)]
    {
        let Ok(raw) = libc::pid_t::try_from(pid) else {
            return false;
        };
        // SAFETY: signal 0 performs only the existence and permission check.
        if unsafe { libc::kill(raw, 0) } == 0 {
            return true;
        }
        // EPERM: the process exists but belongs to someone else
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }

    #[cfg(windows)]
    {
        pid_active_windows(pid)
    }

    #[cfg(not(any(unix, windows)))]
    {
        // No way to tell; never discard another process's lock
        true
    }
}

#[cfg(windows)]
fn pid_active_windows(pid: u32) -> bool {
    use std::process::Command;

    let filter = format!("PID eq {pid}");
    match Command::new("tasklist")
        .args(["/FI", &filter, "/FO", "CSV", "/NH"])
        .output()
    {
        Ok(output) => String::from_utf8_lossy(&output.stdout).contains(&format!("\"{pid}\"")),
        Err(e) => {
            tracing::debug!("tasklist failed, assuming pid {} is alive: {}", pid, e);
            true
        }
    }
}

/// Probe with a fixed, editable set of live PIDs
///
/// Lets tests stage several "processes" inside one test binary.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    alive: Arc<RwLock<HashSet<u32>>>,
}

impl StaticProbe {
    pub fn new(pids: impl IntoIterator<Item = u32>) -> Self {
        Self {
            alive: Arc::new(RwLock::new(pids.into_iter().collect())),
        }
    }

    /// Mark a PID as running
    pub fn spawn(&self, pid: u32) {
        if let Ok(mut alive) = self.alive.write() {
            alive.insert(pid);
        }
    }

    /// Mark a PID as exited
    pub fn kill(&self, pid: u32) {
        if let Ok(mut alive) = self.alive.write() {
            alive.remove(&pid);
        }
    }
}

impl ProcessProbe for StaticProbe {
    fn is_alive(&self, pid: u32) -> bool {
        self.alive.read().map(|a| a.contains(&pid)).unwrap_or(false)
    }
}
