//! Sleep source for lock polling

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Suspends the current task between lock polls
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock that sleeps a fixed short tick no matter what was requested
///
/// Timeouts are accounted per poll, so a protocol that would wait a full
/// minute in production runs in well under a second. Keeps a count of the
/// polls it served.
#[derive(Debug, Default)]
pub struct FastClock {
    tick: Duration,
    sleeps: AtomicU64,
}

impl FastClock {
    pub fn new(tick: Duration) -> Self {
        Self {
            tick,
            sleeps: AtomicU64::new(0),
        }
    }

    /// Number of times `sleep` was called
    pub fn sleeps(&self) -> u64 {
        self.sleeps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Clock for FastClock {
    async fn sleep(&self, _duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        if self.tick.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.tick).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn fast_clock_ignores_requested_duration() {
        let clock = FastClock::new(Duration::from_millis(1));
        let start = Instant::now();
        clock.sleep(Duration::from_secs(30)).await;
        clock.sleep(Duration::from_secs(30)).await;
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(clock.sleeps(), 2);
    }
}
