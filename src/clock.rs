//! Injectable time source for the bootstrap coordinator.
//!
//! The [`Clock`] trait covers the two time operations the coordinator needs:
//! reading the current wall-clock time and sleeping between poll attempts.
//! Production code uses [`SystemClock`]; tests use [`SimulatedClock`] so
//! retry and timeout behavior can be exercised without real delays.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

/// Trait for injectable time sources.
///
/// Implementations must be cheap to clone behind an `Arc` and safe to share
/// across tasks.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Get the current Unix timestamp in milliseconds.
    fn now_unix_ms(&self) -> u64;

    /// Sleep for the given duration.
    async fn sleep(&self, duration: Duration);
}

/// Production clock backed by the system time and the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now_unix_ms(&self) -> u64 {
        // Safe fallback to 0 if the system clock is before the epoch.
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Simulated clock for deterministic testing.
///
/// `sleep` returns immediately and advances the simulated time by the
/// requested duration, so a bounded polling loop runs to exhaustion in
/// microseconds of real time. Clones share state.
#[derive(Debug, Clone)]
pub struct SimulatedClock {
    now_ms: Arc<AtomicU64>,
    sleeps: Arc<AtomicU64>,
}

impl SimulatedClock {
    /// Create a simulated clock starting at the given timestamp.
    pub fn new(initial_ms: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(initial_ms)),
            sleeps: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Advance the simulated time without sleeping.
    pub fn advance_ms(&self, delta_ms: u64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }

    /// Number of times `sleep` has been called.
    pub fn sleep_count(&self) -> u64 {
        self.sleeps.load(Ordering::SeqCst)
    }
}

impl Default for SimulatedClock {
    fn default() -> Self {
        Self::new(0)
    }
}

#[async_trait]
impl Clock for SimulatedClock {
    fn now_unix_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        self.now_ms.fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }
}
