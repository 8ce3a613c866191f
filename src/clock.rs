//! Injectable wall clock.
//!
//! Every time read in the router goes through [`Clock`] so that window
//! alignment, cooldown expiry and latency measurement can be driven
//! deterministically in tests. Production code uses [`SystemClock`];
//! tests use [`ManualClock`] and advance it explicitly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of wall-clock time, unix epoch based.
pub trait Clock: Send + Sync {
    /// Milliseconds since the unix epoch.
    fn now_millis(&self) -> u64;

    /// Seconds since the unix epoch.
    fn now_secs(&self) -> u64 {
        self.now_millis() / 1000
    }
}

/// Real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Manually advanced clock for deterministic tests.
///
/// Shared freely via `Arc`; advancing through one handle is observed by all.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    /// Create a clock pinned at the given unix timestamp (seconds).
    pub fn at_secs(secs: u64) -> Arc<Self> {
        Arc::new(Self {
            millis: AtomicU64::new(secs * 1000),
        })
    }

    /// Advance the clock.
    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Jump to an absolute unix timestamp (seconds).
    pub fn set_secs(&self, secs: u64) {
        self.millis.store(secs * 1000, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_monotonic_enough() {
        let clock = SystemClock;
        let a = clock.now_millis();
        let b = clock.now_millis();
        assert!(b >= a);
        assert!(a > 1_600_000_000_000); // after Sep 2020
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::at_secs(1_700_000_000);
        assert_eq!(clock.now_secs(), 1_700_000_000);

        clock.advance(Duration::from_secs(61));
        assert_eq!(clock.now_secs(), 1_700_000_061);

        clock.advance(Duration::from_millis(500));
        assert_eq!(clock.now_millis(), 1_700_000_061_500);
        assert_eq!(clock.now_secs(), 1_700_000_061);
    }

    #[test]
    fn test_manual_clock_set() {
        let clock = ManualClock::at_secs(100);
        clock.set_secs(1_700_000_000);
        assert_eq!(clock.now_secs(), 1_700_000_000);
    }

    #[test]
    fn test_manual_clock_shared_handles() {
        let clock = ManualClock::at_secs(0);
        let other = Arc::clone(&clock);
        clock.advance(Duration::from_secs(5));
        assert_eq!(other.now_secs(), 5);
    }
}
