//! Aligned time-window arithmetic for quota accounting.
//!
//! Windows are *tumbling*: a window's start is `floor(now / length) * length`
//! in unix seconds, so the day window begins at 00:00:00 UTC. When the
//! aligned start advances, the previous window's counters are dropped
//! wholesale rather than sliding. Each limit is enforced independently, and
//! a fresh window conservatively starts at zero, so this simplification
//! cannot overshoot a configured cap.

use std::fmt;
use std::time::Duration;

/// The three quota windows tracked per (provider, model).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Window {
    Minute,
    Hour,
    Day,
}

impl Window {
    /// All windows, minute first.
    pub const ALL: [Window; 3] = [Window::Minute, Window::Hour, Window::Day];

    /// Window length in seconds.
    pub fn seconds(&self) -> u64 {
        match self {
            Window::Minute => 60,
            Window::Hour => 3_600,
            Window::Day => 86_400,
        }
    }

    /// Window length as a `Duration`, used as the usage-record TTL.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.seconds())
    }

    /// Aligned start of the window containing `now` (unix seconds).
    pub fn start(&self, now: u64) -> u64 {
        now - now % self.seconds()
    }

    /// Exclusive end of the window containing `now` (unix seconds).
    pub fn end(&self, now: u64) -> u64 {
        self.start(now) + self.seconds()
    }

    /// Seconds until the window containing `now` resets.
    pub fn time_until_reset(&self, now: u64) -> u64 {
        self.end(now) - now
    }

    /// Short name used in store keys and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Window::Minute => "minute",
            Window::Hour => "hour",
            Window::Day => "day",
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store key for a usage record: `usage/<provider>/<model>/<window>`.
pub fn usage_key(provider: &str, model: &str, window: Window) -> String {
    format!("usage/{}/{}/{}", provider, model, window.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_lengths() {
        assert_eq!(Window::Minute.seconds(), 60);
        assert_eq!(Window::Hour.seconds(), 3_600);
        assert_eq!(Window::Day.seconds(), 86_400);
    }

    #[test]
    fn test_aligned_start() {
        // 2023-11-14T22:13:20Z
        let now = 1_700_000_000;
        assert_eq!(Window::Minute.start(now), 1_699_999_980);
        assert_eq!(Window::Hour.start(now), 1_699_999_200);
        // Day boundary lands on 00:00:00 UTC
        assert_eq!(Window::Day.start(now) % 86_400, 0);
        assert_eq!(Window::Day.start(now), 1_699_920_000);
    }

    #[test]
    fn test_start_is_idempotent_within_window() {
        let start = Window::Minute.start(1_700_000_000);
        for offset in 0..60 {
            assert_eq!(Window::Minute.start(start + offset), start);
        }
        assert_eq!(Window::Minute.start(start + 60), start + 60);
    }

    #[test]
    fn test_end_and_reset() {
        let now = 1_700_000_000;
        assert_eq!(Window::Minute.end(now), 1_700_000_040);
        assert_eq!(Window::Minute.time_until_reset(now), 40);

        // On an exact boundary a full window remains.
        let boundary = Window::Hour.start(now);
        assert_eq!(Window::Hour.time_until_reset(boundary), 3_600);
    }

    #[test]
    fn test_usage_key_layout() {
        assert_eq!(
            usage_key("groq", "llama-3.3-70b", Window::Minute),
            "usage/groq/llama-3.3-70b/minute"
        );
        assert_eq!(
            usage_key("cerebras", "qwen-3-32b", Window::Day),
            "usage/cerebras/qwen-3-32b/day"
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Window::Hour.to_string(), "hour");
        assert_eq!(Window::ALL.map(|w| w.as_str()), ["minute", "hour", "day"]);
    }

    #[test]
    fn test_ttl_matches_length() {
        for w in Window::ALL {
            assert_eq!(w.ttl().as_secs(), w.seconds());
        }
    }
}
