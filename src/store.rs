//! State store: usage counters, cooldown markers and latency history.
//!
//! The store is the only shared mutable state in the router. Everything the
//! tracker persists goes through the [`StateStore`] trait so backends can be
//! swapped (a single-file or remote key-value backend fits the same
//! interface); the crate ships [`MemoryStore`].
//!
//! Key layout:
//!
//! - `usage/<provider>/<model>/<window>` -> [`UsageRecord`], TTL = window length
//! - `cooldown/<provider>/<model>` -> [`CooldownRecord`], TTL = `expires_at - now`
//! - `latency/<provider>/<model>` -> [`LatencyRecord`], no TTL
//!
//! Expired entries are equivalent to absence and are pruned on read.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::clock::Clock;
use crate::error::Result;

/// EMA decay applied to the previous latency average.
pub const LATENCY_DECAY: f64 = 0.8;

/// Latency sample counter saturates here.
pub const LATENCY_SAMPLE_CAP: u32 = 100;

// ============================================================================
// Records
// ============================================================================

/// Usage counters for one (provider, model, window).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub requests: u64,
    pub tokens: u64,
    /// Aligned start of the window the counters belong to (unix seconds).
    /// A recorder seeing a different start resets the counters.
    pub window_start: u64,
}

/// Cooldown marker for one (provider, model).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownRecord {
    pub provider: String,
    pub model: String,
    /// Absolute expiry (unix seconds). A record with `now >= expires_at`
    /// is treated as absent.
    pub expires_at: u64,
}

/// Exponential-moving-average latency for one (provider, model).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyRecord {
    pub avg_ms: f64,
    pub samples: u32,
    /// Unix seconds of the last update.
    pub updated_at: u64,
}

// ============================================================================
// Trait
// ============================================================================

/// Persistence capabilities the tracker depends on.
///
/// `increment_usage` is the only write path for counters and must be atomic
/// with respect to concurrent callers on the same key; a backend may obtain
/// this with a per-key or global lock, or server-side atomic increments.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Current usage record, or `None` if absent or expired.
    async fn get_usage(&self, key: &str) -> Result<Option<UsageRecord>>;

    /// Overwrite a usage record.
    async fn set_usage(&self, key: &str, record: UsageRecord, ttl: Duration) -> Result<()>;

    /// Add deltas to a usage record, resetting first if the stored record
    /// belongs to a different window. Returns the resulting record.
    async fn increment_usage(
        &self,
        key: &str,
        requests: u64,
        tokens: u64,
        window_start: u64,
        ttl: Duration,
    ) -> Result<UsageRecord>;

    /// Current cooldown, or `None` if absent or expired.
    async fn get_cooldown(&self, provider: &str, model: &str) -> Result<Option<CooldownRecord>>;

    /// Overwrite a cooldown; its TTL is `expires_at - now`.
    async fn set_cooldown(&self, record: CooldownRecord) -> Result<()>;

    /// Remove a cooldown marker.
    async fn remove_cooldown(&self, provider: &str, model: &str) -> Result<()>;

    /// Latency history for a pair, if any.
    async fn get_latency(&self, provider: &str, model: &str) -> Result<Option<LatencyRecord>>;

    /// Fold a new latency sample into the EMA. The first sample initializes
    /// the average. Returns the resulting record.
    async fn update_latency(
        &self,
        provider: &str,
        model: &str,
        sample_ms: f64,
    ) -> Result<LatencyRecord>;

    /// Drop all state.
    async fn clear(&self) -> Result<()>;

    /// Release resources. The in-memory store simply clears.
    async fn close(&self) -> Result<()>;
}

// ============================================================================
// In-memory implementation
// ============================================================================

#[derive(Debug, Default)]
struct MemoryInner {
    /// key -> (record, absolute expiry in unix seconds)
    usage: HashMap<String, (UsageRecord, u64)>,
    /// "provider/model" -> record
    cooldowns: HashMap<String, CooldownRecord>,
    /// "provider/model" -> record
    latencies: HashMap<String, LatencyRecord>,
}

/// In-process store. A single async mutex serializes every read-modify-write,
/// which satisfies the per-key atomicity contract of `increment_usage`.
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
    clock: Arc<dyn Clock>,
}

fn pair_key(provider: &str, model: &str) -> String {
    format!("{}/{}", provider, model)
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(MemoryInner::default()),
            clock,
        }
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get_usage(&self, key: &str) -> Result<Option<UsageRecord>> {
        let now = self.clock.now_secs();
        let mut inner = self.inner.lock().await;
        match inner.usage.get(key) {
            Some((_, expires_at)) if now >= *expires_at => {
                inner.usage.remove(key);
                Ok(None)
            }
            Some((record, _)) => Ok(Some(*record)),
            None => Ok(None),
        }
    }

    async fn set_usage(&self, key: &str, record: UsageRecord, ttl: Duration) -> Result<()> {
        let expires_at = self.clock.now_secs() + ttl.as_secs();
        let mut inner = self.inner.lock().await;
        inner.usage.insert(key.to_string(), (record, expires_at));
        Ok(())
    }

    async fn increment_usage(
        &self,
        key: &str,
        requests: u64,
        tokens: u64,
        window_start: u64,
        ttl: Duration,
    ) -> Result<UsageRecord> {
        let now = self.clock.now_secs();
        let mut inner = self.inner.lock().await;

        let previous = match inner.usage.get(key) {
            Some((record, expires_at))
                if now < *expires_at && record.window_start == window_start =>
            {
                Some(*record)
            }
            _ => None,
        };

        let record = match previous {
            Some(prev) => UsageRecord {
                requests: prev.requests + requests,
                tokens: prev.tokens + tokens,
                window_start,
            },
            None => UsageRecord {
                requests,
                tokens,
                window_start,
            },
        };

        inner
            .usage
            .insert(key.to_string(), (record, now + ttl.as_secs()));
        Ok(record)
    }

    async fn get_cooldown(&self, provider: &str, model: &str) -> Result<Option<CooldownRecord>> {
        let now = self.clock.now_secs();
        let key = pair_key(provider, model);
        let mut inner = self.inner.lock().await;
        match inner.cooldowns.get(&key) {
            Some(record) if now >= record.expires_at => {
                inner.cooldowns.remove(&key);
                Ok(None)
            }
            Some(record) => Ok(Some(record.clone())),
            None => Ok(None),
        }
    }

    async fn set_cooldown(&self, record: CooldownRecord) -> Result<()> {
        let key = pair_key(&record.provider, &record.model);
        let mut inner = self.inner.lock().await;
        if record.expires_at <= self.clock.now_secs() {
            // Already expired; storing it would be indistinguishable from
            // absence on the next read.
            inner.cooldowns.remove(&key);
            return Ok(());
        }
        inner.cooldowns.insert(key, record);
        Ok(())
    }

    async fn remove_cooldown(&self, provider: &str, model: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.cooldowns.remove(&pair_key(provider, model));
        Ok(())
    }

    async fn get_latency(&self, provider: &str, model: &str) -> Result<Option<LatencyRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner.latencies.get(&pair_key(provider, model)).copied())
    }

    async fn update_latency(
        &self,
        provider: &str,
        model: &str,
        sample_ms: f64,
    ) -> Result<LatencyRecord> {
        let now = self.clock.now_secs();
        let key = pair_key(provider, model);
        let mut inner = self.inner.lock().await;

        let record = match inner.latencies.get(&key) {
            Some(prev) => LatencyRecord {
                avg_ms: prev.avg_ms * LATENCY_DECAY + sample_ms * (1.0 - LATENCY_DECAY),
                samples: prev.samples.saturating_add(1).min(LATENCY_SAMPLE_CAP),
                updated_at: now,
            },
            None => LatencyRecord {
                avg_ms: sample_ms,
                samples: 1,
                updated_at: now,
            },
        };

        inner.latencies.insert(key, record);
        Ok(record)
    }

    async fn clear(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.usage.clear();
        inner.cooldowns.clear();
        inner.latencies.clear();
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.clear().await
    }
}
