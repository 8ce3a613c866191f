//! Rate-limit bookkeeping: usage recording, quota snapshots, cooldowns.
//!
//! The tracker is the write path between the execution driver and the state
//! store. It owns no state of its own; every counter and marker lives in the
//! store, keyed per (provider, model, window). Windows are tumbling (§
//! [`crate::window`]): usage recorded in a previous aligned window reads as
//! zero once the boundary passes.
//!
//! Usage is recorded on successful completion only. A stale answer from
//! [`can_make_request`](RateLimitTracker::can_make_request) is acceptable:
//! the upstream's own 429 is the final authority and feeds back through
//! [`mark_rate_limited`](RateLimitTracker::mark_rate_limited).

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::RateLimits;
use crate::clock::Clock;
use crate::error::Result;
use crate::store::{CooldownRecord, StateStore};
use crate::window::{usage_key, Window};

/// Default cooldown applied when a 429 carries no `Retry-After`.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Remaining quota for one window.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WindowQuota {
    /// Requests left, `None` when no request cap is configured.
    pub requests_remaining: Option<u64>,
    /// Tokens left, `None` when no token cap is configured.
    pub tokens_remaining: Option<u64>,
    /// When this window resets (unix seconds), `None` when nothing is capped.
    pub resets_at: Option<u64>,
}

/// Snapshot of a (provider, model) pair's quota across all three windows.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub minute: WindowQuota,
    pub hour: WindowQuota,
    pub day: WindowQuota,
    /// Cooldown expiry, if the pair is marked rate-limited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<u64>,
}

impl QuotaStatus {
    /// Quota for a specific window.
    pub fn window(&self, window: Window) -> &WindowQuota {
        match window {
            Window::Minute => &self.minute,
            Window::Hour => &self.hour,
            Window::Day => &self.day,
        }
    }

    fn window_mut(&mut self, window: Window) -> &mut WindowQuota {
        match window {
            Window::Minute => &mut self.minute,
            Window::Hour => &mut self.hour,
            Window::Day => &mut self.day,
        }
    }
}

/// Per-(provider, model) usage accounting and cooldown gate.
pub struct RateLimitTracker {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    default_cooldown: Duration,
}

impl RateLimitTracker {
    pub fn new(store: Arc<dyn StateStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            default_cooldown: DEFAULT_COOLDOWN,
        }
    }

    /// Override the cooldown used when a 429 carries no reset time.
    pub fn with_default_cooldown(mut self, cooldown: Duration) -> Self {
        self.default_cooldown = cooldown;
        self
    }

    /// Record one successful request and its token usage across all three
    /// windows. The three increments run concurrently; a failed write does
    /// not stop the others, but the first failure is still surfaced.
    pub async fn record_usage(&self, provider: &str, model: &str, tokens: u64) -> Result<()> {
        let now = self.clock.now_secs();
        let keys: Vec<String> = Window::ALL
            .iter()
            .map(|w| usage_key(provider, model, *w))
            .collect();

        let results = tokio::join!(
            self.store.increment_usage(
                &keys[0],
                1,
                tokens,
                Window::Minute.start(now),
                Window::Minute.ttl(),
            ),
            self.store.increment_usage(
                &keys[1],
                1,
                tokens,
                Window::Hour.start(now),
                Window::Hour.ttl(),
            ),
            self.store.increment_usage(
                &keys[2],
                1,
                tokens,
                Window::Day.start(now),
                Window::Day.ttl(),
            ),
        );

        let mut first_err = None;
        for (window, result) in Window::ALL.into_iter().zip([results.0, results.1, results.2]) {
            if let Err(e) = result {
                warn!(
                    provider = %provider,
                    model = %model,
                    window = %window,
                    error = %e,
                    "usage increment failed"
                );
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Snapshot remaining quota for a pair under the given limits.
    ///
    /// A stored record whose window start differs from the current aligned
    /// start counts as zero usage. Metrics without a configured cap read as
    /// `None` ("no limit enforced").
    pub async fn get_quota_status(
        &self,
        provider: &str,
        model: &str,
        limits: &RateLimits,
    ) -> Result<QuotaStatus> {
        let now = self.clock.now_secs();
        let mut status = QuotaStatus::default();

        for window in Window::ALL {
            let request_cap = limits.requests(window);
            let token_cap = limits.tokens(window);
            let quota = status.window_mut(window);
            if request_cap.is_none() && token_cap.is_none() {
                continue;
            }

            let window_start = window.start(now);
            let usage = self
                .store
                .get_usage(&usage_key(provider, model, window))
                .await?
                .filter(|u| u.window_start == window_start);
            let (used_requests, used_tokens) =
                usage.map_or((0, 0), |u| (u.requests, u.tokens));

            quota.requests_remaining = request_cap.map(|cap| cap.saturating_sub(used_requests));
            quota.tokens_remaining = token_cap.map(|cap| cap.saturating_sub(used_tokens));
            quota.resets_at = Some(window.end(now));
        }

        status.cooldown_until = self.get_cooldown_until(provider, model).await?;
        Ok(status)
    }

    /// Gate a request: false when the pair is in cooldown, when any
    /// configured request window is exhausted, or when a configured token
    /// window has fewer tokens left than the estimate (only checked when
    /// `estimated_tokens > 0`).
    pub async fn can_make_request(
        &self,
        provider: &str,
        model: &str,
        limits: &RateLimits,
        estimated_tokens: u64,
    ) -> Result<bool> {
        if self.is_in_cooldown(provider, model).await? {
            debug!(provider = %provider, model = %model, "pair in cooldown");
            return Ok(false);
        }

        let status = self.get_quota_status(provider, model, limits).await?;
        for window in Window::ALL {
            let quota = status.window(window);
            if quota.requests_remaining == Some(0) {
                debug!(
                    provider = %provider,
                    model = %model,
                    window = %window,
                    "request quota exhausted"
                );
                return Ok(false);
            }
            if estimated_tokens > 0 {
                if let Some(tokens_remaining) = quota.tokens_remaining {
                    if tokens_remaining < estimated_tokens {
                        debug!(
                            provider = %provider,
                            model = %model,
                            window = %window,
                            tokens_remaining,
                            estimated_tokens,
                            "token quota insufficient"
                        );
                        return Ok(false);
                    }
                }
            }
        }
        Ok(true)
    }

    /// Mark a pair rate-limited until `reset_at`, or `now + default_cooldown`
    /// when the upstream supplied no reset time.
    pub async fn mark_rate_limited(
        &self,
        provider: &str,
        model: &str,
        reset_at: Option<u64>,
    ) -> Result<()> {
        let expires_at =
            reset_at.unwrap_or_else(|| self.clock.now_secs() + self.default_cooldown.as_secs());
        debug!(provider = %provider, model = %model, expires_at, "marking rate limited");
        self.store
            .set_cooldown(CooldownRecord {
                provider: provider.to_string(),
                model: model.to_string(),
                expires_at,
            })
            .await
    }

    /// Whether the pair currently has an unexpired cooldown.
    pub async fn is_in_cooldown(&self, provider: &str, model: &str) -> Result<bool> {
        Ok(self.store.get_cooldown(provider, model).await?.is_some())
    }

    /// Cooldown expiry for the pair, if any.
    pub async fn get_cooldown_until(&self, provider: &str, model: &str) -> Result<Option<u64>> {
        Ok(self
            .store
            .get_cooldown(provider, model)
            .await?
            .map(|c| c.expires_at))
    }

    /// Drop the pair's cooldown marker.
    pub async fn clear_cooldown(&self, provider: &str, model: &str) -> Result<()> {
        self.store.remove_cooldown(provider, model).await
    }

    /// Latency EMA for a pair, if recorded.
    pub async fn get_latency(&self, provider: &str, model: &str) -> Result<Option<f64>> {
        Ok(self
            .store
            .get_latency(provider, model)
            .await?
            .map(|l| l.avg_ms))
    }

    /// Fold a latency sample into the pair's EMA.
    pub async fn record_latency(&self, provider: &str, model: &str, sample_ms: f64) -> Result<()> {
        self.store
            .update_latency(provider, model, sample_ms)
            .await
            .map(|_| ())
    }
}
