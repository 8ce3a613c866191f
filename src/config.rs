//! Router construction options.
//!
//! Mirrors the shape a caller hands to [`crate::router::Router::new`]:
//! which providers to route across (with API keys and priorities), the
//! selection strategy, alias overrides, timeouts, the retry policy and the
//! state-store backend.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::ProviderKind;

/// Per-provider construction options.
#[derive(Debug, Clone)]
pub struct ProviderOptions {
    pub kind: ProviderKind,
    pub api_key: String,
    /// Lower number = higher precedence for the priority strategy and for
    /// tie-breaks elsewhere.
    pub priority: u32,
    pub enabled: bool,
    /// Marks providers running on promotional credits; exposed on candidates
    /// for cost-aware strategies.
    pub is_free_credits: bool,
    /// Override for the catalog's default base URL.
    pub base_url: Option<String>,
}

impl ProviderOptions {
    pub fn new(kind: ProviderKind, api_key: impl Into<String>) -> Self {
        Self {
            kind,
            api_key: api_key.into(),
            priority: 100,
            enabled: true,
            is_free_credits: false,
            base_url: None,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_free_credits(mut self, is_free_credits: bool) -> Self {
        self.is_free_credits = is_free_credits;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Which built-in routing strategy to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    #[default]
    Priority,
    LeastUsed,
}

impl StrategyKind {
    /// Parse a strategy name (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "priority" => Some(Self::Priority),
            "least-used" | "least_used" | "leastused" => Some(Self::LeastUsed),
            _ => None,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Priority => f.write_str("priority"),
            Self::LeastUsed => f.write_str("least-used"),
        }
    }
}

/// State-store backend selection. Only the in-memory backend ships with the
/// core; file and remote key-value backends plug in through
/// [`crate::store::StateStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StateStoreKind {
    #[default]
    Memory,
    File,
    RemoteKv,
}

/// Retry policy for the execution driver.
///
/// Backoff applies to non-429 failures only; rate-limit signals fail over
/// immediately because waiting offers no benefit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(1_000),
            max_backoff: Duration::from_millis(30_000),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Backoff before the nth retry (1-based):
    /// `min(initial * multiplier^(n-1), max)`.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1);
        let millis =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(exponent as i32);
        Duration::from_millis((millis as u64).min(self.max_backoff.as_millis() as u64))
    }
}

/// Full router construction options.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    pub providers: Vec<ProviderOptions>,
    pub strategy: StrategyKind,
    /// User alias overrides, highest resolution precedence.
    pub model_aliases: HashMap<String, String>,
    /// Per-upstream-call deadline.
    pub timeout: Duration,
    pub retry: RetryConfig,
    pub state_store: StateStoreKind,
    /// When true (default) an exhausted request raises
    /// [`crate::error::RouterError::AllProvidersExhausted`]; when false the
    /// last upstream error propagates instead.
    pub throw_on_exhausted: bool,
    /// Cooldown applied to a 429 without `Retry-After`.
    pub default_cooldown: Duration,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            strategy: StrategyKind::default(),
            model_aliases: HashMap::new(),
            timeout: Duration::from_millis(60_000),
            retry: RetryConfig::default(),
            state_store: StateStoreKind::default(),
            throw_on_exhausted: true,
            default_cooldown: Duration::from_secs(60),
        }
    }
}
