//! Candidate selection: resolve a model token, filter, rank, pick.
//!
//! For each request the selector builds an ephemeral candidate list from the
//! catalog, drops providers the driver has excluded and pairs in cooldown,
//! snapshots quota and latency for the survivors, sorts by quality tier
//! descending, and hands the ranked list to the configured strategy. Tier is
//! the first-order discriminator; strategies never cross tiers.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::catalog::{ModelCatalog, ProviderKind, ProviderModel};
use crate::error::{Result, RouterError};
use crate::strategy::RoutingStrategy;
use crate::tracker::{QuotaStatus, RateLimitTracker};
use crate::window::Window;

/// Typed selection failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SelectionError {
    /// The resolved token matches no configured provider.
    #[error("no providers offer model '{0}'")]
    NoMatchingProviders(String),

    /// Providers exist but every candidate was filtered out.
    #[error("no available candidates for model '{0}'")]
    NoAvailableCandidates(String),

    /// The strategy rejected the (non-empty) candidate list.
    #[error("strategy error: {0}")]
    Strategy(String),

    /// A named provider is not part of this router.
    #[error("provider '{0}' not found")]
    ProviderNotFound(String),
}

/// Per-request routing state threaded through selection.
#[derive(Debug, Clone, Default)]
pub struct RoutingContext {
    /// Providers the driver has ruled out for this request.
    pub excluded_providers: HashSet<ProviderKind>,
    /// Retry slots consumed so far.
    pub retry_count: u32,
}

/// A configured provider as the selector sees it: routing attributes only,
/// no transport handle.
#[derive(Debug, Clone)]
pub struct ActiveProvider {
    pub kind: ProviderKind,
    pub display_name: String,
    /// Lower number wins on ties.
    pub priority: u32,
    pub is_free_credits: bool,
}

/// One routable (provider, model) pair, built per request.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub provider: ProviderKind,
    /// Index into the router's provider table, used to find the client.
    pub provider_index: usize,
    /// The provider-specific binding, with effective limits.
    pub binding: ProviderModel,
    /// Quality tier of the bound canonical model.
    pub tier: u8,
    /// Configured provider priority.
    pub priority: u32,
    /// Quota snapshot taken at selection time.
    pub quota: QuotaStatus,
    /// EMA latency in milliseconds, if history exists.
    pub latency_ms: Option<f64>,
    pub is_free_credits: bool,
}

impl Candidate {
    /// Availability in `[0, 1]`: the minimum `remaining / limit` ratio over
    /// every configured (metric, window) pair, so one near-exhausted window
    /// caps the whole score. `1.0` when nothing is capped.
    pub fn availability_score(&self) -> f64 {
        let mut score = 1.0_f64;
        let mut any_limit = false;

        for window in Window::ALL {
            let quota = self.quota.window(window);
            if let (Some(cap), Some(remaining)) =
                (self.binding.limits.requests(window), quota.requests_remaining)
            {
                any_limit = true;
                score = score.min(ratio(remaining, cap));
            }
            if let (Some(cap), Some(remaining)) =
                (self.binding.limits.tokens(window), quota.tokens_remaining)
            {
                any_limit = true;
                score = score.min(ratio(remaining, cap));
            }
        }

        if any_limit {
            score
        } else {
            1.0
        }
    }
}

fn ratio(remaining: u64, cap: u64) -> f64 {
    if cap == 0 {
        0.0
    } else {
        remaining as f64 / cap as f64
    }
}

/// Resolves a model token into a strategy-picked candidate.
pub struct Selector {
    catalog: Arc<ModelCatalog>,
    tracker: Arc<RateLimitTracker>,
    strategy: Arc<dyn RoutingStrategy>,
    providers: Vec<ActiveProvider>,
}

impl Selector {
    pub fn new(
        catalog: Arc<ModelCatalog>,
        tracker: Arc<RateLimitTracker>,
        strategy: Arc<dyn RoutingStrategy>,
        providers: Vec<ActiveProvider>,
    ) -> Self {
        Self {
            catalog,
            tracker,
            strategy,
            providers,
        }
    }

    /// Configured providers, in table order.
    pub fn providers(&self) -> &[ActiveProvider] {
        &self.providers
    }

    /// Look up a configured provider by name.
    pub fn provider_named(&self, name: &str) -> Result<&ActiveProvider> {
        let kind = ProviderKind::from_str(name)
            .ok_or_else(|| SelectionError::ProviderNotFound(name.to_string()))?;
        self.providers
            .iter()
            .find(|p| p.kind == kind)
            .ok_or_else(|| SelectionError::ProviderNotFound(name.to_string()).into())
    }

    /// The catalog this selector resolves against.
    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Run the full pipeline for one request.
    pub async fn select(&self, model: &str, ctx: &RoutingContext) -> Result<Candidate> {
        let resolved = self.catalog.resolve(model);

        // Raw candidate list from the catalog, narrowed to providers this
        // router is actually configured with.
        let raw = match self.catalog.generic_config(&resolved) {
            Some(tier_selector) => self.catalog.providers_matching(tier_selector),
            None => self.catalog.providers_supporting(&resolved),
        };

        let mut pool: Vec<(usize, &ActiveProvider, &ProviderModel)> = Vec::new();
        for (descriptor, binding) in raw {
            if let Some((index, active)) = self
                .providers
                .iter()
                .enumerate()
                .find(|(_, p)| p.kind == descriptor.kind)
            {
                pool.push((index, active, binding));
            }
        }

        if pool.is_empty() {
            return Err(SelectionError::NoMatchingProviders(model.to_string()).into());
        }

        pool.retain(|(_, active, _)| !ctx.excluded_providers.contains(&active.kind));

        // Drop pairs in cooldown before paying for quota snapshots.
        let mut survivors = Vec::with_capacity(pool.len());
        for (index, active, binding) in pool {
            let in_cooldown = self
                .tracker
                .is_in_cooldown(active.kind.as_str(), &binding.canonical)
                .await?;
            if in_cooldown {
                debug!(
                    provider = %active.kind,
                    model = %binding.canonical,
                    "skipping candidate in cooldown"
                );
                continue;
            }
            survivors.push((index, active, binding));
        }

        if survivors.is_empty() {
            return Err(SelectionError::NoAvailableCandidates(model.to_string()).into());
        }

        let mut candidates = Vec::with_capacity(survivors.len());
        for (index, active, binding) in survivors {
            let quota = self
                .tracker
                .get_quota_status(active.kind.as_str(), &binding.canonical, &binding.limits)
                .await?;
            let latency_ms = self
                .tracker
                .get_latency(active.kind.as_str(), &binding.canonical)
                .await?;
            let tier = self
                .catalog
                .tier_of(&binding.canonical)
                .ok_or_else(|| SelectionError::NoMatchingProviders(model.to_string()))?;

            candidates.push(Candidate {
                provider: active.kind,
                provider_index: index,
                binding: binding.clone(),
                tier,
                priority: active.priority,
                quota,
                latency_ms,
                is_free_credits: active.is_free_credits,
            });
        }

        // Stable sort keeps configured provider order inside each tier.
        candidates.sort_by(|a, b| b.tier.cmp(&a.tier));

        let picked = self
            .strategy
            .select(&candidates, ctx)
            .map_err(RouterError::Selection)?;
        if picked >= candidates.len() {
            return Err(SelectionError::Strategy(format!(
                "strategy '{}' returned out-of-range index {}",
                self.strategy.name(),
                picked
            ))
            .into());
        }
        let candidate = candidates.swap_remove(picked);
        debug!(
            provider = %candidate.provider,
            model = %candidate.binding.canonical,
            tier = candidate.tier,
            retry = ctx.retry_count,
            "selected candidate"
        );
        Ok(candidate)
    }
}
