//! The router: a single chat-completion surface over many upstreams.
//!
//! One [`Router`] serves many concurrent requests. Each request runs the
//! select → gate → invoke → classify → failover loop below as its own task,
//! suspending at upstream I/O, store I/O and backoff sleeps; the state store
//! is the only synchronization point between requests.
//!
//! # Driver protocol
//!
//! ```text
//! loop while retries <= max_retries:
//!   select candidate (catalog -> filters -> tier sort -> strategy)
//!   pre-flight gate via tracker; refused -> exclude, continue (no charge)
//!   invoke upstream under the per-call deadline
//!   429  -> cooldown write, exclude, charge retry, continue (no backoff)
//!   fault -> exclude, charge retry, bounded exponential backoff, continue
//!   ok   -> record usage + latency, return with metadata
//! ```
//!
//! When selection comes up empty while retry slots remain and something was
//! already attempted, one retry slot is charged and the per-request exclusion
//! set is cleared; cooldowns and quota gates live in the store, so unhealthy
//! pairs stay pruned. A request can therefore never spin: every pass either
//! returns, charges a slot, or exits.
//!
//! Dropping the returned future cancels at any await point. An in-flight
//! upstream call is aborted; store writes already started run to completion
//! so counters stay consistent. Usage recorded before a cancellation is not
//! unwound.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::catalog::{ModelCatalog, ProviderKind};
use crate::client::{ChatClient, HttpChatClient};
use crate::clock::{Clock, SystemClock};
use crate::config::{ProviderOptions, RetryConfig, RouterOptions, StateStoreKind, StrategyKind};
use crate::error::{Result, RouterError};
use crate::estimator::{HeuristicEstimator, TokenEstimator};
use crate::selection::{ActiveProvider, Candidate, RoutingContext, SelectionError, Selector};
use crate::store::{MemoryStore, StateStore};
use crate::strategy::{LeastUsedStrategy, PriorityStrategy, RoutingStrategy};
use crate::tracker::RateLimitTracker;
use crate::types::{
    ChatCompletionRequest, ChatCompletionResponse, ChatStream, ResponseMetadata, RoutedResponse,
    RoutedStream,
};

/// What one successful upstream invocation produced.
enum Dispatched {
    Full {
        response: ChatCompletionResponse,
        latency_ms: u64,
    },
    Stream(ChatStream),
}

/// Client-side router across OpenAI-compatible providers.
pub struct Router {
    store: Arc<dyn StateStore>,
    tracker: Arc<RateLimitTracker>,
    selector: Selector,
    /// Transport per configured provider, parallel to the selector's table.
    clients: Vec<Arc<dyn ChatClient>>,
    estimator: Arc<dyn TokenEstimator>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    retry: RetryConfig,
    throw_on_exhausted: bool,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("clients", &self.clients.len())
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("throw_on_exhausted", &self.throw_on_exhausted)
            .finish()
    }
}

impl Router {
    /// Build a router from plain options with the built-in catalog.
    pub fn new(options: RouterOptions) -> Result<Self> {
        let mut builder = Router::builder()
            .strategy(options.strategy)
            .timeout(options.timeout)
            .retry(options.retry)
            .state_store(options.state_store)
            .throw_on_exhausted(options.throw_on_exhausted)
            .default_cooldown(options.default_cooldown);
        for (from, to) in options.model_aliases {
            builder = builder.alias(from, to);
        }
        for provider in options.providers {
            builder = builder.provider(provider);
        }
        builder.build()
    }

    pub fn builder() -> RouterBuilder {
        RouterBuilder::default()
    }

    /// The rate-limit tracker backing this router.
    pub fn tracker(&self) -> &RateLimitTracker {
        &self.tracker
    }

    /// Quota snapshot for one configured (provider, model) pair, under the
    /// catalog's effective limits for that binding. Useful for status
    /// surfaces; routing itself snapshots quota during selection.
    pub async fn quota_status(
        &self,
        provider: &str,
        model: &str,
    ) -> Result<crate::tracker::QuotaStatus> {
        let active = self.selector.provider_named(provider)?;
        let canonical = self.selector.catalog().resolve(model);
        let binding = self
            .selector
            .catalog()
            .provider(active.kind)
            .and_then(|descriptor| descriptor.model(&canonical))
            .ok_or_else(|| RouterError::ModelNotFound(model.to_string()))?;
        self.tracker
            .get_quota_status(active.kind.as_str(), &canonical, &binding.limits)
            .await
    }

    /// Route a chat completion and return just the response.
    pub async fn chat(&self, request: &ChatCompletionRequest) -> Result<ChatCompletionResponse> {
        self.chat_with_metadata(request).await.map(|r| r.response)
    }

    /// Route a chat completion and return the response together with
    /// `{provider, model_id, latency_ms, retry_count}`.
    pub async fn chat_with_metadata(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<RoutedResponse> {
        let (dispatched, candidate, retries) = self.drive(request, false).await?;
        match dispatched {
            Dispatched::Full {
                response,
                latency_ms,
            } => Ok(RoutedResponse {
                response,
                metadata: ResponseMetadata {
                    provider: candidate.provider.to_string(),
                    model_id: candidate.binding.canonical,
                    latency_ms: Some(latency_ms),
                    retry_count: retries,
                },
            }),
            Dispatched::Stream(_) => unreachable!("non-streaming drive returned a stream"),
        }
    }

    /// Route a streaming chat completion. The stream is handed to the caller
    /// at first byte; usage is recorded from the token estimate at stream
    /// start and latency is omitted from the metadata.
    pub async fn chat_stream(&self, request: &ChatCompletionRequest) -> Result<RoutedStream> {
        let (dispatched, candidate, retries) = self.drive(request, true).await?;
        match dispatched {
            Dispatched::Stream(stream) => Ok(RoutedStream {
                stream,
                metadata: ResponseMetadata {
                    provider: candidate.provider.to_string(),
                    model_id: candidate.binding.canonical,
                    latency_ms: None,
                    retry_count: retries,
                },
            }),
            Dispatched::Full { .. } => unreachable!("streaming drive returned a full response"),
        }
    }

    /// Close the state store. The router is unusable afterwards.
    pub async fn shutdown(&self) -> Result<()> {
        self.store.close().await
    }

    /// The select → invoke → failover loop shared by both call shapes.
    async fn drive(
        &self,
        request: &ChatCompletionRequest,
        streaming: bool,
    ) -> Result<(Dispatched, Candidate, u32)> {
        let mut excluded: HashSet<ProviderKind> = HashSet::new();
        let mut retries: u32 = 0;
        let mut last_error: Option<RouterError> = None;
        let mut attempted: Vec<(ProviderKind, String)> = Vec::new();
        let estimate = self.estimator.estimate(&request.messages);

        while retries <= self.retry.max_retries {
            let ctx = RoutingContext {
                excluded_providers: excluded.clone(),
                retry_count: retries,
            };
            let candidate = match self.selector.select(&request.model, &ctx).await {
                Ok(candidate) => candidate,
                Err(RouterError::Selection(selection_err)) => {
                    if attempted.is_empty() {
                        // Nothing was ever routable for this request: either
                        // the model is unknown to every configured provider,
                        // or all its pairs are already cooling from earlier
                        // requests.
                        return Err(match selection_err {
                            SelectionError::NoMatchingProviders(model) => {
                                RouterError::ModelNotFound(model)
                            }
                            SelectionError::NoAvailableCandidates(_) => {
                                RouterError::AllProvidersExhausted {
                                    attempted: Vec::new(),
                                    earliest_reset: None,
                                }
                            }
                            other => RouterError::Selection(other),
                        });
                    }
                    if retries < self.retry.max_retries {
                        // Give excluded providers another pass on the next
                        // slot; store-backed cooldowns keep the unhealthy
                        // ones out.
                        retries += 1;
                        excluded.clear();
                        continue;
                    }
                    break;
                }
                Err(other) => return Err(other),
            };

            let provider = candidate.provider;
            let provider_name = provider.as_str();
            let canonical = candidate.binding.canonical.clone();
            if !attempted
                .iter()
                .any(|(p, m)| *p == provider && *m == canonical)
            {
                attempted.push((provider, canonical.clone()));
            }

            // Pre-flight gate. A refusal is a prune, not a failure: the
            // provider is excluded for this pass without charging a retry.
            if !self
                .tracker
                .can_make_request(provider_name, &canonical, &candidate.binding.limits, estimate)
                .await?
            {
                debug!(
                    provider = %provider,
                    model = %canonical,
                    estimate,
                    "pre-flight refused, excluding provider"
                );
                excluded.insert(provider);
                continue;
            }

            let client = Arc::clone(&self.clients[candidate.provider_index]);
            let started = self.clock.now_millis();
            let outcome = self
                .invoke(&client, request, &candidate, streaming, started)
                .await;

            match outcome {
                Ok(dispatched) => {
                    self.settle_success(&dispatched, provider_name, &canonical, estimate)
                        .await;
                    return Ok((dispatched, candidate, retries));
                }
                Err(err) if err.is_rate_limit() => {
                    let reset_at = match &err {
                        RouterError::RateLimited { retry_after, .. } => {
                            retry_after.map(|secs| self.clock.now_secs() + secs)
                        }
                        _ => None,
                    };
                    info!(
                        provider = %provider,
                        model = %canonical,
                        ?reset_at,
                        "rate limited, failing over"
                    );
                    self.tracker
                        .mark_rate_limited(provider_name, &canonical, reset_at)
                        .await?;
                    excluded.insert(provider);
                    retries += 1;
                    last_error = Some(err);
                    // No backoff: waiting on a 429 gains nothing when
                    // another candidate may serve the request now.
                }
                Err(err) => {
                    warn!(
                        provider = %provider,
                        model = %canonical,
                        error = %err,
                        "upstream failed, backing off"
                    );
                    excluded.insert(provider);
                    retries += 1;
                    last_error = Some(err);
                    if retries <= self.retry.max_retries {
                        tokio::time::sleep(self.retry.backoff_for(retries)).await;
                    }
                }
            }
        }

        let mut attempted_names: Vec<String> = Vec::new();
        for (provider, _) in &attempted {
            let name = provider.as_str().to_string();
            if !attempted_names.contains(&name) {
                attempted_names.push(name);
            }
        }
        let mut earliest_reset: Option<u64> = None;
        for (provider, model) in &attempted {
            if let Some(until) = self
                .tracker
                .get_cooldown_until(provider.as_str(), model)
                .await?
            {
                earliest_reset = Some(earliest_reset.map_or(until, |e| e.min(until)));
            }
        }

        if !self.throw_on_exhausted {
            if let Some(err) = last_error {
                return Err(err);
            }
        }
        Err(RouterError::AllProvidersExhausted {
            attempted: attempted_names,
            earliest_reset,
        })
    }

    /// One upstream invocation under the per-call deadline.
    async fn invoke(
        &self,
        client: &Arc<dyn ChatClient>,
        request: &ChatCompletionRequest,
        candidate: &Candidate,
        streaming: bool,
        started_millis: u64,
    ) -> Result<Dispatched> {
        let timeout_err = || RouterError::Timeout {
            provider: candidate.provider.to_string(),
            timeout_ms: self.timeout.as_millis() as u64,
        };

        if streaming {
            match tokio::time::timeout(
                self.timeout,
                client.chat_stream(request, &candidate.binding.id),
            )
            .await
            {
                Ok(Ok(stream)) => Ok(Dispatched::Stream(stream)),
                Ok(Err(err)) => Err(err),
                Err(_) => Err(timeout_err()),
            }
        } else {
            match tokio::time::timeout(self.timeout, client.chat(request, &candidate.binding.id))
                .await
            {
                Ok(Ok(response)) => Ok(Dispatched::Full {
                    response,
                    latency_ms: self.clock.now_millis().saturating_sub(started_millis),
                }),
                Ok(Err(err)) => Err(err),
                Err(_) => Err(timeout_err()),
            }
        }
    }

    /// Post-success accounting. Bookkeeping failures are logged, never
    /// allowed to destroy a successful response.
    async fn settle_success(
        &self,
        dispatched: &Dispatched,
        provider: &str,
        canonical: &str,
        estimate: u64,
    ) {
        match dispatched {
            Dispatched::Full {
                response,
                latency_ms,
            } => {
                if let Err(err) = self
                    .tracker
                    .record_usage(provider, canonical, response.total_tokens())
                    .await
                {
                    warn!(provider = %provider, model = %canonical, error = %err, "usage recording failed");
                }
                if let Err(err) = self
                    .tracker
                    .record_latency(provider, canonical, *latency_ms as f64)
                    .await
                {
                    warn!(provider = %provider, model = %canonical, error = %err, "latency recording failed");
                }
            }
            Dispatched::Stream(_) => {
                // Accounting happens at hand-off with the estimate; the
                // stream's own usage frame is the caller's to observe.
                if let Err(err) = self.tracker.record_usage(provider, canonical, estimate).await {
                    warn!(provider = %provider, model = %canonical, error = %err, "usage recording failed");
                }
            }
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Step-by-step router construction, with injection seams for tests.
#[derive(Default)]
pub struct RouterBuilder {
    providers: Vec<ProviderOptions>,
    strategy: StrategyKind,
    custom_strategy: Option<Arc<dyn RoutingStrategy>>,
    aliases: HashMap<String, String>,
    timeout: Option<Duration>,
    retry: Option<RetryConfig>,
    state_store: StateStoreKind,
    store: Option<Arc<dyn StateStore>>,
    clock: Option<Arc<dyn Clock>>,
    estimator: Option<Arc<dyn TokenEstimator>>,
    catalog: Option<ModelCatalog>,
    clients: HashMap<ProviderKind, Arc<dyn ChatClient>>,
    throw_on_exhausted: Option<bool>,
    default_cooldown: Option<Duration>,
}

impl RouterBuilder {
    /// Add a provider. Order defines tie-break order inside a tier.
    pub fn provider(mut self, options: ProviderOptions) -> Self {
        self.providers.push(options);
        self
    }

    pub fn strategy(mut self, kind: StrategyKind) -> Self {
        self.strategy = kind;
        self
    }

    /// Use a caller-supplied strategy instead of a built-in one.
    pub fn custom_strategy(mut self, strategy: Arc<dyn RoutingStrategy>) -> Self {
        self.custom_strategy = Some(strategy);
        self
    }

    /// Add a user alias; takes precedence over built-in aliases.
    pub fn alias(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.aliases.insert(from.into(), to.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn state_store(mut self, kind: StateStoreKind) -> Self {
        self.state_store = kind;
        self
    }

    /// Use a caller-supplied store backend.
    pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    /// Replace the built-in catalog bundle.
    pub fn catalog(mut self, catalog: ModelCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Inject a transport for one provider. Providers without an injected
    /// client get an [`HttpChatClient`] against their base URL.
    pub fn client_for(mut self, kind: ProviderKind, client: Arc<dyn ChatClient>) -> Self {
        self.clients.insert(kind, client);
        self
    }

    pub fn throw_on_exhausted(mut self, throw: bool) -> Self {
        self.throw_on_exhausted = Some(throw);
        self
    }

    pub fn default_cooldown(mut self, cooldown: Duration) -> Self {
        self.default_cooldown = Some(cooldown);
        self
    }

    pub fn build(mut self) -> Result<Router> {
        let enabled: Vec<ProviderOptions> = self
            .providers
            .drain(..)
            .filter(|p| p.enabled)
            .collect();
        if enabled.is_empty() {
            return Err(RouterError::Config(
                "at least one enabled provider is required".to_string(),
            ));
        }
        {
            let mut seen = HashSet::new();
            for provider in &enabled {
                if !seen.insert(provider.kind) {
                    return Err(RouterError::Config(format!(
                        "provider '{}' configured twice",
                        provider.kind
                    )));
                }
            }
        }

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let catalog = Arc::new(
            self.catalog
                .unwrap_or_else(ModelCatalog::builtin)
                .with_user_aliases(self.aliases),
        );

        let store: Arc<dyn StateStore> = match self.store {
            Some(store) => store,
            None => match self.state_store {
                StateStoreKind::Memory => Arc::new(MemoryStore::new(Arc::clone(&clock))),
                other => {
                    return Err(RouterError::Config(format!(
                        "state store {:?} is not built into the core; supply one via RouterBuilder::store",
                        other
                    )))
                }
            },
        };

        let default_cooldown = self.default_cooldown.unwrap_or(Duration::from_secs(60));
        let tracker = Arc::new(
            RateLimitTracker::new(Arc::clone(&store), Arc::clone(&clock))
                .with_default_cooldown(default_cooldown),
        );

        let strategy: Arc<dyn RoutingStrategy> = match self.custom_strategy {
            Some(strategy) => strategy,
            None => match self.strategy {
                StrategyKind::Priority => Arc::new(PriorityStrategy),
                StrategyKind::LeastUsed => Arc::new(LeastUsedStrategy),
            },
        };

        let mut active = Vec::with_capacity(enabled.len());
        let mut clients: Vec<Arc<dyn ChatClient>> = Vec::with_capacity(enabled.len());
        for options in enabled {
            let descriptor = catalog.provider(options.kind).ok_or_else(|| {
                RouterError::Config(format!(
                    "provider '{}' is not part of the catalog bundle",
                    options.kind
                ))
            })?;
            let client: Arc<dyn ChatClient> = match self.clients.remove(&options.kind) {
                Some(client) => client,
                None => {
                    let base_url = options
                        .base_url
                        .clone()
                        .unwrap_or_else(|| descriptor.base_url.clone());
                    Arc::new(HttpChatClient::new(options.kind, base_url, options.api_key.clone())?)
                }
            };
            debug!(
                provider = %options.kind,
                display = %descriptor.display_name,
                priority = options.priority,
                "configured provider"
            );
            active.push(ActiveProvider {
                kind: options.kind,
                display_name: descriptor.display_name.clone(),
                priority: options.priority,
                is_free_credits: options.is_free_credits,
            });
            clients.push(client);
        }

        let selector = Selector::new(
            Arc::clone(&catalog),
            Arc::clone(&tracker),
            strategy,
            active,
        );

        Ok(Router {
            store,
            tracker,
            selector,
            clients,
            estimator: self
                .estimator
                .unwrap_or_else(|| Arc::new(HeuristicEstimator::new())),
            clock,
            timeout: self.timeout.unwrap_or(Duration::from_millis(60_000)),
            retry: self.retry.unwrap_or_default(),
            throw_on_exhausted: self.throw_on_exhausted.unwrap_or(true),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockChatClient;
    use crate::clock::ManualClock;
    use crate::types::ChatMessage;
    use async_trait::async_trait;

    fn request(model: &str) -> ChatCompletionRequest {
        ChatCompletionRequest::new(model, vec![ChatMessage::user("hi")])
    }

    #[test]
    fn test_empty_provider_list_rejected() {
        let err = Router::builder().build().unwrap_err();
        assert!(matches!(err, RouterError::Config(_)));
    }

    #[test]
    fn test_all_disabled_rejected() {
        let err = Router::builder()
            .provider(ProviderOptions::new(ProviderKind::Groq, "k").disabled())
            .build()
            .unwrap_err();
        assert!(matches!(err, RouterError::Config(_)));
    }

    #[test]
    fn test_duplicate_provider_rejected() {
        let err = Router::builder()
            .provider(ProviderOptions::new(ProviderKind::Groq, "k1"))
            .provider(ProviderOptions::new(ProviderKind::Groq, "k2"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("twice"));
    }

    #[test]
    fn test_non_memory_store_kind_needs_injection() {
        let err = Router::builder()
            .provider(ProviderOptions::new(ProviderKind::Groq, "k"))
            .state_store(StateStoreKind::File)
            .build()
            .unwrap_err();
        assert!(matches!(err, RouterError::Config(_)));
    }

    #[test]
    fn test_build_with_defaults() {
        let router = Router::builder()
            .provider(ProviderOptions::new(ProviderKind::Groq, "k"))
            .build()
            .unwrap();
        assert_eq!(router.retry.max_retries, 3);
        assert_eq!(router.timeout, Duration::from_millis(60_000));
        assert!(router.throw_on_exhausted);
    }

    #[test]
    fn test_router_new_from_options() {
        let options = RouterOptions {
            providers: vec![ProviderOptions::new(ProviderKind::Cerebras, "k")],
            strategy: StrategyKind::LeastUsed,
            ..Default::default()
        };
        assert!(Router::new(options).is_ok());
    }

    #[tokio::test]
    async fn test_chat_routes_to_mock() {
        let mock = Arc::new(MockChatClient::new(ProviderKind::Groq));
        mock.add_response("routed!").await;
        let router = Router::builder()
            .provider(ProviderOptions::new(ProviderKind::Groq, "k").with_priority(0))
            .client_for(ProviderKind::Groq, mock.clone())
            .build()
            .unwrap();

        let routed = router
            .chat_with_metadata(&request("llama-3.3-70b"))
            .await
            .unwrap();
        assert_eq!(routed.response.choices[0].message.content, "routed!");
        assert_eq!(routed.metadata.provider, "groq");
        assert_eq!(routed.metadata.model_id, "llama-3.3-70b");
        assert_eq!(routed.metadata.retry_count, 0);
        assert!(routed.metadata.latency_ms.is_some());
        // The wire saw the provider-specific id.
        assert_eq!(mock.called_models().await, vec!["llama-3.3-70b-versatile"]);
    }

    #[tokio::test]
    async fn test_unknown_model_is_model_not_found() {
        let router = Router::builder()
            .provider(ProviderOptions::new(ProviderKind::Groq, "k"))
            .client_for(
                ProviderKind::Groq,
                Arc::new(MockChatClient::new(ProviderKind::Groq)),
            )
            .build()
            .unwrap();
        let err = router.chat(&request("no-such-model")).await.unwrap_err();
        assert!(matches!(err, RouterError::ModelNotFound(ref m) if m == "no-such-model"));
    }

    /// A client whose calls never complete; used to exercise the deadline.
    struct HangingClient;

    #[async_trait]
    impl ChatClient for HangingClient {
        async fn chat(
            &self,
            _request: &ChatCompletionRequest,
            _model_id: &str,
        ) -> Result<ChatCompletionResponse> {
            futures::future::pending().await
        }

        async fn chat_stream(
            &self,
            _request: &ChatCompletionRequest,
            _model_id: &str,
        ) -> Result<ChatStream> {
            futures::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_provider_fault_then_exhausted() {
        let clock = ManualClock::at_secs(1_700_000_000);
        let router = Router::builder()
            .provider(ProviderOptions::new(ProviderKind::Groq, "k"))
            .client_for(ProviderKind::Groq, Arc::new(HangingClient))
            .clock(clock)
            .timeout(Duration::from_millis(50))
            .retry(RetryConfig {
                max_retries: 1,
                initial_backoff: Duration::from_millis(10),
                ..Default::default()
            })
            .build()
            .unwrap();

        let err = router.chat(&request("llama-3.3-70b")).await.unwrap_err();
        match err {
            RouterError::AllProvidersExhausted { attempted, .. } => {
                assert_eq!(attempted, vec!["groq"]);
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_throw_on_exhausted_false_propagates_last_error() {
        let mock = Arc::new(MockChatClient::new(ProviderKind::Groq));
        mock.add_error(500, "boom 1").await;
        mock.add_error(500, "boom 2").await;
        let router = Router::builder()
            .provider(ProviderOptions::new(ProviderKind::Groq, "k"))
            .client_for(ProviderKind::Groq, mock.clone())
            .throw_on_exhausted(false)
            .retry(RetryConfig {
                max_retries: 2,
                initial_backoff: Duration::from_millis(1),
                ..Default::default()
            })
            .build()
            .unwrap();

        let err = router.chat(&request("llama-3.3-70b")).await.unwrap_err();
        match err {
            RouterError::Provider { message, .. } => assert_eq!(message, "boom 2"),
            other => panic!("expected last provider error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_quota_status_surface() {
        let mock = Arc::new(MockChatClient::new(ProviderKind::Groq));
        mock.add_response("ok").await;
        let router = Router::builder()
            .provider(ProviderOptions::new(ProviderKind::Groq, "k"))
            .client_for(ProviderKind::Groq, mock)
            .build()
            .unwrap();

        router.chat(&request("llama-3.3-70b")).await.unwrap();
        let status = router.quota_status("groq", "llama-3.3-70b").await.unwrap();
        // Builtin groq minute cap is 30 requests.
        assert_eq!(status.minute.requests_remaining, Some(29));

        // Unknown provider name is a typed selection failure.
        let err = router
            .quota_status("azure", "llama-3.3-70b")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RouterError::Selection(SelectionError::ProviderNotFound(_))
        ));

        // A provider that exists but is not configured in this router.
        let err = router
            .quota_status("cerebras", "llama-3.3-70b")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RouterError::Selection(SelectionError::ProviderNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_latency_ema_recorded_on_success() {
        let mock = Arc::new(MockChatClient::new(ProviderKind::Groq));
        mock.add_response("ok").await;
        let router = Router::builder()
            .provider(ProviderOptions::new(ProviderKind::Groq, "k"))
            .client_for(ProviderKind::Groq, mock)
            .build()
            .unwrap();

        router.chat(&request("llama-3.3-70b")).await.unwrap();
        let latency = router
            .tracker()
            .get_latency("groq", "llama-3.3-70b")
            .await
            .unwrap();
        assert!(latency.is_some());
    }

    #[tokio::test]
    async fn test_shutdown_clears_store() {
        let router = Router::builder()
            .provider(ProviderOptions::new(ProviderKind::Groq, "k"))
            .client_for(
                ProviderKind::Groq,
                Arc::new(MockChatClient::new(ProviderKind::Groq)),
            )
            .build()
            .unwrap();
        router.chat(&request("llama-3.3-70b")).await.unwrap();
        router.shutdown().await.unwrap();
    }
}
