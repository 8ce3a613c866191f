//! llm-router - Client-Side Routing Across LLM Providers
//!
//! One chat-completion interface over several OpenAI-compatible upstreams,
//! with per-(provider, model) quota accounting, cooldown-aware candidate
//! selection and bounded failover.
//!
//! This crate provides:
//! - A model catalog with canonical ids, aliases and generic tier aliases
//!   (`best`, `best-large`, `70b`, ...)
//! - Tumbling-window usage counters (minute/hour/day) behind a pluggable
//!   state store
//! - A rate-limit tracker that gates requests and manages 429 cooldowns
//! - Pluggable routing strategies (priority, least-used)
//! - An execution driver that invokes the chosen upstream, classifies
//!   failures and fails over with bounded retry
//!
//! # Architecture
//!
//! ```text
//! request ── Router (driver loop)
//!               │ select        ┌─ ModelCatalog (ids, tiers, limits)
//!               ├───────────────┤
//!               │               └─ RateLimitTracker ── StateStore
//!               │ pick             (quota, cooldowns)   (memory, ...)
//!               ├── RoutingStrategy
//!               │ invoke
//!               └── ChatClient per provider (HTTP + SSE)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use llm_router::{ChatCompletionRequest, ChatMessage, ProviderKind, ProviderOptions, Router};
//!
//! let router = Router::builder()
//!     .provider(ProviderOptions::new(ProviderKind::Groq, api_key).with_priority(0))
//!     .provider(ProviderOptions::new(ProviderKind::Cerebras, other_key).with_priority(1))
//!     .build()?;
//!
//! let request = ChatCompletionRequest::new("best-large", vec![ChatMessage::user("hi")]);
//! let routed = router.chat_with_metadata(&request).await?;
//! println!("{} served by {}", routed.response.id, routed.metadata.provider);
//! ```

pub mod catalog;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod estimator;
pub mod router;
pub mod selection;
pub mod store;
pub mod strategy;
pub mod tracker;
pub mod types;
pub mod window;

pub use catalog::{
    GenericAliasSpec, ModelCatalog, ModelInfo, ProviderDescriptor, ProviderKind, ProviderModel,
    RateLimits, TierSelector,
};
pub use client::{ChatClient, HttpChatClient, MockChatClient};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    ProviderOptions, RetryConfig, RouterOptions, StateStoreKind, StrategyKind,
};
pub use error::{Result, RouterError};
pub use estimator::{HeuristicEstimator, TiktokenEstimator, TokenEstimator};
pub use router::{Router, RouterBuilder};
pub use selection::{ActiveProvider, Candidate, RoutingContext, SelectionError, Selector};
pub use store::{CooldownRecord, LatencyRecord, MemoryStore, StateStore, UsageRecord};
pub use strategy::{LeastUsedStrategy, PriorityStrategy, RoutingStrategy, SCORE_EPSILON};
pub use tracker::{QuotaStatus, RateLimitTracker, WindowQuota, DEFAULT_COOLDOWN};
pub use types::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ChatRole,
    ChatStream, Choice, ChunkChoice, ChunkDelta, ResponseMetadata, RoutedResponse, RoutedStream,
    Usage,
};
pub use window::{usage_key, Window};
