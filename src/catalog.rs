//! Model catalog: canonical ids, aliases, tiers, providers and their limits.
//!
//! The catalog is the read-only half of the router. It is built once at
//! construction (from the compiled-in bundle or from the two YAML documents)
//! and answers three questions per request:
//!
//! - what canonical id (or generic tier token) does this name resolve to?
//! - which providers expose that model, under which provider-specific id?
//! - what rate limits apply to each (provider, model) binding?
//!
//! # Bundle format
//!
//! ```yaml
//! # models.yaml
//! models:
//!   - id: llama-3.3-70b
//!     tier: 3
//!     family: llama
//!     aliases: [llama-3.3-70b-versatile]
//! generic_aliases:
//!   best: { min_tier: 1 }
//!   best-large: { tier: 3 }
//!
//! # providers.yaml
//! providers:
//!   - name: groq
//!     display_name: Groq
//!     base_url: https://api.groq.com/openai/v1
//!     defaults:
//!       limits: { requests_per_minute: 30 }
//!     models:
//!       - canonical: llama-3.3-70b
//!         id: llama-3.3-70b-versatile
//!         limits: { tokens_per_minute: 12000 }
//! ```
//!
//! Per-model `limits` override the provider `defaults.limits` field-wise.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RouterError};
use crate::window::Window;

// ============================================================================
// Provider kinds
// ============================================================================

/// Configured upstream provider kinds. All speak the OpenAI-compatible
/// chat/completions protocol; they differ in base URL, model ids and limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Groq,
    Cerebras,
    #[serde(rename = "sambanova")]
    SambaNova,
    Together,
    OpenRouter,
}

impl ProviderKind {
    /// Parse a provider kind from a string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "groq" => Some(Self::Groq),
            "cerebras" => Some(Self::Cerebras),
            "sambanova" | "samba-nova" => Some(Self::SambaNova),
            "together" | "together-ai" | "togetherai" => Some(Self::Together),
            "openrouter" | "open-router" => Some(Self::OpenRouter),
            _ => None,
        }
    }

    /// Stable lowercase name used in store keys, logs and metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Groq => "groq",
            Self::Cerebras => "cerebras",
            Self::SambaNova => "sambanova",
            Self::Together => "together",
            Self::OpenRouter => "openrouter",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Rate limits
// ============================================================================

/// Optional caps for the six (metric, window) pairs. An unset field means
/// no limit is enforced for that pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests_per_minute: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests_per_hour: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests_per_day: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_per_minute: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_per_hour: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_per_day: Option<u64>,
}

impl RateLimits {
    /// Request cap for the given window, if configured.
    pub fn requests(&self, window: Window) -> Option<u64> {
        match window {
            Window::Minute => self.requests_per_minute,
            Window::Hour => self.requests_per_hour,
            Window::Day => self.requests_per_day,
        }
    }

    /// Token cap for the given window, if configured.
    pub fn tokens(&self, window: Window) -> Option<u64> {
        match window {
            Window::Minute => self.tokens_per_minute,
            Window::Hour => self.tokens_per_hour,
            Window::Day => self.tokens_per_day,
        }
    }

    /// Whether any cap is configured at all.
    pub fn any_configured(&self) -> bool {
        Window::ALL
            .iter()
            .any(|w| self.requests(*w).is_some() || self.tokens(*w).is_some())
    }

    /// Field-wise override: any field set in `other` wins over `self`.
    pub fn overlay(&self, other: &RateLimits) -> RateLimits {
        RateLimits {
            requests_per_minute: other.requests_per_minute.or(self.requests_per_minute),
            requests_per_hour: other.requests_per_hour.or(self.requests_per_hour),
            requests_per_day: other.requests_per_day.or(self.requests_per_day),
            tokens_per_minute: other.tokens_per_minute.or(self.tokens_per_minute),
            tokens_per_hour: other.tokens_per_hour.or(self.tokens_per_hour),
            tokens_per_day: other.tokens_per_day.or(self.tokens_per_day),
        }
    }
}

// ============================================================================
// Model and provider descriptors
// ============================================================================

/// A canonical model known to the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Canonical id, unique across the catalog.
    pub id: String,
    /// Quality tier 1..=5, higher is more capable.
    pub tier: u8,
    /// Model family tag (e.g. "llama", "qwen").
    pub family: String,
    /// Declared aliases, matched case-insensitively.
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Tier predicate a generic alias resolves to. Exactly one form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierSelector {
    /// Candidates must have exactly this tier.
    Exact(u8),
    /// Candidates must have at least this tier.
    AtLeast(u8),
}

impl TierSelector {
    /// Whether a model tier satisfies the predicate.
    pub fn matches(&self, tier: u8) -> bool {
        match self {
            TierSelector::Exact(t) => tier == *t,
            TierSelector::AtLeast(t) => tier >= *t,
        }
    }
}

/// Serde shape for a generic alias: `{tier: N}` or `{min_tier: N}`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GenericAliasSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_tier: Option<u8>,
}

impl GenericAliasSpec {
    fn into_selector(self, name: &str) -> Result<TierSelector> {
        match (self.tier, self.min_tier) {
            (Some(t), None) => Ok(TierSelector::Exact(t)),
            (None, Some(t)) => Ok(TierSelector::AtLeast(t)),
            _ => Err(RouterError::Config(format!(
                "generic alias '{}' must set exactly one of 'tier' or 'min_tier'",
                name
            ))),
        }
    }
}

/// Binding of a canonical model id to a provider-specific id, with the
/// effective limits for that binding (provider defaults already overlaid).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderModel {
    /// Canonical id this binding serves.
    pub canonical: String,
    /// Id the provider expects on the wire.
    pub id: String,
    /// Effective rate limits for this (provider, model) pair.
    #[serde(default)]
    pub limits: RateLimits,
}

/// An upstream provider and the models it exposes. Immutable after load.
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    pub kind: ProviderKind,
    pub display_name: String,
    pub base_url: String,
    pub models: Vec<ProviderModel>,
}

impl ProviderDescriptor {
    /// Find the binding for a canonical id.
    pub fn model(&self, canonical: &str) -> Option<&ProviderModel> {
        self.models.iter().find(|m| m.canonical == canonical)
    }
}

// ============================================================================
// YAML document shapes
// ============================================================================

#[derive(Debug, Deserialize)]
struct ModelsDoc {
    models: Vec<ModelInfo>,
    #[serde(default)]
    generic_aliases: HashMap<String, GenericAliasSpec>,
}

#[derive(Debug, Deserialize)]
struct ProvidersDoc {
    providers: Vec<ProviderSpec>,
}

#[derive(Debug, Deserialize)]
struct ProviderSpec {
    name: ProviderKind,
    display_name: String,
    base_url: String,
    #[serde(default)]
    defaults: ProviderDefaults,
    models: Vec<ProviderModelSpec>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderDefaults {
    #[serde(default)]
    limits: RateLimits,
}

#[derive(Debug, Deserialize)]
struct ProviderModelSpec {
    canonical: String,
    id: String,
    limits: Option<RateLimits>,
}

// ============================================================================
// Catalog
// ============================================================================

/// The loaded catalog. Owned by the router, read-only at runtime.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: HashMap<String, ModelInfo>,
    /// Lowercased alias (including canonical ids) -> canonical id.
    alias_index: HashMap<String, String>,
    /// Lowercased generic alias name -> tier predicate.
    generics: HashMap<String, TierSelector>,
    providers: Vec<ProviderDescriptor>,
    /// Lowercased user-supplied alias -> replacement token. Checked before
    /// the built-in alias index.
    user_aliases: HashMap<String, String>,
}

impl ModelCatalog {
    /// Build a catalog from the two YAML documents of the bundle.
    pub fn from_yaml(models_yaml: &str, providers_yaml: &str) -> Result<Self> {
        let models_doc: ModelsDoc = serde_yaml::from_str(models_yaml)
            .map_err(|e| RouterError::Config(format!("invalid models document: {}", e)))?;
        let providers_doc: ProvidersDoc = serde_yaml::from_str(providers_yaml)
            .map_err(|e| RouterError::Config(format!("invalid providers document: {}", e)))?;

        let mut generics = HashMap::new();
        for (name, spec) in models_doc.generic_aliases {
            generics.insert(name.to_lowercase(), spec.into_selector(&name)?);
        }

        let providers = providers_doc
            .providers
            .into_iter()
            .map(|spec| {
                let defaults = spec.defaults.limits;
                ProviderDescriptor {
                    kind: spec.name,
                    display_name: spec.display_name,
                    base_url: spec.base_url,
                    models: spec
                        .models
                        .into_iter()
                        .map(|m| ProviderModel {
                            limits: defaults.overlay(&m.limits.unwrap_or_default()),
                            canonical: m.canonical,
                            id: m.id,
                        })
                        .collect(),
                }
            })
            .collect();

        Self::build(models_doc.models, generics, providers)
    }

    /// The compiled-in default bundle: free-tier model set across the
    /// supported providers.
    pub fn builtin() -> Self {
        Self::from_yaml(BUILTIN_MODELS_YAML, BUILTIN_PROVIDERS_YAML)
            .expect("builtin catalog bundle is valid")
    }

    fn build(
        models: Vec<ModelInfo>,
        generics: HashMap<String, TierSelector>,
        providers: Vec<ProviderDescriptor>,
    ) -> Result<Self> {
        let mut model_index = HashMap::new();
        let mut alias_index = HashMap::new();

        for model in &models {
            if !(1..=5).contains(&model.tier) {
                return Err(RouterError::Config(format!(
                    "model '{}' has tier {}, expected 1..=5",
                    model.id, model.tier
                )));
            }
            if model_index.contains_key(&model.id) {
                return Err(RouterError::Config(format!(
                    "duplicate canonical model id '{}'",
                    model.id
                )));
            }
            alias_index.insert(model.id.to_lowercase(), model.id.clone());
            for alias in &model.aliases {
                alias_index.insert(alias.to_lowercase(), model.id.clone());
            }
            model_index.insert(model.id.clone(), model.clone());
        }

        // Every provider binding must reference a known canonical id.
        for provider in &providers {
            for binding in &provider.models {
                if !model_index.contains_key(&binding.canonical) {
                    return Err(RouterError::Config(format!(
                        "provider '{}' model '{}' references unknown canonical id '{}'",
                        provider.kind, binding.id, binding.canonical
                    )));
                }
            }
        }

        Ok(Self {
            models: model_index,
            alias_index,
            generics,
            providers,
            user_aliases: HashMap::new(),
        })
    }

    /// Install user-supplied aliases. These take precedence over the
    /// built-in alias map during [`resolve`](Self::resolve).
    pub fn with_user_aliases(mut self, aliases: HashMap<String, String>) -> Self {
        self.user_aliases = aliases
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        self
    }

    /// Resolve a model name to a canonical id or generic token.
    ///
    /// Lookup order: user alias table, then the built-in alias map, matching
    /// case-insensitively on the whole token. Unknown names are returned
    /// unchanged; selection fails later with a typed error.
    pub fn resolve(&self, name: &str) -> String {
        let key = name.to_lowercase();
        if let Some(target) = self.user_aliases.get(&key) {
            return target.clone();
        }
        if let Some(canonical) = self.alias_index.get(&key) {
            return canonical.clone();
        }
        if self.generics.contains_key(&key) {
            return key;
        }
        name.to_string()
    }

    /// Whether a token is a generic alias such as `best-large`.
    pub fn is_generic(&self, name: &str) -> bool {
        self.generics.contains_key(&name.to_lowercase())
    }

    /// Tier predicate behind a generic alias.
    pub fn generic_config(&self, name: &str) -> Option<TierSelector> {
        self.generics.get(&name.to_lowercase()).copied()
    }

    /// Metadata for a canonical id.
    pub fn model(&self, canonical: &str) -> Option<&ModelInfo> {
        self.models.get(canonical)
    }

    /// Quality tier of a canonical id.
    pub fn tier_of(&self, canonical: &str) -> Option<u8> {
        self.models.get(canonical).map(|m| m.tier)
    }

    /// Descriptor for a provider kind, if the bundle carries one.
    pub fn provider(&self, kind: ProviderKind) -> Option<&ProviderDescriptor> {
        self.providers.iter().find(|p| p.kind == kind)
    }

    /// All providers in the bundle.
    pub fn providers(&self) -> &[ProviderDescriptor] {
        &self.providers
    }

    /// Providers exposing a specific canonical id.
    pub fn providers_supporting(
        &self,
        canonical: &str,
    ) -> Vec<(&ProviderDescriptor, &ProviderModel)> {
        self.providers
            .iter()
            .filter_map(|p| p.model(canonical).map(|m| (p, m)))
            .collect()
    }

    /// Providers exposing any model that satisfies a tier predicate.
    pub fn providers_matching(
        &self,
        selector: TierSelector,
    ) -> Vec<(&ProviderDescriptor, &ProviderModel)> {
        let mut out = Vec::new();
        for provider in &self.providers {
            for binding in &provider.models {
                if let Some(tier) = self.tier_of(&binding.canonical) {
                    if selector.matches(tier) {
                        out.push((provider, binding));
                    }
                }
            }
        }
        out
    }
}

// ============================================================================
// Built-in bundle
// ============================================================================

const BUILTIN_MODELS_YAML: &str = r#"
models:
  - id: llama-3.3-70b
    tier: 3
    family: llama
    aliases: [llama-3.3-70b-versatile, llama-3.3-70b-instruct, llama3.3-70b]
  - id: llama-3.1-8b
    tier: 1
    family: llama
    aliases: [llama-3.1-8b-instant, llama3.1-8b]
  - id: qwen-3-32b
    tier: 2
    family: qwen
    aliases: [qwen3-32b]
  - id: deepseek-r1-distill-llama-70b
    tier: 3
    family: deepseek
    aliases: [deepseek-r1-70b, deepseek-r1-distill-70b]
  - id: gpt-oss-120b
    tier: 3
    family: gpt-oss
    aliases: [gpt-oss]

generic_aliases:
  best: { min_tier: 1 }
  best-large: { tier: 3 }
  best-small: { tier: 1 }
  fast: { tier: 1 }
  70b: { tier: 3 }
  32b: { tier: 2 }
  8b: { tier: 1 }
"#;

const BUILTIN_PROVIDERS_YAML: &str = r#"
providers:
  - name: groq
    display_name: Groq
    base_url: https://api.groq.com/openai/v1
    defaults:
      limits: { requests_per_minute: 30, requests_per_day: 1000, tokens_per_minute: 12000 }
    models:
      - canonical: llama-3.3-70b
        id: llama-3.3-70b-versatile
      - canonical: llama-3.1-8b
        id: llama-3.1-8b-instant
        limits: { requests_per_day: 14400, tokens_per_minute: 6000 }
      - canonical: qwen-3-32b
        id: qwen/qwen3-32b
      - canonical: deepseek-r1-distill-llama-70b
        id: deepseek-r1-distill-llama-70b
      - canonical: gpt-oss-120b
        id: openai/gpt-oss-120b

  - name: cerebras
    display_name: Cerebras
    base_url: https://api.cerebras.ai/v1
    defaults:
      limits: { requests_per_minute: 30, requests_per_hour: 900, requests_per_day: 14400, tokens_per_minute: 60000 }
    models:
      - canonical: llama-3.3-70b
        id: llama-3.3-70b
      - canonical: qwen-3-32b
        id: qwen-3-32b
      - canonical: gpt-oss-120b
        id: gpt-oss-120b

  - name: sambanova
    display_name: SambaNova
    base_url: https://api.sambanova.ai/v1
    defaults:
      limits: { requests_per_minute: 30 }
    models:
      - canonical: llama-3.3-70b
        id: Meta-Llama-3.3-70B-Instruct
      - canonical: llama-3.1-8b
        id: Meta-Llama-3.1-8B-Instruct
      - canonical: deepseek-r1-distill-llama-70b
        id: DeepSeek-R1-Distill-Llama-70B

  - name: together
    display_name: Together AI
    base_url: https://api.together.xyz/v1
    defaults:
      limits: { requests_per_minute: 60 }
    models:
      - canonical: llama-3.3-70b
        id: meta-llama/Llama-3.3-70B-Instruct-Turbo
      - canonical: llama-3.1-8b
        id: meta-llama/Meta-Llama-3.1-8B-Instruct-Turbo

  - name: openrouter
    display_name: OpenRouter
    base_url: https://openrouter.ai/api/v1
    defaults:
      limits: { requests_per_minute: 20, requests_per_day: 50 }
    models:
      - canonical: llama-3.3-70b
        id: meta-llama/llama-3.3-70b-instruct
      - canonical: llama-3.1-8b
        id: meta-llama/llama-3.1-8b-instruct
      - canonical: qwen-3-32b
        id: qwen/qwen3-32b
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_bundle_loads() {
        let catalog = ModelCatalog::builtin();
        assert!(catalog.model("llama-3.3-70b").is_some());
        assert_eq!(catalog.tier_of("llama-3.3-70b"), Some(3));
        assert_eq!(catalog.tier_of("qwen-3-32b"), Some(2));
        assert!(!catalog.providers().is_empty());
    }

    #[test]
    fn test_resolve_canonical_and_alias() {
        let catalog = ModelCatalog::builtin();
        assert_eq!(catalog.resolve("llama-3.3-70b"), "llama-3.3-70b");
        assert_eq!(catalog.resolve("llama-3.3-70b-versatile"), "llama-3.3-70b");
        // Case-insensitive on the whole token.
        assert_eq!(catalog.resolve("LLAMA-3.3-70B"), "llama-3.3-70b");
        assert_eq!(catalog.resolve("Qwen3-32B"), "qwen-3-32b");
    }

    #[test]
    fn test_resolve_unknown_passes_through() {
        let catalog = ModelCatalog::builtin();
        assert_eq!(catalog.resolve("gpt-99-ultra"), "gpt-99-ultra");
    }

    #[test]
    fn test_resolve_user_alias_precedence() {
        let catalog = ModelCatalog::builtin().with_user_aliases(
            [("my-model".to_string(), "llama-3.3-70b".to_string()),
             // User alias may shadow a built-in alias.
             ("qwen3-32b".to_string(), "llama-3.1-8b".to_string())]
            .into_iter()
            .collect(),
        );
        assert_eq!(catalog.resolve("My-Model"), "llama-3.3-70b");
        assert_eq!(catalog.resolve("qwen3-32b"), "llama-3.1-8b");
    }

    #[test]
    fn test_generic_aliases() {
        let catalog = ModelCatalog::builtin();
        assert!(catalog.is_generic("best"));
        assert!(catalog.is_generic("BEST-LARGE"));
        assert!(!catalog.is_generic("llama-3.3-70b"));

        assert_eq!(catalog.generic_config("best"), Some(TierSelector::AtLeast(1)));
        assert_eq!(
            catalog.generic_config("best-large"),
            Some(TierSelector::Exact(3))
        );
        assert_eq!(catalog.generic_config("8b"), Some(TierSelector::Exact(1)));
    }

    #[test]
    fn test_resolve_generic_returns_token() {
        let catalog = ModelCatalog::builtin();
        assert_eq!(catalog.resolve("Best-Large"), "best-large");
    }

    #[test]
    fn test_providers_supporting() {
        let catalog = ModelCatalog::builtin();
        let providers = catalog.providers_supporting("llama-3.3-70b");
        assert!(providers.len() >= 4);
        let kinds: Vec<_> = providers.iter().map(|(p, _)| p.kind).collect();
        assert!(kinds.contains(&ProviderKind::Groq));
        assert!(kinds.contains(&ProviderKind::Cerebras));

        // Provider-specific id carried on the binding.
        let (_, groq_binding) = providers
            .iter()
            .find(|(p, _)| p.kind == ProviderKind::Groq)
            .unwrap();
        assert_eq!(groq_binding.id, "llama-3.3-70b-versatile");
    }

    #[test]
    fn test_providers_matching_exact_tier() {
        let catalog = ModelCatalog::builtin();
        let matches = catalog.providers_matching(TierSelector::Exact(3));
        assert!(!matches.is_empty());
        for (_, binding) in &matches {
            assert_eq!(catalog.tier_of(&binding.canonical), Some(3));
        }
    }

    #[test]
    fn test_providers_matching_min_tier() {
        let catalog = ModelCatalog::builtin();
        let all = catalog.providers_matching(TierSelector::AtLeast(1));
        let large = catalog.providers_matching(TierSelector::AtLeast(3));
        assert!(all.len() > large.len());
        for (_, binding) in &large {
            assert!(catalog.tier_of(&binding.canonical).unwrap() >= 3);
        }
    }

    #[test]
    fn test_limits_overlay_field_wise() {
        let defaults = RateLimits {
            requests_per_minute: Some(30),
            requests_per_day: Some(1000),
            tokens_per_minute: Some(12_000),
            ..Default::default()
        };
        let per_model = RateLimits {
            requests_per_day: Some(14_400),
            tokens_per_minute: Some(6_000),
            ..Default::default()
        };
        let effective = defaults.overlay(&per_model);
        assert_eq!(effective.requests_per_minute, Some(30));
        assert_eq!(effective.requests_per_day, Some(14_400));
        assert_eq!(effective.tokens_per_minute, Some(6_000));
        assert_eq!(effective.tokens_per_hour, None);
    }

    #[test]
    fn test_builtin_effective_limits() {
        let catalog = ModelCatalog::builtin();
        let groq = catalog.provider(ProviderKind::Groq).unwrap();

        // Default limits apply where the model declares none.
        let llama70 = groq.model("llama-3.3-70b").unwrap();
        assert_eq!(llama70.limits.requests_per_minute, Some(30));
        assert_eq!(llama70.limits.tokens_per_minute, Some(12_000));

        // Per-model overrides win field-wise.
        let llama8 = groq.model("llama-3.1-8b").unwrap();
        assert_eq!(llama8.limits.requests_per_minute, Some(30));
        assert_eq!(llama8.limits.requests_per_day, Some(14_400));
        assert_eq!(llama8.limits.tokens_per_minute, Some(6_000));
    }

    #[test]
    fn test_unknown_canonical_rejected_at_load() {
        let models = r#"
models:
  - id: llama-3.3-70b
    tier: 3
    family: llama
"#;
        let providers = r#"
providers:
  - name: groq
    display_name: Groq
    base_url: https://api.groq.com/openai/v1
    models:
      - canonical: no-such-model
        id: whatever
"#;
        let err = ModelCatalog::from_yaml(models, providers).unwrap_err();
        let msg = err.to_string();
        // Failure names both sides of the dangling reference.
        assert!(msg.contains("no-such-model"), "{}", msg);
        assert!(msg.contains("groq"), "{}", msg);
    }

    #[test]
    fn test_invalid_tier_rejected() {
        let models = r#"
models:
  - id: overtiered
    tier: 6
    family: test
"#;
        let err = ModelCatalog::from_yaml(models, "providers: []").unwrap_err();
        assert!(err.to_string().contains("tier"));
    }

    #[test]
    fn test_duplicate_canonical_rejected() {
        let models = r#"
models:
  - id: dup
    tier: 1
    family: a
  - id: dup
    tier: 2
    family: b
"#;
        let err = ModelCatalog::from_yaml(models, "providers: []").unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_generic_alias_must_set_exactly_one() {
        let both = r#"
models: []
generic_aliases:
  weird: { tier: 2, min_tier: 1 }
"#;
        assert!(ModelCatalog::from_yaml(both, "providers: []").is_err());

        let neither = r#"
models: []
generic_aliases:
  weird: {}
"#;
        assert!(ModelCatalog::from_yaml(neither, "providers: []").is_err());
    }

    #[test]
    fn test_provider_kind_from_str() {
        assert_eq!(ProviderKind::from_str("groq"), Some(ProviderKind::Groq));
        assert_eq!(ProviderKind::from_str("GROQ"), Some(ProviderKind::Groq));
        assert_eq!(
            ProviderKind::from_str("together-ai"),
            Some(ProviderKind::Together)
        );
        assert_eq!(
            ProviderKind::from_str("open-router"),
            Some(ProviderKind::OpenRouter)
        );
        assert_eq!(ProviderKind::from_str("azure"), None);
    }

    #[test]
    fn test_provider_kind_display() {
        assert_eq!(ProviderKind::SambaNova.to_string(), "sambanova");
        assert_eq!(ProviderKind::OpenRouter.to_string(), "openrouter");
    }

    #[test]
    fn test_tier_selector_matches() {
        assert!(TierSelector::Exact(3).matches(3));
        assert!(!TierSelector::Exact(3).matches(2));
        assert!(!TierSelector::Exact(3).matches(4));
        assert!(TierSelector::AtLeast(2).matches(2));
        assert!(TierSelector::AtLeast(2).matches(5));
        assert!(!TierSelector::AtLeast(2).matches(1));
    }

    #[test]
    fn test_rate_limits_accessors() {
        let limits = RateLimits {
            requests_per_minute: Some(30),
            tokens_per_day: Some(500_000),
            ..Default::default()
        };
        assert_eq!(limits.requests(Window::Minute), Some(30));
        assert_eq!(limits.requests(Window::Hour), None);
        assert_eq!(limits.tokens(Window::Day), Some(500_000));
        assert!(limits.any_configured());
        assert!(!RateLimits::default().any_configured());
    }
}
