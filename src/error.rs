//! Router error types.
//!
//! # Error Handling Philosophy
//!
//! Errors should be:
//! 1. **Actionable**: tell the caller what to do, not just what went wrong
//! 2. **Specific**: include relevant context (provider, model, reset times)
//! 3. **Classifiable**: the driver must distinguish a rate-limit signal
//!    (fail over immediately, no backoff) from a transient provider fault
//!    (back off, then fail over) from a terminal condition (surface)
//!
//! # Taxonomy
//!
//! | Error | Origin | Driver behavior |
//! |-------|--------|-----------------|
//! | `Config` | construction | fatal, raised before any request |
//! | `ModelNotFound` | selection | surfaced to caller |
//! | `RateLimited` | upstream 429 | cooldown write + immediate failover |
//! | `Provider` | upstream 5xx / transport | backoff + failover |
//! | `Timeout` | per-call deadline | treated as `Provider` |
//! | `AllProvidersExhausted` | driver | terminal when `throw_on_exhausted` |
//! | `Store` | state store | propagated, never swallowed |

use thiserror::Error;

use crate::selection::SelectionError;

/// Result type for router operations.
pub type Result<T> = std::result::Result<T, RouterError>;

/// Errors that can occur while routing a chat completion.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Invalid router or catalog configuration. Fatal at construction.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The requested model matches no configured provider.
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Upstream returned HTTP 429. Internal signal; the driver converts it
    /// into a cooldown write and an immediate failover.
    #[error("Rate limited by {provider} for {model}")]
    RateLimited {
        provider: String,
        model: String,
        /// Parsed `Retry-After` header, in seconds.
        retry_after: Option<u64>,
    },

    /// Any non-429 HTTP or transport error from an upstream.
    #[error("Provider {provider} error{}: {message}", .status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Provider {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    /// Per-call deadline exceeded. Classified like a provider fault.
    #[error("Request to {provider} timed out after {timeout_ms} ms")]
    Timeout { provider: String, timeout_ms: u64 },

    /// The driver ran out of candidates and retry slots.
    #[error("All providers exhausted after trying [{}]{}", .attempted.join(", "), .earliest_reset.map(|t| format!(", earliest reset at {t}")).unwrap_or_default())]
    AllProvidersExhausted {
        /// Provider names attempted for this request, first-attempt order.
        attempted: Vec<String>,
        /// Earliest cooldown expiry among attempted pairs (unix seconds).
        earliest_reset: Option<u64>,
    },

    /// Candidate selection failed.
    #[error("Selection failed: {0}")]
    Selection(#[from] SelectionError),

    /// State store read or write failed.
    #[error("State store error: {0}")]
    Store(String),

    /// Request or response (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for RouterError {
    fn from(err: reqwest::Error) -> Self {
        let provider = err
            .url()
            .and_then(|u| u.host_str())
            .unwrap_or("unknown")
            .to_string();
        RouterError::Provider {
            provider,
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

impl RouterError {
    /// Whether the driver should fail over to another provider immediately,
    /// skipping the exponential backoff sleep. True only for rate-limit
    /// signals: waiting on a 429 offers no benefit when another candidate
    /// may serve the request now.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, RouterError::RateLimited { .. })
    }

    /// Whether the error counts as a provider fault the driver may retry
    /// against a different candidate (with backoff).
    pub fn is_provider_fault(&self) -> bool {
        matches!(
            self,
            RouterError::Provider { .. } | RouterError::Timeout { .. }
        )
    }

    /// Whether the error is terminal for the current request.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RouterError::Config(_)
                | RouterError::ModelNotFound(_)
                | RouterError::AllProvidersExhausted { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_config() {
        let err = RouterError::Config("empty provider list".to_string());
        assert_eq!(err.to_string(), "Configuration error: empty provider list");
    }

    #[test]
    fn test_display_model_not_found() {
        let err = RouterError::ModelNotFound("gpt-99".to_string());
        assert_eq!(err.to_string(), "Model not found: gpt-99");
    }

    #[test]
    fn test_display_rate_limited() {
        let err = RouterError::RateLimited {
            provider: "groq".to_string(),
            model: "llama-3.3-70b".to_string(),
            retry_after: Some(30),
        };
        assert_eq!(err.to_string(), "Rate limited by groq for llama-3.3-70b");
    }

    #[test]
    fn test_display_provider_with_status() {
        let err = RouterError::Provider {
            provider: "cerebras".to_string(),
            status: Some(503),
            message: "service unavailable".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Provider cerebras error (status 503): service unavailable"
        );
    }

    #[test]
    fn test_display_provider_without_status() {
        let err = RouterError::Provider {
            provider: "cerebras".to_string(),
            status: None,
            message: "connection reset".to_string(),
        };
        assert_eq!(err.to_string(), "Provider cerebras error: connection reset");
    }

    #[test]
    fn test_display_timeout() {
        let err = RouterError::Timeout {
            provider: "together".to_string(),
            timeout_ms: 60_000,
        };
        assert_eq!(
            err.to_string(),
            "Request to together timed out after 60000 ms"
        );
    }

    #[test]
    fn test_display_exhausted() {
        let err = RouterError::AllProvidersExhausted {
            attempted: vec!["groq".to_string(), "cerebras".to_string()],
            earliest_reset: Some(1_700_000_060),
        };
        let msg = err.to_string();
        assert!(msg.contains("groq, cerebras"));
        assert!(msg.contains("1700000060"));
    }

    #[test]
    fn test_display_exhausted_without_reset() {
        let err = RouterError::AllProvidersExhausted {
            attempted: vec!["groq".to_string()],
            earliest_reset: None,
        };
        assert_eq!(
            err.to_string(),
            "All providers exhausted after trying [groq]"
        );
    }

    #[test]
    fn test_is_rate_limit() {
        let rl = RouterError::RateLimited {
            provider: "groq".to_string(),
            model: "llama-3.3-70b".to_string(),
            retry_after: None,
        };
        assert!(rl.is_rate_limit());
        assert!(!rl.is_provider_fault());

        let pf = RouterError::Provider {
            provider: "groq".to_string(),
            status: Some(500),
            message: "boom".to_string(),
        };
        assert!(!pf.is_rate_limit());
    }

    #[test]
    fn test_is_provider_fault() {
        assert!(RouterError::Provider {
            provider: "p".to_string(),
            status: Some(502),
            message: "bad gateway".to_string(),
        }
        .is_provider_fault());

        assert!(RouterError::Timeout {
            provider: "p".to_string(),
            timeout_ms: 1000,
        }
        .is_provider_fault());

        assert!(!RouterError::ModelNotFound("m".to_string()).is_provider_fault());
    }

    #[test]
    fn test_is_terminal() {
        assert!(RouterError::Config("x".to_string()).is_terminal());
        assert!(RouterError::ModelNotFound("m".to_string()).is_terminal());
        assert!(RouterError::AllProvidersExhausted {
            attempted: vec![],
            earliest_reset: None,
        }
        .is_terminal());
        assert!(!RouterError::Store("io".to_string()).is_terminal());
    }

    #[test]
    fn test_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: RouterError = json_err.into();
        assert!(matches!(err, RouterError::Serialization(_)));
    }
}
