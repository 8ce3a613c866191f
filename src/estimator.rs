//! Pre-flight token estimation.
//!
//! The router needs a token count before the upstream call to gate requests
//! against token-per-window quotas. Counting is intentionally replaceable:
//! the default heuristic is cheap and close enough for Latin-script chat;
//! callers routing code-heavy or non-Latin content can plug a BPE-backed
//! estimator or their own.

use tiktoken_rs::{cl100k_base, CoreBPE};

use crate::types::ChatMessage;

/// Estimates prompt tokens for a message payload.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, messages: &[ChatMessage]) -> u64;
}

/// Character-count heuristic: `ceil(total_chars / 4)` plus a small
/// per-message and per-request overhead for chat framing.
#[derive(Debug, Clone, Copy)]
pub struct HeuristicEstimator {
    per_message_overhead: u64,
    per_request_overhead: u64,
}

impl HeuristicEstimator {
    pub fn new() -> Self {
        Self {
            per_message_overhead: 4,
            per_request_overhead: 3,
        }
    }
}

impl Default for HeuristicEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenEstimator for HeuristicEstimator {
    fn estimate(&self, messages: &[ChatMessage]) -> u64 {
        let total_chars: u64 = messages
            .iter()
            .map(|m| m.content.chars().count() as u64)
            .sum();
        total_chars.div_ceil(4)
            + self.per_message_overhead * messages.len() as u64
            + self.per_request_overhead
    }
}

/// BPE-backed estimator using the cl100k_base encoding. Slower than the
/// heuristic but accurate for content the char/4 rule misjudges.
pub struct TiktokenEstimator {
    encoder: CoreBPE,
    per_message_overhead: u64,
    per_request_overhead: u64,
}

impl TiktokenEstimator {
    pub fn new() -> Self {
        Self {
            encoder: cl100k_base().expect("Failed to load cl100k tokenizer"),
            per_message_overhead: 4,
            per_request_overhead: 3,
        }
    }
}

impl Default for TiktokenEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenEstimator for TiktokenEstimator {
    fn estimate(&self, messages: &[ChatMessage]) -> u64 {
        let content_tokens: u64 = messages
            .iter()
            .map(|m| self.encoder.encode_with_special_tokens(&m.content).len() as u64)
            .sum();
        content_tokens
            + self.per_message_overhead * messages.len() as u64
            + self.per_request_overhead
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heuristic_empty_request() {
        let estimator = HeuristicEstimator::new();
        assert_eq!(estimator.estimate(&[]), 3);
    }

    #[test]
    fn test_heuristic_single_message() {
        let estimator = HeuristicEstimator::new();
        // "hi" -> ceil(2/4) = 1, + 4 per-message + 3 per-request = 8
        let messages = vec![ChatMessage::user("hi")];
        assert_eq!(estimator.estimate(&messages), 8);
    }

    #[test]
    fn test_heuristic_rounds_up() {
        let estimator = HeuristicEstimator::new();
        // 5 chars -> ceil(5/4) = 2
        let messages = vec![ChatMessage::user("hello")];
        assert_eq!(estimator.estimate(&messages), 2 + 4 + 3);
    }

    #[test]
    fn test_heuristic_counts_chars_not_bytes() {
        let estimator = HeuristicEstimator::new();
        // Four multibyte chars count as 4 chars -> 1 token of content.
        let messages = vec![ChatMessage::user("日本語字")];
        assert_eq!(estimator.estimate(&messages), 1 + 4 + 3);
    }

    #[test]
    fn test_heuristic_multiple_messages() {
        let estimator = HeuristicEstimator::new();
        let messages = vec![
            ChatMessage::system("You are terse."), // 14 chars -> 4
            ChatMessage::user("Summarize the report."), // 21 chars -> 6
        ];
        assert_eq!(estimator.estimate(&messages), 4 + 6 + 2 * 4 + 3);
    }

    #[test]
    fn test_tiktoken_counts_tokens() {
        let estimator = TiktokenEstimator::new();
        let messages = vec![ChatMessage::user("Hello, world!")];
        let estimate = estimator.estimate(&messages);
        // 4 content tokens + 4 per-message + 3 per-request.
        assert_eq!(estimate, 4 + 4 + 3);
    }

    #[test]
    fn test_tiktoken_empty_request() {
        let estimator = TiktokenEstimator::new();
        assert_eq!(estimator.estimate(&[]), 3);
    }

    #[test]
    fn test_estimators_agree_on_order_of_magnitude() {
        let heuristic = HeuristicEstimator::new();
        let tiktoken = TiktokenEstimator::new();
        let messages = vec![ChatMessage::user(
            "The quick brown fox jumps over the lazy dog, again and again.",
        )];
        let h = heuristic.estimate(&messages);
        let t = tiktoken.estimate(&messages);
        assert!(h > 0 && t > 0);
        assert!(h.abs_diff(t) < h.max(t), "estimates wildly divergent: {h} vs {t}");
    }
}
