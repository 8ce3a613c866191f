//! OpenAI-compatible wire types.
//!
//! The router only inspects `model` and `messages`; every other request
//! field passes through to the upstream verbatim, which is why the optional
//! knobs are plain serde fields with `skip_serializing_if` rather than a
//! typed options struct.

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::Result;

// ============================================================================
// Request
// ============================================================================

/// Role of a chat message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Chat-completion request in the OpenAI chat/completions schema.
///
/// `model` may be a canonical id, a declared alias, or a generic alias such
/// as `best-large`; resolution happens in the catalog before dispatch. The
/// upstream client rewrites `model` to the provider-specific id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
}

impl ChatCompletionRequest {
    /// Minimal request with just a model and messages.
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            top_p: None,
            n: None,
            stream: None,
            stop: None,
            max_tokens: None,
            presence_penalty: None,
            frequency_penalty: None,
            tools: None,
            tool_choice: None,
            response_format: None,
            seed: None,
        }
    }

    /// Whether the caller asked for a streaming response.
    pub fn wants_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }
}

// ============================================================================
// Response
// ============================================================================

/// Token accounting reported by the upstream.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// One completion choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: ChatMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Chat-completion response in the OpenAI schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<Choice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatCompletionResponse {
    /// Total tokens reported by the upstream, zero when usage is absent.
    pub fn total_tokens(&self) -> u64 {
        self.usage.map(|u| u.total_tokens).unwrap_or(0)
    }
}

// ============================================================================
// Streaming
// ============================================================================

/// Incremental message content inside a stream chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<ChatRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// One streamed choice delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// One SSE chunk of a streaming completion. The `[DONE]` sentinel is consumed
/// by the upstream client and never surfaces here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

/// Boxed stream of completion chunks.
pub type ChatStream = BoxStream<'static, Result<ChatCompletionChunk>>;

// ============================================================================
// Router metadata
// ============================================================================

/// Routing metadata attached to a completed (or handed-off) request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// Provider that served the request.
    pub provider: String,
    /// Canonical model id that was routed.
    pub model_id: String,
    /// Wall-clock latency of the winning upstream call. Absent for
    /// streaming responses, where the call returns at first byte.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// How many retry slots were consumed before success.
    pub retry_count: u32,
}

/// A completion plus the routing metadata that produced it.
#[derive(Debug, Clone)]
pub struct RoutedResponse {
    pub response: ChatCompletionResponse,
    pub metadata: ResponseMetadata,
}

/// A chunk stream plus the routing metadata that produced it.
pub struct RoutedStream {
    pub stream: ChatStream,
    pub metadata: ResponseMetadata,
}
