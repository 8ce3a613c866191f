//! Upstream chat clients.
//!
//! Every configured provider speaks the OpenAI chat/completions protocol:
//! POST `{base}/chat/completions` with a JSON body, `Authorization: Bearer`
//! and, for streaming, `Accept: text/event-stream` with a `[DONE]`-terminated
//! SSE body. [`HttpChatClient`] is the production transport;
//! [`MockChatClient`] scripts outcomes for tests without network access.
//!
//! The client owns protocol concerns only. Classifying a 429 into a cooldown,
//! retrying, and failing over are the driver's job; the client's contract is
//! to surface a 429 as [`RouterError::RateLimited`] with the parsed
//! `Retry-After` value and everything else as [`RouterError::Provider`].

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::catalog::ProviderKind;
use crate::error::{Result, RouterError};
use crate::types::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ChatRole,
    ChatStream, Choice, ChunkChoice, ChunkDelta, Usage,
};

/// Transport to one upstream provider.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Non-streaming completion. `model_id` is the provider-specific id the
    /// request's `model` field is rewritten to.
    async fn chat(
        &self,
        request: &ChatCompletionRequest,
        model_id: &str,
    ) -> Result<ChatCompletionResponse>;

    /// Streaming completion. SSE parsing happens here; the returned stream
    /// yields parsed chunks and ends when the `[DONE]` sentinel arrives.
    async fn chat_stream(&self, request: &ChatCompletionRequest, model_id: &str)
        -> Result<ChatStream>;
}

/// Parse a decimal-seconds `Retry-After` header.
fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

/// Error body in the OpenAI error envelope.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

// ============================================================================
// HTTP client
// ============================================================================

/// Reqwest-backed client for one provider endpoint.
pub struct HttpChatClient {
    client: Client,
    provider: ProviderKind,
    base_url: String,
    api_key: String,
}

impl HttpChatClient {
    pub fn new(provider: ProviderKind, base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| RouterError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            provider,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Rewrite the routed request for the wire: provider-specific model id
    /// and an explicit stream flag.
    fn wire_request(
        &self,
        request: &ChatCompletionRequest,
        model_id: &str,
        stream: bool,
    ) -> ChatCompletionRequest {
        let mut wire = request.clone();
        wire.model = model_id.to_string();
        wire.stream = Some(stream);
        wire
    }

    fn classify_status(
        &self,
        status: u16,
        headers: &HeaderMap,
        body: &str,
        model_id: &str,
    ) -> RouterError {
        if status == 429 {
            return RouterError::RateLimited {
                provider: self.provider.to_string(),
                model: model_id.to_string(),
                retry_after: parse_retry_after(headers),
            };
        }
        let message = serde_json::from_str::<ErrorResponse>(body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| body.chars().take(500).collect());
        RouterError::Provider {
            provider: self.provider.to_string(),
            status: Some(status),
            message,
        }
    }
}

#[async_trait]
impl ChatClient for HttpChatClient {
    async fn chat(
        &self,
        request: &ChatCompletionRequest,
        model_id: &str,
    ) -> Result<ChatCompletionResponse> {
        let url = self.chat_completions_url();
        let wire = self.wire_request(request, model_id, false);
        debug!(provider = %self.provider, model = %model_id, url = %url, "dispatching chat request");

        let response = self
            .client
            .post(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&wire)
            .send()
            .await
            .map_err(|e| RouterError::Provider {
                provider: self.provider.to_string(),
                status: None,
                message: format!("failed to reach {}: {}", url, e),
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(|e| RouterError::Provider {
            provider: self.provider.to_string(),
            status: Some(status.as_u16()),
            message: format!("failed to read response body: {}", e),
        })?;

        if !status.is_success() {
            warn!(provider = %self.provider, status = status.as_u16(), "upstream error");
            return Err(self.classify_status(status.as_u16(), &headers, &body, model_id));
        }

        serde_json::from_str(&body).map_err(|e| RouterError::Provider {
            provider: self.provider.to_string(),
            status: Some(status.as_u16()),
            message: format!(
                "failed to parse response: {} | body preview: {}",
                e,
                body.chars().take(200).collect::<String>()
            ),
        })
    }

    async fn chat_stream(
        &self,
        request: &ChatCompletionRequest,
        model_id: &str,
    ) -> Result<ChatStream> {
        use reqwest_eventsource::{Error as SseError, Event, EventSource};

        let url = self.chat_completions_url();
        let wire = self.wire_request(request, model_id, true);
        debug!(provider = %self.provider, model = %model_id, url = %url, "dispatching stream request");

        let req_builder = self
            .client
            .post(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(header::ACCEPT, "text/event-stream")
            .json(&wire);

        let mut event_source = EventSource::new(req_builder).map_err(|e| RouterError::Provider {
            provider: self.provider.to_string(),
            status: None,
            message: format!("failed to open event source: {}", e),
        })?;

        // Drive the source until the connection is up so that a 429 or any
        // other connect-time failure surfaces from this call rather than
        // from the first stream poll. A data frame arriving before the open
        // notification is kept and replayed at the head of the stream.
        let mut head: Option<Result<ChatCompletionChunk>> = None;
        loop {
            match event_source.next().await {
                Some(Ok(Event::Open)) => break,
                Some(Ok(Event::Message(msg))) => {
                    if msg.data.trim() == "[DONE]" {
                        event_source.close();
                        return Ok(stream::empty().boxed());
                    }
                    head = Some(parse_chunk(&self.provider.to_string(), &msg.data));
                    break;
                }
                Some(Err(SseError::InvalidStatusCode(status, response))) => {
                    let headers = response.headers().clone();
                    let body = response.text().await.unwrap_or_default();
                    return Err(self.classify_status(status.as_u16(), &headers, &body, model_id));
                }
                Some(Err(e)) => {
                    return Err(RouterError::Provider {
                        provider: self.provider.to_string(),
                        status: None,
                        message: format!("stream connect failed: {}", e),
                    });
                }
                None => {
                    return Err(RouterError::Provider {
                        provider: self.provider.to_string(),
                        status: None,
                        message: "stream closed before opening".to_string(),
                    });
                }
            }
        }

        let provider = self.provider.to_string();
        let tail = stream::unfold(event_source, move |mut es| {
            let provider = provider.clone();
            async move {
                loop {
                    match es.next().await {
                        Some(Ok(Event::Open)) => continue,
                        Some(Ok(Event::Message(msg))) => {
                            if msg.data.trim() == "[DONE]" {
                                es.close();
                                return None;
                            }
                            return Some((parse_chunk(&provider, &msg.data), es));
                        }
                        Some(Err(SseError::StreamEnded)) | None => {
                            es.close();
                            return None;
                        }
                        Some(Err(e)) => {
                            es.close();
                            return Some((
                                Err(RouterError::Provider {
                                    provider: provider.clone(),
                                    status: None,
                                    message: format!("stream error: {}", e),
                                }),
                                es,
                            ));
                        }
                    }
                }
            }
        });

        Ok(stream::iter(head).chain(tail).boxed())
    }
}

/// Parse one SSE data frame into a chunk.
fn parse_chunk(provider: &str, data: &str) -> Result<ChatCompletionChunk> {
    serde_json::from_str::<ChatCompletionChunk>(data).map_err(|e| {
        warn!(provider = %provider, error = %e, "failed to parse stream chunk");
        RouterError::Provider {
            provider: provider.to_string(),
            status: None,
            message: format!("stream parse error: {}", e),
        }
    })
}

// ============================================================================
// Mock client
// ============================================================================

/// A scripted outcome the mock will produce.
#[derive(Debug, Clone)]
enum MockOutcome {
    Response {
        content: String,
        usage: Usage,
    },
    RateLimited {
        retry_after: Option<u64>,
    },
    Error {
        status: u16,
        message: String,
    },
}

/// Deterministic in-memory client for tests. Outcomes are consumed FIFO; an
/// empty queue yields a default completion, mirroring real mock providers.
pub struct MockChatClient {
    provider: ProviderKind,
    outcomes: Mutex<Vec<MockOutcome>>,
    calls: Mutex<Vec<String>>,
}

impl MockChatClient {
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            outcomes: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful completion with default usage (12 prompt + 8
    /// completion tokens).
    pub async fn add_response(&self, content: impl Into<String>) {
        self.add_response_with_usage(content, 12, 8).await;
    }

    /// Queue a successful completion with explicit usage.
    pub async fn add_response_with_usage(
        &self,
        content: impl Into<String>,
        prompt_tokens: u64,
        completion_tokens: u64,
    ) {
        self.outcomes.lock().await.push(MockOutcome::Response {
            content: content.into(),
            usage: Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
        });
    }

    /// Queue a 429 with an optional `Retry-After` value.
    pub async fn add_rate_limited(&self, retry_after: Option<u64>) {
        self.outcomes
            .lock()
            .await
            .push(MockOutcome::RateLimited { retry_after });
    }

    /// Queue a non-429 provider failure.
    pub async fn add_error(&self, status: u16, message: impl Into<String>) {
        self.outcomes.lock().await.push(MockOutcome::Error {
            status,
            message: message.into(),
        });
    }

    /// Number of upstream calls observed (streaming included).
    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    /// Provider-specific model ids seen, in call order.
    pub async fn called_models(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    async fn next_outcome(&self, model_id: &str) -> MockOutcome {
        self.calls.lock().await.push(model_id.to_string());
        let mut outcomes = self.outcomes.lock().await;
        if outcomes.is_empty() {
            MockOutcome::Response {
                content: "Mock response".to_string(),
                usage: Usage {
                    prompt_tokens: 12,
                    completion_tokens: 8,
                    total_tokens: 20,
                },
            }
        } else {
            outcomes.remove(0)
        }
    }

    fn response(&self, content: String, usage: Usage, model_id: &str) -> ChatCompletionResponse {
        ChatCompletionResponse {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
            object: "chat.completion".to_string(),
            created: 1_700_000_000,
            model: model_id.to_string(),
            choices: vec![Choice {
                index: 0,
                message: ChatMessage::assistant(content),
                finish_reason: Some("stop".to_string()),
            }],
            usage: Some(usage),
        }
    }

    fn outcome_error(&self, outcome: MockOutcome, model_id: &str) -> RouterError {
        match outcome {
            MockOutcome::RateLimited { retry_after } => RouterError::RateLimited {
                provider: self.provider.to_string(),
                model: model_id.to_string(),
                retry_after,
            },
            MockOutcome::Error { status, message } => RouterError::Provider {
                provider: self.provider.to_string(),
                status: Some(status),
                message,
            },
            MockOutcome::Response { .. } => unreachable!("not an error outcome"),
        }
    }
}

#[async_trait]
impl ChatClient for MockChatClient {
    async fn chat(
        &self,
        _request: &ChatCompletionRequest,
        model_id: &str,
    ) -> Result<ChatCompletionResponse> {
        match self.next_outcome(model_id).await {
            MockOutcome::Response { content, usage } => Ok(self.response(content, usage, model_id)),
            other => Err(self.outcome_error(other, model_id)),
        }
    }

    async fn chat_stream(
        &self,
        _request: &ChatCompletionRequest,
        model_id: &str,
    ) -> Result<ChatStream> {
        match self.next_outcome(model_id).await {
            MockOutcome::Response { content, usage: _ } => {
                let id = format!("chatcmpl-{}", uuid::Uuid::new_v4());
                let chunk = |delta: ChunkDelta, finish: Option<&str>| ChatCompletionChunk {
                    id: id.clone(),
                    object: "chat.completion.chunk".to_string(),
                    created: 1_700_000_000,
                    model: model_id.to_string(),
                    choices: vec![ChunkChoice {
                        index: 0,
                        delta,
                        finish_reason: finish.map(String::from),
                    }],
                };
                let chunks = vec![
                    Ok(chunk(
                        ChunkDelta {
                            role: Some(ChatRole::Assistant),
                            content: Some(content),
                        },
                        None,
                    )),
                    Ok(chunk(ChunkDelta::default(), Some("stop"))),
                ];
                Ok(stream::iter(chunks).boxed())
            }
            other => Err(self.outcome_error(other, model_id)),
        }
    }
}
