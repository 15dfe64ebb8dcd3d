//! Streaming language-model adapter
//!
//! The conversation engine needs tokens, not completed responses: TTS
//! starts as soon as the first sentence is assembled. [`LanguageModel`] is
//! the seam; [`OpenAiChatModel`] implements it against any
//! OpenAI-compatible chat-completions endpoint with server-sent-event
//! streaming.
//!
//! The per-call timeout is enforced inside the adapter. Expiry surfaces as
//! [`AgentError::LlmTimeout`] on the token stream, never as a hung future,
//! and the guardrail layer turns it into a spoken fallback.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{AgentError, AgentResult};
use crate::types::{Message, Role};

/// Defaults tuned for voice latency and brevity
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Chat-completions endpoint URL
    pub api_url: String,
    /// Bearer token, from the environment
    pub api_key: String,
    /// Model identifier
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Token ceiling per response
    pub max_tokens: u32,
    /// Nucleus sampling parameter
    pub top_p: f32,
    /// Stop sequences that end a response
    pub stop: Vec<String>,
    /// Hard per-call deadline in seconds
    pub timeout_seconds: u64,
    /// Pin temperature to 0 and supply a fixed seed for reproducible QA
    pub deterministic: bool,
    /// Seed used in deterministic mode
    pub seed: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.6,
            max_tokens: 100,
            top_p: 1.0,
            stop: vec!["User:".to_string(), "Human:".to_string(), "\n\n\n".to_string()],
            timeout_seconds: 10,
            deterministic: false,
            seed: 42,
        }
    }
}

/// One chat turn's worth of generation input
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Chronological conversation history, without the system prompt
    pub messages: Vec<Message>,
    /// Rendered system prompt for the current state
    pub system_prompt: String,
    /// Per-campaign temperature override
    pub temperature: Option<f32>,
    /// Per-campaign token ceiling override
    pub max_tokens: Option<u32>,
}

/// Receiving half of a token stream. Each item is one text fragment; an
/// `Err` item ends the stream.
pub type TokenStream = mpsc::Receiver<AgentResult<String>>;

/// Seam for pluggable language-model backends.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Start generating; tokens arrive on the returned stream.
    async fn stream_chat(&self, request: ChatRequest) -> AgentResult<TokenStream>;
}

/// OpenAI-compatible streaming chat client.
pub struct OpenAiChatModel {
    config: LlmConfig,
    client: reqwest::Client,
}

impl OpenAiChatModel {
    /// Build a client for the configured endpoint.
    pub fn new(config: LlmConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn request_body(&self, request: &ChatRequest) -> Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(json!({"role": "system", "content": request.system_prompt}));
        for message in &request.messages {
            let role = match message.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            messages.push(json!({"role": role, "content": message.content}));
        }

        let temperature = if self.config.deterministic {
            0.0
        } else {
            request.temperature.unwrap_or(self.config.temperature)
        };

        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": temperature,
            "max_tokens": request.max_tokens.unwrap_or(self.config.max_tokens),
            "top_p": self.config.top_p,
            "stop": self.config.stop,
            "stream": true,
        });
        if self.config.deterministic {
            body["seed"] = json!(self.config.seed);
        }
        body
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn stream_chat(&self, request: ChatRequest) -> AgentResult<TokenStream> {
        let deadline = Instant::now() + std::time::Duration::from_secs(self.config.timeout_seconds);
        let timeout_seconds = self.config.timeout_seconds;

        let response = tokio::time::timeout_at(
            deadline,
            self.client
                .post(&self.config.api_url)
                .bearer_auth(&self.config.api_key)
                .json(&self.request_body(&request))
                .send(),
        )
        .await
        .map_err(|_| AgentError::LlmTimeout {
            seconds: timeout_seconds,
        })?
        .map_err(|e| AgentError::provider("llm", e.to_string()))?;

        if !response.status().is_success() {
            return Err(AgentError::provider(
                "llm",
                format!("endpoint returned {}", response.status()),
            ));
        }

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut line_buf = String::new();

            loop {
                let chunk = match tokio::time::timeout_at(deadline, stream.next()).await {
                    Err(_) => {
                        warn!("token stream exceeded {timeout_seconds} s deadline");
                        let _ = tx
                            .send(Err(AgentError::LlmTimeout {
                                seconds: timeout_seconds,
                            }))
                            .await;
                        return;
                    }
                    Ok(None) => return,
                    Ok(Some(Err(e))) => {
                        let _ = tx.send(Err(AgentError::provider("llm", e.to_string()))).await;
                        return;
                    }
                    Ok(Some(Ok(bytes))) => bytes,
                };

                line_buf.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(newline) = line_buf.find('\n') {
                    let line: String = line_buf.drain(..=newline).collect();
                    let line = line.trim();
                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data == "[DONE]" {
                        return;
                    }
                    if let Some(fragment) = extract_delta(data) {
                        if !fragment.is_empty() && tx.send(Ok(fragment)).await.is_err() {
                            debug!("token consumer dropped; abandoning stream");
                            return;
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}

/// Pull the content fragment out of one SSE data payload.
fn extract_delta(data: &str) -> Option<String> {
    let value: Value = serde_json::from_str(data).ok()?;
    value["choices"][0]["delta"]["content"]
        .as_str()
        .map(|s| s.to_string())
}

/// Collect a token stream into the full response text.
///
/// Returns the first error encountered, discarding any partial text; the
/// guardrail layer owns the decision of what to say instead.
pub async fn collect_response(mut tokens: TokenStream) -> AgentResult<String> {
    let mut text = String::new();
    while let Some(item) = tokens.recv().await {
        text.push_str(&item?);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_extraction() {
        let data = r#"{"choices":[{"delta":{"content":"Hello"}}]}"#;
        assert_eq!(extract_delta(data), Some("Hello".to_string()));

        let finish = r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert_eq!(extract_delta(finish), None);

        assert_eq!(extract_delta("not json"), None);
    }

    #[test]
    fn deterministic_mode_pins_temperature_and_seed() {
        let model = OpenAiChatModel::new(LlmConfig {
            deterministic: true,
            seed: 7,
            ..Default::default()
        });
        let body = model.request_body(&ChatRequest {
            messages: vec![],
            system_prompt: "sys".into(),
            temperature: Some(0.9),
            max_tokens: None,
        });
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["seed"], 7);
    }

    #[test]
    fn request_body_layout() {
        let model = OpenAiChatModel::new(LlmConfig::default());
        let body = model.request_body(&ChatRequest {
            messages: vec![Message::user("hi"), Message::assistant("hello")],
            system_prompt: "be brief".into(),
            temperature: None,
            max_tokens: Some(64),
        });

        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "be brief");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][2]["role"], "assistant");
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["stream"], true);
        assert_eq!(body["stop"][0], "User:");
    }

    #[tokio::test]
    async fn collect_response_joins_fragments() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(Ok("Hello ".to_string())).await.unwrap();
        tx.send(Ok("world".to_string())).await.unwrap();
        drop(tx);
        assert_eq!(collect_response(rx).await.unwrap(), "Hello world");
    }

    #[tokio::test]
    async fn collect_response_surfaces_timeout() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(Ok("partial".to_string())).await.unwrap();
        tx.send(Err(AgentError::LlmTimeout { seconds: 10 })).await.unwrap();
        drop(tx);
        assert!(matches!(
            collect_response(rx).await,
            Err(AgentError::LlmTimeout { .. })
        ));
    }
}
