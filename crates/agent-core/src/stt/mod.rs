//! Streaming speech-to-text adapter
//!
//! The provider pushes transcription events over a WebSocket while the
//! pipeline wants to pull them; the adapter bridges the two with a pair of
//! bounded channels and two forwarding tasks, so no thread or socket
//! detail leaks through the seam.
//!
//! Event semantics the pipeline depends on:
//!
//! - [`SttEvent::Partial`] carries the *cumulative* best guess of the
//!   current utterance. Each partial replaces the previous one.
//! - [`SttEvent::Final`] is the committed utterance and marks end of turn.
//! - [`SttEvent::StartOfTurn`] is the barge-in signal: the caller started
//!   speaking after silence.
//! - [`SttEvent::StreamClosed`] is synthesised when the provider session
//!   dies before a final, so the orchestrator can close out the turn.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};
use voxdial_audio_core::convert::validate_pcm16_frame;

use crate::error::{AgentError, AgentResult};
use crate::types::AudioChunk;

/// Invalid chunks logged per session before going quiet
const INVALID_CHUNK_LOG_LIMIT: u64 = 5;

/// Transcription events delivered to the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SttEvent {
    /// Cumulative best guess; replaces the previous partial
    Partial {
        /// Current transcript guess
        text: String,
    },
    /// Committed utterance; the caller finished speaking
    Final {
        /// Final transcript for the turn
        text: String,
    },
    /// Caller started speaking after silence (barge-in signal)
    StartOfTurn,
    /// Provider session ended before the turn completed
    StreamClosed,
}

/// Provider session parameters
#[derive(Debug, Clone)]
pub struct SttConfig {
    /// WebSocket endpoint
    pub ws_url: String,
    /// Auth token, from the environment
    pub api_key: String,
    /// Provider model name
    pub model: String,
    /// PCM sample rate the session will carry
    pub sample_rate: u32,
    /// PCM encoding label the provider expects
    pub encoding: String,
    /// Identifies this system to the provider
    pub user_agent: String,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://api.example-stt.com/v1/listen".to_string(),
            api_key: String::new(),
            model: "telephony-en".to_string(),
            sample_rate: 16_000,
            encoding: "linear16".to_string(),
            user_agent: concat!("voxdial/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// An open provider session: push audio in, pull events out.
pub struct SttSession {
    /// Sink for PCM chunks on their way to the provider
    pub audio_tx: mpsc::Sender<AudioChunk>,
    /// Ordered transcription events
    pub events: mpsc::Receiver<SttEvent>,
}

/// Seam for pluggable speech-to-text backends.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Open one transcription session for one call.
    async fn open_session(&self) -> AgentResult<SttSession>;
}

/// Wire format of provider transcription messages
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ProviderEvent {
    Partial {
        text: String,
    },
    Final {
        text: String,
    },
    SpeechStarted,
    #[serde(other)]
    Unknown,
}

/// WebSocket streaming STT client.
pub struct WsStreamingStt {
    config: SttConfig,
}

impl WsStreamingStt {
    /// Build a client for the configured provider.
    pub fn new(config: SttConfig) -> Self {
        Self { config }
    }

    fn session_url(&self) -> String {
        format!(
            "{}?model={}&encoding={}&sample_rate={}",
            self.config.ws_url, self.config.model, self.config.encoding, self.config.sample_rate
        )
    }
}

#[async_trait]
impl SpeechToText for WsStreamingStt {
    async fn open_session(&self) -> AgentResult<SttSession> {
        let mut request = self
            .session_url()
            .into_client_request()
            .map_err(|e| AgentError::provider("stt", e.to_string()))?;
        {
            let headers = request.headers_mut();
            headers.insert(
                "Authorization",
                format!("Token {}", self.config.api_key)
                    .parse()
                    .map_err(|_| AgentError::invalid_input("API key is not header-safe"))?,
            );
            headers.insert(
                "User-Agent",
                self.config
                    .user_agent
                    .parse()
                    .map_err(|_| AgentError::invalid_input("user agent is not header-safe"))?,
            );
        }

        let (ws, _) = connect_async(request)
            .await
            .map_err(|e| AgentError::provider("stt", e.to_string()))?;
        let (mut ws_tx, mut ws_rx) = ws.split();

        let (audio_tx, mut audio_rx) = mpsc::channel::<AudioChunk>(100);
        let (event_tx, event_rx) = mpsc::channel::<SttEvent>(100);

        // Audio pump: pipeline -> provider
        let sample_rate = self.config.sample_rate;
        tokio::spawn(async move {
            let mut invalid_chunks: u64 = 0;
            while let Some(chunk) = audio_rx.recv().await {
                if chunk.pcm.is_empty() {
                    continue;
                }
                if let Err(e) = validate_pcm16_frame(&chunk.pcm, sample_rate) {
                    invalid_chunks += 1;
                    if invalid_chunks <= INVALID_CHUNK_LOG_LIMIT {
                        warn!(error = %e, invalid_chunks, "dropping invalid PCM chunk");
                    }
                    continue;
                }
                if ws_tx.send(WsMessage::Binary(chunk.pcm.into())).await.is_err() {
                    debug!("provider socket closed; stopping audio pump");
                    break;
                }
            }
            let _ = ws_tx.send(WsMessage::Close(None)).await;
        });

        // Event pump: provider -> pipeline
        tokio::spawn(async move {
            let mut turn_open = false;
            while let Some(message) = ws_rx.next().await {
                let text = match message {
                    Ok(WsMessage::Text(text)) => text,
                    Ok(WsMessage::Close(_)) | Err(_) => break,
                    Ok(_) => continue,
                };
                let event = match serde_json::from_str::<ProviderEvent>(&text) {
                    Ok(ProviderEvent::Partial { text }) => {
                        turn_open = true;
                        SttEvent::Partial { text }
                    }
                    Ok(ProviderEvent::Final { text }) => {
                        turn_open = false;
                        SttEvent::Final { text }
                    }
                    Ok(ProviderEvent::SpeechStarted) => {
                        turn_open = true;
                        SttEvent::StartOfTurn
                    }
                    Ok(ProviderEvent::Unknown) => continue,
                    Err(e) => {
                        debug!(error = %e, "unparseable provider event");
                        continue;
                    }
                };
                if event_tx.send(event).await.is_err() {
                    return;
                }
            }
            // Session died mid-turn: let the orchestrator finalise
            if turn_open {
                let _ = event_tx.send(SttEvent::StreamClosed).await;
            }
        });

        Ok(SttSession {
            audio_tx,
            events: event_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_events_parse_tagged() {
        let partial: ProviderEvent =
            serde_json::from_str(r#"{"type":"partial","text":"hel"}"#).unwrap();
        assert!(matches!(partial, ProviderEvent::Partial { text } if text == "hel"));

        let final_ev: ProviderEvent =
            serde_json::from_str(r#"{"type":"final","text":"hello there"}"#).unwrap();
        assert!(matches!(final_ev, ProviderEvent::Final { text } if text == "hello there"));

        let start: ProviderEvent =
            serde_json::from_str(r#"{"type":"speech_started"}"#).unwrap();
        assert!(matches!(start, ProviderEvent::SpeechStarted));

        let unknown: ProviderEvent =
            serde_json::from_str(r#"{"type":"metadata","latency":3}"#).unwrap();
        assert!(matches!(unknown, ProviderEvent::Unknown));
    }

    #[test]
    fn session_url_carries_model_and_rate() {
        let stt = WsStreamingStt::new(SttConfig {
            ws_url: "wss://stt.local/listen".into(),
            model: "phone-v2".into(),
            ..Default::default()
        });
        let url = stt.session_url();
        assert!(url.starts_with("wss://stt.local/listen?"));
        assert!(url.contains("model=phone-v2"));
        assert!(url.contains("sample_rate=16000"));
        assert!(url.contains("encoding=linear16"));
    }
}
