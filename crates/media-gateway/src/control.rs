//! WebSocket control messages
//!
//! Text frames on the voice WebSocket carry tagged JSON control messages;
//! binary frames carry audio. Unknown message types deserialize to
//! [`ControlMessage::Unknown`] so a newer peer never breaks an older
//! gateway.

use serde::{Deserialize, Serialize};

/// Control messages exchanged on the voice WebSocket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Session established; carries negotiated parameters
    #[serde(rename = "SESSION_START")]
    SessionStart {
        /// Call this socket serves
        call_id: String,
        /// PCM rate for binary frames
        sample_rate: u32,
    },
    /// Session ending
    #[serde(rename = "SESSION_END")]
    SessionEnd {
        /// Why the session ended
        #[serde(default)]
        reason: Option<String>,
    },
    /// Live transcript fragment for observability UIs
    #[serde(rename = "TRANSCRIPT_CHUNK")]
    TranscriptChunk {
        /// Who spoke
        speaker: String,
        /// Transcript text
        text: String,
        /// Whether this is the committed utterance
        is_final: bool,
    },
    /// The caller finished an utterance
    #[serde(rename = "TURN_END")]
    TurnEnd,
    /// Agent response generation started
    #[serde(rename = "LLM_START")]
    LlmStart,
    /// Agent response generation finished
    #[serde(rename = "LLM_END")]
    LlmEnd,
    /// Speech synthesis started
    #[serde(rename = "TTS_START")]
    TtsStart,
    /// Speech synthesis finished
    #[serde(rename = "TTS_END")]
    TtsEnd,
    /// Peer-reported error
    #[serde(rename = "ERROR")]
    Error {
        /// Error description
        message: String,
    },
    /// Keepalive probe
    #[serde(rename = "PING")]
    Ping,
    /// Keepalive response
    #[serde(rename = "PONG")]
    Pong,
    /// The caller started speaking over the agent
    #[serde(rename = "barge_in")]
    BargeIn,
    /// Playback was cut short by a barge-in
    #[serde(rename = "tts_interrupted")]
    TtsInterrupted,
    /// Forward-compatibility catch-all
    #[serde(other)]
    Unknown,
}
