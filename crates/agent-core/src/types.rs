//! Shared conversation and audio types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The rendered system prompt
    System,
    /// The caller
    User,
    /// The voice agent
    Assistant,
}

/// One message in a call's conversation history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Author
    pub role: Role,
    /// Message text
    pub content: String,
    /// When the message was committed to history
    pub ts: DateTime<Utc>,
}

impl Message {
    /// Build a message stamped now.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            ts: Utc::now(),
        }
    }

    /// System message shorthand
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// User message shorthand
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Assistant message shorthand
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A chunk of 16-bit mono PCM on its way to or from a provider
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Little-endian S16 samples
    pub pcm: Vec<u8>,
    /// Sampling rate in Hz
    pub sample_rate: u32,
}

impl AudioChunk {
    /// Wrap raw S16LE bytes at the given rate.
    pub fn new(pcm: Vec<u8>, sample_rate: u32) -> Self {
        Self { pcm, sample_rate }
    }

    /// Chunk duration in milliseconds
    pub fn duration_ms(&self) -> u64 {
        (self.pcm.len() as u64 / 2) * 1000 / self.sample_rate as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_duration() {
        // 320 samples at 16 kHz = 20 ms
        let chunk = AudioChunk::new(vec![0u8; 640], 16_000);
        assert_eq!(chunk.duration_ms(), 20);
    }

    #[test]
    fn role_serializes_lowercase() {
        let msg = Message::user("hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "hello");
    }
}
