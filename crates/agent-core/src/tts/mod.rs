//! Streaming text-to-speech adapter
//!
//! Synthesis is latency-shaped: the first chunk is small (about 200 ms of
//! audio) so the caller hears the agent quickly, later chunks are larger
//! (about 500 ms) to cut per-chunk overhead. The stream is interruptible:
//! when the barge-in token fires, the adapter stops at the next chunk
//! boundary and produces nothing further.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use voxdial_audio_core::resample::SUPPORTED_RATES;

use crate::error::{AgentError, AgentResult};
use crate::types::AudioChunk;

/// Target duration of the first audio chunk
const FIRST_CHUNK_MS: u64 = 200;
/// Target duration of subsequent chunks
const NEXT_CHUNK_MS: u64 = 500;

/// Provider connection parameters
#[derive(Debug, Clone)]
pub struct TtsConfig {
    /// Synthesis endpoint URL
    pub api_url: String,
    /// Auth token, from the environment
    pub api_key: String,
    /// Voice used when the request does not name one
    pub default_voice: String,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.example-tts.com/v1/synthesize".to_string(),
            api_key: String::new(),
            default_voice: "aria".to_string(),
        }
    }
}

/// One utterance to synthesise
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    /// Text to speak
    pub text: String,
    /// Provider voice identifier
    pub voice_id: String,
    /// PCM rate the provider should emit
    pub sample_rate: u32,
}

/// Seam for pluggable text-to-speech backends.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Start synthesis; PCM chunks arrive on the returned stream until the
    /// utterance completes or `interrupt` fires.
    async fn stream_synthesize(
        &self,
        request: SynthesisRequest,
        interrupt: CancellationToken,
    ) -> AgentResult<mpsc::Receiver<AgentResult<AudioChunk>>>;
}

/// HTTP chunked-transfer streaming TTS client.
pub struct HttpStreamingTts {
    config: TtsConfig,
    client: reqwest::Client,
}

impl HttpStreamingTts {
    /// Build a client for the configured provider.
    pub fn new(config: TtsConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn validate(request: &SynthesisRequest) -> AgentResult<()> {
        if request.text.trim().is_empty() {
            return Err(AgentError::invalid_input("synthesis text is empty"));
        }
        if !SUPPORTED_RATES.contains(&request.sample_rate) {
            return Err(AgentError::invalid_input(format!(
                "sample rate {} not in supported set {:?}",
                request.sample_rate, SUPPORTED_RATES
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl TextToSpeech for HttpStreamingTts {
    async fn stream_synthesize(
        &self,
        request: SynthesisRequest,
        interrupt: CancellationToken,
    ) -> AgentResult<mpsc::Receiver<AgentResult<AudioChunk>>> {
        Self::validate(&request)?;

        let voice = if request.voice_id.is_empty() {
            self.config.default_voice.clone()
        } else {
            request.voice_id.clone()
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "text": request.text,
                "voice_id": voice,
                "sample_rate": request.sample_rate,
                "encoding": "linear16",
            }))
            .send()
            .await
            .map_err(|e| AgentError::provider("tts", e.to_string()))?;

        if !response.status().is_success() {
            return Err(AgentError::provider(
                "tts",
                format!("endpoint returned {}", response.status()),
            ));
        }

        let sample_rate = request.sample_rate;
        let (tx, rx) = mpsc::channel::<AgentResult<AudioChunk>>(32);

        tokio::spawn(async move {
            let bytes_per_ms = sample_rate as u64 * 2 / 1000;
            let mut target = (FIRST_CHUNK_MS * bytes_per_ms) as usize;
            let mut pending: Vec<u8> = Vec::with_capacity(target);
            let mut stream = response.bytes_stream();

            loop {
                let chunk = tokio::select! {
                    biased;
                    _ = interrupt.cancelled() => {
                        debug!("synthesis interrupted at chunk boundary");
                        return;
                    }
                    chunk = stream.next() => chunk,
                };

                match chunk {
                    Some(Ok(bytes)) => {
                        pending.extend_from_slice(&bytes);
                        while pending.len() >= target {
                            if interrupt.is_cancelled() {
                                return;
                            }
                            let emit: Vec<u8> = pending.drain(..target).collect();
                            if tx.send(Ok(AudioChunk::new(emit, sample_rate))).await.is_err() {
                                return;
                            }
                            target = (NEXT_CHUNK_MS * bytes_per_ms) as usize;
                        }
                    }
                    Some(Err(e)) => {
                        let _ = tx.send(Err(AgentError::provider("tts", e.to_string()))).await;
                        return;
                    }
                    None => {
                        // Tail shorter than a full chunk still plays
                        if !pending.is_empty() && !interrupt.is_cancelled() {
                            // Odd trailing byte cannot form an S16 sample
                            let even = pending.len() & !1;
                            if even > 0 {
                                let _ = tx
                                    .send(Ok(AudioChunk::new(pending[..even].to_vec(), sample_rate)))
                                    .await;
                            }
                        }
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_rejected() {
        let request = SynthesisRequest {
            text: "   ".into(),
            voice_id: "aria".into(),
            sample_rate: 16_000,
        };
        assert!(matches!(
            HttpStreamingTts::validate(&request),
            Err(AgentError::InvalidInput { .. })
        ));
    }

    #[test]
    fn unsupported_rate_is_rejected() {
        let request = SynthesisRequest {
            text: "hello".into(),
            voice_id: "aria".into(),
            sample_rate: 48_000,
        };
        assert!(matches!(
            HttpStreamingTts::validate(&request),
            Err(AgentError::InvalidInput { .. })
        ));
    }

    #[test]
    fn whitelisted_rates_pass() {
        for &rate in SUPPORTED_RATES {
            let request = SynthesisRequest {
                text: "hello".into(),
                voice_id: "aria".into(),
                sample_rate: rate,
            };
            assert!(HttpStreamingTts::validate(&request).is_ok());
        }
    }
}
