//! WebSocket media gateway
//!
//! The cloud telephony provider opens a WebSocket per call and streams
//! 16 kHz S16LE mono PCM as binary frames, 20–100 ms each. This gateway
//! validates frames, captures the recording at 16 kHz, and bridges the
//! socket to the per-call queues. The socket pump itself lives in the
//! HTTP layer; this type owns only session state, so it is fully testable
//! without a socket.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};
use voxdial_audio_core::convert::validate_pcm16_frame;
use voxdial_audio_core::RecordingBuffer;

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{CallMetadata, GatewaySessionStats, MediaGateway};
use crate::queue::BoundedAudioQueue;

/// PCM rate on the WebSocket wire
pub const WS_SAMPLE_RATE: u32 = 16_000;

/// Invalid frames logged per session before going quiet
const INVALID_FRAME_LOG_LIMIT: u64 = 5;

struct WsSession {
    metadata: CallMetadata,
    input: Arc<BoundedAudioQueue>,
    output: Arc<BoundedAudioQueue>,
    recording: Arc<Mutex<RecordingBuffer>>,
    frames_in: AtomicU64,
    frames_out: AtomicU64,
    invalid_frames: AtomicU64,
}

/// Gateway for calls carried over a provider WebSocket.
pub struct WsMediaGateway {
    sessions: DashMap<String, Arc<WsSession>>,
}

impl WsMediaGateway {
    /// Create an empty gateway.
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Outbound queue for the socket pump to drain.
    pub fn output_queue(&self, call_id: &str) -> Option<Arc<BoundedAudioQueue>> {
        self.sessions.get(call_id).map(|s| s.output.clone())
    }

    /// Metadata captured at session start.
    pub fn metadata(&self, call_id: &str) -> Option<CallMetadata> {
        self.sessions.get(call_id).map(|s| s.metadata.clone())
    }

    /// Number of live sessions
    pub fn live_sessions(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for WsMediaGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaGateway for WsMediaGateway {
    async fn on_call_started(&self, call_id: &str, metadata: CallMetadata) -> GatewayResult<()> {
        if self.sessions.contains_key(call_id) {
            return Err(GatewayError::SessionExists {
                call_id: call_id.to_string(),
            });
        }
        debug!(call_id, "ws session started");
        self.sessions.insert(
            call_id.to_string(),
            Arc::new(WsSession {
                metadata,
                input: Arc::new(BoundedAudioQueue::default()),
                output: Arc::new(BoundedAudioQueue::default()),
                recording: Arc::new(Mutex::new(RecordingBuffer::mono16(WS_SAMPLE_RATE))),
                frames_in: AtomicU64::new(0),
                frames_out: AtomicU64::new(0),
                invalid_frames: AtomicU64::new(0),
            }),
        );
        Ok(())
    }

    async fn on_audio_received(&self, call_id: &str, chunk: &[u8]) {
        // Late frames racing teardown are routine
        let Some(session) = self.sessions.get(call_id).map(|s| s.clone()) else {
            return;
        };
        if chunk.is_empty() {
            return;
        }
        if let Err(e) = validate_pcm16_frame(chunk, WS_SAMPLE_RATE) {
            let invalid = session.invalid_frames.fetch_add(1, Ordering::Relaxed) + 1;
            if invalid <= INVALID_FRAME_LOG_LIMIT {
                warn!(call_id, error = %e, invalid, "dropping invalid ws frame");
            }
            return;
        }

        session.frames_in.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = session.recording.lock().append_bytes(chunk) {
            warn!(call_id, error = %e, "recording append failed");
        }
        session.input.push(chunk.to_vec());
    }

    async fn send_audio(&self, call_id: &str, pcm: &[u8]) -> GatewayResult<()> {
        // Send on a closed call is dropped, not an error
        let Some(session) = self.sessions.get(call_id).map(|s| s.clone()) else {
            return Ok(());
        };
        if pcm.is_empty() {
            return Ok(());
        }
        // Outbound path awaits space rather than dropping: synthesis that
        // outruns the wire must slow down, not lose audio
        if session.output.push_wait(pcm.to_vec()).await {
            session.frames_out.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn clear_output(&self, call_id: &str) {
        if let Some(session) = self.sessions.get(call_id) {
            session.output.clear();
        }
    }

    async fn on_call_ended(&self, call_id: &str, reason: &str) {
        if let Some((_, session)) = self.sessions.remove(call_id) {
            debug!(call_id, reason, "ws session ended");
            session.input.close();
            session.output.close();
        }
    }

    fn audio_queue(&self, call_id: &str) -> Option<Arc<BoundedAudioQueue>> {
        self.sessions.get(call_id).map(|s| s.input.clone())
    }

    fn recording_buffer(&self, call_id: &str) -> Option<Arc<Mutex<RecordingBuffer>>> {
        self.sessions.get(call_id).map(|s| s.recording.clone())
    }

    fn clear_recording_buffer(&self, call_id: &str) {
        if let Some(session) = self.sessions.get(call_id) {
            session.recording.lock().clear();
        }
    }

    fn session_stats(&self, call_id: &str) -> Option<GatewaySessionStats> {
        self.sessions.get(call_id).map(|s| GatewaySessionStats {
            frames_in: s.frames_in.load(Ordering::Relaxed),
            frames_out: s.frames_out.load(Ordering::Relaxed),
            invalid_frames: s.invalid_frames.load(Ordering::Relaxed),
            input_overflow: s.input.overflow_count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_ms(ms: usize) -> Vec<u8> {
        vec![0u8; ms * WS_SAMPLE_RATE as usize / 1000 * 2]
    }

    async fn started_gateway() -> WsMediaGateway {
        let gateway = WsMediaGateway::new();
        gateway
            .on_call_started("call-1", CallMetadata::default())
            .await
            .unwrap();
        gateway
    }

    #[tokio::test]
    async fn duplicate_session_is_rejected() {
        let gateway = started_gateway().await;
        let result = gateway
            .on_call_started("call-1", CallMetadata::default())
            .await;
        assert!(matches!(result, Err(GatewayError::SessionExists { .. })));
    }

    #[tokio::test]
    async fn valid_frames_reach_queue_and_recording() {
        let gateway = started_gateway().await;
        gateway.on_audio_received("call-1", &frame_ms(20)).await;
        gateway.on_audio_received("call-1", &frame_ms(40)).await;

        let queue = gateway.audio_queue("call-1").unwrap();
        assert_eq!(queue.len(), 2);

        let recording = gateway.recording_buffer("call-1").unwrap();
        assert_eq!(recording.lock().len(), frame_ms(20).len() + frame_ms(40).len());

        let stats = gateway.session_stats("call-1").unwrap();
        assert_eq!(stats.frames_in, 2);
        assert_eq!(stats.invalid_frames, 0);
    }

    #[tokio::test]
    async fn odd_length_frame_is_dropped_and_counted() {
        let gateway = started_gateway().await;
        gateway.on_audio_received("call-1", &[0u8; 641]).await;

        assert!(gateway.audio_queue("call-1").unwrap().is_empty());
        assert_eq!(gateway.session_stats("call-1").unwrap().invalid_frames, 1);
    }

    #[tokio::test]
    async fn out_of_range_duration_is_dropped() {
        let gateway = started_gateway().await;
        // 5 ms: below the accepted window
        gateway.on_audio_received("call-1", &frame_ms(5)).await;
        // 1200 ms: above it
        gateway.on_audio_received("call-1", &frame_ms(1200)).await;

        assert!(gateway.audio_queue("call-1").unwrap().is_empty());
        assert_eq!(gateway.session_stats("call-1").unwrap().invalid_frames, 2);
    }

    #[tokio::test]
    async fn empty_frame_is_ignored_silently() {
        let gateway = started_gateway().await;
        gateway.on_audio_received("call-1", &[]).await;
        assert_eq!(gateway.session_stats("call-1").unwrap().invalid_frames, 0);
        assert!(gateway.audio_queue("call-1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_call_audio_is_ignored() {
        let gateway = WsMediaGateway::new();
        gateway.on_audio_received("ghost", &frame_ms(20)).await;
        assert!(gateway.send_audio("ghost", &frame_ms(20)).await.is_ok());
    }

    #[tokio::test]
    async fn send_audio_lands_on_output_queue() {
        let gateway = started_gateway().await;
        gateway.send_audio("call-1", &frame_ms(20)).await.unwrap();
        let output = gateway.output_queue("call-1").unwrap();
        assert_eq!(output.len(), 1);
        assert_eq!(gateway.session_stats("call-1").unwrap().frames_out, 1);
    }

    #[tokio::test]
    async fn ended_call_closes_queues() {
        let gateway = started_gateway().await;
        let input = gateway.audio_queue("call-1").unwrap();
        gateway.on_call_ended("call-1", "hangup").await;

        assert!(gateway.audio_queue("call-1").is_none());
        assert_eq!(input.pop().await, None);
    }

    #[tokio::test]
    async fn clear_recording_empties_buffer() {
        let gateway = started_gateway().await;
        gateway.on_audio_received("call-1", &frame_ms(20)).await;
        gateway.clear_recording_buffer("call-1");
        assert!(gateway.recording_buffer("call-1").unwrap().lock().is_empty());
    }
}
