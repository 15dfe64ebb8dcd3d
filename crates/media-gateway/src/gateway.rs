//! The common gateway contract
//!
//! Both gateway variants present the same surface to the voice pipeline:
//! start a session, feed it provider-native audio, pull decoded 16 kHz
//! PCM from the input queue, hand it 16 kHz PCM to speak, and end the
//! session. Unknown call ids on the audio paths are ignored by design;
//! late packets racing call teardown are routine, not errors.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use voxdial_audio_core::RecordingBuffer;

use crate::error::GatewayResult;
use crate::queue::BoundedAudioQueue;

/// Identity of the call a session belongs to
#[derive(Debug, Clone, Default)]
pub struct CallMetadata {
    /// Owning tenant
    pub tenant_id: String,
    /// Campaign the call belongs to
    pub campaign_id: String,
    /// Lead being called
    pub lead_id: String,
    /// Destination number, when known
    pub phone_number: Option<String>,
    /// Provider-side call identifier
    pub external_call_uuid: Option<String>,
}

/// Per-session counters
#[derive(Debug, Clone, Copy, Default)]
pub struct GatewaySessionStats {
    /// Audio frames accepted inbound
    pub frames_in: u64,
    /// Audio chunks sent outbound
    pub frames_out: u64,
    /// Inbound frames dropped as invalid
    pub invalid_frames: u64,
    /// Chunks lost to input-queue overflow
    pub input_overflow: u64,
}

/// Contract shared by the WebSocket and RTP gateways.
#[async_trait]
pub trait MediaGateway: Send + Sync {
    /// Create the per-call session: input/output queues and a recording
    /// buffer at the gateway-native rate.
    async fn on_call_started(&self, call_id: &str, metadata: CallMetadata) -> GatewayResult<()>;

    /// Feed one provider-native audio chunk into the session.
    ///
    /// Invalid chunks are dropped and counted; an unknown `call_id` is
    /// silently ignored.
    async fn on_audio_received(&self, call_id: &str, chunk: &[u8]);

    /// Queue 16 kHz S16LE mono PCM for playback to the caller. The
    /// gateway owns any conversion to its wire format. Sending to a
    /// closed call is a no-op.
    async fn send_audio(&self, call_id: &str, pcm: &[u8]) -> GatewayResult<()>;

    /// Tear the session down, releasing queues and sockets.
    async fn on_call_ended(&self, call_id: &str, reason: &str);

    /// Discard any outbound audio not yet on the wire (barge-in).
    fn clear_output(&self, call_id: &str);

    /// Decoded 16 kHz PCM chunks for the STT path.
    fn audio_queue(&self, call_id: &str) -> Option<Arc<BoundedAudioQueue>>;

    /// The session's recording buffer (gateway-native rate).
    fn recording_buffer(&self, call_id: &str) -> Option<Arc<Mutex<RecordingBuffer>>>;

    /// Drop everything captured so far for the call.
    fn clear_recording_buffer(&self, call_id: &str);

    /// Session counters, if the call is live.
    fn session_stats(&self, call_id: &str) -> Option<GatewaySessionStats>;
}
