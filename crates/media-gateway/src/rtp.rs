//! UDP/RTP media gateway
//!
//! Softphone calls arrive as G.711 over RTP at 8 kHz. Inbound, each
//! datagram is parsed, decoded to linear PCM, captured to the recording
//! at 8 kHz, upsampled to 16 kHz and queued for STT. Outbound, pipeline
//! audio is downsampled to 8 kHz, companded, packetised into 20 ms frames
//! and sent to the learned remote endpoint.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use voxdial_audio_core::codec::{self, G711Variant};
use voxdial_audio_core::convert::{bytes_to_s16, s16_to_bytes};
use voxdial_audio_core::resample::Resampler;
use voxdial_audio_core::RecordingBuffer;
use voxdial_rtp_core::{PortAllocator, RtpSession};

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{CallMetadata, GatewaySessionStats, MediaGateway};
use crate::queue::BoundedAudioQueue;

/// PCM rate on the RTP wire
pub const RTP_SAMPLE_RATE: u32 = 8_000;
/// PCM rate handed to the pipeline
pub const PIPELINE_SAMPLE_RATE: u32 = 16_000;

struct RtpCallSession {
    metadata: CallMetadata,
    rtp: Arc<RtpSession>,
    variant: G711Variant,
    local_port: u16,
    input: Arc<BoundedAudioQueue>,
    recording: Arc<Mutex<RecordingBuffer>>,
    upsampler: Mutex<Resampler>,
    downsampler: Mutex<Resampler>,
    cancel: CancellationToken,
    recv_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    frames_in: AtomicU64,
    frames_out: AtomicU64,
    invalid_frames: AtomicU64,
}

/// Gateway for calls carried as G.711 over UDP.
pub struct RtpMediaGateway {
    sessions: DashMap<String, Arc<RtpCallSession>>,
    ports: Arc<PortAllocator>,
}

impl RtpMediaGateway {
    /// Create a gateway allocating media ports from the given pool.
    pub fn new(ports: Arc<PortAllocator>) -> Self {
        Self {
            sessions: DashMap::new(),
            ports,
        }
    }

    /// Start a session with full media parameters, returning the local
    /// RTP port for the SDP answer.
    pub async fn start_rtp_call(
        &self,
        call_id: &str,
        metadata: CallMetadata,
        variant: G711Variant,
        remote: Option<SocketAddr>,
    ) -> GatewayResult<u16> {
        if self.sessions.contains_key(call_id) {
            return Err(GatewayError::SessionExists {
                call_id: call_id.to_string(),
            });
        }

        let local_port = self.ports.allocate()?;
        let rtp = match RtpSession::bind(call_id, local_port, variant).await {
            Ok(session) => Arc::new(session),
            Err(e) => {
                self.ports.release(local_port);
                return Err(e.into());
            }
        };
        if let Some(addr) = remote {
            rtp.set_remote(addr);
        }

        let session = Arc::new(RtpCallSession {
            metadata,
            rtp: rtp.clone(),
            variant,
            local_port,
            input: Arc::new(BoundedAudioQueue::default()),
            recording: Arc::new(Mutex::new(RecordingBuffer::mono16(RTP_SAMPLE_RATE))),
            upsampler: Mutex::new(Resampler::new(RTP_SAMPLE_RATE, PIPELINE_SAMPLE_RATE)?),
            downsampler: Mutex::new(Resampler::new(PIPELINE_SAMPLE_RATE, RTP_SAMPLE_RATE)?),
            cancel: CancellationToken::new(),
            recv_task: Mutex::new(None),
            frames_in: AtomicU64::new(0),
            frames_out: AtomicU64::new(0),
            invalid_frames: AtomicU64::new(0),
        });
        self.sessions.insert(call_id.to_string(), session.clone());
        debug!(call_id, local_port, ?variant, "rtp session started");

        // Receive loop: datagram -> decode -> record -> upsample -> queue
        let loop_session = session.clone();
        let handle = tokio::spawn(async move {
            let session = loop_session;
            loop {
                let packet = tokio::select! {
                    _ = session.cancel.cancelled() => break,
                    packet = session.rtp.recv_packet() => packet,
                };
                let packet = match packet {
                    Ok(packet) => packet,
                    Err(e) => {
                        warn!(error = %e, "rtp receive loop ending");
                        break;
                    }
                };
                if packet.payload.is_empty() {
                    continue;
                }
                if G711Variant::from_payload_type(packet.header.payload_type).is_none() {
                    session.invalid_frames.fetch_add(1, Ordering::Relaxed);
                    continue;
                }

                let pcm8k = codec::decode(session.variant, &packet.payload);
                session.frames_in.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = session.recording.lock().append_samples(&pcm8k) {
                    warn!(error = %e, "recording append failed");
                }
                let pcm16k = session.upsampler.lock().process(&pcm8k);
                session.input.push(s16_to_bytes(&pcm16k));
            }
        });
        *session.recv_task.lock() = Some(handle);

        Ok(local_port)
    }

    /// Local RTP port of a live session.
    pub fn local_port(&self, call_id: &str) -> Option<u16> {
        self.sessions.get(call_id).map(|s| s.local_port)
    }

    /// Set or correct the remote endpoint after SDP renegotiation.
    pub fn set_remote(&self, call_id: &str, addr: SocketAddr) {
        if let Some(session) = self.sessions.get(call_id) {
            session.rtp.set_remote(addr);
        }
    }

    /// Metadata captured at session start.
    pub fn metadata(&self, call_id: &str) -> Option<CallMetadata> {
        self.sessions.get(call_id).map(|s| s.metadata.clone())
    }

    /// Mark the start of an outbound talk spurt for the call.
    pub fn mark_talk_spurt(&self, call_id: &str) {
        if let Some(session) = self.sessions.get(call_id) {
            session.rtp.mark_talk_spurt();
        }
    }
}

#[async_trait]
impl MediaGateway for RtpMediaGateway {
    async fn on_call_started(&self, call_id: &str, metadata: CallMetadata) -> GatewayResult<()> {
        self.start_rtp_call(call_id, metadata, G711Variant::MuLaw, None)
            .await
            .map(|_| ())
    }

    async fn on_audio_received(&self, call_id: &str, chunk: &[u8]) {
        // The receive loop normally owns this path; direct injection is
        // used by tests and by datagram-level front ends.
        let Some(session) = self.sessions.get(call_id).map(|s| s.clone()) else {
            return;
        };
        if chunk.len() <= voxdial_rtp_core::RTP_HEADER_LEN {
            session.invalid_frames.fetch_add(1, Ordering::Relaxed);
            return;
        }
        match voxdial_rtp_core::RtpPacket::parse(chunk) {
            Ok(packet) => {
                let pcm8k = codec::decode(session.variant, &packet.payload);
                session.frames_in.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = session.recording.lock().append_samples(&pcm8k) {
                    warn!(call_id, error = %e, "recording append failed");
                }
                let pcm16k = session.upsampler.lock().process(&pcm8k);
                session.input.push(s16_to_bytes(&pcm16k));
            }
            Err(_) => {
                session.invalid_frames.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    async fn send_audio(&self, call_id: &str, pcm: &[u8]) -> GatewayResult<()> {
        let Some(session) = self.sessions.get(call_id).map(|s| s.clone()) else {
            return Ok(());
        };
        if pcm.is_empty() {
            return Ok(());
        }

        let samples16k = bytes_to_s16(pcm)?;
        let pcm8k = session.downsampler.lock().process(&samples16k);
        if pcm8k.is_empty() {
            return Ok(());
        }
        let encoded = codec::encode(session.variant, &pcm8k);
        session.rtp.send_encoded(&encoded).await?;
        session.frames_out.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn on_call_ended(&self, call_id: &str, reason: &str) {
        if let Some((_, session)) = self.sessions.remove(call_id) {
            debug!(call_id, reason, "rtp session ended");
            session.cancel.cancel();
            session.input.close();
            let local_port = session.local_port;
            let handle = session.recv_task.lock().take();
            // The socket lives until the receive task drops its session
            // handle; join it before the port goes back in the pool.
            drop(session);
            if let Some(handle) = handle {
                let _ = handle.await;
            }
            self.ports.release(local_port);
        }
    }

    fn clear_output(&self, _call_id: &str) {
        // Outbound RTP goes straight to the socket; nothing is queued
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
    use tokio::net::UdpSocket;
    use voxdial_rtp_core::Packetizer;

    fn gateway() -> RtpMediaGateway {
        RtpMediaGateway::new(Arc::new(PortAllocator::new(41_000, 64)))
    }

    #[tokio::test]
    async fn inbound_g711_is_decoded_and_upsampled() {
        let gw = gateway();
        let port = gw
            .start_rtp_call("call-1", CallMetadata::default(), G711Variant::MuLaw, None)
            .await
            .unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut packetizer = Packetizer::with_ssrc(G711Variant::MuLaw, 99);
        let payload = codec::mulaw_encode(&vec![1000i16; 160]);
        for packet in packetizer.build_packets(&payload) {
            sender
                .send_to(&packet, ("127.0.0.1", port))
                .await
                .unwrap();
        }

        let queue = gw.audio_queue("call-1").unwrap();
        let chunk = tokio::time::timeout(std::time::Duration::from_secs(2), queue.pop())
            .await
            .unwrap()
            .unwrap();
        // 160 samples at 8 kHz become 320 at 16 kHz (640 bytes)
        assert_eq!(chunk.len(), 640);

        // Recording captured at wire rate
        let recording = gw.recording_buffer("call-1").unwrap();
        assert_eq!(recording.lock().sample_rate(), RTP_SAMPLE_RATE);
        assert_eq!(recording.lock().len(), 320);
    }

    #[tokio::test]
    async fn outbound_audio_is_downsampled_and_packetised() {
        let gw = gateway();
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let remote = receiver.local_addr().unwrap();

        gw.start_rtp_call("call-1", CallMetadata::default(), G711Variant::ALaw, Some(remote))
            .await
            .unwrap();

        // 40 ms at 16 kHz = 640 samples -> 320 samples at 8 kHz = 2 packets
        let pcm16k = s16_to_bytes(&vec![2000i16; 640]);
        gw.send_audio("call-1", &pcm16k).await.unwrap();

        let mut buf = vec![0u8; 2048];
        let (len, _) = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            receiver.recv_from(&mut buf),
        )
        .await
        .unwrap()
        .unwrap();
        let packet = voxdial_rtp_core::RtpPacket::parse(&buf[..len]).unwrap();
        assert_eq!(packet.header.payload_type, 8);
        assert_eq!(packet.payload.len(), 160);
    }

    #[tokio::test]
    async fn ended_call_releases_port() {
        let ports = Arc::new(PortAllocator::new(42_000, 1));
        let gw = RtpMediaGateway::new(ports.clone());
        gw.start_rtp_call("call-1", CallMetadata::default(), G711Variant::MuLaw, None)
            .await
            .unwrap();
        assert_eq!(ports.in_use_count(), 1);

        gw.on_call_ended("call-1", "hangup").await;
        assert_eq!(ports.in_use_count(), 0);

        // Port is reusable for the next call
        gw.start_rtp_call("call-2", CallMetadata::default(), G711Variant::MuLaw, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn short_datagram_counts_invalid() {
        let gw = gateway();
        gw.start_rtp_call("call-1", CallMetadata::default(), G711Variant::MuLaw, None)
            .await
            .unwrap();
        gw.on_audio_received("call-1", &[0u8; 8]).await;
        assert_eq!(gw.session_stats("call-1").unwrap().invalid_frames, 1);
    }

    #[tokio::test]
    async fn send_to_unknown_call_is_noop() {
        let gw = gateway();
        assert!(gw.send_audio("ghost", &[0u8; 640]).await.is_ok());
    }
}
