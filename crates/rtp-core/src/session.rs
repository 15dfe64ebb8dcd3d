//! Per-call RTP media session
//!
//! One [`RtpSession`] is bound per live call: a dedicated UDP socket on an
//! allocated local port, a packetiser for the negotiated G.711 variant,
//! and send/receive counters. The remote endpoint is either set from SDP
//! or latched from the first inbound datagram (softphones frequently send
//! from a port other than the one they advertised).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tracing::{debug, trace};
use voxdial_audio_core::codec::G711Variant;

use crate::error::{RtpError, RtpResult};
use crate::packet::RtpPacket;
use crate::packetizer::Packetizer;

/// Counters for one media session
#[derive(Debug, Clone, Copy, Default)]
pub struct RtpSessionStats {
    /// Packets sent to the remote endpoint
    pub packets_sent: u64,
    /// Packets received and parsed successfully
    pub packets_received: u64,
    /// Inbound datagrams dropped as unparsable
    pub packets_dropped: u64,
}

/// UDP media session for one call.
pub struct RtpSession {
    call_id: String,
    socket: Arc<UdpSocket>,
    local_port: u16,
    variant: G711Variant,
    remote: Mutex<Option<SocketAddr>>,
    packetizer: Mutex<Packetizer>,
    packets_sent: AtomicU64,
    packets_received: AtomicU64,
    packets_dropped: AtomicU64,
}

impl RtpSession {
    /// Bind a session socket on the given local port.
    pub async fn bind(call_id: impl Into<String>, local_port: u16, variant: G711Variant) -> RtpResult<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", local_port)).await?;
        let call_id = call_id.into();
        debug!(call_id = %call_id, local_port, ?variant, "bound RTP session");
        Ok(Self {
            call_id,
            socket: Arc::new(socket),
            local_port,
            variant,
            remote: Mutex::new(None),
            packetizer: Mutex::new(Packetizer::new(variant)),
            packets_sent: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            packets_dropped: AtomicU64::new(0),
        })
    }

    /// Call this session belongs to
    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    /// Bound local port
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Negotiated codec variant
    pub fn variant(&self) -> G711Variant {
        self.variant
    }

    /// Set the remote media endpoint (from SDP).
    pub fn set_remote(&self, addr: SocketAddr) {
        *self.remote.lock() = Some(addr);
    }

    /// Current remote endpoint, if known
    pub fn remote(&self) -> Option<SocketAddr> {
        *self.remote.lock()
    }

    /// Receive and parse one packet.
    ///
    /// Unparsable datagrams are counted and skipped, not surfaced; the
    /// next valid packet is returned. The remote endpoint is latched from
    /// the first datagram if SDP never supplied one.
    pub async fn recv_packet(&self) -> RtpResult<RtpPacket> {
        let mut buf = vec![0u8; 2048];
        loop {
            let (len, from) = self.socket.recv_from(&mut buf).await?;
            match RtpPacket::parse(&buf[..len]) {
                Ok(packet) => {
                    self.packets_received.fetch_add(1, Ordering::Relaxed);
                    let mut remote = self.remote.lock();
                    if remote.is_none() {
                        debug!(call_id = %self.call_id, %from, "learned remote media endpoint");
                        *remote = Some(from);
                    }
                    return Ok(packet);
                }
                Err(e) => {
                    self.packets_dropped.fetch_add(1, Ordering::Relaxed);
                    trace!(call_id = %self.call_id, %from, error = %e, "dropped bad datagram");
                }
            }
        }
    }

    /// Packetise encoded G.711 audio and send it to the remote endpoint.
    pub async fn send_encoded(&self, audio: &[u8]) -> RtpResult<()> {
        let remote = self.remote().ok_or(RtpError::NoRemoteEndpoint)?;
        let packets = self.packetizer.lock().build_packets(audio);
        for packet in packets {
            self.socket.send_to(&packet, remote).await?;
            self.packets_sent.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Mark the next outbound packet as the start of a talk spurt.
    pub fn mark_talk_spurt(&self) {
        self.packetizer.lock().mark_talk_spurt();
    }

    /// Snapshot of the session counters
    pub fn stats(&self) -> RtpSessionStats {
        RtpSessionStats {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn bound_pair() -> (RtpSession, RtpSession) {
        // Port 0 lets the OS choose; learn the real ports afterwards
        let a = RtpSession::bind("call-a", 0, G711Variant::MuLaw).await.unwrap();
        let b = RtpSession::bind("call-b", 0, G711Variant::MuLaw).await.unwrap();
        let a_port = a.socket.local_addr().unwrap().port();
        let b_port = b.socket.local_addr().unwrap().port();
        a.set_remote(format!("127.0.0.1:{}", b_port).parse().unwrap());
        b.set_remote(format!("127.0.0.1:{}", a_port).parse().unwrap());
        (a, b)
    }

    #[tokio::test]
    async fn audio_flows_between_sessions() {
        let (a, b) = bound_pair().await;

        a.send_encoded(&vec![0x55u8; 320]).await.unwrap();

        let first = b.recv_packet().await.unwrap();
        let second = b.recv_packet().await.unwrap();
        assert_eq!(first.payload.len(), 160);
        assert!(first.header.marker);
        assert!(!second.header.marker);
        assert_eq!(
            second.header.sequence_number,
            first.header.sequence_number.wrapping_add(1)
        );

        assert_eq!(a.stats().packets_sent, 2);
        assert_eq!(b.stats().packets_received, 2);
    }

    #[tokio::test]
    async fn send_without_remote_fails() {
        let session = RtpSession::bind("lonely", 0, G711Variant::ALaw).await.unwrap();
        let result = session.send_encoded(&[0u8; 160]).await;
        assert!(matches!(result, Err(RtpError::NoRemoteEndpoint)));
    }

    #[tokio::test]
    async fn bad_datagrams_are_counted_not_fatal() {
        let (a, b) = bound_pair().await;

        // Raw junk shorter than a header, then a real packet
        a.socket
            .send_to(&[1, 2, 3], b.socket.local_addr().unwrap())
            .await
            .unwrap();
        a.send_encoded(&vec![0u8; 160]).await.unwrap();

        let packet = b.recv_packet().await.unwrap();
        assert_eq!(packet.payload.len(), 160);
        assert_eq!(b.stats().packets_dropped, 1);
    }
}
