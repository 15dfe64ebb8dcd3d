//! Outbound packetisation
//!
//! Splits encoded G.711 bytes into 20 ms packets (160 samples = 160 bytes
//! at 8 kHz) with a random SSRC, wrapping sequence numbers, and timestamps
//! that advance by exactly the samples carried per packet.

use rand::Rng;
use voxdial_audio_core::codec::G711Variant;

use crate::packet::{RtpHeader, RtpPacket};

/// Samples (and bytes) per 20 ms G.711 packet at 8 kHz
pub const SAMPLES_PER_PACKET: usize = 160;

/// Stateful RTP packet builder for one media stream.
pub struct Packetizer {
    payload_type: u8,
    ssrc: u32,
    next_sequence: u16,
    next_timestamp: u32,
    samples_per_packet: usize,
    /// Marker goes out on the next packet (start of a talk spurt)
    mark_next: bool,
}

impl Packetizer {
    /// Create a packetiser for a G.711 stream with a random SSRC.
    pub fn new(variant: G711Variant) -> Self {
        let mut rng = rand::thread_rng();
        Self::with_ssrc(variant, rng.gen())
    }

    /// Create a packetiser with an explicit SSRC (tests, replay).
    pub fn with_ssrc(variant: G711Variant, ssrc: u32) -> Self {
        Self {
            payload_type: variant.payload_type(),
            ssrc,
            next_sequence: 0,
            next_timestamp: 0,
            samples_per_packet: SAMPLES_PER_PACKET,
            mark_next: true,
        }
    }

    /// SSRC of this stream
    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// Sequence number the next packet will carry
    pub fn next_sequence(&self) -> u16 {
        self.next_sequence
    }

    /// Timestamp the next packet will carry
    pub fn next_timestamp(&self) -> u32 {
        self.next_timestamp
    }

    /// Flag the start of a new talk spurt; the next packet carries the
    /// marker bit.
    pub fn mark_talk_spurt(&mut self) {
        self.mark_next = true;
    }

    /// Split encoded audio into wire-ready packets.
    ///
    /// A trailing remainder shorter than a full packet is still emitted;
    /// its timestamp advance on the following packet reflects the full
    /// packet interval, which G.711 receivers tolerate at end of stream.
    pub fn build_packets(&mut self, audio: &[u8]) -> Vec<Vec<u8>> {
        let mut packets = Vec::with_capacity(audio.len().div_ceil(self.samples_per_packet));

        for chunk in audio.chunks(self.samples_per_packet) {
            let packet = RtpPacket {
                header: RtpHeader {
                    version: 2,
                    padding: false,
                    extension: false,
                    csrc_count: 0,
                    marker: std::mem::take(&mut self.mark_next),
                    payload_type: self.payload_type,
                    sequence_number: self.next_sequence,
                    timestamp: self.next_timestamp,
                    ssrc: self.ssrc,
                },
                payload: chunk.to_vec(),
            };

            self.next_sequence = self.next_sequence.wrapping_add(1);
            self.next_timestamp = self.next_timestamp.wrapping_add(self.samples_per_packet as u32);
            packets.push(packet.to_bytes());
        }

        packets
    }

    /// Reset stream state for a new session, keeping SSRC and codec.
    pub fn reset(&mut self) {
        self.next_sequence = 0;
        self.next_timestamp = 0;
        self.mark_next = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::RtpPacket;

    #[test]
    fn splits_into_20ms_packets() {
        let mut packetizer = Packetizer::with_ssrc(G711Variant::MuLaw, 7);
        let audio = vec![0u8; 480]; // 60 ms
        let packets = packetizer.build_packets(&audio);
        assert_eq!(packets.len(), 3);
        for bytes in &packets {
            let parsed = RtpPacket::parse(bytes).unwrap();
            assert_eq!(parsed.payload.len(), SAMPLES_PER_PACKET);
            assert_eq!(parsed.header.payload_type, 0);
            assert_eq!(parsed.header.ssrc, 7);
        }
    }

    #[test]
    fn sequence_and_timestamp_advance_monotonically() {
        let mut packetizer = Packetizer::with_ssrc(G711Variant::ALaw, 1);
        let packets = packetizer.build_packets(&vec![0u8; 160 * 5]);
        let parsed: Vec<_> = packets
            .iter()
            .map(|b| RtpPacket::parse(b).unwrap())
            .collect();
        for window in parsed.windows(2) {
            let (a, b) = (&window[0].header, &window[1].header);
            assert_eq!(b.sequence_number, a.sequence_number.wrapping_add(1));
            assert_eq!(b.timestamp, a.timestamp + SAMPLES_PER_PACKET as u32);
        }
    }

    #[test]
    fn sequence_wraps_modulo_u16() {
        let mut packetizer = Packetizer::with_ssrc(G711Variant::MuLaw, 1);
        packetizer.next_sequence = u16::MAX;
        let packets = packetizer.build_packets(&vec![0u8; 320]);
        let first = RtpPacket::parse(&packets[0]).unwrap();
        let second = RtpPacket::parse(&packets[1]).unwrap();
        assert_eq!(first.header.sequence_number, u16::MAX);
        assert_eq!(second.header.sequence_number, 0);
    }

    #[test]
    fn marker_set_on_talk_spurt_start_only() {
        let mut packetizer = Packetizer::with_ssrc(G711Variant::MuLaw, 1);
        let packets = packetizer.build_packets(&vec![0u8; 480]);
        let markers: Vec<bool> = packets
            .iter()
            .map(|b| RtpPacket::parse(b).unwrap().header.marker)
            .collect();
        assert_eq!(markers, vec![true, false, false]);

        packetizer.mark_talk_spurt();
        let next = packetizer.build_packets(&vec![0u8; 160]);
        assert!(RtpPacket::parse(&next[0]).unwrap().header.marker);
    }

    #[test]
    fn short_tail_is_emitted() {
        let mut packetizer = Packetizer::with_ssrc(G711Variant::MuLaw, 1);
        let packets = packetizer.build_packets(&vec![0u8; 200]);
        assert_eq!(packets.len(), 2);
        let tail = RtpPacket::parse(&packets[1]).unwrap();
        assert_eq!(tail.payload.len(), 40);
    }

    #[test]
    fn reset_rewinds_stream_state() {
        let mut packetizer = Packetizer::with_ssrc(G711Variant::MuLaw, 9);
        packetizer.build_packets(&vec![0u8; 480]);
        packetizer.reset();
        assert_eq!(packetizer.next_sequence(), 0);
        assert_eq!(packetizer.next_timestamp(), 0);
        assert_eq!(packetizer.ssrc(), 9);
    }
}
