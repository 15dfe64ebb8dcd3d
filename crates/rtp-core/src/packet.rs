//! RTP packet structure and wire codec
//!
//! Fixed 12-byte header per RFC 3550 §5.1. This gateway never emits
//! padding, extensions or CSRC entries, and the parser tolerates but does
//! not interpret them (CSRC/extension words are counted into the payload
//! offset).

use crate::error::{RtpError, RtpResult};

/// Length of the fixed RTP header in bytes
pub const RTP_HEADER_LEN: usize = 12;

/// Parsed RTP header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    /// Protocol version, always 2 on emit
    pub version: u8,
    /// Padding flag
    pub padding: bool,
    /// Extension flag
    pub extension: bool,
    /// CSRC count
    pub csrc_count: u8,
    /// Marker bit; set on the first packet of a talk spurt
    pub marker: bool,
    /// Payload type (0 = PCMU, 8 = PCMA)
    pub payload_type: u8,
    /// Sequence number, wraps modulo 2^16
    pub sequence_number: u16,
    /// Sampling timestamp, advances by samples per packet
    pub timestamp: u32,
    /// Synchronisation source identifier
    pub ssrc: u32,
}

/// One RTP packet: header plus media payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    /// Header fields
    pub header: RtpHeader,
    /// Media payload bytes
    pub payload: Vec<u8>,
}

impl RtpPacket {
    /// Parse a datagram into header and payload.
    ///
    /// Rejects datagrams shorter than the fixed header and versions other
    /// than 2. CSRC entries, when present, are skipped.
    pub fn parse(data: &[u8]) -> RtpResult<Self> {
        if data.len() < RTP_HEADER_LEN {
            return Err(RtpError::PacketTooShort { len: data.len() });
        }

        let version = (data[0] >> 6) & 0x03;
        if version != 2 {
            return Err(RtpError::UnsupportedVersion { version });
        }

        let padding = (data[0] & 0x20) != 0;
        let extension = (data[0] & 0x10) != 0;
        let csrc_count = data[0] & 0x0F;
        let marker = (data[1] & 0x80) != 0;
        let payload_type = data[1] & 0x7F;
        let sequence_number = u16::from_be_bytes([data[2], data[3]]);
        let timestamp = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let ssrc = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

        let payload_offset = RTP_HEADER_LEN + csrc_count as usize * 4;
        if data.len() < payload_offset {
            return Err(RtpError::PacketTooShort { len: data.len() });
        }

        Ok(RtpPacket {
            header: RtpHeader {
                version,
                padding,
                extension,
                csrc_count,
                marker,
                payload_type,
                sequence_number,
                timestamp,
                ssrc,
            },
            payload: data[payload_offset..].to_vec(),
        })
    }

    /// Serialise to wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(RTP_HEADER_LEN + self.payload.len());

        let byte0 = (self.header.version << 6)
            | (u8::from(self.header.padding) << 5)
            | (u8::from(self.header.extension) << 4)
            | (self.header.csrc_count & 0x0F);
        data.push(byte0);
        data.push((u8::from(self.header.marker) << 7) | (self.header.payload_type & 0x7F));
        data.extend_from_slice(&self.header.sequence_number.to_be_bytes());
        data.extend_from_slice(&self.header.timestamp.to_be_bytes());
        data.extend_from_slice(&self.header.ssrc.to_be_bytes());
        data.extend_from_slice(&self.payload);

        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_packet() -> RtpPacket {
        RtpPacket {
            header: RtpHeader {
                version: 2,
                padding: false,
                extension: false,
                csrc_count: 0,
                marker: true,
                payload_type: 0,
                sequence_number: 0x1234,
                timestamp: 0x56789ABC,
                ssrc: 0xDEADBEEF,
                },
            payload: vec![0xFF, 0x7F, 0x00, 0x80],
        }
    }

    #[test]
    fn wire_round_trip() {
        let packet = sample_packet();
        let bytes = packet.to_bytes();
        assert_eq!(bytes.len(), RTP_HEADER_LEN + 4);
        assert_eq!(RtpPacket::parse(&bytes).unwrap(), packet);
    }

    #[test]
    fn serialized_layout_is_big_endian() {
        let bytes = sample_packet().to_bytes();
        assert_eq!(bytes[0], 0x80); // V=2, no padding/extension/CSRC
        assert_eq!(bytes[1], 0x80); // marker set, PT 0
        assert_eq!(&bytes[2..4], &[0x12, 0x34]);
        assert_eq!(&bytes[4..8], &[0x56, 0x78, 0x9A, 0xBC]);
        assert_eq!(&bytes[8..12], &[0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn short_datagram_is_rejected() {
        for len in 0..RTP_HEADER_LEN {
            let result = RtpPacket::parse(&vec![0x80; len]);
            assert!(matches!(result, Err(RtpError::PacketTooShort { .. })));
        }
    }

    #[test]
    fn wrong_version_is_rejected() {
        let mut bytes = sample_packet().to_bytes();
        bytes[0] = 0x40; // version 1
        assert!(matches!(
            RtpPacket::parse(&bytes),
            Err(RtpError::UnsupportedVersion { version: 1 })
        ));
    }

    #[test]
    fn csrc_entries_shift_payload() {
        let mut packet = sample_packet();
        packet.header.csrc_count = 1;
        let mut bytes = packet.to_bytes();
        // Splice a CSRC word between header and payload
        bytes.splice(12..12, [0u8; 4]);
        let parsed = RtpPacket::parse(&bytes).unwrap();
        assert_eq!(parsed.payload, packet.payload);
    }
}
