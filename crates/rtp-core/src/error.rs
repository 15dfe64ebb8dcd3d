//! Error types for RTP handling

use thiserror::Error;

/// Result type for RTP operations
pub type RtpResult<T> = Result<T, RtpError>;

/// Errors produced by the RTP layer
#[derive(Debug, Error)]
pub enum RtpError {
    /// Datagram too short to hold the fixed 12-byte header
    #[error("datagram of {len} bytes is shorter than an RTP header")]
    PacketTooShort {
        /// Observed datagram length
        len: usize,
    },

    /// Header declared a version other than 2
    #[error("unsupported RTP version {version}")]
    UnsupportedVersion {
        /// Observed version field
        version: u8,
    },

    /// Payload type outside the codecs this gateway negotiates
    #[error("unsupported payload type {payload_type}")]
    UnsupportedPayloadType {
        /// Observed payload type
        payload_type: u8,
    },

    /// No free media port in the configured range
    #[error("media port range {base}..{end} exhausted")]
    PortsExhausted {
        /// First port of the range
        base: u16,
        /// One past the last port of the range
        end: u16,
    },

    /// Socket-level failure
    #[error("media socket error: {0}")]
    Socket(#[from] std::io::Error),

    /// Send attempted before the remote endpoint is known
    #[error("remote media endpoint not yet learned for this session")]
    NoRemoteEndpoint,
}
