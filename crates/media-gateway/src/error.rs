//! Error types for the media gateways

use thiserror::Error;

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors produced by the gateway layer
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A second session was started for a call id already live
    #[error("call {call_id} already has a live gateway session")]
    SessionExists {
        /// Offending call id
        call_id: String,
    },

    /// Operation referenced a call with no live session
    #[error("no live gateway session for call {call_id}")]
    SessionNotFound {
        /// Offending call id
        call_id: String,
    },

    /// Audio-layer failure (codec, resample, recording)
    #[error(transparent)]
    Audio(#[from] voxdial_audio_core::AudioError),

    /// RTP-layer failure (socket, ports, packets)
    #[error(transparent)]
    Rtp(#[from] voxdial_rtp_core::RtpError),

    /// SIP endpoint failure
    #[error("sip endpoint error: {0}")]
    Sip(String),

    /// Socket-level failure
    #[error("gateway socket error: {0}")]
    Socket(#[from] std::io::Error),
}
