//! voxdial Media Gateway Library
//!
//! Per-call audio I/O at the telephony edge. Two gateway variants sit
//! behind one contract:
//!
//! - **WebSocket gateway**: a cloud provider streams 16 kHz linear PCM
//!   as binary frames, with tagged JSON control messages on the side.
//! - **RTP gateway**: a softphone or PBX sends G.711 at 8 kHz over UDP,
//!   negotiated by a deliberately minimal SIP dialogue.
//!
//! Both decode inbound audio to 16 kHz PCM for the pipeline, capture a
//! per-call recording at gateway-native rate, and keep every queue
//! bounded: on overflow the oldest chunk is dropped and counted, because
//! stale audio is worthless in a real-time call and blocking the media
//! path is worse.

pub mod control;
pub mod error;
pub mod gateway;
pub mod queue;
pub mod rtp;
pub mod sdp;
pub mod sip;
pub mod ws;

pub use control::ControlMessage;
pub use error::{GatewayError, GatewayResult};
pub use gateway::{CallMetadata, GatewaySessionStats, MediaGateway};
pub use queue::BoundedAudioQueue;
pub use rtp::RtpMediaGateway;
pub use sdp::{SdpAnswer, SdpOffer};
pub use sip::{SipEndpoint, SipEndpointConfig, SipEvent};
pub use ws::WsMediaGateway;
