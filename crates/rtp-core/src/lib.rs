//! voxdial RTP Core Library
//!
//! RFC 3550 packet handling for the narrowband telephony path: header
//! build/parse, 20 ms G.711 packetisation with wrapping sequence numbers
//! and sample-accurate timestamps, per-call UDP media sessions, and local
//! media port allocation.

pub mod error;
pub mod packet;
pub mod packetizer;
pub mod ports;
pub mod session;

pub use error::{RtpError, RtpResult};
pub use packet::{RtpHeader, RtpPacket, RTP_HEADER_LEN};
pub use packetizer::{Packetizer, SAMPLES_PER_PACKET};
pub use ports::PortAllocator;
pub use session::{RtpSession, RtpSessionStats};
