//! Minimal SDP offer/answer
//!
//! Just enough of RFC 4566 for a narrowband softphone call: pull the
//! remote address, media port and offered G.711 payload types out of an
//! offer, and render an answer advertising our allocated port and the
//! chosen codec. Anything beyond audio/G.711 in the offer is ignored.

use std::net::{IpAddr, SocketAddr};

use voxdial_audio_core::codec::G711Variant;

use crate::error::{GatewayError, GatewayResult};

/// The parts of an SDP offer this gateway acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdpOffer {
    /// Remote media address from the c= line
    pub remote_ip: IpAddr,
    /// Remote audio port from the m=audio line
    pub audio_port: u16,
    /// Payload types offered on the audio line
    pub payload_types: Vec<u8>,
}

impl SdpOffer {
    /// Parse an offer body.
    pub fn parse(body: &str) -> GatewayResult<Self> {
        let mut remote_ip: Option<IpAddr> = None;
        let mut audio_port: Option<u16> = None;
        let mut payload_types = Vec::new();

        for line in body.lines() {
            let line = line.trim();
            if let Some(connection) = line.strip_prefix("c=") {
                // c=IN IP4 192.0.2.10
                if let Some(addr) = connection.split_whitespace().nth(2) {
                    remote_ip = addr.parse().ok();
                }
            } else if let Some(media) = line.strip_prefix("m=audio ") {
                // m=audio 49170 RTP/AVP 0 8 101
                let mut fields = media.split_whitespace();
                audio_port = fields.next().and_then(|p| p.parse().ok());
                payload_types = fields.skip(1).filter_map(|pt| pt.parse().ok()).collect();
            }
        }

        let remote_ip =
            remote_ip.ok_or_else(|| GatewayError::Sip("offer has no connection line".into()))?;
        let audio_port =
            audio_port.ok_or_else(|| GatewayError::Sip("offer has no audio line".into()))?;

        Ok(Self {
            remote_ip,
            audio_port,
            payload_types,
        })
    }

    /// Remote RTP endpoint
    pub fn remote_addr(&self) -> SocketAddr {
        SocketAddr::new(self.remote_ip, self.audio_port)
    }

    /// First offered G.711 variant, µ-law preferred on a tie with order.
    pub fn chosen_variant(&self) -> Option<G711Variant> {
        self.payload_types
            .iter()
            .find_map(|&pt| G711Variant::from_payload_type(pt))
    }
}

/// An SDP answer for one G.711 audio stream
#[derive(Debug, Clone)]
pub struct SdpAnswer {
    /// Local media address to advertise
    pub local_ip: IpAddr,
    /// Allocated local RTP port
    pub local_port: u16,
    /// Chosen codec
    pub variant: G711Variant,
    /// Session identifier for the o= line
    pub session_id: u64,
}

impl SdpAnswer {
    /// Build an answer.
    pub fn new(local_ip: IpAddr, local_port: u16, variant: G711Variant, session_id: u64) -> Self {
        Self {
            local_ip,
            local_port,
            variant,
            session_id,
        }
    }

    /// Render the answer body.
    pub fn render(&self) -> String {
        let pt = self.variant.payload_type();
        let codec_name = match self.variant {
            G711Variant::MuLaw => "PCMU",
            G711Variant::ALaw => "PCMA",
        };
        format!(
            "v=0\r\n\
             o=voxdial {sid} {sid} IN IP4 {ip}\r\n\
             s=voxdial call\r\n\
             c=IN IP4 {ip}\r\n\
             t=0 0\r\n\
             m=audio {port} RTP/AVP {pt}\r\n\
             a=rtpmap:{pt} {codec}/8000\r\n\
             a=sendrecv\r\n",
            sid = self.session_id,
            ip = self.local_ip,
            port = self.local_port,
            pt = pt,
            codec = codec_name,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFER: &str = "v=0\r\n\
        o=softphone 1234 1234 IN IP4 192.0.2.10\r\n\
        s=call\r\n\
        c=IN IP4 192.0.2.10\r\n\
        t=0 0\r\n\
        m=audio 49170 RTP/AVP 0 8 101\r\n\
        a=rtpmap:0 PCMU/8000\r\n";

    #[test]
    fn parses_offer_fields() {
        let offer = SdpOffer::parse(OFFER).unwrap();
        assert_eq!(offer.remote_ip, "192.0.2.10".parse::<IpAddr>().unwrap());
        assert_eq!(offer.audio_port, 49_170);
        assert_eq!(offer.payload_types, vec![0, 8, 101]);
        assert_eq!(offer.chosen_variant(), Some(G711Variant::MuLaw));
        assert_eq!(offer.remote_addr().to_string(), "192.0.2.10:49170");
    }

    #[test]
    fn alaw_only_offer_chooses_alaw() {
        let body = OFFER.replace("RTP/AVP 0 8 101", "RTP/AVP 8");
        let offer = SdpOffer::parse(&body).unwrap();
        assert_eq!(offer.chosen_variant(), Some(G711Variant::ALaw));
    }

    #[test]
    fn offer_without_g711_has_no_variant() {
        let body = OFFER.replace("RTP/AVP 0 8 101", "RTP/AVP 96 101");
        let offer = SdpOffer::parse(&body).unwrap();
        assert_eq!(offer.chosen_variant(), None);
    }

    #[test]
    fn missing_lines_are_errors() {
        assert!(SdpOffer::parse("v=0\r\ns=x\r\n").is_err());
    }

    #[test]
    fn answer_renders_chosen_codec() {
        let answer = SdpAnswer::new(
            "198.51.100.5".parse().unwrap(),
            10_000,
            G711Variant::MuLaw,
            77,
        );
        let body = answer.render();
        assert!(body.contains("m=audio 10000 RTP/AVP 0"));
        assert!(body.contains("a=rtpmap:0 PCMU/8000"));
        assert!(body.contains("c=IN IP4 198.51.100.5"));

        // An answer is itself parseable as an offer
        let parsed = SdpOffer::parse(&body).unwrap();
        assert_eq!(parsed.audio_port, 10_000);
    }
}
