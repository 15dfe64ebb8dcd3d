//! Minimal SIP endpoint
//!
//! Enough SIP over UDP to accept a call from a softphone or PBX and tear
//! it down again: REGISTER is acknowledged without credential checks
//! (local testing), INVITE gets a 200 OK carrying our SDP answer, ACK is
//! absorbed, BYE gets a 200 OK and ends the media session. This is not a
//! registrar or proxy and deliberately implements nothing else.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use voxdial_audio_core::codec::G711Variant;

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::CallMetadata;
use crate::rtp::RtpMediaGateway;
use crate::sdp::{SdpAnswer, SdpOffer};

/// Events surfaced to the call engine
#[derive(Debug, Clone)]
pub enum SipEvent {
    /// An INVITE was answered; media is flowing
    CallStarted {
        /// Call-ID header value, used as the call id
        call_id: String,
        /// From header value
        from: String,
        /// To header value
        to: String,
    },
    /// A BYE arrived for a live call
    CallEnded {
        /// Call-ID header value
        call_id: String,
    },
}

/// Endpoint configuration
#[derive(Debug, Clone)]
pub struct SipEndpointConfig {
    /// UDP bind address for signalling
    pub bind_addr: SocketAddr,
    /// IP advertised in SDP answers
    pub advertised_ip: IpAddr,
}

impl Default for SipEndpointConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5060".parse().unwrap(),
            advertised_ip: "127.0.0.1".parse().unwrap(),
        }
    }
}

/// One parsed SIP request
#[derive(Debug, Clone)]
struct SipRequest {
    method: String,
    header_block: Vec<(String, String)>,
    body: String,
}

impl SipRequest {
    fn parse(datagram: &str) -> Option<Self> {
        let (head, body) = match datagram.split_once("\r\n\r\n") {
            Some((head, body)) => (head, body.to_string()),
            None => (datagram, String::new()),
        };
        let mut lines = head.lines();
        let request_line = lines.next()?;
        let method = request_line.split_whitespace().next()?.to_uppercase();
        if !request_line.contains("SIP/2.0") {
            return None;
        }

        let mut header_block = Vec::new();
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                header_block.push((name.trim().to_lowercase(), value.trim().to_string()));
            }
        }
        Some(Self {
            method,
            header_block,
            body,
        })
    }

    fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_lowercase();
        self.header_block
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Echo the dialogue-identifying headers into a response.
    fn response(&self, status: u16, reason: &str, body: Option<(&str, &str)>) -> String {
        let mut out = format!("SIP/2.0 {} {}\r\n", status, reason);
        for name in ["via", "from", "to", "call-id", "cseq"] {
            if let Some(value) = self.header(name) {
                let canonical = match name {
                    "via" => "Via",
                    "from" => "From",
                    "to" => "To",
                    "call-id" => "Call-ID",
                    _ => "CSeq",
                };
                out.push_str(&format!("{}: {}\r\n", canonical, value));
            }
        }
        match body {
            Some((content_type, payload)) => {
                out.push_str(&format!("Content-Type: {}\r\n", content_type));
                out.push_str(&format!("Content-Length: {}\r\n\r\n", payload.len()));
                out.push_str(payload);
            }
            None => out.push_str("Content-Length: 0\r\n\r\n"),
        }
        out
    }
}

/// UDP SIP endpoint driving the RTP gateway.
pub struct SipEndpoint {
    config: SipEndpointConfig,
    gateway: Arc<RtpMediaGateway>,
    events: mpsc::Sender<SipEvent>,
}

impl SipEndpoint {
    /// Create an endpoint that manages sessions on `gateway` and reports
    /// call lifecycle on `events`.
    pub fn new(
        config: SipEndpointConfig,
        gateway: Arc<RtpMediaGateway>,
        events: mpsc::Sender<SipEvent>,
    ) -> Self {
        Self {
            config,
            gateway,
            events,
        }
    }

    /// Serve until cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> GatewayResult<()> {
        let socket = UdpSocket::bind(self.config.bind_addr).await?;
        info!(bind = %self.config.bind_addr, "sip endpoint listening");
        let mut buf = vec![0u8; 8192];

        loop {
            let (len, peer) = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("sip endpoint stopping");
                    return Ok(());
                }
                received = socket.recv_from(&mut buf) => received?,
            };

            let datagram = String::from_utf8_lossy(&buf[..len]).to_string();
            let Some(request) = SipRequest::parse(&datagram) else {
                debug!(%peer, "ignoring non-SIP datagram");
                continue;
            };

            let reply = match self.handle(&request).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(method = %request.method, error = %e, "request handling failed");
                    request.response(500, "Server Internal Error", None)
                }
            };
            // ACK produces no response
            if reply.is_empty() {
                continue;
            }
            if let Err(e) = socket.send_to(reply.as_bytes(), peer).await {
                warn!(%peer, error = %e, "failed to send response");
            }
        }
    }

    async fn handle(&self, request: &SipRequest) -> GatewayResult<String> {
        match request.method.as_str() {
            // Accepted without credential validation for local testing
            "REGISTER" => Ok(request.response(200, "OK", None)),
            "INVITE" => self.handle_invite(request).await,
            "ACK" => Ok(String::new()),
            "BYE" => self.handle_bye(request).await,
            other => {
                debug!(method = other, "unimplemented SIP method");
                Ok(request.response(501, "Not Implemented", None))
            }
        }
    }

    async fn handle_invite(&self, request: &SipRequest) -> GatewayResult<String> {
        let call_id = request
            .header("call-id")
            .ok_or_else(|| GatewayError::Sip("INVITE missing Call-ID".into()))?
            .to_string();
        let offer = SdpOffer::parse(&request.body)?;
        let variant = offer.chosen_variant().unwrap_or(G711Variant::MuLaw);

        let metadata = CallMetadata {
            phone_number: request.header("from").map(|f| f.to_string()),
            ..Default::default()
        };
        let local_port = self
            .gateway
            .start_rtp_call(&call_id, metadata, variant, Some(offer.remote_addr()))
            .await?;

        let answer = SdpAnswer::new(
            self.config.advertised_ip,
            local_port,
            variant,
            rand_session_id(&call_id),
        );
        info!(%call_id, local_port, ?variant, "invite answered");

        let _ = self
            .events
            .send(SipEvent::CallStarted {
                call_id: call_id.clone(),
                from: request.header("from").unwrap_or_default().to_string(),
                to: request.header("to").unwrap_or_default().to_string(),
            })
            .await;

        Ok(request.response(200, "OK", Some(("application/sdp", &answer.render()))))
    }

    async fn handle_bye(&self, request: &SipRequest) -> GatewayResult<String> {
        let call_id = request
            .header("call-id")
            .ok_or_else(|| GatewayError::Sip("BYE missing Call-ID".into()))?
            .to_string();
        info!(%call_id, "bye received");

        use crate::gateway::MediaGateway;
        self.gateway.on_call_ended(&call_id, "bye").await;
        let _ = self.events.send(SipEvent::CallEnded { call_id }).await;

        Ok(request.response(200, "OK", None))
    }
}

/// Stable per-dialogue session id for the o= line.
fn rand_session_id(call_id: &str) -> u64 {
    call_id.bytes().fold(0u64, |acc, b| {
        acc.wrapping_mul(31).wrapping_add(b as u64)
    })
}
