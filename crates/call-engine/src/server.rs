//! HTTP surface
//!
//! One axum router carries the whole inbound edge: the voice WebSocket
//! the carrier connects to, the answer/event webhooks, and campaign
//! control. The WebSocket handler validates its required query
//! parameters before any session is created; a missing parameter gets a
//! JSON error frame and close code 4000.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use voxdial_media_gateway::{CallMetadata, ControlMessage, MediaGateway};

use crate::engine::CallEngine;

/// Close code for a rejected voice socket
const CLOSE_BAD_REQUEST: u16 = 4000;

/// Build the full router over a shared engine.
pub fn router(engine: Arc<CallEngine>) -> Router {
    Router::new()
        .route("/voice/:external_call_uuid", get(voice_ws))
        .route("/webhooks/answer", post(answer_webhook))
        .route("/webhooks/event", post(event_webhook))
        .route("/campaigns/:campaign_id/start", post(start_campaign))
        .route("/campaigns/:campaign_id/pause", post(pause_campaign))
        .route("/campaigns/:campaign_id/stop", post(stop_campaign))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

// ---- voice websocket -----------------------------------------------------

async fn voice_ws(
    State(engine): State<Arc<CallEngine>>,
    Path(external_call_uuid): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let required = ["tenant_id", "campaign_id", "lead_id"];
    let missing: Vec<&str> = required
        .iter()
        .filter(|&&name| params.get(name).map(|v| v.is_empty()).unwrap_or(true))
        .copied()
        .collect();

    if !missing.is_empty() {
        return ws.on_upgrade(move |socket| reject_socket(socket, missing));
    }

    ws.on_upgrade(move |socket| voice_socket(engine, external_call_uuid, params, socket))
}

/// Send a JSON error frame, then close with code 4000.
async fn reject_socket(mut socket: WebSocket, missing: Vec<&'static str>) {
    let error = ControlMessage::Error {
        message: format!("missing required query parameters: {}", missing.join(", ")),
    };
    if let Ok(body) = serde_json::to_string(&error) {
        let _ = socket.send(Message::Text(body)).await;
    }
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: CLOSE_BAD_REQUEST,
            reason: "missing required query parameters".into(),
        })))
        .await;
}

/// The per-socket pump: socket frames in, gateway output out.
async fn voice_socket(
    engine: Arc<CallEngine>,
    external_call_uuid: String,
    params: HashMap<String, String>,
    mut socket: WebSocket,
) {
    // Prefer the explicit call_id, then the call row for this UUID, then
    // the UUID itself (bare test clients)
    let call_id = match params.get("call_id").filter(|v| !v.is_empty()) {
        Some(id) => id.clone(),
        None => match engine.db().call_by_external_uuid(&external_call_uuid).await {
            Ok(Some((_, id))) => id,
            _ => external_call_uuid.clone(),
        },
    };

    let metadata = CallMetadata {
        tenant_id: params.get("tenant_id").cloned().unwrap_or_default(),
        campaign_id: params.get("campaign_id").cloned().unwrap_or_default(),
        lead_id: params.get("lead_id").cloned().unwrap_or_default(),
        phone_number: params.get("phone_number").cloned(),
        external_call_uuid: Some(external_call_uuid.clone()),
    };

    let cancel = match engine.start_ws_call(call_id.clone(), metadata).await {
        Ok(cancel) => cancel,
        Err(e) => {
            warn!(%call_id, error = %e, "voice session rejected");
            let error = ControlMessage::Error {
                message: "session could not be started".to_string(),
            };
            if let Ok(body) = serde_json::to_string(&error) {
                let _ = socket.send(Message::Text(body)).await;
            }
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    let gateway = engine.ws_gateway().clone();
    let Some(output) = gateway.output_queue(&call_id) else {
        cancel.cancel();
        return;
    };

    let start = ControlMessage::SessionStart {
        call_id: call_id.clone(),
        sample_rate: 16_000,
    };
    if let Ok(body) = serde_json::to_string(&start) {
        let _ = socket.send(Message::Text(body)).await;
    }
    info!(%call_id, %external_call_uuid, "voice socket attached");

    loop {
        tokio::select! {
            message = socket.recv() => {
                match message {
                    Some(Ok(Message::Binary(frame))) => {
                        gateway.on_audio_received(&call_id, &frame).await;
                    }
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ControlMessage>(&text) {
                            Ok(ControlMessage::Ping) => {
                                if let Ok(pong) = serde_json::to_string(&ControlMessage::Pong) {
                                    let _ = socket.send(Message::Text(pong)).await;
                                }
                            }
                            Ok(ControlMessage::SessionEnd { reason }) => {
                                debug!(%call_id, ?reason, "peer ended session");
                                break;
                            }
                            Ok(other) => debug!(%call_id, ?other, "control message"),
                            Err(e) => debug!(%call_id, error = %e, "unparseable control frame"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(%call_id, error = %e, "socket error");
                        break;
                    }
                }
            }
            chunk = output.pop() => {
                match chunk {
                    Some(pcm) => {
                        if socket.send(Message::Binary(pcm)).await.is_err() {
                            break;
                        }
                    }
                    // Pipeline finalised and closed the session
                    None => break,
                }
            }
        }
    }

    cancel.cancel();
    info!(%call_id, "voice socket detached");
}

// ---- webhooks ------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AnswerWebhook {
    uuid: String,
    #[allow(dead_code)]
    to: Option<String>,
    #[allow(dead_code)]
    from: Option<String>,
}

async fn answer_webhook(
    State(engine): State<Arc<CallEngine>>,
    Json(body): Json<AnswerWebhook>,
) -> Response {
    match engine.answer_ncco(&body.uuid).await {
        Ok(ncco) => Json(ncco).into_response(),
        Err(e) => {
            warn!(uuid = %body.uuid, error = %e, "answer webhook failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "answer handling failed"})),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct EventWebhook {
    uuid: String,
    status: String,
    duration: Option<u32>,
}

async fn event_webhook(
    State(engine): State<Arc<CallEngine>>,
    Json(body): Json<EventWebhook>,
) -> Response {
    match engine
        .handle_call_event(&body.uuid, &body.status, body.duration)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            warn!(uuid = %body.uuid, error = %e, "event webhook failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "event handling failed"})),
            )
                .into_response()
        }
    }
}

// ---- campaign control ----------------------------------------------------

#[derive(Debug, Deserialize)]
struct CampaignControl {
    tenant_id: String,
}

async fn start_campaign(
    State(engine): State<Arc<CallEngine>>,
    Path(campaign_id): Path<String>,
    Json(body): Json<CampaignControl>,
) -> Response {
    match engine.start_campaign(&body.tenant_id, &campaign_id).await {
        Ok(enqueued) => Json(json!({"enqueued": enqueued})).into_response(),
        Err(e) => {
            warn!(%campaign_id, error = %e, "campaign start failed");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": e.to_string()})),
            )
                .into_response()
        }
    }
}

async fn pause_campaign(
    State(engine): State<Arc<CallEngine>>,
    Path(campaign_id): Path<String>,
    Json(body): Json<CampaignControl>,
) -> Response {
    set_status_response(
        engine.pause_campaign(&body.tenant_id, &campaign_id).await,
        &campaign_id,
    )
}

async fn stop_campaign(
    State(engine): State<Arc<CallEngine>>,
    Path(campaign_id): Path<String>,
    Json(body): Json<CampaignControl>,
) -> Response {
    set_status_response(
        engine.stop_campaign(&body.tenant_id, &campaign_id).await,
        &campaign_id,
    )
}

fn set_status_response(result: crate::error::EngineResult<bool>, campaign_id: &str) -> Response {
    match result {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("campaign {} not found", campaign_id)})),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}
