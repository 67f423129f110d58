//! Axum handlers for the health and WebSocket routes.

use crate::{state::AppState, transport::ws};
use axum::{
    extract::{State, WebSocketUpgrade},
    response::{Json, Response},
};
use nova_core::{Mode, SessionState};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

pub const SERVICE_NAME: &str = "nova-agent";

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub mode: Mode,
    pub session: SessionState,
}

/// Liveness probe. Answers while the process is up, whatever the session is doing.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let session = *state.session_state.borrow();
    Json(HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
        mode: state.mode,
        session,
    })
}

/// Upgrades the connection and hands the socket to the waiting runtime.
/// The process serves one peer; later peers are told so and closed.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| async move {
        match state.claim_peer() {
            Some(slot) => match slot.send(socket) {
                Ok(()) => info!("WebSocket peer handed to the session."),
                Err(socket) => {
                    warn!("Session no longer waiting for a peer.");
                    ws::reject(socket, "The session has ended.").await;
                }
            },
            None => {
                warn!("Rejecting a second WebSocket peer.");
                ws::reject(socket, "This agent is already serving a conversation.").await;
            }
        }
    })
}
