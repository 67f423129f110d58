//! Shared Application State
//!
//! Holds what the HTTP handlers need: the process configuration, a view of the
//! session's lifecycle and the slot the first WebSocket peer is handed through.

use crate::config::Config;
use axum::extract::ws::WebSocket;
use nova_core::{Mode, SessionState};
use std::sync::{Arc, Mutex};
use tokio::sync::{oneshot, watch};

/// Created once at startup and shared by all handlers.
pub struct AppState {
    pub config: Arc<Config>,
    pub mode: Mode,
    pub session_state: watch::Receiver<SessionState>,
    peer: Mutex<Option<oneshot::Sender<WebSocket>>>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        mode: Mode,
        session_state: watch::Receiver<SessionState>,
        peer: Option<oneshot::Sender<WebSocket>>,
    ) -> Self {
        Self {
            config,
            mode,
            session_state,
            peer: Mutex::new(peer),
        }
    }

    /// Takes the peer slot. Only the first caller gets it.
    pub fn claim_peer(&self) -> Option<oneshot::Sender<WebSocket>> {
        self.peer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}
