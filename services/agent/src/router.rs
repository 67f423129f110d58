//! Axum Router Configuration

use crate::{handlers, state::AppState};
use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Creates the router for the health listener.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/healthz", get(handlers::health))
        .route("/ws", get(handlers::ws_handler))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Transport};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use futures_util::StreamExt;
    use nova_core::{Mode, SessionState};
    use serde_json::Value;
    use std::net::SocketAddr;
    use std::path::PathBuf;
    use std::time::Duration;
    use tokio::sync::{oneshot, watch};
    use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
    use tower::ServiceExt;

    fn test_config() -> Arc<Config> {
        Arc::new(Config {
            mode: Mode::Appointments,
            openai_api_key: "sk-test".into(),
            api_base_url: "http://localhost:3001".into(),
            port: 0,
            transport: Transport::WebSocket,
            livekit: None,
            livekit_room: "voice-agent".into(),
            realtime_url: "wss://api.openai.com/v1/realtime".into(),
            realtime_model: "gpt-4o-realtime-preview".into(),
            chat_model: "gpt-4o-mini".into(),
            backend_timeout: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(5),
            metrics_url: None,
            prompts_path: None,
            agent_config_path: PathBuf::from("config.json"),
            agent_name: None,
            use_api_config: false,
            log_level: None,
        })
    }

    fn app_state(
        state: SessionState,
        peer: Option<oneshot::Sender<axum::extract::ws::WebSocket>>,
    ) -> (Arc<AppState>, watch::Sender<SessionState>) {
        let (tx, rx) = watch::channel(state);
        (
            Arc::new(AppState::new(test_config(), Mode::Appointments, rx, peer)),
            tx,
        )
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_reports_mode_and_session_state() {
        let (state, states) = app_state(SessionState::Created, None);
        let app = create_router(state);

        let (status, body) = get_json(app.clone(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "nova-agent");
        assert_eq!(body["mode"], "appointments");
        assert_eq!(body["session"], "created");

        states.send(SessionState::Active).unwrap();
        let (_, body) = get_json(app, "/healthz").await;
        assert_eq!(body["session"], "active");
    }

    #[tokio::test]
    async fn test_health_stays_up_after_the_session_closed() {
        let (state, _states) = app_state(SessionState::Closed, None);
        let (status, body) = get_json(create_router(state), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session"], "closed");
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let (state, _states) = app_state(SessionState::Created, None);
        let response = create_router(state)
            .oneshot(Request::builder().uri("/sessions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_first_peer_is_handed_over_and_second_is_rejected() {
        let (peer_tx, peer_rx) = oneshot::channel();
        let (state, _states) = app_state(SessionState::Created, Some(peer_tx));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(
                listener,
                create_router(state).into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        let (_first, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
        let handed = tokio::time::timeout(Duration::from_secs(5), peer_rx)
            .await
            .expect("peer should be handed over")
            .unwrap();

        let (mut second, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
        let reply = tokio::time::timeout(Duration::from_secs(5), second.next())
            .await
            .unwrap();
        match reply {
            Some(Ok(WsMessage::Text(text))) => {
                let value: Value = serde_json::from_str(text.as_str()).unwrap();
                assert_eq!(value["type"], "error");
            }
            other => panic!("Expected an error message, got {other:?}"),
        }
        drop(handed);
    }
}
