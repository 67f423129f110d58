//! Process wiring for the three run modes.
//!
//! `console` drives a text session from stdin. `dev` and `start` compose one
//! realtime session, serve `/health` and `/ws`, wait for a transport peer or a
//! shutdown signal, bridge the conversation and close the session within the
//! drain timeout. The process serves exactly one session.

use crate::config::{Config, Transport};
use crate::console::Console;
use crate::realtime::{self, RealtimeEndpoint};
use crate::router::create_router;
use crate::state::AppState;
use crate::transport::{self, LINK_CAPACITY, TransportLink};
use anyhow::{Context, Result};
use async_openai::config::OpenAIConfig;
use nova_core::llm_client::OpenAICompatibleClient;
use nova_core::{
    AgentProfile, BackendClient, EventSink, FunctionCatalog, HttpBackend, HttpMetricsSink,
    LogSink, ModelBackend, ProfileSource, PromptRegistry, Session, SessionComposer,
};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Builds the composer from configuration: prompts, functions, backend
/// client, agent profile and metrics sink.
pub async fn build_composer(config: &Config) -> Result<SessionComposer> {
    let prompts = PromptRegistry::load(config.prompts_path.as_deref())
        .context("Failed to load mode prompts")?;
    let catalog = FunctionCatalog::builtin().context("Failed to build function catalog")?;
    let backend: Arc<dyn BackendClient> = Arc::new(
        HttpBackend::new(&config.api_base_url, config.backend_timeout)
            .context("Failed to create backend client")?,
    );

    let source = ProfileSource {
        file: Some(config.agent_config_path.clone()),
        name: config.agent_name.clone(),
        use_backend: config.use_api_config,
    };
    let profile = AgentProfile::resolve(&source, backend.as_ref()).await;

    let sink: Arc<dyn EventSink> = match &config.metrics_url {
        Some(url) => Arc::new(
            HttpMetricsSink::new(url, config.backend_timeout)
                .context("Failed to create metrics sink")?,
        ),
        None => Arc::new(LogSink),
    };

    info!(
        mode = %config.mode,
        backend = %config.api_base_url,
        profile = %profile.name,
        "Session composer ready."
    );
    Ok(SessionComposer::new(
        Arc::new(prompts),
        Arc::new(catalog),
        backend,
        sink,
        profile,
    ))
}

/// Completes on Ctrl+C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C.");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM.");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// Binds `port` on all interfaces, falling back to an ephemeral port when it is taken.
pub async fn bind_listener(port: u16) -> Result<TcpListener> {
    let wanted = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    match TcpListener::bind(wanted).await {
        Ok(listener) => Ok(listener),
        Err(e) => {
            warn!(port, error = %e, "Port unavailable, binding an ephemeral port instead.");
            let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))
                .await
                .context("Failed to bind health listener")?;
            Ok(listener)
        }
    }
}

pub async fn run_console(config: &Config) -> Result<()> {
    let composer = Arc::new(build_composer(config).await?);
    let chat_model = composer
        .profile()
        .chat_model
        .clone()
        .unwrap_or_else(|| config.chat_model.clone());
    let llm = Arc::new(OpenAICompatibleClient::new(
        OpenAIConfig::new().with_api_key(&config.openai_api_key),
        chat_model.clone(),
    ));

    let console = Console::new(
        composer,
        llm,
        config.mode,
        ModelBackend::Text { model: chat_model },
        config.drain_timeout,
    );
    console
        .run(tokio::io::BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await
}

/// Runs one realtime session behind the health listener.
pub async fn run_connected(config: Config) -> Result<()> {
    let config = Arc::new(config);
    let composer = build_composer(&config).await?;
    let realtime_model = composer
        .profile()
        .realtime_model
        .clone()
        .unwrap_or_else(|| config.realtime_model.clone());
    let session = Arc::new(composer.compose(
        config.mode,
        ModelBackend::Realtime {
            model: realtime_model.clone(),
        },
    )?);

    let endpoint = RealtimeEndpoint::new(
        &config.realtime_url,
        &realtime_model,
        &config.openai_api_key,
    )?;

    let (peer_tx, peer_rx) = oneshot::channel();
    let peer_slot = (config.transport == Transport::WebSocket).then_some(peer_tx);
    let app_state = Arc::new(AppState::new(
        config.clone(),
        session.mode(),
        session.watch_state(),
        peer_slot,
    ));

    let listener = bind_listener(config.port).await?;
    info!(address = %listener.local_addr()?, "Health listener started.");
    let server_stop = CancellationToken::new();
    let server = tokio::spawn({
        let stop = server_stop.clone();
        async move {
            axum::serve(
                listener,
                create_router(app_state).into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(stop.cancelled_owned())
            .await
        }
    });

    tokio::select! {
        result = converse(&config, &endpoint, session.clone(), peer_rx) => {
            if let Err(e) = result {
                warn!(error = ?e, "Conversation ended with an error.");
            }
        }
        _ = shutdown_signal() => {}
    }

    let outcome = session.close(config.drain_timeout).await?;
    info!(?outcome, "Session finished.");

    server_stop.cancel();
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Health listener stopped with an error."),
        Err(e) => warn!(error = %e, "Health listener task failed."),
    }
    info!("Server has shut down.");
    Ok(())
}

/// Waits for the transport peer, then bridges it to the model until either
/// side goes away.
async fn converse(
    config: &Config,
    endpoint: &RealtimeEndpoint,
    session: Arc<Session>,
    peer_rx: oneshot::Receiver<axum::extract::ws::WebSocket>,
) -> Result<()> {
    let (link, peer): (TransportLink, _) = transport::link(LINK_CAPACITY);
    let closing = session.closing_token();

    match config.transport {
        Transport::WebSocket => {
            info!("Waiting for a WebSocket peer on /ws.");
            let socket = peer_rx
                .await
                .context("Health listener stopped before a peer connected")?;
            tokio::spawn(transport::ws::run_peer(socket, peer, closing));
        }
        Transport::LiveKit => {
            #[cfg(feature = "livekit")]
            {
                let livekit = config
                    .livekit
                    .as_ref()
                    .context("LiveKit settings missing")?;
                let mut room = transport::livekit::LiveKitPeer::join(livekit).await?;
                info!("Waiting for a participant's audio.");
                let track = room.wait_for_audio().await?;
                tokio::spawn(room.run(track, peer, closing));
            }
            #[cfg(not(feature = "livekit"))]
            {
                drop((peer, closing));
                anyhow::bail!("The 'livekit' transport requires building with the 'livekit' feature");
            }
        }
    }

    realtime::run(endpoint, session, link).await
}
