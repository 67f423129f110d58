//! WebSocket transport on the `/ws` route of the health listener.
//!
//! Binary frames from the peer are microphone audio as 24 kHz mono PCM16
//! (little-endian). Model audio goes back as base64 inside JSON text frames,
//! next to the control messages.

use super::{Inbound, Outbound, PeerEnd};
use crate::audio_utils;
use anyhow::Result;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use nova_core::Speaker;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Messages sent from the peer to the agent as text frames.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// A typed message, handled like a spoken turn.
    UserText { text: String },
}

/// Messages sent from the agent to the peer.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A finished user or agent utterance.
    Transcript { speaker: Speaker, text: String },
    /// A chunk of audio data (base64 encoded PCM16) for the agent's voice.
    AudioChunk { data: String },
    AgentSpeakingStart,
    AgentSpeakingEnd,
    Error { message: String },
}

impl From<Outbound> for ServerMessage {
    fn from(outbound: Outbound) -> Self {
        match outbound {
            Outbound::Transcript { speaker, text } => ServerMessage::Transcript { speaker, text },
            Outbound::Audio(samples) => ServerMessage::AudioChunk {
                data: audio_utils::encode_i16(&samples),
            },
            Outbound::SpeakingStart => ServerMessage::AgentSpeakingStart,
            Outbound::SpeakingEnd => ServerMessage::AgentSpeakingEnd,
            Outbound::Error(message) => ServerMessage::Error { message },
        }
    }
}

/// A helper function to serialize and send a `ServerMessage` to the peer.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}

/// Tells a peer the agent is busy and closes the socket.
pub async fn reject(socket: WebSocket, reason: &str) {
    let (mut socket_tx, _) = socket.split();
    let _ = send_msg(
        &mut socket_tx,
        ServerMessage::Error {
            message: reason.to_string(),
        },
    )
    .await;
    let _ = socket_tx.close().await;
}

/// Pumps frames between the socket and the bridge until either side goes away
/// or `cancel` fires.
#[instrument(name = "ws_peer", skip_all)]
pub async fn run_peer(socket: WebSocket, peer: PeerEnd, cancel: CancellationToken) {
    let PeerEnd {
        inbound,
        mut outbound,
    } = peer;
    let (mut socket_tx, mut socket_rx) = socket.split();
    info!("WebSocket peer connected.");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Peer pump cancelled.");
                break;
            }
            frame = socket_rx.next() => {
                let forwarded = match frame {
                    Some(Ok(Message::Binary(data))) => {
                        inbound.send(Inbound::Audio(audio_utils::i16_from_le_bytes(&data))).await
                    }
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(text.as_str()) {
                            Ok(ClientMessage::UserText { text }) => inbound.send(Inbound::Text(text)).await,
                            Err(e) => {
                                warn!(error = %e, "Ignoring malformed client message.");
                                let reply = ServerMessage::Error { message: format!("Malformed message: {}", e) };
                                if send_msg(&mut socket_tx, reply).await.is_err() {
                                    break;
                                }
                                Ok(())
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Peer closed the connection.");
                        break;
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => Ok(()),
                    Some(Err(e)) => {
                        error!("Error receiving from peer WebSocket: {:?}", e);
                        break;
                    }
                };
                if forwarded.is_err() {
                    debug!("Bridge stopped accepting input.");
                    break;
                }
            }
            out = outbound.recv() => match out {
                Some(msg) => {
                    if let Err(e) = send_msg(&mut socket_tx, msg.into()).await {
                        warn!(error = %e, "Failed to send to peer.");
                        break;
                    }
                }
                None => {
                    debug!("Bridge finished; closing peer.");
                    break;
                }
            },
        }
    }

    let _ = socket_tx.close().await;
    info!("WebSocket peer disconnected.");
}
