//! Handles the real-time WebSocket connection to OpenAI for voice interaction.

use super::protocol::{ClientEvent, Item, ResponseConfig, ServerEvent, SessionConfig, Tool};
use crate::audio_utils;
use crate::transport::{Inbound, Outbound, TransportLink};
use anyhow::{Context, Result};
use futures_util::{Sink, SinkExt, StreamExt};
use nova_core::{CallSequencer, FunctionCallRequest, FunctionCallResult, Session, Speaker};
use reqwest::Url;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, protocol::Message as WsMessage},
};
use tracing::{debug, error, info, instrument, warn};

pub const DEFAULT_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// Where and as whom to connect.
#[derive(Debug, Clone)]
pub struct RealtimeEndpoint {
    pub url: String,
    pub api_key: String,
}

impl RealtimeEndpoint {
    /// Adds `model` to the query of `base_url`. A base without a path gets `/`.
    pub fn new(base_url: &str, model: &str, api_key: &str) -> Result<Self> {
        let mut url = Url::parse(base_url)
            .with_context(|| format!("Invalid realtime URL '{base_url}'"))?;
        if url.cannot_be_a_base() {
            anyhow::bail!("Invalid realtime URL '{base_url}'");
        }
        let path = url.path().trim_end_matches('/').to_string();
        url.set_path(if path.is_empty() { "/" } else { path.as_str() });
        url.query_pairs_mut().append_pair("model", model);
        Ok(Self {
            url: url.into(),
            api_key: api_key.to_string(),
        })
    }
}

/// Work the run loop performs on the bridge's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeAction {
    /// Send to the realtime API.
    Send(ClientEvent),
    /// Deliver to the transport peer.
    Deliver(Outbound),
    /// Run a function call and feed its result to `on_call_result`.
    Call(FunctionCallRequest),
}

/// Protocol state of one realtime conversation, free of any I/O.
///
/// Function-call outputs are handed back in the order the model issued the
/// calls, and a new response is requested only once every outstanding call has
/// answered and the model is not already responding.
pub struct RealtimeBridge {
    session: Arc<Session>,
    sequencer: CallSequencer,
    speaking: bool,
    response_active: bool,
    response_owed: bool,
}

impl RealtimeBridge {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            sequencer: CallSequencer::new(),
            speaking: false,
            response_active: false,
            response_owed: false,
        }
    }

    /// Session configuration followed by the greeting request.
    pub fn opening(&mut self) -> Vec<ClientEvent> {
        let tools = self.session.functions().specs().map(Tool::from).collect();
        self.response_active = true;
        vec![
            ClientEvent::SessionUpdate {
                session: SessionConfig::new(
                    self.session.instructions(),
                    self.session.voice(),
                    tools,
                ),
            },
            ClientEvent::ResponseCreate {
                response: Some(ResponseConfig {
                    instructions: self.session.greeting().to_string(),
                }),
            },
        ]
    }

    pub fn on_inbound(&mut self, inbound: Inbound) -> Vec<BridgeAction> {
        match inbound {
            Inbound::Audio(samples) if samples.is_empty() => Vec::new(),
            Inbound::Audio(samples) => vec![BridgeAction::Send(ClientEvent::InputAudioBufferAppend {
                audio: audio_utils::encode_i16(&samples),
            })],
            Inbound::Text(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return Vec::new();
                }
                self.record(Speaker::User, text);
                let mut actions = vec![BridgeAction::Send(ClientEvent::ConversationItemCreate {
                    item: Item::user_text(text),
                })];
                self.response_owed = true;
                actions.extend(self.flush_response());
                actions
            }
        }
    }

    pub fn on_server_event(&mut self, event: ServerEvent) -> Vec<BridgeAction> {
        match event {
            ServerEvent::ResponseCreated {} => {
                self.response_active = true;
                Vec::new()
            }
            ServerEvent::ResponseAudioDelta { delta } => {
                let samples = audio_utils::decode_i16(&delta);
                let mut actions = Vec::new();
                if !self.speaking {
                    self.speaking = true;
                    actions.push(BridgeAction::Deliver(Outbound::SpeakingStart));
                }
                if !samples.is_empty() {
                    actions.push(BridgeAction::Deliver(Outbound::Audio(samples)));
                }
                actions
            }
            ServerEvent::ResponseAudioTranscriptDone { transcript }
            | ServerEvent::ResponseTextDone { text: transcript } => {
                self.transcript(Speaker::Agent, transcript)
            }
            ServerEvent::InputAudioTranscriptionCompleted { transcript } => {
                self.transcript(Speaker::User, transcript)
            }
            // The user barged in.
            ServerEvent::SpeechStarted {} => self.stop_speaking().into_iter().collect(),
            ServerEvent::ResponseOutputItemDone { item } if item.kind == "function_call" => {
                match (item.call_id, item.name) {
                    (Some(call_id), Some(name)) => {
                        if !self.sequencer.register(&call_id) {
                            return Vec::new();
                        }
                        info!(%call_id, function = %name, "Model requested a function call.");
                        let arguments = item.arguments.unwrap_or_default();
                        vec![BridgeAction::Call(FunctionCallRequest::from_raw(
                            call_id, name, &arguments,
                        ))]
                    }
                    _ => {
                        warn!("Function call item without a call_id or name.");
                        Vec::new()
                    }
                }
            }
            ServerEvent::ResponseOutputItemDone { .. } => Vec::new(),
            ServerEvent::ResponseDone { response } => {
                self.response_active = false;
                if let Some(usage) = response.usage {
                    if let Err(e) = self.session.record_usage(usage.into()) {
                        debug!(error = %e, "Usage not recorded.");
                    }
                }
                let mut actions: Vec<BridgeAction> = self.stop_speaking().into_iter().collect();
                actions.extend(self.flush_response());
                actions
            }
            ServerEvent::Error { error } => {
                warn!(message = %error.message, code = ?error.code, "Realtime API reported an error.");
                vec![BridgeAction::Deliver(Outbound::Error(error.message))]
            }
            ServerEvent::SessionCreated {} | ServerEvent::Other => Vec::new(),
        }
    }

    pub fn on_call_result(&mut self, call_id: &str, result: FunctionCallResult) -> Vec<BridgeAction> {
        let mut actions: Vec<BridgeAction> = self
            .sequencer
            .complete(call_id, result)
            .into_iter()
            .map(|(call_id, result)| {
                BridgeAction::Send(ClientEvent::ConversationItemCreate {
                    item: Item::FunctionCallOutput {
                        call_id,
                        output: result.to_model_output(),
                    },
                })
            })
            .collect();
        if !actions.is_empty() {
            self.response_owed = true;
        }
        actions.extend(self.flush_response());
        actions
    }

    pub fn pending_calls(&self) -> usize {
        self.sequencer.pending()
    }

    /// Forgets outstanding calls, returning their ids.
    pub fn abandon(&mut self) -> Vec<String> {
        self.sequencer.abandon()
    }

    fn flush_response(&mut self) -> Option<BridgeAction> {
        if self.response_owed && !self.response_active && self.sequencer.pending() == 0 {
            self.response_owed = false;
            self.response_active = true;
            Some(BridgeAction::Send(ClientEvent::ResponseCreate { response: None }))
        } else {
            None
        }
    }

    fn stop_speaking(&mut self) -> Option<BridgeAction> {
        if self.speaking {
            self.speaking = false;
            Some(BridgeAction::Deliver(Outbound::SpeakingEnd))
        } else {
            None
        }
    }

    fn transcript(&mut self, speaker: Speaker, text: String) -> Vec<BridgeAction> {
        let text = text.trim().to_string();
        if text.is_empty() {
            return Vec::new();
        }
        self.record(speaker, &text);
        vec![BridgeAction::Deliver(Outbound::Transcript { speaker, text })]
    }

    fn record(&self, speaker: Speaker, text: &str) {
        if let Err(e) = self.session.record_turn(speaker, text) {
            debug!(error = %e, "Turn not recorded.");
        }
    }
}

async fn send_event<S>(sink: &mut S, event: &ClientEvent) -> Result<()>
where
    S: Sink<WsMessage> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let serialized = serde_json::to_string(event)?;
    sink.send(WsMessage::Text(serialized.into())).await?;
    Ok(())
}

/// Runs the main loop for the OpenAI Realtime API connection.
///
/// Connects, activates the session, configures it and requests the greeting,
/// then relays between the transport and the API until the peer disconnects,
/// the API connection ends or the session starts closing. Closing the session
/// is left to the caller.
#[instrument(skip_all, fields(session_id = %session.id(), mode = %session.mode()))]
pub async fn run(endpoint: &RealtimeEndpoint, session: Arc<Session>, link: TransportLink) -> Result<()> {
    let TransportLink {
        mut inbound,
        outbound,
    } = link;

    let mut request = endpoint.url.as_str().into_client_request()?;
    request
        .headers_mut()
        .insert("Authorization", format!("Bearer {}", endpoint.api_key).parse()?);
    request
        .headers_mut()
        .insert("OpenAI-Beta", "realtime=v1".parse()?);

    let (ws_stream, _) = connect_async(request)
        .await
        .context("Failed to connect to OpenAI Realtime WebSocket")?;
    let (mut openai_tx, mut openai_rx) = ws_stream.split();
    info!("Connected to OpenAI Realtime API.");

    session.activate()?;
    let mut bridge = RealtimeBridge::new(session.clone());
    for event in bridge.opening() {
        send_event(&mut openai_tx, &event).await?;
    }

    let (results_tx, mut results_rx) = mpsc::channel::<(String, FunctionCallResult)>(32);
    let closing = session.closing_token();

    loop {
        let actions = tokio::select! {
            _ = closing.cancelled() => {
                info!("Session closing; leaving the realtime loop.");
                break;
            }
            event = inbound.recv() => match event {
                Some(event) => bridge.on_inbound(event),
                None => {
                    info!("Transport peer disconnected.");
                    break;
                }
            },
            msg = openai_rx.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<ServerEvent>(text.as_str()) {
                    Ok(event) => bridge.on_server_event(event),
                    Err(e) => {
                        warn!(error = %e, "Unparseable realtime event.");
                        Vec::new()
                    }
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    warn!(?frame, "Realtime API closed the connection.");
                    break;
                }
                Some(Ok(_)) => Vec::new(),
                Some(Err(e)) => {
                    error!(error = %e, "Realtime connection failed.");
                    break;
                }
                None => {
                    warn!("Realtime connection ended.");
                    break;
                }
            },
            Some((call_id, result)) = results_rx.recv() => bridge.on_call_result(&call_id, result),
        };

        for action in actions {
            match action {
                BridgeAction::Send(event) => send_event(&mut openai_tx, &event).await?,
                BridgeAction::Deliver(out) => {
                    if outbound.send(out).await.is_err() {
                        debug!("Peer gone; output dropped.");
                    }
                }
                BridgeAction::Call(request) => {
                    let session = session.clone();
                    let results_tx = results_tx.clone();
                    tokio::spawn(async move {
                        let call_id = request.call_id.clone();
                        let result = session.call_function(request).await.unwrap_or_else(|e| {
                            warn!(error = %e, "Function call rejected.");
                            FunctionCallResult::cancelled()
                        });
                        let _ = results_tx.send((call_id, result)).await;
                    });
                }
            }
        }
    }

    let abandoned = bridge.abandon();
    if !abandoned.is_empty() {
        warn!(calls = ?abandoned, "Left the realtime loop with function calls in flight.");
    }
    let _ = openai_tx.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::protocol::{OutputItem, ResponseSummary, ResponseUsage};
    use crate::testing::{CapturingSink, FakeBackend, composer};
    use crate::transport;
    use nova_core::{ModelBackend, Mode};
    use serde_json::{Value, json};
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::{WebSocketStream, accept_async};

    fn model() -> ModelBackend {
        ModelBackend::Realtime {
            model: "gpt-4o-realtime-preview".into(),
        }
    }

    fn active_session(mode: Mode) -> (Arc<Session>, Arc<FakeBackend>, Arc<CapturingSink>) {
        let backend = FakeBackend::returning(json!([{ "id": 1, "name": "Red sneaker" }]));
        let sink = Arc::new(CapturingSink::default());
        let session = Arc::new(
            composer(backend.clone(), sink.clone())
                .compose(mode, model())
                .unwrap(),
        );
        session.activate().unwrap();
        (session, backend, sink)
    }

    fn function_call(call_id: &str, name: &str, arguments: &str) -> ServerEvent {
        ServerEvent::ResponseOutputItemDone {
            item: OutputItem {
                kind: "function_call".into(),
                call_id: Some(call_id.into()),
                name: Some(name.into()),
                arguments: Some(arguments.into()),
            },
        }
    }

    fn done() -> ServerEvent {
        ServerEvent::ResponseDone {
            response: ResponseSummary {
                status: Some("completed".into()),
                usage: None,
            },
        }
    }

    fn output_call_ids(actions: &[BridgeAction]) -> Vec<String> {
        actions
            .iter()
            .filter_map(|a| match a {
                BridgeAction::Send(ClientEvent::ConversationItemCreate {
                    item: Item::FunctionCallOutput { call_id, .. },
                }) => Some(call_id.clone()),
                _ => None,
            })
            .collect()
    }

    fn requests_response(actions: &[BridgeAction]) -> bool {
        actions
            .iter()
            .any(|a| matches!(a, BridgeAction::Send(ClientEvent::ResponseCreate { .. })))
    }

    #[tokio::test]
    async fn test_opening_configures_tools_and_greets() {
        let (session, _, _) = active_session(Mode::Airline);
        let mut bridge = RealtimeBridge::new(session);

        let events = bridge.opening();

        match &events[0] {
            ClientEvent::SessionUpdate { session } => {
                let names: Vec<&str> = session.tools.iter().map(|t| t.name.as_str()).collect();
                assert_eq!(names, vec!["changeBooking", "checkInPassenger", "reportLostBaggage"]);
                assert_eq!(session.voice, "alloy");
            }
            other => panic!("Expected session.update, got {other:?}"),
        }
        assert!(matches!(
            &events[1],
            ClientEvent::ResponseCreate { response: Some(ResponseConfig { .. }) }
        ));
    }

    #[tokio::test]
    async fn test_call_outputs_are_released_in_request_order() {
        let (session, _, _) = active_session(Mode::Orders);
        let mut bridge = RealtimeBridge::new(session);
        bridge.opening();

        let first = bridge.on_server_event(function_call("c1", "searchProducts", r#"{"query":"shoes"}"#));
        assert!(matches!(first.as_slice(), [BridgeAction::Call(_)]));
        assert_eq!(
            bridge.on_server_event(function_call("c2", "checkClientId", r#"{"clientId":"7"}"#)).len(),
            1
        );
        // A repeated call id is ignored.
        assert!(bridge
            .on_server_event(function_call("c2", "checkClientId", "{}"))
            .is_empty());

        let early = bridge.on_call_result("c2", FunctionCallResult::Success { payload: json!(2) });
        assert!(early.is_empty());

        let released = bridge.on_call_result("c1", FunctionCallResult::Success { payload: json!(1) });
        assert_eq!(output_call_ids(&released), vec!["c1", "c2"]);
        // The greeting response is still running.
        assert!(!requests_response(&released));
        assert_eq!(bridge.pending_calls(), 0);

        let after_done = bridge.on_server_event(done());
        assert!(requests_response(&after_done));
    }

    #[tokio::test]
    async fn test_response_waits_for_every_outstanding_call() {
        let (session, _, _) = active_session(Mode::Orders);
        let mut bridge = RealtimeBridge::new(session);
        bridge.opening();
        bridge.on_server_event(function_call("c1", "searchProducts", r#"{"query":"a"}"#));
        bridge.on_server_event(function_call("c2", "searchProducts", r#"{"query":"b"}"#));
        assert!(!requests_response(&bridge.on_server_event(done())));

        let first = bridge.on_call_result("c1", FunctionCallResult::cancelled());
        assert_eq!(output_call_ids(&first), vec!["c1"]);
        assert!(!requests_response(&first));

        let second = bridge.on_call_result("c2", FunctionCallResult::cancelled());
        assert_eq!(output_call_ids(&second), vec!["c2"]);
        assert!(requests_response(&second));
    }

    #[tokio::test]
    async fn test_audio_and_transcripts_reach_the_peer() {
        let (session, _, _) = active_session(Mode::Leads);
        let mut bridge = RealtimeBridge::new(session);

        let first = bridge.on_server_event(ServerEvent::ResponseAudioDelta {
            delta: audio_utils::encode_i16(&[5, 6]),
        });
        assert_eq!(
            first,
            vec![
                BridgeAction::Deliver(Outbound::SpeakingStart),
                BridgeAction::Deliver(Outbound::Audio(vec![5, 6])),
            ]
        );
        let second = bridge.on_server_event(ServerEvent::ResponseAudioDelta {
            delta: audio_utils::encode_i16(&[7]),
        });
        assert_eq!(second, vec![BridgeAction::Deliver(Outbound::Audio(vec![7]))]);

        let heard = bridge.on_server_event(ServerEvent::InputAudioTranscriptionCompleted {
            transcript: " I'd like a callback \n".into(),
        });
        assert_eq!(
            heard,
            vec![BridgeAction::Deliver(Outbound::Transcript {
                speaker: Speaker::User,
                text: "I'd like a callback".into(),
            })]
        );

        let end = bridge.on_server_event(done());
        assert_eq!(end, vec![BridgeAction::Deliver(Outbound::SpeakingEnd)]);
    }

    #[tokio::test]
    async fn test_typed_text_becomes_a_user_item_and_response() {
        let (session, _, _) = active_session(Mode::Jarvis);
        let mut bridge = RealtimeBridge::new(session);

        let actions = bridge.on_inbound(Inbound::Text("  When are you free?  ".into()));

        assert_eq!(
            actions,
            vec![
                BridgeAction::Send(ClientEvent::ConversationItemCreate {
                    item: Item::user_text("When are you free?"),
                }),
                BridgeAction::Send(ClientEvent::ResponseCreate { response: None }),
            ]
        );
        assert!(bridge.on_inbound(Inbound::Text("   ".into())).is_empty());
        assert!(bridge.on_inbound(Inbound::Audio(Vec::new())).is_empty());
    }

    async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
        loop {
            match ws.next().await {
                Some(Ok(WsMessage::Text(text))) => return serde_json::from_str(text.as_str()).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("Expected a text frame, got {other:?}"),
            }
        }
    }

    async fn send_json(ws: &mut WebSocketStream<TcpStream>, value: Value) {
        ws.send(WsMessage::Text(value.to_string().into())).await.unwrap();
    }

    #[tokio::test]
    async fn test_run_executes_calls_against_a_realtime_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            let update = next_json(&mut ws).await;
            assert_eq!(update["type"], "session.update");
            let greeting = next_json(&mut ws).await;
            assert_eq!(greeting["type"], "response.create");

            send_json(&mut ws, json!({ "type": "response.created", "response": {} })).await;
            send_json(
                &mut ws,
                json!({
                    "type": "response.output_item.done",
                    "item": {
                        "type": "function_call",
                        "call_id": "call_1",
                        "name": "searchProducts",
                        "arguments": "{\"query\":\"red shoes\"}"
                    }
                }),
            )
            .await;
            send_json(
                &mut ws,
                json!({
                    "type": "response.done",
                    "response": { "status": "completed", "usage": { "input_tokens": 10, "output_tokens": 4, "total_tokens": 14 } }
                }),
            )
            .await;

            let output = next_json(&mut ws).await;
            assert_eq!(output["type"], "conversation.item.create");
            assert_eq!(output["item"]["type"], "function_call_output");
            assert_eq!(output["item"]["call_id"], "call_1");
            let follow_up = next_json(&mut ws).await;
            assert_eq!(follow_up["type"], "response.create");

            ws.close(None).await.unwrap();
        });

        let (session, backend, sink) = {
            let backend = FakeBackend::returning(json!([{ "id": 1 }]));
            let sink = Arc::new(CapturingSink::default());
            let session = Arc::new(
                composer(backend.clone(), sink.clone())
                    .compose(Mode::Orders, model())
                    .unwrap(),
            );
            (session, backend, sink)
        };
        let (link, _peer) = transport::link(transport::LINK_CAPACITY);
        let endpoint = RealtimeEndpoint::new(&format!("ws://{addr}"), "test-model", "sk-test").unwrap();

        tokio::time::timeout(Duration::from_secs(5), run(&endpoint, session.clone(), link))
            .await
            .expect("bridge should finish when the server closes")
            .unwrap();
        server.await.unwrap();

        session.close(Duration::from_secs(1)).await.unwrap();
        assert_eq!(backend.requests().len(), 1);
        let record = sink.records().pop().unwrap();
        assert_eq!(record.calls().len(), 1);
        assert_eq!(record.usage().total_tokens, 14);
    }

    #[test]
    fn test_endpoint_url_carries_the_model() {
        let endpoint =
            RealtimeEndpoint::new(DEFAULT_REALTIME_URL, "gpt-4o-realtime-preview", "k").unwrap();
        assert_eq!(
            endpoint.url,
            "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview"
        );

        let trailing = RealtimeEndpoint::new("wss://api.openai.com/v1/realtime/", "m", "k").unwrap();
        assert_eq!(trailing.url, "wss://api.openai.com/v1/realtime?model=m");
    }

    #[test]
    fn test_endpoint_url_without_a_path_gets_root() {
        for base in ["ws://127.0.0.1:9000", "ws://127.0.0.1:9000/"] {
            let endpoint = RealtimeEndpoint::new(base, "test-model", "k").unwrap();
            assert_eq!(endpoint.url, "ws://127.0.0.1:9000/?model=test-model");
            assert!(endpoint.url.as_str().into_client_request().is_ok());
        }
    }

    #[test]
    fn test_endpoint_rejects_a_malformed_url() {
        assert!(RealtimeEndpoint::new("not a url", "m", "k").is_err());
    }

    #[test]
    fn test_usage_converts() {
        let usage: nova_core::Usage = ResponseUsage {
            input_tokens: 1,
            output_tokens: 2,
            total_tokens: 3,
        }
        .into();
        assert_eq!(usage.total_tokens, 3);
    }
}
