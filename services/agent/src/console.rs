//! Console run mode: a local chat loop against the text backend, for manual
//! testing without any transport.

use anyhow::Result;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionTool,
};
use nova_core::llm_client::{LLMAction, LLMClient, tools_for};
use nova_core::{FunctionCallRequest, Mode, ModelBackend, Session, SessionComposer, Speaker};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{error, info, instrument, warn};

/// Model round trips allowed for one user line before giving up.
pub const MAX_TOOL_ROUNDS: usize = 5;
const FALLBACK_REPLY: &str = "Sorry, I couldn't finish that. Could you try again?";

struct Conversation {
    session: Session,
    history: Vec<ChatCompletionRequestMessage>,
    tools: Vec<ChatCompletionTool>,
}

pub struct Console {
    composer: Arc<SessionComposer>,
    llm: Arc<dyn LLMClient>,
    mode: Mode,
    model: ModelBackend,
    drain_timeout: Duration,
}

impl Console {
    pub fn new(
        composer: Arc<SessionComposer>,
        llm: Arc<dyn LLMClient>,
        mode: Mode,
        model: ModelBackend,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            composer,
            llm,
            mode,
            model,
            drain_timeout,
        }
    }

    fn start(&self) -> Result<Conversation> {
        let session = self.composer.compose(self.mode, self.model.clone())?;
        session.activate()?;
        let tools = tools_for(session.functions())?;
        let history = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(session.instructions())
                .build()?
                .into(),
        ];
        Ok(Conversation {
            session,
            history,
            tools,
        })
    }

    /// Reads lines until `quit`, `exit`, `q` or end of input.
    /// `/reset` closes the current session and starts a fresh one.
    pub async fn run<R, W>(&self, input: R, mut output: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut conversation = self.start()?;
        output
            .write_all(
                format!(
                    "Mode: {}. Type 'quit' to exit or '/reset' to start over.\n",
                    self.mode
                )
                .as_bytes(),
            )
            .await?;

        let mut lines = input.lines();
        loop {
            output.write_all(b"you> ").await?;
            output.flush().await?;
            let Some(line) = lines.next_line().await? else {
                break;
            };
            match line.trim() {
                "" => continue,
                "quit" | "exit" | "q" => break,
                "/reset" => {
                    self.finish(conversation).await;
                    conversation = self.start()?;
                    output.write_all(b"Session reset.\n").await?;
                }
                text => {
                    let reply = self.respond(&mut conversation, text).await;
                    output
                        .write_all(format!("agent> {}\n", reply).as_bytes())
                        .await?;
                }
            }
        }
        output.flush().await?;

        self.finish(conversation).await;
        Ok(())
    }

    async fn finish(&self, conversation: Conversation) {
        match conversation.session.close(self.drain_timeout).await {
            Ok(outcome) => info!(?outcome, "Console session closed."),
            Err(e) => warn!(error = %e, "Console session was already closed."),
        }
    }

    #[instrument(skip_all, fields(session_id = %conversation.session.id()))]
    async fn respond(&self, conversation: &mut Conversation, text: &str) -> String {
        match self.react(conversation, text).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(error = ?e, "Turn failed.");
                FALLBACK_REPLY.to_string()
            }
        }
    }

    /// One reason/act cycle: ask the model, run the functions it asks for,
    /// feed the results back and repeat until it answers in text.
    async fn react(&self, conversation: &mut Conversation, text: &str) -> Result<String> {
        let Conversation {
            session,
            history,
            tools,
        } = conversation;

        session.record_turn(Speaker::User, text)?;
        history.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(text)
                .build()?
                .into(),
        );

        for _ in 0..MAX_TOOL_ROUNDS {
            let turn = self.llm.decide_action(history.clone(), tools.clone()).await?;
            session.record_usage(turn.usage)?;

            match turn.action {
                LLMAction::TextResponse(reply) => {
                    history.push(
                        ChatCompletionRequestAssistantMessageArgs::default()
                            .content(reply.clone())
                            .build()?
                            .into(),
                    );
                    session.record_turn(Speaker::Agent, reply.as_str())?;
                    return Ok(reply);
                }
                LLMAction::ToolCall(calls) => {
                    history.push(
                        ChatCompletionRequestAssistantMessageArgs::default()
                            .tool_calls(calls.clone())
                            .build()?
                            .into(),
                    );
                    for call in calls {
                        let request = FunctionCallRequest::from_raw(
                            call.id.clone(),
                            call.function.name.clone(),
                            &call.function.arguments,
                        );
                        let result = session.call_function(request).await?;
                        history.push(
                            ChatCompletionRequestToolMessageArgs::default()
                                .tool_call_id(call.id)
                                .content(result.to_model_output())
                                .build()?
                                .into(),
                        );
                    }
                }
            }
        }

        warn!(rounds = MAX_TOOL_ROUNDS, "No text reply within the round limit.");
        Ok(FALLBACK_REPLY.to_string())
    }
}
