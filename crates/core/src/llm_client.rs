use crate::catalog::FunctionSet;
use crate::record::Usage;
use anyhow::{Result, anyhow};
use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionTool, ChatCompletionToolArgs,
        CreateChatCompletionRequestArgs, CreateChatCompletionResponse, FunctionObjectArgs,
    },
};
use async_trait::async_trait;

/// Represents a tool call requested by the LLM.
pub type ToolCall = async_openai::types::ChatCompletionMessageToolCall;

/// Represents the two possible outcomes of one LLM turn.
#[derive(Debug, Clone)]
pub enum LLMAction {
    /// The LLM decided to respond directly with text.
    TextResponse(String),
    /// The LLM decided to call one or more tools.
    ToolCall(Vec<ToolCall>),
}

/// An action plus the tokens it cost.
#[derive(Debug, Clone)]
pub struct LLMTurn {
    pub action: LLMAction,
    pub usage: Usage,
}

/// A generic client for interacting with a chat LLM.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Makes a single, non-streaming call to the LLM to decide on the next action.
    async fn decide_action(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
        tools: Vec<ChatCompletionTool>,
    ) -> Result<LLMTurn>;
}

/// Converts a mode's function set into chat-completion tool definitions.
pub fn tools_for(functions: &FunctionSet) -> Result<Vec<ChatCompletionTool>, OpenAIError> {
    functions
        .specs()
        .map(|spec| {
            ChatCompletionToolArgs::default()
                .function(
                    FunctionObjectArgs::default()
                        .name(spec.name.clone())
                        .description(spec.description.clone())
                        .parameters(spec.parameters.clone())
                        .build()?,
                )
                .build()
        })
        .collect()
}

/// An implementation of `LLMClient` for any OpenAI-compatible API.
pub struct OpenAICompatibleClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAICompatibleClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    /// * `model` - The chat model identifier (e.g., "gpt-4o-mini").
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
        }
    }
}

#[async_trait]
impl LLMClient for OpenAICompatibleClient {
    async fn decide_action(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
        tools: Vec<ChatCompletionTool>,
    ) -> Result<LLMTurn> {
        let mut request = CreateChatCompletionRequestArgs::default();
        request.model(&self.model).messages(messages);
        if !tools.is_empty() {
            request.tools(tools).tool_choice("auto");
        }
        let request = request.build()?;

        let response: CreateChatCompletionResponse = self.client.chat().create(request).await?;
        let usage = response
            .usage
            .as_ref()
            .map(|u| Usage {
                input_tokens: u64::from(u.prompt_tokens),
                output_tokens: u64::from(u.completion_tokens),
                total_tokens: u64::from(u.total_tokens),
            })
            .unwrap_or_default();
        let choice = response
            .choices
            .first()
            .ok_or_else(|| anyhow!("LLM response contained no choices."))?;

        let action = match (&choice.message.tool_calls, &choice.message.content) {
            (Some(tool_calls), _) if !tool_calls.is_empty() => LLMAction::ToolCall(tool_calls.clone()),
            (_, Some(content)) => LLMAction::TextResponse(content.clone()),
            _ => {
                return Err(anyhow!(
                    "LLM response had neither text content nor tool calls."
                ));
            }
        };
        Ok(LLMTurn { action, usage })
    }
}
