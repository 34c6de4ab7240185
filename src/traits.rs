//! The provider contract: requests, responses, errors and the `LlmProvider` trait.

use crate::config::{ConfigError, Provider};
use crate::history::{ConversationHistory, HistoryError, ToolCall, TurnKind};
use crate::schema::{SchemaError, SchemaFlavor, SchemaModel};
use async_trait::async_trait;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

// --- Request Structures ---

/// How much hidden reasoning a reasoning model should spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    /// Fastest.
    Low,
    /// Provider default.
    Medium,
    /// Most thorough.
    High,
}

/// Everything needed to ask a model for one reply.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// The model identifier (a catalog id such as `gpt-4o` or `llama-3.3-70b-versatile-groq`).
    pub model: String,
    /// Instructions placed before the conversation.
    pub system_message: String,
    /// A user message appended after the history.
    pub user_message: Option<String>,
    /// Prior turns.
    pub history: Option<ConversationHistory>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Maximum number of tokens to generate.
    pub max_tokens: Option<u32>,
    /// Sampling seed, where supported.
    pub seed: Option<u64>,
    /// Tool-flavor models the model may call.
    pub tools: Vec<Arc<SchemaModel>>,
    /// Output-flavor model the reply must follow.
    pub structured_output: Option<Arc<SchemaModel>>,
    /// Reasoning effort, sent to reasoning models only.
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Attach token usage to the response.
    pub track_usage: bool,
    /// Route to this provider instead of looking the model up in the catalog.
    pub provider: Option<Provider>,
}

impl CompletionRequest {
    /// Creates a request with only a model and a system message.
    pub fn new(model: impl Into<String>, system_message: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_message: system_message.into(),
            user_message: None,
            history: None,
            temperature: None,
            max_tokens: None,
            seed: None,
            tools: Vec::new(),
            structured_output: None,
            reasoning_effort: None,
            track_usage: false,
            provider: None,
        }
    }

    /// Sets the trailing user message.
    pub fn with_user_message(mut self, message: impl Into<String>) -> Self {
        self.user_message = Some(message.into());
        self
    }

    /// Sets the conversation history.
    pub fn with_history(mut self, history: ConversationHistory) -> Self {
        self.history = Some(history);
        self
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the token limit.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Sets the sampling seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Adds one tool.
    pub fn with_tool(mut self, tool: Arc<SchemaModel>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Adds several tools.
    pub fn with_tools(mut self, tools: impl IntoIterator<Item = Arc<SchemaModel>>) -> Self {
        self.tools.extend(tools);
        self
    }

    /// Requests a reply following `schema`.
    pub fn with_structured_output(mut self, schema: Arc<SchemaModel>) -> Self {
        self.structured_output = Some(schema);
        self
    }

    /// Sets the reasoning effort.
    pub fn with_reasoning_effort(mut self, effort: ReasoningEffort) -> Self {
        self.reasoning_effort = Some(effort);
        self
    }

    /// Attaches token usage to responses.
    pub fn with_usage_tracking(mut self) -> Self {
        self.track_usage = true;
        self
    }

    /// Forces routing to `provider`.
    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Checks the request before anything is sent.
    ///
    /// # Errors
    ///
    /// `ProviderError::InvalidRequest` for missing inputs, tools combined
    /// with structured output, wrong schema flavors or duplicate tool names;
    /// `ProviderError::History` when the user message cannot follow the history.
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.model.trim().is_empty() {
            return Err(ProviderError::InvalidRequest("model is required".to_string()));
        }
        if self.system_message.trim().is_empty() {
            return Err(ProviderError::InvalidRequest(
                "system message is required".to_string(),
            ));
        }

        let history_is_empty = self.history.as_ref().map_or(true, |h| h.is_empty());
        if self.user_message.is_none() && history_is_empty {
            return Err(ProviderError::InvalidRequest(
                "a user message or a chat history is required".to_string(),
            ));
        }
        if let (Some(_), Some(history)) = (&self.user_message, &self.history) {
            if !history.state().accepts(TurnKind::User) {
                // Reuse the history's own error text.
                let mut probe = history.clone();
                probe.append_user("")?;
            }
        }

        if self.structured_output.is_some() && !self.tools.is_empty() {
            return Err(ProviderError::InvalidRequest(
                "tools and structured output cannot be enabled at the same time".to_string(),
            ));
        }
        if let Some(schema) = &self.structured_output {
            if schema.flavor() != SchemaFlavor::Output {
                return Err(ProviderError::InvalidRequest(format!(
                    "structured output `{}` must be an output schema",
                    schema.name()
                )));
            }
        }

        let mut names = HashSet::new();
        for tool in &self.tools {
            if tool.flavor() != SchemaFlavor::Tool {
                return Err(ProviderError::InvalidRequest(format!(
                    "tool `{}` must be a tool schema",
                    tool.name()
                )));
            }
            if !names.insert(tool.name()) {
                return Err(ProviderError::InvalidRequest(format!(
                    "tool `{}` is listed more than once",
                    tool.name()
                )));
            }
        }
        Ok(())
    }

    /// [`CompletionRequest::validate`] plus the streaming restrictions.
    pub fn validate_for_stream(&self) -> Result<(), ProviderError> {
        self.validate()?;
        if self.structured_output.is_some() {
            return Err(ProviderError::InvalidRequest(
                "streaming and structured output cannot be enabled at the same time".to_string(),
            ));
        }
        if !self.tools.is_empty() {
            return Err(ProviderError::InvalidRequest(
                "tools and streaming cannot be enabled at the same time".to_string(),
            ));
        }
        Ok(())
    }
}

// --- Response Structures ---

/// The normalized result of a non-streaming completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CompletionKind {
    /// The LLM generated a text message.
    Message {
        /// Message text.
        content: String,
    },
    /// The LLM produced a document following the requested output schema.
    Structured {
        /// Decoded document.
        value: JsonValue,
    },
    /// The LLM requested one or more tool calls.
    ToolCall {
        /// Requested calls, in order.
        tool_calls: Vec<ToolCall>,
    },
}

/// Represents the complete response from a non-streaming LLM completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// The kind of completion result.
    #[serde(flatten)]
    pub kind: CompletionKind,
    /// Token usage, present only when the request asked for it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    /// The reason the model stopped generating tokens (if available).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Represents token usage statistics for a completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens used in the prompt.
    pub prompt_tokens: u32,
    /// Tokens generated in the completion.
    pub completion_tokens: u32,
    /// Total tokens processed.
    pub total_tokens: u32,
}

/// Errors that can occur when interacting with LLM providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// An error occurred during the underlying HTTP request.
    #[error("API request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    /// The API returned an error response (e.g., 4xx, 5xx).
    #[error("API response error: {status}: {message}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Provider error message, or the raw body.
        message: String,
    },
    /// Failed to parse JSON from the API or from model output.
    #[error("Failed to parse API response: {0}")]
    ParseError(#[from] serde_json::Error),
    /// Configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    /// The request breaks a cross-field rule.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// The model id is not in the catalog and no provider was forced.
    #[error("Unknown model: {0}")]
    UnknownModel(String),
    /// A schema could not be rendered.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// The conversation history rejected a turn.
    #[error(transparent)]
    History(#[from] HistoryError),
    /// The response did not have the expected shape.
    #[error("Unexpected response format: {0}")]
    ResponseFormat(String),
    /// The requested operation is not supported by the provider implementation.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// Type alias for a stream of text fragments.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// The core asynchronous trait defining the interface for LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// The provider this adapter talks to.
    fn provider(&self) -> Provider;

    /// Generates a non-streaming completion: a message, a structured
    /// document or tool calls.
    async fn completion(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError>;

    /// Generates a streaming completion of text fragments.
    async fn completion_stream(&self, request: CompletionRequest) -> Result<CompletionStream, ProviderError>;
}
