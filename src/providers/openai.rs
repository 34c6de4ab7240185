//!
//! OpenAI-Compatible Provider Implementation
//!
//! This module provides the `OpenAIProvider` struct and its implementation
//! of the `LlmProvider` trait for the chat-completions family of APIs:
//! OpenAI itself, Mistral, Groq and self-hosted OpenAI-compatible gateways.
//! The differences between them are captured by a [`Dialect`].

use crate::catalog;
use crate::config::{ConfigError, LlmConfig, Provider};
use crate::history::{ToolCall, Turn};
use crate::sse::data_stream;
use crate::traits::{
    CompletionKind, CompletionRequest, CompletionResponse, CompletionStream, LlmProvider,
    ProviderError, ReasoningEffort, TokenUsage,
};
use crate::transport::HttpTransport;
use async_trait::async_trait;
use futures::future;
use futures::stream::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::debug;

/// Per-provider variations of the chat-completions API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    OpenAI,
    Mistral,
    Groq,
    Gateway,
}

impl Dialect {
    fn for_provider(provider: Provider) -> Option<Self> {
        match provider {
            Provider::OpenAI => Some(Dialect::OpenAI),
            Provider::Mistral => Some(Dialect::Mistral),
            Provider::Groq => Some(Dialect::Groq),
            Provider::Custom => Some(Dialect::Gateway),
            Provider::Anthropic => None,
        }
    }

    /// Provider whose schema profile is used for rendering. Gateways speak
    /// the OpenAI dialect.
    fn schema_target(self) -> Provider {
        match self {
            Dialect::OpenAI | Dialect::Gateway => Provider::OpenAI,
            Dialect::Mistral => Provider::Mistral,
            Dialect::Groq => Provider::Groq,
        }
    }
}

// --- OpenAI Specific API Structures ---

#[derive(Serialize, Debug)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<ReasoningEffort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<JsonValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<JsonValue>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
struct OpenAIMessage {
    role: &'static str,
    // Serialized as `null` on tool-call turns.
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCallOut>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl OpenAIMessage {
    fn text(role: &'static str, content: impl Into<String>) -> Self {
        Self { role, content: Some(content.into()), tool_calls: None, tool_call_id: None }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
struct OpenAIToolCallOut {
    id: String,
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: OpenAIFunctionCallOut,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
struct OpenAIFunctionCallOut {
    name: String,
    arguments: String,
}

#[derive(Deserialize, Debug)]
struct OpenAIChatResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Deserialize, Debug)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct OpenAIResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAIToolCall>>,
}

#[derive(Deserialize, Debug)]
struct OpenAIToolCall {
    id: String,
    function: OpenAIFunctionCall,
}

#[derive(Deserialize, Debug)]
struct OpenAIFunctionCall {
    name: String,
    // A JSON string from OpenAI; some gateways send an object.
    #[serde(default)]
    arguments: JsonValue,
}

#[derive(Deserialize, Debug, Clone, Copy)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: Option<u32>,
}

#[derive(Deserialize, Debug)]
struct OpenAIChatStreamResponse {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
}

#[derive(Deserialize, Debug)]
struct OpenAIStreamChoice {
    delta: OpenAIStreamDelta,
}

#[derive(Deserialize, Debug)]
struct OpenAIStreamDelta {
    content: Option<String>,
}

// --- Provider Implementation ---

/// Provides interaction with OpenAI-compatible chat-completions APIs.
#[derive(Debug, Clone)]
pub struct OpenAIProvider {
    provider: Provider,
    dialect: Dialect,
    transport: HttpTransport,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAIProvider {
    /// Creates a provider from a validated configuration.
    ///
    /// # Errors
    ///
    /// `ProviderError::Config` when the configuration is incomplete,
    /// `ProviderError::Unsupported` for a provider that does not speak the
    /// chat-completions API.
    pub fn new(config: LlmConfig) -> Result<Self, ProviderError> {
        let dialect = Dialect::for_provider(config.provider).ok_or_else(|| {
            ProviderError::Unsupported(format!(
                "{} is not served by the OpenAI-compatible adapter",
                config.provider
            ))
        })?;
        config.validate()?;
        let base_url = config.resolved_base_url().ok_or(ConfigError::MissingBaseUrl)?;
        let transport = HttpTransport::new(&config)?;

        debug!(provider = %config.provider, base_url = %base_url, "Initialized LLM provider");

        Ok(Self {
            provider: config.provider,
            dialect,
            transport,
            api_key: config.api_key,
            base_url,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Builds the necessary HTTP headers for chat-completions calls.
    fn build_headers(&self) -> Result<HeaderMap, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(api_key) = &self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|_| {
                ProviderError::InvalidRequest("API key is not a valid header value".to_string())
            })?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Translates the request into the wire body.
    fn build_body(
        &self,
        request: &CompletionRequest,
        stream: bool,
    ) -> Result<OpenAIChatRequest, ProviderError> {
        let (model, reasoning) = catalog::resolve(self.provider, &request.model);
        // Only OpenAI's own reasoning models take the developer role and effort.
        let reasoning = reasoning && self.dialect == Dialect::OpenAI;
        let target = self.dialect.schema_target();

        let system_role = if reasoning { "developer" } else { "system" };
        let mut messages = vec![OpenAIMessage::text(system_role, request.system_message.clone())];
        if let Some(history) = &request.history {
            for turn in history {
                messages.push(Self::map_turn(turn)?);
            }
        }
        if let Some(user_message) = &request.user_message {
            messages.push(OpenAIMessage::text("user", user_message.clone()));
        }

        if !reasoning && request.reasoning_effort.is_some() {
            debug!(model = %request.model, "Ignoring reasoning effort for a non-reasoning model");
        }

        let mut body = OpenAIChatRequest {
            model,
            messages,
            stream,
            temperature: if reasoning { None } else { request.temperature },
            seed: request.seed,
            max_tokens: request.max_tokens,
            reasoning_effort: if reasoning { request.reasoning_effort } else { None },
            tools: None,
            tool_choice: None,
            response_format: None,
        };

        if !request.tools.is_empty() {
            let tools = request
                .tools
                .iter()
                .map(|tool| tool.render(target))
                .collect::<Result<Vec<_>, _>>()?;
            body.tools = Some(tools);
            body.tool_choice = Some(json!("auto"));
        }

        if let Some(schema) = &request.structured_output {
            if self.dialect == Dialect::Groq {
                // Groq has no response_format for schemas: force a function call instead.
                let parameters = schema.render_body(target)?;
                body.tools = Some(vec![json!({
                    "type": "function",
                    "function": {
                        "name": schema.name(),
                        "description": schema.documentation().unwrap_or_default(),
                        "parameters": parameters,
                    }
                })]);
                body.tool_choice = Some(json!({
                    "type": "function",
                    "function": { "name": schema.name() }
                }));
            } else {
                body.response_format = Some(schema.render(target)?);
            }
        }

        Ok(body)
    }

    fn map_turn(turn: &Turn) -> Result<OpenAIMessage, ProviderError> {
        let message = match turn {
            Turn::User { text } => OpenAIMessage::text("user", text.clone()),
            Turn::Assistant { text } => OpenAIMessage::text("assistant", text.clone()),
            Turn::ToolCall { calls } => {
                let tool_calls = calls
                    .iter()
                    .map(|call| {
                        Ok(OpenAIToolCallOut {
                            id: call.id.clone(),
                            tool_type: "function",
                            function: OpenAIFunctionCallOut {
                                name: call.name.clone(),
                                arguments: serde_json::to_string(&call.arguments)?,
                            },
                        })
                    })
                    .collect::<Result<Vec<_>, serde_json::Error>>()?;
                OpenAIMessage {
                    role: "assistant",
                    content: None,
                    tool_calls: Some(tool_calls),
                    tool_call_id: None,
                }
            }
            Turn::ToolResult(result) => OpenAIMessage {
                role: "tool",
                content: Some(serde_json::to_string(&result.content)?),
                tool_calls: None,
                tool_call_id: Some(result.id.clone()),
            },
        };
        Ok(message)
    }

    /// Normalizes a decoded response body.
    fn parse_response(
        &self,
        request: &CompletionRequest,
        body: JsonValue,
    ) -> Result<CompletionResponse, ProviderError> {
        if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
            let message = error
                .get("message")
                .and_then(JsonValue::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(ProviderError::ApiError { status: 200, message });
        }

        let response: OpenAIChatResponse = serde_json::from_value(body)?;
        let usage = if request.track_usage {
            response.usage.map(Self::map_usage)
        } else {
            None
        };
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ResponseFormat("no choices in response".to_string()))?;
        let finish_reason = choice.finish_reason;
        let message = choice.message;
        let tool_calls = message.tool_calls.unwrap_or_default();

        let kind = if !request.tools.is_empty() && !tool_calls.is_empty() {
            CompletionKind::ToolCall { tool_calls: Self::map_tool_calls(tool_calls)? }
        } else if request.structured_output.is_some() {
            let value = if self.dialect == Dialect::Groq {
                let call = tool_calls.into_iter().next().ok_or_else(|| {
                    ProviderError::ResponseFormat(
                        "expected a forced function call carrying the structured output".to_string(),
                    )
                })?;
                parse_arguments(call.function.arguments)?
            } else {
                let content = message.content.ok_or_else(|| {
                    ProviderError::ResponseFormat("structured output response has no content".to_string())
                })?;
                serde_json::from_str(&content)?
            };
            CompletionKind::Structured { value }
        } else {
            CompletionKind::Message { content: message.content.unwrap_or_default() }
        };

        Ok(CompletionResponse { kind, usage, finish_reason })
    }

    fn map_usage(usage: OpenAIUsage) -> TokenUsage {
        TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage
                .total_tokens
                .unwrap_or(usage.prompt_tokens.saturating_add(usage.completion_tokens)),
        }
    }

    fn map_tool_calls(tool_calls: Vec<OpenAIToolCall>) -> Result<Vec<ToolCall>, ProviderError> {
        tool_calls
            .into_iter()
            .map(|call| {
                Ok(ToolCall::new(
                    call.id,
                    call.function.name,
                    parse_arguments(call.function.arguments)?,
                ))
            })
            .collect()
    }
}

/// Tool arguments arrive as a JSON string or as an already-decoded object.
fn parse_arguments(arguments: JsonValue) -> Result<JsonValue, ProviderError> {
    match arguments {
        JsonValue::String(raw) if raw.trim().is_empty() => Ok(json!({})),
        JsonValue::String(raw) => Ok(serde_json::from_str(&raw)?),
        JsonValue::Null => Ok(json!({})),
        other => Ok(other),
    }
}

/// Pulls the text delta out of one stream payload; anything else is skipped.
fn stream_delta(payload: &str) -> Option<String> {
    match serde_json::from_str::<OpenAIChatStreamResponse>(payload) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty()),
        Err(err) => {
            debug!(error = %err, payload, "Skipping malformed stream line");
            None
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn completion(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        request.validate()?;
        let body = self.build_body(&request, false)?;
        debug!(provider = %self.provider, model = %body.model, "Sending chat completion request");

        let response = self
            .transport
            .post_json(&self.endpoint(), &self.build_headers()?, &body)
            .await?;
        self.parse_response(&request, response)
    }

    async fn completion_stream(&self, request: CompletionRequest) -> Result<CompletionStream, ProviderError> {
        request.validate_for_stream()?;
        let body = self.build_body(&request, true)?;
        debug!(provider = %self.provider, model = %body.model, "Sending streaming chat completion request");

        let response = self
            .transport
            .post_stream(&self.endpoint(), &self.build_headers()?, &body)
            .await?;

        let fragments = data_stream(response.bytes_stream()).filter_map(|item| {
            future::ready(match item {
                Ok(payload) => stream_delta(&payload).map(Ok),
                Err(err) => Some(Err(err)),
            })
        });
        Ok(Box::pin(fragments))
    }
}
