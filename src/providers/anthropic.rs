//!
//! Anthropic Provider Implementation
//!
//! Talks to the Messages API. Structured output is obtained by forcing a
//! call to a single tool whose input schema is the output model.

use crate::catalog;
use crate::config::{ConfigError, LlmConfig, Provider};
use crate::history::{ToolCall, Turn};
use crate::sse::data_stream;
use crate::traits::{
    CompletionKind, CompletionRequest, CompletionResponse, CompletionStream, LlmProvider,
    ProviderError, TokenUsage,
};
use crate::transport::HttpTransport;
use async_trait::async_trait;
use futures::future;
use futures::stream::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::debug;

/// Value of the `anthropic-version` header.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Token limit sent when the request sets none; the API requires one.
pub const DEFAULT_MAX_TOKENS: u32 = 8192;

// --- Anthropic Specific API Structures ---

#[derive(Serialize, Debug)]
struct AnthropicRequest {
    model: String,
    system: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<JsonValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<JsonValue>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
struct AnthropicMessage {
    role: &'static str,
    content: AnthropicContent,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    ToolUse { id: String, name: String, input: JsonValue },
    ToolResult { tool_use_id: String, content: String },
}

#[derive(Deserialize, Debug)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
    stop_reason: Option<String>,
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: JsonValue,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug, Clone, Copy)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

// --- Provider Implementation ---

/// Provides interaction with Anthropic's Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    transport: HttpTransport,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    /// Creates a provider from a validated configuration.
    pub fn new(config: LlmConfig) -> Result<Self, ProviderError> {
        if config.provider != Provider::Anthropic {
            return Err(ProviderError::Unsupported(format!(
                "{} is not served by the Anthropic adapter",
                config.provider
            )));
        }
        config.validate()?;
        let api_key = config
            .api_key
            .clone()
            .ok_or(ConfigError::MissingApiKey(Provider::Anthropic))?;
        let base_url = config.resolved_base_url().ok_or(ConfigError::MissingBaseUrl)?;
        let transport = HttpTransport::new(&config)?;

        debug!(provider = %Provider::Anthropic, base_url = %base_url, "Initialized LLM provider");

        Ok(Self { transport, api_key, base_url })
    }

    fn endpoint(&self) -> String {
        format!("{}/messages", self.base_url)
    }

    fn build_headers(&self) -> Result<HeaderMap, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static("anthropic-version"),
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        let key = HeaderValue::from_str(&self.api_key).map_err(|_| {
            ProviderError::InvalidRequest("API key is not a valid header value".to_string())
        })?;
        headers.insert(HeaderName::from_static("x-api-key"), key);
        Ok(headers)
    }

    fn build_body(
        &self,
        request: &CompletionRequest,
        stream: bool,
    ) -> Result<AnthropicRequest, ProviderError> {
        let (model, _) = catalog::resolve(Provider::Anthropic, &request.model);

        let mut messages = Vec::new();
        if let Some(history) = &request.history {
            for turn in history {
                Self::push_turn(&mut messages, turn);
            }
        }
        if let Some(user_message) = &request.user_message {
            messages.push(AnthropicMessage {
                role: "user",
                content: AnthropicContent::Text(user_message.clone()),
            });
        }

        let mut body = AnthropicRequest {
            model,
            system: request.system_message.clone(),
            messages,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: request.temperature,
            stream,
            tools: None,
            tool_choice: None,
        };

        if !request.tools.is_empty() {
            let tools = request
                .tools
                .iter()
                .map(|tool| tool.render(Provider::Anthropic))
                .collect::<Result<Vec<_>, _>>()?;
            body.tools = Some(tools);
        }
        if let Some(schema) = &request.structured_output {
            body.tools = Some(vec![schema.render(Provider::Anthropic)?]);
            body.tool_choice = Some(json!({ "type": "tool", "name": schema.name() }));
        }
        Ok(body)
    }

    /// Appends one turn, merging consecutive tool results into a single
    /// user message.
    fn push_turn(messages: &mut Vec<AnthropicMessage>, turn: &Turn) {
        match turn {
            Turn::User { text } => messages.push(AnthropicMessage {
                role: "user",
                content: AnthropicContent::Text(text.clone()),
            }),
            Turn::Assistant { text } => messages.push(AnthropicMessage {
                role: "assistant",
                content: AnthropicContent::Text(text.clone()),
            }),
            Turn::ToolCall { calls } => messages.push(AnthropicMessage {
                role: "assistant",
                content: AnthropicContent::Blocks(
                    calls
                        .iter()
                        .map(|call| ContentBlock::ToolUse {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            input: call.arguments.clone(),
                        })
                        .collect(),
                ),
            }),
            Turn::ToolResult(result) => {
                let block = ContentBlock::ToolResult {
                    tool_use_id: result.id.clone(),
                    content: result.content.to_string(),
                };
                if let Some(AnthropicMessage { role: "user", content: AnthropicContent::Blocks(blocks) }) =
                    messages.last_mut()
                {
                    if blocks.iter().all(|b| matches!(b, ContentBlock::ToolResult { .. })) {
                        blocks.push(block);
                        return;
                    }
                }
                messages.push(AnthropicMessage {
                    role: "user",
                    content: AnthropicContent::Blocks(vec![block]),
                });
            }
        }
    }

    fn parse_response(
        &self,
        request: &CompletionRequest,
        body: JsonValue,
    ) -> Result<CompletionResponse, ProviderError> {
        if body.get("type").and_then(JsonValue::as_str) == Some("error") {
            let message = body
                .pointer("/error/message")
                .and_then(JsonValue::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| body.to_string());
            return Err(ProviderError::ApiError { status: 200, message });
        }

        let response: AnthropicResponse = serde_json::from_value(body)?;
        let usage = match (request.track_usage, response.usage) {
            (true, Some(usage)) => Some(TokenUsage {
                prompt_tokens: usage.input_tokens,
                completion_tokens: usage.output_tokens,
                total_tokens: usage.input_tokens.saturating_add(usage.output_tokens),
            }),
            _ => None,
        };

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for block in response.content {
            match block {
                ResponseBlock::Text { text: part } => text.push_str(&part),
                ResponseBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall::new(id, name, input))
                }
                ResponseBlock::Other => {}
            }
        }

        let kind = if let Some(schema) = &request.structured_output {
            let call = tool_calls
                .into_iter()
                .find(|call| call.name == schema.name())
                .ok_or_else(|| {
                    ProviderError::ResponseFormat(format!(
                        "expected a `{}` tool_use block carrying the structured output",
                        schema.name()
                    ))
                })?;
            CompletionKind::Structured { value: call.arguments }
        } else if !request.tools.is_empty() && !tool_calls.is_empty() {
            CompletionKind::ToolCall { tool_calls }
        } else {
            CompletionKind::Message { content: text }
        };

        Ok(CompletionResponse { kind, usage, finish_reason: response.stop_reason })
    }
}

/// Extracts the text carried by one stream event.
fn stream_event(payload: &str) -> Option<Result<String, ProviderError>> {
    let event: JsonValue = match serde_json::from_str(payload) {
        Ok(event) => event,
        Err(err) => {
            debug!(error = %err, payload, "Skipping malformed stream line");
            return None;
        }
    };
    match event.get("type").and_then(JsonValue::as_str) {
        Some("content_block_delta") => {
            let delta = event.get("delta")?;
            let fragment = match delta.get("type").and_then(JsonValue::as_str) {
                Some("input_json_delta") => delta.get("partial_json"),
                _ => delta.get("text"),
            };
            fragment
                .and_then(JsonValue::as_str)
                .filter(|s| !s.is_empty())
                .map(|s| Ok(s.to_string()))
        }
        Some("error") => {
            let message = event
                .pointer("/error/message")
                .and_then(JsonValue::as_str)
                .unwrap_or("stream error")
                .to_string();
            Some(Err(ProviderError::ApiError { status: 200, message }))
        }
        _ => None,
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn completion(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        request.validate()?;
        let body = self.build_body(&request, false)?;
        debug!(provider = %Provider::Anthropic, model = %body.model, "Sending messages request");

        let response = self
            .transport
            .post_json(&self.endpoint(), &self.build_headers()?, &body)
            .await?;
        self.parse_response(&request, response)
    }

    async fn completion_stream(&self, request: CompletionRequest) -> Result<CompletionStream, ProviderError> {
        request.validate_for_stream()?;
        let body = self.build_body(&request, true)?;
        debug!(provider = %Provider::Anthropic, model = %body.model, "Sending streaming messages request");

        let response = self
            .transport
            .post_stream(&self.endpoint(), &self.build_headers()?, &body)
            .await?;

        let fragments = data_stream(response.bytes_stream()).filter_map(|item| {
            future::ready(match item {
                Ok(payload) => stream_event(&payload),
                Err(err) => Some(Err(err)),
            })
        });
        Ok(Box::pin(fragments))
    }
}
