#![warn(missing_docs)] // Enforce documentation coverage
//! Provider-agnostic structured output, tool calling and chat history for
//! LLM APIs.
//!
//! Declare a [`SchemaModel`] once (by hand or with `#[derive(OutputSchema)]` /
//! `#[derive(ToolSchema)]`) and render it for OpenAI, Anthropic, Mistral or
//! Groq. Track a conversation in a [`ConversationHistory`] that enforces
//! legal turn order, and send both through an [`LlmProvider`] adapter.

// Lets the derive macros name `::llm_relay` from inside this crate too.
extern crate self as llm_relay;

pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod history;
pub mod providers;
pub mod schema;
pub mod sse;
pub mod tools;
pub mod traits;
pub mod transport;

pub use config::{ConfigError, LlmConfig, Provider, UnsupportedProvider};
pub use dispatch::Dispatcher;
pub use history::{ConversationHistory, HistoryError, HistoryState, ToolCall, ToolResult, Turn, TurnKind};
pub use providers::{AnthropicProvider, OpenAIProvider};
pub use schema::{Field, FieldKind, Schema, SchemaError, SchemaFlavor, SchemaModel};
pub use tools::{ToolError, ToolHandler, ToolPack};
pub use traits::{
    CompletionKind, CompletionRequest, CompletionResponse, CompletionStream, LlmProvider,
    ProviderError, ReasoningEffort, TokenUsage,
};

// Conditionally re-export the derive macros if the feature is enabled
#[cfg(feature = "macros")]
pub use llm_relay_macros::{OutputSchema, ToolSchema};

#[doc(hidden)]
pub use serde_json;

use std::sync::Arc;

/// Creates a provider instance based on the provided configuration.
///
/// This function validates the configuration and returns a dynamic dispatch trait object (`Arc<dyn LlmProvider>`)
/// allowing interaction with the selected provider through the common `LlmProvider` trait.
///
/// # Errors
///
/// Returns `ProviderError::Config` if the configuration is invalid for the selected provider.
///
/// # Examples
///
/// ```no_run
/// use llm_relay::{get_provider, CompletionRequest, LlmConfig, Provider};
///
/// # async fn run() -> Result<(), llm_relay::ProviderError> {
/// let config = LlmConfig::new(Provider::OpenAI).with_api_key("sk-...");
/// let provider = get_provider(config)?;
///
/// let request = CompletionRequest::new("gpt-4o-mini", "You are a helpful assistant.")
///     .with_user_message("Why is the sky blue?");
/// let response = provider.completion(request).await?;
/// println!("{:?}", response.kind);
/// # Ok(())
/// # }
/// ```
pub fn get_provider(config: LlmConfig) -> Result<Arc<dyn LlmProvider>, ProviderError> {
    config.validate()?;

    match config.provider {
        Provider::OpenAI | Provider::Mistral | Provider::Groq | Provider::Custom => {
            Ok(Arc::new(OpenAIProvider::new(config)?))
        }
        Provider::Anthropic => Ok(Arc::new(AnthropicProvider::new(config)?)),
    }
}
