//!
//! Model Catalog
//!
//! Maps the model identifiers callers use to the provider serving them and
//! the name that goes on the wire.

use crate::config::Provider;
use crate::traits::ProviderError;
use lazy_static::lazy_static;
use std::collections::HashMap;

/// What the catalog knows about one model id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInfo {
    /// Provider that serves the model.
    pub provider: Provider,
    /// Model name sent in the request body.
    pub wire_name: &'static str,
    /// Reasoning models take `reasoning_effort` and no `temperature`.
    pub reasoning: bool,
}

const fn model(provider: Provider, wire_name: &'static str) -> ModelInfo {
    ModelInfo { provider, wire_name, reasoning: false }
}

const fn reasoning(provider: Provider, wire_name: &'static str) -> ModelInfo {
    ModelInfo { provider, wire_name, reasoning: true }
}

const ENTRIES: &[(&str, ModelInfo)] = &[
    ("gpt-4o-2024-08-06", model(Provider::OpenAI, "gpt-4o-2024-08-06")),
    ("gpt-4o-mini-2024-07-18", model(Provider::OpenAI, "gpt-4o-mini-2024-07-18")),
    ("gpt-4o", model(Provider::OpenAI, "gpt-4o")),
    ("gpt-4o-mini", model(Provider::OpenAI, "gpt-4o-mini")),
    ("o1-2024-12-17", reasoning(Provider::OpenAI, "o1-2024-12-17")),
    ("o3-mini", reasoning(Provider::OpenAI, "o3-mini")),
    ("mistral-large-latest", model(Provider::Mistral, "mistral-large-latest")),
    ("mistral-small", model(Provider::Mistral, "mistral-small")),
    ("claude-3-7-sonnet-20250219", model(Provider::Anthropic, "claude-3-7-sonnet-20250219")),
    ("claude-3-5-sonnet-20241022", model(Provider::Anthropic, "claude-3-5-sonnet-20241022")),
    ("claude-3-5-haiku-20241022", model(Provider::Anthropic, "claude-3-5-haiku-20241022")),
    ("qwen-qwq-32b-groq", model(Provider::Groq, "qwen-qwq-32b")),
    ("qwen-2.5-coder-32b-groq", model(Provider::Groq, "qwen-2.5-coder-32b")),
    ("qwen-2.5-32b-groq", model(Provider::Groq, "qwen-2.5-32b")),
    ("deepseek-r1-distill-qwen-32b-groq", model(Provider::Groq, "deepseek-r1-distill-qwen-32b")),
    ("deepseek-r1-distill-llama-70b-groq", model(Provider::Groq, "deepseek-r1-distill-llama-70b")),
    ("llama-3.3-70b-versatile-groq", model(Provider::Groq, "llama-3.3-70b-versatile")),
    ("llama-3.1-8b-instant-groq", model(Provider::Groq, "llama-3.1-8b-instant")),
    ("llama-3.1-8b-instruct", model(Provider::Custom, "tgi")),
];

lazy_static! {
    static ref CATALOG: HashMap<&'static str, ModelInfo> = ENTRIES.iter().copied().collect();
}

/// Looks a model id up.
pub fn lookup(model: &str) -> Option<ModelInfo> {
    CATALOG.get(model).copied()
}

/// The provider serving `model`.
pub fn route(model: &str) -> Result<Provider, ProviderError> {
    lookup(model)
        .map(|info| info.provider)
        .ok_or_else(|| ProviderError::UnknownModel(model.to_string()))
}

/// All catalog ids, in catalog order.
pub fn known_models() -> Vec<&'static str> {
    ENTRIES.iter().map(|(id, _)| *id).collect()
}

/// Wire name and reasoning flag for `model` when served by `provider`.
///
/// Models outside the catalog (or served by another provider than the
/// catalog says) go out unchanged, with a `-groq` suffix stripped for Groq.
pub(crate) fn resolve(provider: Provider, model: &str) -> (String, bool) {
    match lookup(model) {
        Some(info) if info.provider == provider => (info.wire_name.to_string(), info.reasoning),
        _ if provider == Provider::Groq => {
            (model.strip_suffix("-groq").unwrap_or(model).to_string(), false)
        }
        _ => (model.to_string(), false),
    }
}
