//!
//! Provider Implementations Module
//!
//! This module contains the concrete implementations for each supported LLM provider.
//! Each provider implements the `LlmProvider` trait defined in `crate::traits`.

pub mod anthropic;
pub mod openai;

// Re-export provider structs for easier access from the library root.
pub use anthropic::AnthropicProvider;
pub use openai::OpenAIProvider;
