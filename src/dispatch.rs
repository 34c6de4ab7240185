//!
//! Request Dispatcher
//!
//! Routes a [`CompletionRequest`] to the adapter serving its model.

use crate::catalog;
use crate::config::{ConfigError, LlmConfig, Provider};
use crate::get_provider;
use crate::traits::{CompletionRequest, CompletionResponse, CompletionStream, LlmProvider, ProviderError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Holds one adapter per configured provider.
#[derive(Clone, Default)]
pub struct Dispatcher {
    providers: HashMap<Provider, Arc<dyn LlmProvider>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut configured: Vec<_> = self.providers.keys().map(Provider::as_str).collect();
        configured.sort_unstable();
        f.debug_struct("Dispatcher").field("providers", &configured).finish()
    }
}

impl Dispatcher {
    /// Creates a dispatcher with no providers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds and adds the adapter for `config`.
    pub fn with_config(mut self, config: LlmConfig) -> Result<Self, ProviderError> {
        let provider = get_provider(config)?;
        self.register(provider);
        Ok(self)
    }

    /// Adds (or replaces) the adapter for its provider.
    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.provider(), provider);
    }

    /// Configures every provider whose environment variables are set.
    /// Providers with incomplete configuration are skipped.
    pub fn from_env() -> Self {
        let mut dispatcher = Self::new();
        for provider in Provider::ALL {
            let config = LlmConfig::from_env(provider);
            if config.validate().is_err() {
                continue;
            }
            match get_provider(config) {
                Ok(adapter) => dispatcher.register(adapter),
                Err(err) => debug!(provider = %provider, error = %err, "Skipping provider"),
            }
        }
        dispatcher
    }

    /// Providers with an adapter.
    pub fn providers(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|provider| self.providers.contains_key(provider))
            .collect()
    }

    /// The adapter that would serve `request`.
    pub fn route(&self, request: &CompletionRequest) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let provider = match request.provider {
            Some(provider) => provider,
            None => catalog::route(&request.model)?,
        };
        let adapter = self.providers.get(&provider).cloned().ok_or_else(|| {
            ProviderError::Config(match provider {
                Provider::Custom => ConfigError::MissingBaseUrl,
                other => ConfigError::MissingApiKey(other),
            })
        })?;
        debug!(provider = %provider, model = %request.model, "Routing request");
        Ok(adapter)
    }

    /// Validates, routes and runs a non-streaming completion.
    pub async fn completion(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        request.validate()?;
        self.route(&request)?.completion(request).await
    }

    /// Validates, routes and runs a streaming completion.
    pub async fn completion_stream(&self, request: CompletionRequest) -> Result<CompletionStream, ProviderError> {
        request.validate_for_stream()?;
        self.route(&request)?.completion_stream(request).await
    }
}
