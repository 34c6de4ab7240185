//! Provider selection and connection settings.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default number of retries for transient transport failures.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default base delay for exponential retry backoff.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Represents the supported LLM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// OpenAI chat completions.
    OpenAI,
    /// Anthropic messages API.
    Anthropic,
    /// Mistral chat completions.
    Mistral,
    /// Groq's OpenAI-compatible endpoint.
    Groq,
    /// Any other OpenAI-compatible gateway reached through an explicit base URL.
    Custom,
}

/// Returned when a provider token does not name a known provider, or when a
/// provider cannot be targeted by an operation (e.g. schema rendering for a
/// custom gateway).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported provider: {0}")]
pub struct UnsupportedProvider(pub String);

impl Provider {
    /// All providers, in a stable order.
    pub const ALL: [Provider; 5] = [
        Provider::OpenAI,
        Provider::Anthropic,
        Provider::Mistral,
        Provider::Groq,
        Provider::Custom,
    ];

    /// The lowercase token used in configuration and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAI => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Mistral => "mistral",
            Provider::Groq => "groq",
            Provider::Custom => "custom",
        }
    }

    /// The provider's public API base URL. The custom gateway has none.
    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            Provider::OpenAI => Some("https://api.openai.com/v1"),
            Provider::Anthropic => Some("https://api.anthropic.com/v1"),
            Provider::Mistral => Some("https://api.mistral.ai/v1"),
            Provider::Groq => Some("https://api.groq.com/openai/v1"),
            Provider::Custom => None,
        }
    }

    /// Environment variable holding the API key for this provider.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Provider::OpenAI => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::Mistral => "MISTRAL_API_KEY",
            Provider::Groq => "GROQ_API_KEY",
            Provider::Custom => "LLM_GATEWAY_API_KEY",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = UnsupportedProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAI),
            "anthropic" => Ok(Provider::Anthropic),
            "mistral" => Ok(Provider::Mistral),
            "groq" => Ok(Provider::Groq),
            "custom" | "gateway" => Ok(Provider::Custom),
            _ => Err(UnsupportedProvider(s.to_string())),
        }
    }
}

/// Environment variable holding the base URL of the custom gateway.
pub const GATEWAY_BASE_URL_ENV: &str = "LLM_GATEWAY_BASE_URL";

/// Configuration for initializing an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// The specific provider to use.
    pub provider: Provider,
    /// The API key required by the provider (if any).
    pub api_key: Option<String>,
    /// Overrides the provider's default base URL. Required for `Custom`.
    pub base_url: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Extra attempts made for transient failures (network, 429, 5xx).
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries.
    pub retry_base_delay: Duration,
}

/// Errors that can occur during configuration validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Missing API key required for the specified provider.
    #[error("Missing API key for provider: {0}")]
    MissingApiKey(Provider),
    /// Missing base URL required for the `Custom` provider.
    #[error("Missing base URL for custom provider")]
    MissingBaseUrl,
}

impl LlmConfig {
    /// Creates a new basic configuration.
    pub fn new(provider: Provider) -> Self {
        LlmConfig {
            provider,
            api_key: None,
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
        }
    }

    /// Builds a configuration from the provider's environment variables.
    ///
    /// Reads the API key from [`Provider::api_key_env`]; for the custom
    /// gateway the base URL comes from `LLM_GATEWAY_BASE_URL`. The result is
    /// not validated.
    pub fn from_env(provider: Provider) -> Self {
        let mut config = LlmConfig::new(provider);
        config.api_key = std::env::var(provider.api_key_env())
            .ok()
            .filter(|key| !key.trim().is_empty());
        if provider == Provider::Custom {
            config.base_url = std::env::var(GATEWAY_BASE_URL_ENV)
                .ok()
                .filter(|url| !url.trim().is_empty());
        }
        config
    }

    /// Sets the API key for the configuration (builder style).
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the base URL for the configuration (builder style).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets how many times a transient failure is retried.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the base delay of the exponential backoff.
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// The base URL requests go to, without a trailing slash.
    pub fn resolved_base_url(&self) -> Option<String> {
        self.base_url
            .as_deref()
            .or_else(|| self.provider.default_base_url())
            .map(|url| url.trim_end_matches('/').to_string())
    }

    /// Validates the configuration based on the selected provider's requirements.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails (e.g., missing API key).
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.provider {
            Provider::OpenAI | Provider::Anthropic | Provider::Mistral | Provider::Groq => {
                if self.api_key.is_none() {
                    return Err(ConfigError::MissingApiKey(self.provider));
                }
            }
            Provider::Custom => {
                // Gateways may be unauthenticated; only the URL is mandatory.
                if self.base_url.is_none() {
                    return Err(ConfigError::MissingBaseUrl);
                }
            }
        }
        Ok(())
    }
}
