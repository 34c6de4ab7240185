//!
//! HTTP Transport
//!
//! A thin wrapper over `reqwest::Client` shared by every adapter: JSON
//! posting, retries with exponential backoff for transient failures, and
//! provider error bodies mapped into [`ProviderError::ApiError`].

use crate::config::LlmConfig;
use crate::traits::ProviderError;
use reqwest::header::HeaderMap;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, warn};

/// Shared HTTP client with the configured timeout and retry policy.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl HttpTransport {
    /// Builds the client from `config`.
    pub fn new(config: &LlmConfig) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            max_retries: config.max_retries,
            retry_base_delay: config.retry_base_delay,
        })
    }

    /// Posts `body` and decodes the JSON response.
    pub async fn post_json<B>(
        &self,
        url: &str,
        headers: &HeaderMap,
        body: &B,
    ) -> Result<JsonValue, ProviderError>
    where
        B: Serialize + ?Sized,
    {
        let response = self.send(url, headers, body).await?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Posts `body` and hands back the successful response for streaming.
    pub async fn post_stream<B>(
        &self,
        url: &str,
        headers: &HeaderMap,
        body: &B,
    ) -> Result<Response, ProviderError>
    where
        B: Serialize + ?Sized,
    {
        self.send(url, headers, body).await
    }

    async fn send<B>(&self, url: &str, headers: &HeaderMap, body: &B) -> Result<Response, ProviderError>
    where
        B: Serialize + ?Sized,
    {
        let mut attempt: u32 = 0;
        loop {
            if attempt > 0 {
                let delay = self.backoff(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, url, "Retrying request");
                tokio::time::sleep(delay).await;
            }
            debug!(attempt, url, "Sending request");

            let result = self
                .client
                .post(url)
                .headers(headers.clone())
                .json(body)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let error = api_error(response).await;
                    if is_retryable_status(status) && attempt < self.max_retries {
                        warn!(attempt, status = status.as_u16(), "Transient API error, will retry");
                        attempt += 1;
                        continue;
                    }
                    return Err(error);
                }
                Err(err) => {
                    if attempt < self.max_retries {
                        warn!(attempt, error = %err, "Network error, will retry");
                        attempt += 1;
                        continue;
                    }
                    return Err(ProviderError::RequestError(err));
                }
            }
        }
    }

    /// Delay before retry number `attempt` (1-based).
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.retry_base_delay.saturating_mul(1u32 << exponent)
    }
}

/// Returns `true` if the HTTP status code is transient and should be retried.
fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

async fn api_error(response: Response) -> ProviderError {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error body".to_string());
    ProviderError::ApiError { status, message: error_message(&body) }
}

/// Extracts `error.message` from a provider error body, falling back to the
/// raw text.
pub(crate) fn error_message(body: &str) -> String {
    let parsed: Option<JsonValue> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .or_else(|| value.pointer("/0/error/message"))
                .or_else(|| value.get("error").filter(|e| e.is_string()))
                .or_else(|| value.get("message").filter(|m| m.is_string()))
        })
        .and_then(JsonValue::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_retryable_status(StatusCode::GATEWAY_TIMEOUT));

        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable_status(StatusCode::NOT_IMPLEMENTED));
    }

    #[test]
    fn error_message_shapes() {
        assert_eq!(error_message(r#"{"error":{"message":"bad key","type":"auth"}}"#), "bad key");
        assert_eq!(
            error_message(r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#),
            "Overloaded"
        );
        assert_eq!(error_message(r#"[{"error":{"message":"first"}}]"#), "first");
        assert_eq!(error_message(r#"{"error":"plain"}"#), "plain");
        assert_eq!(error_message("<html>502</html>"), "<html>502</html>");
    }

    #[test]
    fn backoff_doubles() {
        let transport = HttpTransport::new(
            &LlmConfig::new(crate::config::Provider::OpenAI)
                .with_retry_base_delay(Duration::from_millis(100)),
        )
        .unwrap();
        assert_eq!(transport.backoff(1), Duration::from_millis(100));
        assert_eq!(transport.backoff(2), Duration::from_millis(200));
        assert_eq!(transport.backoff(3), Duration::from_millis(400));
    }
}
