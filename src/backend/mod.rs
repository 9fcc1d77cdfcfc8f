//! Backend trait and normalized request/response types.
//!
//! The [`Backend`] trait abstracts over completion providers, translating
//! between the normalized [`CompletionRequest`]/[`CompletionResponse`] types
//! and provider-specific HTTP APIs. Built-in implementations:
//! [`GeminiBackend`] (cloud), [`LlamaCppBackend`] (local server),
//! [`MockBackend`] (tests).
//!
//! Role mapping is each adapter's responsibility: Gemini folds `system`
//! messages into a separate instruction field and calls the assistant
//! `"model"`, while llama.cpp keeps an OpenAI-style three-role array. The
//! generator is agnostic to this mapping.

pub mod backoff;
pub mod gemini;
pub mod llamacpp;
pub mod mock;

pub use backoff::BackoffConfig;
pub use gemini::GeminiBackend;
pub use llamacpp::LlamaCppBackend;
pub use mock::{MockBackend, MockOutcome};

use crate::config::GenConfig;
use crate::error::{GenError, Result};
use crate::history::Message;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// A normalized completion request — provider-agnostic.
///
/// The generator builds this from its state each attempt; the [`Backend`]
/// translates it into the provider-specific HTTP request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model identifier (e.g. `"gemini-1.5-flash"`). Local servers that
    /// serve a single model may ignore it.
    pub model: String,

    /// System instruction, if any.
    pub system_prompt: Option<String>,

    /// The full conversation history snapshot for this attempt, in order.
    pub history: Vec<Message>,

    /// Sampling configuration (temperature, max tokens).
    pub config: GenConfig,
}

/// A normalized completion response.
#[derive(Debug)]
pub struct CompletionResponse {
    /// The generated text.
    pub text: String,

    /// HTTP status code (for diagnostics/logging).
    pub status: u16,

    /// Provider-specific metadata (token counts, timing, model info).
    /// Stored as raw JSON — each provider returns different fields.
    pub metadata: Option<Value>,
}

/// Abstraction over completion providers.
///
/// Implementors translate between the normalized request/response pair and
/// the provider's HTTP API, including the provider's role conventions.
///
/// # Object Safety
///
/// This trait is object-safe and designed to be used as `Arc<dyn Backend>`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Execute a completion call.
    async fn complete(
        &self,
        client: &Client,
        base_url: &str,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse>;

    /// Human-readable name for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Check whether a [`GenError`] is retryable at the transport level.
///
/// Retryable conditions:
/// - [`GenError::Http`] with a status in `config.retryable_statuses`
/// - [`GenError::Request`] (connection/transport errors)
pub fn is_retryable(error: &GenError, config: &BackoffConfig) -> bool {
    match error {
        GenError::Http { status, .. } => config.retryable_statuses.contains(status),
        GenError::Request(_) => true,
        _ => false,
    }
}

/// Execute a backend call with transient-failure retry and exponential backoff.
///
/// This is the provider-internal retry policy: 429/5xx statuses and
/// connection errors are retried with increasing (jittered) delays,
/// honouring `Retry-After` when present. Errors that survive it are
/// reported to the generator, which applies its own fixed-pause retry
/// without touching the conversation.
pub async fn with_backoff(
    backend: &Arc<dyn Backend>,
    client: &Client,
    base_url: &str,
    request: &CompletionRequest,
    config: &BackoffConfig,
) -> Result<CompletionResponse> {
    let mut last_error: Option<GenError> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let delay = match &last_error {
                Some(GenError::Http {
                    retry_after: Some(after),
                    ..
                }) if config.respect_retry_after => *after,
                _ => config.delay_for_attempt(attempt - 1),
            };
            warn!(
                backend = backend.name(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %last_error.as_ref().map(|e| e.to_string()).unwrap_or_default(),
                "transient backend failure, backing off"
            );
            tokio::time::sleep(delay).await;
        }

        match backend.complete(client, base_url, request).await {
            Ok(response) => return Ok(response),
            Err(e) => {
                if attempt < config.max_retries && is_retryable(&e, config) {
                    last_error = Some(e);
                    continue;
                }
                return Err(e);
            }
        }
    }

    Err(last_error.unwrap_or(GenError::Other("backoff loop exited unexpectedly".into())))
}

/// Parse a `Retry-After` header value as integer seconds.
pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Send a prepared JSON request and return `(body, status)`, mapping
/// non-success statuses to [`GenError::Http`] with any `Retry-After` hint.
pub(crate) async fn send_json(request: reqwest::RequestBuilder) -> Result<(Value, u16)> {
    let resp = request.send().await?;
    let status = resp.status().as_u16();

    if !resp.status().is_success() {
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = resp.text().await.unwrap_or_default();
        return Err(GenError::Http {
            status,
            body,
            retry_after,
        });
    }

    let body: Value = resp.json().await?;
    Ok((body, status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Role;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "test-model".into(),
            system_prompt: None,
            history: vec![Message::new(Role::User, "hello")],
            config: GenConfig::default(),
        }
    }

    #[test]
    fn retryable_statuses() {
        let config = BackoffConfig::standard();
        for status in [429u16, 500, 502, 503, 504] {
            let err = GenError::Http {
                status,
                body: "transient".into(),
                retry_after: None,
            };
            assert!(is_retryable(&err, &config), "status {status}");
        }
    }

    #[test]
    fn client_errors_not_retried() {
        let config = BackoffConfig::standard();
        let err = GenError::Http {
            status: 400,
            body: "bad request".into(),
            retry_after: None,
        };
        assert!(!is_retryable(&err, &config));
        assert!(!is_retryable(&GenError::Other("boom".into()), &config));
    }

    #[test]
    fn parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("30"), Some(Duration::from_secs(30)));
        assert_eq!(parse_retry_after(" 5 "), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after("soon"), None);
    }

    #[tokio::test]
    async fn with_backoff_gives_up_after_budget() {
        let backend: Arc<dyn Backend> =
            Arc::new(MockBackend::failing("service unavailable"));
        let client = Client::new();

        let mut config = BackoffConfig::standard();
        config.max_retries = 2;
        config.initial_delay = Duration::from_millis(1);
        config.max_delay = Duration::from_millis(2);

        let result = with_backoff(&backend, &client, "http://unused", &request(), &config).await;
        assert!(matches!(result, Err(GenError::Http { status: 503, .. })));
    }

    #[tokio::test]
    async fn with_backoff_recovers_after_transient_failure() {
        let backend: Arc<dyn Backend> = Arc::new(MockBackend::new(vec![
            MockOutcome::Fail("blip".into()),
            MockOutcome::Reply("recovered".into()),
        ]));
        let client = Client::new();

        let mut config = BackoffConfig::standard();
        config.initial_delay = Duration::from_millis(1);
        config.max_delay = Duration::from_millis(2);

        let response =
            with_backoff(&backend, &client, "http://unused", &request(), &config)
                .await
                .unwrap();
        assert_eq!(response.text, "recovered");
    }
}
