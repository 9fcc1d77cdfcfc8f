use std::time::Duration;
use thiserror::Error;

use crate::extract::ExtractError;
use crate::schema::ValidationFailure;

/// Errors produced by the generator and its clients.
#[derive(Error, Debug)]
pub enum GenError {
    /// Low-level HTTP transport failure (connection refused, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON serialization failed at the serde level.
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error with status code, response body, and optional Retry-After hint.
    ///
    /// Returned by [`Backend`](crate::backend::Backend) implementations when
    /// the provider returns a non-success status code. The `retry_after` field
    /// is populated from the `Retry-After` response header when present.
    #[error("HTTP {status}: {body}")]
    Http {
        /// HTTP status code (e.g. 429, 500, 503).
        status: u16,
        /// Response body text.
        body: String,
        /// Parsed `Retry-After` header value, if present.
        retry_after: Option<Duration>,
    },

    /// The completion could not be turned into structured data, even after repair.
    #[error("could not extract structured data: {0}")]
    Extract(#[from] ExtractError),

    /// The completion parsed but did not conform to the target schema.
    #[error("schema validation failed: {0}")]
    Validation(#[from] ValidationFailure),

    /// The provider returned no usable text (e.g. a safety block).
    #[error("backend returned an empty or blocked completion: {0}")]
    EmptyCompletion(String),

    /// The retry budget ran out without producing a valid instance.
    #[error("failed to generate a valid {schema} after {attempts} attempts")]
    Exhausted {
        /// Name of the target schema.
        schema: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// Invalid configuration detected at build time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for GenError {
    fn from(err: anyhow::Error) -> Self {
        GenError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GenError>;
