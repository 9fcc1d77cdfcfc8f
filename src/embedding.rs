//! HTTP client for a llama.cpp embedding server.
//!
//! Thin wrapper over `llama-server --embedding`: `POST {base}/embedding`
//! with the text to embed, returning the vector. The server nests the
//! vector as `[{"embedding": [[...]]}]`.

use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{GenError, Result};

/// Client for a llama.cpp embedding endpoint.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    client: Client,
    base_url: String,
}

impl EmbeddingClient {
    /// Create a client for the server at `base_url`
    /// (e.g. `http://localhost:8080`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Create a client reusing an existing HTTP client.
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// The configured server address.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Embed a single text, returning its vector.
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        debug!(chars = text.len(), "embedding text");
        let url = format!("{}/embedding", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .json(&json!({"content": text}))
            .send()
            .await?
            .error_for_status()?;

        let body: Value = resp.json().await?;
        parse_embedding(&body)
            .ok_or_else(|| GenError::Other("unexpected embedding response shape".into()))
    }

    /// Embed several texts sequentially.
    pub async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed_text(text).await?);
        }
        Ok(vectors)
    }
}

/// Pull the vector out of the server's nested response shape.
fn parse_embedding(body: &Value) -> Option<Vec<f32>> {
    let nested = body.pointer("/0/embedding/0")?.as_array()?;
    nested
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}
