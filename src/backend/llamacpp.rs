//! Backend for a local llama.cpp server.
//!
//! [`LlamaCppBackend`] targets the OpenAI-compatible `/v1/chat/completions`
//! endpoint exposed by `llama-server`. The internal three-role model maps
//! straight onto the provider's message array. Also works against any other
//! OpenAI-compatible server (vLLM, LM Studio, Ollama's `/v1/`).

use super::{send_json, Backend, CompletionRequest, CompletionResponse};
use crate::error::{GenError, Result};
use crate::history::Role;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

/// Default address of a locally running `llama-server`.
pub const LLAMACPP_BASE_URL: &str = "http://localhost:8080";

/// Backend for llama.cpp's OpenAI-compatible chat endpoint.
///
/// # Example
///
/// ```
/// use kgforge::backend::LlamaCppBackend;
///
/// let backend = LlamaCppBackend::new();
/// let authed = LlamaCppBackend::new().with_api_key("secret");
/// ```
#[derive(Debug, Clone, Default)]
pub struct LlamaCppBackend {
    api_key: Option<String>,
}

impl LlamaCppBackend {
    /// Create a backend without authentication.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an API key, sent as `Authorization: Bearer {key}`.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Build the OpenAI-style messages array: the system prompt first, then
    /// the history with the internal roles passed through.
    fn build_messages(request: &CompletionRequest) -> Vec<Value> {
        let mut messages = Vec::with_capacity(request.history.len() + 1);

        if let Some(ref system) = request.system_prompt {
            if !system.is_empty() {
                messages.push(json!({"role": "system", "content": system}));
            }
        }

        for message in &request.history {
            let role = match message.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            // The explicit system prompt wins over stray system messages.
            if message.role == Role::System && request.system_prompt.is_some() {
                continue;
            }
            messages.push(json!({"role": role, "content": message.content}));
        }

        messages
    }

    /// Build the `/v1/chat/completions` request body.
    fn build_body(request: &CompletionRequest) -> Value {
        json!({
            // llama-server serves one model; the field satisfies the schema.
            "model": request.model,
            "messages": Self::build_messages(request),
            "temperature": request.config.temperature,
            "max_tokens": request.config.max_tokens,
        })
    }

    /// Extract metadata from an OpenAI-format response.
    fn extract_metadata(body: &Value) -> Option<Value> {
        let mut meta = serde_json::Map::new();
        if let Some(v) = body.get("usage") {
            meta.insert("usage".into(), v.clone());
        }
        if let Some(v) = body.get("model") {
            meta.insert("model".into(), v.clone());
        }
        if meta.is_empty() {
            None
        } else {
            Some(Value::Object(meta))
        }
    }
}

#[async_trait]
impl Backend for LlamaCppBackend {
    async fn complete(
        &self,
        client: &Client,
        base_url: &str,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse> {
        let url = format!(
            "{}/v1/chat/completions",
            base_url.trim_end_matches('/')
        );
        let body = Self::build_body(request);

        let mut http_request = client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            http_request = http_request.header("Authorization", format!("Bearer {}", key));
        }

        let (json_resp, status) = send_json(http_request).await?;

        let text = json_resp
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                GenError::Other("unexpected response format from llama.cpp server".into())
            })?;

        Ok(CompletionResponse {
            text,
            status,
            metadata: Self::extract_metadata(&json_resp),
        })
    }

    fn name(&self) -> &'static str {
        "llamacpp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenConfig;
    use crate::history::Message;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "local-model".into(),
            system_prompt: Some("Output only JSON.".into()),
            history: vec![
                Message::new(Role::User, "Generate a person."),
                Message::new(Role::Assistant, "{}"),
                Message::new(Role::User, "Fill in the fields."),
            ],
            config: GenConfig::default(),
        }
    }

    #[test]
    fn three_role_array_preserved() {
        let body = LlamaCppBackend::build_body(&request());
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[3]["role"], "user");
    }

    #[test]
    fn system_prompt_overrides_history_system_messages() {
        let mut req = request();
        req.history
            .insert(0, Message::new(Role::System, "old instructions"));
        let body = LlamaCppBackend::build_body(&req);
        let messages = body["messages"].as_array().unwrap();
        let system_count = messages
            .iter()
            .filter(|m| m["role"] == "system")
            .count();
        assert_eq!(system_count, 1);
        assert_eq!(messages[0]["content"], "Output only JSON.");
    }

    #[test]
    fn no_system_prompt_no_system_message() {
        let mut req = request();
        req.system_prompt = None;
        let body = LlamaCppBackend::build_body(&req);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "user");
    }

    #[test]
    fn sampling_params_in_body() {
        let mut req = request();
        req.config = GenConfig::default()
            .with_temperature(0.1)
            .with_max_tokens(256);
        let body = LlamaCppBackend::build_body(&req);
        assert_eq!(body["temperature"], 0.1);
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["model"], "local-model");
    }
}
