//! Backend for the Google Gemini REST API.
//!
//! [`GeminiBackend`] translates normalized [`CompletionRequest`]s into
//! `models/{model}:generateContent` calls. Gemini's role conventions differ
//! from the internal three-role model: the system instruction travels in a
//! separate `systemInstruction` field (system messages in the history are
//! skipped), and the assistant role is named `"model"`.

use super::{send_json, Backend, CompletionRequest, CompletionResponse};
use crate::error::{GenError, Result};
use crate::history::Role;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

/// Default public endpoint for the Gemini API.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Backend for Google's Gemini API.
///
/// # Example
///
/// ```
/// use kgforge::backend::GeminiBackend;
///
/// let backend = GeminiBackend::new("AIza...");
/// ```
#[derive(Clone)]
pub struct GeminiBackend {
    api_key: String,
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiBackend")
            .field(
                "api_key",
                &if self.api_key.len() > 6 {
                    format!("{}***", &self.api_key[..6])
                } else {
                    "***".to_string()
                },
            )
            .finish()
    }
}

impl GeminiBackend {
    /// Create a backend with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }

    /// Build the `contents` array from the history, mapping roles to
    /// Gemini's conventions.
    fn build_contents(request: &CompletionRequest) -> Vec<Value> {
        request
            .history
            .iter()
            .filter(|message| message.role != Role::System)
            .map(|message| {
                let role = match message.role {
                    Role::Assistant => "model",
                    _ => "user",
                };
                json!({"role": role, "parts": [{"text": message.content}]})
            })
            .collect()
    }

    /// Build the request body for `generateContent`.
    fn build_body(request: &CompletionRequest) -> Value {
        let mut generation_config = json!({
            "temperature": request.config.temperature,
            "maxOutputTokens": request.config.max_tokens,
            "topP": 0.9,
            "topK": 40,
        });
        if let Some(ref custom) = request.config.options {
            if let (Some(base), Some(extra)) = (generation_config.as_object_mut(), custom.as_object())
            {
                for (k, v) in extra {
                    base.insert(k.clone(), v.clone());
                }
            }
        }

        let mut body = json!({
            "contents": Self::build_contents(request),
            "generationConfig": generation_config,
        });
        if let Some(ref system) = request.system_prompt {
            if !system.is_empty() {
                body["systemInstruction"] = json!({"parts": [{"text": system}]});
            }
        }
        body
    }

    /// Extract the completion text, treating empty candidates (safety
    /// blocks, empty parts) as a provider rejection.
    fn extract_text(body: &Value) -> Result<String> {
        let text = body
            .get("candidates")
            .and_then(|c| c.get(0))
            .and_then(|c| c.pointer("/content/parts/0/text"))
            .and_then(|t| t.as_str());

        match text {
            Some(t) if !t.is_empty() => Ok(t.to_string()),
            _ => {
                let feedback = body
                    .get("promptFeedback")
                    .map(|f| f.to_string())
                    .unwrap_or_else(|| "no candidates returned".to_string());
                Err(GenError::EmptyCompletion(feedback))
            }
        }
    }

    /// Extract metadata fields from a Gemini response.
    fn extract_metadata(body: &Value) -> Option<Value> {
        let mut meta = serde_json::Map::new();
        if let Some(v) = body.get("usageMetadata") {
            meta.insert("usage".into(), v.clone());
        }
        if let Some(v) = body.get("modelVersion") {
            meta.insert("model".into(), v.clone());
        }
        if let Some(v) = body.pointer("/candidates/0/finishReason") {
            meta.insert("finish_reason".into(), v.clone());
        }
        if meta.is_empty() {
            None
        } else {
            Some(Value::Object(meta))
        }
    }
}

#[async_trait]
impl Backend for GeminiBackend {
    async fn complete(
        &self,
        client: &Client,
        base_url: &str,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            base_url.trim_end_matches('/'),
            request.model
        );
        let body = Self::build_body(request);

        let (json_resp, status) = send_json(
            client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body),
        )
        .await?;

        Ok(CompletionResponse {
            text: Self::extract_text(&json_resp)?,
            status,
            metadata: Self::extract_metadata(&json_resp),
        })
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenConfig;
    use crate::history::Message;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "gemini-1.5-flash".into(),
            system_prompt: Some("Output only JSON.".into()),
            history: vec![
                Message::new(Role::User, "Generate a person."),
                Message::new(Role::Assistant, "{\"name\": \"Ann\"}"),
                Message::new(Role::User, "Add the age field."),
            ],
            config: GenConfig::default(),
        }
    }

    #[test]
    fn assistant_maps_to_model_role() {
        let body = GeminiBackend::build_body(&request());
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["role"], "user");
        assert_eq!(contents[1]["parts"][0]["text"], "{\"name\": \"Ann\"}");
    }

    #[test]
    fn system_prompt_becomes_instruction_field() {
        let body = GeminiBackend::build_body(&request());
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "Output only JSON."
        );
    }

    #[test]
    fn system_messages_skipped_in_contents() {
        let mut req = request();
        req.history
            .insert(0, Message::new(Role::System, "stray system message"));
        let body = GeminiBackend::build_body(&req);
        assert_eq!(body["contents"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn generation_config_carries_sampling_params() {
        let mut req = request();
        req.config = GenConfig::default()
            .with_temperature(0.2)
            .with_max_tokens(512);
        let body = GeminiBackend::build_body(&req);
        assert_eq!(body["generationConfig"]["temperature"], 0.2);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 512);
        assert_eq!(body["generationConfig"]["topP"], 0.9);
        assert_eq!(body["generationConfig"]["topK"], 40);
    }

    #[test]
    fn custom_options_merged() {
        let mut req = request();
        req.config = GenConfig::default().with_options(serde_json::json!({"topK": 10}));
        let body = GeminiBackend::build_body(&req);
        assert_eq!(body["generationConfig"]["topK"], 10);
        assert_eq!(body["generationConfig"]["topP"], 0.9);
    }

    #[test]
    fn extract_text_from_candidates() {
        let body = serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "{\"a\": 1}"}]}}]
        });
        assert_eq!(GeminiBackend::extract_text(&body).unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn safety_block_is_rejection() {
        let body = serde_json::json!({
            "candidates": [],
            "promptFeedback": {"blockReason": "SAFETY"}
        });
        let err = GeminiBackend::extract_text(&body).unwrap_err();
        assert!(matches!(err, GenError::EmptyCompletion(_)));
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn metadata_collected() {
        let body = serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "x"}]}, "finishReason": "STOP"}],
            "usageMetadata": {"totalTokenCount": 42},
            "modelVersion": "gemini-1.5-flash-002"
        });
        let meta = GeminiBackend::extract_metadata(&body).unwrap();
        assert_eq!(meta["usage"]["totalTokenCount"], 42);
        assert_eq!(meta["finish_reason"], "STOP");
    }

    #[test]
    fn debug_redacts_api_key() {
        let backend = GeminiBackend::new("AIzaSyVerySecretKey");
        let rendered = format!("{:?}", backend);
        assert!(!rendered.contains("VerySecretKey"));
    }
}
