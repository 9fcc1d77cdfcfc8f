//! Schema-driven generation with self-correction.
//!
//! [`Generator`] drives a completion backend to produce data conforming to a
//! caller-supplied schema. Each attempt runs call → extract → validate; on a
//! recoverable failure the raw completion and a corrective message are
//! appended to the conversation and the backend is called again with the
//! full history, up to a retry budget. Two failure classes get feedback:
//! unreadable output (parse) and readable-but-nonconforming output
//! (validation). Distinguishing them lets the model separate syntax repair
//! from semantic correction. Transport failures retry after a fixed pause
//! without growing the conversation.
//!
//! # Example
//!
//! ```no_run
//! use kgforge::{Generator, GenRequest};
//! use kgforge::backend::LlamaCppBackend;
//! use schemars::JsonSchema;
//! use serde::Deserialize;
//! use std::sync::Arc;
//!
//! #[derive(Debug, Deserialize, JsonSchema)]
//! struct Person { name: String, age: u32 }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let generator = Generator::builder("http://localhost:8080")
//!         .backend(Arc::new(LlamaCppBackend::new()))
//!         .build();
//!
//!     let request = GenRequest::new().with_guidance("A plausible librarian.");
//!     let person: Person = generator.generate(&request).await?;
//!     println!("{} is {}", person.name, person.age);
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::backend::{self, Backend, BackoffConfig, CompletionRequest, LlamaCppBackend};
use crate::config::GenConfig;
use crate::error::{GenError, Result};
use crate::extract;
use crate::history::{ConversationHistory, Role};
use crate::schema::SchemaDescriptor;

/// Default number of attempts before a generation call gives up.
pub const DEFAULT_RETRY_BUDGET: u32 = 8;

/// Pause between attempts after a transport failure.
const DEFAULT_TRANSPORT_PAUSE: Duration = Duration::from_secs(1);

const DEFAULT_SYSTEM_PROMPT: &str = "You are a strict JSON generation API.\n\
    Output ONLY valid JSON.\n\
    Do not output markdown blocks, comments, or conversational text.";

const DEFAULT_GUIDANCE: &str = "Generate a creative, random example.";

const PARSE_FEEDBACK: &str = "Output was unreadable JSON. Output ONLY valid JSON.";

/// Parameters for one generation call.
#[derive(Debug, Clone)]
pub struct GenRequest {
    /// Free-form guidance embedded in the initial instruction.
    pub guidance: Option<String>,

    /// Output-language constraint for string values.
    pub language: Option<String>,

    /// Maximum number of attempts. Default: [`DEFAULT_RETRY_BUDGET`].
    pub retry_budget: u32,

    /// Replaces the default system prompt when set.
    pub system_prompt: Option<String>,

    /// Sampling configuration.
    pub config: GenConfig,
}

impl Default for GenRequest {
    fn default() -> Self {
        Self {
            guidance: None,
            language: None,
            retry_budget: DEFAULT_RETRY_BUDGET,
            system_prompt: None,
            config: GenConfig::default(),
        }
    }
}

impl GenRequest {
    /// Create a request with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the free-form generation guidance.
    pub fn with_guidance(mut self, guidance: impl Into<String>) -> Self {
        self.guidance = Some(guidance.into());
        self
    }

    /// Constrain string values to a language.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Set the retry budget.
    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = budget;
        self
    }

    /// Override the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set the sampling configuration.
    pub fn with_config(mut self, config: GenConfig) -> Self {
        self.config = config;
        self
    }
}

/// Generates schema-conforming instances by instructing a completion backend.
///
/// One `Generator` can serve many concurrent calls: each call owns its own
/// conversation history and no state crosses call boundaries.
pub struct Generator {
    backend: Arc<dyn Backend>,
    client: reqwest::Client,
    base_url: String,
    model: String,
    backoff: BackoffConfig,
    transport_pause: Duration,
}

impl Generator {
    /// Create a new builder.
    pub fn builder(base_url: impl Into<String>) -> GeneratorBuilder {
        GeneratorBuilder {
            base_url: base_url.into(),
            backend: None,
            client: None,
            model: None,
            backoff: None,
            transport_pause: None,
            timeout: None,
        }
    }

    /// The backend in use.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Generate an instance of `T`.
    ///
    /// Drives the backend until an attempt yields text that extracts to a
    /// mapping and validates against `T`'s schema, or until the retry
    /// budget is exhausted. The returned error on exhaustion carries the
    /// schema name and attempt count; intermediate failures are logged but
    /// not surfaced.
    pub async fn generate<T>(&self, request: &GenRequest) -> Result<T>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let started = Instant::now();
        let descriptor = SchemaDescriptor::of::<T>();
        let system_prompt = request
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        let mut history = ConversationHistory::new();
        history.push(Role::User, initial_prompt(&descriptor, request));

        for attempt in 1..=request.retry_budget {
            info!(
                schema = descriptor.name(),
                attempt,
                budget = request.retry_budget,
                "generation attempt"
            );

            let completion = match self
                .call_backend(&system_prompt, &history, &request.config)
                .await
            {
                Ok(response) => response,
                Err(error) => {
                    // Transport-class failure: retry with the conversation
                    // untouched, after a fixed pause.
                    warn!(error = %error, "backend call failed");
                    tokio::time::sleep(self.transport_pause).await;
                    continue;
                }
            };

            match extract::extract_object(&completion.text) {
                Err(error) => {
                    warn!(error = %error, "completion was not readable JSON");
                    history.push(Role::Assistant, completion.text);
                    history.push(Role::User, PARSE_FEEDBACK);
                }
                Ok(candidate) => match descriptor.instantiate::<T>(&candidate) {
                    Ok(instance) => {
                        info!(
                            schema = descriptor.name(),
                            attempt,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "generation succeeded"
                        );
                        return Ok(instance);
                    }
                    Err(failure) => {
                        warn!(error = %failure, "completion failed schema validation");
                        let feedback = format!(
                            "JSON was valid, but the schema was not: {}. Fix the structure.",
                            failure
                        );
                        history.push(Role::Assistant, completion.text);
                        history.push(Role::User, feedback);
                    }
                },
            }
        }

        Err(GenError::Exhausted {
            schema: descriptor.name().to_string(),
            attempts: request.retry_budget,
        })
    }

    /// Call the backend with the current history snapshot, applying the
    /// provider-internal transient-retry policy.
    async fn call_backend(
        &self,
        system_prompt: &str,
        history: &ConversationHistory,
        config: &GenConfig,
    ) -> Result<crate::backend::CompletionResponse> {
        let request = CompletionRequest {
            model: self.model.clone(),
            system_prompt: Some(system_prompt.to_string()),
            history: history.messages().to_vec(),
            config: config.clone(),
        };
        backend::with_backoff(
            &self.backend,
            &self.client,
            &self.base_url,
            &request,
            &self.backoff,
        )
        .await
    }
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("base_url", &self.base_url)
            .field("backend", &self.backend.name())
            .field("model", &self.model)
            .field("backoff", &self.backoff)
            .finish()
    }
}

/// Compose the initial user instruction: the rendered schema, the guidance,
/// and the optional language constraint.
fn initial_prompt(descriptor: &SchemaDescriptor, request: &GenRequest) -> String {
    let guidance = request.guidance.as_deref().unwrap_or(DEFAULT_GUIDANCE);
    let language_line = request
        .language
        .as_deref()
        .map(|lang| format!("All string values must be in {}.", lang))
        .unwrap_or_default();

    format!(
        "Target JSON Schema:\n{}\n\nInstructions:\n1. {}\n2. {}\n3. Strict adherence to the schema is required.\n",
        descriptor.render(),
        guidance,
        language_line
    )
}

/// Builder for [`Generator`].
pub struct GeneratorBuilder {
    base_url: String,
    backend: Option<Arc<dyn Backend>>,
    client: Option<reqwest::Client>,
    model: Option<String>,
    backoff: Option<BackoffConfig>,
    transport_pause: Option<Duration>,
    timeout: Option<Duration>,
}

impl GeneratorBuilder {
    /// Set the backend. Default: [`LlamaCppBackend`].
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the HTTP client. If not set, a default client is created.
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the model identifier.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the provider-internal transient-retry policy.
    /// Default: [`BackoffConfig::none()`].
    pub fn backoff(mut self, config: BackoffConfig) -> Self {
        self.backoff = Some(config);
        self
    }

    /// Set the pause between attempts after a transport failure.
    /// Default: 1 second.
    pub fn transport_pause(mut self, pause: Duration) -> Self {
        self.transport_pause = Some(pause);
        self
    }

    /// Set the per-request timeout for the built-in HTTP client.
    /// Default: 60 seconds. Ignored when a custom client is supplied.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the generator.
    pub fn build(self) -> Generator {
        let timeout = self.timeout.unwrap_or(Duration::from_secs(60));
        let client = self.client.unwrap_or_else(|| {
            reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default()
        });
        Generator {
            backend: self.backend.unwrap_or_else(|| Arc::new(LlamaCppBackend::new())),
            client,
            base_url: self.base_url,
            model: self.model.unwrap_or_else(|| "default".to_string()),
            backoff: self.backoff.unwrap_or_else(BackoffConfig::none),
            transport_pause: self.transport_pause.unwrap_or(DEFAULT_TRANSPORT_PAUSE),
        }
    }
}
