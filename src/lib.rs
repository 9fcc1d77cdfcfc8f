//! # kgforge
//!
//! Schema-driven structured generation with self-correcting retries, plus
//! the I/O clients around it: embeddings, a vector store, and a graph
//! database.
//!
//! The heart of the crate is the [`Generator`]: it instructs a completion
//! backend to produce JSON conforming to a target type's schema, tolerates
//! malformed or nonconforming output by repairing it, feeding the errors
//! back into the conversation, and retrying within a budget.
//!
//! ## Core Concepts
//!
//! - **[`Generator`]** — the retry/reflexion controller. Builds the
//!   instruction prompt from a type's schema, drives the
//!   call→extract→validate cycle, and returns a typed instance.
//! - **[`Backend`](backend::Backend)** — object-safe capability trait over
//!   completion providers. [`GeminiBackend`](backend::GeminiBackend) and
//!   [`LlamaCppBackend`](backend::LlamaCppBackend) map the internal
//!   three-role conversation onto their providers' conventions;
//!   [`MockBackend`](backend::MockBackend) scripts outcomes for tests.
//! - **[`extract`]** — turns messy completion text (fences, near-JSON,
//!   truncation) into structured values.
//! - **[`SchemaDescriptor`]** — renders a type's JSON Schema into the
//!   prompt and validates candidate values, collecting field errors.
//!
//! ## Quick Start
//!
//! ```no_run
//! use kgforge::{GenRequest, Generator};
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
//!     let person: Person = generator
//!         .generate(&GenRequest::new().with_guidance("A plausible librarian."))
//!         .await?;
//!     println!("{} is {}", person.name, person.age);
//!     Ok(())
//! }
//! ```
//!
//! ## Knowledge-graph pipeline
//!
//! The [`knowledge`] types tie the pieces together: generate a
//! [`KnowledgeGraph`](knowledge::KnowledgeGraph) from article text, then
//! ingest it with [`Neo4jClient`](graph::Neo4jClient). Chunk storage and
//! similarity lookups go through [`ChromaClient`](vector_store::ChromaClient)
//! with vectors from [`EmbeddingClient`](embedding::EmbeddingClient).

pub mod backend;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generator;
pub mod graph;
pub mod history;
pub mod knowledge;
pub mod logging;
pub mod schema;
pub mod vector_store;

pub use config::GenConfig;
pub use error::{GenError, Result};
pub use generator::{GenRequest, Generator, GeneratorBuilder, DEFAULT_RETRY_BUDGET};
pub use history::{ConversationHistory, Message, Role};
pub use schema::{FieldError, SchemaDescriptor, ValidationFailure};
