//! HTTP client for a Chroma vector store.
//!
//! Plain CRUD wrapper over Chroma's REST API: store text chunks with their
//! vectors, query by similarity, delete, count. Embeddings come from an
//! [`EmbeddingClient`]; no search logic lives here.

use reqwest::Client;
use serde_json::{json, Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::embedding::EmbeddingClient;
use crate::error::{GenError, Result};

/// Default collection for stored chunks.
pub const DEFAULT_COLLECTION: &str = "rag_collection";

/// A search hit: one stored chunk with its distance to the query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// The chunk's id.
    pub id: String,
    /// The chunk text.
    pub text: String,
    /// Metadata stored with the chunk.
    pub metadata: Option<Map<String, Value>>,
    /// Cosine distance to the query (0 = identical).
    pub distance: f64,
}

/// Client for one Chroma collection.
pub struct ChromaClient {
    client: Client,
    base_url: String,
    collection_id: String,
    collection_name: String,
    embedder: EmbeddingClient,
}

impl ChromaClient {
    /// Connect to the Chroma server and get-or-create the collection.
    pub async fn connect(
        base_url: impl Into<String>,
        collection_name: &str,
        embedder: EmbeddingClient,
    ) -> Result<Self> {
        let base_url = base_url.into();
        let client = Client::new();
        let name = sanitize_collection_name(collection_name);

        let resp = client
            .post(format!(
                "{}/api/v1/collections",
                base_url.trim_end_matches('/')
            ))
            .json(&json!({"name": name, "get_or_create": true}))
            .send()
            .await?
            .error_for_status()?;
        let body: Value = resp.json().await?;
        let collection_id = body
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GenError::Other("collection response carried no id".into()))?
            .to_string();

        debug!(collection = %name, id = %collection_id, "connected to collection");
        Ok(Self {
            client,
            base_url,
            collection_id,
            collection_name: name,
            embedder,
        })
    }

    /// The sanitized collection name in use.
    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!(
            "{}/api/v1/collections/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.collection_id,
            suffix
        )
    }

    async fn post(&self, suffix: &str, body: &Value) -> Result<Value> {
        let resp = self
            .client
            .post(self.collection_url(suffix))
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    /// Embed and store a single chunk, returning its id.
    pub async fn store_chunk(
        &self,
        text: &str,
        metadata: Option<Map<String, Value>>,
        chunk_id: Option<String>,
    ) -> Result<String> {
        let vector = self.embedder.embed_text(text).await?;
        self.store_chunk_with_vector(text, &vector, metadata, chunk_id)
            .await
    }

    /// Store a single chunk with a precomputed vector, returning its id.
    pub async fn store_chunk_with_vector(
        &self,
        text: &str,
        vector: &[f32],
        metadata: Option<Map<String, Value>>,
        chunk_id: Option<String>,
    ) -> Result<String> {
        let id = chunk_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        // Chroma rejects empty metadata objects; send null instead.
        let metadata_param = match metadata {
            Some(m) if !m.is_empty() => Value::Object(m),
            _ => Value::Null,
        };

        self.post(
            "add",
            &json!({
                "ids": [id],
                "embeddings": [vector],
                "documents": [text],
                "metadatas": [metadata_param],
            }),
        )
        .await?;

        debug!(id = %id, chars = text.len(), "stored chunk");
        Ok(id)
    }

    /// Store a batch of chunks with precomputed vectors, returning the
    /// generated ids.
    pub async fn store_chunks_with_vectors(
        &self,
        chunks: &[String],
        vectors: &[Vec<f32>],
        metadatas: &[Map<String, Value>],
    ) -> Result<Vec<String>> {
        if chunks.len() != vectors.len() {
            return Err(GenError::InvalidConfig(
                "chunks and vectors must have equal length".into(),
            ));
        }

        let ids: Vec<String> = chunks.iter().map(|_| Uuid::new_v4().to_string()).collect();
        let metadata_params: Vec<Value> = chunks
            .iter()
            .enumerate()
            .map(|(i, _)| match metadatas.get(i) {
                Some(m) if !m.is_empty() => Value::Object(m.clone()),
                _ => Value::Null,
            })
            .collect();

        self.post(
            "add",
            &json!({
                "ids": ids,
                "embeddings": vectors,
                "documents": chunks,
                "metadatas": metadata_params,
            }),
        )
        .await?;

        Ok(ids)
    }

    /// Search the collection for the chunks nearest to `query_text`.
    pub async fn search_chunks(&self, query_text: &str, top_k: usize) -> Result<Vec<ScoredChunk>> {
        let query_embedding = self.embedder.embed_text(query_text).await?;
        let body = self
            .post(
                "query",
                &json!({
                    "query_embeddings": [query_embedding],
                    "n_results": top_k,
                    "include": ["documents", "metadatas", "distances"],
                }),
            )
            .await?;
        Ok(parse_query_response(&body))
    }

    /// Whether a chunk near-identical to `text` is already stored.
    ///
    /// Similarity is `1 - distance`; the default threshold of 0.95 catches
    /// near-exact duplicates.
    pub async fn chunk_exists(&self, text: &str, similarity_threshold: f64) -> Result<bool> {
        let query_embedding = self.embedder.embed_text(text).await?;
        let body = self
            .post(
                "query",
                &json!({
                    "query_embeddings": [query_embedding],
                    "n_results": 1,
                    "include": ["distances"],
                }),
            )
            .await?;

        let distance = body.pointer("/distances/0/0").and_then(|d| d.as_f64());
        match distance {
            Some(d) => {
                let similarity = 1.0 - d;
                debug!(distance = d, similarity, threshold = similarity_threshold, "similarity check");
                Ok(similarity >= similarity_threshold)
            }
            None => Ok(false),
        }
    }

    /// Delete chunks by id.
    pub async fn delete_chunks(&self, chunk_ids: &[String]) -> Result<()> {
        self.post("delete", &json!({"ids": chunk_ids})).await?;
        Ok(())
    }

    /// Delete every chunk whose metadata ties it to `doc_id`.
    pub async fn delete_document(&self, doc_id: &str) -> Result<()> {
        self.post("delete", &json!({"where": {"doc_id": doc_id}}))
            .await?;
        Ok(())
    }

    /// Number of chunks in the collection.
    pub async fn count(&self) -> Result<u64> {
        let resp = self
            .client
            .get(self.collection_url("count"))
            .send()
            .await?
            .error_for_status()?;
        let body: Value = resp.json().await?;
        body.as_u64()
            .ok_or_else(|| GenError::Other("count response was not a number".into()))
    }
}

impl std::fmt::Debug for ChromaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromaClient")
            .field("base_url", &self.base_url)
            .field("collection", &self.collection_name)
            .finish()
    }
}

/// Sanitize a collection name for Chroma: alphanumerics, `_`, `-`, between
/// 3 and 63 characters.
fn sanitize_collection_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.len() > 63 {
        sanitized[..63].to_string()
    } else if sanitized.len() < 3 {
        format!("{:_<3}", sanitized)
    } else {
        sanitized
    }
}

/// Flatten Chroma's column-oriented query response into scored chunks.
fn parse_query_response(body: &Value) -> Vec<ScoredChunk> {
    let ids = match body.pointer("/ids/0").and_then(|v| v.as_array()) {
        Some(ids) => ids,
        None => return Vec::new(),
    };

    ids.iter()
        .enumerate()
        .filter_map(|(i, id)| {
            let id = id.as_str()?.to_string();
            let text = body
                .pointer(&format!("/documents/0/{}", i))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let metadata = body
                .pointer(&format!("/metadatas/0/{}", i))
                .and_then(|v| v.as_object())
                .cloned();
            let distance = body
                .pointer(&format!("/distances/0/{}", i))
                .and_then(|v| v.as_f64())
                .unwrap_or(f64::MAX);
            Some(ScoredChunk {
                id,
                text,
                metadata,
                distance,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sanitize_replaces_and_pads() {
        assert_eq!(sanitize_collection_name("my collection!"), "my_collection_");
        assert_eq!(sanitize_collection_name("ok"), "ok_");
        assert_eq!(sanitize_collection_name("fine-name_3"), "fine-name_3");
        assert_eq!(sanitize_collection_name(&"x".repeat(80)).len(), 63);
    }

    #[test]
    fn query_response_flattens_columns() {
        let body = json!({
            "ids": [["a", "b"]],
            "documents": [["first text", "second text"]],
            "metadatas": [[{"doc_id": "d1"}, null]],
            "distances": [[0.03, 0.4]],
        });
        let chunks = parse_query_response(&body);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].id, "a");
        assert_eq!(chunks[0].text, "first text");
        assert_eq!(chunks[0].metadata.as_ref().unwrap()["doc_id"], "d1");
        assert!(chunks[1].metadata.is_none());
        assert!((chunks[1].distance - 0.4).abs() < 1e-9);
    }

    #[test]
    fn empty_query_response_yields_no_chunks() {
        assert!(parse_query_response(&json!({})).is_empty());
        assert!(parse_query_response(&json!({"ids": [[]]})).is_empty());
    }
}
