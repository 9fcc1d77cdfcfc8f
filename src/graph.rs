//! HTTP client for a Neo4j graph database.
//!
//! CRUD wrapper over Neo4j's transactional Cypher endpoint
//! (`POST /db/{database}/tx/commit`), plus the statement batch that ingests
//! one article's knowledge graph: merge the topic and article, merge
//! entities under sanitized dynamic labels, create relationships with
//! sanitized dynamic types.

use md5::{Digest, Md5};
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{GenError, Result};
use crate::knowledge::{Article, KnowledgeGraph};

/// One parameterized Cypher statement.
#[derive(Debug, Clone, Serialize)]
pub struct CypherStatement {
    /// The Cypher query text.
    pub statement: String,
    /// Query parameters.
    pub parameters: Value,
}

impl CypherStatement {
    /// Create a statement with parameters.
    pub fn new(statement: impl Into<String>, parameters: Value) -> Self {
        Self {
            statement: statement.into(),
            parameters,
        }
    }
}

/// Client for Neo4j's HTTP transactional endpoint.
pub struct Neo4jClient {
    client: Client,
    base_url: String,
    user: String,
    password: String,
    database: String,
}

impl Neo4jClient {
    /// Create a client for the server at `base_url`
    /// (e.g. `http://localhost:7474`) using basic auth and the default
    /// `neo4j` database.
    pub fn new(
        base_url: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            user: user.into(),
            password: password.into(),
            database: "neo4j".to_string(),
        }
    }

    /// Target a different database.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Run a single Cypher statement.
    pub async fn run(&self, statement: &str, parameters: Value) -> Result<Value> {
        self.run_batch(&[CypherStatement::new(statement, parameters)])
            .await
    }

    /// Run a batch of statements in one transaction.
    pub async fn run_batch(&self, statements: &[CypherStatement]) -> Result<Value> {
        let url = format!(
            "{}/db/{}/tx/commit",
            self.base_url.trim_end_matches('/'),
            self.database
        );
        debug!(count = statements.len(), "executing cypher batch");

        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&json!({"statements": statements}))
            .send()
            .await?
            .error_for_status()?;

        let body: Value = resp.json().await?;
        if let Some(errors) = body.get("errors").and_then(|e| e.as_array()) {
            if let Some(first) = errors.first() {
                return Err(GenError::Other(format!(
                    "cypher execution failed: {}",
                    first
                )));
            }
        }
        Ok(body)
    }

    /// Create the uniqueness constraint lookups depend on. Run once.
    pub async fn ensure_constraints(&self) -> Result<()> {
        self.run(
            "CREATE CONSTRAINT IF NOT EXISTS FOR (n:Entity) REQUIRE n.name IS UNIQUE",
            json!({}),
        )
        .await?;
        Ok(())
    }

    /// Ingest one article's knowledge graph.
    pub async fn ingest_article(&self, article: &Article, graph: &KnowledgeGraph) -> Result<()> {
        let statements = article_statements(article, graph);
        self.run_batch(&statements).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Neo4jClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Neo4jClient")
            .field("base_url", &self.base_url)
            .field("user", &self.user)
            .field("database", &self.database)
            .finish()
    }
}

/// Stable id for an article, derived from its title and date.
pub fn article_id(article: &Article) -> String {
    let mut hasher = Md5::new();
    hasher.update(article.name.as_bytes());
    hasher.update(b"_");
    hasher.update(article.date.as_deref().unwrap_or_default().as_bytes());
    hex::encode(hasher.finalize())
}

/// Sanitize free text into a Cypher label or relationship type:
/// non-alphanumerics become `_`, runs collapse, uppercased. Falls back to
/// `RELATED_TO` for empty input. Keeps model-supplied text out of the query
/// structure.
pub fn sanitize_identifier(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_underscore = true; // trims leading underscores
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            out.extend(ch.to_uppercase());
            last_was_underscore = false;
        } else if !last_was_underscore {
            out.push('_');
            last_was_underscore = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    if out.is_empty() {
        "RELATED_TO".to_string()
    } else {
        out
    }
}

/// Build the statement batch that ingests one article's graph.
///
/// 1. Merge the topic and the article, link `(article)-[:COVERS]->(topic)`.
/// 2. Merge each entity under `:Entity:<SANITIZED_LABEL>`, backfilling the
///    description only when the stored one is empty, and link
///    `(article)-[:MENTIONS]->(entity)`.
/// 3. Create each relationship with its sanitized dynamic type, stamping
///    the article and topic onto the edge for context.
pub fn article_statements(article: &Article, graph: &KnowledgeGraph) -> Vec<CypherStatement> {
    let id = article_id(article);
    let mut statements = Vec::with_capacity(1 + graph.entities.len() + graph.relationships.len());

    statements.push(CypherStatement::new(
        "MERGE (t:Topic {name: $topic_name}) \
         ON CREATE SET t.category = $category, t.created_at = datetime() \
         MERGE (a:Article {id: $article_id}) \
         ON CREATE SET a.name = $article_title, a.date = $article_date, \
             a.text_preview = $article_text_preview, a.created_at = datetime() \
         MERGE (a)-[:COVERS]->(t)",
        json!({
            "topic_name": graph.topic,
            "category": format!("{:?}", graph.category),
            "article_id": id,
            "article_title": article.name,
            "article_date": article.date,
            "article_text_preview": article.text,
        }),
    ));

    for entity in &graph.entities {
        let label = sanitize_identifier(&entity.label);
        statements.push(CypherStatement::new(
            format!(
                "MERGE (e:Entity:{} {{name: $name}}) \
                 ON CREATE SET e.description = $description, e.original_label = $label_raw \
                 ON MATCH SET e.description = CASE \
                     WHEN (e.description IS NULL OR e.description = '') \
                          AND ($description IS NOT NULL AND $description <> '') \
                     THEN $description ELSE e.description END \
                 WITH e MATCH (a:Article {{id: $article_id}}) \
                 MERGE (a)-[:MENTIONS]->(e)",
                label
            ),
            json!({
                "name": entity.name,
                "description": entity.description,
                "label_raw": entity.label,
                "article_id": id,
            }),
        ));
    }

    for rel in &graph.relationships {
        let rel_type = sanitize_identifier(&rel.rel_type);
        // CREATE rather than MERGE: the same fact can recur across articles.
        statements.push(CypherStatement::new(
            format!(
                "MATCH (source:Entity {{name: $source_name}}) \
                 MATCH (target:Entity {{name: $target_name}}) \
                 MATCH (a:Article {{id: $article_id}}) \
                 MATCH (t:Topic {{name: $topic_name}}) \
                 CREATE (source)-[r:{}]->(target) \
                 SET r.context = $context, r.date = $date, \
                     r.article_id = a.id, r.topic_name = t.name, \
                     r.created_at = datetime()",
                rel_type
            ),
            json!({
                "source_name": rel.source,
                "target_name": rel.target,
                "article_id": id,
                "topic_name": graph.topic,
                "context": rel.context,
                "date": rel.date,
            }),
        ));
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{Entity, GraphCategory, Relationship};

    fn article() -> Article {
        Article {
            name: "Chips ahead".into(),
            text: "Acme unveiled a new fab.".into(),
            date: Some("2024-03-01".into()),
        }
    }

    fn graph() -> KnowledgeGraph {
        KnowledgeGraph {
            category: GraphCategory::Technology,
            topic: "chip manufacturing".into(),
            entities: vec![
                Entity {
                    name: "acme corp".into(),
                    label: "Organization".into(),
                    description: Some("chip maker".into()),
                },
                Entity {
                    name: "jo smith".into(),
                    label: "Person".into(),
                    description: None,
                },
            ],
            relationships: vec![Relationship {
                source: "jo smith".into(),
                target: "acme corp".into(),
                rel_type: "CEO of Company".into(),
                context: "appointed to lead the fab expansion".into(),
                date: Some("2023-05-01".into()),
            }],
        }
    }

    #[test]
    fn sanitize_identifier_rules() {
        assert_eq!(sanitize_identifier("CEO of Company"), "CEO_OF_COMPANY");
        assert_eq!(sanitize_identifier("located-in!"), "LOCATED_IN");
        assert_eq!(sanitize_identifier("__weird__gaps__"), "WEIRD_GAPS");
        assert_eq!(sanitize_identifier(""), "RELATED_TO");
        assert_eq!(sanitize_identifier("###"), "RELATED_TO");
    }

    #[test]
    fn article_id_is_stable_and_date_sensitive() {
        let a = article();
        assert_eq!(article_id(&a), article_id(&a));

        let mut later = article();
        later.date = Some("2024-04-01".into());
        assert_ne!(article_id(&a), article_id(&later));
    }

    #[test]
    fn statement_batch_covers_topic_entities_relationships() {
        let statements = article_statements(&article(), &graph());
        // 1 topic/article + 2 entities + 1 relationship
        assert_eq!(statements.len(), 4);

        assert!(statements[0].statement.contains("MERGE (t:Topic"));
        assert_eq!(statements[0].parameters["topic_name"], "chip manufacturing");
        assert_eq!(statements[0].parameters["category"], "Technology");

        assert!(statements[1].statement.contains(":Entity:ORGANIZATION"));
        assert_eq!(statements[1].parameters["name"], "acme corp");

        assert!(statements[3].statement.contains("CREATE (source)-[r:CEO_OF_COMPANY]->(target)"));
        assert_eq!(statements[3].parameters["source_name"], "jo smith");
        assert_eq!(statements[3].parameters["date"], "2023-05-01");
    }

    #[test]
    fn sanitized_label_keeps_injection_out_of_query() {
        let mut g = graph();
        g.entities[0].label = "Org) DETACH DELETE n //".into();
        let statements = article_statements(&article(), &g);
        assert!(statements[1].statement.contains(":Entity:ORG_DETACH_DELETE_N"));
        assert!(!statements[1].statement.contains("//"));
        // The raw label still travels as a parameter.
        assert_eq!(
            statements[1].parameters["label_raw"],
            "Org) DETACH DELETE n //"
        );
    }
}
