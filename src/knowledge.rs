//! Knowledge-graph value types.
//!
//! These are the structured targets the generator produces from article
//! text, and the payloads the graph client ingests. They derive
//! `JsonSchema` so their schema can be rendered into the instruction
//! prompt, and `Deserialize` so validated completions construct them
//! directly.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Broad domain of a knowledge graph, for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum GraphCategory {
    Politics,
    Economy,
    Sports,
    Technology,
    Culture,
    Society,
    World,
    Science,
    Health,
    Business,
    Education,
    Ecology,
    Crime,
    Military,
    ShowBusiness,
}

/// A node in the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Entity {
    /// Unique identifier (e.g. "ivan petrov", "chief executive").
    pub name: String,

    /// Type: Person, Organization, Role, Country, Event, etc.
    pub label: String,

    /// A short summary of who this entity is in this context (e.g. "CEO of
    /// Tesla"). Helps distinguish between homonyms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A directed edge between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Relationship {
    /// Name of the source entity.
    pub source: String,

    /// Name of the target entity.
    pub target: String,

    /// Relationship type (e.g. HELD_POSITION, LOCATED_IN).
    #[serde(rename = "type")]
    pub rel_type: String,

    /// Detailed context of the relationship, including numbers, treaties,
    /// or locations.
    pub context: String,

    /// Specific date or timeframe of the relationship (YYYY-MM-DD).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// A source article feeding the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Article {
    /// Article title.
    pub name: String,

    /// Full article text.
    pub text: String,

    /// Publication date (YYYY-MM-DD).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// The knowledge graph extracted from one article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KnowledgeGraph {
    /// Broad domain for filtering.
    pub category: GraphCategory,

    /// The main subject of the graph (e.g. "2024 US elections").
    pub topic: String,

    /// Entities mentioned in the article.
    pub entities: Vec<Entity>,

    /// Relationships between those entities.
    pub relationships: Vec<Relationship>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaDescriptor;
    use serde_json::json;

    #[test]
    fn relationship_round_trips_type_field() {
        let rel: Relationship = serde_json::from_value(json!({
            "source": "a",
            "target": "b",
            "type": "WORKS_FOR",
            "context": "hired in 2020",
        }))
        .unwrap();
        assert_eq!(rel.rel_type, "WORKS_FOR");
        assert!(rel.date.is_none());

        let encoded = serde_json::to_value(&rel).unwrap();
        assert_eq!(encoded["type"], "WORKS_FOR");
        assert!(encoded.get("date").is_none());
    }

    #[test]
    fn knowledge_graph_deserializes_from_generated_shape() {
        let graph: KnowledgeGraph = serde_json::from_value(json!({
            "category": "Technology",
            "topic": "chip manufacturing",
            "entities": [
                {"name": "acme corp", "label": "Organization", "description": "chip maker"},
                {"name": "jo smith", "label": "Person"},
            ],
            "relationships": [
                {"source": "jo smith", "target": "acme corp", "type": "CEO_OF",
                 "context": "appointed 2023", "date": "2023-05-01"},
            ],
        }))
        .unwrap();
        assert_eq!(graph.category, GraphCategory::Technology);
        assert_eq!(graph.entities.len(), 2);
        assert_eq!(graph.relationships[0].rel_type, "CEO_OF");
    }

    #[test]
    fn schema_descriptor_renders_graph_fields() {
        let descriptor = SchemaDescriptor::of::<KnowledgeGraph>();
        assert_eq!(descriptor.name(), "KnowledgeGraph");
        let rendered = descriptor.render();
        assert!(rendered.contains("entities"));
        assert!(rendered.contains("relationships"));
        assert!(rendered.contains("topic"));
    }
}
