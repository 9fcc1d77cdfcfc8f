//! Schema descriptors and instance validation.
//!
//! A [`SchemaDescriptor`] captures the JSON Schema of a target type. It is
//! used two ways: rendered into the instruction prompt so the backend knows
//! what shape to produce, and consulted when validating a candidate mapping
//! before constructing the typed instance.
//!
//! Validation is eager: every top-level violation (missing required field,
//! wrong type, enum mismatch) is collected into one [`ValidationFailure`]
//! rather than surfaced one at a time, so a single corrective feedback
//! message can list them all.

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// A single field-level schema violation.
#[derive(Debug, Clone)]
pub struct FieldError {
    /// Name of the offending field. Empty when the error is not tied to one
    /// field (e.g. a nested deserialization failure).
    pub field: String,
    /// What went wrong.
    pub problem: String,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.field.is_empty() {
            write!(f, "{}", self.problem)
        } else {
            write!(f, "{}: {}", self.field, self.problem)
        }
    }
}

/// All schema violations found in one candidate value.
#[derive(Debug, Clone)]
pub struct ValidationFailure {
    /// The collected field-level violations.
    pub errors: Vec<FieldError>,
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", rendered.join("; "))
    }
}

impl std::error::Error for ValidationFailure {}

/// Machine-readable description of a target type's shape.
///
/// Immutable for the duration of one generation call.
#[derive(Debug, Clone)]
pub struct SchemaDescriptor {
    name: String,
    schema: Value,
}

impl SchemaDescriptor {
    /// Build the descriptor for a target type.
    pub fn of<T: JsonSchema>() -> Self {
        Self {
            name: T::schema_name().into_owned(),
            schema: schemars::schema_for!(T).to_value(),
        }
    }

    /// The target type's schema name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw JSON Schema document.
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Pretty-printed schema document, for embedding in an instruction prompt.
    pub fn render(&self) -> String {
        serde_json::to_string_pretty(&self.schema).unwrap_or_else(|_| self.schema.to_string())
    }

    /// Attempt to construct a typed instance from a candidate mapping.
    ///
    /// Top-level violations (missing required fields, type mismatches, enum
    /// mismatches) are collected against the schema document first; if any
    /// are found they are all reported together. Otherwise the instance is
    /// built with serde, and a residual deserialization error (e.g. in a
    /// nested object) is reported as a single unnamed-field error.
    pub fn instantiate<T: DeserializeOwned>(
        &self,
        candidate: &Map<String, Value>,
    ) -> Result<T, ValidationFailure> {
        let errors = self.check_fields(candidate);
        if !errors.is_empty() {
            return Err(ValidationFailure { errors });
        }

        serde_json::from_value(Value::Object(candidate.clone())).map_err(|e| ValidationFailure {
            errors: vec![FieldError {
                field: String::new(),
                problem: e.to_string(),
            }],
        })
    }

    /// Collect top-level field violations of `candidate` against the schema.
    fn check_fields(&self, candidate: &Map<String, Value>) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if let Some(required) = self.schema.get("required").and_then(|r| r.as_array()) {
            for field in required.iter().filter_map(|f| f.as_str()) {
                if !candidate.contains_key(field) {
                    errors.push(FieldError {
                        field: field.to_string(),
                        problem: "missing required field".to_string(),
                    });
                }
            }
        }

        let properties = match self.schema.get("properties").and_then(|p| p.as_object()) {
            Some(props) => props,
            None => return errors,
        };

        for (field, prop_schema) in properties {
            let value = match candidate.get(field) {
                Some(v) => v,
                None => continue, // absence is handled by the required check
            };
            let prop_schema = self.resolve_ref(prop_schema);

            if let Some(problem) = type_mismatch(prop_schema, value) {
                errors.push(FieldError {
                    field: field.clone(),
                    problem,
                });
                continue;
            }

            if let Some(allowed) = prop_schema.get("enum").and_then(|e| e.as_array()) {
                if !allowed.contains(value) {
                    errors.push(FieldError {
                        field: field.clone(),
                        problem: format!("{} is not one of the allowed values {}", value, Value::Array(allowed.clone())),
                    });
                }
            }
        }

        errors
    }

    /// Follow a local `$ref` into the schema's `$defs`, one level deep.
    fn resolve_ref<'a>(&'a self, prop_schema: &'a Value) -> &'a Value {
        let reference = match prop_schema.get("$ref").and_then(|r| r.as_str()) {
            Some(r) => r,
            None => return prop_schema,
        };
        reference
            .strip_prefix("#/$defs/")
            .and_then(|name| self.schema.get("$defs").and_then(|d| d.get(name)))
            .unwrap_or(prop_schema)
    }
}

/// Check a value against a property schema's `type`, returning a description
/// of the mismatch if there is one.
fn type_mismatch(prop_schema: &Value, value: &Value) -> Option<String> {
    let expected = prop_schema.get("type")?;
    let allowed: Vec<&str> = match expected {
        Value::String(s) => vec![s.as_str()],
        Value::Array(list) => list.iter().filter_map(|t| t.as_str()).collect(),
        _ => return None,
    };

    if allowed.iter().any(|t| matches_type(t, value)) {
        None
    } else {
        Some(format!(
            "expected {}, got {}",
            allowed.join(" or "),
            kind_of(value)
        ))
    }
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "null" => value.is_null(),
        "boolean" => value.is_boolean(),
        "integer" => value.as_i64().is_some() || value.as_u64().is_some(),
        "number" => value.is_number(),
        "string" => value.is_string(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Person {
        name: String,
        age: i64,
    }

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    enum Mood {
        Happy,
        Sad,
    }

    #[derive(Debug, Deserialize, JsonSchema)]
    struct Diary {
        mood: Mood,
        entry: String,
    }

    fn as_map(value: Value) -> Map<String, Value> {
        value.as_object().expect("object").clone()
    }

    #[test]
    fn descriptor_carries_name_and_properties() {
        let descriptor = SchemaDescriptor::of::<Person>();
        assert_eq!(descriptor.name(), "Person");
        let rendered = descriptor.render();
        assert!(rendered.contains("\"name\""));
        assert!(rendered.contains("\"age\""));
    }

    #[test]
    fn instantiate_valid_mapping() {
        let descriptor = SchemaDescriptor::of::<Person>();
        let person: Person = descriptor
            .instantiate(&as_map(json!({"name": "Ann", "age": 30})))
            .unwrap();
        assert_eq!(
            person,
            Person {
                name: "Ann".into(),
                age: 30
            }
        );
    }

    #[test]
    fn missing_required_field_reported() {
        let descriptor = SchemaDescriptor::of::<Person>();
        let failure = descriptor
            .instantiate::<Person>(&as_map(json!({"name": "Ann"})))
            .unwrap_err();
        assert_eq!(failure.errors.len(), 1);
        assert_eq!(failure.errors[0].field, "age");
        assert!(failure.errors[0].problem.contains("missing"));
    }

    #[test]
    fn wrong_type_reported() {
        let descriptor = SchemaDescriptor::of::<Person>();
        let failure = descriptor
            .instantiate::<Person>(&as_map(json!({"name": "Ann", "age": "thirty"})))
            .unwrap_err();
        assert_eq!(failure.errors.len(), 1);
        assert_eq!(failure.errors[0].field, "age");
        assert!(failure.errors[0].problem.contains("expected"));
    }

    #[test]
    fn multiple_violations_collected_together() {
        let descriptor = SchemaDescriptor::of::<Person>();
        let failure = descriptor
            .instantiate::<Person>(&as_map(json!({"age": "thirty"})))
            .unwrap_err();
        // Missing "name" and mistyped "age" arrive in one failure.
        assert_eq!(failure.errors.len(), 2);
        let rendered = failure.to_string();
        assert!(rendered.contains("name"));
        assert!(rendered.contains("age"));
    }

    #[test]
    fn enum_violation_reported() {
        let descriptor = SchemaDescriptor::of::<Diary>();
        let failure = descriptor
            .instantiate::<Diary>(&as_map(json!({"mood": "Furious", "entry": "today..."})))
            .unwrap_err();
        assert_eq!(failure.errors.len(), 1);
        assert_eq!(failure.errors[0].field, "mood");
    }

    #[test]
    fn enum_value_accepted() {
        let descriptor = SchemaDescriptor::of::<Diary>();
        let diary: Diary = descriptor
            .instantiate(&as_map(json!({"mood": "Happy", "entry": "today..."})))
            .unwrap();
        assert_eq!(diary.mood, Mood::Happy);
    }

    #[test]
    fn extra_fields_are_ignored() {
        let descriptor = SchemaDescriptor::of::<Person>();
        let person: Person = descriptor
            .instantiate(&as_map(json!({"name": "Ann", "age": 30, "extra": true})))
            .unwrap();
        assert_eq!(person.age, 30);
    }
}
