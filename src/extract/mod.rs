//! Turning raw completion text into structured values.
//!
//! Backends return free text; this module recovers a JSON mapping or
//! sequence from it. Code fences are stripped, bracketed regions are
//! located, and near-JSON defects are repaired before giving up. Failures
//! here are always recoverable by the generator, which responds with
//! corrective feedback and retries.

pub mod error;
pub mod repair;

pub use error::ExtractError;
pub use repair::{repair_to_value, try_repair_json};

use serde_json::{Map, Value};
use tracing::warn;

use error::truncate;

/// Remove markdown code-fence markers anywhere in the text.
///
/// Both language-tagged (```` ```json ````) and bare (```` ``` ````) fences
/// are removed; the fenced content is kept. Purely cosmetic and
/// content-neutral.
pub fn strip_code_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find("```") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 3..];
        let tag_len: usize = after
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .map(|c| c.len_utf8())
            .sum();
        rest = &after[tag_len..];
    }
    out.push_str(rest);
    out
}

/// Extract a structured value (mapping or sequence) from completion text.
///
/// Strategies, in order:
/// 1. Strip code fences, then parse (with repair) the whole text
/// 2. Bracket-match a `{...}` object candidate, then parse with repair
/// 3. Bracket-match a `[...]` array candidate, then parse with repair
///
/// Fails with [`ExtractError`] when nothing structured can be recovered or
/// the recovered value is a bare scalar.
pub fn extract_value(text: &str) -> Result<Value, ExtractError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ExtractError::Empty);
    }

    let cleaned = strip_code_fences(trimmed);
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Err(ExtractError::Empty);
    }

    if let Some(value) = repair_to_value(cleaned) {
        return require_structured(value);
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let Some(candidate) = find_bracketed(cleaned, open, close) {
            if let Some(value) = repair_to_value(candidate) {
                return require_structured(value);
            }
        }
    }

    Err(ExtractError::Unparseable {
        text: truncate(cleaned, 200),
    })
}

/// Extract a mapping from completion text.
///
/// When the completion is a non-empty sequence whose first element is a
/// mapping (the model wrapped its answer in `[ ... ]`), that element is
/// used and a warning is logged; the attempt is not failed for it.
pub fn extract_object(text: &str) -> Result<Map<String, Value>, ExtractError> {
    match extract_value(text)? {
        Value::Object(map) => Ok(map),
        Value::Array(mut items) => {
            if items.is_empty() {
                return Err(ExtractError::NotStructured {
                    kind: "empty array",
                });
            }
            match items.swap_remove(0) {
                Value::Object(map) => {
                    warn!("completion was a sequence where an object was expected; using its first element");
                    Ok(map)
                }
                _ => Err(ExtractError::NotStructured {
                    kind: "array of non-objects",
                }),
            }
        }
        // extract_value only returns objects or arrays
        _ => Err(ExtractError::NotStructured { kind: "scalar" }),
    }
}

/// Accept only mappings and sequences.
fn require_structured(value: Value) -> Result<Value, ExtractError> {
    match value {
        Value::Object(_) | Value::Array(_) => Ok(value),
        Value::Null => Err(ExtractError::NotStructured { kind: "null" }),
        Value::Bool(_) => Err(ExtractError::NotStructured { kind: "boolean" }),
        Value::Number(_) => Err(ExtractError::NotStructured { kind: "number" }),
        Value::String(_) => Err(ExtractError::NotStructured { kind: "string" }),
    }
}

/// Find a bracketed substring by matching open/close delimiters.
///
/// Nesting-aware and string-aware. Prefers the last complete region, which
/// is more likely to be the model's actual answer than an earlier example.
fn find_bracketed(text: &str, open: char, close: char) -> Option<&str> {
    let mut best: Option<&str> = None;
    let mut scan_from = 0;

    while let Some(offset) = text.get(scan_from..).and_then(|t| t.find(open)) {
        let start = scan_from + offset;
        let mut depth = 0i32;
        let mut in_string = false;
        let mut escaped = false;
        let mut end = None;

        for (i, ch) in text[start..].char_indices() {
            if escaped {
                escaped = false;
                continue;
            }
            if in_string {
                match ch {
                    '\\' => escaped = true,
                    '"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            if ch == '"' {
                in_string = true;
            } else if ch == open {
                depth += 1;
            } else if ch == close {
                depth -= 1;
                if depth == 0 {
                    end = Some(start + i + ch.len_utf8());
                    break;
                }
            }
        }

        match end {
            Some(end) => {
                best = Some(&text[start..end]);
                scan_from = end;
            }
            None => break,
        }
    }

    best
}
