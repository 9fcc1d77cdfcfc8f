//! Tolerant repair for near-JSON completion text.
//!
//! Models routinely emit almost-valid JSON: single quotes, trailing commas,
//! bare keys, Python literals, inline comments, or output truncated before
//! the closing delimiters. The passes here fix those defects with plain
//! string scanning (no regex) and validate the result with `serde_json`.

use serde_json::Value;

/// Tracks whether the scanner is inside a double-quoted string literal.
///
/// Every repair pass shares this so that fixes are only applied to the
/// structural parts of the text, never to string contents.
#[derive(Default)]
struct ScanState {
    in_string: bool,
    escaped: bool,
}

impl ScanState {
    /// Advance over one character. Returns `true` if the character belongs
    /// to a string literal (quotes included).
    fn advance(&mut self, ch: char) -> bool {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if ch == '\\' {
                self.escaped = true;
            } else if ch == '"' {
                self.in_string = false;
            }
            true
        } else if ch == '"' {
            self.in_string = true;
            true
        } else {
            false
        }
    }
}

/// Parse `text` as JSON, repairing it first if a strict parse fails.
///
/// Returns `None` when the text is beyond repair.
pub fn repair_to_value(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }
    try_repair_json(text).and_then(|fixed| serde_json::from_str(&fixed).ok())
}

/// Attempt to repair common completion defects without calling the model again.
///
/// Returns the repaired string when fixes were applied and the result is
/// valid JSON. Returns `None` if the input was already valid or could not
/// be repaired.
///
/// Passes applied, in order:
/// 1. Strip `//` and `/* */` comments
/// 2. Replace Python literals (`True`, `False`, `None`)
/// 3. Quote bare object keys
/// 4. Convert single-quoted strings to double-quoted
/// 5. Drop trailing commas before `}` / `]`
/// 6. Escape raw newlines inside string values
/// 7. Close unbalanced strings and delimiters (truncated output)
pub fn try_repair_json(broken: &str) -> Option<String> {
    if serde_json::from_str::<Value>(broken).is_ok() {
        return None;
    }

    let mut text = strip_comments(broken);
    text = fix_python_literals(&text);
    text = quote_bare_keys(&text);
    text = requote_single_quoted(&text);
    text = drop_trailing_commas(&text);
    text = escape_bare_newlines(&text);
    text = balance_delimiters(&text);

    if serde_json::from_str::<Value>(&text).is_ok() {
        Some(text)
    } else {
        None
    }
}

/// Strip `// line` and `/* block */` comments outside string literals.
fn strip_comments(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut state = ScanState::default();
    let mut i = 0;

    while i < chars.len() {
        if !state.in_string && chars[i] == '/' && i + 1 < chars.len() {
            if chars[i + 1] == '/' {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            if chars[i + 1] == '*' {
                i += 2;
                while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                    i += 1;
                }
                i = (i + 2).min(chars.len());
                continue;
            }
        }
        state.advance(chars[i]);
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Replace Python `True`/`False`/`None` with their JSON spellings, with
/// word-boundary checks, outside string literals.
fn fix_python_literals(s: &str) -> String {
    const SWAPS: [(&str, &str); 3] = [("True", "true"), ("False", "false"), ("None", "null")];

    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut state = ScanState::default();
    let mut i = 0;

    'outer: while i < chars.len() {
        if !state.in_string {
            let boundary_before = i == 0 || !chars[i - 1].is_alphanumeric();
            if boundary_before {
                for (from, to) in SWAPS {
                    let len = from.chars().count();
                    if i + len <= chars.len()
                        && chars[i..i + len].iter().collect::<String>() == from
                        && (i + len == chars.len() || !chars[i + len].is_alphanumeric())
                    {
                        out.push_str(to);
                        i += len;
                        continue 'outer;
                    }
                }
            }
        }
        state.advance(chars[i]);
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Quote bare object keys: `{key: 1}` -> `{"key": 1}`.
fn quote_bare_keys(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut state = ScanState::default();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        let in_string = state.advance(ch);
        out.push(ch);
        i += 1;

        if in_string || (ch != '{' && ch != ',') {
            continue;
        }

        // A key position: whitespace, then possibly a bare identifier
        // followed (after whitespace) by a colon.
        while i < chars.len() && chars[i].is_whitespace() {
            out.push(chars[i]);
            i += 1;
        }
        if i >= chars.len() || !(chars[i].is_alphabetic() || chars[i] == '_') {
            continue;
        }
        let key_start = i;
        while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
            i += 1;
        }
        let key: String = chars[key_start..i].iter().collect();
        let mut j = i;
        while j < chars.len() && chars[j].is_whitespace() {
            j += 1;
        }
        if j < chars.len() && chars[j] == ':' {
            out.push('"');
            out.push_str(&key);
            out.push('"');
        } else {
            out.push_str(&key);
        }
    }
    out
}

/// Convert single-quoted strings at value/key boundaries to double-quoted,
/// escaping any embedded double quotes.
fn requote_single_quoted(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut state = ScanState::default();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        if state.in_string || ch != '\'' {
            state.advance(ch);
            out.push(ch);
            i += 1;
            continue;
        }

        let start_ok = boundary_before(&chars, i);
        let close = start_ok.then(|| find_closing_quote(&chars, i + 1)).flatten();
        match close {
            Some(end) if boundary_after(&chars, end) => {
                out.push('"');
                for &inner in &chars[i + 1..end] {
                    if inner == '"' {
                        out.push('\\');
                    }
                    out.push(inner);
                }
                out.push('"');
                i = end + 1;
            }
            _ => {
                out.push(ch);
                i += 1;
            }
        }
    }
    out
}

/// Is the nearest non-whitespace character before `i` a structural one?
fn boundary_before(chars: &[char], i: usize) -> bool {
    let mut j = i;
    while j > 0 {
        j -= 1;
        if chars[j].is_whitespace() {
            continue;
        }
        return matches!(chars[j], '{' | '[' | ':' | ',');
    }
    true
}

/// Is the nearest non-whitespace character after `i` a structural one?
fn boundary_after(chars: &[char], i: usize) -> bool {
    let mut j = i + 1;
    while j < chars.len() {
        if chars[j].is_whitespace() {
            j += 1;
            continue;
        }
        return matches!(chars[j], '}' | ']' | ':' | ',');
    }
    true
}

/// Find the closing single quote starting at `from`, skipping `\'` escapes.
fn find_closing_quote(chars: &[char], from: usize) -> Option<usize> {
    let mut i = from;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '\'' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// Drop commas that directly precede a closing `}` or `]`.
fn drop_trailing_commas(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut state = ScanState::default();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        if !state.in_string && ch == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && matches!(chars[j], '}' | ']') {
                i += 1;
                continue;
            }
        }
        state.advance(ch);
        out.push(ch);
        i += 1;
    }
    out
}

/// Escape raw newlines and carriage returns inside string values.
fn escape_bare_newlines(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut state = ScanState::default();

    for ch in s.chars() {
        let was_in_string = state.in_string;
        state.advance(ch);
        if was_in_string && ch == '\n' {
            out.push_str("\\n");
        } else if was_in_string && ch == '\r' {
            out.push_str("\\r");
        } else {
            out.push(ch);
        }
    }
    out
}

/// Close an unterminated string, then close unbalanced delimiters in the
/// reverse of their opening order. Recovers output truncated mid-document.
fn balance_delimiters(s: &str) -> String {
    let mut stack: Vec<char> = Vec::new();
    let mut state = ScanState::default();

    for ch in s.chars() {
        if state.advance(ch) {
            continue;
        }
        match ch {
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&ch) {
                    stack.pop();
                }
            }
            _ => {}
        }
    }

    let mut out = s.to_string();
    if state.in_string {
        out.push('"');
    }
    while let Some(close) = stack.pop() {
        out.push(close);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_comma_object() {
        let result = try_repair_json(r#"{"a": 1, "b": 2,}"#).unwrap();
        assert_eq!(result, r#"{"a": 1, "b": 2}"#);
    }

    #[test]
    fn trailing_comma_array() {
        let result = try_repair_json("[1, 2, 3,]").unwrap();
        assert_eq!(result, "[1, 2, 3]");
    }

    #[test]
    fn single_quotes() {
        let parsed = repair_to_value("{'key': 'value'}").unwrap();
        assert_eq!(parsed["key"], "value");
    }

    #[test]
    fn bare_keys() {
        let parsed = repair_to_value(r#"{name: "Ann", age: 30}"#).unwrap();
        assert_eq!(parsed["name"], "Ann");
        assert_eq!(parsed["age"], 30);
    }

    #[test]
    fn python_literals() {
        let parsed = repair_to_value(r#"{"active": True, "data": None, "done": False}"#).unwrap();
        assert_eq!(parsed["active"], true);
        assert!(parsed["data"].is_null());
        assert_eq!(parsed["done"], false);
    }

    #[test]
    fn line_comment() {
        let parsed = repair_to_value("{\"a\": 1} // done").unwrap();
        assert_eq!(parsed["a"], 1);
    }

    #[test]
    fn block_comment() {
        let parsed = repair_to_value(r#"{"a": /* the value */ 1}"#).unwrap();
        assert_eq!(parsed["a"], 1);
    }

    #[test]
    fn truncated_object() {
        let parsed = repair_to_value(r#"{"a": 1, "b": [2, 3"#).unwrap();
        assert_eq!(parsed["a"], 1);
        assert_eq!(parsed["b"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn truncated_nested_closers_in_order() {
        // Closers must come out in reverse opening order: ] before }
        // inside, } after ] outside.
        let parsed = repair_to_value(r#"[{"a": 1"#).unwrap();
        assert_eq!(parsed[0]["a"], 1);
    }

    #[test]
    fn truncated_mid_string() {
        let parsed = repair_to_value(r#"{"a": "unfinish"#).unwrap();
        assert_eq!(parsed["a"], "unfinish");
    }

    #[test]
    fn raw_newline_in_string() {
        let parsed = repair_to_value("{\"a\": \"line one\nline two\"}").unwrap();
        assert_eq!(parsed["a"], "line one\nline two");
    }

    #[test]
    fn everything_at_once() {
        let parsed = repair_to_value("{name: 'Ann', active: True, tags: ['x', 'y',],}").unwrap();
        assert_eq!(parsed["name"], "Ann");
        assert_eq!(parsed["active"], true);
        assert_eq!(parsed["tags"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn valid_input_needs_no_repair() {
        assert!(try_repair_json(r#"{"a": 1}"#).is_none());
        assert!(repair_to_value(r#"{"a": 1}"#).is_some());
    }

    #[test]
    fn apostrophe_inside_double_quotes_untouched() {
        let parsed = repair_to_value(r#"{"text": "don't stop"}"#).unwrap();
        assert_eq!(parsed["text"], "don't stop");
    }

    #[test]
    fn garbage_stays_unrepairable() {
        assert!(try_repair_json("not json at all").is_none());
        assert!(repair_to_value("not json at all").is_none());
    }
}
