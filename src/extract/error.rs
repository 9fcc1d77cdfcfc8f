//! Error type for completion extraction.

/// Errors returned by the response extractor.
///
/// All of these are recoverable: the generator answers them with corrective
/// feedback and another attempt rather than failing the call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExtractError {
    /// The completion was empty or whitespace-only.
    #[error("empty completion text")]
    Empty,

    /// No strategy (direct parse, fence stripping, bracket matching, repair)
    /// recovered structured data.
    #[error("could not recover structured data from completion: {text}")]
    Unparseable {
        /// A truncated copy of the cleaned completion text (max 200 chars).
        text: String,
    },

    /// Something parsed, but it is not a mapping or a sequence.
    #[error("completion is not structured data (got {kind})")]
    NotStructured {
        /// What was found instead.
        kind: &'static str,
    },
}

/// Truncate a string to at most `max_len` bytes on a char boundary,
/// appending "..." if truncated.
pub(crate) fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
