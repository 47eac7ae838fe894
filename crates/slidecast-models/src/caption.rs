//! Caption input normalization.
//!
//! Inbound caption entries arrive in several shapes depending on the client:
//! timing values may be JSON numbers or numeric strings, and the text may live
//! under `text`, `word`, `caption`, or `content`. This module resolves them to
//! the canonical `(start, end, text)` form with a documented precedence order.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Result type for caption normalization.
pub type CaptionResult<T> = Result<T, CaptionError>;

/// Errors produced while normalizing raw caption input.
///
/// Every variant names the offending entry's index in the input sequence.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CaptionError {
    #[error("caption {index}: `{field}` is not a number")]
    InvalidTiming { index: usize, field: &'static str },

    #[error("caption {index}: missing `{field}`")]
    MissingField { index: usize, field: &'static str },

    #[error("caption {index}: text is empty")]
    EmptyText { index: usize },
}

/// A caption entry as received from the client, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawCaption {
    /// Start time in seconds; number or numeric string.
    pub start: Option<Value>,
    /// End time in seconds; number or numeric string.
    pub end: Option<Value>,
    pub text: Option<String>,
    pub word: Option<String>,
    pub caption: Option<String>,
    pub content: Option<String>,
}

impl RawCaption {
    /// Resolve the caption text, trying aliases in precedence order.
    ///
    /// Blank candidates are skipped so that e.g. `{"text": "", "word": "hi"}`
    /// resolves to `"hi"`.
    pub fn resolved_text(&self) -> Option<&str> {
        [&self.text, &self.word, &self.caption, &self.content]
            .into_iter()
            .filter_map(|t| t.as_deref())
            .map(str::trim)
            .find(|t| !t.is_empty())
    }
}

/// A validated caption with timing in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Caption {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl Caption {
    /// Validate a raw caption entry at position `index`.
    pub fn from_raw(index: usize, raw: &RawCaption) -> CaptionResult<Self> {
        let start = parse_seconds(raw.start.as_ref())
            .ok_or(timing_error(index, "start", raw.start.is_some()))?;
        let end = parse_seconds(raw.end.as_ref())
            .ok_or(timing_error(index, "end", raw.end.is_some()))?;
        let text = raw
            .resolved_text()
            .ok_or(CaptionError::EmptyText { index })?
            .to_string();

        Ok(Self { start, end, text })
    }
}

fn timing_error(index: usize, field: &'static str, present: bool) -> CaptionError {
    if present {
        CaptionError::InvalidTiming { index, field }
    } else {
        CaptionError::MissingField { index, field }
    }
}

/// Parse a seconds value from a JSON number or numeric string.
fn parse_seconds(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(v: Value) -> RawCaption {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_from_raw_numbers() {
        let c = Caption::from_raw(0, &raw(json!({"start": 1.5, "end": 2.0, "text": "hi"}))).unwrap();
        assert_eq!(c.start, 1.5);
        assert_eq!(c.end, 2.0);
        assert_eq!(c.text, "hi");
    }

    #[test]
    fn test_from_raw_numeric_strings() {
        let c = Caption::from_raw(0, &raw(json!({"start": "0.25", "end": " 3 ", "word": "go"}))).unwrap();
        assert_eq!(c.start, 0.25);
        assert_eq!(c.end, 3.0);
        assert_eq!(c.text, "go");
    }

    #[test]
    fn test_text_alias_precedence() {
        let c = raw(json!({"word": "second", "text": "first", "content": "fourth"}));
        assert_eq!(c.resolved_text(), Some("first"));

        let c = raw(json!({"content": "fourth", "caption": "third"}));
        assert_eq!(c.resolved_text(), Some("third"));
    }

    #[test]
    fn test_blank_alias_skipped() {
        let c = raw(json!({"text": "  ", "word": "hi"}));
        assert_eq!(c.resolved_text(), Some("hi"));
    }

    #[test]
    fn test_non_numeric_start_names_index() {
        let err = Caption::from_raw(3, &raw(json!({"start": "abc", "end": 1, "text": "x"}))).unwrap_err();
        assert_eq!(err, CaptionError::InvalidTiming { index: 3, field: "start" });
    }

    #[test]
    fn test_missing_end_names_index() {
        let err = Caption::from_raw(1, &raw(json!({"start": 0, "text": "x"}))).unwrap_err();
        assert_eq!(err, CaptionError::MissingField { index: 1, field: "end" });
    }

    #[test]
    fn test_empty_text_rejected() {
        let err = Caption::from_raw(0, &raw(json!({"start": 0, "end": 1}))).unwrap_err();
        assert_eq!(err, CaptionError::EmptyText { index: 0 });
    }
}
