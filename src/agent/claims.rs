//! Parsing of model output into claim and draft records.
//!
//! Model output is untrusted: it may be wrapped in code fences or tags,
//! use a slightly different JSON shape, or be cut off. Parsers here accept
//! the shapes models commonly produce and report everything else as
//! [`AgentError::ResponseParse`] with a short preview.

use serde::Deserialize;

use crate::error::AgentError;

/// Maximum number of claims a single extraction batch may return.
pub const MAX_CLAIMS_PER_BATCH: usize = 100;

/// Maximum byte length of a single claim.
pub const MAX_CLAIM_LEN: usize = 2_000;

/// Bytes of raw output shown in parse diagnostics.
const PREVIEW_LEN: usize = 200;

const fn default_confidence() -> f64 {
    0.5
}

/// One claim as returned by the extraction step.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClaimRecord {
    /// Claim text.
    pub claim: String,
    /// Ids of the chunks the claim came from.
    #[serde(default, alias = "chunks", alias = "sources")]
    pub chunk_ids: Vec<String>,
    /// Model-assigned confidence; 0.5 when omitted.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

/// A drafted body with the citations the model declared.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DraftRecord {
    /// Body text, possibly containing `[eN]` markers.
    pub body: String,
    /// Declared evidence ids.
    #[serde(default)]
    pub citations: Vec<String>,
}

/// Truncates `text` to at most `max` bytes on a char boundary.
pub(crate) fn truncate_on_char_boundary(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}

fn preview(text: &str) -> &str {
    let mut end = text.len().min(PREVIEW_LEN);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Removes surrounding `<tag>` delimiters or a markdown code fence.
fn strip_delimiters<'a>(content: &'a str, tag: &str) -> &'a str {
    let trimmed = content.trim();
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    trimmed
        .strip_prefix(open.as_str())
        .and_then(|s| s.strip_suffix(close.as_str()))
        .map_or_else(
            || {
                if trimmed.starts_with("```") {
                    trimmed
                        .trim_start_matches("```json")
                        .trim_start_matches("```")
                        .trim_end_matches("```")
                        .trim()
                } else {
                    trimmed
                }
            },
            str::trim,
        )
}

/// Parses extraction output into claim records.
///
/// Accepts `{"claims": [...]}`, a bare array, or a single claim object.
///
/// # Errors
///
/// Returns [`AgentError::ResponseParse`] when none of those shapes match.
pub fn parse_claims(content: &str) -> Result<Vec<ClaimRecord>, AgentError> {
    let json_str = strip_delimiters(content, "claims");

    let array_err = match serde_json::from_str::<Vec<ClaimRecord>>(json_str) {
        Ok(claims) => return Ok(claims),
        Err(e) => e,
    };

    if let Ok(wrapper) = serde_json::from_str::<serde_json::Value>(json_str) {
        if let Some(arr) = wrapper.get("claims").and_then(|v| v.as_array()) {
            let json_arr = serde_json::Value::Array(arr.clone());
            if let Ok(claims) = serde_json::from_value::<Vec<ClaimRecord>>(json_arr) {
                return Ok(claims);
            }
        }
        if let Ok(claim) = serde_json::from_value::<ClaimRecord>(wrapper) {
            return Ok(vec![claim]);
        }
    }

    Err(AgentError::ResponseParse {
        message: format!(
            "failed to parse claims JSON: {array_err}. Response length: {} bytes, preview: {:?}",
            json_str.len(),
            preview(json_str),
        ),
        content: content.to_string(),
    })
}

/// Parses drafting output.
///
/// JSON `{"body", "citations"}` is preferred; any other non-empty text is
/// taken as the body with no declared citations, leaving inline markers to
/// citation validation.
///
/// # Errors
///
/// Returns [`AgentError::ResponseParse`] for empty output or a JSON object
/// with an empty body.
pub fn parse_draft(content: &str) -> Result<DraftRecord, AgentError> {
    let json_str = strip_delimiters(content, "draft");
    if json_str.is_empty() {
        return Err(AgentError::ResponseParse {
            message: "empty draft response".to_string(),
            content: content.to_string(),
        });
    }

    let draft = serde_json::from_str::<DraftRecord>(json_str).unwrap_or_else(|_| DraftRecord {
        body: json_str.to_string(),
        citations: Vec::new(),
    });

    if draft.body.trim().is_empty() {
        return Err(AgentError::ResponseParse {
            message: format!("draft has an empty body, preview: {:?}", preview(json_str)),
            content: content.to_string(),
        });
    }
    Ok(draft)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_claims_wrapper() {
        let json = r#"{"claims": [
            {"claim": "Chest pain is common.", "chunk_ids": ["v-1"], "confidence": 0.9},
            {"claim": "Fatigue may occur.", "chunk_ids": ["v-2", "w-3"]}
        ]}"#;
        let claims = parse_claims(json).unwrap_or_default();
        assert_eq!(claims.len(), 2);
        assert_eq!(claims[1].chunk_ids, vec!["v-2", "w-3"]);
        assert!((claims[1].confidence - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_claims_code_block_array() {
        let json = "```json\n[{\"claim\": \"x\", \"chunks\": [\"v-1\"], \"confidence\": 0.4}]\n```";
        let claims = parse_claims(json).unwrap_or_default();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].chunk_ids, vec!["v-1"]);
    }

    #[test]
    fn test_parse_claims_single_object() {
        let claims = parse_claims(r#"{"claim": "x", "chunk_ids": ["v-1"]}"#).unwrap_or_default();
        assert_eq!(claims.len(), 1);
    }

    #[test]
    fn test_parse_claims_invalid() {
        let err = parse_claims("not json at all");
        assert!(matches!(err, Err(AgentError::ResponseParse { .. })));
    }

    #[test]
    fn test_parse_draft_json_and_plain() {
        let draft = parse_draft(r#"{"body": "Answer [e1].", "citations": ["e1"]}"#)
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(draft.citations, vec!["e1"]);

        let plain = parse_draft("Plain answer citing [e2].").unwrap_or_else(|_| unreachable!());
        assert_eq!(plain.body, "Plain answer citing [e2].");
        assert!(plain.citations.is_empty());

        assert!(parse_draft("   ").is_err());
        assert!(parse_draft(r#"{"body": " ", "citations": []}"#).is_err());
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let mut text = "é".repeat(10);
        truncate_on_char_boundary(&mut text, 5);
        assert_eq!(text, "éé");
        let long = "ü".repeat(300);
        assert!(preview(&long).len() <= PREVIEW_LEN);
    }
}
