//! Citation validation for drafted report content.
//!
//! A drafted body may only reference evidence that exists in the run.
//! Declared citations that do not resolve are dropped, and matching inline
//! `[eN]` markers are removed from the body.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::core::{Evidence, EvidenceId};

static MARKER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\[(e\d+)\]").ok());

/// Ids of the evidence list, for lookups during validation.
#[must_use]
pub fn known_ids(evidence: &[Evidence]) -> BTreeSet<&str> {
    evidence.iter().map(|e| e.id().as_str()).collect()
}

/// Splits declared citations into known ids (deduplicated, in first-seen
/// order) and the unknown ids that were stripped.
#[must_use]
pub fn validate_citations(
    declared: &[String],
    known: &BTreeSet<&str>,
) -> (Vec<EvidenceId>, Vec<String>) {
    let mut kept: Vec<EvidenceId> = Vec::new();
    let mut stripped: Vec<String> = Vec::new();
    for raw in declared {
        let id = raw.trim().trim_start_matches('[').trim_end_matches(']');
        if known.contains(id) {
            if !kept.iter().any(|k| k.as_str() == id) {
                kept.push(EvidenceId::new(id));
            }
        } else if !stripped.iter().any(|s| s == id) {
            stripped.push(id.to_string());
        }
    }
    (kept, stripped)
}

/// Inline `[eN]` markers in `body`, in order of appearance.
#[must_use]
pub fn inline_markers(body: &str) -> Vec<String> {
    MARKER.as_ref().map_or_else(Vec::new, |re| {
        re.captures_iter(body)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .collect()
    })
}

/// Removes `[eN]` markers whose id is not in `known`.
#[must_use]
pub fn strip_unknown_markers(body: &str, known: &BTreeSet<&str>) -> String {
    let Some(re) = MARKER.as_ref() else {
        return body.to_string();
    };
    let replaced = re.replace_all(body, |caps: &regex::Captures<'_>| {
        let id = caps.get(1).map_or("", |m| m.as_str());
        if known.contains(id) {
            caps.get(0).map_or_else(String::new, |m| m.as_str().to_string())
        } else {
            String::new()
        }
    });
    let mut cleaned = replaced.replace(" .", ".").replace(" ,", ",");
    while cleaned.contains("  ") {
        cleaned = cleaned.replace("  ", " ");
    }
    cleaned
}

/// A drafted body reconciled against the evidence list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckedDraft {
    /// Body with unknown markers removed.
    pub body: String,
    /// Known ids cited by the model, declared or inline.
    pub cited: Vec<EvidenceId>,
    /// Unknown ids that were removed.
    pub stripped: Vec<String>,
}

/// Validates declared citations and inline markers of a draft.
#[must_use]
pub fn check_draft(body: &str, declared: &[String], evidence: &[Evidence]) -> CheckedDraft {
    let known = known_ids(evidence);
    let mut all: Vec<String> = declared.to_vec();
    all.extend(inline_markers(body));
    let (cited, stripped) = validate_citations(&all, &known);
    let body = if stripped.is_empty() {
        body.to_string()
    } else {
        tracing::warn!(stripped = ?stripped, "removed citations of unknown evidence");
        strip_unknown_markers(body, &known)
    };
    CheckedDraft { body, cited, stripped }
}
