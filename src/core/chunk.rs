//! Retrieved chunks and the cross-source merge.
//!
//! Chunks from the vector store and from web search share one type,
//! tagged by [`SourceType`]. [`merge_candidates`] deduplicates near-identical
//! text across both sources and produces the deterministic ranking the rest
//! of the pipeline relies on.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt::{self, Write};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use unicode_segmentation::UnicodeSegmentation;

use super::clamp_unit;

/// Where a chunk came from.
///
/// The derived [`Ord`] places `Vector` before `Web`, which is the tie-break
/// preference used by ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Curated corpus in the vector store.
    Vector,
    /// Web search result.
    Web,
}

impl SourceType {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Web => "web",
        }
    }

    const fn id_prefix(self) -> char {
        match self {
            Self::Vector => 'v',
            Self::Web => 'w',
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable chunk identifier.
///
/// Derived from the source, document id and normalized text, so the same
/// fragment retrieved twice gets the same id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    /// Wraps an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derives the identifier for a fragment.
    #[must_use]
    pub fn derive(source_type: SourceType, source_doc_id: &str, text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(source_type.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(source_doc_id.as_bytes());
        hasher.update([0]);
        hasher.update(normalize_text(text).as_bytes());
        let digest = hasher.finalize();

        let mut id = String::with_capacity(14);
        id.push(source_type.id_prefix());
        id.push('-');
        for byte in digest.iter().take(6) {
            let _ = write!(id, "{byte:02x}");
        }
        Self(id)
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fragment of source text with its relevance score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    /// Stable identifier.
    pub id: ChunkId,
    /// Document id (vector store) or URL (web).
    pub source_doc_id: String,
    /// Which collaborator produced the chunk.
    pub source_type: SourceType,
    /// Fragment text.
    pub text: String,
    /// Relevance score clamped to `[0, 1]`.
    pub relevance_score: f64,
    /// When the source answered.
    pub retrieved_at: DateTime<Utc>,
}

impl RetrievedChunk {
    /// Creates a chunk, deriving its id and clamping the score.
    #[must_use]
    pub fn new(
        source_doc_id: impl Into<String>,
        source_type: SourceType,
        text: impl Into<String>,
        relevance_score: f64,
        retrieved_at: DateTime<Utc>,
    ) -> Self {
        let source_doc_id = source_doc_id.into();
        let text = text.into();
        Self {
            id: ChunkId::derive(source_type, &source_doc_id, &text),
            source_doc_id,
            source_type,
            text,
            relevance_score: clamp_unit(relevance_score),
            retrieved_at,
        }
    }
}

/// Lowercases and re-joins the text's words with single spaces,
/// dropping punctuation and whitespace runs.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    text.unicode_words()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn word_set(normalized: &str) -> BTreeSet<&str> {
    normalized.split(' ').filter(|w| !w.is_empty()).collect()
}

/// Jaccard similarity of the two texts' normalized word sets.
///
/// Two empty texts are considered identical.
#[must_use]
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let (na, nb) = (normalize_text(a), normalize_text(b));
    set_similarity(&word_set(&na), &word_set(&nb))
}

#[allow(clippy::cast_precision_loss)]
fn set_similarity(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

/// Ranking order: score descending, then `Vector` before `Web`, then
/// document id ascending, then chunk id for a total order.
#[must_use]
pub fn rank_order(a: &RetrievedChunk, b: &RetrievedChunk) -> Ordering {
    b.relevance_score
        .total_cmp(&a.relevance_score)
        .then_with(|| a.source_type.cmp(&b.source_type))
        .then_with(|| a.source_doc_id.cmp(&b.source_doc_id))
        .then_with(|| a.id.cmp(&b.id))
}

/// Deduplicates, ranks and truncates retrieval candidates.
///
/// Candidates are visited in [`rank_order`]; a candidate is dropped when its
/// normalized text equals, or its word-set similarity reaches
/// `similarity_threshold` against, a chunk already kept. Because kept chunks
/// always rank higher, the surviving copy of a duplicate carries the higher
/// score. Chunks with no words are discarded.
#[must_use]
pub fn merge_candidates(
    mut candidates: Vec<RetrievedChunk>,
    similarity_threshold: f64,
    max_results: usize,
) -> Vec<RetrievedChunk> {
    candidates.sort_by(rank_order);

    let normalized: Vec<String> = candidates.iter().map(|c| normalize_text(&c.text)).collect();
    let mut kept_idx: Vec<usize> = Vec::new();

    for (idx, norm) in normalized.iter().enumerate() {
        if norm.is_empty() {
            continue;
        }
        let words = word_set(norm);
        let duplicate = kept_idx.iter().any(|&k| {
            normalized[k] == *norm
                || set_similarity(&word_set(&normalized[k]), &words) >= similarity_threshold
        });
        if !duplicate {
            kept_idx.push(idx);
            if kept_idx.len() == max_results {
                break;
            }
        }
    }

    let mut slots: Vec<Option<RetrievedChunk>> = candidates.into_iter().map(Some).collect();
    kept_idx
        .into_iter()
        .filter_map(|idx| slots.get_mut(idx).and_then(Option::take))
        .collect()
}
