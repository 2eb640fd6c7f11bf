//! Weaviate vector store collaborator.
//!
//! Chunks are stored in a `DocumentChunk` class with `content`, `file_name`,
//! `chunk_index` and `topic` properties. The collection has no vectorizer,
//! so search is a GraphQL `Like` filter on the most meaningful query term
//! followed by term-overlap scoring of each candidate.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::Deserialize;

use super::source::{SearchSource, SourceHit};
use crate::error::AgentError;

/// Default Weaviate class holding document chunks.
const DEFAULT_CLASS: &str = "DocumentChunk";

/// Candidates scoring below this are discarded.
const DEFAULT_MIN_SCORE: f64 = 0.3;

/// Credit given for a term found only inside a longer word.
const PARTIAL_CREDIT: f64 = 0.7;

const STOP_WORDS: &[&str] = &[
    "what", "are", "the", "main", "for", "of", "in", "to", "and", "a", "an", "is", "that", "this",
    "with", "from", "by", "on", "at", "as", "be", "have", "has", "will", "would", "could", "should",
];

/// Vector store backed by a Weaviate instance.
pub struct WeaviateStore {
    client: reqwest::Client,
    base_url: String,
    class: String,
    topic: Option<String>,
    min_score: f64,
}

impl std::fmt::Debug for WeaviateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeaviateStore")
            .field("base_url", &self.base_url)
            .field("class", &self.class)
            .field("topic", &self.topic)
            .field("min_score", &self.min_score)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct GraphQlResponse {
    data: Option<serde_json::Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
struct StoredChunk {
    #[serde(default)]
    content: String,
    #[serde(default)]
    file_name: String,
    #[serde(default)]
    chunk_index: i64,
}

impl WeaviateStore {
    /// Creates a store client for `base_url`, e.g. `http://localhost:8080`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            class: DEFAULT_CLASS.to_string(),
            topic: None,
            min_score: DEFAULT_MIN_SCORE,
        }
    }

    /// Restricts results to chunks stored under `topic`.
    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Sets the minimum overlap score.
    #[must_use]
    pub const fn with_min_score(mut self, score: f64) -> Self {
        self.min_score = score;
        self
    }

    fn failure(message: impl Into<String>) -> AgentError {
        AgentError::RetrievalSourceFailure {
            origin: "weaviate".to_string(),
            message: message.into(),
        }
    }

    /// Builds the GraphQL `Get` query for `terms`, fetching `2 * top_k`
    /// candidates so scoring has room to filter.
    fn graphql_query(&self, terms: &[String], query: &str, top_k: usize) -> String {
        let term = terms.last().map_or(query, String::as_str);
        let like = format!(
            "{{path: [\"content\"], operator: Like, valueText: {}}}",
            quoted(&format!("*{term}*"))
        );
        let filter = match &self.topic {
            Some(topic) => format!(
                "{{operator: And, operands: [{like}, {{path: [\"topic\"], operator: Equal, valueText: {}}}]}}",
                quoted(topic)
            ),
            None => like,
        };
        format!(
            "{{ Get {{ {class}(where: {filter}, limit: {limit}) {{ content file_name chunk_index topic }} }} }}",
            class = self.class,
            limit = top_k.saturating_mul(2),
        )
    }

    /// Scores and ranks the candidates of a GraphQL response body.
    fn parse_hits(&self, body: &str, terms: &[String], top_k: usize) -> Result<Vec<SourceHit>, AgentError> {
        let response: GraphQlResponse =
            serde_json::from_str(body).map_err(|e| Self::failure(format!("invalid response: {e}")))?;
        if let Some(first) = response.errors.first() {
            return Err(Self::failure(format!("graphql error: {}", first.message)));
        }
        let candidates = response
            .data
            .as_ref()
            .and_then(|d| d.get("Get"))
            .and_then(|g| g.get(&self.class))
            .cloned()
            .unwrap_or(serde_json::Value::Array(Vec::new()));
        let chunks: Vec<StoredChunk> = serde_json::from_value(candidates)
            .map_err(|e| Self::failure(format!("unexpected result shape: {e}")))?;

        let mut hits: Vec<SourceHit> = chunks
            .into_iter()
            .filter_map(|c| {
                let score = term_overlap_score(terms, &c.content);
                (score >= self.min_score)
                    .then(|| SourceHit::new(format!("{}#{}", c.file_name, c.chunk_index), c.content, score))
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.doc_id.cmp(&b.doc_id)));
        hits.truncate(top_k);
        Ok(hits)
    }
}

/// A GraphQL string literal.
fn quoted(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

fn clean_term(term: &str) -> String {
    term.trim_matches(|c| matches!(c, '?' | '.' | ',' | '!')).to_lowercase()
}

/// Query terms worth matching: stop words and terms of two characters or
/// fewer are removed. Falls back to every term when nothing is left.
pub fn meaningful_terms(query: &str) -> Vec<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(clean_term)
        .filter(|t| t.chars().count() > 2 && !STOP_WORDS.contains(&t.as_str()))
        .collect();
    if terms.is_empty() {
        query
            .split_whitespace()
            .map(clean_term)
            .filter(|t| !t.is_empty())
            .collect()
    } else {
        terms
    }
}

/// Fraction of `terms` found as words of `content`, with partial credit for
/// terms found only inside longer words.
#[allow(clippy::cast_precision_loss)]
pub fn term_overlap_score(terms: &[String], content: &str) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let lowered = content.to_lowercase();
    let words: BTreeSet<String> = lowered.split_whitespace().map(clean_term).collect();
    let exact = terms.iter().filter(|t| words.contains(t.as_str())).count();
    let partial = terms
        .iter()
        .filter(|t| words.iter().any(|w| w.contains(t.as_str())))
        .count();
    let n = terms.len() as f64;
    let score = exact as f64 / n;
    if partial > exact {
        score.max(partial as f64 * PARTIAL_CREDIT / n)
    } else {
        score
    }
}

#[async_trait]
impl SearchSource for WeaviateStore {
    fn name(&self) -> &str {
        "weaviate"
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SourceHit>, AgentError> {
        let terms = meaningful_terms(query);
        let graphql = self.graphql_query(&terms, query, top_k);
        tracing::debug!(terms = ?terms, "weaviate query");

        let url = format!("{}/v1/graphql", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "query": graphql }))
            .send()
            .await
            .map_err(|e| Self::failure(format!("request failed: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Self::failure(format!("failed to read response: {e}")))?;
        if !status.is_success() {
            return Err(Self::failure(format!("HTTP {status}: {body}")));
        }
        self.parse_hits(&body, &terms, top_k)
    }
}
