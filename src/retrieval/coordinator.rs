//! Concurrent fan-out to the vector store and web search.
//!
//! Both sources are queried at the same time, each under its own timeout.
//! A source that times out or fails is dropped and recorded as an issue;
//! retrieval only fails when no configured source answered, or when the
//! answers merge to nothing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use super::source::SearchSource;
use crate::agent::config::AgentConfig;
use crate::agent::state::{ErrorRecord, Stage};
use crate::core::{Query, RetrievedChunk, SourceType, merge_candidates};
use crate::error::AgentError;

/// Result of a retrieval stage.
#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    /// Merged chunks in rank order.
    pub chunks: Vec<RetrievedChunk>,
    /// Sources that timed out or failed.
    pub issues: Vec<ErrorRecord>,
}

/// Queries the retrieval collaborators and merges their results.
#[derive(Clone)]
pub struct RetrievalCoordinator {
    vector: Arc<dyn SearchSource>,
    web: Option<Arc<dyn SearchSource>>,
    timeout: Duration,
    similarity: f64,
}

impl std::fmt::Debug for RetrievalCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalCoordinator")
            .field("vector", &self.vector.name())
            .field("web", &self.web.as_ref().map(|w| w.name().to_string()))
            .field("timeout", &self.timeout)
            .field("similarity", &self.similarity)
            .finish()
    }
}

impl RetrievalCoordinator {
    /// Creates a coordinator. `web` is `None` when web search is disabled,
    /// which is not treated as a failure.
    #[must_use]
    pub fn new(
        vector: Arc<dyn SearchSource>,
        web: Option<Arc<dyn SearchSource>>,
        config: &AgentConfig,
    ) -> Self {
        Self {
            vector,
            web,
            timeout: config.retrieval_timeout,
            similarity: config.dedup_similarity,
        }
    }

    /// Whether a web search source is configured.
    #[must_use]
    pub const fn has_web(&self) -> bool {
        self.web.is_some()
    }

    /// Retrieves, deduplicates and ranks chunks for `query`, keeping at most
    /// `query.max_results()`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::NoEvidenceAvailable`] when every configured
    /// source failed or the merged result is empty.
    pub async fn retrieve(&self, query: &Query) -> Result<RetrievalOutcome, AgentError> {
        let start = Instant::now();
        let top_k = query.max_results();
        let text = query.text();

        let vector_fut = fetch(self.vector.as_ref(), SourceType::Vector, text, top_k, self.timeout);
        let web_fut = async {
            match &self.web {
                Some(web) => Some(fetch(web.as_ref(), SourceType::Web, text, top_k, self.timeout).await),
                None => None,
            }
        };
        let (vector_result, web_result) = tokio::join!(vector_fut, web_fut);

        let mut candidates = Vec::new();
        let mut issues = Vec::new();
        let mut answered = 0usize;
        for result in std::iter::once(vector_result).chain(web_result) {
            match result {
                Ok(chunks) => {
                    answered += 1;
                    candidates.extend(chunks);
                }
                Err(e) => issues.push(ErrorRecord::from_error(Stage::Retrieving, &e)),
            }
        }

        if answered == 0 {
            let hint = issues
                .iter()
                .map(|i| i.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(AgentError::NoEvidenceAvailable { hint });
        }

        let fetched = candidates.len();
        let chunks = merge_candidates(candidates, self.similarity, top_k);
        tracing::debug!(
            fetched,
            kept = chunks.len(),
            failed_sources = issues.len(),
            elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "retrieval merged"
        );

        if chunks.is_empty() {
            return Err(AgentError::NoEvidenceAvailable {
                hint: format!("sources answered with {fetched} hits but none held usable text"),
            });
        }
        Ok(RetrievalOutcome { chunks, issues })
    }
}

/// Queries one source under `timeout`, converting hits to chunks.
async fn fetch(
    source: &dyn SearchSource,
    source_type: SourceType,
    text: &str,
    top_k: usize,
    timeout: Duration,
) -> Result<Vec<RetrievedChunk>, AgentError> {
    let origin = source.name().to_string();
    match tokio::time::timeout(timeout, source.search(text, top_k)).await {
        Err(_) => Err(AgentError::RetrievalSourceTimeout { origin, timeout }),
        Ok(Err(e @ (AgentError::RetrievalSourceTimeout { .. } | AgentError::RetrievalSourceFailure { .. }))) => Err(e),
        Ok(Err(e)) => Err(AgentError::RetrievalSourceFailure {
            origin,
            message: e.to_string(),
        }),
        Ok(Ok(hits)) => {
            let retrieved_at = Utc::now();
            tracing::debug!(source = %origin, hits = hits.len(), "source answered");
            Ok(hits
                .into_iter()
                .map(|h| RetrievedChunk::new(h.doc_id, source_type, h.text, h.score, retrieved_at))
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::retrieval::source::SourceHit;
    use async_trait::async_trait;

    struct Fixed {
        name: &'static str,
        hits: Vec<SourceHit>,
        delay: Duration,
        fail: bool,
    }

    impl Fixed {
        fn ok(name: &'static str, hits: &[(&str, &str, f64)]) -> Self {
            Self {
                name,
                hits: hits.iter().map(|(d, t, s)| SourceHit::new(*d, *t, *s)).collect(),
                delay: Duration::ZERO,
                fail: false,
            }
        }
    }

    #[async_trait]
    impl SearchSource for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn search(&self, _query: &str, top_k: usize) -> Result<Vec<SourceHit>, AgentError> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(AgentError::Config {
                    message: "connection refused".to_string(),
                });
            }
            Ok(self.hits.iter().take(top_k).cloned().collect())
        }
    }

    fn coordinator(vector: Fixed, web: Option<Fixed>) -> RetrievalCoordinator {
        RetrievalCoordinator::new(
            Arc::new(vector),
            web.map(|w| Arc::new(w) as Arc<dyn SearchSource>),
            &AgentConfig::default(),
        )
    }

    fn query() -> Query {
        Query::new("early warning signs of heart disease", crate::core::QueryMode::Rag, 5)
    }

    #[tokio::test]
    async fn test_merges_both_sources() {
        let c = coordinator(
            Fixed::ok("vector", &[("a.pdf#0", "Chest pain is common.", 0.9)]),
            Some(Fixed::ok(
                "web",
                &[
                    ("https://x", "chest pain is common", 0.95),
                    ("https://y", "Shortness of breath.", 0.5),
                ],
            )),
        );
        let outcome = c.retrieve(&query()).await.unwrap_or_else(|_| unreachable!());
        assert!(outcome.issues.is_empty());
        assert_eq!(outcome.chunks.len(), 2);
        assert_eq!(outcome.chunks[0].source_type, SourceType::Web);
        assert!((outcome.chunks[0].relevance_score - 0.95).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_web_timeout_is_recorded() {
        let mut slow = Fixed::ok("web", &[("https://x", "late", 0.9)]);
        slow.delay = Duration::from_secs(60);
        let c = coordinator(Fixed::ok("vector", &[("a.pdf#0", "Chest pain.", 0.9)]), Some(slow));
        let outcome = c.retrieve(&query()).await.unwrap_or_else(|_| unreachable!());
        assert_eq!(outcome.chunks.len(), 1);
        assert_eq!(outcome.issues.len(), 1);
        assert_eq!(outcome.issues[0].kind, ErrorKind::RetrievalSourceTimeout);
    }

    #[tokio::test]
    async fn test_all_sources_failed() {
        let mut vector = Fixed::ok("vector", &[]);
        vector.fail = true;
        let mut web = Fixed::ok("web", &[]);
        web.fail = true;
        let result = coordinator(vector, Some(web)).retrieve(&query()).await;
        let Err(AgentError::NoEvidenceAvailable { hint }) = result else {
            unreachable!()
        };
        assert!(hint.contains("vector"));
        assert!(hint.contains("web"));
    }

    #[tokio::test]
    async fn test_disabled_web_is_not_an_issue() {
        let c = coordinator(Fixed::ok("vector", &[("a.pdf#0", "Chest pain.", 0.9)]), None);
        assert!(!c.has_web());
        let outcome = c.retrieve(&query()).await.unwrap_or_else(|_| unreachable!());
        assert!(outcome.issues.is_empty());
    }

    #[tokio::test]
    async fn test_empty_merge_fails() {
        let c = coordinator(Fixed::ok("vector", &[("a.pdf#0", "  ...  ", 0.9)]), None);
        assert!(matches!(
            c.retrieve(&query()).await,
            Err(AgentError::NoEvidenceAvailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_retrieve_is_deterministic() {
        let c = coordinator(
            Fixed::ok("vector", &[("b", "beta text", 0.5), ("a", "alpha text", 0.5)]),
            Some(Fixed::ok("web", &[("https://z", "gamma text", 0.5)])),
        );
        let first = c.retrieve(&query()).await.unwrap_or_else(|_| unreachable!());
        let second = c.retrieve(&query()).await.unwrap_or_else(|_| unreachable!());
        let ids = |o: &RetrievalOutcome| o.chunks.iter().map(|c| c.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first.chunks[0].source_doc_id, "a");
        assert_eq!(first.chunks[2].source_type, SourceType::Web);
    }
}
