//! Retrieval collaborator contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// One result returned by a retrieval collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceHit {
    /// Document id for a vector store, URL for web search.
    pub doc_id: String,
    /// Fragment text or snippet.
    pub text: String,
    /// Relevance score, expected in `[0, 1]`. Out-of-range values are clamped.
    pub score: f64,
}

impl SourceHit {
    /// Creates a hit.
    #[must_use]
    pub fn new(doc_id: impl Into<String>, text: impl Into<String>, score: f64) -> Self {
        Self {
            doc_id: doc_id.into(),
            text: text.into(),
            score,
        }
    }
}

/// A vector store or web search backend.
///
/// Implementations must be idempotent for identical backend state. The
/// coordinator applies its own timeout around [`SearchSource::search`].
#[async_trait]
pub trait SearchSource: Send + Sync {
    /// Name used in logs and recorded issues.
    fn name(&self) -> &str;

    /// Returns up to `top_k` hits for `query`.
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SourceHit>, AgentError>;
}
