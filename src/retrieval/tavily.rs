//! Tavily web search collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::source::{SearchSource, SourceHit};
use crate::error::AgentError;

/// Default Tavily API endpoint.
const DEFAULT_BASE_URL: &str = "https://api.tavily.com";

/// Web search through the Tavily search API.
pub struct TavilySearch {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    search_depth: String,
}

impl std::fmt::Debug for TavilySearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TavilySearch")
            .field("base_url", &self.base_url)
            .field("search_depth", &self.search_depth)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    search_depth: &'a str,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: f64,
}

impl TavilySearch {
    /// Creates a client using advanced search depth.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            search_depth: "advanced".to_string(),
        }
    }

    /// Overrides the API endpoint.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the search depth (`basic` or `advanced`).
    #[must_use]
    pub fn with_search_depth(mut self, depth: impl Into<String>) -> Self {
        self.search_depth = depth.into();
        self
    }

    fn failure(message: impl Into<String>) -> AgentError {
        AgentError::RetrievalSourceFailure {
            origin: "tavily".to_string(),
            message: message.into(),
        }
    }
}

/// Maps a Tavily response body to hits, skipping results without content.
fn parse_hits(body: &str) -> Result<Vec<SourceHit>, AgentError> {
    let response: TavilyResponse = serde_json::from_str(body)
        .map_err(|e| TavilySearch::failure(format!("invalid response: {e}")))?;
    Ok(response
        .results
        .into_iter()
        .filter(|r| !r.content.trim().is_empty())
        .map(|r| SourceHit::new(r.url, r.content, r.score))
        .collect())
}

#[async_trait]
impl SearchSource for TavilySearch {
    fn name(&self) -> &str {
        "tavily"
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SourceHit>, AgentError> {
        let request = TavilyRequest {
            api_key: &self.api_key,
            query,
            max_results: top_k,
            search_depth: &self.search_depth,
        };
        let url = format!("{}/search", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&request)
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
        parse_hits(&body)
    }
}
