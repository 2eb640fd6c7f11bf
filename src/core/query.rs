//! The user query that starts a workflow run.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// Maximum accepted query length in bytes.
pub const MAX_QUERY_LEN: usize = 10_000;

/// Shape of the report a run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    /// Retrieval plus a single direct answer.
    Rag,
    /// Retrieval plus a multi-section report.
    Research,
}

impl QueryMode {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Rag => "rag",
            Self::Research => "research",
        }
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryMode {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rag" => Ok(Self::Rag),
            "research" => Ok(Self::Research),
            other => Err(AgentError::InvalidQuery {
                reason: format!("unknown mode '{other}' (expected 'rag' or 'research')"),
            }),
        }
    }
}

/// An immutable query value. Created once per invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Query {
    text: String,
    mode: QueryMode,
    max_results: usize,
    created_at: DateTime<Utc>,
}

impl Query {
    /// Creates a query stamped with the current time.
    #[must_use]
    pub fn new(text: impl Into<String>, mode: QueryMode, max_results: usize) -> Self {
        Self {
            text: text.into(),
            mode,
            max_results,
            created_at: Utc::now(),
        }
    }

    /// Replaces the creation timestamp, for replaying recorded runs.
    #[must_use]
    pub const fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Query text as supplied by the caller.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Report mode.
    #[must_use]
    pub const fn mode(&self) -> QueryMode {
        self.mode
    }

    /// Maximum merged chunks to keep after retrieval.
    #[must_use]
    pub const fn max_results(&self) -> usize {
        self.max_results
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Checks the query is acceptable for a run.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidQuery`] for blank text, text longer
    /// than [`MAX_QUERY_LEN`], or a zero result limit.
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.text.trim().is_empty() {
            return Err(AgentError::InvalidQuery {
                reason: "query text cannot be empty".to_string(),
            });
        }
        if self.text.len() > MAX_QUERY_LEN {
            return Err(AgentError::InvalidQuery {
                reason: format!(
                    "query exceeds maximum length ({} bytes, max {MAX_QUERY_LEN})",
                    self.text.len()
                ),
            });
        }
        if self.max_results == 0 {
            return Err(AgentError::InvalidQuery {
                reason: "max results must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
