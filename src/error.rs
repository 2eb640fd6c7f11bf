//! Error types for the retrieval-and-drafting engine.
//!
//! Every failure the workflow can observe is an [`AgentError`] variant.
//! [`AgentError::kind`] maps each variant to a serializable [`ErrorKind`]
//! so non-fatal issues can be recorded on a run without carrying the
//! error value itself.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::NodeId;

/// Serializable discriminant of an error or recorded issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The query failed intake validation.
    InvalidQuery,
    /// A retrieval source did not answer within its timeout.
    RetrievalSourceTimeout,
    /// A retrieval source returned an error.
    RetrievalSourceFailure,
    /// No retrieval source produced usable chunks.
    NoEvidenceAvailable,
    /// A provider call failed with a retryable error.
    ProviderTransientFailure,
    /// A provider rejected the call (credentials or invalid request).
    ProviderAuthFailure,
    /// Every provider failed for a single gateway call.
    ProviderExhausted,
    /// A fallback provider served a call because the primary failed.
    ProviderFallback,
    /// Evidence extraction produced nothing usable.
    NoEvidenceExtracted,
    /// Evidence failed construction-time validation.
    InvalidEvidence,
    /// Model output could not be parsed.
    ResponseParse,
    /// Report tree node lookup failed.
    UnknownParent,
    /// Report tree node was already finalized.
    ParentClosed,
    /// Report tree already has a root.
    RootExists,
    /// The run was cancelled.
    Cancelled,
    /// A workflow stage transition was attempted out of order.
    IllegalTransition,
    /// Invalid or incomplete configuration.
    Configuration,
    /// Local I/O failure.
    Io,
}

impl ErrorKind {
    /// Returns the `snake_case` name used in logs and serialized records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidQuery => "invalid_query",
            Self::RetrievalSourceTimeout => "retrieval_source_timeout",
            Self::RetrievalSourceFailure => "retrieval_source_failure",
            Self::NoEvidenceAvailable => "no_evidence_available",
            Self::ProviderTransientFailure => "provider_transient_failure",
            Self::ProviderAuthFailure => "provider_auth_failure",
            Self::ProviderExhausted => "provider_exhausted",
            Self::ProviderFallback => "provider_fallback",
            Self::NoEvidenceExtracted => "no_evidence_extracted",
            Self::InvalidEvidence => "invalid_evidence",
            Self::ResponseParse => "response_parse",
            Self::UnknownParent => "unknown_parent",
            Self::ParentClosed => "parent_closed",
            Self::RootExists => "root_exists",
            Self::Cancelled => "cancelled",
            Self::IllegalTransition => "illegal_transition",
            Self::Configuration => "configuration",
            Self::Io => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a single provider gave up during a gateway call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFailure {
    /// Provider name.
    pub provider: String,
    /// Attempts made against this provider (first call plus retries).
    pub attempts: u32,
    /// Classification of the last error.
    pub kind: ErrorKind,
    /// Last error message.
    pub reason: String,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} after {} attempt{}): {}",
            self.provider,
            self.kind,
            self.attempts,
            if self.attempts == 1 { "" } else { "s" },
            self.reason
        )
    }
}

fn join_failures(failures: &[ProviderFailure]) -> String {
    if failures.is_empty() {
        return "no providers configured".to_string();
    }
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors produced by the engine.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The query failed intake validation. No side effects were performed.
    #[error("invalid query: {reason}")]
    InvalidQuery {
        /// What was wrong with the query.
        reason: String,
    },

    /// A retrieval source timed out.
    #[error("retrieval source '{origin}' timed out after {timeout:?}")]
    RetrievalSourceTimeout {
        /// Source name.
        origin: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// A retrieval source failed.
    #[error("retrieval source '{origin}' failed: {message}")]
    RetrievalSourceFailure {
        /// Source name.
        origin: String,
        /// Failure description.
        message: String,
    },

    /// No source produced usable chunks.
    #[error("no evidence available: {hint}")]
    NoEvidenceAvailable {
        /// Diagnostic hint listing per-source outcomes.
        hint: String,
    },

    /// Retryable provider failure (timeout, rate limit, server error).
    #[error("provider '{provider}' transient failure: {message}")]
    ProviderTransient {
        /// Provider name.
        provider: String,
        /// Failure description.
        message: String,
    },

    /// Non-retryable provider failure (authentication or invalid request).
    #[error("provider '{provider}' rejected the request: {message}")]
    ProviderAuth {
        /// Provider name.
        provider: String,
        /// Failure description.
        message: String,
    },

    /// All providers exhausted their attempts.
    #[error("all providers exhausted: {}", join_failures(.failures))]
    ProviderExhausted {
        /// Per-provider failure reasons, in provider order.
        failures: Vec<ProviderFailure>,
    },

    /// Evidence extraction yielded nothing usable.
    #[error("no evidence extracted ({failed_batches} of {total_batches} batches failed)")]
    NoEvidenceExtracted {
        /// Batches whose gateway call or parse failed.
        failed_batches: usize,
        /// Batches attempted.
        total_batches: usize,
    },

    /// Evidence rejected at construction.
    #[error("invalid evidence: {reason}")]
    InvalidEvidence {
        /// Rejection reason.
        reason: String,
    },

    /// Attempted to attach a child to a node that does not exist.
    #[error("unknown parent node {parent}")]
    UnknownParent {
        /// Requested parent.
        parent: NodeId,
    },

    /// Attempted to modify a node that has been finalized.
    #[error("node {parent} is closed")]
    ParentClosed {
        /// Finalized node.
        parent: NodeId,
    },

    /// Attempted to create a second root.
    #[error("report tree already has a root")]
    RootExists,

    /// Model output could not be parsed.
    #[error("failed to parse model response: {message}")]
    ResponseParse {
        /// Diagnostic message.
        message: String,
        /// Raw content for debugging.
        content: String,
    },

    /// The run was cancelled at a checkpoint or while a stage was in flight.
    #[error("run cancelled")]
    Cancelled,

    /// A workflow stage transition was attempted out of order.
    #[error("illegal stage transition from {from} to {to}")]
    IllegalTransition {
        /// Current stage.
        from: String,
        /// Requested stage.
        to: String,
    },

    /// No API key configured for a provider.
    #[error("API key missing: set OPENAI_API_KEY or RAG_API_KEY")]
    ApiKeyMissing,

    /// Unknown provider kind in configuration.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// Configured provider kind.
        name: String,
    },

    /// Invalid configuration value.
    #[error("configuration error: {message}")]
    Config {
        /// What was wrong.
        message: String,
    },

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Returns the serializable discriminant for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidQuery { .. } => ErrorKind::InvalidQuery,
            Self::RetrievalSourceTimeout { .. } => ErrorKind::RetrievalSourceTimeout,
            Self::RetrievalSourceFailure { .. } => ErrorKind::RetrievalSourceFailure,
            Self::NoEvidenceAvailable { .. } => ErrorKind::NoEvidenceAvailable,
            Self::ProviderTransient { .. } => ErrorKind::ProviderTransientFailure,
            Self::ProviderAuth { .. } => ErrorKind::ProviderAuthFailure,
            Self::ProviderExhausted { .. } => ErrorKind::ProviderExhausted,
            Self::NoEvidenceExtracted { .. } => ErrorKind::NoEvidenceExtracted,
            Self::InvalidEvidence { .. } => ErrorKind::InvalidEvidence,
            Self::UnknownParent { .. } => ErrorKind::UnknownParent,
            Self::ParentClosed { .. } => ErrorKind::ParentClosed,
            Self::RootExists => ErrorKind::RootExists,
            Self::ResponseParse { .. } => ErrorKind::ResponseParse,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::IllegalTransition { .. } => ErrorKind::IllegalTransition,
            Self::ApiKeyMissing | Self::UnsupportedProvider { .. } | Self::Config { .. } => {
                ErrorKind::Configuration
            }
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether the gateway should retry the same provider after this error.
    ///
    /// Only transient provider failures qualify; authentication and
    /// invalid-request failures advance straight to the next provider.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderTransient { .. })
    }
}
