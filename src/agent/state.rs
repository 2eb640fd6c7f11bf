//! Per-run workflow state.
//!
//! A [`WorkflowState`] is owned by exactly one run. Concurrent work inside a
//! stage produces values that the orchestrator merges here afterwards, so
//! the state never has more than one writer.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::gateway::Completion;
use crate::core::{Evidence, Query, ReportTree, RetrievedChunk};
use crate::error::{AgentError, ErrorKind};

/// Workflow stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Query validation.
    Intake,
    /// Concurrent fetch from retrieval sources.
    Retrieving,
    /// Evidence extraction.
    Extracting,
    /// Report drafting.
    Drafting,
    /// Completed with a report.
    Finalized,
    /// Stopped by a fatal error or cancellation.
    Errored,
}

impl Stage {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Retrieving => "retrieving",
            Self::Extracting => "extracting",
            Self::Drafting => "drafting",
            Self::Finalized => "finalized",
            Self::Errored => "errored",
        }
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finalized | Self::Errored)
    }

    /// Whether `next` is a legal successor of this stage.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Intake, Self::Retrieving)
                | (Self::Retrieving, Self::Extracting)
                | (Self::Extracting, Self::Drafting)
                | (Self::Drafting, Self::Finalized)
                | (Self::Intake | Self::Retrieving | Self::Extracting | Self::Drafting, Self::Errored)
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded issue: a non-fatal degradation, or the terminal error of an
/// errored run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    /// Stage the issue occurred in.
    pub stage: Stage,
    /// Classification.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
    /// When it was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl ErrorRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(stage: Stage, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
            recorded_at: Utc::now(),
        }
    }

    /// Records an error value.
    #[must_use]
    pub fn from_error(stage: Stage, error: &AgentError) -> Self {
        Self::new(stage, error.kind(), error.to_string())
    }

    /// A `ProviderFallback` record when `completion` bypassed the primary.
    #[must_use]
    pub fn fallback(stage: Stage, completion: &Completion) -> Option<Self> {
        completion.used_fallback().then(|| {
            let bypassed = completion
                .bypassed
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            Self::new(
                stage,
                ErrorKind::ProviderFallback,
                format!("served by '{}' after: {bypassed}", completion.provider),
            )
        })
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.stage, self.kind, self.message)
    }
}

/// Mutable record of one run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowState {
    run_id: Uuid,
    query: Query,
    stage: Stage,
    chunks: Vec<RetrievedChunk>,
    evidence: Vec<Evidence>,
    tree: Option<ReportTree>,
    degraded: bool,
    errors: Vec<ErrorRecord>,
}

impl WorkflowState {
    /// Starts a run at [`Stage::Intake`].
    #[must_use]
    pub fn new(query: Query) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            query,
            stage: Stage::Intake,
            chunks: Vec::new(),
            evidence: Vec::new(),
            tree: None,
            degraded: false,
            errors: Vec::new(),
        }
    }

    /// Unique run identifier.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The run's query.
    #[must_use]
    pub const fn query(&self) -> &Query {
        &self.query
    }

    /// Current stage.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    /// Merged retrieval results.
    #[must_use]
    pub fn chunks(&self) -> &[RetrievedChunk] {
        &self.chunks
    }

    /// Extracted evidence.
    #[must_use]
    pub fn evidence(&self) -> &[Evidence] {
        &self.evidence
    }

    /// Report tree. Only present once drafting succeeded.
    #[must_use]
    pub const fn tree(&self) -> Option<&ReportTree> {
        self.tree.as_ref()
    }

    /// Whether a non-fatal issue was recorded.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Recorded issues in order.
    #[must_use]
    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::IllegalTransition`] when `next` is not a legal
    /// successor of the current stage.
    pub(crate) fn advance(&mut self, next: Stage) -> Result<(), AgentError> {
        if !self.stage.can_advance_to(next) {
            return Err(AgentError::IllegalTransition {
                from: self.stage.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!(run_id = %self.run_id, from = %self.stage, to = %next, "stage transition");
        self.stage = next;
        Ok(())
    }

    /// Appends non-fatal issues and marks the run degraded if any were given.
    pub(crate) fn record(&mut self, issues: impl IntoIterator<Item = ErrorRecord>) {
        for issue in issues {
            tracing::warn!(run_id = %self.run_id, stage = %issue.stage, kind = %issue.kind, "{}", issue.message);
            self.degraded = true;
            self.errors.push(issue);
        }
    }

    pub(crate) fn set_chunks(&mut self, chunks: Vec<RetrievedChunk>) {
        self.chunks = chunks;
    }

    pub(crate) fn set_evidence(&mut self, evidence: Vec<Evidence>) {
        self.evidence = evidence;
    }

    pub(crate) fn set_tree(&mut self, tree: ReportTree) {
        self.tree = Some(tree);
    }

    /// Moves to [`Stage::Errored`], recording `error` as the terminal issue.
    /// Any partially built tree is dropped.
    pub(crate) fn fail(&mut self, error: &AgentError) {
        let stage = self.stage;
        self.errors.push(ErrorRecord::from_error(stage, error));
        self.tree = None;
        self.stage = Stage::Errored;
    }

    /// Splits a finalized state into its parts.
    pub(crate) fn into_parts(self) -> RunParts {
        RunParts {
            run_id: self.run_id,
            query: self.query,
            chunks: self.chunks,
            evidence: self.evidence,
            tree: self.tree,
            degraded: self.degraded,
            errors: self.errors,
        }
    }
}

/// Owned fields of a finished [`WorkflowState`].
pub(crate) struct RunParts {
    pub run_id: Uuid,
    pub query: Query,
    pub chunks: Vec<RetrievedChunk>,
    pub evidence: Vec<Evidence>,
    pub tree: Option<ReportTree>,
    pub degraded: bool,
    pub errors: Vec<ErrorRecord>,
}
