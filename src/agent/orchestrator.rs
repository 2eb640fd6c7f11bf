//! Workflow orchestrator.
//!
//! Drives one run through intake → retrieving → extracting → drafting →
//! finalized. Each stage only starts after the previous one returned; a
//! fatal error or cancellation moves the run to errored and hands the
//! partial state back for diagnostics.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::config::AgentConfig;
use super::drafting::DraftingAgent;
use super::gateway::ModelGateway;
use super::message::TokenUsage;
use super::prompt::PromptSet;
use super::research::ResearchAgent;
use super::state::{ErrorRecord, Stage, WorkflowState};
use crate::core::{Evidence, Query, ReportQuality, ReportTree, RetrievedChunk, SerializedNode};
use crate::error::AgentError;
use crate::retrieval::RetrievalCoordinator;

/// Output of a finalized run.
#[derive(Debug, Clone)]
pub struct FinalReport {
    /// Run identifier.
    pub run_id: Uuid,
    /// The query that started the run.
    pub query: Query,
    /// Completed report tree.
    pub tree: ReportTree,
    /// Depth-first serialization of `tree`.
    pub records: Vec<SerializedNode>,
    /// Evidence the report cites from.
    pub evidence: Vec<Evidence>,
    /// Merged retrieval results.
    pub chunks: Vec<RetrievedChunk>,
    /// Whether any non-fatal issue was recorded.
    pub degraded: bool,
    /// Non-fatal issues, in the order they were recorded.
    pub errors: Vec<ErrorRecord>,
    /// Heuristic report quality.
    pub quality: ReportQuality,
    /// Model token usage over the run.
    pub usage: TokenUsage,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

/// A run that ended in [`Stage::Errored`].
#[derive(Debug, thiserror::Error)]
#[error("run failed during {failed_stage}: {error}")]
pub struct RunFailure {
    /// Terminal error.
    #[source]
    pub error: AgentError,
    /// Stage that was active when the run failed.
    pub failed_stage: Stage,
    /// Partial state, without a report tree.
    pub state: Box<WorkflowState>,
}

/// Sequences retrieval, extraction and drafting for a run.
///
/// One orchestrator can serve many concurrent runs; each run owns its own
/// [`WorkflowState`] and only the gateway's call budget is shared.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    gateway: Arc<ModelGateway>,
    retrieval: RetrievalCoordinator,
    research: ResearchAgent,
    drafting: DraftingAgent,
}

impl Orchestrator {
    /// Creates an orchestrator.
    ///
    /// Prompt templates are loaded from [`AgentConfig::prompt_dir`], falling
    /// back to compiled-in defaults.
    #[must_use]
    pub fn new(gateway: Arc<ModelGateway>, retrieval: RetrievalCoordinator, config: &AgentConfig) -> Self {
        let prompts = PromptSet::load(config.prompt_dir.as_deref());
        Self {
            gateway,
            retrieval,
            research: ResearchAgent::new(config, prompts.extraction.clone()),
            drafting: DraftingAgent::new(config, &prompts),
        }
    }

    /// The gateway shared by this orchestrator's runs.
    #[must_use]
    pub const fn gateway(&self) -> &Arc<ModelGateway> {
        &self.gateway
    }

    /// Runs `query` to completion.
    ///
    /// # Errors
    ///
    /// Returns a [`RunFailure`] carrying the terminal error and the partial
    /// state when the run ends in [`Stage::Errored`].
    pub async fn run(&self, query: Query) -> Result<FinalReport, RunFailure> {
        self.run_with_cancel(query, CancellationToken::new()).await
    }

    /// Runs `query`, stopping with [`AgentError::Cancelled`] once `cancel`
    /// fires. In-flight retrieval and extraction calls are abandoned.
    ///
    /// # Errors
    ///
    /// Returns a [`RunFailure`] when the run ends in [`Stage::Errored`].
    pub async fn run_with_cancel(
        &self,
        query: Query,
        cancel: CancellationToken,
    ) -> Result<FinalReport, RunFailure> {
        let start = Instant::now();
        let mut state = WorkflowState::new(query);
        let span = tracing::info_span!(
            "run",
            run_id = %state.run_id(),
            mode = %state.query().mode(),
        );

        let run_id = state.run_id();
        let outcome = self.drive(&mut state, &cancel).instrument(span).await;
        match outcome {
            Ok(usage) => {
                let report = finalize(state, usage, start.elapsed());
                tracing::info!(
                    %run_id,
                    degraded = report.degraded,
                    issues = report.errors.len(),
                    evidence = report.evidence.len(),
                    nodes = report.records.len(),
                    quality = report.quality.score,
                    elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
                    "run finalized"
                );
                Ok(report)
            }
            Err(error) => {
                let failed_stage = state.stage();
                state.fail(&error);
                tracing::warn!(%run_id, stage = %failed_stage, kind = %error.kind(), error = %error, "run errored");
                Err(RunFailure {
                    error,
                    failed_stage,
                    state: Box::new(state),
                })
            }
        }
    }

    async fn drive(&self, state: &mut WorkflowState, cancel: &CancellationToken) -> Result<TokenUsage, AgentError> {
        state.query().validate()?;
        checkpoint(cancel)?;

        state.advance(Stage::Retrieving)?;
        let retrieved = guarded(cancel, self.retrieval.retrieve(state.query())).await?;
        state.set_chunks(retrieved.chunks);
        state.record(retrieved.issues);
        checkpoint(cancel)?;

        state.advance(Stage::Extracting)?;
        let extracted = guarded(
            cancel,
            self.research
                .extract_evidence(&self.gateway, state.query().text(), state.chunks()),
        )
        .await?;
        let mut usage = extracted.usage;
        state.set_evidence(extracted.evidence);
        state.record(extracted.issues);
        checkpoint(cancel)?;

        state.advance(Stage::Drafting)?;
        let drafted = guarded(
            cancel,
            self.drafting
                .draft(&self.gateway, state.query(), state.evidence(), state.chunks()),
        )
        .await?;
        usage.accumulate(drafted.usage);
        if drafted.stripped_citations > 0 {
            tracing::warn!(stripped = drafted.stripped_citations, "model cited unknown evidence");
        }
        state.set_tree(drafted.tree);
        state.record(drafted.issues);
        checkpoint(cancel)?;

        state.advance(Stage::Finalized)?;
        Ok(usage)
    }
}

/// Fails with [`AgentError::Cancelled`] once `cancel` has fired.
fn checkpoint(cancel: &CancellationToken) -> Result<(), AgentError> {
    if cancel.is_cancelled() {
        return Err(AgentError::Cancelled);
    }
    Ok(())
}

/// Awaits `work`, abandoning it when `cancel` fires first.
async fn guarded<T>(
    cancel: &CancellationToken,
    work: impl Future<Output = Result<T, AgentError>>,
) -> Result<T, AgentError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(AgentError::Cancelled),
        result = work => result,
    }
}

fn finalize(state: WorkflowState, usage: TokenUsage, elapsed: Duration) -> FinalReport {
    let parts = state.into_parts();
    let tree = parts.tree.unwrap_or_default();
    let records = tree.serialize();
    let quality = ReportQuality::assess(&tree, &parts.evidence, &parts.chunks);
    FinalReport {
        run_id: parts.run_id,
        query: parts.query,
        tree,
        records,
        evidence: parts.evidence,
        chunks: parts.chunks,
        degraded: parts.degraded,
        errors: parts.errors,
        quality,
        usage,
        elapsed,
    }
}
