//! Research agent: turns retrieved chunks into attributable evidence.
//!
//! Chunks are split into batches in rank order. Batches are sent through the
//! gateway with bounded concurrency; a failed batch is recorded and skipped.
//! Results are merged by a single writer after every batch has finished, and
//! ordered by the rank of their best supporting chunk so the evidence list
//! does not depend on completion order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::claims::{
    ClaimRecord, MAX_CLAIM_LEN, MAX_CLAIMS_PER_BATCH, parse_claims, truncate_on_char_boundary,
};
use super::config::AgentConfig;
use super::gateway::{Completion, ModelGateway};
use super::message::TokenUsage;
use super::prompt::build_extraction_prompt;
use super::state::{ErrorRecord, Stage};
use super::traits::Agent;
use crate::core::{ChunkId, Evidence, EvidenceId, RetrievedChunk, normalize_text};
use crate::error::AgentError;

/// Result of an extraction stage.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    /// Evidence in rank order, ids `e1..eN`.
    pub evidence: Vec<Evidence>,
    /// Failed batches and fallback notices.
    pub issues: Vec<ErrorRecord>,
    /// Token usage summed over successful batches.
    pub usage: TokenUsage,
    /// Batches attempted.
    pub batches: usize,
    /// Batches whose call or parse failed.
    pub failed_batches: usize,
}

/// A claim that survived sanitization, with its position for ordering.
struct Candidate {
    rank: usize,
    batch: usize,
    position: usize,
    claim: String,
    chunk_ids: Vec<ChunkId>,
    confidence: f64,
}

/// Agent that extracts evidence claims from chunk batches.
#[derive(Debug, Clone)]
pub struct ResearchAgent {
    system_prompt: String,
    max_tokens: u32,
    batch_size: usize,
    max_concurrency: usize,
    min_confidence: f64,
}

impl ResearchAgent {
    /// Creates a research agent with the given configuration and system prompt.
    #[must_use]
    pub fn new(config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            system_prompt,
            max_tokens: config.extraction_max_tokens,
            batch_size: config.batch_size.max(1),
            max_concurrency: config.max_concurrency.max(1),
            min_confidence: config.min_confidence,
        }
    }

    /// Extracts evidence from `chunks`, which must be in rank order.
    ///
    /// Dropping the returned future aborts every in-flight batch.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::NoEvidenceExtracted`] when no claim survived,
    /// whether because every batch failed or because none produced a usable
    /// claim.
    pub async fn extract_evidence(
        &self,
        gateway: &Arc<ModelGateway>,
        query: &str,
        chunks: &[RetrievedChunk],
    ) -> Result<ExtractionOutcome, AgentError> {
        let start = Instant::now();
        let shared: Arc<[RetrievedChunk]> = Arc::from(chunks.to_vec().into_boxed_slice());
        let results = self.fan_out(gateway, query, Arc::clone(&shared)).await;
        let total = results.len();

        let mut issues = Vec::new();
        let mut usage = TokenUsage::default();
        let mut candidates: Vec<Candidate> = Vec::new();
        let mut failed = 0;

        for (batch, result) in results.into_iter().enumerate() {
            let range_start = batch * self.batch_size;
            let range_end = (range_start + self.batch_size).min(shared.len());
            let batch_chunks = shared.get(range_start..range_end).unwrap_or_default();
            match result {
                Ok((claims, completion)) => {
                    usage.accumulate(completion.usage);
                    issues.extend(ErrorRecord::fallback(Stage::Extracting, &completion));
                    let ranks: HashMap<&str, usize> = batch_chunks
                        .iter()
                        .enumerate()
                        .map(|(i, c)| (c.id.as_str(), range_start + i))
                        .collect();
                    candidates.extend(self.sanitize(claims, &ranks, batch));
                }
                Err(e) => {
                    failed += 1;
                    let ids: Vec<&str> = batch_chunks.iter().map(|c| c.id.as_str()).collect();
                    issues.push(ErrorRecord::new(
                        Stage::Extracting,
                        e.kind(),
                        format!("batch {batch} (chunks {ids:?}): {e}"),
                    ));
                }
            }
        }

        let evidence = merge_candidates(candidates);
        tracing::debug!(
            batches = total,
            failed,
            evidence = evidence.len(),
            elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "extraction finished"
        );

        if evidence.is_empty() {
            return Err(AgentError::NoEvidenceExtracted {
                failed_batches: failed,
                total_batches: total,
            });
        }

        Ok(ExtractionOutcome {
            evidence,
            issues,
            usage,
            batches: total,
            failed_batches: failed,
        })
    }

    /// Runs every batch, returning results in batch order.
    async fn fan_out(
        &self,
        gateway: &Arc<ModelGateway>,
        query: &str,
        shared: Arc<[RetrievedChunk]>,
    ) -> Vec<Result<(Vec<ClaimRecord>, Completion), AgentError>> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let batch_count = shared.len().div_ceil(self.batch_size);
        let mut tasks = JoinSet::new();

        for batch in 0..batch_count {
            let sem = Arc::clone(&semaphore);
            let gw = Arc::clone(gateway);
            let chunks_ref = Arc::clone(&shared);
            let agent = self.clone();
            let q = query.to_string();
            let range_start = batch * self.batch_size;
            let range_end = (range_start + self.batch_size).min(shared.len());

            tasks.spawn(async move {
                let result = async {
                    let _permit = sem.acquire().await.map_err(|e| AgentError::Config {
                        message: format!("extraction pool closed: {e}"),
                    })?;
                    let batch_chunks: Vec<&RetrievedChunk> = chunks_ref
                        .get(range_start..range_end)
                        .unwrap_or_default()
                        .iter()
                        .collect();
                    let user_msg = build_extraction_prompt(&q, &batch_chunks);
                    agent.execute_and_parse(&gw, &user_msg).await
                }
                .await;
                (batch, result)
            });
        }

        let mut slots: Vec<Option<Result<(Vec<ClaimRecord>, Completion), AgentError>>> =
            (0..batch_count).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((batch, result)) => {
                    if let Some(slot) = slots.get_mut(batch) {
                        *slot = Some(result);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "extraction task failed to join"),
            }
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(AgentError::ResponseParse {
                        message: "extraction task did not complete".to_string(),
                        content: String::new(),
                    })
                })
            })
            .collect()
    }

    /// Executes the agent and parses claims from the response.
    ///
    /// # Errors
    ///
    /// Returns the gateway error, or [`AgentError::ResponseParse`] with a
    /// hint when a truncated response could not be parsed.
    pub async fn execute_and_parse(
        &self,
        gateway: &ModelGateway,
        user_msg: &str,
    ) -> Result<(Vec<ClaimRecord>, Completion), AgentError> {
        let completion = self.execute(gateway, user_msg).await?;
        let truncated = completion.finish_reason.as_deref() == Some("length");
        match parse_claims(&completion.content) {
            Ok(claims) => Ok((claims, completion)),
            Err(_) if truncated => Err(AgentError::ResponseParse {
                message: format!(
                    "response truncated (finish_reason=length, max_tokens={}); \
                     consider raising extraction_max_tokens or lowering batch_size",
                    self.max_tokens
                ),
                content: completion.content,
            }),
            Err(e) => Err(e),
        }
    }

    /// Caps and cleans one batch of claims.
    ///
    /// Chunk ids outside the batch are discarded; a claim left without
    /// support, or below the confidence floor, is dropped.
    fn sanitize(
        &self,
        mut claims: Vec<ClaimRecord>,
        ranks: &HashMap<&str, usize>,
        batch: usize,
    ) -> Vec<Candidate> {
        claims.truncate(MAX_CLAIMS_PER_BATCH);
        claims
            .into_iter()
            .enumerate()
            .filter_map(|(position, record)| {
                let mut claim = record.claim.trim().to_string();
                truncate_on_char_boundary(&mut claim, MAX_CLAIM_LEN);
                if claim.is_empty() {
                    return None;
                }
                let mut supported: Vec<(usize, ChunkId)> = record
                    .chunk_ids
                    .iter()
                    .filter_map(|id| ranks.get(id.trim()).map(|&r| (r, ChunkId::new(id.trim()))))
                    .collect();
                if supported.is_empty() {
                    tracing::debug!(claim = %claim, ids = ?record.chunk_ids, "claim cites no chunk of its batch, dropped");
                    return None;
                }
                if record.confidence.is_nan() || record.confidence < self.min_confidence {
                    return None;
                }
                supported.sort();
                let rank = supported.first().map_or(usize::MAX, |(r, _)| *r);
                Some(Candidate {
                    rank,
                    batch,
                    position,
                    claim,
                    chunk_ids: supported.into_iter().map(|(_, id)| id).collect(),
                    confidence: record.confidence,
                })
            })
            .collect()
    }
}

/// Orders candidates by chunk rank, folds duplicate claims together and
/// assigns evidence ids.
fn merge_candidates(mut candidates: Vec<Candidate>) -> Vec<Evidence> {
    candidates.sort_by(|a, b| {
        a.rank
            .cmp(&b.rank)
            .then_with(|| a.batch.cmp(&b.batch))
            .then_with(|| a.position.cmp(&b.position))
    });

    let mut merged: Vec<Candidate> = Vec::with_capacity(candidates.len());
    let mut seen: HashMap<String, usize> = HashMap::new();
    for candidate in candidates {
        let key = normalize_text(&candidate.claim);
        if let Some(&idx) = seen.get(&key) {
            if let Some(existing) = merged.get_mut(idx) {
                existing.confidence = existing.confidence.max(candidate.confidence);
                existing.chunk_ids.extend(candidate.chunk_ids);
            }
            continue;
        }
        seen.insert(key, merged.len());
        merged.push(candidate);
    }

    merged
        .into_iter()
        .enumerate()
        .filter_map(|(i, c)| {
            Evidence::new(EvidenceId::from_index(i), c.claim, c.chunk_ids, c.confidence)
                .map_err(|e| tracing::warn!(error = %e, "discarding invalid evidence"))
                .ok()
        })
        .collect()
}

#[async_trait]
impl Agent for ResearchAgent {
    fn name(&self) -> &'static str {
        "research"
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn json_mode(&self) -> bool {
        true
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}
