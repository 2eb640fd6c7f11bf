//! Drafting agent: synthesizes evidence into a report tree.
//!
//! RAG mode produces a single closed root holding a direct answer. Research
//! mode drafts one child per configured section that received evidence, then
//! a summary for the root. At least two sections are always populated when
//! there are two or more evidence items, and the report style follows the
//! material score of the run. Every model-declared citation is checked against
//! the run's evidence before it reaches the tree, and each node also
//! references the evidence it was given so high-confidence evidence is never
//! silently lost.

use std::fmt::Write as _;

use async_trait::async_trait;
use futures_util::future::join_all;

use super::citation::check_draft;
use super::claims::parse_draft;
use super::config::{AgentConfig, SectionSpec};
use super::gateway::ModelGateway;
use super::message::TokenUsage;
use super::prompt::{PromptSet, build_answer_prompt, build_section_prompt, build_summary_prompt};
use super::state::{ErrorRecord, Stage};
use super::traits::Agent;
use crate::core::{Evidence, EvidenceId, Query, QueryMode, ReportStyle, ReportTree, RetrievedChunk};
use crate::error::AgentError;

/// Result of the drafting stage.
#[derive(Debug, Clone)]
pub struct DraftOutcome {
    /// Completed tree with every node closed.
    pub tree: ReportTree,
    /// Fallback notices and sections drafted from a digest.
    pub issues: Vec<ErrorRecord>,
    /// Token usage over all drafting calls.
    pub usage: TokenUsage,
    /// Unknown citations removed from model output.
    pub stripped_citations: usize,
    /// Style of a research report; `None` for RAG answers.
    pub style: Option<ReportStyle>,
}

/// Research reports never collapse below this many sections.
const MIN_SECTIONS: usize = 2;

/// One drafting call's system prompt and limits.
struct DraftStep<'a> {
    name: &'static str,
    system_prompt: &'a str,
    max_tokens: u32,
}

#[async_trait]
impl Agent for DraftStep<'_> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn system_prompt(&self) -> &str {
        self.system_prompt
    }

    fn json_mode(&self) -> bool {
        true
    }

    fn temperature(&self) -> f32 {
        0.2
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

/// A body drafted by one call, already reconciled with the evidence list.
struct Drafted {
    body: String,
    cited: Vec<EvidenceId>,
    stripped: usize,
    issues: Vec<ErrorRecord>,
    usage: TokenUsage,
}

/// Agent that writes report content from evidence.
#[derive(Debug, Clone)]
pub struct DraftingAgent {
    answer_prompt: String,
    section_prompt: String,
    summary_prompt: String,
    max_tokens: u32,
    citation_threshold: f64,
    sections: Vec<SectionSpec>,
}

impl DraftingAgent {
    /// Creates a drafting agent.
    #[must_use]
    pub fn new(config: &AgentConfig, prompts: &PromptSet) -> Self {
        Self {
            answer_prompt: prompts.answer.clone(),
            section_prompt: prompts.section.clone(),
            summary_prompt: prompts.summary.clone(),
            max_tokens: config.drafting_max_tokens,
            citation_threshold: config.citation_threshold,
            sections: config.sections.clone(),
        }
    }

    /// Drafts the report for `query`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ProviderExhausted`] when a drafting call found
    /// no working provider, or a tree error if construction goes wrong.
    pub async fn draft(
        &self,
        gateway: &ModelGateway,
        query: &Query,
        evidence: &[Evidence],
        chunks: &[RetrievedChunk],
    ) -> Result<DraftOutcome, AgentError> {
        match query.mode() {
            QueryMode::Rag => self.draft_answer(gateway, query, evidence).await,
            QueryMode::Research => {
                let style = ReportStyle::select(evidence, chunks);
                self.draft_report(gateway, query, evidence, style).await
            }
        }
    }

    /// Evidence the answer must reference: everything above the citation
    /// threshold, or the most confident item when nothing is.
    fn required_evidence<'a>(&self, evidence: &'a [Evidence]) -> Vec<&'a Evidence> {
        let above: Vec<&Evidence> = evidence
            .iter()
            .filter(|e| e.exceeds(self.citation_threshold))
            .collect();
        if !above.is_empty() {
            return above;
        }
        evidence
            .iter()
            .reduce(|best, e| if e.confidence() > best.confidence() { e } else { best })
            .into_iter()
            .collect()
    }

    async fn draft_answer(
        &self,
        gateway: &ModelGateway,
        query: &Query,
        evidence: &[Evidence],
    ) -> Result<DraftOutcome, AgentError> {
        let all: Vec<&Evidence> = evidence.iter().collect();
        let step = DraftStep {
            name: "answer",
            system_prompt: &self.answer_prompt,
            max_tokens: self.max_tokens,
        };
        let drafted = write(
            gateway,
            &step,
            "answer",
            &build_answer_prompt(query.text(), &all),
            evidence,
            &all,
        )
        .await?;

        let required = ids_of(&self.required_evidence(evidence));
        let mut tree = ReportTree::new();
        let root = tree.create_root(format!("Answer: {}", query.text()))?;
        tree.set_content(root, drafted.body, union(required, drafted.cited))?;
        tree.close(root)?;

        Ok(DraftOutcome {
            tree,
            issues: drafted.issues,
            usage: drafted.usage,
            stripped_citations: drafted.stripped,
            style: None,
        })
    }

    async fn draft_report(
        &self,
        gateway: &ModelGateway,
        query: &Query,
        evidence: &[Evidence],
        style: ReportStyle,
    ) -> Result<DraftOutcome, AgentError> {
        let mut assigned = assign_sections(&self.sections, evidence);
        fill_empty_sections(&mut assigned, MIN_SECTIONS);
        let section_step = DraftStep {
            name: "section",
            system_prompt: &self.section_prompt,
            max_tokens: self.max_tokens,
        };

        let populated: Vec<(&SectionSpec, &Vec<&Evidence>)> = self
            .sections
            .iter()
            .zip(&assigned)
            .filter(|(_, subset)| !subset.is_empty())
            .collect();
        tracing::debug!(
            sections = populated.len(),
            evidence = evidence.len(),
            %style,
            "drafting sections"
        );

        let calls = populated.iter().map(|(spec, subset)| {
            let prompt = build_section_prompt(query.text(), spec, style, subset);
            let step = &section_step;
            async move { write(gateway, step, &spec.title, &prompt, evidence, subset).await }
        });
        let sections: Vec<Drafted> = join_all(calls).await.into_iter().collect::<Result<_, _>>()?;

        let outline: Vec<(String, String)> = populated
            .iter()
            .zip(&sections)
            .map(|((spec, _), drafted)| (spec.title.clone(), drafted.body.clone()))
            .collect();
        let all: Vec<&Evidence> = evidence.iter().collect();
        let summary_step = DraftStep {
            name: "summary",
            system_prompt: &self.summary_prompt,
            max_tokens: self.max_tokens,
        };
        let summary = write(
            gateway,
            &summary_step,
            "summary",
            &build_summary_prompt(query.text(), &outline, style, &all),
            evidence,
            &all,
        )
        .await?;

        let mut outcome = DraftOutcome {
            tree: ReportTree::new(),
            issues: Vec::new(),
            usage: TokenUsage::default(),
            stripped_citations: 0,
            style: Some(style),
        };
        let root = outcome
            .tree
            .create_root(format!("Research Report: {}", query.text()))?;
        let mut children = Vec::with_capacity(sections.len());
        for ((spec, subset), drafted) in populated.into_iter().zip(sections) {
            let refs = union(ids_of(subset), drafted.cited);
            children.push(outcome.tree.add_child(root, spec.title.clone(), drafted.body, refs)?);
            outcome.issues.extend(drafted.issues);
            outcome.usage.accumulate(drafted.usage);
            outcome.stripped_citations += drafted.stripped;
        }
        outcome.tree.set_content(root, summary.body, summary.cited)?;
        outcome.issues.extend(summary.issues);
        outcome.usage.accumulate(summary.usage);
        outcome.stripped_citations += summary.stripped;

        for child in children {
            outcome.tree.close(child)?;
        }
        outcome.tree.close(root)?;
        Ok(outcome)
    }
}

/// Runs one drafting call and reconciles its citations.
///
/// An unparseable response does not fail the run: the body falls back to a
/// digest of the evidence the call was given and an issue is recorded.
async fn write(
    gateway: &ModelGateway,
    step: &DraftStep<'_>,
    label: &str,
    user_msg: &str,
    evidence: &[Evidence],
    subset: &[&Evidence],
) -> Result<Drafted, AgentError> {
    let completion = step.execute(gateway, user_msg).await?;
    let mut issues: Vec<ErrorRecord> = ErrorRecord::fallback(Stage::Drafting, &completion)
        .into_iter()
        .collect();

    match parse_draft(&completion.content) {
        Ok(draft) => {
            let checked = check_draft(&draft.body, &draft.citations, evidence);
            Ok(Drafted {
                body: checked.body,
                cited: checked.cited,
                stripped: checked.stripped.len(),
                issues,
                usage: completion.usage,
            })
        }
        Err(e) => {
            issues.push(ErrorRecord::new(
                Stage::Drafting,
                e.kind(),
                format!("{label}: {e}; drafted from evidence digest"),
            ));
            Ok(Drafted {
                body: evidence_digest(subset),
                cited: Vec::new(),
                stripped: 0,
                issues,
                usage: completion.usage,
            })
        }
    }
}

/// Routes each evidence item to the sections whose keywords match its claim.
///
/// Unmatched evidence goes to the first catch-all section, or to the first
/// section when none is configured, so no evidence is left unassigned.
fn assign_sections<'a>(sections: &[SectionSpec], evidence: &'a [Evidence]) -> Vec<Vec<&'a Evidence>> {
    let mut assigned: Vec<Vec<&Evidence>> = sections.iter().map(|_| Vec::new()).collect();
    let fallback = sections.iter().position(SectionSpec::is_catch_all).unwrap_or(0);
    for e in evidence {
        let mut matched = false;
        for (idx, spec) in sections.iter().enumerate() {
            if !spec.is_catch_all() && spec.matches(e.claim()) {
                if let Some(slot) = assigned.get_mut(idx) {
                    slot.push(e);
                    matched = true;
                }
            }
        }
        if !matched && let Some(slot) = assigned.get_mut(fallback) {
            slot.push(e);
        }
    }
    assigned
}

/// Moves evidence from the largest section into empty ones until at least
/// `min` sections are populated, or every item has a section of its own.
///
/// The donor's items keep their rank order and are split into contiguous
/// shares across the donor and the receiving sections, in section order, so
/// the earlier section receives the more relevant share. Every item stays in
/// exactly one of those sections.
fn fill_empty_sections(assigned: &mut [Vec<&Evidence>], min: usize) {
    let populated = assigned.iter().filter(|s| !s.is_empty()).count();
    let missing = min.saturating_sub(populated);
    if missing == 0 {
        return;
    }
    let Some(donor) = assigned
        .iter()
        .enumerate()
        .max_by(|(i, a), (j, b)| a.len().cmp(&b.len()).then_with(|| j.cmp(i)))
        .map(|(i, _)| i)
    else {
        return;
    };
    let Some(items) = assigned.get_mut(donor).map(std::mem::take) else {
        return;
    };

    let mut targets: Vec<usize> = assigned
        .iter()
        .enumerate()
        .filter(|(i, s)| *i != donor && s.is_empty())
        .map(|(i, _)| i)
        .take(missing)
        .collect();
    targets.push(donor);
    targets.sort_unstable();
    targets.truncate(items.len().max(1));

    let share = items.len() / targets.len();
    let extra = items.len() % targets.len();
    let mut rest = items.as_slice();
    for (k, idx) in targets.into_iter().enumerate() {
        let take = share + usize::from(k < extra);
        let (head, tail) = rest.split_at(take.min(rest.len()));
        if let Some(slot) = assigned.get_mut(idx) {
            slot.extend_from_slice(head);
        }
        rest = tail;
    }
}

/// A bulleted list of claims with their citation markers.
fn evidence_digest(evidence: &[&Evidence]) -> String {
    let mut body = String::new();
    for e in evidence {
        let _ = writeln!(body, "- {} [{}]", e.claim(), e.id());
    }
    body.trim_end().to_string()
}

fn ids_of(evidence: &[&Evidence]) -> Vec<EvidenceId> {
    evidence.iter().map(|e| e.id().clone()).collect()
}

/// `base` followed by the items of `extra` not already present.
fn union(mut base: Vec<EvidenceId>, extra: Vec<EvidenceId>) -> Vec<EvidenceId> {
    for id in extra {
        if !base.contains(&id) {
            base.push(id);
        }
    }
    base
}
