//! End-to-end workflow scenarios against scripted providers and sources.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use common::{
    FailingSource, FixedSource, HALLUCINATED_ID, RejectingProvider, ScriptedProvider, StalledSource,
    neutral_sources, orchestrator, research_sources,
};
use rag_research::agent::{LlmProvider, Stage};
use rag_research::core::{Query, QueryMode, SourceType};
use rag_research::error::ErrorKind;
use rag_research::retrieval::SearchSource;
use tokio_util::sync::CancellationToken;

fn scripted() -> Vec<Arc<dyn LlmProvider>> {
    vec![Arc::new(ScriptedProvider::new("primary")) as Arc<dyn LlmProvider>]
}

fn heart_vector() -> Arc<dyn SearchSource> {
    Arc::new(FixedSource::new(
        "vector",
        &[
            ("guide.pdf#1", "Chest pain or pressure is an early warning sign of heart disease.", 0.9),
            ("guide.pdf#2", "Shortness of breath with mild exertion can signal heart trouble.", 0.7),
            ("notes.txt#4", "Some patients notice fatigue weeks before a cardiac event.", 0.4),
        ],
    ))
}

#[tokio::test(start_paused = true)]
async fn test_rag_with_web_timeout_is_degraded() {
    let engine = orchestrator(scripted(), heart_vector(), Some(Arc::new(StalledSource)));
    let report = engine
        .run(Query::new("early warning signs of heart disease", QueryMode::Rag, 10))
        .await
        .unwrap_or_else(|_| unreachable!());

    assert!(report.degraded);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, ErrorKind::RetrievalSourceTimeout);
    assert_eq!(report.errors[0].stage, Stage::Retrieving);

    assert_eq!(report.chunks.len(), 3);
    assert!(report.chunks.iter().all(|c| c.source_type == SourceType::Vector));
    assert_eq!(report.evidence.len(), 3);

    assert_eq!(report.records.len(), 1);
    let root = &report.records[0];
    assert_eq!(root.title, "Answer: early warning signs of heart disease");
    let cited: BTreeSet<&str> = root.cited_evidence.iter().map(|id| id.as_str()).collect();
    assert!(cited.contains("e1"));
    assert!(cited.contains("e2"));
    assert!(report.evidence[0].confidence() > 0.85);
}

#[tokio::test]
async fn test_research_report_has_sections_citing_all_strong_evidence() {
    let (vector, web) = research_sources();
    let engine = orchestrator(scripted(), Arc::new(vector), Some(Arc::new(web)));
    let report = engine
        .run(Query::new("early warning signs of heart disease", QueryMode::Research, 10))
        .await
        .unwrap_or_else(|_| unreachable!());

    assert!(!report.degraded, "{:?}", report.errors);
    assert_eq!(report.chunks.len(), 10);
    assert_eq!(report.evidence.len(), 10);

    let sections: Vec<&str> = report
        .records
        .iter()
        .filter(|r| r.depth == 1)
        .map(|r| r.title.as_str())
        .collect();
    assert!(sections.len() >= 2, "{sections:?}");
    assert!(sections.contains(&"Findings"));
    assert!(sections.contains(&"Comparative Analysis"));
    assert!(sections.contains(&"Recommendations"));
    assert!(report.records[0].title.starts_with("Research Report: "));
    assert!(report.tree.iter().all(|n| n.is_closed()));

    let cited = report.tree.cited_evidence();
    for e in report.evidence.iter().filter(|e| e.confidence() > 0.5) {
        assert!(cited.contains(e.id()), "{} not cited", e.id());
    }
    assert!(report.usage.total_tokens > 0);
}

#[tokio::test]
async fn test_research_report_without_keyword_matches_keeps_two_sections() {
    let (vector, web) = neutral_sources();
    let engine = orchestrator(scripted(), Arc::new(vector), Some(Arc::new(web)));
    let report = engine
        .run(Query::new("chest tightness symptoms", QueryMode::Research, 10))
        .await
        .unwrap_or_else(|_| unreachable!());

    assert!(!report.degraded, "{:?}", report.errors);
    assert_eq!(report.evidence.len(), 10);

    let sections: Vec<&str> = report
        .records
        .iter()
        .filter(|r| r.depth == 1)
        .map(|r| r.title.as_str())
        .collect();
    assert_eq!(sections, vec!["Findings", "Comparative Analysis"]);

    let cited = report.tree.cited_evidence();
    for e in report.evidence.iter().filter(|e| e.confidence() > 0.5) {
        assert!(cited.contains(e.id()), "{} not cited", e.id());
    }
}

#[tokio::test]
async fn test_citations_only_reference_known_evidence() {
    let (vector, web) = research_sources();
    let engine = orchestrator(scripted(), Arc::new(vector), Some(Arc::new(web)));
    let report = engine
        .run(Query::new("heart disease symptoms", QueryMode::Research, 10))
        .await
        .unwrap_or_else(|_| unreachable!());

    let known: BTreeSet<&str> = report.evidence.iter().map(|e| e.id().as_str()).collect();
    for record in &report.records {
        for id in &record.cited_evidence {
            assert!(known.contains(id.as_str()), "unknown citation {id}");
        }
        assert!(!record.body.contains(&format!("[{HALLUCINATED_ID}]")));
    }
    let chunk_ids: BTreeSet<_> = report.chunks.iter().map(|c| &c.id).collect();
    for e in &report.evidence {
        assert!(!e.supporting_chunk_ids().is_empty());
        assert!(e.supporting_chunk_ids().iter().all(|id| chunk_ids.contains(id)));
    }
}

#[tokio::test]
async fn test_all_sources_failing_errors_without_tree() {
    let engine = orchestrator(scripted(), Arc::new(FailingSource), Some(Arc::new(FailingSource)));
    let failure = engine
        .run(Query::new("early warning signs of heart disease", QueryMode::Rag, 10))
        .await
        .err()
        .unwrap_or_else(|| unreachable!());

    assert_eq!(failure.error.kind(), ErrorKind::NoEvidenceAvailable);
    assert_eq!(failure.failed_stage, Stage::Retrieving);
    assert_eq!(failure.state.stage(), Stage::Errored);
    assert!(failure.state.tree().is_none());
    assert!(failure.state.evidence().is_empty());
    assert!(!failure.state.errors().is_empty());
}

#[tokio::test]
async fn test_rejected_primary_falls_back_to_secondary() {
    let secondary = Arc::new(ScriptedProvider::new("secondary"));
    let providers: Vec<Arc<dyn LlmProvider>> = vec![
        Arc::new(RejectingProvider),
        Arc::clone(&secondary) as Arc<dyn LlmProvider>,
    ];
    let engine = orchestrator(providers, heart_vector(), None);
    let report = engine
        .run(Query::new("early warning signs of heart disease", QueryMode::Rag, 10))
        .await
        .unwrap_or_else(|_| unreachable!());

    assert!(report.degraded);
    assert!(report.errors.iter().all(|e| e.kind == ErrorKind::ProviderFallback));
    assert!(report.errors.iter().any(|e| e.stage == Stage::Extracting));
    assert!(report.errors.iter().any(|e| e.stage == Stage::Drafting));

    let stats = engine.gateway().stats();
    assert_eq!(stats[0].served, 0);
    assert!(stats[0].failed > 0);
    assert_eq!(stats[1].served, u64::try_from(secondary.calls()).unwrap_or_default());
    assert_eq!(stats[1].failed, 0);
}

#[tokio::test]
async fn test_blank_query_errors_at_intake() {
    let engine = orchestrator(scripted(), heart_vector(), None);
    let failure = engine
        .run(Query::new("   ", QueryMode::Rag, 10))
        .await
        .err()
        .unwrap_or_else(|| unreachable!());
    assert_eq!(failure.error.kind(), ErrorKind::InvalidQuery);
    assert_eq!(failure.failed_stage, Stage::Intake);
    assert!(failure.state.chunks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_during_retrieval() {
    let engine = orchestrator(scripted(), Arc::new(StalledSource), None);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });
    let failure = engine
        .run_with_cancel(Query::new("heart disease", QueryMode::Rag, 10), cancel)
        .await
        .err()
        .unwrap_or_else(|| unreachable!());
    assert_eq!(failure.error.kind(), ErrorKind::Cancelled);
    assert_eq!(failure.failed_stage, Stage::Retrieving);
    assert!(failure.state.tree().is_none());
}

#[tokio::test]
async fn test_concurrent_runs_are_isolated() {
    let (vector, web) = research_sources();
    let engine = orchestrator(scripted(), Arc::new(vector), Some(Arc::new(web)));
    let (rag, research) = tokio::join!(
        engine.run(Query::new("heart attack warning signs", QueryMode::Rag, 5)),
        engine.run(Query::new("heart disease prevention", QueryMode::Research, 10)),
    );
    let rag = rag.unwrap_or_else(|_| unreachable!());
    let research = research.unwrap_or_else(|_| unreachable!());

    assert_ne!(rag.run_id, research.run_id);
    assert_eq!(rag.chunks.len(), 5);
    assert_eq!(research.chunks.len(), 10);
    assert_eq!(rag.records.len(), 1);
    assert!(research.records.len() > 1);
    assert_eq!(rag.query.text(), "heart attack warning signs");
}

#[tokio::test]
async fn test_identical_runs_produce_identical_evidence() {
    let (vector, web) = research_sources();
    let engine = orchestrator(scripted(), Arc::new(vector), Some(Arc::new(web)));
    let first = engine
        .run(Query::new("heart disease", QueryMode::Rag, 10))
        .await
        .unwrap_or_else(|_| unreachable!());
    let second = engine
        .run(Query::new("heart disease", QueryMode::Rag, 10))
        .await
        .unwrap_or_else(|_| unreachable!());

    let claims = |r: &rag_research::FinalReport| -> Vec<(String, String)> {
        r.evidence
            .iter()
            .map(|e| (e.id().to_string(), e.claim().to_string()))
            .collect()
    };
    assert_eq!(claims(&first), claims(&second));
    assert_eq!(first.records, second.records);
}
