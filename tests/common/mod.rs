//! Scripted providers and retrieval sources shared by integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rag_research::agent::{
    AgentConfig, ChatRequest, ChatResponse, LlmProvider, ModelGateway, Orchestrator, RetryPolicy,
    TokenUsage,
};
use rag_research::error::AgentError;
use rag_research::retrieval::{RetrievalCoordinator, SearchSource, SourceHit};

/// Evidence id the scripted drafts cite but that never exists.
pub const HALLUCINATED_ID: &str = "e99";

/// Chunk blocks of an extraction prompt as `(id, score, content)`.
fn prompt_chunks(prompt: &str) -> Vec<(String, f64, String)> {
    prompt
        .split("<chunk id=\"")
        .skip(1)
        .filter_map(|block| {
            let id = block.split('"').next()?.to_string();
            let score = block
                .split("score=\"")
                .nth(1)?
                .split('"')
                .next()?
                .parse::<f64>()
                .ok()?;
            let content = block
                .split("<content>\n")
                .nth(1)?
                .split("\n</content>")
                .next()?
                .to_string();
            Some((id, score, content))
        })
        .collect()
}

/// Evidence ids listed in a drafting prompt.
fn prompt_evidence_ids(prompt: &str) -> Vec<String> {
    prompt
        .split("\"id\":")
        .skip(1)
        .filter_map(|s| s.trim_start().strip_prefix('"')?.split('"').next().map(ToString::to_string))
        .collect()
}

fn draft_reply(intro: &str, ids: &[String]) -> String {
    let markers: String = ids.iter().map(|id| format!(" [{id}]")).collect();
    serde_json::json!({
        "body": format!("{intro}{markers} [{HALLUCINATED_ID}]."),
        "citations": ids.iter().cloned().chain([HALLUCINATED_ID.to_string()]).collect::<Vec<_>>(),
    })
    .to_string()
}

/// Answers every workflow prompt by inspecting its tags.
///
/// Extraction turns each chunk into one claim carrying the chunk text and
/// the chunk's retrieval score as confidence. Drafts cite every evidence id
/// they were shown plus one that does not exist.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    name: String,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = request.user_text();
        let content = if prompt.contains("<sections>") {
            let first: Vec<String> = prompt_evidence_ids(&prompt).into_iter().take(1).collect();
            draft_reply("Overall the evidence agrees", &first)
        } else if prompt.contains("<section title=") {
            draft_reply("Section findings", &prompt_evidence_ids(&prompt))
        } else if prompt.contains("<chunks>") {
            let claims: Vec<serde_json::Value> = prompt_chunks(&prompt)
                .into_iter()
                .map(|(id, score, content)| {
                    serde_json::json!({"claim": content, "chunk_ids": [id], "confidence": score})
                })
                .collect();
            serde_json::json!({ "claims": claims }).to_string()
        } else if prompt.contains("<evidence>") {
            draft_reply("The evidence shows", &prompt_evidence_ids(&prompt))
        } else {
            return Err(AgentError::ProviderTransient {
                provider: self.name.clone(),
                message: "unrecognized prompt".to_string(),
            });
        };
        Ok(ChatResponse {
            content,
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
            ..ChatResponse::default()
        })
    }
}

/// Rejects every call with an authentication failure.
#[derive(Debug, Default)]
pub struct RejectingProvider;

#[async_trait]
impl LlmProvider for RejectingProvider {
    fn name(&self) -> &str {
        "rejecting"
    }

    async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        Err(AgentError::ProviderAuth {
            provider: "rejecting".to_string(),
            message: "invalid api key".to_string(),
        })
    }
}

/// Returns the same hits for every query.
#[derive(Debug, Clone)]
pub struct FixedSource {
    name: String,
    hits: Vec<SourceHit>,
}

impl FixedSource {
    pub fn new(name: &str, hits: &[(&str, &str, f64)]) -> Self {
        Self {
            name: name.to_string(),
            hits: hits
                .iter()
                .map(|(doc, text, score)| SourceHit::new(*doc, *text, *score))
                .collect(),
        }
    }
}

#[async_trait]
impl SearchSource for FixedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, _query: &str, top_k: usize) -> Result<Vec<SourceHit>, AgentError> {
        Ok(self.hits.iter().take(top_k).cloned().collect())
    }
}

/// Never answers within any reasonable timeout.
#[derive(Debug, Default)]
pub struct StalledSource;

#[async_trait]
impl SearchSource for StalledSource {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn search(&self, _query: &str, _top_k: usize) -> Result<Vec<SourceHit>, AgentError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }
}

/// Fails every query.
#[derive(Debug, Default)]
pub struct FailingSource;

#[async_trait]
impl SearchSource for FailingSource {
    fn name(&self) -> &str {
        "failing"
    }

    async fn search(&self, _query: &str, _top_k: usize) -> Result<Vec<SourceHit>, AgentError> {
        Err(AgentError::RetrievalSourceFailure {
            origin: "failing".to_string(),
            message: "connection refused".to_string(),
        })
    }
}

/// Engine settings for tests: a short retrieval timeout and defaults
/// elsewhere.
pub fn config() -> AgentConfig {
    AgentConfig::builder()
        .retrieval_timeout(Duration::from_secs(2))
        .build()
        .unwrap()
}

/// An orchestrator over `providers` with the given sources.
pub fn orchestrator(
    providers: Vec<Arc<dyn LlmProvider>>,
    vector: Arc<dyn SearchSource>,
    web: Option<Arc<dyn SearchSource>>,
) -> Orchestrator {
    let config = config();
    let gateway = Arc::new(ModelGateway::new(
        providers,
        RetryPolicy::no_retry(),
        Duration::from_secs(30),
        8,
    ));
    let retrieval = RetrievalCoordinator::new(vector, web, &config);
    Orchestrator::new(gateway, retrieval, &config)
}

/// Ten distinct fragments about heart disease, six from the vector store
/// and four from the web.
pub fn research_sources() -> (FixedSource, FixedSource) {
    let vector = FixedSource::new(
        "vector",
        &[
            ("cardio.pdf#1", "Chest pain or pressure is the most common early warning sign.", 0.95),
            ("cardio.pdf#2", "Shortness of breath during light activity often precedes a heart attack.", 0.9),
            ("cardio.pdf#3", "Women report nausea and jaw pain more often than men compared with classic symptoms.", 0.88),
            ("cardio.pdf#4", "Patients should seek emergency care when chest discomfort lasts minutes.", 0.85),
            ("risk.pdf#1", "Smokers face a risk of coronary disease two times higher than non-smokers.", 0.8),
            ("risk.pdf#2", "Unusual fatigue lasting days can signal reduced cardiac output.", 0.75),
        ],
    );
    let web = FixedSource::new(
        "web",
        &[
            ("https://heart.example/palpitations", "Irregular heartbeat or palpitations may indicate arrhythmia.", 0.82),
            ("https://heart.example/swelling", "Swelling in the legs and ankles can reflect heart failure.", 0.78),
            ("https://heart.example/prevent", "Adults should monitor blood pressure yearly to prevent heart disease.", 0.72),
            ("https://heart.example/sweat", "Cold sweats accompanying discomfort are a recognised attack symptom.", 0.7),
        ],
    );
    (vector, web)
}

/// Ten fragments whose claims match no section keyword, six from the vector
/// store and four from the web.
pub fn neutral_sources() -> (FixedSource, FixedSource) {
    let hits: Vec<(String, String, f64)> = (0..10u32)
        .map(|i| {
            (
                format!("symptoms-{i}.txt"),
                format!("Symptom number {i} is chest tightness variant {i}."),
                0.3f64.mul_add(-f64::from(i) / 10.0, 0.95),
            )
        })
        .collect();
    let borrowed: Vec<(&str, &str, f64)> = hits
        .iter()
        .map(|(doc, text, score)| (doc.as_str(), text.as_str(), *score))
        .collect();
    let (vector, web) = borrowed.split_at(6);
    (FixedSource::new("vector", vector), FixedSource::new("web", web))
}
