//! Agentic retrieval-and-drafting workflow.
//!
//! Turns a [`Query`](crate::core::Query) into a cited report tree through
//! language-model calls routed over a fallback chain of OpenAI-compatible
//! providers.
//!
//! # Architecture
//!
//! ```text
//! Query → Orchestrator
//!   ├── RetrievalCoordinator (vector store + web search, concurrent)
//!   ├── ResearchAgent
//!   │   └── Fan-out → N concurrent extraction batches → Vec<Evidence>
//!   ├── DraftingAgent
//!   │   ├── RAG: single cited answer
//!   │   └── RESEARCH: concurrent sections + executive summary
//!   └── FinalReport (tree, evidence, degradation, quality)
//! ```
//!
//! Every model call goes through the shared [`ModelGateway`], which owns
//! retry, timeout, fallback and the concurrency budget.

pub mod citation;
pub mod claims;
pub mod client;
pub mod config;
pub mod drafting;
pub mod gateway;
pub mod message;
pub mod orchestrator;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod research;
pub mod state;
pub mod traits;

// Re-export key types
pub use client::{create_provider, create_providers};
pub use config::{AgentConfig, AgentConfigBuilder, ProviderSpec, SectionSpec};
pub use drafting::{DraftOutcome, DraftingAgent};
pub use gateway::{Completion, ModelGateway, ProviderStats, RetryPolicy};
pub use message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
pub use orchestrator::{FinalReport, Orchestrator, RunFailure};
pub use prompt::PromptSet;
pub use provider::LlmProvider;
pub use research::{ExtractionOutcome, ResearchAgent};
pub use state::{ErrorRecord, Stage, WorkflowState};
pub use traits::Agent;
