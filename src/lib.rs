//! # rag-research
//!
//! Agentic retrieval-and-drafting engine. A question goes in; a cited,
//! evidence-backed report tree comes out.
//!
//! A run retrieves fragments from a vector store and a web search source,
//! extracts atomic claims from them with a language model, and drafts
//! either a single answer ([`QueryMode::Rag`]) or a multi-section report
//! ([`QueryMode::Research`]). Every claim in the report cites evidence, and
//! every piece of evidence names the fragments it came from.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rag_research::agent::{AgentConfig, ModelGateway, Orchestrator, create_providers};
//! use rag_research::core::{Query, QueryMode};
//! use rag_research::retrieval::{RetrievalCoordinator, WeaviateStore};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = AgentConfig::builder().from_env().build()?;
//! let gateway = Arc::new(ModelGateway::from_config(create_providers(&config)?, &config));
//! let vector = Arc::new(WeaviateStore::new("http://localhost:8080"));
//! let retrieval = RetrievalCoordinator::new(vector, None, &config);
//! let orchestrator = Orchestrator::new(gateway, retrieval, &config);
//!
//! let report = orchestrator
//!     .run(Query::new("early warning signs of heart disease", QueryMode::Rag, 10))
//!     .await?;
//! for record in &report.records {
//!     tracing::info!(depth = record.depth, title = %record.title);
//! }
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod cli;
pub mod core;
pub mod error;
pub mod retrieval;

pub use agent::{AgentConfig, FinalReport, ModelGateway, Orchestrator, RunFailure};
pub use core::{Evidence, EvidenceId, Query, QueryMode, ReportTree, RetrievedChunk, SourceType};
pub use error::{AgentError, ErrorKind};
