//! Retrieval from the vector store and web search collaborators.
//!
//! The engine only sees the [`SearchSource`] trait. HTTP implementations for
//! Tavily and Weaviate are available with the `http-sources` feature.

pub mod coordinator;
pub mod source;
#[cfg(feature = "http-sources")]
pub mod tavily;
#[cfg(feature = "http-sources")]
pub mod weaviate;

pub use coordinator::{RetrievalCoordinator, RetrievalOutcome};
pub use source::{SearchSource, SourceHit};
#[cfg(feature = "http-sources")]
pub use tavily::TavilySearch;
#[cfg(feature = "http-sources")]
pub use weaviate::WeaviateStore;
