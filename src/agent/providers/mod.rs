//! Concrete [`LlmProvider`](super::LlmProvider) implementations.

pub mod openai;

pub use openai::OpenAiProvider;
