//! Pluggable model provider trait.
//!
//! Implementations translate [`ChatRequest`]/[`ChatResponse`] into
//! provider-specific SDK calls and classify their failures so the gateway
//! can decide between retrying and falling back.

use async_trait::async_trait;

use super::message::{ChatRequest, ChatResponse};
use crate::error::AgentError;

/// A language-model completion service.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name used in logs, failure lists and statistics.
    fn name(&self) -> &str;

    /// Executes a chat completion request.
    ///
    /// # Errors
    ///
    /// Must return [`AgentError::ProviderTransient`] for failures worth
    /// retrying (timeouts, rate limits, server errors) and
    /// [`AgentError::ProviderAuth`] for credential or invalid-request
    /// failures.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError>;
}
