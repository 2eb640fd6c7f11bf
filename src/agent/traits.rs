//! Agent trait definition.
//!
//! Extraction and drafting steps implement this trait, which gives them a
//! uniform way to turn a system prompt plus a user message into a gateway
//! call.

use async_trait::async_trait;

use super::gateway::{Completion, ModelGateway};
use super::message::ChatRequest;
use crate::error::AgentError;

/// A role with a fixed system prompt and sampling configuration.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Agent name for logging and identification.
    fn name(&self) -> &'static str;

    /// System prompt that defines the agent's role and behavior.
    fn system_prompt(&self) -> &str;

    /// Whether to request JSON-formatted output.
    fn json_mode(&self) -> bool {
        false
    }

    /// Sampling temperature (0.0 = deterministic, higher = more creative).
    fn temperature(&self) -> f32 {
        0.0
    }

    /// Maximum tokens for the response.
    fn max_tokens(&self) -> u32 {
        2048
    }

    /// Builds the request this agent sends for `user_msg`.
    fn request(&self, user_msg: &str) -> ChatRequest {
        let mut request = ChatRequest::new(self.system_prompt(), user_msg);
        request.temperature = Some(self.temperature());
        request.max_tokens = Some(self.max_tokens());
        request.json_mode = self.json_mode();
        request
    }

    /// Executes the agent with the given user message through the gateway.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ProviderExhausted`] when no provider in the
    /// chain produced a response.
    async fn execute(&self, gateway: &ModelGateway, user_msg: &str) -> Result<Completion, AgentError> {
        let request = self.request(user_msg);
        let completion = gateway.complete(&request).await?;
        tracing::debug!(
            agent = self.name(),
            provider = %completion.provider,
            attempts = completion.attempts,
            tokens = completion.usage.total_tokens,
            "agent call completed"
        );
        Ok(completion)
    }
}
