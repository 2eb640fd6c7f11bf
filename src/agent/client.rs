//! Provider registry and factory.
//!
//! Maps [`ProviderSpec`] kinds to concrete [`LlmProvider`] implementations.

use std::sync::Arc;

use crate::agent::config::{AgentConfig, ProviderSpec};
use crate::agent::provider::LlmProvider;
use crate::agent::providers::OpenAiProvider;
use crate::error::AgentError;

/// Creates an [`LlmProvider`] for one chain entry.
///
/// # Supported Providers
///
/// - `"openai"`: `OpenAI`-compatible APIs via `async-openai`
///
/// # Errors
///
/// Returns [`AgentError::ApiKeyMissing`] for a blank key and
/// [`AgentError::UnsupportedProvider`] for unknown kinds.
pub fn create_provider(spec: &ProviderSpec) -> Result<Arc<dyn LlmProvider>, AgentError> {
    if spec.api_key.trim().is_empty() {
        return Err(AgentError::ApiKeyMissing);
    }
    match spec.kind.as_str() {
        "openai" => Ok(Arc::new(OpenAiProvider::new(spec))),
        other => Err(AgentError::UnsupportedProvider {
            name: other.to_string(),
        }),
    }
}

/// Creates the whole provider chain, primary first.
///
/// # Errors
///
/// Returns [`AgentError::ApiKeyMissing`] when the chain is empty, or the
/// first error from [`create_provider`].
pub fn create_providers(config: &AgentConfig) -> Result<Vec<Arc<dyn LlmProvider>>, AgentError> {
    if config.providers.is_empty() {
        return Err(AgentError::ApiKeyMissing);
    }
    config.providers.iter().map(create_provider).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_openai_provider() {
        let spec = ProviderSpec::openai("primary", "test", "gpt-4o-mini");
        let provider = create_provider(&spec).unwrap_or_else(|_| unreachable!());
        assert_eq!(provider.name(), "primary");
    }

    #[test]
    fn test_create_unknown_provider() {
        let mut spec = ProviderSpec::openai("x", "test", "m");
        spec.kind = "unknown".to_string();
        assert!(matches!(
            create_provider(&spec),
            Err(AgentError::UnsupportedProvider { .. })
        ));
    }

    #[test]
    fn test_empty_chain_needs_key() {
        let config = AgentConfig::builder()
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert!(matches!(
            create_providers(&config),
            Err(AgentError::ApiKeyMissing)
        ));
    }
}
