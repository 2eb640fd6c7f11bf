//! `OpenAI` provider implementation using the `async-openai` crate.
//!
//! Supports any `OpenAI`-compatible API (`OpenAI`, Azure, Gemini's
//! compatibility endpoint, local proxies) via the base URL override in
//! [`ProviderSpec`].

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestAssistantMessageContent,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest, ResponseFormat,
};
use async_trait::async_trait;

use crate::agent::config::ProviderSpec;
use crate::agent::message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
use crate::agent::provider::LlmProvider;
use crate::error::AgentError;

/// API error types and codes that retrying will not fix.
const NON_RETRYABLE: &[&str] = &[
    "invalid_request_error",
    "authentication_error",
    "permission_error",
    "not_found_error",
    "invalid_api_key",
    "model_not_found",
    "insufficient_quota",
];

/// `OpenAI`-compatible model provider.
pub struct OpenAiProvider {
    name: String,
    model: String,
    client: Client<OpenAIConfig>,
}

impl OpenAiProvider {
    /// Creates a provider from one entry of the provider chain.
    #[must_use]
    pub fn new(spec: &ProviderSpec) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(&spec.api_key);

        if let Some(ref base_url) = spec.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }

        Self {
            name: spec.name.clone(),
            model: spec.model.clone(),
            client: Client::with_config(openai_config),
        }
    }

    /// Converts our message type to the `OpenAI` SDK type.
    fn convert_message(msg: &ChatMessage) -> ChatCompletionRequestMessage {
        match msg.role {
            Role::System => {
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                    content: ChatCompletionRequestSystemMessageContent::Text(msg.content.clone()),
                    name: None,
                })
            }
            Role::User => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(msg.content.clone()),
                name: None,
            }),
            Role::Assistant => {
                #[allow(deprecated)]
                ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                    content: Some(ChatCompletionRequestAssistantMessageContent::Text(
                        msg.content.clone(),
                    )),
                    name: None,
                    tool_calls: None,
                    refusal: None,
                    audio: None,
                    function_call: None,
                })
            }
        }
    }

    /// Builds an `OpenAI` chat completion request for this provider's model.
    fn build_request(&self, request: &ChatRequest) -> CreateChatCompletionRequest {
        let messages: Vec<_> = request.messages.iter().map(Self::convert_message).collect();

        let response_format = if request.json_mode {
            Some(ResponseFormat::JsonObject)
        } else {
            None
        };

        CreateChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: request.temperature.filter(|&t| t != 0.0),
            max_completion_tokens: request.max_tokens,
            response_format,
            ..Default::default()
        }
    }

    /// Maps an SDK error onto the gateway's retry classification.
    fn classify(&self, error: &OpenAIError) -> AgentError {
        let non_retryable = match error {
            OpenAIError::ApiError(api) => {
                let code = api.code.as_deref().unwrap_or_default();
                let kind = api.r#type.as_deref().unwrap_or_default();
                code != "rate_limit_exceeded"
                    && (NON_RETRYABLE.contains(&code) || NON_RETRYABLE.contains(&kind))
            }
            OpenAIError::Reqwest(e) => e
                .status()
                .is_some_and(|s| matches!(s.as_u16(), 400 | 401 | 403 | 404)),
            OpenAIError::InvalidArgument(_) => true,
            _ => false,
        };

        if non_retryable {
            AgentError::ProviderAuth {
                provider: self.name.clone(),
                message: error.to_string(),
            }
        } else {
            AgentError::ProviderTransient {
                provider: self.name.clone(),
                message: error.to_string(),
            }
        }
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("client", &"<async-openai::Client>")
            .finish()
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        let openai_request = self.build_request(request);

        let response = self
            .client
            .chat()
            .create(openai_request)
            .await
            .map_err(|e| self.classify(&e))?;

        let choice = response.choices.first();

        let content = choice
            .and_then(|c| c.message.content.as_ref())
            .cloned()
            .unwrap_or_default();

        let finish_reason = choice.and_then(|c| {
            c.finish_reason
                .as_ref()
                .map(|fr| format!("{fr:?}").to_lowercase())
        });

        let usage = response
            .usage
            .map_or_else(TokenUsage::default, |u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            });

        Ok(ChatResponse {
            content,
            usage,
            finish_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message;
    use async_openai::error::ApiError;

    fn provider() -> OpenAiProvider {
        OpenAiProvider::new(&ProviderSpec::openai("primary", "test", "gpt-4o-mini"))
    }

    fn api_error(kind: Option<&str>, code: Option<&str>) -> OpenAIError {
        OpenAIError::ApiError(ApiError {
            message: "boom".to_string(),
            r#type: kind.map(ToString::to_string),
            param: None,
            code: code.map(ToString::to_string),
        })
    }

    #[test]
    fn test_convert_messages() {
        let system = OpenAiProvider::convert_message(&message::system_message("test"));
        assert!(matches!(system, ChatCompletionRequestMessage::System(_)));
        let user = OpenAiProvider::convert_message(&message::user_message("hello"));
        assert!(matches!(user, ChatCompletionRequestMessage::User(_)));
    }

    #[test]
    fn test_build_request_uses_provider_model() {
        let mut request = ChatRequest::new("system", "user");
        request.json_mode = true;
        request.temperature = Some(0.0);
        request.max_tokens = Some(100);
        let built = provider().build_request(&request);
        assert_eq!(built.model, "gpt-4o-mini");
        assert!(built.response_format.is_some());
        assert!(built.temperature.is_none());
        assert_eq!(built.max_completion_tokens, Some(100));
    }

    #[test]
    fn test_classify_auth_failure() {
        let error = provider().classify(&api_error(Some("invalid_request_error"), Some("invalid_api_key")));
        assert!(matches!(error, AgentError::ProviderAuth { .. }));
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_classify_rate_limit_is_transient() {
        let error = provider().classify(&api_error(Some("requests"), Some("rate_limit_exceeded")));
        assert!(error.is_retryable());
        let error = provider().classify(&api_error(Some("server_error"), None));
        assert!(error.is_retryable());
    }

    #[test]
    fn test_classify_invalid_argument() {
        let error = provider().classify(&OpenAIError::InvalidArgument("bad".to_string()));
        assert!(matches!(error, AgentError::ProviderAuth { provider, .. } if provider == "primary"));
    }
}
