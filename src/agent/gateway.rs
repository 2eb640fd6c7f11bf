//! Model provider gateway: one call interface over an ordered provider chain.
//!
//! Each call walks the chain primary first. Transient failures are retried
//! on the same provider with exponential backoff; non-retryable failures
//! advance immediately. Every attempt holds a permit from a semaphore shared
//! by all runs using the gateway, which is the global rate-limit budget.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;

use super::config::AgentConfig;
use super::message::{ChatRequest, ChatResponse, TokenUsage};
use super::provider::LlmProvider;
use crate::error::{AgentError, ProviderFailure};

/// Retry schedule for transient provider failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Cap on any single delay.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Policy with no retries.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (0-indexed), doubling each time.
    #[must_use]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl From<&AgentConfig> for RetryPolicy {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
        }
    }
}

/// A successful gateway call.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Generated text.
    pub content: String,
    /// Token usage reported by the serving provider.
    pub usage: TokenUsage,
    /// Finish reason reported by the serving provider.
    pub finish_reason: Option<String>,
    /// Name of the provider that served the call.
    pub provider: String,
    /// Position of that provider in the chain (0 = primary).
    pub provider_index: usize,
    /// Attempts made against the serving provider.
    pub attempts: u32,
    /// Providers that gave up before this one, in chain order.
    pub bypassed: Vec<ProviderFailure>,
}

impl Completion {
    /// Whether the primary provider was bypassed.
    #[must_use]
    pub const fn used_fallback(&self) -> bool {
        self.provider_index > 0
    }
}

/// Per-provider call counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStats {
    /// Provider name.
    pub provider: String,
    /// Calls this provider served.
    pub served: u64,
    /// Calls on which this provider gave up.
    pub failed: u64,
}

/// Uniform completion interface across an ordered provider list.
pub struct ModelGateway {
    providers: Vec<Arc<dyn LlmProvider>>,
    policy: RetryPolicy,
    call_timeout: Duration,
    budget: Arc<Semaphore>,
    served: Vec<AtomicU64>,
    failed: Vec<AtomicU64>,
}

impl std::fmt::Debug for ModelGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelGateway")
            .field("providers", &self.provider_names())
            .field("policy", &self.policy)
            .field("call_timeout", &self.call_timeout)
            .field("available_permits", &self.budget.available_permits())
            .finish_non_exhaustive()
    }
}

impl ModelGateway {
    /// Creates a gateway. `rate_limit` bounds in-flight provider calls
    /// across every caller sharing this gateway.
    #[must_use]
    pub fn new(
        providers: Vec<Arc<dyn LlmProvider>>,
        policy: RetryPolicy,
        call_timeout: Duration,
        rate_limit: usize,
    ) -> Self {
        let served = providers.iter().map(|_| AtomicU64::new(0)).collect();
        let failed = providers.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            providers,
            policy,
            call_timeout,
            budget: Arc::new(Semaphore::new(rate_limit.max(1))),
            served,
            failed,
        }
    }

    /// Creates a gateway using the retry, timeout and budget settings of
    /// `config`.
    #[must_use]
    pub fn from_config(providers: Vec<Arc<dyn LlmProvider>>, config: &AgentConfig) -> Self {
        Self::new(
            providers,
            RetryPolicy::from(config),
            config.provider_timeout,
            config.provider_rate_limit,
        )
    }

    /// Provider names in chain order.
    #[must_use]
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Sends `request` through the provider chain.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ProviderExhausted`] with one entry per provider
    /// when no provider produced a response.
    pub async fn complete(&self, request: &ChatRequest) -> Result<Completion, AgentError> {
        let mut failures: Vec<ProviderFailure> = Vec::new();

        for (index, provider) in self.providers.iter().enumerate() {
            let mut attempts: u32 = 0;
            loop {
                attempts += 1;
                match self.attempt(provider.as_ref(), request).await {
                    Ok(response) => {
                        if let Some(counter) = self.served.get(index) {
                            counter.fetch_add(1, Ordering::Relaxed);
                        }
                        if index > 0 {
                            tracing::info!(
                                provider = provider.name(),
                                bypassed = failures.len(),
                                "fallback provider served call"
                            );
                        }
                        return Ok(Completion {
                            content: response.content,
                            usage: response.usage,
                            finish_reason: response.finish_reason,
                            provider: provider.name().to_string(),
                            provider_index: index,
                            attempts,
                            bypassed: failures,
                        });
                    }
                    Err(error) if error.is_retryable() && attempts <= self.policy.max_retries => {
                        let delay = self.policy.delay_for_retry(attempts - 1);
                        tracing::debug!(
                            provider = provider.name(),
                            attempt = attempts,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            error = %error,
                            "retrying provider call"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    Err(error) => {
                        tracing::warn!(
                            provider = provider.name(),
                            attempts,
                            kind = %error.kind(),
                            error = %error,
                            "provider gave up, advancing chain"
                        );
                        if let Some(counter) = self.failed.get(index) {
                            counter.fetch_add(1, Ordering::Relaxed);
                        }
                        failures.push(ProviderFailure {
                            provider: provider.name().to_string(),
                            attempts,
                            kind: error.kind(),
                            reason: error.to_string(),
                        });
                        break;
                    }
                }
            }
        }

        Err(AgentError::ProviderExhausted { failures })
    }

    /// One provider call under the shared budget and the call timeout.
    async fn attempt(
        &self,
        provider: &dyn LlmProvider,
        request: &ChatRequest,
    ) -> Result<ChatResponse, AgentError> {
        let _permit = self
            .budget
            .acquire()
            .await
            .map_err(|e| AgentError::ProviderTransient {
                provider: provider.name().to_string(),
                message: format!("rate-limit budget unavailable: {e}"),
            })?;

        match tokio::time::timeout(self.call_timeout, provider.chat(request)).await {
            Ok(result) => result,
            Err(_) => Err(AgentError::ProviderTransient {
                provider: provider.name().to_string(),
                message: format!("timed out after {:?}", self.call_timeout),
            }),
        }
    }

    /// Call counters per provider, in chain order.
    #[must_use]
    pub fn stats(&self) -> Vec<ProviderStats> {
        self.providers
            .iter()
            .enumerate()
            .map(|(i, p)| ProviderStats {
                provider: p.name().to_string(),
                served: self.served.get(i).map_or(0, |c| c.load(Ordering::Relaxed)),
                failed: self.failed.get(i).map_or(0, |c| c.load(Ordering::Relaxed)),
            })
            .collect()
    }
}
