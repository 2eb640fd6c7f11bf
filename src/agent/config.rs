//! Engine configuration with builder pattern and opt-in environment support.
//!
//! The engine only ever receives an explicit [`AgentConfig`]. Reading the
//! process environment happens in [`AgentConfigBuilder::from_env`], which the
//! CLI calls and library users may ignore.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::normalize_text;
use crate::error::AgentError;

/// Default maximum retries per provider for transient failures.
const DEFAULT_MAX_RETRIES: u32 = 2;
/// Default delay before the first retry.
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);
/// Default upper bound on a single retry delay.
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(8);
/// Default timeout for one provider call.
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 60;
/// Default timeout for one retrieval source call.
const DEFAULT_RETRIEVAL_TIMEOUT_SECS: u64 = 15;
/// Default extraction worker pool size.
const DEFAULT_MAX_CONCURRENCY: usize = 4;
/// Default global cap on in-flight provider calls.
const DEFAULT_PROVIDER_RATE_LIMIT: usize = 16;
/// Default chunks per extraction batch.
const DEFAULT_BATCH_SIZE: usize = 4;
/// Claims below this confidence are discarded at extraction.
const DEFAULT_MIN_CONFIDENCE: f64 = 0.2;
/// Evidence above this confidence must be cited by the report.
const DEFAULT_CITATION_THRESHOLD: f64 = 0.5;
/// Word-set similarity at which two chunks are duplicates.
const DEFAULT_DEDUP_SIMILARITY: f64 = 0.9;
/// Default merged chunks kept per run.
const DEFAULT_MAX_RESULTS: usize = 10;
/// Default extraction max tokens.
const DEFAULT_EXTRACTION_MAX_TOKENS: u32 = 2048;
/// Default drafting max tokens.
const DEFAULT_DRAFTING_MAX_TOKENS: u32 = 2048;
/// Default primary model.
const DEFAULT_MODEL: &str = "gpt-4o-mini";
/// Default fallback model, served through Gemini's `OpenAI`-compatible API.
const DEFAULT_FALLBACK_MODEL: &str = "gemini-2.0-flash";
/// Default fallback base URL.
const DEFAULT_FALLBACK_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai/";

/// One entry of the provider chain.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderSpec {
    /// Implementation kind, e.g. `"openai"`.
    pub kind: String,
    /// Display name used in logs and failure lists.
    pub name: String,
    /// API key.
    pub api_key: String,
    /// Optional base URL override for compatible APIs.
    pub base_url: Option<String>,
    /// Model identifier.
    pub model: String,
}

impl ProviderSpec {
    /// An `OpenAI`-compatible provider.
    #[must_use]
    pub fn openai(
        name: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            kind: "openai".to_string(),
            name: name.into(),
            api_key: api_key.into(),
            base_url: None,
            model: model.into(),
        }
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }
}

impl fmt::Debug for ProviderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSpec")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

/// A section of a research-mode report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionSpec {
    /// Section title.
    pub title: String,
    /// Lowercase keywords routing evidence to this section. Empty means the
    /// section collects evidence no other section claimed.
    pub keywords: Vec<String>,
    /// Instruction given to the model when drafting the section.
    pub guidance: String,
}

impl SectionSpec {
    /// Creates a section.
    #[must_use]
    pub fn new(title: impl Into<String>, keywords: &[&str], guidance: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            keywords: keywords.iter().map(|k| normalize_text(k)).collect(),
            guidance: guidance.into(),
        }
    }

    /// Whether this section takes unmatched evidence.
    #[must_use]
    pub fn is_catch_all(&self) -> bool {
        self.keywords.is_empty()
    }

    /// Whether any keyword occurs as a word of `claim`.
    #[must_use]
    pub fn matches(&self, claim: &str) -> bool {
        let normalized = normalize_text(claim);
        let words: BTreeSet<&str> = normalized.split(' ').collect();
        self.keywords.iter().any(|k| words.contains(k.as_str()))
    }
}

/// Findings / Comparative Analysis / Recommendations.
#[must_use]
pub fn default_sections() -> Vec<SectionSpec> {
    vec![
        SectionSpec::new(
            "Findings",
            &[],
            "Summarize the key findings that answer the question.",
        ),
        SectionSpec::new(
            "Comparative Analysis",
            &["compare", "compared", "comparison", "versus", "vs", "higher", "lower", "than", "more", "less"],
            "Contrast the evidence, noting agreements, differences and relative magnitudes.",
        ),
        SectionSpec::new(
            "Recommendations",
            &["recommend", "recommended", "should", "prevent", "advise", "avoid", "consider"],
            "Give actionable recommendations supported by the evidence.",
        ),
    ]
}

/// Configuration for the workflow engine.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Ordered provider chain, primary first.
    pub providers: Vec<ProviderSpec>,
    /// Retries per provider after the first attempt, for transient failures.
    pub max_retries: u32,
    /// Delay before the first retry; doubles per retry.
    pub initial_backoff: Duration,
    /// Upper bound on a single retry delay.
    pub max_backoff: Duration,
    /// Timeout applied to each provider call.
    pub provider_timeout: Duration,
    /// Timeout applied to each retrieval source call.
    pub retrieval_timeout: Duration,
    /// Concurrent extraction batches per run.
    pub max_concurrency: usize,
    /// In-flight provider calls allowed across every run sharing a gateway.
    pub provider_rate_limit: usize,
    /// Chunks per extraction batch.
    pub batch_size: usize,
    /// Claims below this confidence are dropped.
    pub min_confidence: f64,
    /// Evidence above this confidence must be cited in the report.
    pub citation_threshold: f64,
    /// Word-set similarity at which two chunks count as duplicates.
    pub dedup_similarity: f64,
    /// Result limit used when the caller does not give one.
    pub default_max_results: usize,
    /// Maximum tokens for extraction responses.
    pub extraction_max_tokens: u32,
    /// Maximum tokens for drafting responses.
    pub drafting_max_tokens: u32,
    /// Research-mode sections, in report order.
    pub sections: Vec<SectionSpec>,
    /// Directory containing prompt template overrides.
    pub prompt_dir: Option<PathBuf>,
}

impl AgentConfig {
    /// Creates a new builder for `AgentConfig`.
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            provider_timeout: Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS),
            retrieval_timeout: Duration::from_secs(DEFAULT_RETRIEVAL_TIMEOUT_SECS),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            provider_rate_limit: DEFAULT_PROVIDER_RATE_LIMIT,
            batch_size: DEFAULT_BATCH_SIZE,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            citation_threshold: DEFAULT_CITATION_THRESHOLD,
            dedup_similarity: DEFAULT_DEDUP_SIMILARITY,
            default_max_results: DEFAULT_MAX_RESULTS,
            extraction_max_tokens: DEFAULT_EXTRACTION_MAX_TOKENS,
            drafting_max_tokens: DEFAULT_DRAFTING_MAX_TOKENS,
            sections: default_sections(),
            prompt_dir: None,
        }
    }
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Clone, Default)]
pub struct AgentConfigBuilder {
    providers: Vec<ProviderSpec>,
    max_retries: Option<u32>,
    initial_backoff: Option<Duration>,
    max_backoff: Option<Duration>,
    provider_timeout: Option<Duration>,
    retrieval_timeout: Option<Duration>,
    max_concurrency: Option<usize>,
    provider_rate_limit: Option<usize>,
    batch_size: Option<usize>,
    min_confidence: Option<f64>,
    citation_threshold: Option<f64>,
    dedup_similarity: Option<f64>,
    default_max_results: Option<usize>,
    extraction_max_tokens: Option<u32>,
    drafting_max_tokens: Option<u32>,
    sections: Option<Vec<SectionSpec>>,
    prompt_dir: Option<PathBuf>,
}

impl AgentConfigBuilder {
    /// Populates unset fields from process environment variables.
    #[must_use]
    pub fn from_env(self) -> Self {
        self.from_vars(|key| std::env::var(key).ok())
    }

    /// Populates unset fields from a variable lookup.
    ///
    /// The provider chain is only filled when no provider was added
    /// explicitly: `OPENAI_API_KEY` (or `RAG_API_KEY`) gives the primary,
    /// `RAG_FALLBACK_API_KEY` an optional fallback.
    #[must_use]
    pub fn from_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if self.providers.is_empty() {
            if let Some(key) = var("OPENAI_API_KEY").or_else(|| var("RAG_API_KEY")) {
                let model = var("RAG_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
                let mut spec = ProviderSpec::openai("primary", key, model);
                spec.base_url = var("OPENAI_BASE_URL");
                self.providers.push(spec);
            }
            if let Some(key) = var("RAG_FALLBACK_API_KEY") {
                let model = var("RAG_FALLBACK_MODEL")
                    .unwrap_or_else(|| DEFAULT_FALLBACK_MODEL.to_string());
                let base_url = var("RAG_FALLBACK_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_FALLBACK_BASE_URL.to_string());
                self.providers
                    .push(ProviderSpec::openai("fallback", key, model).with_base_url(base_url));
            }
        }
        if self.max_concurrency.is_none() {
            self.max_concurrency = var("RAG_MAX_CONCURRENCY").and_then(|v| v.parse().ok());
        }
        if self.batch_size.is_none() {
            self.batch_size = var("RAG_BATCH_SIZE").and_then(|v| v.parse().ok());
        }
        if self.prompt_dir.is_none() {
            self.prompt_dir = var("RAG_PROMPT_DIR").map(PathBuf::from);
        }
        self
    }

    /// Appends a provider to the chain.
    #[must_use]
    pub fn provider(mut self, spec: ProviderSpec) -> Self {
        self.providers.push(spec);
        self
    }

    /// Sets the retries per provider.
    #[must_use]
    pub const fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Sets the first retry delay.
    #[must_use]
    pub const fn initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = Some(delay);
        self
    }

    /// Sets the retry delay cap.
    #[must_use]
    pub const fn max_backoff(mut self, delay: Duration) -> Self {
        self.max_backoff = Some(delay);
        self
    }

    /// Sets the per-call provider timeout.
    #[must_use]
    pub const fn provider_timeout(mut self, duration: Duration) -> Self {
        self.provider_timeout = Some(duration);
        self
    }

    /// Sets the per-source retrieval timeout.
    #[must_use]
    pub const fn retrieval_timeout(mut self, duration: Duration) -> Self {
        self.retrieval_timeout = Some(duration);
        self
    }

    /// Sets the extraction worker pool size.
    #[must_use]
    pub const fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = Some(n);
        self
    }

    /// Sets the global in-flight provider call budget.
    #[must_use]
    pub const fn provider_rate_limit(mut self, n: usize) -> Self {
        self.provider_rate_limit = Some(n);
        self
    }

    /// Sets the batch size.
    #[must_use]
    pub const fn batch_size(mut self, n: usize) -> Self {
        self.batch_size = Some(n);
        self
    }

    /// Sets the claim confidence floor.
    #[must_use]
    pub const fn min_confidence(mut self, value: f64) -> Self {
        self.min_confidence = Some(value);
        self
    }

    /// Sets the high-confidence citation threshold.
    #[must_use]
    pub const fn citation_threshold(mut self, value: f64) -> Self {
        self.citation_threshold = Some(value);
        self
    }

    /// Sets the near-duplicate similarity threshold.
    #[must_use]
    pub const fn dedup_similarity(mut self, value: f64) -> Self {
        self.dedup_similarity = Some(value);
        self
    }

    /// Sets the default result limit.
    #[must_use]
    pub const fn default_max_results(mut self, n: usize) -> Self {
        self.default_max_results = Some(n);
        self
    }

    /// Sets the extraction max tokens.
    #[must_use]
    pub const fn extraction_max_tokens(mut self, n: u32) -> Self {
        self.extraction_max_tokens = Some(n);
        self
    }

    /// Sets the drafting max tokens.
    #[must_use]
    pub const fn drafting_max_tokens(mut self, n: u32) -> Self {
        self.drafting_max_tokens = Some(n);
        self
    }

    /// Replaces the research-mode sections.
    #[must_use]
    pub fn sections(mut self, sections: Vec<SectionSpec>) -> Self {
        self.sections = Some(sections);
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Builds the [`AgentConfig`].
    ///
    /// An empty provider chain is accepted here; it is rejected when
    /// providers are instantiated, so callers injecting their own providers
    /// need no credentials.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Config`] for zero-sized pools or batches,
    /// thresholds outside `[0, 1]`, or fewer than two report sections.
    pub fn build(self) -> Result<AgentConfig, AgentError> {
        let defaults = AgentConfig::default();
        let config = AgentConfig {
            providers: self.providers,
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            initial_backoff: self.initial_backoff.unwrap_or(defaults.initial_backoff),
            max_backoff: self.max_backoff.unwrap_or(defaults.max_backoff),
            provider_timeout: self.provider_timeout.unwrap_or(defaults.provider_timeout),
            retrieval_timeout: self.retrieval_timeout.unwrap_or(defaults.retrieval_timeout),
            max_concurrency: self.max_concurrency.unwrap_or(defaults.max_concurrency),
            provider_rate_limit: self
                .provider_rate_limit
                .unwrap_or(defaults.provider_rate_limit),
            batch_size: self.batch_size.unwrap_or(defaults.batch_size),
            min_confidence: self.min_confidence.unwrap_or(defaults.min_confidence),
            citation_threshold: self
                .citation_threshold
                .unwrap_or(defaults.citation_threshold),
            dedup_similarity: self.dedup_similarity.unwrap_or(defaults.dedup_similarity),
            default_max_results: self
                .default_max_results
                .unwrap_or(defaults.default_max_results),
            extraction_max_tokens: self
                .extraction_max_tokens
                .unwrap_or(defaults.extraction_max_tokens),
            drafting_max_tokens: self
                .drafting_max_tokens
                .unwrap_or(defaults.drafting_max_tokens),
            sections: self.sections.unwrap_or(defaults.sections),
            prompt_dir: self.prompt_dir,
        };
        config.validate()?;
        Ok(config)
    }
}

impl AgentConfig {
    fn validate(&self) -> Result<(), AgentError> {
        let invalid = |message: String| Err(AgentError::Config { message });
        for (name, value) in [
            ("max_concurrency", self.max_concurrency),
            ("provider_rate_limit", self.provider_rate_limit),
            ("batch_size", self.batch_size),
            ("default_max_results", self.default_max_results),
        ] {
            if value == 0 {
                return invalid(format!("{name} must be at least 1"));
            }
        }
        for (name, value) in [
            ("min_confidence", self.min_confidence),
            ("citation_threshold", self.citation_threshold),
            ("dedup_similarity", self.dedup_similarity),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("{name} must be within [0, 1], got {value}"));
            }
        }
        if self.sections.len() < 2 {
            return invalid(format!(
                "at least two report sections are required, got {}",
                self.sections.len()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_builder_defaults() {
        let config = AgentConfig::builder()
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert!(config.providers.is_empty());
        assert_eq!(config.max_concurrency, DEFAULT_MAX_CONCURRENCY);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.sections.len(), 3);
        assert!(config.sections[0].is_catch_all());
    }

    #[test]
    fn test_builder_custom_values() {
        let config = AgentConfig::builder()
            .provider(ProviderSpec::openai("primary", "key", "gpt-4o"))
            .max_concurrency(2)
            .batch_size(5)
            .provider_timeout(Duration::from_secs(30))
            .citation_threshold(0.6)
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.providers[0].model, "gpt-4o");
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.provider_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_builder_rejects_invalid_values() {
        assert!(AgentConfig::builder().batch_size(0).build().is_err());
        assert!(AgentConfig::builder().citation_threshold(1.5).build().is_err());
        assert!(AgentConfig::builder().sections(Vec::new()).build().is_err());
    }

    #[test]
    fn test_builder_rejects_single_section() {
        let single = vec![SectionSpec::new("Findings", &[], "Summarize.")];
        let err = AgentConfig::builder().sections(single).build().err().map(|e| e.to_string()).unwrap_or_default();
        assert!(err.contains("at least two report sections"), "{err}");

        let pair = default_sections().into_iter().take(2).collect();
        assert!(AgentConfig::builder().sections(pair).build().is_ok());
    }

    #[test]
    fn test_from_vars_builds_provider_chain() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("RAG_API_KEY", "sk-primary"),
            ("RAG_FALLBACK_API_KEY", "g-key"),
            ("RAG_BATCH_SIZE", "7"),
            ("RAG_MAX_CONCURRENCY", "not-a-number"),
        ]);
        let config = AgentConfig::builder()
            .from_vars(|k| vars.get(k).map(ToString::to_string))
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[0].name, "primary");
        assert_eq!(config.providers[0].model, DEFAULT_MODEL);
        assert_eq!(config.providers[1].model, DEFAULT_FALLBACK_MODEL);
        assert_eq!(
            config.providers[1].base_url.as_deref(),
            Some(DEFAULT_FALLBACK_BASE_URL)
        );
        assert_eq!(config.batch_size, 7);
        assert_eq!(config.max_concurrency, DEFAULT_MAX_CONCURRENCY);
    }

    #[test]
    fn test_explicit_providers_are_not_overridden() {
        let config = AgentConfig::builder()
            .provider(ProviderSpec::openai("mine", "k", "m"))
            .from_vars(|_| Some("env".to_string()))
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers[0].name, "mine");
    }

    #[test]
    fn test_section_matching() {
        let sections = default_sections();
        assert!(sections[1].matches("Risk is higher in smokers than non-smokers."));
        assert!(sections[2].matches("Patients SHOULD avoid excess salt."));
        assert!(!sections[2].matches("Chest pain is common."));
    }

    #[test]
    fn test_debug_redacts_key() {
        let spec = ProviderSpec::openai("primary", "sk-secret", "m");
        assert!(!format!("{spec:?}").contains("sk-secret"));
    }
}
