//! Configuration types for the menu pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. One struct holds every knob so a config can
//! be cloned into spawned tasks and logged as a whole.

use crate::error::ExtractionError;
use crate::retry::RetryPolicy;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default Gemini REST endpoint.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default Google Custom Search endpoint.
pub const DEFAULT_SEARCH_URL: &str = "https://www.googleapis.com/customsearch/v1";

/// Configuration for menu extraction and dish enrichment.
///
/// # Example
/// ```rust
/// use menu_visualizer::{EnrichmentPolicy, ImageStrategy, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .image_strategy(ImageStrategy::Search)
///     .enrichment_policy(EnrichmentPolicy::BoundedParallel { max_in_flight: 3 })
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// How dishes are scheduled during enrichment. Default: 3 in flight.
    pub enrichment_policy: EnrichmentPolicy,

    /// Where dish images come from. Default: [`ImageStrategy::Generation`].
    pub image_strategy: ImageStrategy,

    /// Backoff for the generation strategy. Default: 3 attempts, 1s base, ×2, 30s cap, ±25 %.
    pub retry: RetryPolicy,

    /// Gemini model used to read the menu. Default: `gemini-2.5-flash`.
    pub extraction_model: String,

    /// Gemini model used to synthesise dish images.
    /// Default: `gemini-2.0-flash-preview-image-generation`.
    pub generation_model: String,

    /// LLM provider name for extraction through edgequake-llm
    /// (e.g. "openai", "anthropic", "ollama"). When `None` along with
    /// `provider`, extraction talks to Gemini directly.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider for extraction. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Model for the named provider. Falls back to `extraction_model`.
    pub model: Option<String>,

    /// Sampling temperature for extraction. Default: 0.1.
    pub temperature: f32,

    /// Output-token ceiling for the extraction reply. Default: 2048.
    pub max_tokens: usize,

    /// Image-search candidates requested per dish. Default: 3.
    pub search_results: u8,

    /// A generation reply with text but no image counts as an error rather
    /// than "no image". Either way the dish ends up flagged. Default: true.
    pub text_only_is_error: bool,

    /// Per-call timeouts.
    pub extraction_timeout_secs: u64,
    pub generation_timeout_secs: u64,
    pub search_timeout_secs: u64,
    pub download_timeout_secs: u64,

    /// Gemini endpoint root, without trailing slash.
    pub gemini_base_url: String,

    /// Custom Search endpoint.
    pub search_url: String,

    /// Credentials file. Default: `$MENUVIZ_CONFIG` or `./menuviz.toml`.
    pub credentials_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enrichment_policy: EnrichmentPolicy::default(),
            image_strategy: ImageStrategy::default(),
            retry: RetryPolicy::default(),
            extraction_model: "gemini-2.5-flash".to_string(),
            generation_model: "gemini-2.0-flash-preview-image-generation".to_string(),
            provider_name: None,
            provider: None,
            model: None,
            temperature: 0.1,
            max_tokens: 2048,
            search_results: 3,
            text_only_is_error: true,
            extraction_timeout_secs: 60,
            generation_timeout_secs: 60,
            search_timeout_secs: 30,
            download_timeout_secs: 15,
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            search_url: DEFAULT_SEARCH_URL.to_string(),
            credentials_path: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("enrichment_policy", &self.enrichment_policy)
            .field("image_strategy", &self.image_strategy)
            .field("retry", &self.retry)
            .field("extraction_model", &self.extraction_model)
            .field("generation_model", &self.generation_model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("model", &self.model)
            .field("search_results", &self.search_results)
            .field("text_only_is_error", &self.text_only_is_error)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Whether extraction should go through an edgequake-llm provider.
    pub fn uses_llm_provider(&self) -> bool {
        self.provider.is_some()
            || self.provider_name.is_some()
            || std::env::var("EDGEQUAKE_LLM_PROVIDER")
                .map(|v| !v.is_empty())
                .unwrap_or(false)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn enrichment_policy(mut self, policy: EnrichmentPolicy) -> Self {
        self.config.enrichment_policy = policy;
        self
    }

    /// Shorthand for `BoundedParallel { max_in_flight: n }`.
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.enrichment_policy = EnrichmentPolicy::BoundedParallel {
            max_in_flight: n.max(1),
        };
        self
    }

    pub fn image_strategy(mut self, strategy: ImageStrategy) -> Self {
        self.config.image_strategy = strategy;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn extraction_model(mut self, model: impl Into<String>) -> Self {
        self.config.extraction_model = model.into();
        self
    }

    pub fn generation_model(mut self, model: impl Into<String>) -> Self {
        self.config.generation_model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn search_results(mut self, n: u8) -> Self {
        self.config.search_results = n.clamp(1, 10);
        self
    }

    pub fn text_only_is_error(mut self, v: bool) -> Self {
        self.config.text_only_is_error = v;
        self
    }

    pub fn extraction_timeout_secs(mut self, secs: u64) -> Self {
        self.config.extraction_timeout_secs = secs;
        self
    }

    pub fn generation_timeout_secs(mut self, secs: u64) -> Self {
        self.config.generation_timeout_secs = secs;
        self
    }

    pub fn search_timeout_secs(mut self, secs: u64) -> Self {
        self.config.search_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn gemini_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.gemini_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn search_url(mut self, url: impl Into<String>) -> Self {
        self.config.search_url = url.into();
        self
    }

    pub fn credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.credentials_path = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, ExtractionError> {
        let c = &self.config;
        if let EnrichmentPolicy::BoundedParallel { max_in_flight: 0 } = c.enrichment_policy {
            return Err(ExtractionError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.retry.max_attempts == 0 {
            return Err(ExtractionError::InvalidConfig(
                "Retry attempts must be ≥ 1".into(),
            ));
        }
        if c.retry.multiplier < 1.0 {
            return Err(ExtractionError::InvalidConfig(format!(
                "Backoff multiplier must be ≥ 1, got {}",
                c.retry.multiplier
            )));
        }
        if !(0.0..1.0).contains(&c.retry.jitter) {
            return Err(ExtractionError::InvalidConfig(format!(
                "Jitter must be in [0, 1), got {}",
                c.retry.jitter
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How the enricher schedules dishes.
///
/// Both policies give each dish exactly one loading→resolved transition and
/// fire the completion callback once, after every dish has resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnrichmentPolicy {
    /// One dish at a time in menu order, with a pause between dishes to stay
    /// under remote rate limits.
    Sequential { pacing: Duration },
    /// Up to `max_in_flight` dishes at once. Completion order across dishes
    /// is unspecified.
    BoundedParallel { max_in_flight: usize },
}

impl Default for EnrichmentPolicy {
    fn default() -> Self {
        EnrichmentPolicy::BoundedParallel { max_in_flight: 3 }
    }
}

impl EnrichmentPolicy {
    /// Sequential processing with the usual one-second pause.
    pub fn sequential() -> Self {
        EnrichmentPolicy::Sequential {
            pacing: Duration::from_secs(1),
        }
    }
}

/// Where dish images come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageStrategy {
    /// Google Custom Search for an existing photo, first downloadable candidate wins.
    Search,
    /// Gemini image generation, with retry and backoff. (default)
    #[default]
    Generation,
}
