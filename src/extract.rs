//! Menu extraction: photo in, restaurant name and dish list out.
//!
//! [`MenuDataExtractor::extract`] makes exactly one vision call and never
//! retries. Failures split three ways:
//!
//! | Situation | Outcome |
//! |-----------|---------|
//! | no image supplied | `Err(EmptyInput)`, no request made |
//! | missing key, network failure, timeout, HTTP error | `Err(..)` for the caller to show with a retry action |
//! | reply arrives but is not the expected JSON | `Ok` with an empty result |

use crate::config::PipelineConfig;
use crate::credentials::{CredentialStore, GEMINI_API_KEY};
use crate::error::ExtractionError;
use crate::model::{Image, MenuExtractionResult};
use crate::pipeline::encode::encode_for_upload;
use crate::pipeline::reply::parse_menu_reply;
use crate::pipeline::vision::{GeminiVision, LlmProviderVision, VisionModel};
use crate::prompts::MENU_EXTRACTION_PROMPT;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Reads menu photos through a [`VisionModel`].
#[derive(Clone)]
pub struct MenuDataExtractor {
    vision: Arc<dyn VisionModel>,
}

impl std::fmt::Debug for MenuDataExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MenuDataExtractor")
            .field("backend", &self.vision.name())
            .finish()
    }
}

impl MenuDataExtractor {
    pub fn new(vision: Arc<dyn VisionModel>) -> Self {
        Self { vision }
    }

    /// Pick the backend the config asks for.
    ///
    /// An edgequake-llm provider is used when one is configured (directly, by
    /// name, or via `EDGEQUAKE_LLM_PROVIDER`); otherwise Gemini REST with the
    /// key from the credential store.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ExtractionError> {
        let vision: Arc<dyn VisionModel> = if config.uses_llm_provider() {
            Arc::new(LlmProviderVision::from_config(config)?)
        } else {
            let store = CredentialStore::load(config.credentials_path.as_deref())?;
            Arc::new(GeminiVision::new(store.resolve(GEMINI_API_KEY), config)?)
        };
        debug!("Menu extraction backend: {}", vision.name());
        Ok(Self::new(vision))
    }

    /// Name of the vision backend in use.
    pub fn backend(&self) -> &str {
        self.vision.name()
    }

    /// Extract the restaurant name and dishes from the menu photos.
    ///
    /// Only the first image is read; further pages are ignored.
    pub async fn extract(&self, images: &[Image]) -> Result<MenuExtractionResult, ExtractionError> {
        let first = images.first().ok_or(ExtractionError::EmptyInput)?.clone();
        if images.len() > 1 {
            info!(
                "{} menu images supplied; only the first one is extracted",
                images.len()
            );
        }

        let start = Instant::now();

        // Decoding and re-encoding a phone photo is CPU-bound.
        let encoded = tokio::task::spawn_blocking(move || encode_for_upload(&first))
            .await
            .map_err(|e| ExtractionError::Internal(format!("encode task failed: {e}")))??;

        let reply = match self.vision.describe(&encoded, MENU_EXTRACTION_PROMPT).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                warn!("{} returned no text; treating as no dishes", self.vision.name());
                return Ok(MenuExtractionResult::empty());
            }
            Err(ExtractionError::MalformedResponse { detail }) => {
                warn!("Unreadable reply from {}: {}", self.vision.name(), detail);
                return Ok(MenuExtractionResult::empty());
            }
            Err(e) => return Err(e),
        };

        let result = parse_menu_reply(&reply);
        info!(
            "Extracted {} dishes{} in {:?}",
            result.dishes.len(),
            result
                .restaurant_name
                .as_deref()
                .map(|n| format!(" from \"{n}\""))
                .unwrap_or_default(),
            start.elapsed()
        );
        Ok(result)
    }
}
