//! Dish image providers.
//!
//! A [`DishImageProvider`] turns a dish name (plus the restaurant name, when
//! known) into at most one picture. Two strategies exist:
//!
//! * [`search::SearchImageProvider`] finds an existing photo through Google
//!   Custom Search and downloads the first usable candidate.
//! * [`generate::GenerationImageProvider`] asks Gemini to synthesise one,
//!   retrying transient failures with backoff.
//!
//! `Ok(None)` means "nothing found" and `Err` means the attempt failed; the
//! enricher flags the dish either way.

pub mod generate;
pub mod search;

use crate::config::{ImageStrategy, PipelineConfig};
use crate::credentials::{CredentialStore, GEMINI_API_KEY, SEARCH_API_KEY, SEARCH_ENGINE_ID};
use crate::error::{ExtractionError, ProviderError};
use crate::model::{sniff_mime, Image};
use async_trait::async_trait;
use std::sync::Arc;

pub use generate::GenerationImageProvider;
pub use search::SearchImageProvider;

/// Produces one representative image for a dish.
#[async_trait]
pub trait DishImageProvider: Send + Sync {
    /// Short service name for logs.
    fn name(&self) -> &str;

    async fn provide_image(
        &self,
        dish_name: &str,
        restaurant_name: Option<&str>,
    ) -> Result<Option<Image>, ProviderError>;
}

/// Build the provider selected by `config.image_strategy`.
///
/// Keys are resolved now but only checked when a dish is requested, so a
/// missing key surfaces as a per-dish configuration error.
pub fn from_config(config: &PipelineConfig) -> Result<Arc<dyn DishImageProvider>, ExtractionError> {
    let store = CredentialStore::load(config.credentials_path.as_deref())?;
    from_store(config, &store)
}

/// Like [`from_config`], with keys taken from an already loaded store.
pub fn from_store(
    config: &PipelineConfig,
    store: &CredentialStore,
) -> Result<Arc<dyn DishImageProvider>, ExtractionError> {
    let provider: Arc<dyn DishImageProvider> = match config.image_strategy {
        ImageStrategy::Search => Arc::new(SearchImageProvider::new(
            store.resolve(SEARCH_API_KEY),
            store.resolve(SEARCH_ENGINE_ID),
            config,
        )?),
        ImageStrategy::Generation => Arc::new(GenerationImageProvider::new(
            store.resolve(GEMINI_API_KEY),
            config,
        )?),
    };
    Ok(provider)
}

/// Accept `bytes` as an image if they look like one.
///
/// The declared MIME type is used when it names an image; otherwise the
/// type is sniffed from the magic number. Bytes that are neither are
/// rejected.
pub(crate) fn validate_image(bytes: Vec<u8>, declared: Option<&str>) -> Result<Image, ProviderError> {
    if bytes.is_empty() {
        return Err(ProviderError::InvalidImage {
            detail: "empty payload".into(),
        });
    }
    let declared = declared
        .map(|m| m.split(';').next().unwrap_or(m).trim().to_ascii_lowercase())
        .filter(|m| m.starts_with("image/"));
    match declared.or_else(|| sniff_mime(&bytes).map(str::to_string)) {
        Some(mime) => Ok(Image::new(bytes, mime)),
        None => Err(ProviderError::InvalidImage {
            detail: format!("{} bytes of unknown format", bytes.len()),
        }),
    }
}
