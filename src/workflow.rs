//! End-to-end pipeline bound to a [`SessionState`].
//!
//! [`MenuPipeline`] wires the extractor and the enricher to a session:
//!
//! 1. [`MenuPipeline::extract_for_session`] fingerprints the captured photos
//!    and calls the extractor only when they changed (or when forced).
//! 2. [`MenuPipeline::start_enrichment`] streams image updates for the
//!    session's dishes; [`MenuPipeline::run_enrichment`] drives that stream
//!    to the end, applying each update to the session.

use crate::cache::{should_reextract_fingerprint, ImageSetFingerprint};
use crate::config::PipelineConfig;
use crate::enrich::{BatchImageEnricher, EnrichmentSummary};
use crate::error::ExtractionError;
use crate::extract::MenuDataExtractor;
use crate::model::{Dish, DishId, MenuExtractionResult};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::session::{SessionError, SessionState};
use crate::stream::{enrich_stream, EnrichmentEvent, EnrichmentHandle, EnrichmentStream};
use futures::StreamExt;
use std::sync::Arc;
use tracing::info;

/// Result of a cache-gated extraction.
#[derive(Debug, Clone)]
pub enum ExtractionOutcome {
    /// The extractor was called.
    Fresh(MenuExtractionResult),
    /// The photos were unchanged; the cached result was reused.
    Cached(MenuExtractionResult),
}

impl ExtractionOutcome {
    pub fn result(&self) -> &MenuExtractionResult {
        match self {
            ExtractionOutcome::Fresh(r) | ExtractionOutcome::Cached(r) => r,
        }
    }

    pub fn was_cached(&self) -> bool {
        matches!(self, ExtractionOutcome::Cached(_))
    }
}

/// Extractor plus enricher.
#[derive(Debug, Clone)]
pub struct MenuPipeline {
    extractor: MenuDataExtractor,
    enricher: BatchImageEnricher,
}

impl MenuPipeline {
    pub fn new(extractor: MenuDataExtractor, enricher: BatchImageEnricher) -> Self {
        Self {
            extractor,
            enricher,
        }
    }

    /// Build both stages from one config.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ExtractionError> {
        Ok(Self::new(
            MenuDataExtractor::from_config(config)?,
            BatchImageEnricher::from_config(config)?,
        ))
    }

    pub fn extractor(&self) -> &MenuDataExtractor {
        &self.extractor
    }

    pub fn enricher(&self) -> &BatchImageEnricher {
        &self.enricher
    }

    /// Extract the session's menu, reusing the cached result when the photos
    /// are unchanged.
    ///
    /// `force` skips the cache check (the "re-extract" action). A fresh
    /// result replaces the session's dish list; a cached one leaves it alone.
    /// A failed call changes nothing, so a forced re-extract that fails keeps
    /// the previous result and dishes.
    pub async fn extract_for_session(
        &self,
        session: &mut SessionState,
        force: bool,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        if session.images().is_empty() {
            return Err(ExtractionError::EmptyInput);
        }

        let images = session.images().to_vec();
        let fingerprint = ImageSetFingerprint::compute(images.clone()).await?;

        if force {
            info!("Re-extraction requested");
        } else if !should_reextract_fingerprint(&fingerprint, session.last_extraction()) {
            if let Some(cached) = session.last_extraction() {
                info!(
                    "Menu photos unchanged; reusing {} cached dishes",
                    cached.result.dishes.len()
                );
                return Ok(ExtractionOutcome::Cached(cached.result.clone()));
            }
        }

        let result = self.extractor.extract(&images).await?;
        session.set_extraction(fingerprint, result.clone());
        Ok(ExtractionOutcome::Fresh(result))
    }

    /// Start enriching the session's current dishes in the background.
    pub fn start_enrichment(&self, session: &SessionState) -> (EnrichmentStream, EnrichmentHandle) {
        enrich_stream(
            &self.enricher,
            session.dishes().to_vec(),
            session.restaurant_name().map(str::to_string),
        )
    }

    /// Enrich the session's dishes and apply every update as it arrives.
    ///
    /// `on_event` sees each event after it has been applied. Dropping the
    /// returned future cancels the remaining dishes.
    pub async fn run_enrichment<F>(&self, session: &mut SessionState, mut on_event: F) -> EnrichmentSummary
    where
        F: FnMut(&EnrichmentEvent, &SessionState),
    {
        let (mut events, _handle) = self.start_enrichment(session);
        let mut summary = EnrichmentSummary::default();
        while let Some(event) = events.next().await {
            session.apply_event(&event);
            if let EnrichmentEvent::Completed(s) = &event {
                summary = s.clone();
            }
            on_event(&event, session);
        }
        summary
    }

    /// Manually retry the image of one dish in the session.
    pub async fn retry_dish(&self, session: &mut SessionState, id: DishId) -> Result<Dish, SessionError> {
        let dish = session.dish(id).cloned().ok_or(SessionError::UnknownDish(id))?;
        let restaurant = session.restaurant_name().map(str::to_string);

        session.apply_dish_update(&dish.loading());
        let noop: ProgressCallback = Arc::new(NoopProgressCallback);
        let resolved = self
            .enricher
            .retry_dish(&dish, restaurant.as_deref(), &noop)
            .await;
        session.apply_dish_update(&resolved);

        session
            .dish(id)
            .cloned()
            .ok_or(SessionError::UnknownDish(id))
    }
}
