//! Batch image enrichment: give every dish a picture.
//!
//! [`BatchImageEnricher`] runs a [`DishImageProvider`] over a dish list under
//! an [`EnrichmentPolicy`]:
//!
//! * `Sequential` handles dishes in menu order and pauses between them to
//!   stay under remote rate limits.
//! * `BoundedParallel` keeps up to `max_in_flight` requests open with
//!   `buffer_unordered`; updates arrive in completion order.
//!
//! Under both policies each dish is reported loading, then resolved, exactly
//! once, and `on_enrichment_complete` fires once after the last dish. Every
//! dish runs in its own task, so an error or even a panic in one provider
//! call only flags that dish.

use crate::config::{EnrichmentPolicy, PipelineConfig};
use crate::error::ExtractionError;
use crate::model::{Dish, Image};
use crate::progress::ProgressCallback;
use crate::provider::{self, DishImageProvider};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

/// Counts for one enrichment run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentSummary {
    pub total: usize,
    /// Dishes that received an image.
    pub with_image: usize,
    /// Provider answered but had nothing.
    pub no_image: usize,
    /// Provider failed (after retries, where applicable).
    pub failed: usize,
    pub duration_ms: u64,
}

impl EnrichmentSummary {
    /// Dishes left with `image_load_error = true`.
    pub fn flagged(&self) -> usize {
        self.no_image + self.failed
    }
}

/// Dishes in input order after enrichment, plus the counts.
#[derive(Debug, Clone)]
pub struct EnrichmentReport {
    pub dishes: Vec<Dish>,
    pub summary: EnrichmentSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DishOutcome {
    Image,
    NoImage,
    Failed,
}

/// Drives a [`DishImageProvider`] over a list of dishes.
#[derive(Clone)]
pub struct BatchImageEnricher {
    provider: Arc<dyn DishImageProvider>,
    policy: EnrichmentPolicy,
}

impl std::fmt::Debug for BatchImageEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchImageEnricher")
            .field("provider", &self.provider.name())
            .field("policy", &self.policy)
            .finish()
    }
}

impl BatchImageEnricher {
    pub fn new(provider: Arc<dyn DishImageProvider>, policy: EnrichmentPolicy) -> Self {
        Self { provider, policy }
    }

    /// Provider and policy as selected by `config`.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ExtractionError> {
        Ok(Self::new(
            provider::from_config(config)?,
            config.enrichment_policy,
        ))
    }

    pub fn policy(&self) -> EnrichmentPolicy {
        self.policy
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Fetch an image for every dish.
    ///
    /// Returns once every dish has resolved. The returned dishes are in input
    /// order whatever order they completed in.
    pub async fn enrich(
        &self,
        dishes: Vec<Dish>,
        restaurant_name: Option<String>,
        callback: ProgressCallback,
    ) -> EnrichmentReport {
        let start = Instant::now();
        let total = dishes.len();
        info!(
            "Enriching {} dishes via {} ({:?})",
            total,
            self.provider.name(),
            self.policy
        );
        callback.on_enrichment_start(total);

        let restaurant: Option<Arc<str>> = restaurant_name.map(Arc::from);

        let results: Vec<(Dish, DishOutcome)> = match self.policy {
            EnrichmentPolicy::Sequential { pacing } => {
                let mut out = Vec::with_capacity(total);
                for (i, dish) in dishes.into_iter().enumerate() {
                    if i > 0 && !pacing.is_zero() {
                        tokio::time::sleep(pacing).await;
                    }
                    out.push(
                        resolve_dish(
                            Arc::clone(&self.provider),
                            dish,
                            restaurant.clone(),
                            &callback,
                        )
                        .await,
                    );
                }
                out
            }
            EnrichmentPolicy::BoundedParallel { max_in_flight } => {
                let provider = Arc::clone(&self.provider);
                let shared_restaurant = restaurant.clone();
                let shared_callback = Arc::clone(&callback);
                let mut indexed: Vec<(usize, (Dish, DishOutcome))> =
                    stream::iter(dishes.into_iter().enumerate().map(move |(i, dish)| {
                        let provider = Arc::clone(&provider);
                        let restaurant = shared_restaurant.clone();
                        let callback = Arc::clone(&shared_callback);
                        async move { (i, resolve_dish(provider, dish, restaurant, &callback).await) }
                    }))
                    .buffer_unordered(max_in_flight.max(1))
                    .collect()
                    .await;
                indexed.sort_by_key(|(i, _)| *i);
                indexed.into_iter().map(|(_, r)| r).collect()
            }
        };

        let mut summary = EnrichmentSummary {
            total,
            duration_ms: start.elapsed().as_millis() as u64,
            ..Default::default()
        };
        for (_, outcome) in &results {
            match outcome {
                DishOutcome::Image => summary.with_image += 1,
                DishOutcome::NoImage => summary.no_image += 1,
                DishOutcome::Failed => summary.failed += 1,
            }
        }

        info!(
            "Enrichment done: {}/{} with images, {} without, {} failed in {}ms",
            summary.with_image, total, summary.no_image, summary.failed, summary.duration_ms
        );
        callback.on_enrichment_complete(&summary);

        EnrichmentReport {
            dishes: results.into_iter().map(|(d, _)| d).collect(),
            summary,
        }
    }

    /// Re-run one dish through the same loading→resolved sequence.
    ///
    /// Used for the manual per-dish retry. Does not fire the start or
    /// completion callbacks.
    pub async fn retry_dish(
        &self,
        dish: &Dish,
        restaurant_name: Option<&str>,
        callback: &ProgressCallback,
    ) -> Dish {
        info!("Retrying image for \"{}\"", dish.name);
        let (dish, _) = resolve_dish(
            Arc::clone(&self.provider),
            dish.clone(),
            restaurant_name.map(Arc::from),
            callback,
        )
        .await;
        dish
    }
}

/// Aborts the task when dropped, so cancelling a run cancels its dishes.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn resolve_dish(
    provider: Arc<dyn DishImageProvider>,
    dish: Dish,
    restaurant: Option<Arc<str>>,
    callback: &ProgressCallback,
) -> (Dish, DishOutcome) {
    callback.on_dish_updated(&dish.loading());

    let name = dish.name.clone();
    let handle = tokio::spawn(async move {
        provider
            .provide_image(&name, restaurant.as_deref())
            .await
    });
    let _guard = AbortOnDrop(handle.abort_handle());

    let (image, outcome): (Option<Image>, DishOutcome) = match handle.await {
        Ok(Ok(Some(image))) => {
            debug!("\"{}\": image ready ({} bytes)", dish.name, image.len());
            (Some(image), DishOutcome::Image)
        }
        Ok(Ok(None)) => {
            debug!("\"{}\": no image found", dish.name);
            (None, DishOutcome::NoImage)
        }
        Ok(Err(e)) => {
            warn!("\"{}\": image failed: {}", dish.name, e);
            (None, DishOutcome::Failed)
        }
        Err(e) => {
            warn!("\"{}\": image task aborted: {}", dish.name, e);
            (None, DishOutcome::Failed)
        }
    };

    let resolved = dish.resolved(image);
    callback.on_dish_updated(&resolved);
    (resolved, outcome)
}
