//! Progress-callback trait for per-dish enrichment events.
//!
//! Pass an [`Arc<dyn EnrichmentProgressCallback>`] to
//! [`crate::enrich::BatchImageEnricher::enrich`] to see every dish move from
//! "loading" to "resolved" as it happens.
//!
//! Callbacks are the narrowest integration point: the host can forward the
//! events to a channel, a UI actor or a terminal progress bar without this
//! crate knowing which. [`crate::stream::enrich_stream`] is the ready-made
//! channel adapter.
//!
//! # Example
//!
//! ```rust
//! use menu_visualizer::{Dish, EnrichmentProgressCallback};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct Counter {
//!     resolved: AtomicUsize,
//! }
//!
//! impl EnrichmentProgressCallback for Counter {
//!     fn on_dish_updated(&self, dish: &Dish) {
//!         if !dish.is_image_loading {
//!             self.resolved.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//! ```

use crate::enrich::EnrichmentSummary;
use crate::model::Dish;
use std::sync::Arc;

/// Called by the enricher as dishes change state.
///
/// Implementations must be `Send + Sync`: with a bounded-parallel policy
/// `on_dish_updated` is called from several tasks at once. All methods have
/// no-op defaults.
pub trait EnrichmentProgressCallback: Send + Sync {
    /// Called once before the first dish starts.
    fn on_enrichment_start(&self, total_dishes: usize) {
        let _ = total_dishes;
    }

    /// Called twice per dish: first with `is_image_loading = true`, then with
    /// the resolved state (image set, or `image_load_error = true`).
    fn on_dish_updated(&self, dish: &Dish) {
        let _ = dish;
    }

    /// Called exactly once, after every dish has resolved.
    fn on_enrichment_complete(&self, summary: &EnrichmentSummary) {
        let _ = summary;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl EnrichmentProgressCallback for NoopProgressCallback {}

/// Shared callback handle.
pub type ProgressCallback = Arc<dyn EnrichmentProgressCallback>;

/// Adapter from a pair of closures.
pub struct FnProgressCallback<U, C> {
    on_dish_updated: U,
    on_complete: C,
}

impl<U, C> EnrichmentProgressCallback for FnProgressCallback<U, C>
where
    U: Fn(&Dish) + Send + Sync,
    C: Fn(&EnrichmentSummary) + Send + Sync,
{
    fn on_dish_updated(&self, dish: &Dish) {
        (self.on_dish_updated)(dish)
    }

    fn on_enrichment_complete(&self, summary: &EnrichmentSummary) {
        (self.on_complete)(summary)
    }
}

/// Build a [`ProgressCallback`] from an update closure and a completion closure.
pub fn callback_fn<U, C>(on_dish_updated: U, on_complete: C) -> ProgressCallback
where
    U: Fn(&Dish) + Send + Sync + 'static,
    C: Fn(&EnrichmentSummary) + Send + Sync + 'static,
{
    Arc::new(FnProgressCallback {
        on_dish_updated,
        on_complete,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_enrichment_start(2);
        cb.on_dish_updated(&Dish::new("Soup").loading());
        cb.on_enrichment_complete(&EnrichmentSummary::default());
    }

    #[test]
    fn closures_receive_events() {
        let updates = Arc::new(AtomicUsize::new(0));
        let completes = Arc::new(AtomicUsize::new(0));
        let (u, c) = (Arc::clone(&updates), Arc::clone(&completes));
        let cb = callback_fn(
            move |_| {
                u.fetch_add(1, Ordering::SeqCst);
            },
            move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            },
        );

        let dish = Dish::new("Soup");
        cb.on_enrichment_start(1);
        cb.on_dish_updated(&dish.loading());
        cb.on_dish_updated(&dish.resolved(None));
        cb.on_enrichment_complete(&EnrichmentSummary::default());

        assert_eq!(updates.load(Ordering::SeqCst), 2);
        assert_eq!(completes.load(Ordering::SeqCst), 1);
    }
}
