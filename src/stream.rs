//! Streaming enrichment: dish updates as a `Stream`.
//!
//! [`crate::enrich::BatchImageEnricher::enrich`] reports through callbacks
//! that run on worker tasks. A UI usually wants the opposite shape: one
//! consumer that owns the dish list and applies updates as they arrive.
//! [`enrich_stream`] runs the enrichment on a spawned task and forwards every
//! event over a channel, ending with exactly one
//! [`EnrichmentEvent::Completed`].
//!
//! Dropping the stream does not stop the work; dropping the
//! [`EnrichmentHandle`] or calling [`EnrichmentHandle::abort`] does. After
//! that no further events are sent, and requests still in flight are
//! cancelled. Keep the handle alive for as long as the run should go on.

use crate::enrich::{BatchImageEnricher, EnrichmentSummary};
use crate::model::Dish;
use crate::progress::EnrichmentProgressCallback;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::debug;

/// One enrichment event.
#[derive(Debug, Clone)]
pub enum EnrichmentEvent {
    /// A dish started loading or resolved.
    DishUpdated(Dish),
    /// Every dish has resolved. Always the last event.
    Completed(EnrichmentSummary),
}

/// A boxed stream of enrichment events.
pub type EnrichmentStream = Pin<Box<dyn Stream<Item = EnrichmentEvent> + Send>>;

/// Control over a running enrichment. Aborts the run when dropped.
#[derive(Debug)]
pub struct EnrichmentHandle {
    task: JoinHandle<()>,
}

impl EnrichmentHandle {
    /// Cancel the run. In-flight requests are dropped and no more events are
    /// sent.
    pub fn abort(&self) {
        debug!("Aborting enrichment");
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for EnrichmentHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct ChannelCallback {
    tx: mpsc::UnboundedSender<EnrichmentEvent>,
}

impl EnrichmentProgressCallback for ChannelCallback {
    fn on_dish_updated(&self, dish: &Dish) {
        // A closed receiver just means nobody is listening any more.
        let _ = self.tx.send(EnrichmentEvent::DishUpdated(dish.clone()));
    }

    fn on_enrichment_complete(&self, summary: &EnrichmentSummary) {
        let _ = self.tx.send(EnrichmentEvent::Completed(summary.clone()));
    }
}

/// Start enriching `dishes` in the background.
///
/// Must be called from within a Tokio runtime.
///
/// # Example
/// ```rust,no_run
/// use menu_visualizer::{enrich_stream, BatchImageEnricher, Dish, EnrichmentEvent, PipelineConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let enricher = BatchImageEnricher::from_config(&PipelineConfig::default())?;
/// let (mut events, _handle) = enrich_stream(&enricher, vec![Dish::new("Pad Thai")], None);
/// while let Some(event) = events.next().await {
///     match event {
///         EnrichmentEvent::DishUpdated(d) => println!("{}: loading={}", d.name, d.is_image_loading),
///         EnrichmentEvent::Completed(s) => println!("{} with images", s.with_image),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn enrich_stream(
    enricher: &BatchImageEnricher,
    dishes: Vec<Dish>,
    restaurant_name: Option<String>,
) -> (EnrichmentStream, EnrichmentHandle) {
    let (tx, rx) = mpsc::unbounded_channel();
    let enricher = enricher.clone();
    let callback = Arc::new(ChannelCallback { tx });

    let task = tokio::spawn(async move {
        enricher.enrich(dishes, restaurant_name, callback).await;
    });

    (
        Box::pin(UnboundedReceiverStream::new(rx)),
        EnrichmentHandle { task },
    )
}
