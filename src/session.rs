//! Session state and the capture → extract → display stage machine.
//!
//! [`SessionState`] is owned by a single consumer (the UI shell, or the
//! `menuviz` binary). Background work never touches it directly: enrichment
//! results come back as events and are applied with
//! [`SessionState::apply_dish_update`], which drops updates for dishes that
//! no longer exist. That is how results from an aborted or reset run are
//! discarded instead of landing on the wrong list.
//!
//! Observers subscribe to [`SessionEvent`]s over a broadcast channel.

use crate::cache::{CachedExtraction, ExtractionCache, ImageSetFingerprint};
use crate::model::{sections, Dish, DishFilter, DishId, Image, MenuExtractionResult};
use crate::stream::EnrichmentEvent;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Capacity of the event channel. Slow subscribers skip older events.
const EVENT_CAPACITY: usize = 256;

/// Workflow stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Collecting menu photos.
    Capturing,
    /// Running (or reusing) the extraction.
    Extracting,
    /// Showing the dish grid while images load.
    Displaying,
}

/// Change notifications published by [`SessionState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StageChanged(Stage),
    ImagesChanged { count: usize },
    ExtractionSet { dish_count: usize },
    RestaurantNameChanged(Option<String>),
    DishAdded(DishId),
    DishChanged(DishId),
    DishRemoved(DishId),
    Reset,
}

/// Rejected session operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Add at least one menu photo before continuing")]
    NoImages,

    #[error("Menu has not been extracted yet")]
    NoExtraction,

    #[error("No image at index {index} (have {len})")]
    ImageIndexOutOfRange { index: usize, len: usize },

    #[error("Dish {0} is not in this session")]
    UnknownDish(DishId),

    #[error("Dish name must not be empty")]
    EmptyDishName,
}

/// In-memory state of one menu session.
#[derive(Debug)]
pub struct SessionState {
    stage: Stage,
    captured_images: Vec<Image>,
    cache: ExtractionCache,
    dishes: Vec<Dish>,
    restaurant_name: Option<String>,
    events: broadcast::Sender<SessionEvent>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            stage: Stage::Capturing,
            captured_images: Vec::new(),
            cache: ExtractionCache::new(),
            dishes: Vec::new(),
            restaurant_name: None,
            events,
        }
    }

    /// Receive future [`SessionEvent`]s.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn images(&self) -> &[Image] {
        &self.captured_images
    }

    pub fn dishes(&self) -> &[Dish] {
        &self.dishes
    }

    pub fn dish(&self, id: DishId) -> Option<&Dish> {
        self.dishes.iter().find(|d| d.id == id)
    }

    pub fn restaurant_name(&self) -> Option<&str> {
        self.restaurant_name.as_deref()
    }

    pub fn last_extraction(&self) -> Option<&CachedExtraction> {
        self.cache.entry()
    }

    pub fn extraction_cache(&self) -> &ExtractionCache {
        &self.cache
    }

    /// Dishes matching `filter`, in list order.
    pub fn filtered_dishes(&self, filter: &DishFilter) -> Vec<&Dish> {
        filter.apply(&self.dishes)
    }

    /// Sorted, de-duplicated section labels of the current dishes.
    pub fn sections(&self) -> Vec<String> {
        sections(&self.dishes)
    }

    // ── Stage machine ────────────────────────────────────────────────────

    /// Move one stage forward.
    ///
    /// Leaving `Capturing` needs at least one photo; leaving `Extracting`
    /// needs an extraction result. `Displaying` is terminal.
    pub fn advance(&mut self) -> Result<Stage, SessionError> {
        let next = match self.stage {
            Stage::Capturing if self.captured_images.is_empty() => {
                return Err(SessionError::NoImages)
            }
            Stage::Capturing => Stage::Extracting,
            Stage::Extracting if self.cache.is_empty() => return Err(SessionError::NoExtraction),
            Stage::Extracting => Stage::Displaying,
            Stage::Displaying => return Ok(Stage::Displaying),
        };
        self.set_stage(next);
        Ok(next)
    }

    /// Move one stage back. Nothing is cleared.
    pub fn back(&mut self) -> Stage {
        let prev = match self.stage {
            Stage::Capturing | Stage::Extracting => Stage::Capturing,
            Stage::Displaying => Stage::Extracting,
        };
        if prev != self.stage {
            self.set_stage(prev);
        }
        prev
    }

    /// Drop everything and start over at `Capturing`.
    pub fn reset(&mut self) {
        info!("Session reset");
        self.stage = Stage::Capturing;
        self.captured_images.clear();
        self.cache.clear();
        self.dishes.clear();
        self.restaurant_name = None;
        self.emit(SessionEvent::Reset);
    }

    fn set_stage(&mut self, stage: Stage) {
        debug!("Stage {:?} → {:?}", self.stage, stage);
        self.stage = stage;
        self.emit(SessionEvent::StageChanged(stage));
    }

    // ── Images ───────────────────────────────────────────────────────────

    pub fn add_image(&mut self, image: Image) {
        self.captured_images.push(image);
        self.emit(SessionEvent::ImagesChanged {
            count: self.captured_images.len(),
        });
    }

    pub fn remove_image(&mut self, index: usize) -> Result<Image, SessionError> {
        let len = self.captured_images.len();
        if index >= len {
            return Err(SessionError::ImageIndexOutOfRange { index, len });
        }
        let removed = self.captured_images.remove(index);
        self.emit(SessionEvent::ImagesChanged {
            count: self.captured_images.len(),
        });
        Ok(removed)
    }

    // ── Extraction ───────────────────────────────────────────────────────

    /// Install a fresh extraction: cache it and replace the dish list.
    pub fn set_extraction(&mut self, fingerprint: ImageSetFingerprint, result: MenuExtractionResult) {
        self.dishes = result.dishes.clone();
        self.restaurant_name = result.restaurant_name.clone();
        let dish_count = self.dishes.len();
        self.cache.store(fingerprint, result);
        self.emit(SessionEvent::ExtractionSet { dish_count });
    }

    /// Override the extracted restaurant name, e.g. after the user corrects it.
    pub fn set_restaurant_name(&mut self, name: Option<String>) {
        let name = name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        self.restaurant_name = name.clone();
        self.emit(SessionEvent::RestaurantNameChanged(name));
    }

    // ── Dishes ───────────────────────────────────────────────────────────

    pub fn add_dish(&mut self, dish: Dish) -> Result<DishId, SessionError> {
        let dish = dish.tidied();
        if dish.name.is_empty() {
            return Err(SessionError::EmptyDishName);
        }
        let id = dish.id;
        self.dishes.push(dish);
        self.emit(SessionEvent::DishAdded(id));
        Ok(id)
    }

    /// Replace the text fields of the dish with `edited.id`.
    ///
    /// Image state is kept; the id never changes.
    pub fn update_dish(&mut self, edited: Dish) -> Result<(), SessionError> {
        let edited = edited.tidied();
        if edited.name.is_empty() {
            return Err(SessionError::EmptyDishName);
        }
        let dish = self
            .dishes
            .iter_mut()
            .find(|d| d.id == edited.id)
            .ok_or(SessionError::UnknownDish(edited.id))?;
        dish.name = edited.name;
        dish.section = edited.section;
        dish.price = edited.price;
        dish.description = edited.description;
        self.emit(SessionEvent::DishChanged(edited.id));
        Ok(())
    }

    pub fn remove_dish(&mut self, id: DishId) -> Result<Dish, SessionError> {
        let pos = self
            .dishes
            .iter()
            .position(|d| d.id == id)
            .ok_or(SessionError::UnknownDish(id))?;
        let removed = self.dishes.remove(pos);
        self.emit(SessionEvent::DishRemoved(id));
        Ok(removed)
    }

    /// Apply the image state of an enrichment update.
    ///
    /// Returns `false`, changing nothing, when the dish is no longer in the
    /// session. Text fields are left alone so edits made while the image
    /// was loading survive.
    pub fn apply_dish_update(&mut self, update: &Dish) -> bool {
        match self.dishes.iter_mut().find(|d| d.id == update.id) {
            Some(dish) => {
                dish.image = update.image.clone();
                dish.is_image_loading = update.is_image_loading;
                dish.image_load_error = update.image_load_error;
                self.emit(SessionEvent::DishChanged(update.id));
                true
            }
            None => {
                debug!("Discarding update for departed dish {}", update.id);
                false
            }
        }
    }

    /// Apply an event from [`crate::stream::enrich_stream`].
    pub fn apply_event(&mut self, event: &EnrichmentEvent) -> bool {
        match event {
            EnrichmentEvent::DishUpdated(dish) => self.apply_dish_update(dish),
            EnrichmentEvent::Completed(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::encode::tests::solid_png;

    fn extraction() -> MenuExtractionResult {
        MenuExtractionResult {
            restaurant_name: Some("Luigi's".into()),
            dishes: vec![
                Dish::new("Pizza").with_section("Mains").with_price("$18"),
                Dish::new("Tiramisu").with_section("Desserts"),
            ],
        }
    }

    fn extracted_session() -> SessionState {
        let mut s = SessionState::new();
        s.add_image(solid_png(4, 4, [1, 1, 1, 255]));
        let fp = ImageSetFingerprint::of(s.images());
        s.set_extraction(fp, extraction());
        s
    }

    #[test]
    fn cannot_leave_capturing_without_images() {
        let mut s = SessionState::new();
        assert_eq!(s.advance(), Err(SessionError::NoImages));
        assert_eq!(s.stage(), Stage::Capturing);
    }

    #[test]
    fn full_forward_and_back() {
        let mut s = SessionState::new();
        s.add_image(solid_png(4, 4, [9, 9, 9, 255]));
        assert_eq!(s.advance(), Ok(Stage::Extracting));
        assert_eq!(s.advance(), Err(SessionError::NoExtraction));

        let fp = ImageSetFingerprint::of(s.images());
        s.set_extraction(fp, extraction());
        assert_eq!(s.advance(), Ok(Stage::Displaying));
        assert_eq!(s.advance(), Ok(Stage::Displaying));

        assert_eq!(s.back(), Stage::Extracting);
        assert_eq!(s.back(), Stage::Capturing);
        assert_eq!(s.back(), Stage::Capturing);
        // Going back keeps the data.
        assert_eq!(s.dishes().len(), 2);
        assert!(s.last_extraction().is_some());
    }

    #[test]
    fn reset_clears_everything() {
        let mut s = extracted_session();
        s.advance().unwrap();
        s.reset();
        assert_eq!(s.stage(), Stage::Capturing);
        assert!(s.images().is_empty());
        assert!(s.dishes().is_empty());
        assert!(s.restaurant_name().is_none());
        assert!(s.last_extraction().is_none());
    }

    #[test]
    fn set_extraction_installs_dishes() {
        let s = extracted_session();
        assert_eq!(s.restaurant_name(), Some("Luigi's"));
        assert_eq!(s.dishes().len(), 2);
        assert_eq!(s.sections(), vec!["Desserts", "Mains"]);
    }

    #[test]
    fn update_for_existing_dish_applies() {
        let mut s = extracted_session();
        let pizza = s.dishes()[0].clone();
        assert!(s.apply_dish_update(&pizza.loading()));
        assert!(s.dish(pizza.id).unwrap().is_image_loading);

        let img = Image::new(vec![1, 2, 3], "image/png");
        assert!(s.apply_dish_update(&pizza.resolved(Some(img))));
        let d = s.dish(pizza.id).unwrap();
        assert!(d.image.is_some());
        assert!(d.is_resting());
    }

    #[test]
    fn update_for_removed_dish_is_discarded() {
        let mut s = extracted_session();
        let pizza = s.dishes()[0].clone();
        s.remove_dish(pizza.id).unwrap();
        assert!(!s.apply_dish_update(&pizza.resolved(None)));
        assert_eq!(s.dishes().len(), 1);
    }

    #[test]
    fn update_after_reset_is_discarded() {
        let mut s = extracted_session();
        let pizza = s.dishes()[0].clone();
        s.reset();
        assert!(!s.apply_event(&EnrichmentEvent::DishUpdated(pizza.resolved(None))));
        assert!(s.dishes().is_empty());
    }

    #[test]
    fn image_update_keeps_user_edits() {
        let mut s = extracted_session();
        let pizza = s.dishes()[0].clone();
        let loading = pizza.loading();
        s.apply_dish_update(&loading);

        let mut edited = pizza.clone();
        edited.name = "Pizza Margherita".into();
        s.update_dish(edited).unwrap();

        s.apply_dish_update(&loading.resolved(None));
        let d = s.dish(pizza.id).unwrap();
        assert_eq!(d.name, "Pizza Margherita");
        assert!(d.image_load_error);
    }

    #[test]
    fn dish_edits() {
        let mut s = extracted_session();
        assert_eq!(
            s.add_dish(Dish::new("   ")),
            Err(SessionError::EmptyDishName)
        );
        let id = s.add_dish(Dish::new("Espresso").with_section("Drinks")).unwrap();
        assert_eq!(s.dishes().len(), 3);

        let unknown = Dish::new("Ghost");
        assert_eq!(
            s.update_dish(unknown.clone()),
            Err(SessionError::UnknownDish(unknown.id))
        );

        let mut edited = s.dish(id).unwrap().clone();
        edited.price = Some("$3".into());
        s.update_dish(edited).unwrap();
        assert_eq!(s.dish(id).unwrap().price.as_deref(), Some("$3"));

        s.remove_dish(id).unwrap();
        assert!(s.dish(id).is_none());
    }

    #[test]
    fn blank_edit_fields_become_none() {
        let mut s = extracted_session();
        let id = s
            .add_dish(Dish::new(" Espresso ").with_section("  ").with_price(""))
            .unwrap();
        let added = s.dish(id).unwrap();
        assert_eq!(added.name, "Espresso");
        assert_eq!(added.section, None);
        assert_eq!(added.price, None);

        let mut edited = s.dishes()[0].clone();
        edited.section = Some(String::new());
        edited.description = Some(" \t".into());
        s.update_dish(edited.clone()).unwrap();
        let pizza = s.dish(edited.id).unwrap();
        assert_eq!(pizza.section, None);
        assert_eq!(pizza.description, None);
        assert_eq!(s.sections(), vec!["Desserts"]);
    }

    #[test]
    fn filtered_view() {
        let s = extracted_session();
        let filter = DishFilter {
            query: "tira".into(),
            section: None,
        };
        let hits = s.filtered_dishes(&filter);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Tiramisu");
    }

    #[test]
    fn restaurant_override_trims() {
        let mut s = extracted_session();
        s.set_restaurant_name(Some("  Luigi's Trattoria ".into()));
        assert_eq!(s.restaurant_name(), Some("Luigi's Trattoria"));
        s.set_restaurant_name(Some("   ".into()));
        assert_eq!(s.restaurant_name(), None);
    }

    #[test]
    fn remove_image_bounds() {
        let mut s = SessionState::new();
        s.add_image(solid_png(2, 2, [0, 0, 0, 255]));
        assert_eq!(
            s.remove_image(3).unwrap_err(),
            SessionError::ImageIndexOutOfRange { index: 3, len: 1 }
        );
        assert!(s.remove_image(0).is_ok());
        assert!(s.images().is_empty());
    }

    #[tokio::test]
    async fn subscribers_see_events() {
        let mut s = SessionState::new();
        let mut rx = s.subscribe();
        s.add_image(solid_png(2, 2, [0, 0, 0, 255]));
        s.advance().unwrap();
        s.reset();

        assert_eq!(rx.recv().await.unwrap(), SessionEvent::ImagesChanged { count: 1 });
        assert_eq!(
            rx.recv().await.unwrap(),
            SessionEvent::StageChanged(Stage::Extracting)
        );
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::Reset);
    }
}
