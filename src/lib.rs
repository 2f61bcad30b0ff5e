//! # menu-visualizer
//!
//! Turn photos of a restaurant menu into an illustrated, filterable dish list.
//!
//! ## Why this crate?
//!
//! A menu photo is hard to read on a phone and says nothing about what the
//! food looks like. This crate lets a vision model read the menu into
//! structured dishes, then attaches a picture to every dish, either found
//! through image search or synthesised by an image model, while the UI
//! shows results as they arrive.
//!
//! ## Pipeline Overview
//!
//! ```text
//! menu photos
//!  │
//!  ├─ 1. Cache     fingerprint the photos; reuse the last result if unchanged
//!  ├─ 2. Encode    PNG (JPEG fallback) → base64, CPU work in spawn_blocking
//!  ├─ 3. Extract   one vision call → restaurant name + dishes (lenient JSON)
//!  ├─ 4. Enrich    per-dish image search or generation, bounded concurrency,
//!  │               retry with jittered backoff
//!  └─ 5. Session   updates applied by id to the single session owner
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use menu_visualizer::{Image, MenuPipeline, PipelineConfig, SessionState};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Keys come from GEMINI_API_KEY or ./menuviz.toml
//!     let config = PipelineConfig::default();
//!     let pipeline = MenuPipeline::from_config(&config)?;
//!
//!     let mut session = SessionState::new();
//!     session.add_image(Image::from_bytes(std::fs::read("menu.jpg")?));
//!     session.advance()?;
//!
//!     pipeline.extract_for_session(&mut session, false).await?;
//!     session.advance()?;
//!
//!     let summary = pipeline.run_enrichment(&mut session, |_, _| {}).await;
//!     eprintln!("{} of {} dishes illustrated", summary.with_image, summary.total);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `menuviz` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! menu-visualizer = { version = "0.1", default-features = false }
//! ```
//!
//! ## Choosing an Image Strategy
//!
//! | Strategy | Needs | Retries | Best for |
//! |----------|-------|---------|----------|
//! | `Generation` (default) | `GEMINI_API_KEY` | 3 attempts, 1s→2s ±25 % | Every dish gets a consistent picture |
//! | `Search` | Custom Search key + engine id | none | Real photos of well-known dishes |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cache;
pub mod config;
pub mod credentials;
pub mod enrich;
pub mod error;
pub mod extract;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod provider;
pub mod retry;
pub mod session;
pub mod stream;
pub mod workflow;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cache::{should_reextract, CachedExtraction, ExtractionCache, ImageSetFingerprint};
pub use config::{EnrichmentPolicy, ImageStrategy, PipelineConfig, PipelineConfigBuilder};
pub use credentials::{ApiKey, CredentialSource, CredentialStore};
pub use enrich::{BatchImageEnricher, EnrichmentReport, EnrichmentSummary};
pub use error::{ErrorCategory, ExtractionError, ProviderError};
pub use extract::MenuDataExtractor;
pub use model::{sections, Dish, DishFilter, DishId, Image, MenuExtractionResult};
pub use pipeline::vision::VisionModel;
pub use progress::{callback_fn, EnrichmentProgressCallback, NoopProgressCallback, ProgressCallback};
pub use provider::{DishImageProvider, GenerationImageProvider, SearchImageProvider};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use session::{SessionError, SessionEvent, SessionState, Stage};
pub use stream::{enrich_stream, EnrichmentEvent, EnrichmentHandle, EnrichmentStream};
pub use workflow::{ExtractionOutcome, MenuPipeline};
