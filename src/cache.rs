//! Change detection for the captured image set.
//!
//! Extraction is a paid API call, so it only runs again when the photos
//! changed. Each image is reduced to a digest of a tiny low-quality
//! re-encoding (see [`crate::pipeline::encode::fingerprint_bytes`]); two
//! image sets match when they have the same length and the same digests in
//! the same order.
//!
//! The digest is a change signal, not a security boundary. A collision only
//! costs a stale dish list, which the user can fix with a forced
//! re-extraction.

use crate::error::ExtractionError;
use crate::model::{Image, MenuExtractionResult};
use crate::pipeline::encode::fingerprint_bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Summary of a captured image set used for equality checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSetFingerprint {
    pub count: usize,
    pub content_digests: Vec<String>,
}

impl ImageSetFingerprint {
    /// Fingerprint `images` on the current thread.
    ///
    /// Every image is decoded and re-encoded; prefer [`Self::compute`] from
    /// async code.
    pub fn of(images: &[Image]) -> Self {
        Self {
            count: images.len(),
            content_digests: images.iter().map(content_digest).collect(),
        }
    }

    /// Fingerprint `images` on the blocking pool.
    pub async fn compute(images: Vec<Image>) -> Result<Self, ExtractionError> {
        tokio::task::spawn_blocking(move || Self::of(&images))
            .await
            .map_err(|e| ExtractionError::Internal(format!("fingerprint task failed: {e}")))
    }

    /// Whether both describe the same image set.
    pub fn matches(&self, other: &ImageSetFingerprint) -> bool {
        self.count == other.count
            && self.content_digests.len() == other.content_digests.len()
            && self
                .content_digests
                .iter()
                .zip(&other.content_digests)
                .all(|(a, b)| a == b)
    }
}

/// Hex SHA-256 of the image's fingerprint thumbnail.
pub fn content_digest(image: &Image) -> String {
    hex::encode(Sha256::digest(fingerprint_bytes(image)))
}

/// An extraction result together with the images that produced it.
#[derive(Debug, Clone)]
pub struct CachedExtraction {
    pub fingerprint: ImageSetFingerprint,
    pub result: MenuExtractionResult,
}

/// Whether `current` needs a fresh extraction given the cached entry.
pub fn should_reextract(current: &[Image], cached: Option<&CachedExtraction>) -> bool {
    match cached {
        None => true,
        Some(_) => should_reextract_fingerprint(&ImageSetFingerprint::of(current), cached),
    }
}

/// [`should_reextract`] with the current fingerprint already computed.
pub fn should_reextract_fingerprint(
    current: &ImageSetFingerprint,
    cached: Option<&CachedExtraction>,
) -> bool {
    let Some(cached) = cached else {
        debug!("No cached extraction; extracting");
        return true;
    };
    if current.count != cached.fingerprint.count {
        debug!(
            "Image count changed ({} → {}); extracting",
            cached.fingerprint.count, current.count
        );
        return true;
    }
    if !current.matches(&cached.fingerprint) {
        debug!("Image content changed; extracting");
        return true;
    }
    debug!("Images unchanged; reusing cached extraction");
    false
}

/// Holds at most one cached extraction for the session.
#[derive(Debug, Clone, Default)]
pub struct ExtractionCache {
    entry: Option<CachedExtraction>,
}

impl ExtractionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self) -> Option<&CachedExtraction> {
        self.entry.as_ref()
    }

    /// The cached result, if it was produced from the same images.
    pub fn lookup(&self, current: &ImageSetFingerprint) -> Option<&MenuExtractionResult> {
        if should_reextract_fingerprint(current, self.entry.as_ref()) {
            None
        } else {
            self.entry.as_ref().map(|e| &e.result)
        }
    }

    pub fn store(&mut self, fingerprint: ImageSetFingerprint, result: MenuExtractionResult) {
        self.entry = Some(CachedExtraction {
            fingerprint,
            result,
        });
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Dish;
    use crate::pipeline::encode::tests::solid_png;

    fn photos() -> Vec<Image> {
        vec![
            solid_png(40, 60, [250, 250, 240, 255]),
            solid_png(40, 60, [20, 20, 20, 255]),
        ]
    }

    fn cached_for(images: &[Image]) -> CachedExtraction {
        CachedExtraction {
            fingerprint: ImageSetFingerprint::of(images),
            result: MenuExtractionResult {
                restaurant_name: Some("Luigi's".into()),
                dishes: vec![Dish::new("Pizza")],
            },
        }
    }

    #[test]
    fn no_cache_means_extract() {
        assert!(should_reextract(&photos(), None));
    }

    #[test]
    fn identical_images_reuse_cache() {
        let cached = cached_for(&photos());
        // Fresh but byte-identical captures.
        assert!(!should_reextract(&photos(), Some(&cached)));
    }

    #[test]
    fn count_change_means_extract() {
        let cached = cached_for(&photos());
        let mut more = photos();
        more.push(solid_png(40, 60, [0, 200, 0, 255]));
        assert!(should_reextract(&more, Some(&cached)));
        assert!(should_reextract(&photos()[..1], Some(&cached)));
    }

    #[test]
    fn any_digest_change_means_extract() {
        let cached = cached_for(&photos());
        let mut changed = photos();
        changed[1] = solid_png(40, 60, [200, 20, 20, 255]);
        assert!(should_reextract(&changed, Some(&cached)));
    }

    #[test]
    fn order_matters() {
        let cached = cached_for(&photos());
        let mut swapped = photos();
        swapped.swap(0, 1);
        assert!(should_reextract(&swapped, Some(&cached)));
    }

    #[test]
    fn digest_is_hex_sha256() {
        let d = content_digest(&solid_png(4, 4, [1, 2, 3, 255]));
        assert_eq!(d.len(), 64);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn cache_lookup_and_clear() {
        let images = photos();
        let fp = ImageSetFingerprint::of(&images);
        let mut cache = ExtractionCache::new();
        assert!(cache.lookup(&fp).is_none());

        cache.store(fp.clone(), cached_for(&images).result);
        let hit = cache.lookup(&fp).expect("cache hit");
        assert_eq!(hit.restaurant_name.as_deref(), Some("Luigi's"));

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.lookup(&fp).is_none());
    }

    #[tokio::test]
    async fn compute_matches_sync_fingerprint() {
        let images = photos();
        let fp = ImageSetFingerprint::compute(images.clone()).await.unwrap();
        assert_eq!(fp, ImageSetFingerprint::of(&images));
        assert_eq!(fp.count, 2);
    }
}
