//! Data model shared by every pipeline stage.
//!
//! A [`Dish`] is created text-only by the extractor (or by a manual edit) and
//! then gains an image during enrichment. Its [`DishId`] never changes, which
//! is what lets asynchronous image results find their way back to the right
//! entry even after the list has been edited or re-ordered.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque, stable identifier of a dish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DishId(Uuid);

impl DishId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DishId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DishId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An encoded image payload (menu photo or dish picture).
#[derive(Clone, PartialEq, Eq)]
pub struct Image {
    /// Encoded bytes as captured, downloaded or generated.
    pub bytes: Vec<u8>,
    /// MIME type, e.g. `image/png`.
    pub mime_type: String,
}

impl Image {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Wrap raw bytes, sniffing the MIME type from the magic number.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let mime_type = sniff_mime(&bytes).unwrap_or("application/octet-stream");
        Self::new(bytes, mime_type)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Conventional file extension for the MIME type.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/png" => "png",
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "bin",
        }
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// MIME type guessed from the leading bytes, if it is a known image format.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes).ok().map(|f| f.to_mime_type())
}

/// One menu entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dish {
    pub id: DishId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Absent until enrichment succeeds. Never serialised.
    #[serde(skip)]
    pub image: Option<Image>,
    #[serde(skip)]
    pub is_image_loading: bool,
    #[serde(skip)]
    pub image_load_error: bool,
}

impl Dish {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: DishId::new(),
            name: name.into(),
            section: None,
            price: None,
            description: None,
            image: None,
            is_image_loading: false,
            image_load_error: false,
        }
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    pub fn with_price(mut self, price: impl Into<String>) -> Self {
        self.price = Some(price.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Copy of this dish in the "fetch in flight" state.
    pub fn loading(&self) -> Self {
        Self {
            is_image_loading: true,
            image_load_error: false,
            ..self.clone()
        }
    }

    /// Copy of this dish in its resting state after a fetch.
    ///
    /// `None` means the attempt failed or found nothing.
    pub fn resolved(&self, image: Option<Image>) -> Self {
        let image_load_error = image.is_none();
        Self {
            image,
            is_image_loading: false,
            image_load_error,
            ..self.clone()
        }
    }

    /// Image present or error flag set, and nothing in flight.
    pub fn is_resting(&self) -> bool {
        !self.is_image_loading && (self.image.is_some() || self.image_load_error)
    }

    /// Trimmed name, with blank section, price and description as `None`.
    pub(crate) fn tidied(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self.section = non_blank(self.section);
        self.price = non_blank(self.price);
        self.description = non_blank(self.description);
        self
    }
}

/// Restaurant name plus dishes in extraction order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuExtractionResult {
    pub restaurant_name: Option<String>,
    pub dishes: Vec<Dish>,
}

impl MenuExtractionResult {
    /// The lenient outcome for an unreadable reply.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.restaurant_name.is_none() && self.dishes.is_empty()
    }
}

/// Search and section filter applied to the dish grid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DishFilter {
    /// Case-insensitive substring of the dish name. Empty matches everything.
    pub query: String,
    /// Exact section label, or every section when `None`.
    pub section: Option<String>,
}

impl DishFilter {
    pub fn matches(&self, dish: &Dish) -> bool {
        let query = self.query.trim().to_lowercase();
        if !query.is_empty() && !dish.name.to_lowercase().contains(&query) {
            return false;
        }
        match &self.section {
            Some(section) => dish.section.as_deref() == Some(section.as_str()),
            None => true,
        }
    }

    pub fn apply<'a>(&self, dishes: &'a [Dish]) -> Vec<&'a Dish> {
        dishes.iter().filter(|d| self.matches(d)).collect()
    }
}

/// Trimmed text, or `None` when blank.
pub(crate) fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Sorted, de-duplicated section labels present in `dishes`.
pub fn sections(dishes: &[Dish]) -> Vec<String> {
    let mut out: Vec<String> = dishes.iter().filter_map(|d| d.section.clone()).collect();
    out.sort_unstable();
    out.dedup();
    out
}
