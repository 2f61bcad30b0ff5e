//! Image encoding for upload and for change detection.
//!
//! Menu photos go to the vision service as base64 inside the JSON request
//! body. PNG is preferred because it is lossless and small print stays crisp;
//! JPEG at quality 90 is the fallback when PNG encoding fails.
//!
//! Fingerprinting uses the opposite trade-off: a tiny, low-quality JPEG
//! re-encoding that is cheap to hash and insensitive to container metadata.

use crate::error::ExtractionError;
use crate::model::Image;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::io::Cursor;
use tracing::{debug, warn};

/// JPEG quality for the upload fallback.
pub const UPLOAD_JPEG_QUALITY: u8 = 90;

/// Longest edge of the fingerprint thumbnail, in pixels.
pub const FINGERPRINT_EDGE: u32 = 64;

/// JPEG quality of the fingerprint thumbnail.
pub const FINGERPRINT_JPEG_QUALITY: u8 = 10;

/// A base64 payload ready for a multimodal request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// Base64 (standard alphabet, padded).
    pub data: String,
    pub mime_type: String,
}

impl EncodedImage {
    /// Size of the decoded payload in bytes, approximately.
    pub fn approx_bytes(&self) -> usize {
        self.data.len() / 4 * 3
    }
}

/// Encode a menu photo for the extraction request.
///
/// Decodes the captured bytes, then re-encodes as PNG, or as JPEG when PNG
/// encoding fails.
pub fn encode_for_upload(image: &Image) -> Result<EncodedImage, ExtractionError> {
    let decoded = image::load_from_memory(&image.bytes).map_err(|e| ExtractionError::InvalidImage {
        detail: e.to_string(),
    })?;

    let (buf, mime_type) = match encode_png(&decoded) {
        Ok(buf) => (buf, "image/png"),
        Err(e) => {
            warn!("PNG encoding failed ({}), falling back to JPEG", e);
            let buf = encode_jpeg(&decoded, UPLOAD_JPEG_QUALITY).map_err(|e| {
                ExtractionError::InvalidImage {
                    detail: e.to_string(),
                }
            })?;
            (buf, "image/jpeg")
        }
    };

    let data = STANDARD.encode(&buf);
    debug!("Encoded menu image as {} → {} bytes base64", mime_type, data.len());

    Ok(EncodedImage {
        data,
        mime_type: mime_type.to_string(),
    })
}

/// Bytes hashed for the fingerprint of one image.
///
/// Falls back to the raw bytes when the image cannot be decoded, so an
/// undecodable capture still has a stable digest.
pub fn fingerprint_bytes(image: &Image) -> Vec<u8> {
    match image::load_from_memory(&image.bytes) {
        Ok(decoded) => {
            let thumb = decoded.thumbnail(FINGERPRINT_EDGE, FINGERPRINT_EDGE);
            match encode_jpeg(&thumb, FINGERPRINT_JPEG_QUALITY) {
                Ok(buf) => buf,
                Err(e) => {
                    debug!("Fingerprint re-encode failed ({}), hashing raw bytes", e);
                    image.bytes.clone()
                }
            }
        }
        Err(_) => image.bytes.clone(),
    }
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))?;
    Ok(buf)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    /// A small solid-colour PNG.
    pub(crate) fn solid_png(w: u32, h: u32, rgba: [u8; 4]) -> Image {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba(rgba)));
        Image::new(encode_png(&img).unwrap(), "image/png")
    }

    #[test]
    fn encode_small_image_as_png() {
        let data = encode_for_upload(&solid_png(10, 10, [255, 0, 0, 255])).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert!(!decoded.is_empty());
        assert!(data.approx_bytes() > 0);
    }

    #[test]
    fn garbage_is_invalid_image() {
        let err = encode_for_upload(&Image::from_bytes(b"not an image".to_vec())).unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidImage { .. }));
    }

    #[test]
    fn fingerprint_bytes_are_small_jpeg() {
        let fp = fingerprint_bytes(&solid_png(400, 300, [0, 128, 255, 255]));
        assert_eq!(&fp[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn fingerprint_is_stable_and_content_sensitive() {
        let a = fingerprint_bytes(&solid_png(50, 50, [10, 20, 30, 255]));
        let b = fingerprint_bytes(&solid_png(50, 50, [10, 20, 30, 255]));
        let c = fingerprint_bytes(&solid_png(50, 50, [250, 20, 30, 255]));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn undecodable_fingerprint_uses_raw_bytes() {
        let img = Image::from_bytes(b"raw".to_vec());
        assert_eq!(fingerprint_bytes(&img), b"raw".to_vec());
    }
}
