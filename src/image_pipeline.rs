//! Cover image decoding, size fitting, and encoding helpers.

use std::io::Cursor;
use std::sync::Arc;

use image::{
    codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage, GenericImageView, ImageFormat,
};
use zune_core::{colorspace::ColorSpace, options::DecoderOptions};
use zune_jpeg::JpegDecoder;

use crate::error::PersistError;
use crate::providers::ProviderKind;

const COVER_JPEG_QUALITY: u8 = 90;

/// Decoded cover candidate produced by a provider or read from a track.
///
/// Cloning is cheap; the pixel data is shared.
#[derive(Debug, Clone)]
pub struct CandidateImage {
    image: Arc<DynamicImage>,
    width: u32,
    height: u32,
    source: Option<ProviderKind>,
}

impl CandidateImage {
    pub fn new(image: DynamicImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            image: Arc::new(image),
            width,
            height,
            source: None,
        }
    }

    /// Decodes encoded image bytes (JPEG, PNG, WebP, ...).
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        decode_image_from_memory_with_fallback(bytes).map(Self::new)
    }

    pub fn with_source(mut self, source: ProviderKind) -> Self {
        self.source = Some(source);
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn source(&self) -> Option<ProviderKind> {
        self.source
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// True when both candidates share the same decoded pixel buffer.
    #[cfg(test)]
    pub fn same_pixels(&self, other: &CandidateImage) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }
}

fn looks_like_jpeg(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0xff && bytes[1] == 0xd8
}

fn decode_jpeg_non_strict(bytes: &[u8]) -> Option<DynamicImage> {
    if !looks_like_jpeg(bytes) {
        return None;
    }

    let options = DecoderOptions::new_cmd()
        .set_strict_mode(false)
        .jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(bytes, options);
    let pixels = decoder.decode().ok()?;
    let (width, height) = decoder.dimensions()?;
    let image = image::RgbaImage::from_raw(width as u32, height as u32, pixels)?;
    Some(DynamicImage::ImageRgba8(image))
}

/// Decodes image bytes, retrying truncated or sloppy JPEGs in non-strict mode.
pub fn decode_image_from_memory_with_fallback(bytes: &[u8]) -> Option<DynamicImage> {
    image::load_from_memory(bytes)
        .ok()
        .or_else(|| decode_jpeg_non_strict(bytes))
}

/// Largest size fitting within `max_edge` on both axes, keeping the aspect ratio.
pub fn fit_to_max_edge(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (1, 1);
    }
    let clamped = max_edge.max(1);
    if width.max(height) <= clamped {
        return (width, height);
    }
    if width >= height {
        let scaled_height =
            ((u64::from(height) * u64::from(clamped)) + (u64::from(width) / 2)) / u64::from(width);
        (clamped, scaled_height.max(1) as u32)
    } else {
        let scaled_width =
            ((u64::from(width) * u64::from(clamped)) + (u64::from(height) / 2)) / u64::from(height);
        (scaled_width.max(1) as u32, clamped)
    }
}

/// Scales the cover down when either side exceeds `max_dimension`.
///
/// Covers already within bounds are returned as-is, so applying this twice is
/// the same as applying it once.
pub fn resize_if_needed(cover: &CandidateImage, max_dimension: u32) -> CandidateImage {
    let limit = max_dimension.max(1);
    if cover.width() <= limit && cover.height() <= limit {
        return cover.clone();
    }

    let (target_width, target_height) = fit_to_max_edge(cover.width(), cover.height(), limit);
    let resized = cover
        .image()
        .resize_exact(target_width, target_height, FilterType::Lanczos3);
    let mut next = CandidateImage::new(resized);
    next.source = cover.source();
    next
}

/// Encodes a cover as baseline JPEG for embedding into audio tags.
pub fn encode_cover_jpeg(cover: &CandidateImage) -> Result<Vec<u8>, PersistError> {
    let rgb = DynamicImage::ImageRgb8(cover.image().to_rgb8());
    let mut encoded = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut encoded, COVER_JPEG_QUALITY);
    rgb.write_with_encoder(encoder)
        .map_err(|error| PersistError::Encode(error.to_string()))?;
    Ok(encoded)
}

/// Encodes a cover as PNG, used for picker previews.
pub fn encode_preview_png(cover: &CandidateImage) -> Result<Vec<u8>, String> {
    let mut cursor = Cursor::new(Vec::<u8>::new());
    cover
        .image()
        .write_to(&mut cursor, ImageFormat::Png)
        .map_err(|error| format!("PNG encoding failed: {error}"))?;
    Ok(cursor.into_inner())
}
