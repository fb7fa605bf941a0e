//! Embedded bitmap extraction with size-based noise filtering.
//!
//! Logos, icons and rules are dropped by their declared pixel size before
//! any stream is decoded. An image object placed several times on a page is
//! extracted once, at its first placement.

use crate::error::StageWarning;
use crate::geometry::Rect;
use crate::pipeline::encode::ImageFormatTag;
use crate::pipeline::source::{BitmapDecoder, BitmapRef, DecodeError, Page};
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddedFilter {
    pub min_width: u32,
    pub min_height: u32,
    pub min_area: u64,
}

impl EmbeddedFilter {
    pub fn admits(&self, bitmap: &BitmapRef) -> bool {
        bitmap.pixel_width >= self.min_width
            && bitmap.pixel_height >= self.min_height
            && bitmap.pixel_area() >= self.min_area
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddedImage {
    pub page: usize,
    pub bbox: Rect,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormatTag,
    pub bytes: Vec<u8>,
}

/// Decode the page's admissible bitmaps. Decoding problems become warnings
/// for malformed streams; unsupported encodings are only logged.
pub fn extract_embedded(
    page: &Page,
    decoder: &dyn BitmapDecoder,
    filter: &EmbeddedFilter,
    warnings: &mut Vec<StageWarning>,
) -> Vec<EmbeddedImage> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for (bitmap, bbox) in page.bitmaps() {
        if !seen.insert(bitmap.object) {
            continue;
        }
        if !filter.admits(bitmap) {
            debug!(
                "Page {}: image {:?} {}x{} below size filter",
                page.number(),
                bitmap.object,
                bitmap.pixel_width,
                bitmap.pixel_height
            );
            continue;
        }
        match decoder.decode_bitmap(bitmap) {
            Ok(decoded) => out.push(EmbeddedImage {
                page: page.number(),
                bbox: bbox.rounded(),
                width: decoded.width,
                height: decoded.height,
                format: decoded.format,
                bytes: decoded.bytes,
            }),
            Err(DecodeError::Unsupported(detail)) => {
                debug!("Page {}: image {:?} skipped: {}", page.number(), bitmap.object, detail);
            }
            Err(e @ DecodeError::Malformed(_)) => {
                warnings.push(StageWarning::BitmapSkipped {
                    page: page.number(),
                    detail: e.to_string(),
                });
            }
        }
    }
    out
}
