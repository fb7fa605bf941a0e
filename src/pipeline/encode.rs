//! Image encoding: `DynamicImage` → PNG bytes, plus the format tag recorded
//! in the image manifest.
//!
//! Rendered pages and decoded raw bitmaps are written as PNG: lossless, so
//! thin chart lines and small axis labels survive. Embedded JPEG streams are
//! passed through untouched and keep their original format.

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::debug;

/// On-disk format of an extracted image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormatTag {
    Png,
    Jpeg,
}

impl ImageFormatTag {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormatTag::Png => "png",
            ImageFormatTag::Jpeg => "jpg",
        }
    }
}

/// Encode an image as PNG.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!("Encoded {}x{} image → {} bytes PNG", img.width(), img.height(), buf.len());
    Ok(buf)
}
