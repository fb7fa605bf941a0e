//! pdfium-backed rendering and text geometry.
//!
//! ## Why cap pixels as well as DPI?
//!
//! Page sizes vary wildly: an A0 poster at 220 DPI would produce a
//! 20,000 px wide image. `max_pixels` caps the longest edge regardless of
//! physical size, keeping memory bounded per page.

use crate::capability::{PageRenderer, TextGeometry, TextRun};
use crate::pipeline::source::Page;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::debug;

/// An open pdfium document.
pub struct PdfiumBackend<'a> {
    document: PdfDocument<'a>,
}

impl<'a> PdfiumBackend<'a> {
    pub fn open(pdfium: &'a Pdfium, path: &Path) -> Result<Self, String> {
        let document = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| format!("pdfium could not open {}: {:?}", path.display(), e))?;
        Ok(Self { document })
    }

    fn page(&self, index: usize) -> Result<PdfPage<'_>, String> {
        let idx = u16::try_from(index).map_err(|_| format!("page index {index} out of range"))?;
        self.document
            .pages()
            .get(idx)
            .map_err(|e| format!("{:?}", e))
    }
}

/// Render scale for `dpi`, reduced so the longest edge stays within `max_pixels`.
pub fn render_scale(width_pt: f32, height_pt: f32, dpi: u32, max_pixels: u32) -> f32 {
    let scale = dpi as f32 / 72.0;
    let longest = width_pt.max(height_pt) * scale;
    if max_pixels > 0 && longest > max_pixels as f32 {
        scale * max_pixels as f32 / longest
    } else {
        scale
    }
}

impl PageRenderer for PdfiumBackend<'_> {
    fn render_page(&self, page: &Page, dpi: u32, max_pixels: u32) -> Result<DynamicImage, String> {
        let pdf_page = self.page(page.index)?;
        let scale = render_scale(pdf_page.width().value, pdf_page.height().value, dpi, max_pixels);
        let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);

        let bitmap = pdf_page
            .render_with_config(&render_config)
            .map_err(|e| format!("{:?}", e))?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} at {} dpi → {}x{} px",
            page.number(),
            dpi,
            image.width(),
            image.height()
        );
        Ok(image)
    }
}

impl TextGeometry for PdfiumBackend<'_> {
    fn text_runs(&self, page: &Page) -> Result<Vec<TextRun>, String> {
        let pdf_page = self.page(page.index)?;
        let text = pdf_page.text().map_err(|e| format!("{:?}", e))?;

        let runs: Vec<TextRun> = text
            .segments()
            .iter()
            .filter_map(|segment| {
                let content = segment.text();
                let content = content.trim();
                if content.is_empty() {
                    return None;
                }
                let b = segment.bounds();
                Some(TextRun {
                    text: content.to_string(),
                    bbox: page.user_rect(b.left().value, b.bottom().value, b.right().value, b.top().value),
                })
            })
            .collect();
        debug!("Page {}: {} text runs", page.number(), runs.len());
        Ok(runs)
    }
}
