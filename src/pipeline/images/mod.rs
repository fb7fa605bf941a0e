//! Per-page image pipeline.
//!
//! ```text
//!  Page ──► select ──► plan_crop ──► render ──► crop pixels ──► PNG ─┐
//!     └───────────────────────────► embedded bitmaps (filtered) ─────┤
//!                                          hybrid drop ◄────────────┘
//!                                               │
//!                                             dedup ──► PendingImage*
//! ```
//!
//! Nothing here touches the filesystem; [`PendingImage`] carries encoded bytes
//! to the manifest writer, which names and persists them.

pub mod crop;
pub mod embedded;
pub mod merge;
pub mod select;

use crate::capability::{PageRenderer, TextGeometry, TextRun};
use crate::config::{CropMode, ImageSettings};
use crate::error::StageWarning;
use crate::geometry::Rect;
use crate::output::ImageSource;
use crate::pipeline::captions::{CaptionCandidate, CaptionDetector};
use crate::pipeline::encode::{encode_png, ImageFormatTag};
use crate::pipeline::source::{BitmapDecoder, Page};
use image::DynamicImage;
use tracing::{debug, warn};

use crop::{plan_crop, CropPlan, CropSettings};
use embedded::{extract_embedded, EmbeddedFilter};
use select::{select_page, RenderDecision};

/// An image accepted for output but not yet written.
#[derive(Debug, Clone)]
pub struct PendingImage {
    pub source: ImageSource,
    pub page: usize,
    /// Page-space region the pixels cover.
    pub bbox: Rect,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormatTag,
    pub bytes: Vec<u8>,
    pub dpi: Option<u32>,
    pub crop_mode: Option<CropMode>,
    pub crop_applied: Option<bool>,
    pub related_caption: Option<String>,
}

impl PendingImage {
    pub fn pixel_area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Result of one page.
#[derive(Debug, Default)]
pub struct PageImages {
    pub images: Vec<PendingImage>,
    pub decision: Option<RenderDecision>,
    /// Whether a render entry was produced.
    pub rendered: bool,
    /// Resolved caption anchors as `(caption index, box)`.
    pub anchors: Vec<(usize, Rect)>,
    pub warnings: Vec<StageWarning>,
}

/// Image stage bound to one document's capabilities.
pub struct ImageStage<'a> {
    settings: ImageSettings,
    max_rendered_pixels: u32,
    renderer: Option<&'a dyn PageRenderer>,
    geometry: Option<&'a dyn TextGeometry>,
    detector: &'a CaptionDetector,
}

impl<'a> ImageStage<'a> {
    pub fn new(
        settings: ImageSettings,
        max_rendered_pixels: u32,
        renderer: Option<&'a dyn PageRenderer>,
        geometry: Option<&'a dyn TextGeometry>,
        detector: &'a CaptionDetector,
    ) -> Self {
        Self {
            settings,
            max_rendered_pixels,
            renderer,
            geometry,
            detector,
        }
    }

    /// Whether render entries can be produced at all.
    pub fn can_render(&self) -> bool {
        self.settings.image_mode.includes_render() && self.renderer.is_some()
    }

    fn crop_settings(&self) -> CropSettings {
        CropSettings {
            mode: self.settings.render_crop_mode,
            top_margin_pt: self.settings.caption_top_margin_pt,
            bottom_margin_pt: self.settings.crop_bottom_margin_pt,
            min_height_ratio: self.settings.min_crop_height_ratio,
        }
    }

    fn embedded_filter(&self) -> EmbeddedFilter {
        EmbeddedFilter {
            min_width: self.settings.embedded_min_width,
            min_height: self.settings.embedded_min_height,
            min_area: self.settings.embedded_min_area,
        }
    }

    /// Run every image step for `page`. `captions` are the page's merged
    /// caption candidates; `decoder` materialises its embedded bitmaps.
    pub fn process_page(&self, page: &Page, captions: &[CaptionCandidate], decoder: &dyn BitmapDecoder) -> PageImages {
        let mut out = PageImages::default();

        if let Some(renderer) = self.renderer.filter(|_| self.settings.image_mode.includes_render()) {
            let decision = select_page(
                self.settings.figure_pages,
                captions.len(),
                self.settings.max_captions_per_render_page,
            );
            out.decision = Some(decision);
            if decision.renders() {
                self.render(page, captions, renderer, &mut out);
            } else {
                debug!("Page {}: not rendered ({:?})", page.number(), decision);
            }
        }

        // Without a renderer every mode falls back to embedded bitmaps.
        if (self.settings.image_mode.includes_embedded() || !self.can_render())
            && !merge::drops_embedded(
                self.settings.image_mode,
                self.settings.keep_embedded_on_rendered_pages,
                out.rendered,
            )
        {
            let found = extract_embedded(page, decoder, &self.embedded_filter(), &mut out.warnings);
            for img in found {
                let related_caption = nearest_caption(&img.bbox, captions, &out.anchors);
                out.images.push(PendingImage {
                    source: ImageSource::Embedded,
                    page: img.page,
                    bbox: img.bbox,
                    width: img.width,
                    height: img.height,
                    format: img.format,
                    bytes: img.bytes,
                    dpi: None,
                    crop_mode: None,
                    crop_applied: None,
                    related_caption,
                });
            }
        }

        let images = std::mem::take(&mut out.images);
        let images = merge::hybrid_drop(
            images,
            self.settings.image_mode,
            self.settings.keep_embedded_on_rendered_pages,
        );
        out.images = merge::dedup(images, self.settings.dedup_iou_threshold);
        out
    }

    fn render(&self, page: &Page, captions: &[CaptionCandidate], renderer: &dyn PageRenderer, out: &mut PageImages) {
        let settings = self.crop_settings();

        let runs: Option<Vec<TextRun>> = match (settings.mode, self.geometry) {
            (CropMode::CaptionAware, Some(geometry)) if !captions.is_empty() => match geometry.text_runs(page) {
                Ok(runs) => Some(runs),
                Err(detail) => {
                    warn!("Page {}: text geometry failed: {}", page.number(), detail);
                    out.warnings.push(StageWarning::TextFailed {
                        page: page.number(),
                        detail,
                    });
                    None
                }
            },
            _ => None,
        };

        let outcome = plan_crop(page, captions, runs.as_deref(), self.detector, &settings);
        out.anchors = outcome.anchors;
        let clip = match outcome.plan {
            CropPlan::Skip => {
                debug!("Page {}: no visual content near captions, render skipped", page.number());
                return;
            }
            CropPlan::FullPage(reason) => {
                debug!("Page {}: full-page render ({:?})", page.number(), reason);
                None
            }
            CropPlan::Crop(rect) => Some(rect),
        };

        let rendered = match renderer.render_page(page, self.settings.render_dpi, self.max_rendered_pixels) {
            Ok(img) => img,
            Err(detail) => {
                warn!("Page {}: render failed: {}", page.number(), detail);
                out.warnings.push(StageWarning::RenderFailed {
                    page: page.number(),
                    detail,
                });
                return;
            }
        };

        let image = match clip {
            Some(rect) => crop_pixels(&rendered, &rect, page.width),
            None => rendered,
        };
        let bytes = match encode_png(&image) {
            Ok(bytes) => bytes,
            Err(e) => {
                out.warnings.push(StageWarning::RenderFailed {
                    page: page.number(),
                    detail: format!("PNG encoding failed: {e}"),
                });
                return;
            }
        };

        let related_caption = out
            .anchors
            .first()
            .and_then(|(i, _)| captions.get(*i))
            .or_else(|| captions.first())
            .map(CaptionCandidate::query);

        out.images.push(PendingImage {
            source: ImageSource::PageRender,
            page: page.number(),
            bbox: clip.unwrap_or_else(|| page.bounds().rounded()),
            width: image.width(),
            height: image.height(),
            format: ImageFormatTag::Png,
            bytes,
            dpi: Some(self.settings.render_dpi),
            crop_mode: Some(self.settings.render_crop_mode),
            crop_applied: Some(clip.is_some()),
            related_caption,
        });
        out.rendered = true;
    }
}

/// Cut the page-space `rect` out of a full-page raster.
fn crop_pixels(image: &DynamicImage, rect: &Rect, page_width: f32) -> DynamicImage {
    if page_width <= 0.0 || image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    let scale = image.width() as f32 / page_width;
    let x = (rect.x0 * scale).floor().max(0.0) as u32;
    let y = (rect.y0 * scale).floor().max(0.0) as u32;
    let x = x.min(image.width().saturating_sub(1));
    let y = y.min(image.height().saturating_sub(1));
    let w = ((rect.width() * scale).ceil() as u32).clamp(1, image.width() - x);
    let h = ((rect.height() * scale).ceil() as u32).clamp(1, image.height() - y);
    image.crop_imm(x, y, w, h)
}

/// Query of the resolved caption whose anchor is vertically closest to `bbox`.
fn nearest_caption(bbox: &Rect, captions: &[CaptionCandidate], anchors: &[(usize, Rect)]) -> Option<String> {
    anchors
        .iter()
        .filter(|(_, anchor)| anchor.horizontal_overlap_ratio(bbox) > 0.0)
        .min_by(|(_, a), (_, b)| {
            let da = a.gap(bbox).1;
            let db = b.gap(bbox).1;
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
        .and_then(|(i, _)| captions.get(*i))
        .map(CaptionCandidate::query)
}
