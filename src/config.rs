//! Configuration types for paper-artifact extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. Every knob lives in one struct so a
//! run can be reproduced from `metadata.json` alone.

use crate::error::ExtractError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Configuration for one extraction run.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use paper_artifacts::{ExtractionConfig, ImageMode};
///
/// let config = ExtractionConfig::builder()
///     .output_dir("out")
///     .image_mode(ImageMode::Embedded)
///     .render_dpi(150)
///     .build()
///     .unwrap();
/// assert_eq!(config.render_dpi, 150);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Base directory for outputs. Default: current directory.
    pub output_dir: PathBuf,

    /// Bundle (one directory per paper) or flat (prefixed files). Default: bundle.
    pub layout: OutputLayout,

    /// Override for the bundle directory name. Default: derived from the paper title.
    pub bundle_name: Option<String>,

    /// Override for the flat-layout file prefix and image file names.
    pub prefix: Option<String>,

    /// Remove artifacts of a previous run for the same target first. Default: false.
    ///
    /// Without it, a target that already holds artifacts aborts the run with
    /// [`ExtractError::StaleArtifacts`].
    pub clean: bool,

    /// Which image sources are produced. Default: [`ImageMode::Hybrid`].
    pub image_mode: ImageMode,

    /// Which pages are rendered in render/hybrid modes. Default: [`FigurePages::Caption`].
    pub figure_pages: FigurePages,

    /// Rasterisation resolution. Range: 72–600. Default: 220.
    pub render_dpi: u32,

    /// Longest edge cap for a rendered page, in pixels. Default: 6000.
    ///
    /// Independent of DPI: an A0 poster at 220 DPI would otherwise allocate a
    /// bitmap of roughly 10 000 × 7 000 px.
    pub max_rendered_pixels: u32,

    /// Crop strategy for rendered pages. Default: [`CropMode::CaptionAware`].
    pub crop_mode: CropMode,

    /// Margin kept above the detected figure region, in points. Default: 10.
    pub caption_top_margin_pt: f32,

    /// Band trimmed from the page bottom (running footers), in points. Default: 8.
    pub crop_bottom_margin_pt: f32,

    /// Crops shorter than this fraction of the page height fall back to the
    /// full page. Default: 0.15.
    pub min_crop_height_ratio: f32,

    /// Pages with more caption candidates than this are treated as list or
    /// index pages and not rendered under [`FigurePages::Caption`]. Default: 6.
    pub max_captions_per_render_page: usize,

    /// Minimum embedded bitmap width in pixels. Default: 400.
    pub embedded_min_width: u32,

    /// Minimum embedded bitmap height in pixels. Default: 300.
    pub embedded_min_height: u32,

    /// Minimum embedded bitmap area (width × height). Default: 120 000.
    pub embedded_min_area: u64,

    /// In hybrid mode keep embedded images on pages that were also rendered.
    /// Default: false.
    pub keep_embedded_on_rendered_pages: bool,

    /// Same-page images whose boxes overlap above this IoU are duplicates.
    /// Default: 0.8.
    pub dedup_iou_threshold: f32,

    /// Characters of caption text kept per candidate. Default: 200.
    pub caption_snippet_chars: usize,

    /// Characters of context kept on each side of a URL. Default: 80.
    pub link_context_chars: usize,

    /// Upper bound on an availability snippet, in characters. Default: 800.
    pub availability_max_chars: usize,

    /// Run the optional table stage when its capability is present. Default: true.
    pub extract_tables: bool,

    /// Whether to try binding pdfium at startup. Default: [`PdfiumPolicy::Auto`].
    pub pdfium: PdfiumPolicy,

    /// Optional per-page progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            layout: OutputLayout::default(),
            bundle_name: None,
            prefix: None,
            clean: false,
            image_mode: ImageMode::default(),
            figure_pages: FigurePages::default(),
            render_dpi: 220,
            max_rendered_pixels: 6000,
            crop_mode: CropMode::default(),
            caption_top_margin_pt: 10.0,
            crop_bottom_margin_pt: 8.0,
            min_crop_height_ratio: 0.15,
            max_captions_per_render_page: 6,
            embedded_min_width: 400,
            embedded_min_height: 300,
            embedded_min_area: 120_000,
            keep_embedded_on_rendered_pages: false,
            dedup_iou_threshold: 0.8,
            caption_snippet_chars: 200,
            link_context_chars: 80,
            availability_max_chars: 800,
            extract_tables: true,
            pdfium: PdfiumPolicy::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("output_dir", &self.output_dir)
            .field("layout", &self.layout)
            .field("bundle_name", &self.bundle_name)
            .field("prefix", &self.prefix)
            .field("clean", &self.clean)
            .field("image_mode", &self.image_mode)
            .field("figure_pages", &self.figure_pages)
            .field("render_dpi", &self.render_dpi)
            .field("crop_mode", &self.crop_mode)
            .field("min_crop_height_ratio", &self.min_crop_height_ratio)
            .field("max_captions_per_render_page", &self.max_captions_per_render_page)
            .field("extract_tables", &self.extract_tables)
            .field("pdfium", &self.pdfium)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The image-related settings echoed into `metadata.json`.
    pub fn image_settings(&self) -> ImageSettings {
        ImageSettings {
            image_mode: self.image_mode,
            figure_pages: self.figure_pages,
            render_dpi: self.render_dpi,
            render_crop_mode: self.crop_mode,
            caption_top_margin_pt: self.caption_top_margin_pt,
            crop_bottom_margin_pt: self.crop_bottom_margin_pt,
            min_crop_height_ratio: self.min_crop_height_ratio,
            max_captions_per_render_page: self.max_captions_per_render_page,
            embedded_min_width: self.embedded_min_width,
            embedded_min_height: self.embedded_min_height,
            embedded_min_area: self.embedded_min_area,
            keep_embedded_on_rendered_pages: self.keep_embedded_on_rendered_pages,
            dedup_iou_threshold: self.dedup_iou_threshold,
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn layout(mut self, layout: OutputLayout) -> Self {
        self.config.layout = layout;
        self
    }

    pub fn bundle_name(mut self, name: impl Into<String>) -> Self {
        self.config.bundle_name = Some(name.into());
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.prefix = Some(prefix.into());
        self
    }

    pub fn clean(mut self, v: bool) -> Self {
        self.config.clean = v;
        self
    }

    pub fn image_mode(mut self, mode: ImageMode) -> Self {
        self.config.image_mode = mode;
        self
    }

    pub fn figure_pages(mut self, pages: FigurePages) -> Self {
        self.config.figure_pages = pages;
        self
    }

    pub fn render_dpi(mut self, dpi: u32) -> Self {
        self.config.render_dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn crop_mode(mut self, mode: CropMode) -> Self {
        self.config.crop_mode = mode;
        self
    }

    pub fn caption_top_margin_pt(mut self, pt: f32) -> Self {
        self.config.caption_top_margin_pt = pt.max(0.0);
        self
    }

    pub fn crop_bottom_margin_pt(mut self, pt: f32) -> Self {
        self.config.crop_bottom_margin_pt = pt.max(0.0);
        self
    }

    pub fn min_crop_height_ratio(mut self, ratio: f32) -> Self {
        self.config.min_crop_height_ratio = ratio;
        self
    }

    pub fn max_captions_per_render_page(mut self, n: usize) -> Self {
        self.config.max_captions_per_render_page = n;
        self
    }

    pub fn embedded_min_width(mut self, px: u32) -> Self {
        self.config.embedded_min_width = px;
        self
    }

    pub fn embedded_min_height(mut self, px: u32) -> Self {
        self.config.embedded_min_height = px;
        self
    }

    pub fn embedded_min_area(mut self, px: u64) -> Self {
        self.config.embedded_min_area = px;
        self
    }

    pub fn keep_embedded_on_rendered_pages(mut self, v: bool) -> Self {
        self.config.keep_embedded_on_rendered_pages = v;
        self
    }

    pub fn dedup_iou_threshold(mut self, t: f32) -> Self {
        self.config.dedup_iou_threshold = t;
        self
    }

    pub fn caption_snippet_chars(mut self, n: usize) -> Self {
        self.config.caption_snippet_chars = n.max(16);
        self
    }

    pub fn link_context_chars(mut self, n: usize) -> Self {
        self.config.link_context_chars = n;
        self
    }

    pub fn availability_max_chars(mut self, n: usize) -> Self {
        self.config.availability_max_chars = n.max(40);
        self
    }

    pub fn extract_tables(mut self, v: bool) -> Self {
        self.config.extract_tables = v;
        self
    }

    pub fn pdfium(mut self, policy: PdfiumPolicy) -> Self {
        self.config.pdfium = policy;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if !(72..=600).contains(&c.render_dpi) {
            return Err(ExtractError::InvalidConfig(format!(
                "render DPI must be 72–600, got {}",
                c.render_dpi
            )));
        }
        if !(0.0..=1.0).contains(&c.min_crop_height_ratio) {
            return Err(ExtractError::InvalidConfig(format!(
                "min crop height ratio must be within 0–1, got {}",
                c.min_crop_height_ratio
            )));
        }
        if !(c.dedup_iou_threshold > 0.0 && c.dedup_iou_threshold <= 1.0) {
            return Err(ExtractError::InvalidConfig(format!(
                "dedup IoU threshold must be within (0, 1], got {}",
                c.dedup_iou_threshold
            )));
        }
        if c.max_captions_per_render_page == 0 {
            return Err(ExtractError::InvalidConfig(
                "max captions per render page must be ≥ 1".into(),
            ));
        }
        for (label, name) in [("bundle name", &c.bundle_name), ("prefix", &c.prefix)] {
            if matches!(name, Some(n) if n.trim().is_empty()) {
                return Err(ExtractError::InvalidConfig(format!("{label} must not be empty")));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which image sources a run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageMode {
    /// Only bitmaps embedded in the PDF.
    Embedded,
    /// Only rendered (and cropped) figure pages.
    Render,
    /// Both, with embedded images dropped on pages that were rendered. (default)
    #[default]
    Hybrid,
}

impl ImageMode {
    pub fn includes_embedded(self) -> bool {
        matches!(self, ImageMode::Embedded | ImageMode::Hybrid)
    }

    pub fn includes_render(self) -> bool {
        matches!(self, ImageMode::Render | ImageMode::Hybrid)
    }
}

/// Page selection for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FigurePages {
    /// Pages with at least one caption candidate, list/index pages excluded. (default)
    #[default]
    Caption,
    /// Every page.
    All,
}

/// Crop strategy for rendered pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CropMode {
    /// Crop to the visual region associated with the page's captions. (default)
    #[default]
    CaptionAware,
    /// Keep the full page.
    #[serde(alias = "none")]
    Full,
}

/// On-disk arrangement of the artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputLayout {
    /// `<output-dir>/<bundle-name>/fulltext.txt`, images under `images/`. (default)
    #[default]
    Bundle,
    /// `<output-dir>/<prefix>_fulltext.txt`, images under `<prefix>_images/`.
    Flat,
}

/// Whether the pdfium capability is probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PdfiumPolicy {
    /// Bind pdfium if a library can be found. (default)
    #[default]
    Auto,
    /// Never bind pdfium; rendering and table stages are unavailable.
    Disabled,
}

macro_rules! str_enum {
    ($ty:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($ty::$variant => $name,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(ImageMode { Embedded => "embedded", Render => "render", Hybrid => "hybrid" });
str_enum!(FigurePages { Caption => "caption", All => "all" });
str_enum!(CropMode { CaptionAware => "caption-aware", Full => "full" });
str_enum!(OutputLayout { Bundle => "bundle", Flat => "flat" });

/// Image-related settings as recorded in `metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSettings {
    pub image_mode: ImageMode,
    pub figure_pages: FigurePages,
    pub render_dpi: u32,
    pub render_crop_mode: CropMode,
    pub caption_top_margin_pt: f32,
    pub crop_bottom_margin_pt: f32,
    pub min_crop_height_ratio: f32,
    pub max_captions_per_render_page: usize,
    pub embedded_min_width: u32,
    pub embedded_min_height: u32,
    pub embedded_min_area: u64,
    pub keep_embedded_on_rendered_pages: bool,
    pub dedup_iou_threshold: f32,
}
