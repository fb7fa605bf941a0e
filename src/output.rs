//! Result types of an extraction run.
//!
//! Everything here is serialised into the artifact files, so field order and
//! map types are chosen for deterministic output: `BTreeMap` everywhere, no
//! timestamps, paths relative to the run directory where a reader needs them.

use crate::config::{CropMode, ImageSettings, OutputLayout};
use crate::error::{Stage, StageWarning};
use crate::geometry::Rect;
use crate::pipeline::encode::ImageFormatTag;
use crate::pipeline::manifest::ArtifactPaths;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Document information dictionary plus basic structure facts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
    pub is_encrypted: bool,
}

// ── Images ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    Embedded,
    PageRender,
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ImageSource::Embedded => "embedded",
            ImageSource::PageRender => "page_render",
        })
    }
}

/// One row of `images_manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageManifestEntry {
    pub source: ImageSource,
    /// Relative to the run directory.
    pub path: String,
    /// 1-indexed page.
    pub page: usize,
    /// 1-based position among the page's entries of the same source.
    pub image_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_caption: Option<String>,
    /// Placement on the page in points (crop box for renders).
    pub bbox: Rect,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormatTag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpi: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_mode: Option<CropMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_applied: Option<bool>,
    pub size_bytes: u64,
}

impl ImageManifestEntry {
    pub fn pixel_area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

// ── Run metadata ─────────────────────────────────────────────────────────

/// Image settings plus what the run derived from them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedImageSettings {
    #[serde(flatten)]
    pub settings: ImageSettings,
    pub render_pages_selected: Vec<usize>,
    pub caption_queries_by_page: BTreeMap<usize, Vec<String>>,
}

/// Contents of `metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMetadata {
    pub pdf_path: String,
    pub paper_title: String,
    pub paper_name: String,
    pub paper_name_extracted: String,
    pub bundle_name: String,
    pub num_pages: usize,
    pub prefix: String,
    pub layout: OutputLayout,
    pub output_dir: String,
    pub summary_file: String,
    pub image_settings: RecordedImageSettings,
    pub pdf_metadata: DocumentMetadata,
    /// Optional capabilities and whether they were available.
    pub optional_modules: BTreeMap<Stage, bool>,
    pub warnings: Vec<StageWarning>,
    /// Artifacts written empty because nothing matched.
    pub not_found: Vec<String>,
}

/// Counts printed by the CLI summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractionStats {
    pub pages: usize,
    pub urls: usize,
    pub figure_captions: usize,
    pub table_captions: usize,
    pub code_signals: usize,
    pub availability_snippets: usize,
    /// `None` when the table stage did not run.
    pub tables_extracted: Option<usize>,
    pub images_extracted: usize,
    pub images_by_source: BTreeMap<ImageSource, usize>,
    pub warnings: usize,
}

/// What [`crate::extract`] returns.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionOutput {
    pub metadata: RunMetadata,
    pub stats: ExtractionStats,
    pub artifacts: ArtifactPaths,
}

impl ExtractionStats {
    /// `embedded:3,page_render:2`
    pub fn images_by_source_line(&self) -> String {
        self.images_by_source
            .iter()
            .map(|(k, v)| format!("{k}:{v}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_line_is_sorted() {
        let mut stats = ExtractionStats::default();
        stats.images_by_source.insert(ImageSource::PageRender, 2);
        stats.images_by_source.insert(ImageSource::Embedded, 3);
        assert_eq!(stats.images_by_source_line(), "embedded:3,page_render:2");
    }

    #[test]
    fn manifest_entry_omits_render_fields_for_embedded() {
        let e = ImageManifestEntry {
            source: ImageSource::Embedded,
            path: "images/p_p001_img001.png".into(),
            page: 1,
            image_index: 1,
            related_caption: None,
            bbox: Rect::new(0.0, 0.0, 10.0, 10.0),
            width: 400,
            height: 300,
            format: ImageFormatTag::Png,
            dpi: None,
            crop_mode: None,
            crop_applied: None,
            size_bytes: 10,
        };
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["source"], "embedded");
        assert!(v.get("dpi").is_none());
        assert!(v.get("crop_mode").is_none());
        assert_eq!(e.pixel_area(), 120_000);
    }
}
