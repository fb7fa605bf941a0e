//! Error types for the paper-artifacts library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExtractError`] — **Fatal**: the run cannot proceed at all (missing
//!   input, unparsable or encrypted PDF, stale output directory, a core
//!   artifact that cannot be written). Returned as `Err(ExtractError)` from
//!   [`crate::extract::extract`] before or instead of any partial output.
//!
//! * [`StageWarning`] — **Non-fatal**: one stage degraded on one page (a render
//!   failure, an undecodable bitmap, a missing optional capability). Collected
//!   into [`crate::output::RunMetadata::warnings`] and `metadata.json`
//!   while every other artifact is still produced.
//!
//! An empty result (no URLs, no captions) is neither: it is reported through
//! the `not_found` list of the run metadata.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the paper-artifacts library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// The document is corrupt or encrypted and cannot be parsed.
    #[error("PDF '{path}' is unreadable: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    UnreadablePdf { path: PathBuf, detail: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The target directory already holds artifacts from an earlier run.
    #[error("Output '{path}' already contains artifacts from a previous run.\nRe-run with --clean to replace them.")]
    StaleArtifacts { path: PathBuf },

    /// Could not create or write a core artifact.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    pub(crate) fn write_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExtractError::OutputWriteFailed {
            path: path.into(),
            source,
        }
    }
}

/// Pipeline stages that depend on an optional capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Rasterising pages (render / hybrid image modes).
    Render,
    /// Locating caption lines on the page for caption-aware cropping.
    TextGeometry,
    /// Text-run based table extraction.
    Tables,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Render => "render",
            Stage::TextGeometry => "text_geometry",
            Stage::Tables => "tables",
        })
    }
}

/// A non-fatal problem recorded during a run.
///
/// Page numbers are 1-indexed.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageWarning {
    /// An optional capability is not available; the stage was skipped or degraded.
    #[error("{stage} stage unavailable: {detail}")]
    MissingCapability { stage: Stage, detail: String },

    /// Page rasterisation failed; the page has no render entry.
    #[error("Page {page}: rendering failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// Page text could not be extracted; the page contributes empty text.
    #[error("Page {page}: text extraction failed: {detail}")]
    TextFailed { page: usize, detail: String },

    /// An embedded bitmap could not be decoded.
    #[error("Page {page}: embedded image skipped: {detail}")]
    BitmapSkipped { page: usize, detail: String },

    /// Table extraction failed on a page.
    #[error("Page {page}: table extraction failed: {detail}")]
    TableFailed { page: usize, detail: String },

    /// An image file could not be written; it is left out of the manifest.
    #[error("Failed to write image '{path}': {detail}")]
    ImageWriteFailed { path: String, detail: String },
}

impl StageWarning {
    /// 1-indexed page the warning refers to, when it is page-scoped.
    pub fn page(&self) -> Option<usize> {
        match self {
            StageWarning::RenderFailed { page, .. }
            | StageWarning::TextFailed { page, .. }
            | StageWarning::BitmapSkipped { page, .. }
            | StageWarning::TableFailed { page, .. } => Some(*page),
            StageWarning::MissingCapability { .. } | StageWarning::ImageWriteFailed { .. } => None,
        }
    }
}
