//! # paper-artifacts
//!
//! Turn a research-paper PDF into machine-checkable artifacts: page-delimited
//! full text, classified links, figure and table caption candidates,
//! availability statements, code signals, tables and figure images.
//!
//! ## Why this crate?
//!
//! A reading summary needs evidence it can point at: the repository URL from
//! the code availability statement, the figure a claim rests on. Reading the
//! PDF text alone loses figures; dumping every embedded bitmap drowns them in
//! logos and icons. This crate combines a text pass with a hybrid image
//! pipeline that renders caption pages, crops to the captioned visual and
//! keeps only meaningful embedded images.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Source    lopdf parse, lazy page iterator, drawables, annotations
//!  ├─ 2. Text      page-marked full text
//!  ├─ 3. Scanners  captions · links · availability · code signals
//!  ├─ 4. Tables    pdfium text runs → row/column records (optional)
//!  ├─ 5. Images    embedded / render / hybrid, caption-aware crop, dedup
//!  └─ 6. Output    JSON manifests, gallery, run metadata
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use paper_artifacts::{extract, ExtractionConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractionConfig::builder()
//!         .output_dir("artifacts")
//!         .clean(true)
//!         .build()?;
//!     let output = extract("paper.pdf", &config)?;
//!     println!("{} URLs, {} images", output.stats.urls, output.stats.images_extracted);
//!     for w in &output.metadata.warnings {
//!         eprintln!("warning: {w}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `paper-artifacts` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! paper-artifacts = { version = "0.3", default-features = false }
//! ```
//!
//! ## Optional capabilities
//!
//! Rendering, text geometry and tables need the pdfium shared library. Set
//! `PDFIUM_LIB_PATH` or place the library next to the binary; without it the
//! run degrades to embedded-only images and no `tables.json`, recording a
//! warning instead of failing.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod capability;
pub mod config;
pub mod error;
pub mod extract;
pub mod geometry;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    CropMode, ExtractionConfig, ExtractionConfigBuilder, FigurePages, ImageMode, ImageSettings, OutputLayout,
    PdfiumPolicy,
};
pub use error::{ExtractError, Stage, StageWarning};
pub use extract::{extract, inspect};
pub use output::{DocumentMetadata, ExtractionOutput, ExtractionStats, ImageManifestEntry, ImageSource, RunMetadata};
pub use pipeline::manifest::ArtifactPaths;
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
