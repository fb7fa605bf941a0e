//! Optional capabilities: page rendering and text geometry.
//!
//! Both come from pdfium, which is a shared library that may be missing on
//! the host. Each run binds the library once when it starts, asks
//! [`Capabilities`] which stages are available and degrades the rest with a
//! [`StageWarning::MissingCapability`](crate::error::StageWarning) instead of
//! failing.
//!
//! Library lookup order:
//! 1. `PDFIUM_LIB_PATH` (full path to the shared library)
//! 2. the platform library name in the current directory
//! 3. the system library search path

use crate::config::PdfiumPolicy;
use crate::error::Stage;
use crate::geometry::Rect;
use crate::pipeline::pdfium::PdfiumBackend;
use crate::pipeline::source::Page;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A run of text with its box in page space.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub bbox: Rect,
}

/// Rasterises pages.
pub trait PageRenderer {
    /// Render `page` at `dpi`, longest edge capped at `max_pixels`.
    fn render_page(&self, page: &Page, dpi: u32, max_pixels: u32) -> Result<DynamicImage, String>;
}

/// Positioned text runs for a page.
pub trait TextGeometry {
    fn text_runs(&self, page: &Page) -> Result<Vec<TextRun>, String>;
}

/// The capability set of one run.
pub struct Capabilities {
    pdfium: Option<Pdfium>,
    missing: Option<String>,
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("pdfium", &self.pdfium.is_some())
            .field("missing", &self.missing)
            .finish()
    }
}

impl Capabilities {
    pub fn probe(policy: PdfiumPolicy) -> Self {
        if policy == PdfiumPolicy::Disabled {
            return Self::without_pdfium("pdfium disabled by configuration");
        }
        match bind_pdfium() {
            Ok(pdfium) => Self {
                pdfium: Some(pdfium),
                missing: None,
            },
            Err(reason) => Self::without_pdfium(reason),
        }
    }

    pub fn without_pdfium(reason: impl Into<String>) -> Self {
        Self {
            pdfium: None,
            missing: Some(reason.into()),
        }
    }

    pub fn has_pdfium(&self) -> bool {
        self.pdfium.is_some()
    }

    /// Why pdfium-backed stages are unavailable.
    pub fn missing_reason(&self) -> Option<&str> {
        self.missing.as_deref()
    }

    /// Availability of every optional stage.
    pub fn stages(&self) -> BTreeMap<Stage, bool> {
        [Stage::Render, Stage::TextGeometry, Stage::Tables]
            .into_iter()
            .map(|s| (s, self.has_pdfium()))
            .collect()
    }

    /// Open `path` with pdfium. `Ok(None)` when pdfium is not bound.
    pub fn open(&self, path: &Path) -> Result<Option<PdfiumBackend<'_>>, String> {
        match &self.pdfium {
            Some(pdfium) => PdfiumBackend::open(pdfium, path).map(Some),
            None => Ok(None),
        }
    }
}

fn bind_pdfium() -> Result<Pdfium, String> {
    let bindings = match std::env::var_os("PDFIUM_LIB_PATH") {
        Some(path) => {
            let path = PathBuf::from(path);
            debug!("Binding pdfium from PDFIUM_LIB_PATH={}", path.display());
            Pdfium::bind_to_library(&path)
        }
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| format!("pdfium library not found: {e}"))?;
    info!("pdfium bound");
    Ok(Pdfium::new(bindings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_policy_has_no_stages() {
        let caps = Capabilities::probe(PdfiumPolicy::Disabled);
        assert!(!caps.has_pdfium());
        assert!(caps.missing_reason().unwrap().contains("disabled"));
        assert!(caps.stages().values().all(|&v| !v));
        assert_eq!(caps.stages().len(), 3);
        assert!(caps.open(Path::new("x.pdf")).unwrap().is_none());
    }
}
