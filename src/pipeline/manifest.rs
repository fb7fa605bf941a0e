//! Output layout, stale-artifact policy and atomic artifact writes.
//!
//! | layout   | artifact                              | images                    |
//! |----------|---------------------------------------|---------------------------|
//! | `bundle` | `<out>/<bundle>/fulltext.txt`         | `<out>/<bundle>/images/`  |
//! | `flat`   | `<out>/<prefix>_fulltext.txt`         | `<out>/<prefix>_images/`  |
//!
//! Every file goes through a temp file in the destination directory and a
//! rename, so a crashed run never leaves a truncated artifact behind.

use crate::config::OutputLayout;
use crate::error::{ExtractError, StageWarning};
use crate::output::{ImageManifestEntry, ImageSource};
use crate::pipeline::images::PendingImage;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const FULLTEXT: &str = "fulltext.txt";
pub const METADATA: &str = "metadata.json";
pub const URLS_ALL: &str = "urls_all.txt";
pub const URL_HITS: &str = "url_hits.json";
pub const LINKS: &str = "links.json";
pub const RESOURCE_LINKS: &str = "resource_links.json";
pub const RESOURCE_LINKS_PRIORITY: &str = "resource_links_priority.json";
pub const FIGURE_CAPTIONS: &str = "figure_captions.json";
pub const TABLE_CAPTIONS: &str = "table_captions.json";
pub const CODE_SIGNALS: &str = "code_signals.json";
pub const AVAILABILITY_SNIPPETS: &str = "availability_snippets.json";
pub const TABLES: &str = "tables.json";
pub const IMAGES_MANIFEST: &str = "images_manifest.json";
pub const IMAGE_GALLERY: &str = "image_gallery.md";

/// Every artifact a run may write, in write order.
pub const ARTIFACT_NAMES: [&str; 14] = [
    FULLTEXT,
    METADATA,
    URLS_ALL,
    URL_HITS,
    LINKS,
    RESOURCE_LINKS,
    RESOURCE_LINKS_PRIORITY,
    FIGURE_CAPTIONS,
    TABLE_CAPTIONS,
    CODE_SIGNALS,
    AVAILABILITY_SNIPPETS,
    TABLES,
    IMAGES_MANIFEST,
    IMAGE_GALLERY,
];

const EMPTY_GALLERY: &str = "未提取到图片。";

/// Where a run's files went.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArtifactPaths {
    pub run_dir: PathBuf,
    pub image_dir: PathBuf,
    /// Artifact name → written path.
    pub files: BTreeMap<String, PathBuf>,
    /// Where the (not generated) reading report is expected.
    pub summary_file: PathBuf,
}

// ── Layout ───────────────────────────────────────────────────────────────

/// Resolved output locations of one run.
#[derive(Debug, Clone)]
pub struct OutputTarget {
    layout: OutputLayout,
    base_dir: PathBuf,
    run_dir: PathBuf,
    prefix: String,
    summary_file: String,
}

impl OutputTarget {
    pub fn new(base_dir: &Path, layout: OutputLayout, bundle: &str, prefix: &str, summary_file: &str) -> Self {
        let run_dir = match layout {
            OutputLayout::Bundle => base_dir.join(bundle),
            OutputLayout::Flat => base_dir.to_path_buf(),
        };
        Self {
            layout,
            base_dir: base_dir.to_path_buf(),
            run_dir,
            prefix: prefix.to_string(),
            summary_file: summary_file.to_string(),
        }
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// File name of artifact `name` inside the run directory.
    pub fn file_name(&self, name: &str) -> String {
        match self.layout {
            OutputLayout::Bundle => name.to_string(),
            OutputLayout::Flat => format!("{}_{}", self.prefix, name),
        }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.run_dir.join(self.file_name(name))
    }

    /// Image directory relative to the run directory.
    pub fn image_dir_name(&self) -> String {
        match self.layout {
            OutputLayout::Bundle => "images".to_string(),
            OutputLayout::Flat => format!("{}_images", self.prefix),
        }
    }

    pub fn image_dir(&self) -> PathBuf {
        self.run_dir.join(self.image_dir_name())
    }

    pub fn summary_path(&self) -> PathBuf {
        self.run_dir.join(&self.summary_file)
    }

    /// Make the target ready for writing.
    ///
    /// With `clean`, the bundle directory (or every `<prefix>_*` entry of a
    /// flat layout) is removed first. Without it, any artifact left by an
    /// earlier run is a [`ExtractError::StaleArtifacts`] error.
    pub fn prepare(&self, clean: bool) -> Result<(), ExtractError> {
        if clean {
            self.clean()?;
        } else if let Some(stale) = self.existing_artifact() {
            return Err(ExtractError::StaleArtifacts { path: stale });
        }
        let image_dir = self.image_dir();
        fs::create_dir_all(&image_dir).map_err(|e| ExtractError::write_failed(&image_dir, e))?;
        debug!("Output prepared at {}", self.run_dir.display());
        Ok(())
    }

    fn existing_artifact(&self) -> Option<PathBuf> {
        ARTIFACT_NAMES
            .iter()
            .map(|name| self.path_for(name))
            .find(|p| p.exists())
            .or_else(|| {
                let dir = self.image_dir();
                let non_empty = fs::read_dir(&dir).is_ok_and(|mut entries| entries.next().is_some());
                non_empty.then_some(dir)
            })
    }

    fn clean(&self) -> Result<(), ExtractError> {
        match self.layout {
            OutputLayout::Bundle => {
                if self.run_dir.exists() {
                    info!("Removing previous bundle {}", self.run_dir.display());
                    fs::remove_dir_all(&self.run_dir).map_err(|e| ExtractError::write_failed(&self.run_dir, e))?;
                }
            }
            OutputLayout::Flat => {
                let entries = match fs::read_dir(&self.base_dir) {
                    Ok(entries) => entries,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
                    Err(e) => return Err(ExtractError::write_failed(&self.base_dir, e)),
                };
                let marker = format!("{}_", self.prefix);
                for entry in entries.flatten() {
                    if !entry.file_name().to_string_lossy().starts_with(&marker) {
                        continue;
                    }
                    let path = entry.path();
                    let removed = if path.is_dir() {
                        fs::remove_dir_all(&path)
                    } else {
                        fs::remove_file(&path)
                    };
                    removed.map_err(|e| ExtractError::write_failed(&path, e))?;
                    debug!("Removed {}", path.display());
                }
            }
        }
        Ok(())
    }
}

// ── Writer ───────────────────────────────────────────────────────────────

/// Writes artifacts into a prepared [`OutputTarget`].
#[derive(Debug)]
pub struct ManifestWriter {
    target: OutputTarget,
    files: BTreeMap<String, PathBuf>,
    /// Next image index per `(page, source)`.
    counters: HashMap<(usize, ImageSource), usize>,
    entries: Vec<ImageManifestEntry>,
}

impl ManifestWriter {
    pub fn new(target: OutputTarget) -> Self {
        Self {
            target,
            files: BTreeMap::new(),
            counters: HashMap::new(),
            entries: Vec::new(),
        }
    }

    pub fn target(&self) -> &OutputTarget {
        &self.target
    }

    pub fn write_text(&mut self, name: &str, content: &str) -> Result<(), ExtractError> {
        let path = self.target.path_for(name);
        atomic_write(&path, content.as_bytes()).map_err(|e| ExtractError::write_failed(&path, e))?;
        debug!("Wrote {} ({} bytes)", path.display(), content.len());
        self.files.insert(name.to_string(), path);
        Ok(())
    }

    /// Pretty-printed JSON, non-ASCII kept verbatim.
    pub fn write_json<T: Serialize + ?Sized>(&mut self, name: &str, value: &T) -> Result<(), ExtractError> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| ExtractError::Internal(format!("serialising {name}: {e}")))?;
        self.write_text(name, &json)
    }

    /// Persist one page's images. A failed write becomes a warning and the
    /// image is left out of the manifest.
    pub fn write_images(&mut self, images: Vec<PendingImage>, warnings: &mut Vec<StageWarning>) {
        let image_dir_name = self.target.image_dir_name();
        for image in images {
            let counter = self.counters.entry((image.page, image.source)).or_insert(0);
            *counter += 1;
            let index = *counter;

            let file_name = self.image_file_name(&image, index);
            let rel_path = format!("{image_dir_name}/{file_name}");
            let path = self.target.run_dir().join(&rel_path);
            if let Err(e) = atomic_write(&path, &image.bytes) {
                warn!("Could not write {}: {}", path.display(), e);
                warnings.push(StageWarning::ImageWriteFailed {
                    path: rel_path,
                    detail: e.to_string(),
                });
                continue;
            }

            self.entries.push(ImageManifestEntry {
                source: image.source,
                path: rel_path,
                page: image.page,
                image_index: index,
                related_caption: image.related_caption,
                bbox: image.bbox,
                width: image.width,
                height: image.height,
                format: image.format,
                dpi: image.dpi,
                crop_mode: image.crop_mode,
                crop_applied: image.crop_applied,
                size_bytes: image.bytes.len() as u64,
            });
        }
    }

    fn image_file_name(&self, image: &PendingImage, index: usize) -> String {
        let prefix = &self.target.prefix;
        match image.source {
            ImageSource::Embedded => format!(
                "{prefix}_p{:03}_img{:03}.{}",
                image.page,
                index,
                image.format.extension()
            ),
            ImageSource::PageRender => {
                let dpi = image.dpi.unwrap_or_default();
                let suffix = if image.crop_applied == Some(true) { "_capcrop" } else { "" };
                if index > 1 {
                    format!("{prefix}_p{:03}_render_{dpi}dpi{suffix}_{index}.png", image.page)
                } else {
                    format!("{prefix}_p{:03}_render_{dpi}dpi{suffix}.png", image.page)
                }
            }
        }
    }

    /// Manifest entries so far: embedded before rendered, each by page.
    pub fn entries(&self) -> Vec<ImageManifestEntry> {
        let mut entries = self.entries.clone();
        entries.sort_by_key(|e| (e.source, e.page, e.image_index));
        entries
    }

    /// Write `images_manifest.json` and `image_gallery.md`.
    pub fn write_image_artifacts(&mut self) -> Result<Vec<ImageManifestEntry>, ExtractError> {
        let entries = self.entries();
        self.write_json(IMAGES_MANIFEST, &entries)?;
        self.write_text(IMAGE_GALLERY, &render_gallery(&entries))?;
        Ok(entries)
    }

    /// Remove every file this writer has persisted. Used when a later core
    /// artifact fails so a failed run leaves no partial output behind.
    pub fn discard(&mut self) {
        let run_dir = self.target.run_dir.clone();
        let mut paths: Vec<PathBuf> = self.entries.drain(..).map(|e| run_dir.join(e.path)).collect();
        paths.extend(std::mem::take(&mut self.files).into_values());
        for path in paths {
            if let Err(e) = fs::remove_file(&path) {
                debug!("Could not remove {}: {}", path.display(), e);
            }
        }
    }

    pub fn finish(self) -> ArtifactPaths {
        ArtifactPaths {
            run_dir: self.target.run_dir.clone(),
            image_dir: self.target.image_dir(),
            summary_file: self.target.summary_path(),
            files: self.files,
        }
    }
}

/// Markdown listing of the manifest with run-relative paths.
pub fn render_gallery(entries: &[ImageManifestEntry]) -> String {
    let mut lines = vec!["# Image Gallery".to_string(), String::new()];
    if entries.is_empty() {
        lines.push(EMPTY_GALLERY.to_string());
        return lines.join("\n") + "\n";
    }

    for e in entries {
        let crop_note = match (e.source, e.crop_mode) {
            (ImageSource::PageRender, Some(mode)) => {
                let applied = if e.crop_applied == Some(true) { "(applied)" } else { "" };
                format!(" / crop={mode}{applied}")
            }
            _ => String::new(),
        };
        lines.push(format!(
            "## Page {} / {} / Image {}{}",
            e.page, e.source, e.image_index, crop_note
        ));
        lines.push(format!("`{}`", e.path));
        lines.push(format!("![page-{}-image-{}]({})", e.page, e.image_index, e.path));
        lines.push(String::new());
    }
    lines.join("\n").trim_end().to_string() + "\n"
}

fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
