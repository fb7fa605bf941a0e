//! End-to-end integration tests for paper-artifacts.
//!
//! Most tests build small PDFs in memory with lopdf and run the whole
//! pipeline with pdfium disabled, so they need nothing but the crate.
//! Tests that need the pdfium shared library (rendering, crops, tables) are
//! gated behind the `E2E_ENABLED` environment variable.
//!
//! Run with:
//!   cargo test --test e2e -- --nocapture
//!
//! Including the pdfium-backed tests:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=./libpdfium.so cargo test --test e2e -- --nocapture

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};
use paper_artifacts::{
    extract, inspect, ExtractError, ExtractionConfig, ExtractionProgressCallback, ImageMode, ImageSource,
    OutputLayout, PdfiumPolicy, Stage, StageWarning,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

const TITLE: &str = "Learning Things From Papers";
const BUNDLE: &str = "Learning Things From Papers";
const PREFIX: &str = "learning-things-from-papers";

/// Skip this test unless E2E_ENABLED is set.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 (and PDFIUM_LIB_PATH) to run pdfium tests");
            return;
        }
    }};
}

/// One page: text lines (one BT/ET block each, from the top) and images
/// `(pixel width, pixel height, [x, y, w, h] in PDF user space)`.
struct PageSpec {
    lines: Vec<&'static str>,
    images: Vec<(u32, u32, [i64; 4])>,
}

fn text_ops(lines: &[&str]) -> Vec<Operation> {
    let mut ops = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let y = 760 - 14 * i as i64;
        ops.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 10.into()]),
            Operation::new("Td", vec![72.into(), y.into()]),
            Operation::new("Tj", vec![Object::string_literal(*line)]),
            Operation::new("ET", vec![]),
        ]);
    }
    ops
}

fn add_image(doc: &mut Document, w: u32, h: u32) -> ObjectId {
    doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => w as i64,
            "Height" => h as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        vec![90u8; (w * h * 3) as usize],
    ))
}

fn write_pdf(path: &Path, pages: &[PageSpec]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });

    let mut kids: Vec<Object> = Vec::new();
    for spec in pages {
        let mut ops = text_ops(&spec.lines);
        let mut xobjects = lopdf::Dictionary::new();
        for (i, &(w, h, [x, y, dw, dh])) in spec.images.iter().enumerate() {
            let name = format!("Im{}", i + 1);
            xobjects.set(name.as_bytes(), add_image(&mut doc, w, h));
            ops.extend([
                Operation::new("q", vec![]),
                Operation::new("cm", vec![dw.into(), 0.into(), 0.into(), dh.into(), x.into(), y.into()]),
                Operation::new("Do", vec![Object::Name(name.into_bytes())]),
                Operation::new("Q", vec![]),
            ]);
        }
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            Content { operations: ops }.encode().unwrap(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
                "XObject" => xobjects,
            },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::String(TITLE.as_bytes().to_vec(), StringFormat::Literal),
        "Producer" => Object::String(b"lopdf".to_vec(), StringFormat::Literal),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    doc.save(path).unwrap();
}

/// Two pages: a figure page with one real and one tiny bitmap, and a page
/// with a code link and a data availability statement.
fn paper_pdf(dir: &Path) -> PathBuf {
    let path = dir.join("paper.pdf");
    write_pdf(
        &path,
        &[
            PageSpec {
                lines: vec![
                    "1 Introduction",
                    "We study things. See Figure 1 for an overview.",
                    "Figure 1: Overview of the method.",
                ],
                images: vec![(120, 90, [100, 300, 360, 270]), (20, 20, [500, 80, 20, 20])],
            },
            PageSpec {
                lines: vec![
                    "Code is at https://github.com/acme/tool.",
                    "Install with pip install tool",
                    "Data availability",
                    "The data are available at https://zenodo.org/record/123 .",
                    "References",
                    "[1] A. Author. Something. 2020.",
                ],
                images: vec![],
            },
        ],
    );
    path
}

fn embedded_config(out: &Path) -> ExtractionConfig {
    ExtractionConfig::builder()
        .output_dir(out)
        .pdfium(PdfiumPolicy::Disabled)
        .embedded_min_width(64)
        .embedded_min_height(64)
        .embedded_min_area(64 * 64)
        .build()
        .unwrap()
}

fn read_json(path: &Path) -> Value {
    let text = std::fs::read_to_string(path).unwrap_or_else(|e| panic!("{}: {e}", path.display()));
    serde_json::from_str(&text).unwrap()
}

// ── Full run without pdfium ──────────────────────────────────────────────────

#[test]
fn test_full_run_writes_every_artifact() {
    let tmp = tempfile::tempdir().unwrap();
    let pdf = paper_pdf(tmp.path());
    let out = tmp.path().join("out");

    let output = extract(&pdf, &embedded_config(&out)).expect("extraction");
    let run_dir = out.join(BUNDLE);
    assert_eq!(output.artifacts.run_dir, run_dir);

    for name in [
        "fulltext.txt",
        "metadata.json",
        "urls_all.txt",
        "url_hits.json",
        "links.json",
        "resource_links.json",
        "resource_links_priority.json",
        "figure_captions.json",
        "table_captions.json",
        "code_signals.json",
        "availability_snippets.json",
        "images_manifest.json",
        "image_gallery.md",
    ] {
        assert!(run_dir.join(name).is_file(), "missing {name}");
    }
    // No pdfium ⇒ no table stage.
    assert!(!run_dir.join("tables.json").exists());
    assert_eq!(output.stats.tables_extracted, None);

    // Full text: one marker per page.
    let fulltext = std::fs::read_to_string(run_dir.join("fulltext.txt")).unwrap();
    assert_eq!(fulltext.matches("===== Page ").count(), 2);
    assert_eq!(output.stats.pages, 2);

    // Metadata: names, capability flags, degradation warnings.
    let meta = read_json(&run_dir.join("metadata.json"));
    assert_eq!(meta["paper_title"], TITLE);
    assert_eq!(meta["prefix"], PREFIX);
    assert_eq!(meta["num_pages"], 2);
    assert_eq!(meta["optional_modules"]["render"], false);
    assert!(meta["summary_file"].as_str().unwrap().ends_with("阅读总结.md"));
    assert!(output.metadata.warnings.iter().any(|w| matches!(
        w,
        StageWarning::MissingCapability {
            stage: Stage::Render,
            ..
        }
    )));
    assert!(output.metadata.not_found.contains(&"table_captions.json".to_string()));
}

#[test]
fn test_links_are_classified_and_prioritised() {
    let tmp = tempfile::tempdir().unwrap();
    let pdf = paper_pdf(tmp.path());
    let out = tmp.path().join("out");
    extract(&pdf, &embedded_config(&out)).unwrap();
    let run_dir = out.join(BUNDLE);

    let urls = std::fs::read_to_string(run_dir.join("urls_all.txt")).unwrap();
    let urls: Vec<&str> = urls.lines().collect();
    assert_eq!(urls, ["https://github.com/acme/tool", "https://zenodo.org/record/123"]);

    let links = read_json(&run_dir.join("links.json"));
    let links = links.as_array().unwrap();
    let github = links.iter().find(|l| l["url"] == "https://github.com/acme/tool").unwrap();
    assert_eq!(github["category"], "code");
    assert_eq!(github["priority"], false);
    let zenodo = links.iter().find(|l| l["url"] == "https://zenodo.org/record/123").unwrap();
    assert_eq!(zenodo["category"], "data");
    assert_eq!(zenodo["priority"], true);
    assert_eq!(zenodo["page"], 2);

    let priority = read_json(&run_dir.join("resource_links_priority.json"));
    assert_eq!(priority["data"], serde_json::json!(["https://zenodo.org/record/123"]));

    let snippets = read_json(&run_dir.join("availability_snippets.json"));
    let first = &snippets.as_array().unwrap()[0];
    assert_eq!(first["kind"], "data");
    let text = first["text"].as_str().unwrap();
    assert!(text.contains("zenodo.org/record/123"));
    assert!(!text.contains("References"), "window must stop at the heading: {text:?}");

    let signals = read_json(&run_dir.join("code_signals.json"));
    let keywords: Vec<&str> = signals
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|s| s["keyword"].as_str())
        .collect();
    assert!(keywords.contains(&"github"));
    assert!(keywords.contains(&"pip install"));
}

#[test]
fn test_captions_and_embedded_images() {
    let tmp = tempfile::tempdir().unwrap();
    let pdf = paper_pdf(tmp.path());
    let out = tmp.path().join("out");
    let output = extract(&pdf, &embedded_config(&out)).unwrap();
    let run_dir = out.join(BUNDLE);

    let figures = read_json(&run_dir.join("figure_captions.json"));
    let figures = figures.as_array().unwrap();
    assert_eq!(figures.len(), 1);
    assert_eq!(figures[0]["label"], "1");
    assert_eq!(figures[0]["page"], 1);

    // The 20×20 bitmap is below the 64px minimum.
    let manifest = read_json(&run_dir.join("images_manifest.json"));
    let entries = manifest.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["source"], "embedded");
    assert_eq!(entries[0]["width"], 120);
    let rel = entries[0]["path"].as_str().unwrap();
    assert_eq!(rel, format!("images/{PREFIX}_p001_img001.png"));
    assert!(run_dir.join(rel).is_file());
    assert_eq!(output.stats.images_by_source.get(&ImageSource::Embedded), Some(&1));

    let gallery = std::fs::read_to_string(run_dir.join("image_gallery.md")).unwrap();
    assert!(gallery.starts_with("# Image Gallery\n\n## Page 1 / embedded / Image 1\n"));
    assert!(gallery.contains(&format!("![page-1-image-1]({rel})")));
}

// ── Re-runs ──────────────────────────────────────────────────────────────────

#[test]
fn test_rerun_requires_clean_and_is_byte_identical() {
    let tmp = tempfile::tempdir().unwrap();
    let pdf = paper_pdf(tmp.path());
    let out = tmp.path().join("out");
    let run_dir = out.join(BUNDLE);

    extract(&pdf, &embedded_config(&out)).unwrap();
    let snapshot = |name: &str| std::fs::read(run_dir.join(name)).unwrap();
    let first_manifest = snapshot("images_manifest.json");
    let first_meta = snapshot("metadata.json");
    let first_links = snapshot("links.json");

    let err = extract(&pdf, &embedded_config(&out)).unwrap_err();
    assert!(matches!(err, ExtractError::StaleArtifacts { .. }), "got {err:?}");

    let clean = ExtractionConfig::builder()
        .output_dir(&out)
        .clean(true)
        .pdfium(PdfiumPolicy::Disabled)
        .embedded_min_width(64)
        .embedded_min_height(64)
        .embedded_min_area(64 * 64)
        .build()
        .unwrap();
    extract(&pdf, &clean).unwrap();
    assert_eq!(snapshot("images_manifest.json"), first_manifest);
    assert_eq!(snapshot("metadata.json"), first_meta);
    assert_eq!(snapshot("links.json"), first_links);
}

#[test]
fn test_flat_layout_uses_prefix() {
    let tmp = tempfile::tempdir().unwrap();
    let pdf = paper_pdf(tmp.path());
    let out = tmp.path().join("flat");
    let config = ExtractionConfig::builder()
        .output_dir(&out)
        .layout(OutputLayout::Flat)
        .prefix("Helix Paper")
        .image_mode(ImageMode::Embedded)
        .pdfium(PdfiumPolicy::Disabled)
        .embedded_min_width(64)
        .embedded_min_height(64)
        .embedded_min_area(64 * 64)
        .build()
        .unwrap();

    let output = extract(&pdf, &config).unwrap();
    assert_eq!(output.metadata.prefix, "helix-paper");
    assert!(out.join("helix-paper_fulltext.txt").is_file());
    assert!(out.join("helix-paper_images/helix-paper_p001_img001.png").is_file());
    // Embedded-only mode never asks for a renderer.
    assert!(!output
        .metadata
        .warnings
        .iter()
        .any(|w| matches!(w, StageWarning::MissingCapability { stage: Stage::Render, .. })));
}

#[test]
fn test_render_mode_without_pdfium_degrades_to_embedded() {
    let tmp = tempfile::tempdir().unwrap();
    let pdf = paper_pdf(tmp.path());
    let out = tmp.path().join("out");
    let config = ExtractionConfig::builder()
        .output_dir(&out)
        .image_mode(ImageMode::Render)
        .pdfium(PdfiumPolicy::Disabled)
        .embedded_min_width(64)
        .embedded_min_height(64)
        .embedded_min_area(64 * 64)
        .build()
        .unwrap();

    let output = extract(&pdf, &config).unwrap();
    assert!(output.metadata.warnings.iter().any(|w| matches!(
        w,
        StageWarning::MissingCapability {
            stage: Stage::Render,
            ..
        }
    )));
    assert_eq!(output.stats.images_extracted, 1);
    assert_eq!(output.stats.images_by_source.get(&ImageSource::Embedded), Some(&1));
    assert!(out.join(BUNDLE).join(format!("images/{PREFIX}_p001_img001.png")).is_file());
}

// ── Progress ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Counting {
    starts: AtomicUsize,
    completes: AtomicUsize,
    finished: AtomicUsize,
}

impl ExtractionProgressCallback for Counting {
    fn on_page_start(&self, _page_num: usize, _total: usize) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_page_complete(&self, _page_num: usize, _total: usize, _images: usize) {
        self.completes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_extraction_complete(&self, total_pages: usize, _images: usize) {
        self.finished.store(total_pages, Ordering::SeqCst);
    }
}

#[test]
fn test_progress_callback_sees_every_page() {
    let tmp = tempfile::tempdir().unwrap();
    let pdf = paper_pdf(tmp.path());
    let counter = Arc::new(Counting::default());
    let config = ExtractionConfig::builder()
        .output_dir(tmp.path().join("out"))
        .pdfium(PdfiumPolicy::Disabled)
        .progress_callback(counter.clone() as Arc<dyn ExtractionProgressCallback>)
        .build()
        .unwrap();

    extract(&pdf, &config).unwrap();
    assert_eq!(counter.starts.load(Ordering::SeqCst), 2);
    assert_eq!(counter.completes.load(Ordering::SeqCst), 2);
    assert_eq!(counter.finished.load(Ordering::SeqCst), 2);
}

// ── Inspect & input errors ───────────────────────────────────────────────────

#[test]
fn test_inspect_reads_info_dictionary() {
    let tmp = tempfile::tempdir().unwrap();
    let pdf = paper_pdf(tmp.path());
    let meta = inspect(&pdf).unwrap();
    assert_eq!(meta.title.as_deref(), Some(TITLE));
    assert_eq!(meta.producer.as_deref(), Some("lopdf"));
    assert_eq!(meta.page_count, 2);
    assert!(!meta.is_encrypted);
}

#[test]
fn test_inspect_nonexistent() {
    let err = inspect("/nonexistent/path/file.pdf").unwrap_err();
    assert!(matches!(err, ExtractError::FileNotFound { .. }), "got {err:?}");
}

#[test]
fn test_bad_input_touches_no_output() {
    let tmp = tempfile::tempdir().unwrap();
    let fake = tmp.path().join("fake.pdf");
    std::fs::write(&fake, b"not a pdf at all").unwrap();
    let out = tmp.path().join("out");

    let err = extract(&fake, &embedded_config(&out)).unwrap_err();
    assert!(matches!(err, ExtractError::NotAPdf { .. }), "got {err:?}");
    assert!(!out.exists());
}

#[test]
fn test_noop_callback_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<paper_artifacts::NoopProgressCallback>();
    assert_send_sync::<ExtractionConfig>();
}

// ── pdfium-backed stages (E2E_ENABLED) ───────────────────────────────────────

#[test]
fn test_hybrid_render_replaces_embedded_on_caption_page() {
    e2e_skip_unless_ready!();
    let tmp = tempfile::tempdir().unwrap();
    let pdf = paper_pdf(tmp.path());
    let out = tmp.path().join("out");
    let config = ExtractionConfig::builder()
        .output_dir(&out)
        .render_dpi(72)
        .embedded_min_width(64)
        .embedded_min_height(64)
        .embedded_min_area(64 * 64)
        .build()
        .unwrap();

    let output = extract(&pdf, &config).unwrap();
    assert_eq!(output.metadata.optional_modules.get(&Stage::Render), Some(&true));
    assert_eq!(output.metadata.image_settings.render_pages_selected, vec![1]);

    let manifest = read_json(&out.join(BUNDLE).join("images_manifest.json"));
    let entries = manifest.as_array().unwrap();
    assert_eq!(entries.len(), 1, "hybrid drops embedded entries on rendered pages");
    assert_eq!(entries[0]["source"], "page_render");
    assert_eq!(entries[0]["page"], 1);
    assert_eq!(entries[0]["dpi"], 72);
    assert!(output.artifacts.files.contains_key("tables.json"));
}

#[test]
fn test_keep_embedded_override_with_pdfium() {
    e2e_skip_unless_ready!();
    let tmp = tempfile::tempdir().unwrap();
    let pdf = paper_pdf(tmp.path());
    let out = tmp.path().join("out");
    let config = ExtractionConfig::builder()
        .output_dir(&out)
        .render_dpi(72)
        .keep_embedded_on_rendered_pages(true)
        .dedup_iou_threshold(1.0)
        .embedded_min_width(64)
        .embedded_min_height(64)
        .embedded_min_area(64 * 64)
        .build()
        .unwrap();

    let output = extract(&pdf, &config).unwrap();
    assert_eq!(output.stats.images_by_source.get(&ImageSource::Embedded), Some(&1));
    assert_eq!(output.stats.images_by_source.get(&ImageSource::PageRender), Some(&1));
}
