//! The extraction run: one pass over the pages, then the document-wide
//! scanners, then the artifact files.
//!
//! ```text
//!  PdfSource ──► Page ─┬─► TextAssembler ───────────────┐
//!                      ├─► CaptionDetector ─► captions  │
//!                      ├─► annotation URIs              │
//!                      ├─► tables (pdfium)              │
//!                      └─► ImageStage ─► ManifestWriter │
//!                                                       ▼
//!       availability ─► windows ─► LinkReport ◄─ URL scan    code signals
//! ```
//!
//! Pages are consumed one at a time; only text, captions, link hits and
//! table records outlive their page.

use crate::capability::{Capabilities, PageRenderer, TextGeometry};
use crate::config::ExtractionConfig;
use crate::error::{ExtractError, Stage, StageWarning};
use crate::naming::RunNames;
use crate::output::{
    DocumentMetadata, ExtractionOutput, ExtractionStats, RecordedImageSettings, RunMetadata,
};
use crate::pipeline::availability;
use crate::pipeline::captions::{queries_by_page, CaptionCandidate, CaptionDetector, CaptionKind};
use crate::pipeline::code_signals;
use crate::pipeline::images::ImageStage;
use crate::pipeline::links::{self, LinkReport};
use crate::pipeline::manifest::{self, ManifestWriter, OutputTarget};
use crate::pipeline::source::PdfSource;
use crate::pipeline::tables::{extract_page_tables, TableDetectorConfig, TableRecord};
use crate::pipeline::text::TextAssembler;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Extract every artifact of `pdf_path` into `config.output_dir`.
///
/// Fatal problems (bad input, stale output, unwritable core artifact) return
/// `Err` before or instead of partial output: when a core artifact cannot be
/// written, the images and files already persisted are removed again.
/// Everything else degrades into [`StageWarning`]s recorded in the run
/// metadata.
pub fn extract(pdf_path: impl AsRef<Path>, config: &ExtractionConfig) -> Result<ExtractionOutput, ExtractError> {
    let pdf_path = pdf_path.as_ref();
    let mut source = PdfSource::open(pdf_path)?;
    let total_pages = source.page_count();
    let pdf_metadata = source.metadata();

    let names = RunNames::derive(
        pdf_path,
        &pdf_metadata,
        config.bundle_name.as_deref(),
        config.prefix.as_deref(),
    );
    info!("Paper: {:?} → bundle {:?}, prefix {:?}", names.title, names.bundle, names.prefix);

    let target = OutputTarget::new(
        &config.output_dir,
        config.layout,
        &names.bundle,
        &names.prefix,
        &names.summary_file,
    );
    target.prepare(config.clean)?;
    let mut writer = ManifestWriter::new(target);

    // ── Capabilities ─────────────────────────────────────────────────────
    let mut warnings: Vec<StageWarning> = Vec::new();
    let caps = Capabilities::probe(config.pdfium);
    let backend = match caps.open(pdf_path) {
        Ok(backend) => backend,
        Err(detail) => {
            warn!("pdfium could not open the document: {}", detail);
            None
        }
    };
    let unavailable = caps
        .missing_reason()
        .unwrap_or("pdfium could not open the document")
        .to_string();
    let mut optional_modules = caps.stages();
    if backend.is_none() {
        optional_modules.values_mut().for_each(|v| *v = false);
        if config.image_mode.includes_render() {
            warnings.push(StageWarning::MissingCapability {
                stage: Stage::Render,
                detail: format!("{unavailable}; images are embedded-only"),
            });
        }
        if config.extract_tables {
            warnings.push(StageWarning::MissingCapability {
                stage: Stage::Tables,
                detail: unavailable.clone(),
            });
        }
    }
    let renderer = backend.as_ref().map(|b| b as &dyn PageRenderer);
    let geometry = backend.as_ref().map(|b| b as &dyn TextGeometry);
    let run_tables = config.extract_tables && geometry.is_some();

    let detector = CaptionDetector::new(config.caption_snippet_chars);
    let stage = ImageStage::new(
        config.image_settings(),
        config.max_rendered_pixels,
        renderer,
        geometry,
        &detector,
    );
    let table_config = TableDetectorConfig::default();

    let progress: ProgressCallback = config
        .progress_callback
        .clone()
        .unwrap_or_else(|| Arc::new(NoopProgressCallback));
    progress.on_extraction_start(total_pages);

    // ── Page pass ────────────────────────────────────────────────────────
    let mut assembler = TextAssembler::new();
    let mut captions: Vec<CaptionCandidate> = Vec::new();
    let mut annotation_hits = Vec::new();
    let mut tables: Vec<TableRecord> = Vec::new();
    let mut render_pages_selected = Vec::new();

    while let Some(mut page) = source.next() {
        let n = page.number();
        progress.on_page_start(n, total_pages);
        let mut page_warnings = std::mem::take(&mut page.warnings);

        assembler.push_page(&page.raw_text);
        let mut page_captions = detector.detect_page(n, &page.raw_text);
        annotation_hits.extend(links::annotation_hits(n, &page.link_uris));

        if let Some(geometry) = geometry.filter(|_| run_tables) {
            match extract_page_tables(geometry, &page, &table_config) {
                Ok(found) => tables.extend(found),
                Err(detail) => page_warnings.push(StageWarning::TableFailed { page: n, detail }),
            }
        }

        let result = stage.process_page(&page, &page_captions, &source);
        if result.decision.is_some_and(|d| d.renders()) {
            render_pages_selected.push(n);
        }
        for (i, anchor) in &result.anchors {
            if let Some(c) = page_captions.get_mut(*i) {
                c.bbox_hint = Some(*anchor);
            }
        }
        page_warnings.extend(result.warnings);
        let image_count = result.images.len();
        writer.write_images(result.images, &mut page_warnings);

        for w in &page_warnings {
            progress.on_page_warning(n, &w.to_string());
        }
        warnings.extend(page_warnings);
        captions.append(&mut page_captions);
        debug!("Page {}/{} done: {} images", n, total_pages, image_count);
        progress.on_page_complete(n, total_pages, image_count);
    }

    // ── Document-wide scanners ───────────────────────────────────────────
    let text = assembler.finish();
    let snippets = availability::extract_snippets(&text, config.availability_max_chars);
    let mut hits = links::scan_text(&text, config.link_context_chars);
    hits.extend(annotation_hits);
    let report = LinkReport::classify(hits, &availability::windows(&snippets));
    let signals = code_signals::scan(&text);

    let (figures, table_captions): (Vec<CaptionCandidate>, Vec<CaptionCandidate>) =
        captions.iter().cloned().partition(|c| c.kind == CaptionKind::Figure);
    let caption_queries = queries_by_page(captions.iter());

    // ── Artifacts ────────────────────────────────────────────────────────
    let all_urls = report.all_urls();
    let written = (|| -> Result<_, ExtractError> {
        writer.write_text(manifest::FULLTEXT, text.as_str())?;
        writer.write_text(manifest::URLS_ALL, &all_urls.join("\n"))?;
        writer.write_json(manifest::URL_HITS, &report.hits)?;
        writer.write_json(manifest::LINKS, &report.records)?;
        writer.write_json(manifest::RESOURCE_LINKS, &report.resource_links())?;
        writer.write_json(manifest::RESOURCE_LINKS_PRIORITY, &report.resource_links_priority())?;
        writer.write_json(manifest::FIGURE_CAPTIONS, &figures)?;
        writer.write_json(manifest::TABLE_CAPTIONS, &table_captions)?;
        writer.write_json(manifest::CODE_SIGNALS, &signals)?;
        writer.write_json(manifest::AVAILABILITY_SNIPPETS, &snippets)?;
        if run_tables {
            writer.write_json(manifest::TABLES, &tables)?;
        }
        writer.write_image_artifacts()
    })();
    let images = match written {
        Ok(images) => images,
        Err(e) => {
            writer.discard();
            return Err(e);
        }
    };

    let mut not_found = Vec::new();
    let empties = [
        (manifest::URLS_ALL, all_urls.is_empty()),
        (manifest::LINKS, report.records.is_empty()),
        (manifest::FIGURE_CAPTIONS, figures.is_empty()),
        (manifest::TABLE_CAPTIONS, table_captions.is_empty()),
        (manifest::CODE_SIGNALS, signals.is_empty()),
        (manifest::AVAILABILITY_SNIPPETS, snippets.is_empty()),
        (manifest::TABLES, run_tables && tables.is_empty()),
        (manifest::IMAGES_MANIFEST, images.is_empty()),
    ];
    for (name, empty) in empties {
        if empty {
            not_found.push(name.to_string());
        }
    }

    let mut images_by_source = BTreeMap::new();
    for entry in &images {
        *images_by_source.entry(entry.source).or_insert(0) += 1;
    }
    let stats = ExtractionStats {
        pages: text.page_count(),
        urls: all_urls.len(),
        figure_captions: figures.len(),
        table_captions: table_captions.len(),
        code_signals: signals.len(),
        availability_snippets: snippets.len(),
        tables_extracted: run_tables.then_some(tables.len()),
        images_extracted: images.len(),
        images_by_source,
        warnings: warnings.len(),
    };

    let target = writer.target();
    let metadata = RunMetadata {
        pdf_path: std::fs::canonicalize(pdf_path)
            .unwrap_or_else(|_| pdf_path.to_path_buf())
            .display()
            .to_string(),
        paper_title: names.title.clone(),
        paper_name: names.bundle.clone(),
        paper_name_extracted: names.extracted.clone(),
        bundle_name: names.bundle.clone(),
        num_pages: total_pages,
        prefix: names.prefix.clone(),
        layout: config.layout,
        output_dir: target.run_dir().display().to_string(),
        summary_file: target.summary_path().display().to_string(),
        image_settings: RecordedImageSettings {
            settings: config.image_settings(),
            render_pages_selected,
            caption_queries_by_page: caption_queries,
        },
        pdf_metadata,
        optional_modules,
        warnings,
        not_found,
    };
    if let Err(e) = writer.write_json(manifest::METADATA, &metadata) {
        writer.discard();
        return Err(e);
    }

    info!(
        "Extracted {} pages: {} URLs, {} figure / {} table captions, {} images",
        stats.pages, stats.urls, stats.figure_captions, stats.table_captions, stats.images_extracted
    );
    progress.on_extraction_complete(total_pages, stats.images_extracted);

    Ok(ExtractionOutput {
        metadata,
        stats,
        artifacts: writer.finish(),
    })
}

/// Document metadata only; nothing is written.
pub fn inspect(pdf_path: impl AsRef<Path>) -> Result<DocumentMetadata, ExtractError> {
    Ok(PdfSource::open(pdf_path)?.metadata())
}
