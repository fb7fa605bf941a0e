//! CLI binary for paper-artifacts.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig` and prints a `key=value` summary on stdout.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use paper_artifacts::{
    extract, inspect, CropMode, ExtractionConfig, ExtractionOutput, ExtractionProgressCallback, FigurePages,
    ImageMode, OutputLayout, PdfiumPolicy, ProgressCallback,
};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar with one log line per page that produced images or
/// warnings.
struct CliProgressCallback {
    bar: ProgressBar,
    warnings: AtomicUsize,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            warnings: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting artifacts from {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, images: usize) {
        if images > 0 {
            self.bar.println(format!(
                "  {} Page {:>3}/{:<3}  {}",
                green("✓"),
                page_num,
                total,
                dim(&format!("{images} image(s)")),
            ));
        }
        self.bar.inc(1);
    }

    fn on_page_warning(&self, page_num: usize, warning: &str) {
        self.warnings.fetch_add(1, Ordering::SeqCst);
        let msg = match warning.char_indices().nth(100) {
            Some((cut, _)) => format!("{}\u{2026}", &warning[..cut]),
            None => warning.to_string(),
        };
        self.bar
            .println(format!("  {} Page {:>3}  {}", yellow("⚠"), page_num, yellow(&msg)));
    }

    fn on_extraction_complete(&self, total_pages: usize, images: usize) {
        self.bar.finish_and_clear();
        let warnings = self.warnings.load(Ordering::SeqCst);
        eprintln!(
            "{} {} pages, {} images{}",
            if warnings == 0 { green("✔") } else { cyan("⚠") },
            bold(&total_pages.to_string()),
            bold(&images.to_string()),
            if warnings == 0 {
                String::new()
            } else {
                format!("  ({} page warnings)", yellow(&warnings.to_string()))
            },
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Default: hybrid images, caption-aware crops, bundle layout in ./<title>/
  paper-artifacts paper.pdf

  # Re-run into the same bundle, replacing the previous artifacts
  paper-artifacts --clean paper.pdf

  # Legacy flat layout with an explicit prefix
  paper-artifacts --layout flat --prefix helix --output-dir notes paper.pdf

  # Render every page at 300 DPI without cropping
  paper-artifacts --image-mode render --figure-pages all \
      --render-dpi 300 --render-crop-mode full paper.pdf

  # Embedded images only, no pdfium needed
  paper-artifacts --no-pdfium paper.pdf

  # Inspect PDF metadata
  paper-artifacts --inspect-only paper.pdf

  # Full run result as JSON
  paper-artifacts --json paper.pdf > run.json

OUTPUT (bundle layout):
  <output-dir>/<bundle>/fulltext.txt, metadata.json, urls_all.txt,
  url_hits.json, links.json, resource_links.json,
  resource_links_priority.json, figure_captions.json, table_captions.json,
  code_signals.json, availability_snippets.json, tables.json (pdfium only),
  images_manifest.json, image_gallery.md, images/

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH         Path to libpdfium (rendering, crops, tables)
  RUST_LOG                Override log filter (e.g. paper_artifacts=debug)
  PAPER_ARTIFACTS_*       Fallback for most flags (see --help)

Without pdfium, render/hybrid modes fall back to embedded images and
tables.json is omitted; the run records a warning instead of failing.
"#;

/// Extract text, links, captions, tables and figures from a research paper PDF.
#[derive(Parser, Debug)]
#[command(
    name = "paper-artifacts",
    version,
    about = "Extract machine-checkable artifacts from a research paper PDF",
    long_about = "Extract page-marked full text, classified links, caption candidates, \
availability statements, code signals, tables and figure images from a research paper PDF \
into a bundle directory, ready for writing a structured reading summary.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Path to the PDF.
    pdf: PathBuf,

    /// Root directory for outputs.
    #[arg(long, env = "PAPER_ARTIFACTS_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Output layout: bundle directory or prefixed files.
    #[arg(long, env = "PAPER_ARTIFACTS_LAYOUT", value_enum, default_value = "bundle")]
    layout: LayoutArg,

    /// Bundle directory name (default: derived from the paper title).
    #[arg(long, env = "PAPER_ARTIFACTS_BUNDLE_NAME")]
    bundle_name: Option<String>,

    /// File-name prefix (default: normalised bundle name).
    #[arg(long, env = "PAPER_ARTIFACTS_PREFIX")]
    prefix: Option<String>,

    /// Remove previous artifacts of this paper before writing.
    #[arg(long, env = "PAPER_ARTIFACTS_CLEAN")]
    clean: bool,

    /// Image strategy: embedded, render or hybrid.
    #[arg(long, env = "PAPER_ARTIFACTS_IMAGE_MODE", value_enum, default_value = "hybrid")]
    image_mode: ImageModeArg,

    /// Pages to render: caption pages or all pages.
    #[arg(long, env = "PAPER_ARTIFACTS_FIGURE_PAGES", value_enum, default_value = "caption")]
    figure_pages: FigurePagesArg,

    /// Rendering DPI (72–600).
    #[arg(long, env = "PAPER_ARTIFACTS_RENDER_DPI", default_value_t = 220,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    render_dpi: u32,

    /// Crop of rendered pages: caption-aware or full.
    #[arg(long, env = "PAPER_ARTIFACTS_RENDER_CROP_MODE", value_enum, default_value = "caption-aware")]
    render_crop_mode: CropModeArg,

    /// Margin kept above the caption-aware region (points).
    #[arg(long, env = "PAPER_ARTIFACTS_CAPTION_TOP_MARGIN_PT", default_value_t = 10.0)]
    caption_top_margin_pt: f32,

    /// Band trimmed at the page bottom (points).
    #[arg(long, env = "PAPER_ARTIFACTS_CROP_BOTTOM_MARGIN_PT", default_value_t = 8.0)]
    crop_bottom_margin_pt: f32,

    /// Crops thinner than this share of the page height render the full page.
    #[arg(long, env = "PAPER_ARTIFACTS_MIN_CROP_HEIGHT_RATIO", default_value_t = 0.15)]
    min_crop_height_ratio: f32,

    /// Pages with more caption candidates are treated as list pages.
    #[arg(long, env = "PAPER_ARTIFACTS_MAX_CAPTIONS_PER_RENDER_PAGE", default_value_t = 6)]
    max_captions_per_render_page: usize,

    /// Minimum embedded image width (px).
    #[arg(long, env = "PAPER_ARTIFACTS_EMBEDDED_MIN_WIDTH", default_value_t = 400)]
    embedded_min_width: u32,

    /// Minimum embedded image height (px).
    #[arg(long, env = "PAPER_ARTIFACTS_EMBEDDED_MIN_HEIGHT", default_value_t = 300)]
    embedded_min_height: u32,

    /// Minimum embedded image area (px²).
    #[arg(long, env = "PAPER_ARTIFACTS_EMBEDDED_MIN_AREA", default_value_t = 120_000)]
    embedded_min_area: u64,

    /// Keep embedded images on pages that were rendered (hybrid mode).
    #[arg(long, env = "PAPER_ARTIFACTS_KEEP_EMBEDDED_ON_RENDERED_PAGES")]
    keep_embedded_on_rendered_pages: bool,

    /// Same-page images overlapping above this IoU are duplicates.
    #[arg(long, env = "PAPER_ARTIFACTS_DEDUP_IOU_THRESHOLD", default_value_t = 0.8)]
    dedup_iou_threshold: f32,

    /// Longest edge of a rendered page in pixels.
    #[arg(long, env = "PAPER_ARTIFACTS_MAX_RENDERED_PIXELS", default_value_t = 6000)]
    max_rendered_pixels: u32,

    /// Skip table extraction.
    #[arg(long, env = "PAPER_ARTIFACTS_NO_TABLES")]
    no_tables: bool,

    /// Do not bind pdfium (embedded images only, no tables).
    #[arg(long, env = "PAPER_ARTIFACTS_NO_PDFIUM")]
    no_pdfium: bool,

    /// Print PDF metadata only, no extraction.
    #[arg(long)]
    inspect_only: bool,

    /// Print the run result as JSON instead of key=value lines.
    #[arg(long, env = "PAPER_ARTIFACTS_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PAPER_ARTIFACTS_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PAPER_ARTIFACTS_VERBOSE")]
    verbose: bool,

    /// Suppress everything on stderr except errors.
    #[arg(short, long, env = "PAPER_ARTIFACTS_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LayoutArg {
    Bundle,
    Flat,
}

impl From<LayoutArg> for OutputLayout {
    fn from(v: LayoutArg) -> Self {
        match v {
            LayoutArg::Bundle => OutputLayout::Bundle,
            LayoutArg::Flat => OutputLayout::Flat,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ImageModeArg {
    Embedded,
    Render,
    Hybrid,
}

impl From<ImageModeArg> for ImageMode {
    fn from(v: ImageModeArg) -> Self {
        match v {
            ImageModeArg::Embedded => ImageMode::Embedded,
            ImageModeArg::Render => ImageMode::Render,
            ImageModeArg::Hybrid => ImageMode::Hybrid,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FigurePagesArg {
    Caption,
    All,
}

impl From<FigurePagesArg> for FigurePages {
    fn from(v: FigurePagesArg) -> Self {
        match v {
            FigurePagesArg::Caption => FigurePages::Caption,
            FigurePagesArg::All => FigurePages::All,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum CropModeArg {
    CaptionAware,
    #[value(alias = "none")]
    Full,
}

impl From<CropModeArg> for CropMode {
    fn from(v: CropModeArg) -> Self {
        match v {
            CropModeArg::CaptionAware => CropMode::CaptionAware,
            CropModeArg::Full => CropMode::Full,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; -v always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let meta = inspect(&cli.pdf).context("Failed to inspect PDF")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:         {}", cli.pdf.display());
            if let Some(ref t) = meta.title {
                println!("Title:        {}", t);
            }
            if let Some(ref a) = meta.author {
                println!("Author:       {}", a);
            }
            if let Some(ref s) = meta.subject {
                println!("Subject:      {}", s);
            }
            println!("Pages:        {}", meta.page_count);
            println!("PDF Version:  {}", meta.pdf_version);
            println!("Encrypted:    {}", meta.is_encrypted);
            if let Some(ref p) = meta.producer {
                println!("Producer:     {}", p);
            }
            if let Some(ref c) = meta.creator {
                println!("Creator:      {}", c);
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Run extraction ───────────────────────────────────────────────────
    let output = extract(&cli.pdf, &config).context("Extraction failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else {
        print_summary(&cli, &output);
    }

    if !cli.quiet && !show_progress && !cli.json {
        for w in &output.metadata.warnings {
            eprintln!("{} {}", yellow("⚠"), w);
        }
    }

    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .output_dir(&cli.output_dir)
        .layout(cli.layout.into())
        .clean(cli.clean)
        .image_mode(cli.image_mode.into())
        .figure_pages(cli.figure_pages.into())
        .render_dpi(cli.render_dpi)
        .max_rendered_pixels(cli.max_rendered_pixels)
        .crop_mode(cli.render_crop_mode.into())
        .caption_top_margin_pt(cli.caption_top_margin_pt)
        .crop_bottom_margin_pt(cli.crop_bottom_margin_pt)
        .min_crop_height_ratio(cli.min_crop_height_ratio)
        .max_captions_per_render_page(cli.max_captions_per_render_page)
        .embedded_min_width(cli.embedded_min_width)
        .embedded_min_height(cli.embedded_min_height)
        .embedded_min_area(cli.embedded_min_area)
        .keep_embedded_on_rendered_pages(cli.keep_embedded_on_rendered_pages)
        .dedup_iou_threshold(cli.dedup_iou_threshold)
        .extract_tables(!cli.no_tables)
        .pdfium(if cli.no_pdfium {
            PdfiumPolicy::Disabled
        } else {
            PdfiumPolicy::Auto
        });

    if let Some(ref name) = cli.bundle_name {
        builder = builder.bundle_name(name);
    }
    if let Some(ref prefix) = cli.prefix {
        builder = builder.prefix(prefix);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// `key=value` lines, one per fact, stable order.
fn print_summary(cli: &Cli, output: &ExtractionOutput) {
    let meta = &output.metadata;
    let settings = &meta.image_settings.settings;
    let stats = &output.stats;

    println!("pdf={}", meta.pdf_path);
    println!("layout={}", meta.layout);
    println!("prefix={}", meta.prefix);
    println!("image_mode={}", settings.image_mode);
    println!("figure_pages={}", settings.figure_pages);
    println!("render_dpi={}", settings.render_dpi);
    println!("render_crop_mode={}", settings.render_crop_mode);
    println!("max_captions_per_render_page={}", settings.max_captions_per_render_page);
    println!("render_pages_selected={:?}", meta.image_settings.render_pages_selected);
    println!("pages={}", stats.pages);
    println!("urls={}", stats.urls);
    println!("figures={}", stats.figure_captions);
    println!("tables_captions={}", stats.table_captions);
    println!("code_signals={}", stats.code_signals);
    println!("availability_snippets={}", stats.availability_snippets);
    println!("tables_extracted={}", stats.tables_extracted.unwrap_or(0));
    println!("images_extracted={}", stats.images_extracted);
    if !stats.images_by_source.is_empty() {
        println!("images_by_source={}", stats.images_by_source_line());
    }
    println!("output_dir={}", meta.output_dir);
    println!("summary_file={}", meta.summary_file);
    if cli.verbose {
        println!("warnings={}", stats.warnings);
    }
}
