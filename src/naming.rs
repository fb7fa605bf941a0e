//! Paper title and output-name derivation.
//!
//! Reference managers often export files as `Author - 2021 - Journal -
//! Title.pdf` and copy the same string into the `/Title` entry; the citation
//! stem is stripped so only the title remains.

use crate::output::DocumentMetadata;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

static RE_CITATION_STEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^-]{1,80}\s-\s\d{4}\s-\s[^-]{1,120}\s-\s(.+)$").unwrap());

static RE_NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

static RE_UNSAFE_PATH_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[\\/:*?"<>|]+"#).unwrap());

static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

/// Metadata titles shorter than this are ignored in favour of the file stem.
const MIN_TITLE_CHARS: usize = 10;

/// `"Author - 2021 - Journal - Title"` → `"Title"`; other strings unchanged.
pub fn strip_citation_stem(raw: &str) -> &str {
    RE_CITATION_STEM
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(raw)
}

/// Title from the info dictionary when usable, else from the file stem.
pub fn paper_title(pdf_path: &Path, meta: &DocumentMetadata) -> String {
    if let Some(raw) = &meta.title {
        let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        let title = strip_citation_stem(&collapsed);
        if title.chars().count() >= MIN_TITLE_CHARS {
            return title.to_string();
        }
    }
    let stem = pdf_path
        .file_stem()
        .map(|s| s.to_string_lossy().trim().to_string())
        .unwrap_or_default();
    let stem = strip_citation_stem(&stem).to_string();
    if stem.is_empty() {
        "paper".to_string()
    } else {
        stem
    }
}

/// Filesystem-safe but human-readable name (bundle directories, summary file).
pub fn safe_paper_name(raw: &str) -> String {
    let name = RE_UNSAFE_PATH_CHARS.replace_all(raw.trim(), "-");
    let name = RE_SPACES.replace_all(&name, " ");
    let name = name.trim().trim_end_matches('.');
    if name.is_empty() {
        "paper".to_string()
    } else {
        name.to_string()
    }
}

/// Lower-case dash-separated slug (file prefixes).
pub fn normalize_name(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    let slug = RE_NON_ALNUM.replace_all(&lower, "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "paper".to_string()
    } else {
        slug.to_string()
    }
}

/// Names used for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunNames {
    pub title: String,
    /// `safe_paper_name(title)`.
    pub extracted: String,
    pub bundle: String,
    pub prefix: String,
    pub summary_file: String,
}

impl RunNames {
    pub fn derive(
        pdf_path: &Path,
        meta: &DocumentMetadata,
        bundle_override: Option<&str>,
        prefix_override: Option<&str>,
    ) -> Self {
        let title = paper_title(pdf_path, meta);
        let extracted = safe_paper_name(&title);
        let bundle = bundle_override
            .map(safe_paper_name)
            .unwrap_or_else(|| extracted.clone());
        let prefix = normalize_name(prefix_override.unwrap_or(&bundle));
        let summary_file = format!("{extracted}阅读总结.md");
        Self {
            title,
            extracted,
            bundle,
            prefix,
            summary_file,
        }
    }
}
