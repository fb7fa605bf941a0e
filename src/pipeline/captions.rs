//! Caption detection: figure and table caption candidates per page.
//!
//! Detection runs an ordered list of [`CaptionRule`]s over each page's raw
//! text. Every rule reports `(kind, label, offset)` matches; the detector
//! merges them into one [`CaptionCandidate`] per `(kind, label)` on the page,
//! keeping the first snippet and counting the rest as extra mentions.
//!
//! Default rules, in order:
//! 1. punctuated figure labels: `Figure 3.`, `Fig. 2:`, `Figure S1 |`
//! 2. punctuated table labels: `Table 1.`, `Tab. 4:`
//! 3. upper-case headings at line start: `FIGURE 3 Overview`, `TABLE 2 …`

use crate::geometry::Rect;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionKind {
    Figure,
    Table,
}

impl CaptionKind {
    pub fn noun(self) -> &'static str {
        match self {
            CaptionKind::Figure => "Figure",
            CaptionKind::Table => "Table",
        }
    }
}

/// One caption candidate. Unique by `(kind, label, page)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptionCandidate {
    pub kind: CaptionKind,
    pub label: String,
    /// 1-indexed page.
    pub page: usize,
    pub snippet: String,
    /// Anchor box on the page, filled in when the crop stage locates it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox_hint: Option<Rect>,
    /// How many times the caption label matched on this page.
    pub mentions: usize,
}

impl CaptionCandidate {
    /// Search string used to locate the caption on the page, e.g. `"Figure 3"`.
    pub fn query(&self) -> String {
        format!("{} {}", self.kind.noun(), self.label)
    }
}

/// A raw rule hit inside one page's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionMatch {
    pub kind: CaptionKind,
    pub label: String,
    /// Byte offset of the caption keyword.
    pub start: usize,
}

/// A caption pattern. Rules are tried in registration order.
pub trait CaptionRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn find(&self, text: &str) -> Vec<CaptionMatch>;
}

// ── Rules ────────────────────────────────────────────────────────────────────

static RE_FIGURE_PUNCTUATED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(figure|fig\.)[ \t]*([a-z]?\d+[a-z]?)[ \t]*[.:|]").unwrap()
});

static RE_TABLE_PUNCTUATED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(table|tab\.)[ \t]*([a-z]?\d+[a-z]?)[ \t]*[.:|]").unwrap()
});

static RE_UPPERCASE_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(FIGURE|TABLE)[ \t]*([A-Z]?\d+[a-zA-Z]?)(?:[ \t]+\S|[ \t]*[.:|])").unwrap()
});

/// `Figure 3.` / `Tab. 2:` style labels, case-insensitive, at line start or
/// after whitespace.
pub struct PunctuatedLabel {
    kind: CaptionKind,
    re: &'static Lazy<Regex>,
}

impl PunctuatedLabel {
    pub fn figures() -> Self {
        Self {
            kind: CaptionKind::Figure,
            re: &RE_FIGURE_PUNCTUATED,
        }
    }

    pub fn tables() -> Self {
        Self {
            kind: CaptionKind::Table,
            re: &RE_TABLE_PUNCTUATED,
        }
    }
}

impl CaptionRule for PunctuatedLabel {
    fn name(&self) -> &'static str {
        match self.kind {
            CaptionKind::Figure => "punctuated-figure",
            CaptionKind::Table => "punctuated-table",
        }
    }

    fn find(&self, text: &str) -> Vec<CaptionMatch> {
        // Boundaries are checked by hand so adjacent labels don't share
        // the whitespace between them.
        self.re
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let keyword = caps.get(1)?;
                let before_ok = text[..whole.start()].chars().next_back().is_none_or(char::is_whitespace);
                let after_ok = text[whole.end()..].chars().next().is_none_or(char::is_whitespace);
                if !(before_ok && after_ok) {
                    return None;
                }
                Some(CaptionMatch {
                    kind: self.kind,
                    label: caps[2].to_string(),
                    start: keyword.start(),
                })
            })
            .collect()
    }
}

/// `FIGURE 3 Title` / `TABLE 2 Title` headings, case-sensitive.
pub struct UppercaseHeading;

impl CaptionRule for UppercaseHeading {
    fn name(&self) -> &'static str {
        "uppercase-heading"
    }

    fn find(&self, text: &str) -> Vec<CaptionMatch> {
        RE_UPPERCASE_HEADING
            .captures_iter(text)
            .filter_map(|caps| {
                let keyword = caps.get(1)?;
                let kind = if keyword.as_str() == "FIGURE" {
                    CaptionKind::Figure
                } else {
                    CaptionKind::Table
                };
                Some(CaptionMatch {
                    kind,
                    label: caps[2].to_string(),
                    start: keyword.start(),
                })
            })
            .collect()
    }
}

// ── Detector ─────────────────────────────────────────────────────────────────

pub struct CaptionDetector {
    rules: Vec<Box<dyn CaptionRule>>,
    snippet_chars: usize,
}

impl CaptionDetector {
    /// Detector with the default rule list.
    pub fn new(snippet_chars: usize) -> Self {
        Self::with_rules(
            vec![
                Box::new(PunctuatedLabel::figures()),
                Box::new(PunctuatedLabel::tables()),
                Box::new(UppercaseHeading),
            ],
            snippet_chars,
        )
    }

    pub fn with_rules(rules: Vec<Box<dyn CaptionRule>>, snippet_chars: usize) -> Self {
        Self { rules, snippet_chars }
    }

    /// Candidates on one page, in order of first appearance.
    pub fn detect_page(&self, page: usize, text: &str) -> Vec<CaptionCandidate> {
        let mut hits: Vec<CaptionMatch> = self.rules.iter().flat_map(|r| r.find(text)).collect();
        hits.sort_by_key(|m| m.start);
        // Two rules can fire on the same keyword ("FIGURE 3:" is both).
        hits.dedup_by(|b, a| a.start == b.start && a.kind == b.kind);

        let mut out: Vec<CaptionCandidate> = Vec::new();
        let mut seen: HashMap<(CaptionKind, String), usize> = HashMap::new();
        for hit in hits {
            let key = (hit.kind, hit.label.to_ascii_lowercase());
            if let Some(&idx) = seen.get(&key) {
                out[idx].mentions += 1;
                continue;
            }
            seen.insert(key, out.len());
            out.push(CaptionCandidate {
                kind: hit.kind,
                snippet: snippet_at(text, hit.start, self.snippet_chars),
                label: hit.label,
                page,
                bbox_hint: None,
                mentions: 1,
            });
        }
        out
    }

    /// Match a single text line that *begins* with a caption.
    pub fn match_line_start(&self, line: &str) -> Option<CaptionMatch> {
        let lead = line.len() - line.trim_start().len();
        self.rules
            .iter()
            .flat_map(|r| r.find(line))
            .find(|m| m.start == lead)
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }
}

impl Default for CaptionDetector {
    fn default() -> Self {
        Self::new(200)
    }
}

/// A page with more candidates than `threshold` is a list or index page
/// (figure list, supplementary index) rather than a page holding figures.
pub fn is_list_page(page_candidates: usize, threshold: usize) -> bool {
    page_candidates > threshold
}

/// Distinct caption queries per page, in detection order.
pub fn queries_by_page<'a>(
    candidates: impl IntoIterator<Item = &'a CaptionCandidate>,
) -> BTreeMap<usize, Vec<String>> {
    let mut out: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for c in candidates {
        let q = c.query();
        let entry = out.entry(c.page).or_default();
        if !entry.contains(&q) {
            entry.push(q);
        }
    }
    out
}

/// Up to `max_chars` characters from `start`, whitespace runs collapsed.
fn snippet_at(text: &str, start: usize, max_chars: usize) -> String {
    let mut out = String::new();
    let mut count = 0;
    for word in text[start..].split_whitespace() {
        if count >= max_chars {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
            count += 1;
        }
        out.push_str(word);
        count += word.chars().count();
    }
    if count > max_chars {
        out = out.chars().take(max_chars).collect();
    }
    out.trim_end().to_string()
}
