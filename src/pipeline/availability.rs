//! Availability-statement snippets.
//!
//! An anchor phrase ("Data availability", "Code availability", …) opens a
//! window that runs until the first of: the next section heading line, the
//! next anchor, or the character budget. Windows may run across a page
//! break; the page marker is stripped from the snippet text but the byte
//! span still refers to the assembled full text.

use crate::pipeline::text::{AssembledText, PAGE_MARKER_RE};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::ops::Range;

static RE_ANCHOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:data and code availability|code and data availability|data availability|code availability|availability statement|availability of data(?: and materials?)?)\b",
    )
    .unwrap()
});

static RE_SECTION_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:\d+(?:\.\d+)*\.?\s+)?(?:references|bibliography|acknowledge?ments?|author contributions?|competing interests?|conflicts? of interests?|declaration of interests?|funding|methods|results|discussion|conclusions?|supplementary (?:information|materials?)|ethics(?: statement| declarations)?|additional information|abbreviations|appendix)\b[^.]{0,40}$",
    )
    .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SnippetKind {
    Data,
    Code,
}

impl SnippetKind {
    /// `code` only when the anchor names code and not data.
    pub fn from_anchor(anchor: &str) -> Self {
        let a = anchor.to_ascii_lowercase();
        if a.contains("code") && !a.contains("data") {
            SnippetKind::Code
        } else {
            SnippetKind::Data
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvailabilitySnippet {
    pub kind: SnippetKind,
    /// Anchor phrase as it appears in the document.
    pub anchor: String,
    /// Page of the anchor.
    pub page: usize,
    pub text: String,
    /// Byte span in the full text.
    pub span: Range<usize>,
}

/// All availability snippets in document order.
pub fn extract_snippets(text: &AssembledText, max_chars: usize) -> Vec<AvailabilitySnippet> {
    let s = text.as_str();
    let anchors: Vec<_> = RE_ANCHOR.find_iter(s).collect();

    anchors
        .iter()
        .enumerate()
        .filter_map(|(i, anchor)| {
            let start = anchor.start();
            let budget_end = s[start..]
                .char_indices()
                .nth(max_chars)
                .map(|(off, _)| start + off)
                .unwrap_or(s.len());
            let next_anchor = anchors.get(i + 1).map(|m| m.start()).unwrap_or(s.len());
            let limit = budget_end.min(next_anchor);
            let end = next_heading(s, anchor.end(), limit).unwrap_or(limit);

            let body = collapse(&PAGE_MARKER_RE.replace_all(&s[start..end], " "));
            if body.is_empty() {
                return None;
            }
            Some(AvailabilitySnippet {
                kind: SnippetKind::from_anchor(anchor.as_str()),
                anchor: anchor.as_str().to_string(),
                page: text.page_at(start),
                text: body,
                span: start..end,
            })
        })
        .collect()
}

/// Byte spans of the snippets, for link prioritisation.
pub fn windows(snippets: &[AvailabilitySnippet]) -> Vec<Range<usize>> {
    snippets.iter().map(|s| s.span.clone()).collect()
}

/// Start of the first heading line after the line containing `from`.
fn next_heading(s: &str, from: usize, limit: usize) -> Option<usize> {
    if from >= limit {
        return None;
    }
    let mut offset = from + s[from..limit].find('\n')? + 1;
    for line in s[offset..limit].split_inclusive('\n') {
        if RE_SECTION_HEADING.is_match(line.trim_end()) {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::text::TextAssembler;

    fn assembled(pages: &[&str]) -> AssembledText {
        let mut a = TextAssembler::new();
        for p in pages {
            a.push_page(p);
        }
        a.finish()
    }

    #[test]
    fn window_stops_at_heading() {
        let t = assembled(&[
            "Body.\nData Availability\nReads are in BioProject PRJNA1.\nReferences\n1. Smith et al.",
        ]);
        let snips = extract_snippets(&t, 800);
        assert_eq!(snips.len(), 1);
        assert_eq!(snips[0].kind, SnippetKind::Data);
        assert_eq!(snips[0].text, "Data Availability Reads are in BioProject PRJNA1.");
        assert_eq!(snips[0].page, 1);
        assert_eq!(&t.as_str()[snips[0].span.clone()].trim_end(), &"Data Availability\nReads are in BioProject PRJNA1.");
    }

    #[test]
    fn numbered_heading_ends_window() {
        let t = assembled(&["Code availability: see the repo.\n5. Discussion\nMore."]);
        let snips = extract_snippets(&t, 800);
        assert_eq!(snips[0].kind, SnippetKind::Code);
        assert_eq!(snips[0].text, "Code availability: see the repo.");
    }

    #[test]
    fn next_anchor_ends_window() {
        let t = assembled(&["Data availability: in Zenodo. Code availability: on GitHub."]);
        let snips = extract_snippets(&t, 800);
        assert_eq!(snips.len(), 2);
        assert_eq!(snips[0].text, "Data availability: in Zenodo.");
        assert_eq!(snips[1].kind, SnippetKind::Code);
        assert_eq!(snips[0].span.end, snips[1].span.start);
    }

    #[test]
    fn budget_bounds_window() {
        let body = "x".repeat(500);
        let t = assembled(&[&format!("Availability statement {body}")]);
        let snips = extract_snippets(&t, 50);
        assert_eq!(snips[0].text.chars().count(), 50);
        assert_eq!(snips[0].kind, SnippetKind::Data);
    }

    #[test]
    fn window_crosses_page_without_marker() {
        let t = assembled(&["Data and code availability\nAll data are", "deposited at Dryad.\nFunding\nNone."]);
        let snips = extract_snippets(&t, 800);
        assert_eq!(snips.len(), 1);
        assert_eq!(snips[0].kind, SnippetKind::Data);
        assert_eq!(snips[0].page, 1);
        assert_eq!(snips[0].text, "Data and code availability All data are deposited at Dryad.");
        assert!(!snips[0].text.contains("====="));
    }

    #[test]
    fn no_anchor_no_snippet() {
        let t = assembled(&["Nothing to see here."]);
        assert!(extract_snippets(&t, 800).is_empty());
        assert!(windows(&[]).is_empty());
    }

    #[test]
    fn long_heading_like_sentence_is_not_a_heading() {
        assert!(RE_SECTION_HEADING.is_match("Acknowledgements"));
        assert!(RE_SECTION_HEADING.is_match("7 Conclusion"));
        assert!(!RE_SECTION_HEADING.is_match("Results. These show that the data were good."));
    }
}
