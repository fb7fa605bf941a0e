//! Link extraction and classification.
//!
//! URLs come from two places: the assembled full text (regex scan) and URI
//! link annotations on each page. Every occurrence is kept as a [`UrlHit`];
//! distinct URLs become [`LinkRecord`]s in first-occurrence order with one
//! category each. A record is *priority* when one of its text occurrences
//! lies inside an availability snippet window.

use crate::pipeline::text::AssembledText;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Range;

static RE_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r#"https?://[^\s<>\]})"']+"#).unwrap());

static RE_DOI_PATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^/10\.\S+").unwrap());

static RE_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)github\.com|gitlab\.com|bitbucket\.org|source code|docker").unwrap()
});

static RE_DATA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)ncbi\.nlm\.nih\.gov|bioproject|\bsra\b|zenodo|figshare|dryad|kaggle").unwrap()
});

static RE_SUPPLEMENTARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)supplement|video|slides|imeta\.science|update materials").unwrap()
});

pub const ANNOTATION_CONTEXT: &str = "[annotation]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkCategory {
    Code,
    Data,
    Supplementary,
    Doi,
    Other,
}

impl LinkCategory {
    pub const ALL: [LinkCategory; 5] = [
        LinkCategory::Code,
        LinkCategory::Data,
        LinkCategory::Supplementary,
        LinkCategory::Doi,
        LinkCategory::Other,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkSource {
    Text,
    Annotation,
}

/// One URL occurrence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UrlHit {
    pub page: usize,
    pub url: String,
    pub context: String,
    pub source: LinkSource,
    /// Byte offset in the full text; `None` for annotations.
    #[serde(skip)]
    pub offset: Option<usize>,
}

/// One distinct URL with its category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkRecord {
    pub url: String,
    pub category: LinkCategory,
    pub context: String,
    pub page: usize,
    pub source: LinkSource,
    pub priority: bool,
}

/// Category → sorted URL list. Every category key is present.
pub type ResourceLinks = BTreeMap<LinkCategory, Vec<String>>;

// ── URL hygiene ──────────────────────────────────────────────────────────────

pub fn clean_url(url: &str) -> &str {
    url.trim_end_matches(['.', ',', ';', ':', ')'])
}

/// http(s) with a dotted host; DOI resolver links must carry a full DOI.
pub fn is_usable_url(url: &str) -> bool {
    let Some((scheme, rest)) = url.split_once("://") else {
        return false;
    };
    if !scheme.eq_ignore_ascii_case("http") && !scheme.eq_ignore_ascii_case("https") {
        return false;
    }
    let host_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let host = rest[..host_end].to_ascii_lowercase();
    let tail = &rest[host_end..];
    let path = &tail[..tail.find(['?', '#']).unwrap_or(tail.len())];

    if !host.contains('.') {
        return false;
    }
    if host == "doi.org" || host.ends_with(".doi.org") {
        if !RE_DOI_PATH.is_match(path) || path.ends_with('-') || path.ends_with('/') {
            return false;
        }
    }
    true
}

fn host_of(url: &str) -> String {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    rest[..end].to_ascii_lowercase()
}

/// First matching rule wins; `other` otherwise.
pub fn categorize(url: &str, context: &str) -> LinkCategory {
    let host = host_of(url);
    let haystack = format!("{host} {url} {context}");
    if RE_CODE.is_match(&haystack) {
        return LinkCategory::Code;
    }
    if RE_DATA.is_match(&haystack) {
        return LinkCategory::Data;
    }
    if RE_SUPPLEMENTARY.is_match(&haystack) {
        return LinkCategory::Supplementary;
    }
    let ctx = context.to_ascii_lowercase();
    if host.contains("doi.org") || ctx.contains(&format!("doi: {url}")) || ctx.contains(&format!("doi:{url}")) {
        return LinkCategory::Doi;
    }
    LinkCategory::Other
}

/// Drop a trailing-slash URL when a longer URL in the set extends it.
pub fn collapse_parent_urls<'a>(urls: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let set: BTreeSet<&str> = urls.into_iter().collect();
    set.iter()
        .filter(|&&url| !(url.ends_with('/') && set.iter().any(|&o| o != url && o.starts_with(url))))
        .map(|u| u.to_string())
        .collect()
}

// ── Scanning ─────────────────────────────────────────────────────────────────

/// Every usable URL occurrence in the full text. Context windows never
/// cross page boundaries.
pub fn scan_text(text: &AssembledText, context_chars: usize) -> Vec<UrlHit> {
    let s = text.as_str();
    RE_URL
        .find_iter(s)
        .filter_map(|m| {
            let url = clean_url(m.as_str());
            if !is_usable_url(url) {
                return None;
            }
            let page = text.page_at(m.start());
            let range = text.page_range(page);
            let page_str = &s[range.clone()];
            let local = m.start().saturating_sub(range.start);
            let window = char_window(page_str, local, (local + url.len()).min(page_str.len()), context_chars);
            Some(UrlHit {
                page,
                url: url.to_string(),
                context: tidy_context(window),
                source: LinkSource::Text,
                offset: Some(m.start()),
            })
        })
        .collect()
}

/// Hits for a page's URI annotations.
pub fn annotation_hits(page: usize, uris: &[String]) -> Vec<UrlHit> {
    uris.iter()
        .map(|u| clean_url(u.trim()))
        .filter(|u| is_usable_url(u))
        .map(|url| UrlHit {
            page,
            url: url.to_string(),
            context: ANNOTATION_CONTEXT.to_string(),
            source: LinkSource::Annotation,
            offset: None,
        })
        .collect()
}

/// Byte range covering `n` characters on either side of `start..end`.
fn char_window(s: &str, start: usize, end: usize, n: usize) -> &str {
    let lo = if n == 0 {
        start
    } else {
        s[..start].char_indices().rev().nth(n - 1).map(|(i, _)| i).unwrap_or(0)
    };
    let hi = s[end..].char_indices().nth(n).map(|(i, _)| end + i).unwrap_or(s.len());
    &s[lo..hi]
}

fn tidy_context(window: &str) -> String {
    window.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Classification ───────────────────────────────────────────────────────────

/// Classified view over all URL hits of a run.
#[derive(Debug, Clone, Default)]
pub struct LinkReport {
    pub hits: Vec<UrlHit>,
    pub records: Vec<LinkRecord>,
}

impl LinkReport {
    /// Build records from `hits` (page order, text before annotations).
    /// `windows` are the byte spans of availability snippets.
    pub fn classify(mut hits: Vec<UrlHit>, windows: &[Range<usize>]) -> Self {
        hits.sort_by_key(|h| (h.page, h.source));

        let mut records: Vec<LinkRecord> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for hit in &hits {
            let in_window = hit
                .offset
                .is_some_and(|off| windows.iter().any(|w| w.contains(&off)));
            match index.get(&hit.url) {
                Some(&i) => records[i].priority |= in_window,
                None => {
                    index.insert(hit.url.clone(), records.len());
                    records.push(LinkRecord {
                        url: hit.url.clone(),
                        category: categorize(&hit.url, &hit.context),
                        context: hit.context.clone(),
                        page: hit.page,
                        source: hit.source,
                        priority: in_window,
                    });
                }
            }
        }
        Self { hits, records }
    }

    pub fn priority(&self) -> Vec<&LinkRecord> {
        self.records.iter().filter(|r| r.priority).collect()
    }

    pub fn all_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.records.iter().map(|r| r.url.clone()).collect();
        urls.sort();
        urls
    }

    pub fn resource_links(&self) -> ResourceLinks {
        group(self.records.iter())
    }

    pub fn resource_links_priority(&self) -> ResourceLinks {
        group(self.records.iter().filter(|r| r.priority))
    }
}

fn group<'a>(records: impl Iterator<Item = &'a LinkRecord>) -> ResourceLinks {
    let mut raw: BTreeMap<LinkCategory, Vec<&str>> =
        LinkCategory::ALL.iter().map(|&c| (c, Vec::new())).collect();
    for r in records {
        raw.entry(r.category).or_default().push(&r.url);
    }
    raw.into_iter()
        .map(|(c, urls)| (c, collapse_parent_urls(urls)))
        .collect()
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
    fn hygiene() {
        assert_eq!(clean_url("https://example.org/x)."), "https://example.org/x");
        assert!(is_usable_url("https://github.com/org/repo"));
        assert!(!is_usable_url("ftp://example.org/file"));
        assert!(!is_usable_url("http://localhost/path"));
        assert!(!is_usable_url("https://doi.org/"));
        assert!(!is_usable_url("https://doi.org/10"));
        assert!(!is_usable_url("https://doi.org/10.1038/s41586-"));
        assert!(is_usable_url("https://doi.org/10.1038/s41586-020-2649-2"));
    }

    #[test]
    fn categories_in_rule_order() {
        assert_eq!(categorize("https://github.com/a/b", ""), LinkCategory::Code);
        assert_eq!(categorize("https://zenodo.org/record/1", ""), LinkCategory::Data);
        assert_eq!(
            categorize("https://www.ncbi.nlm.nih.gov/bioproject/PRJNA1", ""),
            LinkCategory::Data
        );
        assert_eq!(
            categorize("https://example.org/v.mp4", "see the supplementary video"),
            LinkCategory::Supplementary
        );
        assert_eq!(categorize("https://doi.org/10.1/abc", ""), LinkCategory::Doi);
        assert_eq!(categorize("https://example.org", "plain"), LinkCategory::Other);
        // "source code" in context beats a data host.
        assert_eq!(
            categorize("https://zenodo.org/record/2", "source code archived at"),
            LinkCategory::Code
        );
        // "sra" only as a word.
        assert_eq!(categorize("https://israel.example.org", ""), LinkCategory::Other);
    }

    #[test]
    fn scan_records_pages_and_context() {
        let t = assembled(&[
            "Intro text.",
            "Code is at https://github.com/org/tool. More text follows here.",
        ]);
        let hits = scan_text(&t, 20);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].page, 2);
        assert_eq!(hits[0].url, "https://github.com/org/tool");
        assert!(hits[0].context.contains("Code is at"));
        assert!(!hits[0].context.contains("====="));
    }

    #[test]
    fn priority_from_availability_window() {
        let t = assembled(&["Data availability: reads at https://example.org/reads and more."]);
        let hits = scan_text(&t, 10);
        let off = hits[0].offset.unwrap();
        let inside = LinkReport::classify(hits.clone(), &[off - 5..off + 40]);
        assert!(inside.records[0].priority);
        assert_eq!(inside.records[0].category, LinkCategory::Other);
        let outside = LinkReport::classify(hits, &[0..3]);
        assert!(!outside.records[0].priority);
        assert!(outside.priority().is_empty());
    }

    #[test]
    fn records_are_distinct_and_annotations_follow_text() {
        let t = assembled(&["See https://a.org/x and https://a.org/x again.", "https://b.org/y"]);
        let mut hits = annotation_hits(1, &["https://c.org/z".to_string(), "mailto:x@y.z".to_string()]);
        hits.extend(scan_text(&t, 5));
        let report = LinkReport::classify(hits, &[]);
        let urls: Vec<&str> = report.records.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, ["https://a.org/x", "https://c.org/z", "https://b.org/y"]);
        assert_eq!(report.hits.len(), 4);
        assert_eq!(report.records[1].context, ANNOTATION_CONTEXT);
        assert_eq!(report.records[1].source, LinkSource::Annotation);
    }

    #[test]
    fn grouping_collapses_parents() {
        let collapsed = collapse_parent_urls(["https://x.org/", "https://x.org/data", "https://y.org/"]);
        assert_eq!(collapsed, ["https://x.org/data", "https://y.org/"]);

        let t = assembled(&["https://github.com/o/ and https://github.com/o/r"]);
        let report = LinkReport::classify(scan_text(&t, 5), &[]);
        let groups = report.resource_links();
        assert_eq!(groups.len(), 5);
        assert_eq!(groups[&LinkCategory::Code], ["https://github.com/o/r"]);
        assert!(groups[&LinkCategory::Doi].is_empty());
        assert_eq!(report.all_urls(), ["https://github.com/o/", "https://github.com/o/r"]);
    }
}
