//! Text assembly: one page-delimited full-text stream.
//!
//! Every page is appended after a marker line (`===== Page N =====`). The
//! page text itself is not transformed, so offsets found by later scanners
//! map back to pages exactly through [`AssembledText::page_at`].

use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

/// Marker lines inserted before each page.
pub static PAGE_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^===== Page \d+ =====$").unwrap());

/// Incrementally built full text.
#[derive(Debug, Default, Clone)]
pub struct TextAssembler {
    text: String,
    /// Byte offset where each page's own text begins (after its marker).
    page_starts: Vec<usize>,
}

impl TextAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the next page. Pages must be pushed in document order.
    pub fn push_page(&mut self, raw_text: &str) {
        let number = self.page_starts.len() + 1;
        self.text.push_str(&format!("\n\n===== Page {number} =====\n"));
        self.page_starts.push(self.text.len());
        self.text.push_str(raw_text);
    }

    pub fn finish(self) -> AssembledText {
        AssembledText {
            text: self.text,
            page_starts: self.page_starts,
        }
    }
}

/// The finished full text with its page index.
#[derive(Debug, Clone)]
pub struct AssembledText {
    text: String,
    page_starts: Vec<usize>,
}

impl AssembledText {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn page_count(&self) -> usize {
        self.page_starts.len()
    }

    /// 1-indexed page containing byte `offset`. Offsets inside a marker
    /// belong to the page the marker introduces.
    pub fn page_at(&self, offset: usize) -> usize {
        let after = self.page_starts.partition_point(|&start| start <= offset);
        if after == 0 {
            1
        } else if after < self.page_starts.len() && offset + marker_len(after + 1) >= self.page_starts[after] {
            after + 1
        } else {
            after
        }
    }

    /// Text of one page (1-indexed), without its marker.
    pub fn page_text(&self, page: usize) -> &str {
        &self.text[self.page_range(page)]
    }

    /// Byte range of one page's text (1-indexed); empty when out of range.
    pub fn page_range(&self, page: usize) -> Range<usize> {
        let Some(&start) = self.page_starts.get(page.wrapping_sub(1)) else {
            return 0..0;
        };
        let end = self
            .page_starts
            .get(page)
            .map(|&next| next - marker_len(page + 1))
            .unwrap_or(self.text.len());
        start..end.max(start)
    }
}

fn marker_len(page: usize) -> usize {
    format!("\n\n===== Page {page} =====\n").len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assembled(pages: &[&str]) -> AssembledText {
        let mut a = TextAssembler::new();
        for p in pages {
            a.push_page(p);
        }
        a.finish()
    }

    #[test]
    fn marker_count_equals_page_count() {
        let t = assembled(&["alpha", "", "gamma\nline"]);
        assert_eq!(t.page_count(), 3);
        assert_eq!(PAGE_MARKER_RE.find_iter(t.as_str()).count(), 3);
        assert!(t.as_str().starts_with("\n\n===== Page 1 =====\nalpha"));
    }

    #[test]
    fn offsets_map_back_to_pages() {
        let t = assembled(&["first page text", "second", "third page"]);
        let s = t.as_str();
        assert_eq!(t.page_at(s.find("first").unwrap()), 1);
        assert_eq!(t.page_at(s.find("second").unwrap()), 2);
        assert_eq!(t.page_at(s.find("third").unwrap()), 3);
        assert_eq!(t.page_at(s.find("===== Page 2").unwrap()), 2);
        assert_eq!(t.page_at(0), 1);
    }

    #[test]
    fn page_text_round_trips() {
        let t = assembled(&["one", "two\nlines", ""]);
        assert_eq!(t.page_text(1), "one");
        assert_eq!(t.page_text(2), "two\nlines");
        assert_eq!(t.page_text(3), "");
        assert_eq!(t.page_text(4), "");
        assert_eq!(t.page_text(0), "");
    }
}
