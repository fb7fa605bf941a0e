//! Code-signal scanner: lines hinting that the paper ships code.
//!
//! Each line of each page is checked against an ordered rule list and
//! reported at most once, under the first rule that fires.

use crate::pipeline::text::AssembledText;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeSignal {
    pub page: usize,
    /// 1-indexed line within the page.
    pub line: usize,
    pub keyword: &'static str,
    pub text: String,
}

static RULES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("algorithm", r"\bAlgorithm\s*\d+"),
        ("pseudocode", r"(?i)\bpseudo-?code\b"),
        ("code availability", r"(?i)\bcode availability\b"),
        ("source code", r"(?i)\bsource code\b"),
        ("github", r"(?i)\bgithub\b"),
        ("gitlab", r"(?i)\bgitlab\b"),
        ("docker", r"(?i)\bdocker"),
        ("conda", r"(?i)\b(?:ana|mini)?conda\b"),
        ("pip install", r"(?i)\bpip3? install\b"),
        ("python", r"(?i)\bpython\s+"),
        (
            "file path",
            r"\b[\w.-]+/(?:[\w.-]+/)*[\w-]+\.(?:py|ipynb|R|r|sh|rs|cpp|cc|c|h|java|jl|js|ts|go|m|yaml|yml|toml)\b",
        ),
        (
            "indented code",
            r"^(?: {4,}|\t+)(?:def |class |import |from \S+ import |return\b|#include|for .*:$|if .*:$|[A-Za-z_][\w.]*\s*=\s*\S|[A-Za-z_][\w.]*\(.*\)\s*;?$)",
        ),
    ]
    .into_iter()
    .map(|(k, p)| (k, Regex::new(p).unwrap()))
    .collect()
});

/// First rule matching `line`, by keyword.
pub fn classify_line(line: &str) -> Option<&'static str> {
    RULES.iter().find(|(_, re)| re.is_match(line)).map(|(k, _)| *k)
}

/// Scan every page of the full text.
pub fn scan(text: &AssembledText) -> Vec<CodeSignal> {
    let mut out = Vec::new();
    for page in 1..=text.page_count() {
        for (i, raw) in text.page_text(page).lines().enumerate() {
            if raw.trim().is_empty() {
                continue;
            }
            if let Some(keyword) = classify_line(raw) {
                out.push(CodeSignal {
                    page,
                    line: i + 1,
                    keyword,
                    text: raw.trim().to_string(),
                });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::text::TextAssembler;

    #[test]
    fn keyword_lines() {
        assert_eq!(classify_line("Algorithm 1 Greedy merge"), Some("algorithm"));
        assert_eq!(classify_line("Install with pip install mytool"), Some("pip install"));
        assert_eq!(classify_line("run it in a Docker container"), Some("docker"));
        assert_eq!(classify_line("We used Python 3.11"), Some("python"));
        assert_eq!(classify_line("plain prose line"), None);
    }

    #[test]
    fn first_rule_wins() {
        // Mentions both source code and GitHub.
        assert_eq!(classify_line("Source code is available on GitHub"), Some("source code"));
    }

    #[test]
    fn file_paths_and_indentation() {
        assert_eq!(classify_line("see scripts/train_model.py for details"), Some("file path"));
        assert_eq!(classify_line("    def forward(self, x):"), Some("indented code"));
        assert_eq!(classify_line("\tx = compute(y)"), Some("indented code"));
        assert_eq!(classify_line("    and then the results"), None);
        assert_eq!(classify_line("and/or more"), None);
    }

    #[test]
    fn scan_reports_page_and_line() {
        let mut a = TextAssembler::new();
        a.push_page("Intro\nnothing");
        a.push_page("Methods\n\nCode: https://github.com/x/y\n");
        let signals = scan(&a.finish());
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].page, 2);
        assert_eq!(signals[0].line, 3);
        assert_eq!(signals[0].keyword, "github");
        assert_eq!(signals[0].text, "Code: https://github.com/x/y");
    }
}
