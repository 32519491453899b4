//! HTML and JSON parsers for fussball.de pages.

pub mod calendar;
pub mod match_detail;

pub use calendar::{CalendarParser, PageFetchResult};
pub use match_detail::MatchDetailParser;

use std::sync::LazyLock;

use regex::Regex;
use scraper::ElementRef;

static SCORE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d+)\s*:\s*(\d+)\b").expect("valid regex"));

/// Text of an element: trimmed text runs joined by single spaces
pub(crate) fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// First `digits : digits` in `text`, as "H:A"
pub(crate) fn score_in(text: &str) -> Option<String> {
    SCORE_RE
        .captures(text)
        .map(|caps| format!("{}:{}", &caps[1], &caps[2]))
}
