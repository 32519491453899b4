//! Match calendar parser.
//!
//! Parses the "load more" feed of the match calendar: a JSON envelope around
//! an HTML fragment of table rows. Date header rows (`tr.row-headline`) set
//! the date for the match rows that follow them.

use std::borrow::Cow;
use std::sync::LazyLock;

use anyhow::Result;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use serde_json::Value;

use super::{score_in, text_of};
use crate::scraper::normalize::normalize;
use crate::scraper::{game_id_in, staffel_id_in};
use crate::types::{MatchSummary, Schedule};

static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("valid selector"));
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").expect("valid selector"));
static CLUB_CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td.column-club").expect("valid selector"));
static SCORE_CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td.column-score").expect("valid selector"));
static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

const HEADLINE_CLASS: &str = "row-headline";

/// One page of the calendar feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFetchResult {
    pub html: String,
    pub is_final: bool,
    pub last_index: i64,
}

impl PageFetchResult {
    /// What an unreachable page looks like: no rows, feed finished
    pub fn terminal(offset: i64) -> Self {
        Self {
            html: String::new(),
            is_final: true,
            last_index: offset,
        }
    }
}

/// Internal: feed response structure, loosely typed
#[derive(Deserialize)]
struct FeedResponse {
    html: Option<String>,
    #[serde(rename = "final")]
    is_final: Option<Value>,
    #[serde(rename = "lastIndex")]
    last_index: Option<Value>,
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => matches!(s.trim(), "true" | "1"),
        _ => false,
    }
}

fn as_index(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parser for calendar feed pages
pub struct CalendarParser;

impl CalendarParser {
    /// Parse the JSON envelope. A missing `lastIndex` counts as 0.
    pub fn parse_page(json: &str) -> Result<PageFetchResult> {
        let response: FeedResponse = serde_json::from_str(json)?;

        Ok(PageFetchResult {
            html: response.html.unwrap_or_default(),
            is_final: response.is_final.as_ref().is_some_and(truthy),
            last_index: response.last_index.as_ref().and_then(as_index).unwrap_or(0),
        })
    }

    /// Parse calendar rows into match summaries, in document order.
    ///
    /// Rows naming neither team nor match are dropped.
    pub fn parse(html: &str) -> Vec<MatchSummary> {
        let document = Html::parse_document(&ensure_table(html));
        let mut matches = Vec::new();
        let mut current_date: Option<String> = None;

        for row in document.select(&ROW) {
            if row.value().classes().any(|c| c == HEADLINE_CLASS) {
                let label = text_of(row);
                current_date = (!label.is_empty()).then_some(label);
                continue;
            }

            if let Some(summary) = Self::parse_row(row, current_date.as_deref()) {
                if summary.is_match() {
                    matches.push(summary);
                }
            }
        }

        matches
    }

    fn parse_row(row: ElementRef<'_>, date_label: Option<&str>) -> Option<MatchSummary> {
        let cells: Vec<_> = row.select(&CELL).collect();
        if cells.is_empty() {
            return None;
        }
        let cell_text = |i: usize| cells.get(i).map(|cell| text_of(*cell)).unwrap_or_default();

        let clubs: Vec<_> = row.select(&CLUB_CELL).collect();
        let club_text = |i: usize| clubs.get(i).map(|cell| text_of(*cell)).unwrap_or_default();

        let score = row
            .select(&SCORE_CELL)
            .next()
            .and_then(|cell| Self::parse_score(&text_of(cell)));

        let time = cell_text(0);
        let schedule = normalize(Schedule {
            date_label: date_label.map(str::to_string),
            time: (!time.is_empty()).then_some(time),
            ..Default::default()
        });

        let mut summary = MatchSummary {
            schedule,
            age_group: cell_text(1),
            league: cell_text(2),
            home: club_text(0),
            away: club_text(1),
            score,
            ..Default::default()
        };
        Self::apply_links(row, &mut summary);

        Some(summary)
    }

    /// `digits : digits` anywhere in the cell, as "H:A"
    pub fn parse_score(text: &str) -> Option<String> {
        score_in(text)
    }

    /// The first match link wins; a group link is only used when there is none.
    fn apply_links(row: ElementRef<'_>, summary: &mut MatchSummary) {
        let hrefs: Vec<&str> = row
            .select(&LINK)
            .filter_map(|a| a.value().attr("href"))
            .collect();

        if let Some((href, id)) = hrefs.iter().find_map(|h| game_id_in(h).map(|id| (*h, id))) {
            summary.game_id = Some(id);
            summary.link = href.to_string();
        } else if let Some((href, id)) = hrefs.iter().find_map(|h| staffel_id_in(h).map(|id| (*h, id))) {
            summary.staffel_id = Some(id);
            summary.link = href.to_string();
        }
    }
}

/// Bare `<tr>` fragments lose their structure outside a table
fn ensure_table(html: &str) -> Cow<'_, str> {
    if html.to_ascii_lowercase().contains("<table") {
        Cow::Borrowed(html)
    } else {
        Cow::Owned(format!("<table>{}</table>", html))
    }
}
