//! Date/time normalization.
//!
//! Calendar cells, ISO timestamps from structured data and free-text blocks
//! all end up in [`Schedule`]. [`normalize`] reconciles them into
//! `date_label = DD.MM.YYYY`, `time = HH:MM` and, when a full timestamp was
//! seen, `datetime_iso`. Each rule only fills what is still unset, so the
//! function is idempotent.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime};
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::types::Schedule;

pub(crate) static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([0-2]\d:[0-5]\d)\b").expect("valid regex"));

pub(crate) static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([0-3]\d\.[01]\d\.\d{2,4})\b").expect("valid regex"));

static ISO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{4}-\d{2}-\d{2}T[0-2]\d:[0-5]\d(?::\d{2})?(?:Z|[+-][0-2]\d:[0-5]\d)?\b")
        .expect("valid regex")
});

static WEEKDAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:Mo|Di|Mi|Do|Fr|Sa|So|Montag|Dienstag|Mittwoch|Donnerstag|Freitag|Samstag|Sonntag)\s*,\s*",
    )
    .expect("valid regex")
});

static ZERO_WIDTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[\u{200b}-\u{200f}\u{feff}]").expect("valid regex"));

/// NFKC-normalize and strip no-break spaces and zero-width marks
pub fn clean_text(raw: &str) -> String {
    let text: String = raw.nfkc().collect();
    let text = text.replace(['\u{00a0}', '\u{202f}'], " ");
    ZERO_WIDTH_RE.replace_all(&text, "").trim().to_string()
}

/// A parsed ISO timestamp split into the display fields
#[derive(Debug, Clone, PartialEq, Eq)]
struct IsoParts {
    time: String,
    date_label: String,
    iso: String,
}

fn parse_iso(raw: &str) -> Option<IsoParts> {
    let s = raw.replace('Z', "+00:00");
    let has_offset = s
        .split_once('T')
        .map(|(_, t)| t.contains(['+', '-']))
        .unwrap_or(false);

    if has_offset {
        let dt = DateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%:z")
            .or_else(|_| DateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M%:z"))
            .ok()?;
        Some(IsoParts {
            time: dt.format("%H:%M").to_string(),
            date_label: dt.format("%d.%m.%Y").to_string(),
            iso: dt.format("%Y-%m-%dT%H:%M:%S%:z").to_string(),
        })
    } else {
        let dt = NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S")
            .or_else(|_| NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M"))
            .ok()?;
        Some(IsoParts {
            time: dt.format("%H:%M").to_string(),
            date_label: dt.format("%d.%m.%Y").to_string(),
            iso: dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
        })
    }
}

fn is_unset(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// Reconcile the raw date/time fields of a record.
///
/// Rules, in order:
/// 1. clean the raw `time` text
/// 2. an ISO timestamp in it sets `time`, `datetime_iso` and (if unset) `date_label`
/// 3. otherwise a bare `HH:MM` sets `time`
/// 4. an unset `date_label` is searched for in the same text
/// 5. a weekday-prefixed `date_label` keeps the long form in `date_label_long`
///    and is reduced to its numeric date
pub fn normalize(mut schedule: Schedule) -> Schedule {
    let raw = clean_text(schedule.time.as_deref().unwrap_or(""));

    let iso = ISO_RE.find(&raw).and_then(|m| {
        let parts = parse_iso(m.as_str());
        if parts.is_none() {
            tracing::debug!("unparseable timestamp {:?}", m.as_str());
        }
        parts
    });

    match iso {
        Some(parts) => {
            schedule.time = Some(parts.time);
            if is_unset(&schedule.date_label) {
                schedule.date_label = Some(parts.date_label);
            }
            schedule.datetime_iso = Some(parts.iso);
        }
        None => {
            if let Some(caps) = TIME_RE.captures(&raw) {
                schedule.time = Some(caps[1].to_string());
            }
        }
    }

    if is_unset(&schedule.date_label) {
        if let Some(caps) = DATE_RE.captures(&raw) {
            schedule.date_label = Some(caps[1].to_string());
        }
    }

    if let Some(label) = schedule.date_label.clone() {
        if WEEKDAY_RE.is_match(&label) {
            if let Some(caps) = DATE_RE.captures(&label) {
                schedule.date_label = Some(caps[1].to_string());
            }
            schedule.date_label_long = Some(label);
        }
    }

    schedule
}
