//! Match detail page parser.
//!
//! A detail page carries the same facts in several places: the rendered
//! stage (partly obfuscated), inline `ed*` script variables, a JSON-LD
//! `SportsEvent` block and label/value tables. Each field takes the first
//! source that yields a value.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use tracing::debug;

use super::{score_in, text_of};
use crate::scraper::normalize::{normalize, TIME_RE};
use crate::scraper::obfuscation::{decode, PageMaps};
use crate::scraper::{game_id_in, staffel_id_in};
use crate::types::{MatchDetail, Schedule};

static FULL_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{2}\.\d{2}\.\d{4})\b").expect("valid regex"));

static SCRIPT_VAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(ed[A-Z][A-Za-z]*)\s*=\s*['"]([^'"]+)['"]"#).expect("valid regex")
});

static REFEREE_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^schiedsrichter(?:in)?\s*:?\s*").expect("valid regex"));

static SPIELNUMMER_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^Spiel(?:-|\s*)?nummer").expect("valid regex"));
static STAFFELNUMMER_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^Staffel(?:-|\s*)?nummer").expect("valid regex"));

static META_SPIEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Spiel:\s*([0-9]{6,})\s*/").expect("valid regex"));
static META_STAFFEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Staffel-ID:\s*([0-9]+)").expect("valid regex"));

static TEXT_SPIELNUMMER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Spiel(?:-|\s*)?nummer\s*[:\-]?\s*([A-Z0-9\-]+)").expect("valid regex")
});
static TEXT_STAFFELNUMMER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Staffel(?:-|\s*)?nummer\s*[:\-]?\s*([A-Z0-9\-]+)").expect("valid regex")
});

const HOME_TEAM: &str = ".stage .team-home .team-name a";
const AWAY_TEAM: &str = ".stage .team-away .team-name a";
const COMPETITION_LINK: &str = ".stage .stage-header a.competition[href*='/-/staffel/']";
const VENUE: &str = ".stage .stage-header a.location";
const END_RESULT: &str = ".stage .result .end-result";
const DATE_BLOCK: &str = ".stage .stage-header .date-wrapper .date";
const SUBJECT_INPUT: &str = r#".contact-form-wrapper input[name="subject"]"#;
const META_RIGHT: &str = ".stage .stage-meta-right";
const OFFICIAL_ROWS: &str = ".stage-meta-left li.row";

/// Fallback values from a JSON-LD `SportsEvent`
#[derive(Debug, Default, PartialEq, Eq)]
struct EventData {
    home: Option<String>,
    away: Option<String>,
    league: Option<String>,
    start: Option<String>,
    score: Option<String>,
}

/// Parser for match detail pages
pub struct MatchDetailParser;

impl MatchDetailParser {
    /// Parse a detail page fetched from `url`
    pub fn parse(html: &str, url: &str, maps: &PageMaps) -> MatchDetail {
        let document = Html::parse_document(html);
        Self::parse_document(&document, html, url, maps)
    }

    /// Parse an already built document; `html` is its source, scanned for
    /// script variables.
    pub fn parse_document(document: &Html, html: &str, url: &str, maps: &PageMaps) -> MatchDetail {
        let vars = script_vars(html);
        let var = |name: &str| vars.get(name).cloned();
        let event = structured_event(document);

        let link = canonical_url(document).or_else(|| non_empty(url));
        let game_id = link.as_deref().and_then(game_id_in);

        let home = decoded(document, HOME_TEAM, maps)
            .or(event.home)
            .or_else(|| var("edHeimmannschaftName"));
        let away = decoded(document, AWAY_TEAM, maps)
            .or(event.away)
            .or_else(|| var("edGastmannschaftName"));

        let league = var("edSpielklasseName").or(event.league);
        let competition = var("edWettbewerbName");
        let league_label = competition.clone().or_else(|| league.clone());

        let staffel_id = select_first(document, COMPETITION_LINK)
            .and_then(|a| a.value().attr("href"))
            .and_then(staffel_id_in)
            .or_else(|| var("edWettbewerbId"))
            .or_else(|| first_staffel_link(document));

        let score = decoded(document, END_RESULT, maps)
            .and_then(|text| score_in(&text))
            .or(event.score);

        let mut detail = MatchDetail {
            schedule: Self::parse_schedule(document, maps, event.start.as_deref()),
            game_id,
            link,
            age_group: var("edMannschaftsartName"),
            league,
            competition,
            league_label,
            home,
            away,
            venue: decoded(document, VENUE, maps),
            score,
            spielnummer: Self::parse_spielnummer(document, maps),
            staffelnummer: Self::parse_staffelnummer(document, maps),
            staffel_id,
            ..Default::default()
        };
        Self::parse_officials(document, maps, &mut detail);

        detail.schedule = normalize(detail.schedule);
        detail
    }

    /// Date block, then contact form subject, then page title (date only),
    /// then the structured event's start. Date and time resolve independently.
    fn parse_schedule(document: &Html, maps: &PageMaps, event_start: Option<&str>) -> Schedule {
        let mut date_label = None;
        let mut time = None;

        if let Some(text) = decoded(document, DATE_BLOCK, maps) {
            fill_date_time(&text, &mut date_label, &mut time);
        }

        if date_label.is_none() || time.is_none() {
            if let Some(subject) = select_first(document, SUBJECT_INPUT).and_then(|input| input.value().attr("value")) {
                fill_date_time(subject, &mut date_label, &mut time);
            }
        }

        if date_label.is_none() {
            if let Some(title) = select_first(document, "title") {
                date_label = FULL_DATE_RE.captures(&text_of(title)).map(|caps| caps[1].to_string());
            }
        }

        if let Some(start) = event_start {
            if date_label.is_none() {
                let parsed = normalize(Schedule {
                    time: Some(start.to_string()),
                    ..Default::default()
                });
                date_label = parsed.date_label.or_else(|| iso_date_label(start));
            }
            if time.is_none() && TIME_RE.is_match(start) {
                time = Some(start.to_string());
            }
        }

        Schedule {
            date_label,
            time,
            ..Default::default()
        }
    }

    /// Label/value pair, then the stage meta line, then free page text
    fn parse_spielnummer(document: &Html, maps: &PageMaps) -> Option<String> {
        labeled_value(document, &SPIELNUMMER_LABEL_RE, maps)
            .or_else(|| {
                let meta = decoded(document, META_RIGHT, maps)?;
                META_SPIEL_RE.captures(&meta).map(|caps| caps[1].to_string())
            })
            .or_else(|| {
                TEXT_SPIELNUMMER_RE
                    .captures(&page_text(document))
                    .map(|caps| caps[1].to_string())
            })
    }

    fn parse_staffelnummer(document: &Html, maps: &PageMaps) -> Option<String> {
        labeled_value(document, &STAFFELNUMMER_LABEL_RE, maps)
            .or_else(|| {
                let meta = decoded(document, META_RIGHT, maps)?;
                META_STAFFEL_RE.captures(&meta).map(|caps| caps[1].to_string())
            })
            .or_else(|| {
                TEXT_STAFFELNUMMER_RE
                    .captures(&page_text(document))
                    .map(|caps| caps[1].to_string())
            })
    }

    /// Referee and assistants from the stage's meta rows.
    ///
    /// The assistants label also contains "Schiedsrichter", so it is checked first.
    fn parse_officials(document: &Html, maps: &PageMaps, detail: &mut MatchDetail) {
        let (Ok(row_selector), Ok(span_selector)) = (Selector::parse(OFFICIAL_ROWS), Selector::parse("span")) else {
            return;
        };

        for row in document.select(&row_selector) {
            let spans: Vec<_> = row.select(&span_selector).collect();
            let label = spans
                .first()
                .map(|span| text_of(*span))
                .unwrap_or_else(|| text_of(row))
                .to_lowercase();

            if label.contains("assistent") {
                let texts: Vec<String> = if spans.len() > 1 {
                    spans[1..].iter().map(|span| decode(*span, maps)).collect()
                } else {
                    decode(row, maps)
                        .split_once(':')
                        .map(|(_, names)| names.to_string())
                        .into_iter()
                        .collect()
                };
                let mut names = texts
                    .iter()
                    .flat_map(|text| text.split(','))
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string);
                detail.assistant_1 = names.next();
                detail.assistant_2 = names.next();
            } else if label.contains("schiedsrichter") {
                detail.referee = if spans.len() > 1 {
                    let names: Vec<String> = spans[1..].iter().map(|span| decode(*span, maps)).collect();
                    non_empty(&names.join(" "))
                } else {
                    let decoded = decode(row, maps);
                    non_empty(&REFEREE_PREFIX_RE.replace(&decoded, ""))
                };
            }
        }
    }
}

fn non_empty(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn select_first<'a>(document: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    document.select(&selector).next()
}

/// Decoded text of the first match, `None` when missing or blank
fn decoded(document: &Html, css: &str, maps: &PageMaps) -> Option<String> {
    let element = select_first(document, css)?;
    non_empty(&decode(element, maps))
}

fn fill_date_time(text: &str, date_label: &mut Option<String>, time: &mut Option<String>) {
    if time.is_none() {
        *time = TIME_RE.captures(text).map(|caps| caps[1].to_string());
    }
    if date_label.is_none() {
        *date_label = FULL_DATE_RE.captures(text).map(|caps| caps[1].to_string());
    }
}

/// `DD.MM.YYYY` from a leading ISO date (`2024-05-18`)
fn iso_date_label(text: &str) -> Option<String> {
    let date = NaiveDate::parse_from_str(text.trim().get(..10)?, "%Y-%m-%d").ok()?;
    Some(date.format("%d.%m.%Y").to_string())
}

/// `<link rel="canonical">`, else `og:url`
fn canonical_url(document: &Html) -> Option<String> {
    if let Ok(selector) = Selector::parse("link[rel][href]") {
        let canonical = document
            .select(&selector)
            .filter(|link| {
                link.value()
                    .attr("rel")
                    .is_some_and(|rel| rel.trim().eq_ignore_ascii_case("canonical"))
            })
            .find_map(|link| link.value().attr("href").and_then(non_empty));
        if canonical.is_some() {
            return canonical;
        }
    }

    select_first(document, r#"meta[property="og:url"]"#)
        .and_then(|meta| meta.value().attr("content"))
        .and_then(non_empty)
}

/// `edFoo='bar'` assignments in inline scripts; the first assignment wins
fn script_vars(html: &str) -> HashMap<&str, String> {
    let mut vars = HashMap::new();
    for caps in SCRIPT_VAR_RE.captures_iter(html) {
        let (Some(name), Some(value)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        if let Some(value) = non_empty(value.as_str()) {
            vars.entry(name.as_str()).or_insert(value);
        }
    }
    vars
}

fn first_staffel_link(document: &Html) -> Option<String> {
    let selector = Selector::parse("a[href*='/-/staffel/']").ok()?;
    document
        .select(&selector)
        .find_map(|a| a.value().attr("href").and_then(staffel_id_in))
}

/// Value cell next to the first `dt`/`th` whose text matches `label`
fn labeled_value(document: &Html, label: &Regex, maps: &PageMaps) -> Option<String> {
    let selector = Selector::parse("dt, th").ok()?;

    for term in document.select(&selector) {
        if !label.is_match(&text_of(term)) {
            continue;
        }
        let value = term
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .find(|sibling| matches!(sibling.value().name(), "dd" | "td"));
        if let Some(value) = value.and_then(|v| non_empty(&decode(v, maps))) {
            return Some(value);
        }
    }
    None
}

/// Visible page text, one line per text node
fn page_text(document: &Html) -> String {
    document
        .root_element()
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let parent = node.parent().and_then(|p| p.value().as_element().map(|e| e.name()));
            if matches!(parent, Some("script" | "style")) {
                return None;
            }
            let text = text.trim();
            (!text.is_empty()).then_some(text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn structured_event(document: &Html) -> EventData {
    let Ok(selector) = Selector::parse(r#"script[type="application/ld+json"]"#) else {
        return EventData::default();
    };

    for script in document.select(&selector) {
        let raw: String = script.text().collect();
        if raw.trim().is_empty() {
            continue;
        }
        let data: Value = match serde_json::from_str(raw.trim()) {
            Ok(data) => data,
            Err(e) => {
                debug!("Skipping unreadable JSON-LD block: {}", e);
                continue;
            }
        };
        if let Some(event) = find_sports_event(&data) {
            return event_data(event);
        }
    }

    EventData::default()
}

/// Depth-first search for the first object typed `SportsEvent`
fn find_sports_event(value: &Value) -> Option<&Map<String, Value>> {
    match value {
        Value::Object(node) => {
            if type_names(node).contains("SportsEvent") {
                return Some(node);
            }
            node.values().find_map(find_sports_event)
        }
        Value::Array(items) => items.iter().find_map(find_sports_event),
        _ => None,
    }
}

fn type_names(node: &Map<String, Value>) -> String {
    match node.get("@type").or_else(|| node.get("type")) {
        Some(Value::String(name)) => name.clone(),
        Some(Value::Array(names)) => names
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(","),
        _ => String::new(),
    }
}

fn scalar(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => non_empty(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn team_name(team: Option<&Value>) -> Option<String> {
    let team = team?.as_object()?;
    scalar(team.get("name")).or_else(|| scalar(team.get("legalName")))
}

fn event_data(node: &Map<String, Value>) -> EventData {
    let result = node
        .get("aggregateScore")
        .filter(|v| !v.is_null())
        .or_else(|| node.get("result"))
        .and_then(Value::as_object);
    let score = result.and_then(|result| {
        let home = scalar(result.get("homeTeamGoals")).or_else(|| scalar(result.get("homeScore")))?;
        let away = scalar(result.get("awayTeamGoals")).or_else(|| scalar(result.get("awayScore")))?;
        Some(format!("{}:{}", home, away))
    });

    EventData {
        home: team_name(node.get("homeTeam")),
        away: team_name(node.get("awayTeam")),
        league: scalar(node.get("name")),
        start: scalar(node.get("startDate")),
        score,
    }
}
