//! Scraper for the fussball.de match calendar and match pages
//!
//! Provides fetching, caching, HTML parsing and glyph de-obfuscation.

pub mod cache;
pub mod calendar;
pub mod http;
pub mod match_detail;
pub mod normalize;
pub mod obfuscation;
pub mod parsers;
pub mod rate_limiter;

pub use cache::{BlobStore, FileCache, NoCache};
pub use calendar::{collect_matches, CalendarPaginator};
pub use http::{Fetcher, HttpFetcher};
pub use match_detail::MatchDetailExtractor;
pub use obfuscation::{MapBuilder, ObfuscationCache, TtfGlyphReader};
pub use rate_limiter::RateLimiter;

use std::sync::LazyLock;

use regex::Regex;

/// Base URL for fussball.de
pub const BASE_URL: &str = "https://www.fussball.de";

static GAME_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/-/spiel/([A-Za-z0-9]+)").expect("valid regex"));

static STAFFEL_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/-/staffel/([A-Za-z0-9-]+)").expect("valid regex"));

/// Build the calendar "load more" feed URL for one page
pub fn calendar_feed_url(base: &str, plz: &str, from: &str, to: &str, offset: i64, max: usize) -> String {
    format!(
        "{}/ajax.match.calendar.loadmore/-/datum-bis/{}/datum-von/{}/mime-type/JSON/plz/{}/max/{}/offset/{}",
        base, to, from, plz, max, offset
    )
}

/// Build the calendar page URL the feed is requested from
pub fn calendar_referer(base: &str, plz: &str, from: &str, to: &str) -> String {
    format!(
        "{}/matchkalender/-/plz/{}/datum-von/{}/datum-bis/{}/wettkampftyp/-1/mannschaftsart/-1",
        base, plz, from, to
    )
}

/// Build the web font URL for an obfuscation group
pub fn font_url(base: &str, group: &str) -> String {
    format!("{}/export.fontface/-/format/woff/id/{}/type/font", base, group)
}

/// Resolve a page link against `base`
pub fn abs_url(base: &str, link: &str) -> String {
    let link = link.trim();
    if link.is_empty() || link.starts_with("http://") || link.starts_with("https://") {
        return link.to_string();
    }
    if link.starts_with("//") {
        return http::with_scheme(link);
    }

    let base = base.trim_end_matches('/');
    if link.starts_with('/') {
        format!("{}{}", base, link)
    } else {
        format!("{}/{}", base, link)
    }
}

/// Match id from a `/-/spiel/<id>` URL
pub fn game_id_in(url: &str) -> Option<String> {
    GAME_ID_RE.captures(url).map(|caps| caps[1].to_string())
}

/// Group id from a `/-/staffel/<id>` URL
pub fn staffel_id_in(url: &str) -> Option<String> {
    STAFFEL_ID_RE.captures(url).map(|caps| caps[1].to_string())
}
