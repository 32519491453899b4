//! Match detail extraction: fetch a match page, build its obfuscation maps,
//! parse it.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use scraper::Html;
use tracing::{debug, info};

use super::cache::{self, BlobStore, CacheCategory};
use super::http::{Fetcher, RequestOptions};
use super::obfuscation::MapBuilder;
use super::parsers::MatchDetailParser;
use super::{abs_url, game_id_in};
use crate::types::MatchDetail;

static NON_WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\W+").expect("valid regex"));

/// Cache key of a match page: its match id, else the flattened URL
pub fn page_cache_key(url: &str) -> String {
    let id = game_id_in(url).unwrap_or_else(|| NON_WORD_RE.replace_all(url, "_").into_owned());
    if id.is_empty() {
        "full_unknown.html".to_string()
    } else {
        format!("full_{}.html", id)
    }
}

/// Fetches and parses match detail pages
pub struct MatchDetailExtractor {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn BlobStore>,
    maps: MapBuilder,
    base_url: String,
}

impl MatchDetailExtractor {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn BlobStore>,
        maps: MapBuilder,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            store,
            maps,
            base_url: base_url.into(),
        }
    }

    /// Detail record for a match link (relative or absolute).
    ///
    /// An unreachable page yields an all-absent record.
    pub fn fetch(&self, link: &str) -> MatchDetail {
        let url = abs_url(&self.base_url, link);
        if url.is_empty() {
            return MatchDetail::default();
        }

        let Some(html) = self.page_html(&url) else {
            info!("Match page unavailable: {}", url);
            return MatchDetail::default();
        };

        let document = Html::parse_document(&html);
        let maps = self.maps.collect_for_page(&document);
        debug!("{}: {} obfuscation groups", url, maps.len());

        MatchDetailParser::parse_document(&document, &html, &url, &maps)
    }

    fn page_html(&self, url: &str) -> Option<String> {
        let key = page_cache_key(url);
        if let Some(html) = cache::get_text(self.store.as_ref(), CacheCategory::Match, &key) {
            if !html.trim().is_empty() {
                return Some(html);
            }
        }

        let html = self
            .fetcher
            .fetch_text(url, &RequestOptions::html_page(&self.base_url))?;
        cache::put_quietly(self.store.as_ref(), CacheCategory::Match, &key, html.as_bytes());
        Some(html)
    }
}
