//! Glyph-substitution de-obfuscation.
//!
//! Parts of a match page are rendered with private-use codepoints inside
//! elements tagged `data-obfuscation="<group>"`. Each group has its own
//! codepoint → character mapping, published either as a stylesheet or as a
//! web font.

pub mod css;
pub mod decode;
pub mod font;

pub use decode::decode;
pub use font::{FontGlyphReader, TtfGlyphReader};

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use scraper::{Html, Selector};
use tracing::{debug, info};

use super::cache::{self, BlobStore, CacheCategory};
use super::http::{Fetcher, RequestOptions};
use super::{abs_url, font_url};

/// Marks an element whose text uses a group's mapping
pub const OBFUSCATION_ATTR: &str = "data-obfuscation";
/// `<body>` attribute holding the stylesheet URL template (`%ID%` placeholder)
pub const STYLESHEET_ATTR: &str = "data-obfuscation-stylesheet";

/// Codepoint → real character
pub type ObfuscationMap = HashMap<u32, char>;

/// Maps of every group referenced on one page
pub type PageMaps = HashMap<String, Arc<ObfuscationMap>>;

/// Built maps, kept for the life of the process.
///
/// A group's mapping is assumed stable, so entries are never invalidated;
/// [`ObfuscationCache::clear`] exists for test isolation.
#[derive(Default)]
pub struct ObfuscationCache {
    maps: RwLock<HashMap<String, Arc<ObfuscationMap>>>,
}

impl ObfuscationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, group: &str) -> Option<Arc<ObfuscationMap>> {
        let maps = self.maps.read().unwrap_or_else(|e| e.into_inner());
        maps.get(group).cloned()
    }

    /// Racing builders may overwrite each other with equivalent maps
    pub fn insert(&self, group: &str, map: Arc<ObfuscationMap>) {
        let mut maps = self.maps.write().unwrap_or_else(|e| e.into_inner());
        maps.insert(group.to_string(), map);
    }
}

/// Builds (and memoizes) obfuscation maps for groups
#[derive(Clone)]
pub struct MapBuilder {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn BlobStore>,
    cache: Arc<ObfuscationCache>,
    font_reader: Option<Arc<dyn FontGlyphReader>>,
    base_url: String,
}

impl MapBuilder {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn BlobStore>,
        cache: Arc<ObfuscationCache>,
        font_reader: Option<Arc<dyn FontGlyphReader>>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            store,
            cache,
            font_reader,
            base_url: base_url.into(),
        }
    }

    /// Map for one group: stylesheet rules first, font table as fallback.
    ///
    /// An empty map is a valid outcome; it is memoized like any other.
    pub fn build_map(&self, group: &str, css_template: Option<&str>) -> Arc<ObfuscationMap> {
        if let Some(map) = self.cache.get(group) {
            return map;
        }

        let mut map = css_template
            .and_then(|template| self.fetch_css(group, template))
            .map(|stylesheet| css::parse_css_map(&stylesheet))
            .unwrap_or_default();

        if map.is_empty() {
            map = self.font_map(group);
        }

        if map.is_empty() {
            info!("No obfuscation map recovered for group {}", group);
        } else {
            debug!("Obfuscation group {}: {} codepoints", group, map.len());
        }

        let map = Arc::new(map);
        self.cache.insert(group, Arc::clone(&map));
        map
    }

    /// Maps for every distinct group referenced in `document`
    pub fn collect_for_page(&self, document: &Html) -> PageMaps {
        let css_template = Selector::parse("body")
            .ok()
            .and_then(|selector| document.select(&selector).next())
            .and_then(|body| body.value().attr(STYLESHEET_ATTR))
            .filter(|template| !template.trim().is_empty());

        let mut groups = BTreeSet::new();
        if let Ok(selector) = Selector::parse("[data-obfuscation]") {
            for element in document.select(&selector) {
                if let Some(group) = element.value().attr(OBFUSCATION_ATTR).filter(|g| !g.is_empty()) {
                    groups.insert(group);
                }
            }
        }

        groups
            .into_iter()
            .map(|group| (group.to_string(), self.build_map(group, css_template)))
            .collect()
    }

    fn fetch_css(&self, group: &str, template: &str) -> Option<String> {
        let key = format!("{}.css", group);
        if let Some(stylesheet) = cache::get_text(self.store.as_ref(), CacheCategory::ObfuscationCss, &key) {
            return Some(stylesheet);
        }

        let url = abs_url(&self.base_url, &template.replace("%ID%", group));
        if url.is_empty() {
            return None;
        }
        let stylesheet = self
            .fetcher
            .fetch_text(&url, &RequestOptions::stylesheet(&self.base_url))?;
        cache::put_quietly(self.store.as_ref(), CacheCategory::ObfuscationCss, &key, stylesheet.as_bytes());
        Some(stylesheet)
    }

    fn fetch_font(&self, group: &str) -> Option<Vec<u8>> {
        let key = format!("{}.woff", group);
        if let Some(data) = cache::get_bytes(self.store.as_ref(), CacheCategory::ObfuscationFont, &key) {
            return Some(data);
        }

        let data = self
            .fetcher
            .fetch_bytes(&font_url(&self.base_url, group), &RequestOptions::font(&self.base_url))?;
        cache::put_quietly(self.store.as_ref(), CacheCategory::ObfuscationFont, &key, &data);
        Some(data)
    }

    fn font_map(&self, group: &str) -> ObfuscationMap {
        let Some(reader) = &self.font_reader else {
            return ObfuscationMap::new();
        };
        self.fetch_font(group)
            .and_then(|data| reader.glyph_names(&data))
            .map(|glyphs| font::map_from_glyphs(&glyphs))
            .unwrap_or_default()
    }
}
