//! Turn obfuscated DOM fragments back into plain text.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use scraper::{ElementRef, Html};

use super::{ObfuscationMap, PageMaps, OBFUSCATION_ATTR};

/// Rendered for references the map can't resolve
pub const PLACEHOLDER: char = '?';

static ENTITY_HEX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#x([0-9A-Fa-f]{4,6});").expect("valid regex"));

fn is_private_use(c: char) -> bool {
    ('\u{e000}'..='\u{f8ff}').contains(&c)
}

/// Decode every text node of `fragment`.
///
/// A text node is translated with the map of its nearest ancestor carrying
/// `data-obfuscation` (the search stops at `<body>`); nodes without a group,
/// or whose group map is empty, pass through unchanged. The result has
/// whitespace runs collapsed and ends trimmed.
pub fn decode(fragment: ElementRef<'_>, maps: &PageMaps) -> String {
    let mut out = String::new();

    for node in fragment.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let group = node
            .ancestors()
            .filter_map(|ancestor| ancestor.value().as_element())
            .take_while(|element| !matches!(element.name(), "html" | "body"))
            .find_map(|element| element.attr(OBFUSCATION_ATTR).filter(|g| !g.is_empty()));
        let map = group
            .and_then(|group| maps.get(group))
            .filter(|map| !map.is_empty());
        match map {
            Some(map) => out.push_str(&decode_text(text, map)),
            None => out.push_str(text),
        }
    }

    collapse_whitespace(&out)
}

/// Decode one raw text run with a known map
pub fn decode_text(raw: &str, map: &ObfuscationMap) -> String {
    let resolved = ENTITY_HEX_RE.replace_all(raw, |caps: &Captures| {
        u32::from_str_radix(&caps[1], 16)
            .ok()
            .and_then(|codepoint| map.get(&codepoint).copied())
            .unwrap_or_else(|| {
                tracing::debug!("no mapping for &#x{};", &caps[1]);
                PLACEHOLDER
            })
            .to_string()
    });

    let mapped: String = resolved
        .chars()
        .map(|c| {
            if is_private_use(c) {
                map.get(&(c as u32)).copied().unwrap_or(c)
            } else {
                c
            }
        })
        .collect();

    if mapped.contains(['<', '&']) {
        strip_markup(&mapped)
    } else {
        collapse_whitespace(&mapped)
    }
}

/// Text content of an HTML snippet, entities decoded
fn strip_markup(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let text = fragment
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    collapse_whitespace(&text)
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Selector;
    use std::sync::Arc;

    fn page_maps() -> PageMaps {
        let map: ObfuscationMap = [(0xE001, '1'), (0xE002, '5'), (0xE003, '3'), (0xE004, '0')]
            .into_iter()
            .collect();
        let mut maps = PageMaps::new();
        maps.insert("g1".to_string(), Arc::new(map));
        maps.insert("empty".to_string(), Arc::new(ObfuscationMap::new()));
        maps
    }

    fn decode_first(html: &str, selector: &str, maps: &PageMaps) -> String {
        let document = Html::parse_document(html);
        let selector = Selector::parse(selector).unwrap();
        let element = document.select(&selector).next().unwrap();
        decode(element, maps)
    }

    #[test]
    fn test_decode_private_use_chars() {
        let html = r#"<html><body><div class="date"><span data-obfuscation="g1">&#xE001;&#xE002;:&#xE003;&#xE004;</span>  Uhr</div></body></html>"#;
        assert_eq!(decode_first(html, ".date", &page_maps()), "15:30 Uhr");
    }

    #[test]
    fn test_group_marker_outside_fragment() {
        let html = r#"<div data-obfuscation="g1"><p><span class="score">&#xE001; : &#xE004;</span></p></div>"#;
        assert_eq!(decode_first(html, ".score", &page_maps()), "1 : 0");
    }

    #[test]
    fn test_literal_references() {
        // Double-escaped references survive HTML parsing as literal text
        let html = r#"<span data-obfuscation="g1">&amp;#xE002;&amp;#xE0FF;</span>"#;
        assert_eq!(decode_first(html, "span", &page_maps()), "5?");
    }

    #[test]
    fn test_unmapped_private_use_passes_through() {
        let html = "<span data-obfuscation=\"g1\">\u{e001}\u{e0aa}</span>";
        assert_eq!(decode_first(html, "span", &page_maps()), "1\u{e0aa}");
    }

    #[test]
    fn test_empty_map_is_noop() {
        let html = "<span data-obfuscation=\"empty\">\u{e001}\u{e002}</span>";
        assert_eq!(decode_first(html, "span", &page_maps()), "\u{e001}\u{e002}");
    }

    #[test]
    fn test_unknown_group_and_body_marker_ignored() {
        let html = "<html><body data-obfuscation=\"g1\"><p>\u{e001} x</p><i data-obfuscation=\"nope\">\u{e002}</i></body></html>";
        assert_eq!(decode_first(html, "p", &page_maps()), "\u{e001} x");
        assert_eq!(decode_first(html, "i", &page_maps()), "\u{e002}");
    }

    #[test]
    fn test_decode_is_idempotent() {
        let html = r#"<div id="d"><b data-obfuscation="g1">&#xE001;&#xE004;</b> Tore,   <i>zwei</i></div>"#;
        let maps = page_maps();
        let once = decode_first(html, "#d", &maps);
        assert_eq!(once, "10 Tore, zwei");

        let again = decode_first(&format!("<div id=\"d\">{}</div>", once), "#d", &maps);
        assert_eq!(again, once);
    }

    #[test]
    fn test_decode_text_strips_markup() {
        let map: ObfuscationMap = [(0xE001, '<')].into_iter().collect();
        assert_eq!(decode_text("a <b>bold</b> &amp; c", &map), "a bold & c");
        assert_eq!(decode_text("  x \n y ", &map), "x y");
    }
}
