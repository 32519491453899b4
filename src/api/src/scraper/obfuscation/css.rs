//! Obfuscation maps from the per-group stylesheet.
//!
//! Two rule shapes carry the mapping:
//! `.cE001::before { content: "7" }` and `[data-c="E001"]::before { content: "7" }`.

use std::sync::LazyLock;

use regex::Regex;

use super::ObfuscationMap;

static CLASS_RULE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\.c([0-9A-Fa-f]{4,6})::?before\s*\{[^}]*content\s*:\s*['"](.*?)['"]"#)
        .expect("valid regex")
});

static DATA_ATTR_RULE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"data-c=["']([0-9A-Fa-f]{4,6})["'][^{]*\{[^}]*content\s*:\s*["'](.*?)["']"#)
        .expect("valid regex")
});

/// Build a codepoint → character map from stylesheet text.
///
/// Only the first character of a `content` value counts.
pub fn parse_css_map(css: &str) -> ObfuscationMap {
    let mut map = ObfuscationMap::new();

    for re in [&*CLASS_RULE_RE, &*DATA_ATTR_RULE_RE] {
        for caps in re.captures_iter(css) {
            let Ok(codepoint) = u32::from_str_radix(&caps[1], 16) else {
                continue;
            };
            if let Some(ch) = first_content_char(&caps[2]) {
                map.insert(codepoint, ch);
            }
        }
    }

    map
}

/// First character of a CSS string value, resolving a leading `\XXXX` escape
fn first_content_char(value: &str) -> Option<char> {
    let Some(rest) = value.strip_prefix('\\') else {
        return value.chars().next();
    };

    let hex: String = rest
        .chars()
        .take_while(|c| c.is_ascii_hexdigit())
        .take(6)
        .collect();
    if hex.is_empty() {
        return rest.chars().next();
    }
    u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32)
}
