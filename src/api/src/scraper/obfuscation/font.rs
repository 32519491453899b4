//! Obfuscation maps from the per-group web font.
//!
//! The font's character-to-glyph table maps each private-use codepoint to a
//! glyph whose name usually spells the real character (`uni0037`, `a`).

use std::io::Read;

use flate2::read::ZlibDecoder;
use ttf_parser::cmap::Subtable;
use ttf_parser::{Face, PlatformId};

use super::ObfuscationMap;

/// Reads the best character-to-glyph table of a compact font.
///
/// Optional at runtime: without a reader the font strategy yields nothing.
pub trait FontGlyphReader: Send + Sync {
    /// `(codepoint, glyph name)` pairs, `None` if the font can't be read
    fn glyph_names(&self, font_data: &[u8]) -> Option<Vec<(u32, Option<String>)>>;
}

/// TrueType/OpenType reader, WOFF 1.0 containers included
pub struct TtfGlyphReader;

impl FontGlyphReader for TtfGlyphReader {
    fn glyph_names(&self, font_data: &[u8]) -> Option<Vec<(u32, Option<String>)>> {
        let sfnt = if font_data.starts_with(WOFF_SIGNATURE) {
            sfnt_from_woff(font_data)?
        } else {
            font_data.to_vec()
        };

        let face = Face::parse(&sfnt, 0).ok()?;
        let cmap = face.tables().cmap?;
        let best = cmap
            .subtables
            .into_iter()
            .filter_map(|subtable| subtable_rank(&subtable).map(|rank| (rank, subtable)))
            .min_by_key(|(rank, _)| *rank)
            .map(|(_, subtable)| subtable)?;

        let mut glyphs = Vec::new();
        best.codepoints(|codepoint| {
            if let Some(glyph) = best.glyph_index(codepoint) {
                glyphs.push((codepoint, face.glyph_name(glyph).map(str::to_string)));
            }
        });
        glyphs.sort_by_key(|(codepoint, _)| *codepoint);
        glyphs.dedup_by_key(|(codepoint, _)| *codepoint);

        Some(glyphs)
    }
}

/// Preference order: full Unicode, Unicode platform, BMP
fn subtable_rank(subtable: &Subtable) -> Option<u8> {
    match (subtable.platform_id, subtable.encoding_id) {
        (PlatformId::Windows, 10) => Some(0),
        (PlatformId::Unicode, _) => Some(1),
        (PlatformId::Windows, 1) => Some(2),
        _ => None,
    }
}

/// Turn glyph names into real characters.
///
/// `uniXXXX` decodes to that codepoint, a one-character name is used as is,
/// anything else leaves the source codepoint unchanged.
pub fn map_from_glyphs(glyphs: &[(u32, Option<String>)]) -> ObfuscationMap {
    let mut map = ObfuscationMap::new();

    for (codepoint, name) in glyphs {
        let name = name.as_deref().unwrap_or("");
        let ch = uni_name_char(name)
            .or_else(|| single_char(name))
            .or_else(|| char::from_u32(*codepoint));
        if let Some(ch) = ch {
            map.insert(*codepoint, ch);
        }
    }

    map
}

fn uni_name_char(name: &str) -> Option<char> {
    let hex = name.strip_prefix("uni")?;
    if hex.len() != 4 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
}

fn single_char(name: &str) -> Option<char> {
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

const WOFF_SIGNATURE: &[u8] = b"wOFF";
const WOFF_HEADER_LEN: usize = 44;
const WOFF_ENTRY_LEN: usize = 20;

fn be_u16(data: &[u8], at: usize) -> Option<u16> {
    let b = data.get(at..at + 2)?;
    Some(u16::from_be_bytes([b[0], b[1]]))
}

fn be_u32(data: &[u8], at: usize) -> Option<u32> {
    let b = data.get(at..at + 4)?;
    Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

/// Reassemble a WOFF 1.0 container into a plain sfnt font.
pub(crate) fn sfnt_from_woff(data: &[u8]) -> Option<Vec<u8>> {
    if !data.starts_with(WOFF_SIGNATURE) {
        return None;
    }
    let flavor = be_u32(data, 4)?;
    let num_tables = be_u16(data, 12)?;

    let mut tables = Vec::with_capacity(num_tables as usize);
    for i in 0..num_tables as usize {
        let entry = WOFF_HEADER_LEN + i * WOFF_ENTRY_LEN;
        let tag = be_u32(data, entry)?;
        let offset = be_u32(data, entry + 4)? as usize;
        let comp_length = be_u32(data, entry + 8)? as usize;
        let orig_length = be_u32(data, entry + 12)? as usize;
        let checksum = be_u32(data, entry + 16)?;

        let raw = data.get(offset..offset.checked_add(comp_length)?)?;
        let table = if comp_length < orig_length {
            let mut inflated = Vec::with_capacity(orig_length.min(comp_length.saturating_mul(16)));
            ZlibDecoder::new(raw)
                .take(orig_length as u64 + 1)
                .read_to_end(&mut inflated)
                .ok()?;
            if inflated.len() != orig_length {
                return None;
            }
            inflated
        } else {
            raw.to_vec()
        };
        tables.push((tag, checksum, table));
    }

    let entry_selector = 15 - num_tables.max(1).leading_zeros() as u16;
    let search_range = (1u16 << entry_selector).saturating_mul(16);
    let range_shift = num_tables.saturating_mul(16).saturating_sub(search_range);

    let mut sfnt = Vec::new();
    sfnt.extend_from_slice(&flavor.to_be_bytes());
    sfnt.extend_from_slice(&num_tables.to_be_bytes());
    sfnt.extend_from_slice(&search_range.to_be_bytes());
    sfnt.extend_from_slice(&entry_selector.to_be_bytes());
    sfnt.extend_from_slice(&range_shift.to_be_bytes());

    let mut offset = 12 + 16 * tables.len();
    for (tag, checksum, table) in &tables {
        sfnt.extend_from_slice(&tag.to_be_bytes());
        sfnt.extend_from_slice(&checksum.to_be_bytes());
        sfnt.extend_from_slice(&(offset as u32).to_be_bytes());
        sfnt.extend_from_slice(&(table.len() as u32).to_be_bytes());
        offset += (table.len() + 3) & !3;
    }
    for (_, _, table) in &tables {
        sfnt.extend_from_slice(table);
        sfnt.resize((sfnt.len() + 3) & !3, 0);
    }

    Some(sfnt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_map_from_glyph_names() {
        let glyphs = vec![
            (0xE001, Some("uni0037".to_string())),
            (0xE002, Some("k".to_string())),
            (0xE003, Some("period".to_string())),
            (0xE004, None),
            (0xE005, Some("uniZZZZ".to_string())),
        ];
        let map = map_from_glyphs(&glyphs);
        assert_eq!(map.get(&0xE001), Some(&'7'));
        assert_eq!(map.get(&0xE002), Some(&'k'));
        // Unknown names keep the source codepoint
        assert_eq!(map.get(&0xE003), Some(&'\u{e003}'));
        assert_eq!(map.get(&0xE004), Some(&'\u{e004}'));
        assert_eq!(map.get(&0xE005), Some(&'\u{e005}'));
    }

    fn woff_with(tables: &[(&[u8; 4], Vec<u8>, bool)]) -> Vec<u8> {
        let mut header = vec![0u8; WOFF_HEADER_LEN];
        header[0..4].copy_from_slice(WOFF_SIGNATURE);
        header[4..8].copy_from_slice(&0x0001_0000u32.to_be_bytes());
        header[12..14].copy_from_slice(&(tables.len() as u16).to_be_bytes());

        let mut directory = Vec::new();
        let mut body = Vec::new();
        let data_start = WOFF_HEADER_LEN + WOFF_ENTRY_LEN * tables.len();
        for (tag, table, compress) in tables {
            let packed = if *compress {
                let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
                enc.write_all(table).unwrap();
                Some(enc.finish().unwrap())
            } else {
                None
            };
            // Tables that don't shrink are stored as is
            let stored = packed.filter(|packed| packed.len() < table.len()).unwrap_or_else(|| table.clone());
            directory.extend_from_slice(*tag);
            directory.extend_from_slice(&((data_start + body.len()) as u32).to_be_bytes());
            directory.extend_from_slice(&(stored.len() as u32).to_be_bytes());
            directory.extend_from_slice(&(table.len() as u32).to_be_bytes());
            directory.extend_from_slice(&0u32.to_be_bytes());
            body.extend_from_slice(&stored);
        }

        [header, directory, body].concat()
    }

    #[test]
    fn test_sfnt_from_woff() {
        let plain = b"abcde".to_vec();
        let packed = vec![7u8; 64];
        let woff = woff_with(&[(b"aaaa", plain.clone(), false), (b"bbbb", packed.clone(), true)]);

        let sfnt = sfnt_from_woff(&woff).unwrap();
        assert_eq!(be_u32(&sfnt, 0), Some(0x0001_0000));
        assert_eq!(be_u16(&sfnt, 4), Some(2));
        // searchRange / entrySelector / rangeShift for two tables
        assert_eq!(be_u16(&sfnt, 6), Some(32));
        assert_eq!(be_u16(&sfnt, 8), Some(1));
        assert_eq!(be_u16(&sfnt, 10), Some(0));

        let first_offset = be_u32(&sfnt, 12 + 8).unwrap() as usize;
        assert_eq!(first_offset, 12 + 32);
        assert_eq!(&sfnt[first_offset..first_offset + 5], b"abcde");

        let second_offset = be_u32(&sfnt, 12 + 16 + 8).unwrap() as usize;
        assert_eq!(second_offset % 4, 0);
        assert_eq!(&sfnt[second_offset..second_offset + 64], &packed[..]);
    }

    #[test]
    fn test_truncated_woff() {
        let mut woff = woff_with(&[(b"aaaa", b"abcd".to_vec(), false)]);
        woff.truncate(WOFF_HEADER_LEN + 4);
        assert!(sfnt_from_woff(&woff).is_none());
        assert!(sfnt_from_woff(b"OTTO").is_none());
    }

    fn be16(out: &mut Vec<u8>, values: &[u16]) {
        for v in values {
            out.extend_from_slice(&v.to_be_bytes());
        }
    }

    fn be32(out: &mut Vec<u8>, values: &[u32]) {
        for v in values {
            out.extend_from_slice(&v.to_be_bytes());
        }
    }

    /// Tables of a three-glyph TrueType font: `.notdef`, `uni0037` at
    /// U+E001 and `k` at U+E002. A BMP subtable mapping `A` sits next to
    /// the full Unicode one.
    fn sample_tables() -> Vec<(&'static [u8; 4], Vec<u8>)> {
        let mut cmap = Vec::new();
        be16(&mut cmap, &[0, 2]);
        be16(&mut cmap, &[3, 1]);
        be32(&mut cmap, &[20]);
        be16(&mut cmap, &[3, 10]);
        be32(&mut cmap, &[32]);
        // format 6: 'A' -> glyph 1
        be16(&mut cmap, &[6, 12, 0, 0x41, 1, 1]);
        // format 12: two single-codepoint groups
        be16(&mut cmap, &[12, 0]);
        be32(&mut cmap, &[40, 0, 2, 0xE001, 0xE001, 1, 0xE002, 0xE002, 2]);

        let mut head = Vec::new();
        be32(&mut head, &[0x0001_0000, 0x0001_0000, 0, 0x5F0F_3CF5]);
        be16(&mut head, &[0, 1000]);
        head.extend_from_slice(&[0; 16]);
        be16(&mut head, &[0, 0, 1000, 1000, 0, 8, 2, 0, 0]);

        let mut hhea = Vec::new();
        be32(&mut hhea, &[0x0001_0000]);
        be16(&mut hhea, &[800, (-200i16) as u16, 0]);
        hhea.extend_from_slice(&[0; 22]);
        be16(&mut hhea, &[0, 1]);

        let mut hmtx = Vec::new();
        be16(&mut hmtx, &[500, 0, 0, 0]);

        let mut maxp = Vec::new();
        be32(&mut maxp, &[0x0000_5000]);
        be16(&mut maxp, &[3]);

        let mut post = Vec::new();
        be32(&mut post, &[0x0002_0000]);
        post.extend_from_slice(&[0; 28]);
        be16(&mut post, &[3, 0, 258, 259]);
        for name in ["uni0037", "k"] {
            post.push(name.len() as u8);
            post.extend_from_slice(name.as_bytes());
        }

        vec![
            (b"cmap", cmap),
            (b"glyf", Vec::new()),
            (b"head", head),
            (b"hhea", hhea),
            (b"hmtx", hmtx),
            (b"loca", vec![0; 8]),
            (b"maxp", maxp),
            (b"post", post),
        ]
    }

    fn sfnt_with(tables: &[(&'static [u8; 4], Vec<u8>)]) -> Vec<u8> {
        let mut font = Vec::new();
        be32(&mut font, &[0x0001_0000]);
        be16(&mut font, &[tables.len() as u16, 128, 3, 0]);

        let mut offset = 12 + 16 * tables.len();
        let mut body = Vec::new();
        for (tag, table) in tables {
            font.extend_from_slice(*tag);
            be32(&mut font, &[0, offset as u32, table.len() as u32]);
            body.extend_from_slice(table);
            body.resize((body.len() + 3) & !3, 0);
            offset = 12 + 16 * tables.len() + body.len();
        }
        font.extend_from_slice(&body);
        font
    }

    #[test]
    fn test_reader_on_truetype_font() {
        let glyphs = TtfGlyphReader.glyph_names(&sfnt_with(&sample_tables())).unwrap();
        assert_eq!(
            glyphs,
            vec![(0xE001, Some("uni0037".to_string())), (0xE002, Some("k".to_string()))]
        );

        let map = map_from_glyphs(&glyphs);
        assert_eq!(map.get(&0xE001), Some(&'7'));
        assert_eq!(map.get(&0xE002), Some(&'k'));
        assert!(!map.contains_key(&0x41));
    }

    #[test]
    fn test_reader_on_woff_font() {
        let tables = sample_tables();
        let woff_tables: Vec<_> = tables.iter().map(|(tag, table)| (*tag, table.clone(), true)).collect();

        let from_woff = TtfGlyphReader.glyph_names(&woff_with(&woff_tables));
        let from_sfnt = TtfGlyphReader.glyph_names(&sfnt_with(&tables));
        assert!(from_woff.is_some());
        assert_eq!(from_woff, from_sfnt);
    }

    #[test]
    fn test_woff_length_mismatch() {
        let mut woff = woff_with(&[(b"aaaa", vec![7u8; 64], true)]);
        // Claim a longer table than the stream inflates to
        let orig_length = WOFF_HEADER_LEN + 12;
        woff[orig_length..orig_length + 4].copy_from_slice(&u32::MAX.to_be_bytes());
        assert!(sfnt_from_woff(&woff).is_none());
    }

    #[test]
    fn test_reader_rejects_garbage() {
        assert!(TtfGlyphReader.glyph_names(b"not a font").is_none());
        assert!(TtfGlyphReader.glyph_names(b"wOFF").is_none());
    }
}
