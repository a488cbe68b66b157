//! Synthesis of the sfnt tables a strict OpenType consumer requires.
//!
//! Embedded OFD fonts are routinely subsetted down to a bare `glyf`/`CFF`
//! payload. This module rebuilds the missing `head`, `hhea`, `maxp`,
//! `OS/2`, `cmap`, `hmtx`, `name` and `post` tables with conservative
//! metrics and re-serialises the font with correct offsets, per-table
//! checksums and `checkSumAdjustment`.

use std::collections::BTreeMap;

pub const REQUIRED_TABLES: [&str; 8] = [
    "head", "hhea", "maxp", "hmtx", "OS/2", "cmap", "name", "post",
];

/// Glyph-id keyed by code point; BTreeMap keeps cmap segments ordered.
pub type GlyphMapping = BTreeMap<u32, u16>;

pub fn align4(n: usize) -> usize {
    (n + 3) & !3
}

/// Big-endian sum of 32-bit words; a trailing partial word is left-aligned.
pub fn table_checksum(data: &[u8]) -> u32 {
    let mut sum = 0u32;
    let mut i = 0;
    while i < data.len() {
        let mut word = 0u32;
        for j in 0..4 {
            if i + j < data.len() {
                word |= (data[i + j] as u32) << (24 - 8 * j as u32);
            }
        }
        sum = sum.wrapping_add(word);
        i += 4;
    }
    sum
}

pub fn build_head(units_per_em: u16) -> Vec<u8> {
    let mut buf = Vec::with_capacity(54);
    buf.extend_from_slice(&1u16.to_be_bytes());
    buf.extend_from_slice(&0u16.to_be_bytes());
    buf.extend_from_slice(&0u32.to_be_bytes()); // fontRevision
    buf.extend_from_slice(&0u32.to_be_bytes()); // checkSumAdjustment, patched later
    buf.extend_from_slice(&0x5F0F3CF5u32.to_be_bytes());
    buf.extend_from_slice(&0u16.to_be_bytes()); // flags
    buf.extend_from_slice(&units_per_em.to_be_bytes());
    buf.extend_from_slice(&0i64.to_be_bytes()); // created
    buf.extend_from_slice(&0i64.to_be_bytes()); // modified
    buf.extend_from_slice(&0i16.to_be_bytes()); // xMin
    buf.extend_from_slice(&(-500i16).to_be_bytes()); // yMin
    buf.extend_from_slice(&1000i16.to_be_bytes()); // xMax
    buf.extend_from_slice(&1000i16.to_be_bytes()); // yMax
    buf.extend_from_slice(&0u16.to_be_bytes()); // macStyle
    buf.extend_from_slice(&0u16.to_be_bytes()); // lowestRecPPEM
    buf.extend_from_slice(&2i16.to_be_bytes()); // fontDirectionHint
    buf.extend_from_slice(&0i16.to_be_bytes()); // indexToLocFormat: short
    buf.extend_from_slice(&0i16.to_be_bytes()); // glyphDataFormat
    buf
}

pub fn build_hhea(num_glyphs: u16) -> Vec<u8> {
    let mut buf = Vec::with_capacity(36);
    buf.extend_from_slice(&1u16.to_be_bytes());
    buf.extend_from_slice(&0u16.to_be_bytes());
    buf.extend_from_slice(&800i16.to_be_bytes()); // ascender
    buf.extend_from_slice(&(-200i16).to_be_bytes()); // descender
    buf.extend_from_slice(&0i16.to_be_bytes()); // lineGap
    buf.extend_from_slice(&1000u16.to_be_bytes()); // advanceWidthMax
    buf.extend_from_slice(&0i16.to_be_bytes()); // minLeftSideBearing
    buf.extend_from_slice(&0i16.to_be_bytes()); // minRightSideBearing
    buf.extend_from_slice(&1000i16.to_be_bytes()); // xMaxExtent
    for _ in 0..8 {
        buf.extend_from_slice(&0i16.to_be_bytes());
    }
    buf.extend_from_slice(&num_glyphs.to_be_bytes()); // numberOfHMetrics
    buf
}

pub fn build_maxp(num_glyphs: u16) -> Vec<u8> {
    let mut buf = Vec::with_capacity(6);
    buf.extend_from_slice(&0x0000_5000u32.to_be_bytes()); // version 0.5
    buf.extend_from_slice(&num_glyphs.to_be_bytes());
    buf
}

pub fn build_os2(ascender: i16, descender: i16) -> Vec<u8> {
    let mut buf = Vec::with_capacity(96);
    buf.extend_from_slice(&3u16.to_be_bytes()); // version
    buf.extend_from_slice(&500i16.to_be_bytes()); // xAvgCharWidth
    buf.extend_from_slice(&400u16.to_be_bytes()); // usWeightClass
    buf.extend_from_slice(&5u16.to_be_bytes()); // usWidthClass
    buf.extend_from_slice(&0u16.to_be_bytes()); // fsType
    for v in [250i16, 250, 0, 0, 250, 250, 0, 0, 50, 250, 0] {
        buf.extend_from_slice(&v.to_be_bytes());
    }
    buf.extend_from_slice(&[0u8; 10]); // panose
    for _ in 0..4 {
        buf.extend_from_slice(&0u32.to_be_bytes()); // ulUnicodeRange
    }
    buf.extend_from_slice(b"PfEd"); // achVendID
    buf.extend_from_slice(&0x0040u16.to_be_bytes()); // fsSelection: regular
    buf.extend_from_slice(&0u16.to_be_bytes()); // usFirstCharIndex
    buf.extend_from_slice(&255u16.to_be_bytes()); // usLastCharIndex
    buf.extend_from_slice(&ascender.to_be_bytes()); // sTypoAscender
    buf.extend_from_slice(&descender.to_be_bytes()); // sTypoDescender
    buf.extend_from_slice(&0i16.to_be_bytes()); // sTypoLineGap
    buf.extend_from_slice(&(ascender as u16).to_be_bytes()); // usWinAscent
    let win_descent = if descender < 0 {
        (-descender) as u16
    } else {
        descender as u16
    };
    buf.extend_from_slice(&win_descent.to_be_bytes());
    buf.extend_from_slice(&0u32.to_be_bytes()); // ulCodePageRange1
    buf.extend_from_slice(&0u32.to_be_bytes()); // ulCodePageRange2
    buf.extend_from_slice(&0i16.to_be_bytes()); // sxHeight
    buf.extend_from_slice(&0i16.to_be_bytes()); // sCapHeight
    buf.extend_from_slice(&0u16.to_be_bytes()); // usDefaultChar
    buf.extend_from_slice(&0u16.to_be_bytes()); // usBreakChar
    buf.extend_from_slice(&0u16.to_be_bytes()); // usMaxContext
    buf
}

/// Minimal empty name table.
pub fn build_name() -> Vec<u8> {
    let mut buf = Vec::with_capacity(6);
    buf.extend_from_slice(&0u16.to_be_bytes());
    buf.extend_from_slice(&0u16.to_be_bytes());
    buf.extend_from_slice(&6u16.to_be_bytes());
    buf
}

/// post version 3.0: no glyph names.
pub fn build_post() -> Vec<u8> {
    let mut buf = Vec::with_capacity(32);
    buf.extend_from_slice(&0x0003_0000u32.to_be_bytes());
    buf.extend_from_slice(&0u32.to_be_bytes()); // italicAngle
    buf.extend_from_slice(&0i16.to_be_bytes()); // underlinePosition
    buf.extend_from_slice(&0i16.to_be_bytes()); // underlineThickness
    for _ in 0..5 {
        buf.extend_from_slice(&0u32.to_be_bytes());
    }
    buf
}

pub fn build_hmtx(widths: &[u16]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(widths.len() * 4);
    for w in widths {
        buf.extend_from_slice(&w.to_be_bytes());
        buf.extend_from_slice(&0i16.to_be_bytes()); // left side bearing
    }
    buf
}

struct CmapSegment {
    start: u16,
    end: u16,
    delta: i16,
}

/// Format-4 Microsoft Unicode cmap. With no mapping, a single segment maps
/// every code in `0..num_glyphs` to the glyph of the same index.
pub fn build_cmap(num_glyphs: u16, mapping: Option<&GlyphMapping>) -> Vec<u8> {
    let mut segs: Vec<CmapSegment> = Vec::new();
    match mapping {
        None => {
            let end = if num_glyphs > 0 { num_glyphs - 1 } else { 0xFFFF };
            segs.push(CmapSegment {
                start: 0,
                end,
                delta: 0,
            });
        }
        Some(mapping) => {
            let codes: Vec<u32> = mapping.keys().copied().filter(|c| *c <= 0xFFFF).collect();
            if !codes.is_empty() {
                let mut start = codes[0];
                let mut prev = start;
                for &curr in &codes[1..] {
                    if curr != prev + 1 {
                        segs.push(CmapSegment {
                            start: start as u16,
                            end: prev as u16,
                            delta: 0,
                        });
                        start = curr;
                    }
                    prev = curr;
                }
                segs.push(CmapSegment {
                    start: start as u16,
                    end: prev as u16,
                    delta: 0,
                });
            }
        }
    }
    segs.push(CmapSegment {
        start: 0xFFFF,
        end: 0xFFFF,
        delta: 1,
    });

    let seg_count = segs.len() as u16;
    let mut search_range = 1u16;
    let mut entry_selector = 0u16;
    while search_range * 2 <= seg_count {
        search_range *= 2;
        entry_selector += 1;
    }
    search_range *= 2;
    let range_shift = seg_count * 2 - search_range;

    let mut sub = Vec::new();
    sub.extend_from_slice(&4u16.to_be_bytes()); // format
    sub.extend_from_slice(&0u16.to_be_bytes()); // length, patched below
    sub.extend_from_slice(&0u16.to_be_bytes()); // language
    sub.extend_from_slice(&(seg_count * 2).to_be_bytes());
    sub.extend_from_slice(&search_range.to_be_bytes());
    sub.extend_from_slice(&entry_selector.to_be_bytes());
    sub.extend_from_slice(&range_shift.to_be_bytes());

    let mut end_counts = Vec::new();
    let mut start_counts = Vec::new();
    let mut id_deltas: Vec<i16> = Vec::new();
    let mut id_range_offsets: Vec<u16> = Vec::new();
    let mut glyph_ids: Vec<u16> = Vec::new();
    for seg in &segs {
        end_counts.push(seg.end);
        start_counts.push(seg.start);
        let Some(mapping) = mapping else {
            id_deltas.push(seg.delta);
            id_range_offsets.push(0);
            continue;
        };
        if seg.start == 0xFFFF {
            id_deltas.push(1);
            id_range_offsets.push(0);
            continue;
        }
        id_deltas.push(0);
        let current_glyph_idx = glyph_ids.len();
        for code in seg.start as u32..=seg.end as u32 {
            glyph_ids.push(mapping.get(&code).copied().unwrap_or(0));
        }
        // Offset is measured from this idRangeOffset slot to the glyph-id
        // array entry for the segment start.
        let offset = (seg_count as usize - id_range_offsets.len() - 1) * 2
            + 2
            + current_glyph_idx * 2;
        id_range_offsets.push(offset as u16);
    }
    for v in &end_counts {
        sub.extend_from_slice(&v.to_be_bytes());
    }
    sub.extend_from_slice(&0u16.to_be_bytes()); // reservedPad
    for v in &start_counts {
        sub.extend_from_slice(&v.to_be_bytes());
    }
    for v in &id_deltas {
        sub.extend_from_slice(&v.to_be_bytes());
    }
    for v in &id_range_offsets {
        sub.extend_from_slice(&v.to_be_bytes());
    }
    for v in &glyph_ids {
        sub.extend_from_slice(&v.to_be_bytes());
    }
    let sub_len = sub.len() as u16;
    sub[2..4].copy_from_slice(&sub_len.to_be_bytes());

    let mut buf = Vec::with_capacity(12 + sub.len());
    buf.extend_from_slice(&0u16.to_be_bytes()); // table version
    buf.extend_from_slice(&1u16.to_be_bytes()); // one sub-table
    buf.extend_from_slice(&3u16.to_be_bytes()); // platform: Microsoft
    buf.extend_from_slice(&1u16.to_be_bytes()); // encoding: Unicode BMP
    buf.extend_from_slice(&12u32.to_be_bytes());
    buf.extend_from_slice(&sub);
    buf
}

/// Serialise a table set as an sfnt. The magic is `OTTO` when a `CFF `
/// table is present, the TrueType version tag otherwise. Tables are laid
/// out sorted by tag and padded to 4 bytes; `head.checkSumAdjustment` is
/// patched last.
pub fn serialize_sfnt(tables: &BTreeMap<String, Vec<u8>>) -> Vec<u8> {
    let num_tables = tables.len() as u16;
    let mut entry_selector = 0u16;
    while 1usize << (entry_selector + 1) <= num_tables as usize {
        entry_selector += 1;
    }
    let search_range = 1u16 << (entry_selector + 4);
    let range_shift = num_tables * 16 - search_range;

    let mut buf = Vec::new();
    if tables.contains_key("CFF ") {
        buf.extend_from_slice(b"OTTO");
    } else {
        buf.extend_from_slice(&0x0001_0000u32.to_be_bytes());
    }
    buf.extend_from_slice(&num_tables.to_be_bytes());
    buf.extend_from_slice(&search_range.to_be_bytes());
    buf.extend_from_slice(&entry_selector.to_be_bytes());
    buf.extend_from_slice(&range_shift.to_be_bytes());

    struct Record {
        tag: [u8; 4],
        checksum: u32,
        offset: usize,
        length: usize,
        padded: Vec<u8>,
    }
    let header_size = 12 + 16 * tables.len();
    let mut offset = header_size;
    let mut records = Vec::with_capacity(tables.len());
    for (tag, data) in tables {
        let mut padded = data.clone();
        padded.resize(align4(data.len()), 0);
        let mut tag_bytes = [b' '; 4];
        for (i, b) in tag.bytes().take(4).enumerate() {
            tag_bytes[i] = b;
        }
        records.push(Record {
            tag: tag_bytes,
            checksum: table_checksum(&padded),
            offset,
            length: data.len(),
            padded,
        });
        offset += records.last().map(|r| r.padded.len()).unwrap_or(0);
    }
    for rec in &records {
        buf.extend_from_slice(&rec.tag);
        buf.extend_from_slice(&rec.checksum.to_be_bytes());
        buf.extend_from_slice(&(rec.offset as u32).to_be_bytes());
        buf.extend_from_slice(&(rec.length as u32).to_be_bytes());
    }
    for rec in &records {
        buf.extend_from_slice(&rec.padded);
    }
    for rec in &records {
        if &rec.tag == b"head" {
            let adj = rec.offset + 8;
            if adj + 4 <= buf.len() {
                buf[adj..adj + 4].copy_from_slice(&0u32.to_be_bytes());
                let sum = table_checksum(&buf);
                let adjustment = 0xB1B0_AFBAu32.wrapping_sub(sum);
                buf[adj..adj + 4].copy_from_slice(&adjustment.to_be_bytes());
            }
            break;
        }
    }
    buf
}

/// Outcome of a repair attempt.
pub struct Repair {
    pub rewrote: bool,
    pub data: Vec<u8>,
    /// Code point -> glyph id, when a mapping had to be synthesised or
    /// recovered.
    pub mapping: Option<GlyphMapping>,
    pub cmap_missing: bool,
}

impl Repair {
    pub(crate) fn unchanged(data: &[u8]) -> Repair {
        Repair {
            rewrote: false,
            data: data.to_vec(),
            mapping: None,
            cmap_missing: false,
        }
    }
}

fn read_u16(data: &[u8], pos: usize) -> u16 {
    if pos + 2 > data.len() {
        return 0;
    }
    u16::from_be_bytes([data[pos], data[pos + 1]])
}

fn read_u32(data: &[u8], pos: usize) -> u32 {
    if pos + 4 > data.len() {
        return 0;
    }
    u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}

/// Does the cmap table carry a Unicode (platform 0) or Microsoft
/// (platform 3) sub-table?
pub fn has_usable_cmap(data: &[u8]) -> bool {
    if data.len() < 4 {
        return false;
    }
    let num_tables = read_u16(data, 2);
    let mut pos = 4;
    for _ in 0..num_tables {
        if pos + 8 > data.len() {
            break;
        }
        let platform = read_u16(data, pos);
        if platform == 0 || platform == 3 {
            return true;
        }
        pos += 8;
    }
    false
}

/// Repair a TrueType/OpenType sfnt in place: index the table directory,
/// synthesise whichever required tables are missing (treating a cmap with
/// no Unicode sub-table as missing) and re-serialise. A structurally
/// complete font passes through untouched.
pub fn repair_truetype(data: &[u8], fix_cmap: bool, fix_name: bool) -> Repair {
    if data.len() < 12 {
        return Repair::unchanged(data);
    }
    let num_tables = read_u16(data, 4);
    let mut existing: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    let mut pos = 12;
    for _ in 0..num_tables {
        if data.len() < pos + 16 {
            break;
        }
        let tag = String::from_utf8_lossy(&data[pos..pos + 4]).to_string();
        let offset = read_u32(data, pos + 8) as usize;
        let length = read_u32(data, pos + 12) as usize;
        if offset + length <= data.len() {
            existing.insert(tag, data[offset..offset + length].to_vec());
        }
        pos += 16;
    }
    let mut cmap_missing = !existing.contains_key("cmap");
    if !cmap_missing && !has_usable_cmap(&existing["cmap"]) {
        cmap_missing = true;
    }
    let missing_any = cmap_missing
        || REQUIRED_TABLES
            .iter()
            .any(|tag| !existing.contains_key(*tag));
    if !missing_any {
        return Repair::unchanged(data);
    }

    let mut tables = existing.clone();
    let mut num_glyphs = existing
        .get("maxp")
        .map(|maxp| read_u16(maxp, 4))
        .unwrap_or(0);
    if num_glyphs == 0 {
        num_glyphs = 255;
    }
    if !tables.contains_key("head") {
        tables.insert("head".to_string(), build_head(1000));
    }
    if !tables.contains_key("maxp") {
        tables.insert("maxp".to_string(), build_maxp(num_glyphs));
    }
    if !tables.contains_key("hhea") {
        tables.insert("hhea".to_string(), build_hhea(num_glyphs));
    }
    if !tables.contains_key("hmtx") {
        let widths = vec![500u16; num_glyphs as usize];
        tables.insert("hmtx".to_string(), build_hmtx(&widths));
    }
    let (mut ascender, mut descender) = (800i16, -200i16);
    if let Some(hhea) = tables.get("hhea") {
        if hhea.len() >= 10 {
            ascender = read_u16(hhea, 4) as i16;
            descender = read_u16(hhea, 6) as i16;
        }
    }
    if !tables.contains_key("OS/2") {
        tables.insert("OS/2".to_string(), build_os2(ascender, descender));
    }
    let mut mapping = None;
    if cmap_missing && fix_cmap {
        // Identity stop-gap so Index-keyed text keeps addressing glyphs.
        let mut ident = GlyphMapping::new();
        for gid in 0..num_glyphs {
            ident.insert(gid as u32, gid);
        }
        tables.insert("cmap".to_string(), build_cmap(num_glyphs, Some(&ident)));
        mapping = Some(ident);
    }
    if !tables.contains_key("name") && fix_name {
        tables.insert("name".to_string(), build_name());
    }
    if !tables.contains_key("post") {
        tables.insert("post".to_string(), build_post());
    }
    Repair {
        rewrote: true,
        data: serialize_sfnt(&tables),
        mapping,
        cmap_missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_left_aligns_tail() {
        assert_eq!(table_checksum(&[0, 0, 0, 1]), 1);
        assert_eq!(table_checksum(&[0x80]), 0x8000_0000);
        assert_eq!(table_checksum(&[0, 0, 0, 1, 0, 0, 0, 2]), 3);
    }

    #[test]
    fn test_os2_negative_descender_positive_windescent() {
        let os2 = build_os2(800, -200);
        // usWinDescent sits right after usWinAscent.
        let win_descent = u16::from_be_bytes([os2[76], os2[77]]);
        assert_eq!(win_descent, 200);
    }

    #[test]
    fn test_serialized_font_checksum_adjustment() {
        let mut tables = BTreeMap::new();
        tables.insert("head".to_string(), build_head(1000));
        tables.insert("maxp".to_string(), build_maxp(2));
        tables.insert("hhea".to_string(), build_hhea(2));
        let font = serialize_sfnt(&tables);
        let mut zeroed = font.clone();
        // locate head to zero checkSumAdjustment
        let num = u16::from_be_bytes([font[4], font[5]]) as usize;
        let mut head_off = None;
        for i in 0..num {
            let rec = 12 + i * 16;
            if &font[rec..rec + 4] == b"head" {
                head_off = Some(u32::from_be_bytes([
                    font[rec + 8],
                    font[rec + 9],
                    font[rec + 10],
                    font[rec + 11],
                ]) as usize);
            }
        }
        let head_off = head_off.expect("head present");
        zeroed[head_off + 8..head_off + 12].copy_from_slice(&[0; 4]);
        let sum = table_checksum(&zeroed);
        let adj = u32::from_be_bytes([
            font[head_off + 8],
            font[head_off + 9],
            font[head_off + 10],
            font[head_off + 11],
        ]);
        assert_eq!(adj, 0xB1B0_AFBAu32.wrapping_sub(sum));
    }

    #[test]
    fn test_repair_leaves_complete_font_alone() {
        let mut tables = BTreeMap::new();
        tables.insert("head".to_string(), build_head(1000));
        tables.insert("hhea".to_string(), build_hhea(3));
        tables.insert("maxp".to_string(), build_maxp(3));
        tables.insert("hmtx".to_string(), build_hmtx(&[500, 500, 500]));
        tables.insert("OS/2".to_string(), build_os2(800, -200));
        tables.insert("cmap".to_string(), build_cmap(3, None));
        tables.insert("name".to_string(), build_name());
        tables.insert("post".to_string(), build_post());
        let font = serialize_sfnt(&tables);
        let repair = repair_truetype(&font, true, true);
        assert!(!repair.rewrote);
        assert_eq!(repair.data, font);
    }

    #[test]
    fn test_repair_synthesizes_identity_cmap() {
        let mut tables = BTreeMap::new();
        tables.insert("maxp".to_string(), build_maxp(4));
        let font = serialize_sfnt(&tables);
        let repair = repair_truetype(&font, true, true);
        assert!(repair.rewrote);
        assert!(repair.cmap_missing);
        let mapping = repair.mapping.expect("identity mapping");
        assert_eq!(mapping.len(), 4);
        assert_eq!(mapping.get(&2), Some(&2));
        // all eight required tables now present
        let num = u16::from_be_bytes([repair.data[4], repair.data[5]]) as usize;
        let mut tags = Vec::new();
        for i in 0..num {
            let rec = 12 + i * 16;
            tags.push(String::from_utf8_lossy(&repair.data[rec..rec + 4]).to_string());
        }
        for tag in REQUIRED_TABLES {
            assert!(tags.iter().any(|t| t == tag), "missing {}", tag);
        }
    }
}
