#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::{Cursor, Write};

use ofdrender::sfnt::{
    build_cmap, build_head, build_hhea, build_hmtx, build_maxp, build_name, build_os2,
    build_post, serialize_sfnt, GlyphMapping,
};
use ofdrender::{FontSource, Reader};
use zip::write::SimpleFileOptions;

/// Pack files into an in-memory OFD archive.
pub fn build_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut archive = zip::ZipWriter::new(&mut cursor);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, data) in files {
            archive.start_file(*name, options).expect("start zip entry");
            archive.write_all(data).expect("write zip entry");
        }
        archive.finish().expect("finish zip");
    }
    cursor.into_inner()
}

pub const OFD_XML: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>",
    "<ofd:OFD xmlns:ofd=\"http://www.ofdspec.org/2016\" Version=\"1.1\" DocType=\"OFD\">",
    "<ofd:DocBody><ofd:DocRoot>Doc_0/Document.xml</ofd:DocRoot></ofd:DocBody></ofd:OFD>",
);

/// `Document.xml` with one page reference and optional extra CommonData
/// children (templates, resource pointers, a document-level PageArea).
pub fn document_xml(common_extra: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?><ofd:Document xmlns:ofd=\"http://www.ofdspec.org/2016\">\
         <ofd:CommonData><ofd:MaxUnitID>100</ofd:MaxUnitID>{}</ofd:CommonData>\
         <ofd:Pages><ofd:Page ID=\"1\" BaseLoc=\"Pages/Page_0/Content.xml\"/></ofd:Pages>\
         </ofd:Document>",
        common_extra
    )
}

/// A one-page archive: `OFD.xml`, `Doc_0/Document.xml` and the page
/// content, plus any extra entries.
pub fn one_page_archive(
    common_extra: &str,
    page_xml: &str,
    extra: &[(&str, &[u8])],
) -> Vec<u8> {
    let document = document_xml(common_extra);
    let mut files: Vec<(&str, &[u8])> = vec![
        ("OFD.xml", OFD_XML.as_bytes()),
        ("Doc_0/Document.xml", document.as_bytes()),
        ("Doc_0/Pages/Page_0/Content.xml", page_xml.as_bytes()),
    ];
    files.extend_from_slice(extra);
    build_archive(&files)
}

pub fn open_reader(data: Vec<u8>) -> Reader {
    Reader::from_bytes(data).expect("open archive")
}

/// A complete little TrueType font built from the crate's own table
/// synthesiser: identity cmap (code N -> glyph N) and uniform advances.
pub fn test_font(num_glyphs: u16, advance: u16) -> Vec<u8> {
    let mut mapping = GlyphMapping::new();
    for gid in 0..num_glyphs {
        mapping.insert(gid as u32, gid);
    }
    let widths = vec![advance; num_glyphs as usize];
    let mut tables: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    tables.insert("head".to_string(), build_head(1000));
    tables.insert("hhea".to_string(), build_hhea(num_glyphs));
    tables.insert("maxp".to_string(), build_maxp(num_glyphs));
    tables.insert("hmtx".to_string(), build_hmtx(&widths));
    tables.insert("OS/2".to_string(), build_os2(800, -200));
    tables.insert("cmap".to_string(), build_cmap(num_glyphs, Some(&mapping)));
    tables.insert("name".to_string(), build_name());
    tables.insert("post".to_string(), build_post());
    serialize_sfnt(&tables)
}

/// The same font with cmap and name stripped, as OFD producers subset
/// them; exercises the repair path on load.
pub fn test_font_without_cmap(num_glyphs: u16, advance: u16) -> Vec<u8> {
    let widths = vec![advance; num_glyphs as usize];
    let mut tables: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    tables.insert("head".to_string(), build_head(1000));
    tables.insert("hhea".to_string(), build_hhea(num_glyphs));
    tables.insert("maxp".to_string(), build_maxp(num_glyphs));
    tables.insert("hmtx".to_string(), build_hmtx(&widths));
    tables.insert("OS/2".to_string(), build_os2(800, -200));
    tables.insert("post".to_string(), build_post());
    serialize_sfnt(&tables)
}

/// In-memory font source answering every family-name query with the same
/// blob; stands in for system fonts in tests.
pub struct MemFonts(pub Vec<u8>);

impl FontSource for MemFonts {
    fn lookup(&self, _name: &str) -> Vec<Vec<u8>> {
        vec![self.0.clone()]
    }
}

// --- raw CFF fixture building ------------------------------------------
//
// Test dictionaries encode every integer in the 5-byte form so byte
// layouts stay deterministic and offsets can be computed in one pass.

pub fn cff_int(v: i32) -> Vec<u8> {
    let mut out = vec![29u8];
    out.extend_from_slice(&v.to_be_bytes());
    out
}

/// 0.5 in the CFF real-number nibble encoding.
pub fn cff_half() -> Vec<u8> {
    vec![30, 0x0A, 0x5F]
}

pub fn cff_zero_real() -> Vec<u8> {
    cff_int(0)
}

pub fn cff_op(op: u16) -> Vec<u8> {
    if op >= 1200 {
        vec![12, (op - 1200) as u8]
    } else {
        vec![op as u8]
    }
}

/// Single-byte-offset INDEX; total data must stay under 255 bytes.
pub fn cff_index(items: &[&[u8]]) -> Vec<u8> {
    let total: usize = items.iter().map(|i| i.len()).sum();
    assert!(total < 255, "test index too large");
    let mut out = Vec::new();
    out.extend_from_slice(&(items.len() as u16).to_be_bytes());
    out.push(1);
    let mut offset = 1u8;
    out.push(offset);
    for item in items {
        offset += item.len() as u8;
        out.push(offset);
    }
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

pub fn cff_empty_index() -> Vec<u8> {
    vec![0, 0]
}

/// Build a plain (non-CID) raw CFF: header, name, top dict, empty string
/// and gsubr indexes, then charset (format 0, SIDs for glyphs 1..), the
/// CharStrings INDEX and a Private DICT carrying width defaults.
pub fn build_plain_cff(
    charstrings: &[&[u8]],
    charset_sids: &[u16],
    strings: &[&[u8]],
    default_width: i32,
    nominal_width: i32,
) -> Vec<u8> {
    let header = [1u8, 0, 4, 4];
    let name_index = cff_index(&[b"Test"]);
    let string_index = if strings.is_empty() {
        cff_empty_index()
    } else {
        cff_index(strings)
    };
    let gsubr_index = cff_empty_index();
    let cs_index = cff_index(charstrings);
    let mut charset = Vec::new();
    if !charset_sids.is_empty() {
        charset.push(0u8);
        for sid in charset_sids {
            charset.extend_from_slice(&sid.to_be_bytes());
        }
    }
    let mut private = Vec::new();
    private.extend(cff_int(default_width));
    private.extend(cff_op(20));
    private.extend(cff_int(nominal_width));
    private.extend(cff_op(21));

    // top dict: CharStrings, Private, optionally charset; all ints 5 bytes
    let top_len = (5 + 1) + (5 + 5 + 1) + if charset.is_empty() { 0 } else { 5 + 1 };
    let prefix_len = header.len()
        + name_index.len()
        + (2 + 1 + 2 + top_len)
        + string_index.len()
        + gsubr_index.len();
    let charset_off = prefix_len;
    let cs_off = charset_off + charset.len();
    let priv_off = cs_off + cs_index.len();

    let mut top_dict = Vec::new();
    if !charset.is_empty() {
        top_dict.extend(cff_int(charset_off as i32));
        top_dict.extend(cff_op(15));
    }
    top_dict.extend(cff_int(cs_off as i32));
    top_dict.extend(cff_op(17));
    top_dict.extend(cff_int(private.len() as i32));
    top_dict.extend(cff_int(priv_off as i32));
    top_dict.extend(cff_op(18));
    assert_eq!(top_dict.len(), top_len);
    let top_index = cff_index(&[&top_dict]);

    let mut out = Vec::new();
    out.extend_from_slice(&header);
    out.extend_from_slice(&name_index);
    out.extend_from_slice(&top_index);
    out.extend_from_slice(&string_index);
    out.extend_from_slice(&gsubr_index);
    out.extend_from_slice(&charset);
    out.extend_from_slice(&cs_index);
    out.extend_from_slice(&private);
    out
}

/// Build a CID-keyed raw CFF with a single Font DICT. `font_matrix`
/// supplies the six Font DICT FontMatrix operands, already encoded.
pub fn build_cid_cff(charstrings: &[&[u8]], font_matrix: Option<&[Vec<u8>]>) -> Vec<u8> {
    let header = [1u8, 0, 4, 4];
    let name_index = cff_index(&[b"Test"]);
    let string_index = cff_empty_index();
    let gsubr_index = cff_empty_index();
    let cs_index = cff_index(charstrings);

    let mut private = Vec::new();
    private.extend(cff_int(500));
    private.extend(cff_op(20));

    // font dict: optional FontMatrix plus the Private pair
    let matrix_bytes: Vec<u8> = match font_matrix {
        Some(vals) => {
            let mut bytes = Vec::new();
            for val in vals {
                bytes.extend_from_slice(val);
            }
            bytes.extend(cff_op(1207));
            bytes
        }
        None => Vec::new(),
    };
    let font_dict_len = matrix_bytes.len() + (5 + 5 + 1);
    // top dict: ROS, CharStrings, FDArray; all ints 5 bytes
    let top_len = (5 + 5 + 5 + 2) + (5 + 1) + (5 + 2);
    let prefix_len = header.len()
        + name_index.len()
        + (2 + 1 + 2 + top_len)
        + string_index.len()
        + gsubr_index.len();
    let fd_array_off = prefix_len;
    let fd_index_len = 2 + 1 + 2 + font_dict_len;
    let cs_off = fd_array_off + fd_index_len;
    let priv_off = cs_off + cs_index.len();

    let mut font_dict = Vec::new();
    font_dict.extend_from_slice(&matrix_bytes);
    font_dict.extend(cff_int(private.len() as i32));
    font_dict.extend(cff_int(priv_off as i32));
    font_dict.extend(cff_op(18));
    assert_eq!(font_dict.len(), font_dict_len);
    let fd_index = cff_index(&[&font_dict]);
    assert_eq!(fd_index.len(), fd_index_len);

    let mut top_dict = Vec::new();
    top_dict.extend(cff_int(391));
    top_dict.extend(cff_int(392));
    top_dict.extend(cff_int(0));
    top_dict.extend(cff_op(1230));
    top_dict.extend(cff_int(cs_off as i32));
    top_dict.extend(cff_op(17));
    top_dict.extend(cff_int(fd_array_off as i32));
    top_dict.extend(cff_op(1236));
    assert_eq!(top_dict.len(), top_len);
    let top_index = cff_index(&[&top_dict]);

    let mut out = Vec::new();
    out.extend_from_slice(&header);
    out.extend_from_slice(&name_index);
    out.extend_from_slice(&top_index);
    out.extend_from_slice(&string_index);
    out.extend_from_slice(&gsubr_index);
    out.extend_from_slice(&fd_index);
    out.extend_from_slice(&cs_index);
    out.extend_from_slice(&private);
    out
}

/// Wrap DER tag/length/value.
pub fn der(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    if body.len() < 128 {
        out.push(body.len() as u8);
    } else {
        out.push(0x82);
        out.push((body.len() >> 8) as u8);
        out.push((body.len() & 0xFF) as u8);
    }
    out.extend_from_slice(body);
    out
}

/// A GB/T 38540-shaped signed value carrying one stamp image.
pub fn signed_value(kind: &str, image: &[u8]) -> Vec<u8> {
    let mut inner = Vec::new();
    inner.extend(der(0x0C, kind.as_bytes()));
    inner.extend(der(0x04, image));
    inner.extend(der(0x02, &[1]));
    inner.extend(der(0x02, &[2]));
    let seq = der(0x30, &inner);
    der(0x30, &seq)
}
