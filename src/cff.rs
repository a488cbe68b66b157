//! Raw-CFF handling: sanitise a bare CFF blob (flattening single-FD CID
//! fonts and composing FontMatrix values), recover glyph count, advance
//! widths and a Unicode mapping, and wrap the result into an `OTTO` sfnt.
//!
//! Offsets inside a CFF are absolute file positions, so rewriting the Top
//! DICT means re-encoding it, recomputing where `CharStrings` and the
//! Private DICT land, and re-encoding again if the first pass changed the
//! Top DICT's byte length.

use std::collections::BTreeMap;
use std::fmt;

use crate::sfnt::{
    build_cmap, build_head, build_hhea, build_hmtx, build_maxp, build_name, build_os2,
    build_post, serialize_sfnt, GlyphMapping,
};

#[derive(Debug)]
pub enum CffError {
    Truncated,
    Unsupported(String),
    Malformed(String),
}

impl fmt::Display for CffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CffError::Truncated => write!(f, "cff data truncated"),
            CffError::Unsupported(msg) => write!(f, "unsupported cff: {}", msg),
            CffError::Malformed(msg) => write!(f, "malformed cff: {}", msg),
        }
    }
}

impl std::error::Error for CffError {}

/// Top/Private DICT contents: operator -> operand list. Escaped operators
/// `(12, n)` are keyed as `1200 + n`.
type CffDict = BTreeMap<i32, Vec<f64>>;

const OP_CHARSET: i32 = 15;
const OP_ENCODING: i32 = 16;
const OP_CHARSTRINGS: i32 = 17;
const OP_PRIVATE: i32 = 18;
const OP_SUBRS: i32 = 19;
const OP_DEFAULT_WIDTH_X: i32 = 20;
const OP_NOMINAL_WIDTH_X: i32 = 21;
const OP_FONT_MATRIX: i32 = 1207;
const OP_ROS: i32 = 1230;
const OP_CID_FONT_VERSION: i32 = 1231;
const OP_CID_COUNT: i32 = 1234;
const OP_FD_ARRAY: i32 = 1236;
const OP_FD_SELECT: i32 = 1237;

/// Wrap a raw CFF into an OpenType font plus the recovered code-point
/// mapping.
pub fn wrap_cff_to_otf(data: &[u8]) -> Result<(Vec<u8>, Option<GlyphMapping>), CffError> {
    let sanitized = sanitize_cff(data)?;
    let num_glyphs = count_glyphs(&sanitized)?;
    let widths = parse_widths(&sanitized, num_glyphs)
        .unwrap_or_else(|_| vec![500u16; num_glyphs]);
    let mut units_per_em = 1000u16;
    if sanitized.len() > 4 {
        let hdr_size = sanitized[2] as usize;
        let (_, name_sz) = index_count(&sanitized, hdr_size);
        if let (Some(top_dict_data), _) = index_first_item(&sanitized, hdr_size + name_sz) {
            let td = parse_dict(top_dict_data);
            if let Some(mat) = td.get(&OP_FONT_MATRIX) {
                if !mat.is_empty() && mat[0] != 0.0 {
                    let val = 1.0 / mat[0];
                    if val > 0.0 {
                        units_per_em = val.round() as u16;
                    }
                }
            }
        }
    }
    let mapping = cmap_from_cff(&sanitized, num_glyphs);
    let mut tables: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    tables.insert("CFF ".to_string(), sanitized);
    tables.insert("head".to_string(), build_head(units_per_em));
    tables.insert("hhea".to_string(), build_hhea(num_glyphs as u16));
    tables.insert("maxp".to_string(), build_maxp(num_glyphs as u16));
    tables.insert("OS/2".to_string(), build_os2(800, -200));
    tables.insert("name".to_string(), build_name());
    tables.insert("post".to_string(), build_post());
    tables.insert("hmtx".to_string(), build_hmtx(&widths));
    tables.insert(
        "cmap".to_string(),
        build_cmap(num_glyphs as u16, mapping.as_ref()),
    );
    Ok((serialize_sfnt(&tables), mapping))
}

/// Flatten a CID-keyed CFF into a plain single-font CFF and fold the Font
/// DICT's FontMatrix into the Top DICT. Non-CID fonts pass through as-is.
pub fn sanitize_cff(data: &[u8]) -> Result<Vec<u8>, CffError> {
    if data.len() < 4 {
        return Err(CffError::Truncated);
    }
    let hdr_size = data[2] as usize;
    let mut offset = hdr_size;
    if offset >= data.len() {
        return Err(CffError::Truncated);
    }
    let (name_count, name_sz) = index_count(data, offset);
    if name_count != 1 {
        return Err(CffError::Unsupported("multi-font cff".to_string()));
    }
    let name_index = data[offset..offset + name_sz].to_vec();
    offset += name_sz;
    if offset >= data.len() {
        return Err(CffError::Truncated);
    }
    let (top_count, top_sz) = index_count(data, offset);
    if top_count != 1 {
        return Err(CffError::Malformed("top dict count != 1".to_string()));
    }
    let (top_dict_data, _) = index_first_item(data, offset);
    let top_dict_data = top_dict_data.ok_or(CffError::Truncated)?;
    offset += top_sz;
    if offset >= data.len() {
        return Err(CffError::Truncated);
    }
    let (_, str_sz) = index_count(data, offset);
    let string_index = data[offset..offset + str_sz].to_vec();
    offset += str_sz;
    if offset >= data.len() {
        return Err(CffError::Truncated);
    }
    let (_, gsubr_sz) = index_count(data, offset);
    let gsubr_index = data[offset..offset + gsubr_sz].to_vec();

    let mut top_dict = parse_dict(top_dict_data);
    if !top_dict.contains_key(&OP_ROS) {
        return Ok(data.to_vec());
    }
    let fd_array_off = top_dict
        .get(&OP_FD_ARRAY)
        .and_then(|v| v.first())
        .copied()
        .ok_or_else(|| CffError::Malformed("cid without fdarray".to_string()))?
        as usize;
    if fd_array_off >= data.len() {
        return Err(CffError::Malformed("fdarray offset out of bounds".to_string()));
    }
    let (fd_count, _) = index_count(data, fd_array_off);
    if fd_count != 1 {
        return Err(CffError::Unsupported(format!(
            "complex cid (fdarray count={})",
            fd_count
        )));
    }
    let (font_dict_data, _) = index_first_item(data, fd_array_off);
    let font_dict = parse_dict(font_dict_data.unwrap_or(&[]));
    if let Some(fd_mat) = font_dict.get(&OP_FONT_MATRIX) {
        if fd_mat.len() == 6 {
            let top_mat = match top_dict.get(&OP_FONT_MATRIX) {
                Some(m) if m.len() == 6 => [m[0], m[1], m[2], m[3], m[4], m[5]],
                _ => [0.001, 0.0, 0.0, 0.001, 0.0, 0.0],
            };
            let fd = [fd_mat[0], fd_mat[1], fd_mat[2], fd_mat[3], fd_mat[4], fd_mat[5]];
            top_dict.insert(OP_FONT_MATRIX, multiply_affine(top_mat, fd).to_vec());
        }
    }
    let priv_vals = font_dict
        .get(&OP_PRIVATE)
        .filter(|v| v.len() == 2)
        .cloned()
        .unwrap_or_else(|| vec![0.0, 0.0]);
    let priv_size = priv_vals[0] as usize;
    let priv_off = priv_vals[1] as usize;
    let mut priv_dict_data: &[u8] = &[];
    if priv_size > 0 && priv_off < data.len() && priv_off + priv_size <= data.len() {
        priv_dict_data = &data[priv_off..priv_off + priv_size];
    }
    let mut subrs_rel = 0usize;
    if !priv_dict_data.is_empty() {
        let p_dict = parse_dict(priv_dict_data);
        if let Some(vals) = p_dict.get(&OP_SUBRS) {
            if let Some(v) = vals.first() {
                subrs_rel = *v as usize;
            }
        }
    }
    let mut local_subr_data: &[u8] = &[];
    if subrs_rel > 0 {
        let subrs_abs = priv_off + subrs_rel;
        if subrs_abs < data.len() {
            let (_, sub_sz) = index_count(data, subrs_abs);
            if subrs_abs + sub_sz <= data.len() {
                local_subr_data = &data[subrs_abs..subrs_abs + sub_sz];
            }
        }
    }
    let charstrings_off = top_dict
        .get(&OP_CHARSTRINGS)
        .and_then(|v| v.first())
        .copied()
        .ok_or_else(|| CffError::Malformed("missing charstrings".to_string()))?
        as usize;
    if charstrings_off >= data.len() {
        return Err(CffError::Malformed("charstrings offset out of bounds".to_string()));
    }
    let (_, charstr_sz) = index_count(data, charstrings_off);
    if charstrings_off + charstr_sz > data.len() {
        return Err(CffError::Truncated);
    }
    let charstrings = &data[charstrings_off..charstrings_off + charstr_sz];

    top_dict.remove(&OP_ROS);
    top_dict.remove(&OP_FD_ARRAY);
    top_dict.remove(&OP_FD_SELECT);
    top_dict.remove(&OP_CID_FONT_VERSION);
    top_dict.remove(&OP_CID_COUNT);
    top_dict.remove(&OP_CHARSET);
    top_dict.remove(&OP_ENCODING);
    top_dict.insert(OP_PRIVATE, vec![priv_size as f64, 0.0]);

    // First pass sizes the rewritten Top DICT with placeholder offsets.
    let mut dummy = top_dict.clone();
    dummy.insert(OP_CHARSTRINGS, vec![0.0]);
    dummy.insert(OP_PRIVATE, vec![priv_size as f64, 0.0]);
    let dummy_top = encode_dict(&dummy);
    let top_idx_size = 2 + 1 + 8 + dummy_top.len();
    let data_start =
        hdr_size + name_index.len() + top_idx_size + string_index.len() + gsubr_index.len();
    let mut charstrings_pos = data_start;
    let mut private_pos = charstrings_pos + charstrings.len();
    let mut private_len = priv_size;
    let mut final_priv = Vec::new();
    if !priv_dict_data.is_empty() {
        let mut p_dict = parse_dict(priv_dict_data);
        if p_dict.contains_key(&OP_SUBRS) || !local_subr_data.is_empty() {
            p_dict.insert(OP_SUBRS, vec![private_len as f64]);
        }
        final_priv = encode_dict(&p_dict);
        private_len = final_priv.len();
    }
    top_dict.insert(OP_CHARSTRINGS, vec![charstrings_pos as f64]);
    top_dict.insert(OP_PRIVATE, vec![private_len as f64, private_pos as f64]);
    let mut final_top = encode_dict(&top_dict);
    let mut top_index = encode_index(&[&final_top]);

    let mut out = Vec::new();
    out.extend_from_slice(&data[..hdr_size]);
    out.extend_from_slice(&name_index);
    out.extend_from_slice(&top_index);
    out.extend_from_slice(&string_index);
    out.extend_from_slice(&gsubr_index);
    if out.len() != data_start {
        // The Top DICT encoded to a different length than predicted;
        // relocate once against the actual prefix length.
        let diff = out.len() as i64 - data_start as i64;
        charstrings_pos = (charstrings_pos as i64 + diff) as usize;
        private_pos = (private_pos as i64 + diff) as usize;
        top_dict.insert(OP_CHARSTRINGS, vec![charstrings_pos as f64]);
        top_dict.insert(OP_PRIVATE, vec![private_len as f64, private_pos as f64]);
        final_top = encode_dict(&top_dict);
        top_index = encode_index(&[&final_top]);
        out.clear();
        out.extend_from_slice(&data[..hdr_size]);
        out.extend_from_slice(&name_index);
        out.extend_from_slice(&top_index);
        out.extend_from_slice(&string_index);
        out.extend_from_slice(&gsubr_index);
    }
    out.extend_from_slice(charstrings);
    out.extend_from_slice(&final_priv);
    if !local_subr_data.is_empty() {
        out.extend_from_slice(local_subr_data);
    }
    Ok(out)
}

/// Number of glyphs: the `CharStrings` INDEX count.
pub fn count_glyphs(data: &[u8]) -> Result<usize, CffError> {
    if data.len() < 4 {
        return Err(CffError::Truncated);
    }
    let hdr_size = data[2] as usize;
    let mut offset = hdr_size;
    if offset >= data.len() {
        return Err(CffError::Truncated);
    }
    let (count, sz) = index_count(data, offset);
    if count != 1 {
        return Err(CffError::Unsupported("multi-font cff".to_string()));
    }
    offset += sz;
    if offset >= data.len() {
        return Err(CffError::Truncated);
    }
    let (count, _) = index_count(data, offset);
    if count != 1 {
        return Err(CffError::Malformed("top dict count mismatch".to_string()));
    }
    if let (Some(top_dict_data), _) = index_first_item(data, offset) {
        let dict = parse_dict(top_dict_data);
        if let Some(vals) = dict.get(&OP_CHARSTRINGS) {
            if let Some(v) = vals.first() {
                let charstr_off = *v as usize;
                if charstr_off > 0 && charstr_off < data.len() {
                    let (count, _) = index_count(data, charstr_off);
                    return Ok(count);
                }
            }
        }
    }
    Err(CffError::Malformed("failed to parse top dict".to_string()))
}

/// 2x3 affine composition in CFF FontMatrix layout.
fn multiply_affine(a: [f64; 6], b: [f64; 6]) -> [f64; 6] {
    [
        a[0] * b[0] + a[2] * b[1],
        a[1] * b[0] + a[3] * b[1],
        a[0] * b[2] + a[2] * b[3],
        a[1] * b[2] + a[3] * b[3],
        a[0] * b[4] + a[2] * b[5] + a[4],
        a[1] * b[4] + a[3] * b[5] + a[5],
    ]
}

fn parse_dict(data: &[u8]) -> CffDict {
    let mut dict = CffDict::new();
    let mut operands: Vec<f64> = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let b = data[i];
        i += 1;
        if b <= 27 {
            let mut op = b as i32;
            if b == 12 {
                if i >= data.len() {
                    break;
                }
                op = 1200 + data[i] as i32;
                i += 1;
            }
            dict.insert(op, std::mem::take(&mut operands));
        } else if b == 28 {
            if i + 1 < data.len() {
                let val = i16::from_be_bytes([data[i], data[i + 1]]);
                operands.push(val as f64);
                i += 2;
            }
        } else if b == 29 {
            if i + 3 < data.len() {
                let val =
                    i32::from_be_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
                operands.push(val as f64);
                i += 4;
            }
        } else if b == 30 {
            let (text, used) = parse_real(&data[i..]);
            if let Ok(f) = text.parse::<f64>() {
                operands.push(f);
            }
            i += used;
        } else if (32..=246).contains(&b) {
            operands.push(b as f64 - 139.0);
        } else if (247..=250).contains(&b) {
            if i < data.len() {
                let b1 = data[i] as i32;
                i += 1;
                operands.push(((b as i32 - 247) * 256 + b1 + 108) as f64);
            }
        } else if (251..=254).contains(&b) {
            if i < data.len() {
                let b1 = data[i] as i32;
                i += 1;
                operands.push((-(b as i32 - 251) * 256 - b1 - 108) as f64);
            }
        }
    }
    dict
}

/// Real-number nibble stream: digits, `.`, exponents and minus, terminated
/// by `0xF`.
fn parse_real(data: &[u8]) -> (String, usize) {
    let mut out = String::new();
    let mut i = 0;
    let mut done = false;
    while i < data.len() && !done {
        let b = data[i];
        i += 1;
        for nibble in [b >> 4, b & 0x0F] {
            match nibble {
                0xF => {
                    done = true;
                    break;
                }
                0..=9 => out.push((b'0' + nibble) as char),
                0xA => out.push('.'),
                0xB => out.push('E'),
                0xC => out.push_str("E-"),
                0xE => out.push('-'),
                _ => {}
            }
        }
    }
    (out, i)
}

fn encode_dict(dict: &CffDict) -> Vec<u8> {
    let mut buf = Vec::new();
    for (op, vals) in dict {
        for val in vals {
            encode_number(&mut buf, *val);
        }
        if *op >= 1200 {
            buf.push(12);
            buf.push((*op - 1200) as u8);
        } else {
            buf.push(*op as u8);
        }
    }
    buf
}

fn encode_number(buf: &mut Vec<u8>, val: f64) {
    if val == val.trunc() && val >= i32::MIN as f64 && val <= i32::MAX as f64 {
        let iv = val as i64;
        if (-107..=107).contains(&iv) {
            buf.push((iv + 139) as u8);
        } else if (108..=1131).contains(&iv) {
            let v = iv - 108;
            buf.push(((v >> 8) + 247) as u8);
            buf.push((v & 0xFF) as u8);
        } else if (-1131..=-108).contains(&iv) {
            let v = -iv - 108;
            buf.push(((v >> 8) + 251) as u8);
            buf.push((v & 0xFF) as u8);
        } else if (-32768..=32767).contains(&iv) {
            buf.push(28);
            buf.extend_from_slice(&(iv as i16).to_be_bytes());
        } else {
            buf.push(29);
            buf.extend_from_slice(&(iv as i32).to_be_bytes());
        }
    } else {
        let text = format!("{}", val);
        buf.push(30);
        let mut nibbles: Vec<u8> = Vec::with_capacity(text.len() + 2);
        for ch in text.chars() {
            let n = match ch {
                '0'..='9' => ch as u8 - b'0',
                '.' => 0xA,
                'E' | 'e' => 0xB,
                '-' => 0xE,
                _ => continue,
            };
            nibbles.push(n);
        }
        nibbles.push(0xF);
        if nibbles.len() % 2 != 0 {
            nibbles.push(0xF);
        }
        for pair in nibbles.chunks(2) {
            let mut b = pair[0] << 4;
            if pair.len() > 1 {
                b |= pair[1];
            }
            buf.push(b);
        }
    }
}

fn encode_index(items: &[&[u8]]) -> Vec<u8> {
    let count = items.len();
    let mut buf = Vec::new();
    buf.extend_from_slice(&(count as u16).to_be_bytes());
    if count == 0 {
        return buf;
    }
    let total: usize = items.iter().map(|i| i.len()).sum();
    let off_size: usize = if total + 1 > 0xFF_FFFF {
        4
    } else if total + 1 > 0xFFFF {
        3
    } else if total + 1 > 0xFF {
        2
    } else {
        1
    };
    buf.push(off_size as u8);
    let mut offset = 1usize;
    put_offset(&mut buf, offset, off_size);
    for item in items {
        offset += item.len();
        put_offset(&mut buf, offset, off_size);
    }
    for item in items {
        buf.extend_from_slice(item);
    }
    buf
}

fn put_offset(buf: &mut Vec<u8>, val: usize, size: usize) {
    let bytes = (val as u32).to_be_bytes();
    buf.extend_from_slice(&bytes[4 - size..]);
}

/// INDEX structure at `offset`: `(item count, total byte size)`. Returns
/// `(0, 0)` on any structural problem.
fn index_count(data: &[u8], offset: usize) -> (usize, usize) {
    if offset + 2 > data.len() {
        return (0, 0);
    }
    let count = u16::from_be_bytes([data[offset], data[offset + 1]]) as usize;
    if count == 0 {
        return (0, 2);
    }
    if offset + 3 > data.len() {
        return (0, 0);
    }
    let off_size = data[offset + 2] as usize;
    if !(1..=4).contains(&off_size) {
        return (0, 0);
    }
    let offsets_len = (count + 1) * off_size;
    if offset + 3 + offsets_len > data.len() {
        return (0, 0);
    }
    let end_offset_pos = offset + 3 + count * off_size;
    if end_offset_pos + off_size > data.len() {
        return (0, 0);
    }
    let data_end = read_offset(data, end_offset_pos, off_size);
    if data_end < 1 {
        return (0, 0);
    }
    (count, 3 + (count + 1) * off_size + (data_end - 1))
}

/// First item of the INDEX at `offset`, with the INDEX's total size.
fn index_first_item(data: &[u8], offset: usize) -> (Option<&[u8]>, usize) {
    let (count, size) = index_count(data, offset);
    if count == 0 {
        return (None, size);
    }
    if offset + 3 > data.len() {
        return (None, size);
    }
    let off_size = data[offset + 2] as usize;
    if offset + 3 + off_size * 2 > data.len() {
        return (None, size);
    }
    let off0 = read_offset(data, offset + 3, off_size);
    let off1 = read_offset(data, offset + 3 + off_size, off_size);
    let data_start = offset + 3 + (count + 1) * off_size;
    let start = data_start + off0 - 1;
    if off1 < off0 {
        return (None, size);
    }
    let length = off1 - off0;
    if start + length > data.len() {
        return (None, size);
    }
    (Some(&data[start..start + length]), size)
}

fn read_offset(data: &[u8], pos: usize, size: usize) -> usize {
    let mut val = 0usize;
    for i in 0..size {
        if pos + i < data.len() {
            val = (val << 8) | data[pos + i] as usize;
        }
    }
    val
}

/// Recover per-glyph advance widths by scanning each Type-2 CharString for
/// a leading width operand, without interpreting drawing commands.
pub fn parse_widths(data: &[u8], num_glyphs: usize) -> Result<Vec<u16>, CffError> {
    if data.len() < 4 {
        return Err(CffError::Truncated);
    }
    let hdr_size = data[2] as usize;
    let mut offset = hdr_size;
    let (_, sz) = index_count(data, offset);
    offset += sz;
    let (top_dict_data, _) = index_first_item(data, offset);
    let top_dict_data = top_dict_data.ok_or_else(|| {
        CffError::Malformed("failed to read top dict".to_string())
    })?;
    let top_dict = parse_dict(top_dict_data);

    let mut nominal_width_x = 0.0;
    let mut default_width_x = 0.0;
    if let Some(vals) = top_dict.get(&OP_PRIVATE) {
        if vals.len() == 2 {
            let priv_size = vals[0] as usize;
            let priv_off = vals[1] as usize;
            if priv_size > 0 && priv_off + priv_size <= data.len() {
                let priv_dict = parse_dict(&data[priv_off..priv_off + priv_size]);
                if let Some(v) = priv_dict.get(&OP_DEFAULT_WIDTH_X).and_then(|v| v.first()) {
                    default_width_x = *v;
                }
                if let Some(v) = priv_dict.get(&OP_NOMINAL_WIDTH_X).and_then(|v| v.first()) {
                    nominal_width_x = *v;
                }
            }
        }
    }
    let charstr_off = top_dict
        .get(&OP_CHARSTRINGS)
        .and_then(|v| v.first())
        .copied()
        .ok_or_else(|| CffError::Malformed("no charstrings".to_string()))?
        as usize;
    let (count, _) = index_count(data, charstr_off);
    if count == 0 || charstr_off + 3 > data.len() {
        return Err(CffError::Malformed("no charstrings".to_string()));
    }
    let limit = count.min(num_glyphs);
    let mut widths = vec![default_width_x as u16; num_glyphs];
    let off_size = data[charstr_off + 2] as usize;
    if !(1..=4).contains(&off_size) {
        return Err(CffError::Malformed("bad charstrings offsize".to_string()));
    }
    let data_start_base = charstr_off + 3 + (count + 1) * off_size;
    for (i, width) in widths.iter_mut().enumerate().take(limit) {
        let p1 = charstr_off + 3 + i * off_size;
        let p2 = p1 + off_size;
        let off1 = read_offset(data, p1, off_size);
        let off2 = read_offset(data, p2, off_size);
        if off2 < off1 {
            continue;
        }
        let start = data_start_base + off1 - 1;
        let length = off2 - off1;
        if start + length > data.len() {
            continue;
        }
        let cs = &data[start..start + length];
        *width = scan_charstring_width(cs, nominal_width_x, default_width_x) as u16;
    }
    Ok(widths)
}

/// Decode just enough of a Type-2 CharString to decide whether a width
/// operand precedes the first stack-clearing operator: odd operand depth
/// there means `nominal + first`, even means the default width.
pub fn scan_charstring_width(data: &[u8], nominal: f64, default: f64) -> f64 {
    let mut stack_depth = 0usize;
    let mut first_val = 0.0;
    let mut i = 0;
    while i < data.len() {
        let b = data[i];
        if b <= 31 {
            if b == 28 {
                i += 3;
                stack_depth += 1;
                if stack_depth == 1 && i >= 3 {
                    first_val = parse_short_int(data, i - 3);
                }
            } else if b == 29 {
                i += 5;
                stack_depth += 1;
            } else if b == 12 {
                if stack_depth % 2 != 0 {
                    return nominal + first_val;
                }
                return default;
            } else {
                // hstem/vstem families, masks, moveto ops, endchar: all
                // clear the stack, all decide the width here.
                if stack_depth % 2 != 0 {
                    return nominal + first_val;
                }
                return default;
            }
        } else {
            stack_depth += 1;
            if stack_depth == 1 {
                first_val = parse_number_type2(data, i);
            }
            if (32..=246).contains(&b) {
                i += 1;
            } else if (247..=254).contains(&b) {
                i += 2;
            } else if b == 255 {
                i += 5;
            } else {
                i += 1;
            }
        }
    }
    default
}

fn parse_short_int(data: &[u8], idx: usize) -> f64 {
    if idx + 3 > data.len() {
        return 0.0;
    }
    i16::from_be_bytes([data[idx + 1], data[idx + 2]]) as f64
}

fn parse_number_type2(data: &[u8], idx: usize) -> f64 {
    let b = data[idx];
    if (32..=246).contains(&b) {
        return b as f64 - 139.0;
    }
    if (247..=250).contains(&b) {
        if idx + 1 < data.len() {
            return ((b as i32 - 247) * 256 + data[idx + 1] as i32 + 108) as f64;
        }
        return 0.0;
    }
    if (251..=254).contains(&b) {
        if idx + 1 < data.len() {
            return (-(b as i32 - 251) * 256 - data[idx + 1] as i32 - 108) as f64;
        }
        return 0.0;
    }
    if b == 28 {
        return parse_short_int(data, idx);
    }
    if b == 255 && idx + 5 <= data.len() {
        let int_part = i16::from_be_bytes([data[idx + 1], data[idx + 2]]) as f64;
        let frac = u16::from_be_bytes([data[idx + 3], data[idx + 4]]) as f64 / 65536.0;
        return int_part + frac;
    }
    0.0
}

/// Recover `code point -> glyph id` by walking the charset's SIDs and
/// decoding glyph names. Names that do not decode land in the Private Use
/// Area at `0xE000 + gid`.
pub fn cmap_from_cff(data: &[u8], num_glyphs: usize) -> Option<GlyphMapping> {
    if data.len() < 4 || num_glyphs == 0 {
        return None;
    }
    let hdr_size = data[2] as usize;
    let mut offset = hdr_size;
    let (_, sz) = index_count(data, offset);
    offset += sz;
    let (top_dict_data, top_sz) = index_first_item(data, offset);
    offset += top_sz;
    let string_index_off = offset;
    let top_dict_data = top_dict_data?;
    let td = parse_dict(top_dict_data);
    let charset_off = td
        .get(&OP_CHARSET)
        .and_then(|v| v.first())
        .copied()
        .unwrap_or(0.0) as usize;
    let mut sids = vec![0usize; num_glyphs];
    if charset_off > 2 {
        let parsed = parse_charset(data, charset_off, num_glyphs);
        for (i, sid) in parsed.iter().enumerate() {
            if i + 1 < sids.len() {
                sids[i + 1] = *sid;
            }
        }
    } else if charset_off == 0 {
        // ISOAdobe: SIDs equal glyph order for the standard repertoire.
        let count = 228.min(num_glyphs.saturating_sub(1));
        for (i, sid) in sids.iter_mut().enumerate().take(count + 1).skip(1) {
            *sid = i;
        }
    } else {
        return None;
    }
    let mut mapping = GlyphMapping::new();
    for (gid, sid) in sids.iter().enumerate() {
        if gid == 0 {
            continue;
        }
        let name = if *sid <= 390 {
            STANDARD_STRINGS.get(*sid).copied().unwrap_or("").to_string()
        } else {
            read_string_index_item(data, string_index_off, sid - 391)
        };
        let mut code = 0u32;
        if !name.is_empty() {
            code = unicode_from_glyph_name(&name);
        }
        if code == 0 {
            code = 0xE000 + gid as u32;
        }
        mapping.insert(code, gid as u16);
    }
    Some(mapping)
}

fn parse_charset(data: &[u8], offset: usize, num_glyphs: usize) -> Vec<usize> {
    if offset >= data.len() {
        return Vec::new();
    }
    let format = data[offset];
    let count = num_glyphs.saturating_sub(1);
    let mut sids = Vec::with_capacity(count);
    let mut pos = offset + 1;
    match format {
        0 => {
            for _ in 0..count {
                if pos + 2 > data.len() {
                    break;
                }
                sids.push(u16::from_be_bytes([data[pos], data[pos + 1]]) as usize);
                pos += 2;
            }
        }
        1 => {
            while sids.len() < count && pos + 3 <= data.len() {
                let first = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
                let n_left = data[pos + 2] as usize;
                pos += 3;
                for j in 0..=n_left {
                    sids.push(first + j);
                }
            }
        }
        2 => {
            while sids.len() < count && pos + 4 <= data.len() {
                let first = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
                let n_left = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
                pos += 4;
                for j in 0..=n_left {
                    sids.push(first + j);
                }
            }
        }
        _ => {}
    }
    sids.truncate(count);
    sids
}

fn read_string_index_item(data: &[u8], offset: usize, idx: usize) -> String {
    if offset + 3 > data.len() {
        return String::new();
    }
    let count = u16::from_be_bytes([data[offset], data[offset + 1]]) as usize;
    let off_size = data[offset + 2] as usize;
    if idx >= count || !(1..=4).contains(&off_size) {
        return String::new();
    }
    let off_array_start = offset + 3;
    let p1 = off_array_start + idx * off_size;
    let p2 = p1 + off_size;
    if p2 + off_size > data.len() {
        return String::new();
    }
    let loc1 = read_offset(data, p1, off_size);
    let loc2 = read_offset(data, p2, off_size);
    let data_start = off_array_start + (count + 1) * off_size;
    if loc2 < loc1 {
        return String::new();
    }
    let start = data_start + loc1 - 1;
    let length = loc2 - loc1;
    if start + length > data.len() {
        return String::new();
    }
    String::from_utf8_lossy(&data[start..start + length]).to_string()
}

/// Decode a glyph name to a code point: `uniXXXX`, `uXXXX[XX]`, the common
/// PostScript names, or a single-character name. 0 when nothing matches.
pub fn unicode_from_glyph_name(name: &str) -> u32 {
    if let Some(hex) = name.strip_prefix("uni") {
        if name.len() == 7 {
            if let Ok(val) = u32::from_str_radix(hex, 16) {
                return val;
            }
        }
    }
    if !name.starts_with("uni") {
        if let Some(hex) = name.strip_prefix('u') {
            if (5..=7).contains(&name.len()) {
                if let Ok(val) = u32::from_str_radix(hex, 16) {
                    return val;
                }
            }
        }
    }
    let ch = match name {
        "space" => ' ',
        "exclam" => '!',
        "quotedbl" => '"',
        "numbersign" => '#',
        "dollar" => '$',
        "percent" => '%',
        "ampersand" => '&',
        "quotesingle" => '\'',
        "parenleft" => '(',
        "parenright" => ')',
        "asterisk" => '*',
        "plus" => '+',
        "comma" => ',',
        "hyphen" => '-',
        "period" => '.',
        "slash" => '/',
        "colon" => ':',
        "semicolon" => ';',
        "less" => '<',
        "equal" => '=',
        "greater" => '>',
        "question" => '?',
        "at" => '@',
        "bracketleft" => '[',
        "backslash" => '\\',
        "bracketright" => ']',
        "asciicircum" => '^',
        "underscore" => '_',
        "grave" => '`',
        "braceleft" => '{',
        "bar" => '|',
        "braceright" => '}',
        "asciitilde" => '~',
        _ => {
            if name.len() == 1 {
                return name.as_bytes()[0] as u32;
            }
            return 0;
        }
    };
    ch as u32
}

/// The 391 built-in CFF standard strings; SIDs above 390 index the font's
/// own String INDEX.
pub const STANDARD_STRINGS: [&str; 391] = [
    ".notdef", "space", "exclam", "quotedbl", "numbersign", "dollar", "percent", "ampersand",
    "quoteright", "parenleft", "parenright", "asterisk", "plus", "comma", "hyphen", "period",
    "slash", "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
    "colon", "semicolon", "less", "equal", "greater", "question", "at", "A", "B", "C", "D",
    "E", "F", "G", "H", "I", "J", "K", "L", "M", "N", "O", "P", "Q", "R", "S", "T", "U", "V",
    "W", "X", "Y", "Z", "bracketleft", "backslash", "bracketright", "asciicircum",
    "underscore", "quoteleft", "a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l", "m",
    "n", "o", "p", "q", "r", "s", "t", "u", "v", "w", "x", "y", "z", "braceleft", "bar",
    "braceright", "asciitilde", "exclamdown", "cent", "sterling", "fraction", "yen", "florin",
    "section", "currency", "quotesingle", "quotedblleft", "guillemotleft", "guilsinglleft",
    "guilsinglright", "fi", "fl", "endash", "dagger", "daggerdbl", "periodcentered",
    "paragraph", "bullet", "quotesinglbase", "quotedblbase", "quotedblright", "guillemotright",
    "ellipsis", "perthousand", "questiondown", "grave", "acute", "circumflex", "tilde",
    "macron", "breve", "dotaccent", "dieresis", "ring", "cedilla", "hungarumlaut", "ogonek",
    "caron", "emdash", "AE", "ordfeminine", "Lslash", "Oslash", "OE", "ordmasculine", "ae",
    "dotlessi", "lslash", "oslash", "oe", "germandbls", "onesuperior", "logicalnot", "mu",
    "trademark", "Eth", "onehalf", "plusminus", "Thorn", "onequarter", "divide", "brokenbar",
    "degree", "thorn", "threequarters", "twosuperior", "registered", "minus", "eth",
    "multiply", "threesuperior", "copyright", "Aacute", "Acircumflex", "Adieresis", "Agrave",
    "Aring", "Atilde", "Ccedilla", "Eacute", "Ecircumflex", "Edieresis", "Egrave", "Iacute",
    "Icircumflex", "Idieresis", "Igrave", "Ntilde", "Oacute", "Ocircumflex", "Odieresis",
    "Ograve", "Otilde", "Scaron", "Uacute", "Ucircumflex", "Udieresis", "Ugrave", "Yacute",
    "Ydieresis", "Zcaron", "aacute", "acircumflex", "adieresis", "agrave", "aring", "atilde",
    "ccedilla", "eacute", "ecircumflex", "edieresis", "egrave", "iacute", "icircumflex",
    "idieresis", "igrave", "ntilde", "oacute", "ocircumflex", "odieresis", "ograve", "otilde",
    "scaron", "uacute", "ucircumflex", "udieresis", "ugrave", "yacute", "ydieresis", "zcaron",
    "exclamsmall", "Hungarumlautsmall", "dollaroldstyle", "dollarsuperior", "ampersandsmall",
    "Acutesmall", "parenleftsuperior", "parenrightsuperior", "twodotenleader",
    "onedotenleader", "zerooldstyle", "oneoldstyle", "twooldstyle", "threeoldstyle",
    "fouroldstyle", "fiveoldstyle", "sixoldstyle", "sevenoldstyle", "eightoldstyle",
    "nineoldstyle", "commasuperior", "threequartersemdash", "periodsuperior", "questionsmall",
    "asuperior", "bsuperior", "centsuperior", "dsuperior", "esuperior", "isuperior",
    "lsuperior", "msuperior", "nsuperior", "osuperior", "rsuperior", "ssuperior", "tsuperior",
    "ff", "ffi", "ffl", "parenleftinferior", "parenrightinferior", "Circumflexsmall",
    "hyphensuperior", "Gravesmall", "Asmall", "Bsmall", "Csmall", "Dsmall", "Esmall", "Fsmall",
    "Gsmall", "Hsmall", "Ismall", "Jsmall", "Ksmall", "Lsmall", "Msmall", "Nsmall", "Osmall",
    "Psmall", "Qsmall", "Rsmall", "Ssmall", "Tsmall", "Usmall", "Vsmall", "Wsmall", "Xsmall",
    "Ysmall", "Zsmall", "colonmonetary", "onefitted", "rupiah", "Tildesmall",
    "exclamdownsmall", "centoldstyle", "Lslashsmall", "Scaronsmall", "Zcaronsmall",
    "Dieresissmall", "Brevesmall", "Caronsmall", "Dotaccentsmall", "Macronsmall", "figuredash",
    "hypheninferior", "Ogoneksmall", "Ringsmall", "Cedillasmall", "questiondownsmall",
    "oneeighth", "threeeighths", "fiveeighths", "seveneighths", "onethird", "twothirds",
    "zerosuperior", "foursuperior", "fivesuperior", "sixsuperior", "sevensuperior",
    "eightsuperior", "ninesuperior", "zeroinferior", "oneinferior", "twoinferior",
    "threeinferior", "fourinferior", "fiveinferior", "sixinferior", "seveninferior",
    "eightinferior", "nineinferior", "centinferior", "dollarinferior", "periodinferior",
    "commainferior", "Agravesmall", "Aacutesmall", "Acircumflexsmall", "Atildesmall",
    "Adieresissmall", "Aringsmall", "AEsmall", "Ccedillasmall", "Egravesmall", "Eacutesmall",
    "Ecircumflexsmall", "Edieresissmall", "Igravesmall", "Iacutesmall", "Icircumflexsmall",
    "Idieresissmall", "Ethsmall", "Ntildesmall", "Ogravesmall", "Oacutesmall",
    "Ocircumflexsmall", "Otildesmall", "Odieresissmall", "OEsmall", "Oslashsmall",
    "Ugravesmall", "Uacutesmall", "Ucircumflexsmall", "Udieresissmall", "Yacutesmall",
    "Thornsmall", "Ydieresissmall", "001.000", "001.001", "001.002", "001.003", "Black",
    "Bold", "Book", "Light", "Medium", "Regular", "Roman", "Semibold",
];
