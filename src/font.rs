//! Font loading and dispatch: decide what an embedded blob is, run the
//! repair pipeline, and fall back through caller-supplied directories,
//! in-memory sources, system locations and the bilingual alias table when
//! no embedded file exists. Outcomes are cached per font id, failures
//! included, so the expensive search runs once.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use ttf_parser::Face;

use crate::cff;
use crate::reader::Reader;
use crate::sfnt::{self, Repair};

/// Caller-supplied in-memory font collection; the renderer consults these
/// after the on-disk directories.
pub trait FontSource {
    /// Candidate font blobs for a family name.
    fn lookup(&self, name: &str) -> Vec<Vec<u8>>;
}

/// A typeface ready for use: repaired bytes plus the style bits the font
/// record declared.
#[derive(Clone)]
pub struct LoadedFont {
    pub data: Arc<Vec<u8>>,
    pub bold: bool,
    pub italic: bool,
}

impl LoadedFont {
    pub fn face(&self) -> Option<Face<'_>> {
        Face::parse(&self.data, 0).ok()
    }
}

/// Run the repair pipeline on an embedded blob, dispatching by magic.
pub fn repair_font_data(data: &[u8]) -> Repair {
    if data.len() >= 4 {
        if &data[..4] == b"ttcf" {
            // Collections are passed through untouched.
            return Repair::unchanged(data);
        }
        if &data[..4] == b"OTTO" || data[..4] == [0x00, 0x01, 0x00, 0x00] || &data[..4] == b"true"
        {
            return sfnt::repair_truetype(data, true, true);
        }
        if data[0] == 0x01 && data[1] == 0x00 && data[2] == 0x04 {
            match cff::wrap_cff_to_otf(data) {
                Ok((bytes, mapping)) => {
                    return Repair {
                        rewrote: true,
                        data: bytes,
                        mapping,
                        cmap_missing: true,
                    };
                }
                Err(err) => {
                    warn!("cff wrap failed: {}", err);
                    return Repair::unchanged(data);
                }
            }
        }
    }
    sfnt::repair_truetype(data, true, true)
}

/// Bilingual alias table for the CJK families OFD producers reference by
/// either name.
const FONT_ALIASES: [(&str, &str); 13] = [
    ("simhei", "SimHei"),
    ("黑体", "SimHei"),
    ("microsoft yahei", "Microsoft YaHei"),
    ("微软雅黑", "Microsoft YaHei"),
    ("simsun", "SimSun"),
    ("宋体", "SimSun"),
    ("kaiti", "KaiTi"),
    ("楷体", "KaiTi"),
    ("fangsong", "FangSong"),
    ("仿宋", "FangSong"),
    ("arial", "Arial"),
    ("segoe ui", "Segoe UI"),
    ("times new roman", "Times New Roman"),
];

const SYSTEM_FAMILIES: [&str; 8] = [
    "SimHei",
    "Microsoft YaHei",
    "SimSun",
    "KaiTi",
    "FangSong",
    "Arial",
    "Segoe UI",
    "Times New Roman",
];

fn alias_for(name: &str) -> Option<&'static str> {
    let lower = name.to_lowercase();
    for (key, target) in FONT_ALIASES {
        if lower == key {
            return Some(target);
        }
    }
    for (key, target) in FONT_ALIASES {
        if lower.contains(key) {
            return Some(target);
        }
    }
    None
}

fn system_font_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![
        PathBuf::from("C:\\Windows\\Fonts"),
        PathBuf::from("/usr/share/fonts"),
        PathBuf::from("/usr/local/share/fonts"),
        PathBuf::from("/System/Library/Fonts"),
        PathBuf::from("/Library/Fonts"),
    ];
    if let Ok(home) = std::env::var("HOME") {
        dirs.push(Path::new(&home).join(".fonts"));
        dirs.push(Path::new(&home).join(".local/share/fonts"));
    }
    dirs
}

fn is_font_file(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref(),
        Some("ttf") | Some("otf") | Some("ttc")
    )
}

/// Files in `dir` (recursing one level) whose stem matches `name`:
/// prefix match normally, substring match when `contains` is set.
fn glob_font_files(dir: &Path, name: &str, contains: bool) -> Vec<PathBuf> {
    let needle = name.to_lowercase();
    let mut out = Vec::new();
    let mut stack = vec![(dir.to_path_buf(), 0u32)];
    while let Some((current, depth)) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&current) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if depth < 2 {
                    stack.push((path, depth + 1));
                }
                continue;
            }
            if !is_font_file(&path) {
                continue;
            }
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(|s| s.to_lowercase())
                .unwrap_or_default();
            let hit = if contains {
                stem.contains(&needle)
            } else {
                stem.starts_with(&needle)
            };
            if hit {
                out.push(path);
            }
        }
    }
    out.sort();
    out
}

/// Per-renderer font state: configuration, the id-keyed outcome cache and
/// the glyph-id to character tables recovered by the repair pipeline.
pub struct FontLibrary {
    pub font_dirs: Vec<PathBuf>,
    pub sources: Vec<Box<dyn FontSource>>,
    cache: HashMap<String, Option<LoadedFont>>,
    gid_maps: HashMap<String, HashMap<u16, char>>,
    fallback: Option<LoadedFont>,
    fallback_ready: bool,
}

impl Default for FontLibrary {
    fn default() -> Self {
        FontLibrary {
            font_dirs: Vec::new(),
            sources: Vec::new(),
            cache: HashMap::new(),
            gid_maps: HashMap::new(),
            fallback: None,
            fallback_ready: false,
        }
    }
}

impl FontLibrary {
    /// The glyph-id to character table for a font id, if repair recovered
    /// or synthesised one.
    pub fn gid_map(&self, font_id: &str) -> Option<&HashMap<u16, char>> {
        self.gid_maps.get(font_id)
    }

    /// Default family used when a font id has no record or every lookup
    /// fails. Resolved once.
    pub fn fallback(&mut self) -> Option<LoadedFont> {
        if !self.fallback_ready {
            self.fallback_ready = true;
            for family in SYSTEM_FAMILIES {
                if let Some(font) = self.search_named(family, false, false) {
                    self.fallback = Some(font);
                    break;
                }
            }
        }
        self.fallback.clone()
    }

    /// Resolve a font id to a typeface, consulting the cache first.
    pub fn load(&mut self, reader: &Reader, font_id: &str) -> Option<LoadedFont> {
        if let Some(cached) = self.cache.get(font_id) {
            return cached.clone();
        }
        let record = match reader.doc().ok().and_then(|b| b.fonts.get(font_id)) {
            Some(record) => record.clone(),
            None => return self.fallback(),
        };
        if !record.font_file.is_empty() {
            let outcome = self.load_embedded(reader, font_id, &record.font_file, &record);
            self.cache.insert(font_id.to_string(), outcome.clone());
            return outcome;
        }
        let mut outcome = None;
        for name in [record.family_name.as_str(), record.font_name.as_str()] {
            if name.is_empty() {
                continue;
            }
            if let Some(font) = self.search_named(name, record.bold, record.italic) {
                outcome = Some(font);
                break;
            }
        }
        let outcome = outcome.or_else(|| self.fallback());
        self.cache.insert(font_id.to_string(), outcome.clone());
        outcome
    }

    fn load_embedded(
        &mut self,
        reader: &Reader,
        font_id: &str,
        font_file: &str,
        record: &crate::model::FontRec,
    ) -> Option<LoadedFont> {
        let raw = match reader.res_data(font_file) {
            Ok(raw) => raw,
            Err(err) => {
                debug!("embedded font {} unreadable: {}", font_file, err);
                return None;
            }
        };
        let repair = repair_font_data(&raw);
        if let Some(mapping) = &repair.mapping {
            let mut inverse = HashMap::with_capacity(mapping.len());
            for (code, gid) in mapping {
                if let Some(ch) = char::from_u32(*code) {
                    inverse.insert(*gid, ch);
                }
            }
            self.gid_maps.insert(font_id.to_string(), inverse);
        }
        let font = LoadedFont {
            data: Arc::new(repair.data),
            bold: record.bold,
            italic: record.italic,
        };
        if font.face().is_none() {
            debug!("font id {} unusable after repair", font_id);
            return None;
        }
        Some(font)
    }

    /// Directory, in-memory, alias and system lookups for a family name.
    fn search_named(&self, name: &str, bold: bool, italic: bool) -> Option<LoadedFont> {
        for dir in &self.font_dirs {
            for path in glob_font_files(dir, name, false) {
                if let Some(font) = load_font_file(&path, bold, italic) {
                    return Some(font);
                }
            }
        }
        for source in &self.sources {
            for blob in source.lookup(name) {
                let font = LoadedFont {
                    data: Arc::new(blob),
                    bold,
                    italic,
                };
                if font.face().is_some() {
                    return Some(font);
                }
            }
        }
        let target = alias_for(name).unwrap_or(name);
        for dir in system_font_dirs() {
            let mut matches = glob_font_files(&dir, target, true);
            if matches.is_empty() {
                let curated = match target {
                    "SimSun" => Some("simsun.ttc"),
                    "KaiTi" => Some("simkai.ttf"),
                    "SimHei" => Some("simhei.ttf"),
                    "FangSong" => Some("simfang.ttf"),
                    _ => None,
                };
                if let Some(file) = curated {
                    let candidate = dir.join(file);
                    if candidate.is_file() {
                        matches.push(candidate);
                    }
                }
            }
            for path in matches {
                if let Some(font) = load_font_file(&path, bold, italic) {
                    return Some(font);
                }
            }
        }
        None
    }
}

fn load_font_file(path: &Path, bold: bool, italic: bool) -> Option<LoadedFont> {
    let data = std::fs::read(path).ok()?;
    let font = LoadedFont {
        data: Arc::new(data),
        bold,
        italic,
    };
    font.face()?;
    Some(font)
}
