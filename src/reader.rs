use std::collections::HashMap;
use std::fmt;
use std::io::{Cursor, Read as _};
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use log::debug;
use zip::ZipArchive;

use crate::geom::{parse_box, Box2};
use crate::model::{
    self, Attachment, CompositeGraphicUnit, CustomData, DocInfo, Document, DrawParam, Extension,
    FontRec, Ofd, OutlineElem, PageContent, PageRef, Permissions, Res, SignatureFile,
    SignatureList,
};
use crate::sign::extract_seal;

#[derive(Debug, Clone)]
pub enum ReadError {
    Archive(String),
    EntryNotFound(String),
    MalformedXml { path: String, detail: String },
    NoDocBody,
    NoPages,
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadError::Archive(msg) => write!(f, "failed to open archive: {}", msg),
            ReadError::EntryNotFound(name) => write!(f, "file not found: {}", name),
            ReadError::MalformedXml { path, detail } => {
                write!(f, "failed to unmarshal {}: {}", path, detail)
            }
            ReadError::NoDocBody => write!(f, "no docbody found"),
            ReadError::NoPages => write!(f, "no pages found"),
        }
    }
}

impl std::error::Error for ReadError {}

/// A visual signature stamp bound to a page.
#[derive(Debug, Clone)]
pub struct Stamp {
    pub boundary: Box2,
    pub kind: String,
    pub data: Vec<u8>,
}

/// Everything derived from `Document.xml` and its resource files, built
/// once on first access.
pub struct DocBundle {
    pub document: Document,
    pub root_dir: String,
    /// Media id -> archive path relative to the document root.
    pub res_map: HashMap<String, String>,
    /// Font id -> record; `font_file` already resolved relative to root.
    pub fonts: HashMap<String, FontRec>,
    pub draw_params: HashMap<String, DrawParam>,
    pub composite_units: HashMap<String, CompositeGraphicUnit>,
    /// Page id -> stamps placed on it.
    pub stamps: HashMap<String, Vec<Stamp>>,
}

/// Read-only view over an OFD archive. Safe to share across renderers;
/// the document bundle initialises once and archive reads serialise on an
/// internal lock.
pub struct Reader {
    ofd: Ofd,
    archive: Mutex<ZipArchive<Cursor<Vec<u8>>>>,
    /// Normalised entry name -> archive index.
    entries: HashMap<String, usize>,
    bundle: OnceLock<Result<DocBundle, ReadError>>,
}

impl Reader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Reader, ReadError> {
        let data =
            std::fs::read(path).map_err(|e| ReadError::Archive(e.to_string()))?;
        Reader::from_bytes(data)
    }

    pub fn from_bytes(data: Vec<u8>) -> Result<Reader, ReadError> {
        let archive = ZipArchive::new(Cursor::new(data))
            .map_err(|e| ReadError::Archive(e.to_string()))?;
        let mut entries = HashMap::new();
        for i in 0..archive.len() {
            if let Some(name) = archive.name_for_index(i) {
                entries.insert(normalize_path(name), i);
            }
        }
        let mut reader = Reader {
            ofd: Ofd::default(),
            archive: Mutex::new(archive),
            entries,
            bundle: OnceLock::new(),
        };
        let data = reader.read_file("OFD.xml").map_err(|_| {
            ReadError::Archive("failed to read ofd.xml".to_string())
        })?;
        reader.ofd = decode_xml(&data, "OFD.xml")?;
        Ok(reader)
    }

    /// Read one archive entry. Backslashes and a leading slash in `name`
    /// are normalised away first.
    pub fn read_file(&self, name: &str) -> Result<Vec<u8>, ReadError> {
        let normalized = normalize_path(name);
        let index = *self
            .entries
            .get(&normalized)
            .ok_or_else(|| ReadError::EntryNotFound(normalized.clone()))?;
        let mut archive = self
            .archive
            .lock()
            .map_err(|_| ReadError::Archive("archive lock poisoned".to_string()))?;
        let mut file = archive
            .by_index(index)
            .map_err(|e| ReadError::Archive(e.to_string()))?;
        let mut out = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut out)
            .map_err(|e| ReadError::Archive(e.to_string()))?;
        Ok(out)
    }

    /// Like `read_file` but also tries the path joined under the document
    /// root; producers are inconsistent about whether signature paths are
    /// archive-absolute.
    fn read_file_flex(&self, name: &str, root_dir: &str) -> Result<Vec<u8>, ReadError> {
        match self.read_file(name) {
            Ok(data) => Ok(data),
            Err(_) => self.read_file(&path_join(root_dir, name)),
        }
    }

    /// The lazily built document bundle. The first caller pays for XML
    /// decoding and resource resolution; later calls are lookups.
    pub fn doc(&self) -> Result<&DocBundle, ReadError> {
        match self.bundle.get_or_init(|| self.load_bundle()) {
            Ok(bundle) => Ok(bundle),
            Err(err) => Err(err.clone()),
        }
    }

    fn load_bundle(&self) -> Result<DocBundle, ReadError> {
        let body = self.ofd.doc_body.first().ok_or(ReadError::NoDocBody)?;
        let doc_root = body.doc_root.clone();
        let root_dir = path_dir(&doc_root);
        let data = self.read_file(&doc_root)?;
        let document: Document = decode_xml(&data, &doc_root)?;
        let mut bundle = DocBundle {
            document,
            root_dir,
            res_map: HashMap::new(),
            fonts: HashMap::new(),
            draw_params: HashMap::new(),
            composite_units: HashMap::new(),
            stamps: HashMap::new(),
        };
        let document_res = bundle.document.common_data.document_res.clone();
        let public_res = bundle.document.common_data.public_res.clone();
        if !document_res.is_empty() {
            self.load_res(&mut bundle, &document_res);
        }
        if !public_res.is_empty() {
            self.load_res(&mut bundle, &public_res);
        }
        let signatures = bundle
            .document
            .signatures
            .clone()
            .or_else(|| body.signatures.clone());
        if let Some(sig_path) = signatures {
            if !sig_path.is_empty() {
                self.load_signatures(&mut bundle, &sig_path);
            }
        }
        Ok(bundle)
    }

    fn load_res(&self, bundle: &mut DocBundle, res_path: &str) {
        let full = path_join(&bundle.root_dir, res_path);
        let Ok(data) = self.read_file(&full) else {
            debug!("resource file missing: {}", full);
            return;
        };
        let Ok(res) = model::from_xml_bytes::<Res>(&data) else {
            debug!("resource file unreadable: {}", full);
            return;
        };
        let base_loc = res.base_loc.clone();
        let res_dir = |item: &str| -> String {
            let mut dir = path_dir(res_path);
            if !base_loc.is_empty() && dir != base_loc {
                dir = path_join(&dir, &base_loc);
            }
            path_join(&dir, item)
        };
        for mm in &res.multi_medias.multi_media {
            let file = mm.media_file.trim();
            if file.is_empty() {
                continue;
            }
            bundle.res_map.insert(mm.id.clone(), res_dir(file));
        }
        for font in &res.fonts.font {
            let mut record = font.clone();
            if !record.font_file.is_empty() {
                record.font_file = res_dir(&record.font_file);
            }
            bundle.fonts.insert(record.id.clone(), record);
        }
        for dp in &res.draw_params.draw_param {
            bundle.draw_params.insert(dp.id.clone(), dp.clone());
        }
        for cgu in &res.composite_graphic_units.composite_graphic_unit {
            bundle.composite_units.insert(cgu.id.clone(), cgu.clone());
        }
    }

    fn load_signatures(&self, bundle: &mut DocBundle, sig_path: &str) {
        let Ok(data) = self.read_file_flex(sig_path, &bundle.root_dir) else {
            return;
        };
        let Ok(list) = model::from_xml_bytes::<SignatureList>(&data) else {
            return;
        };
        for sig_ref in &list.signature {
            let file_path = path_join(&path_dir(sig_path), &sig_ref.base_loc);
            let Ok(sig_data) = self.read_file_flex(&file_path, &bundle.root_dir) else {
                continue;
            };
            let Ok(sig_file) = model::from_xml_bytes::<SignatureFile>(&sig_data) else {
                continue;
            };
            let value_path = path_join(&path_dir(&file_path), &sig_file.signed_value);
            let Ok(value) = self.read_file_flex(&value_path, &bundle.root_dir) else {
                continue;
            };
            let (kind, stamp_data) = extract_seal(&value);
            for annot in &sig_file.signed_info.stamp_annot {
                bundle
                    .stamps
                    .entry(annot.page_ref.clone())
                    .or_default()
                    .push(Stamp {
                        boundary: parse_box(&annot.boundary),
                        kind: kind.clone(),
                        data: stamp_data.clone(),
                    });
            }
        }
    }

    /// Load one page's content XML.
    pub fn page_content(&self, page: &PageRef) -> Result<PageContent, ReadError> {
        let bundle = self.doc()?;
        let mut content = self.page_content_at(&bundle.root_dir, &page.base_loc)?;
        content.id = page.id.clone();
        Ok(content)
    }

    pub(crate) fn page_content_at(
        &self,
        root_dir: &str,
        base_loc: &str,
    ) -> Result<PageContent, ReadError> {
        let full = path_join(root_dir, base_loc);
        let data = self.read_file(&full)?;
        decode_xml(&data, &full)
    }

    /// Full archive path of a resource link.
    pub fn res_path(&self, link: &str) -> String {
        if link.is_empty() {
            return String::new();
        }
        let root = self
            .doc()
            .map(|b| b.root_dir.clone())
            .unwrap_or_default();
        path_join(&root, link)
    }

    pub fn res_data(&self, link: &str) -> Result<Vec<u8>, ReadError> {
        self.read_file(&self.res_path(link))
    }

    pub fn version(&self) -> &str {
        &self.ofd.version
    }

    pub fn doc_type(&self) -> &str {
        &self.ofd.doc_type
    }

    pub fn doc_info(&self) -> Result<&DocInfo, ReadError> {
        let body = self.ofd.doc_body.first().ok_or(ReadError::NoDocBody)?;
        Ok(&body.doc_info)
    }

    pub fn doc_roots(&self) -> Vec<String> {
        self.ofd.doc_body.iter().map(|b| b.doc_root.clone()).collect()
    }

    pub fn permissions(&self) -> Result<&Permissions, ReadError> {
        Ok(&self.doc()?.document.permissions)
    }

    pub fn outlines(&self) -> Result<&[OutlineElem], ReadError> {
        Ok(&self.doc()?.document.outlines.outline_elem)
    }

    pub fn attachments(&self) -> Result<&[Attachment], ReadError> {
        Ok(&self.doc()?.document.attachments.attachment)
    }

    pub fn extensions(&self) -> Result<&[Extension], ReadError> {
        Ok(&self.doc()?.document.extensions.extension)
    }

    pub fn custom_data(&self) -> Result<&[CustomData], ReadError> {
        let info = self.doc_info()?;
        match &info.custom_datas {
            Some(datas) => Ok(&datas.custom_data),
            None => Ok(&[]),
        }
    }

    pub fn pages(&self) -> Result<&[PageRef], ReadError> {
        Ok(&self.doc()?.document.pages.page)
    }

    pub fn page_count(&self) -> usize {
        self.doc().map(|b| b.document.pages.page.len()).unwrap_or(0)
    }
}

fn decode_xml<T: serde::de::DeserializeOwned>(data: &[u8], path: &str) -> Result<T, ReadError> {
    model::from_xml_bytes(data).map_err(|e| ReadError::MalformedXml {
        path: path.to_string(),
        detail: e.to_string(),
    })
}

/// Normalise an archive path: forward slashes, no leading slash.
pub fn normalize_path(name: &str) -> String {
    let name = name.replace('\\', "/");
    name.trim_start_matches('/').to_string()
}

/// Directory part of a '/'-separated path, "" for bare names.
pub fn path_dir(p: &str) -> String {
    match p.rfind('/') {
        Some(idx) => p[..idx].to_string(),
        None => String::new(),
    }
}

/// Join '/'-separated archive paths, resolving `.` and `..` segments.
pub fn path_join(a: &str, b: &str) -> String {
    let combined = if a.is_empty() {
        b.to_string()
    } else if b.is_empty() {
        a.to_string()
    } else {
        format!("{}/{}", a, b)
    };
    let mut parts: Vec<&str> = Vec::new();
    for seg in combined.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}
