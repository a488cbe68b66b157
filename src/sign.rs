//! Seal-image extraction from GB/T 38540 signed-value blobs.
//!
//! The signed value is a DER-encoded ASN.1 structure. Cryptographic
//! verification is out of scope here; the walker only has to locate the
//! embedded stamp image: the first constructed node with exactly four
//! children where child 1 is an octet string and children 2 and 3 are
//! integers. Child 0 names the image format.

/// One parsed DER node; `body` borrows the value bytes.
struct DerNode<'a> {
    tag: u8,
    constructed: bool,
    body: &'a [u8],
}

/// Read a single TLV at the start of `data`. Returns the node and the
/// number of bytes consumed. Long-form tags and indefinite lengths are
/// rejected; DER forbids the latter anyway.
fn read_node(data: &[u8]) -> Option<(DerNode<'_>, usize)> {
    if data.len() < 2 {
        return None;
    }
    let first = data[0];
    if first & 0x1F == 0x1F {
        return None;
    }
    let tag = first & 0x1F;
    let constructed = first & 0x20 != 0;
    let mut pos = 1;
    let len_byte = data[pos];
    pos += 1;
    let length = if len_byte & 0x80 == 0 {
        len_byte as usize
    } else {
        let n = (len_byte & 0x7F) as usize;
        if n == 0 || n > 4 || pos + n > data.len() {
            return None;
        }
        let mut v = 0usize;
        for _ in 0..n {
            v = (v << 8) | data[pos] as usize;
            pos += 1;
        }
        v
    };
    if pos + length > data.len() {
        return None;
    }
    let node = DerNode {
        tag,
        constructed,
        body: &data[pos..pos + length],
    };
    Some((node, pos + length))
}

/// Parse every sibling TLV in `data`. Fails if trailing bytes remain.
fn read_children<'a>(data: &'a [u8]) -> Option<Vec<DerNode<'a>>> {
    let mut out = Vec::new();
    let mut rest = data;
    while !rest.is_empty() {
        let (node, used) = read_node(rest)?;
        rest = &rest[used..];
        out.push(node);
    }
    Some(out)
}

/// Extract `(format tag, image bytes)` from a signed-value blob. Returns
/// `("", vec![])` when nothing matches.
pub fn extract_seal(data: &[u8]) -> (String, Vec<u8>) {
    let Some((root, _)) = read_node(data) else {
        return (String::new(), Vec::new());
    };
    match search(&root) {
        Some((kind, bytes)) => (kind, bytes),
        None => (String::new(), Vec::new()),
    }
}

fn search(node: &DerNode<'_>) -> Option<(String, Vec<u8>)> {
    if !node.constructed {
        return None;
    }
    let children = read_children(node.body)?;
    if children.len() == 4 {
        let (e0, e1, e2, e3) = (&children[0], &children[1], &children[2], &children[3]);
        if e1.tag == 4 && e2.tag == 2 && e3.tag == 2 {
            let mut kind = decode_format_tag(e0);
            if kind == "es" {
                // ES-format stamps carry PNG payloads.
                kind = "png".to_string();
            }
            return Some((kind, e1.body.to_vec()));
        }
    }
    for child in &children {
        if let Some(found) = search(child) {
            return Some(found);
        }
    }
    None
}

/// The format tag is usually a UTF8String/IA5String but some producers
/// write bare bytes; either way the value bytes spell the format. NUL
/// padding and whitespace are trimmed, the result is lower-cased.
fn decode_format_tag(node: &DerNode<'_>) -> String {
    String::from_utf8_lossy(node.body)
        .replace('\u{0}', "")
        .trim()
        .to_lowercase()
}
