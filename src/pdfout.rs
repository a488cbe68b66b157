//! Minimal PDF writer. One writer instance accumulates pages so a whole
//! document shares a single catalog, pages tree and xref table. Content
//! streams are uncompressed; PDF's native bottom-left point space lines
//! up with the canvas, so only the millimetre scale is prepended. Images
//! become RGB XObjects with a grayscale SMask when they carry alpha.

use std::io::{self, Write};

use kurbo::{PathEl, Point};

use crate::canvas::{
    quad_to_cubic, DrawOp, LineCap, LineJoin, PageCanvas, Rgba, StrokeStyle, MM_TO_PT,
};

struct ImageRes {
    width: u32,
    height: u32,
    rgb: Vec<u8>,
    alpha: Option<Vec<u8>>,
}

struct PageRecord {
    width_pt: f64,
    height_pt: f64,
    content: Vec<u8>,
    images: Vec<ImageRes>,
}

#[derive(Default)]
pub struct PdfWriter {
    pages: Vec<PageRecord>,
}

impl PdfWriter {
    pub fn new() -> PdfWriter {
        PdfWriter::default()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Record one rendered page.
    pub fn add_page(&mut self, canvas: &PageCanvas) {
        let mut content = Vec::new();
        let mut images = Vec::new();
        // Work in millimetres on top of PDF's point space.
        let _ = write!(content, "{0} 0 0 {0} 0 0 cm\n", MM_TO_PT);
        for op in &canvas.ops {
            match op {
                DrawOp::Push => content.extend_from_slice(b"q\n"),
                DrawOp::Pop => content.extend_from_slice(b"Q\n"),
                DrawOp::Clip(path) => {
                    write_path(&mut content, path);
                    content.extend_from_slice(b"W n\n");
                }
                DrawOp::Fill { path, color } => {
                    if color.a > 0 {
                        write_fill_color(&mut content, *color);
                        write_path(&mut content, path);
                        content.extend_from_slice(b"f\n");
                    }
                }
                DrawOp::Glyph { path, color, .. } => {
                    if color.a > 0 && !path.elements().is_empty() {
                        write_fill_color(&mut content, *color);
                        write_path(&mut content, path);
                        content.extend_from_slice(b"f\n");
                    }
                }
                DrawOp::Stroke { path, color, style } => {
                    if color.a > 0 {
                        write_stroke_state(&mut content, *color, style);
                        write_path(&mut content, path);
                        content.extend_from_slice(b"S\n");
                    }
                }
                DrawOp::Image {
                    image,
                    x,
                    y,
                    scale_x,
                    scale_y,
                } => {
                    let width_mm = image.width as f64 * scale_x;
                    let height_mm = image.height as f64 * scale_y;
                    let mut rgb = Vec::with_capacity(image.rgba.len() / 4 * 3);
                    let mut alpha = Vec::with_capacity(image.rgba.len() / 4);
                    let mut has_alpha = false;
                    for px in image.rgba.chunks_exact(4) {
                        rgb.extend_from_slice(&px[..3]);
                        alpha.push(px[3]);
                        if px[3] != 255 {
                            has_alpha = true;
                        }
                    }
                    let index = images.len();
                    images.push(ImageRes {
                        width: image.width,
                        height: image.height,
                        rgb,
                        alpha: if has_alpha { Some(alpha) } else { None },
                    });
                    let _ = write!(
                        content,
                        "q\n{:.4} 0 0 {:.4} {:.4} {:.4} cm\n/Im{} Do\nQ\n",
                        width_mm, height_mm, x, y, index
                    );
                }
            }
        }
        self.pages.push(PageRecord {
            width_pt: canvas.width * MM_TO_PT,
            height_pt: canvas.height * MM_TO_PT,
            content,
            images,
        });
    }

    /// Serialise the accumulated document: header, objects, xref, trailer.
    pub fn finish<W: Write>(self, writer: &mut W) -> io::Result<()> {
        // ids: 1 catalog, 2 pages tree, then per page: page, content,
        // image objects (plus SMask objects).
        let mut bodies: Vec<Vec<u8>> = Vec::new();
        let mut page_ids = Vec::new();
        let mut next_id = 3usize;
        struct Layout {
            page_id: usize,
            content_id: usize,
            image_ids: Vec<(usize, Option<usize>)>,
        }
        let mut layouts = Vec::new();
        for page in &self.pages {
            let page_id = next_id;
            let content_id = next_id + 1;
            next_id += 2;
            let mut image_ids = Vec::new();
            for image in &page.images {
                let img_id = next_id;
                next_id += 1;
                let smask_id = if image.alpha.is_some() {
                    let id = next_id;
                    next_id += 1;
                    Some(id)
                } else {
                    None
                };
                image_ids.push((img_id, smask_id));
            }
            page_ids.push(page_id);
            layouts.push(Layout {
                page_id,
                content_id,
                image_ids,
            });
        }

        let kids: Vec<String> = page_ids.iter().map(|id| format!("{} 0 R", id)).collect();
        bodies.push(b"<< /Type /Catalog /Pages 2 0 R >>".to_vec());
        bodies.push(
            format!(
                "<< /Type /Pages /Kids [{}] /Count {} >>",
                kids.join(" "),
                self.pages.len()
            )
            .into_bytes(),
        );
        for (page, layout) in self.pages.iter().zip(&layouts) {
            let mut resources = String::new();
            if !layout.image_ids.is_empty() {
                resources.push_str(" /Resources << /XObject <<");
                for (index, (img_id, _)) in layout.image_ids.iter().enumerate() {
                    resources.push_str(&format!(" /Im{} {} 0 R", index, img_id));
                }
                resources.push_str(" >> >>");
            }
            bodies.push(
                format!(
                    "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {:.4} {:.4}] /Contents {} 0 R{} >>",
                    page.width_pt, page.height_pt, layout.content_id, resources
                )
                .into_bytes(),
            );
            let mut stream = Vec::new();
            let _ = write!(stream, "<< /Length {} >>\nstream\n", page.content.len());
            stream.extend_from_slice(&page.content);
            stream.extend_from_slice(b"\nendstream");
            bodies.push(stream);
            for (image, (_, smask_id)) in page.images.iter().zip(&layout.image_ids) {
                let smask = match smask_id {
                    Some(id) => format!(" /SMask {} 0 R", id),
                    None => String::new(),
                };
                let mut obj = Vec::new();
                let _ = write!(
                    obj,
                    "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceRGB /BitsPerComponent 8{} /Length {} >>\nstream\n",
                    image.width, image.height, smask, image.rgb.len()
                );
                obj.extend_from_slice(&image.rgb);
                obj.extend_from_slice(b"\nendstream");
                bodies.push(obj);
                if let (Some(_), Some(alpha)) = (smask_id, &image.alpha) {
                    let mut mask = Vec::new();
                    let _ = write!(
                        mask,
                        "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceGray /BitsPerComponent 8 /Length {} >>\nstream\n",
                        image.width, image.height, alpha.len()
                    );
                    mask.extend_from_slice(alpha);
                    mask.extend_from_slice(b"\nendstream");
                    bodies.push(mask);
                }
            }
        }

        let mut out = Vec::new();
        out.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");
        let mut offsets = Vec::with_capacity(bodies.len());
        for (index, body) in bodies.iter().enumerate() {
            offsets.push(out.len());
            let _ = write!(out, "{} 0 obj\n", index + 1);
            out.extend_from_slice(body);
            out.extend_from_slice(b"\nendobj\n");
        }
        let xref_offset = out.len();
        let _ = write!(out, "xref\n0 {}\n", bodies.len() + 1);
        out.extend_from_slice(b"0000000000 65535 f \n");
        for offset in &offsets {
            let _ = write!(out, "{:010} 00000 n \n", offset);
        }
        let _ = write!(
            out,
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            bodies.len() + 1,
            xref_offset
        );
        writer.write_all(&out)
    }
}

fn write_fill_color(out: &mut Vec<u8>, color: Rgba) {
    let _ = write!(
        out,
        "{:.4} {:.4} {:.4} rg\n",
        color.r as f64 / 255.0,
        color.g as f64 / 255.0,
        color.b as f64 / 255.0
    );
}

fn write_stroke_state(out: &mut Vec<u8>, color: Rgba, style: &StrokeStyle) {
    let _ = write!(
        out,
        "{:.4} {:.4} {:.4} RG\n{:.4} w\n",
        color.r as f64 / 255.0,
        color.g as f64 / 255.0,
        color.b as f64 / 255.0,
        style.width
    );
    let cap = match style.cap {
        LineCap::Butt => 0,
        LineCap::Round => 1,
        LineCap::Square => 2,
    };
    let join = match style.join {
        LineJoin::Miter => 0,
        LineJoin::Round => 1,
        LineJoin::Bevel => 2,
    };
    let _ = write!(out, "{} J\n{} j\n", cap, join);
    if style.miter_limit >= 1.0 {
        let _ = write!(out, "{:.4} M\n", style.miter_limit);
    }
    if style.dash_pattern.is_empty() {
        let _ = write!(out, "[] 0 d\n");
    } else {
        let dashes: Vec<String> = style
            .dash_pattern
            .iter()
            .map(|d| format!("{:.4}", d))
            .collect();
        let _ = write!(out, "[{}] {:.4} d\n", dashes.join(" "), style.dash_offset);
    }
}

fn write_path(out: &mut Vec<u8>, path: &kurbo::BezPath) {
    let mut cur = Point::ZERO;
    for el in path.elements() {
        match el {
            PathEl::MoveTo(p) => {
                let _ = write!(out, "{:.4} {:.4} m\n", p.x, p.y);
                cur = *p;
            }
            PathEl::LineTo(p) => {
                let _ = write!(out, "{:.4} {:.4} l\n", p.x, p.y);
                cur = *p;
            }
            PathEl::QuadTo(p1, p) => {
                let (c1, c2) = quad_to_cubic(cur, *p1, *p);
                let _ = write!(
                    out,
                    "{:.4} {:.4} {:.4} {:.4} {:.4} {:.4} c\n",
                    c1.x, c1.y, c2.x, c2.y, p.x, p.y
                );
                cur = *p;
            }
            PathEl::CurveTo(p1, p2, p) => {
                let _ = write!(
                    out,
                    "{:.4} {:.4} {:.4} {:.4} {:.4} {:.4} c\n",
                    p1.x, p1.y, p2.x, p2.y, p.x, p.y
                );
                cur = *p;
            }
            PathEl::ClosePath => out.extend_from_slice(b"h\n"),
        }
    }
}
