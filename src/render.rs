//! Page interpreter: walks the layer / composite-graphic-unit tree,
//! resolves inherited draw parameters, maintains the CTM chain, converts
//! OFD top-left coordinates into bottom-left canvas space and records draw
//! ops. Also hosts the page orchestrator and the output entry points.

use std::collections::HashSet;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;

use kurbo::{Affine, Arc as EllipticalArc, BezPath, Point, Shape, SvgArc, Vec2};
use log::debug;

use crate::canvas::{
    self, parse_color, CanvasImage, DrawOp, LineCap, LineJoin, PageCanvas, Rgba, StrokeStyle,
};
use crate::eps;
use crate::font::{FontLibrary, FontSource, LoadedFont};
use crate::geom::{parse_box, parse_floats, Box2, Matrix};
use crate::model::{
    Clips, CompositeGraphicUnit, DrawParam, ImageObject, Layer, PageContent, PathObject,
    TextObject,
};
use crate::pdfout::PdfWriter;
use crate::raster;
use crate::reader::{ReadError, Reader, Stamp};
use crate::svg;

/// Composite-graphic-unit recursion bound; reference cycles are not
/// detected, the depth cap keeps them from blowing the stack.
const MAX_COMPOSITE_DEPTH: u32 = 32;

#[derive(Debug)]
pub enum RenderError {
    Read(ReadError),
    PageOutOfRange(usize),
    NoPagesRendered,
    Io(String),
    Raster(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Read(err) => err.fmt(f),
            RenderError::PageOutOfRange(idx) => {
                write!(f, "page index {} out of range", idx)
            }
            RenderError::NoPagesRendered => write!(f, "failed to render any page"),
            RenderError::Io(msg) => write!(f, "output error: {}", msg),
            RenderError::Raster(msg) => write!(f, "raster error: {}", msg),
        }
    }
}

impl std::error::Error for RenderError {}

impl From<ReadError> for RenderError {
    fn from(err: ReadError) -> RenderError {
        RenderError::Read(err)
    }
}

/// Defaults a parent scope hands down to its children.
#[derive(Clone, Copy, Default)]
struct Inherited {
    fill: Option<Rgba>,
    stroke: Option<Rgba>,
    line_width: f64,
}

/// Single-threaded page renderer. Owns the font caches; instantiate one
/// per worker and share the `Reader`.
pub struct Renderer<'a> {
    reader: &'a Reader,
    dpi: f64,
    fonts: FontLibrary,
}

impl<'a> Renderer<'a> {
    pub fn new(reader: &'a Reader) -> Renderer<'a> {
        Renderer {
            reader,
            dpi: 300.0,
            fonts: FontLibrary::default(),
        }
    }

    pub fn with_dpi(mut self, dpi: f64) -> Self {
        self.dpi = dpi;
        self
    }

    pub fn with_font_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.fonts.font_dirs.extend(dirs);
        self
    }

    pub fn with_font_sources(mut self, sources: Vec<Box<dyn FontSource>>) -> Self {
        self.fonts.sources.extend(sources);
        self
    }

    pub fn dpi(&self) -> f64 {
        self.dpi
    }

    /// Effective page box: page Physical, page Application, page Content,
    /// document Physical, A4.
    pub fn page_box(&self, page: &PageContent) -> Box2 {
        let mut box_str = page.area.physical_box.clone();
        if box_str.is_empty() {
            box_str = page.area.application_box.clone();
        }
        if box_str.is_empty() {
            box_str = page.area.content_box.clone();
        }
        if box_str.is_empty() {
            if let Ok(bundle) = self.reader.doc() {
                box_str = bundle.document.common_data.page_area.physical_box.clone();
            }
        }
        if box_str.is_empty() {
            box_str = "0 0 210 297".to_string();
        }
        parse_box(&box_str)
    }

    /// Render one page into a fresh draw-op recording.
    pub fn render_page(&mut self, page: &PageContent) -> Result<PageCanvas, RenderError> {
        let page_box = self.page_box(page);
        let mut canvas = PageCanvas::new(page_box.w, page_box.h);
        self.render_page_to_canvas(&mut canvas, page)?;
        Ok(canvas)
    }

    /// Render a page into an existing canvas: white background, background
    /// templates, layers, foreground templates, stamps.
    pub fn render_page_to_canvas(
        &mut self,
        canvas: &mut PageCanvas,
        page: &PageContent,
    ) -> Result<(), RenderError> {
        let page_box = self.page_box(page);
        let page_h = page_box.h;
        canvas.fill(
            kurbo::Rect::new(0.0, 0.0, page_box.w, page_box.h).to_path(0.1),
            canvas::WHITE,
        );
        for tpl in &page.template {
            if tpl.z_order != "Foreground" {
                self.render_template(canvas, &tpl.template_id, page_h);
            }
        }
        for layer in &page.content.layer {
            self.render_layer(canvas, layer, page_h, Inherited::default(), None);
        }
        for tpl in &page.template {
            if tpl.z_order == "Foreground" {
                self.render_template(canvas, &tpl.template_id, page_h);
            }
        }
        if let Ok(bundle) = self.reader.doc() {
            if let Some(stamps) = bundle.stamps.get(&page.id) {
                for stamp in stamps.clone() {
                    self.render_stamp(canvas, &stamp, page_h);
                }
            }
        }
        Ok(())
    }

    fn render_template(&mut self, canvas: &mut PageCanvas, template_id: &str, page_h: f64) {
        let Ok(bundle) = self.reader.doc() else {
            return;
        };
        let tpl = bundle
            .document
            .common_data
            .template_page
            .iter()
            .find(|tp| tp.id == template_id);
        let Some(tpl) = tpl else {
            return;
        };
        let base_loc = tpl.base_loc.clone();
        let root_dir = bundle.root_dir.clone();
        let Ok(content) = self.reader.page_content_at(&root_dir, &base_loc) else {
            return;
        };
        for layer in &content.content.layer {
            self.render_layer(canvas, layer, page_h, Inherited::default(), None);
        }
    }

    fn render_layer(
        &mut self,
        canvas: &mut PageCanvas,
        layer: &Layer,
        page_h: f64,
        mut inherited: Inherited,
        parent_ctm: Option<&Matrix>,
    ) {
        if !layer.draw_param.is_empty() {
            if let Some(dp) = self.resolve_draw_param(&layer.draw_param) {
                apply_param_defaults(&dp, &mut inherited);
            }
        }
        for text in &layer.text_object {
            self.render_text(canvas, text, page_h, inherited, parent_ctm);
        }
        for path in &layer.path_object {
            self.render_path(canvas, path, page_h, inherited, parent_ctm);
        }
        for image in &layer.image_object {
            self.render_image(canvas, image, page_h, parent_ctm);
        }
        for cgu in &layer.composite_graphic_unit {
            self.render_composite(canvas, cgu, page_h, inherited, parent_ctm, 0);
        }
    }

    fn render_composite(
        &mut self,
        canvas: &mut PageCanvas,
        cgu: &CompositeGraphicUnit,
        page_h: f64,
        mut inherited: Inherited,
        parent_ctm: Option<&Matrix>,
        depth: u32,
    ) {
        if depth >= MAX_COMPOSITE_DEPTH {
            debug!("composite graphic unit depth cap reached");
            return;
        }
        canvas.push();
        let mut current = Matrix::parse(&cgu.ctm);
        if let Some(parent) = parent_ctm {
            current = parent.multiply(current);
        }
        self.apply_clips(canvas, cgu.clips.as_ref(), page_h, &current);
        if !cgu.resource_id.is_empty() {
            let referenced = self
                .reader
                .doc()
                .ok()
                .and_then(|b| b.composite_units.get(&cgu.resource_id).cloned());
            if let Some(referenced) = referenced {
                self.render_composite(
                    canvas,
                    &referenced,
                    page_h,
                    inherited,
                    Some(&current),
                    depth + 1,
                );
            }
        }
        if !cgu.draw_param.is_empty() {
            if let Some(dp) = self.resolve_draw_param(&cgu.draw_param) {
                apply_param_defaults(&dp, &mut inherited);
            }
        }
        for image in &cgu.image_object {
            self.render_image(canvas, image, page_h, Some(&current));
        }
        for path in &cgu.path_object {
            self.render_path(canvas, path, page_h, inherited, Some(&current));
        }
        for text in &cgu.text_object {
            self.render_text(canvas, text, page_h, inherited, Some(&current));
        }
        for sub in &cgu.composite_graphic_unit {
            self.render_composite(canvas, sub, page_h, inherited, Some(&current), depth + 1);
        }
        canvas.pop();
    }

    /// Resolve a draw-param id through its `Relative` chain, merging child
    /// fields over the parent. A visited set breaks reference cycles: on
    /// re-entry the lookup yields nothing and the first-seen node wins.
    pub fn resolve_draw_param(&self, id: &str) -> Option<DrawParam> {
        let bundle = self.reader.doc().ok()?;
        let mut visited = HashSet::new();
        resolve_param_chain(&bundle.draw_params, id, &mut visited)
    }

    fn apply_clips(
        &mut self,
        canvas: &mut PageCanvas,
        clips: Option<&Clips>,
        page_h: f64,
        parent_ctm: &Matrix,
    ) {
        let Some(clips) = clips else {
            return;
        };
        for clip in &clips.clip {
            for area in &clip.area {
                for path_obj in &area.path {
                    let mut clip_ctm = Matrix::parse(&path_obj.ctm);
                    clip_ctm = parent_ctm.multiply(clip_ctm);
                    let path = build_path(path_obj, page_h, clip_ctm);
                    if !path.elements().is_empty() {
                        canvas.clip(path);
                    }
                }
            }
        }
    }

    fn render_path(
        &mut self,
        canvas: &mut PageCanvas,
        obj: &PathObject,
        page_h: f64,
        inherited: Inherited,
        parent_ctm: Option<&Matrix>,
    ) {
        canvas.push();
        let mut ctm = Matrix::parse(&obj.ctm);
        if let Some(parent) = parent_ctm {
            ctm = parent.multiply(ctm);
        }
        self.apply_clips(canvas, obj.clips.as_ref(), page_h, &ctm);

        let mut fill_color = inherited.fill;
        let mut stroke_color = inherited.stroke;
        let mut style = StrokeStyle {
            width: if inherited.line_width > 0.0 {
                inherited.line_width
            } else {
                0.353
            },
            ..StrokeStyle::default()
        };
        if !obj.draw_param.is_empty() {
            if let Some(dp) = self.resolve_draw_param(&obj.draw_param) {
                if dp.line_width > 0.0 {
                    style.width = dp.line_width;
                }
                if let Some(color) = &dp.fill_color {
                    if let Some(parsed) = parse_color(&color.value, color.alpha) {
                        fill_color = Some(parsed);
                    }
                }
                if let Some(color) = &dp.stroke_color {
                    if let Some(parsed) = parse_color(&color.value, color.alpha) {
                        stroke_color = Some(parsed);
                    }
                }
                apply_cap_join(&mut style, &dp.cap, &dp.join);
                if !dp.dash_pattern.is_empty() {
                    style.dash_pattern = parse_floats(&dp.dash_pattern);
                    style.dash_offset = dp.dash_offset;
                }
                if dp.miter_limit > 0.0 {
                    style.miter_limit = dp.miter_limit;
                }
            }
        }
        if obj.line_width > 0.0 {
            style.width = obj.line_width;
        }
        if let Some(color) = &obj.fill_color {
            if let Some(parsed) = parse_color(&color.value, color.alpha) {
                fill_color = Some(parsed);
            }
        }
        if let Some(color) = &obj.stroke_color {
            if let Some(parsed) = parse_color(&color.value, color.alpha) {
                stroke_color = Some(parsed);
            }
        }
        apply_cap_join(&mut style, &obj.cap, &obj.join);
        if !obj.dash_pattern.is_empty() {
            style.dash_pattern = parse_floats(&obj.dash_pattern);
            style.dash_offset = obj.dash_offset;
        }
        if obj.miter_limit > 0.0 {
            style.miter_limit = obj.miter_limit;
        }

        let path = build_path(obj, page_h, ctm);
        if !path.elements().is_empty() {
            let should_fill = obj.fill.unwrap_or(true);
            if should_fill {
                if let Some(color) = fill_color {
                    canvas.fill(path.clone(), color);
                }
            }
            let should_stroke = obj.stroke.unwrap_or(true);
            if should_stroke {
                let color = match stroke_color {
                    Some(color) => color,
                    None => {
                        // Stroke requested with no ink defined; the stroke
                        // is emitted but draws nothing.
                        debug!("path {} stroked with undefined color", obj.id);
                        canvas::TRANSPARENT
                    }
                };
                canvas.stroke(path, color, style);
            }
        }
        canvas.pop();
    }

    fn render_image(
        &mut self,
        canvas: &mut PageCanvas,
        obj: &ImageObject,
        page_h: f64,
        parent_ctm: Option<&Matrix>,
    ) {
        let res_path = match self
            .reader
            .doc()
            .ok()
            .and_then(|b| b.res_map.get(&obj.resource_id).cloned())
        {
            Some(path) => path,
            None => {
                debug!("image resource {} not in resource table", obj.resource_id);
                return;
            }
        };
        let Ok(data) = self.reader.res_data(&res_path) else {
            debug!("image file {} unreadable", res_path);
            return;
        };
        let Ok(decoded) = image::load_from_memory(&data) else {
            debug!("image {} undecodable", res_path);
            return;
        };
        let rgba = decoded.to_rgba8();
        let (img_w, img_h) = (rgba.width(), rgba.height());
        if img_w == 0 || img_h == 0 {
            return;
        }
        let boundary = parse_box(&obj.boundary);
        let mut ctm = Matrix::parse(&obj.ctm);
        if obj.ctm.is_empty() {
            ctm = Matrix::new(boundary.w, 0.0, 0.0, boundary.h, 0.0, 0.0);
        }
        if let Some(parent) = parent_ctm {
            ctm = parent.multiply(ctm);
        }
        let (tx, ty) = ctm.transform(0.0, 1.0);
        let canvas_x = tx + boundary.x;
        let canvas_y = page_h - (ty + boundary.y);
        canvas.push();
        self.apply_clips(canvas, obj.clips.as_ref(), page_h, &ctm);
        canvas.ops.push(DrawOp::Image {
            image: CanvasImage {
                width: img_w,
                height: img_h,
                rgba: std::sync::Arc::new(rgba.into_raw()),
            },
            x: canvas_x,
            y: canvas_y,
            scale_x: ctm.a / img_w as f64,
            scale_y: ctm.d / img_h as f64,
        });
        canvas.pop();
    }

    fn render_text(
        &mut self,
        canvas: &mut PageCanvas,
        obj: &TextObject,
        page_h: f64,
        inherited: Inherited,
        parent_ctm: Option<&Matrix>,
    ) {
        canvas.push();
        let boundary = parse_box(&obj.boundary);
        let (bx, by) = (boundary.x, boundary.y);
        let mut ctm = Matrix::parse(&obj.ctm);
        if let Some(parent) = parent_ctm {
            ctm = parent.multiply(ctm);
        }
        self.apply_clips(canvas, obj.clips.as_ref(), page_h, &ctm);

        let dp = if obj.draw_param.is_empty() {
            None
        } else {
            self.resolve_draw_param(&obj.draw_param)
        };

        let mut size_mm = obj.size;
        if size_mm == 0.0 {
            if let Some(dp) = &dp {
                if dp.size > 0.0 {
                    size_mm = dp.size;
                }
            }
        }
        if size_mm == 0.0 {
            size_mm = 3.5;
        }
        if obj.v_scale != 0.0 {
            size_mm *= obj.v_scale;
        }
        let y_scale = ctm.y_scale();
        if y_scale > 0.0 {
            size_mm *= y_scale;
        }

        let mut fill_color = inherited.fill.unwrap_or(canvas::BLACK);
        if let Some(dp) = &dp {
            if let Some(color) = &dp.fill_color {
                if let Some(parsed) = parse_color(&color.value, color.alpha) {
                    fill_color = parsed;
                }
            }
        }
        if let Some(color) = &obj.fill_color {
            if let Some(parsed) = parse_color(&color.value, color.alpha) {
                fill_color = parsed;
            }
        }

        let mut weight = obj.weight;
        if weight == 0 {
            if let Some(dp) = &dp {
                if dp.weight > 0 {
                    weight = dp.weight;
                }
            }
        }
        let mut bold = weight >= 700;
        let mut italic = obj.italic || dp.as_ref().is_some_and(|dp| dp.italic);

        let mut font_id = obj.font.clone();
        if font_id.is_empty() {
            if let Some(dp) = &dp {
                if !dp.font.is_empty() {
                    font_id = dp.font.clone();
                }
            }
        }
        if let Ok(bundle) = self.reader.doc() {
            if let Some(record) = bundle.fonts.get(&font_id) {
                bold |= record.bold;
                italic |= record.italic;
            }
        }
        let Some(font) = self.fonts.load(self.reader, &font_id) else {
            debug!("no typeface for font id {}", font_id);
            canvas.pop();
            return;
        };
        let gid_map = self.fonts.gid_map(&font_id).cloned();

        for tc in &obj.text_code {
            let runes: Vec<char> = if !tc.index.is_empty() {
                parse_index_runes(&tc.index, gid_map.as_ref())
            } else {
                tc.value.chars().collect()
            };
            let dxs = parse_floats(&tc.delta_x);
            let dys = parse_floats(&tc.delta_y);
            let xs = parse_floats(&tc.x);
            let ys = parse_floats(&tc.y);
            let mut cx = xs.first().copied().unwrap_or(0.0);
            let mut cy = ys.first().copied().unwrap_or(0.0);
            for (i, ch) in runes.iter().enumerate() {
                // Absolute X overrides delta; delta overrides the measured
                // advance; Y moves only on absolute or delta data.
                if i < xs.len() {
                    cx = xs[i];
                } else if i > 0 {
                    if i - 1 < dxs.len() {
                        cx += dxs[i - 1];
                    } else if dys.is_empty() {
                        cx += glyph_advance_mm(&font, *ch, size_mm);
                    }
                }
                if i < ys.len() {
                    cy = ys[i];
                } else if i > 0 && i - 1 < dys.len() {
                    cy += dys[i - 1];
                }
                let (tx, ty) = ctm.transform(cx, cy);
                let canvas_x = tx + bx;
                let canvas_y = page_h - (ty + by);
                let (path, advance) =
                    glyph_outline(&font, *ch, size_mm, canvas_x, canvas_y, bold, italic);
                canvas.ops.push(DrawOp::Glyph {
                    path,
                    x: canvas_x,
                    y: canvas_y,
                    advance,
                    color: fill_color,
                });
                if obj.decoration.contains("Underline") {
                    let offset = size_mm * 0.1;
                    let mut line = BezPath::new();
                    line.move_to((canvas_x, canvas_y - offset));
                    line.line_to((canvas_x + advance, canvas_y - offset));
                    canvas.stroke(
                        line,
                        fill_color,
                        StrokeStyle {
                            width: size_mm * 0.05,
                            ..StrokeStyle::default()
                        },
                    );
                }
            }
        }
        canvas.pop();
    }

    fn render_stamp(&mut self, canvas: &mut PageCanvas, stamp: &Stamp, page_h: f64) {
        let Box2 { x, y, w, h } = stamp.boundary;
        let screen_y = page_h - (y + h);
        if stamp.kind == "ofd" && !stamp.data.is_empty() {
            if self.render_ofd_stamp(canvas, stamp, x, screen_y, w, h) {
                return;
            }
        }
        if !stamp.data.is_empty() {
            if let Ok(decoded) = image::load_from_memory(&stamp.data) {
                let rgba = decoded.to_rgba8();
                let (img_w, img_h) = (rgba.width(), rgba.height());
                if img_w > 0 && img_h > 0 {
                    canvas.push();
                    canvas.ops.push(DrawOp::Image {
                        image: CanvasImage {
                            width: img_w,
                            height: img_h,
                            rgba: std::sync::Arc::new(rgba.into_raw()),
                        },
                        x,
                        y: screen_y,
                        scale_x: w / img_w as f64,
                        scale_y: h / img_h as f64,
                    });
                    canvas.pop();
                    return;
                }
            }
        }
        // Unrecognised payload: red placeholder frame with a label.
        canvas.push();
        let frame = kurbo::Rect::new(x, screen_y, x + w, screen_y + h).to_path(0.1);
        canvas.stroke(
            frame,
            canvas::RED,
            StrokeStyle {
                width: 0.5,
                ..StrokeStyle::default()
            },
        );
        let label = "Signature";
        let size_mm = 3.0;
        if let Some(font) = self.fonts.fallback() {
            let total: f64 = label
                .chars()
                .map(|ch| glyph_advance_mm(&font, ch, size_mm))
                .sum();
            let mut pen_x = x + w / 2.0 - total / 2.0;
            let pen_y = screen_y + h / 2.0 - size_mm / 2.0;
            for ch in label.chars() {
                let (path, advance) =
                    glyph_outline(&font, ch, size_mm, pen_x, pen_y, false, false);
                canvas.ops.push(DrawOp::Glyph {
                    path,
                    x: pen_x,
                    y: pen_y,
                    advance,
                    color: canvas::RED,
                });
                pen_x += advance;
            }
        }
        canvas.pop();
    }

    /// Nested-OFD stamp: open the payload as its own archive and replay
    /// every inner page translated and scaled into the stamp region.
    fn render_ofd_stamp(
        &mut self,
        canvas: &mut PageCanvas,
        stamp: &Stamp,
        x: f64,
        screen_y: f64,
        w: f64,
        h: f64,
    ) -> bool {
        let Ok(inner_reader) = Reader::from_bytes(stamp.data.clone()) else {
            return false;
        };
        if inner_reader.doc().is_err() {
            return false;
        }
        let pages: Vec<_> = match inner_reader.pages() {
            Ok(pages) => pages.to_vec(),
            Err(_) => return false,
        };
        let mut inner_renderer = Renderer::new(&inner_reader);
        for page_ref in &pages {
            let Ok(content) = inner_reader.page_content(page_ref) else {
                continue;
            };
            let seal_box = inner_renderer.page_box(&content);
            if seal_box.w <= 0.0 || seal_box.h <= 0.0 {
                continue;
            }
            let Ok(inner_canvas) = inner_renderer.render_page(&content) else {
                continue;
            };
            canvas.push();
            append_scaled(canvas, inner_canvas, x, screen_y, w / seal_box.w, h / seal_box.h);
            canvas.pop();
        }
        true
    }

    /// Render the page at `index` of the document's page list.
    pub fn render_page_by_index(&mut self, index: usize) -> Result<PageCanvas, RenderError> {
        let pages = self.reader.pages()?;
        let page_ref = pages
            .get(index)
            .cloned()
            .ok_or(RenderError::PageOutOfRange(index))?;
        let content = self.reader.page_content(&page_ref)?;
        self.render_page(&content)
    }

    /// Rasterise at the configured DPI.
    pub fn render_to_image(
        &mut self,
        page: &PageContent,
    ) -> Result<tiny_skia::Pixmap, RenderError> {
        let canvas = self.render_page(page)?;
        raster::rasterize(&canvas, self.dpi).map_err(RenderError::Raster)
    }

    pub fn render_to_png(&mut self, page: &PageContent) -> Result<Vec<u8>, RenderError> {
        let pixmap = self.render_to_image(page)?;
        pixmap
            .encode_png()
            .map_err(|e| RenderError::Raster(e.to_string()))
    }

    pub fn render_to_svg<W: Write>(
        &mut self,
        page: &PageContent,
        writer: &mut W,
    ) -> Result<(), RenderError> {
        let canvas = self.render_page(page)?;
        svg::write_svg(&canvas, writer).map_err(|e| RenderError::Io(e.to_string()))
    }

    pub fn render_to_eps<W: Write>(
        &mut self,
        page: &PageContent,
        writer: &mut W,
    ) -> Result<(), RenderError> {
        let canvas = self.render_page(page)?;
        eps::write_eps(&canvas, writer).map_err(|e| RenderError::Io(e.to_string()))
    }

    pub fn render_to_pdf<W: Write>(
        &mut self,
        page: &PageContent,
        writer: &mut W,
    ) -> Result<(), RenderError> {
        let canvas = self.render_page(page)?;
        let mut pdf = PdfWriter::new();
        pdf.add_page(&canvas);
        pdf.finish(writer).map_err(|e| RenderError::Io(e.to_string()))
    }

    /// Export the whole document through one PDF writer. A page that fails
    /// to load or render is skipped; zero surviving pages is an error.
    pub fn render_to_multipage_pdf<W: Write>(
        &mut self,
        writer: &mut W,
    ) -> Result<(), RenderError> {
        let pages = self.reader.pages()?.to_vec();
        if pages.is_empty() {
            return Err(RenderError::Read(ReadError::NoPages));
        }
        let mut pdf = PdfWriter::new();
        let mut rendered = 0usize;
        for page_ref in &pages {
            let Ok(content) = self.reader.page_content(page_ref) else {
                continue;
            };
            let Ok(canvas) = self.render_page(&content) else {
                continue;
            };
            pdf.add_page(&canvas);
            rendered += 1;
        }
        if rendered == 0 {
            return Err(RenderError::NoPagesRendered);
        }
        pdf.finish(writer).map_err(|e| RenderError::Io(e.to_string()))
    }
}

fn apply_param_defaults(dp: &DrawParam, inherited: &mut Inherited) {
    if dp.line_width > 0.0 {
        inherited.line_width = dp.line_width;
    }
    if let Some(color) = &dp.fill_color {
        if let Some(parsed) = parse_color(&color.value, color.alpha) {
            inherited.fill = Some(parsed);
        }
    }
    if let Some(color) = &dp.stroke_color {
        if let Some(parsed) = parse_color(&color.value, color.alpha) {
            inherited.stroke = Some(parsed);
        }
    }
}

fn apply_cap_join(style: &mut StrokeStyle, cap: &str, join: &str) {
    match cap {
        "Round" => style.cap = LineCap::Round,
        "Square" => style.cap = LineCap::Square,
        "Butt" => style.cap = LineCap::Butt,
        _ => {}
    }
    match join {
        "Round" => style.join = LineJoin::Round,
        "Bevel" => style.join = LineJoin::Bevel,
        "Miter" => style.join = LineJoin::Miter,
        _ => {}
    }
}

fn resolve_param_chain(
    params: &std::collections::HashMap<String, DrawParam>,
    id: &str,
    visited: &mut HashSet<String>,
) -> Option<DrawParam> {
    if visited.contains(id) {
        return None;
    }
    visited.insert(id.to_string());
    let dp = params.get(id)?;
    if dp.relative.is_empty() {
        return Some(dp.clone());
    }
    let Some(base) = resolve_param_chain(params, &dp.relative, visited) else {
        return Some(dp.clone());
    };
    let mut merged = base;
    if dp.line_width > 0.0 {
        merged.line_width = dp.line_width;
    }
    if !dp.join.is_empty() {
        merged.join = dp.join.clone();
    }
    if !dp.cap.is_empty() {
        merged.cap = dp.cap.clone();
    }
    if !dp.dash_pattern.is_empty() {
        merged.dash_pattern = dp.dash_pattern.clone();
        merged.dash_offset = dp.dash_offset;
    }
    if dp.miter_limit > 0.0 {
        merged.miter_limit = dp.miter_limit;
    }
    if dp.fill_color.is_some() {
        merged.fill_color = dp.fill_color.clone();
    }
    if dp.stroke_color.is_some() {
        merged.stroke_color = dp.stroke_color.clone();
    }
    if !dp.font.is_empty() {
        merged.font = dp.font.clone();
    }
    if dp.size > 0.0 {
        merged.size = dp.size;
    }
    if dp.weight > 0 {
        merged.weight = dp.weight;
    }
    if dp.italic {
        merged.italic = dp.italic;
    }
    merged.id = dp.id.clone();
    Some(merged)
}

/// Expand an `Index` attribute into characters: whitespace-separated glyph
/// ids with inclusive `a-b` ranges, rewritten through the repaired font's
/// glyph-id table when one exists.
fn parse_index_runes(
    index: &str,
    gid_map: Option<&std::collections::HashMap<u16, char>>,
) -> Vec<char> {
    let mut gids: Vec<u32> = Vec::new();
    for part in index.split_whitespace() {
        if let Some((start, end)) = part.split_once('-') {
            let start: u32 = start.parse().unwrap_or(0);
            let end: u32 = end.parse().unwrap_or(0);
            for gid in start..=end {
                gids.push(gid);
            }
        } else if let Ok(gid) = part.parse::<u32>() {
            gids.push(gid);
        }
    }
    let mut out = Vec::with_capacity(gids.len());
    for gid in gids {
        if let Some(map) = gid_map {
            if gid <= u16::MAX as u32 {
                if let Some(ch) = map.get(&(gid as u16)) {
                    out.push(*ch);
                    continue;
                }
            }
        }
        out.push(char::from_u32(gid).unwrap_or('\u{FFFD}'));
    }
    out
}

fn glyph_advance_mm(font: &LoadedFont, ch: char, size_mm: f64) -> f64 {
    let Some(face) = font.face() else {
        return 0.0;
    };
    let upem = face.units_per_em().max(1) as f64;
    let gid = match face.glyph_index(ch) {
        Some(gid) => gid,
        None => ttf_parser::GlyphId(0),
    };
    let advance = face.glyph_hor_advance(gid).unwrap_or(0) as f64;
    advance * size_mm / upem
}

struct GlyphPathBuilder {
    path: BezPath,
    origin_x: f64,
    origin_y: f64,
    scale: f64,
    /// Synthetic oblique shear applied in glyph space.
    shear: f64,
}

impl GlyphPathBuilder {
    fn point(&self, x: f32, y: f32) -> Point {
        let gx = x as f64 + self.shear * y as f64;
        Point::new(
            self.origin_x + gx * self.scale,
            self.origin_y + y as f64 * self.scale,
        )
    }
}

impl ttf_parser::OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        let p = self.point(x, y);
        self.path.move_to(p);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let p = self.point(x, y);
        self.path.line_to(p);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let p1 = self.point(x1, y1);
        let p = self.point(x, y);
        self.path.quad_to(p1, p);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let p1 = self.point(x1, y1);
        let p2 = self.point(x2, y2);
        let p = self.point(x, y);
        self.path.curve_to(p1, p2, p);
    }

    fn close(&mut self) {
        self.path.close_path();
    }
}

/// Outline one glyph in page space at `(x, y)`. Missing outline data still
/// yields the advance so the pen keeps moving.
fn glyph_outline(
    font: &LoadedFont,
    ch: char,
    size_mm: f64,
    x: f64,
    y: f64,
    bold: bool,
    italic: bool,
) -> (BezPath, f64) {
    let Some(face) = font.face() else {
        return (BezPath::new(), 0.0);
    };
    let upem = face.units_per_em().max(1) as f64;
    let scale = size_mm / upem;
    let gid = match face.glyph_index(ch) {
        Some(gid) => gid,
        None => ttf_parser::GlyphId(0),
    };
    let mut builder = GlyphPathBuilder {
        path: BezPath::new(),
        origin_x: x,
        origin_y: y,
        scale,
        shear: if italic && !font.italic { 0.2 } else { 0.0 },
    };
    face.outline_glyph(gid, &mut builder);
    let advance = face.glyph_hor_advance(gid).unwrap_or(0) as f64 * scale;
    let mut path = builder.path;
    if bold && !font.bold && !path.elements().is_empty() {
        // Synthetic emboldening: grow the outline slightly around its
        // own origin.
        let grow = 1.0 + 0.04;
        let affine = Affine::translate((x * (1.0 - grow), y * (1.0 - grow)))
            * Affine::scale(grow);
        let mut widened = path.clone();
        widened.apply_affine(affine);
        path = widened;
    }
    (path, advance)
}

/// Parse `AbbreviatedData` into a canvas-space path: every coordinate is
/// transformed by the CTM, offset by the boundary origin and flipped out
/// of the top-left system. Unknown tokens and truncated operand tails are
/// skipped.
pub(crate) fn build_path(obj: &PathObject, page_h: f64, ctm: Matrix) -> BezPath {
    let boundary = parse_box(&obj.boundary);
    let (bx, by) = (boundary.x, boundary.y);
    let mut path = BezPath::new();
    let mut cur = Point::ZERO;
    let tokens: Vec<&str> = obj.abbreviated_data.split_whitespace().collect();
    let mut i = 0;
    let to_canvas = |x: f64, y: f64| -> Point {
        let (tx, ty) = ctm.transform(x, y);
        Point::new(tx + bx, page_h - (ty + by))
    };
    let num = |tokens: &[&str], idx: usize| -> f64 {
        tokens
            .get(idx)
            .and_then(|t| t.parse::<f64>().ok())
            .unwrap_or(0.0)
    };
    while i < tokens.len() {
        let cmd = tokens[i];
        i += 1;
        match cmd {
            "M" | "S" => {
                if i + 1 < tokens.len() {
                    let p = to_canvas(num(&tokens, i), num(&tokens, i + 1));
                    path.move_to(p);
                    cur = p;
                    i += 2;
                }
            }
            "L" => {
                if i + 1 < tokens.len() {
                    let p = to_canvas(num(&tokens, i), num(&tokens, i + 1));
                    path.line_to(p);
                    cur = p;
                    i += 2;
                }
            }
            "B" => {
                if i + 5 < tokens.len() {
                    let p1 = to_canvas(num(&tokens, i), num(&tokens, i + 1));
                    let p2 = to_canvas(num(&tokens, i + 2), num(&tokens, i + 3));
                    let p3 = to_canvas(num(&tokens, i + 4), num(&tokens, i + 5));
                    path.curve_to(p1, p2, p3);
                    cur = p3;
                    i += 6;
                }
            }
            "Q" => {
                if i + 3 < tokens.len() {
                    let p1 = to_canvas(num(&tokens, i), num(&tokens, i + 1));
                    let p2 = to_canvas(num(&tokens, i + 2), num(&tokens, i + 3));
                    path.quad_to(p1, p2);
                    cur = p2;
                    i += 4;
                }
            }
            "A" => {
                if i + 6 < tokens.len() {
                    let rx = num(&tokens, i);
                    let ry = num(&tokens, i + 1);
                    let rot = num(&tokens, i + 2);
                    let large = tokens.get(i + 3).is_some_and(|t| *t == "1" || *t == "true");
                    let sweep = tokens.get(i + 4).is_some_and(|t| *t == "1" || *t == "true");
                    let to = to_canvas(num(&tokens, i + 5), num(&tokens, i + 6));
                    // Radii pick up the matrix row norms and the rotation
                    // gains the matrix rotation; the sweep flips with the
                    // Y axis.
                    let sx = ctm.a.hypot(ctm.c);
                    let sy = ctm.b.hypot(ctm.d);
                    let ctm_rot = ctm.b.atan2(ctm.a).to_degrees();
                    let arc = SvgArc {
                        from: cur,
                        to,
                        radii: Vec2::new(rx * sx, ry * sy),
                        x_rotation: (-(rot + ctm_rot)).to_radians(),
                        large_arc: large,
                        sweep: !sweep,
                    };
                    match EllipticalArc::from_svg_arc(&arc) {
                        Some(arc) => path.extend(arc.append_iter(0.1)),
                        None => path.line_to(to),
                    }
                    cur = to;
                    i += 7;
                }
            }
            "C" => {
                path.close_path();
            }
            _ => {}
        }
    }
    path
}

/// Replay recorded ops into another canvas, translated and scaled. Used
/// for nested-OFD stamps.
fn append_scaled(dst: &mut PageCanvas, src: PageCanvas, tx: f64, ty: f64, sx: f64, sy: f64) {
    let affine = Affine::new([sx, 0.0, 0.0, sy, tx, ty]);
    for op in src.ops {
        match op {
            DrawOp::Push => dst.push(),
            DrawOp::Pop => dst.pop(),
            DrawOp::Clip(mut path) => {
                path.apply_affine(affine);
                dst.clip(path);
            }
            DrawOp::Fill { mut path, color } => {
                path.apply_affine(affine);
                dst.fill(path, color);
            }
            DrawOp::Stroke {
                mut path,
                color,
                mut style,
            } => {
                path.apply_affine(affine);
                style.width *= sx;
                for dash in &mut style.dash_pattern {
                    *dash *= sx;
                }
                style.dash_offset *= sx;
                dst.stroke(path, color, style);
            }
            DrawOp::Glyph {
                mut path,
                x,
                y,
                advance,
                color,
            } => {
                path.apply_affine(affine);
                dst.ops.push(DrawOp::Glyph {
                    path,
                    x: tx + x * sx,
                    y: ty + y * sy,
                    advance: advance * sx,
                    color,
                });
            }
            DrawOp::Image {
                image,
                x,
                y,
                scale_x,
                scale_y,
            } => {
                dst.ops.push(DrawOp::Image {
                    image,
                    x: tx + x * sx,
                    y: ty + y * sy,
                    scale_x: scale_x * sx,
                    scale_y: scale_y * sy,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PathObject;

    fn path_obj(data: &str, boundary: &str) -> PathObject {
        PathObject {
            abbreviated_data: data.to_string(),
            boundary: boundary.to_string(),
            ..PathObject::default()
        }
    }

    #[test]
    fn test_build_path_flips_y() {
        let obj = path_obj("M 0 0 L 100 0 L 100 50 L 0 50 C", "0 0 100 50");
        let path = build_path(&obj, 297.0, Matrix::default());
        let elements = path.elements();
        assert_eq!(elements.len(), 5);
        match elements[0] {
            kurbo::PathEl::MoveTo(p) => {
                assert_eq!((p.x, p.y), (0.0, 297.0));
            }
            _ => panic!("expected MoveTo"),
        }
        match elements[2] {
            kurbo::PathEl::LineTo(p) => {
                assert_eq!((p.x, p.y), (100.0, 247.0));
            }
            _ => panic!("expected LineTo"),
        }
        assert!(matches!(elements[4], kurbo::PathEl::ClosePath));
    }

    #[test]
    fn test_build_path_skips_truncated_tail() {
        let obj = path_obj("M 0 0 L 10", "0 0 10 10");
        let path = build_path(&obj, 100.0, Matrix::default());
        // the truncated L contributes nothing
        assert_eq!(path.elements().len(), 1);
    }

    #[test]
    fn test_index_runes_ranges_and_map() {
        let mut map = std::collections::HashMap::new();
        map.insert(3u16, '中');
        let runes = parse_index_runes("1-3 65", Some(&map));
        assert_eq!(runes, vec!['\u{1}', '\u{2}', '中', 'A']);
        let runes = parse_index_runes("65 66", None);
        assert_eq!(runes, vec!['A', 'B']);
    }
}
