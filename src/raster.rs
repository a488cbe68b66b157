//! Raster back-end: replays a recorded page into a tiny-skia pixmap at a
//! given DPI. Clips become alpha masks, dashes and joins map onto the
//! stroker, images are premultiplied and composited through the flip
//! transform.

use kurbo::PathEl;
use tiny_skia::{
    FillRule, Mask, Paint, PathBuilder, Pixmap, PixmapPaint, Stroke, StrokeDash, Transform,
};

use crate::canvas::{CanvasImage, DrawOp, LineCap, LineJoin, PageCanvas, Rgba, StrokeStyle};

pub fn rasterize(canvas: &PageCanvas, dpi: f64) -> Result<Pixmap, String> {
    let dpmm = dpi / 25.4;
    let width_px = (canvas.width * dpmm).round().max(1.0) as u32;
    let height_px = (canvas.height * dpmm).round().max(1.0) as u32;
    let mut pixmap = Pixmap::new(width_px, height_px)
        .ok_or_else(|| format!("invalid raster size {}x{} at {} dpi", width_px, height_px, dpi))?;
    pixmap.fill(tiny_skia::Color::from_rgba8(255, 255, 255, 255));
    let s = dpmm as f32;
    // Canvas space is millimetres, bottom-left origin; flip into pixels.
    let base = Transform::from_row(s, 0.0, 0.0, -s, 0.0, canvas.height as f32 * s);

    let mut clip: Option<Mask> = None;
    let mut stack: Vec<Option<Mask>> = Vec::new();
    for op in &canvas.ops {
        match op {
            DrawOp::Push => stack.push(clip.clone()),
            DrawOp::Pop => {
                if let Some(prev) = stack.pop() {
                    clip = prev;
                }
            }
            DrawOp::Clip(path) => {
                if let Some(sk_path) = to_sk_path(path) {
                    apply_clip(&mut clip, &sk_path, base, width_px, height_px);
                }
            }
            DrawOp::Fill { path, color } => {
                fill_path(&mut pixmap, path, *color, base, clip.as_ref());
            }
            DrawOp::Glyph { path, color, .. } => {
                fill_path(&mut pixmap, path, *color, base, clip.as_ref());
            }
            DrawOp::Stroke { path, color, style } => {
                stroke_path(&mut pixmap, path, *color, style, base, clip.as_ref());
            }
            DrawOp::Image {
                image,
                x,
                y,
                scale_x,
                scale_y,
            } => {
                draw_image(
                    &mut pixmap,
                    image,
                    *x,
                    *y,
                    *scale_x,
                    *scale_y,
                    base,
                    clip.as_ref(),
                );
            }
        }
    }
    Ok(pixmap)
}

fn to_sk_path(path: &kurbo::BezPath) -> Option<tiny_skia::Path> {
    let mut builder = PathBuilder::new();
    for el in path.elements() {
        match el {
            PathEl::MoveTo(p) => builder.move_to(p.x as f32, p.y as f32),
            PathEl::LineTo(p) => builder.line_to(p.x as f32, p.y as f32),
            PathEl::QuadTo(p1, p) => {
                builder.quad_to(p1.x as f32, p1.y as f32, p.x as f32, p.y as f32)
            }
            PathEl::CurveTo(p1, p2, p) => builder.cubic_to(
                p1.x as f32,
                p1.y as f32,
                p2.x as f32,
                p2.y as f32,
                p.x as f32,
                p.y as f32,
            ),
            PathEl::ClosePath => builder.close(),
        }
    }
    builder.finish()
}

fn apply_clip(clip: &mut Option<Mask>, path: &tiny_skia::Path, ts: Transform, w: u32, h: u32) {
    if let Some(mask) = clip.as_mut() {
        mask.intersect_path(path, FillRule::Winding, true, ts);
        return;
    }
    let Some(mut mask) = Mask::new(w, h) else {
        return;
    };
    mask.fill_path(path, FillRule::Winding, true, ts);
    *clip = Some(mask);
}

fn make_paint(color: Rgba) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(tiny_skia::Color::from_rgba8(color.r, color.g, color.b, color.a));
    paint.anti_alias = true;
    paint
}

fn fill_path(
    pixmap: &mut Pixmap,
    path: &kurbo::BezPath,
    color: Rgba,
    base: Transform,
    clip: Option<&Mask>,
) {
    if color.a == 0 {
        return;
    }
    let Some(sk_path) = to_sk_path(path) else {
        return;
    };
    pixmap.fill_path(&sk_path, &make_paint(color), FillRule::Winding, base, clip);
}

fn stroke_path(
    pixmap: &mut Pixmap,
    path: &kurbo::BezPath,
    color: Rgba,
    style: &StrokeStyle,
    base: Transform,
    clip: Option<&Mask>,
) {
    if color.a == 0 {
        return;
    }
    let Some(sk_path) = to_sk_path(path) else {
        return;
    };
    let mut stroke = Stroke {
        width: style.width as f32,
        miter_limit: style.miter_limit as f32,
        line_cap: match style.cap {
            LineCap::Butt => tiny_skia::LineCap::Butt,
            LineCap::Round => tiny_skia::LineCap::Round,
            LineCap::Square => tiny_skia::LineCap::Square,
        },
        line_join: match style.join {
            LineJoin::Miter => tiny_skia::LineJoin::Miter,
            LineJoin::Round => tiny_skia::LineJoin::Round,
            LineJoin::Bevel => tiny_skia::LineJoin::Bevel,
        },
        dash: None,
    };
    if !style.dash_pattern.is_empty() {
        let mut pattern: Vec<f32> = style
            .dash_pattern
            .iter()
            .map(|d| d.abs() as f32)
            .collect();
        if pattern.len() % 2 == 1 {
            let copy = pattern.clone();
            pattern.extend(copy);
        }
        if pattern.len() >= 2 {
            stroke.dash = StrokeDash::new(pattern, style.dash_offset as f32);
        }
    }
    pixmap.stroke_path(&sk_path, &make_paint(color), &stroke, base, clip);
}

fn draw_image(
    pixmap: &mut Pixmap,
    image: &CanvasImage,
    x: f64,
    y: f64,
    scale_x: f64,
    scale_y: f64,
    base: Transform,
    clip: Option<&Mask>,
) {
    let Some(mut source) = Pixmap::new(image.width, image.height) else {
        return;
    };
    let src = image.rgba.as_slice();
    let dst = source.data_mut();
    for (src_px, dst_px) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
        let a = src_px[3];
        dst_px[0] = premul_u8(src_px[0], a);
        dst_px[1] = premul_u8(src_px[1], a);
        dst_px[2] = premul_u8(src_px[2], a);
        dst_px[3] = a;
    }
    let height_mm = image.height as f64 * scale_y;
    // Source row 0 is the image top; the anchor is the bottom-left corner.
    let local = Transform::from_row(
        scale_x as f32,
        0.0,
        0.0,
        -(scale_y as f32),
        x as f32,
        (y + height_mm) as f32,
    );
    let mut paint = PixmapPaint::default();
    paint.quality = tiny_skia::FilterQuality::Bilinear;
    pixmap.draw_pixmap(0, 0, source.as_ref(), &paint, base.pre_concat(local), clip);
}

fn premul_u8(value: u8, alpha: u8) -> u8 {
    ((value as u16 * alpha as u16 + 127) / 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::PageCanvas;

    #[test]
    fn test_raster_dimensions_follow_dpi() {
        let canvas = PageCanvas::new(210.0, 297.0);
        let pixmap = rasterize(&canvas, 300.0).expect("raster");
        assert_eq!(pixmap.width(), 2480);
        assert_eq!(pixmap.height(), 3508);
    }
}
