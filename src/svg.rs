//! SVG back-end. The recorded page is bottom-left-up millimetres; every
//! path is flipped into SVG's top-left space before serialisation, images
//! are inlined as base64 PNG.

use std::io::{self, Write};

use base64::Engine;
use kurbo::Affine;

use crate::canvas::{DrawOp, LineCap, LineJoin, PageCanvas, Rgba, StrokeStyle};

pub fn write_svg<W: Write>(canvas: &PageCanvas, writer: &mut W) -> io::Result<()> {
    let (w, h) = (canvas.width, canvas.height);
    writeln!(writer, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>")?;
    writeln!(
        writer,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" xmlns:xlink=\"http://www.w3.org/1999/xlink\" width=\"{w}mm\" height=\"{h}mm\" viewBox=\"0 0 {w} {h}\">"
    )?;
    let flip = Affine::new([1.0, 0.0, 0.0, -1.0, 0.0, h]);
    let mut clip_id = 0usize;
    // Open-group counts per push scope so pops close exactly the clip
    // groups their scope introduced.
    let mut groups: Vec<usize> = vec![0];
    for op in &canvas.ops {
        match op {
            DrawOp::Push => groups.push(0),
            DrawOp::Pop => {
                if groups.len() > 1 {
                    let opened = groups.pop().unwrap_or(0);
                    for _ in 0..opened {
                        writeln!(writer, "</g>")?;
                    }
                }
            }
            DrawOp::Clip(path) => {
                let mut flipped = path.clone();
                flipped.apply_affine(flip);
                writeln!(
                    writer,
                    "<clipPath id=\"clip{}\"><path d=\"{}\"/></clipPath>",
                    clip_id,
                    flipped.to_svg()
                )?;
                writeln!(writer, "<g clip-path=\"url(#clip{})\">", clip_id)?;
                clip_id += 1;
                if let Some(count) = groups.last_mut() {
                    *count += 1;
                }
            }
            DrawOp::Fill { path, color } => {
                write_fill(writer, path, *color, flip)?;
            }
            DrawOp::Glyph { path, color, .. } => {
                if !path.elements().is_empty() {
                    write_fill(writer, path, *color, flip)?;
                }
            }
            DrawOp::Stroke { path, color, style } => {
                write_stroke(writer, path, *color, style, flip)?;
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
                let top = h - (y + height_mm);
                let Some(buffer) = image::RgbaImage::from_raw(
                    image.width,
                    image.height,
                    image.rgba.as_ref().clone(),
                ) else {
                    continue;
                };
                let mut png = Vec::new();
                if image::DynamicImage::ImageRgba8(buffer)
                    .write_to(&mut io::Cursor::new(&mut png), image::ImageFormat::Png)
                    .is_err()
                {
                    continue;
                }
                let encoded = base64::engine::general_purpose::STANDARD.encode(&png);
                writeln!(
                    writer,
                    "<image x=\"{x}\" y=\"{top}\" width=\"{width_mm}\" height=\"{height_mm}\" preserveAspectRatio=\"none\" xlink:href=\"data:image/png;base64,{encoded}\"/>"
                )?;
            }
        }
    }
    for count in groups {
        for _ in 0..count {
            writeln!(writer, "</g>")?;
        }
    }
    writeln!(writer, "</svg>")?;
    Ok(())
}

fn hex_color(color: Rgba) -> String {
    format!("#{:02X}{:02X}{:02X}", color.r, color.g, color.b)
}

fn write_fill<W: Write>(
    writer: &mut W,
    path: &kurbo::BezPath,
    color: Rgba,
    flip: Affine,
) -> io::Result<()> {
    let mut flipped = path.clone();
    flipped.apply_affine(flip);
    write!(writer, "<path d=\"{}\" fill=\"{}\"", flipped.to_svg(), hex_color(color))?;
    if color.a < 255 {
        write!(writer, " fill-opacity=\"{:.3}\"", color.a as f64 / 255.0)?;
    }
    writeln!(writer, "/>")
}

fn write_stroke<W: Write>(
    writer: &mut W,
    path: &kurbo::BezPath,
    color: Rgba,
    style: &StrokeStyle,
    flip: Affine,
) -> io::Result<()> {
    let mut flipped = path.clone();
    flipped.apply_affine(flip);
    write!(
        writer,
        "<path d=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"{}\"",
        flipped.to_svg(),
        hex_color(color),
        style.width
    )?;
    if color.a < 255 {
        write!(writer, " stroke-opacity=\"{:.3}\"", color.a as f64 / 255.0)?;
    }
    match style.cap {
        LineCap::Butt => {}
        LineCap::Round => write!(writer, " stroke-linecap=\"round\"")?,
        LineCap::Square => write!(writer, " stroke-linecap=\"square\"")?,
    }
    match style.join {
        LineJoin::Miter => {}
        LineJoin::Round => write!(writer, " stroke-linejoin=\"round\"")?,
        LineJoin::Bevel => write!(writer, " stroke-linejoin=\"bevel\"")?,
    }
    if style.miter_limit > 0.0 {
        write!(writer, " stroke-miterlimit=\"{}\"", style.miter_limit)?;
    }
    if !style.dash_pattern.is_empty() {
        let dashes: Vec<String> = style.dash_pattern.iter().map(|d| d.to_string()).collect();
        write!(writer, " stroke-dasharray=\"{}\"", dashes.join(" "))?;
        if style.dash_offset != 0.0 {
            write!(writer, " stroke-dashoffset=\"{}\"", style.dash_offset)?;
        }
    }
    writeln!(writer, "/>")
}
