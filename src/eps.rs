//! EPS back-end. PostScript shares the canvas's bottom-left Y-up
//! orientation, so only the millimetre-to-point scale is applied. Images
//! go through `colorimage` with hex data, composited against white since
//! PostScript has no alpha channel.

use std::io::{self, Write};

use kurbo::{PathEl, Point};

use crate::canvas::{
    quad_to_cubic, DrawOp, LineCap, LineJoin, PageCanvas, Rgba, StrokeStyle, MM_TO_PT,
};

pub fn write_eps<W: Write>(canvas: &PageCanvas, writer: &mut W) -> io::Result<()> {
    let w_pt = (canvas.width * MM_TO_PT).ceil() as i64;
    let h_pt = (canvas.height * MM_TO_PT).ceil() as i64;
    writeln!(writer, "%!PS-Adobe-3.0 EPSF-3.0")?;
    writeln!(writer, "%%BoundingBox: 0 0 {} {}", w_pt, h_pt)?;
    writeln!(writer, "%%Pages: 1")?;
    writeln!(writer, "%%EndComments")?;
    writeln!(writer, "{0} {0} scale", MM_TO_PT)?;
    for op in &canvas.ops {
        match op {
            DrawOp::Push => writeln!(writer, "gsave")?,
            DrawOp::Pop => writeln!(writer, "grestore")?,
            DrawOp::Clip(path) => {
                write_path(writer, path)?;
                writeln!(writer, "clip newpath")?;
            }
            DrawOp::Fill { path, color } => {
                if color.a > 0 {
                    write_color(writer, *color)?;
                    write_path(writer, path)?;
                    writeln!(writer, "fill")?;
                }
            }
            DrawOp::Glyph { path, color, .. } => {
                if color.a > 0 && !path.elements().is_empty() {
                    write_color(writer, *color)?;
                    write_path(writer, path)?;
                    writeln!(writer, "fill")?;
                }
            }
            DrawOp::Stroke { path, color, style } => {
                if color.a > 0 {
                    write_color(writer, *color)?;
                    write_stroke_style(writer, style)?;
                    write_path(writer, path)?;
                    writeln!(writer, "stroke")?;
                }
            }
            DrawOp::Image {
                image,
                x,
                y,
                scale_x,
                scale_y,
            } => {
                write_image(writer, image, *x, *y, *scale_x, *scale_y)?;
            }
        }
    }
    writeln!(writer, "showpage")?;
    writeln!(writer, "%%EOF")?;
    Ok(())
}

fn write_color<W: Write>(writer: &mut W, color: Rgba) -> io::Result<()> {
    writeln!(
        writer,
        "{:.4} {:.4} {:.4} setrgbcolor",
        color.r as f64 / 255.0,
        color.g as f64 / 255.0,
        color.b as f64 / 255.0
    )
}

fn write_stroke_style<W: Write>(writer: &mut W, style: &StrokeStyle) -> io::Result<()> {
    writeln!(writer, "{} setlinewidth", style.width)?;
    let cap = match style.cap {
        LineCap::Butt => 0,
        LineCap::Round => 1,
        LineCap::Square => 2,
    };
    writeln!(writer, "{} setlinecap", cap)?;
    let join = match style.join {
        LineJoin::Miter => 0,
        LineJoin::Round => 1,
        LineJoin::Bevel => 2,
    };
    writeln!(writer, "{} setlinejoin", join)?;
    if style.miter_limit >= 1.0 {
        writeln!(writer, "{} setmiterlimit", style.miter_limit)?;
    }
    if style.dash_pattern.is_empty() {
        writeln!(writer, "[] 0 setdash")?;
    } else {
        let dashes: Vec<String> = style.dash_pattern.iter().map(|d| d.to_string()).collect();
        writeln!(writer, "[{}] {} setdash", dashes.join(" "), style.dash_offset)?;
    }
    Ok(())
}

fn write_path<W: Write>(writer: &mut W, path: &kurbo::BezPath) -> io::Result<()> {
    writeln!(writer, "newpath")?;
    let mut cur = Point::ZERO;
    for el in path.elements() {
        match el {
            PathEl::MoveTo(p) => {
                writeln!(writer, "{:.4} {:.4} moveto", p.x, p.y)?;
                cur = *p;
            }
            PathEl::LineTo(p) => {
                writeln!(writer, "{:.4} {:.4} lineto", p.x, p.y)?;
                cur = *p;
            }
            PathEl::QuadTo(p1, p) => {
                let (c1, c2) = quad_to_cubic(cur, *p1, *p);
                writeln!(
                    writer,
                    "{:.4} {:.4} {:.4} {:.4} {:.4} {:.4} curveto",
                    c1.x, c1.y, c2.x, c2.y, p.x, p.y
                )?;
                cur = *p;
            }
            PathEl::CurveTo(p1, p2, p) => {
                writeln!(
                    writer,
                    "{:.4} {:.4} {:.4} {:.4} {:.4} {:.4} curveto",
                    p1.x, p1.y, p2.x, p2.y, p.x, p.y
                )?;
                cur = *p;
            }
            PathEl::ClosePath => writeln!(writer, "closepath")?,
        }
    }
    Ok(())
}

fn write_image<W: Write>(
    writer: &mut W,
    image: &crate::canvas::CanvasImage,
    x: f64,
    y: f64,
    scale_x: f64,
    scale_y: f64,
) -> io::Result<()> {
    let (w, h) = (image.width as usize, image.height as usize);
    if w == 0 || h == 0 {
        return Ok(());
    }
    let width_mm = w as f64 * scale_x;
    let height_mm = h as f64 * scale_y;
    writeln!(writer, "gsave")?;
    writeln!(writer, "{:.4} {:.4} translate", x, y)?;
    writeln!(writer, "{:.4} {:.4} scale", width_mm, height_mm)?;
    writeln!(writer, "/picstr {} string def", w * 3)?;
    writeln!(writer, "{} {} 8 [{} 0 0 -{} 0 {}]", w, h, w, h, h)?;
    writeln!(
        writer,
        "{{ currentfile picstr readhexstring pop }} false 3 colorimage"
    )?;
    let mut line = String::with_capacity(72);
    for px in image.rgba.chunks_exact(4) {
        // flatten alpha against white
        let a = px[3] as u32;
        for channel in &px[..3] {
            let v = (*channel as u32 * a + 255 * (255 - a)) / 255;
            line.push_str(&format!("{:02X}", v));
            if line.len() >= 72 {
                writeln!(writer, "{}", line)?;
                line.clear();
            }
        }
    }
    if !line.is_empty() {
        writeln!(writer, "{}", line)?;
    }
    writeln!(writer, "grestore")?;
    Ok(())
}
