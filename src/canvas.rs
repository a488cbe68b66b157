use kurbo::BezPath;

/// Millimetre-to-point factor used by the point-based back-ends.
pub const MM_TO_PT: f64 = 2.83465;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

pub const BLACK: Rgba = Rgba {
    r: 0,
    g: 0,
    b: 0,
    a: 255,
};

pub const WHITE: Rgba = Rgba {
    r: 255,
    g: 255,
    b: 255,
    a: 255,
};

pub const RED: Rgba = Rgba {
    r: 255,
    g: 0,
    b: 0,
    a: 255,
};

pub const TRANSPARENT: Rgba = Rgba {
    r: 0,
    g: 0,
    b: 0,
    a: 0,
};

/// Parse an OFD `"R G B"` color value with an optional 0-255 alpha.
/// Fewer than three components means the color is undefined.
pub fn parse_color(value: &str, alpha: Option<i32>) -> Option<Rgba> {
    let parts: Vec<&str> = value.split_whitespace().collect();
    if parts.len() < 3 {
        return None;
    }
    let r = parts[0].parse::<i32>().unwrap_or(0).clamp(0, 255) as u8;
    let g = parts[1].parse::<i32>().unwrap_or(0).clamp(0, 255) as u8;
    let b = parts[2].parse::<i32>().unwrap_or(0).clamp(0, 255) as u8;
    let a = alpha.map_or(255, |v| v.clamp(0, 255) as u8);
    Some(Rgba { r, g, b, a })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineCap {
    #[default]
    Butt,
    Round,
    Square,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineJoin {
    #[default]
    Miter,
    Round,
    Bevel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrokeStyle {
    pub width: f64,
    pub cap: LineCap,
    pub join: LineJoin,
    pub miter_limit: f64,
    pub dash_offset: f64,
    pub dash_pattern: Vec<f64>,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        StrokeStyle {
            width: 0.353,
            cap: LineCap::Butt,
            join: LineJoin::Miter,
            miter_limit: 4.0,
            dash_offset: 0.0,
            dash_pattern: Vec::new(),
        }
    }
}

/// Raise a quadratic segment to the cubic form the point-based back-ends
/// emit.
pub(crate) fn quad_to_cubic(
    p0: kurbo::Point,
    p1: kurbo::Point,
    p2: kurbo::Point,
) -> (kurbo::Point, kurbo::Point) {
    let c1 = p0 + (p1 - p0) * (2.0 / 3.0);
    let c2 = p2 + (p1 - p2) * (2.0 / 3.0);
    (c1, c2)
}

/// Decoded bitmap handed to the back-ends: straight-alpha RGBA8 rows.
#[derive(Debug, Clone)]
pub struct CanvasImage {
    pub width: u32,
    pub height: u32,
    pub rgba: std::sync::Arc<Vec<u8>>,
}

/// One recorded draw call. Coordinates are millimetres in page space with
/// the origin at the bottom-left and Y growing upwards; the interpreter has
/// already flipped out of the OFD top-left system before ops are recorded.
#[derive(Debug, Clone)]
pub enum DrawOp {
    /// Save clip state.
    Push,
    /// Restore clip state.
    Pop,
    /// Intersect the current clip with a path.
    Clip(BezPath),
    Fill {
        path: BezPath,
        color: Rgba,
    },
    Stroke {
        path: BezPath,
        color: Rgba,
        style: StrokeStyle,
    },
    /// A single positioned glyph, already converted to an outline in page
    /// space. An empty path is a placement with nothing to ink (missing
    /// outline data); back-ends skip the ink but the op stays observable.
    Glyph {
        path: BezPath,
        x: f64,
        y: f64,
        advance: f64,
        color: Rgba,
    },
    Image {
        image: CanvasImage,
        /// Page-space position of the image's bottom-left corner; the
        /// bitmap extends upwards from here.
        x: f64,
        y: f64,
        /// Millimetres per source pixel along each axis.
        scale_x: f64,
        scale_y: f64,
    },
}

/// A fully recorded page: the draw-op stream a back-end replays.
#[derive(Debug, Clone)]
pub struct PageCanvas {
    /// Page width in millimetres.
    pub width: f64,
    /// Page height in millimetres.
    pub height: f64,
    pub ops: Vec<DrawOp>,
}

impl PageCanvas {
    pub fn new(width: f64, height: f64) -> PageCanvas {
        PageCanvas {
            width,
            height,
            ops: Vec::new(),
        }
    }

    pub fn push(&mut self) {
        self.ops.push(DrawOp::Push);
    }

    pub fn pop(&mut self) {
        self.ops.push(DrawOp::Pop);
    }

    pub fn clip(&mut self, path: BezPath) {
        self.ops.push(DrawOp::Clip(path));
    }

    pub fn fill(&mut self, path: BezPath, color: Rgba) {
        self.ops.push(DrawOp::Fill { path, color });
    }

    pub fn stroke(&mut self, path: BezPath, color: Rgba, style: StrokeStyle) {
        self.ops.push(DrawOp::Stroke { path, color, style });
    }
}
