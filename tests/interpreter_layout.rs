mod common;

use kurbo::Shape;
use ofdrender::canvas::{DrawOp, Rgba};
use ofdrender::Renderer;

use crate::common::{one_page_archive, open_reader, test_font, test_font_without_cmap, MemFonts};

fn page_xml(body: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?><ofd:Page xmlns:ofd=\"http://www.ofdspec.org/2016\">\
         <ofd:Area><ofd:PhysicalBox>0 0 210 297</ofd:PhysicalBox></ofd:Area>\
         <ofd:Content><ofd:Layer ID=\"10\">{}</ofd:Layer></ofd:Content></ofd:Page>",
        body
    )
}

fn glyph_ops(ops: &[DrawOp]) -> Vec<(f64, f64, f64, Rgba)> {
    ops.iter()
        .filter_map(|op| match op {
            DrawOp::Glyph {
                x, y, advance, color, ..
            } => Some((*x, *y, *advance, *color)),
            _ => None,
        })
        .collect()
}

#[test]
fn empty_page_renders_white_background_only() {
    let archive = one_page_archive("", &page_xml(""), &[]);
    let reader = open_reader(archive);
    let mut renderer = Renderer::new(&reader);
    let canvas = renderer.render_page_by_index(0).expect("render");
    assert_eq!(canvas.width, 210.0);
    assert_eq!(canvas.height, 297.0);
    let fills: Vec<_> = canvas
        .ops
        .iter()
        .filter_map(|op| match op {
            DrawOp::Fill { path, color } => Some((path.bounding_box(), *color)),
            _ => None,
        })
        .collect();
    assert_eq!(fills.len(), 1);
    let (bbox, color) = fills[0];
    assert_eq!(color, ofdrender::canvas::WHITE);
    assert_eq!((bbox.x1, bbox.y1), (210.0, 297.0));
}

#[test]
fn text_with_unknown_font_uses_fallback_and_flips_y() {
    let body = "<ofd:TextObject ID=\"2\" Font=\"99\" Size=\"5\">\
                <ofd:TextCode X=\"10\" Y=\"20\">A</ofd:TextCode></ofd:TextObject>";
    let archive = one_page_archive("", &page_xml(body), &[]);
    let reader = open_reader(archive);
    let mut renderer = Renderer::new(&reader)
        .with_font_sources(vec![Box::new(MemFonts(test_font(128, 500)))]);
    let canvas = renderer.render_page_by_index(0).expect("render");
    let glyphs = glyph_ops(&canvas.ops);
    assert_eq!(glyphs.len(), 1);
    let (x, y, advance, color) = glyphs[0];
    assert_eq!(x, 10.0);
    assert_eq!(y, 297.0 - 20.0);
    assert_eq!(color, ofdrender::canvas::BLACK);
    // advance 500/1000 em at 5 mm
    assert!((advance - 2.5).abs() < 1e-9);
}

#[test]
fn path_fill_covers_its_boundary() {
    let body = "<ofd:PathObject ID=\"3\" Boundary=\"0 0 100 50\">\
                <ofd:FillColor Value=\"0 0 0\"/>\
                <ofd:AbbreviatedData>M 0 0 L 100 0 L 100 50 L 0 50 C</ofd:AbbreviatedData>\
                </ofd:PathObject>";
    let page = format!(
        "<?xml version=\"1.0\"?><ofd:Page xmlns:ofd=\"http://www.ofdspec.org/2016\">\
         <ofd:Area><ofd:PhysicalBox>0 0 100 50</ofd:PhysicalBox></ofd:Area>\
         <ofd:Content><ofd:Layer ID=\"10\">{}</ofd:Layer></ofd:Content></ofd:Page>",
        body
    );
    let archive = one_page_archive("", &page, &[]);
    let reader = open_reader(archive);
    let mut renderer = Renderer::new(&reader);
    let canvas = renderer.render_page_by_index(0).expect("render");
    let fills: Vec<_> = canvas
        .ops
        .iter()
        .filter_map(|op| match op {
            DrawOp::Fill { path, color } if *color == ofdrender::canvas::BLACK => {
                Some(path.bounding_box())
            }
            _ => None,
        })
        .collect();
    assert_eq!(fills.len(), 1);
    let bbox = fills[0];
    assert_eq!((bbox.x0, bbox.y0, bbox.x1, bbox.y1), (0.0, 0.0, 100.0, 50.0));
    // default stroke runs too, with no ink defined
    let transparent_strokes = canvas
        .ops
        .iter()
        .filter(|op| matches!(op, DrawOp::Stroke { color, .. } if color.a == 0))
        .count();
    assert_eq!(transparent_strokes, 1);
}

#[test]
fn vscale_and_ctm_yscale_lift_font_size() {
    let base = "<ofd:TextObject ID=\"2\" Font=\"99\" Size=\"5\">\
                <ofd:TextCode X=\"0\" Y=\"0\">A</ofd:TextCode></ofd:TextObject>";
    let scaled = "<ofd:TextObject ID=\"2\" Font=\"99\" Size=\"5\" VScale=\"2\" CTM=\"1 0 0 2 0 0\">\
                  <ofd:TextCode X=\"0\" Y=\"0\">A</ofd:TextCode></ofd:TextObject>";
    let mut advances = Vec::new();
    for body in [base, scaled] {
        let archive = one_page_archive("", &page_xml(body), &[]);
        let reader = open_reader(archive);
        let mut renderer = Renderer::new(&reader)
            .with_font_sources(vec![Box::new(MemFonts(test_font(128, 500)))]);
        let canvas = renderer.render_page_by_index(0).expect("render");
        let glyphs = glyph_ops(&canvas.ops);
        assert_eq!(glyphs.len(), 1);
        advances.push(glyphs[0].2);
    }
    // VScale 2 and CTM y-scale 2 multiply: 5mm -> 20mm of em
    assert!((advances[0] - 2.5).abs() < 1e-9);
    assert!((advances[1] - 10.0).abs() < 1e-9);
}

#[test]
fn absolute_x_overrides_delta() {
    let body = "<ofd:TextObject ID=\"2\" Font=\"99\" Size=\"5\">\
                <ofd:TextCode X=\"10 50\" DeltaX=\"5\" Y=\"20\">AB</ofd:TextCode>\
                </ofd:TextObject>";
    let archive = one_page_archive("", &page_xml(body), &[]);
    let reader = open_reader(archive);
    let mut renderer = Renderer::new(&reader)
        .with_font_sources(vec![Box::new(MemFonts(test_font(128, 500)))]);
    let canvas = renderer.render_page_by_index(0).expect("render");
    let glyphs = glyph_ops(&canvas.ops);
    assert_eq!(glyphs.len(), 2);
    assert_eq!(glyphs[0].0, 10.0);
    assert_eq!(glyphs[1].0, 50.0);
}

#[test]
fn delta_x_advances_pen_when_no_absolute() {
    let body = "<ofd:TextObject ID=\"2\" Font=\"99\" Size=\"5\">\
                <ofd:TextCode X=\"10\" Y=\"20\" DeltaX=\"7 7\">ABC</ofd:TextCode>\
                </ofd:TextObject>";
    let archive = one_page_archive("", &page_xml(body), &[]);
    let reader = open_reader(archive);
    let mut renderer = Renderer::new(&reader)
        .with_font_sources(vec![Box::new(MemFonts(test_font(128, 500)))]);
    let canvas = renderer.render_page_by_index(0).expect("render");
    let glyphs = glyph_ops(&canvas.ops);
    assert_eq!(glyphs.len(), 3);
    assert_eq!(glyphs[0].0, 10.0);
    assert_eq!(glyphs[1].0, 17.0);
    assert_eq!(glyphs[2].0, 24.0);
}

#[test]
fn underline_strokes_below_each_glyph() {
    let body = "<ofd:TextObject ID=\"2\" Font=\"99\" Size=\"5\" Decoration=\"Underline\">\
                <ofd:TextCode X=\"10\" Y=\"20\">A</ofd:TextCode></ofd:TextObject>";
    let archive = one_page_archive("", &page_xml(body), &[]);
    let reader = open_reader(archive);
    let mut renderer = Renderer::new(&reader)
        .with_font_sources(vec![Box::new(MemFonts(test_font(128, 500)))]);
    let canvas = renderer.render_page_by_index(0).expect("render");
    let strokes: Vec<_> = canvas
        .ops
        .iter()
        .filter_map(|op| match op {
            DrawOp::Stroke { path, style, .. } => Some((path.bounding_box(), style.width)),
            _ => None,
        })
        .collect();
    assert_eq!(strokes.len(), 1);
    let (bbox, width) = &strokes[0];
    assert!((width - 0.25).abs() < 1e-9);
    // 0.5 mm below the baseline at 277
    assert!((bbox.y0 - 276.5).abs() < 1e-9);
    assert!((bbox.x0 - 10.0).abs() < 1e-9);
}

#[test]
fn no_underline_without_decoration() {
    let body = "<ofd:TextObject ID=\"2\" Font=\"99\" Size=\"5\" Decoration=\"Strikeout\">\
                <ofd:TextCode X=\"10\" Y=\"20\">A</ofd:TextCode></ofd:TextObject>";
    let archive = one_page_archive("", &page_xml(body), &[]);
    let reader = open_reader(archive);
    let mut renderer = Renderer::new(&reader)
        .with_font_sources(vec![Box::new(MemFonts(test_font(128, 500)))]);
    let canvas = renderer.render_page_by_index(0).expect("render");
    assert!(!canvas
        .ops
        .iter()
        .any(|op| matches!(op, DrawOp::Stroke { .. })));
}

#[test]
fn arc_sweep_is_inverted_by_the_page_flip() {
    // In OFD space sweep=1 takes this arc through (5,-5); the flipped
    // canvas path must pass through (5,302), which only happens if the
    // sweep flag was inverted along with the Y axis.
    let body = "<ofd:PathObject ID=\"3\" Boundary=\"0 0 20 20\" Fill=\"false\">\
                <ofd:StrokeColor Value=\"0 0 0\"/>\
                <ofd:AbbreviatedData>M 0 0 A 5 5 0 0 1 10 0</ofd:AbbreviatedData>\
                </ofd:PathObject>";
    let archive = one_page_archive("", &page_xml(body), &[]);
    let reader = open_reader(archive);
    let mut renderer = Renderer::new(&reader);
    let canvas = renderer.render_page_by_index(0).expect("render");
    let strokes: Vec<_> = canvas
        .ops
        .iter()
        .filter_map(|op| match op {
            DrawOp::Stroke { path, .. } => Some(path.bounding_box()),
            _ => None,
        })
        .collect();
    assert_eq!(strokes.len(), 1);
    let bbox = strokes[0];
    assert!((bbox.y0 - 297.0).abs() < 0.1);
    assert!((bbox.y1 - 302.0).abs() < 0.1);
    assert!((bbox.x0 - 0.0).abs() < 0.1);
    assert!((bbox.x1 - 10.0).abs() < 0.1);
}

#[test]
fn embedded_font_without_cmap_is_repaired_for_index_text() {
    let font = test_font_without_cmap(80, 600);
    let res = "<?xml version=\"1.0\"?><ofd:Res xmlns:ofd=\"http://www.ofdspec.org/2016\">\
               <ofd:Fonts><ofd:Font ID=\"F1\" FontName=\"Embedded\">\
               <ofd:FontFile>Font_0.ttf</ofd:FontFile></ofd:Font></ofd:Fonts></ofd:Res>";
    let body = "<ofd:TextObject ID=\"2\" Font=\"F1\" Size=\"10\">\
                <ofd:TextCode X=\"5\" Y=\"5\" Index=\"65 66\"/></ofd:TextObject>";
    let archive = one_page_archive(
        "<ofd:DocumentRes>DocumentRes.xml</ofd:DocumentRes>",
        &page_xml(body),
        &[
            ("Doc_0/DocumentRes.xml", res.as_bytes()),
            ("Doc_0/Font_0.ttf", font.as_slice()),
        ],
    );
    let reader = open_reader(archive);
    let mut renderer = Renderer::new(&reader);
    let canvas = renderer.render_page_by_index(0).expect("render");
    let glyphs = glyph_ops(&canvas.ops);
    assert_eq!(glyphs.len(), 2);
    // 600/1000 em at 10 mm
    assert!((glyphs[0].2 - 6.0).abs() < 1e-9);
    // pen advanced by the measured advance (no deltas, no absolute X)
    assert!((glyphs[1].0 - (5.0 + 6.0)).abs() < 1e-9);
}

#[test]
fn composite_unit_ctm_offsets_children() {
    let body = "<ofd:CompositeGraphicUnit ID=\"5\" CTM=\"1 0 0 1 20 10\">\
        <ofd:PathObject ID=\"6\" Boundary=\"0 0 10 10\" Stroke=\"false\">\
        <ofd:FillColor Value=\"9 9 9\"/>\
        <ofd:AbbreviatedData>M 0 0 L 10 0 L 10 10 L 0 10 C</ofd:AbbreviatedData>\
        </ofd:PathObject></ofd:CompositeGraphicUnit>";
    let archive = one_page_archive("", &page_xml(body), &[]);
    let reader = open_reader(archive);
    let mut renderer = Renderer::new(&reader);
    let canvas = renderer.render_page_by_index(0).expect("render");
    let fill = canvas
        .ops
        .iter()
        .find_map(|op| match op {
            DrawOp::Fill { path, color } if color.r == 9 => Some(path.bounding_box()),
            _ => None,
        })
        .expect("composite child fill");
    assert_eq!((fill.x0, fill.x1), (20.0, 30.0));
    assert_eq!((fill.y0, fill.y1), (277.0, 287.0));
    // every push has a matching pop
    let pushes = canvas
        .ops
        .iter()
        .filter(|op| matches!(op, DrawOp::Push))
        .count();
    let pops = canvas
        .ops
        .iter()
        .filter(|op| matches!(op, DrawOp::Pop))
        .count();
    assert_eq!(pushes, pops);
}

#[test]
fn path_clips_are_recorded_inside_the_object_scope() {
    let body = "<ofd:PathObject ID=\"3\" Boundary=\"0 0 100 50\">\
                <ofd:FillColor Value=\"0 0 0\"/>\
                <ofd:AbbreviatedData>M 0 0 L 100 0 L 100 50 L 0 50 C</ofd:AbbreviatedData>\
                <ofd:Clips><ofd:Clip><ofd:Area>\
                <ofd:Path Boundary=\"0 0 50 50\">\
                <ofd:AbbreviatedData>M 0 0 L 50 0 L 50 50 L 0 50 C</ofd:AbbreviatedData>\
                </ofd:Path></ofd:Area></ofd:Clip></ofd:Clips>\
                </ofd:PathObject>";
    let archive = one_page_archive("", &page_xml(body), &[]);
    let reader = open_reader(archive);
    let mut renderer = Renderer::new(&reader);
    let canvas = renderer.render_page_by_index(0).expect("render");
    let clip_index = canvas
        .ops
        .iter()
        .position(|op| matches!(op, DrawOp::Clip(_)))
        .expect("clip recorded");
    let fill_index = canvas
        .ops
        .iter()
        .position(|op| matches!(op, DrawOp::Fill { color, .. } if *color == ofdrender::canvas::BLACK))
        .expect("fill recorded");
    assert!(clip_index < fill_index);
}

#[test]
fn templates_layers_and_stamps_stack_in_order() {
    let bg_tpl = page_xml(
        "<ofd:PathObject ID=\"20\" Boundary=\"0 0 10 10\" Stroke=\"false\">\
         <ofd:FillColor Value=\"0 255 0\"/>\
         <ofd:AbbreviatedData>M 0 0 L 10 0 L 10 10 L 0 10 C</ofd:AbbreviatedData></ofd:PathObject>",
    );
    let fg_tpl = page_xml(
        "<ofd:PathObject ID=\"21\" Boundary=\"0 0 10 10\" Stroke=\"false\">\
         <ofd:FillColor Value=\"0 0 255\"/>\
         <ofd:AbbreviatedData>M 0 0 L 10 0 L 10 10 L 0 10 C</ofd:AbbreviatedData></ofd:PathObject>",
    );
    let page = "<?xml version=\"1.0\"?><ofd:Page xmlns:ofd=\"http://www.ofdspec.org/2016\">\
        <ofd:Area><ofd:PhysicalBox>0 0 210 297</ofd:PhysicalBox></ofd:Area>\
        <ofd:Template TemplateID=\"T1\"/><ofd:Template TemplateID=\"T2\" ZOrder=\"Foreground\"/>\
        <ofd:Content><ofd:Layer ID=\"10\">\
        <ofd:PathObject ID=\"22\" Boundary=\"0 0 10 10\" Stroke=\"false\">\
        <ofd:FillColor Value=\"1 2 3\"/>\
        <ofd:AbbreviatedData>M 0 0 L 10 0 L 10 10 L 0 10 C</ofd:AbbreviatedData></ofd:PathObject>\
        </ofd:Layer></ofd:Content></ofd:Page>";
    let signatures = "<?xml version=\"1.0\"?><ofd:Signatures xmlns:ofd=\"http://www.ofdspec.org/2016\">\
        <ofd:Signature ID=\"s1\" BaseLoc=\"Sign_0/Signature.xml\"/></ofd:Signatures>";
    let signature = "<?xml version=\"1.0\"?><ofd:Signature xmlns:ofd=\"http://www.ofdspec.org/2016\">\
        <ofd:SignedInfo><ofd:StampAnnot ID=\"sa1\" PageRef=\"1\" Boundary=\"10 10 30 30\"/></ofd:SignedInfo>\
        <ofd:SignedValue>SignedValue.dat</ofd:SignedValue></ofd:Signature>";
    let signed_value = common::signed_value("none", b"not an image");

    let common_extra = "<ofd:TemplatePage ID=\"T1\" BaseLoc=\"Tpls/Tpl_0/Content.xml\"/>\
        <ofd:TemplatePage ID=\"T2\" BaseLoc=\"Tpls/Tpl_1/Content.xml\" ZOrder=\"Foreground\"/>";
    let document = format!(
        "<?xml version=\"1.0\"?><ofd:Document xmlns:ofd=\"http://www.ofdspec.org/2016\">\
         <ofd:CommonData>{}</ofd:CommonData>\
         <ofd:Pages><ofd:Page ID=\"1\" BaseLoc=\"Pages/Page_0/Content.xml\"/></ofd:Pages>\
         <ofd:Signatures>Signs/Signatures.xml</ofd:Signatures></ofd:Document>",
        common_extra
    );
    let archive = common::build_archive(&[
        ("OFD.xml", common::OFD_XML.as_bytes()),
        ("Doc_0/Document.xml", document.as_bytes()),
        ("Doc_0/Pages/Page_0/Content.xml", page.as_bytes()),
        ("Doc_0/Tpls/Tpl_0/Content.xml", bg_tpl.as_bytes()),
        ("Doc_0/Tpls/Tpl_1/Content.xml", fg_tpl.as_bytes()),
        ("Doc_0/Signs/Signatures.xml", signatures.as_bytes()),
        ("Doc_0/Signs/Sign_0/Signature.xml", signature.as_bytes()),
        ("Doc_0/Signs/Sign_0/SignedValue.dat", signed_value.as_slice()),
    ]);
    let reader = open_reader(archive);
    let mut renderer = Renderer::new(&reader);
    let canvas = renderer.render_page_by_index(0).expect("render");

    let find_fill = |rgba: Rgba| -> usize {
        canvas
            .ops
            .iter()
            .position(|op| matches!(op, DrawOp::Fill { color, .. } if *color == rgba))
            .expect("fill present")
    };
    let white = find_fill(ofdrender::canvas::WHITE);
    let background = find_fill(Rgba { r: 0, g: 255, b: 0, a: 255 });
    let layer = find_fill(Rgba { r: 1, g: 2, b: 3, a: 255 });
    let foreground = find_fill(Rgba { r: 0, g: 0, b: 255, a: 255 });
    let stamp = canvas
        .ops
        .iter()
        .position(|op| matches!(op, DrawOp::Stroke { color, .. } if *color == ofdrender::canvas::RED))
        .expect("stamp frame present");
    assert!(white < background);
    assert!(background < layer);
    assert!(layer < foreground);
    assert!(foreground < stamp);
}
