mod common;

use ofdrender::canvas::DrawOp;
use ofdrender::{RenderError, Renderer};

use crate::common::{build_archive, one_page_archive, open_reader, signed_value, OFD_XML};

const EMPTY_PAGE: &str = "<?xml version=\"1.0\"?><ofd:Page xmlns:ofd=\"http://www.ofdspec.org/2016\">\
    <ofd:Area><ofd:PhysicalBox>0 0 210 297</ofd:PhysicalBox></ofd:Area><ofd:Content/></ofd:Page>";

fn tiny_png() -> Vec<u8> {
    let mut img = image::RgbaImage::new(2, 2);
    for px in img.pixels_mut() {
        *px = image::Rgba([255, 0, 0, 255]);
    }
    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .expect("encode png");
    out
}

#[test]
fn svg_output_carries_page_dimensions() {
    let archive = one_page_archive("", EMPTY_PAGE, &[]);
    let reader = open_reader(archive);
    let mut renderer = Renderer::new(&reader);
    let pages = reader.pages().expect("pages").to_vec();
    let content = reader.page_content(&pages[0]).expect("content");
    let mut out = Vec::new();
    renderer.render_to_svg(&content, &mut out).expect("svg");
    let text = String::from_utf8(out).expect("utf8");
    assert!(text.contains("width=\"210mm\""));
    assert!(text.contains("height=\"297mm\""));
    assert!(text.contains("fill=\"#FFFFFF\""));
}

#[test]
fn eps_output_has_postscript_header() {
    let archive = one_page_archive("", EMPTY_PAGE, &[]);
    let reader = open_reader(archive);
    let mut renderer = Renderer::new(&reader);
    let pages = reader.pages().expect("pages").to_vec();
    let content = reader.page_content(&pages[0]).expect("content");
    let mut out = Vec::new();
    renderer.render_to_eps(&content, &mut out).expect("eps");
    let text = String::from_utf8(out).expect("utf8");
    assert!(text.starts_with("%!PS-Adobe-3.0 EPSF-3.0"));
    assert!(text.contains("%%BoundingBox: 0 0 596 842"));
}

#[test]
fn single_page_pdf_renders() {
    let archive = one_page_archive("", EMPTY_PAGE, &[]);
    let reader = open_reader(archive);
    let mut renderer = Renderer::new(&reader);
    let pages = reader.pages().expect("pages").to_vec();
    let content = reader.page_content(&pages[0]).expect("content");
    let mut out = Vec::new();
    renderer.render_to_pdf(&content, &mut out).expect("pdf");
    let text = String::from_utf8_lossy(&out);
    assert!(text.starts_with("%PDF-1.4"));
    assert!(text.contains("/Count 1"));
    assert!(text.contains("/MediaBox [0 0 595.2765 841.89"));
}

#[test]
fn raster_uses_dpmm_from_dpi() {
    let archive = one_page_archive("", EMPTY_PAGE, &[]);
    let reader = open_reader(archive);
    let mut renderer = Renderer::new(&reader).with_dpi(72.0);
    let pages = reader.pages().expect("pages").to_vec();
    let content = reader.page_content(&pages[0]).expect("content");
    let pixmap = renderer.render_to_image(&content).expect("raster");
    // 210mm * 72/25.4 = 595.27 -> 595; 297mm -> 841.89 -> 842
    assert_eq!(pixmap.width(), 595);
    assert_eq!(pixmap.height(), 842);
    // the page background is white
    let px = pixmap.pixel(10, 10).expect("pixel");
    assert_eq!((px.red(), px.green(), px.blue()), (255, 255, 255));
}

fn two_page_archive(second_page_present: bool) -> Vec<u8> {
    let document = "<?xml version=\"1.0\"?><ofd:Document xmlns:ofd=\"http://www.ofdspec.org/2016\">\
        <ofd:CommonData/>\
        <ofd:Pages><ofd:Page ID=\"1\" BaseLoc=\"Pages/Page_0/Content.xml\"/>\
        <ofd:Page ID=\"2\" BaseLoc=\"Pages/Page_1/Content.xml\"/></ofd:Pages></ofd:Document>";
    let mut files: Vec<(&str, &[u8])> = vec![
        ("OFD.xml", OFD_XML.as_bytes()),
        ("Doc_0/Document.xml", document.as_bytes()),
        ("Doc_0/Pages/Page_0/Content.xml", EMPTY_PAGE.as_bytes()),
    ];
    if second_page_present {
        files.push(("Doc_0/Pages/Page_1/Content.xml", EMPTY_PAGE.as_bytes()));
    }
    build_archive(&files)
}

#[test]
fn multipage_pdf_contains_every_page() {
    let reader = open_reader(two_page_archive(true));
    let mut renderer = Renderer::new(&reader);
    let mut out = Vec::new();
    renderer.render_to_multipage_pdf(&mut out).expect("pdf");
    let text = String::from_utf8_lossy(&out);
    assert!(text.contains("/Count 2"));
}

#[test]
fn multipage_pdf_skips_broken_pages() {
    let reader = open_reader(two_page_archive(false));
    let mut renderer = Renderer::new(&reader);
    let mut out = Vec::new();
    renderer.render_to_multipage_pdf(&mut out).expect("pdf");
    let text = String::from_utf8_lossy(&out);
    assert!(text.contains("/Count 1"));
}

#[test]
fn multipage_pdf_fails_when_no_page_survives() {
    let document = "<?xml version=\"1.0\"?><ofd:Document xmlns:ofd=\"http://www.ofdspec.org/2016\">\
        <ofd:CommonData/>\
        <ofd:Pages><ofd:Page ID=\"1\" BaseLoc=\"Pages/Page_0/Content.xml\"/></ofd:Pages></ofd:Document>";
    let archive = build_archive(&[
        ("OFD.xml", OFD_XML.as_bytes()),
        ("Doc_0/Document.xml", document.as_bytes()),
    ]);
    let reader = open_reader(archive);
    let mut renderer = Renderer::new(&reader);
    let mut out = Vec::new();
    let err = renderer
        .render_to_multipage_pdf(&mut out)
        .expect_err("must fail");
    assert!(matches!(err, RenderError::NoPagesRendered));
    assert_eq!(err.to_string(), "failed to render any page");
}

fn stamped_archive(kind: &str, payload: &[u8]) -> Vec<u8> {
    let document = "<?xml version=\"1.0\"?><ofd:Document xmlns:ofd=\"http://www.ofdspec.org/2016\">\
        <ofd:CommonData/>\
        <ofd:Pages><ofd:Page ID=\"1\" BaseLoc=\"Pages/Page_0/Content.xml\"/></ofd:Pages>\
        <ofd:Signatures>Signs/Signatures.xml</ofd:Signatures></ofd:Document>";
    let signatures = "<?xml version=\"1.0\"?><ofd:Signatures xmlns:ofd=\"http://www.ofdspec.org/2016\">\
        <ofd:Signature ID=\"s1\" BaseLoc=\"Sign_0/Signature.xml\"/></ofd:Signatures>";
    let signature = "<?xml version=\"1.0\"?><ofd:Signature xmlns:ofd=\"http://www.ofdspec.org/2016\">\
        <ofd:SignedInfo><ofd:StampAnnot ID=\"sa\" PageRef=\"1\" Boundary=\"20 20 40 40\"/></ofd:SignedInfo>\
        <ofd:SignedValue>SignedValue.dat</ofd:SignedValue></ofd:Signature>";
    let value = signed_value(kind, payload);
    build_archive(&[
        ("OFD.xml", OFD_XML.as_bytes()),
        ("Doc_0/Document.xml", document.as_bytes()),
        ("Doc_0/Pages/Page_0/Content.xml", EMPTY_PAGE.as_bytes()),
        ("Doc_0/Signs/Signatures.xml", signatures.as_bytes()),
        ("Doc_0/Signs/Sign_0/Signature.xml", signature.as_bytes()),
        ("Doc_0/Signs/Sign_0/SignedValue.dat", value.as_slice()),
    ])
}

#[test]
fn es_stamp_is_extracted_as_png() {
    let reader = open_reader(stamped_archive("es", &tiny_png()));
    let bundle_stamps = {
        let bundle = reader.doc().expect("doc");
        bundle.stamps.get("1").cloned().expect("stamps on page 1")
    };
    assert_eq!(bundle_stamps.len(), 1);
    assert_eq!(bundle_stamps[0].kind, "png");
    let b = bundle_stamps[0].boundary;
    assert_eq!((b.x, b.y, b.w, b.h), (20.0, 20.0, 40.0, 40.0));
}

#[test]
fn png_stamp_draws_as_image() {
    let reader = open_reader(stamped_archive("png", &tiny_png()));
    let mut renderer = Renderer::new(&reader);
    let canvas = renderer.render_page_by_index(0).expect("render");
    let images: Vec<_> = canvas
        .ops
        .iter()
        .filter_map(|op| match op {
            DrawOp::Image {
                x, y, scale_x, scale_y, ..
            } => Some((*x, *y, *scale_x, *scale_y)),
            _ => None,
        })
        .collect();
    assert_eq!(images.len(), 1);
    let (x, y, scale_x, scale_y) = images[0];
    assert_eq!(x, 20.0);
    // stamp box y=20 h=40 on a 297mm page
    assert_eq!(y, 297.0 - 60.0);
    assert_eq!(scale_x, 20.0);
    assert_eq!(scale_y, 20.0);
}

#[test]
fn unknown_stamp_payload_draws_placeholder_frame() {
    let reader = open_reader(stamped_archive("xyz", b"opaque bytes"));
    let mut renderer = Renderer::new(&reader);
    let canvas = renderer.render_page_by_index(0).expect("render");
    let has_red_frame = canvas.ops.iter().any(|op| {
        matches!(op, DrawOp::Stroke { color, .. } if *color == ofdrender::canvas::RED)
    });
    assert!(has_red_frame);
}

#[test]
fn nested_ofd_stamp_replays_inner_pages() {
    // the stamp payload is itself a one-page OFD with a black square
    let inner_page = "<?xml version=\"1.0\"?><ofd:Page xmlns:ofd=\"http://www.ofdspec.org/2016\">\
        <ofd:Area><ofd:PhysicalBox>0 0 40 40</ofd:PhysicalBox></ofd:Area>\
        <ofd:Content><ofd:Layer ID=\"1\">\
        <ofd:PathObject ID=\"2\" Boundary=\"0 0 40 40\" Stroke=\"false\">\
        <ofd:FillColor Value=\"0 0 0\"/>\
        <ofd:AbbreviatedData>M 0 0 L 40 0 L 40 40 L 0 40 C</ofd:AbbreviatedData>\
        </ofd:PathObject></ofd:Layer></ofd:Content></ofd:Page>";
    let inner = one_page_archive("", inner_page, &[]);
    let reader = open_reader(stamped_archive("ofd", &inner));
    let mut renderer = Renderer::new(&reader);
    let canvas = renderer.render_page_by_index(0).expect("render");
    // outer white page fill plus the inner page's white fill and square
    let fills: Vec<_> = canvas
        .ops
        .iter()
        .filter_map(|op| match op {
            DrawOp::Fill { path, color } => Some((*color, kurbo::Shape::bounding_box(path))),
            _ => None,
        })
        .collect();
    assert!(fills.len() >= 3);
    let black = fills
        .iter()
        .find(|(color, _)| *color == ofdrender::canvas::BLACK)
        .expect("inner square");
    let bbox = black.1;
    // inner 40mm page scaled into the 40mm stamp box at (20, 297-60)
    assert!((bbox.x0 - 20.0).abs() < 1e-6);
    assert!((bbox.x1 - 60.0).abs() < 1e-6);
    assert!((bbox.y0 - 237.0).abs() < 1e-6);
    assert!((bbox.y1 - 277.0).abs() < 1e-6);
}
