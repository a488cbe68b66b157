use std::io::Write;
use std::path::PathBuf;

use ofdrender::{Reader, Renderer};

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut mode = "pdf";
    let mut path = String::new();
    let mut out: Option<String> = None;
    let mut page_index = 0usize;
    let mut dpi = 300.0f64;
    let mut font_dirs: Vec<PathBuf> = Vec::new();

    let mut i = 0usize;
    while i < args.len() {
        let arg = &args[i];
        match arg.as_str() {
            "--pdf" => mode = "pdf",
            "--svg" => mode = "svg",
            "--eps" => mode = "eps",
            "--png" => mode = "png",
            "--page" => {
                if i + 1 >= args.len() {
                    eprintln!("missing value for --page");
                    std::process::exit(2);
                }
                page_index = args[i + 1].parse().unwrap_or(0);
                i += 1;
            }
            "--dpi" => {
                if i + 1 >= args.len() {
                    eprintln!("missing value for --dpi");
                    std::process::exit(2);
                }
                dpi = args[i + 1].parse().unwrap_or(300.0);
                i += 1;
            }
            "--out" => {
                if i + 1 >= args.len() {
                    eprintln!("missing value for --out");
                    std::process::exit(2);
                }
                out = Some(args[i + 1].clone());
                i += 1;
            }
            "--font-dir" => {
                if i + 1 >= args.len() {
                    eprintln!("missing value for --font-dir");
                    std::process::exit(2);
                }
                font_dirs.push(PathBuf::from(&args[i + 1]));
                i += 1;
            }
            _ => {
                path = arg.clone();
            }
        }
        i += 1;
    }
    if path.is_empty() {
        eprintln!(
            "usage: ofdrender [--pdf|--svg|--eps|--png] [--page N] [--dpi N] [--font-dir DIR] [--out FILE] input.ofd"
        );
        std::process::exit(2);
    }

    let reader = match Reader::open(&path) {
        Ok(reader) => reader,
        Err(err) => {
            eprintln!("failed to open {}: {}", path, err);
            std::process::exit(2);
        }
    };
    let mut renderer = Renderer::new(&reader)
        .with_dpi(dpi)
        .with_font_dirs(font_dirs);

    let mut buffer = Vec::new();
    let result = match mode {
        "svg" | "eps" | "png" => {
            let pages = match reader.pages() {
                Ok(pages) => pages.to_vec(),
                Err(err) => {
                    eprintln!("failed to read {}: {}", path, err);
                    std::process::exit(2);
                }
            };
            let Some(page_ref) = pages.get(page_index) else {
                eprintln!("page index {} out of range", page_index);
                std::process::exit(2);
            };
            match reader.page_content(page_ref) {
                Ok(content) => match mode {
                    "svg" => renderer.render_to_svg(&content, &mut buffer),
                    "eps" => renderer.render_to_eps(&content, &mut buffer),
                    _ => renderer.render_to_png(&content).map(|png| buffer = png),
                },
                Err(err) => {
                    eprintln!("failed to load page {}: {}", page_index, err);
                    std::process::exit(2);
                }
            }
        }
        _ => renderer.render_to_multipage_pdf(&mut buffer),
    };
    if let Err(err) = result {
        eprintln!("failed to render {}: {}", path, err);
        std::process::exit(1);
    }

    match out {
        Some(file) => {
            if let Err(err) = std::fs::write(&file, &buffer) {
                eprintln!("failed to write {}: {}", file, err);
                std::process::exit(1);
            }
        }
        None => {
            if std::io::stdout().write_all(&buffer).is_err() {
                std::process::exit(1);
            }
        }
    }
}
