//! receipt – render a transfer confirmation and export it as a PNG.
//!
//! Usage:
//!   receipt [OUT_DIR] [--set key=value]... [--fields fields.json]
//!           [--config config.json] [--font regular.ttf] [--font-bold bold.ttf]
//!           [--dump-layout]
//!
//! The PNG is written into `OUT_DIR` (default: current directory) as
//! `hbl-confirmation-{width}x{height}.png`.

use std::{env, fs, path::PathBuf, process};

use receipt_forge::download::DirectorySink;
use receipt_forge::fonts::FontManager;
use receipt_forge::notify::LogNotifier;
use receipt_forge::raster::SkiaRasterizer;
use receipt_forge::{ExportConfig, ExportOutcome, FieldName, FieldSet, Session, SkipReason};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let mut out_dir: Option<PathBuf> = None;
    let mut sets: Vec<(String, String)> = Vec::new();
    let mut fields_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut font_regular: Option<PathBuf> = None;
    let mut font_bold: Option<PathBuf> = None;
    let mut dump_layout = false;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--set" | "-s" => {
                let Some(pair) = iter.next() else {
                    fail_usage(&args[0], "--set needs key=value");
                };
                match pair.split_once('=') {
                    Some((k, v)) => sets.push((k.to_string(), v.to_string())),
                    None => fail_usage(&args[0], &format!("Malformed --set '{pair}'")),
                }
            }
            "--fields" => fields_path = Some(path_arg(&args[0], iter.next(), "--fields")),
            "--config" | "-c" => config_path = Some(path_arg(&args[0], iter.next(), "--config")),
            "--font" => font_regular = Some(path_arg(&args[0], iter.next(), "--font")),
            "--font-bold" => font_bold = Some(path_arg(&args[0], iter.next(), "--font-bold")),
            "--dump-layout" => dump_layout = true,
            "--help" | "-h" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            other if other.starts_with('-') => fail_usage(&args[0], &format!("Unknown flag: {other}")),
            path => {
                if out_dir.is_some() {
                    fail_usage(&args[0], &format!("Unexpected argument: {path}"));
                }
                out_dir = Some(PathBuf::from(path));
            }
        }
    }

    let config = match config_path {
        Some(p) => ExportConfig::from_file(&p).unwrap_or_else(|e| {
            eprintln!("Error: {e}");
            process::exit(1);
        }),
        None => ExportConfig::default(),
    };

    let fields = match fields_path {
        Some(p) => {
            let json = fs::read_to_string(&p).unwrap_or_else(|e| {
                eprintln!("Error reading '{}': {e}", p.display());
                process::exit(1);
            });
            FieldSet::from_json(&json).unwrap_or_else(|e| {
                eprintln!("Error parsing '{}': {e}", p.display());
                process::exit(1);
            })
        }
        None => FieldSet::default(),
    };

    let mut fonts = FontManager::with_system_fonts();
    for (path, bold) in [(font_regular, false), (font_bold, true)] {
        if let Some(path) = path {
            if let Err(e) = fonts.load_font_file("Helvetica", bold, &path) {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    }

    let sink = DirectorySink::new(out_dir.unwrap_or_else(|| PathBuf::from(".")));
    let mut session = Session::new(config, fields, fonts, SkiaRasterizer, sink, LogNotifier);
    session.mount();
    for (key, value) in &sets {
        if !session.set_field(key, value) {
            eprintln!("Warning: unknown field '{key}' ignored");
        }
    }
    session.sizing_mut().settled().await;

    if dump_layout {
        match session.surface_layout() {
            Some(Ok(layout)) => println!("{}", layout.to_json()),
            Some(Err(e)) => {
                eprintln!("Error laying out surface: {e}");
                process::exit(1);
            }
            None => {}
        }
    }

    let outcome = session.export().await;
    session.teardown();
    match outcome {
        ExportOutcome::Saved(file) => {
            let location = file
                .location
                .map(|p| p.display().to_string())
                .unwrap_or(file.filename);
            eprintln!("Wrote '{}' ({}x{})", location, file.width, file.height);
        }
        ExportOutcome::Skipped(SkipReason::Busy) => eprintln!("Export already running"),
        ExportOutcome::Skipped(SkipReason::NoSurface) => {
            eprintln!("Nothing to export");
            process::exit(1);
        }
        ExportOutcome::Failed(_) => process::exit(1),
    }
}

fn path_arg(prog: &str, value: Option<&String>, flag: &str) -> PathBuf {
    match value {
        Some(v) => PathBuf::from(v),
        None => fail_usage(prog, &format!("{flag} needs a path")),
    }
}

fn fail_usage(prog: &str, message: &str) -> ! {
    eprintln!("{message}");
    print_usage(prog);
    process::exit(1);
}

fn print_usage(prog: &str) {
    eprintln!("receipt – transfer confirmation to PNG");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} [OUT_DIR] [--set key=value]... [--fields fields.json] [--config config.json]");
    eprintln!("         [--font regular.ttf] [--font-bold bold.ttf] [--dump-layout]");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --set, -s      Set one field (repeatable)");
    eprintln!("  --fields       JSON object of field values; missing keys keep their defaults");
    eprintln!("  --config, -c   Export configuration JSON");
    eprintln!("  --font         Regular TTF/OTF face (default: probe system fonts)");
    eprintln!("  --font-bold    Bold TTF/OTF face");
    eprintln!("  --dump-layout  Print the surface layout as JSON to stdout");
    eprintln!("  --help         Print this message");
    eprintln!();
    eprintln!("Fields:");
    for name in FieldName::ALL {
        eprintln!("  {:<20} {}", name.key(), name.label());
    }
}
