use std::path::PathBuf;

use eframe::egui;
use rect_annotate::app::AnnotateApp;
use rect_annotate::EditorConfig;

const USAGE: &str = "Usage: rect-annotate [--config <editor.json>] [--image-id <n>] [<image.png|jpg>]";

struct Args {
    config: Option<PathBuf>,
    image_id: u64,
    image: Option<PathBuf>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        config: None,
        image_id: 1,
        image: None,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().ok_or("--config needs a path")?;
                args.config = Some(PathBuf::from(path));
            }
            "--image-id" => {
                let value = iter.next().ok_or("--image-id needs a number")?;
                args.image_id = value
                    .parse()
                    .map_err(|_| format!("Invalid image id: {}", value))?;
            }
            "-h" | "--help" => return Err(USAGE.to_string()),
            other if other.starts_with("--") => return Err(format!("Unknown option {}", other)),
            other => args.image = Some(PathBuf::from(other)),
        }
    }
    Ok(args)
}

fn main() {
    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}\n{}", message, USAGE);
            std::process::exit(1);
        }
    };

    let config = match &args.config {
        Some(path) => match EditorConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        },
        None => EditorConfig::default(),
    };

    env_logger::Builder::new()
        .filter_level(config.log_level.to_level_filter())
        .parse_default_env()
        .init();

    let image_path = match args.image {
        Some(path) => path,
        None => match rfd::FileDialog::new()
            .add_filter("Images", &["png", "jpg", "jpeg"])
            .pick_file()
        {
            Some(path) => path,
            None => {
                eprintln!("{}", USAGE);
                std::process::exit(1);
            }
        },
    };
    if !image_path.exists() {
        log::error!("File not found: {}", image_path.display());
        std::process::exit(1);
    }

    let title = format!(
        "rect-annotate - {}",
        image_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("")
    );
    let viewport = config.viewport();

    let app = match AnnotateApp::new(image_path, args.image_id, config) {
        Ok(app) => app,
        Err(e) => {
            log::error!("Could not open annotation store: {}", e);
            std::process::exit(1);
        }
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([viewport.x + 320.0, viewport.y + 120.0])
            .with_title(&title),
        ..Default::default()
    };

    if let Err(e) = eframe::run_native(&title, options, Box::new(move |_cc| Ok(Box::new(app)))) {
        log::error!("eframe exited with an error: {}", e);
        std::process::exit(1);
    }
}
