//! slidetool - Inspect Whole Slide Images from the command line.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_slide::{
    config::{Command, Config},
    Cache, Slide,
};

fn main() -> ExitCode {
    let config = Config::parse();
    init_logging(&config);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    match &config.command {
        Command::Version => run_version(),
        Command::Vendor { files } => run_vendor(files),
        Command::Open { files } => with_cache(&config, |cache| run_open(files, cache)),
        Command::Props { file, json } => with_cache(&config, |cache| run_props(file, *json, cache)),
    }
}

/// Create the shared tile cache and run `command` with it.
fn with_cache(config: &Config, command: impl FnOnce(&Arc<Cache>) -> ExitCode) -> ExitCode {
    match Cache::create(config.cache_size) {
        Ok(cache) => {
            debug!("Shared tile cache: {} bytes", cache.size());
            command(&cache)
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(config: &Config) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// =============================================================================
// Commands
// =============================================================================

fn run_version() -> ExitCode {
    println!("slidetool {}", env!("CARGO_PKG_VERSION"));
    println!("engine {}", Slide::version());
    ExitCode::SUCCESS
}

fn run_vendor(files: &[PathBuf]) -> ExitCode {
    let mut failed = false;
    for file in files {
        match Slide::detect_vendor(file) {
            Some(vendor) if files.len() > 1 => println!("{}: {}", file.display(), vendor),
            Some(vendor) => println!("{}", vendor),
            None => {
                warn!("{}: unrecognized slide format", file.display());
                failed = true;
            }
        }
    }
    exit_code(failed)
}

fn run_open(files: &[PathBuf], cache: &Arc<Cache>) -> ExitCode {
    let mut failed = false;
    for file in files {
        let slide = Slide::open(file, Some(Arc::clone(cache)));
        match slide.check_error().and_then(|_| describe(&slide)) {
            Ok(summary) => info!("{}: {}", file.display(), summary),
            Err(e) => {
                warn!("{}: {}", file.display(), e);
                failed = true;
            }
        }
    }
    exit_code(failed)
}

fn run_props(file: &Path, json: bool, cache: &Arc<Cache>) -> ExitCode {
    let slide = Slide::open(file, Some(Arc::clone(cache)));
    let properties = match slide.properties() {
        Ok(properties) => properties,
        Err(e) => {
            warn!("{}: {}", file.display(), e);
            return ExitCode::FAILURE;
        }
    };

    if json {
        let report = PropsReport {
            file: file.display().to_string(),
            properties,
        };
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                error!("Failed to serialize properties: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        for (name, value) in properties {
            println!("{} = {}", name, value);
        }
    }

    ExitCode::SUCCESS
}

/// JSON body of `slidetool props --json`.
#[derive(Serialize)]
struct PropsReport<'a> {
    file: String,
    properties: &'a BTreeMap<String, String>,
}

/// One-line summary of an opened slide.
fn describe(slide: &Slide) -> Result<String, wsi_slide::SlideError> {
    let levels = slide.level_count()?;
    let (width, height) = slide.level0_dimensions()?;
    let associated = slide.associated_image_names()?;
    Ok(format!(
        "{}x{}, {} level(s), associated images: [{}]",
        width,
        height,
        levels,
        associated.join(", ")
    ))
}

fn exit_code(failed: bool) -> ExitCode {
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
