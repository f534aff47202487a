//! Command-line configuration for `slidetool`.
//!
//! # Environment Variables
//!
//! - `SLIDETOOL_CACHE_SIZE` - Shared tile cache capacity in bytes
//!   (default: 32 MiB)
//! - `RUST_LOG` - Log filter, overrides `--verbose`
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use wsi_slide::config::Config;
//!
//! let config = Config::parse();
//! config.validate()?;
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::engine::DEFAULT_TILE_CACHE_CAPACITY;

// =============================================================================
// Default Values
// =============================================================================

/// Default shared cache capacity in bytes.
pub const DEFAULT_CACHE_SIZE: i64 = DEFAULT_TILE_CACHE_CAPACITY as i64;

// =============================================================================
// CLI Arguments
// =============================================================================

/// slidetool - Inspect Whole Slide Images.
///
/// Opens slides through the built-in TIFF engine and reports their vendor,
/// error state and property catalog.
#[derive(Parser, Debug, Clone)]
#[command(name = "slidetool")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Capacity of the tile cache shared by every opened slide, in bytes.
    #[arg(long, default_value_t = DEFAULT_CACHE_SIZE, env = "SLIDETOOL_CACHE_SIZE", global = true)]
    pub cache_size: i64,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Open each slide and report whether it is readable
    Open {
        /// Slide files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Print the detected vendor of each file
    Vendor {
        /// Slide files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Print the property catalog of a slide
    Props {
        /// Slide file
        file: PathBuf,

        /// Output JSON instead of `key = value` lines
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Print the library and engine version
    Version,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_size < 0 {
            return Err(format!(
                "cache_size must not be negative (got {}). Set --cache-size or SLIDETOOL_CACHE_SIZE",
                self.cache_size
            ));
        }

        let empty_path = match &self.command {
            Command::Open { files } | Command::Vendor { files } => {
                files.iter().any(|f| f.as_os_str().is_empty())
            }
            Command::Props { file, .. } => file.as_os_str().is_empty(),
            Command::Version => false,
        };
        if empty_path {
            return Err("slide paths must not be empty".to_string());
        }

        Ok(())
    }

    /// Log filter used when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "wsi_slide=debug,slidetool=debug"
        } else {
            "wsi_slide=info,slidetool=info"
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
