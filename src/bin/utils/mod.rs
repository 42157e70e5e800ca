#![allow(dead_code)]

use std::error::Error;
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use clap::Args;
use tracing_subscriber::{fmt, EnvFilter};
use wedge::Config;

/// Reads a module from disk; `.wat` files are converted to the binary format.
pub fn read_module(path: &Path) -> Result<Vec<u8>, Box<dyn Error>> {
    if path.extension().and_then(|s| s.to_str()) == Some("wat") {
        return wat::parse_file(path).map_err(|e| format!("Failed to compile WAT file: {e}").into());
    }
    fs::read(path).map_err(|e| format!("Failed to read {}: {e}", path.display()).into())
}

/// Logs go to stderr. `RUST_LOG` picks the filter unless `--debug` forces `debug`.
pub fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal())
        .with_target(false)
        .try_init();
}

/// Engine settings shared by the tools.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// JSON configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Maximum nested call depth
    #[arg(long)]
    pub max_call_depth: Option<usize>,

    /// Disable a proposal (e.g. bulk-memory, reference-types); repeatable
    #[arg(long = "disable", value_name = "FEATURE")]
    pub disabled: Vec<String>,
}

impl ConfigArgs {
    pub fn to_config(&self) -> Result<Config, Box<dyn Error>> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        if let Some(depth) = self.max_call_depth {
            config.max_call_depth = depth;
        }
        for name in &self.disabled {
            if !config.features.disable(name) {
                return Err(format!("Unknown feature '{name}'").into());
            }
        }
        Ok(config)
    }
}
