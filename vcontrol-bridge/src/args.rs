//! CLI argument parsing.

use std::path::PathBuf;

use clap::Parser;

/// Default configuration file, looked up in the working directory.
pub const DEFAULT_CONFIG: &str = "vcontrol.json5";

/// Polls vcontrold through vclient and publishes readings to Zenoh.
#[derive(Parser, Debug, Clone)]
#[command(name = "vcontrol-bridge")]
#[command(version)]
pub struct BridgeArgs {
    /// Path to configuration file (JSON5 format).
    ///
    /// A missing default file is not an error: the bridge then runs on
    /// built-in defaults plus environment overrides.
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl BridgeArgs {
    /// True when `--config` still points at the default file name.
    pub fn uses_default_config(&self) -> bool {
        self.config == PathBuf::from(DEFAULT_CONFIG)
    }
}
