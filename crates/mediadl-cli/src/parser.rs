//! Main CLI parser and top-level argument handling.

use clap::Parser;

use crate::commands::Commands;
use crate::config::SettingsArgs;

/// Media download service.
#[derive(Parser)]
#[command(name = "mediadl")]
#[command(about = "Queue and run media downloads through an extraction helper")]
#[command(version)]
pub struct Cli {
    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub settings: SettingsArgs,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Log filter used when `RUST_LOG` is unset.
    pub const fn default_log_filter(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }
}
