//! Available subcommands.

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Run the download service until SIGTERM/SIGINT
    Serve {
        /// Kill an instance already serving the port instead of failing
        #[arg(short, long)]
        force: bool,
    },

    /// Stop the instance serving the configured port
    Stop,

    /// Show the lock owner and a summary of the saved state
    Status,
}
