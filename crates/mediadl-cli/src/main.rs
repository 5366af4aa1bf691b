//! CLI entry point.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mediadl_cli::{Cli, Commands, handlers, load_settings};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.default_log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = load_settings(&cli.settings)?;

    match cli.command {
        Commands::Serve { force } => handlers::serve::execute(settings, force).await?,
        Commands::Stop => handlers::stop::execute(&settings).await?,
        Commands::Status => handlers::status::execute(&settings).await?,
    }

    Ok(())
}
