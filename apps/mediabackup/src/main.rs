mod cli;
mod commands;
mod config;
mod status;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let endpoint = cli.endpoint.as_deref();

    match cli.command {
        Commands::Run { directory } => commands::run(&directory, endpoint).await,
        Commands::Status { directory, json } => commands::status(&directory, endpoint, json),
        Commands::Sync { directory } => commands::sync(&directory, endpoint).await,
    }
}
