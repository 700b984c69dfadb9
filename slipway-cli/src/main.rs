//! Slipway CLI
//!
//! Builds the artifacts listed in a pipeline file, detects Jib projects and
//! reports build context sizes.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "slipway")]
#[command(about = "Container image builds for Dockerfile, Bazel and Jib projects", long_about = None)]
struct Cli {
    /// Pipeline file listing the artifacts
    #[arg(short, long, env = "SLIPWAY_FILE", default_value = "slipway.json")]
    file: std::path::PathBuf,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slipway=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Config {
        file: cli.file,
        color: !cli.no_color,
    };

    handle_command(cli.command, &config).await
}
