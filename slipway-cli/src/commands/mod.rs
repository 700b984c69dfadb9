//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod build;
mod detect;
mod diagnose;

pub use build::BuildArgs;

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Build the artifacts of the pipeline file
    Build(BuildArgs),
    /// Find Jib-enabled Maven and Gradle modules
    Detect {
        /// Directory to search
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Report dependency counts and build context sizes
    Diagnose,
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - The CLI configuration
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    let cancel = cancel_on_ctrl_c();

    match command {
        Commands::Build(args) => build::handle_build_command(args, config, cancel).await,
        Commands::Detect { path } => detect::handle_detect_command(&path, config, cancel).await,
        Commands::Diagnose => diagnose::handle_diagnose_command(config),
    }
}

/// Token cancelled on the first Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cleaning up");
            trigger.cancel();
        }
    });

    cancel
}
