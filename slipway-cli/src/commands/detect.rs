//! Detect command handler

use anyhow::Result;
use colored::*;
use slipway_builder::jib::{JibDetector, find_jib_projects};
use slipway_builder::process::ProcessRunner;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;

/// Handle `slipway detect`
///
/// Lists every Jib module found under `path`.
pub async fn handle_detect_command(
    path: &Path,
    _config: &Config,
    cancel: CancellationToken,
) -> Result<()> {
    let detector = JibDetector::new(Arc::new(ProcessRunner::new(cancel)));
    let results = find_jib_projects(path, &detector).await?;

    if results.is_empty() {
        println!("{}", "No Jib projects found".yellow());
        return Ok(());
    }

    println!("{}", format!("Found {} Jib module(s):", results.len()).bold());
    for result in &results {
        let image = result.image.as_deref().unwrap_or("-");
        println!("  {} {}", result.describe(), image.dimmed());
    }

    Ok(())
}
