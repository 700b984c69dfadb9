//! Diagnose command handler

use anyhow::Result;
use colored::*;
use slipway_builder::BuildLog;
use slipway_builder::diagnose::check_artifacts;
use slipway_builder::docker::DockerfileDependencies;

use crate::config::Config;

/// Handle `slipway diagnose`
///
/// Prints, per Dockerfile artifact, its dependency count, resolution time
/// and uncompressed context size.
pub fn handle_diagnose_command(config: &Config) -> Result<()> {
    let artifacts = config.load_artifacts()?;
    let log = BuildLog::new(config.sink(), "slipway");

    let diagnoses = check_artifacts(&artifacts, &DockerfileDependencies, &log)?;

    println!();
    println!(
        "{:<40} {:>6} {:>12} {:>14}",
        "IMAGE".bold(),
        "FILES".bold(),
        "RESOLVE".bold(),
        "CONTEXT".bold()
    );
    for diagnosis in &diagnoses {
        println!(
            "{:<40} {:>6} {:>12} {:>14}",
            diagnosis.image_name.cyan(),
            diagnosis.dependency_count,
            format!("{:.1?}", diagnosis.resolve_time),
            format!("{} B", diagnosis.context_size)
        );
    }

    Ok(())
}
