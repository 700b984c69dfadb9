//! Configuration module
//!
//! CLI settings and the pipeline file loader.

use anyhow::{Context, Result};
use slipway_builder::{ConsoleSink, OutputSink};
use slipway_core::Artifact;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Pipeline file listing the artifacts
    pub file: PathBuf,

    /// Colored console output
    pub color: bool,
}

impl Config {
    /// Console sink honoring the color setting
    pub fn sink(&self) -> Arc<dyn OutputSink> {
        if self.color {
            Arc::new(ConsoleSink::new())
        } else {
            Arc::new(ConsoleSink::plain())
        }
    }

    /// Loads the artifacts of the pipeline file
    pub fn load_artifacts(&self) -> Result<Vec<Artifact>> {
        load_artifacts(&self.file)
    }
}

/// Reads a JSON list of artifacts
///
/// Relative workspaces are resolved against the file's directory.
pub fn load_artifacts(path: &Path) -> Result<Vec<Artifact>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pipeline file: {}", path.display()))?;

    let mut artifacts: Vec<Artifact> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse pipeline file: {}", path.display()))?;

    let base = path.parent().unwrap_or(Path::new(""));
    for artifact in &mut artifacts {
        if artifact.workspace.is_relative() {
            artifact.workspace = base.join(&artifact.workspace);
        }
    }

    Ok(artifacts)
}

/// Keeps the artifacts named in `images`, or all of them when empty
pub fn select_artifacts(artifacts: Vec<Artifact>, images: &[String]) -> Result<Vec<Artifact>> {
    if images.is_empty() {
        return Ok(artifacts);
    }

    for image in images {
        if !artifacts.iter().any(|a| &a.image_name == image) {
            anyhow::bail!("no artifact named {}", image);
        }
    }

    Ok(artifacts
        .into_iter()
        .filter(|a| images.contains(&a.image_name))
        .collect())
}
