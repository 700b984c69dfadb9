//! Jib projects
//!
//! Detection of Jib-enabled Maven and Gradle builds, and the walk that
//! offers every detected module as a builder.

mod detect;

pub use detect::{ConfigDetector, JibDetector, parse_jib_output};

use anyhow::{Context, Result};
use slipway_core::JibProbeResult;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directories never searched for build files
const SKIPPED_DIRS: [&str; 2] = ["target", "node_modules"];

/// Probes every file under `root` with `detector`
///
/// Hidden directories, `target/` and `node_modules/` are skipped.
///
/// # Returns
/// All probe results, in path order
pub async fn find_jib_projects(
    root: &Path,
    detector: &dyn ConfigDetector,
) -> Result<Vec<JibProbeResult>> {
    let files = collect_files(root)?;
    debug!("Probing {} files under {}", files.len(), root.display());

    let mut results = Vec::new();
    for file in files {
        results.extend(detector.detect(&file).await);
    }

    Ok(results)
}

fn collect_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries =
            std::fs::read_dir(&dir).with_context(|| format!("Failed to list {}", dir.display()))?;

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();

            if entry.file_type()?.is_dir() {
                if name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_str()) {
                    continue;
                }
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}
