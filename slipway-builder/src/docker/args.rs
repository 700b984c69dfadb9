//! Docker CLI argument helpers

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Converts build args to `--build-arg` flag pairs, sorted by name
///
/// A `None` value forwards the variable from the builder's environment
/// (`--build-arg NAME`).
pub fn build_arg_flags(build_args: &BTreeMap<String, Option<String>>) -> Vec<String> {
    let mut flags = Vec::with_capacity(build_args.len() * 2);

    for (name, value) in build_args {
        flags.push("--build-arg".to_string());
        match value {
            Some(value) => flags.push(format!("{}={}", name, value)),
            None => flags.push(name.clone()),
        }
    }

    flags
}

/// Resolves a Dockerfile path against the workspace
///
/// Relative paths are taken from the workspace; absolute paths are kept.
///
/// # Errors
/// When the Dockerfile does not exist
pub fn normalize_dockerfile_path(workspace: &Path, dockerfile_path: &str) -> Result<PathBuf> {
    let path = Path::new(dockerfile_path);
    let full = if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    };

    if !full.is_file() {
        anyhow::bail!("Dockerfile {} not found", full.display());
    }

    Ok(full)
}

/// Dockerfile path relative to the workspace, as the daemon sees it inside the context
pub fn dockerfile_in_context(workspace: &Path, dockerfile_path: &str) -> Result<String> {
    let full = normalize_dockerfile_path(workspace, dockerfile_path)?;
    let relative = full.strip_prefix(workspace).with_context(|| {
        format!(
            "Dockerfile {} is outside of workspace {}",
            full.display(),
            workspace.display()
        )
    })?;

    Ok(relative.to_string_lossy().replace('\\', "/"))
}
