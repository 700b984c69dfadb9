//! Bazel image builds

use anyhow::{Context, Result};
use slipway_core::BazelArtifact;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::docker::ImageDaemon;
use crate::output::BuildLog;
use crate::process::{ToolCommand, run_capture, run_streaming};

/// Builds an image tarball target with bazel and loads it into the daemon
pub struct BazelBuilder {
    daemon: Arc<dyn ImageDaemon>,
    push: bool,
}

impl BazelBuilder {
    pub fn new(daemon: Arc<dyn ImageDaemon>, push: bool) -> Self {
        Self { daemon, push }
    }

    pub async fn build(
        &self,
        cancel: &CancellationToken,
        log: &BuildLog,
        workspace: &Path,
        artifact: &BazelArtifact,
        fqn: &str,
    ) -> Result<String> {
        let tar_path = build_tar_path(&artifact.target)?;

        let build = ToolCommand::new("bazel", workspace)
            .arg("build")
            .args(artifact.build_args.iter().cloned())
            .arg(&artifact.target);
        run_streaming(&build, log, cancel)
            .await
            .context("running command")?;

        let info = ToolCommand::new("bazel", workspace)
            .args(["info", "bazel-bin"])
            .args(artifact.build_args.iter().cloned());
        let output = run_capture(&info, cancel)
            .await
            .context("getting path of bazel-bin")?;
        let bazel_bin = parse_bazel_bin(&output)?;

        let tarball = bazel_bin.join(tar_path);
        let loaded = self
            .daemon
            .load(cancel, log, &tarball)
            .await
            .context("loading image into docker daemon")?;

        self.daemon
            .tag(cancel, &loaded, fqn)
            .await
            .context("tagging the image")?;

        if !self.push {
            return Ok(fqn.to_string());
        }

        let digest = self
            .daemon
            .push(cancel, log, fqn)
            .await
            .context("pushing image")?;

        Ok(format!("{}@{}", fqn, digest))
    }
}

/// Output path of a tarball target, relative to `bazel-bin`
///
/// `//app/server:image.tar` builds `app/server/image.tar`.
fn build_tar_path(target: &str) -> Result<PathBuf> {
    if !target.ends_with(".tar") {
        anyhow::bail!("the bazel artifact's target should end with .tar, got {}", target);
    }

    let target = target.trim_start_matches('@').trim_start_matches("//");
    let path = match target.split_once(':') {
        Some((package, name)) => Path::new(package).join(name),
        None => PathBuf::from(target),
    };

    Ok(path)
}

/// `bazel info` prints the directory among its progress messages
fn parse_bazel_bin(output: &[u8]) -> Result<PathBuf> {
    String::from_utf8_lossy(output)
        .lines()
        .map(str::trim)
        .find(|line| Path::new(line).is_absolute())
        .map(PathBuf::from)
        .context("bazel info printed no bazel-bin directory")
}
