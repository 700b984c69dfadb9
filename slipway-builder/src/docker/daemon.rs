//! Local image daemon
//!
//! The daemon builds images from a streamed build context, pushes them and
//! answers questions about their digests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use slipway_core::DockerArtifact;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::args::{build_arg_flags, dockerfile_in_context};
use super::context::create_docker_tar_context;
use super::dependencies::DependencyResolver;
use crate::output::BuildLog;
use crate::process::{ToolCommand, run_capture, run_streaming, run_with_input};

/// Operations of a local image daemon
#[async_trait]
pub trait ImageDaemon: Send + Sync {
    /// Builds `fqn` from the minimal build context of a Dockerfile artifact
    async fn build(
        &self,
        cancel: &CancellationToken,
        log: &BuildLog,
        workspace: &Path,
        artifact: &DockerArtifact,
        fqn: &str,
    ) -> Result<()>;

    /// Pushes `fqn` to its registry
    ///
    /// # Returns
    /// The pushed manifest digest (`sha256:...`)
    async fn push(&self, cancel: &CancellationToken, log: &BuildLog, fqn: &str) -> Result<String>;

    /// Loads an image tarball
    ///
    /// # Returns
    /// The loaded image reference
    async fn load(&self, cancel: &CancellationToken, log: &BuildLog, tarball: &Path)
    -> Result<String>;

    /// Adds the tag `fqn` to an existing image
    async fn tag(&self, cancel: &CancellationToken, image: &str, fqn: &str) -> Result<()>;

    /// Digest of `fqn` as stored in its registry
    async fn remote_digest(&self, cancel: &CancellationToken, fqn: &str) -> Result<String>;
}

/// Image daemon driven through the `docker` CLI
///
/// Builds stream the packaged context on stdin (`docker build -`), so the
/// daemon only ever receives the files the Dockerfile depends on.
pub struct DockerCli {
    binary: PathBuf,
    resolver: Arc<dyn DependencyResolver>,
}

impl DockerCli {
    pub fn new(resolver: Arc<dyn DependencyResolver>) -> Self {
        Self {
            binary: PathBuf::from("docker"),
            resolver,
        }
    }

    fn command(&self) -> ToolCommand {
        ToolCommand::new(&self.binary, std::env::temp_dir())
    }
}

#[async_trait]
impl ImageDaemon for DockerCli {
    async fn build(
        &self,
        cancel: &CancellationToken,
        log: &BuildLog,
        workspace: &Path,
        artifact: &DockerArtifact,
        fqn: &str,
    ) -> Result<()> {
        let dockerfile = dockerfile_in_context(workspace, &artifact.dockerfile_path)?;

        let resolver = self.resolver.clone();
        let root = workspace.to_path_buf();
        let packaged = artifact.clone();
        let context = tokio::task::spawn_blocking(move || {
            create_docker_tar_context(Vec::new(), &root, &packaged, resolver.as_ref())
        })
        .await
        .context("Build context packaging task failed")??;

        debug!("Sending {} byte build context for {}", context.len(), fqn);

        let command = self
            .command()
            .arg("build")
            .arg("--file")
            .arg(dockerfile)
            .arg("--tag")
            .arg(fqn)
            .args(build_arg_flags(&artifact.build_args))
            .arg("-");

        run_with_input(&command, context, log, cancel).await?;
        Ok(())
    }

    async fn push(&self, cancel: &CancellationToken, log: &BuildLog, fqn: &str) -> Result<String> {
        run_streaming(&self.command().arg("push").arg(fqn), log, cancel)
            .await
            .with_context(|| format!("pushing {}", fqn))?;

        let output = run_capture(
            &self
                .command()
                .args(["image", "inspect", "--format", "{{json .RepoDigests}}"])
                .arg(fqn),
            cancel,
        )
        .await
        .with_context(|| format!("inspecting {}", fqn))?;

        let repo_digests: Vec<String> = serde_json::from_slice(&output)
            .with_context(|| format!("parsing repo digests of {}", fqn))?;

        digest_for(&repo_digests, fqn)
            .with_context(|| format!("no digest recorded for {} after push", fqn))
    }

    async fn load(
        &self,
        cancel: &CancellationToken,
        log: &BuildLog,
        tarball: &Path,
    ) -> Result<String> {
        let output = run_capture(
            &self
                .command()
                .arg("load")
                .arg("--input")
                .arg(tarball.display().to_string()),
            cancel,
        )
        .await
        .with_context(|| format!("loading {}", tarball.display()))?;

        let output = String::from_utf8_lossy(&output);
        for line in output.lines() {
            log.output(line);
        }

        parse_loaded_image(&output)
            .with_context(|| format!("no image loaded from {}", tarball.display()))
    }

    async fn tag(&self, cancel: &CancellationToken, image: &str, fqn: &str) -> Result<()> {
        run_capture(&self.command().arg("tag").arg(image).arg(fqn), cancel)
            .await
            .with_context(|| format!("tagging {} as {}", image, fqn))?;
        Ok(())
    }

    async fn remote_digest(&self, cancel: &CancellationToken, fqn: &str) -> Result<String> {
        let output = run_capture(
            &self
                .command()
                .args(["buildx", "imagetools", "inspect", "--format", "{{.Manifest.Digest}}"])
                .arg(fqn),
            cancel,
        )
        .await
        .with_context(|| format!("getting remote digest of {}", fqn))?;

        let digest = String::from_utf8_lossy(&output).trim().to_string();
        if !digest.starts_with("sha256:") {
            anyhow::bail!("unexpected digest {:?} for {}", digest, fqn);
        }

        Ok(digest)
    }
}

/// Repository part of a reference, without tag or digest
pub fn repository(reference: &str) -> &str {
    let without_digest = reference.split('@').next().unwrap_or(reference);
    match without_digest.rfind(':') {
        Some(colon) if !without_digest[colon..].contains('/') => &without_digest[..colon],
        _ => without_digest,
    }
}

/// Picks the digest of `fqn`'s repository from `RepoDigests`
fn digest_for(repo_digests: &[String], fqn: &str) -> Option<String> {
    let repo = repository(fqn);
    repo_digests
        .iter()
        .find(|d| repository(d) == repo)
        .or_else(|| repo_digests.first())
        .and_then(|d| d.split_once('@'))
        .map(|(_, digest)| digest.to_string())
}

/// Reads the reference out of `docker load` output
fn parse_loaded_image(output: &str) -> Option<String> {
    output.lines().rev().find_map(|line| {
        line.strip_prefix("Loaded image: ")
            .or_else(|| line.strip_prefix("Loaded image ID: "))
            .map(|image| image.trim().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository() {
        assert_eq!(repository("gcr.io/p/app:v1"), "gcr.io/p/app");
        assert_eq!(repository("localhost:5000/app"), "localhost:5000/app");
        assert_eq!(repository("localhost:5000/app:v1"), "localhost:5000/app");
        assert_eq!(repository("app@sha256:abc"), "app");
    }

    #[test]
    fn test_digest_for() {
        let digests = vec![
            "docker.io/library/other@sha256:111".to_string(),
            "gcr.io/p/app@sha256:222".to_string(),
        ];
        assert_eq!(
            digest_for(&digests, "gcr.io/p/app:v1"),
            Some("sha256:222".to_string())
        );
        assert_eq!(
            digest_for(&digests, "unknown:v1"),
            Some("sha256:111".to_string())
        );
        assert_eq!(digest_for(&[], "gcr.io/p/app:v1"), None);
    }

    #[test]
    fn test_parse_loaded_image() {
        assert_eq!(
            parse_loaded_image("Loaded image: bazel/app:image\n"),
            Some("bazel/app:image".to_string())
        );
        assert_eq!(
            parse_loaded_image("Loaded image ID: sha256:abc\n"),
            Some("sha256:abc".to_string())
        );
        assert_eq!(parse_loaded_image("nothing"), None);
    }
}
