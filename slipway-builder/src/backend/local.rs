//! Dockerfile builds on the local host

use anyhow::{Context, Result};
use slipway_core::DockerArtifact;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::docker::ImageDaemon;
use crate::docker::args::{build_arg_flags, normalize_dockerfile_path};
use crate::output::BuildLog;
use crate::process::{ToolCommand, run_streaming};

/// Builds Dockerfiles through the image daemon or the docker CLI
pub struct LocalBuilder {
    daemon: Arc<dyn ImageDaemon>,
    push: bool,
    use_cli: bool,
    use_buildkit: bool,
    cli_binary: PathBuf,
}

impl LocalBuilder {
    pub fn new(daemon: Arc<dyn ImageDaemon>, push: bool) -> Self {
        Self {
            daemon,
            push,
            use_cli: false,
            use_buildkit: false,
            cli_binary: PathBuf::from("docker"),
        }
    }

    /// Builds through `docker build` on the workspace; BuildKit implies the CLI
    pub fn with_cli(mut self, use_cli: bool, use_buildkit: bool) -> Self {
        self.use_cli = use_cli || use_buildkit;
        self.use_buildkit = use_buildkit;
        self
    }

    /// Builds `fqn` and pushes it when pushing is enabled
    ///
    /// # Returns
    /// `fqn@digest` when pushed, `fqn` otherwise
    pub async fn build(
        &self,
        cancel: &CancellationToken,
        log: &BuildLog,
        workspace: &Path,
        artifact: &DockerArtifact,
        fqn: &str,
    ) -> Result<String> {
        if self.use_cli {
            let command = self.cli_command(workspace, artifact, fqn)?;
            run_streaming(&command, log, cancel)
                .await
                .context("running build")?;
        } else {
            self.daemon
                .build(cancel, log, workspace, artifact, fqn)
                .await
                .context("running build")?;
        }

        if !self.push {
            return Ok(fqn.to_string());
        }

        let digest = self
            .daemon
            .push(cancel, log, fqn)
            .await
            .context("pushing image")?;
        debug!("Pushed {} with digest {}", fqn, digest);

        Ok(format!("{}@{}", fqn, digest))
    }

    fn cli_command(
        &self,
        workspace: &Path,
        artifact: &DockerArtifact,
        fqn: &str,
    ) -> Result<ToolCommand> {
        let dockerfile = normalize_dockerfile_path(workspace, &artifact.dockerfile_path)?;

        let mut command = ToolCommand::new(&self.cli_binary, workspace)
            .arg("build")
            .arg(workspace.display().to_string())
            .arg("--file")
            .arg(dockerfile.display().to_string())
            .arg("-t")
            .arg(fqn)
            .args(build_arg_flags(&artifact.build_args));

        if self.use_buildkit {
            command = command.env("DOCKER_BUILDKIT", "1");
        }

        Ok(command)
    }
}
