//! Jib builds through Maven and Gradle

use anyhow::{Context, Result};
use slipway_core::{JibGradleArtifact, JibMavenArtifact};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::docker::ImageDaemon;
use crate::output::BuildLog;
use crate::process::{ToolCommand, find_command, run_streaming};

/// Builds Jib projects; when pushing, Jib itself pushes to the registry
pub struct JibBuilder {
    daemon: Arc<dyn ImageDaemon>,
    push: bool,
}

impl JibBuilder {
    pub fn new(daemon: Arc<dyn ImageDaemon>, push: bool) -> Self {
        Self { daemon, push }
    }

    pub async fn build_maven(
        &self,
        cancel: &CancellationToken,
        log: &BuildLog,
        workspace: &Path,
        artifact: &JibMavenArtifact,
        fqn: &str,
    ) -> Result<String> {
        let command = ToolCommand::new(find_command(workspace, "mvn", "mvnw"), workspace)
            .args(maven_args(artifact, fqn, self.push));

        run_streaming(&command, log, cancel)
            .await
            .context("maven build failed")?;

        self.resolve(cancel, fqn).await
    }

    pub async fn build_gradle(
        &self,
        cancel: &CancellationToken,
        log: &BuildLog,
        workspace: &Path,
        artifact: &JibGradleArtifact,
        fqn: &str,
    ) -> Result<String> {
        let command = ToolCommand::new(find_command(workspace, "gradle", "gradlew"), workspace)
            .args(gradle_args(artifact, fqn, self.push));

        run_streaming(&command, log, cancel)
            .await
            .context("gradle build failed")?;

        self.resolve(cancel, fqn).await
    }

    async fn resolve(&self, cancel: &CancellationToken, fqn: &str) -> Result<String> {
        if !self.push {
            return Ok(fqn.to_string());
        }

        let digest = self
            .daemon
            .remote_digest(cancel, fqn)
            .await
            .context("getting digest")?;
        debug!("Jib pushed {} with digest {}", fqn, digest);

        Ok(format!("{}@{}", fqn, digest))
    }
}

fn maven_args(artifact: &JibMavenArtifact, fqn: &str, push: bool) -> Vec<String> {
    let mut args = vec!["-Djib.console=plain".to_string()];

    if let Some(profile) = &artifact.profile {
        args.push("--activate-profiles".to_string());
        args.push(profile.clone());
    }

    if let Some(module) = &artifact.module {
        args.push("--projects".to_string());
        args.push(module.clone());
        args.push("--also-make".to_string());
    }

    let goal = if push { "jib:build" } else { "jib:dockerBuild" };
    args.push("prepare-package".to_string());
    args.push(goal.to_string());
    args.push(format!("-Dimage={}", fqn));

    args
}

fn gradle_args(artifact: &JibGradleArtifact, fqn: &str, push: bool) -> Vec<String> {
    let task = if push { "jib" } else { "jibDockerBuild" };
    let task = match &artifact.project {
        Some(project) => format!(":{}:{}", project, task),
        None => task.to_string(),
    };

    vec![
        "-Djib.console=plain".to_string(),
        task,
        format!("--image={}", fqn),
    ]
}
