//! Backend selection

use anyhow::Result;
use async_trait::async_trait;
use slipway_core::{Artifact, ArtifactType};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ArtifactBuilder, BazelBuilder, JibBuilder, LocalBuilder};
use crate::config::BuildConfig;
use crate::docker::{DependencyResolver, DockerCli, DockerfileDependencies, ImageDaemon};
use crate::error::BuildError;
use crate::output::BuildLog;
use crate::remote::KanikoBuilder;

/// Routes each artifact to the backend of its declared type
pub struct Dispatcher {
    local: LocalBuilder,
    bazel: BazelBuilder,
    jib: JibBuilder,
    remote: Option<Arc<dyn ArtifactBuilder>>,
}

impl Dispatcher {
    /// Local backends sharing one image daemon; no remote backend
    pub fn new(config: &BuildConfig, daemon: Arc<dyn ImageDaemon>) -> Self {
        Self {
            local: LocalBuilder::new(daemon.clone(), config.push_images)
                .with_cli(config.use_docker_cli, config.use_buildkit),
            bazel: BazelBuilder::new(daemon.clone(), config.push_images),
            jib: JibBuilder::new(daemon, config.push_images),
            remote: None,
        }
    }

    /// Builds `remote_pod` artifacts with `remote`
    pub fn with_remote(mut self, remote: Arc<dyn ArtifactBuilder>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Wires the docker CLI daemon and, when a cluster is configured, the
    /// executor pod backend
    pub fn from_config(config: &BuildConfig) -> Result<Self> {
        config.validate()?;

        let resolver: Arc<dyn DependencyResolver> = Arc::new(DockerfileDependencies);
        let daemon: Arc<dyn ImageDaemon> = Arc::new(DockerCli::new(resolver.clone()));
        let dispatcher = Self::new(config, daemon.clone());

        let Some(cluster) = &config.cluster else {
            return Ok(dispatcher);
        };

        debug!("Remote builds run in namespace {} of {}", cluster.namespace, cluster.api_url);
        let remote = KanikoBuilder::from_config(cluster, resolver).with_digests(daemon);
        Ok(dispatcher.with_remote(Arc::new(remote)))
    }
}

#[async_trait]
impl ArtifactBuilder for Dispatcher {
    async fn build(
        &self,
        cancel: &CancellationToken,
        log: &BuildLog,
        artifact: &Artifact,
        fqn: &str,
    ) -> Result<String> {
        let workspace = &artifact.workspace;

        match &artifact.artifact_type {
            ArtifactType::Docker(docker) => {
                self.local.build(cancel, log, workspace, docker, fqn).await
            }
            ArtifactType::Bazel(bazel) => {
                self.bazel.build(cancel, log, workspace, bazel, fqn).await
            }
            ArtifactType::JibMaven(maven) => {
                self.jib.build_maven(cancel, log, workspace, maven, fqn).await
            }
            ArtifactType::JibGradle(gradle) => {
                self.jib.build_gradle(cancel, log, workspace, gradle, fqn).await
            }
            ArtifactType::RemotePod(_) => match &self.remote {
                Some(remote) => remote.build(cancel, log, artifact, fqn).await,
                None => Err(BuildError::NoCluster {
                    image: artifact.image_name.clone(),
                }
                .into()),
            },
            other => Err(BuildError::UndefinedArtifactType(other.name().to_string()).into()),
        }
    }
}
