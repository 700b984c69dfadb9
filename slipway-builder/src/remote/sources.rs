//! Build context delivery
//!
//! A context source makes the packaged build context readable by the
//! executor pod, and registers the cleanup of whatever it created.

use anyhow::{Context, Result};
use async_trait::async_trait;
use slipway_client::{ConfigMap, ConfigMapVolumeSource, ObjectMeta, Volume, VolumeMount};
use slipway_core::{Artifact, DockerArtifact};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::guard::{ResourceGuard, ResourceKind};
use super::{MANAGED_BY_LABEL, MANAGED_BY_VALUE, short_id};
use crate::docker::{BuildContextArchive, DependencyResolver};
use crate::output::BuildLog;
use crate::repository::{ClusterRepository, ObjectStore};

/// Largest context carried inline (config maps are capped by the API server)
pub const MAX_INLINE_CONTEXT_BYTES: usize = 1024 * 1024;

/// Where an inline context is mounted in the executor
pub const INLINE_CONTEXT_DIR: &str = "/kaniko/buildcontext";

const INLINE_CONTEXT_FILE: &str = "context.tar.gz";

const INLINE_VOLUME_NAME: &str = "build-context";

/// A context the executor can read
pub struct DeliveredContext {
    /// Value of the executor's `--context` flag
    pub location: String,

    /// Deletes the uploaded context
    pub guard: ResourceGuard,

    /// Volume the pod must mount to see the context
    pub volume: Option<(Volume, VolumeMount)>,
}

/// Makes build contexts available to the executor
#[async_trait]
pub trait BuildContextSource: Send + Sync {
    /// Packages and uploads the context of `artifact`
    async fn setup(
        &self,
        cancel: &CancellationToken,
        log: &BuildLog,
        artifact: &Artifact,
        docker: &DockerArtifact,
    ) -> Result<DeliveredContext>;

    /// Adjusts the created pod, e.g. copying the context into it
    async fn modify_pod(&self, _cancel: &CancellationToken, _pod_name: &str) -> Result<()> {
        Ok(())
    }
}

/// Packages a context off the async runtime
async fn package(
    resolver: Arc<dyn DependencyResolver>,
    workspace: &Path,
    docker: &DockerArtifact,
) -> Result<BuildContextArchive> {
    let workspace = workspace.to_path_buf();
    let docker = docker.clone();

    tokio::task::spawn_blocking(move || {
        BuildContextArchive::package(&workspace, &docker, resolver.as_ref())
    })
    .await
    .context("Build context packaging task failed")?
}

/// Carries the context in a config map mounted into the pod
pub struct InlineSource {
    cluster: Arc<dyn ClusterRepository>,
    namespace: String,
    resolver: Arc<dyn DependencyResolver>,
}

impl InlineSource {
    pub fn new(
        cluster: Arc<dyn ClusterRepository>,
        namespace: impl Into<String>,
        resolver: Arc<dyn DependencyResolver>,
    ) -> Self {
        Self {
            cluster,
            namespace: namespace.into(),
            resolver,
        }
    }
}

#[async_trait]
impl BuildContextSource for InlineSource {
    async fn setup(
        &self,
        cancel: &CancellationToken,
        log: &BuildLog,
        artifact: &Artifact,
        docker: &DockerArtifact,
    ) -> Result<DeliveredContext> {
        let archive = package(self.resolver.clone(), &artifact.workspace, docker).await?;

        if archive.len() > MAX_INLINE_CONTEXT_BYTES {
            anyhow::bail!(
                "build context is {} bytes, inline contexts are limited to {} bytes; configure a staging bucket",
                archive.len(),
                MAX_INLINE_CONTEXT_BYTES
            );
        }

        if cancel.is_cancelled() {
            return Err(crate::error::BuildError::Cancelled.into());
        }

        let name = format!("slipway-context-{}", short_id());
        let meta = ObjectMeta::named(&name).with_label(MANAGED_BY_LABEL, MANAGED_BY_VALUE);
        let config_map = ConfigMap::binary(meta, INLINE_CONTEXT_FILE, archive.bytes());

        log.debug(format!(
            "Storing {} byte build context in config map {}",
            archive.len(),
            name
        ));
        self.cluster
            .create_config_map(&self.namespace, &config_map)
            .await?;

        let cluster = self.cluster.clone();
        let namespace = self.namespace.clone();
        let cleanup_name = name.clone();
        let guard = ResourceGuard::new(ResourceKind::BuildContext, &name, move || async move {
            cluster.delete_config_map(&namespace, &cleanup_name).await
        });

        let volume = Volume {
            name: INLINE_VOLUME_NAME.to_string(),
            config_map: Some(ConfigMapVolumeSource { name }),
            ..Default::default()
        };
        let mount = VolumeMount {
            name: INLINE_VOLUME_NAME.to_string(),
            mount_path: INLINE_CONTEXT_DIR.to_string(),
        };

        Ok(DeliveredContext {
            location: format!("tar://{}/{}", INLINE_CONTEXT_DIR, INLINE_CONTEXT_FILE),
            guard,
            volume: Some((volume, mount)),
        })
    }
}

/// Uploads the context to a staging bucket the executor reads from
pub struct StagingSource {
    store: Arc<dyn ObjectStore>,
    resolver: Arc<dyn DependencyResolver>,
}

impl StagingSource {
    pub fn new(store: Arc<dyn ObjectStore>, resolver: Arc<dyn DependencyResolver>) -> Self {
        Self { store, resolver }
    }
}

#[async_trait]
impl BuildContextSource for StagingSource {
    async fn setup(
        &self,
        cancel: &CancellationToken,
        log: &BuildLog,
        artifact: &Artifact,
        docker: &DockerArtifact,
    ) -> Result<DeliveredContext> {
        let archive = package(self.resolver.clone(), &artifact.workspace, docker).await?;

        if cancel.is_cancelled() {
            return Err(crate::error::BuildError::Cancelled.into());
        }

        let object = format!("context-{}.tar.gz", uuid::Uuid::new_v4());
        log.debug(format!("Uploading {} byte build context", archive.len()));
        let url = self.store.upload(&object, archive.into_bytes()).await?;
        debug!("Uploaded build context to {}", url);

        let store = self.store.clone();
        let name = object.clone();
        let guard = ResourceGuard::new(ResourceKind::BuildContext, name, move || async move {
            store.delete(&object).await
        });

        Ok(DeliveredContext {
            location: url,
            guard,
            volume: None,
        })
    }
}
