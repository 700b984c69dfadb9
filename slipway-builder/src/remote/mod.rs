//! Remote pod builds
//!
//! Dockerfile artifacts of the `remote_pod` type are built by a Kaniko
//! executor pod inside the cluster. Each build runs one
//! [`RemoteBuildSession`] that owns every object it creates.

mod guard;
mod session;
mod sources;

pub use guard::{ResourceGuard, ResourceKind, TeardownFailure, TeardownStack};
pub use session::{RemoteBuildSession, SessionReport};
pub use sources::{
    BuildContextSource, DeliveredContext, INLINE_CONTEXT_DIR, InlineSource,
    MAX_INLINE_CONTEXT_BYTES, StagingSource,
};

use anyhow::Result;
use async_trait::async_trait;
use slipway_client::{
    ClusterClient, Container, EnvVar, ObjectMeta, Pod, PodSpec, SecretVolumeSource, Volume,
    VolumeMount,
};
use slipway_core::{Artifact, DockerArtifact};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::backend::ArtifactBuilder;
use crate::config::ClusterConfig;
use crate::docker::{DependencyResolver, ImageDaemon, args::build_arg_flags};
use crate::error::BuildError;
use crate::output::BuildLog;
use crate::repository::{ClusterRepository, HttpClusterRepository, HttpObjectStore};

/// Label put on every object a session creates
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "slipway";

/// Name of the executor container
pub const KANIKO_CONTAINER: &str = "kaniko";

/// Data key of the pull secret, also its file name under [`SECRET_MOUNT`]
pub const KANIKO_SECRET_KEY: &str = "kaniko-secret";

pub const SECRET_MOUNT: &str = "/secret";

const SECRET_VOLUME: &str = "kaniko-secret";

/// Random suffix keeping generated object names unique
fn short_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

/// Executor arguments
///
/// Order: Dockerfile, context, destination, verbosity, additional flags,
/// build arguments, then the cache flags when caching is enabled.
pub fn kaniko_args(
    config: &ClusterConfig,
    docker: &DockerArtifact,
    context: &str,
    fqn: &str,
) -> Vec<String> {
    let mut args = vec![
        format!("--dockerfile={}", docker.dockerfile_path),
        format!("--context={}", context),
        format!("--destination={}", fqn),
        format!("-v={}", config.verbosity),
    ];

    args.extend(config.additional_flags.iter().cloned());
    args.extend(build_arg_flags(&docker.build_args));

    if let Some(cache) = &config.cache {
        args.push("--cache=true".to_string());
        if !cache.repo.is_empty() {
            args.push(format!("--cache-repo={}", cache.repo));
        }
    }

    args
}

/// Executor pod running `args` with the pull secret mounted
pub fn kaniko_pod(
    config: &ClusterConfig,
    secret_name: &str,
    args: Vec<String>,
    context_volume: Option<(Volume, VolumeMount)>,
) -> Pod {
    let mut volumes = vec![Volume {
        name: SECRET_VOLUME.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: secret_name.to_string(),
        }),
        ..Default::default()
    }];
    let mut volume_mounts = vec![VolumeMount {
        name: SECRET_VOLUME.to_string(),
        mount_path: SECRET_MOUNT.to_string(),
    }];

    if let Some((volume, mount)) = context_volume {
        volumes.push(volume);
        volume_mounts.push(mount);
    }

    let metadata = ObjectMeta {
        generate_name: Some("kaniko-".to_string()),
        ..Default::default()
    }
    .with_label(MANAGED_BY_LABEL, MANAGED_BY_VALUE);

    Pod::new(
        metadata,
        PodSpec {
            containers: vec![Container {
                name: KANIKO_CONTAINER.to_string(),
                image: config.executor_image.clone(),
                args,
                env: vec![EnvVar {
                    name: "GOOGLE_APPLICATION_CREDENTIALS".to_string(),
                    value: format!("{}/{}", SECRET_MOUNT, KANIKO_SECRET_KEY),
                }],
                volume_mounts,
            }],
            restart_policy: Some("Never".to_string()),
            volumes,
        },
    )
}

/// Builds Dockerfile artifacts in executor pods
pub struct KanikoBuilder {
    cluster: Arc<dyn ClusterRepository>,
    source: Arc<dyn BuildContextSource>,
    config: Arc<ClusterConfig>,
    digests: Option<Arc<dyn ImageDaemon>>,
}

impl KanikoBuilder {
    pub fn new(
        cluster: Arc<dyn ClusterRepository>,
        source: Arc<dyn BuildContextSource>,
        config: ClusterConfig,
    ) -> Self {
        Self {
            cluster,
            source,
            config: Arc::new(config),
            digests: None,
        }
    }

    /// Appends the pushed digest, looked up through `daemon`, to results
    pub fn with_digests(mut self, daemon: Arc<dyn ImageDaemon>) -> Self {
        self.digests = Some(daemon);
        self
    }

    /// Wires the HTTP cluster client and the configured context source
    pub fn from_config(config: &ClusterConfig, resolver: Arc<dyn DependencyResolver>) -> Self {
        let mut client = ClusterClient::new(&config.api_url);
        if let Some(token) = &config.token {
            client = client.with_token(token);
        }
        let cluster: Arc<dyn ClusterRepository> = Arc::new(HttpClusterRepository::new(client));

        let source: Arc<dyn BuildContextSource> = match &config.context_source {
            crate::config::ContextSourceConfig::Inline => Arc::new(InlineSource::new(
                cluster.clone(),
                &config.namespace,
                resolver,
            )),
            crate::config::ContextSourceConfig::Staging { base_url } => Arc::new(
                StagingSource::new(Arc::new(HttpObjectStore::new(base_url)), resolver),
            ),
        };

        Self::new(cluster, source, config.clone())
    }
}

#[async_trait]
impl ArtifactBuilder for KanikoBuilder {
    async fn build(
        &self,
        cancel: &CancellationToken,
        log: &BuildLog,
        artifact: &Artifact,
        fqn: &str,
    ) -> Result<String> {
        let Some(docker) = artifact.dockerfile() else {
            return Err(
                BuildError::UndefinedArtifactType(artifact.artifact_type.name().to_string()).into(),
            );
        };

        let session = RemoteBuildSession::new(
            self.cluster.clone(),
            self.source.clone(),
            self.config.clone(),
        );
        let built = session
            .run(cancel, log, artifact, docker, fqn)
            .await
            .into_result()?;

        let Some(daemon) = &self.digests else {
            return Ok(built);
        };

        match daemon.remote_digest(cancel, &built).await {
            Ok(digest) => Ok(format!("{}@{}", built, digest)),
            Err(e) => {
                warn!("Unable to resolve digest of {}: {:#}", built, e);
                Ok(built)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::docker::DockerfileDependencies;
    use crate::output::InMemorySink;
    use crate::testing::{FakeCluster, FakeDaemon};
    use std::collections::BTreeMap;

    fn config() -> ClusterConfig {
        ClusterConfig::new("https://cluster.local".to_string())
    }

    #[test]
    fn test_kaniko_args_order() {
        let mut config = config();
        config.verbosity = "debug".to_string();
        config.additional_flags = vec!["--snapshotMode=redo".to_string()];
        config.cache = Some(CacheConfig {
            repo: "gcr.io/p/cache".to_string(),
        });

        let docker = DockerArtifact {
            dockerfile_path: "build/Dockerfile".to_string(),
            build_args: BTreeMap::from([("VERSION".to_string(), Some("1.0".to_string()))]),
        };

        let args = kaniko_args(&config, &docker, "tar:///ctx.tar.gz", "gcr.io/p/app:v1");
        assert_eq!(
            args,
            vec![
                "--dockerfile=build/Dockerfile",
                "--context=tar:///ctx.tar.gz",
                "--destination=gcr.io/p/app:v1",
                "-v=debug",
                "--snapshotMode=redo",
                "--build-arg",
                "VERSION=1.0",
                "--cache=true",
                "--cache-repo=gcr.io/p/cache",
            ]
        );
    }

    #[test]
    fn test_kaniko_args_cache_without_repo() {
        let mut config = config();
        config.cache = Some(CacheConfig::default());

        let args = kaniko_args(&config, &DockerArtifact::default(), "ctx", "app:v1");
        assert_eq!(args.last().map(String::as_str), Some("--cache=true"));
        assert!(!args.iter().any(|a| a.starts_with("--cache-repo")));

        config.cache = None;
        let args = kaniko_args(&config, &DockerArtifact::default(), "ctx", "app:v1");
        assert_eq!(args.len(), 4);
    }

    #[test]
    fn test_kaniko_pod_mounts_secret() {
        let pod = kaniko_pod(&config(), "kaniko-secret-1234", vec!["-v=info".to_string()], None);

        assert_eq!(pod.metadata.generate_name.as_deref(), Some("kaniko-"));
        assert_eq!(
            pod.metadata.labels.get(MANAGED_BY_LABEL).map(String::as_str),
            Some("slipway")
        );
        assert_eq!(pod.spec.restart_policy.as_deref(), Some("Never"));

        let container = &pod.spec.containers[0];
        assert_eq!(container.name, "kaniko");
        assert_eq!(container.image, crate::config::DEFAULT_EXECUTOR_IMAGE);
        assert_eq!(container.env[0].value, "/secret/kaniko-secret");
        assert_eq!(container.volume_mounts[0].mount_path, "/secret");
        assert_eq!(
            pod.spec.volumes[0].secret.as_ref().map(|s| s.secret_name.as_str()),
            Some("kaniko-secret-1234")
        );
    }

    fn builder(cluster: Arc<FakeCluster>) -> KanikoBuilder {
        let source = Arc::new(InlineSource::new(
            cluster.clone(),
            "default",
            Arc::new(DockerfileDependencies),
        ));
        KanikoBuilder::new(cluster, source, config())
    }

    fn workspace() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();
        dir
    }

    fn remote_artifact(workspace: &std::path::Path) -> Artifact {
        Artifact {
            image_name: "gcr.io/p/app".to_string(),
            workspace: workspace.to_path_buf(),
            artifact_type: slipway_core::ArtifactType::RemotePod(DockerArtifact::default()),
        }
    }

    #[tokio::test]
    async fn test_build_appends_registry_digest() {
        let dir = workspace();
        let cluster = Arc::new(FakeCluster {
            existing_secrets: vec!["kaniko-secret".to_string()],
            ..Default::default()
        });
        let builder = builder(cluster.clone()).with_digests(Arc::new(FakeDaemon::default()));
        let log = BuildLog::new(Arc::new(InMemorySink::new()), "app");

        let built = builder
            .build(&CancellationToken::new(), &log, &remote_artifact(dir.path()), "gcr.io/p/app:v1")
            .await
            .unwrap();

        assert_eq!(built, "gcr.io/p/app:v1@sha256:def456");
    }

    #[tokio::test]
    async fn test_build_without_digest_keeps_fqn() {
        let dir = workspace();
        let cluster = Arc::new(FakeCluster {
            existing_secrets: vec!["kaniko-secret".to_string()],
            ..Default::default()
        });
        let daemon = FakeDaemon {
            fail_remote_digest: true,
            ..Default::default()
        };
        let builder = builder(cluster).with_digests(Arc::new(daemon));
        let log = BuildLog::new(Arc::new(InMemorySink::new()), "app");

        let built = builder
            .build(&CancellationToken::new(), &log, &remote_artifact(dir.path()), "gcr.io/p/app:v1")
            .await
            .unwrap();

        assert_eq!(built, "gcr.io/p/app:v1");
    }

    #[tokio::test]
    async fn test_failed_build_reports_orphaned_pod() {
        let dir = workspace();
        let cluster = Arc::new(FakeCluster {
            existing_secrets: vec!["kaniko-secret".to_string()],
            pod_failure: Some("error building image".to_string()),
            fail_delete_pod: true,
            ..Default::default()
        });
        let builder = builder(cluster.clone());
        let log = BuildLog::new(Arc::new(InMemorySink::new()), "app");

        let err = builder
            .build(&CancellationToken::new(), &log, &remote_artifact(dir.path()), "gcr.io/p/app:v1")
            .await
            .unwrap_err();

        let chain = format!("{:#}", err);
        assert!(err.to_string().starts_with("waiting for pod to complete"));
        assert!(chain.contains("error building image"));
        assert!(chain.contains("deleting pod kaniko-x1: connection refused"));
        assert_eq!(cluster.count("delete configmap"), 1);
    }
}
