//! Remote build session
//!
//! One session drives one executor build through its phases: pull secret,
//! build context, pod, log streaming and completion. Every object it
//! creates is registered on a [`TeardownStack`] the moment it exists, and
//! the stack is released on every exit path before the session reports.

use anyhow::{Context, Result};
use futures::{FutureExt, StreamExt};
use slipway_client::{ObjectMeta, Secret};
use slipway_core::{Artifact, DockerArtifact};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::guard::{ResourceGuard, ResourceKind, TeardownFailure, TeardownStack};
use super::sources::{BuildContextSource, DeliveredContext};
use super::{
    KANIKO_CONTAINER, KANIKO_SECRET_KEY, MANAGED_BY_LABEL, MANAGED_BY_VALUE, kaniko_args,
    kaniko_pod, short_id,
};
use crate::config::ClusterConfig;
use crate::error::BuildError;
use crate::output::BuildLog;
use crate::repository::ClusterRepository;

/// Delay between attempts to attach to a pod that is not running yet
const LOG_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Result of one session
#[derive(Debug)]
pub struct SessionReport {
    /// Built reference, or the first failure wrapped with its phase
    pub outcome: Result<String>,

    /// Objects that could not be deleted
    pub teardown_failures: Vec<TeardownFailure>,
}

impl SessionReport {
    /// The outcome with teardown failures folded in
    ///
    /// A failed build keeps its phase message and names the objects left
    /// behind; a successful one only warns about them.
    pub fn into_result(self) -> Result<String> {
        match self.outcome {
            Ok(built) => {
                for failure in &self.teardown_failures {
                    warn!("Built {} but {}", built, failure);
                }
                Ok(built)
            }
            Err(e) if self.teardown_failures.is_empty() => Err(e),
            Err(e) => {
                let left_behind = self
                    .teardown_failures
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                let message = format!("{} (also failed {})", e, left_behind);
                Err(e.context(message))
            }
        }
    }
}

/// One executor build and the cluster objects it owns
pub struct RemoteBuildSession {
    cluster: Arc<dyn ClusterRepository>,
    source: Arc<dyn BuildContextSource>,
    config: Arc<ClusterConfig>,
    teardown: TeardownStack,
}

impl RemoteBuildSession {
    pub fn new(
        cluster: Arc<dyn ClusterRepository>,
        source: Arc<dyn BuildContextSource>,
        config: Arc<ClusterConfig>,
    ) -> Self {
        Self {
            cluster,
            source,
            config,
            teardown: TeardownStack::new(),
        }
    }

    /// Runs the build to completion and tears everything down
    ///
    /// The session runs on its own task so that dropping the caller does not
    /// interrupt teardown. A panic inside the session is re-raised after
    /// teardown.
    pub async fn run(
        self,
        cancel: &CancellationToken,
        log: &BuildLog,
        artifact: &Artifact,
        docker: &DockerArtifact,
        fqn: &str,
    ) -> SessionReport {
        let task = tokio::spawn(self.execute(
            cancel.clone(),
            log.clone(),
            artifact.clone(),
            docker.clone(),
            fqn.to_string(),
        ));

        match task.await {
            Ok(report) => report,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => SessionReport {
                outcome: Err(anyhow::anyhow!("remote build task failed: {}", e)),
                teardown_failures: Vec::new(),
            },
        }
    }

    async fn execute(
        mut self,
        cancel: CancellationToken,
        log: BuildLog,
        artifact: Artifact,
        docker: DockerArtifact,
        fqn: String,
    ) -> SessionReport {
        let outcome = AssertUnwindSafe(self.phases(&cancel, &log, &artifact, &docker, &fqn))
            .catch_unwind()
            .await;

        let teardown_failures = self.teardown.release_all(&log).await;

        match outcome {
            Ok(outcome) => SessionReport {
                outcome,
                teardown_failures,
            },
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    async fn phases(
        &mut self,
        cancel: &CancellationToken,
        log: &BuildLog,
        artifact: &Artifact,
        docker: &DockerArtifact,
        fqn: &str,
    ) -> Result<String> {
        let secret_name = self.setup_secret(log).await.context("setting up secret")?;
        check_cancelled(cancel)?;

        let DeliveredContext {
            location,
            guard,
            volume,
        } = self
            .source
            .setup(cancel, log, artifact, docker)
            .await
            .context("setting up build context")?;
        self.teardown.push(guard);
        check_cancelled(cancel)?;

        let args = kaniko_args(&self.config, docker, &location, fqn);
        let pod = kaniko_pod(&self.config, &secret_name, args, volume);
        let pod_name = self
            .cluster
            .create_pod(&self.config.namespace, &pod)
            .await
            .context("creating pod")?;
        self.register_pod(&pod_name);
        log.info(format!("Building in pod {}", pod_name));

        self.source
            .modify_pod(cancel, &pod_name)
            .await
            .context("modifying pod")?;
        check_cancelled(cancel)?;

        self.wait_with_logs(cancel, log, &pod_name)
            .await
            .context("waiting for pod to complete")?;

        info!("Pod {} built {}", pod_name, fqn);
        Ok(fqn.to_string())
    }

    /// Provides the secret the executor pushes with
    ///
    /// A configured local key file is uploaded as a fresh secret owned by the
    /// session; otherwise the named secret must already exist.
    async fn setup_secret(&mut self, log: &BuildLog) -> Result<String> {
        let config = self.config.clone();

        let Some(path) = &config.pull_secret_path else {
            let name = &config.pull_secret_name;
            if !self.cluster.secret_exists(&config.namespace, name).await? {
                anyhow::bail!(
                    "secret {} does not exist in namespace {}; create it or configure a pull secret file",
                    name,
                    config.namespace
                );
            }
            return Ok(name.clone());
        };

        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read pull secret {}", path.display()))?;

        let name = format!("{}-{}", config.pull_secret_name, short_id());
        let meta = ObjectMeta::named(&name).with_label(MANAGED_BY_LABEL, MANAGED_BY_VALUE);
        self.cluster
            .create_secret(&config.namespace, &Secret::new(meta, KANIKO_SECRET_KEY, &data))
            .await?;
        log.debug(format!("Created secret {}", name));

        let cluster = self.cluster.clone();
        let namespace = config.namespace.clone();
        let cleanup_name = name.clone();
        self.teardown.push(ResourceGuard::new(
            ResourceKind::Secret,
            &name,
            move || async move { cluster.delete_secret(&namespace, &cleanup_name).await },
        ));

        Ok(name)
    }

    fn register_pod(&mut self, pod_name: &str) {
        let cluster = self.cluster.clone();
        let namespace = self.config.namespace.clone();
        let name = pod_name.to_string();
        self.teardown
            .push(ResourceGuard::new(ResourceKind::Pod, pod_name, move || async move {
                cluster.delete_pod(&namespace, &name).await
            }));
    }

    /// Waits for the pod while its log is copied on a separate task
    ///
    /// The copier is told when the wait ends and given the drain timeout to
    /// flush what the executor wrote last.
    async fn wait_with_logs(
        &self,
        cancel: &CancellationToken,
        log: &BuildLog,
        pod_name: &str,
    ) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();

        let copier = tokio::spawn(copy_pod_logs(
            self.cluster.clone(),
            self.config.namespace.clone(),
            pod_name.to_string(),
            log.clone(),
            cancel.clone(),
            done_rx,
            self.config.log_drain_timeout,
        ));

        let waited = self
            .cluster
            .wait_for_pod_complete(&self.config.namespace, pod_name, self.config.timeout, cancel)
            .await;

        let _ = done_tx.send(());
        if let Err(e) = copier.await {
            warn!("Log streaming of pod {} failed: {}", pod_name, e);
        }

        waited
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(BuildError::Cancelled.into());
    }
    Ok(())
}

/// Copies the executor's log lines to `log`
///
/// Attaching is retried until the container runs. Once `done` fires the
/// stream gets at most `drain` to finish.
async fn copy_pod_logs(
    cluster: Arc<dyn ClusterRepository>,
    namespace: String,
    pod_name: String,
    log: BuildLog,
    cancel: CancellationToken,
    mut done: oneshot::Receiver<()>,
    drain: Duration,
) {
    let mut completed = false;

    let mut stream = loop {
        match cluster
            .stream_logs(&namespace, &pod_name, KANIKO_CONTAINER)
            .await
        {
            Ok(stream) => break stream,
            Err(e) if completed => {
                debug!("No log available for pod {}: {:#}", pod_name, e);
                return;
            }
            Err(e) => debug!("Log of pod {} not ready: {:#}", pod_name, e),
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = &mut done, if !completed => completed = true,
            _ = tokio::time::sleep(LOG_RETRY_INTERVAL) => {}
        }
    };

    let copy = async {
        while let Some(line) = stream.next().await {
            match line {
                Ok(line) => log.output(line),
                Err(e) => {
                    debug!("Log stream of pod {} broke: {}", pod_name, e);
                    break;
                }
            }
        }
    };
    tokio::pin!(copy);

    if !completed {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = &mut copy => return,
            _ = &mut done => {}
        }
    }

    tokio::select! {
        _ = cancel.cancelled() => {}
        drained = tokio::time::timeout(drain, &mut copy) => {
            if drained.is_err() {
                warn!("Log of pod {} still open {:?} after completion, detaching", pod_name, drain);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::DockerfileDependencies;
    use crate::output::InMemorySink;
    use crate::remote::InlineSource;
    use crate::testing::FakeCluster;
    use std::sync::atomic::AtomicUsize;

    struct Fixture {
        cluster: Arc<FakeCluster>,
        sink: InMemorySink,
        workspace: tempfile::TempDir,
    }

    impl Fixture {
        fn new(cluster: FakeCluster) -> Self {
            let workspace = tempfile::tempdir().unwrap();
            std::fs::write(workspace.path().join("Dockerfile"), "FROM scratch\n").unwrap();
            Self {
                cluster: Arc::new(cluster),
                sink: InMemorySink::new(),
                workspace,
            }
        }

        fn session(&self, config: ClusterConfig) -> RemoteBuildSession {
            let source = Arc::new(InlineSource::new(
                self.cluster.clone(),
                "default",
                Arc::new(DockerfileDependencies),
            ));
            RemoteBuildSession::new(self.cluster.clone(), source, Arc::new(config))
        }

        async fn run(&self, config: ClusterConfig, cancel: &CancellationToken) -> SessionReport {
            let artifact = Artifact::docker("gcr.io/p/app", self.workspace.path());
            let log = BuildLog::new(Arc::new(self.sink.clone()), "gcr.io/p/app");
            self.session(config)
                .run(
                    cancel,
                    &log,
                    &artifact,
                    &DockerArtifact::default(),
                    "gcr.io/p/app:v1",
                )
                .await
        }
    }

    fn config() -> ClusterConfig {
        ClusterConfig::new("https://cluster.local".to_string())
    }

    fn existing_secret() -> FakeCluster {
        FakeCluster {
            existing_secrets: vec!["kaniko-secret".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_successful_build_tears_down_in_reverse() {
        let fixture = Fixture::new(existing_secret());
        let report = fixture.run(config(), &CancellationToken::new()).await;

        assert_eq!(report.outcome.unwrap(), "gcr.io/p/app:v1");
        assert!(report.teardown_failures.is_empty());

        let calls = fixture.cluster.calls();
        let delete_pod = calls.iter().position(|c| c == "delete pod kaniko-x1").unwrap();
        let delete_context = calls
            .iter()
            .position(|c| c.starts_with("delete configmap slipway-context-"))
            .unwrap();
        assert!(delete_pod < delete_context);

        // The pre-existing secret is not owned by the session
        assert_eq!(fixture.cluster.count("delete secret"), 0);

        let pod = fixture.cluster.pods.lock().unwrap()[0].clone();
        let args = &pod.spec.containers[0].args;
        assert_eq!(args[1], "--context=tar:///kaniko/buildcontext/context.tar.gz");
        assert_eq!(args[2], "--destination=gcr.io/p/app:v1");
    }

    #[tokio::test]
    async fn test_pod_creation_failure_cleans_up_once() {
        let key = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(key.path(), "{}").unwrap();

        let fixture = Fixture::new(FakeCluster {
            fail_create_pod: true,
            ..Default::default()
        });
        let mut config = config();
        config.pull_secret_path = Some(key.path().to_path_buf());

        let report = fixture.run(config, &CancellationToken::new()).await;

        let err = report.outcome.unwrap_err();
        assert_eq!(err.to_string(), "creating pod");
        assert!(format!("{:#}", err).contains("pods is forbidden"));
        assert!(report.teardown_failures.is_empty());

        assert_eq!(fixture.cluster.count("create secret kaniko-secret-"), 1);
        assert_eq!(fixture.cluster.count("delete secret kaniko-secret-"), 1);
        assert_eq!(fixture.cluster.count("delete configmap"), 1);
        assert_eq!(fixture.cluster.count("delete pod"), 0);

        let secrets = fixture.cluster.secrets.lock().unwrap();
        assert_eq!(secrets[0].decoded(KANIKO_SECRET_KEY), Some(b"{}".to_vec()));
    }

    #[tokio::test]
    async fn test_missing_secret_fails_first_phase() {
        let fixture = Fixture::new(FakeCluster::default());
        let report = fixture.run(config(), &CancellationToken::new()).await;

        let err = report.outcome.unwrap_err();
        assert_eq!(err.to_string(), "setting up secret");
        assert_eq!(fixture.cluster.count("create"), 0);
    }

    #[tokio::test]
    async fn test_pod_delete_failure_is_secondary() {
        let fixture = Fixture::new(FakeCluster {
            fail_delete_pod: true,
            ..existing_secret()
        });
        let report = fixture.run(config(), &CancellationToken::new()).await;

        assert_eq!(report.outcome.unwrap(), "gcr.io/p/app:v1");
        assert_eq!(report.teardown_failures.len(), 1);
        assert_eq!(report.teardown_failures[0].kind, ResourceKind::Pod);
        assert_eq!(fixture.cluster.count("delete configmap"), 1);
        assert!(fixture.sink.messages().iter().any(|m| m.contains("orphaned")));
    }

    #[tokio::test]
    async fn test_pod_failure_keeps_phase() {
        let fixture = Fixture::new(FakeCluster {
            pod_failure: Some("error building image".to_string()),
            ..existing_secret()
        });
        let report = fixture.run(config(), &CancellationToken::new()).await;

        let err = report.outcome.unwrap_err();
        assert_eq!(err.to_string(), "waiting for pod to complete");
        assert!(format!("{:#}", err).contains("error building image"));
        assert_eq!(fixture.cluster.count("delete pod kaniko-x1"), 1);
    }

    #[tokio::test]
    async fn test_log_lines_reach_sink() {
        let fixture = Fixture::new(FakeCluster {
            log_lines: vec!["INFO[0001] Unpacking rootfs".to_string(), "INFO[0002] Pushed".to_string()],
            log_failures: AtomicUsize::new(1),
            ..existing_secret()
        });
        let report = fixture.run(config(), &CancellationToken::new()).await;
        assert!(report.outcome.is_ok());

        let messages = fixture.sink.messages();
        assert!(messages.contains(&"INFO[0001] Unpacking rootfs".to_string()));
        assert!(messages.contains(&"INFO[0002] Pushed".to_string()));
        assert!(fixture.cluster.count("logs pod kaniko-x1") >= 1);
    }

    #[tokio::test]
    async fn test_cancellation_still_tears_down() {
        let fixture = Fixture::new(FakeCluster {
            hang: true,
            ..existing_secret()
        });
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let report = fixture.run(config(), &cancel).await;

        let err = report.outcome.unwrap_err();
        assert!(BuildError::is_cancelled(&err));
        assert_eq!(fixture.cluster.count("delete pod kaniko-x1"), 1);
        assert_eq!(fixture.cluster.count("delete configmap"), 1);
    }

    #[tokio::test]
    async fn test_timeout_still_tears_down() {
        let fixture = Fixture::new(FakeCluster {
            hang: true,
            ..existing_secret()
        });
        let mut config = config();
        config.timeout = Duration::from_millis(50);

        let report = fixture.run(config, &CancellationToken::new()).await;

        let err = report.outcome.unwrap_err();
        assert_eq!(err.to_string(), "waiting for pod to complete");
        assert!(format!("{:#}", err).contains("timed out after 50ms waiting for pod kaniko-x1"));
        assert_eq!(fixture.cluster.count("delete pod kaniko-x1"), 1);
        assert_eq!(fixture.cluster.count("delete configmap"), 1);
    }

    #[tokio::test]
    async fn test_panic_tears_down_then_propagates() {
        let fixture = Fixture::new(FakeCluster {
            panic_in_wait: true,
            ..existing_secret()
        });

        let outcome = AssertUnwindSafe(fixture.run(config(), &CancellationToken::new()))
            .catch_unwind()
            .await;

        assert!(outcome.is_err());
        assert_eq!(fixture.cluster.count("delete pod kaniko-x1"), 1);
        assert_eq!(fixture.cluster.count("delete configmap"), 1);
    }
}
