//! Fakes shared by unit tests

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use slipway_client::{ClientError, ConfigMap, LogStream, Pod, Secret};
use slipway_core::DockerArtifact;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::docker::ImageDaemon;
use crate::output::BuildLog;
use crate::repository::ClusterRepository;

/// Daemon that records calls and succeeds unless told otherwise
#[derive(Default)]
pub struct FakeDaemon {
    pub fail_build: bool,
    pub fail_remote_digest: bool,
    pub calls: Mutex<Vec<String>>,
}

#[async_trait]
impl ImageDaemon for FakeDaemon {
    async fn build(
        &self,
        _cancel: &CancellationToken,
        _log: &BuildLog,
        _workspace: &Path,
        _artifact: &DockerArtifact,
        fqn: &str,
    ) -> Result<()> {
        self.calls.lock().unwrap().push(format!("build {}", fqn));
        if self.fail_build {
            anyhow::bail!("daemon unavailable");
        }
        Ok(())
    }

    async fn push(&self, _cancel: &CancellationToken, _log: &BuildLog, fqn: &str) -> Result<String> {
        self.calls.lock().unwrap().push(format!("push {}", fqn));
        Ok("sha256:abc123".to_string())
    }

    async fn load(&self, _cancel: &CancellationToken, _log: &BuildLog, _tarball: &Path) -> Result<String> {
        Ok("bazel/app:image".to_string())
    }

    async fn tag(&self, _cancel: &CancellationToken, _image: &str, _fqn: &str) -> Result<()> {
        Ok(())
    }

    async fn remote_digest(&self, _cancel: &CancellationToken, fqn: &str) -> Result<String> {
        self.calls.lock().unwrap().push(format!("remote_digest {}", fqn));
        if self.fail_remote_digest {
            anyhow::bail!("registry unreachable");
        }
        Ok("sha256:def456".to_string())
    }
}

/// Cluster that records every call as `"<verb> <kind> <name>"`
#[derive(Default)]
pub struct FakeCluster {
    pub existing_secrets: Vec<String>,
    pub fail_create_pod: bool,
    pub fail_delete_pod: bool,
    /// Error the completion wait reports
    pub pod_failure: Option<String>,
    /// Keep the pod pending until cancelled or timed out
    pub hang: bool,
    /// Panic in the completion wait
    pub panic_in_wait: bool,
    /// Number of log stream attempts that fail before one opens
    pub log_failures: AtomicUsize,
    pub log_lines: Vec<String>,
    pub calls: Mutex<Vec<String>>,
    pub pods: Mutex<Vec<Pod>>,
    pub config_maps: Mutex<Vec<ConfigMap>>,
    pub secrets: Mutex<Vec<Secret>>,
}

impl FakeCluster {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    /// Calls starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClusterRepository for FakeCluster {
    async fn create_secret(&self, _namespace: &str, secret: &Secret) -> Result<()> {
        let name = secret.metadata.name.clone().unwrap_or_default();
        self.record(format!("create secret {}", name));
        self.secrets.lock().unwrap().push(secret.clone());
        Ok(())
    }

    async fn secret_exists(&self, _namespace: &str, name: &str) -> Result<bool> {
        self.record(format!("get secret {}", name));
        Ok(self.existing_secrets.iter().any(|s| s == name))
    }

    async fn delete_secret(&self, _namespace: &str, name: &str) -> Result<()> {
        self.record(format!("delete secret {}", name));
        Ok(())
    }

    async fn create_config_map(&self, _namespace: &str, config_map: &ConfigMap) -> Result<()> {
        let name = config_map.metadata.name.clone().unwrap_or_default();
        self.record(format!("create configmap {}", name));
        self.config_maps.lock().unwrap().push(config_map.clone());
        Ok(())
    }

    async fn delete_config_map(&self, _namespace: &str, name: &str) -> Result<()> {
        self.record(format!("delete configmap {}", name));
        Ok(())
    }

    async fn create_pod(&self, _namespace: &str, pod: &Pod) -> Result<String> {
        self.record("create pod kaniko-x1".to_string());
        if self.fail_create_pod {
            anyhow::bail!("pods is forbidden");
        }
        self.pods.lock().unwrap().push(pod.clone());
        Ok("kaniko-x1".to_string())
    }

    async fn delete_pod(&self, _namespace: &str, name: &str) -> Result<()> {
        self.record(format!("delete pod {}", name));
        if self.fail_delete_pod {
            anyhow::bail!("connection refused");
        }
        Ok(())
    }

    async fn stream_logs(&self, _namespace: &str, name: &str, _container: &str) -> Result<LogStream> {
        self.record(format!("logs pod {}", name));
        let remaining = self.log_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.log_failures.store(remaining - 1, Ordering::SeqCst);
            anyhow::bail!("container is waiting to start");
        }
        let lines: Vec<Result<String, ClientError>> =
            self.log_lines.iter().cloned().map(Ok).collect();
        Ok(futures::stream::iter(lines).boxed())
    }

    async fn wait_for_pod_complete(
        &self,
        _namespace: &str,
        name: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.record(format!("wait pod {}", name));
        if self.panic_in_wait {
            panic!("watch of pod {} broke", name);
        }
        if self.hang {
            return tokio::select! {
                _ = cancel.cancelled() => Err(ClientError::Cancelled.into()),
                _ = tokio::time::sleep(timeout) => Err(ClientError::Timeout {
                    name: name.to_string(),
                    timeout,
                }
                .into()),
            };
        }
        // Give the log copier a chance to attach first
        tokio::time::sleep(Duration::from_millis(20)).await;
        match &self.pod_failure {
            Some(reason) => Err(ClientError::PodFailed {
                name: name.to_string(),
                reason: reason.clone(),
            }
            .into()),
            None => Ok(()),
        }
    }
}
