//! Cluster repository
//!
//! Handles the cluster objects a remote build creates: credential secrets,
//! context config maps and build pods.

use anyhow::{Context, Result};
use async_trait::async_trait;
use slipway_client::{ClusterClient, ConfigMap, LogStream, Pod, Secret};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Repository trait for cluster operations
#[async_trait]
pub trait ClusterRepository: Send + Sync {
    /// Creates a secret
    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<()>;

    /// Checks whether a secret exists
    async fn secret_exists(&self, namespace: &str, name: &str) -> Result<bool>;

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()>;

    async fn create_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<()>;

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<()>;

    /// Creates a pod
    ///
    /// # Returns
    /// The name the server gave the pod
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<String>;

    /// Deletes a pod immediately (grace period zero)
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()>;

    /// Follows the log of a pod's container
    async fn stream_logs(&self, namespace: &str, name: &str, container: &str)
    -> Result<LogStream>;

    /// Blocks until the pod succeeded; failure, timeout and cancellation are errors
    async fn wait_for_pod_complete(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// HTTP implementation of ClusterRepository
pub struct HttpClusterRepository {
    client: ClusterClient,
}

impl HttpClusterRepository {
    /// Creates a new HTTP cluster repository
    ///
    /// # Arguments
    /// * `client` - Client for the cluster API server
    pub fn new(client: ClusterClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterRepository for HttpClusterRepository {
    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<()> {
        self.client
            .create_secret(namespace, secret)
            .await
            .context("Failed to create secret")?;
        Ok(())
    }

    async fn secret_exists(&self, namespace: &str, name: &str) -> Result<bool> {
        match self.client.get_secret(namespace, name).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e).context("Failed to get secret"),
        }
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()> {
        deleted(self.client.delete_secret(namespace, name).await, "secret", name)
    }

    async fn create_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<()> {
        self.client
            .create_config_map(namespace, config_map)
            .await
            .context("Failed to create config map")?;
        Ok(())
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<()> {
        deleted(self.client.delete_config_map(namespace, name).await, "config map", name)
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<String> {
        let created = self
            .client
            .create_pod(namespace, pod)
            .await
            .context("Failed to create pod")?;

        created
            .name()
            .map(str::to_string)
            .context("Created pod has no name")
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        deleted(self.client.delete_pod(namespace, name, 0).await, "pod", name)
    }

    async fn stream_logs(
        &self,
        namespace: &str,
        name: &str,
        container: &str,
    ) -> Result<LogStream> {
        self.client
            .stream_logs(namespace, name, container)
            .await
            .context("Failed to open log stream")
    }

    async fn wait_for_pod_complete(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        Ok(self
            .client
            .wait_for_pod_complete(namespace, name, timeout, cancel)
            .await?)
    }
}

/// Treats an object that is already gone as deleted
fn deleted(result: slipway_client::Result<()>, kind: &str, name: &str) -> Result<()> {
    match result {
        Err(e) if e.is_not_found() => {
            debug!("{} {} was already deleted", kind, name);
            Ok(())
        }
        other => other.with_context(|| format!("Failed to delete {} {}", kind, name)),
    }
}
