//! Pod endpoints

use crate::ClusterClient;
use crate::error::{ClientError, Result};
use crate::types::{Pod, PodPhase};
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::Method;
use std::future::Future;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How often a pod's phase is polled while waiting for completion
pub const POD_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Lines of a followed container log
pub type LogStream = BoxStream<'static, Result<String>>;

impl ClusterClient {
    // =============================================================================
    // Pod Lifecycle
    // =============================================================================

    /// Create a pod in a namespace
    ///
    /// # Returns
    /// The created pod, carrying the server-generated name
    pub async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod> {
        let url = self.collection_url(namespace, "pods");
        let response = self.request(Method::POST, &url).json(pod).send().await?;

        self.handle_response(response).await
    }

    /// Get a pod by name
    pub async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        let url = self.object_url(namespace, "pods", name);
        let response = self.request(Method::GET, &url).send().await?;

        self.handle_response(response).await
    }

    /// Delete a pod
    ///
    /// # Arguments
    /// * `grace_period_seconds` - 0 deletes immediately
    pub async fn delete_pod(
        &self,
        namespace: &str,
        name: &str,
        grace_period_seconds: i64,
    ) -> Result<()> {
        let url = self.object_url(namespace, "pods", name);
        let response = self
            .request(Method::DELETE, &url)
            .query(&[("gracePeriodSeconds", grace_period_seconds.to_string())])
            .send()
            .await?;

        self.handle_empty_response(response).await
    }

    /// Block until a pod reaches `Succeeded` or `Failed`
    ///
    /// Polls the pod every [`POD_POLL_INTERVAL`]. A `Failed` pod is reported
    /// as [`ClientError::PodFailed`] with the container's termination message.
    ///
    /// # Errors
    /// [`ClientError::Timeout`] when `timeout` elapses first,
    /// [`ClientError::Cancelled`] when `cancel` fires first.
    pub async fn wait_for_pod_complete(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        wait_until_complete(name, timeout, cancel, || self.get_pod(namespace, name)).await
    }

    // =============================================================================
    // Logs
    // =============================================================================

    /// Follow the log of one container of a pod
    ///
    /// The stream ends when the container exits. Opening the stream fails
    /// with an API error while the container is still being created, so
    /// callers retry until it opens.
    pub async fn stream_logs(
        &self,
        namespace: &str,
        name: &str,
        container: &str,
    ) -> Result<LogStream> {
        let url = format!("{}/log", self.object_url(namespace, "pods", name));
        let response = self
            .request(Method::GET, &url)
            .query(&[("follow", "true"), ("container", container)])
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other));
        let lines = StreamReader::new(Box::pin(bytes)).lines();

        let stream = futures::stream::unfold(Some(lines), |state| async move {
            let mut lines = state?;
            match lines.next_line().await {
                Ok(Some(line)) => Some((Ok(line), Some(lines))),
                Ok(None) => None,
                Err(e) => Some((
                    Err(ClientError::ParseError(format!("Failed to read log stream: {}", e))),
                    None,
                )),
            }
        });

        Ok(stream.boxed())
    }
}

/// Polls `fetch` until the pod is terminal, `timeout` elapses or `cancel` fires
async fn wait_until_complete<F, Fut>(
    name: &str,
    timeout: Duration,
    cancel: &CancellationToken,
    mut fetch: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Pod>>,
{
    let wait = async {
        let mut ticker = tokio::time::interval(POD_POLL_INTERVAL);

        loop {
            ticker.tick().await;

            let pod = fetch().await?;
            match pod.phase() {
                PodPhase::Succeeded => return Ok(()),
                PodPhase::Failed => {
                    return Err(ClientError::PodFailed {
                        name: name.to_string(),
                        reason: pod
                            .termination_message()
                            .unwrap_or_else(|| "unknown reason".to_string()),
                    });
                }
                phase => debug!("Pod {} is {:?}", name, phase),
            }
        }
    };

    tokio::select! {
        _ = cancel.cancelled() => Err(ClientError::Cancelled),
        result = tokio::time::timeout(timeout, wait) => result.unwrap_or_else(|_| {
            Err(ClientError::Timeout {
                name: name.to_string(),
                timeout,
            })
        }),
    }
}
