//! Slipway cluster client
//!
//! A small, typed HTTP client for the parts of the cluster API the remote
//! build backend needs: credential secrets, config maps, pods, pod logs and
//! pod phase polling. It also carries the staging client used to upload
//! build contexts to an HTTP object store.
//!
//! # Example
//!
//! ```no_run
//! use slipway_client::ClusterClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), slipway_client::ClientError> {
//!     let client = ClusterClient::new("https://127.0.0.1:6443").with_token("secret-token");
//!
//!     let pod = client.get_pod("default", "kaniko-abcde").await?;
//!     println!("phase: {:?}", pod.phase());
//!     Ok(())
//! }
//! ```

pub mod error;
mod config_maps;
mod pods;
mod secrets;
mod staging;
pub mod types;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use pods::{LogStream, POD_POLL_INTERVAL};
pub use staging::StagingClient;
pub use types::{
    ConfigMap, ConfigMapVolumeSource, Container, EnvVar, ObjectMeta, Pod, PodPhase, PodSpec,
    PodStatus, Secret, SecretVolumeSource, Volume, VolumeMount,
};

use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;

/// HTTP client for the cluster API server
///
/// Methods are grouped by resource:
/// - Secrets (create, get, delete)
/// - Config maps (create, delete)
/// - Pods (create, get, delete, wait for completion, follow logs)
#[derive(Debug, Clone)]
pub struct ClusterClient {
    /// Base URL of the API server (e.g., "https://127.0.0.1:6443")
    base_url: String,
    /// Bearer token sent with every request
    token: Option<String>,
    /// HTTP client instance
    client: Client,
}

impl ClusterClient {
    /// Create a new cluster client
    ///
    /// # Example
    /// ```
    /// use slipway_client::ClusterClient;
    ///
    /// let client = ClusterClient::new("https://127.0.0.1:6443/");
    /// assert_eq!(client.base_url(), "https://127.0.0.1:6443");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new cluster client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS roots, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            client,
        }
    }

    /// Authenticate every request with a bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Get the base URL of the API server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of a namespaced core/v1 collection, e.g. `.../namespaces/ns/pods`
    fn collection_url(&self, namespace: &str, resource: &str) -> String {
        format!(
            "{}/api/v1/namespaces/{}/{}",
            self.base_url, namespace, resource
        )
    }

    /// URL of a single namespaced core/v1 object
    fn object_url(&self, namespace: &str, resource: &str, name: &str) -> String {
        format!("{}/{}", self.collection_url(namespace, resource), name)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let response = Self::check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response whose body is not needed (e.g., DELETE operations)
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        Self::check_status(response).await.map(|_| ())
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(response)
    }
}
