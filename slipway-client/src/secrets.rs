//! Secret endpoints

use crate::ClusterClient;
use crate::error::Result;
use crate::types::Secret;
use reqwest::Method;

impl ClusterClient {
    /// Create a secret in a namespace
    ///
    /// # Returns
    /// The secret as stored by the API server
    pub async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret> {
        let url = self.collection_url(namespace, "secrets");
        let response = self.request(Method::POST, &url).json(secret).send().await?;

        self.handle_response(response).await
    }

    /// Get a secret by name
    pub async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret> {
        let url = self.object_url(namespace, "secrets", name);
        let response = self.request(Method::GET, &url).send().await?;

        self.handle_response(response).await
    }

    /// Delete a secret by name
    pub async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()> {
        let url = self.object_url(namespace, "secrets", name);
        let response = self.request(Method::DELETE, &url).send().await?;

        self.handle_empty_response(response).await
    }
}
