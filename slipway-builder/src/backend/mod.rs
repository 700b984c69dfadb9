//! Build backends
//!
//! Every artifact type is built by one backend. The [`Dispatcher`] picks it
//! from the artifact's declared type.

mod bazel;
mod dispatch;
mod jib;
mod local;

pub use bazel::BazelBuilder;
pub use dispatch::Dispatcher;
pub use jib::JibBuilder;
pub use local::LocalBuilder;

use anyhow::Result;
use async_trait::async_trait;
use slipway_core::Artifact;
use tokio_util::sync::CancellationToken;

use crate::output::BuildLog;

/// Builds one artifact as a given reference
#[async_trait]
pub trait ArtifactBuilder: Send + Sync {
    /// Builds `artifact` as `fqn`
    ///
    /// # Arguments
    /// * `cancel` - Cancels the build; external work is stopped and cleaned up
    /// * `log` - Output of the build
    /// * `artifact` - What to build
    /// * `fqn` - Reference computed by the tagger
    ///
    /// # Returns
    /// The built reference, `fqn@digest` when the image was pushed
    async fn build(
        &self,
        cancel: &CancellationToken,
        log: &BuildLog,
        artifact: &Artifact,
        fqn: &str,
    ) -> Result<String>;
}
