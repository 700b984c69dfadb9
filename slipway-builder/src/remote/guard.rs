//! Scoped cluster resources
//!
//! Every resource a remote build creates is held by a [`ResourceGuard`]
//! whose cleanup runs exactly once: through [`ResourceGuard::release`] on
//! the normal path, or spawned from `Drop` when the guard is abandoned.

use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use tracing::{debug, error, warn};

use crate::output::BuildLog;

/// Kind of resource a guard holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Secret,
    BuildContext,
    Pod,
}

impl ResourceKind {
    /// Pods keep consuming cluster capacity when leaked
    pub fn is_workload(&self) -> bool {
        matches!(self, ResourceKind::Pod)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Secret => write!(f, "secret"),
            ResourceKind::BuildContext => write!(f, "build context"),
            ResourceKind::Pod => write!(f, "pod"),
        }
    }
}

/// A resource that could not be deleted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownFailure {
    pub kind: ResourceKind,
    pub name: String,
    pub error: String,
}

impl fmt::Display for TeardownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deleting {} {}: {}", self.kind, self.name, self.error)
    }
}

type Cleanup = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Owns the cleanup of one cluster resource
pub struct ResourceGuard {
    kind: ResourceKind,
    name: String,
    cleanup: Option<Cleanup>,
}

impl ResourceGuard {
    /// Registers the cleanup of a created resource
    ///
    /// # Arguments
    /// * `kind` - What was created
    /// * `name` - Its name, for reporting
    /// * `cleanup` - Deletes it; called at most once
    pub fn new<F, Fut>(kind: ResourceKind, name: impl Into<String>, cleanup: F) -> Self
    where
        F: FnOnce() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            kind,
            name: name.into(),
            cleanup: Some(Box::new(move || Box::pin(cleanup()))),
        }
    }

    /// Runs the cleanup now
    pub async fn release(mut self) -> Result<(), TeardownFailure> {
        let Some(cleanup) = self.cleanup.take() else {
            return Ok(());
        };

        debug!("Deleting {} {}", self.kind, self.name);
        cleanup().await.map_err(|e| TeardownFailure {
            kind: self.kind,
            name: self.name.clone(),
            error: format!("{:#}", e),
        })
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        let Some(cleanup) = self.cleanup.take() else {
            return;
        };

        let kind = self.kind;
        let name = std::mem::take(&mut self.name);
        warn!("{} {} dropped before teardown, deleting in background", kind, name);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = cleanup().await {
                        error!(
                            "Failed to delete {} {}: {:#}. The resource is orphaned and must be removed manually",
                            kind, name, e
                        );
                    }
                });
            }
            Err(_) => error!(
                "No runtime to delete {} {}. The resource is orphaned and must be removed manually",
                kind, name
            ),
        }
    }
}

/// Guards of one session, released in reverse creation order
#[derive(Default)]
pub struct TeardownStack {
    guards: Vec<ResourceGuard>,
}

impl TeardownStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, guard: ResourceGuard) {
        self.guards.push(guard);
    }

    /// Releases every guard, newest first, continuing past failures
    ///
    /// Failures are logged; pod failures as orphaned resources.
    pub async fn release_all(&mut self, log: &BuildLog) -> Vec<TeardownFailure> {
        let mut failures = Vec::new();

        while let Some(guard) = self.guards.pop() {
            if let Err(failure) = guard.release().await {
                if failure.kind.is_workload() {
                    error!(
                        "Failed to delete pod {}: {}. The pod is orphaned and must be removed manually",
                        failure.name, failure.error
                    );
                    log.error(format!(
                        "pod {} is orphaned, delete it manually: {}",
                        failure.name, failure.error
                    ));
                } else {
                    error!("{}", failure);
                    log.error(failure.to_string());
                }
                failures.push(failure);
            }
        }

        failures
    }
}
