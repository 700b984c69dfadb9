//! Build coordinator
//!
//! Tags every artifact, then builds them in parallel or in sequence. Each
//! artifact writes its output under its own image name.
//!
//! Parallel runs are best-effort: every artifact is started and awaited,
//! and the first failure in input order is returned once all finished.
//! Sequential runs stop at the first failure.

use anyhow::{Context, Result};
use slipway_core::{Artifact, BuildResult};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::ArtifactBuilder;
use crate::config::Strategy;
use crate::output::{BuildLog, OutputSink};
use crate::tag::Tagger;

/// Builds the artifacts of one run
pub struct BuildCoordinator {
    builder: Arc<dyn ArtifactBuilder>,
    sink: Arc<dyn OutputSink>,
    cancel: CancellationToken,
}

impl BuildCoordinator {
    /// Creates a coordinator
    ///
    /// # Arguments
    /// * `builder` - Backend every artifact is handed to
    /// * `sink` - Shared output of all artifacts
    /// * `cancel` - Cancels the whole run
    pub fn new(
        builder: Arc<dyn ArtifactBuilder>,
        sink: Arc<dyn OutputSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            builder,
            sink,
            cancel,
        }
    }

    /// Builds `artifacts`
    ///
    /// # Returns
    /// One result per artifact, in input order. A failure is wrapped as
    /// `building [<image>]`.
    pub async fn build_all(
        &self,
        artifacts: &[Artifact],
        tagger: &dyn Tagger,
        strategy: &Strategy,
    ) -> Result<Vec<BuildResult>> {
        let tags = artifacts
            .iter()
            .map(|artifact| {
                tagger
                    .generate_fully_qualified_image_name(&artifact.workspace, &artifact.image_name)
                    .with_context(|| format!("generating tag for [{}]", artifact.image_name))
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Building {} artifact(s) with the {} tagger",
            artifacts.len(),
            tagger.label()
        );

        match strategy {
            Strategy::Sequential => self.in_sequence(artifacts, tags).await,
            Strategy::Parallel { max_concurrency } => {
                self.in_parallel(artifacts, tags, *max_concurrency).await
            }
        }
    }

    async fn in_sequence(
        &self,
        artifacts: &[Artifact],
        tags: Vec<String>,
    ) -> Result<Vec<BuildResult>> {
        let mut results = Vec::with_capacity(artifacts.len());

        for (artifact, tag) in artifacts.iter().zip(tags) {
            let log = BuildLog::new(self.sink.clone(), &artifact.image_name);
            let built = build_one(self.builder.as_ref(), &self.cancel, &log, artifact, &tag)
                .await
                .with_context(|| format!("building [{}]", artifact.image_name))?;

            results.push(BuildResult::new(&artifact.image_name, built));
        }

        Ok(results)
    }

    async fn in_parallel(
        &self,
        artifacts: &[Artifact],
        tags: Vec<String>,
        max_concurrency: Option<usize>,
    ) -> Result<Vec<BuildResult>> {
        // A bound of zero would never admit a task; treat it as unbounded
        let semaphore = max_concurrency
            .filter(|n| *n > 0)
            .map(|n| Arc::new(Semaphore::new(n)));

        let mut handles = Vec::with_capacity(artifacts.len());
        for (artifact, tag) in artifacts.iter().zip(tags) {
            let builder = Arc::clone(&self.builder);
            let cancel = self.cancel.clone();
            let log = BuildLog::new(self.sink.clone(), &artifact.image_name);
            let artifact = artifact.clone();
            let semaphore = semaphore.clone();

            handles.push(tokio::spawn(async move {
                let _permit = match semaphore {
                    Some(semaphore) => Some(
                        semaphore
                            .acquire_owned()
                            .await
                            .context("Build semaphore closed")?,
                    ),
                    None => None,
                };

                build_one(builder.as_ref(), &cancel, &log, &artifact, &tag).await
            }));
        }

        let mut results = Vec::with_capacity(artifacts.len());
        let mut first_error = None;

        for (artifact, handle) in artifacts.iter().zip(handles) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(anyhow::anyhow!("build task failed: {}", e)),
            };

            match outcome.with_context(|| format!("building [{}]", artifact.image_name)) {
                Ok(built) => results.push(BuildResult::new(&artifact.image_name, built)),
                Err(e) if first_error.is_none() => first_error = Some(e),
                Err(e) => warn!("{:#}", e),
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }
}

async fn build_one(
    builder: &dyn ArtifactBuilder,
    cancel: &CancellationToken,
    log: &BuildLog,
    artifact: &Artifact,
    tag: &str,
) -> Result<String> {
    log.info(format!("Building [{}]...", artifact.image_name));
    debug!("Building {} ({}) as {}", artifact.image_name, artifact.artifact_type, tag);

    match builder.build(cancel, log, artifact, tag).await {
        Ok(built) => {
            log.info(format!("Built [{}]: {}", artifact.image_name, built));
            Ok(built)
        }
        Err(e) => {
            log.error(format!("Failed [{}]: {:#}", artifact.image_name, e));
            Err(e)
        }
    }
}
