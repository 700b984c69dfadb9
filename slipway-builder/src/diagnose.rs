//! Build context diagnostics
//!
//! Reports how expensive each Dockerfile artifact's context is to resolve
//! and how large it is before compression.

use anyhow::{Context, Result};
use serde::Serialize;
use slipway_core::{Artifact, DockerArtifact};
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::docker::{DependencyResolver, create_tar};
use crate::output::BuildLog;

/// Context figures of one artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactDiagnosis {
    pub image_name: String,
    pub dependency_count: usize,
    pub resolve_time: Duration,
    /// Uncompressed tar size in bytes
    pub context_size: u64,
}

/// Diagnoses every Dockerfile artifact; others are reported as skipped
pub fn check_artifacts(
    artifacts: &[Artifact],
    resolver: &dyn DependencyResolver,
    log: &BuildLog,
) -> Result<Vec<ArtifactDiagnosis>> {
    let mut diagnoses = Vec::new();

    for artifact in artifacts {
        let Some(docker) = artifact.dockerfile() else {
            log.info(format!(
                "Skipping [{}]: {} artifacts have no build context",
                artifact.image_name, artifact.artifact_type
            ));
            continue;
        };

        let start = Instant::now();
        let dependencies = resolver
            .dependencies(&artifact.workspace, &docker.dockerfile_path, &docker.build_args)
            .with_context(|| format!("resolving dependencies of [{}]", artifact.image_name))?;
        let resolve_time = start.elapsed();

        let context_size = size_of_docker_context(&artifact.workspace, docker, resolver)
            .with_context(|| format!("measuring context of [{}]", artifact.image_name))?;

        log.info(format!(
            "[{}] {} dependencies resolved in {:?}, context is {} bytes",
            artifact.image_name,
            dependencies.len(),
            resolve_time,
            context_size
        ));

        diagnoses.push(ArtifactDiagnosis {
            image_name: artifact.image_name.clone(),
            dependency_count: dependencies.len(),
            resolve_time,
            context_size,
        });
    }

    Ok(diagnoses)
}

/// Uncompressed size of the minimal build context
pub fn size_of_docker_context(
    workspace: &Path,
    docker: &DockerArtifact,
    resolver: &dyn DependencyResolver,
) -> Result<u64> {
    let paths = resolver.dependencies(workspace, &docker.dockerfile_path, &docker.build_args)?;
    let counter = create_tar(CountingWriter::default(), workspace, &paths)?;
    debug!("{} files, {} bytes", paths.len(), counter.count);
    Ok(counter.count)
}

#[derive(Default)]
struct CountingWriter {
    count: u64,
}

impl Write for CountingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.count += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::DockerfileDependencies;
    use crate::output::InMemorySink;
    use slipway_core::{ArtifactType, BazelArtifact};
    use std::sync::Arc;

    #[test]
    fn test_size_of_docker_context() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();

        let size =
            size_of_docker_context(dir.path(), &DockerArtifact::default(), &DockerfileDependencies)
                .unwrap();
        // one header and one data block, then two end blocks
        assert_eq!(size, 2048);

        std::fs::write(dir.path().join("Dockerfile"), "FROM scratch\nCOPY app.txt /\n").unwrap();
        std::fs::write(dir.path().join("app.txt"), "hello").unwrap();
        std::fs::write(dir.path().join("unused.txt"), "ignored").unwrap();

        let size =
            size_of_docker_context(dir.path(), &DockerArtifact::default(), &DockerfileDependencies)
                .unwrap();
        assert_eq!(size, 3072);
    }

    #[test]
    fn test_check_artifacts_skips_other_types() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();

        let artifacts = vec![
            Artifact::docker("app", dir.path()),
            Artifact {
                image_name: "bzl".to_string(),
                workspace: dir.path().to_path_buf(),
                artifact_type: ArtifactType::Bazel(BazelArtifact {
                    target: "//:app.tar".to_string(),
                    build_args: vec![],
                }),
            },
        ];

        let sink = InMemorySink::new();
        let log = BuildLog::new(Arc::new(sink.clone()), "slipway");
        let diagnoses = check_artifacts(&artifacts, &DockerfileDependencies, &log).unwrap();

        assert_eq!(diagnoses.len(), 1);
        assert_eq!(diagnoses[0].image_name, "app");
        assert_eq!(diagnoses[0].dependency_count, 1);
        assert_eq!(diagnoses[0].context_size, 2048);
        assert!(sink.messages()[1].starts_with("Skipping [bzl]"));
    }
}
