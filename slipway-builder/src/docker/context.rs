//! Build context packaging
//!
//! Serializes exactly the files a Dockerfile build depends on into a tar
//! archive, with paths relative to the workspace root.

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use slipway_core::DockerArtifact;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::dependencies::DependencyResolver;

/// A packaged build context, held while it is delivered
#[derive(Debug, Clone)]
pub struct BuildContextArchive {
    /// Gzipped tar bytes
    bytes: Vec<u8>,
}

impl BuildContextArchive {
    /// Packages the dependencies of a Dockerfile build
    ///
    /// # Arguments
    /// * `workspace` - Build context root
    /// * `artifact` - Dockerfile path and build args
    /// * `resolver` - Computes the minimal file set
    pub fn package(
        workspace: &Path,
        artifact: &DockerArtifact,
        resolver: &dyn DependencyResolver,
    ) -> Result<Self> {
        let paths = resolver
            .dependencies(workspace, &artifact.dockerfile_path, &artifact.build_args)
            .context("getting relative tar paths")?;

        let bytes = create_tar_gz(Vec::new(), workspace, &paths).context("creating tar gz")?;

        Ok(Self { bytes })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Compressed size in bytes
    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }
}

/// Writes the gzipped build context of a Dockerfile artifact to `writer`
///
/// # Returns
/// The writer, after the archive is finished
pub fn create_docker_tar_context<W: Write>(
    writer: W,
    workspace: &Path,
    artifact: &DockerArtifact,
    resolver: &dyn DependencyResolver,
) -> Result<W> {
    let paths = resolver
        .dependencies(workspace, &artifact.dockerfile_path, &artifact.build_args)
        .context("getting relative tar paths")?;

    create_tar_gz(writer, workspace, &paths).context("creating tar gz")
}

/// Writes workspace-relative `paths` as a gzipped tar
pub fn create_tar_gz<W: Write>(writer: W, workspace: &Path, paths: &[PathBuf]) -> Result<W> {
    let encoder = GzEncoder::new(writer, Compression::default());
    let encoder = create_tar(encoder, workspace, paths)?;
    Ok(encoder.finish()?)
}

/// Writes workspace-relative `paths` as an uncompressed tar
pub fn create_tar<W: Write>(writer: W, workspace: &Path, paths: &[PathBuf]) -> Result<W> {
    let mut archive = tar::Builder::new(writer);
    archive.mode(tar::HeaderMode::Deterministic);

    for relative in paths {
        let full = workspace.join(relative);
        archive
            .append_path_with_name(&full, relative)
            .with_context(|| format!("Failed to add {} to archive", full.display()))?;
    }

    Ok(archive.into_inner()?)
}
