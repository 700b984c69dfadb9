//! Slipway Core
//!
//! Core types shared by the Slipway image build system.
//!
//! This crate contains only domain types:
//! - Artifacts and their declared build types
//! - Build results handed back to the pipeline
//! - Jib project probe results
//! - Log entries written to build output sinks

pub mod domain;

pub use domain::artifact::{
    Artifact, ArtifactType, BazelArtifact, DockerArtifact, JibGradleArtifact, JibMavenArtifact,
};
pub use domain::build::BuildResult;
pub use domain::log::{LogEntry, LogLevel};
pub use domain::probe::{JibPlugin, JibProbeResult};
