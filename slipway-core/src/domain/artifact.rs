//! Artifact domain types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One buildable unit of a pipeline
///
/// Identity is the image name. The artifact is owned by the pipeline
/// configuration and stays immutable for a whole build run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Logical image name (e.g. `gcr.io/project/app`)
    #[serde(rename = "image")]
    pub image_name: String,

    /// Directory the build runs from
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,

    /// Which backend builds this artifact
    #[serde(flatten)]
    pub artifact_type: ArtifactType,
}

fn default_workspace() -> PathBuf {
    PathBuf::from(".")
}

impl Artifact {
    /// Creates a Dockerfile artifact with the default Dockerfile path
    pub fn docker(image_name: impl Into<String>, workspace: impl Into<PathBuf>) -> Self {
        Self {
            image_name: image_name.into(),
            workspace: workspace.into(),
            artifact_type: ArtifactType::Docker(DockerArtifact::default()),
        }
    }

    /// Returns the Dockerfile description for variants that build from one
    pub fn dockerfile(&self) -> Option<&DockerArtifact> {
        match &self.artifact_type {
            ArtifactType::Docker(docker) | ArtifactType::RemotePod(docker) => Some(docker),
            _ => None,
        }
    }
}

/// Declared build type of an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ArtifactType {
    /// Dockerfile build on the local host (daemon API or CLI)
    Docker(DockerArtifact),

    /// `bazel build` of a container image target
    Bazel(BazelArtifact),

    /// Jib through Maven
    JibMaven(JibMavenArtifact),

    /// Jib through Gradle
    JibGradle(JibGradleArtifact),

    /// Dockerfile build executed by an ephemeral pod inside the cluster
    RemotePod(DockerArtifact),
}

impl ArtifactType {
    /// Short name of the variant, used in logs
    pub fn name(&self) -> &'static str {
        match self {
            ArtifactType::Docker(_) => "docker",
            ArtifactType::Bazel(_) => "bazel",
            ArtifactType::JibMaven(_) => "jib-maven",
            ArtifactType::JibGradle(_) => "jib-gradle",
            ArtifactType::RemotePod(_) => "remote-pod",
        }
    }
}

impl std::fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Dockerfile build description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerArtifact {
    /// Dockerfile path, relative to the workspace
    #[serde(default = "default_dockerfile")]
    pub dockerfile_path: String,

    /// Build arguments. A `None` value forwards the variable from the
    /// builder's environment (`--build-arg NAME`).
    #[serde(default)]
    pub build_args: BTreeMap<String, Option<String>>,
}

fn default_dockerfile() -> String {
    "Dockerfile".to_string()
}

impl Default for DockerArtifact {
    fn default() -> Self {
        Self {
            dockerfile_path: default_dockerfile(),
            build_args: BTreeMap::new(),
        }
    }
}

/// Bazel image target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BazelArtifact {
    /// Target producing an image tarball, e.g. `//:app.tar`
    pub target: String,

    #[serde(default)]
    pub build_args: Vec<String>,
}

/// Jib Maven build description
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JibMavenArtifact {
    /// Maven module to build in a multi-module project
    #[serde(default)]
    pub module: Option<String>,

    /// Maven profile to activate
    #[serde(default)]
    pub profile: Option<String>,
}

/// Jib Gradle build description
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JibGradleArtifact {
    /// Gradle project to build in a multi-project build
    #[serde(default)]
    pub project: Option<String>,
}
