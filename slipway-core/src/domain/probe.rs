//! Jib project probe types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Build tool family hosting the Jib plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JibPlugin {
    Maven,
    Gradle,
}

impl JibPlugin {
    /// Builder name shown to users
    pub fn name(&self) -> &'static str {
        match self {
            JibPlugin::Maven => "Jib Maven Plugin",
            JibPlugin::Gradle => "Jib Gradle Plugin",
        }
    }
}

impl std::fmt::Display for JibPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One Jib-enabled module found in a build file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JibProbeResult {
    pub builder: JibPlugin,
    /// Target image configured in the plugin, if any
    pub image: Option<String>,
    /// Module/project coordinate, if the build has several
    pub project: Option<String>,
    /// Build file the result was read from
    pub file_path: PathBuf,
}

impl JibProbeResult {
    /// Human-readable summary used when offering builders to a user
    pub fn describe(&self) -> String {
        match &self.project {
            Some(project) => format!(
                "{} ({}, {})",
                self.builder,
                project,
                self.file_path.display()
            ),
            None => format!("{} ({})", self.builder, self.file_path.display()),
        }
    }
}
