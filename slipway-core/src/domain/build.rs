//! Build result types

use serde::{Deserialize, Serialize};

/// A built artifact
///
/// Pairs the artifact's image name with the reference the backend resolved,
/// either `name:tag` or `name:tag@sha256:...` when the image was pushed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    pub image_name: String,
    pub tag: String,
}

impl BuildResult {
    pub fn new(image_name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            image_name: image_name.into(),
            tag: tag.into(),
        }
    }

    /// Returns the content digest part of the reference, if any
    pub fn digest(&self) -> Option<&str> {
        self.tag.split_once('@').map(|(_, digest)| digest)
    }
}
