//! Image taggers
//!
//! A tagger computes the fully-qualified reference an artifact is built as,
//! before its backend runs.

mod date_time;
mod env_template;

pub use date_time::DateTimeTagger;
pub use env_template::EnvTemplateTagger;

use anyhow::Result;
use std::path::Path;

/// Computes the target reference of an artifact
pub trait Tagger: Send + Sync {
    /// Short name used in logs
    fn label(&self) -> &'static str;

    /// Returns the reference `image_name` is built as
    ///
    /// # Arguments
    /// * `workspace` - The artifact's workspace directory
    /// * `image_name` - The artifact's logical image name
    fn generate_fully_qualified_image_name(&self, workspace: &Path, image_name: &str)
    -> Result<String>;
}

/// Tags every image `latest`
#[derive(Debug, Clone, Default)]
pub struct ShaTagger;

impl Tagger for ShaTagger {
    fn label(&self) -> &'static str {
        "sha"
    }

    fn generate_fully_qualified_image_name(
        &self,
        _workspace: &Path,
        image_name: &str,
    ) -> Result<String> {
        Ok(format!("{}:latest", image_name))
    }
}
