//! Date and time tagger

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use std::path::Path;

use super::Tagger;

/// Default tag format, e.g. `2024-03-01_12-30-45.123_UTC`
pub const DEFAULT_FORMAT: &str = "%Y-%m-%d_%H-%M-%S%.3f_%Z";

/// Tags images with the build time
#[derive(Debug, Clone)]
pub struct DateTimeTagger {
    /// `chrono` strftime format
    format: String,

    /// Render in UTC instead of the local timezone
    utc: bool,
}

impl DateTimeTagger {
    pub fn new(format: Option<String>, utc: bool) -> Self {
        Self {
            format: format.unwrap_or_else(|| DEFAULT_FORMAT.to_string()),
            utc,
        }
    }

    /// Tag for a given instant
    pub fn tag_at(&self, image_name: &str, now: DateTime<Utc>) -> String {
        let formatted = if self.utc {
            now.format(&self.format).to_string()
        } else {
            now.with_timezone(&Local).format(&self.format).to_string()
        };

        // Offsets like `+02:00` are not valid in tags
        format!("{}:{}", image_name, formatted.replace([':', '+', ' '], "-"))
    }
}

impl Default for DateTimeTagger {
    fn default() -> Self {
        Self::new(None, false)
    }
}

impl Tagger for DateTimeTagger {
    fn label(&self) -> &'static str {
        "dateTime"
    }

    fn generate_fully_qualified_image_name(
        &self,
        _workspace: &Path,
        image_name: &str,
    ) -> Result<String> {
        Ok(self.tag_at(image_name, Utc::now()))
    }
}
