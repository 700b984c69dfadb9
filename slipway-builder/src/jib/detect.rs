//! Jib configuration detection
//!
//! A build file is probed only when it names the Jib plugin. The build tool
//! is then asked to describe its Jib modules through a private task that
//! prints one `BEGIN JIB JSON` block per module.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use slipway_core::{JibPlugin, JibProbeResult};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

use crate::process::{ProcessRunner, ToolCommand, ToolRunner, find_command};

static JIB_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"BEGIN JIB JSON\r?\n(\{.*\})").expect("valid jib json pattern")
});

/// Finds builder configurations in a file
#[async_trait]
pub trait ConfigDetector: Send + Sync {
    /// Probes one file; detection problems yield no results, never an error
    async fn detect(&self, path: &Path) -> Vec<JibProbeResult>;
}

/// How one build tool family is probed
struct PluginSpec {
    plugin: JibPlugin,
    executable: &'static str,
    wrapper: &'static str,
    marker: &'static str,
    task: &'static str,
}

const MAVEN: PluginSpec = PluginSpec {
    plugin: JibPlugin::Maven,
    executable: "mvn",
    wrapper: "mvnw",
    marker: "<artifactId>jib-maven-plugin</artifactId>",
    task: "jib:_skaffold-init",
};

const GRADLE: PluginSpec = PluginSpec {
    plugin: JibPlugin::Gradle,
    executable: "gradle",
    wrapper: "gradlew",
    marker: "com.google.cloud.tools.jib",
    task: "_jibSkaffoldInit",
};

fn classify(path: &Path) -> Option<&'static PluginSpec> {
    let name = path.file_name()?.to_str()?;
    if name.ends_with("pom.xml") {
        Some(&MAVEN)
    } else if name.ends_with("build.gradle") || name.ends_with("build.gradle.kts") {
        Some(&GRADLE)
    } else {
        None
    }
}

/// Detects Jib modules of Maven and Gradle builds
pub struct JibDetector {
    runner: Arc<dyn ToolRunner>,
}

impl JibDetector {
    /// Creates a detector running build tools through `runner`
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self { runner }
    }
}

impl Default for JibDetector {
    fn default() -> Self {
        Self::new(Arc::new(ProcessRunner::default()))
    }
}

#[async_trait]
impl ConfigDetector for JibDetector {
    async fn detect(&self, path: &Path) -> Vec<JibProbeResult> {
        let Some(spec) = classify(path) else {
            return Vec::new();
        };

        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                debug!("Unable to read {}: {}", path.display(), e);
                return Vec::new();
            }
        };

        if !content.contains(spec.marker) {
            return Vec::new();
        }

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let command = ToolCommand::new(find_command(&dir, spec.executable, spec.wrapper), &dir)
            .args([spec.task, "-q"]);

        let output = match self.runner.run(command).await {
            Ok(output) => output,
            Err(e) => {
                debug!("Jib detection failed for {}: {:#}", path.display(), e);
                return Vec::new();
            }
        };

        parse_jib_output(&output, spec.plugin, path).unwrap_or_default()
    }
}

#[derive(Deserialize)]
struct JibJson {
    #[serde(default)]
    image: String,
    #[serde(default)]
    project: String,
}

/// Reads every `BEGIN JIB JSON` block of a detection run
///
/// # Returns
/// `None` when any block fails to parse
pub fn parse_jib_output(output: &[u8], plugin: JibPlugin, path: &Path) -> Option<Vec<JibProbeResult>> {
    let output = String::from_utf8_lossy(output);
    let mut results = Vec::new();

    for captures in JIB_JSON.captures_iter(&output) {
        // The tool prints platform paths without escaping separators
        let json = captures[1].replace('\\', "\\\\");

        let parsed: JibJson = match serde_json::from_str(&json) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Failed to parse Jib output of {}: {}", path.display(), e);
                return None;
            }
        };

        results.push(JibProbeResult {
            builder: plugin,
            image: Some(parsed.image).filter(|s| !s.is_empty()),
            project: Some(parsed.project).filter(|s| !s.is_empty()),
            file_path: path.to_path_buf(),
        });
    }

    Some(results)
}
