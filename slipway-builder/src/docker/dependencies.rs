//! Build context dependency resolution
//!
//! Works out which workspace files a Dockerfile build reads:
//! - Sources of `COPY` and `ADD` (stage copies and remote URLs excluded)
//! - `ARG` values, overridden by build args, substituted into sources
//! - Directories expanded recursively, glob sources matched per file
//! - `.dockerignore` exclusions (with `!` re-inclusion)
//! - The Dockerfile itself

use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::args::normalize_dockerfile_path;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Lists the files a Dockerfile build depends on
pub trait DependencyResolver: Send + Sync {
    /// Returns workspace-relative paths, sorted and deduplicated
    ///
    /// # Arguments
    /// * `workspace` - Build context root
    /// * `dockerfile_path` - Dockerfile, relative to the workspace
    /// * `build_args` - Values overriding `ARG` defaults
    fn dependencies(
        &self,
        workspace: &Path,
        dockerfile_path: &str,
        build_args: &BTreeMap<String, Option<String>>,
    ) -> Result<Vec<PathBuf>>;
}

/// Resolves dependencies by reading the Dockerfile
#[derive(Debug, Clone, Default)]
pub struct DockerfileDependencies;

impl DependencyResolver for DockerfileDependencies {
    fn dependencies(
        &self,
        workspace: &Path,
        dockerfile_path: &str,
        build_args: &BTreeMap<String, Option<String>>,
    ) -> Result<Vec<PathBuf>> {
        let dockerfile = normalize_dockerfile_path(workspace, dockerfile_path)?;
        let content = std::fs::read_to_string(&dockerfile)
            .with_context(|| format!("Failed to read {}", dockerfile.display()))?;

        let ignore = DockerIgnore::load(workspace)?;

        let mut deps = BTreeSet::new();
        for source in copied_sources(&content, build_args) {
            deps.extend(expand_source(workspace, &source)?);
        }
        deps.retain(|path| !ignore.is_excluded(path));

        // The Dockerfile is sent even when ignored
        match dockerfile.strip_prefix(workspace) {
            Ok(relative) => {
                deps.insert(relative.to_path_buf());
            }
            Err(_) => warn!(
                "Dockerfile {} is outside of workspace {} and is not part of the build context",
                dockerfile.display(),
                workspace.display()
            ),
        }

        debug!(
            "Resolved {} dependencies for {}",
            deps.len(),
            dockerfile.display()
        );

        Ok(deps.into_iter().collect())
    }
}

/// Sources of every `COPY`/`ADD` reading from the build context
fn copied_sources(content: &str, build_args: &BTreeMap<String, Option<String>>) -> Vec<String> {
    let mut args: HashMap<String, String> = HashMap::new();
    let mut sources = Vec::new();

    for line in preprocess(content) {
        let mut parts = line.splitn(2, char::is_whitespace);
        let instruction = parts.next().unwrap_or("").to_uppercase();
        let rest = parts.next().unwrap_or("").trim();

        match instruction.as_str() {
            "ARG" => {
                for declaration in rest.split_whitespace() {
                    let (name, default) = match declaration.split_once('=') {
                        Some((name, default)) => (name, Some(unquote(default))),
                        None => (declaration, None),
                    };

                    let value = match build_args.get(name) {
                        Some(Some(value)) => Some(value.clone()),
                        Some(None) => std::env::var(name).ok(),
                        None => default.map(|d| substitute(&d, &args)),
                    };

                    if let Some(value) = value {
                        args.insert(name.to_string(), value);
                    }
                }
            }
            "COPY" | "ADD" => {
                let mut tokens = rest.split_whitespace().peekable();
                let mut from_stage = false;
                while let Some(flag) = tokens.peek().filter(|t| t.starts_with("--")) {
                    from_stage |= flag.starts_with("--from=");
                    tokens.next();
                }

                if from_stage {
                    continue;
                }

                let remaining = tokens.collect::<Vec<_>>().join(" ");
                let operands = if remaining.starts_with('[') {
                    serde_json::from_str::<Vec<String>>(&remaining).unwrap_or_default()
                } else {
                    remaining.split_whitespace().map(unquote).collect()
                };

                if operands.len() < 2 {
                    continue;
                }

                for source in &operands[..operands.len() - 1] {
                    let source = substitute(source, &args);
                    if instruction == "ADD" && is_url(&source) {
                        continue;
                    }
                    sources.push(source);
                }
            }
            _ => {}
        }
    }

    sources
}

/// Joins continuation lines and drops comments and blank lines
fn preprocess(content: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();

    for line in content.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with('#') || (trimmed.is_empty() && current.is_empty()) {
            continue;
        }

        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(trimmed.trim_end_matches('\\').trim());

        if !trimmed.ends_with('\\') && !current.is_empty() {
            result.push(std::mem::take(&mut current));
        }
    }

    if !current.is_empty() {
        result.push(current);
    }

    result
}

/// Replaces `$NAME` and `${NAME}`; unknown variables become empty
fn substitute(value: &str, args: &HashMap<String, String>) -> String {
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'$') => {
                result.push('$');
                chars.next();
            }
            '$' => {
                let braced = chars.peek() == Some(&'{');
                if braced {
                    chars.next();
                }

                let mut name = String::new();
                while let Some(&n) = chars.peek() {
                    if n.is_ascii_alphanumeric() || n == '_' {
                        name.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }

                if braced {
                    // Skip modifiers such as `${NAME:-default}` up to the brace
                    for n in chars.by_ref() {
                        if n == '}' {
                            break;
                        }
                    }
                }

                if name.is_empty() && !braced {
                    result.push('$');
                } else if let Some(v) = args.get(&name) {
                    result.push_str(v);
                }
            }
            _ => result.push(c),
        }
    }

    result
}

fn unquote(value: &str) -> String {
    value.trim_matches(|c| c == '"' || c == '\'').to_string()
}

fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://") || source.starts_with("git@")
}

fn is_glob(source: &str) -> bool {
    source.contains(['*', '?', '['])
}

/// Workspace files a single source refers to
fn expand_source(workspace: &Path, source: &str) -> Result<Vec<PathBuf>> {
    let source = source.trim_start_matches("./").trim_start_matches('/');

    if source.is_empty() || source == "." {
        return walk_files(workspace, Path::new(""));
    }

    if is_glob(source) {
        let pattern = Pattern::new(source.trim_end_matches('/'))
            .with_context(|| format!("Invalid source pattern {}", source))?;

        let matched: Vec<PathBuf> = walk_files(workspace, Path::new(""))?
            .into_iter()
            .filter(|path| matches_path_or_parent(&pattern, path))
            .collect();

        if matched.is_empty() {
            anyhow::bail!("file pattern {} must match at least one file", source);
        }

        return Ok(matched);
    }

    let relative = PathBuf::from(source);
    let full = workspace.join(&relative);

    if full.is_dir() {
        walk_files(workspace, &relative)
    } else if full.is_file() {
        Ok(vec![relative])
    } else {
        anyhow::bail!(
            "file {} not found in workspace {}",
            source,
            workspace.display()
        )
    }
}

/// Every file under `workspace/dir`, relative to the workspace, sorted
///
/// Symlinks are listed as files and never followed.
pub(crate) fn walk_files(workspace: &Path, dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let full = workspace.join(&current);
        let entries = std::fs::read_dir(&full)
            .with_context(|| format!("Failed to list {}", full.display()))?;

        for entry in entries {
            let entry = entry?;
            let relative = current.join(entry.file_name());
            let metadata = std::fs::symlink_metadata(entry.path())
                .with_context(|| format!("Failed to stat {}", entry.path().display()))?;

            if metadata.is_dir() {
                pending.push(relative);
            } else {
                files.push(relative);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Matches the path or any directory above it
fn matches_path_or_parent(pattern: &Pattern, path: &Path) -> bool {
    path.ancestors()
        .filter(|p| !p.as_os_str().is_empty())
        .any(|p| pattern.matches_with(&to_slash(p), MATCH_OPTIONS))
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// `.dockerignore` rules; the last matching rule wins
#[derive(Debug, Default)]
pub struct DockerIgnore {
    rules: Vec<(Pattern, bool)>,
}

impl DockerIgnore {
    /// Reads `.dockerignore` from the workspace, empty when absent
    pub fn load(workspace: &Path) -> Result<Self> {
        let path = workspace.join(".dockerignore");
        if !path.is_file() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut rules = Vec::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (negate, pattern) = match line.strip_prefix('!') {
                Some(rest) => (true, rest.trim()),
                None => (false, line),
            };

            let pattern = pattern
                .trim_start_matches("./")
                .trim_start_matches('/')
                .trim_end_matches('/');
            if pattern.is_empty() {
                continue;
            }

            let compiled = Pattern::new(pattern)
                .with_context(|| format!("Invalid .dockerignore pattern {}", pattern))?;
            rules.push((compiled, negate));
        }

        Ok(Self { rules })
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        let mut excluded = false;
        for (pattern, negate) in &self.rules {
            if matches_path_or_parent(pattern, path) {
                excluded = !negate;
            }
        }
        excluded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn workspace(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        dir
    }

    fn deps(dir: &tempfile::TempDir, build_args: &[(&str, Option<&str>)]) -> Vec<String> {
        let build_args = build_args
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
            .collect();
        DockerfileDependencies
            .dependencies(dir.path(), "Dockerfile", &build_args)
            .unwrap()
            .iter()
            .map(|p| to_slash(p))
            .collect()
    }

    #[test]
    fn test_copy_file_and_directory() {
        let dir = workspace(&[
            (
                "Dockerfile",
                "FROM alpine\nCOPY server.go /app/\nCOPY web /app/web\n",
            ),
            ("server.go", "package main"),
            ("web/index.html", "<html>"),
            ("web/css/site.css", "body {}"),
            ("unused.txt", "nope"),
        ]);

        assert_eq!(
            deps(&dir, &[]),
            vec![
                "Dockerfile",
                "server.go",
                "web/css/site.css",
                "web/index.html"
            ]
        );
    }

    #[test]
    fn test_skips_stage_copies_and_urls() {
        let dir = workspace(&[
            (
                "Dockerfile",
                "FROM golang AS build\nCOPY main.go .\nFROM alpine\nCOPY --from=build /out/app /app\nADD https://example.com/file.tgz /tmp/\n",
            ),
            ("main.go", "package main"),
        ]);

        assert_eq!(deps(&dir, &[]), vec!["Dockerfile", "main.go"]);
    }

    #[test]
    fn test_arg_substitution() {
        let dir = workspace(&[
            (
                "Dockerfile",
                "ARG CONFIG=dev\nFROM alpine\nCOPY config/${CONFIG}.yaml \\\n  /etc/app.yaml\n",
            ),
            ("config/dev.yaml", "dev"),
            ("config/prod.yaml", "prod"),
        ]);

        assert_eq!(deps(&dir, &[]), vec!["Dockerfile", "config/dev.yaml"]);
        assert_eq!(
            deps(&dir, &[("CONFIG", Some("prod"))]),
            vec!["Dockerfile", "config/prod.yaml"]
        );
    }

    #[test]
    fn test_glob_and_json_form() {
        let dir = workspace(&[
            (
                "Dockerfile",
                "FROM alpine\n# copy sources\nCOPY [\"*.go\", \"/src/\"]\n",
            ),
            ("a.go", "a"),
            ("b.go", "b"),
            ("c.txt", "c"),
        ]);

        assert_eq!(deps(&dir, &[]), vec!["Dockerfile", "a.go", "b.go"]);
    }

    #[test]
    fn test_dockerignore_with_negation() {
        let dir = workspace(&[
            ("Dockerfile", "FROM alpine\nCOPY . /app\n"),
            (".dockerignore", "# ignore logs\n*.log\nvendor/\n!vendor/keep.txt\nDockerfile\n"),
            ("main.go", "package main"),
            ("debug.log", "log"),
            ("vendor/lib.go", "lib"),
            ("vendor/keep.txt", "keep"),
        ]);

        assert_eq!(
            deps(&dir, &[]),
            vec![".dockerignore", "Dockerfile", "main.go", "vendor/keep.txt"]
        );
    }

    #[test]
    fn test_missing_source_is_an_error() {
        let dir = workspace(&[("Dockerfile", "FROM alpine\nCOPY missing.txt /\n")]);
        let result =
            DockerfileDependencies.dependencies(dir.path(), "Dockerfile", &BTreeMap::new());
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_is_not_followed() {
        let dir = workspace(&[("Dockerfile", "FROM alpine\nCOPY . /app\n"), ("src/main.go", "m")]);
        std::os::unix::fs::symlink("..", dir.path().join("src/parent")).unwrap();

        let files = walk_files(dir.path(), Path::new("")).unwrap();
        let files: Vec<String> = files.iter().map(|p| to_slash(p)).collect();
        assert_eq!(files, vec!["Dockerfile", "src/main.go", "src/parent"]);
    }

    #[test]
    fn test_dockerfile_outside_workspace_is_left_out() {
        let outside = workspace(&[("Dockerfile", "FROM alpine\nCOPY main.go /\n")]);
        let dir = workspace(&[("main.go", "package main")]);
        let dockerfile = outside.path().join("Dockerfile");

        let deps = DockerfileDependencies
            .dependencies(dir.path(), dockerfile.to_str().unwrap(), &BTreeMap::new())
            .unwrap();
        assert_eq!(deps, vec![PathBuf::from("main.go")]);
    }

    #[test]
    fn test_substitute() {
        let mut args = HashMap::new();
        args.insert("A".to_string(), "x".to_string());

        assert_eq!(substitute("$A/${A}/$B/\\$A", &args), "x/x//$A");
        assert_eq!(substitute("${A:-default}", &args), "x");
        assert_eq!(substitute("cost$", &args), "cost$");
    }

    #[test]
    fn test_preprocess() {
        let lines = preprocess("# syntax=docker/dockerfile:1\nFROM alpine\n\nRUN a \\\n  && b\n");
        assert_eq!(lines, vec!["FROM alpine", "RUN a && b"]);
    }
}
