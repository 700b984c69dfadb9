//! External process execution
//!
//! Build tools (docker, bazel, maven, gradle) run as child processes. Every
//! wait races the run's cancellation token; a cancelled child is killed.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::BuildError;
use crate::output::BuildLog;

/// A command to run in a directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub dir: PathBuf,
    pub env: Vec<(String, String)>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>, dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dir: dir.into(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Short display form, e.g. `mvn -q jib:build`
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&self.dir)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .kill_on_drop(true);
        cmd
    }
}

/// Runs tools and captures their output
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Runs a command to completion
    ///
    /// # Returns
    /// Combined stdout and stderr; a non-zero exit is an error
    async fn run(&self, command: ToolCommand) -> Result<Vec<u8>>;
}

/// Runs tools as child processes
#[derive(Clone, Default)]
pub struct ProcessRunner {
    cancel: CancellationToken,
}

impl ProcessRunner {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, command: ToolCommand) -> Result<Vec<u8>> {
        run_capture(&command, &self.cancel).await
    }
}

/// Runs a command, forwarding every stdout and stderr line to `log`
pub async fn run_streaming(
    command: &ToolCommand,
    log: &BuildLog,
    cancel: &CancellationToken,
) -> Result<()> {
    debug!("Running {}", command.display());

    let mut child = command
        .to_command()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to start {}", command.program.display()))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let run = async {
        let (_, _, status) = tokio::join!(
            forward_lines(stdout, log),
            forward_lines(stderr, log),
            child.wait()
        );
        status
    };

    // Dropping the child on cancellation kills it
    let status = tokio::select! {
        _ = cancel.cancelled() => return Err(BuildError::Cancelled.into()),
        status = run => status.with_context(|| format!("Failed to wait for {}", command.program.display()))?,
    };

    if !status.success() {
        return Err(BuildError::ToolFailed {
            program: command.program.display().to_string(),
            code: status.code().unwrap_or(-1),
        }
        .into());
    }

    Ok(())
}

/// Runs a command and returns its combined output
pub async fn run_capture(command: &ToolCommand, cancel: &CancellationToken) -> Result<Vec<u8>> {
    let output = run_output(command, None, cancel).await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let err = anyhow::Error::new(BuildError::ToolFailed {
            program: command.program.display().to_string(),
            code: output.status.code().unwrap_or(-1),
        });
        if stderr.is_empty() {
            return Err(err);
        }
        return Err(err.context(stderr));
    }

    let mut combined = output.stdout;
    combined.extend_from_slice(&output.stderr);
    Ok(combined)
}

/// Runs a command with `input` written to its stdin
///
/// Output lines are forwarded to `log` once the command exits.
///
/// # Returns
/// The command's stdout
pub async fn run_with_input(
    command: &ToolCommand,
    input: Vec<u8>,
    log: &BuildLog,
    cancel: &CancellationToken,
) -> Result<String> {
    let output = run_output(command, Some(input), cancel).await?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr);
    for line in stdout.lines().chain(stderr.lines()) {
        log.output(line);
    }

    if !output.status.success() {
        return Err(BuildError::ToolFailed {
            program: command.program.display().to_string(),
            code: output.status.code().unwrap_or(-1),
        }
        .into());
    }

    Ok(stdout)
}

async fn run_output(
    command: &ToolCommand,
    input: Option<Vec<u8>>,
    cancel: &CancellationToken,
) -> Result<std::process::Output> {
    debug!("Running {}", command.display());

    let mut child = command
        .to_command()
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to start {}", command.program.display()))?;

    if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
        use tokio::io::AsyncWriteExt;
        let program = command.program.display().to_string();
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(&input).await {
                debug!("Failed to write stdin of {}: {}", program, e);
            }
        });
    }

    tokio::select! {
        _ = cancel.cancelled() => Err(BuildError::Cancelled.into()),
        output = child.wait_with_output() => output
            .with_context(|| format!("Failed to wait for {}", command.program.display())),
    }
}

async fn forward_lines<R: AsyncRead + Unpin>(reader: Option<R>, log: &BuildLog) {
    let Some(reader) = reader else {
        return;
    };

    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        log.output(line);
    }
}

/// Picks the project's wrapper script over the bare executable when present
///
/// # Arguments
/// * `dir` - Project directory
/// * `executable` - Tool name looked up on `PATH` (e.g., `mvn`)
/// * `wrapper` - Wrapper script name (e.g., `mvnw`)
pub fn find_command(dir: &Path, executable: &str, wrapper: &str) -> PathBuf {
    let wrapper_name = if cfg!(windows) {
        format!("{}.cmd", wrapper)
    } else {
        wrapper.to_string()
    };

    let local = dir.join(&wrapper_name);
    if local.is_file() {
        debug!("Using wrapper {}", local.display());
        return local;
    }

    PathBuf::from(executable)
}
