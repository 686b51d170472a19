//! External command-line utilities
//!
//! Everything uvcprobe learns about a camera comes from the free-text output
//! of `v4l2-ctl`, `udevadm` and `lsusb`. Invocation goes through the
//! [`CommandRunner`] seam so parsers and the code built on them can be driven
//! by canned output in tests.

pub mod lsusb;
pub mod serial;
pub mod udev;
pub mod v4l2ctl;

use crate::config::ToolOptions;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Captured result of one utility invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed by a signal
    pub code: Option<i32>,
    /// Standard output, lossily decoded
    pub stdout: String,
    /// Standard error, lossily decoded
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the utility exited with status zero
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs an external program to completion
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, capturing both output streams.
    ///
    /// A non-zero exit is not an error here; callers decide what the status means.
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput>;
}

/// [`CommandRunner`] backed by real child processes
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
}

impl SystemRunner {
    /// Runner that kills invocations exceeding `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new(ToolOptions::default().timeout())
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Tool {
                program: program.to_string(),
                message: format!("failed to start: {e}"),
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::Tool {
                program: program.to_string(),
                message: format!("timed out after {} ms", self.timeout.as_millis()),
            })?
            .map_err(|e| Error::Tool {
                program: program.to_string(),
                message: format!("failed to collect output: {e}"),
            })?;

        tracing::trace!(program, ?args, status = ?output.status.code(), "tool finished");

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Program names resolved from configuration
#[derive(Debug, Clone)]
pub struct ToolPaths {
    /// `v4l2-ctl`
    pub v4l2_ctl: String,
    /// `udevadm`
    pub udevadm: String,
    /// `lsusb`
    pub lsusb: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self::from(&ToolOptions::default())
    }
}

impl From<&ToolOptions> for ToolPaths {
    fn from(options: &ToolOptions) -> Self {
        Self {
            v4l2_ctl: options.v4l2_ctl.clone(),
            udevadm: options.udevadm.clone(),
            lsusb: options.lsusb.clone(),
        }
    }
}

/// Split `key=value` style text, trimming both halves
pub(crate) fn split_key_value(text: &str, separator: char) -> Option<(&str, &str)> {
    text.split_once(separator)
        .map(|(key, value)| (key.trim(), value.trim()))
}
