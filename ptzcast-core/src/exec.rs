//! External command execution
//!
//! Every interaction with the camera and the host goes through a short-lived
//! external program (`v4l2-ctl`, `fuser`, `ps`, `ss`). The [`CommandRunner`]
//! seam lets tests substitute canned output for those programs.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::trace;

use crate::error::{PtzError, Result};

/// Captured result of a finished external command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (None if killed by a signal)
    pub code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
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

    /// Whether the program exited with status 0
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs an external program to completion and captures its output
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, returning its output.
    ///
    /// Fails only if the program could not be started. A non-zero exit is
    /// reported through [`CommandOutput::code`].
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Runs commands with `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        trace!("exec: {} {}", program, args.join(" "));

        let output = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PtzError::external(program, format!("failed to run: {}", e)))?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Whether diagnostic text carries an error-level marker.
///
/// Case-insensitive match on "error", "failed" or "critical".
pub fn has_failure_marker(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("error") || lower.contains("failed") || lower.contains("critical")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_markers() {
        assert!(has_failure_marker("VIDIOC_S_EXT_CTRLS: failed: Invalid argument"));
        assert!(has_failure_marker("ERROR: from element /GstPipeline"));
        assert!(has_failure_marker("CRITICAL **: assertion"));
        assert!(!has_failure_marker("Setting pipeline to PLAYING ..."));
        assert!(!has_failure_marker(""));
    }

    #[tokio::test]
    async fn test_system_runner_missing_program() {
        let result = SystemRunner
            .run("ptzcast-definitely-not-a-program", &[])
            .await;
        assert!(matches!(result, Err(PtzError::ExternalProcess { .. })));
    }

    #[tokio::test]
    async fn test_system_runner_captures_output() {
        let out = SystemRunner
            .run("sh", &["-c".into(), "echo hi; echo oops >&2; exit 3".into()])
            .await
            .unwrap();
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout.trim(), "hi");
        assert_eq!(out.stderr.trim(), "oops");
        assert!(!out.success());
    }
}
