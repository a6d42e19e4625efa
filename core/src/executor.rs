use anyhow::Context;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Why a build stopped at a given step.
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    #[error("copy source not found: {path}")]
    CopySourceNotFound { path: PathBuf },

    #[error("{}", command_failed_message(.exit_code))]
    CommandFailed {
        exit_code: Option<i32>,
        output: Vec<String>,
    },

    #[error("invalid recipe: {0}")]
    InvalidRecipe(String),

    #[error("build canceled")]
    Canceled,
}

fn command_failed_message(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("command failed with exit code {}", code),
        None => "command failed (terminated by signal)".to_string(),
    }
}

/// Outcome of one external command invocation.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub success: bool,
    pub duration: f64,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub exit_code: Option<i32>,
    pub failure_reason: Option<String>,
}

impl ExecutionResult {
    /// Result for steps that do not spawn a process (copy, entry point).
    pub fn internal(duration: f64) -> Self {
        Self {
            success: true,
            duration,
            stdout: Vec::new(),
            stderr: Vec::new(),
            exit_code: None,
            failure_reason: None,
        }
    }

    /// Captured stderr followed by stdout, the order diagnostics are most
    /// useful in when a compile fails.
    pub fn captured_output(&self) -> Vec<String> {
        let mut lines = self.stderr.clone();
        lines.extend(self.stdout.iter().cloned());
        lines
    }
}

/// Progress events emitted while a build runs.
#[derive(Debug, Clone)]
pub enum StepUpdate {
    Started { index: usize, description: String },
    Finished { index: usize, result: ExecutionResult },
}

/// Seam for the external compiler/runtime collaborator. The executor only
/// consumes the exit status and captured output; what the command does is
/// opaque to it. The returned future is `Send` so builds can be spawned
/// onto a multithreaded runtime.
pub trait CommandRunner {
    fn run(
        &self,
        command: &str,
        args: &[String],
        cwd: &Path,
        on_line: &mut (dyn FnMut(String) + Send),
    ) -> impl Future<Output = anyhow::Result<ExecutionResult>> + Send;
}

/// Production runner: spawns the command with piped stdout/stderr and
/// streams output line-by-line as it arrives.
#[derive(Debug, Clone, Default)]
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for ShellRunner {
    async fn run(
        &self,
        command: &str,
        args: &[String],
        cwd: &Path,
        on_line: &mut (dyn FnMut(String) + Send),
    ) -> anyhow::Result<ExecutionResult> {
        let start = Instant::now();

        let mut child = Command::new(command)
            .args(args)
            .current_dir(cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn command: {}", command))?;

        let stdout = child.stdout.take().context("Failed to capture stdout")?;
        let stderr = child.stderr.take().context("Failed to capture stderr")?;

        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();

        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();
        let mut stdout_done = false;
        let mut stderr_done = false;

        while !(stdout_done && stderr_done) {
            tokio::select! {
                line = stdout_lines.next_line(), if !stdout_done => {
                    match line.context("Failed to read stdout")? {
                        Some(line) => {
                            stdout_buf.push(line.clone());
                            on_line(line);
                        }
                        None => stdout_done = true,
                    }
                }
                line = stderr_lines.next_line(), if !stderr_done => {
                    match line.context("Failed to read stderr")? {
                        Some(line) => {
                            stderr_buf.push(line.clone());
                            on_line(line);
                        }
                        None => stderr_done = true,
                    }
                }
            }
        }

        let status = child
            .wait()
            .await
            .context("Failed to wait for child process")?;

        let duration = start.elapsed().as_secs_f64();
        let exit_code = status.code();
        let failure_reason = if status.success() {
            None
        } else {
            Some(describe_failure(&status))
        };

        Ok(ExecutionResult {
            success: status.success(),
            duration,
            stdout: stdout_buf,
            stderr: stderr_buf,
            exit_code,
            failure_reason,
        })
    }
}

#[cfg(unix)]
fn describe_failure(status: &std::process::ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => format!("Exit code {}", code),
        (None, Some(signal)) => format!("Terminated by signal {}", signal),
        (None, None) => "Abnormal termination".to_string(),
    }
}

#[cfg(not(unix))]
fn describe_failure(status: &std::process::ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("Exit code {}", code),
        None => "Abnormal termination".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shell_runner_captures_output_and_exit_code() {
        let runner = ShellRunner::new();
        let mut seen = Vec::new();

        let result = runner
            .run(
                "sh",
                &["-c".to_string(), "echo hello; echo oops >&2".to_string()],
                Path::new("/tmp"),
                &mut |line| seen.push(line),
            )
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout, vec!["hello".to_string()]);
        assert_eq!(result.stderr, vec!["oops".to_string()]);
        assert_eq!(seen.len(), 2);
    }

    #[tokio::test]
    async fn test_shell_runner_reports_nonzero_exit() {
        let runner = ShellRunner::new();

        let result = runner
            .run(
                "sh",
                &["-c".to_string(), "exit 3".to_string()],
                Path::new("/tmp"),
                &mut |_| {},
            )
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.failure_reason.as_deref(), Some("Exit code 3"));
    }

    #[tokio::test]
    async fn test_shell_runner_spawn_failure_is_an_error() {
        let runner = ShellRunner::new();

        let result = runner
            .run(
                "kiln-test-command-that-does-not-exist",
                &[],
                Path::new("/tmp"),
                &mut |_| {},
            )
            .await;

        assert!(result.is_err());
    }

    #[test]
    fn test_captured_output_puts_stderr_first() {
        let result = ExecutionResult {
            success: false,
            duration: 0.1,
            stdout: vec!["out".to_string()],
            stderr: vec!["err".to_string()],
            exit_code: Some(1),
            failure_reason: Some("Exit code 1".to_string()),
        };

        assert_eq!(
            result.captured_output(),
            vec!["err".to_string(), "out".to_string()]
        );
    }

    #[test]
    fn test_build_error_display() {
        let err = BuildError::CommandFailed {
            exit_code: Some(1),
            output: vec![],
        };
        assert_eq!(err.to_string(), "command failed with exit code 1");

        let err = BuildError::Canceled;
        assert_eq!(err.to_string(), "build canceled");
    }
}
