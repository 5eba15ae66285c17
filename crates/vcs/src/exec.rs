//! External-process executor shared by both backend drivers.
//!
//! Every backend command goes through [`run`]: spawn, wait for exit, map the
//! exit status onto the crate's error taxonomy. Stdio handles are owned by
//! the awaited child and released before `run` returns, on every exit path.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, error};

use crate::error::VcsError;

/// Options recognized by [`run`]. Absent fields take the documented defaults.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Working directory; the caller's current directory when absent
    pub cwd: Option<PathBuf>,
    /// Treat a nonzero exit as success (default false)
    pub ignore_error: bool,
    /// Suppress error logging on failure (default false)
    pub quiet: bool,
    /// Buffer standard output into the result; when false the field is empty
    pub capture_output: bool,
}

impl ExecOptions {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            cwd: Some(dir.as_ref().to_path_buf()),
            ..Default::default()
        }
    }

    pub fn capture(mut self) -> Self {
        self.capture_output = true;
        self
    }

    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    pub fn ignore_error(mut self) -> Self {
        self.ignore_error = true;
        self
    }
}

/// Result of one subprocess invocation; never persisted
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub output: String,
    pub code: i32,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

fn command_line(program: &str, args: &[String]) -> String {
    let mut line = String::from(program);
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// Run a backend command and wait for it to exit.
///
/// Fails with [`VcsError::Process`] when the subprocess cannot be spawned,
/// or [`VcsError::Command`] when it exits nonzero and `ignore_error` is off.
/// With `ignore_error` the actual exit code is reported in the result so
/// callers can still inspect it.
pub async fn run(program: &str, args: &[String], opts: &ExecOptions) -> Result<ExecResult, VcsError> {
    let line = command_line(program, args);
    debug!(command = %line, cwd = ?opts.cwd, "running backend command");

    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(cwd) = &opts.cwd {
        cmd.current_dir(cwd);
    }
    cmd.stdin(Stdio::null());
    cmd.stdout(if opts.capture_output {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stderr(Stdio::piped());

    let output = match cmd.output().await {
        Ok(output) => output,
        Err(source) => {
            if opts.ignore_error {
                return Ok(ExecResult {
                    output: String::new(),
                    code: 0,
                });
            }
            if !opts.quiet {
                error!(command = %line, error = %source, "failed to spawn backend command");
            }
            return Err(VcsError::Process {
                command: line,
                source,
            });
        }
    };

    let code = output.status.code().unwrap_or(-1);
    let stdout = if opts.capture_output {
        String::from_utf8_lossy(&output.stdout).into_owned()
    } else {
        String::new()
    };

    if code != 0 && !opts.ignore_error {
        let detail = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !opts.quiet {
            error!(command = %line, code, detail = %detail, "backend command failed");
        }
        return Err(VcsError::Command {
            command: line,
            code,
            detail,
        });
    }

    Ok(ExecResult {
        output: stdout,
        code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_when_requested() {
        let result = run(
            "sh",
            &["-c".to_string(), "printf hello".to_string()],
            &ExecOptions::default().capture(),
        )
        .await
        .unwrap();
        assert_eq!(result.output, "hello");
        assert!(result.success());
    }

    #[tokio::test]
    async fn output_empty_without_capture() {
        let result = run(
            "sh",
            &["-c".to_string(), "printf hello".to_string()],
            &ExecOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(result.output, "");
    }

    #[tokio::test]
    async fn nonzero_exit_is_an_error() {
        let err = run(
            "sh",
            &["-c".to_string(), "exit 3".to_string()],
            &ExecOptions::default().quiet(),
        )
        .await
        .unwrap_err();
        match err {
            VcsError::Command { code, .. } => assert_eq!(code, 3),
            other => panic!("expected Command error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn nonzero_exit_reported_when_ignored() {
        let result = run(
            "sh",
            &["-c".to_string(), "exit 3".to_string()],
            &ExecOptions::default().quiet().ignore_error(),
        )
        .await
        .unwrap();
        assert_eq!(result.code, 3);
    }

    #[tokio::test]
    async fn missing_executable_is_a_process_error() {
        let err = run(
            "definitely-not-a-real-vcs-tool",
            &[],
            &ExecOptions::default().quiet(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, VcsError::Process { .. }));
    }
}
