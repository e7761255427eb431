//! Blocking subprocess execution with streamed output capture.

use crate::error::{ReplayError, Result};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

/// Runs an external tool to completion.
///
/// Implementations block the calling thread for the full lifetime of the
/// tool. There is no retry and no timeout; a minutes-long run holds its
/// caller for the duration.
pub trait ToolRunner: Send + Sync {
    /// Run `program` with `args`, returning captured stdout on exit code 0.
    ///
    /// Any other exit code is fatal and carries the captured stderr together
    /// with the full command line that was attempted.
    fn run(&self, program: &Path, args: &[String]) -> Result<String>;
}

/// [`ToolRunner`] backed by a real OS subprocess.
///
/// stdout and stderr are forwarded to the log line by line as the tool runs
/// and captured in full for the result.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    fn run(&self, program: &Path, args: &[String]) -> Result<String> {
        let command_line = render_command(program, args);
        info!("running {}", command_line);

        let mut child = Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ReplayError::io_with_path(e, program))?;

        // Drain stderr on a helper thread so a chatty tool cannot fill one
        // pipe while we block on the other.
        let stderr_pipe = child.stderr.take().ok_or_else(|| {
            ReplayError::Other("child process stderr was not captured".to_string())
        })?;
        let stderr_thread = std::thread::spawn(move || {
            let mut captured = String::new();
            for line in BufReader::new(stderr_pipe).lines().map_while(|l| l.ok()) {
                warn!("{}", line);
                captured.push_str(&line);
                captured.push('\n');
            }
            captured
        });

        let stdout_pipe = child.stdout.take().ok_or_else(|| {
            ReplayError::Other("child process stdout was not captured".to_string())
        })?;
        let mut stdout = String::new();
        for line in BufReader::new(stdout_pipe).lines() {
            let line = line.map_err(|e| ReplayError::io_with_path(e, program))?;
            debug!("{}", line);
            stdout.push_str(&line);
            stdout.push('\n');
        }

        let status = child
            .wait()
            .map_err(|e| ReplayError::io_with_path(e, program))?;
        let stderr = stderr_thread.join().unwrap_or_default();

        if status.success() {
            debug!("{} exited cleanly", program.display());
            Ok(stdout)
        } else {
            Err(ReplayError::ToolFailed {
                command: command_line,
                code: status.code().unwrap_or(-1),
                stderr,
            })
        }
    }
}

fn render_command(program: &Path, args: &[String]) -> String {
    let mut rendered = program.display().to_string();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(arg);
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sh() -> PathBuf {
        PathBuf::from("sh")
    }

    fn args(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[test]
    #[cfg(unix)]
    fn test_success_returns_stdout() {
        let out = ProcessRunner.run(&sh(), &args("echo hello")).unwrap();
        assert_eq!(out, "hello\n");
    }

    #[test]
    #[cfg(unix)]
    fn test_failure_carries_stderr_and_command_line() {
        let err = ProcessRunner
            .run(&sh(), &args("echo bad model >&2; exit 1"))
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("bad model"), "got: {message}");
        assert!(
            message.contains("sh -c echo bad model >&2; exit 1"),
            "got: {message}"
        );
        assert!(matches!(err, ReplayError::ToolFailed { code: 1, .. }));
    }

    #[test]
    fn test_missing_binary_is_an_io_error() {
        let err = ProcessRunner
            .run(Path::new("/nonexistent/replay-tool"), &[])
            .unwrap_err();
        assert!(matches!(err, ReplayError::Io { .. }));
    }

    #[test]
    fn test_render_command() {
        let rendered = render_command(
            Path::new("whisper"),
            &["--task".to_string(), "transcribe".to_string()],
        );
        assert_eq!(rendered, "whisper --task transcribe");
    }
}
