//! Helpers for running external media tools as isolated child processes.
//!
//! Children are spawned without a console window on Windows and with stdin
//! closed. Both output streams are captured: probes answer on stdout, while
//! ffmpeg-style tools report failures on stderr.

use std::ffi::OsStr;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::process::Command;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

impl NoWindowExt for Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` suitable for a tool invocation.
///
/// The child gets no window, a null stdin, and is killed if its handle is
/// dropped before it exits.
pub fn tokio_command(program: impl AsRef<OsStr>) -> Command {
    let mut cmd = Command::new(program);
    cmd.no_window();
    cmd.stdin(Stdio::null());
    cmd.kill_on_drop(true);
    cmd
}

/// Errors raised while running a child process.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {}s", after.as_secs())]
    TimedOut { program: String, after: Duration },
}

/// Result of a finished child process.
#[derive(Debug)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub elapsed: Duration,
}

impl CapturedOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Exit code, or -1 when the process was terminated by a signal.
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }

    /// The last `max_chars` characters of stderr, lossily decoded.
    pub fn stderr_tail(&self, max_chars: usize) -> String {
        truncate_tail(&String::from_utf8_lossy(&self.stderr), max_chars)
    }
}

/// Run `cmd` to completion with stdout and stderr captured.
///
/// With `timeout` set, the child is killed once the limit elapses and
/// [`ProcessError::TimedOut`] is returned.
pub async fn run_captured(
    cmd: &mut Command,
    timeout: Option<Duration>,
) -> Result<CapturedOutput, ProcessError> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();

    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let start = Instant::now();
    let child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        program: program.clone(),
        source,
    })?;

    // Dropping the pending future drops the child, and kill_on_drop reaps it.
    let waited = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(result) => result,
            Err(_) => {
                return Err(ProcessError::TimedOut {
                    program,
                    after: limit,
                });
            }
        },
        None => child.wait_with_output().await,
    };

    let output = waited.map_err(|source| ProcessError::Wait { program, source })?;

    Ok(CapturedOutput {
        status: output.status,
        stdout: output.stdout,
        stderr: output.stderr,
        elapsed: start.elapsed(),
    })
}

/// Keep the last `max_chars` characters of `text`, prefixed with `...` when cut.
///
/// Tool errors are printed last, so the tail is the useful part.
pub fn truncate_tail(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim_end();
    let total = trimmed.chars().count();
    if total <= max_chars {
        return trimmed.to_string();
    }

    let skip = total - max_chars;
    let tail: String = trimmed.chars().skip(skip).collect();
    format!("...{}", tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_tail_short_text_untouched() {
        assert_eq!(truncate_tail("boom\n", 100), "boom");
    }

    #[test]
    fn test_truncate_tail_keeps_end() {
        let text = "line one\nline two\nInvalid argument";
        let tail = truncate_tail(text, 16);
        assert_eq!(tail, "...Invalid argument");
    }

    #[test]
    fn test_truncate_tail_respects_char_boundaries() {
        let tail = truncate_tail("ééééé", 2);
        assert_eq!(tail, "...éé");
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let mut cmd = tokio_command("definitely-not-a-real-binary-ovb");
        let err = run_captured(&mut cmd, None).await.unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_stderr_and_exit_code() {
        let mut cmd = tokio_command("sh");
        cmd.args(["-c", "echo out; echo failure-detail >&2; exit 3"]);
        let output = run_captured(&mut cmd, None).await.unwrap();
        assert!(!output.success());
        assert_eq!(output.code(), 3);
        assert_eq!(output.stderr_tail(100), "failure-detail");
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "out");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_child() {
        let mut cmd = tokio_command("sleep");
        cmd.arg("5");
        let err = run_captured(&mut cmd, Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::TimedOut { .. }));
    }
}
