//! Command utilities for cross-platform process spawning
//!
//! Processes are created without console windows on Windows and run
//! asynchronously with output capture, cancellation and an optional timeout.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

use crate::error::{GitMindError, Result};
use crate::services::cancellation::CancellationToken;

/// Captured result of a finished process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, -1 when the process was terminated by a signal
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Creates a Command with platform-specific settings to hide console windows.
///
/// On Windows, this sets the CREATE_NO_WINDOW flag to prevent CMD popups.
pub fn create_command(program: &str) -> Command {
    let mut cmd = Command::new(program);

    #[cfg(target_os = "windows")]
    {
        // CREATE_NO_WINDOW = 0x08000000
        cmd.creation_flags(0x08000000);
    }

    // Prevent git credential popup dialogs
    if program == "git" || program.ends_with("git.exe") {
        cmd.env("GIT_TERMINAL_PROMPT", "0");
    }

    cmd
}

/// Run a command to completion, capturing its output.
///
/// A non-zero exit code is not an error here; callers decide. Cancellation
/// and timeout kill the child on a best-effort basis.
pub async fn run_command(
    mut cmd: Command,
    token: &CancellationToken,
    timeout: Option<Duration>,
) -> Result<ProcessOutput> {
    let description = describe(&cmd);

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| {
        GitMindError::OperationFailed(format!("Failed to start '{}': {}", description, e))
    })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout_task = tokio::spawn(read_pipe(stdout));
    let stderr_task = tokio::spawn(read_pipe(stderr));

    let deadline = async {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };

    let status = tokio::select! {
        status = child.wait() => status?,
        _ = token.cancelled() => {
            tracing::debug!("Cancelling '{}'", description);
            kill_quietly(&mut child).await;
            return Err(GitMindError::Cancelled);
        }
        _ = deadline => {
            tracing::warn!("'{}' timed out", description);
            kill_quietly(&mut child).await;
            return Err(GitMindError::ProcessTimeout(description));
        }
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    Ok(ProcessOutput {
        exit_code: status.code().unwrap_or(-1),
        stdout,
        stderr,
    })
}

async fn read_pipe<R: tokio::io::AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    String::from_utf8_lossy(&buf).to_string()
}

// The process may already have exited, so a failed kill is not an error.
async fn kill_quietly(child: &mut Child) {
    let _ = child.kill().await;
}

fn describe(cmd: &Command) -> String {
    let std_cmd = cmd.as_std();
    let mut parts = vec![std_cmd.get_program().to_string_lossy().to_string()];
    parts.extend(std_cmd.get_args().map(|a| a.to_string_lossy().to_string()));
    parts.join(" ")
}
