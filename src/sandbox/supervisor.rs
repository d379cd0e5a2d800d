//! Wall-clock supervision of the interpreter process.
//!
//! The child runs in its own process group so that a timeout kills anything
//! the candidate started, not only the interpreter.

use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::executor::SandboxError;

/// Bytes of stdout/stderr retained per stream.
pub const OUTPUT_CAP_BYTES: usize = 64 * 1024;

/// Upper bound on draining output pipes after the child is gone.
const IO_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

const READ_CHUNK_SIZE: usize = 8192;

/// How a supervised process ended.
#[derive(Debug)]
pub struct SupervisedExit {
    /// Exit status; `None` when the process was killed on timeout.
    pub status: Option<ExitStatus>,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// Spawns `command` and waits for it, killing its process group once
/// `timeout` elapses.
///
/// Stdin is closed and both output streams are captured, keeping at most
/// [`OUTPUT_CAP_BYTES`] of each.
pub async fn supervise(
    mut command: Command,
    timeout: Option<Duration>,
) -> Result<SupervisedExit, SandboxError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    {
        command.process_group(0);
    }

    let program = command.as_std().get_program().to_string_lossy().into_owned();
    let start = Instant::now();
    let mut child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SandboxError::InterpreterUnavailable {
                interpreter: program.clone(),
            }
        } else {
            SandboxError::Io(e)
        }
    })?;
    debug!(program = %program, pid = ?child.id(), "Spawned supervised process");

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| SandboxError::Setup("stdout pipe was not available".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| SandboxError::Setup("stderr pipe was not available".to_string()))?;
    let mut stdout_handle = tokio::spawn(read_capped(stdout, OUTPUT_CAP_BYTES));
    let mut stderr_handle = tokio::spawn(read_capped(stderr, OUTPUT_CAP_BYTES));

    let (status, timed_out) = match timeout {
        Some(limit) => tokio::select! {
            result = child.wait() => (Some(result?), false),
            _ = tokio::time::sleep(limit) => {
                warn!(timeout_secs = limit.as_secs_f64(), "Run timed out, killing process group");
                kill_process_group(&mut child);
                // Reap so nothing outlives the round.
                let _ = child.wait().await;
                (None, true)
            }
        },
        None => (Some(child.wait().await?), false),
    };
    let duration = start.elapsed();

    let stdout = drain(&mut stdout_handle).await;
    let stderr = drain(&mut stderr_handle).await;

    Ok(SupervisedExit {
        status,
        timed_out,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        duration,
    })
}

fn kill_process_group(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                debug!(error = %e, "killpg failed");
            }
        }
    }
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "start_kill failed");
    }
}

async fn drain(handle: &mut JoinHandle<std::io::Result<Vec<u8>>>) -> Vec<u8> {
    match tokio::time::timeout(IO_DRAIN_TIMEOUT, &mut *handle).await {
        Ok(Ok(Ok(bytes))) => bytes,
        Ok(Ok(Err(e))) => {
            debug!(error = %e, "Error reading process output");
            Vec::new()
        }
        Ok(Err(join_err)) => {
            debug!(error = %join_err, "Output reader task failed");
            Vec::new()
        }
        Err(_elapsed) => {
            handle.abort();
            Vec::new()
        }
    }
}

/// Reads `reader` to EOF, keeping the first `cap` bytes.
async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, cap: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    // Keep reading past the cap so the child never blocks on a full pipe.
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let room = cap.saturating_sub(buf.len());
        buf.extend_from_slice(&chunk[..n.min(room)]);
    }
    Ok(buf)
}
