//! Child process execution in a dedicated process group.
//!
//! [`run_in_process_group`] spawns the command as the leader of a new process
//! group, captures stdout/stderr, and enforces a wall-clock deadline. When the
//! deadline passes the whole group is killed, so helpers the renderer started
//! (ffmpeg, LaTeX) die with it.

use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

/// Maximum stdout or stderr size captured per stream (10 MiB).
///
/// Output exceeding this limit is drained and discarded to prevent memory
/// exhaustion from extremely verbose renders.
pub const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// How long output readers may keep running once the child has exited.
///
/// A descendant that moved to another process group can hold the pipes open
/// indefinitely; whatever was captured by then is returned.
pub const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

type SharedBuf = Arc<Mutex<Vec<u8>>>;

/// Error type for process execution.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to start process: {0}")]
    Spawn(std::io::Error),

    #[error("failed waiting for process: {0}")]
    Wait(std::io::Error),

    #[error("process timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },
}

/// Captured result of a process that ran to completion.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, or `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    pub duration_ms: u64,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Spawn `cmd` in its own process group and wait for it, up to `timeout`.
///
/// The caller sets program, arguments and working directory. Stdin is closed.
/// Group members still alive when the leader exits are killed as well.
pub async fn run_in_process_group(
    cmd: &mut Command,
    timeout: Duration,
) -> Result<ProcessOutput, ProcessError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(ProcessError::Spawn)?;
    // `Child::id` is gone once the child has been reaped.
    let group = child.id();

    let stdout_buf = SharedBuf::default();
    let stderr_buf = SharedBuf::default();
    // Readers run on their own tasks so `child.wait()` can borrow `child`.
    let mut readers = [
        tokio::spawn(read_stream(child.stdout.take(), Arc::clone(&stdout_buf))),
        tokio::spawn(read_stream(child.stderr.take(), Arc::clone(&stderr_buf))),
    ];

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => {
            signal_group(group);
            drain_readers(&mut readers, OUTPUT_DRAIN_GRACE).await;
            Ok(ProcessOutput {
                stdout: take_text(&stdout_buf),
                stderr: take_text(&stderr_buf),
                exit_code: exit_code(status),
                duration_ms: start.elapsed().as_millis() as u64,
            })
        }
        Ok(Err(e)) => {
            signal_group(group);
            abort_readers(&readers);
            Err(ProcessError::Wait(e))
        }
        Err(_elapsed) => {
            signal_group(group);
            let _ = child.start_kill();
            let _ = child.wait().await;
            // A descendant that left the group may still hold the pipes open.
            abort_readers(&readers);
            Err(ProcessError::Timeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            })
        }
    }
}

/// SIGKILL every process in the group led by `group`. A group that is
/// already empty is fine.
fn signal_group(group: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = group {
        // Safety: killpg only sends a signal; the group id is the child's pid
        // because it was spawned with `process_group(0)`.
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    let _ = group;
}

/// Wait up to `grace` for both readers to hit EOF, then stop them. Output
/// captured so far stays in the shared buffers.
async fn drain_readers(readers: &mut [JoinHandle<()>; 2], grace: Duration) {
    let _ = tokio::time::timeout(grace, async {
        for reader in readers.iter_mut() {
            let _ = reader.await;
        }
    })
    .await;
    abort_readers(readers);
}

fn abort_readers(readers: &[JoinHandle<()>]) {
    for reader in readers {
        reader.abort();
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

fn lock(buf: &SharedBuf) -> MutexGuard<'_, Vec<u8>> {
    buf.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn take_text(buf: &SharedBuf) -> String {
    String::from_utf8_lossy(&std::mem::take(&mut *lock(buf))).into_owned()
}

/// Copy a stream into `buf` until EOF, keeping at most [`MAX_OUTPUT_BYTES`].
///
/// Bytes past the cap are still read so the child never blocks on a full pipe.
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>, buf: SharedBuf) {
    let Some(mut stream) = handle else {
        return;
    };
    let mut chunk = [0u8; 8192];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let mut out = lock(&buf);
                let room = MAX_OUTPUT_BYTES.saturating_sub(out.len());
                out.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
