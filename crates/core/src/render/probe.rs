//! Media duration probe (`ffprobe`).

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;

use super::subprocess::{run_in_process_group, ProcessError};

/// Default limit on one duration measurement.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Error type for probe invocations.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("probe command is empty")]
    EmptyCommand,

    #[error("probe binary could not be started: {0}")]
    NotFound(std::io::Error),

    #[error("probe timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    #[error("probe failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse probe output: {0}")]
    ParseError(String),

    #[error("media file not found: {0}")]
    FileNotFound(String),

    #[error("probe output carries no duration")]
    NoDuration,
}

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

/// Top-level ffprobe JSON output (`-print_format json -show_format -show_streams`).
#[derive(Debug, Default, Deserialize)]
pub struct ProbeOutput {
    #[serde(default)]
    pub streams: Vec<ProbeStream>,
    #[serde(default)]
    pub format: ProbeFormat,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProbeStream {
    pub codec_type: Option<String>,
    pub duration: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProbeFormat {
    pub duration: Option<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Measure the duration of the media file at `path`, in seconds.
///
/// `command` is the program followed by any leading arguments. The tool
/// and anything it spawned are killed once `timeout` passes.
pub async fn probe_duration(
    command: &[String],
    path: &Path,
    timeout: Duration,
) -> Result<f64, ProbeError> {
    let (program, leading) = command.split_first().ok_or(ProbeError::EmptyCommand)?;

    if !path.exists() {
        return Err(ProbeError::FileNotFound(path.to_string_lossy().to_string()));
    }

    let mut cmd = Command::new(program);
    cmd.args(leading)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path);

    let output = run_in_process_group(&mut cmd, timeout)
        .await
        .map_err(|e| match e {
            ProcessError::Spawn(io) | ProcessError::Wait(io) => ProbeError::NotFound(io),
            ProcessError::Timeout { elapsed_ms } => ProbeError::Timeout { elapsed_ms },
        })?;

    if !output.success() {
        return Err(ProbeError::ExecutionFailed {
            exit_code: Some(output.exit_code).filter(|code| *code >= 0),
            stderr: output.stderr,
        });
    }

    let probe = serde_json::from_str::<ProbeOutput>(&output.stdout)
        .map_err(|e| ProbeError::ParseError(format!("{e}: {}", output.stdout)))?;

    parse_duration(&probe).ok_or(ProbeError::NoDuration)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
