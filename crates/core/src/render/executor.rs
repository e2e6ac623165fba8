//! Render executor: runs scene code through the external animation tool.
//!
//! Each invocation gets a fresh scratch directory holding `scene.py` and the
//! tool's media tree. The directory is a [`tempfile::TempDir`], so it is
//! removed on every exit path. On success the newest produced media file is
//! moved to `<output_dir>/<scene_id>.<ext>`.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, SystemTime};

use tokio::process::Command;

use super::subprocess::{run_in_process_group, ProcessError};
use crate::error::CoreError;
use crate::types::DbId;

/// File the scene code is written to inside the scratch directory.
pub const SCENE_FILE_NAME: &str = "scene.py";

/// Intermediate clips the tool writes before concatenation.
const PARTIAL_MOVIE_DIR: &str = "partial_movie_files";

/// Extensions accepted as a finished artifact.
const MEDIA_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "gif"];

/// Stderr kept on failure; tracebacks end with the useful part.
const MAX_STDERR_CHARS: usize = 4000;

/// Quality preset passed to the tool as `-q<flag>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderQuality {
    #[default]
    Low,
    Medium,
    High,
    Production,
    FourK,
}

impl RenderQuality {
    pub fn flag(self) -> &'static str {
        match self {
            Self::Low => "l",
            Self::Medium => "m",
            Self::High => "h",
            Self::Production => "p",
            Self::FourK => "k",
        }
    }
}

impl FromStr for RenderQuality {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l" | "low" => Ok(Self::Low),
            "m" | "medium" => Ok(Self::Medium),
            "h" | "high" => Ok(Self::High),
            "p" | "production" => Ok(Self::Production),
            "k" | "4k" => Ok(Self::FourK),
            other => Err(CoreError::Validation(format!(
                "unknown render quality '{other}'"
            ))),
        }
    }
}

/// How and where the tool is run.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    /// Program followed by leading arguments, e.g. `["manim"]`.
    pub command: Vec<String>,
    pub quality: RenderQuality,
    /// Hard wall-clock limit for one render.
    pub timeout: Duration,
    /// Where finished artifacts are moved to.
    pub output_dir: PathBuf,
    /// Parent of per-render scratch directories; system temp dir when `None`.
    pub scratch_dir: Option<PathBuf>,
}

/// A finished artifact at its canonical path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedArtifact {
    pub file_path: PathBuf,
    pub render_ms: u64,
}

/// Error type for render invocations.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("render timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    #[error("renderer exited with code {exit_code}: {stderr}")]
    ProcessFailed { exit_code: i32, stderr: String },

    #[error("renderer finished without producing a media file")]
    ArtifactMissing,

    #[error("render command is empty")]
    EmptyCommand,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs scene code through the configured tool.
#[derive(Debug, Clone)]
pub struct RenderExecutor {
    settings: RenderSettings,
}

impl RenderExecutor {
    pub fn new(settings: RenderSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Render `code` and move the result to the canonical path for `scene_id`.
    ///
    /// `scene_class` is passed to the tool so it does not prompt when the
    /// unit defines several scenes.
    pub async fn render(
        &self,
        code: &str,
        scene_id: DbId,
        scene_class: Option<&str>,
    ) -> Result<RenderedArtifact, RenderError> {
        let (program, leading) = self
            .settings
            .command
            .split_first()
            .ok_or(RenderError::EmptyCommand)?;

        let workdir = self.scratch_dir()?;
        let script = workdir.path().join(SCENE_FILE_NAME);
        tokio::fs::write(&script, code).await?;

        let mut cmd = Command::new(program);
        cmd.args(leading)
            .arg(format!("-q{}", self.settings.quality.flag()))
            .arg("--media_dir")
            .arg(workdir.path().join("media"))
            .arg("-o")
            .arg(format!("{scene_id}.mp4"))
            .arg(&script);
        if let Some(class) = scene_class {
            cmd.arg(class);
        }
        cmd.current_dir(workdir.path());

        let output = run_in_process_group(&mut cmd, self.settings.timeout)
            .await
            .map_err(|e| match e {
                ProcessError::Timeout { elapsed_ms } => RenderError::Timeout { elapsed_ms },
                ProcessError::Spawn(err) => RenderError::ProcessFailed {
                    exit_code: -1,
                    stderr: format!("failed to start renderer '{program}': {err}"),
                },
                ProcessError::Wait(err) => RenderError::Io(err),
            })?;

        if !output.success() {
            return Err(RenderError::ProcessFailed {
                exit_code: output.exit_code,
                stderr: tail(&output.stderr, MAX_STDERR_CHARS).to_string(),
            });
        }

        let produced = find_newest_media(workdir.path())
            .await?
            .ok_or(RenderError::ArtifactMissing)?;

        tokio::fs::create_dir_all(&self.settings.output_dir).await?;
        let extension = produced
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4");
        let destination = self
            .settings
            .output_dir
            .join(format!("{scene_id}.{extension}"));
        move_file(&produced, &destination).await?;

        Ok(RenderedArtifact {
            file_path: destination,
            render_ms: output.duration_ms,
        })
    }

    fn scratch_dir(&self) -> std::io::Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("scenecast-render-");
        match &self.settings.scratch_dir {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)
            }
            None => builder.tempdir(),
        }
    }
}

/// Newest finished media file under `root`, skipping partial clips.
async fn find_newest_media(root: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                if entry.file_name() != PARTIAL_MOVIE_DIR {
                    pending.push(path);
                }
                continue;
            }
            if !file_type.is_file() || !is_media_file(&path) {
                continue;
            }
            let modified = entry.metadata().await?.modified()?;
            let is_newer = match &newest {
                Some((time, current)) => (modified, &path) > (*time, current),
                None => true,
            };
            if is_newer {
                newest = Some((modified, path));
            }
        }
    }

    Ok(newest.map(|(_, path)| path))
}

fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| MEDIA_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Rename, falling back to copy + remove across filesystems.
async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to).await?;
    tokio::fs::remove_file(from).await
}

/// Last `max_chars` characters of `text`.
fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = text
        .char_indices()
        .nth(count - max_chars)
        .map_or(0, |(i, _)| i);
    &text[skip..]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
