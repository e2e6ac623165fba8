use scenecast_core::render::{ProbeError, RenderError};
use scenecast_core::types::DbId;
use scenecast_llm::GenerationError;

/// Persistence faults surfaced by a [`crate::store::SceneStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("scene {0} not found")]
    SceneNotFound(DbId),
}

/// Everything that can end (or degrade) one render run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Absorbed by the synthesizer: the fallback template is used instead.
    #[error("generation service unavailable: {0}")]
    GenerationUnavailable(#[from] GenerationError),

    #[error("unsafe code rejected: {}", .diagnostics.join("; "))]
    UnsafeCodeRejected { diagnostics: Vec<String> },

    #[error("render timed out after {elapsed_ms} ms")]
    RenderTimeout { elapsed_ms: u64 },

    #[error("renderer exited with code {exit_code}: {stderr}")]
    RenderProcessError { exit_code: i32, stderr: String },

    #[error("renderer finished without producing a media file")]
    ArtifactMissing,

    /// Non-fatal: the artifact is kept with a duration of `0.0`.
    #[error("duration probe failed: {0}")]
    ProbeFailure(#[from] ProbeError),

    /// The scene left `Processing` while this run was in progress.
    #[error("scene {0} was reset while rendering; run discarded")]
    Superseded(DbId),

    #[error("persistence error: {0}")]
    Store(#[from] StoreError),
}

impl PipelineError {
    /// Short stage label for structured logs.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::GenerationUnavailable(_) => "generate",
            Self::UnsafeCodeRejected { .. } => "validate",
            Self::RenderTimeout { .. } | Self::RenderProcessError { .. } | Self::ArtifactMissing => {
                "render"
            }
            Self::ProbeFailure(_) => "probe",
            Self::Superseded(_) | Self::Store(_) => "persist",
        }
    }
}

impl From<RenderError> for PipelineError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::Timeout { elapsed_ms } => Self::RenderTimeout { elapsed_ms },
            RenderError::ProcessFailed { exit_code, stderr } => {
                Self::RenderProcessError { exit_code, stderr }
            }
            RenderError::ArtifactMissing => Self::ArtifactMissing,
            other @ (RenderError::EmptyCommand | RenderError::Io(_)) => Self::RenderProcessError {
                exit_code: -1,
                stderr: other.to_string(),
            },
        }
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(StoreError::Database(err))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
