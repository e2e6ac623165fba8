//! Renderer port and its implementation over the core render executor.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use scenecast_core::render::{probe_duration, RenderError, RenderExecutor, RenderSettings};
use scenecast_core::types::DbId;

use crate::error::PipelineError;

/// A finished render at its canonical path.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedScene {
    pub file_path: PathBuf,
    /// `0.0` when the duration could not be measured.
    pub duration_secs: f64,
}

/// Turns prepared code into a media file.
#[async_trait]
pub trait SceneRenderer: Send + Sync {
    async fn render(
        &self,
        code: &str,
        scene_id: DbId,
        scene_class: Option<&str>,
    ) -> Result<RenderedScene, RenderError>;
}

/// Drives the external render tool, then probes the artifact's duration.
#[derive(Debug, Clone)]
pub struct ToolRenderer {
    executor: RenderExecutor,
    probe_command: Vec<String>,
    probe_timeout: Duration,
}

impl ToolRenderer {
    pub fn new(
        settings: RenderSettings,
        probe_command: Vec<String>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            executor: RenderExecutor::new(settings),
            probe_command,
            probe_timeout,
        }
    }
}

#[async_trait]
impl SceneRenderer for ToolRenderer {
    async fn render(
        &self,
        code: &str,
        scene_id: DbId,
        scene_class: Option<&str>,
    ) -> Result<RenderedScene, RenderError> {
        let artifact = self.executor.render(code, scene_id, scene_class).await?;
        tracing::info!(
            scene_id,
            stage = "render",
            elapsed_ms = artifact.render_ms,
            path = %artifact.file_path.display(),
            "Render finished",
        );

        let measured =
            probe_duration(&self.probe_command, &artifact.file_path, self.probe_timeout).await;
        let duration_secs = match measured {
            Ok(secs) => secs,
            Err(e) => {
                let err = PipelineError::ProbeFailure(e);
                tracing::warn!(scene_id, stage = "probe", error = %err, "Duration unknown; recording 0");
                0.0
            }
        };

        Ok(RenderedScene {
            file_path: artifact.file_path,
            duration_secs,
        })
    }
}
