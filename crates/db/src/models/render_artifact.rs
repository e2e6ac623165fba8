//! Render artifact entity model and DTOs.

use scenecast_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `render_artifacts` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RenderArtifact {
    pub id: DbId,
    pub scene_id: DbId,
    pub file_path: String,
    /// Best-effort measurement; `0.0` when the probe failed.
    pub duration_secs: f64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for recording a scene's artifact (insert or replace).
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRenderArtifact {
    pub scene_id: DbId,
    pub file_path: String,
    pub duration_secs: f64,
}
