//! Scene entity model and DTOs.

use scenecast_core::error::CoreError;
use scenecast_core::scene_status::{SceneStatus, StatusId};
use scenecast_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `scenes` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Scene {
    pub id: DbId,
    pub project_id: DbId,
    pub prompt: String,
    /// Last generated code, or the code annotated with a failure trailer.
    pub code: Option<String>,
    pub artifact_url: Option<String>,
    pub status_id: StatusId,
    pub sort_order: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Scene {
    /// Typed view of `status_id`.
    pub fn status(&self) -> Result<SceneStatus, CoreError> {
        SceneStatus::from_id(self.status_id)
    }
}

/// DTO for creating a new scene. Scenes always start `Pending`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateScene {
    pub project_id: DbId,
    pub prompt: String,
    /// Defaults to 0 if omitted.
    pub sort_order: Option<i32>,
}
