//! Repository for the `render_artifacts` table.

use scenecast_core::types::DbId;
use sqlx::PgPool;

use crate::models::render_artifact::{CreateRenderArtifact, RenderArtifact};

/// Column list shared across queries to avoid repetition.
pub(crate) const COLUMNS: &str = "id, scene_id, file_path, duration_secs, created_at, updated_at";

/// Insert-or-replace keyed on `scene_id`; a scene has at most one artifact.
pub(crate) fn upsert_query() -> String {
    format!(
        "INSERT INTO render_artifacts (scene_id, file_path, duration_secs) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (scene_id) DO UPDATE SET \
             file_path = EXCLUDED.file_path, \
             duration_secs = EXCLUDED.duration_secs, \
             updated_at = NOW() \
         RETURNING {COLUMNS}"
    )
}

/// Provides CRUD operations for render artifacts.
pub struct RenderArtifactRepo;

impl RenderArtifactRepo {
    /// Record the artifact for a scene, replacing any previous one.
    pub async fn upsert(
        pool: &PgPool,
        input: &CreateRenderArtifact,
    ) -> Result<RenderArtifact, sqlx::Error> {
        sqlx::query_as::<_, RenderArtifact>(&upsert_query())
            .bind(input.scene_id)
            .bind(&input.file_path)
            .bind(input.duration_secs)
            .fetch_one(pool)
            .await
    }

    /// Find the artifact recorded for a scene.
    pub async fn find_by_scene(
        pool: &PgPool,
        scene_id: DbId,
    ) -> Result<Option<RenderArtifact>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM render_artifacts WHERE scene_id = $1");
        sqlx::query_as::<_, RenderArtifact>(&query)
            .bind(scene_id)
            .fetch_optional(pool)
            .await
    }

    /// Delete a scene's artifact row. Returns `true` if a row was removed.
    pub async fn delete_by_scene(pool: &PgPool, scene_id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM render_artifacts WHERE scene_id = $1")
            .bind(scene_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
