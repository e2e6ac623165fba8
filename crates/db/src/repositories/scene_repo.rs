//! Repository for the `scenes` table.
//!
//! Status changes are compare-and-set on `status_id`: a write that finds the
//! scene in an unexpected state affects no rows and reports `false`.

use scenecast_core::scene_status::SceneStatus;
use scenecast_core::types::DbId;
use sqlx::PgPool;

use crate::models::render_artifact::{CreateRenderArtifact, RenderArtifact};
use crate::models::scene::{CreateScene, Scene};
use crate::repositories::render_artifact_repo::upsert_query;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, project_id, prompt, code, artifact_url, status_id, \
    sort_order, created_at, updated_at";

/// Provides CRUD and lifecycle operations for scenes.
pub struct SceneRepo;

impl SceneRepo {
    /// Insert a new scene in `Pending`, returning the created row.
    pub async fn create(pool: &PgPool, input: &CreateScene) -> Result<Scene, sqlx::Error> {
        let query = format!(
            "INSERT INTO scenes (project_id, prompt, status_id, sort_order)
             VALUES ($1, $2, $3, COALESCE($4, 0))
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Scene>(&query)
            .bind(input.project_id)
            .bind(&input.prompt)
            .bind(SceneStatus::Pending.id())
            .bind(input.sort_order)
            .fetch_one(pool)
            .await
    }

    /// Find a scene by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Scene>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM scenes WHERE id = $1");
        sqlx::query_as::<_, Scene>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Oldest `Pending` scenes first, at most `limit`.
    pub async fn list_pending(pool: &PgPool, limit: i64) -> Result<Vec<Scene>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM scenes
             WHERE status_id = $1
             ORDER BY created_at ASC, id ASC
             LIMIT $2"
        );
        sqlx::query_as::<_, Scene>(&query)
            .bind(SceneStatus::Pending.id())
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// `Pending -> Processing`. Returns `false` if the scene was not `Pending`.
    pub async fn mark_processing(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE scenes SET status_id = $2, updated_at = NOW()
             WHERE id = $1 AND status_id = $3",
        )
        .bind(id)
        .bind(SceneStatus::Processing.id())
        .bind(SceneStatus::Pending.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Overwrite the code of a `Processing` scene.
    pub async fn save_code(pool: &PgPool, id: DbId, code: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE scenes SET code = $2, updated_at = NOW()
             WHERE id = $1 AND status_id = $3",
        )
        .bind(id)
        .bind(code)
        .bind(SceneStatus::Processing.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// `Processing -> Completed`, storing code, artifact URL and the artifact
    /// row in one transaction.
    ///
    /// Returns `None` (and writes nothing) if the scene left `Processing`
    /// while the render was running.
    pub async fn complete(
        pool: &PgPool,
        id: DbId,
        code: &str,
        artifact_url: &str,
        artifact: &CreateRenderArtifact,
    ) -> Result<Option<RenderArtifact>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE scenes SET code = $2, artifact_url = $3, status_id = $4, updated_at = NOW()
             WHERE id = $1 AND status_id = $5",
        )
        .bind(id)
        .bind(code)
        .bind(artifact_url)
        .bind(SceneStatus::Completed.id())
        .bind(SceneStatus::Processing.id())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let row = sqlx::query_as::<_, RenderArtifact>(&upsert_query())
            .bind(id)
            .bind(&artifact.file_path)
            .bind(artifact.duration_secs)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(row))
    }

    /// `Processing -> Failed` with the annotated code.
    pub async fn fail(pool: &PgPool, id: DbId, annotated_code: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE scenes SET code = $2, status_id = $3, updated_at = NOW()
             WHERE id = $1 AND status_id = $4",
        )
        .bind(id)
        .bind(annotated_code)
        .bind(SceneStatus::Failed.id())
        .bind(SceneStatus::Processing.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Route a scene back to `Pending` for another render run.
    ///
    /// Allowed from `Completed` or `Failed`, and from any state when
    /// `new_prompt` differs from the stored prompt. Clears the artifact URL
    /// and deletes the artifact row. Returns `None` if the reset was refused
    /// or the scene does not exist.
    pub async fn reset_to_pending(
        pool: &PgPool,
        id: DbId,
        new_prompt: Option<&str>,
    ) -> Result<Option<Scene>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "UPDATE scenes SET
                prompt = COALESCE($2::text, prompt),
                artifact_url = NULL,
                status_id = $3,
                updated_at = NOW()
             WHERE id = $1
               AND (status_id IN ($4, $5) OR ($2::text IS NOT NULL AND $2::text <> prompt))
             RETURNING {COLUMNS}"
        );
        let scene = sqlx::query_as::<_, Scene>(&query)
            .bind(id)
            .bind(new_prompt)
            .bind(SceneStatus::Pending.id())
            .bind(SceneStatus::Completed.id())
            .bind(SceneStatus::Failed.id())
            .fetch_optional(&mut *tx)
            .await?;

        if scene.is_some() {
            sqlx::query("DELETE FROM render_artifacts WHERE scene_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(scene)
    }
}
