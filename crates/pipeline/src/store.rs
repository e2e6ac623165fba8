//! Persistence port used by the lifecycle controller.
//!
//! [`PgSceneStore`] delegates to the `scenecast-db` repositories;
//! [`MemorySceneStore`] keeps everything in process for tests and local runs.
//! Both apply the same compare-and-set rules on scene status.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use scenecast_core::scene_status::SceneStatus;
use scenecast_core::types::DbId;
use scenecast_db::models::render_artifact::{CreateRenderArtifact, RenderArtifact};
use scenecast_db::models::scene::{CreateScene, Scene};
use scenecast_db::repositories::SceneRepo;
use sqlx::PgPool;

use crate::error::StoreError;

/// Everything written when a run succeeds.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub code: String,
    pub artifact_url: String,
    pub file_path: String,
    pub duration_secs: f64,
}

/// Scene reads and lifecycle writes.
///
/// Every write except `mark_processing` applies only while the scene is
/// `Processing` and reports `false` otherwise.
#[async_trait]
pub trait SceneStore: Send + Sync {
    async fn find_scene(&self, id: DbId) -> Result<Option<Scene>, StoreError>;

    /// Oldest `Pending` scene ids, at most `limit`.
    async fn list_pending(&self, limit: i64) -> Result<Vec<DbId>, StoreError>;

    /// `Pending -> Processing`; `false` if the scene was not `Pending`.
    async fn mark_processing(&self, id: DbId) -> Result<bool, StoreError>;

    async fn save_code(&self, id: DbId, code: &str) -> Result<bool, StoreError>;

    /// `Processing -> Completed` together with the artifact record.
    async fn complete(&self, id: DbId, completion: &Completion) -> Result<bool, StoreError>;

    /// `Processing -> Failed` with the annotated code.
    async fn fail(&self, id: DbId, annotated_code: &str) -> Result<bool, StoreError>;
}

// ---------------------------------------------------------------------------
// PostgreSQL
// ---------------------------------------------------------------------------

/// [`SceneStore`] over the `scenes` / `render_artifacts` tables.
#[derive(Clone)]
pub struct PgSceneStore {
    pool: PgPool,
}

impl PgSceneStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SceneStore for PgSceneStore {
    async fn find_scene(&self, id: DbId) -> Result<Option<Scene>, StoreError> {
        Ok(SceneRepo::find_by_id(&self.pool, id).await?)
    }

    async fn list_pending(&self, limit: i64) -> Result<Vec<DbId>, StoreError> {
        let scenes = SceneRepo::list_pending(&self.pool, limit).await?;
        Ok(scenes.into_iter().map(|s| s.id).collect())
    }

    async fn mark_processing(&self, id: DbId) -> Result<bool, StoreError> {
        Ok(SceneRepo::mark_processing(&self.pool, id).await?)
    }

    async fn save_code(&self, id: DbId, code: &str) -> Result<bool, StoreError> {
        Ok(SceneRepo::save_code(&self.pool, id, code).await?)
    }

    async fn complete(&self, id: DbId, completion: &Completion) -> Result<bool, StoreError> {
        let artifact = CreateRenderArtifact {
            scene_id: id,
            file_path: completion.file_path.clone(),
            duration_secs: completion.duration_secs,
        };
        let row = SceneRepo::complete(
            &self.pool,
            id,
            &completion.code,
            &completion.artifact_url,
            &artifact,
        )
        .await?;
        Ok(row.is_some())
    }

    async fn fail(&self, id: DbId, annotated_code: &str) -> Result<bool, StoreError> {
        Ok(SceneRepo::fail(&self.pool, id, annotated_code).await?)
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryState {
    scenes: BTreeMap<DbId, Scene>,
    artifacts: HashMap<DbId, RenderArtifact>,
    next_scene_id: DbId,
    next_artifact_id: DbId,
}

/// [`SceneStore`] held in process memory.
#[derive(Default)]
pub struct MemorySceneStore {
    state: Mutex<MemoryState>,
}

impl MemorySceneStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new `Pending` scene, as the API layer would.
    pub fn insert(&self, input: &CreateScene) -> Scene {
        let mut state = self.lock();
        state.next_scene_id += 1;
        let now = Utc::now();
        let scene = Scene {
            id: state.next_scene_id,
            project_id: input.project_id,
            prompt: input.prompt.clone(),
            code: None,
            artifact_url: None,
            status_id: SceneStatus::Pending.id(),
            sort_order: input.sort_order.unwrap_or(0),
            created_at: now,
            updated_at: now,
        };
        state.scenes.insert(scene.id, scene.clone());
        scene
    }

    /// Snapshot of a scene.
    pub fn scene(&self, id: DbId) -> Option<Scene> {
        self.lock().scenes.get(&id).cloned()
    }

    /// Snapshot of a scene's artifact.
    pub fn artifact(&self, scene_id: DbId) -> Option<RenderArtifact> {
        self.lock().artifacts.get(&scene_id).cloned()
    }

    /// External re-entry to `Pending`, mirroring `SceneRepo::reset_to_pending`.
    pub fn reset_to_pending(&self, id: DbId, new_prompt: Option<&str>) -> Option<Scene> {
        let mut state = self.lock();
        let scene = state.scenes.get_mut(&id)?;
        let reopenable = scene
            .status()
            .is_ok_and(|status| status.can_transition_to(SceneStatus::Pending));
        let prompt_changed = new_prompt.is_some_and(|p| p != scene.prompt);
        if !reopenable && !prompt_changed {
            return None;
        }
        if let Some(prompt) = new_prompt {
            scene.prompt = prompt.to_string();
        }
        scene.artifact_url = None;
        scene.status_id = SceneStatus::Pending.id();
        scene.updated_at = Utc::now();
        let snapshot = scene.clone();
        state.artifacts.remove(&id);
        Some(snapshot)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panic while holding the lock cannot leave the maps half-written
        // in a way later readers care about.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply `update` if the scene is `Processing`.
    fn with_processing<F>(&self, id: DbId, update: F) -> Result<bool, StoreError>
    where
        F: FnOnce(&mut MemoryState),
    {
        let mut state = self.lock();
        let scene = state.scenes.get(&id).ok_or(StoreError::SceneNotFound(id))?;
        if scene.status_id != SceneStatus::Processing.id() {
            return Ok(false);
        }
        update(&mut state);
        if let Some(scene) = state.scenes.get_mut(&id) {
            scene.updated_at = Utc::now();
        }
        Ok(true)
    }
}

#[async_trait]
impl SceneStore for MemorySceneStore {
    async fn find_scene(&self, id: DbId) -> Result<Option<Scene>, StoreError> {
        Ok(self.scene(id))
    }

    async fn list_pending(&self, limit: i64) -> Result<Vec<DbId>, StoreError> {
        let state = self.lock();
        let mut pending: Vec<&Scene> = state
            .scenes
            .values()
            .filter(|s| s.status_id == SceneStatus::Pending.id())
            .collect();
        pending.sort_by_key(|s| (s.created_at, s.id));
        Ok(pending
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|s| s.id)
            .collect())
    }

    async fn mark_processing(&self, id: DbId) -> Result<bool, StoreError> {
        let mut state = self.lock();
        let scene = state
            .scenes
            .get_mut(&id)
            .ok_or(StoreError::SceneNotFound(id))?;
        if scene.status_id != SceneStatus::Pending.id() {
            return Ok(false);
        }
        scene.status_id = SceneStatus::Processing.id();
        scene.updated_at = Utc::now();
        Ok(true)
    }

    async fn save_code(&self, id: DbId, code: &str) -> Result<bool, StoreError> {
        self.with_processing(id, |state| {
            if let Some(scene) = state.scenes.get_mut(&id) {
                scene.code = Some(code.to_string());
            }
        })
    }

    async fn complete(&self, id: DbId, completion: &Completion) -> Result<bool, StoreError> {
        self.with_processing(id, |state| {
            if let Some(scene) = state.scenes.get_mut(&id) {
                scene.code = Some(completion.code.clone());
                scene.artifact_url = Some(completion.artifact_url.clone());
                scene.status_id = SceneStatus::Completed.id();
            }
            let now = Utc::now();
            let existing = state.artifacts.get(&id).map(|a| (a.id, a.created_at));
            let (artifact_id, created_at) = match existing {
                Some(found) => found,
                None => {
                    state.next_artifact_id += 1;
                    (state.next_artifact_id, now)
                }
            };
            state.artifacts.insert(
                id,
                RenderArtifact {
                    id: artifact_id,
                    scene_id: id,
                    file_path: completion.file_path.clone(),
                    duration_secs: completion.duration_secs,
                    created_at,
                    updated_at: now,
                },
            );
        })
    }

    async fn fail(&self, id: DbId, annotated_code: &str) -> Result<bool, StoreError> {
        self.with_processing(id, |state| {
            if let Some(scene) = state.scenes.get_mut(&id) {
                scene.code = Some(annotated_code.to_string());
                scene.status_id = SceneStatus::Failed.id();
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn store_with_scene() -> (MemorySceneStore, DbId) {
        let store = MemorySceneStore::new();
        let scene = store.insert(&CreateScene {
            project_id: 1,
            prompt: "a ball".into(),
            sort_order: None,
        });
        (store, scene.id)
    }

    fn completion() -> Completion {
        Completion {
            code: "code".into(),
            artifact_url: "/media/videos/1.mp4".into(),
            file_path: "media/videos/1.mp4".into(),
            duration_secs: 2.0,
        }
    }

    #[tokio::test]
    async fn mark_processing_wins_once() {
        let (store, id) = store_with_scene();
        assert!(store.mark_processing(id).await.unwrap());
        assert!(!store.mark_processing(id).await.unwrap());
        assert!(store.list_pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn writes_require_processing() {
        let (store, id) = store_with_scene();
        assert!(!store.save_code(id, "x").await.unwrap());
        assert!(!store.complete(id, &completion()).await.unwrap());
        assert!(store.artifact(id).is_none());
    }

    #[tokio::test]
    async fn complete_records_artifact() {
        let (store, id) = store_with_scene();
        store.mark_processing(id).await.unwrap();
        assert!(store.complete(id, &completion()).await.unwrap());

        let scene = store.scene(id).unwrap();
        assert_eq!(scene.status().unwrap(), SceneStatus::Completed);
        assert_eq!(store.artifact(id).unwrap().duration_secs, 2.0);
    }

    #[tokio::test]
    async fn reset_clears_artifact_and_keeps_one_row_per_scene() {
        let (store, id) = store_with_scene();
        store.mark_processing(id).await.unwrap();
        store.complete(id, &completion()).await.unwrap();

        let reset = store.reset_to_pending(id, Some("two balls")).unwrap();
        assert_eq!(reset.prompt, "two balls");
        assert!(reset.artifact_url.is_none());
        assert!(store.artifact(id).is_none());
        assert_eq!(store.list_pending(10).await.unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn reset_refused_while_processing_with_same_prompt() {
        let (store, id) = store_with_scene();
        store.mark_processing(id).await.unwrap();
        assert!(store.reset_to_pending(id, Some("a ball")).is_none());
        assert!(store.reset_to_pending(id, None).is_none());
    }

    #[tokio::test]
    async fn unknown_scene_is_an_error() {
        let store = MemorySceneStore::new();
        assert_matches!(
            store.mark_processing(99).await,
            Err(StoreError::SceneNotFound(99))
        );
        assert!(store.find_scene(99).await.unwrap().is_none());
    }
}
