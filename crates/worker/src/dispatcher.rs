//! Scene dispatcher.
//!
//! Polls for `Pending` scenes every `poll_interval` and starts a pipeline
//! run for each, skipping scenes that already have a run in flight and
//! stopping once the render concurrency cap is reached.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use scenecast_core::types::DbId;
use scenecast_pipeline::{ScenePipeline, SceneStore, StoreError};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::WorkerConfig;

type InFlight = Arc<Mutex<HashSet<DbId>>>;

/// Long-lived task feeding pending scenes into the pipeline.
pub struct SceneDispatcher {
    pipeline: Arc<ScenePipeline>,
    store: Arc<dyn SceneStore>,
    poll_interval: Duration,
    batch_size: i64,
    max_concurrent: usize,
    shutdown_grace: Duration,
    permits: Arc<Semaphore>,
    in_flight: InFlight,
    tracker: TaskTracker,
}

impl SceneDispatcher {
    pub fn new(
        pipeline: Arc<ScenePipeline>,
        store: Arc<dyn SceneStore>,
        config: &WorkerConfig,
    ) -> Self {
        let max_concurrent = config.max_concurrent_renders.max(1);
        Self {
            pipeline,
            store,
            poll_interval: config.poll_interval,
            batch_size: config.batch_size,
            max_concurrent,
            shutdown_grace: config.shutdown_grace(),
            permits: Arc::new(Semaphore::new(max_concurrent)),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            tracker: TaskTracker::new(),
        }
    }

    /// Number of scenes with a run in progress.
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Run the dispatch loop until `cancel` fires, then wait (bounded by the
    /// shutdown grace period) for in-flight renders to finish.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            max_concurrent_renders = self.max_concurrent,
            batch_size = self.batch_size,
            "Scene dispatcher started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Scene dispatcher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.dispatch_once().await {
                        Ok(0) => {}
                        Ok(started) => tracing::debug!(started, "Dispatch cycle started renders"),
                        Err(e) => tracing::error!(error = %e, "Dispatch cycle failed"),
                    }
                }
            }
        }

        self.drain().await;
    }

    /// One dispatch cycle. Returns how many runs were started.
    pub async fn dispatch_once(&self) -> Result<usize, StoreError> {
        let pending = self.store.list_pending(self.batch_size).await?;
        let mut started = 0;

        for scene_id in pending {
            if lock(&self.in_flight).contains(&scene_id) {
                continue;
            }
            let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
                tracing::debug!(scene_id, "Render capacity reached; deferring");
                break;
            };

            lock(&self.in_flight).insert(scene_id);
            let claim = InFlightClaim {
                in_flight: Arc::clone(&self.in_flight),
                scene_id,
            };
            let pipeline = Arc::clone(&self.pipeline);
            self.tracker.spawn(async move {
                let _permit = permit;
                let _claim = claim;
                pipeline.render_scene(scene_id).await;
            });

            tracing::info!(scene_id, "Scene dispatched");
            started += 1;
        }

        Ok(started)
    }

    async fn drain(&self) {
        self.tracker.close();
        let remaining = self.in_flight();
        if remaining > 0 {
            tracing::info!(in_flight = remaining, "Waiting for in-flight renders");
        }
        if tokio::time::timeout(self.shutdown_grace, self.tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                in_flight = self.in_flight(),
                grace_secs = self.shutdown_grace.as_secs(),
                "Shutdown grace period elapsed with renders still running",
            );
        }
    }
}

/// Removes the scene from the in-flight set when the run ends, panics included.
struct InFlightClaim {
    in_flight: InFlight,
    scene_id: DbId,
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.scene_id);
    }
}

fn lock(set: &InFlight) -> MutexGuard<'_, HashSet<DbId>> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
