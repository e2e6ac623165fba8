use std::time::Duration;

use scenecast_pipeline::PipelineConfig;

/// Worker configuration loaded from environment variables.
///
/// `DATABASE_URL` is read separately at startup and is required.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often the dispatcher looks for pending scenes (default: 1s).
    pub poll_interval: Duration,
    /// Cap on renderer subprocesses running at once (default: `2`).
    pub max_concurrent_renders: usize,
    /// Pending scenes fetched per poll (default: `10`).
    pub batch_size: i64,
    /// Connection pool size (default: `5`).
    pub db_max_connections: u32,
    pub pipeline: PipelineConfig,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default |
    /// |---------------------------------|---------|
    /// | `WORKER_POLL_INTERVAL_MS`       | `1000`  |
    /// | `WORKER_MAX_CONCURRENT_RENDERS` | `2`     |
    /// | `WORKER_BATCH_SIZE`             | `10`    |
    /// | `DATABASE_MAX_CONNECTIONS`      | `5`     |
    ///
    /// Pipeline settings come from [`PipelineConfig::from_env`].
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let poll_interval_ms: u64 = lookup("WORKER_POLL_INTERVAL_MS")
            .and_then(|v| v.trim().parse().ok())
            .filter(|ms| *ms > 0)
            .unwrap_or(1000);

        let max_concurrent_renders: usize = lookup("WORKER_MAX_CONCURRENT_RENDERS")
            .and_then(|v| v.trim().parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(2);

        let batch_size: i64 = lookup("WORKER_BATCH_SIZE")
            .and_then(|v| v.trim().parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(10);

        let db_max_connections: u32 = lookup("DATABASE_MAX_CONNECTIONS")
            .and_then(|v| v.trim().parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(5);

        Self {
            poll_interval: Duration::from_millis(poll_interval_ms),
            max_concurrent_renders,
            batch_size,
            db_max_connections,
            pipeline: PipelineConfig::from_lookup(lookup),
        }
    }

    /// How long shutdown waits for in-flight renders: one full generation
    /// call plus one full render.
    pub fn shutdown_grace(&self) -> Duration {
        self.pipeline.generation_timeout + self.pipeline.animation_timeout
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
