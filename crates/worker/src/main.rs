use std::sync::Arc;

use scenecast_pipeline::{PgSceneStore, ScenePipeline, SceneStore};
use scenecast_worker::{SceneDispatcher, WorkerConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    init_tracing();

    // --- Configuration ---
    let config = WorkerConfig::from_env();
    tracing::info!(
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        max_concurrent_renders = config.max_concurrent_renders,
        render_command = ?config.pipeline.render_command,
        generation_configured = !config.pipeline.generation_api_key.is_empty(),
        "Loaded worker configuration",
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = scenecast_db::create_pool(&database_url, config.db_max_connections)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    scenecast_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    scenecast_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    // --- Pipeline ---
    let store: Arc<dyn SceneStore> = Arc::new(PgSceneStore::new(pool.clone()));
    let pipeline = Arc::new(ScenePipeline::from_config(
        config.pipeline.clone(),
        Arc::clone(&store),
    ));
    let dispatcher = SceneDispatcher::new(pipeline, store, &config);

    // --- Run until signalled ---
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    dispatcher.run(cancel).await;

    pool.close().await;
    tracing::info!("Worker stopped");
}

/// `LOG_FORMAT=json` switches to JSON lines; anything else is human-readable.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "scenecast_worker=info,scenecast_pipeline=info".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), finishing in-flight renders");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, finishing in-flight renders");
        }
    }
}
