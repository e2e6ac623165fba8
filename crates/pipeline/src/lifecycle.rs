//! Scene Lifecycle Controller.
//!
//! Drives one scene through synthesize -> prepare -> render and records the
//! outcome. The scene is always left `Completed` or `Failed`; callers learn
//! the result only by reading the scene back.

use std::sync::Arc;
use std::time::Instant;

use scenecast_core::codegen::{self, BoundingPolicy};
use scenecast_core::scene_status::annotate_failure;
use scenecast_core::types::DbId;
use scenecast_llm::CodeGenerator;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::renderer::{SceneRenderer, ToolRenderer};
use crate::store::{Completion, SceneStore};
use crate::synthesizer::CodeSynthesizer;

/// The render pipeline for a set of scenes.
///
/// Not reentrant for a single scene id: the caller (the worker dispatcher)
/// guarantees one in-flight run per scene. A second trigger that slips
/// through is still refused by the `Pending -> Processing` compare-and-set.
pub struct ScenePipeline {
    config: PipelineConfig,
    store: Arc<dyn SceneStore>,
    synthesizer: CodeSynthesizer,
    renderer: Arc<dyn SceneRenderer>,
    policy: BoundingPolicy,
}

impl ScenePipeline {
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn SceneStore>,
        generator: Arc<dyn CodeGenerator>,
        renderer: Arc<dyn SceneRenderer>,
    ) -> Self {
        let synthesizer = CodeSynthesizer::new(
            generator,
            config.generation_max_tokens,
            config.generation_temperature,
        );
        let policy = config.bounding_policy();
        Self {
            config,
            store,
            synthesizer,
            renderer,
            policy,
        }
    }

    /// Wire the HTTP generation client and the external render tool from `config`.
    pub fn from_config(config: PipelineConfig, store: Arc<dyn SceneStore>) -> Self {
        let generator = Arc::new(config.generation_client());
        let renderer = Arc::new(ToolRenderer::new(
            config.render_settings(),
            config.probe_command.clone(),
            config.probe_timeout,
        ));
        Self::new(config, store, generator, renderer)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline for one scene. Never fails; the outcome is persisted.
    pub async fn render_scene(&self, scene_id: DbId) {
        let span = tracing::info_span!(
            "render_scene",
            scene_id,
            run_id = %uuid::Uuid::now_v7(),
        );
        self.run(scene_id).instrument(span).await
    }

    /// Fire-and-continue variant of [`Self::render_scene`].
    pub fn spawn_render(self: &Arc<Self>, scene_id: DbId) -> JoinHandle<()> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move { pipeline.render_scene(scene_id).await })
    }

    async fn run(&self, scene_id: DbId) {
        let prompt = match self.claim(scene_id).await {
            Ok(Some(prompt)) => prompt,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(stage = "claim", error = %e, "Failed to claim scene");
                return;
            }
        };

        let started = Instant::now();
        let mut last_code = None;
        match self.execute(scene_id, &prompt, &mut last_code).await {
            Ok(()) => {
                tracing::info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Scene completed"
                );
            }
            Err(err @ PipelineError::Superseded(_)) => {
                tracing::warn!(stage = err.stage(), error = %err, "Run discarded");
            }
            Err(err) => self.record_failure(scene_id, last_code.as_deref(), &err).await,
        }
    }

    /// `Pending -> Processing`. Returns the prompt when this run owns the scene.
    async fn claim(&self, scene_id: DbId) -> Result<Option<String>, PipelineError> {
        let Some(scene) = self.store.find_scene(scene_id).await? else {
            tracing::warn!("Scene not found; trigger ignored");
            return Ok(None);
        };

        if !self.store.mark_processing(scene_id).await? {
            tracing::warn!(
                status = scene.status().map(|s| s.as_str()).unwrap_or("unknown"),
                "Scene is not pending; trigger ignored"
            );
            return Ok(None);
        }

        tracing::info!(stage = "claim", "Scene processing");
        Ok(Some(scene.prompt))
    }

    async fn execute(
        &self,
        scene_id: DbId,
        prompt: &str,
        last_code: &mut Option<String>,
    ) -> Result<(), PipelineError> {
        let synthesis = self.synthesizer.synthesize(prompt).await;
        let prepared = codegen::prepare(&synthesis.raw, &self.policy);
        *last_code = Some(prepared.source_code.clone());

        tracing::info!(
            stage = "prepare",
            is_safe = prepared.is_safe,
            used_fallback = synthesis.used_fallback(),
            diagnostics = prepared.diagnostics.len(),
            "Code prepared"
        );
        for note in &prepared.diagnostics {
            tracing::debug!(stage = "prepare", note = %note);
        }

        if !self.store.save_code(scene_id, &prepared.source_code).await? {
            return Err(PipelineError::Superseded(scene_id));
        }

        if !prepared.is_safe {
            return Err(PipelineError::UnsafeCodeRejected {
                diagnostics: prepared.diagnostics,
            });
        }

        let rendered = self
            .renderer
            .render(
                &prepared.source_code,
                scene_id,
                prepared.scene_class.as_deref(),
            )
            .await?;

        let file_name = rendered
            .file_path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{scene_id}.mp4"));
        let completion = Completion {
            code: prepared.source_code,
            artifact_url: self.config.artifact_url(&file_name),
            file_path: rendered.file_path.display().to_string(),
            duration_secs: rendered.duration_secs,
        };

        if !self.store.complete(scene_id, &completion).await? {
            return Err(PipelineError::Superseded(scene_id));
        }
        Ok(())
    }

    async fn record_failure(&self, scene_id: DbId, last_code: Option<&str>, err: &PipelineError) {
        let annotated = annotate_failure(last_code, &err.to_string());
        match self.store.fail(scene_id, &annotated).await {
            Ok(true) => {
                tracing::error!(stage = err.stage(), error = %err, "Scene failed");
            }
            Ok(false) => {
                tracing::warn!(
                    stage = err.stage(),
                    error = %err,
                    "Scene left processing before failure was recorded"
                );
            }
            Err(store_err) => {
                tracing::error!(
                    stage = err.stage(),
                    error = %err,
                    store_error = %store_err,
                    "Failed to record scene failure"
                );
            }
        }
    }
}
