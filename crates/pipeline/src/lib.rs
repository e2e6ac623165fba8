//! Scene render pipeline: prompt -> generated code -> safety gate ->
//! bounded rewrite -> sandboxed render -> persisted scene state.
//!
//! [`ScenePipeline::render_scene`] is the single entry point. Collaborators
//! are injected through [`SceneStore`], [`SceneRenderer`] and
//! [`scenecast_llm::CodeGenerator`] so tests can run without a database,
//! the render tool or the network.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod renderer;
pub mod store;
pub mod synthesizer;

pub use config::PipelineConfig;
pub use error::{PipelineError, StoreError};
pub use lifecycle::ScenePipeline;
pub use renderer::{RenderedScene, SceneRenderer, ToolRenderer};
pub use store::{Completion, MemorySceneStore, PgSceneStore, SceneStore};
pub use synthesizer::{CodeSynthesizer, Synthesis};
