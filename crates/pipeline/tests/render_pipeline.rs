//! End-to-end runs of the scene pipeline against the in-memory store.
//!
//! Generation is stubbed; rendering is either a scripted fake or the real
//! executor driving small bash scripts in place of manim and ffprobe.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use scenecast_core::codegen::has_unbounded_loop;
use scenecast_core::codegen::templates::FALLBACK_CLASS_NAME;
use scenecast_core::render::RenderError;
use scenecast_core::scene_status::SceneStatus;
use scenecast_core::types::DbId;
use scenecast_db::models::scene::{CreateScene, Scene};
use scenecast_llm::{ChatCompletionsClient, ChatRequest, CodeGenerator, GenerationError};
use scenecast_pipeline::{
    MemorySceneStore, PipelineConfig, RenderedScene, SceneRenderer, ScenePipeline,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const BOUNCING_BALL: &str = r#"Here is your animation:

```python
from manim import *

class BouncingBall(Scene):
    def construct(self):
        ball = Circle(color=RED)
        self.play(Create(ball))
        for i in range(3):
            self.play(ball.animate.shift(UP))
            self.play(ball.animate.shift(DOWN))
```
"#;

const IMPORTS_OS: &str = "```python\nimport os\nfrom manim import *\n\nclass Sneaky(Scene):\n    def construct(self):\n        os.system('rm -rf /')\n        self.play(Create(Circle()))\n```";

const SPINS_FOREVER: &str = "from manim import *\n\nclass Spinner(Scene):\n    def construct(self):\n        square = Square()\n        while True:\n            self.play(Rotate(square, PI / 2))\n";

/// Answers with each scripted text in turn, repeating the last one.
struct ScriptedGenerator {
    answers: Mutex<VecDeque<String>>,
}

impl ScriptedGenerator {
    fn new(answers: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.iter().map(|a| a.to_string()).collect()),
        })
    }
}

#[async_trait]
impl CodeGenerator for ScriptedGenerator {
    async fn complete(&self, _request: &ChatRequest) -> Result<String, GenerationError> {
        let mut answers = self.answers.lock().unwrap();
        let answer = if answers.len() > 1 {
            answers.pop_front()
        } else {
            answers.front().cloned()
        };
        answer.ok_or_else(|| GenerationError::InvalidResponse("no scripted answer".into()))
    }
}

/// Records every call and replays scripted outcomes; succeeds once the script runs out.
#[derive(Default)]
struct FakeRenderer {
    calls: AtomicUsize,
    codes: Mutex<Vec<String>>,
    classes: Mutex<Vec<Option<String>>>,
    outcomes: Mutex<VecDeque<Result<f64, RenderError>>>,
}

impl FakeRenderer {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn failing_with(err: RenderError) -> Arc<Self> {
        let renderer = Self::default();
        renderer.outcomes.lock().unwrap().push_back(Err(err));
        Arc::new(renderer)
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_code(&self) -> String {
        self.codes.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl SceneRenderer for FakeRenderer {
    async fn render(
        &self,
        code: &str,
        scene_id: DbId,
        scene_class: Option<&str>,
    ) -> Result<RenderedScene, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.codes.lock().unwrap().push(code.to_string());
        self.classes
            .lock()
            .unwrap()
            .push(scene_class.map(str::to_string));
        let outcome = self.outcomes.lock().unwrap().pop_front().unwrap_or(Ok(1.5));
        outcome.map(|duration_secs| RenderedScene {
            file_path: PathBuf::from(format!("media/videos/{scene_id}.mp4")),
            duration_secs,
        })
    }
}

fn pipeline(
    store: &Arc<MemorySceneStore>,
    generator: Arc<dyn CodeGenerator>,
    renderer: Arc<dyn SceneRenderer>,
) -> ScenePipeline {
    ScenePipeline::new(PipelineConfig::default(), store.clone(), generator, renderer)
}

fn new_scene(store: &MemorySceneStore, prompt: &str) -> Scene {
    store.insert(&CreateScene {
        project_id: 1,
        prompt: prompt.to_string(),
        sort_order: None,
    })
}

fn status_of(store: &MemorySceneStore, id: DbId) -> SceneStatus {
    store.scene(id).unwrap().status().unwrap()
}

fn code_of(store: &MemorySceneStore, id: DbId) -> String {
    store.scene(id).unwrap().code.unwrap_or_default()
}

fn write_script(dir: &Path, name: &str, body: &str) -> Vec<String> {
    let path = dir.join(name);
    std::fs::write(&path, body).expect("write script");
    vec!["bash".to_string(), path.to_string_lossy().to_string()]
}

// ---------------------------------------------------------------------------
// Safety gate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn denylisted_import_never_reaches_the_renderer() {
    let store = Arc::new(MemorySceneStore::new());
    let renderer = FakeRenderer::new();
    let pipeline = pipeline(&store, ScriptedGenerator::new(&[IMPORTS_OS]), renderer.clone());
    let scene = new_scene(&store, "delete everything");

    pipeline.render_scene(scene.id).await;

    assert_eq!(renderer.calls(), 0);
    assert_eq!(status_of(&store, scene.id), SceneStatus::Failed);
    let code = code_of(&store, scene.id);
    assert!(code.contains("import os"), "{code}");
    assert!(code.contains("# Error: unsafe code rejected"), "{code}");
    assert!(code.contains("denied module `os`"), "{code}");
    assert!(store.artifact(scene.id).is_none());
}

// ---------------------------------------------------------------------------
// Generation fallback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unreachable_service_renders_the_fallback_template() {
    let store = Arc::new(MemorySceneStore::new());
    let renderer = FakeRenderer::new();
    let generator = Arc::new(ChatCompletionsClient::new(
        "http://127.0.0.1:9/v1/chat/completions",
        "test-key",
        "test-model",
        Duration::from_secs(2),
    ));
    let pipeline = pipeline(&store, generator, renderer.clone());
    let scene = new_scene(&store, "a red ball");

    pipeline.render_scene(scene.id).await;

    assert_eq!(status_of(&store, scene.id), SceneStatus::Completed);
    assert!(code_of(&store, scene.id).contains(FALLBACK_CLASS_NAME));
    assert_eq!(
        renderer.classes.lock().unwrap().as_slice(),
        &[Some(FALLBACK_CLASS_NAME.to_string())]
    );
}

#[tokio::test]
async fn unconfigured_service_fails_with_fallback_code_when_render_fails() {
    let store = Arc::new(MemorySceneStore::new());
    let renderer = FakeRenderer::failing_with(RenderError::ProcessFailed {
        exit_code: 1,
        stderr: "LaTeX not installed".into(),
    });
    let pipeline = ScenePipeline::new(
        PipelineConfig::default(),
        store.clone(),
        Arc::new(PipelineConfig::default().generation_client()),
        renderer.clone(),
    );
    let scene = new_scene(&store, "a red ball");

    pipeline.render_scene(scene.id).await;

    assert_eq!(status_of(&store, scene.id), SceneStatus::Failed);
    let code = code_of(&store, scene.id);
    assert!(code.contains(FALLBACK_CLASS_NAME), "{code}");
    assert!(
        code.contains("# Error: renderer exited with code 1: LaTeX not installed"),
        "{code}"
    );
}

// ---------------------------------------------------------------------------
// Bounded execution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unbounded_loop_is_rewritten_before_render() {
    let store = Arc::new(MemorySceneStore::new());
    let renderer = FakeRenderer::new();
    let pipeline = pipeline(&store, ScriptedGenerator::new(&[SPINS_FOREVER]), renderer.clone());
    let scene = new_scene(&store, "a spinning square");

    pipeline.render_scene(scene.id).await;

    assert_eq!(renderer.calls(), 1);
    let rendered = renderer.last_code();
    assert!(!has_unbounded_loop(&rendered), "{rendered}");
    assert!(rendered.contains("for _ in range(5):"), "{rendered}");
    assert!(rendered.contains("import time as _guard_time"), "{rendered}");
    assert!(rendered.contains("> 290.0: return"), "{rendered}");
    assert_eq!(code_of(&store, scene.id), rendered);
    assert_eq!(status_of(&store, scene.id), SceneStatus::Completed);
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn render_timeout_marks_scene_failed() {
    let store = Arc::new(MemorySceneStore::new());
    let renderer = FakeRenderer::failing_with(RenderError::Timeout { elapsed_ms: 300_000 });
    let pipeline = pipeline(&store, ScriptedGenerator::new(&[BOUNCING_BALL]), renderer.clone());
    let scene = new_scene(&store, "a red ball bouncing 3 times");

    pipeline.render_scene(scene.id).await;

    assert_eq!(status_of(&store, scene.id), SceneStatus::Failed);
    let code = code_of(&store, scene.id);
    assert!(code.contains("class BouncingBall(Scene):"), "{code}");
    assert!(code.ends_with("# Error: render timed out after 300000 ms"), "{code}");
}

#[tokio::test]
async fn every_outcome_is_terminal() {
    let cases: Vec<(&str, Option<RenderError>)> = vec![
        (BOUNCING_BALL, None),
        (BOUNCING_BALL, Some(RenderError::ArtifactMissing)),
        (IMPORTS_OS, None),
        ("I cannot help with that.", None),
        ("", Some(RenderError::EmptyCommand)),
        (SPINS_FOREVER, Some(RenderError::Timeout { elapsed_ms: 10 })),
    ];

    for (answer, render_err) in cases {
        let store = Arc::new(MemorySceneStore::new());
        let renderer = match render_err {
            Some(err) => FakeRenderer::failing_with(err),
            None => FakeRenderer::new(),
        };
        let pipeline = pipeline(&store, ScriptedGenerator::new(&[answer]), renderer);
        let scene = new_scene(&store, "anything");

        pipeline.render_scene(scene.id).await;

        let status = status_of(&store, scene.id);
        assert!(status.is_terminal(), "{answer:?} left scene {status:?}");
        assert!(store.scene(scene.id).unwrap().code.is_some());
        if status == SceneStatus::Completed {
            assert!(store.scene(scene.id).unwrap().artifact_url.is_some());
            assert!(store.artifact(scene.id).is_some());
        }
    }
}

#[tokio::test]
async fn trigger_on_non_pending_scene_is_ignored() {
    let store = Arc::new(MemorySceneStore::new());
    let renderer = FakeRenderer::new();
    let pipeline = pipeline(&store, ScriptedGenerator::new(&[BOUNCING_BALL]), renderer.clone());
    let scene = new_scene(&store, "a red ball");

    pipeline.render_scene(scene.id).await;
    let first = store.scene(scene.id).unwrap();
    pipeline.render_scene(scene.id).await;

    assert_eq!(renderer.calls(), 1);
    let second = store.scene(scene.id).unwrap();
    assert_eq!(second.status().unwrap(), SceneStatus::Completed);
    assert_eq!(second.updated_at, first.updated_at);

    // Unknown ids are logged and dropped.
    pipeline.render_scene(scene.id + 100).await;
    assert_eq!(renderer.calls(), 1);
}

#[tokio::test]
async fn rerender_after_reset_overwrites_code_and_artifact() {
    let store = Arc::new(MemorySceneStore::new());
    let renderer = FakeRenderer::failing_with(RenderError::ProcessFailed {
        exit_code: 1,
        stderr: "NameError: Circl".into(),
    });
    renderer.outcomes.lock().unwrap().push_back(Ok(4.0));
    let generator = ScriptedGenerator::new(&[BOUNCING_BALL, SPINS_FOREVER]);
    let pipeline = pipeline(&store, generator, renderer.clone());
    let scene = new_scene(&store, "a red ball");

    pipeline.render_scene(scene.id).await;
    assert_eq!(status_of(&store, scene.id), SceneStatus::Failed);

    let reset = store
        .reset_to_pending(scene.id, Some("a spinning square"))
        .expect("failed scene can be reset");
    assert_eq!(reset.status().unwrap(), SceneStatus::Pending);

    pipeline.render_scene(scene.id).await;

    assert_eq!(status_of(&store, scene.id), SceneStatus::Completed);
    let code = code_of(&store, scene.id);
    assert!(code.contains("class Spinner(Scene):"), "{code}");
    assert!(!code.contains("BouncingBall"), "{code}");
    assert!(!code.contains("# Error"), "{code}");
    let artifact = store.artifact(scene.id).unwrap();
    assert_eq!(artifact.duration_secs, 4.0);
    assert_eq!(
        store.scene(scene.id).unwrap().artifact_url.as_deref(),
        Some(format!("/media/videos/{}.mp4", scene.id).as_str())
    );
}

#[tokio::test]
async fn spawned_render_completes_off_the_calling_task() {
    let store = Arc::new(MemorySceneStore::new());
    let pipeline = Arc::new(pipeline(
        &store,
        ScriptedGenerator::new(&[BOUNCING_BALL]),
        FakeRenderer::new(),
    ));
    let scene = new_scene(&store, "a red ball");

    let handle = pipeline.spawn_render(scene.id);
    assert_matches!(handle.await, Ok(()));
    assert_eq!(status_of(&store, scene.id), SceneStatus::Completed);
}

// ---------------------------------------------------------------------------
// Real executor with stand-in tools
// ---------------------------------------------------------------------------

const FAKE_MANIM: &str = r#"
while [ $# -gt 0 ]; do
  case "$1" in
    --media_dir) media="$2"; shift 2 ;;
    -o) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
target="$media/videos/scene/480p15"
mkdir -p "$target"
printf 'video' > "$target/$out"
"#;

const FAKE_FFPROBE: &str = r#"echo '{"streams":[{"codec_type":"video","duration":"2.9"}],"format":{"duration":"3.0"}}'"#;

fn tool_config(root: &Path, manim: &str, ffprobe: &str, timeout: Duration) -> PipelineConfig {
    let bin = root.join("bin");
    std::fs::create_dir_all(&bin).expect("mkdir");
    PipelineConfig {
        render_command: write_script(&bin, "manim.sh", manim),
        probe_command: write_script(&bin, "ffprobe.sh", ffprobe),
        media_root: root.join("media"),
        scratch_dir: Some(root.join("scratch")),
        animation_timeout: timeout,
        ..PipelineConfig::default()
    }
}

#[tokio::test]
async fn bouncing_ball_renders_to_completion() {
    let root = tempfile::tempdir().expect("tempdir");
    let config = tool_config(root.path(), FAKE_MANIM, FAKE_FFPROBE, Duration::from_secs(30));
    let store = Arc::new(MemorySceneStore::new());
    let pipeline = ScenePipeline::new(
        config.clone(),
        store.clone(),
        ScriptedGenerator::new(&[BOUNCING_BALL]),
        Arc::new(scenecast_pipeline::ToolRenderer::new(
            config.render_settings(),
            config.probe_command.clone(),
            config.probe_timeout,
        )),
    );
    let scene = new_scene(&store, "a red ball bouncing 3 times");

    pipeline.render_scene(scene.id).await;

    let saved = store.scene(scene.id).unwrap();
    assert_eq!(saved.status().unwrap(), SceneStatus::Completed);
    assert_eq!(
        saved.artifact_url.as_deref(),
        Some(format!("/media/videos/{}.mp4", scene.id).as_str())
    );
    let artifact = store.artifact(scene.id).unwrap();
    assert!(artifact.duration_secs > 0.0);
    assert_eq!(artifact.duration_secs, 3.0);
    let on_disk = config.output_dir().join(format!("{}.mp4", scene.id));
    assert_eq!(artifact.file_path, on_disk.display().to_string());
    assert!(on_disk.exists());
    let scratch_left = std::fs::read_dir(root.path().join("scratch"))
        .expect("scratch dir")
        .count();
    assert_eq!(scratch_left, 0);
}

#[tokio::test]
async fn probe_failure_keeps_the_artifact_with_zero_duration() {
    let root = tempfile::tempdir().expect("tempdir");
    let config = tool_config(root.path(), FAKE_MANIM, "exit 3\n", Duration::from_secs(30));
    let store = Arc::new(MemorySceneStore::new());
    let renderer = Arc::new(scenecast_pipeline::ToolRenderer::new(
        config.render_settings(),
        config.probe_command.clone(),
        config.probe_timeout,
    ));
    let pipeline = ScenePipeline::new(
        config,
        store.clone(),
        ScriptedGenerator::new(&[BOUNCING_BALL]),
        renderer,
    );
    let scene = new_scene(&store, "a red ball");

    pipeline.render_scene(scene.id).await;

    assert_eq!(status_of(&store, scene.id), SceneStatus::Completed);
    assert_eq!(store.artifact(scene.id).unwrap().duration_secs, 0.0);
}

#[tokio::test]
async fn hung_duration_tool_is_cut_off_and_scene_completes() {
    let root = tempfile::tempdir().expect("tempdir");
    let mut config = tool_config(root.path(), FAKE_MANIM, "sleep 30\n", Duration::from_secs(30));
    config.probe_timeout = Duration::from_millis(500);
    let store = Arc::new(MemorySceneStore::new());
    let renderer = Arc::new(scenecast_pipeline::ToolRenderer::new(
        config.render_settings(),
        config.probe_command.clone(),
        config.probe_timeout,
    ));
    let pipeline = ScenePipeline::new(
        config,
        store.clone(),
        ScriptedGenerator::new(&[BOUNCING_BALL]),
        renderer,
    );
    let scene = new_scene(&store, "a red ball");

    let start = std::time::Instant::now();
    pipeline.render_scene(scene.id).await;

    assert!(start.elapsed() < Duration::from_secs(10));
    assert_eq!(status_of(&store, scene.id), SceneStatus::Completed);
    assert_eq!(store.artifact(scene.id).unwrap().duration_secs, 0.0);
}

#[tokio::test]
async fn hung_renderer_is_killed_and_scene_fails() {
    let root = tempfile::tempdir().expect("tempdir");
    let config = tool_config(root.path(), "sleep 30\n", FAKE_FFPROBE, Duration::from_secs(1));
    let store = Arc::new(MemorySceneStore::new());
    let pipeline = ScenePipeline::from_config(config, store.clone());
    let scene = new_scene(&store, "a red ball");

    let started = std::time::Instant::now();
    pipeline.render_scene(scene.id).await;

    assert!(started.elapsed() < Duration::from_secs(15));
    assert_eq!(status_of(&store, scene.id), SceneStatus::Failed);
    let code = code_of(&store, scene.id);
    assert!(code.contains(FALLBACK_CLASS_NAME), "{code}");
    assert!(code.contains("# Error: render timed out after"), "{code}");
}
