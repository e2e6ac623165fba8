use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use scenecast_core::codegen::BoundingPolicy;
use scenecast_core::render::{RenderQuality, RenderSettings, DEFAULT_PROBE_TIMEOUT};
use scenecast_llm::client::{DEFAULT_API_URL, DEFAULT_MODEL};
use scenecast_llm::ChatCompletionsClient;

const DEFAULT_MAX_TOKENS: u32 = 1000;
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 30;
const DEFAULT_ANIMATION_TIMEOUT_SECS: u64 = 300;
const DEFAULT_GUARD_MARGIN_SECS: u64 = 10;
const DEFAULT_MAX_LOOP_ITERATIONS: u32 = 5;
const DEFAULT_RENDER_COMMAND: &str = "manim";
const DEFAULT_PROBE_COMMAND: &str = "ffprobe";
const DEFAULT_MEDIA_ROOT: &str = "./media";
const DEFAULT_MEDIA_URL_PREFIX: &str = "/media/videos";

/// Render pipeline configuration, passed explicitly into [`crate::ScenePipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub generation_api_url: String,
    /// Empty means "not configured": every run uses the fallback template.
    pub generation_api_key: String,
    pub generation_model: String,
    pub generation_max_tokens: u32,
    pub generation_temperature: f32,
    pub generation_timeout: Duration,
    /// Hard limit on one renderer run.
    pub animation_timeout: Duration,
    /// Head-room between the in-code guard deadline and the hard kill.
    pub guard_margin: Duration,
    pub max_loop_iterations: u32,
    /// Renderer program followed by leading arguments.
    pub render_command: Vec<String>,
    pub render_quality: RenderQuality,
    pub probe_command: Vec<String>,
    /// Limit on one duration measurement.
    pub probe_timeout: Duration,
    /// Artifacts are stored under `<media_root>/videos`.
    pub media_root: PathBuf,
    /// URL prefix the artifact file name is appended to.
    pub media_url_prefix: String,
    /// Parent of per-run scratch directories; system temp dir when `None`.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// Unparsable values fall back to the default.
    ///
    /// | Env Var                       | Default                                           |
    /// |-------------------------------|---------------------------------------------------|
    /// | `GENERATION_API_URL`          | `https://api.groq.com/openai/v1/chat/completions` |
    /// | `GENERATION_API_KEY`          | empty                                             |
    /// | `GENERATION_MODEL`            | `llama3-70b-8192`                                 |
    /// | `GENERATION_MAX_TOKENS`       | `1000`                                            |
    /// | `GENERATION_TEMPERATURE`      | `0.7`                                             |
    /// | `GENERATION_TIMEOUT_SECS`     | `30`                                              |
    /// | `ANIMATION_TIMEOUT`           | `300`                                             |
    /// | `ANIMATION_GUARD_MARGIN_SECS` | `10`                                              |
    /// | `MAX_LOOP_ITERATIONS`         | `5`                                               |
    /// | `RENDER_COMMAND`              | `manim`                                           |
    /// | `RENDER_QUALITY`              | `l`                                               |
    /// | `PROBE_COMMAND`               | `ffprobe`                                         |
    /// | `PROBE_TIMEOUT_SECS`          | `10`                                              |
    /// | `MEDIA_ROOT`                  | `./media`                                         |
    /// | `MEDIA_URL_PREFIX`            | `/media/videos`                                   |
    /// | `RENDER_SCRATCH_DIR`          | system temp dir                                   |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment, or a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let command = |key: &str, default: &str| -> Vec<String> {
            text(key, default)
                .split_whitespace()
                .map(str::to_string)
                .collect()
        };

        Self {
            generation_api_url: text("GENERATION_API_URL", DEFAULT_API_URL),
            generation_api_key: lookup("GENERATION_API_KEY").unwrap_or_default(),
            generation_model: text("GENERATION_MODEL", DEFAULT_MODEL),
            generation_max_tokens: parsed(&lookup, "GENERATION_MAX_TOKENS", DEFAULT_MAX_TOKENS),
            generation_temperature: parsed(&lookup, "GENERATION_TEMPERATURE", DEFAULT_TEMPERATURE),
            generation_timeout: Duration::from_secs(parsed(
                &lookup,
                "GENERATION_TIMEOUT_SECS",
                DEFAULT_GENERATION_TIMEOUT_SECS,
            )),
            animation_timeout: Duration::from_secs(parsed(
                &lookup,
                "ANIMATION_TIMEOUT",
                DEFAULT_ANIMATION_TIMEOUT_SECS,
            )),
            guard_margin: Duration::from_secs(parsed(
                &lookup,
                "ANIMATION_GUARD_MARGIN_SECS",
                DEFAULT_GUARD_MARGIN_SECS,
            )),
            max_loop_iterations: parsed(&lookup, "MAX_LOOP_ITERATIONS", DEFAULT_MAX_LOOP_ITERATIONS),
            render_command: command("RENDER_COMMAND", DEFAULT_RENDER_COMMAND),
            render_quality: parsed(&lookup, "RENDER_QUALITY", RenderQuality::Low),
            probe_command: command("PROBE_COMMAND", DEFAULT_PROBE_COMMAND),
            probe_timeout: Duration::from_secs(parsed(
                &lookup,
                "PROBE_TIMEOUT_SECS",
                DEFAULT_PROBE_TIMEOUT.as_secs(),
            )),
            media_root: PathBuf::from(text("MEDIA_ROOT", DEFAULT_MEDIA_ROOT)),
            media_url_prefix: text("MEDIA_URL_PREFIX", DEFAULT_MEDIA_URL_PREFIX),
            scratch_dir: lookup("RENDER_SCRATCH_DIR")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    /// Directory finished artifacts are moved into.
    pub fn output_dir(&self) -> PathBuf {
        self.media_root.join("videos")
    }

    pub fn bounding_policy(&self) -> BoundingPolicy {
        BoundingPolicy::new(
            self.max_loop_iterations,
            self.animation_timeout,
            self.guard_margin,
        )
    }

    pub fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            command: self.render_command.clone(),
            quality: self.render_quality,
            timeout: self.animation_timeout,
            output_dir: self.output_dir(),
            scratch_dir: self.scratch_dir.clone(),
        }
    }

    pub fn generation_client(&self) -> ChatCompletionsClient {
        ChatCompletionsClient::new(
            &self.generation_api_url,
            &self.generation_api_key,
            &self.generation_model,
            self.generation_timeout,
        )
    }

    /// Public URL of an artifact file.
    pub fn artifact_url(&self, file_name: &str) -> String {
        format!("{}/{file_name}", self.media_url_prefix.trim_end_matches('/'))
    }
}

fn parsed<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
