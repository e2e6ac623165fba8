//! Code Synthesizer: prompt in, raw model text out, never an error.

use std::sync::Arc;

use scenecast_core::codegen::templates::FALLBACK_TEMPLATE;
use scenecast_llm::{scene_request, CodeGenerator};

use crate::error::PipelineError;

/// Raw candidate text for one run.
#[derive(Debug)]
pub struct Synthesis {
    pub raw: String,
    /// Why the fallback template was used, if it was.
    pub fallback_reason: Option<PipelineError>,
}

impl Synthesis {
    pub fn used_fallback(&self) -> bool {
        self.fallback_reason.is_some()
    }
}

/// Single-attempt generation with fallback substitution.
#[derive(Clone)]
pub struct CodeSynthesizer {
    generator: Arc<dyn CodeGenerator>,
    max_tokens: u32,
    temperature: f32,
}

impl CodeSynthesizer {
    pub fn new(generator: Arc<dyn CodeGenerator>, max_tokens: u32, temperature: f32) -> Self {
        Self {
            generator,
            max_tokens,
            temperature,
        }
    }

    /// Ask the generation service for scene code. Any failure yields the
    /// fallback template.
    pub async fn synthesize(&self, prompt: &str) -> Synthesis {
        let request = scene_request(prompt, self.max_tokens, self.temperature);
        match self.generator.complete(&request).await {
            Ok(raw) => Synthesis {
                raw,
                fallback_reason: None,
            },
            Err(e) => {
                let reason = PipelineError::GenerationUnavailable(e);
                tracing::warn!(stage = "generate", error = %reason, "Using fallback template");
                Synthesis {
                    raw: FALLBACK_TEMPLATE.to_string(),
                    fallback_reason: Some(reason),
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
