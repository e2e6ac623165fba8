//! Instructions sent to the generation service.

use crate::client::CodeGenerator;
use crate::error::GenerationError;
use crate::messages::{ChatMessage, ChatRequest};

/// Token budget for prompt refinement.
pub const REFINE_MAX_TOKENS: u32 = 200;

/// Sampling temperature for prompt refinement.
pub const REFINE_TEMPERATURE: f32 = 0.7;

/// System instructions for scene code generation.
pub const SCENE_SYSTEM_PROMPT: &str = "\
You are an expert in Manim, a Python library for creating mathematical animations.
Your task is to generate Manim code based on the user's description of an animation.
The code should be complete and runnable and define a Scene class that Manim can render.
The animation should not be too complex and should render within a reasonable time.

IMPORTANT RULES:
1. Ensure the Python code is syntactically correct with matching parentheses, brackets and indentation.
2. Verify that every self.play() call has balanced parentheses.
3. Do not include any markdown formatting in the code.
4. Do NOT include an 'if __name__ == \"__main__\"' block or any code that renders the scene.
5. Define a single class that inherits from Scene.
6. Put all animation code inside the construct method.
7. Use only standard Manim objects and methods.
8. Do not import any library besides manim. Never touch files, processes or the network.
9. Never write unbounded loops such as `while True`.";

/// System instructions for prompt refinement.
pub const REFINE_SYSTEM_PROMPT: &str = "\
You are an expert at writing prompts for Manim code generation. Follow these rules:
1. Be extremely specific about dimensions, colors, and timing.
2. Include exact numerical values for positions, sizes, and durations.
3. Specify the exact number of objects and their properties.
4. Avoid vague descriptions like 'slightly' or 'about'.
5. Answer with a single paragraph without any introductory text.
6. Do not include any explanations or commentary.";

/// Build the code-generation request for a scene prompt.
pub fn scene_request(prompt: &str, max_tokens: u32, temperature: f32) -> ChatRequest {
    let user = format!(
        "Create a Manim animation for: {}. Make it visually appealing and professional. \
         Include helpful comments in the code that explain what each section does.",
        prompt.trim()
    );
    ChatRequest {
        messages: vec![ChatMessage::system(SCENE_SYSTEM_PROMPT), ChatMessage::user(user)],
        max_tokens,
        temperature,
    }
}

/// Build the refinement request. A blank `prompt` asks for a fresh one
/// based on the project title.
pub fn refine_request(project_title: &str, prompt: &str) -> ChatRequest {
    let user = if prompt.trim().is_empty() {
        format!(
            "Generate a creative Manim animation prompt for a project titled: '{}'. \
             The prompt should be clear and suitable for AI code generation.",
            project_title.trim()
        )
    } else {
        format!(
            "Refine this animation prompt so it is clear, concise, and compatible with Manim: {}",
            prompt.trim()
        )
    };
    ChatRequest {
        messages: vec![ChatMessage::system(REFINE_SYSTEM_PROMPT), ChatMessage::user(user)],
        max_tokens: REFINE_MAX_TOKENS,
        temperature: REFINE_TEMPERATURE,
    }
}

/// Refine a scene prompt, or draft one from the project title when blank.
pub async fn refine_prompt(
    generator: &dyn CodeGenerator,
    project_title: &str,
    prompt: &str,
) -> Result<String, GenerationError> {
    let text = generator
        .complete(&refine_request(project_title, prompt))
        .await?;
    Ok(text.trim().to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::messages::ChatRole;

    /// Records the last request and answers with a fixed reply.
    struct Recording {
        reply: &'static str,
        last: Mutex<Option<ChatRequest>>,
    }

    #[async_trait]
    impl CodeGenerator for Recording {
        async fn complete(&self, request: &ChatRequest) -> Result<String, GenerationError> {
            *self.last.lock().unwrap() = Some(request.clone());
            Ok(self.reply.to_string())
        }
    }

    fn recording(reply: &'static str) -> Recording {
        Recording {
            reply,
            last: Mutex::new(None),
        }
    }

    #[test]
    fn scene_request_carries_prompt_and_budget() {
        let req = scene_request("  a red ball bouncing 3 times ", 1000, 0.7);
        assert_eq!(req.max_tokens, 1000);
        assert_eq!(req.messages[0].role, ChatRole::System);
        assert!(req.messages[1]
            .content
            .starts_with("Create a Manim animation for: a red ball bouncing 3 times."));
    }

    #[tokio::test]
    async fn refine_uses_existing_prompt() {
        let generator = recording("  A red circle of radius 1 bounces 3 times.\n");
        let refined = refine_prompt(&generator, "Physics", "ball bounce").await.unwrap();

        assert_eq!(refined, "A red circle of radius 1 bounces 3 times.");
        let sent = generator.last.lock().unwrap().clone().unwrap();
        assert_eq!(sent.max_tokens, REFINE_MAX_TOKENS);
        assert!(sent.messages[1].content.ends_with("ball bounce"));
    }

    #[tokio::test]
    async fn blank_prompt_drafts_from_title() {
        let generator = recording("Draw the unit circle.");
        refine_prompt(&generator, "Trigonometry 101", "   ").await.unwrap();

        let sent = generator.last.lock().unwrap().clone().unwrap();
        assert!(sent.messages[1].content.contains("'Trigonometry 101'"));
    }
}
