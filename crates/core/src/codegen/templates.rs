//! Canned scene sources substituted when generation yields nothing usable.
//!
//! Both templates are plain manim scenes with no imports beyond the
//! required one, so they always pass the safety validator.

/// Class name of [`FALLBACK_TEMPLATE`].
pub const FALLBACK_CLASS_NAME: &str = "FallbackScene";

/// Class name of [`PLACEHOLDER_TEMPLATE`].
pub const PLACEHOLDER_CLASS_NAME: &str = "GeneratedScene";

/// Used when the generation service is unreachable or misconfigured.
pub const FALLBACK_TEMPLATE: &str = r#"from manim import *

class FallbackScene(Scene):
    def construct(self):
        title = Text("Generation Service Unavailable", font_size=42, color=RED)
        title.to_edge(UP)

        message = Text("The animation could not be generated right now.", font_size=28)
        message.next_to(title, DOWN, buff=1)

        self.play(Write(title))
        self.wait(0.5)
        self.play(FadeIn(message))
        self.wait(2)
"#;

/// Used when the model answered but no scene class could be recognised.
pub const PLACEHOLDER_TEMPLATE: &str = r#"from manim import *

class GeneratedScene(Scene):
    def construct(self):
        title = Text("Animation Could Not Be Generated", font_size=42)
        title.to_edge(UP)

        message = Text("The prompt could not be processed correctly.", font_size=28)
        message.next_to(title, DOWN, buff=1)

        suggestion = Text("Try a different prompt with clearer instructions.", font_size=24)
        suggestion.next_to(message, DOWN, buff=0.5)

        self.play(Write(title))
        self.wait(0.5)
        self.play(FadeIn(message))
        self.wait(0.5)
        self.play(FadeIn(suggestion))
        self.wait(2)
"#;
