//! Client for the text-generation service that writes scene code.
//!
//! The service speaks the OpenAI-compatible chat-completions protocol
//! (Groq by default). [`CodeGenerator`] is the seam the pipeline depends on;
//! [`ChatCompletionsClient`] is the HTTP implementation.

pub mod client;
pub mod error;
pub mod messages;
pub mod prompts;

pub use client::{ChatCompletionsClient, CodeGenerator};
pub use error::GenerationError;
pub use messages::{ChatMessage, ChatRequest, ChatRole};
pub use prompts::{refine_prompt, scene_request};
