//! Background orchestrator for the scene render pipeline.
//!
//! Polls for `Pending` scenes and runs each one on its own task, at most one
//! run per scene id and at most `max_concurrent_renders` runs at a time.

pub mod config;
pub mod dispatcher;

pub use config::WorkerConfig;
pub use dispatcher::SceneDispatcher;
