//! Domain logic for the scene rendering pipeline.
//!
//! Everything in this crate is free of database access: code preparation
//! (normalize, validate, rewrite), the render executor that drives the
//! external animation tool, and the scene status machine.

pub mod codegen;
pub mod error;
pub mod render;
pub mod scene_status;
pub mod types;
