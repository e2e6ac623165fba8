//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod render_artifact_repo;
pub mod scene_repo;

pub use render_artifact_repo::RenderArtifactRepo;
pub use scene_repo::SceneRepo;
