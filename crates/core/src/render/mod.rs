//! External render tool integration: process execution, the render
//! executor, and the duration probe.

pub mod executor;
pub mod probe;
pub mod subprocess;

pub use executor::{RenderError, RenderExecutor, RenderQuality, RenderSettings, RenderedArtifact};
pub use probe::{probe_duration, ProbeError, DEFAULT_PROBE_TIMEOUT};
pub use subprocess::{run_in_process_group, ProcessError, ProcessOutput};
