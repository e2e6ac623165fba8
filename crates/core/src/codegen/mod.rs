//! Preparation of model-generated scene code for the renderer.
//!
//! [`prepare`] chains the stages in their fixed order:
//! normalize, validate, then (only for safe code) balance brackets and
//! bound execution. Every stage reports what it changed as a diagnostic.

pub mod balance;
pub(crate) mod lexer;
pub mod normalize;
pub mod rewrite;
pub mod safety;
pub mod templates;

pub use balance::{balance_parentheses, bracket_mismatches, BalanceOutcome};
pub use normalize::{normalize, scene_class_name, NormalizedCode};
pub use rewrite::{bound_execution, has_unbounded_loop, BoundOutcome, BoundingPolicy};
pub use safety::{is_safe, validate, SafetyReport, SafetyViolation};

/// Candidate code after every preparation stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    /// Code to render (or, when unsafe, the normalized code that was rejected).
    pub source_code: String,
    pub is_safe: bool,
    pub diagnostics: Vec<String>,
    /// Scene class the render tool should be told to render.
    pub scene_class: Option<String>,
}

/// Turn a raw model answer into renderable code.
///
/// Unsafe candidates are returned as normalized, without the repair passes,
/// so the persisted code shows exactly what was rejected.
pub fn prepare(raw: &str, policy: &BoundingPolicy) -> GenerationResult {
    let normalized = normalize(raw);
    let mut diagnostics = normalized.notes;

    let report = validate(&normalized.code);
    if !report.is_safe() {
        diagnostics.extend(report.diagnostics());
        let scene_class = scene_class_name(&normalized.code);
        return GenerationResult {
            source_code: normalized.code,
            is_safe: false,
            diagnostics,
            scene_class,
        };
    }

    let balanced = balance_parentheses(&normalized.code);
    if balanced.changed() {
        diagnostics.push(format!(
            "bracket repair: removed {} stray closer(s), inserted {} missing closer(s)",
            balanced.removed, balanced.appended
        ));
    }
    diagnostics.extend(bracket_mismatches(&balanced.code));

    let bounded = bound_execution(&balanced.code, policy);
    if bounded.loops_bounded > 0 {
        diagnostics.push(format!(
            "bounded {} unconditional loop(s) to {} iterations",
            bounded.loops_bounded, policy.max_loop_iterations
        ));
    }
    if bounded.guards_inserted > 0 {
        diagnostics.push(format!(
            "inserted {} elapsed-time guard(s) at {:.1}s",
            bounded.guards_inserted,
            policy.time_budget.as_secs_f64()
        ));
    }

    let scene_class = scene_class_name(&bounded.code);
    GenerationResult {
        source_code: bounded.code,
        is_safe: true,
        diagnostics,
        scene_class,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
