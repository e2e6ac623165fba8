//! Scene lifecycle states and the transitions allowed between them.
//!
//! Status IDs must match the seed data in
//! `db/migrations/20260301000001_create_scene_statuses_table.sql`.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Persisted status identifier (`SMALLINT` in the database).
pub type StatusId = i16;

/// Marker written to the code field when a run failed before any code existed.
pub const GENERATION_FAILED_MARKER: &str = "# Code generation failed before any source was produced.";

/// Lifecycle state of a scene.
///
/// `Pending` is set by the API layer on create or regeneration; the pipeline
/// owns `Processing` and both terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SceneStatus {
    /// Database identifier for this status.
    pub fn id(self) -> StatusId {
        match self {
            SceneStatus::Pending => 1,
            SceneStatus::Processing => 2,
            SceneStatus::Completed => 3,
            SceneStatus::Failed => 4,
        }
    }

    /// Resolve a database identifier back into a status.
    pub fn from_id(id: StatusId) -> Result<Self, CoreError> {
        match id {
            1 => Ok(SceneStatus::Pending),
            2 => Ok(SceneStatus::Processing),
            3 => Ok(SceneStatus::Completed),
            4 => Ok(SceneStatus::Failed),
            other => Err(CoreError::Validation(format!(
                "Unknown scene status id: {other}"
            ))),
        }
    }

    /// Lowercase name, matching the `scene_statuses.name` seed rows.
    pub fn as_str(self) -> &'static str {
        match self {
            SceneStatus::Pending => "pending",
            SceneStatus::Processing => "processing",
            SceneStatus::Completed => "completed",
            SceneStatus::Failed => "failed",
        }
    }

    /// Whether the scene has reached a state the pipeline will not leave on its own.
    pub fn is_terminal(self) -> bool {
        matches!(self, SceneStatus::Completed | SceneStatus::Failed)
    }

    /// Whether `self -> next` is a valid lifecycle edge.
    ///
    /// `Completed -> Pending` is the explicit regeneration path; there is no
    /// direct edge back into `Processing` from a terminal state.
    pub fn can_transition_to(self, next: SceneStatus) -> bool {
        matches!(
            (self, next),
            (SceneStatus::Pending, SceneStatus::Processing)
                | (SceneStatus::Processing, SceneStatus::Completed)
                | (SceneStatus::Processing, SceneStatus::Failed)
                | (SceneStatus::Failed, SceneStatus::Pending)
                | (SceneStatus::Completed, SceneStatus::Pending)
        )
    }

    /// Validate a transition, returning the new status on success.
    pub fn transition(self, next: SceneStatus) -> Result<SceneStatus, CoreError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidTransition {
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }
}

/// Build the code field persisted for a failed scene.
///
/// The last code seen (or [`GENERATION_FAILED_MARKER`]) is followed by a blank
/// line and the diagnostic. Every diagnostic line is prefixed with `# ` so the
/// stored text remains a valid source unit.
pub fn annotate_failure(code: Option<&str>, diagnostic: &str) -> String {
    let body = match code {
        Some(code) if !code.trim().is_empty() => code.trim_end(),
        _ => GENERATION_FAILED_MARKER,
    };

    let mut lines = diagnostic.trim().lines();
    let first = lines.next().unwrap_or("unknown failure");
    let mut annotation = format!("# Error: {first}");
    for line in lines {
        annotation.push_str("\n# ");
        annotation.push_str(line);
    }

    format!("{body}\n\n{annotation}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [SceneStatus; 4] = [
        SceneStatus::Pending,
        SceneStatus::Processing,
        SceneStatus::Completed,
        SceneStatus::Failed,
    ];

    #[test]
    fn ids_round_trip() {
        for status in ALL {
            assert_eq!(SceneStatus::from_id(status.id()).unwrap(), status);
        }
    }

    #[test]
    fn unknown_id_is_rejected() {
        assert!(matches!(
            SceneStatus::from_id(9),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn pipeline_edges_are_valid() {
        assert!(SceneStatus::Pending.can_transition_to(SceneStatus::Processing));
        assert!(SceneStatus::Processing.can_transition_to(SceneStatus::Completed));
        assert!(SceneStatus::Processing.can_transition_to(SceneStatus::Failed));
        assert!(SceneStatus::Failed.can_transition_to(SceneStatus::Pending));
        assert!(SceneStatus::Completed.can_transition_to(SceneStatus::Pending));
    }

    #[test]
    fn terminal_states_cannot_reenter_processing() {
        assert!(!SceneStatus::Completed.can_transition_to(SceneStatus::Processing));
        assert!(!SceneStatus::Failed.can_transition_to(SceneStatus::Processing));
        assert!(!SceneStatus::Pending.can_transition_to(SceneStatus::Completed));
        assert!(!SceneStatus::Processing.can_transition_to(SceneStatus::Processing));
    }

    #[test]
    fn transition_reports_both_ends() {
        let err = SceneStatus::Completed
            .transition(SceneStatus::Failed)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid status transition: completed -> failed"
        );
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        let terminal: Vec<_> = ALL.into_iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal, vec![SceneStatus::Completed, SceneStatus::Failed]);
    }

    #[test]
    fn annotate_appends_comment_trailer() {
        let out = annotate_failure(Some("from manim import *\n"), "render timed out");
        assert_eq!(out, "from manim import *\n\n# Error: render timed out");
    }

    #[test]
    fn annotate_comments_every_diagnostic_line() {
        let out = annotate_failure(Some("x = 1"), "Traceback:\n  File \"scene.py\"\nNameError");
        assert!(out.ends_with("# Error: Traceback:\n#   File \"scene.py\"\n# NameError"));
    }

    #[test]
    fn annotate_without_code_uses_marker() {
        let out = annotate_failure(None, "service down");
        assert!(out.starts_with(GENERATION_FAILED_MARKER));
        assert!(out.ends_with("# Error: service down"));

        let blank = annotate_failure(Some("   "), "service down");
        assert!(blank.starts_with(GENERATION_FAILED_MARKER));
    }
}
