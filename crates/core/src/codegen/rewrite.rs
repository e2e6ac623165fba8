//! Bounded-execution rewriter.
//!
//! Text-level heuristics applied before code reaches the renderer:
//!
//! - `while True:` / `while 1:` loops become `for _ in range(N):`;
//! - the start of `construct(self)` records a monotonic timestamp on `self`;
//! - every top-level `self.play(` statement is preceded by a guard that
//!   returns early once the elapsed time exceeds the render budget. The guard
//!   reads the timestamp with `getattr` and a fresh default, so a guard in
//!   `setup()` or any helper that runs before `construct` never fails.
//!
//! These are pattern rewrites over lines, not AST transforms, and can be
//! defeated by unusual formatting. The output is a fixed point: running the
//! rewriter again on its own output changes nothing.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use super::balance::indent_width;
use super::lexer::{bracket_delta, ScanState};

/// Default iteration cap for rewritten unbounded loops.
pub const DEFAULT_MAX_LOOP_ITERATIONS: u32 = 5;

/// Default renderer wall-clock budget (`ANIMATION_TIMEOUT`).
pub const DEFAULT_ANIMATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Default head-room between the guard deadline and the hard kill.
pub const DEFAULT_GUARD_MARGIN: Duration = Duration::from_secs(10);

/// Import added to code that receives guards.
pub const GUARD_IMPORT: &str = "import time as _guard_time";

/// Statement inserted at the top of `construct`.
pub const START_STATEMENT: &str = "self._render_started = _guard_time.monotonic()";

static WHILE_TRUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)while\s*\(?\s*(?:True|1)\s*\)?\s*:(.*)$").expect("valid regex")
});

static CONSTRUCT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*def\s+construct\s*\(\s*self\b[^)]*\)\s*(?:->\s*[^:]+)?:\s*(?:#.*)?$")
        .expect("valid regex")
});

/// Limits applied by [`bound_execution`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingPolicy {
    /// Iterations allowed for a rewritten `while True` loop.
    pub max_loop_iterations: u32,
    /// Elapsed time after which `construct` returns early.
    pub time_budget: Duration,
}

impl BoundingPolicy {
    /// Budget is `timeout - margin`, saturating at zero.
    pub fn new(max_loop_iterations: u32, timeout: Duration, margin: Duration) -> Self {
        Self {
            max_loop_iterations,
            time_budget: timeout.saturating_sub(margin),
        }
    }

    fn guard_statement(&self) -> String {
        format!(
            "if _guard_time.monotonic() - getattr(self, \"_render_started\", _guard_time.monotonic()) > {:.1}: return",
            self.time_budget.as_secs_f64()
        )
    }
}

impl Default for BoundingPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_LOOP_ITERATIONS,
            DEFAULT_ANIMATION_TIMEOUT,
            DEFAULT_GUARD_MARGIN,
        )
    }
}

/// Output of [`bound_execution`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundOutcome {
    pub code: String,
    pub loops_bounded: usize,
    pub guards_inserted: usize,
    pub start_markers_inserted: usize,
}

impl BoundOutcome {
    pub fn changed(&self) -> bool {
        self.loops_bounded + self.guards_inserted + self.start_markers_inserted > 0
    }
}

/// Apply loop bounding and elapsed-time guards to `code`.
pub fn bound_execution(code: &str, policy: &BoundingPolicy) -> BoundOutcome {
    let lines: Vec<&str> = code.lines().collect();
    let has_construct = lines.iter().any(|l| CONSTRUCT_RE.is_match(l));
    let guard = policy.guard_statement();

    let mut out: Vec<String> = Vec::with_capacity(lines.len() + 8);
    let mut state = ScanState::default();
    let mut depth = 0i32;
    let mut loops_bounded = 0;
    let mut guards_inserted = 0;
    let mut start_markers_inserted = 0;

    for (idx, line) in lines.iter().enumerate() {
        let at_statement_start = !state.in_string() && depth == 0;
        let mut current = (*line).to_string();

        if at_statement_start {
            if let Some(caps) = WHILE_TRUE_RE.captures(line) {
                current = format!(
                    "{}for _ in range({}):{}",
                    &caps[1], policy.max_loop_iterations, &caps[2]
                );
                loops_bounded += 1;
            } else if has_construct && line.trim_start().starts_with("self.play(") {
                let previous = out.iter().rev().find(|l| !l.trim().is_empty());
                if previous.map(|p| p.trim()) != Some(guard.as_str()) {
                    out.push(format!("{}{guard}", leading_whitespace(line)));
                    guards_inserted += 1;
                }
            }
        }

        depth = (depth + bracket_delta(line, &mut state)).max(0);
        out.push(current);

        if at_statement_start && CONSTRUCT_RE.is_match(line) {
            let next = lines[idx + 1..].iter().find(|l| !l.trim().is_empty());
            if next.map(|l| l.trim()) != Some(START_STATEMENT) {
                let body_indent = match next {
                    Some(l) if indent_width(l) > indent_width(line) => {
                        leading_whitespace(l).to_string()
                    }
                    _ => format!("{}    ", leading_whitespace(line)),
                };
                out.push(format!("{body_indent}{START_STATEMENT}"));
                start_markers_inserted += 1;
            }
        }
    }

    let needs_import = (guards_inserted > 0 || start_markers_inserted > 0)
        && !lines.iter().any(|l| l.trim() == GUARD_IMPORT);
    if needs_import {
        let at = out
            .iter()
            .position(|l| l.trim_start().starts_with("from manim import"))
            .map_or(0, |i| i + 1);
        out.insert(at, GUARD_IMPORT.to_string());
    }

    let outcome_code = if loops_bounded + guards_inserted + start_markers_inserted == 0 {
        code.to_string()
    } else {
        let mut joined = out.join("\n");
        if code.ends_with('\n') {
            joined.push('\n');
        }
        joined
    };

    BoundOutcome {
        code: outcome_code,
        loops_bounded,
        guards_inserted,
        start_markers_inserted,
    }
}

/// Whether any unbounded `while True`-style loop remains at statement level.
pub fn has_unbounded_loop(code: &str) -> bool {
    code.lines().any(|l| WHILE_TRUE_RE.is_match(l))
}

fn leading_whitespace(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const LOOP_FREE: &str = "from manim import *\n\nclass Ball(Scene):\n    def construct(self):\n        ball = Circle(color=RED)\n        self.play(Create(ball))\n        for _ in range(3):\n            self.play(ball.animate.shift(UP))\n            self.play(ball.animate.shift(DOWN))\n";

    const LOOP_FREE_BOUNDED: &str = "from manim import *\nimport time as _guard_time\n\nclass Ball(Scene):\n    def construct(self):\n        self._render_started = _guard_time.monotonic()\n        ball = Circle(color=RED)\n        if _guard_time.monotonic() - getattr(self, \"_render_started\", _guard_time.monotonic()) > 290.0: return\n        self.play(Create(ball))\n        for _ in range(3):\n            if _guard_time.monotonic() - getattr(self, \"_render_started\", _guard_time.monotonic()) > 290.0: return\n            self.play(ball.animate.shift(UP))\n            if _guard_time.monotonic() - getattr(self, \"_render_started\", _guard_time.monotonic()) > 290.0: return\n            self.play(ball.animate.shift(DOWN))\n";

    #[test]
    fn guards_and_start_marker_are_inserted() {
        let out = bound_execution(LOOP_FREE, &BoundingPolicy::default());
        assert_eq!(out.code, LOOP_FREE_BOUNDED);
        assert_eq!(out.guards_inserted, 3);
        assert_eq!(out.start_markers_inserted, 1);
        assert_eq!(out.loops_bounded, 0);
    }

    #[test]
    fn rewriting_is_idempotent() {
        let policy = BoundingPolicy::default();
        let once = bound_execution(LOOP_FREE, &policy);
        let twice = bound_execution(&once.code, &policy);
        assert_eq!(twice.code, once.code);
        assert!(!twice.changed());
    }

    #[test]
    fn while_true_becomes_bounded_for() {
        let code = "while True:\n    x += 1\n";
        let out = bound_execution(code, &BoundingPolicy::default());
        assert_eq!(out.code, "for _ in range(5):\n    x += 1\n");
        assert_eq!(out.loops_bounded, 1);
        assert!(!has_unbounded_loop(&out.code));
    }

    #[test]
    fn loop_variants_are_bounded() {
        let policy = BoundingPolicy::new(2, Duration::from_secs(60), Duration::from_secs(10));
        let code = "    while 1:\n        pass\n    while (True):  # spin\n        pass\n";
        let out = bound_execution(code, &policy);
        assert_eq!(
            out.code,
            "    for _ in range(2):\n        pass\n    for _ in range(2):  # spin\n        pass\n"
        );
    }

    #[test]
    fn conditional_while_is_left_alone() {
        let code = "while t < 3:\n    t += 1\n";
        assert_eq!(bound_execution(code, &BoundingPolicy::default()).code, code);
    }

    #[test]
    fn budget_reflects_timeout_minus_margin() {
        let policy = BoundingPolicy::new(5, Duration::from_secs(60), Duration::from_secs(10));
        let code = "class A(Scene):\n    def construct(self):\n        self.play(Wait())\n";
        let out = bound_execution(code, &policy);
        assert!(out.code.contains("> 50.0: return"));
        assert!(out.code.starts_with(GUARD_IMPORT));
    }

    #[test]
    fn guard_in_setup_tolerates_missing_start_time() {
        let code = "class A(Scene):\n    def setup(self):\n        self.play(FadeIn(title))\n\n    def construct(self):\n        self.wait(1)\n";
        let out = bound_execution(code, &BoundingPolicy::default());
        let lines: Vec<&str> = out.code.lines().collect();
        let play = lines
            .iter()
            .position(|l| l.trim() == "self.play(FadeIn(title))")
            .expect("play kept");
        let guard = lines[play - 1].trim();
        assert_eq!(
            guard,
            "if _guard_time.monotonic() - getattr(self, \"_render_started\", _guard_time.monotonic()) > 290.0: return"
        );
        assert!(!guard.contains("- self._render_started"));
        assert_eq!(out.guards_inserted, 1);
        assert_eq!(out.start_markers_inserted, 1);
    }

    #[test]
    fn no_guard_inside_open_call() {
        let code = "class A(Scene):\n    def construct(self):\n        group = VGroup(\n            self.play(x),\n        )\n";
        let out = bound_execution(code, &BoundingPolicy::default());
        assert_eq!(out.guards_inserted, 0);
    }

    #[test]
    fn no_guards_without_construct() {
        let code = "def helper(self):\n    self.play(x)\n";
        let out = bound_execution(code, &BoundingPolicy::default());
        assert!(!out.changed());
        assert_eq!(out.code, code);
    }

    #[test]
    fn while_inside_docstring_is_ignored() {
        let code = "\"\"\"\nwhile True:\n\"\"\"\n";
        assert_eq!(bound_execution(code, &BoundingPolicy::default()).code, code);
    }
}
