//! Response normalizer: turns a raw model answer into a single source unit.
//!
//! Steps, in order:
//! 1. Extract the first fenced code block (or take the whole answer).
//! 2. Drop stray marker lines (bare fences, lone language tags).
//! 3. Delete a guarded `if __name__ == "__main__":` block with its body.
//! 4. Repair known model typos in imports and timing calls.
//! 5. Ensure `from manim import *` is present.
//! 6. Substitute the placeholder template when no scene class is found.

use std::sync::LazyLock;

use regex::Regex;

use super::templates::PLACEHOLDER_TEMPLATE;

/// Import line every rendered unit must carry.
pub const REQUIRED_IMPORT: &str = "from manim import *";

static FENCED_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[ \t]*[A-Za-z0-9_+.-]*[ \t]*\r?\n(.*?)```").expect("valid regex")
});

static OPEN_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[ \t]*[A-Za-z0-9_+.-]*[ \t]*\r?\n(.*)$").expect("valid regex")
});

static MANIM_IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*from[ \t]+manim[ \t]+import\b").expect("valid regex"));

static CLASS_DEF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*class[ \t]+([A-Za-z_]\w*)[ \t]*\(([^)]*)\)[ \t]*:").expect("valid regex")
});

/// Output of [`normalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedCode {
    /// The single source unit, always ending in a newline.
    pub code: String,
    /// Human-readable notes about repairs that were applied.
    pub notes: Vec<String>,
    /// `true` when the candidate was discarded for the placeholder template.
    pub used_placeholder: bool,
}

/// Normalize a raw model response into one self-contained source unit.
pub fn normalize(raw: &str) -> NormalizedCode {
    let mut notes = Vec::new();

    let extracted = extract_code_block(raw);
    let lines: Vec<&str> = extracted.lines().filter(|l| !is_marker_line(l)).collect();

    let (lines, removed_entry_point) = remove_entry_point_block(&lines);
    if removed_entry_point {
        notes.push("removed `if __name__ == \"__main__\"` block".to_string());
    }

    let mut code = lines.join("\n");

    if code.contains("from maniml import") {
        code = code.replace("from maniml import", "from manim import");
        notes.push("repaired `maniml` import typo".to_string());
    }
    if code.contains("np.time.") {
        code = code.replace("np.time.", "time.");
        notes.push("rewrote `np.time.` to `time.`".to_string());
    }

    if !MANIM_IMPORT_RE.is_match(&code) {
        code = format!("{REQUIRED_IMPORT}\n\n{}", code.trim_start());
        notes.push(format!("inserted missing `{REQUIRED_IMPORT}`"));
    }

    if scene_class_name(&code).is_none() {
        notes.push("no Scene subclass found; substituted placeholder template".to_string());
        return NormalizedCode {
            code: PLACEHOLDER_TEMPLATE.to_string(),
            notes,
            used_placeholder: true,
        };
    }

    NormalizedCode {
        code: format!("{}\n", code.trim()),
        notes,
        used_placeholder: false,
    }
}

/// Name of the first class whose bases include a `...Scene` type.
pub fn scene_class_name(code: &str) -> Option<String> {
    CLASS_DEF_RE.captures_iter(code).find_map(|caps| {
        let inherits_scene = caps[2]
            .split(',')
            .map(str::trim)
            .any(|base| base.ends_with("Scene"));
        inherits_scene.then(|| caps[1].to_string())
    })
}

/// Return the body of the first fenced block, or the whole text when unfenced.
fn extract_code_block(raw: &str) -> String {
    if let Some(caps) = FENCED_BLOCK_RE.captures(raw) {
        return caps[1].to_string();
    }
    // An opening fence with no closer: keep what follows it, unless the fence
    // is a dangling trailer with nothing after it.
    if let Some(caps) = OPEN_FENCE_RE.captures(raw) {
        if !caps[1].trim().is_empty() {
            return caps[1].to_string();
        }
    }
    raw.to_string()
}

fn is_marker_line(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with("```")
        || matches!(
            trimmed.to_ascii_lowercase().as_str(),
            "python" | "python3" | "py"
        )
}

/// Line-prefix scan: the guard line is dropped together with every following
/// blank or indented line, up to the next top-level statement.
fn remove_entry_point_block<'a>(lines: &[&'a str]) -> (Vec<&'a str>, bool) {
    let mut kept = Vec::with_capacity(lines.len());
    let mut skipping = false;
    let mut removed = false;

    for line in lines {
        if is_entry_point_guard(line) {
            skipping = true;
            removed = true;
            continue;
        }
        if skipping {
            if line.trim().is_empty() || line.starts_with(' ') || line.starts_with('\t') {
                continue;
            }
            skipping = false;
        }
        kept.push(*line);
    }

    (kept, removed)
}

fn is_entry_point_guard(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("if __name__") && trimmed.contains("__main__")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
