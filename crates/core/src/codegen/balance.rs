//! Best-effort bracket repair for generated code.
//!
//! A line-by-line heuristic, not a parser. It fixes the two mistakes models
//! make most often in multi-line `self.play(...)` calls:
//!
//! - a closer with nothing open is deleted;
//! - a statement left open is closed at the end of its last line, detected
//!   either by the end of input or by a following line that dedents to (or
//!   past) the indentation of the line that opened it and reads as a new
//!   statement (`self.…`, a keyword, or an assignment).
//!
//! Code whose open and close counts already agree for every bracket kind is
//! returned unchanged, so continuation lines at the statement's own indent
//! are never touched.

use std::sync::LazyLock;

use regex::Regex;

use super::lexer::{mask_non_code, scan_line, ScanState};

/// A line that cannot be the continuation of an open call.
static STATEMENT_START_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:self\.|(?:def|class|if|elif|else|for|while|with|try|except|finally|return|import|from|pass|break|continue|raise|assert|del|async|await|yield)\b|[A-Za-z_][\w.]*\s*(?:[-+*/%|&^@]|//|\*\*|<<|>>)?=[^=])",
    )
    .expect("valid regex")
});

/// Output of [`balance_parentheses`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceOutcome {
    pub code: String,
    /// Closers deleted because nothing was open.
    pub removed: usize,
    /// Closers inserted to terminate open statements.
    pub appended: usize,
}

impl BalanceOutcome {
    pub fn changed(&self) -> bool {
        self.removed > 0 || self.appended > 0
    }
}

enum Edit {
    Remove(usize),
    Insert(usize, String),
}

/// Repair unbalanced `()`, `[]` and `{}` line by line.
pub fn balance_parentheses(code: &str) -> BalanceOutcome {
    if bracket_mismatches(code).is_empty() {
        return BalanceOutcome {
            code: code.to_string(),
            removed: 0,
            appended: 0,
        };
    }

    let mut lines: Vec<String> = code.lines().map(str::to_string).collect();
    let mut comment_at: Vec<Option<usize>> = vec![None; lines.len()];

    let mut state = ScanState::default();
    let mut stack: Vec<u8> = Vec::new();
    let mut statement_indent = 0usize;
    let mut last_open_line: Option<usize> = None;
    let mut removed = 0usize;
    let mut appended = 0usize;

    for idx in 0..lines.len() {
        let trimmed = lines[idx].trim();
        let is_blank = trimmed.is_empty();

        if !stack.is_empty() && !state.in_string() && !is_blank {
            let continues = trimmed.starts_with([')', ']', '}']);
            if !continues
                && indent_width(&lines[idx]) <= statement_indent
                && STATEMENT_START_RE.is_match(trimmed)
                && !trimmed.ends_with(',')
            {
                if let Some(target) = last_open_line {
                    appended += close_open_brackets(&mut lines[target], comment_at[target], &mut stack);
                }
            }
        }

        let was_open = !stack.is_empty();
        let line = lines[idx].clone();
        let mut edits: Vec<Edit> = Vec::new();

        comment_at[idx] = scan_line(&line, &mut state, |i, b| match b {
            b'(' | b'[' | b'{' => stack.push(b),
            b')' | b']' | b'}' => {
                let opener = opener_for(b);
                match stack.iter().rposition(|&o| o == opener) {
                    Some(pos) if pos + 1 == stack.len() => {
                        stack.pop();
                    }
                    Some(pos) => {
                        // Inner brackets were left open: close them before this one.
                        let closers: String = stack[pos + 1..]
                            .iter()
                            .rev()
                            .map(|&o| closer_for(o) as char)
                            .collect();
                        edits.push(Edit::Insert(i, closers));
                        stack.truncate(pos);
                    }
                    None => edits.push(Edit::Remove(i)),
                }
            }
            _ => {}
        });

        if !edits.is_empty() {
            let mut repaired = line;
            for edit in edits.into_iter().rev() {
                match edit {
                    Edit::Remove(i) => {
                        repaired.remove(i);
                        removed += 1;
                    }
                    Edit::Insert(i, closers) => {
                        appended += closers.len();
                        repaired.insert_str(i, &closers);
                    }
                }
            }
            lines[idx] = repaired;
            // Offsets on this line moved; rescanning is cheaper than tracking.
            comment_at[idx] = scan_line(&lines[idx], &mut ScanState::default(), |_, _| {});
        }

        if !was_open && !stack.is_empty() {
            statement_indent = indent_width(&lines[idx]);
        }
        if !stack.is_empty() && !is_blank {
            last_open_line = Some(idx);
        }
    }

    if !stack.is_empty() {
        if let Some(target) = last_open_line {
            appended += close_open_brackets(&mut lines[target], comment_at[target], &mut stack);
        }
    }

    if removed == 0 && appended == 0 {
        return BalanceOutcome {
            code: code.to_string(),
            removed,
            appended,
        };
    }

    let mut repaired = lines.join("\n");
    if code.ends_with('\n') {
        repaired.push('\n');
    }
    BalanceOutcome {
        code: repaired,
        removed,
        appended,
    }
}

/// Report bracket kinds whose open and close counts differ (outside strings and comments).
pub fn bracket_mismatches(code: &str) -> Vec<String> {
    let masked = mask_non_code(code).join("\n");
    [('(', ')'), ('[', ']'), ('{', '}')]
        .into_iter()
        .filter_map(|(open, close)| {
            let opened = masked.matches(open).count();
            let closed = masked.matches(close).count();
            (opened != closed).then(|| {
                format!("mismatched `{open}{close}`: {opened} opening vs {closed} closing")
            })
        })
        .collect()
}

/// Append closers for everything on `stack` before any trailing comment.
fn close_open_brackets(line: &mut String, comment_at: Option<usize>, stack: &mut Vec<u8>) -> usize {
    let closers: String = stack.drain(..).rev().map(|o| closer_for(o) as char).collect();
    let end = comment_at.unwrap_or(line.len()).min(line.len());
    let insert_at = line[..end].trim_end().len();
    line.insert_str(insert_at, &closers);
    closers.len()
}

pub(crate) fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

fn opener_for(closer: u8) -> u8 {
    match closer {
        b')' => b'(',
        b']' => b'[',
        _ => b'{',
    }
}

fn closer_for(opener: u8) -> u8 {
    match opener {
        b'(' => b')',
        b'[' => b']',
        _ => b'}',
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
