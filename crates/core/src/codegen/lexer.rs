//! Minimal line scanner for generated source.
//!
//! Tracks just enough lexical state (string literals, including triple-quoted
//! ones spanning lines, and `#` comments) to let the validator and the
//! rewriters ignore characters that are not code. It is not a tokenizer.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Quote {
    delim: u8,
    triple: bool,
}

/// Lexical state carried from one line to the next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ScanState {
    open: Option<Quote>,
}

impl ScanState {
    /// Whether the scanner is inside a multi-line string literal.
    pub(crate) fn in_string(&self) -> bool {
        self.open.is_some()
    }
}

/// Scan one line, invoking `on_code` for every byte outside strings and comments.
///
/// Returns the byte offset where a trailing comment starts, if any. Only ASCII
/// bytes are meaningful to callers; multi-byte UTF-8 sequences never collide
/// with ASCII values.
pub(crate) fn scan_line<F>(line: &str, state: &mut ScanState, mut on_code: F) -> Option<usize>
where
    F: FnMut(usize, u8),
{
    let bytes = line.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match state.open {
            Some(quote) => {
                if b == b'\\' {
                    i += 2;
                    continue;
                }
                if b == quote.delim {
                    if !quote.triple {
                        state.open = None;
                    } else if bytes[i..].starts_with(&[b, b, b]) {
                        state.open = None;
                        i += 3;
                        continue;
                    }
                }
                i += 1;
            }
            None => {
                if b == b'#' {
                    return Some(i);
                }
                if b == b'"' || b == b'\'' {
                    let triple = bytes[i..].starts_with(&[b, b, b]);
                    state.open = Some(Quote { delim: b, triple });
                    i += if triple { 3 } else { 1 };
                    continue;
                }
                on_code(i, b);
                i += 1;
            }
        }
    }

    // Single-quoted literals cannot span lines.
    if matches!(state.open, Some(Quote { triple: false, .. })) {
        state.open = None;
    }
    None
}

/// Blank out string literal contents, quotes and comments, line by line.
///
/// Line count and byte offsets are preserved so callers can report 1-based
/// line numbers against the original source.
pub(crate) fn mask_non_code(code: &str) -> Vec<String> {
    let mut state = ScanState::default();
    code.lines()
        .map(|line| {
            let mut masked = vec![b' '; line.len()];
            scan_line(line, &mut state, |i, b| masked[i] = b);
            String::from_utf8_lossy(&masked).trim_end().to_string()
        })
        .collect()
}

/// Net bracket depth change of a line (`(`, `[`, `{` minus their closers).
pub(crate) fn bracket_delta(line: &str, state: &mut ScanState) -> i32 {
    let mut delta = 0;
    scan_line(line, state, |_, b| match b {
        b'(' | b'[' | b'{' => delta += 1,
        b')' | b']' | b'}' => delta -= 1,
        _ => {}
    });
    delta
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
