//! Denylist-based static scan of generated scene code.
//!
//! This is a best-effort deterrent, not a sandbox: it rejects the obvious
//! ways generated code could reach the filesystem, spawn processes, open
//! sockets or execute dynamic code. Equivalent constructs it does not know
//! about will pass. False positives are acceptable.
//!
//! Comments and string literal contents are masked before scanning, so
//! nothing is matched inside them.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use super::lexer::mask_non_code;

/// Modules that may not be imported, by top-level package name.
pub const DENIED_IMPORTS: &[&str] = &[
    // process / system
    "os", "sys", "subprocess", "signal", "pty", "multiprocessing", "threading",
    "concurrent", "resource", "fcntl", "mmap", "gc", "inspect",
    // filesystem
    "shutil", "pathlib", "glob", "tempfile", "io", "fileinput", "sqlite3", "zipfile", "tarfile",
    // network
    "socket", "ssl", "requests", "urllib", "urllib3", "http", "httpx", "aiohttp", "ftplib",
    "telnetlib", "smtplib", "poplib", "imaplib", "webbrowser", "paramiko", "asyncio",
    // dynamic import / execution
    "importlib", "imp", "runpy", "zipimport", "builtins", "code", "codeop",
    // serialization
    "pickle", "marshal", "shelve", "dill",
    // low-level FFI
    "ctypes", "cffi",
];

/// Modules whose member access (`<module>.<name>`) is rejected outright.
///
/// A subset of [`DENIED_IMPORTS`]: names that read like ordinary local
/// variables in scene code (`code`, `io`, `gc`) are left out.
pub const DENIED_MEMBER_ACCESS: &[&str] = &[
    "os", "sys", "subprocess", "signal", "pty", "multiprocessing", "shutil", "pathlib", "glob",
    "tempfile", "socket", "requests", "urllib", "http", "ftplib", "webbrowser", "importlib",
    "runpy", "builtins", "pickle", "marshal", "shelve", "ctypes",
];

/// Callables that execute or load code dynamically, or touch files directly.
pub const DENIED_CALLS: &[&str] = &[
    "exec", "eval", "compile", "__import__", "open", "execfile", "breakpoint", "input",
];

/// Dunder attributes used to climb out of restricted namespaces.
pub const DENIED_DUNDERS: &[&str] = &[
    "__builtins__", "__subclasses__", "__globals__", "__code__", "__loader__",
];

static IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*import\s+(.+)$").expect("valid regex"));

static FROM_IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*from\s+([\w.]+)\s+import\b").expect("valid regex"));

static CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    let names = DENIED_CALLS.join("|");
    Regex::new(&format!(r"(?:^|[^\w.])({names})\s*\(")).expect("valid regex")
});

static MEMBER_ACCESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    let names = DENIED_MEMBER_ACCESS.join("|");
    Regex::new(&format!(r"(?:^|[^\w])({names})\s*\.\s*[A-Za-z_]")).expect("valid regex")
});

static DUNDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    let names = DENIED_DUNDERS.join("|");
    Regex::new(&format!(r"({names})")).expect("valid regex")
});

/// A single denylist hit, with its 1-based source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyViolation {
    DeniedImport { module: String, line: usize },
    DynamicExecution { call: String, line: usize },
    DeniedModuleAccess { module: String, line: usize },
    SandboxEscape { attribute: String, line: usize },
}

impl fmt::Display for SafetyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeniedImport { module, line } => {
                write!(f, "line {line}: import of denied module `{module}`")
            }
            Self::DynamicExecution { call, line } => {
                write!(f, "line {line}: call to denied function `{call}()`")
            }
            Self::DeniedModuleAccess { module, line } => {
                write!(f, "line {line}: access to denied module `{module}`")
            }
            Self::SandboxEscape { attribute, line } => {
                write!(f, "line {line}: use of `{attribute}`")
            }
        }
    }
}

/// Result of scanning one candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SafetyReport {
    pub violations: Vec<SafetyViolation>,
}

impl SafetyReport {
    pub fn is_safe(&self) -> bool {
        self.violations.is_empty()
    }

    /// One human-readable line per violation.
    pub fn diagnostics(&self) -> Vec<String> {
        self.violations.iter().map(ToString::to_string).collect()
    }
}

/// Scan `code` and report every denylist hit.
pub fn validate(code: &str) -> SafetyReport {
    let mut violations = Vec::new();

    for (index, masked) in mask_non_code(code).iter().enumerate() {
        let line = index + 1;

        for statement in masked.split(';') {
            let imported = imported_modules(statement);
            let is_import = !imported.is_empty();
            for module in imported {
                if DENIED_IMPORTS.contains(&module.as_str()) {
                    violations.push(SafetyViolation::DeniedImport { module, line });
                }
            }

            for caps in CALL_RE.captures_iter(statement) {
                violations.push(SafetyViolation::DynamicExecution {
                    call: caps[1].to_string(),
                    line,
                });
            }

            // `import os.path` is already reported as an import.
            if !is_import {
                for caps in MEMBER_ACCESS_RE.captures_iter(statement) {
                    violations.push(SafetyViolation::DeniedModuleAccess {
                        module: caps[1].to_string(),
                        line,
                    });
                }
            }

            for caps in DUNDER_RE.captures_iter(statement) {
                violations.push(SafetyViolation::SandboxEscape {
                    attribute: caps[1].to_string(),
                    line,
                });
            }
        }
    }

    SafetyReport { violations }
}

/// Shorthand for `validate(code).is_safe()`.
pub fn is_safe(code: &str) -> bool {
    validate(code).is_safe()
}

/// Top-level package names imported by a single statement.
fn imported_modules(statement: &str) -> Vec<String> {
    if let Some(caps) = FROM_IMPORT_RE.captures(statement) {
        return vec![top_level(&caps[1])];
    }
    if let Some(caps) = IMPORT_RE.captures(statement) {
        return caps[1]
            .split(',')
            .filter_map(|item| item.split_whitespace().next())
            .map(top_level)
            .collect();
    }
    Vec::new()
}

fn top_level(path: &str) -> String {
    path.split('.').next().unwrap_or(path).to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
