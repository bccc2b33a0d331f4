//! Static pre-execution scan of generated scripts
//!
//! Matching is plain substring search over the raw text, so patterns inside
//! comments and string literals are flagged too.

/// Library a simulation script is expected to import when none is configured
pub const DEFAULT_REQUIRED_IMPORT: &str = "meep";

pub const WARNING_PREFIX: &str = "WARNING:";
pub const BLOCKING_PREFIX: &str = "BLOCKING:";
pub const NOTE_PREFIX: &str = "NOTE:";

/// Constructs that deserve a second look but do not stop execution
const DANGEROUS_PATTERNS: &[(&str, &str)] = &[
    ("os.system(", "Shell command execution"),
    ("subprocess.", "Subprocess invocation"),
    ("eval(", "Dynamic code evaluation"),
    ("exec(", "Dynamic code execution"),
    ("__import__(", "Dynamic import"),
    ("importlib.import_module(", "Dynamic import"),
    ("open('/etc", "Reading system files"),
    ("open(\"/etc", "Reading system files"),
    ("shutil.rmtree(", "Recursive directory deletion"),
    ("rm -rf", "Recursive deletion via shell"),
];

/// Constructs that would hang an unattended run
const BLOCKING_PATTERNS: &[(&str, &str)] = &[
    (
        "plt.show()",
        "plt.show() blocks unattended execution - save figures with plt.savefig() instead",
    ),
    (
        "input(",
        "input() waits for interactive user input and would hang the run",
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Blocking,
    Note,
}

impl Severity {
    pub fn prefix(self) -> &'static str {
        match self {
            Severity::Warning => WARNING_PREFIX,
            Severity::Blocking => BLOCKING_PREFIX,
            Severity::Note => NOTE_PREFIX,
        }
    }

    /// Severity of a warning line, from its prefix
    pub fn of(warning: &str) -> Option<Self> {
        [Severity::Blocking, Severity::Warning, Severity::Note]
            .into_iter()
            .find(|severity| warning.starts_with(severity.prefix()))
    }
}

/// Scan `code` against the built-in patterns, expecting a `meep` import.
pub fn validate_code(code: &str) -> Vec<String> {
    validate_code_with(code, DEFAULT_REQUIRED_IMPORT)
}

/// Scan `code`, expecting an import of `required_import`.
///
/// Warnings come out in a stable order: dangerous patterns, blocking
/// patterns, then the missing-import note.
pub fn validate_code_with(code: &str, required_import: &str) -> Vec<String> {
    let mut warnings = Vec::new();

    for (pattern, description) in DANGEROUS_PATTERNS {
        if code.contains(pattern) {
            warnings.push(format!(
                "{} {} - found '{}'",
                WARNING_PREFIX, description, pattern
            ));
        }
    }

    for (pattern, description) in BLOCKING_PATTERNS {
        if code.contains(pattern) {
            warnings.push(format!("{} {}", BLOCKING_PREFIX, description));
        }
    }

    if !imports_library(code, required_import) {
        warnings.push(format!("{} No {} import found", NOTE_PREFIX, required_import));
    }

    warnings
}

/// Whether any warning must stop execution
pub fn has_blocking(warnings: &[String]) -> bool {
    warnings
        .iter()
        .any(|w| Severity::of(w) == Some(Severity::Blocking))
}

pub fn blocking_warnings(warnings: &[String]) -> Vec<&str> {
    warnings
        .iter()
        .filter(|w| Severity::of(w) == Some(Severity::Blocking))
        .map(String::as_str)
        .collect()
}

fn imports_library(code: &str, library: &str) -> bool {
    let import_stmt = format!("import {}", library);
    let from_stmt = format!("from {}", library);

    code.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .any(|line| {
            starts_with_module(line, &import_stmt) || starts_with_module(line, &from_stmt)
        })
}

/// `line` starts with `stmt` and the module name ends right after it
fn starts_with_module(line: &str, stmt: &str) -> bool {
    match line.strip_prefix(stmt) {
        Some(rest) => rest
            .chars()
            .next()
            .map_or(true, |c| c.is_whitespace() || c == '.' || c == ','),
        None => false,
    }
}
