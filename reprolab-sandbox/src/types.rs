//! Core types for sandbox execution

use serde::{Deserialize, Serialize};

/// Exit code reported when the launcher itself failed or gave up on the child
pub const LAUNCHER_FAILURE_EXIT_CODE: i32 = -1;

/// Result of running one script
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,

    pub stderr: String,

    /// Exit code; `-n` when the child was killed by signal `n`
    pub exit_code: i32,

    /// Files the script left in the output directory, sorted, script excluded
    pub output_files: Vec<String>,

    pub runtime_seconds: f64,

    /// Human-readable failure description
    pub error: Option<String>,

    pub memory_exceeded: bool,

    pub timeout_exceeded: bool,
}

impl ExecutionResult {
    /// Check if execution succeeded
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timeout_exceeded && self.error.is_none()
    }

    /// A result for a run that never got as far as a child exit status.
    pub(crate) fn launcher_failure(error: impl Into<String>, runtime_seconds: f64) -> Self {
        Self {
            exit_code: LAUNCHER_FAILURE_EXIT_CODE,
            runtime_seconds,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}
