//! State update produced by the code-runner node

use serde::{Deserialize, Serialize};

/// Raw outputs of one stage execution, as recorded in the workflow state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageOutputs {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub files: Vec<String>,
    pub runtime_seconds: f64,
    pub validation_warnings: Vec<String>,
    pub timeout_exceeded: bool,
    pub memory_exceeded: bool,
}

/// Update merged back into the workflow state.
///
/// `run_error` is passed through uninterpreted; whether to retry, escalate or
/// give up is decided downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageUpdate {
    pub stage_outputs: StageOutputs,
    pub run_error: Option<String>,
}

impl StageUpdate {
    pub fn is_error(&self) -> bool {
        self.run_error.is_some()
    }
}
