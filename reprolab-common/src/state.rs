//! Workflow state consumed by the code-runner node

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Slice of the workflow state the code runner reads.
///
/// The graph carries many more keys than these; unknown keys are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageState {
    /// Simulation script to execute
    pub code: String,

    /// Stage currently being executed
    pub current_stage_id: String,

    /// Paper being reproduced (used for the legacy output path)
    pub paper_id: String,

    #[serde(default)]
    pub plan: Plan,

    /// Per-run resource overrides
    #[serde(default)]
    pub runtime_config: Option<RuntimeConfig>,

    /// Run-scoped output root; stage directories are created beneath it
    #[serde(default)]
    pub run_output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub stages: Vec<PlanStage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStage {
    pub stage_id: String,

    #[serde(default)]
    pub runtime_budget_minutes: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub max_memory_gb: Option<f64>,

    #[serde(default)]
    pub max_cpu_cores: Option<u32>,
}

impl StageState {
    /// Parse a state mapping handed over by the graph.
    pub fn from_value(value: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    /// The plan entry for the current stage, if the plan lists it.
    pub fn current_stage(&self) -> Option<&PlanStage> {
        self.plan
            .stages
            .iter()
            .find(|stage| stage.stage_id == self.current_stage_id)
    }

    /// Runtime budget of the current stage in minutes.
    pub fn stage_budget_minutes(&self) -> Option<f64> {
        self.current_stage()
            .and_then(|stage| stage.runtime_budget_minutes)
            .filter(|minutes| minutes.is_finite() && *minutes > 0.0)
    }
}
