//! Sandbox service - main entry point for the workflow graph

use crate::config::SandboxSettings;
use crate::error::{SandboxError, SandboxResult};
use crate::estimate::estimate_runtime;
use crate::limits::ExecutionConfig;
use crate::runtime::{ProcessRuntime, Runtime};
use crate::types::{ExecutionResult, LAUNCHER_FAILURE_EXIT_CODE};
use crate::validation::{blocking_warnings, validate_code_with};
use reprolab_common::{StageOutputs, StageState, StageUpdate};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Runs stage scripts on behalf of the workflow graph.
///
/// The service reports what happened and nothing more: retry and
/// escalation decisions belong to the caller.
pub struct SandboxService {
    runtime: Arc<dyn Runtime>,
    settings: SandboxSettings,
}

impl SandboxService {
    /// Create a new sandbox service with the given runtime and default settings
    pub fn new(runtime: impl Runtime + 'static) -> Self {
        Self::with_settings(runtime, SandboxSettings::default())
    }

    pub fn with_settings(runtime: impl Runtime + 'static, settings: SandboxSettings) -> Self {
        Self {
            runtime: Arc::new(runtime),
            settings,
        }
    }

    /// Service backed by a [`ProcessRuntime`] configured from `settings`
    pub fn from_settings(settings: SandboxSettings) -> Self {
        let runtime = ProcessRuntime::from_settings(&settings);
        Self::with_settings(runtime, settings)
    }

    /// Get the runtime name
    pub fn runtime_name(&self) -> &str {
        self.runtime.name()
    }

    pub fn settings(&self) -> &SandboxSettings {
        &self.settings
    }

    /// Static scan using the configured required import
    pub fn validate(&self, code: &str) -> Vec<String> {
        validate_code_with(code, &self.settings.required_import)
    }

    /// Run a script directly, bypassing validation
    pub async fn execute(
        &self,
        code: &str,
        stage_id: &str,
        output_dir: Option<&Path>,
        config: &ExecutionConfig,
    ) -> ExecutionResult {
        tracing::info!(
            runtime = self.runtime.name(),
            stage_id,
            code_len = code.len(),
            "Executing code"
        );
        self.runtime.run(code, stage_id, output_dir, config).await
    }

    /// Execution config for the state's current stage.
    ///
    /// The timeout is the stage's runtime budget; without one it falls back
    /// to the heuristic estimate for the code.
    pub fn execution_config_for(&self, state: &StageState) -> ExecutionConfig {
        let mut config = self.settings.execution.clone();

        config.timeout_seconds = match state.stage_budget_minutes() {
            Some(minutes) => ((minutes * 60.0).ceil() as u64).max(1),
            None => estimate_runtime(&state.code, None)
                .recommended_timeout_seconds
                .max(1),
        };

        if let Some(runtime_config) = &state.runtime_config {
            if let Some(gb) = runtime_config.max_memory_gb {
                config.max_memory_gb = gb;
            }
            if let Some(cores) = runtime_config.max_cpu_cores {
                config.max_cpu_cores = cores;
            }
        }

        config
    }

    /// `<run_output_dir>/<stage_id>`, or `<output_root>/<paper_id>/<stage_id>`
    /// for states that predate run-scoped directories.
    pub fn output_dir_for(&self, state: &StageState) -> PathBuf {
        match &state.run_output_dir {
            Some(run_dir) => run_dir.join(&state.current_stage_id),
            None => self
                .settings
                .output_root
                .join(&state.paper_id)
                .join(&state.current_stage_id),
        }
    }

    /// Code-runner node: validate, run, and report the stage outputs.
    pub async fn run_code_node(&self, state: &StageState) -> StageUpdate {
        let stage_id = state.current_stage_id.as_str();
        let validation_warnings = self.validate(&state.code);

        for warning in &validation_warnings {
            tracing::warn!(stage_id, "{}", warning);
        }

        let blocking = blocking_warnings(&validation_warnings);
        if !blocking.is_empty() {
            let run_error = format!("Execution blocked by validation: {}", blocking.join("; "));
            tracing::error!(stage_id, "{}", run_error);
            return StageUpdate {
                stage_outputs: StageOutputs {
                    exit_code: LAUNCHER_FAILURE_EXIT_CODE,
                    validation_warnings,
                    ..Default::default()
                },
                run_error: Some(run_error),
            };
        }

        let config = self.execution_config_for(state);
        let output_dir = self.output_dir_for(state);
        let result = self
            .execute(&state.code, stage_id, Some(&output_dir), &config)
            .await;

        StageUpdate {
            run_error: result.error.clone(),
            stage_outputs: StageOutputs {
                stdout: result.stdout,
                stderr: result.stderr,
                exit_code: result.exit_code,
                files: result.output_files,
                runtime_seconds: result.runtime_seconds,
                validation_warnings,
                timeout_exceeded: result.timeout_exceeded,
                memory_exceeded: result.memory_exceeded,
            },
        }
    }

    /// Code-runner node over an untyped state mapping.
    pub async fn run_code_node_value(&self, state: serde_json::Value) -> SandboxResult<StageUpdate> {
        let state = StageState::from_value(state)
            .map_err(|e| SandboxError::InvalidState(e.to_string()))?;
        Ok(self.run_code_node(&state).await)
    }

    /// Code-runner node over a JSON-encoded state.
    pub async fn run_code_node_json(&self, state: &str) -> SandboxResult<StageUpdate> {
        let value: serde_json::Value = serde_json::from_str(state)?;
        self.run_code_node_value(value).await
    }
}
