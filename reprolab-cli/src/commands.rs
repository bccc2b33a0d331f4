//! CLI command implementations
//!
//! Each command prints its result on stdout and returns the process exit code.

use anyhow::{anyhow, Context, Result};
use reprolab_sandbox::{
    emit_warnings, estimate_runtime, has_blocking, platform_capabilities, SandboxService,
    SandboxSettings,
};
use std::path::Path;
use tracing::info;

/// Exit code when validation finds blocking code
pub const EXIT_BLOCKED: i32 = 2;

/// Command-line overrides for the configured execution defaults
pub struct RunOverrides {
    pub timeout: Option<u64>,
    pub memory_gb: Option<f64>,
    pub cpu_cores: Option<u32>,
    pub keep_script: bool,
    pub env: Vec<(String, String)>,
}

/// Parse a `KEY=VALUE` pair
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty variable name in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

fn load_settings(config: Option<&Path>) -> Result<SandboxSettings> {
    SandboxSettings::load(config).context("Failed to load settings")
}

fn read_script(script: &Path) -> Result<String> {
    std::fs::read_to_string(script)
        .with_context(|| format!("Failed to read script {}", script.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Execute a script under limits and print the execution result
pub async fn execute_run(
    config: Option<&Path>,
    script: &Path,
    stage_id: &str,
    output_dir: Option<&Path>,
    overrides: RunOverrides,
) -> Result<i32> {
    let settings = load_settings(config)?;
    let code = read_script(script)?;

    let mut execution = settings.execution.clone().with_keep_script(overrides.keep_script);
    if let Some(timeout) = overrides.timeout {
        execution = execution.with_timeout(timeout);
    }
    if let Some(gb) = overrides.memory_gb {
        execution = execution.with_memory_gb(gb);
    }
    if let Some(cores) = overrides.cpu_cores {
        execution = execution.with_cpu_cores(cores);
    }
    for (key, value) in overrides.env {
        execution = execution.with_env(key, value);
    }

    let service = SandboxService::from_settings(settings);
    let warnings = service.validate(&code);
    for warning in &warnings {
        eprintln!("{}", warning);
    }
    if has_blocking(&warnings) {
        return Ok(EXIT_BLOCKED);
    }

    info!("Running {} as stage '{}'", script.display(), stage_id);
    let result = service
        .execute(&code, stage_id, output_dir, &execution)
        .await;
    print_json(&result)?;

    Ok(if result.success() { 0 } else { 1 })
}

/// Print validation warnings, one per line
pub fn execute_validate(config: Option<&Path>, script: &Path) -> Result<i32> {
    let settings = load_settings(config)?;
    let code = read_script(script)?;
    let warnings = reprolab_sandbox::validate_code_with(&code, &settings.required_import);

    if warnings.is_empty() {
        println!("✓ No issues found");
    }
    for warning in &warnings {
        println!("{}", warning);
    }

    Ok(if has_blocking(&warnings) { EXIT_BLOCKED } else { 0 })
}

pub fn execute_estimate(script: &Path, minutes: Option<f64>) -> Result<i32> {
    let code = read_script(script)?;
    print_json(&estimate_runtime(&code, minutes))?;
    Ok(0)
}

pub fn execute_platform() -> Result<i32> {
    let caps = platform_capabilities();
    emit_warnings(caps);
    print_json(caps)?;
    Ok(0)
}

/// Run the code-runner node on a JSON workflow state
pub async fn execute_node(config: Option<&Path>, state: &Path) -> Result<i32> {
    let settings = load_settings(config)?;
    let content = std::fs::read_to_string(state)
        .with_context(|| format!("Failed to read state {}", state.display()))?;

    let service = SandboxService::from_settings(settings);
    let update = service
        .run_code_node_json(&content)
        .await
        .map_err(|e| anyhow!(e))?;
    print_json(&update)?;

    Ok(if update.is_error() { 1 } else { 0 })
}
