//! Per-execution resource configuration

use crate::error::{SandboxError, SandboxResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Limits and options governing a single script execution.
///
/// Built per invocation and not modified once the script is launched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Wall-clock timeout, always enforced
    pub timeout_seconds: u64,

    /// Virtual address space ceiling, enforced where the platform allows
    pub max_memory_gb: f64,

    /// Thread count handed to numeric libraries
    pub max_cpu_cores: u32,

    /// Working directory of the child (defaults to the output directory)
    pub working_dir: Option<PathBuf>,

    /// Leave the script file in the output directory after the run
    pub keep_script: bool,

    /// Extra environment variables, applied last
    pub env_vars: Option<HashMap<String, String>>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 3600,
            max_memory_gb: 8.0,
            max_cpu_cores: 4,
            working_dir: None,
            keep_script: true,
            env_vars: None,
        }
    }
}

impl ExecutionConfig {
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_seconds = secs;
        self
    }

    pub fn with_memory_gb(mut self, gb: f64) -> Self {
        self.max_memory_gb = gb;
        self
    }

    pub fn with_cpu_cores(mut self, cores: u32) -> Self {
        self.max_cpu_cores = cores;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_keep_script(mut self, keep: bool) -> Self {
        self.keep_script = keep;
        self
    }

    /// Add an environment variable for the child
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Requested address-space limit in bytes
    pub fn memory_limit_bytes(&self) -> u64 {
        (self.max_memory_gb * BYTES_PER_GB) as u64
    }

    pub fn validate(&self) -> SandboxResult<()> {
        if self.timeout_seconds == 0 {
            return Err(SandboxError::InvalidConfig(
                "timeout_seconds must be positive".to_string(),
            ));
        }
        if !(self.max_memory_gb.is_finite() && self.max_memory_gb > 0.0) {
            return Err(SandboxError::InvalidConfig(format!(
                "max_memory_gb must be a positive number, got {}",
                self.max_memory_gb
            )));
        }
        if self.max_cpu_cores == 0 {
            return Err(SandboxError::InvalidConfig(
                "max_cpu_cores must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
