//! Runtime trait and implementations

#[cfg(unix)]
mod preexec;
mod process;
mod workspace;

use crate::limits::ExecutionConfig;
use crate::types::ExecutionResult;
use async_trait::async_trait;
use std::path::Path;

pub use process::{child_environment, MaterialsSource, ProcessRuntime, THREAD_ENV_VARS};
pub use workspace::{script_file_name, MaterialsOutcome};

/// Runtime abstraction for executing one simulation script
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Run `code` for `stage_id` inside `output_dir` (a fresh temporary
    /// directory when `None`).
    ///
    /// Never fails: every problem is reported through the result.
    async fn run(
        &self,
        code: &str,
        stage_id: &str,
        output_dir: Option<&Path>,
        config: &ExecutionConfig,
    ) -> ExecutionResult;

    /// Get runtime name
    fn name(&self) -> &str;
}
