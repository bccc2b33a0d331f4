//! ReproLab sandbox - resource-limited execution of generated simulation scripts
//!
//! Scripts are scanned statically, written into a per-stage output directory,
//! and run as child processes under a wall-clock timeout plus, where the
//! platform supports it, an address-space limit. Every run yields an
//! [`ExecutionResult`]; failures are data, not errors.

mod config;
mod error;
mod estimate;
mod execution;
mod limits;
pub mod platform;
mod runtime;
mod service;
mod types;
mod validation;

pub use config::{SandboxSettings, MATERIALS_DIR_NAME};
pub use error::{SandboxError, SandboxResult};
pub use estimate::{estimate_runtime, RuntimeEstimate, DEFAULT_BASE_MINUTES};
pub use execution::ExecutionId;
pub use limits::ExecutionConfig;
pub use platform::{
    detect, emit_warnings, platform_capabilities, Platform, PlatformCapabilities,
    SKIP_RESOURCE_LIMITS_ENV,
};
pub use runtime::{
    child_environment, script_file_name, MaterialsOutcome, MaterialsSource, ProcessRuntime,
    Runtime, THREAD_ENV_VARS,
};
pub use service::SandboxService;
pub use types::{ExecutionResult, LAUNCHER_FAILURE_EXIT_CODE};
pub use validation::{
    blocking_warnings, has_blocking, validate_code, validate_code_with, Severity,
    BLOCKING_PREFIX, DEFAULT_REQUIRED_IMPORT, NOTE_PREFIX, WARNING_PREFIX,
};
