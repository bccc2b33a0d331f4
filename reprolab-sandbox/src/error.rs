use thiserror::Error;

/// Errors surfaced by the sandbox outside of script execution itself.
///
/// Script execution never fails with one of these: launch, timeout and exit
/// failures are reported through `ExecutionResult::error`.
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid execution config: {0}")]
    InvalidConfig(String),

    #[error("Invalid stage state: {0}")]
    InvalidState(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type SandboxResult<T> = Result<T, SandboxError>;
