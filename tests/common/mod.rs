//! Common test utilities shared across integration and E2E tests

use std::process::Command;
use std::sync::OnceLock;

use reprolab_sandbox::{detect, MaterialsSource, ProcessRuntime};

/// Setup logging for tests
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

/// Interpreter name used by the tests
pub fn python() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}

/// Whether a Python interpreter is on PATH. Tests that spawn scripts return
/// early without one.
pub fn python_available() -> bool {
    static AVAILABLE: OnceLock<bool> = OnceLock::new();
    *AVAILABLE.get_or_init(|| {
        Command::new(python())
            .arg("--version")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    })
}

/// Runtime on the detected platform with materials disabled
pub fn test_runtime() -> ProcessRuntime {
    ProcessRuntime::with_capabilities(detect())
        .with_python(python())
        .with_materials(MaterialsSource::Disabled)
}

