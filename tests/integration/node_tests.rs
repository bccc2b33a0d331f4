//! Integration tests for the code-runner node

use assert_matches::assert_matches;
use reprolab_sandbox::{SandboxError, SandboxService, SandboxSettings, LAUNCHER_FAILURE_EXIT_CODE};
use serde_json::json;

use crate::common::{python, python_available, setup_test_logging, test_runtime};

fn service() -> SandboxService {
    let settings = SandboxSettings {
        python_executable: python().to_string(),
        ..Default::default()
    };
    SandboxService::with_settings(test_runtime(), settings)
}

#[tokio::test]
async fn test_node_runs_stage_into_run_directory() {
    setup_test_logging();
    if !python_available() {
        return;
    }
    let run_dir = tempfile::tempdir().unwrap();
    let state = json!({
        "code": "open('result.txt', 'w').write('42')\nprint('done')",
        "current_stage_id": "stage1_spectrum",
        "paper_id": "paper42",
        "plan": {"stages": [{"stage_id": "stage1_spectrum", "runtime_budget_minutes": 1}]},
        "run_output_dir": run_dir.path(),
    });

    let update = service().run_code_node_value(state).await.unwrap();

    assert!(!update.is_error(), "run_error: {:?}", update.run_error);
    let outputs = &update.stage_outputs;
    assert_eq!(outputs.exit_code, 0);
    assert_eq!(outputs.stdout.trim(), "done");
    assert!(!outputs.timeout_exceeded);

    let stage_dir = run_dir.path().join("stage1_spectrum");
    assert_eq!(
        outputs.files,
        vec![stage_dir.join("result.txt").to_string_lossy().into_owned()]
    );
    assert!(stage_dir.join("simulation_stage1_spectrum.py").exists());

    // No meep import in the script.
    assert_eq!(outputs.validation_warnings.len(), 1);
    assert!(outputs.validation_warnings[0].starts_with("NOTE:"));
}

#[tokio::test]
async fn test_node_blocks_interactive_script_without_running() {
    setup_test_logging();
    let run_dir = tempfile::tempdir().unwrap();
    let state = json!({
        "code": "import meep as mp\nimport matplotlib.pyplot as plt\nplt.show()",
        "current_stage_id": "stage2",
        "paper_id": "paper42",
        "run_output_dir": run_dir.path(),
    });

    let update = service().run_code_node_value(state).await.unwrap();

    assert!(update.is_error());
    assert_matches!(
        update.run_error.as_deref(),
        Some(e) if e.starts_with("Execution blocked by validation: BLOCKING:")
    );
    assert_eq!(update.stage_outputs.exit_code, LAUNCHER_FAILURE_EXIT_CODE);
    assert!(update.stage_outputs.files.is_empty());
    assert!(!run_dir.path().join("stage2").exists());
}

#[tokio::test]
async fn test_node_reports_stage_timeout() {
    setup_test_logging();
    if !python_available() {
        return;
    }
    let run_dir = tempfile::tempdir().unwrap();
    // 0.02 minutes rounds up to a 2 second budget.
    let state = json!({
        "code": "import time\ntime.sleep(30)",
        "current_stage_id": "stage3",
        "paper_id": "paper42",
        "plan": {"stages": [{"stage_id": "stage3", "runtime_budget_minutes": 0.02}]},
        "run_output_dir": run_dir.path(),
    });

    let update = service().run_code_node_value(state).await.unwrap();

    assert!(update.stage_outputs.timeout_exceeded);
    assert!(update.stage_outputs.runtime_seconds < 10.0);
    assert_matches!(update.run_error.as_deref(), Some(e) if e.contains("timeout (2s)"));
}

#[test]
fn test_node_rejects_non_string_code() {
    let state = json!({
        "code": 17,
        "current_stage_id": "stage1",
        "paper_id": "paper42",
    });

    let result = tokio_test::block_on(service().run_code_node_value(state));

    assert_matches!(result, Err(SandboxError::InvalidState(_)));
}
