//! Integration tests for running scripts through the process runtime

use std::time::Instant;

use assert_matches::assert_matches;
use reprolab_sandbox::{script_file_name, ExecutionConfig, Runtime, LAUNCHER_FAILURE_EXIT_CODE};

use crate::common::{python_available, setup_test_logging, test_runtime};

#[tokio::test]
async fn test_hello_world() {
    setup_test_logging();
    if !python_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();

    let result = test_runtime()
        .run(
            "print('hello')",
            "stage0",
            Some(dir.path()),
            &ExecutionConfig::default(),
        )
        .await;

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout.trim(), "hello");
    assert_eq!(result.error, None);
    assert!(result.output_files.is_empty());
    assert!(!result.timeout_exceeded);
    assert!(!result.memory_exceeded);
    assert!(result.success());
    assert!(dir.path().join("simulation_stage0.py").exists());
}

#[tokio::test]
async fn test_timeout_keeps_partial_output() {
    setup_test_logging();
    if !python_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let code = "import time\nprint('started', flush=True)\ntime.sleep(30)\nprint('finished')";
    let config = ExecutionConfig::default().with_timeout(1);

    let started = Instant::now();
    let result = test_runtime()
        .run(code, "slow", Some(dir.path()), &config)
        .await;

    assert!(started.elapsed().as_secs_f64() < 4.0);
    assert!(result.runtime_seconds < 4.0);
    assert!(result.timeout_exceeded);
    assert_eq!(result.exit_code, LAUNCHER_FAILURE_EXIT_CODE);
    assert_matches!(result.error.as_deref(), Some(e) if e.contains("timeout (1s)"));
    assert!(result.stdout.contains("started"));
    assert!(!result.stdout.contains("finished"));
}

#[tokio::test]
async fn test_syntax_error_reported() {
    setup_test_logging();
    if !python_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();

    let result = test_runtime()
        .run("def broken(:\n    pass", "bad", Some(dir.path()), &ExecutionConfig::default())
        .await;

    assert_ne!(result.exit_code, 0);
    assert!(result.stderr.contains("SyntaxError"));
    assert_matches!(result.error.as_deref(), Some(e) if e.contains("exit code"));
    assert!(!result.memory_exceeded);
}

#[tokio::test]
async fn test_uncaught_exception_reported() {
    setup_test_logging();
    if !python_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let code = "print('before', flush=True)\nraise ValueError('bad resolution')";

    let result = test_runtime()
        .run(code, "raises", Some(dir.path()), &ExecutionConfig::default())
        .await;

    assert_eq!(result.exit_code, 1);
    assert_eq!(result.stdout.trim(), "before");
    assert!(result.stderr.contains("ValueError: bad resolution"));
    assert_eq!(
        result.error.as_deref(),
        Some("Simulation failed with exit code 1")
    );
    assert!(!result.memory_exceeded);
    assert!(!result.timeout_exceeded);
}

#[tokio::test]
async fn test_invalid_utf8_output_is_replaced() {
    setup_test_logging();
    if !python_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let code = "import sys\nsys.stdout.buffer.write(b'ok \\xff\\xfe end\\n')";

    let result = test_runtime()
        .run(code, "bytes", Some(dir.path()), &ExecutionConfig::default())
        .await;

    assert_eq!(result.exit_code, 0);
    assert!(result.stdout.starts_with("ok "));
    assert!(result.stdout.contains('\u{FFFD}'));
    assert!(result.stdout.contains("end"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_killed_by_signal() {
    setup_test_logging();
    if !python_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let code = "import os, signal\nos.kill(os.getpid(), signal.SIGKILL)";

    let result = test_runtime()
        .run(code, "killed", Some(dir.path()), &ExecutionConfig::default())
        .await;

    assert_eq!(result.exit_code, -9);
    assert!(!result.timeout_exceeded);
    assert_matches!(result.error.as_deref(), Some(e) if e.contains("signal 9"));
}

#[tokio::test]
async fn test_output_files_listed_without_script() {
    setup_test_logging();
    if !python_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let code = "open('b_field.csv', 'w').write('1,2\\n')\nopen('a_spectrum.csv', 'w').write('3\\n')";

    let result = test_runtime()
        .run(code, "files", Some(dir.path()), &ExecutionConfig::default())
        .await;

    assert_eq!(result.exit_code, 0);
    let expected: Vec<String> = ["a_spectrum.csv", "b_field.csv"]
        .iter()
        .map(|name| dir.path().join(name).to_string_lossy().into_owned())
        .collect();
    assert_eq!(result.output_files, expected);
    assert!(!result
        .output_files
        .iter()
        .any(|f| f.ends_with(&script_file_name("files"))));
}

#[tokio::test]
async fn test_script_removed_when_not_kept() {
    setup_test_logging();
    if !python_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let config = ExecutionConfig::default().with_keep_script(false);

    let result = test_runtime()
        .run("print('bye')", "ephemeral", Some(dir.path()), &config)
        .await;

    assert_eq!(result.exit_code, 0);
    assert!(!dir.path().join(script_file_name("ephemeral")).exists());
}

#[tokio::test]
async fn test_thread_and_extra_env_visible_to_script() {
    setup_test_logging();
    if !python_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let config = ExecutionConfig::default()
        .with_cpu_cores(3)
        .with_env("REPROLAB_TEST_MARKER", "sentinel");
    let code = "import os\nprint(os.environ['OMP_NUM_THREADS'], os.environ['MKL_NUM_THREADS'], os.environ['REPROLAB_TEST_MARKER'])";

    let result = test_runtime()
        .run(code, "env", Some(dir.path()), &config)
        .await;

    assert_eq!(result.exit_code, 0, "stderr: {}", result.stderr);
    assert_eq!(result.stdout.trim(), "3 3 sentinel");
}

#[tokio::test]
async fn test_working_dir_override() {
    setup_test_logging();
    if !python_available() {
        return;
    }
    let output = tempfile::tempdir().unwrap();
    let workdir = tempfile::tempdir().unwrap();
    let config = ExecutionConfig::default().with_working_dir(workdir.path());

    let result = test_runtime()
        .run(
            "open('elsewhere.txt', 'w').write('x')",
            "cwd",
            Some(output.path()),
            &config,
        )
        .await;

    assert_eq!(result.exit_code, 0);
    assert!(workdir.path().join("elsewhere.txt").exists());
    assert!(result.output_files.is_empty());
}

#[tokio::test]
async fn test_missing_interpreter_is_launcher_failure() {
    setup_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let runtime = test_runtime().with_python("reprolab-no-such-python");

    let result = runtime
        .run("print('x')", "nopython", Some(dir.path()), &ExecutionConfig::default())
        .await;

    assert_eq!(result.exit_code, LAUNCHER_FAILURE_EXIT_CODE);
    assert_matches!(result.error.as_deref(), Some(e) if e.starts_with("Execution error:"));
    assert!(!result.timeout_exceeded);
}
