//! End-to-end tests for resource limits and output-directory lifecycle

use std::fs;
use std::path::PathBuf;

use reprolab_sandbox::{platform_capabilities, ExecutionConfig, MaterialsSource, Runtime};

use crate::common::{python_available, setup_test_logging, test_runtime};

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_memory_limit_stops_large_allocation() {
    setup_test_logging();
    if !python_available() || !platform_capabilities().memory_limiting_available {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let config = ExecutionConfig::default().with_memory_gb(0.25);
    let code = "data = bytearray(2 * 1024 ** 3)\nprint('allocated')";

    let result = test_runtime()
        .run(code, "hungry", Some(dir.path()), &config)
        .await;

    assert_ne!(result.exit_code, 0);
    assert!(!result.stdout.contains("allocated"));
    assert!(result.memory_exceeded, "stderr: {}", result.stderr);
    assert_eq!(result.error.as_deref(), Some("Memory limit exceeded"));
}

#[tokio::test]
async fn test_temporary_directory_removed_without_outputs() {
    setup_test_logging();
    if !python_available() {
        return;
    }

    let result = test_runtime()
        .run(
            "import os\nprint(os.getcwd())",
            "scratch",
            None,
            &ExecutionConfig::default(),
        )
        .await;

    assert_eq!(result.exit_code, 0);
    assert!(result.output_files.is_empty());
    let workdir = PathBuf::from(result.stdout.trim());
    assert!(!workdir.exists(), "{} was left behind", workdir.display());
}

#[tokio::test]
async fn test_temporary_directory_kept_with_outputs() {
    setup_test_logging();
    if !python_available() {
        return;
    }

    let result = test_runtime()
        .run(
            "open('field.csv', 'w').write('0\\n')",
            "scratch",
            None,
            &ExecutionConfig::default(),
        )
        .await;

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.output_files.len(), 1);
    let output = PathBuf::from(&result.output_files[0]);
    assert!(output.exists());

    let dir = output.parent().unwrap().to_path_buf();
    assert!(dir
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("scratch_"));
    fs::remove_dir_all(dir).unwrap();
}

#[tokio::test]
async fn test_temporary_directory_kept_with_nested_outputs() {
    setup_test_logging();
    if !python_available() {
        return;
    }
    let code = "import os\nos.makedirs('plots')\nopen('plots/spectrum.png', 'w').write('x')\nprint(os.getcwd())";

    let result = test_runtime()
        .run(code, "plots", None, &ExecutionConfig::default())
        .await;

    assert_eq!(result.exit_code, 0, "stderr: {}", result.stderr);
    // Only top-level files are listed.
    assert!(result.output_files.is_empty());
    let workdir = PathBuf::from(result.stdout.trim());
    assert!(workdir.join("plots").join("spectrum.png").is_file());
    fs::remove_dir_all(workdir).unwrap();
}

#[tokio::test]
async fn test_materials_visible_to_script() {
    setup_test_logging();
    if !python_available() {
        return;
    }
    let materials = tempfile::tempdir().unwrap();
    fs::write(materials.path().join("silicon.txt"), "3.48").unwrap();
    let dir = tempfile::tempdir().unwrap();
    let runtime = test_runtime().with_materials(MaterialsSource::Path(materials.path().into()));

    let result = runtime
        .run(
            "print(open('materials/silicon.txt').read())",
            "optics",
            Some(dir.path()),
            &ExecutionConfig::default(),
        )
        .await;

    assert_eq!(result.exit_code, 0, "stderr: {}", result.stderr);
    assert_eq!(result.stdout.trim(), "3.48");
    assert!(dir.path().join("materials").join("silicon.txt").exists());
    // The materials entry is a directory, not an output file.
    assert!(result.output_files.is_empty());
}
