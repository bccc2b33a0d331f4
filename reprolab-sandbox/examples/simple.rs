//! Simple sandbox example - run a few scripts and print the results

use reprolab_sandbox::{ExecutionConfig, ExecutionResult, SandboxService, SandboxSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let service = SandboxService::from_settings(SandboxSettings::default());

    println!("=== Sandbox Service Example ===\n");
    println!("Runtime: {}\n", service.runtime_name());

    println!("Example 1: Hello");
    let result = service
        .execute("print('Hello from sandbox!')", "hello", None, &ExecutionConfig::default())
        .await;
    print_result(&result);

    println!("\nExample 2: Long running script with timeout");
    let config = ExecutionConfig::default().with_timeout(2);
    let result = service
        .execute(
            "import time\nprint('sleeping', flush=True)\ntime.sleep(10)",
            "sleepy",
            None,
            &config,
        )
        .await;
    print_result(&result);

    println!("\nExample 3: Script that writes an output file");
    let output_dir = std::env::temp_dir().join("reprolab-simple");
    let result = service
        .execute(
            "open('spectrum.csv', 'w').write('wavelength,T\\n1.55,0.93\\n')",
            "spectrum",
            Some(&output_dir),
            &ExecutionConfig::default(),
        )
        .await;
    print_result(&result);

    println!("\nExample 4: Static checks");
    for warning in service.validate("import subprocess\nsubprocess.run(['ls'])\nplt.show()") {
        println!("  {}", warning);
    }

    Ok(())
}

fn print_result(result: &ExecutionResult) {
    for line in result.stdout.lines() {
        println!("  stdout: {}", line);
    }
    for line in result.stderr.lines() {
        println!("  stderr: {}", line);
    }
    println!(
        "  Result: exit_code={} runtime={:.2}s timed_out={}",
        result.exit_code, result.runtime_seconds, result.timeout_exceeded
    );
    for file in &result.output_files {
        println!("  Output: {}", file);
    }
    if let Some(error) = &result.error {
        println!("  Error: {}", error);
    }
}
