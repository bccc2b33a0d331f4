//! Process-based runtime

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument, Span};

use super::workspace::{self, MaterialsOutcome};
use crate::config::SandboxSettings;
use crate::execution::ExecutionId;
use crate::limits::ExecutionConfig;
use crate::platform::{self, PlatformCapabilities};
use crate::types::{ExecutionResult, LAUNCHER_FAILURE_EXIT_CODE};

/// Thread-count variables of the common numeric libraries
/// (OpenMP, OpenBLAS, MKL, NumExpr, Accelerate)
pub const THREAD_ENV_VARS: &[&str] = &[
    "OMP_NUM_THREADS",
    "OPENBLAS_NUM_THREADS",
    "MKL_NUM_THREADS",
    "NUMEXPR_NUM_THREADS",
    "VECLIB_MAXIMUM_THREADS",
];

/// Lower-cased stderr phrases that indicate the child ran out of memory
const MEMORY_ERROR_MARKERS: &[&str] = &["memoryerror", "cannot allocate"];

/// How long to keep reading pipes after the child is gone
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// How long to wait for a killed child to be reaped
const REAP_GRACE: Duration = Duration::from_secs(5);

/// Where the material data directory comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterialsSource {
    /// `<cwd>/materials`, resolved at run time
    WorkingDirectory,
    Path(PathBuf),
    Disabled,
}

impl MaterialsSource {
    fn resolve(&self) -> Option<PathBuf> {
        match self {
            MaterialsSource::WorkingDirectory => std::env::current_dir()
                .ok()
                .map(|cwd| cwd.join(crate::config::MATERIALS_DIR_NAME)),
            MaterialsSource::Path(path) => Some(path.clone()),
            MaterialsSource::Disabled => None,
        }
    }
}

/// Runs generated Python scripts as child processes under a wall-clock
/// timeout and, where the platform allows, an address-space limit.
pub struct ProcessRuntime {
    python: String,
    capabilities: Arc<PlatformCapabilities>,
    materials: MaterialsSource,
}

impl ProcessRuntime {
    /// Runtime using the process-wide platform capabilities.
    ///
    /// Emits the platform warnings the first time any runtime is created.
    pub fn new() -> Self {
        let capabilities = platform::platform_capabilities();
        platform::emit_warnings(capabilities);
        Self::with_capabilities(capabilities.clone())
    }

    /// Runtime with explicitly supplied capabilities (no warnings emitted).
    pub fn with_capabilities(capabilities: PlatformCapabilities) -> Self {
        Self {
            python: SandboxSettings::default().python_executable,
            capabilities: Arc::new(capabilities),
            materials: MaterialsSource::WorkingDirectory,
        }
    }

    pub fn from_settings(settings: &SandboxSettings) -> Self {
        let materials = match &settings.materials_dir {
            Some(dir) => MaterialsSource::Path(dir.clone()),
            None => MaterialsSource::WorkingDirectory,
        };
        Self::new()
            .with_python(settings.python_executable.clone())
            .with_materials(materials)
    }

    pub fn with_python(mut self, python: impl Into<String>) -> Self {
        self.python = python.into();
        self
    }

    pub fn with_materials(mut self, materials: MaterialsSource) -> Self {
        self.materials = materials;
        self
    }

    pub fn capabilities(&self) -> &PlatformCapabilities {
        &self.capabilities
    }

    async fn run_in_dir(
        &self,
        code: &str,
        stage_id: &str,
        output_dir: Option<&Path>,
        config: &ExecutionConfig,
    ) -> ExecutionResult {
        let start = Instant::now();

        if let Err(e) = config.validate() {
            return ExecutionResult::launcher_failure(e.to_string(), 0.0);
        }

        let prepared = {
            let output_dir = output_dir.map(Path::to_path_buf);
            let stage_id = stage_id.to_string();
            let code = code.to_string();
            let materials = self.materials.resolve();
            let span = Span::current();
            tokio::task::spawn_blocking(move || {
                span.in_scope(|| {
                    workspace::prepare_run(
                        output_dir.as_deref(),
                        &stage_id,
                        &code,
                        materials.as_deref(),
                    )
                })
            })
            .await
        };
        let prepared = match prepared {
            Ok(Ok(prepared)) => prepared,
            Ok(Err(message)) => {
                return ExecutionResult::launcher_failure(message, start.elapsed().as_secs_f64())
            }
            Err(e) => {
                return ExecutionResult::launcher_failure(
                    format!("Execution error: {}", e),
                    start.elapsed().as_secs_f64(),
                )
            }
        };

        match &prepared.materials {
            MaterialsOutcome::Failed(reason) => {
                warn!(%reason, "Could not expose materials directory, continuing without it")
            }
            outcome => debug!(?outcome, "Materials directory"),
        }

        info!(
            script = %prepared.script_path.display(),
            timeout_secs = config.timeout_seconds,
            max_memory_gb = config.max_memory_gb,
            max_cpu_cores = config.max_cpu_cores,
            "Launching simulation"
        );

        let mut result = self
            .launch(&prepared.script_path, prepared.dir.path(), config, start)
            .await;

        let keep_script = config.keep_script;
        let span = Span::current();
        let finished = tokio::task::spawn_blocking(move || {
            span.in_scope(|| workspace::finish_run(&prepared, keep_script))
        })
        .await;
        result.output_files = match finished {
            Ok(Ok(files)) => files,
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to list output files");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "Output collection task failed");
                Vec::new()
            }
        };

        info!(
            exit_code = result.exit_code,
            runtime_seconds = result.runtime_seconds,
            timeout_exceeded = result.timeout_exceeded,
            memory_exceeded = result.memory_exceeded,
            output_files = result.output_files.len(),
            "Simulation finished"
        );

        result
    }

    async fn launch(
        &self,
        script_path: &Path,
        output_dir: &Path,
        config: &ExecutionConfig,
        start: Instant,
    ) -> ExecutionResult {
        let mut cmd = Command::new(&self.python);
        cmd.arg(script_path)
            .current_dir(config.working_dir.as_deref().unwrap_or(output_dir))
            .envs(child_environment(config))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        {
            if self.capabilities.process_group_kill_available {
                cmd.process_group(0);
            }
            if self.capabilities.memory_limiting_available && self.capabilities.preexec_fn_available
            {
                super::preexec::install_memory_limit(&mut cmd, config.memory_limit_bytes());
            }
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ExecutionResult::launcher_failure(
                    format!("Execution error: failed to start {}: {}", self.python, e),
                    start.elapsed().as_secs_f64(),
                )
            }
        };

        let stdout = PipeCapture::spawn(child.stdout.take());
        let stderr = PipeCapture::spawn(child.stderr.take());

        let outcome = match tokio::time::timeout(config.timeout(), child.wait()).await {
            Ok(Ok(status)) => WaitOutcome::Exited(status),
            Ok(Err(e)) => WaitOutcome::Failed(e),
            Err(_) => {
                warn!(timeout_secs = config.timeout_seconds, "Simulation timed out, killing it");
                self.terminate(&mut child).await;
                WaitOutcome::TimedOut
            }
        };
        let runtime_seconds = start.elapsed().as_secs_f64();

        let stdout = stdout.finish().await;
        let stderr = stderr.finish().await;

        build_result(outcome, stdout, stderr, runtime_seconds, config.timeout_seconds)
    }

    /// Kill the child (and its process group where supported) and reap it.
    async fn terminate(&self, child: &mut Child) {
        #[cfg(unix)]
        if self.capabilities.process_group_kill_available {
            if let Some(pid) = child.id() {
                // SAFETY: killpg only sends a signal; the group was created for this child.
                if unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) } != 0 {
                    debug!(
                        error = %std::io::Error::last_os_error(),
                        "Failed to kill process group"
                    );
                }
            }
        }

        if let Err(e) = child.start_kill() {
            debug!(error = %e, "Failed to kill child");
        }
        if tokio::time::timeout(REAP_GRACE, child.wait()).await.is_err() {
            warn!("Killed child was not reaped in time");
        }
    }
}

impl Default for ProcessRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl super::Runtime for ProcessRuntime {
    async fn run(
        &self,
        code: &str,
        stage_id: &str,
        output_dir: Option<&Path>,
        config: &ExecutionConfig,
    ) -> ExecutionResult {
        let execution_id = ExecutionId::new();
        let span = tracing::info_span!("execution", %execution_id, stage_id);
        self.run_in_dir(code, stage_id, output_dir, config)
            .instrument(span)
            .await
    }

    fn name(&self) -> &str {
        "process"
    }
}

/// Environment overrides for the child: thread counts first, caller
/// variables last so they win. Everything else is inherited.
pub fn child_environment(config: &ExecutionConfig) -> Vec<(String, String)> {
    let cores = config.max_cpu_cores.to_string();
    let mut env: Vec<(String, String)> = THREAD_ENV_VARS
        .iter()
        .map(|var| (var.to_string(), cores.clone()))
        .collect();

    if let Some(extra) = &config.env_vars {
        let mut extra: Vec<_> = extra.iter().collect();
        extra.sort();
        env.extend(extra.into_iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    env
}

enum WaitOutcome {
    Exited(ExitStatus),
    Failed(std::io::Error),
    TimedOut,
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    LAUNCHER_FAILURE_EXIT_CODE
}

/// Failure description and memory flag for a finished child.
///
/// Output content is not inspected for "nan"/"inf": physics scripts print
/// names like `eps_inf` legitimately, and numerical validity is judged from
/// the output files downstream.
pub(crate) fn classify_exit(exit_code: i32, stderr: &str) -> (Option<String>, bool) {
    if exit_code == 0 {
        return (None, false);
    }

    let stderr = stderr.to_lowercase();
    if MEMORY_ERROR_MARKERS.iter().any(|m| stderr.contains(m)) {
        return (Some("Memory limit exceeded".to_string()), true);
    }
    if exit_code < 0 {
        return (
            Some(format!(
                "Process killed (signal {}) - likely resource limit",
                -exit_code
            )),
            false,
        );
    }
    (
        Some(format!("Simulation failed with exit code {}", exit_code)),
        false,
    )
}

fn build_result(
    outcome: WaitOutcome,
    stdout: String,
    stderr: String,
    runtime_seconds: f64,
    timeout_seconds: u64,
) -> ExecutionResult {
    match outcome {
        WaitOutcome::Exited(status) => {
            let exit_code = exit_code(status);
            let (error, memory_exceeded) = classify_exit(exit_code, &stderr);
            ExecutionResult {
                stdout,
                stderr,
                exit_code,
                output_files: Vec::new(),
                runtime_seconds,
                error,
                memory_exceeded,
                timeout_exceeded: false,
            }
        }
        WaitOutcome::TimedOut => ExecutionResult {
            stdout,
            stderr,
            exit_code: LAUNCHER_FAILURE_EXIT_CODE,
            output_files: Vec::new(),
            runtime_seconds,
            error: Some(format!(
                "Simulation exceeded timeout ({}s)",
                timeout_seconds
            )),
            memory_exceeded: false,
            timeout_exceeded: true,
        },
        WaitOutcome::Failed(e) => ExecutionResult {
            stdout,
            stderr,
            ..ExecutionResult::launcher_failure(format!("Execution error: {}", e), runtime_seconds)
        },
    }
}

/// Reads a child pipe to the end in the background.
///
/// Bytes land in a shared buffer so whatever arrived before a timeout kill
/// is kept even if the reader has to be abandoned.
struct PipeCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    reader: Option<JoinHandle<()>>,
}

impl PipeCapture {
    fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let reader = pipe.map(|mut pipe| {
            let sink = Arc::clone(&buffer);
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    match pipe.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if let Ok(mut buf) = sink.lock() {
                                buf.extend_from_slice(&chunk[..n]);
                            }
                        }
                    }
                }
            })
        });
        Self { buffer, reader }
    }

    /// Wait briefly for EOF, then decode what was captured. Invalid UTF-8
    /// is replaced, never fatal.
    async fn finish(mut self) -> String {
        if let Some(mut reader) = self.reader.take() {
            if tokio::time::timeout(DRAIN_GRACE, &mut reader).await.is_err() {
                debug!("Pipe still open after child exit, keeping partial output");
                reader.abort();
            }
        }
        let bytes = self
            .buffer
            .lock()
            .map(|buf| buf.clone())
            .unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}
