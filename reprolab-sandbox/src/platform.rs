//! Host platform capability detection
//!
//! Answers "what can this OS enforce?" once per process. Detection is a pure
//! function of a few probed host facts ([`HostFacts`]) so every branch can be
//! exercised without the matching OS.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

/// Setting this to `1` silences the one-time platform warnings.
/// Resource limiting itself is unaffected.
pub const SKIP_RESOURCE_LIMITS_ENV: &str = "REPROLAB_SKIP_RESOURCE_LIMITS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Macos,
    Linux,
    Wsl,
}

/// Sandboxing primitives available on the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformCapabilities {
    pub platform: Platform,
    /// Address-space rlimit can be installed in the child
    pub memory_limiting_available: bool,
    /// The child can be placed in its own process group and killed as a group
    pub process_group_kill_available: bool,
    /// A hook can run in the child between fork and exec
    pub preexec_fn_available: bool,
    pub is_wsl: bool,
    pub warnings: Vec<String>,
    pub recommended_action: Option<String>,
}

impl PlatformCapabilities {
    fn full(platform: Platform) -> Self {
        Self {
            platform,
            memory_limiting_available: true,
            process_group_kill_available: true,
            preexec_fn_available: true,
            is_wsl: platform == Platform::Wsl,
            warnings: Vec::new(),
            recommended_action: None,
        }
    }
}

/// Operating system family as reported by the build target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOs {
    Windows,
    MacOs,
    Linux,
    Other(String),
}

impl HostOs {
    pub fn from_os_name(name: &str) -> Self {
        match name {
            "windows" => HostOs::Windows,
            "macos" => HostOs::MacOs,
            "linux" => HostOs::Linux,
            other => HostOs::Other(other.to_string()),
        }
    }
}

/// Raw facts the classification is computed from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFacts {
    pub os: HostOs,
    /// `uname -r`; `None` when it could not be read
    pub kernel_release: Option<String>,
    /// `uname -m`; `None` when it could not be read
    pub machine: Option<String>,
}

impl HostFacts {
    /// Probe the running host. Never fails; unreadable facts become `None`.
    pub fn probe() -> Self {
        let (kernel_release, machine) = match uname() {
            Some((release, machine)) => (Some(release), Some(machine)),
            None => (None, None),
        };
        Self {
            os: HostOs::from_os_name(std::env::consts::OS),
            kernel_release,
            machine: machine.or_else(|| Some(std::env::consts::ARCH.to_string())),
        }
    }
}

/// Whether a kernel release string identifies Windows Subsystem for Linux.
pub fn is_wsl_release(release: &str) -> bool {
    let release = release.to_lowercase();
    release.contains("microsoft") || release.contains("wsl")
}

fn is_arm64(machine: &str) -> bool {
    matches!(machine.to_lowercase().as_str(), "arm64" | "aarch64")
}

/// Map probed host facts to a capability record.
pub fn classify(facts: &HostFacts) -> PlatformCapabilities {
    match &facts.os {
        HostOs::Windows => PlatformCapabilities {
            platform: Platform::Windows,
            memory_limiting_available: false,
            process_group_kill_available: false,
            preexec_fn_available: false,
            is_wsl: false,
            warnings: vec![
                "Memory limiting is not available on native Windows: a runaway simulation \
                 can exhaust system memory"
                    .to_string(),
                "Process group termination is limited on Windows: processes spawned by a \
                 simulation may survive its timeout"
                    .to_string(),
            ],
            recommended_action: Some(
                "Run simulations under WSL2 or in a container to get memory limiting and \
                 reliable process cleanup"
                    .to_string(),
            ),
        },
        HostOs::Linux => {
            let wsl = facts
                .kernel_release
                .as_deref()
                .map(is_wsl_release)
                .unwrap_or(false);
            if wsl {
                PlatformCapabilities::full(Platform::Wsl)
            } else {
                PlatformCapabilities::full(Platform::Linux)
            }
        }
        HostOs::MacOs => {
            let mut caps = PlatformCapabilities::full(Platform::Macos);
            if facts.machine.as_deref().map(is_arm64).unwrap_or(false) {
                caps.warnings.push(
                    "Running on Apple Silicon (arm64): use native arm64 builds of the \
                     simulation stack; x86_64 builds under Rosetta are much slower and may \
                     misbehave"
                        .to_string(),
                );
            }
            caps
        }
        // Unlisted targets are overwhelmingly Unix-like
        HostOs::Other(_) => PlatformCapabilities::full(Platform::Linux),
    }
}

/// Detect capabilities of the running host without touching the cache.
pub fn detect() -> PlatformCapabilities {
    let facts = HostFacts::probe();
    let caps = classify(&facts);
    tracing::debug!(
        os = ?facts.os,
        kernel_release = ?facts.kernel_release,
        platform = ?caps.platform,
        "Detected platform capabilities"
    );
    caps
}

static CAPABILITIES: OnceLock<PlatformCapabilities> = OnceLock::new();

/// Process-wide capabilities, detected on first access.
pub fn platform_capabilities() -> &'static PlatformCapabilities {
    CAPABILITIES.get_or_init(detect)
}

/// Emits capability warnings at most once.
pub struct WarningGate {
    emitted: AtomicBool,
}

impl WarningGate {
    pub const fn new() -> Self {
        Self {
            emitted: AtomicBool::new(false),
        }
    }

    /// Log each warning (and the recommended action) the first time this is
    /// called with `suppressed == false`. Returns the number of lines logged.
    pub fn emit(&self, caps: &PlatformCapabilities, suppressed: bool) -> usize {
        if suppressed || caps.warnings.is_empty() {
            return 0;
        }
        if self.emitted.swap(true, Ordering::SeqCst) {
            return 0;
        }

        for warning in &caps.warnings {
            tracing::warn!(platform = ?caps.platform, "{}", warning);
        }
        let mut logged = caps.warnings.len();
        if let Some(action) = &caps.recommended_action {
            tracing::warn!(platform = ?caps.platform, "Recommended: {}", action);
            logged += 1;
        }
        logged
    }
}

impl Default for WarningGate {
    fn default() -> Self {
        Self::new()
    }
}

static WARNING_GATE: WarningGate = WarningGate::new();

pub fn warnings_suppressed() -> bool {
    std::env::var(SKIP_RESOURCE_LIMITS_ENV)
        .map(|v| v == "1")
        .unwrap_or(false)
}

/// Log platform warnings once per process unless suppressed via
/// [`SKIP_RESOURCE_LIMITS_ENV`].
pub fn emit_warnings(caps: &PlatformCapabilities) -> usize {
    WARNING_GATE.emit(caps, warnings_suppressed())
}

#[cfg(unix)]
fn uname() -> Option<(String, String)> {
    use std::ffi::CStr;

    // SAFETY: utsname is plain old data; uname fills it with NUL-terminated strings.
    let mut buf: libc::utsname = unsafe { std::mem::zeroed() };
    if unsafe { libc::uname(&mut buf) } != 0 {
        return None;
    }
    let release = unsafe { CStr::from_ptr(buf.release.as_ptr()) }
        .to_string_lossy()
        .into_owned();
    let machine = unsafe { CStr::from_ptr(buf.machine.as_ptr()) }
        .to_string_lossy()
        .into_owned();
    Some((release, machine))
}

#[cfg(not(unix))]
fn uname() -> Option<(String, String)> {
    None
}
