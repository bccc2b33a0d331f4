//! Sandbox settings

use crate::error::{SandboxError, SandboxResult};
use crate::limits::ExecutionConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the shared optical-data directory exposed to every run
pub const MATERIALS_DIR_NAME: &str = "materials";

/// Settings shared by every execution the service performs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxSettings {
    /// Interpreter used to run generated scripts
    #[serde(default = "SandboxSettings::default_python")]
    pub python_executable: String,

    /// Library every simulation script is expected to import
    #[serde(default = "SandboxSettings::default_required_import")]
    pub required_import: String,

    /// Material data directory; `<cwd>/materials` when unset
    #[serde(default)]
    pub materials_dir: Option<PathBuf>,

    /// Root of the legacy `<root>/<paper_id>/<stage_id>` output layout
    #[serde(default = "SandboxSettings::default_output_root")]
    pub output_root: PathBuf,

    /// Defaults for runs that do not override them
    #[serde(default)]
    pub execution: ExecutionConfig,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            python_executable: Self::default_python(),
            required_import: Self::default_required_import(),
            materials_dir: None,
            output_root: Self::default_output_root(),
            execution: ExecutionConfig::default(),
        }
    }
}

impl SandboxSettings {
    /// Load settings from `path`, or from the default location when `None`.
    ///
    /// A missing default file yields defaults; an explicit path must exist.
    pub fn load(path: Option<&Path>) -> SandboxResult<Self> {
        let (config_path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::config_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        if !explicit && !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path)?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> SandboxResult<Self> {
        let settings: SandboxSettings = toml::from_str(content)
            .map_err(|e| SandboxError::Config(format!("Failed to parse config: {}", e)))?;
        settings.execution.validate().map_err(|e| {
            SandboxError::Config(format!("Invalid [execution] section: {}", e))
        })?;
        Ok(settings)
    }

    /// Default configuration file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("reprolab").join("sandbox.toml"))
    }

    fn default_python() -> String {
        if cfg!(windows) {
            "python".to_string()
        } else {
            "python3".to_string()
        }
    }

    fn default_required_import() -> String {
        "meep".to_string()
    }

    fn default_output_root() -> PathBuf {
        PathBuf::from("outputs")
    }
}
