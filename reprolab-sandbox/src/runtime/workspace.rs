//! Output-directory management for a single run

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::MATERIALS_DIR_NAME;

/// Script file name for a stage: `simulation_<stage_id>.py`
pub fn script_file_name(stage_id: &str) -> String {
    format!("simulation_{}.py", sanitize_stage_id(stage_id))
}

/// Keep stage ids from escaping the output directory when used in file names.
fn sanitize_stage_id(stage_id: &str) -> String {
    stage_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .replace("..", "__")
}

/// Directory a run writes into, owned by that run for its duration
#[derive(Debug)]
pub(crate) struct OutputDir {
    path: PathBuf,
    temporary: bool,
}

impl OutputDir {
    /// Create `requested` (made absolute), or a fresh temporary directory
    /// prefixed with the stage id.
    pub(crate) fn resolve(requested: Option<&Path>, stage_id: &str) -> io::Result<Self> {
        match requested {
            Some(dir) => {
                let path = if dir.is_absolute() {
                    dir.to_path_buf()
                } else {
                    std::env::current_dir()?.join(dir)
                };
                fs::create_dir_all(&path)?;
                Ok(Self {
                    path,
                    temporary: false,
                })
            }
            None => {
                let dir = tempfile::Builder::new()
                    .prefix(&format!("{}_", sanitize_stage_id(stage_id)))
                    .tempdir()?;
                Ok(Self {
                    path: dir.keep(),
                    temporary: true,
                })
            }
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn is_temporary(&self) -> bool {
        self.temporary
    }

    /// Remove the directory if this run created it
    pub(crate) fn discard(&self) -> io::Result<()> {
        if self.temporary {
            fs::remove_dir_all(&self.path)?;
        }
        Ok(())
    }
}

pub(crate) fn write_script(dir: &Path, stage_id: &str, code: &str) -> io::Result<PathBuf> {
    let script_path = dir.join(script_file_name(stage_id));
    fs::write(&script_path, code)?;
    Ok(script_path)
}

/// How the material data directory was made available to a run
#[derive(Debug, PartialEq, Eq)]
pub enum MaterialsOutcome {
    /// No material directory to expose
    Absent,
    /// Something named `materials` already exists in the output directory
    AlreadyPresent,
    Linked,
    /// Symlinking failed; a full copy was made instead
    Copied,
    Failed(String),
}

/// Expose `source` as `<dir>/materials` so relative data paths in scripts
/// resolve. Symlinks first and falls back to a recursive copy.
pub(crate) fn provide_materials(source: Option<&Path>, dir: &Path) -> MaterialsOutcome {
    let source = match source {
        Some(source) if source.is_dir() => source,
        _ => return MaterialsOutcome::Absent,
    };

    let target = dir.join(MATERIALS_DIR_NAME);
    if target.symlink_metadata().is_ok() {
        return MaterialsOutcome::AlreadyPresent;
    }

    let source = source.canonicalize().unwrap_or_else(|_| source.to_path_buf());
    match symlink_dir(&source, &target) {
        Ok(()) => MaterialsOutcome::Linked,
        Err(link_err) => match copy_dir_recursive(&source, &target) {
            Ok(()) => MaterialsOutcome::Copied,
            Err(copy_err) => MaterialsOutcome::Failed(format!(
                "symlink failed ({}), copy failed ({})",
                link_err, copy_err
            )),
        },
    }
}

#[cfg(unix)]
fn symlink_dir(source: &Path, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(source, target)
}

#[cfg(windows)]
fn symlink_dir(source: &Path, target: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(source, target)
}

#[cfg(not(any(unix, windows)))]
fn symlink_dir(_source: &Path, _target: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symlinks are not supported on this platform",
    ))
}

fn copy_dir_recursive(source: &Path, target: &Path) -> io::Result<()> {
    fs::create_dir_all(target)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let dest = target.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &dest)?;
        } else {
            fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

/// Output directory, script and materials laid out for one run
#[derive(Debug)]
pub(crate) struct PreparedRun {
    pub(crate) dir: OutputDir,
    pub(crate) script_path: PathBuf,
    pub(crate) materials: MaterialsOutcome,
}

/// Create the output directory, write the script and expose materials.
///
/// Errors are the messages reported on the execution result.
pub(crate) fn prepare_run(
    output_dir: Option<&Path>,
    stage_id: &str,
    code: &str,
    materials: Option<&Path>,
) -> Result<PreparedRun, String> {
    let dir = OutputDir::resolve(output_dir, stage_id)
        .map_err(|e| format!("Failed to create output directory: {}", e))?;

    let script_path = match write_script(dir.path(), stage_id, code) {
        Ok(path) => path,
        Err(e) => {
            if let Err(cleanup_err) = dir.discard() {
                debug!(error = %cleanup_err, "Failed to remove temporary output directory");
            }
            return Err(format!("Failed to write script: {}", e));
        }
    };

    let materials = provide_materials(materials, dir.path());
    Ok(PreparedRun {
        dir,
        script_path,
        materials,
    })
}

/// List the run's output files, then drop the script unless it is kept and
/// remove a temporary directory the script left no outputs in.
pub(crate) fn finish_run(prepared: &PreparedRun, keep_script: bool) -> io::Result<Vec<String>> {
    let dir = prepared.dir.path();
    let files = list_output_files(dir, &prepared.script_path);

    if !keep_script {
        if let Err(e) = fs::remove_file(&prepared.script_path) {
            debug!(error = %e, "Failed to remove script");
        }
    }

    if prepared.dir.is_temporary() {
        match has_outputs(dir, &prepared.script_path) {
            Ok(false) => {
                if let Err(e) = prepared.dir.discard() {
                    debug!(error = %e, "Failed to remove temporary output directory");
                }
            }
            Ok(true) => {}
            Err(e) => debug!(error = %e, "Could not inspect output directory, keeping it"),
        }
    }

    files
}

/// Whether `dir` holds anything besides the script and the materials entry.
/// Nested directories count, so results under `plots/` keep the directory.
pub(crate) fn has_outputs(dir: &Path, script_path: &Path) -> io::Result<bool> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.path() == script_path || entry.file_name() == MATERIALS_DIR_NAME {
            continue;
        }
        return Ok(true);
    }
    Ok(false)
}

/// Regular files at the top of `dir`, excluding the script, sorted.
pub(crate) fn list_output_files(dir: &Path, script_path: &Path) -> io::Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path == script_path || !path.is_file() {
            continue;
        }
        files.push(path.to_string_lossy().into_owned());
    }
    files.sort();
    Ok(files)
}
