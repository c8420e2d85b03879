//! External tool validation.
//!
//! Tool locations arrive as named configuration values. They are checked up
//! front so a missing tool surfaces as a named configuration error instead
//! of an obscure spawn failure halfway through a run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::VerifyError;

/// A validated external tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolHandle {
    /// Configuration variable the tool was taken from.
    pub variable: String,

    /// Resolved path to the executable.
    pub path: PathBuf,
}

impl ToolHandle {
    pub fn program(&self) -> String {
        self.path.display().to_string()
    }
}

/// Validate that `value` names an existing executable file.
///
/// Relative values are resolved against the current directory.
pub fn validate_tool(variable: &str, value: Option<&str>) -> Result<ToolHandle, VerifyError> {
    let cwd = std::env::current_dir().map_err(|e| VerifyError::Configuration {
        variable: variable.to_string(),
        reason: format!("cannot be resolved: current directory is unreadable: {e}"),
    })?;
    validate_tool_in(variable, value, &cwd)
}

/// Like [`validate_tool`], resolving relative values against `cwd`.
///
/// A bare name is taken from `cwd` when a file of that name exists there and
/// looked up on `PATH` otherwise. The returned path is always absolute, so it
/// is the file that gets spawned.
pub fn validate_tool_in(
    variable: &str,
    value: Option<&str>,
    cwd: &Path,
) -> Result<ToolHandle, VerifyError> {
    let config_error = |reason: String| VerifyError::Configuration {
        variable: variable.to_string(),
        reason,
    };

    let raw = match value.map(str::trim) {
        None => return Err(config_error("is not set".to_string())),
        Some("") => return Err(config_error("is set but empty".to_string())),
        Some(v) => v,
    };

    let candidate = Path::new(raw);
    let path = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        let local = cwd.join(candidate);
        if candidate.components().count() == 1 && !local.exists() {
            which::which(raw)
                .map_err(|_| config_error(format!("names `{raw}`, which was not found on PATH")))?
        } else {
            local
        }
    };

    if !path.exists() {
        return Err(config_error(format!("points to {}, which does not exist", path.display())));
    }
    if !path.is_file() {
        return Err(config_error(format!("points to {}, which is not a file", path.display())));
    }
    if !is_executable(&path) {
        return Err(config_error(format!("points to {}, which is not executable", path.display())));
    }

    debug!(variable = %variable, path = %path.display(), "Validated external tool");
    Ok(ToolHandle {
        variable: variable.to_string(),
        path,
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
