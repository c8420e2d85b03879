//! Error types for lower-bound verification

use std::path::PathBuf;

use thiserror::Error;

use crate::phase::Phase;

/// Errors raised while running an external command.
#[derive(Error, Debug)]
pub enum ExecError {
    /// The program could not be started (not found, not executable, ...)
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program started but waiting on it failed
    #[error("failed while waiting on `{program}`: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program exceeded its configured timeout and was killed
    #[error("`{program}` timed out after {secs} seconds")]
    Timeout { program: String, secs: u64 },
}

/// Failure of a verification run, tagged with enough context to act on.
#[derive(Error, Debug)]
pub enum VerifyError {
    /// A required external tool is unset or does not point at an executable
    #[error("configuration error: {variable} {reason}")]
    Configuration { variable: String, reason: String },

    /// The manifest is missing or not a valid Cargo manifest
    #[error("invalid manifest {}: {reason}", .path.display())]
    Manifest { path: PathBuf, reason: String },

    /// A strict build exited non-zero
    #[error("strict build failed during {phase} with exit code {exit_code}")]
    BuildFailure {
        phase: Phase,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    /// An external tool ran to completion but reported failure
    #[error("{tool} failed during {phase} with exit code {exit_code}")]
    ToolFailure {
        phase: Phase,
        tool: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    /// An external tool could not be run at all despite passing validation
    #[error("could not invoke `{program}` during {phase}: {source}")]
    ToolInvocation {
        phase: Phase,
        program: String,
        #[source]
        source: ExecError,
    },

    /// The original manifest state could not be put back
    #[error("failed to restore {}: {source}", .path.display())]
    Restore {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl VerifyError {
    /// Raw diagnostic output captured from the failing tool, if any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            VerifyError::BuildFailure { stdout, stderr, .. }
            | VerifyError::ToolFailure { stdout, stderr, .. } => {
                if stderr.trim().is_empty() {
                    Some(stdout.as_str())
                } else {
                    Some(stderr.as_str())
                }
            }
            _ => None,
        }
    }

    /// Short machine-friendly category name.
    pub fn kind(&self) -> &'static str {
        match self {
            VerifyError::Configuration { .. } => "configuration_error",
            VerifyError::Manifest { .. } => "manifest_error",
            VerifyError::BuildFailure { .. } => "build_failure",
            VerifyError::ToolFailure { .. } => "tool_failure",
            VerifyError::ToolInvocation { .. } => "tool_invocation_error",
            VerifyError::Restore { .. } => "restore_error",
        }
    }
}
