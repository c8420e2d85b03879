//! Distro version comparison.
//!
//! Independent of the lower-bound workflow: validate the comparator tool,
//! run it against the manifest and surface its exit status unchanged.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ExecError, VerifyError};
use crate::executor::{CommandExecutor, CommandOutput, Invocation, InvocationKind};
use crate::manifest::ManifestRef;
use crate::tool::{validate_tool, ToolHandle};
use crate::COMPARE_FEDORA_VERSIONS_VAR;

/// Configuration for a comparison run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparatorConfig {
    pub manifest: ManifestRef,

    /// Raw comparator location, as configured.
    pub comparator: Option<String>,

    /// Release identifier forwarded as `--release=<id>`.
    pub release: Option<String>,

    pub timeout_secs: u64,
}

/// Result of a comparison run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonOutcome {
    pub tool: ToolHandle,

    /// Comparator exit code, passed through as-is.
    pub exit_code: i32,

    pub output: CommandOutput,
}

impl ComparisonOutcome {
    /// Whether declared versions match the reference source.
    pub fn matched(&self) -> bool {
        self.output.passed()
    }
}

/// Invokes the external comparator.
pub struct DistroComparator {
    tool: ToolHandle,
    manifest: ManifestRef,
    release: Option<String>,
    timeout_secs: u64,
}

impl DistroComparator {
    /// Validate the configured comparator and build an invoker.
    pub fn from_config(config: &ComparatorConfig) -> Result<Self, VerifyError> {
        let tool = validate_tool(COMPARE_FEDORA_VERSIONS_VAR, config.comparator.as_deref())?;
        config.manifest.validate()?;
        Ok(Self {
            tool,
            manifest: config.manifest.clone(),
            release: config
                .release
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string),
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn invocation(&self) -> Invocation {
        let mut args = self.manifest.cli_args();
        if let Some(release) = &self.release {
            args.push(format!("--release={release}"));
        }
        Invocation::new(InvocationKind::Compare, self.tool.program())
            .args(args)
            .timeout_secs(self.timeout_secs)
    }

    /// Run the comparator. A non-zero exit is a normal outcome, not an error.
    pub async fn run(&self, executor: &dyn CommandExecutor) -> Result<ComparisonOutcome, ExecError> {
        let invocation = self.invocation();
        info!(command = %invocation.display_command(), "Comparing declared versions");

        let output = executor.execute(&invocation).await?;

        info!(exit_code = output.exit_code, "Comparator finished");
        Ok(ComparisonOutcome {
            tool: self.tool.clone(),
            exit_code: output.exit_code,
            output,
        })
    }
}
