//! Strict build execution.

use tracing::{info, warn};

use crate::error::VerifyError;
use crate::executor::{CommandExecutor, CommandOutput, Invocation, InvocationKind};
use crate::flags::StrictFlagSet;
use crate::manifest::ManifestRef;
use crate::phase::Phase;

/// Runs `cargo build` with the strict flag set in `RUSTFLAGS`.
///
/// Arguments and flags are fixed at construction, so repeated builds within
/// one run are directly comparable.
#[derive(Debug, Clone)]
pub struct StrictBuildRunner {
    program: String,
    flags: StrictFlagSet,
    all_features: bool,
    timeout_secs: u64,
}

impl StrictBuildRunner {
    pub fn new(program: impl Into<String>, flags: StrictFlagSet) -> Self {
        Self {
            program: program.into(),
            flags,
            all_features: true,
            timeout_secs: 0,
        }
    }

    pub fn all_features(mut self, enabled: bool) -> Self {
        self.all_features = enabled;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn flags(&self) -> &StrictFlagSet {
        &self.flags
    }

    /// The invocation for building `manifest`.
    pub fn invocation(&self, manifest: &ManifestRef) -> Invocation {
        let mut args = vec!["build".to_string()];
        args.extend(manifest.cli_args());
        if self.all_features {
            args.push("--all-features".to_string());
        }

        Invocation::new(InvocationKind::StrictBuild, self.program.clone())
            .args(args)
            .env("RUSTFLAGS", self.flags.to_rustflags())
            .timeout_secs(self.timeout_secs)
    }

    /// Build `manifest`, mapping a non-zero exit to [`VerifyError::BuildFailure`].
    ///
    /// The captured output is returned alongside the result so callers can
    /// record it either way.
    pub async fn run(
        &self,
        executor: &dyn CommandExecutor,
        manifest: &ManifestRef,
        phase: Phase,
    ) -> (Option<CommandOutput>, Result<(), VerifyError>) {
        let invocation = self.invocation(manifest);
        info!(phase = %phase, command = %invocation.display_command(), "Running strict build");

        let output = match executor.execute(&invocation).await {
            Ok(output) => output,
            Err(source) => {
                warn!(phase = %phase, error = %source, "Build tool could not be invoked");
                return (
                    None,
                    Err(VerifyError::ToolInvocation {
                        phase,
                        program: self.program.clone(),
                        source,
                    }),
                );
            }
        };

        if output.passed() {
            info!(phase = %phase, duration_ms = output.duration_ms, "Strict build passed");
            (Some(output), Ok(()))
        } else {
            warn!(phase = %phase, exit_code = output.exit_code, "Strict build failed");
            let error = VerifyError::BuildFailure {
                phase,
                exit_code: output.exit_code,
                stdout: output.stdout.clone(),
                stderr: output.stderr.clone(),
            };
            (Some(output), Err(error))
        }
    }
}
