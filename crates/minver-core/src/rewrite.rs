//! Lower-bound rewrite via the external mutator.

use tracing::{info, warn};

use crate::error::VerifyError;
use crate::executor::{CommandExecutor, CommandOutput, Invocation, InvocationKind};
use crate::manifest::ManifestRef;
use crate::phase::Phase;
use crate::tool::ToolHandle;

/// Delegates to the mutator tool. Its exit status is authoritative; how it
/// lowers versions is none of our business.
#[derive(Debug, Clone)]
pub struct LowerBoundRewriter {
    tool: ToolHandle,
    timeout_secs: u64,
}

impl LowerBoundRewriter {
    pub fn new(tool: ToolHandle) -> Self {
        Self {
            tool,
            timeout_secs: 0,
        }
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn tool(&self) -> &ToolHandle {
        &self.tool
    }

    pub fn invocation(&self, manifest: &ManifestRef) -> Invocation {
        Invocation::new(InvocationKind::Rewrite, self.tool.program())
            .args(manifest.cli_args())
            .timeout_secs(self.timeout_secs)
    }

    /// Pin every dependency of `manifest` to its lower bound, in place.
    pub async fn run(
        &self,
        executor: &dyn CommandExecutor,
        manifest: &ManifestRef,
    ) -> (Option<CommandOutput>, Result<(), VerifyError>) {
        let invocation = self.invocation(manifest);
        info!(command = %invocation.display_command(), "Rewriting dependency bounds");

        match executor.execute(&invocation).await {
            Ok(output) if output.passed() => (Some(output), Ok(())),
            Ok(output) => {
                warn!(exit_code = output.exit_code, tool = %self.tool.variable, "Lower-bound rewrite failed");
                let error = VerifyError::ToolFailure {
                    phase: Phase::RewritingBounds,
                    tool: self.tool.variable.clone(),
                    exit_code: output.exit_code,
                    stdout: output.stdout.clone(),
                    stderr: output.stderr.clone(),
                };
                (Some(output), Err(error))
            }
            Err(source) => (
                None,
                Err(VerifyError::ToolInvocation {
                    phase: Phase::RewritingBounds,
                    program: self.tool.program(),
                    source,
                }),
            ),
        }
    }
}
