//! Verification phases, orchestrator states and the final verdict.

use serde::{Deserialize, Serialize};

use crate::error::VerifyError;

/// A non-terminal step of a verification run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Tool paths and manifest are checked
    ValidatingConfig,

    /// Strict build against the currently resolved versions
    BaselineBuild,

    /// External mutator pins every dependency to its lower bound
    RewritingBounds,

    /// Strict build against the rewritten manifest
    VerificationBuild,

    /// Original manifest and lockfile are put back
    RestoringManifest,
}

impl Phase {
    /// Get the phase name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            Phase::ValidatingConfig => "validating_config",
            Phase::BaselineBuild => "baseline_build",
            Phase::RewritingBounds => "rewriting_bounds",
            Phase::VerificationBuild => "verification_build",
            Phase::RestoringManifest => "restoring_manifest",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Orchestrator state.
///
/// `Idle → ValidatingConfig → BaselineBuild → RewritingBounds →
/// VerificationBuild → Passed`, with any step able to jump to `Failed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", content = "phase", rename_all = "snake_case")]
pub enum VerifierState {
    Idle,
    ValidatingConfig,
    BaselineBuild,
    RewritingBounds,
    VerificationBuild,
    Passed,
    Failed(Phase),
}

impl VerifierState {
    /// The state that follows a successful step, or `None` once terminal.
    pub fn advance(self) -> Option<VerifierState> {
        match self {
            VerifierState::Idle => Some(VerifierState::ValidatingConfig),
            VerifierState::ValidatingConfig => Some(VerifierState::BaselineBuild),
            VerifierState::BaselineBuild => Some(VerifierState::RewritingBounds),
            VerifierState::RewritingBounds => Some(VerifierState::VerificationBuild),
            VerifierState::VerificationBuild => Some(VerifierState::Passed),
            VerifierState::Passed | VerifierState::Failed(_) => None,
        }
    }

    /// The state reached when the current step fails.
    pub fn fail(self) -> Option<VerifierState> {
        self.phase().map(VerifierState::Failed)
    }

    /// The phase executing in this state, if it is a working state.
    pub fn phase(self) -> Option<Phase> {
        match self {
            VerifierState::ValidatingConfig => Some(Phase::ValidatingConfig),
            VerifierState::BaselineBuild => Some(Phase::BaselineBuild),
            VerifierState::RewritingBounds => Some(Phase::RewritingBounds),
            VerifierState::VerificationBuild => Some(Phase::VerificationBuild),
            VerifierState::Idle | VerifierState::Passed | VerifierState::Failed(_) => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, VerifierState::Passed | VerifierState::Failed(_))
    }
}

/// Outcome of one verification run. Never persisted.
#[derive(Debug)]
pub enum Verdict {
    /// The project builds cleanly at its declared minimum versions
    Passed,

    /// A phase failed; the whole run is void
    Failed { phase: Phase, error: VerifyError },
}

impl Verdict {
    pub fn passed(&self) -> bool {
        matches!(self, Verdict::Passed)
    }

    /// The failing phase, if any.
    pub fn failed_phase(&self) -> Option<Phase> {
        match self {
            Verdict::Passed => None,
            Verdict::Failed { phase, .. } => Some(*phase),
        }
    }

    pub fn error(&self) -> Option<&VerifyError> {
        match self {
            Verdict::Passed => None,
            Verdict::Failed { error, .. } => Some(error),
        }
    }
}
