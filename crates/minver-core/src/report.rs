//! Verification report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::executor::{CommandOutput, Invocation, InvocationKind};
use crate::flags::StrictFlagSet;
use crate::manifest::{ManifestDigest, ManifestRef};
use crate::phase::{Phase, VerifierState, Verdict};

/// One external command run during verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub phase: Phase,

    pub kind: InvocationKind,

    /// Rendered command line.
    pub command: String,

    /// Exit code, or `None` when the command could not be run.
    pub exit_code: Option<i32>,

    pub stdout: String,

    pub stderr: String,

    pub duration_ms: u64,
}

impl StepRecord {
    pub fn new(phase: Phase, invocation: &Invocation, output: Option<&CommandOutput>) -> Self {
        Self {
            phase,
            kind: invocation.kind,
            command: invocation.display_command(),
            exit_code: output.map(|o| o.exit_code),
            stdout: output.map(|o| o.stdout.clone()).unwrap_or_default(),
            stderr: output.map(|o| o.stderr.clone()).unwrap_or_default(),
            duration_ms: output.map(|o| o.duration_ms).unwrap_or(0),
        }
    }

    pub fn passed(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// What happened to the original manifest after the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RestoreOutcome {
    /// Manifest and lockfile were written back
    Restored,

    /// Restoration was disabled; the rewritten manifest stays on disk
    Skipped,

    /// The run stopped before anything was captured
    NotCaptured,

    /// Writing back failed
    Failed { error: String },
}

/// Full account of one verification run.
#[derive(Debug, Serialize)]
pub struct VerificationReport {
    pub run_id: String,

    pub started_at: DateTime<Utc>,

    pub manifest: ManifestRef,

    pub flags: StrictFlagSet,

    /// Every state visited, in order, ending in a terminal state.
    pub states: Vec<VerifierState>,

    pub steps: Vec<StepRecord>,

    /// Manifest digest before anything ran.
    pub digest_before: Option<ManifestDigest>,

    /// Manifest digest right after the lower-bound rewrite.
    pub digest_after_rewrite: Option<ManifestDigest>,

    /// Manifest digest after restoration.
    pub digest_after_restore: Option<ManifestDigest>,

    pub restore: RestoreOutcome,

    pub duration_ms: u64,

    #[serde(serialize_with = "serialize_verdict")]
    pub verdict: Verdict,
}

impl VerificationReport {
    pub fn passed(&self) -> bool {
        self.verdict.passed()
    }

    pub fn failed_phase(&self) -> Option<Phase> {
        self.verdict.failed_phase()
    }

    /// The terminal state of the run.
    pub fn final_state(&self) -> VerifierState {
        match self.verdict.failed_phase() {
            None => VerifierState::Passed,
            Some(phase) => VerifierState::Failed(phase),
        }
    }

    /// Number of steps of the given kind that were attempted.
    pub fn step_count(&self, kind: InvocationKind) -> usize {
        self.steps.iter().filter(|s| s.kind == kind).count()
    }

    /// Whether the rewrite left the manifest byte-identical.
    pub fn rewrite_was_noop(&self) -> Option<bool> {
        match (&self.digest_before, &self.digest_after_rewrite) {
            (Some(before), Some(after)) => Some(before == after),
            _ => None,
        }
    }

    /// Serialize the report as pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn serialize_verdict<S: Serializer>(verdict: &Verdict, serializer: S) -> Result<S::Ok, S::Error> {
    let value = match verdict {
        Verdict::Passed => serde_json::json!({ "result": "passed" }),
        Verdict::Failed { phase, error } => serde_json::json!({
            "result": "failed",
            "phase": phase,
            "kind": error.kind(),
            "error": error.to_string(),
            "diagnostics": error.diagnostics(),
        }),
    };
    value.serialize(serializer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VerifyError;

    fn report(verdict: Verdict) -> VerificationReport {
        VerificationReport {
            run_id: "run123".to_string(),
            started_at: Utc::now(),
            manifest: ManifestRef::explicit("Cargo.toml"),
            flags: StrictFlagSet::default(),
            states: vec![VerifierState::Idle],
            steps: vec![],
            digest_before: Some(ManifestDigest::from_bytes(b"a")),
            digest_after_rewrite: Some(ManifestDigest::from_bytes(b"b")),
            digest_after_restore: None,
            restore: RestoreOutcome::Skipped,
            duration_ms: 5,
            verdict,
        }
    }

    #[test]
    fn test_passed_report_json() {
        let report = report(Verdict::Passed);
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(json["verdict"]["result"], "passed");
        assert_eq!(json["restore"]["status"], "skipped");
        assert_eq!(json["flags"][0], "warnings");
        assert_eq!(report.final_state(), VerifierState::Passed);
        assert_eq!(report.rewrite_was_noop(), Some(false));
    }

    #[test]
    fn test_failed_report_json_carries_phase_and_diagnostics() {
        let report = report(Verdict::Failed {
            phase: Phase::VerificationBuild,
            error: VerifyError::BuildFailure {
                phase: Phase::VerificationBuild,
                exit_code: 101,
                stdout: String::new(),
                stderr: "error[E0599]: no method named `retain_mut`".to_string(),
            },
        });
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(json["verdict"]["result"], "failed");
        assert_eq!(json["verdict"]["phase"], "verification_build");
        assert_eq!(json["verdict"]["kind"], "build_failure");
        assert!(json["verdict"]["diagnostics"]
            .as_str()
            .unwrap()
            .contains("retain_mut"));
        assert_eq!(
            report.final_state(),
            VerifierState::Failed(Phase::VerificationBuild)
        );
    }

    #[test]
    fn test_step_record_without_output() {
        let inv = Invocation::new(InvocationKind::Rewrite, "set-lower-bounds");
        let step = StepRecord::new(Phase::RewritingBounds, &inv, None);
        assert!(step.exit_code.is_none());
        assert!(!step.passed());
        assert_eq!(step.command, "set-lower-bounds");
    }
}
