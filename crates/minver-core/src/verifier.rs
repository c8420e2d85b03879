//! Lower-bound verification orchestration.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::VerifyError;
use crate::executor::{CommandExecutor, CommandOutput, Invocation};
use crate::flags::StrictFlagSet;
use crate::manifest::{ManifestDigest, ManifestRef, ManifestSnapshot};
use crate::phase::{Phase, VerifierState, Verdict};
use crate::report::{RestoreOutcome, StepRecord, VerificationReport};
use crate::rewrite::LowerBoundRewriter;
use crate::strict_build::StrictBuildRunner;
use crate::tool::validate_tool;
use crate::SET_LOWER_BOUNDS_VAR;

/// Everything a verification run needs, supplied at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    pub manifest: ManifestRef,

    /// Raw lower-bound mutator location, as configured.
    pub lower_bounds_tool: Option<String>,

    /// Build program, normally `cargo`.
    pub cargo: String,

    /// Extra lints denied on top of the default strict set.
    pub extra_denied: Vec<String>,

    /// Pass `--all-features` to both builds.
    pub all_features: bool,

    /// Per-command timeout in seconds; 0 means no timeout.
    pub timeout_secs: u64,

    /// Put the original manifest and lockfile back after the run.
    pub restore_manifest: bool,
}

impl VerifierConfig {
    pub fn new(manifest: ManifestRef, lower_bounds_tool: Option<String>) -> Self {
        Self {
            manifest,
            lower_bounds_tool,
            cargo: "cargo".to_string(),
            extra_denied: Vec::new(),
            all_features: true,
            timeout_secs: 0,
            restore_manifest: true,
        }
    }

    /// The strict flag set both builds use.
    pub fn flags(&self) -> StrictFlagSet {
        StrictFlagSet::default().with_denied(self.extra_denied.iter().cloned())
    }
}

/// Tracks state transitions and executed steps of one run.
struct Progress {
    state: VerifierState,
    states: Vec<VerifierState>,
    steps: Vec<StepRecord>,
}

impl Progress {
    fn new() -> Self {
        Self {
            state: VerifierState::Idle,
            states: vec![VerifierState::Idle],
            steps: Vec::new(),
        }
    }

    fn advance(&mut self) {
        if let Some(next) = self.state.advance() {
            debug!(from = ?self.state, to = ?next, "State transition");
            self.state = next;
            self.states.push(next);
        }
    }

    fn finish(&mut self, terminal: VerifierState) {
        debug!(from = ?self.state, to = ?terminal, "State transition");
        self.state = terminal;
        self.states.push(terminal);
    }

    /// Phase currently executing.
    fn phase(&self) -> Phase {
        self.state.phase().unwrap_or(Phase::ValidatingConfig)
    }

    fn record(&mut self, invocation: &Invocation, output: Option<&CommandOutput>) {
        let phase = self.phase();
        self.steps.push(StepRecord::new(phase, invocation, output));
    }
}

/// Manifest digests observed during a run.
#[derive(Default)]
struct Digests {
    before: Option<ManifestDigest>,
    after_rewrite: Option<ManifestDigest>,
}

/// Minimum-Version Build Verifier.
///
/// Runs baseline build, lower-bound rewrite and verification build in strict
/// sequence, stopping at the first failure.
pub struct LowerBoundVerifier {
    config: VerifierConfig,
    executor: Arc<dyn CommandExecutor>,
    builder: StrictBuildRunner,
}

impl LowerBoundVerifier {
    pub fn new(config: VerifierConfig, executor: Arc<dyn CommandExecutor>) -> Self {
        let builder = StrictBuildRunner::new(config.cargo.clone(), config.flags())
            .all_features(config.all_features)
            .timeout_secs(config.timeout_secs);
        Self {
            config,
            executor,
            builder,
        }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Run one verification. All failures are captured in the report.
    pub async fn verify(&self) -> VerificationReport {
        let start = Instant::now();
        let started_at = Utc::now();
        let run_id = Uuid::new_v4().to_string();
        let manifest = &self.config.manifest;

        info!(run_id = %run_id, manifest = %manifest, "Starting lower-bound verification");

        let mut progress = Progress::new();
        let mut digests = Digests::default();
        let mut snapshot: Option<ManifestSnapshot> = None;

        let mut result = self
            .run_phases(&mut progress, &mut digests, &mut snapshot)
            .await;
        let mut failed_phase = result.as_ref().err().map(|_| progress.phase());

        let mut digest_after_restore = None;
        let restore = match snapshot.take() {
            None if !self.config.restore_manifest && digests.before.is_some() => {
                RestoreOutcome::Skipped
            }
            None => RestoreOutcome::NotCaptured,
            Some(snapshot) => match snapshot.restore() {
                Ok(()) => {
                    digest_after_restore = manifest.digest().ok();
                    if digest_after_restore != digests.before {
                        warn!(run_id = %run_id, "Restored manifest digest differs from original");
                    }
                    info!(run_id = %run_id, "Original manifest restored");
                    RestoreOutcome::Restored
                }
                Err(e) => {
                    warn!(run_id = %run_id, error = %e, "Failed to restore original manifest");
                    let outcome = RestoreOutcome::Failed {
                        error: e.to_string(),
                    };
                    if result.is_ok() {
                        result = Err(e);
                        failed_phase = Some(Phase::RestoringManifest);
                    }
                    outcome
                }
            },
        };

        let verdict = match (result, failed_phase) {
            (Ok(()), _) => {
                progress.finish(VerifierState::Passed);
                info!(run_id = %run_id, "Lower bounds verified");
                Verdict::Passed
            }
            (Err(error), phase) => {
                let phase = phase.unwrap_or(Phase::ValidatingConfig);
                progress.finish(VerifierState::Failed(phase));
                warn!(run_id = %run_id, phase = %phase, error = %error, "Lower-bound verification failed");
                Verdict::Failed { phase, error }
            }
        };

        VerificationReport {
            run_id,
            started_at,
            manifest: manifest.clone(),
            flags: self.builder.flags().clone(),
            states: progress.states,
            steps: progress.steps,
            digest_before: digests.before,
            digest_after_rewrite: digests.after_rewrite,
            digest_after_restore,
            restore,
            duration_ms: start.elapsed().as_millis() as u64,
            verdict,
        }
    }

    /// Walk the non-terminal states. On error, `progress.state` is the
    /// state that failed.
    async fn run_phases(
        &self,
        progress: &mut Progress,
        digests: &mut Digests,
        snapshot: &mut Option<ManifestSnapshot>,
    ) -> Result<(), VerifyError> {
        let manifest = &self.config.manifest;
        let executor = self.executor.as_ref();

        // ValidatingConfig
        progress.advance();
        let tool = validate_tool(SET_LOWER_BOUNDS_VAR, self.config.lower_bounds_tool.as_deref())?;
        manifest.validate()?;
        let rewriter = LowerBoundRewriter::new(tool).timeout_secs(self.config.timeout_secs);
        if self.config.restore_manifest {
            let captured = ManifestSnapshot::capture(manifest)?;
            digests.before = Some(captured.digest().clone());
            *snapshot = Some(captured);
        } else {
            digests.before = manifest.digest().ok();
        }

        // BaselineBuild
        progress.advance();
        let (output, built) = self.builder.run(executor, manifest, Phase::BaselineBuild).await;
        progress.record(&self.builder.invocation(manifest), output.as_ref());
        built?;

        // RewritingBounds
        progress.advance();
        let (output, rewritten) = rewriter.run(executor, manifest).await;
        progress.record(&rewriter.invocation(manifest), output.as_ref());
        rewritten?;
        digests.after_rewrite = manifest.digest().ok();
        if digests.after_rewrite.is_some() && digests.after_rewrite == digests.before {
            warn!(manifest = %manifest, "Lower-bound rewrite left the manifest unchanged");
        }

        // VerificationBuild
        progress.advance();
        let (output, built) = self
            .builder
            .run(executor, manifest, Phase::VerificationBuild)
            .await;
        progress.record(&self.builder.invocation(manifest), output.as_ref());
        built
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::InvocationKind;
    use crate::fakes::ScriptedExecutor;
    use tempfile::{tempdir, TempDir};

    const MANIFEST: &str = "[package]\nname = \"demo\"\nversion = \"0.1.0\"\n";

    fn workspace() -> (TempDir, ManifestRef) {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), MANIFEST).unwrap();
        let manifest = ManifestRef::explicit(dir.path().join("Cargo.toml"));
        (dir, manifest)
    }

    #[cfg(unix)]
    fn tool(dir: &TempDir) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.path().join("set-lower-bounds");
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[test]
    fn test_config_defaults() {
        let config = VerifierConfig::new(ManifestRef::explicit("Cargo.toml"), None);
        assert_eq!(config.cargo, "cargo");
        assert!(config.all_features);
        assert!(config.restore_manifest);
        assert_eq!(config.flags(), StrictFlagSet::default());
    }

    #[tokio::test]
    async fn test_missing_tool_fails_before_any_build() {
        let (_dir, manifest) = workspace();
        let executor = Arc::new(ScriptedExecutor::new());
        let verifier = LowerBoundVerifier::new(VerifierConfig::new(manifest, None), executor.clone());

        let report = verifier.verify().await;

        assert_eq!(report.failed_phase(), Some(Phase::ValidatingConfig));
        assert_eq!(executor.count(InvocationKind::StrictBuild), 0);
        assert_eq!(executor.count(InvocationKind::Rewrite), 0);
        assert_eq!(report.restore, RestoreOutcome::NotCaptured);
        assert!(matches!(
            report.verdict.error(),
            Some(VerifyError::Configuration { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invalid_manifest_fails_validation() {
        let (dir, manifest) = workspace();
        std::fs::write(&manifest.path, "not = [valid").unwrap();
        let executor = Arc::new(ScriptedExecutor::new());
        let config = VerifierConfig::new(manifest, Some(tool(&dir)));

        let report = LowerBoundVerifier::new(config, executor.clone()).verify().await;

        assert_eq!(report.failed_phase(), Some(Phase::ValidatingConfig));
        assert_eq!(report.verdict.error().unwrap().kind(), "manifest_error");
        assert!(executor.invocations().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_all_phases_pass() {
        let (dir, manifest) = workspace();
        let executor = Arc::new(ScriptedExecutor::new());
        let config = VerifierConfig::new(manifest, Some(tool(&dir)));

        let report = LowerBoundVerifier::new(config, executor.clone()).verify().await;

        assert!(report.passed());
        assert_eq!(
            report.states,
            vec![
                VerifierState::Idle,
                VerifierState::ValidatingConfig,
                VerifierState::BaselineBuild,
                VerifierState::RewritingBounds,
                VerifierState::VerificationBuild,
                VerifierState::Passed,
            ]
        );
        assert_eq!(report.steps.len(), 3);
        assert_eq!(report.restore, RestoreOutcome::Restored);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_baseline_failure_never_invokes_mutator() {
        let (dir, manifest) = workspace();
        let executor = Arc::new(ScriptedExecutor::new());
        executor.push_exit(InvocationKind::StrictBuild, 101, "error: unused variable");
        let config = VerifierConfig::new(manifest, Some(tool(&dir)));

        let report = LowerBoundVerifier::new(config, executor.clone()).verify().await;

        assert_eq!(report.failed_phase(), Some(Phase::BaselineBuild));
        assert_eq!(executor.count(InvocationKind::Rewrite), 0);
        assert_eq!(executor.count(InvocationKind::StrictBuild), 1);
        assert_eq!(
            report.states.last(),
            Some(&VerifierState::Failed(Phase::BaselineBuild))
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_mutator_failure_stops_before_verification_build() {
        let (dir, manifest) = workspace();
        let executor = Arc::new(ScriptedExecutor::new());
        executor.push_exit(InvocationKind::Rewrite, 2, "cannot parse requirement");
        let config = VerifierConfig::new(manifest, Some(tool(&dir)));

        let report = LowerBoundVerifier::new(config, executor.clone()).verify().await;

        assert_eq!(report.failed_phase(), Some(Phase::RewritingBounds));
        assert_eq!(executor.count(InvocationKind::StrictBuild), 1);
        assert_eq!(report.verdict.error().unwrap().kind(), "tool_failure");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_verification_build_failure_after_clean_baseline() {
        let (dir, manifest) = workspace();
        let executor = Arc::new(ScriptedExecutor::new());
        executor.push_ok(InvocationKind::StrictBuild);
        executor.push_exit(InvocationKind::StrictBuild, 101, "error[E0425]: cannot find function");
        let config = VerifierConfig::new(manifest, Some(tool(&dir)));

        let report = LowerBoundVerifier::new(config, executor.clone()).verify().await;

        assert_eq!(report.failed_phase(), Some(Phase::VerificationBuild));
        assert!(report.steps[0].passed());
        assert_eq!(report.steps[2].exit_code, Some(101));
        assert!(report
            .verdict
            .error()
            .unwrap()
            .diagnostics()
            .unwrap()
            .contains("E0425"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_both_builds_use_identical_flags() {
        let (dir, manifest) = workspace();
        let executor = Arc::new(ScriptedExecutor::new());
        let mut config = VerifierConfig::new(manifest, Some(tool(&dir)));
        config.extra_denied = vec!["missing_docs".to_string()];

        LowerBoundVerifier::new(config, executor.clone()).verify().await;

        let builds: Vec<_> = executor
            .invocations()
            .into_iter()
            .filter(|inv| inv.kind == InvocationKind::StrictBuild)
            .collect();
        assert_eq!(builds.len(), 2);
        assert_eq!(builds[0], builds[1]);
        assert!(builds[0]
            .env_value("RUSTFLAGS")
            .unwrap()
            .ends_with("-D missing_docs"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_failure_is_tool_invocation_error() {
        let (dir, manifest) = workspace();
        let executor = Arc::new(ScriptedExecutor::new());
        executor.push_spawn_error(InvocationKind::StrictBuild);
        let config = VerifierConfig::new(manifest, Some(tool(&dir)));

        let report = LowerBoundVerifier::new(config, executor).verify().await;

        assert_eq!(report.failed_phase(), Some(Phase::BaselineBuild));
        assert_eq!(report.verdict.error().unwrap().kind(), "tool_invocation_error");
        assert_eq!(report.steps[0].exit_code, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_keep_rewritten_skips_restoration() {
        let (dir, manifest) = workspace();
        let path = manifest.path.clone();
        let executor = Arc::new(ScriptedExecutor::new());
        executor.set_handler(InvocationKind::Rewrite, move |_| {
            std::fs::write(&path, format!("{MANIFEST}# pinned\n")).unwrap();
            Ok(crate::fakes::exit_output(0, "", ""))
        });
        let mut config = VerifierConfig::new(manifest.clone(), Some(tool(&dir)));
        config.restore_manifest = false;

        let report = LowerBoundVerifier::new(config, executor).verify().await;

        assert!(report.passed());
        assert_eq!(report.restore, RestoreOutcome::Skipped);
        assert_eq!(report.rewrite_was_noop(), Some(false));
        assert!(std::fs::read_to_string(&manifest.path)
            .unwrap()
            .ends_with("# pinned\n"));
    }

    /// Rewrite handler that replaces the manifest with a directory, so
    /// writing the original bytes back fails.
    #[cfg(unix)]
    fn manifest_replaced_by_directory(executor: &ScriptedExecutor, manifest: &ManifestRef) {
        let path = manifest.path.clone();
        executor.set_handler(InvocationKind::Rewrite, move |_| {
            std::fs::remove_file(&path).unwrap();
            std::fs::create_dir(&path).unwrap();
            Ok(crate::fakes::exit_output(0, "", ""))
        });
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_restore_failure_fails_an_otherwise_passing_run() {
        let (dir, manifest) = workspace();
        let executor = Arc::new(ScriptedExecutor::new());
        manifest_replaced_by_directory(&executor, &manifest);
        let config = VerifierConfig::new(manifest, Some(tool(&dir)));

        let report = LowerBoundVerifier::new(config, executor.clone()).verify().await;

        assert_eq!(executor.count(InvocationKind::StrictBuild), 2);
        assert_eq!(report.failed_phase(), Some(Phase::RestoringManifest));
        assert_eq!(
            report.states.last(),
            Some(&VerifierState::Failed(Phase::RestoringManifest))
        );
        assert_eq!(report.verdict.error().unwrap().kind(), "restore_error");
        assert!(matches!(report.restore, RestoreOutcome::Failed { .. }));
        assert!(report.digest_after_restore.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_restore_failure_keeps_earlier_failure() {
        let (dir, manifest) = workspace();
        let executor = Arc::new(ScriptedExecutor::new());
        executor.push_ok(InvocationKind::StrictBuild);
        executor.push_exit(InvocationKind::StrictBuild, 101, "error[E0599]: no method named");
        manifest_replaced_by_directory(&executor, &manifest);
        let config = VerifierConfig::new(manifest, Some(tool(&dir)));

        let report = LowerBoundVerifier::new(config, executor).verify().await;

        assert_eq!(report.failed_phase(), Some(Phase::VerificationBuild));
        assert_eq!(report.verdict.error().unwrap().kind(), "build_failure");
        match &report.restore {
            RestoreOutcome::Failed { error } => {
                assert!(error.contains("Cargo.toml"), "restore error: {error}")
            }
            other => panic!("unexpected restore outcome: {other:?}"),
        }
    }
}
