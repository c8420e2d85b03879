//! Human-readable rendering of verification results.

use std::fmt::Write;
use std::process::ExitCode;

use minver_core::{RestoreOutcome, VerificationReport};

/// Summary printed to stdout after every run.
pub fn render_summary(report: &VerificationReport) -> String {
    let mut out = String::new();
    let status = match report.failed_phase() {
        None => "✓ PASSED".to_string(),
        Some(phase) => format!("✗ FAILED ({phase})"),
    };

    let _ = writeln!(out, "Manifest: {}", report.manifest);
    let _ = writeln!(out, "Run ID: {}", report.run_id);
    let _ = writeln!(out, "Status: {status}");
    let _ = writeln!(out, "Duration: {}ms", report.duration_ms);
    let _ = writeln!(out);

    for step in &report.steps {
        let mark = if step.passed() { "✓" } else { "✗" };
        let exit = step
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "none".to_string());
        let _ = writeln!(
            out,
            "  {} {} ({}ms, exit code: {})",
            mark, step.phase, step.duration_ms, exit
        );
    }

    let restore = match &report.restore {
        RestoreOutcome::Restored => "original manifest restored".to_string(),
        RestoreOutcome::Skipped => "rewritten manifest kept".to_string(),
        RestoreOutcome::NotCaptured => "nothing to restore".to_string(),
        RestoreOutcome::Failed { error } => format!("restoration failed: {error}"),
    };
    let _ = writeln!(out);
    let _ = writeln!(out, "Restore: {restore}");
    out
}

/// Failure message for stderr: phase, error and raw diagnostics.
pub fn render_failure(report: &VerificationReport) -> Option<String> {
    let phase = report.failed_phase()?;
    let error = report.verdict.error()?;

    let mut out = format!("verify-lower-bounds failed during phase `{phase}`: {error}\n");
    if let Some(diagnostics) = error.diagnostics() {
        let trimmed = diagnostics.trim_end();
        if !trimmed.is_empty() {
            out.push_str(trimmed);
            out.push('\n');
        }
    }
    Some(out)
}

/// Map a child exit code onto this process's exit code, unchanged where
/// representable.
pub fn exit_code_for(code: i32) -> ExitCode {
    ExitCode::from(exit_status_byte(code))
}

fn exit_status_byte(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}
