//! External command execution.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::error::ExecError;

/// What an invocation is for. Lets fakes and reports tell steps apart.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InvocationKind {
    /// cargo build under the strict flag set
    StrictBuild,

    /// lower-bound mutator
    Rewrite,

    /// distro version comparator
    Compare,
}

/// A fully specified external command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub kind: InvocationKind,

    /// Program to execute.
    pub program: String,

    pub args: Vec<String>,

    /// Extra environment variables set on the child.
    pub env: Vec<(String, String)>,

    /// Timeout in seconds; 0 means wait forever.
    pub timeout_secs: u64,
}

impl Invocation {
    pub fn new(kind: InvocationKind, program: impl Into<String>) -> Self {
        Self {
            kind,
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            timeout_secs: 0,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Value of an environment variable set on this invocation.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Shell-like rendering for log lines.
    pub fn display_command(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit code (0 = success, -1 when killed by a signal).
    pub exit_code: i32,

    pub stdout: String,

    pub stderr: String,

    pub duration_ms: u64,

    pub success: bool,
}

impl CommandOutput {
    /// Whether the command exited with status 0.
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }
}

/// Seam between the orchestrator and the operating system.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run the invocation to completion.
    ///
    /// A non-zero exit is a normal `Ok` result; `Err` is reserved for
    /// failures to run the command at all.
    async fn execute(&self, invocation: &Invocation) -> Result<CommandOutput, ExecError>;
}

/// Runs invocations as child processes via tokio.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExecutor;

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, invocation: &Invocation) -> Result<CommandOutput, ExecError> {
        let start = Instant::now();
        debug!(command = %invocation.display_command(), "Spawning");

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|source| ExecError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        let wait = child.wait_with_output();
        let waited = if invocation.timeout_secs > 0 {
            tokio::time::timeout(Duration::from_secs(invocation.timeout_secs), wait)
                .await
                .map_err(|_| ExecError::Timeout {
                    program: invocation.program.clone(),
                    secs: invocation.timeout_secs,
                })?
        } else {
            wait.await
        };
        let output = waited.map_err(|source| ExecError::Wait {
            program: invocation.program.clone(),
            source,
        })?;

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1);

        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms,
            success: output.status.success(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_output_passed() {
        let output = CommandOutput {
            exit_code: 0,
            stdout: "".to_string(),
            stderr: "".to_string(),
            duration_ms: 100,
            success: true,
        };
        assert!(output.passed());
    }

    #[test]
    fn test_command_output_failed() {
        let output = CommandOutput {
            exit_code: 101,
            stdout: "".to_string(),
            stderr: "error".to_string(),
            duration_ms: 100,
            success: false,
        };
        assert!(!output.passed());
    }

    #[test]
    fn test_invocation_builder() {
        let inv = Invocation::new(InvocationKind::StrictBuild, "cargo")
            .args(["build", "--all-features"])
            .env("RUSTFLAGS", "-D warnings")
            .timeout_secs(30);

        assert_eq!(inv.display_command(), "cargo build --all-features");
        assert_eq!(inv.env_value("RUSTFLAGS"), Some("-D warnings"));
        assert_eq!(inv.env_value("MISSING"), None);
        assert_eq!(inv.timeout_secs, 30);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_simple_command() {
        let inv = Invocation::new(InvocationKind::Compare, "echo").args(["hello"]);

        let output = ProcessExecutor.execute(&inv).await.expect("execute failed");
        assert!(output.passed());
        assert!(output.stdout.contains("hello"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_failing_command() {
        let inv = Invocation::new(InvocationKind::StrictBuild, "false");

        let output = ProcessExecutor.execute(&inv).await.expect("execute failed");
        assert!(!output.passed());
        assert_ne!(output.exit_code, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_passes_environment() {
        let inv = Invocation::new(InvocationKind::StrictBuild, "sh")
            .args(["-c", "printf '%s' \"$RUSTFLAGS\""])
            .env("RUSTFLAGS", "-D warnings -D unused");

        let output = ProcessExecutor.execute(&inv).await.expect("execute failed");
        assert_eq!(output.stdout, "-D warnings -D unused");
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let inv = Invocation::new(InvocationKind::Rewrite, "/nonexistent/minver-tool");

        let err = ProcessExecutor.execute(&inv).await.unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_is_reported() {
        let inv = Invocation::new(InvocationKind::StrictBuild, "sleep")
            .args(["5"])
            .timeout_secs(1);

        let err = ProcessExecutor.execute(&inv).await.unwrap_err();
        assert!(matches!(err, ExecError::Timeout { secs: 1, .. }));
    }
}
