//! In-memory fakes for the command executor (testing only)
//!
//! `ScriptedExecutor` records every invocation and answers from per-kind
//! queues of scripted responses, falling back to a per-kind handler and
//! finally to a clean exit.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::ExecError;
use crate::executor::{CommandExecutor, CommandOutput, Invocation, InvocationKind};

/// Response computed from the invocation, for fakes with side effects.
pub type Handler = Arc<dyn Fn(&Invocation) -> Result<CommandOutput, ExecError> + Send + Sync>;

enum Scripted {
    Exit { code: i32, stdout: String, stderr: String },
    SpawnError,
}

/// Executor that never touches the operating system.
#[derive(Default)]
pub struct ScriptedExecutor {
    queued: Mutex<HashMap<InvocationKind, VecDeque<Scripted>>>,
    handlers: Mutex<HashMap<InvocationKind, Handler>>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, kind: InvocationKind, scripted: Scripted) {
        self.queued
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push_back(scripted);
    }

    /// Queue a clean exit for the next invocation of `kind`.
    pub fn push_ok(&self, kind: InvocationKind) {
        self.push(
            kind,
            Scripted::Exit {
                code: 0,
                stdout: String::new(),
                stderr: String::new(),
            },
        );
    }

    /// Queue a non-zero exit with the given stderr.
    pub fn push_exit(&self, kind: InvocationKind, code: i32, stderr: &str) {
        self.push(
            kind,
            Scripted::Exit {
                code,
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        );
    }

    /// Queue a spawn failure, as if the program vanished after validation.
    pub fn push_spawn_error(&self, kind: InvocationKind) {
        self.push(kind, Scripted::SpawnError);
    }

    /// Answer every unscripted invocation of `kind` with `handler`.
    pub fn set_handler<F>(&self, kind: InvocationKind, handler: F)
    where
        F: Fn(&Invocation) -> Result<CommandOutput, ExecError> + Send + Sync + 'static,
    {
        self.handlers.lock().unwrap().insert(kind, Arc::new(handler));
    }

    /// All invocations seen so far, in order.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of invocations of `kind` seen so far.
    pub fn count(&self, kind: InvocationKind) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|inv| inv.kind == kind)
            .count()
    }
}

/// Build a [`CommandOutput`] for an exit code.
pub fn exit_output(code: i32, stdout: &str, stderr: &str) -> CommandOutput {
    CommandOutput {
        exit_code: code,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        duration_ms: 0,
        success: code == 0,
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(&self, invocation: &Invocation) -> Result<CommandOutput, ExecError> {
        self.calls.lock().unwrap().push(invocation.clone());

        let scripted = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&invocation.kind)
            .and_then(VecDeque::pop_front);

        match scripted {
            Some(Scripted::Exit {
                code,
                stdout,
                stderr,
            }) => Ok(exit_output(code, &stdout, &stderr)),
            Some(Scripted::SpawnError) => Err(ExecError::Spawn {
                program: invocation.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted spawn failure"),
            }),
            None => {
                let handler = self.handlers.lock().unwrap().get(&invocation.kind).cloned();
                match handler {
                    Some(handler) => handler(invocation),
                    None => Ok(exit_output(0, "", "")),
                }
            }
        }
    }
}
