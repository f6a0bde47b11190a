//! Test doubles for the command boundary

use crate::command::{CommandError, CommandOutput, CommandRunner, CommandSpec};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

enum Scripted {
    Output(CommandOutput),
    TimedOut,
    NotFound,
}

/// Spy runner: records every invocation and replays scripted results in order
///
/// Once the script is exhausted every call succeeds with empty output.
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<CommandSpec>>,
    script: Mutex<VecDeque<Scripted>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_success(&self, stdout: impl Into<String>) -> &Self {
        self.push(Scripted::Output(CommandOutput::success(stdout)))
    }

    pub fn push_failure(&self, code: i32, stderr: impl Into<String>) -> &Self {
        self.push(Scripted::Output(CommandOutput::failure(code, stderr)))
    }

    pub fn push_timeout(&self) -> &Self {
        self.push(Scripted::TimedOut)
    }

    /// The next call behaves as if the program is not installed
    pub fn push_not_found(&self) -> &Self {
        self.push(Scripted::NotFound)
    }

    fn push(&self, item: Scripted) -> &Self {
        self.script.lock().unwrap().push_back(item);
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Logged form of every recorded call
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(CommandSpec::display).collect()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        self.calls.lock().unwrap().push(spec.clone());
        match self.script.lock().unwrap().pop_front() {
            Some(Scripted::Output(output)) => Ok(output),
            Some(Scripted::TimedOut) => Err(CommandError::TimedOut {
                program: spec.program.clone(),
                timeout: spec.timeout.unwrap_or(Duration::ZERO),
            }),
            Some(Scripted::NotFound) => Err(CommandError::NotFound(spec.program.clone())),
            None => Ok(CommandOutput::success("")),
        }
    }
}
