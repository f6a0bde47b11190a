//! External command execution
//!
//! Provider adapters never spawn processes directly. They describe the call as
//! a [`CommandSpec`] and hand it to a [`CommandRunner`], so a CLI invocation can
//! be replaced by a native SDK call or a test spy without touching callers.

use crate::error::CloudError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

const REDACTED: &str = "****";

/// One external command invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    pub current_dir: Option<PathBuf>,
    pub stdin: Option<String>,
    pub timeout: Option<Duration>,
    /// Values masked when the command line is logged
    pub secrets: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Adds `flag value` only when the value is present
    pub fn opt_arg(self, flag: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.arg(flag).arg(v),
            None => self,
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Adds an argument whose value must not appear in logs
    pub fn secret_arg(mut self, value: impl Into<String>) -> Self {
        let value = value.into();
        self.secrets.push(value.clone());
        self.args.push(value);
        self
    }

    /// Command line for logs, with secrets masked
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            let mut shown = arg.clone();
            for secret in self.secrets.iter().filter(|s| !s.is_empty()) {
                shown = shown.replace(secret.as_str(), REDACTED);
            }
            line.push_str(&shown);
        }
        line
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    /// The most useful error text: stderr, else stdout, else the exit code
    pub fn error_message(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.code {
            Some(code) => format!("exited with status {}", code),
            None => "terminated by signal".to_string(),
        }
    }

    /// Stdout of a successful command, or `ProviderOperationFailed`
    pub fn into_stdout(self, provider: &str) -> crate::Result<String> {
        if self.is_success() {
            Ok(self.stdout)
        } else {
            Err(CloudError::operation_failed(provider, self.error_message()))
        }
    }
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("{0} not found in PATH")]
    NotFound(String),

    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} killed after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
}

impl CommandError {
    /// Maps into the provider error taxonomy; a timeout stays distinct
    pub fn into_cloud(self, provider: &str) -> CloudError {
        match self {
            CommandError::TimedOut { .. } => CloudError::Timeout(self.to_string()),
            other => CloudError::operation_failed(provider, other.to_string()),
        }
    }
}

/// Executes external commands
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> std::result::Result<CommandOutput, CommandError>;
}

/// Production runner backed by `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandRunner;

impl TokioCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> std::result::Result<CommandOutput, CommandError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        for (key, value) in &spec.envs {
            cmd.env(key, value);
        }
        if let Some(dir) = &spec.current_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // Dropping the wait future on timeout kills the child
        cmd.kill_on_drop(true);

        tracing::debug!("Running: {}", spec.display());

        let spawn_error = |source: std::io::Error| {
            if source.kind() == std::io::ErrorKind::NotFound {
                CommandError::NotFound(spec.program.clone())
            } else {
                CommandError::Spawn {
                    program: spec.program.clone(),
                    source,
                }
            }
        };

        let mut child = cmd.spawn().map_err(spawn_error)?;

        if let Some(input) = &spec.stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(input.as_bytes()).await.map_err(spawn_error)?;
                // Close stdin so the child sees EOF
                drop(pipe);
            }
        }

        let wait = child.wait_with_output();
        let output = match spec.timeout {
            Some(timeout) => tokio::time::timeout(timeout, wait)
                .await
                .map_err(|_| CommandError::TimedOut {
                    program: spec.program.clone(),
                    timeout,
                })?,
            None => wait.await,
        }
        .map_err(spawn_error)?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_masks_secrets() {
        let spec = CommandSpec::new("aws")
            .args(["rds", "create-db-instance", "--master-user-password"])
            .secret_arg("s3cr3t!")
            .arg("--master-username=admin");

        let line = spec.display();
        assert!(!line.contains("s3cr3t!"));
        assert!(line.contains("--master-user-password ****"));
        assert!(line.contains("admin"));
    }

    #[test]
    fn test_error_message_prefers_stderr() {
        let output = CommandOutput {
            code: Some(1),
            stdout: "partial".into(),
            stderr: "Error from server (Forbidden)\n".into(),
        };
        assert_eq!(output.error_message(), "Error from server (Forbidden)");
        assert_eq!(CommandOutput::failure(3, "").error_message(), "exited with status 3");
    }

    #[test]
    fn test_timeout_maps_to_timeout_error() {
        let err = CommandError::TimedOut {
            program: "kubectl".into(),
            timeout: Duration::from_secs(1),
        }
        .into_cloud("aws");
        assert!(matches!(err, CloudError::Timeout(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tokio_runner_captures_output_and_stdin() {
        let runner = TokioCommandRunner::new();
        let output = runner
            .run(&CommandSpec::new("cat").stdin("hello"))
            .await
            .unwrap();
        assert!(output.is_success());
        assert_eq!(output.stdout, "hello");

        let output = runner
            .run(&CommandSpec::new("sh").args(["-c", "echo boom >&2; exit 4"]))
            .await
            .unwrap();
        assert_eq!(output.code, Some(4));
        assert_eq!(output.error_message(), "boom");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tokio_runner_timeout_and_missing_binary() {
        let runner = TokioCommandRunner::new();
        let err = runner
            .run(&CommandSpec::new("sleep").arg("5").timeout(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::TimedOut { .. }));

        let err = runner
            .run(&CommandSpec::new("hostplane-no-such-binary"))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::NotFound(_)));
    }
}
