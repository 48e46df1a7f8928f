//! Privileged command execution

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

use crate::errors::AgentError;

/// Captured output of a successful command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }
}

/// Runs host commands with root privileges.
///
/// A non-zero exit status is an error. Implementations must bound every call
/// so a hung command cannot hold the deployer's lock forever.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run_privileged(&self, argv: &[&str]) -> Result<CommandOutput, AgentError>;
}

/// `CommandRunner` backed by `tokio::process`
#[derive(Debug, Clone)]
pub struct TokioCommandRunner {
    timeout: Duration,
    use_sudo: bool,
}

impl TokioCommandRunner {
    pub fn new(timeout: Duration, use_sudo: bool) -> Self {
        Self { timeout, use_sudo }
    }

    fn build(&self, argv: &[&str]) -> Result<Command, AgentError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| AgentError::Internal("empty command line".to_string()))?;

        let mut command = if self.use_sudo {
            let mut c = Command::new("sudo");
            c.arg("-n").arg(program);
            c
        } else {
            Command::new(program)
        };
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(command)
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run_privileged(&self, argv: &[&str]) -> Result<CommandOutput, AgentError> {
        let command_line = argv.join(" ");
        debug!("Running: {}", command_line);

        let mut child = self
            .build(argv)?
            .spawn()
            .map_err(|source| AgentError::CommandSpawn {
                command: command_line.clone(),
                source,
            })?;

        let mut stdout_handle = child.stdout.take();
        let mut stderr_handle = child.stderr.take();

        // Drain both pipes while waiting so a chatty child cannot block on a full pipe.
        let finished = tokio::time::timeout(self.timeout, async {
            let (status, stdout, stderr) = tokio::join!(
                child.wait(),
                async {
                    let mut buf = Vec::new();
                    if let Some(ref mut h) = stdout_handle {
                        let _ = h.read_to_end(&mut buf).await;
                    }
                    buf
                },
                async {
                    let mut buf = Vec::new();
                    if let Some(ref mut h) = stderr_handle {
                        let _ = h.read_to_end(&mut buf).await;
                    }
                    buf
                },
            );
            (status, stdout, stderr)
        })
        .await;

        let (status, stdout, stderr) = match finished {
            Ok(result) => result,
            Err(_) => {
                let _ = child.kill().await;
                return Err(AgentError::CommandTimeout {
                    command: command_line,
                    timeout: self.timeout,
                });
            }
        };

        let status = status?;
        let stdout = String::from_utf8_lossy(&stdout).into_owned();
        let stderr = String::from_utf8_lossy(&stderr).into_owned();

        if !status.success() {
            return Err(AgentError::CommandFailed {
                command: command_line,
                code: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}
