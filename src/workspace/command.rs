//! Shell command execution inside the workspace root
//!
//! Commands are passed verbatim to the configured shell. There is no
//! allow-list and no cap on concurrent processes.

use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

use crate::workspace::history::SharedLogs;
use crate::workspace::root::{SharedAccess, WorkspaceRoot};

/// Captured result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Command cannot be empty")]
    Empty,
    #[error("Failed to spawn command: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Command failed: {command}\n{stderr}")]
    Failed {
        command: String,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    #[error("Command timed out after {timeout:?}: {command}")]
    TimedOut { command: String, timeout: Duration },
}

impl CommandError {
    /// 写入历史的内容：失败时记录 stderr
    fn log_message(&self) -> String {
        match self {
            CommandError::Failed { stderr, .. } if !stderr.is_empty() => stderr.clone(),
            other => other.to_string(),
        }
    }
}

pub struct CommandRunner {
    root: WorkspaceRoot,
    logs: SharedLogs,
    shell: String,
    timeout: Option<Duration>,
}

impl CommandRunner {
    pub fn new(root: WorkspaceRoot, logs: SharedLogs, shell: impl Into<String>) -> Self {
        Self {
            root,
            logs,
            shell: shell.into(),
            timeout: None,
        }
    }

    /// Kill commands that outlive `timeout`. Unset by default.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run `command` with the workspace root as cwd and wait for it to finish.
    ///
    /// Appends exactly one history entry: stdout on success, stderr on failure.
    pub async fn execute(&self, command: &str) -> Result<CommandOutput, CommandError> {
        if command.trim().is_empty() {
            return Err(CommandError::Empty);
        }

        let access = self.root.shared().await;
        self.execute_locked(command, access).await
    }

    /// Same as [`execute`](Self::execute) with shared access the caller already holds.
    ///
    /// The guard is released once the command finishes, before history is written.
    pub async fn execute_locked(
        &self,
        command: &str,
        access: SharedAccess,
    ) -> Result<CommandOutput, CommandError> {
        if command.trim().is_empty() {
            return Err(CommandError::Empty);
        }

        let result = {
            let _access = access;
            info!(command = %command, "Executing command");
            self.run(command).await
        };

        match &result {
            Ok(output) => {
                info!(command = %command, exit_code = ?output.exit_code, "Command completed");
                if output.stdout.is_empty() {
                    self.logs
                        .success(format!("Command completed with no output: {}", command));
                } else {
                    self.logs.success(output.stdout.clone());
                }
            }
            Err(e) => {
                warn!(command = %command, error = %e, "Command failed");
                self.logs.error(e.log_message());
            }
        }

        result
    }

    async fn run(&self, command: &str) -> Result<CommandOutput, CommandError> {
        let mut cmd = shell_command(&self.shell, command);
        cmd.current_dir(self.root.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn()?;
        // 超时后 future 被丢弃，kill_on_drop 负责结束子进程
        let output = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, child.wait_with_output())
                .await
                .map_err(|_| CommandError::TimedOut {
                    command: command.to_string(),
                    timeout,
                })??,
            None => child.wait_with_output().await?,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_code = output.status.code();

        if !output.status.success() {
            return Err(CommandError::Failed {
                command: command.to_string(),
                exit_code,
                stdout,
                stderr,
            });
        }

        Ok(CommandOutput {
            command: command.to_string(),
            stdout,
            stderr,
            exit_code,
        })
    }
}

fn shell_command(shell: &str, command: &str) -> Command {
    let mut cmd = Command::new(shell);
    if cfg!(windows) {
        cmd.arg("/C");
    } else {
        cmd.arg("-c");
    }
    cmd.arg(command);
    cmd
}
