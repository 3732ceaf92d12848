// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution with timeout, local or over ssh.

use crate::error::PlatformError;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;

/// Default timeout for platform commands (PT10S).
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Captured result of a platform command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Runs platform commands. `host` of `None` (or `localhost`) executes
/// directly; anything else goes through the configured ssh command.
#[async_trait]
pub trait CommandExecutor: Send + Sync + 'static {
    async fn run(&self, host: Option<&str>, command: &str) -> Result<CommandOutput, PlatformError>;
}

/// Production executor: bash locally, ssh remotely, bounded by a timeout.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    pub ssh_command: String,
    pub timeout: Duration,
}

impl ShellExecutor {
    pub fn new(ssh_command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            ssh_command: ssh_command.into(),
            timeout,
        }
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn run(&self, host: Option<&str>, command: &str) -> Result<CommandOutput, PlatformError> {
        let full = match host {
            None => command.to_string(),
            Some("localhost") => command.to_string(),
            Some(host) => {
                // Single-quote the remote command, escaping embedded quotes
                let quoted = command.replace('\'', r"'\''");
                format!("{} {host} '{quoted}'", self.ssh_command)
            }
        };

        tracing::debug!(command = %full, "running platform command");

        let mut child = tokio::process::Command::new("bash")
            .arg("-c")
            .arg(&full)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let waited = tokio::time::timeout(self.timeout, async {
            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            if let Some(mut out) = child.stdout.take() {
                use tokio::io::AsyncReadExt;
                let _ = out.read_to_end(&mut stdout).await;
            }
            if let Some(mut err) = child.stderr.take() {
                use tokio::io::AsyncReadExt;
                let _ = err.read_to_end(&mut stderr).await;
            }
            let status = child.wait().await;
            (status, stdout, stderr)
        })
        .await;

        match waited {
            Err(_) => {
                // Exceeded the timeout: reported as -9, killed on timeout
                tracing::warn!(command = %full, "command killed on timeout");
                Err(PlatformError::Timeout {
                    command: full.clone(),
                })
            }
            Ok((status, stdout, stderr)) => {
                let exit_code = status?.code().unwrap_or(-1);
                let output = CommandOutput {
                    exit_code,
                    stdout: String::from_utf8_lossy(&stdout).to_string(),
                    stderr: String::from_utf8_lossy(&stderr).to_string(),
                };
                // ssh reserves 255 for its own (connection) failures
                if host.map(|h| h != "localhost").unwrap_or(false) && exit_code == 255 {
                    return Err(PlatformError::Connection {
                        host: host.unwrap_or_default().to_string(),
                        detail: output.stderr.trim().to_string(),
                    });
                }
                Ok(output)
            }
        }
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
