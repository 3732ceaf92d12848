// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The production platform driver: batch commands over bash/ssh.

use crate::batch;
use crate::command::{CommandExecutor, CommandOutput, ShellExecutor, DEFAULT_COMMAND_TIMEOUT};
use crate::driver::{DriverFactory, PlatformDriver, PollStatus, SubmittedJob};
use crate::error::PlatformError;
use crate::hosts::{HostPool, DEFAULT_COOLDOWN};
use async_trait::async_trait;
use rota_config::PlatformDef;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Driver that shells out to the platform's batch system, failing over
/// across the platform's hosts on connectivity errors.
pub struct ShellDriver<E: CommandExecutor> {
    platform: PlatformDef,
    hosts: HostPool,
    exec: E,
}

impl<E: CommandExecutor> ShellDriver<E> {
    pub fn new(platform: PlatformDef, exec: E, cooldown: Duration) -> Self {
        let hosts = HostPool::new(platform.hosts.clone(), cooldown);
        Self {
            platform,
            hosts,
            exec,
        }
    }

    /// Run a command with host failover.
    ///
    /// Connectivity failures mark the host bad and move on; any other
    /// result is the platform's answer and is returned as-is.
    async fn run_with_failover(&self, command: &str) -> Result<(String, CommandOutput), PlatformError> {
        let candidates = self.hosts.candidates();
        if candidates.is_empty() {
            return Err(PlatformError::HostsExhausted {
                platform: self.platform.name.clone(),
            });
        }
        for host in &candidates {
            let target = if self.platform.is_local() || host == "localhost" {
                None
            } else {
                Some(host.as_str())
            };
            match self.exec.run(target, command).await {
                Ok(output) => {
                    self.hosts.mark_good(host);
                    return Ok((host.clone(), output));
                }
                Err(e) if e.is_connection_error() => {
                    tracing::warn!(
                        platform = %self.platform.name,
                        host = %host,
                        error = %e,
                        "host failed, trying next host"
                    );
                    self.hosts.mark_bad(host);
                }
                Err(e) => return Err(e),
            }
        }
        Err(PlatformError::HostsExhausted {
            platform: self.platform.name.clone(),
        })
    }
}

#[async_trait]
impl<E: CommandExecutor> PlatformDriver for ShellDriver<E> {
    async fn submit(&self, script: &Path, job_dir: &Path) -> Result<SubmittedJob, PlatformError> {
        let command = batch::submit_command(
            &self.platform,
            &script.display().to_string(),
            &job_dir.display().to_string(),
        )?;
        let (host, output) = self.run_with_failover(&command).await?;
        if output.exit_code != 0 {
            return Err(PlatformError::Submission {
                detail: if output.stderr.trim().is_empty() {
                    format!("submit exited {}", output.exit_code)
                } else {
                    output.stderr.trim().to_string()
                },
            });
        }
        // `at` reports on stderr; fall back to it when stdout is empty
        let scan = if output.stdout.trim().is_empty() {
            &output.stderr
        } else {
            &output.stdout
        };
        let job_id = batch::parse_job_id(&self.platform, scan)?;
        Ok(SubmittedJob {
            platform: self.platform.name.clone(),
            host,
            job_id,
        })
    }

    async fn poll(&self, job: &SubmittedJob) -> Result<PollStatus, PlatformError> {
        let command = batch::poll_command(&self.platform, &job.job_id)?;
        let (_, output) = self.run_with_failover(&command).await?;
        Ok(batch::parse_poll(
            &self.platform,
            output.exit_code,
            &output.stdout,
            &job.job_id,
        ))
    }

    async fn kill(&self, job: &SubmittedJob) -> Result<(), PlatformError> {
        let command = batch::kill_command(&self.platform, &job.job_id)?;
        let (_, output) = self.run_with_failover(&command).await?;
        if output.exit_code != 0 {
            return Err(PlatformError::CommandFailed {
                command,
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(())
    }

    async fn install(&self, src: &Path) -> Result<(), PlatformError> {
        if self.platform.is_local() {
            return Ok(());
        }
        let src_str = src.display().to_string();
        for host in self.hosts.candidates() {
            let command = format!(
                "rsync -a --rsh='{}' {}/ {}:{}/",
                self.platform.ssh_command, src_str, host, src_str
            );
            match self.exec.run(None, &command).await {
                Ok(output) if output.exit_code == 0 => {
                    self.hosts.mark_good(&host);
                    return Ok(());
                }
                Ok(output) => {
                    return Err(PlatformError::CommandFailed {
                        command,
                        exit_code: output.exit_code,
                        stderr: output.stderr.trim().to_string(),
                    })
                }
                Err(e) if e.is_connection_error() => self.hosts.mark_bad(&host),
                Err(e) => return Err(e),
            }
        }
        Err(PlatformError::HostsExhausted {
            platform: self.platform.name.clone(),
        })
    }

    async fn clean(&self, target: &Path) -> Result<(), PlatformError> {
        if self.platform.is_local() {
            return Ok(());
        }
        let command = format!("rm -rf {}", target.display());
        self.run_with_failover(&command).await.map(|_| ())
    }
}

/// Factory producing [`ShellDriver`]s with production executors.
pub struct ShellDriverFactory {
    pub command_timeout: Duration,
    pub host_cooldown: Duration,
}

impl Default for ShellDriverFactory {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            host_cooldown: DEFAULT_COOLDOWN,
        }
    }
}

impl DriverFactory for ShellDriverFactory {
    fn driver_for(&self, platform: &PlatformDef) -> Arc<dyn PlatformDriver> {
        let exec = ShellExecutor::new(platform.ssh_command.clone(), self.command_timeout);
        Arc::new(ShellDriver::new(
            platform.clone(),
            exec,
            self.host_cooldown,
        ))
    }
}

#[cfg(test)]
#[path = "shell_tests.rs"]
mod tests;
