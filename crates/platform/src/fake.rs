// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake platform driver and executor for testing

use crate::command::{CommandExecutor, CommandOutput};
use crate::driver::{DriverFactory, PlatformDriver, PollStatus, SubmittedJob};
use crate::error::PlatformError;
use async_trait::async_trait;
use parking_lot::Mutex;
use rota_config::PlatformDef;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Recorded driver call
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformCall {
    Submit { script: PathBuf },
    Poll { job_id: String },
    Kill { job_id: String },
    Install { src: PathBuf },
    Clean { target: PathBuf },
}

struct FakePlatformState {
    calls: Vec<PlatformCall>,
    submitted: Vec<SubmittedJob>,
    /// Scripted submit failures, consumed in order before successes begin
    submit_failures: Vec<PlatformError>,
    poll_results: HashMap<String, PollStatus>,
    killed: Vec<String>,
    next_job_id: u64,
}

/// Fake platform driver: scripted submit outcomes, settable poll states,
/// recorded calls. Clones share state.
#[derive(Clone)]
pub struct FakePlatform {
    name: String,
    inner: Arc<Mutex<FakePlatformState>>,
}

impl FakePlatform {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(Mutex::new(FakePlatformState {
                calls: Vec::new(),
                submitted: Vec::new(),
                submit_failures: Vec::new(),
                poll_results: HashMap::new(),
                killed: Vec::new(),
                next_job_id: 0,
            })),
        }
    }

    /// Queue a submit failure; each failure is consumed by one attempt.
    pub fn push_submit_failure(&self, error: PlatformError) {
        self.inner.lock().submit_failures.push(error);
    }

    /// Set what the next poll of a job reports.
    pub fn set_poll(&self, job_id: &str, status: PollStatus) {
        self.inner
            .lock()
            .poll_results
            .insert(job_id.to_string(), status);
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.inner.lock().calls.clone()
    }

    pub fn submitted(&self) -> Vec<SubmittedJob> {
        self.inner.lock().submitted.clone()
    }

    pub fn killed(&self) -> Vec<String> {
        self.inner.lock().killed.clone()
    }
}

#[async_trait]
impl PlatformDriver for FakePlatform {
    async fn submit(&self, script: &Path, _job_dir: &Path) -> Result<SubmittedJob, PlatformError> {
        let mut state = self.inner.lock();
        state.calls.push(PlatformCall::Submit {
            script: script.to_path_buf(),
        });
        if !state.submit_failures.is_empty() {
            return Err(state.submit_failures.remove(0));
        }
        state.next_job_id += 1;
        let job = SubmittedJob {
            platform: self.name.clone(),
            host: "localhost".to_string(),
            job_id: state.next_job_id.to_string(),
        };
        state.submitted.push(job.clone());
        state.poll_results.insert(job.job_id.clone(), PollStatus::Queued);
        Ok(job)
    }

    async fn poll(&self, job: &SubmittedJob) -> Result<PollStatus, PlatformError> {
        let mut state = self.inner.lock();
        state.calls.push(PlatformCall::Poll {
            job_id: job.job_id.clone(),
        });
        Ok(state
            .poll_results
            .get(&job.job_id)
            .copied()
            .unwrap_or(PollStatus::Exited))
    }

    async fn kill(&self, job: &SubmittedJob) -> Result<(), PlatformError> {
        let mut state = self.inner.lock();
        state.calls.push(PlatformCall::Kill {
            job_id: job.job_id.clone(),
        });
        state.killed.push(job.job_id.clone());
        state.poll_results.insert(job.job_id.clone(), PollStatus::Exited);
        Ok(())
    }

    async fn install(&self, src: &Path) -> Result<(), PlatformError> {
        self.inner.lock().calls.push(PlatformCall::Install {
            src: src.to_path_buf(),
        });
        Ok(())
    }

    async fn clean(&self, target: &Path) -> Result<(), PlatformError> {
        self.inner.lock().calls.push(PlatformCall::Clean {
            target: target.to_path_buf(),
        });
        Ok(())
    }
}

/// Factory handing every platform the same shared [`FakePlatform`].
#[derive(Clone)]
pub struct FakeDriverFactory {
    fake: FakePlatform,
}

impl FakeDriverFactory {
    pub fn new(fake: FakePlatform) -> Self {
        Self { fake }
    }

    pub fn fake(&self) -> &FakePlatform {
        &self.fake
    }
}

impl DriverFactory for FakeDriverFactory {
    fn driver_for(&self, _platform: &PlatformDef) -> Arc<dyn PlatformDriver> {
        Arc::new(self.fake.clone())
    }
}

/// Fake executor with per-host scripted outcomes, for failover tests.
#[derive(Clone, Default)]
pub struct FakeExecutor {
    inner: Arc<Mutex<FakeExecutorState>>,
}

#[derive(Default)]
struct FakeExecutorState {
    /// host ("local" for None) -> scripted result
    outcomes: HashMap<String, Result<CommandOutput, String>>,
    runs: Vec<(Option<String>, String)>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful output for a host (`None` = local).
    pub fn ok(&self, host: Option<&str>, stdout: &str) {
        self.inner.lock().outcomes.insert(
            host.unwrap_or("local").to_string(),
            Ok(CommandOutput {
                exit_code: 0,
                stdout: stdout.to_string(),
                stderr: String::new(),
            }),
        );
    }

    /// Script a non-zero exit (a real answer, not a connection problem).
    pub fn fail(&self, host: Option<&str>, exit_code: i32, stderr: &str) {
        self.inner.lock().outcomes.insert(
            host.unwrap_or("local").to_string(),
            Ok(CommandOutput {
                exit_code,
                stdout: String::new(),
                stderr: stderr.to_string(),
            }),
        );
    }

    /// Script a connection failure for a host.
    pub fn unreachable(&self, host: &str) {
        self.inner
            .lock()
            .outcomes
            .insert(host.to_string(), Err(host.to_string()));
    }

    /// Commands run so far, as (host, command) pairs.
    pub fn runs(&self) -> Vec<(Option<String>, String)> {
        self.inner.lock().runs.clone()
    }
}

#[async_trait]
impl CommandExecutor for FakeExecutor {
    async fn run(&self, host: Option<&str>, command: &str) -> Result<CommandOutput, PlatformError> {
        let mut state = self.inner.lock();
        state
            .runs
            .push((host.map(str::to_string), command.to_string()));
        let key = host.unwrap_or("local");
        match state.outcomes.get(key) {
            Some(Ok(output)) => Ok(output.clone()),
            Some(Err(host)) => Err(PlatformError::Connection {
                host: host.clone(),
                detail: "scripted connection failure".to_string(),
            }),
            None => Ok(CommandOutput {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            }),
        }
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
