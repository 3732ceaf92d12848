// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The job manager: prepare, submit, poll, and kill jobs.
//!
//! All platform interaction happens on spawned tasks; results come back
//! to the scheduler as [`SchedulerEvent`]s. The scheduler thread never
//! blocks on a batch system.

use crate::error::EngineError;
use crate::events::{SchedulerEvent, SubmitOutcome};
use crate::proxy::TaskProxy;
use crate::script::{self, JobScriptContext};
use parking_lot::Mutex;
use rota_config::PlatformDef;
use rota_core::message::JobMessage;
use rota_core::task::TaskId;
use rota_platform::{batch, DriverFactory, PlatformDriver, SubmittedJob};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Concurrent platform operations allowed per platform.
const PLATFORM_CONCURRENCY: usize = 10;

/// Owns platform drivers and the submit/poll/kill plumbing.
pub struct JobManager {
    workflow_id: String,
    run_dir: PathBuf,
    cycling_mode: String,
    factory: Arc<dyn DriverFactory>,
    event_tx: mpsc::Sender<SchedulerEvent>,
    drivers: Mutex<HashMap<String, Arc<dyn PlatformDriver>>>,
    /// Install targets already synced this run
    installed: Arc<Mutex<HashSet<String>>>,
    in_flight: Arc<Mutex<HashMap<String, usize>>>,
}

impl JobManager {
    pub fn new(
        workflow_id: impl Into<String>,
        run_dir: PathBuf,
        cycling_mode: impl Into<String>,
        factory: Arc<dyn DriverFactory>,
        event_tx: mpsc::Sender<SchedulerEvent>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            run_dir,
            cycling_mode: cycling_mode.into(),
            factory,
            event_tx,
            drivers: Mutex::new(HashMap::new()),
            installed: Arc::new(Mutex::new(HashSet::new())),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn driver_for(&self, platform: &PlatformDef) -> Arc<dyn PlatformDriver> {
        let mut drivers = self.drivers.lock();
        drivers
            .entry(platform.name.clone())
            .or_insert_with(|| self.factory.driver_for(platform))
            .clone()
    }

    /// Whether the per-platform concurrency limit has head-room.
    pub fn can_submit(&self, platform_name: &str) -> bool {
        self.in_flight
            .lock()
            .get(platform_name)
            .copied()
            .unwrap_or(0)
            < PLATFORM_CONCURRENCY
    }

    /// Prepare and submit a job for the proxy's current submit number.
    ///
    /// Renders the job script to `log/job/<cycle>/<name>/<NN>/job`, then
    /// submits on a spawned task; the outcome arrives as a
    /// [`SchedulerEvent::SubmitResult`].
    pub fn submit(
        &self,
        proxy: &TaskProxy,
        platform: PlatformDef,
        env: BTreeMap<String, String>,
        script_override: Option<String>,
    ) -> Result<(), EngineError> {
        let task = proxy.id.clone();
        let submit_num = proxy.submit_num;
        let runtime = &proxy.def.runtime;

        let mut directives: Vec<(String, String)> = platform
            .directives
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (k, v) in &runtime.directives {
            match directives.iter_mut().find(|(dk, _)| dk == k) {
                Some(entry) => entry.1 = v.clone(),
                None => directives.push((k.clone(), v.clone())),
            }
        }

        let ctx = JobScriptContext {
            workflow_id: self.workflow_id.clone(),
            run_dir: self.run_dir.display().to_string(),
            task: task.clone(),
            submit_num,
            try_num: proxy.try_num.max(1),
            platform_name: platform.name.clone(),
            cycling_mode: self.cycling_mode.clone(),
            directives,
            directive_prefix: batch::directive_prefix(platform.job_runner)
                .map(str::to_string),
            env,
            env_script: runtime.env_script.clone(),
            pre_script: runtime.pre_script.clone(),
            script: script_override.unwrap_or_else(|| runtime.script.clone()),
            post_script: runtime.post_script.clone(),
            err_script: runtime.err_script.clone(),
            exit_script: runtime.exit_script.clone(),
        };

        let job_dir = crate::paths::job_dir(&self.run_dir, &task, submit_num);
        std::fs::create_dir_all(&job_dir)?;
        let script_path = crate::paths::job_script_path(&self.run_dir, &task, submit_num);
        std::fs::write(&script_path, script::render(&ctx))?;
        set_executable(&script_path)?;

        let needs_install = !platform.is_local()
            && !self.installed.lock().contains(&platform.install_target);
        let driver = self.driver_for(&platform);
        let event_tx = self.event_tx.clone();
        let in_flight = Arc::clone(&self.in_flight);
        let installed_set = Arc::clone(&self.installed);
        let install_target = platform.install_target.clone();
        let platform_name = platform.name.clone();
        let run_dir = self.run_dir.clone();

        *in_flight.lock().entry(platform_name.clone()).or_default() += 1;

        tokio::spawn(async move {
            let outcome = async {
                if needs_install {
                    driver.install(&run_dir).await?;
                    installed_set.lock().insert(install_target);
                }
                driver.submit(&script_path, &job_dir).await
            }
            .await;

            *in_flight.lock().entry(platform_name).or_default() -= 1;

            let outcome = match outcome {
                Ok(job) => SubmitOutcome::Submitted(job),
                Err(e) => SubmitOutcome::Failed {
                    connection: e.is_connection_error()
                        || matches!(e, rota_platform::PlatformError::HostsExhausted { .. }),
                    detail: e.to_string(),
                },
            };
            let _ = event_tx
                .send(SchedulerEvent::SubmitResult {
                    task,
                    submit_num,
                    outcome,
                })
                .await;
        });

        Ok(())
    }

    /// Poll a job's batch status; the result arrives as an event.
    pub fn poll(&self, task: TaskId, submit_num: u32, job: SubmittedJob, platform: &PlatformDef) {
        let driver = self.driver_for(platform);
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            let status = match driver.poll(&job).await {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!(task = %task, error = %e, "poll failed");
                    return;
                }
            };
            let _ = event_tx
                .send(SchedulerEvent::PollResult {
                    task,
                    submit_num,
                    status,
                })
                .await;
        });
    }

    /// Kill a job; the result arrives as an event.
    pub fn kill(&self, task: TaskId, submit_num: u32, job: SubmittedJob, platform: &PlatformDef) {
        let driver = self.driver_for(platform);
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            let ok = match driver.kill(&job).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(task = %task, error = %e, "kill failed");
                    false
                }
            };
            let _ = event_tx
                .send(SchedulerEvent::KillResult {
                    task,
                    submit_num,
                    ok,
                })
                .await;
        });
    }

    /// Read the terminal message from a job's `job.status` file, if any.
    ///
    /// The poll path uses this to reconcile jobs that finished while the
    /// scheduler was unreachable (or down, at restart).
    pub fn read_status_message(&self, task: &TaskId, submit_num: u32) -> Option<JobMessage> {
        let path = crate::paths::job_status_path(&self.run_dir, task, submit_num);
        let content = std::fs::read_to_string(path).ok()?;
        script::parse_status_file(&content)
    }
}

#[cfg(unix)]
fn set_executable(path: &std::path::Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn set_executable(_path: &std::path::Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;
