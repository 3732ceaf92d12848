// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The scheduler: a single-threaded state machine driven by short ticks.
//!
//! All task state lives here. The listener and the job manager's spawned
//! tasks communicate with it over channels only; a tick drains those
//! channels, advances the pool, submits ready jobs, and commits one
//! transaction to the state database.

use crate::error::SchedulerError;
use rota_config::{PlatformDef, WorkflowConfig};
use rota_core::broadcast::{BroadcastEntry, BroadcastStore};
use rota_core::clock::Clock;
use rota_core::command::{Command, StopMode};
use rota_core::message::{JobMessage, Severity};
use rota_core::outputs::{OUT_FAILED, OUT_STARTED, OUT_SUBMITTED, OUT_SUBMIT_FAILED, OUT_SUCCEEDED};
use rota_core::point::CyclePoint;
use rota_core::task::{TaskId, TaskState};
use rota_engine::events::{SchedulerEvent, SubmitOutcome};
use rota_engine::jobs::JobManager;
use rota_engine::pool::TaskPool;
use rota_engine::timers::{TimerKind, Timers};
use rota_platform::{DriverFactory, PollStatus};
use rota_storage::{CheckpointEvent, DbOp, StateDb};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::{mpsc, oneshot};

/// Per-tick budget for command and event drains, so one tick stays
/// bounded even under a message flood.
const COMMAND_BUDGET: usize = 64;
const EVENT_BUDGET: usize = 1024;

/// Safety margin added to the execution time limit before a forced poll.
const TIME_LIMIT_TOLERANCE: StdDuration = StdDuration::from_secs(60);

/// Default cadence for batch-status polling when a platform gives none.
const DEFAULT_POLL_INTERVAL: StdDuration = StdDuration::from_secs(60);

/// Why the scheduler is shutting down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Every task ran to completion; exit 0
    Finished,
    Stop(StopMode),
    StallTimeout,
    InactivityTimeout,
    /// Unrecoverable error; last committed tick stands
    Fatal(String),
}

/// A control-surface request routed to the scheduler thread.
pub enum Intake {
    Control {
        command: Command,
        reply: oneshot::Sender<Result<String, String>>,
    },
    Query {
        reply: oneshot::Sender<StatusReport>,
    },
}

/// Snapshot of scheduler state for status queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub workflow_id: String,
    pub paused: bool,
    pub stalled: bool,
    pub pool_size: usize,
    pub state_counts: BTreeMap<String, usize>,
    pub tasks: Vec<TaskReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub id: String,
    pub state: String,
    pub flows: String,
    pub is_held: bool,
    pub submit_num: u32,
}

/// The workflow scheduler.
pub struct Scheduler<C: Clock> {
    workflow_id: String,
    run_dir: PathBuf,
    pool: TaskPool,
    jobs: JobManager,
    timers: Timers,
    db: StateDb,
    broadcasts: BroadcastStore,
    clock: C,
    event_tx: mpsc::Sender<SchedulerEvent>,
    event_rx: mpsc::Receiver<SchedulerEvent>,
    intake_tx: mpsc::Sender<Intake>,
    intake_rx: mpsc::Receiver<Intake>,
    paused: bool,
    stop: Option<StopMode>,
    stalled: bool,
    /// Set when some event or command arrived this tick
    activity: bool,
    shutdown: Option<ShutdownReason>,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(
        config: Arc<WorkflowConfig>,
        workflow_id: impl Into<String>,
        run_dir: PathBuf,
        db: StateDb,
        factory: Arc<dyn DriverFactory>,
        clock: C,
    ) -> Self {
        let workflow_id = workflow_id.into();
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUDGET);
        let (intake_tx, intake_rx) = mpsc::channel(COMMAND_BUDGET);
        let cycling_mode = match config.calendar {
            None => "integer",
            Some(rota_core::point::Calendar::Gregorian) => "gregorian",
            Some(rota_core::point::Calendar::Day360) => "360day",
            Some(rota_core::point::Calendar::Day365) => "365day",
        };
        let jobs = JobManager::new(
            workflow_id.clone(),
            run_dir.clone(),
            cycling_mode,
            factory,
            event_tx.clone(),
        );
        Self {
            workflow_id,
            run_dir,
            pool: TaskPool::new(config),
            jobs,
            timers: Timers::new(),
            db,
            broadcasts: BroadcastStore::default(),
            clock,
            event_tx,
            event_rx,
            intake_tx,
            intake_rx,
            paused: false,
            stop: None,
            stalled: false,
            activity: false,
            shutdown: None,
        }
    }

    /// Sender for job messages and other engine events (listener side).
    pub fn event_sender(&self) -> mpsc::Sender<SchedulerEvent> {
        self.event_tx.clone()
    }

    /// Sender for control and query requests (listener side).
    pub fn intake_sender(&self) -> mpsc::Sender<Intake> {
        self.intake_tx.clone()
    }

    pub fn config(&self) -> Arc<WorkflowConfig> {
        Arc::clone(self.pool.config())
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Read access to the state database (status tools, tests).
    pub fn db(&self) -> &StateDb {
        &self.db
    }

    pub fn shutdown_reason(&self) -> Option<&ShutdownReason> {
        self.shutdown.as_ref()
    }

    /// Cold start: record the first flow and materialize start tasks.
    pub fn cold_start(&mut self) -> Result<(), SchedulerError> {
        self.stamp();
        self.pool.start_flow("original flow from cold start");
        self.pool.spawn_parentless()?;
        self.flush_db()?;
        Ok(())
    }

    /// Restart: rebuild the pool from the database and reconcile jobs
    /// that were active when the previous scheduler stopped.
    pub fn restart(&mut self) -> Result<(), SchedulerError> {
        self.stamp();
        let pool_rows = self.db.load_pool()?;
        let outputs = self.db.load_outputs()?;
        let prereqs = self.db.load_prereqs()?;
        let flows = self.db.load_flows()?;
        self.pool.restore(&pool_rows, &outputs, &prereqs, &flows)?;

        // Submit numbers stay strictly monotonic across restarts
        let ids: Vec<TaskId> = self.pool.tasks().map(|p| p.id.clone()).collect();
        for id in &ids {
            let n = self.db.max_submit_num(&id.point.to_string(), &id.name)?;
            if let Some(proxy) = self.pool.get_mut(id) {
                proxy.submit_num = n;
                if n > 0 && proxy.try_num == 0 {
                    proxy.try_num = 1;
                }
            }
        }

        // Jobs with no recorded exit are polled; if they finished while
        // the scheduler was down their job.status carries the outcome.
        let calendar = self.config().calendar;
        for job_row in self.db.active_jobs()? {
            let Ok(point) = CyclePoint::parse(&job_row.cycle, calendar) else {
                continue;
            };
            let task = TaskId::new(job_row.name.clone(), point);
            if self.pool.get(&task).is_none() {
                continue;
            }
            if let Some(message) = self.jobs.read_status_message(&task, job_row.submit_num) {
                tracing::info!(task = %task, "reconciled from job.status at restart");
                let _ = self.event_tx.try_send(SchedulerEvent::Message {
                    task,
                    submit_num: job_row.submit_num,
                    message,
                });
            } else if let Some(job_id) = &job_row.job_id {
                let job = rota_platform::SubmittedJob {
                    platform: job_row.platform_name.clone(),
                    host: String::new(),
                    job_id: job_id.clone(),
                };
                if let Some(proxy) = self.pool.get_mut(&task) {
                    proxy.job = Some(job.clone());
                    proxy.submit_num = job_row.submit_num;
                    proxy.platform_name = Some(job_row.platform_name.clone());
                }
                if let Ok(platform) = self.resolve_platform(Some(&job_row.platform_name)) {
                    self.jobs.poll(task, job_row.submit_num, job, &platform);
                }
            }
        }
        self.flush_db()?;
        Ok(())
    }

    /// One scheduling tick. Returns the shutdown reason once the
    /// scheduler should stop.
    pub async fn tick(&mut self) -> Result<Option<ShutdownReason>, SchedulerError> {
        self.stamp();
        self.activity = false;

        self.drain_intake();
        self.drain_events()?;
        self.fire_timers()?;

        if self.stop != Some(StopMode::Now) && self.stop != Some(StopMode::NowNow) {
            if !self.paused {
                self.pool.spawn_parentless()?;
                if self.stop.is_none() {
                    self.submit_ready()?;
                }
            }
        }

        self.pool.remove_completed();
        self.check_stall();
        self.check_watchdogs();
        self.flush_db()?;
        self.check_shutdown();

        Ok(self.shutdown.clone())
    }

    /// Write the final checkpoint; call once after the last tick.
    pub fn finalize(&mut self) -> Result<(), SchedulerError> {
        self.stamp();
        self.pool
            .push_op(CheckpointEvent::Shutdown.to_op(self.now_iso()));
        self.flush_db()?;
        Ok(())
    }

    // --- intake ---------------------------------------------------------

    fn drain_intake(&mut self) {
        for _ in 0..COMMAND_BUDGET {
            match self.intake_rx.try_recv() {
                Ok(Intake::Control { command, reply }) => {
                    self.activity = true;
                    let result = self.handle_command(command);
                    let _ = reply.send(result.map_err(|e| e.to_string()));
                }
                Ok(Intake::Query { reply }) => {
                    let _ = reply.send(self.status_report());
                }
                Err(_) => break,
            }
        }
    }

    fn drain_events(&mut self) -> Result<(), SchedulerError> {
        for _ in 0..EVENT_BUDGET {
            match self.event_rx.try_recv() {
                Ok(event) => {
                    self.activity = true;
                    self.handle_event(event)?;
                }
                Err(_) => break,
            }
        }
        Ok(())
    }

    fn fire_timers(&mut self) -> Result<(), SchedulerError> {
        for kind in self.timers.fired(self.clock.now()) {
            self.handle_timer(kind)?;
        }
        Ok(())
    }

    // --- commands -------------------------------------------------------

    fn handle_command(&mut self, command: Command) -> Result<String, SchedulerError> {
        tracing::info!(command = %command, "command received");
        match command {
            Command::Pause => {
                self.paused = true;
                Ok("paused".to_string())
            }
            Command::Resume => {
                self.paused = false;
                Ok("resumed".to_string())
            }
            Command::Stop { mode } => {
                self.stop = Some(mode);
                if mode == StopMode::Kill {
                    self.kill_active_jobs();
                }
                Ok(format!("stopping ({mode:?})"))
            }
            Command::Trigger { tasks, flow } => {
                let mut triggered = 0;
                for selector in &tasks {
                    let (point, name) = self.parse_selector(selector)?;
                    self.pool.trigger(&name, &point, &flow)?;
                    triggered += 1;
                }
                Ok(format!("triggered {triggered} task(s)"))
            }
            Command::Hold { tasks } => {
                for id in self.resolve_selectors(&tasks)? {
                    self.pool.hold(&id)?;
                }
                Ok("held".to_string())
            }
            Command::Release { tasks } => {
                for id in self.resolve_selectors(&tasks)? {
                    self.pool.release(&id)?;
                }
                Ok("released".to_string())
            }
            Command::Set { task, outputs } => {
                let (point, name) = self.parse_selector(&task)?;
                let id = TaskId::new(name, point);
                let outputs = if outputs.is_empty() {
                    vec![OUT_SUCCEEDED.to_string()]
                } else {
                    outputs
                };
                for output in &outputs {
                    self.complete_output(&id, output)?;
                }
                Ok(format!("set {} output(s) on {id}", outputs.len()))
            }
            Command::Kill { tasks } => {
                let ids = self.resolve_selectors(&tasks)?;
                for id in ids {
                    self.kill_task(&id)?;
                }
                Ok("killed".to_string())
            }
            Command::Poll { tasks } => {
                let ids = self.resolve_selectors(&tasks)?;
                for id in ids {
                    self.poll_task(&id);
                }
                Ok("polling".to_string())
            }
            Command::Reload => self.reload(),
            Command::Broadcast {
                cycle_points,
                namespaces,
                settings,
                clear,
                expire,
            } => self.broadcast(cycle_points, namespaces, settings, clear, expire),
        }
    }

    fn reload(&mut self) -> Result<String, SchedulerError> {
        let source = self.run_dir.join("flow.toml");
        let new_config = Arc::new(WorkflowConfig::load(&source)?);
        self.config().check_reload(&new_config)?;

        self.pool
            .push_op(CheckpointEvent::ReloadStart.to_op(self.now_iso()));
        self.pool.set_config(new_config);
        self.pool
            .push_op(CheckpointEvent::ReloadDone.to_op(self.now_iso()));
        tracing::info!("workflow definition reloaded");
        Ok("reloaded".to_string())
    }

    fn broadcast(
        &mut self,
        cycle_points: Vec<String>,
        namespaces: Vec<String>,
        settings: HashMap<String, String>,
        clear: bool,
        expire: Option<String>,
    ) -> Result<String, SchedulerError> {
        let calendar = self.config().calendar;
        let parse_point = |p: &str| CyclePoint::parse(p, calendar);

        if let Some(cutoff) = expire {
            self.broadcasts.expire(&parse_point(&cutoff)?);
        } else if clear {
            let points: Vec<Option<CyclePoint>> = cycle_points
                .iter()
                .map(|p| {
                    if p == "*" {
                        Ok(None)
                    } else {
                        parse_point(p).map(Some)
                    }
                })
                .collect::<Result<_, _>>()?;
            self.broadcasts.clear(&points, &namespaces);
        } else {
            let points = if cycle_points.is_empty() {
                vec![None]
            } else {
                cycle_points
                    .iter()
                    .map(|p| {
                        if p == "*" {
                            Ok(None)
                        } else {
                            parse_point(p).map(Some)
                        }
                    })
                    .collect::<Result<_, _>>()?
            };
            let namespaces = if namespaces.is_empty() {
                vec!["root".to_string()]
            } else {
                namespaces
            };
            for point in &points {
                for namespace in &namespaces {
                    for (key, value) in &settings {
                        self.broadcasts.put(BroadcastEntry {
                            point: *point,
                            namespace: namespace.clone(),
                            key: key.clone(),
                            value: value.clone(),
                        });
                    }
                }
            }
        }

        // Persist the whole store
        let rows = self
            .broadcasts
            .entries()
            .map(|e| {
                (
                    e.point.map(|p| p.to_string()).unwrap_or_else(|| "*".to_string()),
                    e.namespace.clone(),
                    e.key.clone(),
                    e.value.clone(),
                )
            })
            .collect();
        self.pool.push_op(DbOp::ReplaceBroadcasts { rows });
        Ok("broadcast applied".to_string())
    }

    // --- events ---------------------------------------------------------

    fn handle_event(&mut self, event: SchedulerEvent) -> Result<(), SchedulerError> {
        match event {
            SchedulerEvent::Message {
                task,
                submit_num,
                message,
            } => self.handle_message(&task, submit_num, message),
            SchedulerEvent::SubmitResult {
                task,
                submit_num,
                outcome,
            } => self.handle_submit_result(&task, submit_num, outcome),
            SchedulerEvent::PollResult {
                task,
                submit_num,
                status,
            } => self.handle_poll_result(&task, submit_num, status),
            SchedulerEvent::KillResult { task, submit_num, ok } => {
                if ok {
                    // The killed job exits with a signal; a prompt poll
                    // picks that up if the message never arrives
                    self.schedule_poll(&task, submit_num, StdDuration::from_secs(5));
                }
                Ok(())
            }
            SchedulerEvent::Timer(kind) => self.handle_timer(kind),
        }
    }

    fn handle_message(
        &mut self,
        task: &TaskId,
        submit_num: u32,
        message: JobMessage,
    ) -> Result<(), SchedulerError> {
        let Some(proxy) = self.pool.get(task) else {
            tracing::warn!(task = %task, "message for unknown task, dropping");
            return Ok(());
        };
        if submit_num != 0 && submit_num < proxy.submit_num {
            tracing::debug!(task = %task, submit_num, "stale message, dropping");
            return Ok(());
        }

        tracing::info!(task = %task, message = %message, "job message");
        match message {
            JobMessage::Started => {
                self.pool.set_state(task, TaskState::Running)?;
                self.pool.apply_output(task, OUT_STARTED)?;
                let now = self.now_iso();
                self.job_update(task, submit_num, move |op| {
                    if let DbOp::UpdateJob { time_run, .. } = op {
                        *time_run = Some(now);
                    }
                });
                self.arm_execution_watchdogs(task, submit_num);
                self.run_event_handlers(task, "started");
            }
            JobMessage::Succeeded => {
                self.pool.set_state(task, TaskState::Succeeded)?;
                self.pool.apply_output(task, OUT_SUCCEEDED)?;
                self.job_exit(task, submit_num, 0, None);
                self.timers.cancel_task(task);
                self.run_event_handlers(task, "succeeded");
            }
            JobMessage::Failed { signal } => {
                self.job_exit(task, submit_num, 1, signal.as_deref());
                self.handle_failure(task)?;
            }
            JobMessage::Vacated { signal } => {
                // Preempted: the job restarts without consuming a retry
                tracing::warn!(task = %task, signal = ?signal, "job vacated, awaiting restart");
                self.pool.set_state(task, TaskState::Submitted)?;
                self.schedule_poll(task, submit_num, DEFAULT_POLL_INTERVAL);
            }
            JobMessage::Output { output, message } => {
                let proxy = self
                    .pool
                    .get(task)
                    .ok_or_else(|| SchedulerError::Internal("task vanished".to_string()))?;
                let name = if proxy.outputs.is_declared(&output) {
                    Some(output.clone())
                } else {
                    proxy
                        .outputs
                        .output_for_message(&message)
                        .map(str::to_string)
                };
                match name {
                    Some(name) => {
                        self.pool.apply_output(task, &name)?;
                    }
                    None => {
                        tracing::warn!(task = %task, output = %output, "undeclared output, ignoring")
                    }
                }
            }
            JobMessage::Custom { severity, text } => match severity {
                Severity::Critical => tracing::error!(task = %task, "{text}"),
                Severity::Warning => tracing::warn!(task = %task, "{text}"),
                Severity::Info => tracing::info!(task = %task, "{text}"),
            },
        }
        Ok(())
    }

    fn handle_submit_result(
        &mut self,
        task: &TaskId,
        submit_num: u32,
        outcome: SubmitOutcome,
    ) -> Result<(), SchedulerError> {
        let Some(proxy) = self.pool.get(task) else {
            return Ok(());
        };
        if submit_num != proxy.submit_num {
            return Ok(());
        }
        match outcome {
            SubmitOutcome::Submitted(job) => {
                let platform_name = job.platform.clone();
                let job_id = job.job_id.clone();
                if let Some(proxy) = self.pool.get_mut(task) {
                    proxy.job = Some(job);
                }
                self.pool.set_state(task, TaskState::Submitted)?;
                self.pool.apply_output(task, OUT_SUBMITTED)?;
                self.pool.push_op(DbOp::UpdateJob {
                    cycle: task.point.to_string(),
                    name: task.name.clone(),
                    submit_num,
                    job_id: Some(job_id),
                    time_run: None,
                    time_run_exit: None,
                    run_signal: None,
                    run_status: None,
                });
                // Platforms without a callback channel are polled from
                // submission onwards
                if let Ok(platform) = self.resolve_platform(Some(&platform_name)) {
                    if platform.comms == rota_config::CommsMethod::Poll {
                        let delay = platform
                            .submission_polling_intervals
                            .first()
                            .and_then(|d| d.to_std().ok())
                            .unwrap_or(DEFAULT_POLL_INTERVAL);
                        self.schedule_poll(task, submit_num, delay);
                    }
                }
                self.run_event_handlers(task, "submitted");
            }
            SubmitOutcome::Failed { connection, detail } => {
                tracing::warn!(task = %task, connection, "job submission failed: {detail}");
                self.job_exit(task, submit_num, 1, None);
                self.handle_submit_failure(task)?;
            }
        }
        Ok(())
    }

    fn handle_poll_result(
        &mut self,
        task: &TaskId,
        submit_num: u32,
        status: PollStatus,
    ) -> Result<(), SchedulerError> {
        let Some(proxy) = self.pool.get(task) else {
            return Ok(());
        };
        if submit_num != proxy.submit_num {
            return Ok(());
        }
        match status {
            PollStatus::Queued => {
                self.schedule_poll(task, submit_num, self.poll_interval(task));
            }
            PollStatus::RunningNow => {
                if proxy.state == TaskState::Submitted {
                    // The started message never arrived; infer it
                    self.handle_message(task, submit_num, JobMessage::Started)?;
                }
                self.schedule_poll(task, submit_num, self.poll_interval(task));
            }
            PollStatus::Exited => {
                // Outcome comes from job.status; a job gone without trace
                // failed before it could report
                let message = self
                    .jobs
                    .read_status_message(task, submit_num)
                    .unwrap_or(JobMessage::Failed { signal: None });
                self.handle_message(task, submit_num, message)?;
            }
        }
        Ok(())
    }

    fn handle_timer(&mut self, kind: TimerKind) -> Result<(), SchedulerError> {
        match kind {
            TimerKind::ExecutionRetry { task } | TimerKind::SubmissionRetry { task } => {
                if let Some(proxy) = self.pool.get_mut(&task) {
                    proxy.retry_pending = false;
                    tracing::info!(task = %task, "retry delay elapsed, task eligible again");
                }
                Ok(())
            }
            TimerKind::Poll { task, submit_num } => {
                self.poll_now(&task, submit_num);
                Ok(())
            }
            TimerKind::ExecutionTimeout { task, submit_num } => {
                tracing::warn!(task = %task, "execution time limit exceeded, polling");
                self.poll_now(&task, submit_num);
                Ok(())
            }
            TimerKind::Stall => {
                if self.config().abort_on_stall_timeout {
                    tracing::error!("stall timeout reached, aborting");
                    self.shutdown = Some(ShutdownReason::StallTimeout);
                } else {
                    tracing::warn!("stall timeout reached");
                }
                Ok(())
            }
            TimerKind::Inactivity => {
                if self.config().abort_on_inactivity_timeout {
                    tracing::error!("inactivity timeout reached, aborting");
                    self.shutdown = Some(ShutdownReason::InactivityTimeout);
                } else {
                    tracing::warn!("inactivity timeout reached");
                }
                Ok(())
            }
        }
    }

    // --- retry / failure policy -----------------------------------------

    fn handle_failure(&mut self, task: &TaskId) -> Result<(), SchedulerError> {
        let Some(proxy) = self.pool.get_mut(task) else {
            return Ok(());
        };
        let delays = &proxy.def.runtime.execution_retry_delays;
        let tries = proxy.try_num.max(1) as usize;
        if !proxy.killed && tries <= delays.len() {
            let delay = delays[tries - 1]
                .to_std()
                .unwrap_or(StdDuration::from_secs(0));
            proxy.retry_pending = true;
            proxy.next_try();
            tracing::warn!(
                task = %task,
                try_num = tries,
                delay_secs = delay.as_secs(),
                "job failed, retrying"
            );
            self.pool.set_state(task, TaskState::Waiting)?;
            self.timers.set(
                TimerKind::ExecutionRetry { task: task.clone() },
                delay,
                self.clock.now(),
            );
            self.run_event_handlers(task, "retry");
        } else {
            self.pool.set_state(task, TaskState::Failed)?;
            self.pool.apply_output(task, OUT_FAILED)?;
            self.timers.cancel_task(task);
            self.run_event_handlers(task, "failed");
        }
        Ok(())
    }

    fn handle_submit_failure(&mut self, task: &TaskId) -> Result<(), SchedulerError> {
        let Some(proxy) = self.pool.get_mut(task) else {
            return Ok(());
        };
        let delays = &proxy.def.runtime.submission_retry_delays;
        let tries = proxy.sub_try_num.max(1) as usize;
        if tries <= delays.len() {
            let delay = delays[tries - 1]
                .to_std()
                .unwrap_or(StdDuration::from_secs(0));
            proxy.retry_pending = true;
            tracing::warn!(task = %task, try_num = tries, "submission failed, retrying");
            self.pool.set_state(task, TaskState::Waiting)?;
            self.timers.set(
                TimerKind::SubmissionRetry { task: task.clone() },
                delay,
                self.clock.now(),
            );
        } else {
            self.pool.set_state(task, TaskState::SubmitFailed)?;
            self.pool.apply_output(task, OUT_SUBMIT_FAILED)?;
            self.timers.cancel_task(task);
            self.run_event_handlers(task, "submit-failed");
        }
        Ok(())
    }

    // --- submission -----------------------------------------------------

    fn submit_ready(&mut self) -> Result<(), SchedulerError> {
        for id in self.pool.ready_tasks()? {
            let overrides = self.broadcasts.overrides_for(&id.name, &id.point);

            // Platform resolution happens at submit time; group members
            // are chosen here, unknown names fail the task not the parse
            let platform_setting = overrides
                .get("platform")
                .cloned()
                .or_else(|| {
                    self.pool
                        .get(&id)
                        .and_then(|p| p.def.runtime.platform.clone())
                });
            let platform = match self.resolve_platform(platform_setting.as_deref()) {
                Ok(platform) => platform,
                Err(e) => {
                    tracing::error!(task = %id, error = %e, "platform lookup failed");
                    self.pool.set_state(&id, TaskState::SubmitFailed)?;
                    self.pool.apply_output(&id, OUT_SUBMIT_FAILED)?;
                    continue;
                }
            };
            if !self.jobs.can_submit(&platform.name) {
                continue;
            }

            let Some(proxy) = self.pool.get_mut(&id) else {
                continue;
            };
            let submit_num = proxy.next_submit();
            if proxy.try_num == 0 {
                proxy.try_num = 1;
            }
            proxy.platform_name = Some(platform.name.clone());
            let is_manual = proxy.is_manual;
            let try_num = proxy.try_num;
            let flows = proxy.flows.to_db_string();

            let mut env: BTreeMap<String, String> = proxy
                .def
                .runtime
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            for (key, value) in &overrides {
                if let Some(var) = key.strip_prefix("env.") {
                    env.insert(var.to_string(), value.clone());
                }
            }
            let script_override = overrides.get("script").cloned();

            self.pool.push_task_rows(&id);
            self.pool.push_op(DbOp::InsertJob {
                cycle: id.point.to_string(),
                name: id.name.clone(),
                submit_num,
                flows,
                is_manual_submit: is_manual,
                try_num,
                platform_name: platform.name.clone(),
                time_submit: self.now_iso(),
            });

            let proxy = self
                .pool
                .get(&id)
                .ok_or_else(|| SchedulerError::Internal("task vanished".to_string()))?;
            self.jobs.submit(proxy, platform, env, script_override)?;
        }
        Ok(())
    }

    fn resolve_platform(
        &self,
        name: Option<&str>,
    ) -> Result<PlatformDef, rota_config::PlatformLookupError> {
        self.config().platforms.resolve(name)
    }

    // --- kills & polls --------------------------------------------------

    fn kill_active_jobs(&mut self) {
        let targets: Vec<TaskId> = self
            .pool
            .tasks()
            .filter(|p| p.state.is_active() && p.job.is_some())
            .map(|p| p.id.clone())
            .collect();
        for id in targets {
            let _ = self.kill_task(&id);
        }
    }

    fn kill_task(&mut self, id: &TaskId) -> Result<(), SchedulerError> {
        let Some(proxy) = self.pool.get_mut(id) else {
            return Ok(());
        };
        let Some(job) = proxy.job.clone() else {
            return Ok(());
        };
        // A killed job fails without retry
        proxy.killed = true;
        let submit_num = proxy.submit_num;
        let platform_name = proxy.platform_name.clone();
        if let Ok(platform) = self.resolve_platform(platform_name.as_deref()) {
            tracing::warn!(task = %id, job_id = %job.job_id, "killing job");
            self.jobs.kill(id.clone(), submit_num, job, &platform);
        }
        Ok(())
    }

    fn poll_task(&mut self, id: &TaskId) {
        let Some(proxy) = self.pool.get(id) else {
            return;
        };
        let submit_num = proxy.submit_num;
        self.poll_now(id, submit_num);
    }

    fn poll_now(&mut self, id: &TaskId, submit_num: u32) {
        let Some(proxy) = self.pool.get(id) else {
            return;
        };
        let Some(job) = proxy.job.clone() else {
            return;
        };
        let platform_name = proxy.platform_name.clone();
        if let Ok(platform) = self.resolve_platform(platform_name.as_deref()) {
            self.jobs.poll(id.clone(), submit_num, job, &platform);
        }
    }

    fn schedule_poll(&mut self, task: &TaskId, submit_num: u32, delay: StdDuration) {
        self.timers.set(
            TimerKind::Poll {
                task: task.clone(),
                submit_num,
            },
            delay,
            self.clock.now(),
        );
    }

    fn poll_interval(&self, task: &TaskId) -> StdDuration {
        self.pool
            .get(task)
            .and_then(|p| p.def.runtime.execution_polling_intervals.first().copied())
            .and_then(|d| d.to_std().ok())
            .unwrap_or(DEFAULT_POLL_INTERVAL)
    }

    fn arm_execution_watchdogs(&mut self, task: &TaskId, submit_num: u32) {
        let Some(proxy) = self.pool.get(task) else {
            return;
        };
        if let Some(limit) = proxy.def.runtime.execution_time_limit {
            if let Ok(width) = limit.to_std() {
                self.timers.set(
                    TimerKind::ExecutionTimeout {
                        task: task.clone(),
                        submit_num,
                    },
                    width + TIME_LIMIT_TOLERANCE,
                    self.clock.now(),
                );
            }
        }
        let comms_poll = proxy
            .platform_name
            .as_deref()
            .and_then(|name| self.resolve_platform(Some(name)).ok())
            .map(|p| p.comms == rota_config::CommsMethod::Poll)
            .unwrap_or(false);
        if comms_poll {
            self.schedule_poll(task, submit_num, self.poll_interval(task));
        }
    }

    // --- event handlers -------------------------------------------------

    /// Run the task's handler for an event, if one is configured.
    ///
    /// Handlers are fire-and-forget shell commands; a failing handler is
    /// logged and never affects the task itself.
    fn run_event_handlers(&self, task: &TaskId, event: &str) {
        let Some(proxy) = self.pool.get(task) else {
            return;
        };
        let Some(command) = proxy.def.runtime.events.get(event) else {
            return;
        };
        let command = command.clone();
        let event = event.to_string();
        let task = task.clone();
        let workflow_id = self.workflow_id.clone();
        tokio::spawn(async move {
            let result = tokio::process::Command::new("bash")
                .arg("-c")
                .arg(&command)
                .env("ROTA_WORKFLOW_ID", &workflow_id)
                .env("ROTA_TASK_ID", task.to_string())
                .env("ROTA_TASK_EVENT", &event)
                .output()
                .await;
            match result {
                Ok(output) if output.status.success() => {}
                Ok(output) => tracing::warn!(
                    task = %task,
                    event = %event,
                    exit = output.status.code().unwrap_or(-1),
                    "event handler failed"
                ),
                Err(e) => tracing::warn!(task = %task, event = %event, error = %e, "event handler did not run"),
            }
        });
    }

    // --- outputs helper -------------------------------------------------

    /// Artificially complete an output (`set` command).
    fn complete_output(&mut self, id: &TaskId, output: &str) -> Result<(), SchedulerError> {
        // Spawn the instance if it is not in the pool yet
        if self.pool.get(id).is_none() {
            let flows = self.pool.active_flows();
            self.pool.spawn(&id.name, &id.point, flows)?;
        }
        match output {
            OUT_SUCCEEDED => self.pool.set_state(id, TaskState::Succeeded)?,
            OUT_FAILED => self.pool.set_state(id, TaskState::Failed)?,
            _ => {}
        }
        self.pool.apply_output(id, output)?;
        Ok(())
    }

    // --- stall & watchdogs ----------------------------------------------

    fn check_stall(&mut self) {
        let stalled_now = !self.paused && self.stop.is_none() && self.pool.is_stalled();
        if stalled_now && !self.stalled {
            tracing::warn!("workflow stalled");
            for (id, missing) in self.pool.incomplete_tasks() {
                tracing::warn!(
                    "{} did not complete required outputs: {}",
                    id,
                    missing.join(", ")
                );
            }
            if let Some(timeout) = self.config().stall_timeout {
                if let Ok(width) = timeout.to_std() {
                    self.timers.set(TimerKind::Stall, width, self.clock.now());
                }
            }
        } else if !stalled_now && self.stalled {
            // Any state change resets the stall clock
            self.timers.cancel(&TimerKind::Stall);
        }
        self.stalled = stalled_now;
    }

    fn check_watchdogs(&mut self) {
        if self.activity {
            if let Some(timeout) = self.config().inactivity_timeout {
                if let Ok(width) = timeout.to_std() {
                    self.timers
                        .set(TimerKind::Inactivity, width, self.clock.now());
                }
            }
        }
    }

    fn check_shutdown(&mut self) {
        if self.shutdown.is_some() {
            return;
        }
        if let Some(mode) = self.stop {
            let done = match mode {
                StopMode::Now | StopMode::NowNow => true,
                StopMode::Normal | StopMode::Kill => {
                    !self.pool.tasks().any(|p| p.state.is_active())
                }
            };
            if done {
                self.shutdown = Some(ShutdownReason::Stop(mode));
            }
            return;
        }
        if self.pool.is_empty() {
            self.shutdown = Some(ShutdownReason::Finished);
        }
    }

    // --- persistence ----------------------------------------------------

    fn flush_db(&mut self) -> Result<(), SchedulerError> {
        let ops = self.pool.drain_ops();
        self.db.apply(&ops)?;
        Ok(())
    }

    fn job_update(&mut self, task: &TaskId, submit_num: u32, f: impl FnOnce(&mut DbOp)) {
        let mut op = DbOp::UpdateJob {
            cycle: task.point.to_string(),
            name: task.name.clone(),
            submit_num,
            job_id: None,
            time_run: None,
            time_run_exit: None,
            run_signal: None,
            run_status: None,
        };
        f(&mut op);
        self.pool.push_op(op);
    }

    fn job_exit(&mut self, task: &TaskId, submit_num: u32, status: i64, signal: Option<&str>) {
        self.pool.push_op(DbOp::UpdateJob {
            cycle: task.point.to_string(),
            name: task.name.clone(),
            submit_num,
            job_id: None,
            time_run: None,
            time_run_exit: Some(self.now_iso()),
            run_signal: signal.map(str::to_string),
            run_status: Some(status),
        });
    }

    // --- helpers --------------------------------------------------------

    fn stamp(&mut self) {
        let now = self.now_iso();
        self.pool.set_now(now);
    }

    fn now_iso(&self) -> String {
        chrono::DateTime::from_timestamp_millis(self.clock.epoch_ms() as i64)
            .map(|t| t.to_rfc3339())
            .unwrap_or_default()
    }

    fn parse_selector(&self, selector: &str) -> Result<(CyclePoint, String), SchedulerError> {
        let (point, name) = selector.split_once('/').ok_or_else(|| {
            SchedulerError::BadRequest(format!("bad task selector (want point/name): {selector}"))
        })?;
        let point = CyclePoint::parse(point, self.config().calendar)
            .map_err(|e| SchedulerError::BadRequest(e.to_string()))?;
        Ok((point, name.to_string()))
    }

    fn resolve_selectors(&self, selectors: &[String]) -> Result<Vec<TaskId>, SchedulerError> {
        let mut out = Vec::new();
        for selector in selectors {
            let (point, name) = self.parse_selector(selector)?;
            let matched = self.pool.matching(&point, &name);
            if matched.is_empty() {
                return Err(SchedulerError::BadRequest(format!(
                    "no matching task in the pool: {selector}"
                )));
            }
            out.extend(matched);
        }
        Ok(out)
    }

    fn status_report(&self) -> StatusReport {
        let mut state_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut tasks: Vec<TaskReport> = Vec::new();
        for proxy in self.pool.tasks() {
            *state_counts.entry(proxy.state.to_string()).or_default() += 1;
            tasks.push(TaskReport {
                id: proxy.id.to_string(),
                state: proxy.state.to_string(),
                flows: proxy.flows.to_db_string(),
                is_held: proxy.is_held,
                submit_num: proxy.submit_num,
            });
        }
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        StatusReport {
            workflow_id: self.workflow_id.clone(),
            paused: self.paused,
            stalled: self.stalled,
            pool_size: self.pool.len(),
            state_counts,
            tasks,
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
