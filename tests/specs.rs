// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level scenario tests.
//!
//! Each test drives a real scheduler (pool, job manager, state database)
//! against fake platform drivers, standing in for the end-to-end flows a
//! live deployment exercises.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rota_config::{CompatMode, PlatformDef, WorkflowConfig};
use rota_core::clock::FakeClock;
use rota_core::command::{Command, StopMode};
use rota_core::message::JobMessage;
use rota_core::point::CyclePoint;
use rota_core::task::TaskId;
use rota_daemon::scheduler::{Intake, Scheduler, ShutdownReason};
use rota_engine::SchedulerEvent;
use rota_platform::{
    DriverFactory, FakeDriverFactory, FakeExecutor, FakePlatform, PlatformDriver, ShellDriver,
};
use rota_storage::StateDb;
use tempfile::TempDir;

fn build(
    flow: &str,
    db: StateDb,
    run_dir: PathBuf,
    factory: Arc<dyn DriverFactory>,
    clock: FakeClock,
) -> Scheduler<FakeClock> {
    let config = Arc::new(WorkflowConfig::parse_str(flow, CompatMode::Current).expect("config"));
    Scheduler::new(config, "spec/run1", run_dir, db, factory, clock)
}

async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

fn int_id(name: &str, point: i64) -> TaskId {
    TaskId::new(name, CyclePoint::Integer(point))
}

async fn send(scheduler: &Scheduler<FakeClock>, task: TaskId, submit_num: u32, text: &str) {
    scheduler
        .event_sender()
        .send(SchedulerEvent::Message {
            task,
            submit_num,
            message: JobMessage::parse(text),
        })
        .await
        .expect("send message");
}

async fn status(scheduler: &Scheduler<FakeClock>) -> tokio::sync::oneshot::Receiver<rota_daemon::StatusReport> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    scheduler
        .intake_sender()
        .send(Intake::Query { reply: tx })
        .await
        .expect("send query");
    rx
}

// --- scenario 1: basic succeed -----------------------------------------

#[tokio::test]
async fn basic_succeed() {
    let dir = TempDir::new().unwrap();
    let db = StateDb::open(&dir.path().join(".service/db")).unwrap();
    let fake = FakePlatform::new("localhost");
    let mut scheduler = build(
        r#"
[scheduling]
initial_cycle_point = "1"
cycling_mode = "integer"

[scheduling.graph]
R1 = "foo => bar"

[runtime.foo]
script = "true"

[runtime.bar]
script = "true"
"#,
        db,
        dir.path().to_path_buf(),
        Arc::new(FakeDriverFactory::new(fake.clone())),
        FakeClock::new(),
    );

    scheduler.cold_start().unwrap();
    scheduler.tick().await.unwrap();
    settle().await;
    scheduler.tick().await.unwrap();

    send(&scheduler, int_id("foo", 1), 1, "started").await;
    send(&scheduler, int_id("foo", 1), 1, "succeeded").await;
    scheduler.tick().await.unwrap();
    settle().await;
    scheduler.tick().await.unwrap();

    send(&scheduler, int_id("bar", 1), 1, "started").await;
    send(&scheduler, int_id("bar", 1), 1, "succeeded").await;
    let reason = scheduler.tick().await.unwrap();

    // Pool empties; scheduler shuts down cleanly
    assert_eq!(reason, Some(ShutdownReason::Finished));
    scheduler.finalize().unwrap();

    let db = scheduler.db();
    assert_eq!(db.task_state("1", "foo").unwrap().unwrap(), "succeeded");
    assert_eq!(db.task_state("1", "bar").unwrap().unwrap(), "succeeded");
    assert!(db.load_pool().unwrap().is_empty());
}

// --- scenario 2: retry then succeed ------------------------------------

#[tokio::test]
async fn retry_then_succeed() {
    let dir = TempDir::new().unwrap();
    let db = StateDb::open(&dir.path().join(".service/db")).unwrap();
    let fake = FakePlatform::new("localhost");
    let clock = FakeClock::new();
    let mut scheduler = build(
        r#"
[scheduling]
initial_cycle_point = "1"
cycling_mode = "integer"

[scheduling.graph]
R1 = "t"

[runtime.t]
script = "test -f sentinel"
execution_retry_delays = ["PT1S"]
"#,
        db,
        dir.path().to_path_buf(),
        Arc::new(FakeDriverFactory::new(fake.clone())),
        clock.clone(),
    );

    scheduler.cold_start().unwrap();
    scheduler.tick().await.unwrap();
    settle().await;
    scheduler.tick().await.unwrap();

    // First try fails
    send(&scheduler, int_id("t", 1), 1, "started").await;
    send(&scheduler, int_id("t", 1), 1, "failed").await;
    scheduler.tick().await.unwrap();

    // Second try succeeds after the delay
    clock.advance(Duration::from_secs(2));
    scheduler.tick().await.unwrap();
    settle().await;
    scheduler.tick().await.unwrap();
    send(&scheduler, int_id("t", 1), 2, "started").await;
    send(&scheduler, int_id("t", 1), 2, "succeeded").await;
    let reason = scheduler.tick().await.unwrap();
    assert_eq!(reason, Some(ShutdownReason::Finished));

    let jobs = scheduler.db().jobs_for("1", "t").unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(
        (jobs[0].submit_num, jobs[0].try_num, jobs[0].run_status),
        (1, 1, Some(1))
    );
    assert_eq!(
        (jobs[1].submit_num, jobs[1].try_num, jobs[1].run_status),
        (2, 2, Some(0))
    );
    assert_eq!(
        scheduler.db().task_state("1", "t").unwrap().unwrap(),
        "succeeded"
    );
}

// --- scenario 3: runahead enforcement ----------------------------------

#[tokio::test]
async fn runahead_enforcement() {
    let dir = TempDir::new().unwrap();
    let db = StateDb::open(&dir.path().join(".service/db")).unwrap();
    let fake = FakePlatform::new("localhost");
    let mut scheduler = build(
        r#"
[scheduler]
utc_mode = true

[scheduling]
initial_cycle_point = "2020"
final_cycle_point = "2030"
runahead_limit = "P2"

[scheduling.graph]
P1Y = "foo"

[runtime.foo]
script = "true"
"#,
        db,
        dir.path().to_path_buf(),
        Arc::new(FakeDriverFactory::new(fake.clone())),
        FakeClock::new(),
    );

    scheduler.cold_start().unwrap();
    scheduler.tick().await.unwrap();
    settle().await;
    scheduler.tick().await.unwrap();

    // foo.2020 is running; nothing beyond 2022 may exist in the pool
    send(
        &scheduler,
        TaskId::new("foo", CyclePoint::parse("2020", scheduler.config().calendar).unwrap()),
        1,
        "started",
    )
    .await;
    scheduler.tick().await.unwrap();

    let report = status(&scheduler).await;
    scheduler.tick().await.unwrap();
    let report = report.await.unwrap();
    let max_point = report
        .tasks
        .iter()
        .map(|t| t.id.split('/').next().unwrap_or_default().to_string())
        .max()
        .unwrap();
    assert!(
        max_point.as_str() <= "20221231T2359Z",
        "pool reached {max_point}, beyond initial + P2 cycles"
    );
    assert!(report
        .tasks
        .iter()
        .any(|t| t.id.starts_with("20220101T0000Z/")));
}

// --- scenario 4: platform failover -------------------------------------

struct AltFactory {
    exec: FakeExecutor,
}

impl DriverFactory for AltFactory {
    fn driver_for(&self, platform: &PlatformDef) -> Arc<dyn PlatformDriver> {
        Arc::new(ShellDriver::new(
            platform.clone(),
            self.exec.clone(),
            Duration::from_secs(300),
        ))
    }
}

#[tokio::test]
async fn platform_failover() {
    let dir = TempDir::new().unwrap();
    let db = StateDb::open(&dir.path().join(".service/db")).unwrap();
    let exec = FakeExecutor::new();
    exec.unreachable("bad1");
    exec.ok(None, "31337\n");
    let mut scheduler = build(
        r#"
[scheduling]
initial_cycle_point = "1"
cycling_mode = "integer"

[scheduling.graph]
R1 = "foo"

[runtime.foo]
script = "true"
platform = "alt"

[platforms.alt]
hosts = ["bad1", "localhost"]
job_runner = "background"
"#,
        db,
        dir.path().to_path_buf(),
        Arc::new(AltFactory { exec: exec.clone() }),
        FakeClock::new(),
    );

    scheduler.cold_start().unwrap();
    scheduler.tick().await.unwrap();
    settle().await;
    scheduler.tick().await.unwrap();

    // Submission failed over from bad1 and landed locally
    let runs = exec.runs();
    assert_eq!(runs[0].0.as_deref(), Some("bad1"), "first attempt hit bad1");
    assert_eq!(runs[1].0, None, "second attempt ran on localhost");

    let jobs = scheduler.db().jobs_for("1", "foo").unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].platform_name, "alt");
    assert_eq!(jobs[0].job_id.as_deref(), Some("31337"));

    send(&scheduler, int_id("foo", 1), 1, "started").await;
    send(&scheduler, int_id("foo", 1), 1, "succeeded").await;
    let reason = scheduler.tick().await.unwrap();
    assert_eq!(reason, Some(ShutdownReason::Finished));
}

// --- scenario 5: stall with required output ----------------------------

#[tokio::test]
async fn stall_with_required_output() {
    let dir = TempDir::new().unwrap();
    let db = StateDb::open(&dir.path().join(".service/db")).unwrap();
    let fake = FakePlatform::new("localhost");
    let clock = FakeClock::new();
    let mut scheduler = build(
        r#"
[scheduler]
stall_timeout = "PT30S"
abort_on_stall_timeout = true

[scheduling]
initial_cycle_point = "1"
cycling_mode = "integer"

[scheduling.graph]
R1 = """
foo
foo:fail? => handler
"""

[runtime.foo]
script = "false"

[runtime.handler]
script = "true"
"#,
        db,
        dir.path().to_path_buf(),
        Arc::new(FakeDriverFactory::new(fake.clone())),
        clock.clone(),
    );

    scheduler.cold_start().unwrap();
    scheduler.tick().await.unwrap();
    settle().await;
    scheduler.tick().await.unwrap();

    // foo fails (success was required), handler runs and succeeds
    send(&scheduler, int_id("foo", 1), 1, "started").await;
    send(&scheduler, int_id("foo", 1), 1, "failed").await;
    scheduler.tick().await.unwrap();
    settle().await;
    scheduler.tick().await.unwrap();
    send(&scheduler, int_id("handler", 1), 1, "started").await;
    send(&scheduler, int_id("handler", 1), 1, "succeeded").await;
    scheduler.tick().await.unwrap();

    // The workflow is stalled on incomplete foo; the timeout aborts
    assert!(scheduler.tick().await.unwrap().is_none());
    clock.advance(Duration::from_secs(60));
    let reason = scheduler.tick().await.unwrap();
    assert_eq!(reason, Some(ShutdownReason::StallTimeout));

    assert_eq!(
        scheduler.db().task_state("1", "foo").unwrap().unwrap(),
        "failed"
    );
    assert_eq!(
        scheduler.db().task_state("1", "handler").unwrap().unwrap(),
        "succeeded"
    );
}

// --- scenario 6: restart recovers --------------------------------------

#[tokio::test]
async fn restart_recovers() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join(".service/db");
    let flow = r#"
[scheduling]
initial_cycle_point = "1"
cycling_mode = "integer"

[scheduling.graph]
R1 = "foo => bar"

[runtime.foo]
script = "sleep 60"

[runtime.bar]
script = "true"
"#;

    // First run: submit foo, see it start, then stop --now
    {
        let fake = FakePlatform::new("localhost");
        let mut scheduler = build(
            flow,
            StateDb::open(&db_path).unwrap(),
            dir.path().to_path_buf(),
            Arc::new(FakeDriverFactory::new(fake.clone())),
            FakeClock::new(),
        );
        scheduler.cold_start().unwrap();
        scheduler.tick().await.unwrap();
        settle().await;
        scheduler.tick().await.unwrap();
        send(&scheduler, int_id("foo", 1), 1, "started").await;
        scheduler.tick().await.unwrap();

        let (tx, _rx) = tokio::sync::oneshot::channel();
        scheduler
            .intake_sender()
            .send(Intake::Control {
                command: Command::Stop {
                    mode: StopMode::Now,
                },
                reply: tx,
            })
            .await
            .unwrap();
        let reason = scheduler.tick().await.unwrap();
        assert_eq!(reason, Some(ShutdownReason::Stop(StopMode::Now)));
        scheduler.finalize().unwrap();
    }

    // While the scheduler was down, the job finished and wrote job.status
    let status_path = rota_engine::paths::job_status_path(dir.path(), &int_id("foo", 1), 1);
    std::fs::create_dir_all(status_path.parent().unwrap()).unwrap();
    std::fs::write(&status_path, "t0|started\nt1|succeeded\n").unwrap();

    // Second run: restart from the database
    let fake = FakePlatform::new("localhost");
    let mut scheduler = build(
        flow,
        StateDb::open(&db_path).unwrap(),
        dir.path().to_path_buf(),
        Arc::new(FakeDriverFactory::new(fake.clone())),
        FakeClock::new(),
    );
    scheduler.restart().unwrap();

    // The reconciled success is consumed; bar spawns and runs
    scheduler.tick().await.unwrap();
    settle().await;
    scheduler.tick().await.unwrap();
    settle().await;
    scheduler.tick().await.unwrap();
    assert_eq!(
        scheduler.db().task_state("1", "foo").unwrap().unwrap(),
        "succeeded"
    );
    assert_eq!(fake.submitted().len(), 1, "bar submitted after recovery");

    send(&scheduler, int_id("bar", 1), 1, "started").await;
    send(&scheduler, int_id("bar", 1), 1, "succeeded").await;
    let mut reason = scheduler.tick().await.unwrap();
    if reason.is_none() {
        reason = scheduler.tick().await.unwrap();
    }
    assert_eq!(reason, Some(ShutdownReason::Finished));
}

// --- boundaries ---------------------------------------------------------

#[tokio::test]
async fn final_cycle_point_has_no_successor() {
    let dir = TempDir::new().unwrap();
    let db = StateDb::open(&dir.path().join(".service/db")).unwrap();
    let fake = FakePlatform::new("localhost");
    let mut scheduler = build(
        r#"
[scheduling]
initial_cycle_point = "1"
final_cycle_point = "2"
cycling_mode = "integer"

[scheduling.graph]
P1 = "foo[-P1] => foo"

[runtime.foo]
script = "true"
"#,
        db,
        dir.path().to_path_buf(),
        Arc::new(FakeDriverFactory::new(fake.clone())),
        FakeClock::new(),
    );

    scheduler.cold_start().unwrap();
    for point in 1..=2 {
        scheduler.tick().await.unwrap();
        settle().await;
        scheduler.tick().await.unwrap();
        send(&scheduler, int_id("foo", point), 1, "started").await;
        send(&scheduler, int_id("foo", point), 1, "succeeded").await;
    }
    // Downstream of the final point resolves to never: no stall, done
    let mut reason = scheduler.tick().await.unwrap();
    for _ in 0..3 {
        if reason.is_some() {
            break;
        }
        settle().await;
        reason = scheduler.tick().await.unwrap();
    }
    assert_eq!(reason, Some(ShutdownReason::Finished));
}
