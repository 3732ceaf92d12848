// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use rota_core::point::CyclePoint;

fn task(name: &str, point: i64) -> TaskId {
    TaskId::new(name, CyclePoint::Integer(point))
}

#[test]
fn set_and_fire() {
    let mut timers = Timers::new();
    let now = Instant::now();
    timers.set(
        TimerKind::ExecutionRetry { task: task("foo", 1) },
        Duration::from_secs(5),
        now,
    );

    assert!(timers.fired(now).is_empty());
    let fired = timers.fired(now + Duration::from_secs(5));
    assert_eq!(fired.len(), 1);
    assert!(matches!(&fired[0], TimerKind::ExecutionRetry { task: t } if t == &task("foo", 1)));
    assert!(timers.is_empty(), "fired timers are consumed");
}

#[test]
fn setting_again_resets_the_deadline() {
    let mut timers = Timers::new();
    let now = Instant::now();
    let kind = TimerKind::Stall;
    timers.set(kind.clone(), Duration::from_secs(1), now);
    timers.set(kind.clone(), Duration::from_secs(10), now);

    assert!(timers.fired(now + Duration::from_secs(5)).is_empty());
    assert_eq!(timers.fired(now + Duration::from_secs(10)).len(), 1);
}

#[test]
fn cancel_removes_one_timer() {
    let mut timers = Timers::new();
    let now = Instant::now();
    timers.set(TimerKind::Stall, Duration::from_secs(1), now);
    timers.set(TimerKind::Inactivity, Duration::from_secs(1), now);
    timers.cancel(&TimerKind::Stall);

    let fired = timers.fired(now + Duration::from_secs(2));
    assert_eq!(fired, vec![TimerKind::Inactivity]);
}

#[test]
fn cancel_task_clears_only_that_instance() {
    let mut timers = Timers::new();
    let now = Instant::now();
    let delay = Duration::from_secs(1);
    timers.set(TimerKind::ExecutionRetry { task: task("foo", 1) }, delay, now);
    timers.set(
        TimerKind::Poll {
            task: task("foo", 1),
            submit_num: 1,
        },
        delay,
        now,
    );
    // A lexically similar task must survive
    timers.set(TimerKind::ExecutionRetry { task: task("foo2", 1) }, delay, now);

    timers.cancel_task(&task("foo", 1));
    let fired = timers.fired(now + delay);
    assert_eq!(fired.len(), 1);
    assert!(matches!(&fired[0], TimerKind::ExecutionRetry { task: t } if t == &task("foo2", 1)));
}

#[test]
fn next_deadline_is_the_minimum() {
    let mut timers = Timers::new();
    let now = Instant::now();
    timers.set(TimerKind::Stall, Duration::from_secs(30), now);
    timers.set(TimerKind::Inactivity, Duration::from_secs(10), now);
    assert_eq!(timers.next_deadline(), Some(now + Duration::from_secs(10)));
}

#[test]
fn poll_timers_are_per_submit() {
    let t = task("foo", 1);
    let a = TimerKind::Poll {
        task: t.clone(),
        submit_num: 1,
    };
    let b = TimerKind::Poll {
        task: t,
        submit_num: 2,
    };
    assert_ne!(a.key(), b.key());
}
