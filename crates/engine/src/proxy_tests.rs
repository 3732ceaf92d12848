// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use rota_config::{TaskDef, TaskRuntime};
use rota_core::outputs::{OutputSet, OUT_FAILED, OUT_SUCCEEDED};
use rota_core::point::CyclePoint;
use rota_core::prereq::Prereq;
use rota_core::task::TaskState;

fn def(name: &str) -> Arc<TaskDef> {
    Arc::new(TaskDef {
        name: name.to_string(),
        sections: vec![0],
        outputs: OutputSet::standard(),
        runtime: TaskRuntime::default(),
    })
}

fn atom(point: i64, task: &str) -> PrereqAtom {
    PrereqAtom::new(CyclePoint::Integer(point), task, OUT_SUCCEEDED)
}

fn proxy_with_prereq() -> TaskProxy {
    TaskProxy::new(
        def("bar"),
        CyclePoint::Integer(1),
        FlowSet::single(1),
        vec![Prereq::new(vec![vec![atom(1, "foo")]])],
    )
}

#[test]
fn new_proxy_is_waiting() {
    let proxy = proxy_with_prereq();
    assert_eq!(proxy.state, TaskState::Waiting);
    assert_eq!(proxy.submit_num, 0);
    assert!(!proxy.is_ready(), "prereq unsatisfied");
}

#[test]
fn satisfying_prereqs_makes_ready() {
    let mut proxy = proxy_with_prereq();
    assert!(proxy.satisfy_atom(&atom(1, "foo")));
    assert!(proxy.is_ready());
    // Idempotent: feeding the same atom again changes nothing
    assert!(!proxy.satisfy_atom(&atom(1, "foo")));
}

#[test]
fn held_is_never_ready() {
    let mut proxy = proxy_with_prereq();
    proxy.satisfy_atom(&atom(1, "foo"));
    proxy.is_held = true;
    assert!(!proxy.is_ready());
    proxy.is_held = false;
    assert!(proxy.is_ready(), "release restores readiness iff satisfied");
}

#[test]
fn retry_pending_blocks_readiness() {
    let mut proxy = proxy_with_prereq();
    proxy.satisfy_all();
    proxy.retry_pending = true;
    assert!(!proxy.is_ready());
}

#[test]
fn next_submit_is_strictly_monotonic() {
    let mut proxy = proxy_with_prereq();
    assert_eq!(proxy.next_submit(), 1);
    assert_eq!(proxy.next_submit(), 2);
    assert_eq!(proxy.next_submit(), 3);
    assert_eq!(proxy.state, TaskState::Preparing);
}

#[test]
fn next_try_resets_submission_attempts() {
    let mut proxy = proxy_with_prereq();
    proxy.next_submit();
    proxy.next_submit();
    assert_eq!(proxy.sub_try_num, 2);
    proxy.next_try();
    assert_eq!(proxy.try_num, 1);
    assert_eq!(proxy.sub_try_num, 0);
}

#[test]
fn completion_tracks_required_outputs() {
    let mut proxy = proxy_with_prereq();
    proxy.state = TaskState::Failed;
    proxy.outputs.emit(OUT_FAILED);
    assert!(proxy.is_finished());
    assert!(proxy.is_incomplete(), "succeeded still required");

    proxy.outputs.retract(OUT_FAILED);
    proxy.outputs.emit(OUT_SUCCEEDED);
    assert!(proxy.is_complete());
}

#[test]
fn unfinished_semantics_differ_by_mode() {
    let mut proxy = proxy_with_prereq();
    proxy.state = TaskState::Failed;
    proxy.outputs.emit(OUT_FAILED);

    // Incomplete: blocks runahead in current mode, released in back-compat
    assert!(proxy.is_unfinished(false));
    assert!(!proxy.is_unfinished(true));

    proxy.outputs.retract(OUT_FAILED);
    proxy.outputs.emit(OUT_SUCCEEDED);
    assert!(!proxy.is_unfinished(false), "complete finished tasks are done");
}

#[test]
fn suicide_prereq_is_separate_from_readiness() {
    let mut proxy = TaskProxy::new(
        def("bar"),
        CyclePoint::Integer(1),
        FlowSet::single(1),
        vec![
            Prereq::new(vec![vec![atom(1, "foo")]]),
            Prereq::suicide(vec![vec![PrereqAtom::new(
                CyclePoint::Integer(1),
                "foo",
                OUT_FAILED,
            )]]),
        ],
    );
    proxy.satisfy_atom(&atom(1, "foo"));
    assert!(proxy.is_ready(), "suicide clause does not gate readiness");
    assert!(!proxy.suicide_satisfied());

    proxy.satisfy_atom(&PrereqAtom::new(CyclePoint::Integer(1), "foo", OUT_FAILED));
    assert!(proxy.suicide_satisfied());
}
