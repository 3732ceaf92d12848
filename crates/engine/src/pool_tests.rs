// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use rota_config::{CompatMode, WorkflowConfig};
use rota_core::outputs::{OUT_FAILED, OUT_STARTED, OUT_SUCCEEDED};

fn config(content: &str) -> Arc<WorkflowConfig> {
    Arc::new(WorkflowConfig::parse_str(content, CompatMode::Current).unwrap())
}

fn int(n: i64) -> CyclePoint {
    CyclePoint::Integer(n)
}

fn id(name: &str, point: i64) -> TaskId {
    TaskId::new(name, int(point))
}

fn pool(content: &str) -> TaskPool {
    let mut pool = TaskPool::new(config(content));
    pool.set_now("t0");
    pool
}

const CHAIN: &str = r#"
[scheduling]
initial_cycle_point = "1"
cycling_mode = "integer"

[scheduling.graph]
R1 = "foo => bar"

[runtime.foo]
script = "true"

[runtime.bar]
script = "true"
"#;

const CYCLING: &str = r#"
[scheduling]
initial_cycle_point = "1"
final_cycle_point = "10"
cycling_mode = "integer"
runahead_limit = "P2"

[scheduling.graph]
P1 = "foo[-P1] => foo"

[runtime.foo]
script = "true"
"#;

#[test]
fn spawn_initial_materializes_start_tasks_only() {
    let mut p = pool(CHAIN);
    p.spawn_parentless().unwrap();
    assert!(p.get(&id("foo", 1)).is_some());
    assert!(p.get(&id("bar", 1)).is_none(), "bar waits for foo's output");
}

#[test]
fn runahead_bounds_parentless_spawning() {
    let mut p = pool(CYCLING);
    p.spawn_parentless().unwrap();
    // foo at 1 is parentless (pre-history reference dropped); later
    // instances depend on the previous cycle so spawn on demand
    assert!(p.get(&id("foo", 1)).is_some());
    assert!(p.get(&id("foo", 2)).is_none());
}

#[test]
fn output_completion_spawns_and_satisfies_downstream() {
    let mut p = pool(CHAIN);
    p.spawn_parentless().unwrap();
    p.apply_output(&id("foo", 1), OUT_SUCCEEDED).unwrap();

    let bar = p.get(&id("bar", 1)).unwrap();
    assert!(bar.prereqs_satisfied());
    assert!(p.ready_tasks().unwrap().contains(&id("bar", 1)));
}

#[test]
fn cross_cycle_spawning_walks_the_chain() {
    let mut p = pool(CYCLING);
    p.spawn_parentless().unwrap();
    p.apply_output(&id("foo", 1), OUT_SUCCEEDED).unwrap();

    let foo2 = p.get(&id("foo", 2)).unwrap();
    assert!(foo2.prereqs_satisfied());
    assert!(p.get(&id("foo", 3)).is_none(), "spawn is on demand, not eager");
}

#[test]
fn ready_excludes_unsatisfied_and_held() {
    let mut p = pool(CHAIN);
    p.spawn_parentless().unwrap();
    assert_eq!(p.ready_tasks().unwrap(), vec![id("foo", 1)]);

    p.hold(&id("foo", 1)).unwrap();
    assert!(p.ready_tasks().unwrap().is_empty(), "held is never ready");

    p.release(&id("foo", 1)).unwrap();
    assert_eq!(p.ready_tasks().unwrap(), vec![id("foo", 1)]);
}

#[test]
fn ready_respects_runahead_window() {
    let mut p = pool(CYCLING);
    p.spawn_parentless().unwrap();
    // Drive foo through several cycles without finishing foo.1
    p.apply_output(&id("foo", 1), OUT_SUCCEEDED).unwrap();
    // foo.1 is still in the pool unfinished (no state change yet), so the
    // window is 1 + P2 = 3
    p.apply_output(&id("foo", 2), OUT_SUCCEEDED).unwrap();
    p.apply_output(&id("foo", 3), OUT_SUCCEEDED).unwrap();

    let ready = p.ready_tasks().unwrap();
    assert!(ready.contains(&id("foo", 2)));
    assert!(!ready.contains(&id("foo", 4)), "beyond min(unfinished)+P2");
}

#[test]
fn queue_limit_bounds_ready_set() {
    let mut p = pool(
        r#"
[scheduling]
initial_cycle_point = "1"
cycling_mode = "integer"

[scheduling.queues.serial]
limit = 1
members = ["a", "b"]

[scheduling.graph]
R1 = "a\nb"

[runtime.a]
script = "true"

[runtime.b]
script = "true"
"#,
    );
    p.spawn_parentless().unwrap();
    let ready = p.ready_tasks().unwrap();
    assert_eq!(ready.len(), 1, "one slot in the serial queue");

    // With one member active, nothing else is released
    p.set_state(&ready[0], TaskState::Submitted).unwrap();
    assert!(p.ready_tasks().unwrap().is_empty());
}

#[test]
fn suicide_trigger_removes_target() {
    let mut p = pool(
        r#"
[scheduling]
initial_cycle_point = "1"
cycling_mode = "integer"

[scheduling.graph]
R1 = """
foo? => ok
foo:fail? => !ok & cleanup
"""

[runtime.foo]
script = "true"

[runtime.ok]
script = "true"

[runtime.cleanup]
script = "true"
"#,
    );
    p.spawn_parentless().unwrap();
    p.apply_output(&id("foo", 1), OUT_SUCCEEDED).unwrap();
    assert!(p.get(&id("ok", 1)).is_some());

    let removed = p.apply_output(&id("foo", 1), OUT_FAILED).unwrap();
    // failed cannot follow succeeded: terminal exclusivity means no-op
    assert!(removed.is_empty());

    // Fresh pool where foo fails instead
    let mut p2 = pool(
        r#"
[scheduling]
initial_cycle_point = "1"
cycling_mode = "integer"

[scheduling.graph]
R1 = """
foo? => ok
foo:fail? => !ok & cleanup
"""

[runtime.foo]
script = "true"

[runtime.ok]
script = "true"

[runtime.cleanup]
script = "true"
"#,
    );
    p2.spawn_parentless().unwrap();
    // ok is spawned early by a manual trigger to give the suicide a target
    p2.trigger("ok", &int(1), &rota_core::flow::FlowSpec::All)
        .unwrap();
    let removed = p2.apply_output(&id("foo", 1), OUT_FAILED).unwrap();
    assert_eq!(removed, vec![id("ok", 1)]);
    assert!(p2.get(&id("ok", 1)).is_none());
    assert!(p2.get(&id("cleanup", 1)).is_some());
}

#[test]
fn trigger_new_flow_gets_fresh_number() {
    let mut p = pool(CHAIN);
    p.spawn_parentless().unwrap();
    // Run the graph once
    p.apply_output(&id("foo", 1), OUT_SUCCEEDED).unwrap();
    p.set_state(&id("foo", 1), TaskState::Succeeded).unwrap();
    p.set_state(&id("bar", 1), TaskState::Succeeded).unwrap();
    p.apply_output(&id("bar", 1), OUT_SUCCEEDED).unwrap();
    p.remove_completed();
    assert!(p.is_empty());

    // Re-trigger foo in a new flow
    let fid = p
        .trigger("foo", &int(1), &rota_core::flow::FlowSpec::New)
        .unwrap();
    assert_eq!(p.max_flow(), 2);
    let proxy = p.get(&fid).unwrap();
    assert!(proxy.flows.contains(2));
    assert!(proxy.is_ready());
}

#[test]
fn flows_merge_when_they_meet() {
    let mut p = pool(CHAIN);
    p.spawn_parentless().unwrap();
    // Trigger bar in a new flow while flow 1's bar has not spawned yet
    p.trigger("bar", &int(1), &rota_core::flow::FlowSpec::New)
        .unwrap();
    // Flow 1 catches up
    p.apply_output(&id("foo", 1), OUT_SUCCEEDED).unwrap();

    let bar = p.get(&id("bar", 1)).unwrap();
    assert!(bar.flows.contains(1));
    assert!(bar.flows.contains(2));
}

#[test]
fn completed_instances_are_not_respawned_in_the_same_flow() {
    let mut p = pool(CYCLING);
    p.spawn_parentless().unwrap();
    p.apply_output(&id("foo", 1), OUT_SUCCEEDED).unwrap();
    p.set_state(&id("foo", 1), TaskState::Succeeded).unwrap();
    p.remove_completed();
    assert!(p.get(&id("foo", 1)).is_none());

    // Another pass over the same output must not resurrect foo.2
    p.set_state(&id("foo", 2), TaskState::Succeeded).unwrap();
    p.apply_output(&id("foo", 2), OUT_SUCCEEDED).unwrap();
    p.remove_completed();
    let respawned = p.spawn(&"foo".to_string(), &int(2), FlowSet::single(1)).unwrap();
    assert!(!respawned, "flow 1 already ran foo.2");
}

#[test]
fn stall_detection() {
    let mut p = pool(CHAIN);
    assert!(!p.is_stalled(), "empty pool is not a stall");
    p.spawn_parentless().unwrap();
    assert!(!p.is_stalled(), "foo is ready");

    // foo fails without emitting its required output: bar never runs
    p.set_state(&id("foo", 1), TaskState::Failed).unwrap();
    let mut_proxy = p.get_mut(&id("foo", 1)).unwrap();
    mut_proxy.outputs.emit(OUT_STARTED);
    mut_proxy.outputs.emit(OUT_FAILED);
    assert!(p.is_stalled());

    let incomplete = p.incomplete_tasks();
    assert_eq!(incomplete.len(), 1);
    assert_eq!(incomplete[0].0, id("foo", 1));
    assert_eq!(incomplete[0].1, vec!["succeeded"]);
}

#[test]
fn incomplete_finished_tasks_block_runahead_in_current_mode() {
    let mut p = pool(CYCLING);
    p.spawn_parentless().unwrap();
    p.set_state(&id("foo", 1), TaskState::Failed).unwrap();
    p.get_mut(&id("foo", 1)).unwrap().outputs.emit(OUT_FAILED);

    // foo.1 is incomplete: the window stays anchored at 1
    assert_eq!(p.runahead_point().unwrap(), Some(int(3)));
}

#[test]
fn restore_round_trips_the_pool() {
    let mut p = pool(CHAIN);
    p.spawn_parentless().unwrap();
    p.apply_output(&id("foo", 1), OUT_SUCCEEDED).unwrap();
    p.hold(&id("bar", 1)).unwrap();

    // Capture what the DB would hold
    let mut db = rota_storage::StateDb::open_in_memory().unwrap();
    db.apply(&p.drain_ops()).unwrap();

    let mut restored = TaskPool::new(config(CHAIN));
    restored.set_now("t1");
    restored
        .restore(
            &db.load_pool().unwrap(),
            &db.load_outputs().unwrap(),
            &db.load_prereqs().unwrap(),
            &db.load_flows().unwrap(),
        )
        .unwrap();

    assert_eq!(restored.len(), p.len());
    let bar = restored.get(&id("bar", 1)).unwrap();
    assert!(bar.is_held);
    assert!(bar.prereqs_satisfied(), "satisfaction survives the round trip");
    let foo = restored.get(&id("foo", 1)).unwrap();
    assert!(foo.outputs.is_completed(OUT_SUCCEEDED));
}

#[test]
fn drain_ops_empties_the_queue() {
    let mut p = pool(CHAIN);
    p.spawn_parentless().unwrap();
    assert!(!p.drain_ops().is_empty());
    assert!(p.drain_ops().is_empty());
}

#[test]
fn matching_selector() {
    let mut p = pool(CHAIN);
    p.spawn_parentless().unwrap();
    assert_eq!(p.matching(&int(1), "foo"), vec![id("foo", 1)]);
    assert_eq!(p.matching(&int(1), "*").len(), 1);
    assert!(p.matching(&int(2), "foo").is_empty());
}
