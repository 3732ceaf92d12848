// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use rota_core::outputs::OUT_SUCCEEDED;

const BASIC: &str = r#"
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

fn parse(content: &str) -> WorkflowConfig {
    WorkflowConfig::parse_str(content, CompatMode::Current).unwrap()
}

fn int(n: i64) -> CyclePoint {
    CyclePoint::Integer(n)
}

#[test]
fn basic_parses() {
    let config = parse(BASIC);
    assert_eq!(config.initial_point, int(1));
    assert!(config.calendar.is_none());
    assert_eq!(config.tasks.len(), 2);
    assert_eq!(config.runahead_limit, Duration::Integer(1));
}

#[test]
fn prereqs_resolve_offsets() {
    let config = parse(
        r#"
[scheduling]
initial_cycle_point = "1"
final_cycle_point = "5"
cycling_mode = "integer"

[scheduling.graph]
P1 = "foo[-P1] => foo"

[runtime.foo]
script = "true"
"#,
    );
    // At the initial point the pre-history reference is dropped
    assert!(config.prereqs_for("foo", &int(1)).unwrap().is_empty());
    // Later points depend on the previous cycle
    let prereqs = config.prereqs_for("foo", &int(3)).unwrap();
    assert_eq!(prereqs.len(), 1);
    let atom = prereqs[0].unsatisfied().next().unwrap();
    assert_eq!(atom.point, int(2));
    assert_eq!(atom.task, "foo");
}

#[test]
fn undefined_task_is_an_error() {
    let err = WorkflowConfig::parse_str(
        r#"
[scheduling]
initial_cycle_point = "1"
cycling_mode = "integer"

[scheduling.graph]
R1 = "ghost"
"#,
        CompatMode::Current,
    )
    .unwrap_err();
    assert!(matches!(err, WorkflowConfigError::UndefinedTask(name) if name == "ghost"));
}

#[test]
fn allow_implicit_tasks_permits_missing_runtime() {
    let config = parse(
        r#"
[scheduler]
allow_implicit_tasks = true

[scheduling]
initial_cycle_point = "1"
cycling_mode = "integer"

[scheduling.graph]
R1 = "ghost"
"#,
    );
    assert!(config.tasks.contains_key("ghost"));
}

#[test]
fn stop_point_clamps_to_final() {
    let config = parse(
        r#"
[scheduling]
initial_cycle_point = "1"
final_cycle_point = "3"
stop_after_cycle_point = "9"
cycling_mode = "integer"

[scheduling.graph]
P1 = "foo"

[runtime.foo]
script = "true"
"#,
    );
    assert_eq!(config.stop_point, Some(int(3)));
}

#[test]
fn spawn_targets_respect_final_point() {
    let config = parse(
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
    );
    assert_eq!(
        config.spawn_targets("foo", OUT_SUCCEEDED, &int(1)).unwrap(),
        vec![rota_core::task::TaskId::new("foo", int(2))]
    );
    // No successor beyond the final cycle point
    assert!(config
        .spawn_targets("foo", OUT_SUCCEEDED, &int(2))
        .unwrap()
        .is_empty());
}

#[test]
fn graph_optional_marker_reaches_outputs() {
    let config = parse(
        r#"
[scheduling]
initial_cycle_point = "1"
cycling_mode = "integer"

[scheduling.graph]
R1 = "foo? => bar"

[runtime.foo]
script = "true"

[runtime.bar]
script = "true"
"#,
    );
    let foo = &config.tasks["foo"];
    // Optional success: an instance with no emissions still completes
    assert!(foo.output_set().is_complete());
}

#[test]
fn required_fail_drops_success_requirement() {
    let config = parse(
        r#"
[scheduling]
initial_cycle_point = "1"
cycling_mode = "integer"

[scheduling.graph]
R1 = "foo:fail => cleanup"

[runtime.foo]
script = "true"

[runtime.cleanup]
script = "true"
"#,
    );
    let mut outputs = config.tasks["foo"].output_set();
    outputs.emit("failed");
    assert!(outputs.is_complete(), "failed is the required terminal now");
}

#[test]
fn custom_outputs_declared_from_runtime() {
    let config = parse(
        r#"
[scheduling]
initial_cycle_point = "1"
cycling_mode = "integer"

[scheduling.graph]
R1 = "foo:x => bar"

[runtime.foo]
script = "true"

[runtime.foo.outputs]
x = "the quick brown fox"

[runtime.bar]
script = "true"
"#,
    );
    let outputs = config.tasks["foo"].output_set();
    assert!(outputs.is_declared("x"));
    assert_eq!(outputs.output_for_message("the quick brown fox"), Some("x"));
    // Referenced without `?` in the graph, so required
    assert!(outputs.missing_required().contains(&"x"));
}

#[test]
fn queue_lookup() {
    let config = parse(
        r#"
[scheduling]
initial_cycle_point = "1"
cycling_mode = "integer"

[scheduling.queues.serial]
limit = 1
members = ["foo"]

[scheduling.graph]
R1 = "foo => bar"

[runtime.foo]
script = "true"

[runtime.bar]
script = "true"
"#,
    );
    assert_eq!(config.queue_for("foo").map(|(n, _)| n), Some("serial"));
    assert!(config.queue_for("bar").is_none());
}

#[test]
fn datetime_workflow_points() {
    let config = parse(
        r#"
[scheduler]
utc_mode = true

[scheduling]
initial_cycle_point = "2020"
final_cycle_point = "2030"

[scheduling.graph]
P1Y = "foo[-P1Y] => foo"

[runtime.foo]
script = "true"
"#,
    );
    assert!(config.calendar.is_some());
    let p2020 = CyclePoint::parse("2020", config.calendar).unwrap();
    let p2021 = CyclePoint::parse("2021", config.calendar).unwrap();
    assert_eq!(config.first_point("foo", &p2020).unwrap(), Some(p2020));
    assert_eq!(config.next_point("foo", &p2020).unwrap(), Some(p2021));
    // Default runahead: one cycle of the smallest (only) period
    assert_eq!(config.runahead_limit, Duration::parse("P1Y").unwrap());
}

#[test]
fn reload_rejects_removed_task() {
    let old = parse(BASIC);
    let new = parse(
        r#"
[scheduling]
initial_cycle_point = "1"
cycling_mode = "integer"

[scheduling.graph]
R1 = "foo"

[runtime.foo]
script = "true"
"#,
    );
    assert!(matches!(
        old.check_reload(&new),
        Err(WorkflowConfigError::ReloadRejected(_))
    ));
}

#[test]
fn reload_accepts_script_change() {
    let old = parse(BASIC);
    let new = parse(&BASIC.replace("script = \"true\"", "script = \"false\""));
    assert!(old.check_reload(&new).is_ok());
    assert_ne!(old.task_hashes()["foo"], new.task_hashes()["foo"]);
}

#[test]
fn task_hashes_are_stable() {
    let a = parse(BASIC);
    let b = parse(BASIC);
    assert_eq!(a.task_hashes(), b.task_hashes());
}

#[test]
fn missing_graph_is_an_error() {
    let err = WorkflowConfig::parse_str(
        r#"
[scheduling]
initial_cycle_point = "1"
cycling_mode = "integer"
"#,
        CompatMode::Current,
    )
    .unwrap_err();
    assert!(matches!(err, WorkflowConfigError::Invalid { .. }));
}
