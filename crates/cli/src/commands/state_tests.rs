// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use rota_storage::DbOp;

#[test]
fn parse_full_target() {
    let q = StateQuery::parse("demo/run1//20200101T0000Z/foo:x").unwrap();
    assert_eq!(q.workflow_id, "demo/run1");
    assert_eq!(q.point, "20200101T0000Z");
    assert_eq!(q.task, "foo");
    assert_eq!(q.selector, "x");
}

#[test]
fn selector_defaults_to_succeeded() {
    let q = StateQuery::parse("demo//1/foo").unwrap();
    assert_eq!(q.selector, "succeeded");
}

#[yare::parameterized(
    no_double_slash = { "demo/1/foo" },
    no_task         = { "demo//1" },
    empty_id        = { "//1/foo" },
)]
fn parse_rejects(target: &str) {
    assert!(StateQuery::parse(target).is_err(), "{target}");
}

fn seeded_db() -> StateDb {
    let mut db = StateDb::open_in_memory().unwrap();
    db.apply(&[
        DbOp::TaskState {
            cycle: "1".to_string(),
            name: "foo".to_string(),
            flows: "1".to_string(),
            submit_num: 1,
            status: "succeeded".to_string(),
            time: "t".to_string(),
        },
        DbOp::SetOutputs {
            cycle: "1".to_string(),
            name: "foo".to_string(),
            flows: "1".to_string(),
            outputs: r#"["submitted","started","succeeded","x"]"#.to_string(),
        },
    ])
    .unwrap();
    db
}

#[test]
fn check_matches_status() {
    let db = seeded_db();
    let q = StateQuery::parse("demo//1/foo:succeeded").unwrap();
    assert!(check_once(&db, &q, false).unwrap());
}

#[test]
fn check_matches_custom_output() {
    let db = seeded_db();
    let q = StateQuery::parse("demo//1/foo:x").unwrap();
    assert!(check_once(&db, &q, false).unwrap());
}

#[test]
fn check_misses_unknown() {
    let db = seeded_db();
    let q = StateQuery::parse("demo//1/foo:failed").unwrap();
    assert!(!check_once(&db, &q, false).unwrap());
    let q = StateQuery::parse("demo//2/foo:succeeded").unwrap();
    assert!(!check_once(&db, &q, false).unwrap());
}

#[test]
fn messages_mode_skips_status_matching() {
    let db = seeded_db();
    // With --messages, only outputs count; "succeeded" is also an output
    // here so it still matches via the outputs table
    let q = StateQuery::parse("demo//1/foo:succeeded").unwrap();
    assert!(check_once(&db, &q, true).unwrap());
}
