// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::point::CyclePoint;

fn atom(point: i64, task: &str, output: &str) -> PrereqAtom {
    PrereqAtom::new(CyclePoint::Integer(point), task, output)
}

#[test]
fn empty_prereq_is_satisfied() {
    let p = Prereq::default();
    assert!(p.is_satisfied());
}

#[test]
fn single_clause_single_atom() {
    let mut p = Prereq::new(vec![vec![atom(1, "foo", "succeeded")]]);
    assert!(!p.is_satisfied());
    assert!(p.satisfy(&atom(1, "foo", "succeeded")));
    assert!(p.is_satisfied());
}

#[test]
fn wrong_atom_does_not_satisfy() {
    let mut p = Prereq::new(vec![vec![atom(1, "foo", "succeeded")]]);
    assert!(!p.satisfy(&atom(2, "foo", "succeeded")), "wrong cycle");
    assert!(!p.satisfy(&atom(1, "foo", "failed")), "wrong output");
    assert!(!p.satisfy(&atom(1, "bar", "succeeded")), "wrong task");
}

#[test]
fn disjunction_needs_one_member() {
    let mut p = Prereq::new(vec![vec![
        atom(1, "a", "succeeded"),
        atom(1, "b", "succeeded"),
    ]]);
    assert!(p.satisfy(&atom(1, "b", "succeeded")));
}

#[test]
fn conjunction_needs_every_clause() {
    let mut p = Prereq::new(vec![
        vec![atom(1, "a", "succeeded")],
        vec![atom(1, "b", "succeeded"), atom(1, "c", "succeeded")],
    ]);
    assert!(!p.satisfy(&atom(1, "a", "succeeded")));
    assert!(p.satisfy(&atom(1, "c", "succeeded")));
}

#[test]
fn shared_atom_satisfies_every_occurrence() {
    let mut p = Prereq::new(vec![
        vec![atom(1, "a", "succeeded")],
        vec![atom(1, "a", "succeeded"), atom(1, "b", "succeeded")],
    ]);
    assert!(p.satisfy(&atom(1, "a", "succeeded")));
}

#[test]
fn satisfy_all_forces_completion() {
    let mut p = Prereq::new(vec![
        vec![atom(1, "a", "succeeded")],
        vec![atom(2, "b", "x")],
    ]);
    p.satisfy_all();
    assert!(p.is_satisfied());
    assert_eq!(p.unsatisfied().count(), 0);
}

#[test]
fn unsatisfied_reports_remaining_atoms() {
    let mut p = Prereq::new(vec![
        vec![atom(1, "a", "succeeded")],
        vec![atom(1, "b", "succeeded")],
    ]);
    p.satisfy(&atom(1, "a", "succeeded"));
    let remaining: Vec<_> = p.unsatisfied().collect();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].task, "b");
}

#[test]
fn db_json_round_trips_with_aliases() {
    let mut p = Prereq::new(vec![
        vec![atom(1, "a", "succeeded"), atom(1, "b", "succeeded")],
        vec![atom(1, "a", "succeeded")],
    ]);
    p.satisfy(&atom(1, "b", "succeeded"));

    let json = p.to_db_json();
    // The shared atom is stored once
    assert_eq!(json["atoms"].as_array().unwrap().len(), 2);

    let back = Prereq::from_db_json(&json).unwrap();
    assert_eq!(back, p);
}

#[test]
fn suicide_flag_round_trips() {
    let p = Prereq::suicide(vec![vec![atom(1, "a", "failed")]]);
    let back = Prereq::from_db_json(&p.to_db_json()).unwrap();
    assert!(back.suicide);
}
