// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn parents(pairs: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
    pairs
        .iter()
        .map(|(name, ps)| {
            (
                name.to_string(),
                ps.iter().map(|p| p.to_string()).collect(),
            )
        })
        .collect()
}

#[test]
fn no_parents() {
    let map = parents(&[]);
    assert_eq!(linearize("a", &map).unwrap(), vec!["a"]);
}

#[test]
fn single_chain() {
    let map = parents(&[("c", &["b"]), ("b", &["a"])]);
    assert_eq!(linearize("c", &map).unwrap(), vec!["c", "b", "a"]);
}

#[test]
fn diamond() {
    // d -> (b, c), b -> a, c -> a
    let map = parents(&[("d", &["b", "c"]), ("b", &["a"]), ("c", &["a"])]);
    assert_eq!(linearize("d", &map).unwrap(), vec!["d", "b", "c", "a"]);
}

#[test]
fn declaration_order_wins_among_unrelated() {
    let map = parents(&[("x", &["m", "n"])]);
    assert_eq!(linearize("x", &map).unwrap(), vec!["x", "m", "n"]);
}

#[test]
fn cycle_is_an_error() {
    let map = parents(&[("a", &["b"]), ("b", &["a"])]);
    assert!(matches!(
        linearize("a", &map),
        Err(WorkflowConfigError::CyclicInheritance(_))
    ));
}

#[test]
fn self_cycle_is_an_error() {
    let map = parents(&[("a", &["a"])]);
    assert!(linearize("a", &map).is_err());
}

#[test]
fn inconsistent_hierarchy_is_an_error() {
    // z inherits (p, q) but q's own MRO puts p before q's other parent in
    // a conflicting order: classic C3 failure case.
    let map = parents(&[
        ("z", &["p", "q"]),
        ("p", &["a", "b"]),
        ("q", &["b", "a"]),
    ]);
    assert!(linearize("z", &map).is_err());
}
