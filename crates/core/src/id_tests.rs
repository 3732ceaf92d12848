// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::borrow::Borrow;
use std::collections::HashMap;

crate::define_id! {
    /// Test ID type for macro verification.
    pub struct TestId;
}

#[test]
fn define_id_new_and_as_str() {
    let id = TestId::new("abc");
    assert_eq!(id.as_str(), "abc");
}

#[test]
fn define_id_display() {
    assert_eq!(TestId::new("hello").to_string(), "hello");
}

#[test]
fn define_id_partial_eq_str() {
    let id = TestId::new("test");
    assert_eq!(id, *"test");
    assert_eq!(id, "test");
}

#[test]
fn define_id_borrow_enables_str_lookup() {
    let mut map: HashMap<TestId, u32> = HashMap::new();
    map.insert(TestId::new("key"), 1);
    let borrowed: &str = map.keys().next().map(|k| k.borrow()).unwrap_or_default();
    assert_eq!(borrowed, "key");
    assert_eq!(map.get("key"), Some(&1));
}

#[yare::parameterized(
    shorter = { "abc", 5, "abc" },
    exact   = { "abcde", 5, "abcde" },
    longer  = { "abcdefgh", 5, "abcde" },
)]
fn short_truncates(input: &str, n: usize, expected: &str) {
    assert_eq!(input.short(n), expected);
}
