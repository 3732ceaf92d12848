// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    default = { None, FlowSpec::All },
    all     = { Some("all"), FlowSpec::All },
    new     = { Some("new"), FlowSpec::New },
    none    = { Some("none"), FlowSpec::None },
    single  = { Some("3"), FlowSpec::Numbers(vec![3]) },
    several = { Some("1,2, 5"), FlowSpec::Numbers(vec![1, 2, 5]) },
)]
fn parse_flow_accepts(input: Option<&str>, expected: FlowSpec) {
    assert_eq!(parse_flow(input).unwrap(), expected);
}

#[yare::parameterized(
    words = { "soon" },
    empty = { "" },
    mixed = { "1,x" },
)]
fn parse_flow_rejects(input: &str) {
    assert!(parse_flow(Some(input)).is_err());
}
