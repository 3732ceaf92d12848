// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flows: logical triggering waves through the graph.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The set of flow numbers a task instance belongs to.
///
/// When two flows meet on the same `(name, point)` their sets merge; the
/// instance runs once and its outputs credit every member flow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct FlowSet(BTreeSet<u32>);

impl FlowSet {
    pub fn single(flow: u32) -> Self {
        Self(BTreeSet::from([flow]))
    }

    pub fn merge(&mut self, other: &FlowSet) {
        self.0.extend(other.0.iter().copied());
    }

    pub fn contains(&self, flow: u32) -> bool {
        self.0.contains(&flow)
    }

    /// True when the two sets share at least one flow number.
    pub fn intersects(&self, other: &FlowSet) -> bool {
        self.0.iter().any(|f| other.0.contains(f))
    }

    /// Members of `self` not in `other`.
    pub fn difference(&self, other: &FlowSet) -> FlowSet {
        FlowSet(self.0.difference(&other.0).copied().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }

    /// DB encoding: comma-joined ascending numbers, e.g. `"1,2"`.
    pub fn to_db_string(&self) -> String {
        self.0
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn from_db_string(s: &str) -> Self {
        Self(
            s.split(',')
                .filter_map(|p| p.trim().parse().ok())
                .collect(),
        )
    }
}

impl fmt::Display for FlowSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// How a manual trigger assigns flow membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FlowSpec {
    /// Run in all currently active flows
    #[default]
    All,
    /// Start a fresh flow (current max + 1)
    New,
    /// Run in the given flows
    Numbers(Vec<u32>),
    /// Run flow-less: outputs credit no flow, nothing spawns downstream
    None,
}

#[cfg(test)]
#[path = "flow_tests.rs"]
mod tests;
