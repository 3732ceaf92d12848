// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broadcasts: runtime overrides applied to matching tasks without
//! editing the workflow definition.

use crate::point::CyclePoint;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One broadcast setting, scoped by cycle point and task name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastEntry {
    /// `None` matches every cycle point (the `*` scope)
    pub point: Option<CyclePoint>,
    /// Task name, or `root` to match every task
    pub namespace: String,
    pub key: String,
    pub value: String,
}

/// The live set of broadcast overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BroadcastStore {
    entries: Vec<BroadcastEntry>,
}

impl BroadcastStore {
    /// Insert or replace a setting. Later puts win over earlier ones for
    /// the same (point, namespace, key) scope.
    pub fn put(&mut self, entry: BroadcastEntry) {
        self.entries.retain(|e| {
            !(e.point == entry.point && e.namespace == entry.namespace && e.key == entry.key)
        });
        self.entries.push(entry);
    }

    /// Remove settings matching the given scopes. Empty scope lists match
    /// everything.
    pub fn clear(&mut self, points: &[Option<CyclePoint>], namespaces: &[String]) {
        self.entries.retain(|e| {
            let point_match = points.is_empty() || points.contains(&e.point);
            let ns_match = namespaces.is_empty() || namespaces.contains(&e.namespace);
            !(point_match && ns_match)
        });
    }

    /// Drop point-scoped settings earlier than the cutoff.
    pub fn expire(&mut self, cutoff: &CyclePoint) {
        self.entries.retain(|e| match &e.point {
            None => true,
            Some(p) => !matches!(p.try_cmp(cutoff), Ok(std::cmp::Ordering::Less)),
        });
    }

    /// Overrides applying to a task instance, generic first so that
    /// specific scopes win key-by-key.
    pub fn overrides_for(&self, task: &str, point: &CyclePoint) -> HashMap<String, String> {
        let mut out = HashMap::new();
        // root/* first, then name-scoped, then point-scoped, then both
        for specificity in 0..4u8 {
            for e in &self.entries {
                let ns_specific = e.namespace != "root";
                let point_specific = e.point.is_some();
                if u8::from(ns_specific) + u8::from(point_specific) * 2 != specificity {
                    continue;
                }
                let ns_ok = !ns_specific || e.namespace == task;
                let point_ok = match &e.point {
                    None => true,
                    Some(p) => p == point,
                };
                if ns_ok && point_ok {
                    out.insert(e.key.clone(), e.value.clone());
                }
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &BroadcastEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
#[path = "broadcast_tests.rs"]
mod tests;
