// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task outputs and completion tracking.
//!
//! Every task carries the predeclared outputs plus any custom message
//! outputs from its definition. Each output is required or optional for
//! completion; a run emits at most one terminal output (succeeded XOR
//! failed).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const OUT_SUBMITTED: &str = "submitted";
pub const OUT_SUBMIT_FAILED: &str = "submit-failed";
pub const OUT_STARTED: &str = "started";
pub const OUT_SUCCEEDED: &str = "succeeded";
pub const OUT_FAILED: &str = "failed";
pub const OUT_EXPIRED: &str = "expired";

/// The predeclared outputs every task has.
pub const STANDARD_OUTPUTS: [&str; 6] = [
    OUT_SUBMITTED,
    OUT_SUBMIT_FAILED,
    OUT_STARTED,
    OUT_SUCCEEDED,
    OUT_FAILED,
    OUT_EXPIRED,
];

/// Declaration of a single output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDef {
    /// Human-readable message associated with the output
    pub message: String,
    /// Whether completion requires this output
    pub required: bool,
}

/// The output set of one task instance: declarations plus emissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OutputSet {
    outputs: IndexMap<String, OutputDef>,
    completed: BTreeSet<String>,
}

impl OutputSet {
    /// A fresh set with the standard outputs.
    ///
    /// By default only `succeeded` is required; graph optional markers and
    /// custom declarations adjust requirements afterwards.
    pub fn standard() -> Self {
        let mut outputs = IndexMap::new();
        for name in STANDARD_OUTPUTS {
            outputs.insert(
                name.to_string(),
                OutputDef {
                    message: name.to_string(),
                    required: name == OUT_SUCCEEDED,
                },
            );
        }
        Self {
            outputs,
            completed: BTreeSet::new(),
        }
    }

    /// Declare a custom output with its message.
    pub fn declare(&mut self, name: &str, message: &str, required: bool) {
        self.outputs.insert(
            name.to_string(),
            OutputDef {
                message: message.to_string(),
                required,
            },
        );
    }

    /// Mark an output required (used when a trigger references it).
    pub fn set_required(&mut self, name: &str, required: bool) {
        if let Some(def) = self.outputs.get_mut(name) {
            def.required = required;
        }
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.outputs.contains_key(name)
    }

    /// Record an emission. Returns false if already emitted or if a
    /// conflicting terminal output was already recorded.
    pub fn emit(&mut self, name: &str) -> bool {
        let opposite = match name {
            OUT_SUCCEEDED => Some(OUT_FAILED),
            OUT_FAILED => Some(OUT_SUCCEEDED),
            _ => None,
        };
        if let Some(opp) = opposite {
            if self.completed.contains(opp) {
                return false;
            }
        }
        self.completed.insert(name.to_string())
    }

    /// Forget an emission (used when a retry re-runs the task).
    pub fn retract(&mut self, name: &str) {
        self.completed.remove(name);
    }

    pub fn is_completed(&self, name: &str) -> bool {
        self.completed.contains(name)
    }

    /// Map a reported message back to its output name, if declared.
    pub fn output_for_message(&self, message: &str) -> Option<&str> {
        self.outputs
            .iter()
            .find(|(_, def)| def.message == message)
            .map(|(name, _)| name.as_str())
    }

    /// All required outputs have been emitted.
    pub fn is_complete(&self) -> bool {
        if self.completed.contains(OUT_EXPIRED) {
            return true;
        }
        self.outputs
            .iter()
            .filter(|(_, def)| def.required)
            .all(|(name, _)| self.completed.contains(name))
    }

    /// Required outputs not yet emitted, for stall diagnostics.
    pub fn missing_required(&self) -> Vec<&str> {
        self.outputs
            .iter()
            .filter(|(name, def)| def.required && !self.completed.contains(*name))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Emitted output names, in emission-stable (sorted) order.
    pub fn completed(&self) -> impl Iterator<Item = &str> {
        self.completed.iter().map(|s| s.as_str())
    }

    /// Declared output names in declaration order.
    pub fn declared(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(|s| s.as_str())
    }

    /// Restore emissions from a persisted list (DB restart path).
    pub fn restore(&mut self, completed: impl IntoIterator<Item = String>) {
        self.completed.extend(completed);
    }
}

#[cfg(test)]
#[path = "outputs_tests.rs"]
mod tests;
