// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolved task definitions.

use crate::error::WorkflowConfigError;
use crate::raw::RawRuntime;
use indexmap::IndexMap;
use rota_core::duration::Duration;
use rota_core::outputs::OutputSet;
use serde::{Deserialize, Serialize};

/// Runtime settings for one task, after inheritance resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRuntime {
    pub script: String,
    pub env_script: String,
    pub pre_script: String,
    pub post_script: String,
    pub err_script: String,
    pub exit_script: String,
    pub platform: Option<String>,
    pub env: IndexMap<String, String>,
    pub directives: IndexMap<String, String>,
    /// Custom outputs: name -> message
    pub outputs: IndexMap<String, String>,
    pub execution_retry_delays: Vec<Duration>,
    pub submission_retry_delays: Vec<Duration>,
    pub execution_time_limit: Option<Duration>,
    pub submission_polling_intervals: Vec<Duration>,
    pub execution_polling_intervals: Vec<Duration>,
    /// Event handlers: event name -> shell command
    pub events: IndexMap<String, String>,
}

impl TaskRuntime {
    /// Merge along a C3 linearization, most specific first. Scalars take
    /// the first definition; maps merge key-by-key with specific wins.
    pub fn from_mro(
        mro: &[String],
        raw: &IndexMap<String, RawRuntime>,
        location: &str,
    ) -> Result<Self, WorkflowConfigError> {
        let mut rt = TaskRuntime::default();
        let parse_delays = |raw: &[String], what: &str| -> Result<Vec<Duration>, WorkflowConfigError> {
            raw.iter()
                .map(|d| {
                    Duration::parse(d).map_err(|e| WorkflowConfigError::Invalid {
                        location: format!("{location}.{what}"),
                        message: e.to_string(),
                    })
                })
                .collect()
        };

        // Walk generic -> specific so later (more specific) writes win
        for ns in mro.iter().rev() {
            let Some(r) = raw.get(ns) else { continue };
            if let Some(s) = &r.script {
                rt.script = s.clone();
            }
            if let Some(s) = &r.env_script {
                rt.env_script = s.clone();
            }
            if let Some(s) = &r.pre_script {
                rt.pre_script = s.clone();
            }
            if let Some(s) = &r.post_script {
                rt.post_script = s.clone();
            }
            if let Some(s) = &r.err_script {
                rt.err_script = s.clone();
            }
            if let Some(s) = &r.exit_script {
                rt.exit_script = s.clone();
            }
            if let Some(p) = &r.platform {
                rt.platform = Some(p.clone());
            }
            for (k, v) in &r.env {
                rt.env.insert(k.clone(), v.clone());
            }
            for (k, v) in &r.directives {
                rt.directives.insert(k.clone(), v.clone());
            }
            for (k, v) in &r.outputs {
                rt.outputs.insert(k.clone(), v.clone());
            }
            for (k, v) in &r.events {
                rt.events.insert(k.clone(), v.clone());
            }
            if !r.execution_retry_delays.is_empty() {
                rt.execution_retry_delays =
                    parse_delays(&r.execution_retry_delays, "execution_retry_delays")?;
            }
            if !r.submission_retry_delays.is_empty() {
                rt.submission_retry_delays =
                    parse_delays(&r.submission_retry_delays, "submission_retry_delays")?;
            }
            if let Some(limit) = &r.execution_time_limit {
                rt.execution_time_limit =
                    Some(Duration::parse(limit).map_err(|e| WorkflowConfigError::Invalid {
                        location: format!("{location}.execution_time_limit"),
                        message: e.to_string(),
                    })?);
            }
            if !r.submission_polling_intervals.is_empty() {
                rt.submission_polling_intervals =
                    parse_delays(&r.submission_polling_intervals, "submission_polling_intervals")?;
            }
            if !r.execution_polling_intervals.is_empty() {
                rt.execution_polling_intervals =
                    parse_delays(&r.execution_polling_intervals, "execution_polling_intervals")?;
            }
        }
        Ok(rt)
    }
}

/// A task definition: identity, recurrence membership, outputs, runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDef {
    pub name: String,
    /// Indexes into the workflow's graph sections where this task appears
    pub sections: Vec<usize>,
    /// Output declarations with required/optional resolution applied
    pub outputs: OutputSet,
    pub runtime: TaskRuntime,
}

impl TaskDef {
    /// A fresh output set for a new task instance.
    pub fn output_set(&self) -> OutputSet {
        self.outputs.clone()
    }
}

#[cfg(test)]
#[path = "taskdef_tests.rs"]
mod tests;
