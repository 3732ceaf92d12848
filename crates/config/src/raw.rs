// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Raw serde structs for the workflow definition file.
//!
//! Serde does the heavy lifting; semantic resolution (inheritance, graph
//! parsing, point arithmetic) happens afterwards in [`crate::workflow`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Top level of a `flow.toml` (or back-compat `suite.rc`) file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawWorkflow {
    #[serde(default)]
    pub scheduler: RawScheduler,
    pub scheduling: RawScheduling,
    #[serde(default)]
    pub runtime: IndexMap<String, RawRuntime>,
    #[serde(default)]
    pub platforms: IndexMap<String, RawPlatform>,
    #[serde(default)]
    pub platform_groups: IndexMap<String, RawPlatformGroup>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawScheduler {
    pub utc_mode: bool,
    /// Point format override, e.g. `CCYYMMDDThhmmZ`
    pub cycle_point_format: Option<String>,
    pub allow_implicit_tasks: bool,
    /// ISO duration; stall shuts the workflow down after this long
    pub stall_timeout: Option<String>,
    pub abort_on_stall_timeout: bool,
    /// ISO duration; no activity at all for this long triggers shutdown
    pub inactivity_timeout: Option<String>,
    pub abort_on_inactivity_timeout: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawScheduling {
    pub initial_cycle_point: String,
    pub final_cycle_point: Option<String>,
    pub stop_after_cycle_point: Option<String>,
    /// `integer`, `gregorian`, `360day`, or `365day`
    pub cycling_mode: Option<String>,
    pub runahead_limit: Option<String>,
    #[serde(default)]
    pub queues: IndexMap<String, RawQueue>,
    /// Recurrence expression -> graph string
    #[serde(default)]
    pub graph: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawQueue {
    pub limit: usize,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawRuntime {
    /// Parent namespaces, resolved with C3 linearization
    pub inherit: Vec<String>,
    pub script: Option<String>,
    pub env_script: Option<String>,
    pub pre_script: Option<String>,
    pub post_script: Option<String>,
    pub err_script: Option<String>,
    pub exit_script: Option<String>,
    pub platform: Option<String>,
    pub env: IndexMap<String, String>,
    /// Batch-system-native options, passed through verbatim
    pub directives: IndexMap<String, String>,
    /// Custom outputs: name -> message
    pub outputs: IndexMap<String, String>,
    pub execution_retry_delays: Vec<String>,
    pub submission_retry_delays: Vec<String>,
    pub execution_time_limit: Option<String>,
    pub submission_polling_intervals: Vec<String>,
    pub execution_polling_intervals: Vec<String>,
    /// Event handlers: event name (`succeeded`, `failed`, ...) -> command
    pub events: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawPlatform {
    pub hosts: Vec<String>,
    /// `background`, `at`, `slurm`, `pbs`, `lsf`, `moab`, `loadleveler`,
    /// or `custom`
    pub job_runner: Option<String>,
    /// File-install target shared by platforms on one filesystem
    pub install_target: Option<String>,
    pub ssh_command: Option<String>,
    /// `tcp` (jobs message the scheduler) or `poll`
    pub communication_method: Option<String>,
    pub submission_polling_intervals: Vec<String>,
    pub execution_polling_intervals: Vec<String>,
    /// Polling cadence once the execution time limit has elapsed
    pub execution_time_limit_polling_intervals: Vec<String>,
    pub directives: IndexMap<String, String>,
    /// For `custom` runners: templates with `{script}` / `{job_id}` holes
    pub submit_command_template: Option<String>,
    pub poll_command_template: Option<String>,
    pub kill_command_template: Option<String>,
    pub job_id_pattern: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawPlatformGroup {
    pub platforms: Vec<String>,
}

impl RawWorkflow {
    /// Parse from TOML text.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
