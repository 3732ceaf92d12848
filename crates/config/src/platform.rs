// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Platform resolution.
//!
//! A task's `platform` setting is matched against the `[platforms]` table,
//! bottom-up in declaration order, treating each entry name as a regex;
//! the first match wins. A platform group resolves to a concrete member by
//! random selection at job-submit time. Unknown names fail at submit, not
//! at validation, because platforms may live in site config unknown here.

use crate::error::PlatformLookupError;
use crate::raw::{RawPlatform, RawPlatformGroup};
use indexmap::IndexMap;
use rand::prelude::IndexedRandom;
use rota_core::duration::Duration;
use serde::{Deserialize, Serialize};

/// The batch system a platform submits through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobRunnerKind {
    #[default]
    Background,
    At,
    Slurm,
    Pbs,
    Lsf,
    Moab,
    Loadleveler,
    Custom,
}

impl JobRunnerKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "background" => Some(Self::Background),
            "at" => Some(Self::At),
            "slurm" => Some(Self::Slurm),
            "pbs" => Some(Self::Pbs),
            "lsf" => Some(Self::Lsf),
            "moab" => Some(Self::Moab),
            "loadleveler" => Some(Self::Loadleveler),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

/// How jobs report status back to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CommsMethod {
    /// Jobs message the scheduler over its TCP port
    #[default]
    Tcp,
    /// No callback; the scheduler polls the batch system
    Poll,
}

/// A fully resolved platform definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformDef {
    pub name: String,
    pub hosts: Vec<String>,
    pub job_runner: JobRunnerKind,
    pub install_target: String,
    pub ssh_command: String,
    pub comms: CommsMethod,
    pub submission_polling_intervals: Vec<Duration>,
    pub execution_polling_intervals: Vec<Duration>,
    pub execution_time_limit_polling_intervals: Vec<Duration>,
    pub directives: IndexMap<String, String>,
    pub submit_command_template: Option<String>,
    pub poll_command_template: Option<String>,
    pub kill_command_template: Option<String>,
    pub job_id_pattern: Option<String>,
}

impl PlatformDef {
    /// The implicit localhost platform used when nothing else matches
    /// `localhost` or an unset task platform.
    pub fn localhost() -> Self {
        Self {
            name: "localhost".to_string(),
            hosts: vec!["localhost".to_string()],
            job_runner: JobRunnerKind::Background,
            install_target: "localhost".to_string(),
            ssh_command: default_ssh_command(),
            comms: CommsMethod::Tcp,
            submission_polling_intervals: Vec::new(),
            execution_polling_intervals: Vec::new(),
            execution_time_limit_polling_intervals: Vec::new(),
            directives: IndexMap::new(),
            submit_command_template: None,
            poll_command_template: None,
            kill_command_template: None,
            job_id_pattern: None,
        }
    }

    pub fn is_local(&self) -> bool {
        self.hosts.iter().all(|h| h == "localhost")
    }

    fn from_raw(name: &str, raw: &RawPlatform) -> Result<Self, PlatformLookupError> {
        let job_runner = match &raw.job_runner {
            None => JobRunnerKind::Background,
            Some(kind) => JobRunnerKind::parse(kind)
                .ok_or_else(|| PlatformLookupError(format!("{name} (job runner `{kind}`)")))?,
        };
        let hosts = if raw.hosts.is_empty() {
            vec![name.to_string()]
        } else {
            raw.hosts.clone()
        };
        let parse_delays = |raw: &[String]| -> Vec<Duration> {
            raw.iter().filter_map(|d| Duration::parse(d).ok()).collect()
        };
        Ok(Self {
            name: name.to_string(),
            install_target: raw.install_target.clone().unwrap_or_else(|| {
                if hosts.iter().all(|h| h == "localhost") {
                    "localhost".to_string()
                } else {
                    name.to_string()
                }
            }),
            hosts,
            job_runner,
            ssh_command: raw.ssh_command.clone().unwrap_or_else(default_ssh_command),
            comms: match raw.communication_method.as_deref() {
                Some("poll") => CommsMethod::Poll,
                _ => CommsMethod::Tcp,
            },
            submission_polling_intervals: parse_delays(&raw.submission_polling_intervals),
            execution_polling_intervals: parse_delays(&raw.execution_polling_intervals),
            execution_time_limit_polling_intervals: parse_delays(
                &raw.execution_time_limit_polling_intervals,
            ),
            directives: raw.directives.clone(),
            submit_command_template: raw.submit_command_template.clone(),
            poll_command_template: raw.poll_command_template.clone(),
            kill_command_template: raw.kill_command_template.clone(),
            job_id_pattern: raw.job_id_pattern.clone(),
        })
    }
}

fn default_ssh_command() -> String {
    "ssh -oBatchMode=yes -oConnectTimeout=10".to_string()
}

/// The `[platforms]` and `[platform-groups]` tables, resolved on demand.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformSet {
    platforms: IndexMap<String, RawPlatform>,
    groups: IndexMap<String, RawPlatformGroup>,
}

impl PlatformSet {
    pub fn new(
        platforms: IndexMap<String, RawPlatform>,
        groups: IndexMap<String, RawPlatformGroup>,
    ) -> Self {
        Self { platforms, groups }
    }

    /// Resolve a task's platform setting to a concrete platform.
    ///
    /// Group names resolve first (random member selection), then platform
    /// names are matched bottom-up against the declaration order, each
    /// entry name treated as an anchored regex.
    pub fn resolve(&self, name: Option<&str>) -> Result<PlatformDef, PlatformLookupError> {
        let name = name.unwrap_or("localhost");

        if let Some(group) = self.groups.get(name) {
            let member = group
                .platforms
                .choose(&mut rand::rng())
                .ok_or_else(|| PlatformLookupError(format!("{name} (empty platform group)")))?;
            return self.resolve_platform(member);
        }

        self.resolve_platform(name)
    }

    fn resolve_platform(&self, name: &str) -> Result<PlatformDef, PlatformLookupError> {
        // Bottom-up: later definitions are more specific and win
        for (def_name, raw) in self.platforms.iter().rev() {
            if def_name == name {
                return PlatformDef::from_raw(def_name, raw);
            }
            let anchored = format!("^(?:{def_name})$");
            if let Ok(re) = regex::Regex::new(&anchored) {
                if re.is_match(name) {
                    let mut def = PlatformDef::from_raw(def_name, raw)?;
                    // A regex match keeps the requested name for job logs,
                    // but single-host defaults come from the request too.
                    def.name = name.to_string();
                    if raw.hosts.is_empty() {
                        def.hosts = vec![name.to_string()];
                    }
                    return Ok(def);
                }
            }
        }

        if name == "localhost" {
            return Ok(PlatformDef::localhost());
        }

        Err(PlatformLookupError(name.to_string()))
    }
}

#[cfg(test)]
#[path = "platform_tests.rs"]
mod tests;
