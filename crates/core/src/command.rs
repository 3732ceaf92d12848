// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-surface commands, shared between the wire protocol and the
//! scheduler's command queue.

use crate::flow::FlowSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// How a stop request winds the scheduler down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StopMode {
    /// Wait for active jobs to finish
    #[default]
    Normal,
    /// Shut down without waiting for active jobs
    Now,
    /// Shut down immediately, skipping even event handlers
    NowNow,
    /// Kill active jobs, then shut down
    Kill,
}

/// A command from the control surface.
///
/// Task selectors are `point/name` strings; globs are resolved against
/// the pool by the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum Command {
    Pause,
    Resume,
    Stop {
        #[serde(default)]
        mode: StopMode,
    },
    Trigger {
        tasks: Vec<String>,
        #[serde(default)]
        flow: FlowSpec,
    },
    Hold {
        tasks: Vec<String>,
    },
    Release {
        tasks: Vec<String>,
    },
    /// Artificially complete outputs of a task (`set foo.1:succeeded`)
    Set {
        task: String,
        outputs: Vec<String>,
    },
    Kill {
        tasks: Vec<String>,
    },
    Poll {
        tasks: Vec<String>,
    },
    Reload,
    Broadcast {
        #[serde(default)]
        cycle_points: Vec<String>,
        #[serde(default)]
        namespaces: Vec<String>,
        #[serde(default)]
        settings: HashMap<String, String>,
        #[serde(default)]
        clear: bool,
        /// Expire broadcasts for points earlier than this
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expire: Option<String>,
    },
}

impl Command {
    /// Command name for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Stop { .. } => "stop",
            Command::Trigger { .. } => "trigger",
            Command::Hold { .. } => "hold",
            Command::Release { .. } => "release",
            Command::Set { .. } => "set",
            Command::Kill { .. } => "kill",
            Command::Poll { .. } => "poll",
            Command::Reload => "reload",
            Command::Broadcast { .. } => "broadcast",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
