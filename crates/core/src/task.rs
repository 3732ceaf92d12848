// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task identity and the job state machine.

use crate::point::CyclePoint;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// States a task instance moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    /// Prerequisites not yet satisfied, or retrying
    Waiting,
    /// Job script being rendered and transferred
    Preparing,
    /// Accepted by the batch system
    Submitted,
    /// Job reported started
    Running,
    /// Terminal success
    Succeeded,
    /// Terminal failure (retries exhausted)
    Failed,
    /// Batch system rejected the submission (retries exhausted)
    SubmitFailed,
    /// Passed its expiry point without running
    Expired,
}

impl TaskState {
    /// Job has reached a terminal state for this run.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::SubmitFailed | TaskState::Expired
        )
    }

    /// Job is in flight: preparing, queued, or running.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TaskState::Preparing | TaskState::Submitted | TaskState::Running
        )
    }

    /// All states, for status displays and DB round-trips.
    pub fn all() -> &'static [TaskState] {
        &[
            TaskState::Waiting,
            TaskState::Preparing,
            TaskState::Submitted,
            TaskState::Running,
            TaskState::Succeeded,
            TaskState::Failed,
            TaskState::SubmitFailed,
            TaskState::Expired,
        ]
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Waiting => "waiting",
            TaskState::Preparing => "preparing",
            TaskState::Submitted => "submitted",
            TaskState::Running => "running",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
            TaskState::SubmitFailed => "submit-failed",
            TaskState::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

impl FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(TaskState::Waiting),
            "preparing" => Ok(TaskState::Preparing),
            "submitted" => Ok(TaskState::Submitted),
            "running" => Ok(TaskState::Running),
            "succeeded" => Ok(TaskState::Succeeded),
            "failed" => Ok(TaskState::Failed),
            "submit-failed" => Ok(TaskState::SubmitFailed),
            "expired" => Ok(TaskState::Expired),
            other => Err(format!("unknown task state: {other}")),
        }
    }
}

/// Identity of a task instance: a task name at a cycle point.
///
/// Displays as `point/name`, the form used in logs, job paths, and the
/// control surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId {
    pub name: String,
    pub point: CyclePoint,
}

impl TaskId {
    pub fn new(name: impl Into<String>, point: CyclePoint) -> Self {
        Self {
            name: name.into(),
            point,
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.point, self.name)
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
