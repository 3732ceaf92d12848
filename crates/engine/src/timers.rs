// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timer management for retries, polling, and watchdogs.

use rota_core::task::TaskId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// What a timer does when it fires.
#[derive(Debug, Clone, PartialEq)]
pub enum TimerKind {
    /// Release a task from its execution-retry wait
    ExecutionRetry { task: TaskId },
    /// Release a task from its submission-retry wait
    SubmissionRetry { task: TaskId },
    /// Poll a job's batch status
    Poll { task: TaskId, submit_num: u32 },
    /// The job's execution time limit (plus tolerance) has elapsed
    ExecutionTimeout { task: TaskId, submit_num: u32 },
    /// The workflow has been stalled for the configured timeout
    Stall,
    /// No activity at all for the configured timeout
    Inactivity,
}

impl TimerKind {
    /// Stable key: one timer of each kind per subject.
    pub fn key(&self) -> String {
        match self {
            TimerKind::ExecutionRetry { task } => format!("retry/{task}"),
            TimerKind::SubmissionRetry { task } => format!("sub-retry/{task}"),
            TimerKind::Poll { task, submit_num } => format!("poll/{task}/{submit_num:02}"),
            TimerKind::ExecutionTimeout { task, submit_num } => {
                format!("timeout/{task}/{submit_num:02}")
            }
            TimerKind::Stall => "stall".to_string(),
            TimerKind::Inactivity => "inactivity".to_string(),
        }
    }
}

/// Manages timers for the scheduler loop.
#[derive(Debug, Default)]
pub struct Timers {
    timers: HashMap<String, (Instant, TimerKind)>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or reset) a timer.
    pub fn set(&mut self, kind: TimerKind, delay: Duration, now: Instant) {
        self.timers.insert(kind.key(), (now + delay, kind));
    }

    /// Cancel a timer.
    pub fn cancel(&mut self, kind: &TimerKind) {
        self.timers.remove(&kind.key());
    }

    /// Cancel all timers for one task instance.
    pub fn cancel_task(&mut self, task: &TaskId) {
        let retry = format!("retry/{task}");
        let sub_retry = format!("sub-retry/{task}");
        let poll = format!("poll/{task}/");
        let timeout = format!("timeout/{task}/");
        self.timers.retain(|key, _| {
            key != &retry
                && key != &sub_retry
                && !key.starts_with(&poll)
                && !key.starts_with(&timeout)
        });
    }

    pub fn has(&self, kind: &TimerKind) -> bool {
        self.timers.contains_key(&kind.key())
    }

    /// Remove and return all timers that have fired.
    pub fn fired(&mut self, now: Instant) -> Vec<TimerKind> {
        let due: Vec<String> = self
            .timers
            .iter()
            .filter(|(_, (fires_at, _))| *fires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        let mut kinds = Vec::new();
        for key in due {
            if let Some((_, kind)) = self.timers.remove(&key) {
                kinds.push(kind);
            }
        }
        kinds
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().map(|(at, _)| *at).min()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

#[cfg(test)]
#[path = "timers_tests.rs"]
mod tests;
