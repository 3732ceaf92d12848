// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed events consumed by the scheduler loop.
//!
//! Nothing blocks inside a tick: platform commands run on spawned tasks
//! and deliver one of these over the event channel when they finish.

use crate::timers::TimerKind;
use rota_core::message::JobMessage;
use rota_core::task::TaskId;
use rota_platform::{PollStatus, SubmittedJob};

/// Outcome of an asynchronous submit attempt.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    Submitted(SubmittedJob),
    Failed {
        /// Connectivity exhaustion rather than a batch-system rejection
        connection: bool,
        detail: String,
    },
}

/// An event for the scheduler to apply on its next tick.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// A job status message (TCP intake, or poll pickup of `job.status`)
    Message {
        task: TaskId,
        submit_num: u32,
        message: JobMessage,
    },
    SubmitResult {
        task: TaskId,
        submit_num: u32,
        outcome: SubmitOutcome,
    },
    PollResult {
        task: TaskId,
        submit_num: u32,
        status: PollStatus,
    },
    KillResult {
        task: TaskId,
        submit_num: u32,
        ok: bool,
    },
    Timer(TimerKind),
}
