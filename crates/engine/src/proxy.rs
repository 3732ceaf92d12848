// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task proxies: live instances of a task at a cycle point.

use rota_config::TaskDef;
use rota_core::flow::FlowSet;
use rota_core::outputs::OutputSet;
use rota_core::point::CyclePoint;
use rota_core::prereq::{Prereq, PrereqAtom};
use rota_core::task::{TaskId, TaskState};
use rota_platform::SubmittedJob;
use std::sync::Arc;

/// A materialized task instance in the pool.
///
/// Holds everything the scheduler needs to decide whether the task can
/// run, what it still owes (required outputs), and where its current job
/// lives. The definition is an `Arc` snapshot so reloads never change a
/// task in flight.
#[derive(Debug, Clone)]
pub struct TaskProxy {
    pub def: Arc<TaskDef>,
    pub id: TaskId,
    pub flows: FlowSet,
    pub state: TaskState,
    pub outputs: OutputSet,
    pub prereqs: Vec<Prereq>,
    pub is_held: bool,
    /// Strictly monotonic per (cycle, name); 0 until first submission
    pub submit_num: u32,
    /// Execution attempts for the current run
    pub try_num: u32,
    /// Submission attempts for the current run
    pub sub_try_num: u32,
    /// Waiting out a retry delay; the ready selector skips it
    pub retry_pending: bool,
    /// Platform resolved at the latest submission
    pub platform_name: Option<String>,
    /// Handle on the current job, once submitted
    pub job: Option<SubmittedJob>,
    /// Spawned by an operator trigger rather than the graph
    pub is_manual: bool,
    /// Killed by an operator; the resulting failure is not retried
    pub killed: bool,
}

impl TaskProxy {
    pub fn new(def: Arc<TaskDef>, point: CyclePoint, flows: FlowSet, prereqs: Vec<Prereq>) -> Self {
        let id = TaskId::new(def.name.clone(), point);
        let outputs = def.output_set();
        Self {
            def,
            id,
            flows,
            state: TaskState::Waiting,
            outputs,
            prereqs,
            is_held: false,
            submit_num: 0,
            try_num: 0,
            sub_try_num: 0,
            retry_pending: false,
            platform_name: None,
            job: None,
            is_manual: false,
            killed: false,
        }
    }

    /// Every non-suicide prerequisite satisfied.
    pub fn prereqs_satisfied(&self) -> bool {
        self.prereqs
            .iter()
            .filter(|p| !p.suicide)
            .all(|p| p.is_satisfied())
    }

    /// A satisfied suicide prerequisite removes this task from the pool.
    pub fn suicide_satisfied(&self) -> bool {
        self.prereqs
            .iter()
            .any(|p| p.suicide && p.is_satisfied())
    }

    /// Feed one completed upstream output through the prerequisites.
    /// Returns true if anything changed.
    pub fn satisfy_atom(&mut self, atom: &PrereqAtom) -> bool {
        let before = self.satisfaction_key();
        for prereq in &mut self.prereqs {
            prereq.satisfy(atom);
        }
        before != self.satisfaction_key()
    }

    fn satisfaction_key(&self) -> Vec<bool> {
        self.prereqs
            .iter()
            .flat_map(|p| p.atoms().map(|(_, done)| done))
            .collect()
    }

    /// Force-satisfy everything (operator trigger).
    pub fn satisfy_all(&mut self) {
        for prereq in &mut self.prereqs {
            if !prereq.suicide {
                prereq.satisfy_all();
            }
        }
    }

    /// Runnable this tick, pool-level constraints aside.
    pub fn is_ready(&self) -> bool {
        self.state == TaskState::Waiting
            && !self.is_held
            && !self.retry_pending
            && self.prereqs_satisfied()
    }

    /// All required outputs emitted (or the task expired).
    pub fn is_complete(&self) -> bool {
        self.outputs.is_complete()
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    /// Finished without completing its required outputs.
    pub fn is_incomplete(&self) -> bool {
        self.is_finished() && !self.is_complete()
    }

    /// Counts toward the runahead base. In back-compat mode incomplete
    /// finished tasks are released from the calculation.
    pub fn is_unfinished(&self, back_compat: bool) -> bool {
        if self.is_finished() {
            !back_compat && !self.is_complete()
        } else {
            true
        }
    }

    /// Begin a new submission attempt. Returns the new submit number.
    pub fn next_submit(&mut self) -> u32 {
        self.submit_num += 1;
        self.sub_try_num += 1;
        self.state = TaskState::Preparing;
        self.retry_pending = false;
        self.job = None;
        self.submit_num
    }

    /// Begin a new execution attempt (after an execution retry).
    pub fn next_try(&mut self) {
        self.try_num += 1;
        self.sub_try_num = 0;
    }

    pub fn point(&self) -> &CyclePoint {
        &self.id.point
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }
}

#[cfg(test)]
#[path = "proxy_tests.rs"]
mod tests;
