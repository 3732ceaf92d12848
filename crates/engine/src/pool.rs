// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The task pool.
//!
//! Proxies are spawned on demand: parentless tasks out to the runahead
//! limit, everything else when an upstream output references it, plus
//! operator triggers. The pool never materializes the whole graph.
//!
//! Every mutation queues [`DbOp`]s; the scheduler drains and commits them
//! once per tick so a crash recovers the last fully-committed tick.

use crate::error::EngineError;
use crate::proxy::TaskProxy;
use rota_config::WorkflowConfig;
use rota_core::duration::Duration;
use rota_core::flow::{FlowSet, FlowSpec};
use rota_core::point::CyclePoint;
use rota_core::prereq::PrereqAtom;
use rota_core::task::{TaskId, TaskState};
use rota_storage::DbOp;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// The set of currently-active task proxies.
pub struct TaskPool {
    config: Arc<WorkflowConfig>,
    tasks: HashMap<TaskId, TaskProxy>,
    /// Flows that have ever spawned each instance, so completed tasks are
    /// not respawned within a flow
    spawned_flows: HashMap<TaskId, FlowSet>,
    /// Flows currently propagating through the graph
    active_flows: FlowSet,
    max_flow: u32,
    pending_ops: Vec<DbOp>,
    /// Wall-clock stamp applied to queued ops, set once per tick
    now: String,
}

impl TaskPool {
    pub fn new(config: Arc<WorkflowConfig>) -> Self {
        Self {
            config,
            tasks: HashMap::new(),
            spawned_flows: HashMap::new(),
            active_flows: FlowSet::single(1),
            max_flow: 1,
            pending_ops: Vec::new(),
            now: String::new(),
        }
    }

    /// Swap in a reloaded config. In-flight proxies keep their `Arc`'d
    /// definitions; future spawns use the new ones.
    pub fn set_config(&mut self, config: Arc<WorkflowConfig>) {
        self.config = config;
    }

    pub fn config(&self) -> &Arc<WorkflowConfig> {
        &self.config
    }

    /// Set the wall-clock stamp used for this tick's DB ops.
    pub fn set_now(&mut self, stamp: impl Into<String>) {
        self.now = stamp.into();
    }

    /// Record the first flow at cold start.
    pub fn start_flow(&mut self, description: &str) {
        self.pending_ops.push(DbOp::AddFlow {
            flow_num: self.max_flow,
            start_time: self.now.clone(),
            description: description.to_string(),
        });
    }

    // --- spawning -------------------------------------------------------

    /// Spawn parentless tasks out to the runahead limit.
    ///
    /// Called every tick; spawning is idempotent per (instance, flow).
    pub fn spawn_parentless(&mut self) -> Result<(), EngineError> {
        let Some(limit) = self.runahead_point()? else {
            return Ok(());
        };
        let names: Vec<String> = self.config.tasks.keys().cloned().collect();
        for name in names {
            let mut point = self.config.first_point(&name, &self.config.initial_point)?;
            while let Some(p) = point {
                if p.try_cmp(&limit)? == Ordering::Greater {
                    break;
                }
                if self.config.is_parentless(&name, &p)? {
                    self.spawn(&name, &p, self.active_flows.clone())?;
                }
                point = self.config.next_point(&name, &p)?;
            }
        }
        Ok(())
    }

    /// Spawn one instance in the given flows, merging on collision.
    ///
    /// Returns true if a new proxy was created or an existing one gained
    /// flow membership.
    pub fn spawn(
        &mut self,
        name: &str,
        point: &CyclePoint,
        flows: FlowSet,
    ) -> Result<bool, EngineError> {
        let id = TaskId::new(name, *point);

        if !self.config.is_on_sequence(name, point)? {
            return Ok(false);
        }

        // Flows that have not yet spawned this instance
        let fresh = {
            let seen = self.spawned_flows.entry(id.clone()).or_default();
            let fresh = flows.difference(seen);
            seen.merge(&fresh);
            fresh
        };

        if let Some(proxy) = self.tasks.get_mut(&id) {
            if fresh.is_empty() {
                return Ok(false);
            }
            // Flows meet: merge, run once, credit every member flow
            proxy.flows.merge(&fresh);
            let (pool_op, state_op) = pool_rows(proxy, &self.now);
            self.pending_ops.push(pool_op);
            self.pending_ops.push(state_op);
            tracing::info!(task = %id, flows = %fresh, "merged flows into existing task");
            return Ok(true);
        }

        if fresh.is_empty() && !flows.is_empty() {
            // Every requested flow already ran this instance
            return Ok(false);
        }

        let def = self
            .tasks_def(name)
            .ok_or_else(|| EngineError::UnknownTask(name.to_string()))?;
        let prereqs = self.config.prereqs_for(name, point)?;
        let proxy = TaskProxy::new(def, *point, flows, prereqs);

        tracing::info!(task = %id, flows = %proxy.flows, "spawned task");
        let (pool_op, state_op) = pool_rows(&proxy, &self.now);
        self.pending_ops.push(pool_op);
        self.pending_ops.push(state_op);
        self.pending_ops.push(prereq_op(&proxy));
        self.tasks.insert(id, proxy);
        Ok(true)
    }

    fn tasks_def(&self, name: &str) -> Option<Arc<rota_config::TaskDef>> {
        self.config.tasks.get(name).cloned()
    }

    // --- output propagation ---------------------------------------------

    /// Record a completed output and propagate it: spawn downstream
    /// instances, satisfy prerequisites, apply suicide removals.
    ///
    /// Returns the instances removed by satisfied suicide triggers.
    pub fn apply_output(
        &mut self,
        id: &TaskId,
        output: &str,
    ) -> Result<Vec<TaskId>, EngineError> {
        let Some(proxy) = self.tasks.get_mut(id) else {
            return Ok(Vec::new());
        };
        if !proxy.outputs.emit(output) {
            return Ok(Vec::new());
        }
        let flows = proxy.flows.clone();
        let completed: Vec<String> = proxy.outputs.completed().map(str::to_string).collect();
        self.pending_ops.push(DbOp::SetOutputs {
            cycle: id.point.to_string(),
            name: id.name.clone(),
            flows: flows.to_db_string(),
            outputs: serde_json::to_string(&completed).unwrap_or_default(),
        });

        // Flow-less instances run but propagate nothing
        if flows.is_empty() {
            return Ok(Vec::new());
        }

        // Spawn-on-demand: materialize the downstream instances this
        // output releases, in the same flows
        for target in self.config.spawn_targets(&id.name, output, &id.point)? {
            self.spawn(&target.name, &target.point, flows.clone())?;
        }

        // Satisfy prerequisites across the pool
        let atom = PrereqAtom::new(id.point, id.name.clone(), output);
        let mut removed = Vec::new();
        let mut changed = Vec::new();
        for (other_id, other) in self.tasks.iter_mut() {
            if other_id == id || !other.flows.intersects(&flows) {
                continue;
            }
            if other.satisfy_atom(&atom) {
                changed.push(other_id.clone());
            }
            if other.suicide_satisfied() {
                removed.push(other_id.clone());
            }
        }
        for other_id in &changed {
            let op = self.tasks.get(other_id).map(prereq_op);
            if let Some(op) = op {
                self.pending_ops.push(op);
            }
        }
        for dead in &removed {
            tracing::info!(task = %dead, "suicide trigger satisfied, removing task");
            self.remove(dead);
        }
        Ok(removed)
    }

    // --- ready selection ------------------------------------------------

    /// Tasks runnable this tick: waiting, not held, prerequisites
    /// satisfied, no pending retry, inside the runahead window, and
    /// within their queue's limit.
    pub fn ready_tasks(&self) -> Result<Vec<TaskId>, EngineError> {
        let Some(limit) = self.runahead_point()? else {
            return Ok(Vec::new());
        };

        // Active members per queue
        let mut queue_active: HashMap<&str, usize> = HashMap::new();
        for proxy in self.tasks.values() {
            if proxy.state.is_active() {
                if let Some((queue, _)) = self.config.queue_for(proxy.name()) {
                    *queue_active.entry(queue).or_default() += 1;
                }
            }
        }

        let mut ready = Vec::new();
        let mut ids: Vec<&TaskId> = self.tasks.keys().collect();
        ids.sort_by(|a, b| {
            a.point
                .partial_cmp(&b.point)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });

        for id in ids {
            let Some(proxy) = self.tasks.get(id) else {
                continue;
            };
            if !proxy.is_ready() {
                continue;
            }
            if id.point.try_cmp(&limit)? == Ordering::Greater {
                continue;
            }
            if let Some((queue, def)) = self.config.queue_for(proxy.name()) {
                if def.limit > 0 {
                    let active = queue_active.entry(queue).or_default();
                    if *active >= def.limit {
                        continue;
                    }
                    *active += 1;
                }
            }
            ready.push(id.clone());
        }
        Ok(ready)
    }

    /// The highest point allowed in the pool:
    /// `min(unfinished) + runahead_limit`.
    pub fn runahead_point(&self) -> Result<Option<CyclePoint>, EngineError> {
        let back_compat = self.config.compat.is_back_compat();
        let mut base: Option<CyclePoint> = None;
        for proxy in self.tasks.values() {
            if !proxy.is_unfinished(back_compat) {
                continue;
            }
            let p = *proxy.point();
            base = Some(match base {
                None => p,
                Some(b) if p.try_cmp(&b)? == Ordering::Less => p,
                Some(b) => b,
            });
        }
        let base = base.unwrap_or(self.config.initial_point);

        let limit = match (&self.config.runahead_limit, self.config.calendar) {
            // Integer limit under date-time cycling counts cycles of the
            // smallest period
            (Duration::Integer(n), Some(_)) => {
                let step = self.config.smallest_period();
                let mut p = base;
                for _ in 0..*n {
                    p = p.add(&step)?;
                }
                p
            }
            (limit, _) => base.add(limit)?,
        };
        Ok(Some(limit))
    }

    // --- operator commands ----------------------------------------------

    pub fn hold(&mut self, id: &TaskId) -> Result<(), EngineError> {
        let now = self.now.clone();
        let proxy = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| EngineError::NotInPool(id.to_string()))?;
        proxy.is_held = true;
        let (pool_op, state_op) = pool_rows(proxy, &now);
        self.pending_ops.push(pool_op);
        self.pending_ops.push(state_op);
        Ok(())
    }

    pub fn release(&mut self, id: &TaskId) -> Result<(), EngineError> {
        let now = self.now.clone();
        let proxy = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| EngineError::NotInPool(id.to_string()))?;
        proxy.is_held = false;
        let (pool_op, state_op) = pool_rows(proxy, &now);
        self.pending_ops.push(pool_op);
        self.pending_ops.push(state_op);
        Ok(())
    }

    /// Force a task to run: spawn it if absent, satisfy its
    /// prerequisites, and mark it manually triggered.
    pub fn trigger(
        &mut self,
        name: &str,
        point: &CyclePoint,
        flow: &FlowSpec,
    ) -> Result<TaskId, EngineError> {
        if !self.config.tasks.contains_key(name) {
            return Err(EngineError::UnknownTask(name.to_string()));
        }
        let flows = match flow {
            FlowSpec::All => self.active_flows.clone(),
            FlowSpec::New => {
                self.max_flow += 1;
                let fresh = FlowSet::single(self.max_flow);
                self.active_flows.merge(&fresh);
                self.pending_ops.push(DbOp::AddFlow {
                    flow_num: self.max_flow,
                    start_time: self.now.clone(),
                    description: format!("manual trigger of {point}/{name}"),
                });
                fresh
            }
            FlowSpec::Numbers(nums) => {
                let mut set = FlowSet::default();
                for n in nums {
                    set.merge(&FlowSet::single(*n));
                }
                set
            }
            FlowSpec::None => FlowSet::default(),
        };

        let id = TaskId::new(name, *point);
        if !self.tasks.contains_key(&id) {
            // A trigger overrides spawn history for these flows
            if let Some(seen) = self.spawned_flows.get_mut(&id) {
                *seen = seen.difference(&flows);
            }
            self.spawn(name, point, flows.clone())?;
        }
        self.spawned_flows
            .entry(id.clone())
            .or_default()
            .merge(&flows);
        let now = self.now.clone();
        let proxy = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| EngineError::NotInPool(id.to_string()))?;
        proxy.flows.merge(&flows);
        proxy.satisfy_all();
        proxy.is_manual = true;
        proxy.retry_pending = false;
        let (pool_op, state_op) = pool_rows(proxy, &now);
        self.pending_ops.push(pool_op);
        self.pending_ops.push(state_op);
        Ok(id)
    }

    // --- lifecycle ------------------------------------------------------

    /// Record a state change, queueing the DB rows.
    pub fn set_state(&mut self, id: &TaskId, state: TaskState) -> Result<(), EngineError> {
        let now = self.now.clone();
        let proxy = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| EngineError::NotInPool(id.to_string()))?;
        if proxy.state != state {
            tracing::info!(task = %id, from = %proxy.state, to = %state, "task state change");
            proxy.state = state;
            let (pool_op, state_op) = pool_rows(proxy, &now);
            self.pending_ops.push(pool_op);
            self.pending_ops.push(state_op);
        }
        Ok(())
    }

    /// Remove finished-and-complete proxies. Incomplete finished tasks
    /// stay in the pool and feed stall detection.
    pub fn remove_completed(&mut self) -> Vec<TaskId> {
        let done: Vec<TaskId> = self
            .tasks
            .values()
            .filter(|p| p.is_finished() && p.is_complete())
            .map(|p| p.id.clone())
            .collect();
        for id in &done {
            self.remove(id);
        }
        done
    }

    fn remove(&mut self, id: &TaskId) {
        if self.tasks.remove(id).is_some() {
            self.pending_ops.push(DbOp::RemovePoolTask {
                cycle: id.point.to_string(),
                name: id.name.clone(),
            });
        }
    }

    /// Remove an instance regardless of state (operator `remove`).
    pub fn force_remove(&mut self, id: &TaskId) {
        self.remove(id);
    }

    // --- stall detection ------------------------------------------------

    /// Nothing running, nothing ready, nothing waiting on a retry, but
    /// the pool is not empty: the workflow cannot progress by itself.
    pub fn is_stalled(&self) -> bool {
        if self.tasks.is_empty() {
            return false;
        }
        let any_active = self
            .tasks
            .values()
            .any(|p| p.state.is_active() || p.retry_pending);
        if any_active {
            return false;
        }
        match self.ready_tasks() {
            Ok(ready) => ready.is_empty(),
            Err(_) => false,
        }
    }

    /// Finished tasks missing required outputs, for stall diagnostics.
    pub fn incomplete_tasks(&self) -> Vec<(TaskId, Vec<String>)> {
        self.tasks
            .values()
            .filter(|p| p.is_incomplete())
            .map(|p| {
                (
                    p.id.clone(),
                    p.outputs
                        .missing_required()
                        .into_iter()
                        .map(str::to_string)
                        .collect(),
                )
            })
            .collect()
    }

    // --- persistence ----------------------------------------------------

    /// Queue the standard rows after a proxy changed shape.
    pub fn push_task_rows(&mut self, id: &TaskId) {
        let now = self.now.clone();
        if let Some(proxy) = self.tasks.get(id) {
            let (pool_op, state_op) = pool_rows(proxy, &now);
            self.pending_ops.push(pool_op);
            self.pending_ops.push(state_op);
        }
    }

    /// Queue an arbitrary op alongside the pool's own.
    pub fn push_op(&mut self, op: DbOp) {
        self.pending_ops.push(op);
    }

    /// Take this tick's accumulated DB operations.
    pub fn drain_ops(&mut self) -> Vec<DbOp> {
        std::mem::take(&mut self.pending_ops)
    }

    /// Rebuild the pool from DB rows at restart.
    pub fn restore(
        &mut self,
        rows: &[rota_storage::PoolRow],
        outputs: &[rota_storage::OutputsRow],
        prereqs: &[rota_storage::PrereqRow],
        flows: &[u32],
    ) -> Result<(), EngineError> {
        for flow in flows {
            self.active_flows.merge(&FlowSet::single(*flow));
            self.max_flow = self.max_flow.max(*flow);
        }
        for row in rows {
            let point = CyclePoint::parse(&row.cycle, self.config.calendar)?;
            let Some(def) = self.tasks_def(&row.name) else {
                tracing::warn!(task = %row.name, "task in database has no definition, skipping");
                continue;
            };
            let flow_set = FlowSet::from_db_string(&row.flows);
            let id = TaskId::new(row.name.clone(), point);

            let stored_prereqs = prereqs
                .iter()
                .find(|p| p.cycle == row.cycle && p.name == row.name)
                .and_then(|p| {
                    let values: Vec<serde_json::Value> = serde_json::from_str(&p.prereqs).ok()?;
                    values
                        .iter()
                        .map(rota_core::prereq::Prereq::from_db_json)
                        .collect::<Option<Vec<_>>>()
                });
            let prereq_set = match stored_prereqs {
                Some(set) => set,
                None => self.config.prereqs_for(&row.name, &point)?,
            };

            let mut proxy = TaskProxy::new(def, point, flow_set.clone(), prereq_set);
            proxy.is_held = row.is_held;
            if let Ok(state) = row.status.parse() {
                proxy.state = state;
            }
            if let Some(out_row) = outputs
                .iter()
                .find(|o| o.cycle == row.cycle && o.name == row.name)
            {
                let completed: Vec<String> =
                    serde_json::from_str(&out_row.outputs).unwrap_or_default();
                proxy.outputs.restore(completed);
            }

            self.spawned_flows
                .entry(id.clone())
                .or_default()
                .merge(&flow_set);
            self.tasks.insert(id, proxy);
        }
        tracing::info!(tasks = self.tasks.len(), "restored task pool from database");
        Ok(())
    }

    // --- accessors ------------------------------------------------------

    pub fn get(&self, id: &TaskId) -> Option<&TaskProxy> {
        self.tasks.get(id)
    }

    pub fn get_mut(&mut self, id: &TaskId) -> Option<&mut TaskProxy> {
        self.tasks.get_mut(id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskProxy> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn max_flow(&self) -> u32 {
        self.max_flow
    }

    /// Flows currently propagating through the graph.
    pub fn active_flows(&self) -> FlowSet {
        self.active_flows.clone()
    }

    /// Instances matching a `point/name` selector (`*` matches all names).
    pub fn matching(&self, point: &CyclePoint, name: &str) -> Vec<TaskId> {
        self.tasks
            .keys()
            .filter(|id| id.point == *point && (name == "*" || id.name == name))
            .cloned()
            .collect()
    }
}

/// The task_prerequisites row for a proxy, alias-encoded JSON.
fn prereq_op(proxy: &TaskProxy) -> DbOp {
    let encoded: Vec<serde_json::Value> = proxy.prereqs.iter().map(|p| p.to_db_json()).collect();
    DbOp::SetPrereqs {
        cycle: proxy.id.point.to_string(),
        name: proxy.id.name.clone(),
        flows: proxy.flows.to_db_string(),
        prereqs: serde_json::to_string(&encoded).unwrap_or_default(),
    }
}

/// The task_pool and task_states rows for a proxy's current shape.
fn pool_rows(proxy: &TaskProxy, now: &str) -> (DbOp, DbOp) {
    (
        DbOp::UpsertPoolTask {
            cycle: proxy.id.point.to_string(),
            name: proxy.id.name.clone(),
            flows: proxy.flows.to_db_string(),
            status: proxy.state.to_string(),
            is_held: proxy.is_held,
        },
        DbOp::TaskState {
            cycle: proxy.id.point.to_string(),
            name: proxy.id.name.clone(),
            flows: proxy.flows.to_db_string(),
            submit_num: proxy.submit_num,
            status: proxy.state.to_string(),
            time: now.to_string(),
        },
    )
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
