// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The resolved workflow configuration.
//!
//! Assembles raw file structs, inheritance, graph parsing, and point
//! arithmetic into the immutable object the scheduler runs from. A
//! reload builds a fresh one and diffs task definition hashes; tasks in
//! flight keep their old definition through an `Arc` snapshot.

use crate::error::WorkflowConfigError;
use crate::graph::{self, CompatMode, ParsedGraph, TriggerDef};
use crate::inherit;
use crate::platform::PlatformSet;
use crate::raw::{RawQueue, RawWorkflow};
use crate::taskdef::{TaskDef, TaskRuntime};
use indexmap::IndexMap;
use rota_core::duration::Duration;
use rota_core::outputs::OutputSet;
use rota_core::point::{Calendar, CyclePoint};
use rota_core::prereq::{Prereq, PrereqAtom};
use rota_core::recurrence::{Recurrence, RecurrenceContext};
use rota_core::task::TaskId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// One `[scheduling.graph]` entry, expanded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSection {
    pub recurrence: Recurrence,
    pub graph: ParsedGraph,
}

/// A task queue with a concurrency limit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueDef {
    pub limit: usize,
    pub members: Vec<String>,
}

/// The resolved, immutable workflow configuration.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub compat: CompatMode,
    /// `None` for integer cycling
    pub calendar: Option<Calendar>,
    pub utc_mode: bool,
    pub initial_point: CyclePoint,
    pub final_point: Option<CyclePoint>,
    pub stop_point: Option<CyclePoint>,
    pub runahead_limit: Duration,
    pub allow_implicit_tasks: bool,
    pub stall_timeout: Option<Duration>,
    pub abort_on_stall_timeout: bool,
    pub inactivity_timeout: Option<Duration>,
    pub abort_on_inactivity_timeout: bool,
    pub sections: Vec<GraphSection>,
    pub tasks: IndexMap<String, Arc<TaskDef>>,
    pub queues: IndexMap<String, QueueDef>,
    pub platforms: PlatformSet,
    /// sha256 of the definition text this config was built from
    pub source_hash: String,
}

impl WorkflowConfig {
    /// Load from a definition file. A legacy `suite.rc` name selects
    /// back-compat semantics; `flow.toml` is current.
    pub fn load(path: &Path) -> Result<Self, WorkflowConfigError> {
        let compat = match path.file_name().and_then(|n| n.to_str()) {
            Some("suite.rc") => CompatMode::BackCompat,
            _ => CompatMode::Current,
        };
        let content = std::fs::read_to_string(path).map_err(|e| WorkflowConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse_str(&content, compat)
    }

    /// Parse and fully resolve a definition from text.
    pub fn parse_str(content: &str, compat: CompatMode) -> Result<Self, WorkflowConfigError> {
        let raw = RawWorkflow::parse(content)?;

        let calendar = match raw.scheduling.cycling_mode.as_deref() {
            Some("integer") => None,
            None | Some("gregorian") => Some(Calendar::Gregorian),
            Some("360day") => Some(Calendar::Day360),
            Some("365day") => Some(Calendar::Day365),
            Some(other) => {
                return Err(WorkflowConfigError::Invalid {
                    location: "scheduling.cycling_mode".to_string(),
                    message: format!("unknown cycling mode `{other}`"),
                })
            }
        };

        if raw.scheduling.initial_cycle_point.is_empty() {
            return Err(WorkflowConfigError::Invalid {
                location: "scheduling.initial_cycle_point".to_string(),
                message: "required".to_string(),
            });
        }
        let initial_point = CyclePoint::parse(&raw.scheduling.initial_cycle_point, calendar)?;
        let final_point = raw
            .scheduling
            .final_cycle_point
            .as_deref()
            .map(|p| CyclePoint::parse(p, calendar))
            .transpose()?;

        // A stop point beyond the final point is clamped with a warning
        let stop_point = match raw
            .scheduling
            .stop_after_cycle_point
            .as_deref()
            .map(|p| CyclePoint::parse(p, calendar))
            .transpose()?
        {
            Some(stop) => match &final_point {
                Some(fcp) if stop.try_cmp(fcp)? == Ordering::Greater => {
                    tracing::warn!(
                        stop = %stop,
                        final_point = %fcp,
                        "stop cycle point is beyond the final cycle point, clamping"
                    );
                    Some(*fcp)
                }
                _ => Some(stop),
            },
            None => None,
        };

        // Graph sections
        let ctx = RecurrenceContext {
            calendar,
            initial: initial_point,
            final_point,
        };
        let mut sections = Vec::new();
        for (recurrence_expr, graph_text) in &raw.scheduling.graph {
            let recurrence = Recurrence::parse(recurrence_expr, &ctx)?;
            let graph = graph::parse_graph(graph_text, compat)?;
            sections.push(GraphSection { recurrence, graph });
        }
        if sections.is_empty() {
            return Err(WorkflowConfigError::Invalid {
                location: "scheduling.graph".to_string(),
                message: "at least one graph section is required".to_string(),
            });
        }

        // Runtime inheritance
        let parents: HashMap<String, Vec<String>> = raw
            .runtime
            .iter()
            .map(|(name, r)| {
                let mut inherit = r.inherit.clone();
                if inherit.is_empty() && name != "root" && raw.runtime.contains_key("root") {
                    inherit.push("root".to_string());
                }
                (name.clone(), inherit)
            })
            .collect();
        for (name, r) in &raw.runtime {
            for parent in &r.inherit {
                if !raw.runtime.contains_key(parent) {
                    return Err(WorkflowConfigError::Invalid {
                        location: format!("runtime.{name}.inherit"),
                        message: format!("unknown parent namespace `{parent}`"),
                    });
                }
            }
        }

        // Task definitions: every graph task, resolved through the MRO
        let allow_implicit = raw.scheduler.allow_implicit_tasks;
        let mut tasks: IndexMap<String, Arc<TaskDef>> = IndexMap::new();
        let mut graph_tasks: Vec<String> = Vec::new();
        for section in &sections {
            for task in &section.graph.tasks {
                if !graph_tasks.contains(task) {
                    graph_tasks.push(task.clone());
                }
            }
        }
        graph_tasks.sort();

        for name in &graph_tasks {
            if !raw.runtime.contains_key(name) && !allow_implicit {
                return Err(WorkflowConfigError::UndefinedTask(name.clone()));
            }
            let mro = if raw.runtime.contains_key(name) {
                inherit::linearize(name, &parents)?
            } else {
                vec![name.clone()]
            };
            let runtime = TaskRuntime::from_mro(&mro, &raw.runtime, &format!("runtime.{name}"))?;

            let section_idxs: Vec<usize> = sections
                .iter()
                .enumerate()
                .filter(|(_, s)| s.graph.tasks.contains(name))
                .map(|(i, _)| i)
                .collect();

            let outputs = build_outputs(name, &runtime, &sections);

            tasks.insert(
                name.clone(),
                Arc::new(TaskDef {
                    name: name.clone(),
                    sections: section_idxs,
                    outputs,
                    runtime,
                }),
            );
        }

        let runahead_limit = match &raw.scheduling.runahead_limit {
            Some(limit) => Duration::parse(limit)?,
            None => default_runahead(calendar, &sections),
        };

        let parse_timeout = |raw: &Option<String>, what: &str| -> Result<Option<Duration>, WorkflowConfigError> {
            raw.as_deref()
                .map(|d| {
                    Duration::parse(d).map_err(|e| WorkflowConfigError::Invalid {
                        location: format!("scheduler.{what}"),
                        message: e.to_string(),
                    })
                })
                .transpose()
        };

        let config = Self {
            compat,
            calendar,
            utc_mode: raw.scheduler.utc_mode,
            initial_point,
            final_point,
            stop_point,
            runahead_limit,
            allow_implicit_tasks: allow_implicit,
            stall_timeout: parse_timeout(&raw.scheduler.stall_timeout, "stall_timeout")?,
            abort_on_stall_timeout: raw.scheduler.abort_on_stall_timeout,
            inactivity_timeout: parse_timeout(
                &raw.scheduler.inactivity_timeout,
                "inactivity_timeout",
            )?,
            abort_on_inactivity_timeout: raw.scheduler.abort_on_inactivity_timeout,
            sections,
            tasks,
            queues: resolve_queues(&raw.scheduling.queues),
            platforms: PlatformSet::new(raw.platforms, raw.platform_groups),
            source_hash: sha256_hex(content),
        };
        config.warn_unreachable();
        Ok(config)
    }

    /// Prerequisites of a task instance, offsets resolved to absolute
    /// points. References before the initial point are treated satisfied
    /// (the disjunct is dropped; a clause emptied this way is dropped too).
    pub fn prereqs_for(
        &self,
        task: &str,
        point: &CyclePoint,
    ) -> Result<Vec<Prereq>, WorkflowConfigError> {
        let Some(def) = self.tasks.get(task) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for &idx in &def.sections {
            let section = &self.sections[idx];
            if !section.recurrence.contains(point)? {
                continue;
            }
            let Some(triggers) = section.graph.triggers.get(task) else {
                continue;
            };
            for trigger in triggers {
                if let Some(prereq) = self.resolve_trigger(trigger, point)? {
                    out.push(prereq);
                }
            }
        }
        Ok(out)
    }

    fn resolve_trigger(
        &self,
        trigger: &TriggerDef,
        point: &CyclePoint,
    ) -> Result<Option<Prereq>, WorkflowConfigError> {
        let mut clauses = Vec::new();
        for clause in &trigger.clauses {
            let mut atoms = Vec::new();
            for r in clause {
                let atom_point = match &r.offset {
                    None => *point,
                    Some(offset) => point.add(offset)?,
                };
                // Pre-history references are satisfied by fiat
                if atom_point.try_cmp(&self.initial_point)? == Ordering::Less {
                    continue;
                }
                atoms.push(PrereqAtom::new(atom_point, r.task.clone(), r.output.clone()));
            }
            if !atoms.is_empty() {
                clauses.push(atoms);
            }
        }
        if clauses.is_empty() {
            // Entirely pre-history. A suicide trigger satisfied by fiat
            // would erase the task at spawn, so both kinds are dropped.
            return Ok(None);
        }
        Ok(Some(if trigger.suicide {
            Prereq::suicide(clauses)
        } else {
            Prereq::new(clauses)
        }))
    }

    /// True when the task has an instance at this point.
    pub fn is_on_sequence(&self, task: &str, point: &CyclePoint) -> Result<bool, WorkflowConfigError> {
        let Some(def) = self.tasks.get(task) else {
            return Ok(false);
        };
        for &idx in &def.sections {
            if self.sections[idx].recurrence.contains(point)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Earliest instance of the task at or after `bound`.
    pub fn first_point(
        &self,
        task: &str,
        bound: &CyclePoint,
    ) -> Result<Option<CyclePoint>, WorkflowConfigError> {
        let Some(def) = self.tasks.get(task) else {
            return Ok(None);
        };
        let mut best: Option<CyclePoint> = None;
        for &idx in &def.sections {
            if let Some(p) = self.sections[idx].recurrence.first_on_or_after(bound)? {
                best = Some(match best {
                    None => p,
                    Some(b) if p.try_cmp(&b)? == Ordering::Less => p,
                    Some(b) => b,
                });
            }
        }
        Ok(self.clip_to_bounds(best))
    }

    /// The task's next instance strictly after `after`.
    pub fn next_point(
        &self,
        task: &str,
        after: &CyclePoint,
    ) -> Result<Option<CyclePoint>, WorkflowConfigError> {
        let Some(def) = self.tasks.get(task) else {
            return Ok(None);
        };
        let mut best: Option<CyclePoint> = None;
        for &idx in &def.sections {
            if let Some(p) = self.sections[idx].recurrence.next_after(after)? {
                best = Some(match best {
                    None => p,
                    Some(b) if p.try_cmp(&b)? == Ordering::Less => p,
                    Some(b) => b,
                });
            }
        }
        Ok(self.clip_to_bounds(best))
    }

    fn clip_to_bounds(&self, point: Option<CyclePoint>) -> Option<CyclePoint> {
        let point = point?;
        let limit = self.stop_point.as_ref().or(self.final_point.as_ref());
        if let Some(limit) = limit {
            if matches!(point.try_cmp(limit), Ok(Ordering::Greater)) {
                return None;
            }
        }
        Some(point)
    }

    /// Downstream instances released when `task@point` completes `output`.
    ///
    /// Targets beyond the final (or stop) point resolve to never: they are
    /// simply absent from the result.
    pub fn spawn_targets(
        &self,
        task: &str,
        output: &str,
        point: &CyclePoint,
    ) -> Result<Vec<TaskId>, WorkflowConfigError> {
        let Some(def) = self.tasks.get(task) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for &idx in &def.sections {
            let section = &self.sections[idx];
            if !section.recurrence.contains(point)? {
                continue;
            }
            for edge in &section.graph.spawn {
                if edge.from != task || edge.output != output {
                    continue;
                }
                let target_point = match &edge.offset {
                    None => *point,
                    Some(offset) => point.add(offset)?,
                };
                if self.clip_to_bounds(Some(target_point)).is_none() {
                    continue;
                }
                if !self.is_on_sequence(&edge.to, &target_point)? {
                    continue;
                }
                let id = TaskId::new(edge.to.clone(), target_point);
                if !out.contains(&id) {
                    out.push(id);
                }
            }
        }
        Ok(out)
    }

    /// True when the task instance has no trigger clauses at this point
    /// (a start task: spawned to the runahead limit, not on demand).
    pub fn is_parentless(&self, task: &str, point: &CyclePoint) -> Result<bool, WorkflowConfigError> {
        Ok(self.prereqs_for(task, point)?.is_empty())
    }

    /// The queue a task belongs to, with the implicit unlimited default.
    pub fn queue_for(&self, task: &str) -> Option<(&str, &QueueDef)> {
        self.queues
            .iter()
            .find(|(_, q)| q.members.iter().any(|m| m == task))
            .map(|(name, q)| (name.as_str(), q))
    }

    /// The smallest recurrence period in the graph. Used to interpret an
    /// integer runahead limit (`P2` = two cycles) under date-time cycling.
    pub fn smallest_period(&self) -> Duration {
        default_runahead(self.calendar, &self.sections)
    }

    /// Per-task definition hashes, for reload diffing.
    pub fn task_hashes(&self) -> HashMap<String, String> {
        self.tasks
            .iter()
            .map(|(name, def)| {
                let canonical = serde_json::to_string(def.as_ref()).unwrap_or_default();
                (name.clone(), sha256_hex(&canonical))
            })
            .collect()
    }

    /// Validate a reload against the running config.
    ///
    /// Removing a task definition that the running graph still references
    /// would retrospectively require unspawned prerequisites, so it is
    /// rejected.
    pub fn check_reload(&self, new: &WorkflowConfig) -> Result<(), WorkflowConfigError> {
        for name in self.tasks.keys() {
            if !new.tasks.contains_key(name) {
                return Err(WorkflowConfigError::ReloadRejected(format!(
                    "task `{name}` was removed but may still be referenced by the running graph"
                )));
            }
        }
        if (self.calendar.is_none()) != (new.calendar.is_none()) {
            return Err(WorkflowConfigError::ReloadRejected(
                "cycling flavour cannot change at reload".to_string(),
            ));
        }
        Ok(())
    }

    /// Warn about tasks whose only triggers reference points that can
    /// never exist (forward offsets past the final point).
    fn warn_unreachable(&self) {
        let Some(final_point) = &self.final_point else {
            return;
        };
        for (name, def) in &self.tasks {
            for &idx in &def.sections {
                let section = &self.sections[idx];
                let Some(triggers) = section.graph.triggers.get(name) else {
                    continue;
                };
                let Ok(Some(first)) = section.recurrence.first_on_or_after(&self.initial_point)
                else {
                    continue;
                };
                for trigger in triggers {
                    let all_never = !trigger.clauses.is_empty()
                        && trigger.clauses.iter().flatten().all(|r| {
                            match r.offset.as_ref().map(|o| first.add(o)) {
                                Some(Ok(p)) => {
                                    matches!(p.try_cmp(final_point), Ok(Ordering::Greater))
                                }
                                _ => false,
                            }
                        });
                    if all_never {
                        tracing::warn!(
                            task = %name,
                            "trigger references resolve to points beyond the final cycle \
                             point; task is unreachable"
                        );
                    }
                }
            }
        }
    }
}

/// Build the effective output set for one task.
///
/// Starts from the standard outputs, declares customs from the runtime,
/// then applies graph references: a referenced output is required unless
/// marked optional; requiring one of a terminal pair drops the implicit
/// requirement on the other.
fn build_outputs(name: &str, runtime: &TaskRuntime, sections: &[GraphSection]) -> OutputSet {
    use rota_core::outputs::{OUT_FAILED, OUT_SUBMITTED, OUT_SUBMIT_FAILED, OUT_SUCCEEDED};

    let mut outputs = OutputSet::standard();
    for (output, message) in &runtime.outputs {
        outputs.declare(output, message, false);
    }

    for section in sections {
        for (task, output) in &section.graph.optional_outputs {
            if task == name {
                outputs.set_required(output, false);
            }
        }
    }
    for section in sections {
        for (task, output) in &section.graph.required_outputs {
            if task != name {
                continue;
            }
            outputs.set_required(output, true);
            if output == OUT_FAILED {
                outputs.set_required(OUT_SUCCEEDED, false);
            }
            if output == OUT_SUBMIT_FAILED {
                outputs.set_required(OUT_SUBMITTED, false);
            }
        }
    }
    outputs
}

/// Default runahead: `P1` for integer cycling, one cycle of the smallest
/// period otherwise.
fn default_runahead(calendar: Option<Calendar>, sections: &[GraphSection]) -> Duration {
    match calendar {
        None => Duration::Integer(1),
        Some(_) => {
            let mut smallest: Option<(Duration, i64)> = None;
            for section in sections {
                let period = section.recurrence.period;
                let width = match period {
                    // Nominal months approximate to 30 days for comparison
                    Duration::Iso(iso) => iso.nominal_months() * 30 * 86_400 + iso.fixed_seconds(),
                    Duration::Integer(_) => 0,
                };
                if width > 0 && smallest.map(|(_, w)| width < w).unwrap_or(true) {
                    smallest = Some((period, width));
                }
            }
            smallest.map(|(p, _)| p).unwrap_or(Duration::Iso(
                rota_core::duration::IsoDuration {
                    days: 1,
                    ..Default::default()
                },
            ))
        }
    }
}

fn resolve_queues(raw: &IndexMap<String, RawQueue>) -> IndexMap<String, QueueDef> {
    raw.iter()
        .map(|(name, q)| {
            (
                name.clone(),
                QueueDef {
                    limit: q.limit,
                    members: q.members.clone(),
                },
            )
        })
        .collect()
}

fn sha256_hex(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    format!("{digest:x}")
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
