// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prerequisite sets: conjunctions of disjunctions over upstream outputs.

use crate::point::CyclePoint;
use crate::task::TaskId;
use serde::{Deserialize, Serialize};

/// One upstream reference: a specific output of a task at a cycle point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrereqAtom {
    pub point: CyclePoint,
    pub task: String,
    pub output: String,
}

impl PrereqAtom {
    pub fn new(point: CyclePoint, task: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            point,
            task: task.into(),
            output: output.into(),
        }
    }

    pub fn task_id(&self) -> TaskId {
        TaskId::new(self.task.clone(), self.point)
    }
}

/// A prerequisite: every clause must have at least one satisfied atom.
///
/// Stored canonically as `clauses: Vec<Vec<(atom, satisfied)>>` where the
/// inner vectors are disjunctions. A suicide prerequisite, once satisfied,
/// removes its owner from the pool instead of releasing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Prereq {
    clauses: Vec<Vec<(PrereqAtom, bool)>>,
    #[serde(default)]
    pub suicide: bool,
}

impl Prereq {
    pub fn new(clauses: Vec<Vec<PrereqAtom>>) -> Self {
        Self {
            clauses: clauses
                .into_iter()
                .map(|c| c.into_iter().map(|a| (a, false)).collect())
                .collect(),
            suicide: false,
        }
    }

    pub fn suicide(clauses: Vec<Vec<PrereqAtom>>) -> Self {
        let mut p = Self::new(clauses);
        p.suicide = true;
        p
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Mark matching atoms satisfied. Returns whether the whole
    /// conjunction is now satisfied.
    pub fn satisfy(&mut self, atom: &PrereqAtom) -> bool {
        for clause in &mut self.clauses {
            for (a, done) in clause.iter_mut() {
                if a == atom {
                    *done = true;
                }
            }
        }
        self.is_satisfied()
    }

    /// Force-satisfy every atom (operator `set --pre=all`).
    pub fn satisfy_all(&mut self) {
        for clause in &mut self.clauses {
            for (_, done) in clause.iter_mut() {
                *done = true;
            }
        }
    }

    /// O(clauses): each clause needs one satisfied atom.
    pub fn is_satisfied(&self) -> bool {
        self.clauses
            .iter()
            .all(|clause| clause.iter().any(|(_, done)| *done))
    }

    /// Atoms not yet satisfied, for diagnostics and persistence.
    pub fn unsatisfied(&self) -> impl Iterator<Item = &PrereqAtom> {
        self.clauses
            .iter()
            .flatten()
            .filter(|(_, done)| !done)
            .map(|(a, _)| a)
    }

    /// All atoms with their satisfaction state.
    pub fn atoms(&self) -> impl Iterator<Item = (&PrereqAtom, bool)> {
        self.clauses.iter().flatten().map(|(a, d)| (a, *d))
    }

    /// Compact DB encoding: an atom table plus clause index lists.
    ///
    /// Each atom appears once and clauses reference it by a short integer
    /// alias, bounding row size however often an atom is shared.
    pub fn to_db_json(&self) -> serde_json::Value {
        let mut table: Vec<&PrereqAtom> = Vec::new();
        let mut clause_idx: Vec<Vec<(usize, bool)>> = Vec::new();
        for clause in &self.clauses {
            let mut idx = Vec::new();
            for (atom, done) in clause {
                let pos = match table.iter().position(|a| *a == atom) {
                    Some(pos) => pos,
                    None => {
                        table.push(atom);
                        table.len() - 1
                    }
                };
                idx.push((pos, *done));
            }
            clause_idx.push(idx);
        }
        serde_json::json!({
            "atoms": table,
            "clauses": clause_idx,
            "suicide": self.suicide,
        })
    }

    /// Inverse of [`Prereq::to_db_json`].
    pub fn from_db_json(value: &serde_json::Value) -> Option<Self> {
        let atoms: Vec<PrereqAtom> = serde_json::from_value(value.get("atoms")?.clone()).ok()?;
        let clause_idx: Vec<Vec<(usize, bool)>> =
            serde_json::from_value(value.get("clauses")?.clone()).ok()?;
        let suicide = value.get("suicide").and_then(|v| v.as_bool()).unwrap_or(false);
        let mut clauses = Vec::new();
        for idx in clause_idx {
            let mut clause = Vec::new();
            for (pos, done) in idx {
                clause.push((atoms.get(pos)?.clone(), done));
            }
            clauses.push(clause);
        }
        Some(Self { clauses, suicide })
    }
}

#[cfg(test)]
#[path = "prereq_tests.rs"]
mod tests;
