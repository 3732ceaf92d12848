// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The state database.
//!
//! Cycle points are stored as text, variable-length structures as JSON.
//! The scheduler batches a tick's worth of [`DbOp`]s and commits them in
//! one transaction, so a crash recovers the last fully-committed tick.

use crate::error::DbError;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Schema version written to `workflow_params`. Major mismatch refuses to
/// start; minor versions upgrade in place.
pub const SCHEMA_VERSION: (u32, u32) = (1, 0);

/// One write operation, queued during a tick and committed in batch.
#[derive(Debug, Clone, PartialEq)]
pub enum DbOp {
    UpsertPoolTask {
        cycle: String,
        name: String,
        flows: String,
        status: String,
        is_held: bool,
    },
    RemovePoolTask {
        cycle: String,
        name: String,
    },
    TaskState {
        cycle: String,
        name: String,
        flows: String,
        submit_num: u32,
        status: String,
        time: String,
    },
    InsertJob {
        cycle: String,
        name: String,
        submit_num: u32,
        flows: String,
        is_manual_submit: bool,
        try_num: u32,
        platform_name: String,
        time_submit: String,
    },
    /// Partial update of a job row; `None` fields are left unchanged.
    UpdateJob {
        cycle: String,
        name: String,
        submit_num: u32,
        job_id: Option<String>,
        time_run: Option<String>,
        time_run_exit: Option<String>,
        run_signal: Option<String>,
        run_status: Option<i64>,
    },
    SetOutputs {
        cycle: String,
        name: String,
        flows: String,
        outputs: String,
    },
    SetPrereqs {
        cycle: String,
        name: String,
        flows: String,
        prereqs: String,
    },
    SetParam {
        key: String,
        value: String,
    },
    AddFlow {
        flow_num: u32,
        start_time: String,
        description: String,
    },
    /// Replace the whole broadcast table with the current store.
    ReplaceBroadcasts {
        rows: Vec<(String, String, String, String)>,
    },
    SetInheritance {
        namespace: String,
        inheritance: String,
    },
    Checkpoint {
        time: String,
        event: String,
    },
}

/// A `task_pool` row as read back at restart.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolRow {
    pub cycle: String,
    pub name: String,
    pub flows: String,
    pub status: String,
    pub is_held: bool,
}

/// A `task_outputs` row.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputsRow {
    pub cycle: String,
    pub name: String,
    pub flows: String,
    pub outputs: String,
}

/// A `task_prerequisites` row.
#[derive(Debug, Clone, PartialEq)]
pub struct PrereqRow {
    pub cycle: String,
    pub name: String,
    pub flows: String,
    pub prereqs: String,
}

/// A `task_jobs` row.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRow {
    pub cycle: String,
    pub name: String,
    pub submit_num: u32,
    pub try_num: u32,
    pub platform_name: String,
    pub job_id: Option<String>,
    pub time_submit: Option<String>,
    pub time_run: Option<String>,
    pub time_run_exit: Option<String>,
    pub run_status: Option<i64>,
}

/// Handle on the workflow state database.
#[derive(Debug)]
pub struct StateDb {
    conn: Connection,
}

impl StateDb {
    /// Open (creating if absent) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, DbError> {
        // WAL keeps readers (workflow-state polling) from blocking the
        // scheduler's per-tick commits.
        let _: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get(0)
        })?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS task_pool (
                cycle TEXT, name TEXT, flow_nums TEXT,
                status TEXT, is_held INTEGER,
                PRIMARY KEY (cycle, name)
            );
            CREATE TABLE IF NOT EXISTS task_states (
                cycle TEXT, name TEXT, flow_nums TEXT,
                time_created TEXT, time_updated TEXT,
                submit_num INTEGER, status TEXT,
                PRIMARY KEY (cycle, name)
            );
            CREATE TABLE IF NOT EXISTS task_jobs (
                cycle TEXT, name TEXT, submit_num INTEGER,
                flow_nums TEXT, is_manual_submit INTEGER,
                try_num INTEGER, time_submit TEXT, time_run TEXT,
                time_run_exit TEXT, run_signal TEXT, run_status INTEGER,
                platform_name TEXT, job_id TEXT,
                PRIMARY KEY (cycle, name, submit_num)
            );
            CREATE TABLE IF NOT EXISTS task_outputs (
                cycle TEXT, name TEXT, flow_nums TEXT, outputs TEXT,
                PRIMARY KEY (cycle, name)
            );
            CREATE TABLE IF NOT EXISTS task_prerequisites (
                cycle TEXT, name TEXT, flow_nums TEXT, prereqs TEXT,
                PRIMARY KEY (cycle, name)
            );
            CREATE TABLE IF NOT EXISTS workflow_params (
                key TEXT PRIMARY KEY, value TEXT
            );
            CREATE TABLE IF NOT EXISTS workflow_flows (
                flow_num INTEGER PRIMARY KEY, start_time TEXT, description TEXT
            );
            CREATE TABLE IF NOT EXISTS broadcast_states (
                point TEXT, namespace TEXT, key TEXT, value TEXT
            );
            CREATE TABLE IF NOT EXISTS inheritance (
                namespace TEXT PRIMARY KEY, inheritance TEXT
            );
            CREATE TABLE IF NOT EXISTS workflow_template_vars (
                key TEXT PRIMARY KEY, value TEXT
            );
            CREATE TABLE IF NOT EXISTS checkpoint_id (
                id INTEGER PRIMARY KEY AUTOINCREMENT, time TEXT, event TEXT
            );
            "#,
        )?;

        let db = Self { conn };
        db.check_schema_version()?;
        Ok(db)
    }

    fn check_schema_version(&self) -> Result<(), DbError> {
        let current = format!("{}.{}", SCHEMA_VERSION.0, SCHEMA_VERSION.1);
        match self.get_param("schema_version")? {
            None => {
                self.conn.execute(
                    "INSERT OR REPLACE INTO workflow_params (key, value) VALUES (?1, ?2)",
                    params!["schema_version", current],
                )?;
                Ok(())
            }
            Some(found) => {
                let found_major = found.split('.').next().unwrap_or("");
                if found_major.is_empty() || !found_major.chars().all(|c| c.is_ascii_digit()) {
                    return Err(DbError::Corrupt {
                        table: "workflow_params".to_string(),
                        message: format!("unparseable schema_version `{found}`"),
                    });
                }
                let current_major = SCHEMA_VERSION.0.to_string();
                if found_major != current_major {
                    return Err(DbError::SchemaVersion { found, current });
                }
                if found != current {
                    // Minor upgrade: rewrite the version marker in place
                    tracing::info!(from = %found, to = %current, "upgrading db schema version");
                    self.conn.execute(
                        "UPDATE workflow_params SET value = ?1 WHERE key = 'schema_version'",
                        params![current],
                    )?;
                }
                Ok(())
            }
        }
    }

    /// Apply a batch of operations in one transaction.
    pub fn apply(&mut self, ops: &[DbOp]) -> Result<(), DbError> {
        if ops.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        for op in ops {
            Self::apply_one(&tx, op)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn apply_one(tx: &rusqlite::Transaction<'_>, op: &DbOp) -> Result<(), DbError> {
        match op {
            DbOp::UpsertPoolTask {
                cycle,
                name,
                flows,
                status,
                is_held,
            } => {
                tx.execute(
                    "INSERT OR REPLACE INTO task_pool
                     (cycle, name, flow_nums, status, is_held)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![cycle, name, flows, status, is_held],
                )?;
            }
            DbOp::RemovePoolTask { cycle, name } => {
                tx.execute(
                    "DELETE FROM task_pool WHERE cycle = ?1 AND name = ?2",
                    params![cycle, name],
                )?;
            }
            DbOp::TaskState {
                cycle,
                name,
                flows,
                submit_num,
                status,
                time,
            } => {
                tx.execute(
                    "INSERT INTO task_states
                     (cycle, name, flow_nums, time_created, time_updated, submit_num, status)
                     VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6)
                     ON CONFLICT (cycle, name) DO UPDATE SET
                       flow_nums = ?3, time_updated = ?4,
                       submit_num = ?5, status = ?6",
                    params![cycle, name, flows, time, submit_num, status],
                )?;
            }
            DbOp::InsertJob {
                cycle,
                name,
                submit_num,
                flows,
                is_manual_submit,
                try_num,
                platform_name,
                time_submit,
            } => {
                tx.execute(
                    "INSERT OR REPLACE INTO task_jobs
                     (cycle, name, submit_num, flow_nums, is_manual_submit,
                      try_num, time_submit, platform_name)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        cycle,
                        name,
                        submit_num,
                        flows,
                        is_manual_submit,
                        try_num,
                        time_submit,
                        platform_name
                    ],
                )?;
            }
            DbOp::UpdateJob {
                cycle,
                name,
                submit_num,
                job_id,
                time_run,
                time_run_exit,
                run_signal,
                run_status,
            } => {
                tx.execute(
                    "UPDATE task_jobs SET
                       job_id = COALESCE(?4, job_id),
                       time_run = COALESCE(?5, time_run),
                       time_run_exit = COALESCE(?6, time_run_exit),
                       run_signal = COALESCE(?7, run_signal),
                       run_status = COALESCE(?8, run_status)
                     WHERE cycle = ?1 AND name = ?2 AND submit_num = ?3",
                    params![
                        cycle,
                        name,
                        submit_num,
                        job_id,
                        time_run,
                        time_run_exit,
                        run_signal,
                        run_status
                    ],
                )?;
            }
            DbOp::SetOutputs {
                cycle,
                name,
                flows,
                outputs,
            } => {
                tx.execute(
                    "INSERT OR REPLACE INTO task_outputs
                     (cycle, name, flow_nums, outputs) VALUES (?1, ?2, ?3, ?4)",
                    params![cycle, name, flows, outputs],
                )?;
            }
            DbOp::SetPrereqs {
                cycle,
                name,
                flows,
                prereqs,
            } => {
                tx.execute(
                    "INSERT OR REPLACE INTO task_prerequisites
                     (cycle, name, flow_nums, prereqs) VALUES (?1, ?2, ?3, ?4)",
                    params![cycle, name, flows, prereqs],
                )?;
            }
            DbOp::SetParam { key, value } => {
                tx.execute(
                    "INSERT OR REPLACE INTO workflow_params (key, value) VALUES (?1, ?2)",
                    params![key, value],
                )?;
            }
            DbOp::AddFlow {
                flow_num,
                start_time,
                description,
            } => {
                tx.execute(
                    "INSERT OR REPLACE INTO workflow_flows
                     (flow_num, start_time, description) VALUES (?1, ?2, ?3)",
                    params![flow_num, start_time, description],
                )?;
            }
            DbOp::ReplaceBroadcasts { rows } => {
                tx.execute("DELETE FROM broadcast_states", [])?;
                for (point, namespace, key, value) in rows {
                    tx.execute(
                        "INSERT INTO broadcast_states (point, namespace, key, value)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![point, namespace, key, value],
                    )?;
                }
            }
            DbOp::SetInheritance {
                namespace,
                inheritance,
            } => {
                tx.execute(
                    "INSERT OR REPLACE INTO inheritance (namespace, inheritance)
                     VALUES (?1, ?2)",
                    params![namespace, inheritance],
                )?;
            }
            DbOp::Checkpoint { time, event } => {
                tx.execute(
                    "INSERT INTO checkpoint_id (time, event) VALUES (?1, ?2)",
                    params![time, event],
                )?;
            }
        }
        Ok(())
    }

    // --- queries --------------------------------------------------------

    pub fn get_param(&self, key: &str) -> Result<Option<String>, DbError> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM workflow_params WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// The whole task pool, for restart.
    pub fn load_pool(&self) -> Result<Vec<PoolRow>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT cycle, name, flow_nums, status, is_held FROM task_pool
             ORDER BY cycle, name",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(PoolRow {
                    cycle: row.get(0)?,
                    name: row.get(1)?,
                    flows: row.get(2)?,
                    status: row.get(3)?,
                    is_held: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn load_outputs(&self) -> Result<Vec<OutputsRow>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT cycle, name, flow_nums, outputs FROM task_outputs")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(OutputsRow {
                    cycle: row.get(0)?,
                    name: row.get(1)?,
                    flows: row.get(2)?,
                    outputs: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn load_prereqs(&self) -> Result<Vec<PrereqRow>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT cycle, name, flow_nums, prereqs FROM task_prerequisites")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(PrereqRow {
                    cycle: row.get(0)?,
                    name: row.get(1)?,
                    flows: row.get(2)?,
                    prereqs: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Highest submit number recorded for a task instance (0 if none).
    pub fn max_submit_num(&self, cycle: &str, name: &str) -> Result<u32, DbError> {
        let n: Option<u32> = self.conn.query_row(
            "SELECT MAX(submit_num) FROM task_jobs WHERE cycle = ?1 AND name = ?2",
            params![cycle, name],
            |row| row.get(0),
        )?;
        Ok(n.unwrap_or(0))
    }

    /// Jobs submitted but with no recorded exit, for restart reconciliation.
    pub fn active_jobs(&self) -> Result<Vec<JobRow>, DbError> {
        self.query_jobs(
            "SELECT cycle, name, submit_num, try_num, platform_name, job_id,
                    time_submit, time_run, time_run_exit, run_status
             FROM task_jobs
             WHERE time_run_exit IS NULL AND job_id IS NOT NULL",
        )
    }

    /// Every job row for a task instance, submit order.
    pub fn jobs_for(&self, cycle: &str, name: &str) -> Result<Vec<JobRow>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT cycle, name, submit_num, try_num, platform_name, job_id,
                    time_submit, time_run, time_run_exit, run_status
             FROM task_jobs WHERE cycle = ?1 AND name = ?2 ORDER BY submit_num",
        )?;
        let rows = stmt
            .query_map(params![cycle, name], job_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn query_jobs(&self, sql: &str) -> Result<Vec<JobRow>, DbError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], job_row)?.collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Recorded state of a task instance (`task_states.status`).
    pub fn task_state(&self, cycle: &str, name: &str) -> Result<Option<String>, DbError> {
        Ok(self
            .conn
            .query_row(
                "SELECT status FROM task_states WHERE cycle = ?1 AND name = ?2",
                params![cycle, name],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Completed outputs of a task instance, decoded from JSON.
    pub fn task_outputs(&self, cycle: &str, name: &str) -> Result<Vec<String>, DbError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT outputs FROM task_outputs WHERE cycle = ?1 AND name = ?2",
                params![cycle, name],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            None => Ok(Vec::new()),
            Some(raw) => Ok(serde_json::from_str(&raw)?),
        }
    }

    pub fn load_flows(&self) -> Result<Vec<u32>, DbError> {
        let mut stmt = self.conn.prepare("SELECT flow_num FROM workflow_flows")?;
        let rows = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<u32>, _>>()?;
        Ok(rows)
    }

    pub fn load_broadcasts(&self) -> Result<Vec<(String, String, String, String)>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT point, namespace, key, value FROM broadcast_states")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn checkpoints(&self) -> Result<Vec<(i64, String, String)>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, time, event FROM checkpoint_id ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn job_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobRow> {
    Ok(JobRow {
        cycle: row.get(0)?,
        name: row.get(1)?,
        submit_num: row.get(2)?,
        try_num: row.get(3)?,
        platform_name: row.get(4)?,
        job_id: row.get(5)?,
        time_submit: row.get(6)?,
        time_run: row.get(7)?,
        time_run_exit: row.get(8)?,
        run_status: row.get(9)?,
    })
}

#[cfg(test)]
#[path = "db_tests.rs"]
mod tests;
