// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `rota workflow-state`: poll another workflow's state database.
//!
//! Reads the target's `.service/db` directly, so it works whether or not
//! that scheduler is running. Exit 0 on match, 1 on miss after the
//! configured polls.

use crate::exit::CliError;
use rota_daemon::lifecycle;
use rota_storage::StateDb;
use std::time::Duration;

/// A parsed `<workflow-id>//<point>/<task>[:<selector>]` target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateQuery {
    pub workflow_id: String,
    pub point: String,
    pub task: String,
    /// Status or output name; default `succeeded`
    pub selector: String,
}

impl StateQuery {
    pub fn parse(target: &str) -> Result<Self, CliError> {
        let (workflow_id, rest) = target.split_once("//").ok_or_else(|| {
            CliError::User(format!(
                "bad target (want id//point/task[:selector]): {target}"
            ))
        })?;
        let (point, task_sel) = rest.split_once('/').ok_or_else(|| {
            CliError::User(format!("bad target (missing /task): {target}"))
        })?;
        let (task, selector) = match task_sel.split_once(':') {
            Some((task, selector)) => (task, selector.to_string()),
            None => (task_sel, "succeeded".to_string()),
        };
        if workflow_id.is_empty() || point.is_empty() || task.is_empty() {
            return Err(CliError::User(format!("bad target: {target}")));
        }
        Ok(Self {
            workflow_id: workflow_id.to_string(),
            point: point.to_string(),
            task: task.to_string(),
            selector,
        })
    }
}

/// Check the query once against the database.
pub fn check_once(db: &StateDb, query: &StateQuery, as_message: bool) -> Result<bool, CliError> {
    // Task states first (selector is a status), then outputs
    if !as_message {
        if let Some(state) = db
            .task_state(&query.point, &query.task)
            .map_err(|e| CliError::User(e.to_string()))?
        {
            if state == query.selector {
                return Ok(true);
            }
        }
    }
    let outputs = db
        .task_outputs(&query.point, &query.task)
        .map_err(|e| CliError::User(e.to_string()))?;
    Ok(outputs.iter().any(|o| o == &query.selector))
}

pub async fn workflow_state(
    target: &str,
    max_polls: u32,
    interval_secs: u64,
    as_message: bool,
) -> Result<String, CliError> {
    let query = StateQuery::parse(target)?;
    let run_dir = lifecycle::run_dir_for(&query.workflow_id)
        .map_err(|e| CliError::User(e.to_string()))?;
    let db_path = run_dir.join(".service").join("db");
    if !db_path.exists() {
        return Err(CliError::User(format!(
            "no state database at {}",
            db_path.display()
        )));
    }
    let db = StateDb::open(&db_path).map_err(|e| CliError::User(e.to_string()))?;

    let polls = max_polls.max(1);
    for attempt in 1..=polls {
        if check_once(&db, &query, as_message)? {
            return Ok(format!(
                "{}/{}:{} matched",
                query.point, query.task, query.selector
            ));
        }
        if attempt < polls {
            tokio::time::sleep(Duration::from_secs(interval_secs)).await;
        }
    }
    Err(CliError::User(format!(
        "{}/{}:{} not satisfied after {polls} poll(s)",
        query.point, query.task, query.selector
    )))
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
