// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the scheduler daemon

use thiserror::Error;

/// Errors inside the scheduler loop. Database errors are fatal; most
/// others fail the affected task or request and the workflow continues.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("{0}")]
    Engine(#[from] rota_engine::EngineError),

    #[error("{0}")]
    Db(#[from] rota_storage::DbError),

    #[error("{0}")]
    Config(#[from] rota_config::WorkflowConfigError),

    #[error("{0}")]
    Point(#[from] rota_core::point::PointError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors from daemon lifecycle (startup, contact file, shutdown).
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("another scheduler appears to be running this workflow (pid {pid})")]
    AlreadyRunning { pid: String },

    #[error("cannot tell if the workflow is running (stale contact file at {path})")]
    StaleContact { path: String },

    #[error("failed to acquire run-directory lock: {0}")]
    LockFailed(#[source] std::io::Error),

    #[error("{0}")]
    Db(#[from] rota_storage::DbError),

    #[error("{0}")]
    Config(#[from] rota_config::WorkflowConfigError),

    #[error("{0}")]
    Scheduler(#[from] SchedulerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind listener: {0}")]
    BindFailed(std::io::Error),
}
