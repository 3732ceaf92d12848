// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine

use rota_config::{PlatformLookupError, WorkflowConfigError};
use rota_core::point::PointError;
use rota_platform::PlatformError;
use thiserror::Error;

/// Errors from pool and job-manager operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Config(#[from] WorkflowConfigError),

    #[error("{0}")]
    Point(#[from] PointError),

    #[error("{0}")]
    PlatformLookup(#[from] PlatformLookupError),

    #[error("{0}")]
    Platform(#[from] PlatformError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error("task instance not in the pool: {0}")]
    NotInPool(String),

    #[error("bad task selector: {0}")]
    BadSelector(String),
}
