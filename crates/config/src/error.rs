// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for workflow configuration

use crate::graph::GraphParseError;
use rota_core::point::PointError;
use thiserror::Error;

/// Errors raised while loading or validating a workflow definition.
#[derive(Debug, Error)]
pub enum WorkflowConfigError {
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("graph parse error: {0}")]
    Graph(#[from] GraphParseError),

    #[error("{0}")]
    Point(#[from] PointError),

    #[error("invalid config for {location}: {message}")]
    Invalid { location: String, message: String },

    #[error("cyclic inheritance involving runtime namespace `{0}`")]
    CyclicInheritance(String),

    #[error("task `{0}` appears in the graph but has no runtime definition")]
    UndefinedTask(String),

    #[error("failed to read workflow definition at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("reload rejected: {0}")]
    ReloadRejected(String),
}

/// No platform matched a task's `platform` setting at job-submit time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no platform matching `{0}`")]
pub struct PlatformLookupError(pub String);
