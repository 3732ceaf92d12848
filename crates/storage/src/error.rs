// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the state database

use thiserror::Error;

/// Database failures are fatal to the scheduler: it aborts at the last
/// committed tick rather than run with unpersisted state.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(
        "incompatible database schema version {found} (this scheduler \
         writes {current}); refusing to start"
    )]
    SchemaVersion { found: String, current: String },

    #[error("corrupt row in {table}: {message}")]
    Corrupt { table: String, message: String },
}
