// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for platform operations

use thiserror::Error;

/// Errors from platform commands.
///
/// `Connection` triggers host failover; `HostsExhausted` is the terminal
/// form once every host has been tried.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("connection to {host} failed: {detail}")]
    Connection { host: String, detail: String },

    #[error("all hosts of platform {platform} exhausted")]
    HostsExhausted { platform: String },

    #[error("job submission rejected: {detail}")]
    Submission { detail: String },

    #[error("no job id found in submission output: {stdout}")]
    NoJobId { stdout: String },

    #[error("command killed on timeout: {command}")]
    Timeout { command: String },

    #[error("command failed with exit {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("bad command template for platform {platform}: {message}")]
    BadTemplate { platform: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PlatformError {
    /// Connectivity errors are retried on the next host; everything else
    /// is a real answer from the platform.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            PlatformError::Connection { .. } | PlatformError::Timeout { .. }
        )
    }
}
