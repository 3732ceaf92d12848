// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocol for the scheduler's TCP control surface.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload.
//! Job-originated messages carry the shared secret from `.service/secret`;
//! commands and queries come from tools on the same account, which read
//! the contact file for the port.

use crate::scheduler::StatusReport;
use rota_core::command::Command;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Frames larger than this are rejected outright.
pub const MAX_FRAME: u32 = 4 * 1024 * 1024;

/// Errors from protocol framing.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(u32),
    #[error("authentication failed")]
    AuthFailed,
}

/// Request from a client (CLI or job) to the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Health check ping
    Ping,

    /// Deliver a control command
    Command { command: Command },

    /// Job status messages (authenticated with the workflow secret)
    Message {
        secret: String,
        /// The job token, `<cycle>/<name>/<NN>`
        job: String,
        messages: Vec<String>,
    },

    /// Query scheduler state
    Status,
}

/// Response from the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Pong,
    Ok { message: String },
    Error { message: String },
    Status { report: StatusReport },
}

/// Read one length-prefixed JSON frame.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T, ProtocolError>
where
    R: AsyncReadExt + Unpin,
    T: serde::de::DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(serde_json::from_slice(&payload)?)
}

/// Write one length-prefixed JSON frame.
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), ProtocolError>
where
    W: AsyncWriteExt + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(value)?;
    let len = payload.len() as u32;
    if len > MAX_FRAME {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Parse a job token `<cycle>/<name>/<NN>` into its parts.
pub fn parse_job_token(token: &str) -> Option<(String, String, u32)> {
    let mut parts = token.rsplitn(3, '/');
    let submit = parts.next()?.parse().ok()?;
    let name = parts.next()?.to_string();
    let cycle = parts.next()?.to_string();
    Some((cycle, name, submit))
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
