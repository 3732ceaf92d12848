// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed client for the scheduler's TCP control surface.

use crate::exit::CliError;
use rota_daemon::lifecycle::{self, parse_contact, CONTACT_HOST, CONTACT_PORT};
use rota_daemon::protocol::{read_frame, write_frame, Request, Response};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::TcpStream;

/// Default request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A connection target resolved from a workflow's contact file.
#[derive(Debug)]
pub struct Client {
    pub addr: String,
    pub run_dir: PathBuf,
    pub timeout: Duration,
}

impl Client {
    /// Resolve the contact file for a workflow id.
    pub fn for_workflow(workflow_id: &str) -> Result<Self, CliError> {
        let run_dir = lifecycle::run_dir_for(workflow_id)
            .map_err(|e| CliError::User(e.to_string()))?;
        Self::for_run_dir(run_dir)
    }

    pub fn for_run_dir(run_dir: PathBuf) -> Result<Self, CliError> {
        let contact_path = contact_path(&run_dir);
        let content = std::fs::read_to_string(&contact_path)
            .map_err(|_| CliError::NotRunning(format!("no contact file at {}", contact_path.display())))?;
        let contact = parse_contact(&content);
        let host = contact
            .get(CONTACT_HOST)
            .cloned()
            .ok_or_else(|| CliError::Transport("contact file has no host".to_string()))?;
        let port = contact
            .get(CONTACT_PORT)
            .cloned()
            .ok_or_else(|| CliError::Transport("contact file has no port".to_string()))?;
        Ok(Self {
            addr: format!("{host}:{port}"),
            run_dir,
            timeout: REQUEST_TIMEOUT,
        })
    }

    /// Send one request and await the response.
    pub async fn request(&self, request: &Request) -> Result<Response, CliError> {
        let round_trip = async {
            let mut stream = TcpStream::connect(&self.addr)
                .await
                .map_err(|e| CliError::Transport(format!("{}: {e}", self.addr)))?;
            write_frame(&mut stream, request)
                .await
                .map_err(|e| CliError::Transport(e.to_string()))?;
            read_frame::<_, Response>(&mut stream)
                .await
                .map_err(|e| CliError::Transport(e.to_string()))
        };
        match tokio::time::timeout(self.timeout, round_trip).await {
            Ok(result) => result,
            Err(_) => Err(CliError::Timeout),
        }
    }

    /// Send a command; map scheduler-side rejection to a user error.
    pub async fn command(
        &self,
        command: rota_core::command::Command,
    ) -> Result<String, CliError> {
        match self
            .request(&Request::Command { command })
            .await?
        {
            Response::Ok { message } => Ok(message),
            Response::Error { message } => Err(CliError::User(message)),
            other => Err(CliError::Transport(format!(
                "unexpected response: {other:?}"
            ))),
        }
    }
}

fn contact_path(run_dir: &Path) -> PathBuf {
    run_dir.join(".service").join("contact")
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
