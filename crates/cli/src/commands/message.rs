// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `rota message`: report job progress to the scheduler.
//!
//! Invoked by job scripts. The shared secret comes from the workflow's
//! `.service/secret`; when the scheduler is unreachable the script has
//! already written `job.status`, so failure here is non-fatal job-side.

use crate::client::Client;
use crate::exit::CliError;
use rota_daemon::lifecycle;
use rota_daemon::protocol::{Request, Response};

pub async fn message(
    workflow_id: &str,
    job: String,
    messages: Vec<String>,
) -> Result<String, CliError> {
    if messages.is_empty() {
        return Err(CliError::User("no messages given".to_string()));
    }
    let run_dir = lifecycle::run_dir_for(workflow_id)
        .map_err(|e| CliError::User(e.to_string()))?;
    let secret_path = run_dir.join(".service").join("secret");
    let secret = std::fs::read_to_string(&secret_path)
        .map_err(|_| {
            CliError::NotRunning(format!("no secret file at {}", secret_path.display()))
        })?
        .trim()
        .to_string();

    let client = Client::for_run_dir(run_dir)?;
    match client
        .request(&Request::Message {
            secret,
            job,
            messages,
        })
        .await?
    {
        Response::Ok { message } => Ok(message),
        Response::Error { message } => Err(CliError::User(message)),
        other => Err(CliError::Transport(format!("unexpected response: {other:?}"))),
    }
}
