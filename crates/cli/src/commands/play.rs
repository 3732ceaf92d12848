// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `rota play`: start (or restart) a workflow's scheduler.

use crate::client::Client;
use crate::exit::CliError;
use rota_daemon::lifecycle;
use std::path::Path;
use std::time::{Duration, Instant};

/// How long to wait for the daemon's contact file to appear.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn play(workflow_id: &str) -> Result<String, CliError> {
    let run_dir = lifecycle::run_dir_for(workflow_id)
        .map_err(|e| CliError::User(e.to_string()))?;
    if !run_dir.join("flow.toml").exists() && !run_dir.join("suite.rc").exists() {
        return Err(CliError::User(format!(
            "no workflow definition in {}",
            run_dir.display()
        )));
    }

    // A live scheduler means nothing to do; a stale contact file is the
    // daemon's problem to vet (it has the PID inspection logic)
    if let Ok(client) = Client::for_run_dir(run_dir.clone()) {
        if client
            .request(&rota_daemon::protocol::Request::Ping)
            .await
            .is_ok()
        {
            return Err(CliError::User(format!(
                "{workflow_id} is already running"
            )));
        }
    }

    let daemon = daemon_binary()?;
    let child = std::process::Command::new(&daemon)
        .arg(workflow_id)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map_err(|e| CliError::User(format!("cannot start {}: {e}", daemon.display())))?;

    // Wait for the contact file (the daemon removes a stale one first,
    // so plain existence polling would race; ping to be sure)
    let deadline = Instant::now() + STARTUP_TIMEOUT;
    loop {
        if let Ok(client) = Client::for_run_dir(run_dir.clone()) {
            if client
                .request(&rota_daemon::protocol::Request::Ping)
                .await
                .is_ok()
            {
                return Ok(format!("{workflow_id} started (pid {})", child.id()));
            }
        }
        if Instant::now() > deadline {
            return Err(CliError::Timeout);
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

/// The daemon binary lives next to this one.
fn daemon_binary() -> Result<std::path::PathBuf, CliError> {
    let exe = std::env::current_exe()
        .map_err(|e| CliError::User(format!("cannot locate rota binary: {e}")))?;
    let dir = exe
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let candidate = dir.join("rotad");
    if candidate.exists() {
        Ok(candidate)
    } else {
        // Fall back to PATH lookup
        Ok(std::path::PathBuf::from("rotad"))
    }
}
