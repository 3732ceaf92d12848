// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `rota clean`: remove a stopped workflow's run directory.
//!
//! Removal retries on EBUSY/ENOTEMPTY so NFS `.nfsXXXX` placeholder
//! files held by readers (log tailers, cat-log) can drain.

use crate::client::Client;
use crate::exit::CliError;
use rota_daemon::lifecycle;
use std::path::Path;
use std::time::Duration;

const REMOVE_ATTEMPTS: u32 = 5;
const RETRY_DELAY: Duration = Duration::from_secs(1);

pub async fn clean(workflow_id: &str) -> Result<String, CliError> {
    let run_dir = lifecycle::run_dir_for(workflow_id)
        .map_err(|e| CliError::User(e.to_string()))?;
    if !run_dir.exists() {
        return Err(CliError::User(format!(
            "no run directory at {}",
            run_dir.display()
        )));
    }

    // Refuse to clean a live workflow
    if let Ok(client) = Client::for_run_dir(run_dir.clone()) {
        if client
            .request(&rota_daemon::protocol::Request::Ping)
            .await
            .is_ok()
        {
            return Err(CliError::User(format!(
                "{workflow_id} is running; stop it first"
            )));
        }
    }

    remove_with_retry(&run_dir).await?;
    Ok(format!("removed {}", run_dir.display()))
}

async fn remove_with_retry(dir: &Path) -> Result<(), CliError> {
    let mut last_err = None;
    for attempt in 1..=REMOVE_ATTEMPTS {
        match std::fs::remove_dir_all(dir) {
            Ok(()) => return Ok(()),
            Err(e) if retryable(&e) => {
                last_err = Some(e);
                if attempt < REMOVE_ATTEMPTS {
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
            Err(e) => return Err(CliError::User(format!("cannot remove {}: {e}", dir.display()))),
        }
    }
    Err(CliError::User(format!(
        "cannot remove {} after {REMOVE_ATTEMPTS} attempts: {}",
        dir.display(),
        last_err.map(|e| e.to_string()).unwrap_or_default()
    )))
}

/// EBUSY and ENOTEMPTY come and go as NFS clients release placeholders.
fn retryable(e: &std::io::Error) -> bool {
    matches!(e.raw_os_error(), Some(16) /* EBUSY */ | Some(39) /* ENOTEMPTY */)
        || e.kind() == std::io::ErrorKind::DirectoryNotEmpty
}
