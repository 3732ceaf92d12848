// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: contact file, run-directory lock, startup, shutdown.

use crate::error::LifecycleError;
use rota_config::WorkflowConfig;
use rota_storage::StateDb;
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;
use tokio::net::TcpListener;

/// Keys written to the contact file.
pub const CONTACT_HOST: &str = "ROTA_WORKFLOW_HOST";
pub const CONTACT_PORT: &str = "ROTA_WORKFLOW_PORT";
pub const CONTACT_PID: &str = "ROTA_WORKFLOW_PID";
pub const CONTACT_API: &str = "ROTA_API";
pub const CONTACT_UUID: &str = "ROTA_WORKFLOW_UUID";
pub const CONTACT_VERSION: &str = "ROTA_VERSION";

/// Protocol API version recorded in the contact file.
pub const API_VERSION: &str = "1";

/// Ping timeout when probing a possibly-stale contact file.
pub const CONTACT_PING_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything startup hands to the main loop.
#[derive(Debug)]
pub struct StartupResult {
    pub config: std::sync::Arc<WorkflowConfig>,
    pub db: StateDb,
    pub listener: TcpListener,
    pub port: u16,
    pub secret: String,
    /// True when a previous run's state was found in the database
    pub is_restart: bool,
    // NOTE(lifetime): held to maintain the exclusive run lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
}

/// Start up in `run_dir`: take the lock, vet any stale contact file,
/// load the definition, open the database, and bind the listener.
pub async fn startup(run_dir: &Path) -> Result<StartupResult, LifecycleError> {
    let service_dir = run_dir.join(".service");
    std::fs::create_dir_all(&service_dir)?;
    std::fs::create_dir_all(run_dir.join("log").join("scheduler"))?;
    std::fs::create_dir_all(run_dir.join("share"))?;
    std::fs::create_dir_all(run_dir.join("work"))?;

    // Contact file first: refuse to double-start a live workflow
    vet_contact_file(run_dir).await?;

    // Exclusive lock, then write our PID while holding it
    let lock_path = service_dir.join("lock");
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file;

    // Definition: flow.toml, or suite.rc for back-compat workflows
    let flow_path = run_dir.join("flow.toml");
    let source = if flow_path.exists() {
        flow_path
    } else {
        run_dir.join("suite.rc")
    };
    let config = std::sync::Arc::new(WorkflowConfig::load(&source)?);

    let db = StateDb::open(&rota_engine::paths::db_path(run_dir))?;
    let is_restart = !db.load_pool()?.is_empty();

    // Shared secret for job messages, created once per installation
    let secret_path = rota_engine::paths::secret_path(run_dir);
    let secret = match std::fs::read_to_string(&secret_path) {
        Ok(secret) => secret.trim().to_string(),
        Err(_) => {
            let secret = uuid::Uuid::new_v4().to_string();
            std::fs::write(&secret_path, &secret)?;
            secret
        }
    };

    // Random free port, recorded in the contact file
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(LifecycleError::BindFailed)?;
    let port = listener.local_addr().map_err(LifecycleError::BindFailed)?.port();

    write_contact_file(run_dir, port)?;

    Ok(StartupResult {
        config,
        db,
        listener,
        port,
        secret,
        is_restart,
        lock_file,
    })
}

/// Remove the contact file at clean shutdown.
pub fn remove_contact_file(run_dir: &Path) {
    let path = rota_engine::paths::contact_path(run_dir);
    if path.exists() {
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::warn!(error = %e, "failed to remove contact file");
        }
    }
}

/// Atomically write the contact file (tmp + rename).
fn write_contact_file(run_dir: &Path, port: u16) -> Result<(), LifecycleError> {
    let path = rota_engine::paths::contact_path(run_dir);
    let tmp = path.with_extension("tmp");
    let uuid = uuid::Uuid::new_v4();
    let content = format!(
        "{CONTACT_HOST}=127.0.0.1\n\
         {CONTACT_PORT}={port}\n\
         {CONTACT_PID}={}\n\
         {CONTACT_API}={API_VERSION}\n\
         {CONTACT_UUID}={uuid}\n\
         {CONTACT_VERSION}={}\n",
        std::process::id(),
        env!("CARGO_PKG_VERSION"),
    );
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
}

/// Parse a contact file into key/value pairs.
pub fn parse_contact(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Check an existing contact file before starting.
///
/// A reachable scheduler aborts the start. An unreachable one is only
/// cleared when PID inspection proves the process is gone; otherwise we
/// cannot tell whether the workflow is running and refuse to guess.
async fn vet_contact_file(run_dir: &Path) -> Result<(), LifecycleError> {
    let path = rota_engine::paths::contact_path(run_dir);
    let Ok(content) = std::fs::read_to_string(&path) else {
        return Ok(());
    };
    let contact = parse_contact(&content);
    let host = contact.get(CONTACT_HOST).cloned().unwrap_or_default();
    let port = contact.get(CONTACT_PORT).cloned().unwrap_or_default();
    let pid = contact.get(CONTACT_PID).cloned().unwrap_or_default();

    if !host.is_empty() && !port.is_empty() {
        let addr = format!("{host}:{port}");
        let ping = tokio::time::timeout(
            CONTACT_PING_TIMEOUT,
            tokio::net::TcpStream::connect(&addr),
        )
        .await;
        if matches!(ping, Ok(Ok(_))) {
            return Err(LifecycleError::AlreadyRunning { pid });
        }
    }

    // Ping failed: only a verified-dead PID lets us clear the file
    if pid_is_alive(&pid) {
        return Err(LifecycleError::StaleContact {
            path: path.display().to_string(),
        });
    }

    tracing::warn!(
        path = %path.display(),
        pid = %pid,
        "removing stale contact file (process verified absent)"
    );
    std::fs::remove_file(&path)?;
    Ok(())
}

#[cfg(target_os = "linux")]
fn pid_is_alive(pid: &str) -> bool {
    match pid.parse::<u32>() {
        Ok(pid) => Path::new(&format!("/proc/{pid}")).exists(),
        Err(_) => false,
    }
}

#[cfg(not(target_os = "linux"))]
fn pid_is_alive(pid: &str) -> bool {
    let Ok(pid) = pid.parse::<u32>() else {
        return false;
    };
    std::process::Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Resolve the run directory for a workflow id.
///
/// `ROTA_RUN_DIR` overrides the default `~/rota-run` base (tests use
/// this for isolation).
pub fn run_dir_for(workflow_id: &str) -> Result<PathBuf, LifecycleError> {
    let base = match std::env::var("ROTA_RUN_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => dirs::home_dir()
            .ok_or_else(|| {
                LifecycleError::Io(std::io::Error::other("cannot determine home directory"))
            })?
            .join("rota-run"),
    };
    Ok(base.join(workflow_id))
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
