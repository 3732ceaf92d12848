// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run-directory layout.
//!
//! ```text
//! <run-dir>/
//!   flow.toml
//!   log/scheduler/log
//!   log/job/<cycle>/<name>/<NN>/{job, job.out, job.err, job.status}
//!   share/          share/cycle/<point>/
//!   work/<cycle>/<name>/
//!   .service/{db, contact, secret}
//! ```

use rota_core::task::TaskId;
use std::path::{Path, PathBuf};

pub fn service_dir(run_dir: &Path) -> PathBuf {
    run_dir.join(".service")
}

pub fn db_path(run_dir: &Path) -> PathBuf {
    service_dir(run_dir).join("db")
}

pub fn contact_path(run_dir: &Path) -> PathBuf {
    service_dir(run_dir).join("contact")
}

pub fn secret_path(run_dir: &Path) -> PathBuf {
    service_dir(run_dir).join("secret")
}

pub fn scheduler_log_dir(run_dir: &Path) -> PathBuf {
    run_dir.join("log").join("scheduler")
}

pub fn scheduler_log_path(run_dir: &Path) -> PathBuf {
    scheduler_log_dir(run_dir).join("log")
}

/// `log/job/<cycle>/<name>/<NN>/`
pub fn job_dir(run_dir: &Path, task: &TaskId, submit_num: u32) -> PathBuf {
    run_dir
        .join("log")
        .join("job")
        .join(task.point.to_string())
        .join(&task.name)
        .join(format!("{submit_num:02}"))
}

pub fn job_script_path(run_dir: &Path, task: &TaskId, submit_num: u32) -> PathBuf {
    job_dir(run_dir, task, submit_num).join("job")
}

pub fn job_status_path(run_dir: &Path, task: &TaskId, submit_num: u32) -> PathBuf {
    job_dir(run_dir, task, submit_num).join("job.status")
}

pub fn share_dir(run_dir: &Path) -> PathBuf {
    run_dir.join("share")
}

pub fn work_dir(run_dir: &Path, task: &TaskId) -> PathBuf {
    run_dir
        .join("work")
        .join(task.point.to_string())
        .join(&task.name)
}

/// `<cycle>/<name>/<NN>`, the job token exported as `ROTA_TASK_JOB`.
pub fn job_token(task: &TaskId, submit_num: u32) -> String {
    format!("{}/{}/{:02}", task.point, task.name, submit_num)
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
