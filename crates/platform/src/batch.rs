// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch-system command templates and output parsers.
//!
//! Each job runner supplies a submit command, a regex to pull the job id
//! out of the submission output, and poll/kill commands. `custom` runners
//! take all of these from the platform definition with `{script}` and
//! `{job_id}` holes.

use crate::driver::PollStatus;
use crate::error::PlatformError;
use rota_config::{JobRunnerKind, PlatformDef};

/// Build the submission command line for a platform.
pub fn submit_command(platform: &PlatformDef, script: &str, job_dir: &str) -> Result<String, PlatformError> {
    Ok(match platform.job_runner {
        JobRunnerKind::Background => format!(
            "nohup bash {script} </dev/null >{job_dir}/job.out 2>{job_dir}/job.err & echo $!"
        ),
        JobRunnerKind::At => format!("at now -f {script} 2>&1"),
        JobRunnerKind::Slurm => format!("sbatch {script}"),
        JobRunnerKind::Pbs => format!("qsub {script}"),
        JobRunnerKind::Lsf => format!("bsub < {script}"),
        JobRunnerKind::Moab => format!("msub {script}"),
        JobRunnerKind::Loadleveler => format!("llsubmit {script}"),
        JobRunnerKind::Custom => expand_template(
            platform,
            platform.submit_command_template.as_deref(),
            "submit",
            script,
            "",
        )?,
    })
}

/// Directive prefix rendered into job script headers, where the batch
/// system reads options from the script itself.
pub fn directive_prefix(kind: JobRunnerKind) -> Option<&'static str> {
    match kind {
        JobRunnerKind::Slurm => Some("#SBATCH"),
        JobRunnerKind::Pbs | JobRunnerKind::Moab => Some("#PBS"),
        JobRunnerKind::Lsf => Some("#BSUB"),
        JobRunnerKind::Loadleveler => Some("#@"),
        JobRunnerKind::Background | JobRunnerKind::At | JobRunnerKind::Custom => None,
    }
}

/// The regex that extracts the job id from submission output.
pub fn job_id_pattern(platform: &PlatformDef) -> &str {
    match platform.job_runner {
        JobRunnerKind::Background => r"^(\d+)$",
        JobRunnerKind::At => r"job (\d+) at",
        JobRunnerKind::Slurm => r"Submitted batch job (\d+)",
        JobRunnerKind::Pbs => r"^\s*(\S+)\s*$",
        JobRunnerKind::Lsf => r"Job <(\d+)>",
        JobRunnerKind::Moab => r"^\s*(\S+)\s*$",
        JobRunnerKind::Loadleveler => r#""([^"]+)""#,
        JobRunnerKind::Custom => platform.job_id_pattern.as_deref().unwrap_or(r"^\s*(\S+)\s*$"),
    }
}

/// Extract the job id from submission stdout.
pub fn parse_job_id(platform: &PlatformDef, stdout: &str) -> Result<String, PlatformError> {
    let pattern = job_id_pattern(platform);
    let re = regex::RegexBuilder::new(pattern)
        .multi_line(true)
        .build()
        .map_err(|e| PlatformError::BadTemplate {
            platform: platform.name.clone(),
            message: format!("job id pattern: {e}"),
        })?;
    re.captures(stdout)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| PlatformError::NoJobId {
            stdout: stdout.trim().to_string(),
        })
}

/// Build the poll command for a submitted job.
pub fn poll_command(platform: &PlatformDef, job_id: &str) -> Result<String, PlatformError> {
    Ok(match platform.job_runner {
        JobRunnerKind::Background => format!("ps -o pid= -p {job_id}"),
        JobRunnerKind::At => "atq".to_string(),
        JobRunnerKind::Slurm => format!("squeue -h -j {job_id} -o %T"),
        JobRunnerKind::Pbs => format!("qstat {job_id}"),
        JobRunnerKind::Lsf => format!("bjobs -noheader -o stat {job_id}"),
        JobRunnerKind::Moab => format!("checkjob {job_id}"),
        JobRunnerKind::Loadleveler => format!("llq -f %st {job_id}"),
        JobRunnerKind::Custom => expand_template(
            platform,
            platform.poll_command_template.as_deref(),
            "poll",
            "",
            job_id,
        )?,
    })
}

/// Interpret poll output.
///
/// A zero-exit with no recognisable state means the job has left the
/// batch system: `Exited`, with the outcome read from `job.status`.
pub fn parse_poll(
    platform: &PlatformDef,
    exit_code: i32,
    stdout: &str,
    job_id: &str,
) -> PollStatus {
    match platform.job_runner {
        JobRunnerKind::Background => {
            if exit_code == 0 && stdout.trim() == job_id {
                PollStatus::RunningNow
            } else {
                PollStatus::Exited
            }
        }
        JobRunnerKind::At => {
            if stdout.lines().any(|l| l.split_whitespace().next() == Some(job_id)) {
                PollStatus::Queued
            } else {
                PollStatus::Exited
            }
        }
        JobRunnerKind::Slurm => match stdout.trim() {
            "PENDING" | "CONFIGURING" | "SUSPENDED" => PollStatus::Queued,
            "RUNNING" | "COMPLETING" => PollStatus::RunningNow,
            _ => PollStatus::Exited,
        },
        JobRunnerKind::Pbs | JobRunnerKind::Moab => {
            // qstat/checkjob tabular output; state letter in the job row
            let state = stdout
                .lines()
                .find(|l| l.starts_with(job_id) || l.contains(job_id))
                .and_then(|l| l.split_whitespace().rev().nth(1).map(str::to_string));
            match state.as_deref() {
                Some("Q") | Some("H") | Some("W") => PollStatus::Queued,
                Some("R") | Some("E") => PollStatus::RunningNow,
                _ => PollStatus::Exited,
            }
        }
        JobRunnerKind::Lsf => match stdout.trim() {
            "PEND" | "PSUSP" | "USUSP" | "SSUSP" => PollStatus::Queued,
            "RUN" => PollStatus::RunningNow,
            _ => PollStatus::Exited,
        },
        JobRunnerKind::Loadleveler => match stdout.trim() {
            "I" | "H" | "NQ" => PollStatus::Queued,
            "R" | "ST" => PollStatus::RunningNow,
            _ => PollStatus::Exited,
        },
        JobRunnerKind::Custom => {
            // Custom runners report via exit code: 0 running, non-zero gone
            if exit_code == 0 {
                PollStatus::RunningNow
            } else {
                PollStatus::Exited
            }
        }
    }
}

/// Build the kill command for a submitted job.
pub fn kill_command(platform: &PlatformDef, job_id: &str) -> Result<String, PlatformError> {
    Ok(match platform.job_runner {
        JobRunnerKind::Background => format!("kill -TERM {job_id}"),
        JobRunnerKind::At => format!("atrm {job_id}"),
        JobRunnerKind::Slurm => format!("scancel {job_id}"),
        JobRunnerKind::Pbs => format!("qdel {job_id}"),
        JobRunnerKind::Lsf => format!("bkill {job_id}"),
        JobRunnerKind::Moab => format!("canceljob {job_id}"),
        JobRunnerKind::Loadleveler => format!("llcancel {job_id}"),
        JobRunnerKind::Custom => expand_template(
            platform,
            platform.kill_command_template.as_deref(),
            "kill",
            "",
            job_id,
        )?,
    })
}

fn expand_template(
    platform: &PlatformDef,
    template: Option<&str>,
    what: &str,
    script: &str,
    job_id: &str,
) -> Result<String, PlatformError> {
    let template = template.ok_or_else(|| PlatformError::BadTemplate {
        platform: platform.name.clone(),
        message: format!("custom job runner needs a {what} command template"),
    })?;
    Ok(template
        .replace("{script}", script)
        .replace("{job_id}", job_id))
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;
