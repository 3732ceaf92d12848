// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job script rendering.
//!
//! The job script is a self-contained bash wrapper: it exports the task
//! environment, reports lifecycle messages back to the scheduler (falling
//! back to `job.status` when the scheduler is unreachable), runs the user
//! scripts, and traps errors so a failure is always reported.

use rota_core::task::TaskId;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Everything needed to render one job script.
#[derive(Debug, Clone)]
pub struct JobScriptContext {
    pub workflow_id: String,
    pub run_dir: String,
    pub task: TaskId,
    pub submit_num: u32,
    pub try_num: u32,
    pub platform_name: String,
    pub cycling_mode: String,
    /// Batch directives rendered into the script header
    pub directives: Vec<(String, String)>,
    /// Directive prefix for the platform, e.g. `#SBATCH`
    pub directive_prefix: Option<String>,
    /// Task environment (definition env merged with broadcasts)
    pub env: BTreeMap<String, String>,
    pub env_script: String,
    pub pre_script: String,
    pub script: String,
    pub post_script: String,
    pub err_script: String,
    pub exit_script: String,
}

/// Render the job script text.
pub fn render(ctx: &JobScriptContext) -> String {
    let mut out = String::new();
    let task_id = ctx.task.to_string();
    let job_token = crate::paths::job_token(&ctx.task, ctx.submit_num);
    let log_dir = format!(
        "{}/log/job/{}/{}/{:02}",
        ctx.run_dir, ctx.task.point, ctx.task.name, ctx.submit_num
    );
    let work_dir = format!("{}/work/{}/{}", ctx.run_dir, ctx.task.point, ctx.task.name);

    let _ = writeln!(out, "#!/bin/bash");
    let _ = writeln!(out, "# Job script for {task_id} (submit {:02})", ctx.submit_num);
    let _ = writeln!(out, "# Platform: {}", ctx.platform_name);
    if let Some(prefix) = &ctx.directive_prefix {
        for (key, value) in &ctx.directives {
            if value.is_empty() {
                let _ = writeln!(out, "{prefix} {key}");
            } else {
                let _ = writeln!(out, "{prefix} {key}={value}");
            }
        }
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "set -u");
    let _ = writeln!(out);

    let _ = writeln!(out, "export ROTA_WORKFLOW_ID={}", quoted(&ctx.workflow_id));
    let _ = writeln!(out, "export ROTA_WORKFLOW_RUN_DIR={}", quoted(&ctx.run_dir));
    let _ = writeln!(
        out,
        "export ROTA_WORKFLOW_SHARE_DIR={}",
        quoted(&format!("{}/share", ctx.run_dir))
    );
    let _ = writeln!(
        out,
        "export ROTA_WORKFLOW_WORK_DIR={}",
        quoted(&format!("{}/work", ctx.run_dir))
    );
    let _ = writeln!(out, "export ROTA_TASK_NAME={}", quoted(&ctx.task.name));
    let _ = writeln!(
        out,
        "export ROTA_TASK_CYCLE_POINT={}",
        quoted(&ctx.task.point.to_string())
    );
    let _ = writeln!(out, "export ROTA_TASK_ID={}", quoted(&task_id));
    let _ = writeln!(out, "export ROTA_TASK_JOB={}", quoted(&job_token));
    let _ = writeln!(out, "export ROTA_TASK_SUBMIT_NUMBER={}", ctx.submit_num);
    let _ = writeln!(out, "export ROTA_TASK_TRY_NUMBER={}", ctx.try_num);
    let _ = writeln!(out, "export ROTA_TASK_LOG_DIR={}", quoted(&log_dir));
    let _ = writeln!(out, "export ROTA_TASK_WORK_DIR={}", quoted(&work_dir));
    let _ = writeln!(out, "export ROTA_CYCLING_MODE={}", quoted(&ctx.cycling_mode));
    for (key, value) in &ctx.env {
        let _ = writeln!(out, "export {key}={}", quoted(value));
    }
    let _ = writeln!(out);

    // Messaging helper: scheduler first, job.status always
    let _ = writeln!(out, "rota_message() {{");
    let _ = writeln!(
        out,
        "    echo \"$(date -u +%Y-%m-%dT%H:%M:%SZ)|$1\" >> \"$ROTA_TASK_LOG_DIR/job.status\""
    );
    let _ = writeln!(
        out,
        "    rota message \"$ROTA_WORKFLOW_ID\" \"$ROTA_TASK_JOB\" \"$1\" 2>/dev/null || true"
    );
    let _ = writeln!(out, "}}");
    let _ = writeln!(out);

    let _ = writeln!(out, "rota_job_err() {{");
    let _ = writeln!(out, "    rota_message \"failed\"");
    if !ctx.err_script.is_empty() {
        let _ = writeln!(out, "    {}", ctx.err_script);
    }
    let _ = writeln!(out, "    exit 1");
    let _ = writeln!(out, "}}");
    let _ = writeln!(out, "trap rota_job_err ERR");
    let _ = writeln!(out, "set -e");
    let _ = writeln!(out);

    let _ = writeln!(out, "mkdir -p \"$ROTA_TASK_WORK_DIR\"");
    let _ = writeln!(out, "cd \"$ROTA_TASK_WORK_DIR\"");
    let _ = writeln!(out, "rota_message \"started\"");
    let _ = writeln!(out);

    for (label, body) in [
        ("env-script", &ctx.env_script),
        ("pre-script", &ctx.pre_script),
        ("script", &ctx.script),
        ("post-script", &ctx.post_script),
    ] {
        if !body.is_empty() {
            let _ = writeln!(out, "# {label}");
            let _ = writeln!(out, "{body}");
            let _ = writeln!(out);
        }
    }

    let _ = writeln!(out, "rota_message \"succeeded\"");
    if !ctx.exit_script.is_empty() {
        let _ = writeln!(out, "{}", ctx.exit_script);
    }
    let _ = writeln!(out, "exit 0");
    out
}

/// Single-quote a value for bash, escaping embedded quotes.
fn quoted(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Parse a `job.status` file for the terminal message, if any.
///
/// Lines are `timestamp|message`; the poll path uses the last terminal
/// entry to reconcile a job that finished while unreachable.
pub fn parse_status_file(content: &str) -> Option<rota_core::message::JobMessage> {
    let mut terminal = None;
    for line in content.lines() {
        let message = line.split_once('|').map(|(_, m)| m).unwrap_or(line).trim();
        if message.is_empty() {
            continue;
        }
        let parsed = rota_core::message::JobMessage::parse(message);
        match parsed {
            rota_core::message::JobMessage::Succeeded
            | rota_core::message::JobMessage::Failed { .. } => terminal = Some(parsed),
            _ => {}
        }
    }
    terminal
}

#[cfg(test)]
#[path = "script_tests.rs"]
mod tests;
