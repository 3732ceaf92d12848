// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control commands: everything that maps one-to-one onto a scheduler
//! [`Command`].

use crate::client::Client;
use crate::exit::CliError;
use rota_core::command::{Command, StopMode};
use rota_core::flow::FlowSpec;
use std::collections::HashMap;

pub async fn stop(workflow_id: &str, now: u8, kill: bool) -> Result<String, CliError> {
    let mode = if kill {
        StopMode::Kill
    } else {
        match now {
            0 => StopMode::Normal,
            1 => StopMode::Now,
            _ => StopMode::NowNow,
        }
    };
    Client::for_workflow(workflow_id)?
        .command(Command::Stop { mode })
        .await
}

pub async fn pause(workflow_id: &str) -> Result<String, CliError> {
    Client::for_workflow(workflow_id)?.command(Command::Pause).await
}

pub async fn resume(workflow_id: &str) -> Result<String, CliError> {
    Client::for_workflow(workflow_id)?.command(Command::Resume).await
}

/// `--flow=new|all|none|N[,M...]`
pub fn parse_flow(flow: Option<&str>) -> Result<FlowSpec, CliError> {
    match flow {
        None | Some("all") => Ok(FlowSpec::All),
        Some("new") => Ok(FlowSpec::New),
        Some("none") => Ok(FlowSpec::None),
        Some(numbers) => {
            let parsed: Result<Vec<u32>, _> =
                numbers.split(',').map(|n| n.trim().parse()).collect();
            match parsed {
                Ok(nums) if !nums.is_empty() => Ok(FlowSpec::Numbers(nums)),
                _ => Err(CliError::User(format!(
                    "bad --flow value (want new, all, none, or numbers): {numbers}"
                ))),
            }
        }
    }
}

pub async fn trigger(
    workflow_id: &str,
    tasks: Vec<String>,
    flow: Option<String>,
) -> Result<String, CliError> {
    let flow = parse_flow(flow.as_deref())?;
    Client::for_workflow(workflow_id)?
        .command(Command::Trigger { tasks, flow })
        .await
}

pub async fn hold(workflow_id: &str, tasks: Vec<String>) -> Result<String, CliError> {
    Client::for_workflow(workflow_id)?
        .command(Command::Hold { tasks })
        .await
}

pub async fn release(workflow_id: &str, tasks: Vec<String>) -> Result<String, CliError> {
    Client::for_workflow(workflow_id)?
        .command(Command::Release { tasks })
        .await
}

/// `rota set <id> <point/task[:output]> [--out output]...`
pub async fn set(
    workflow_id: &str,
    task: String,
    outputs: Vec<String>,
) -> Result<String, CliError> {
    // Accept the `point/task:output` shorthand too
    let (task, mut outputs) = match task.split_once(':') {
        Some((task, output)) => {
            let mut all = vec![output.to_string()];
            all.extend(outputs);
            (task.to_string(), all)
        }
        None => (task, outputs),
    };
    outputs.dedup();
    Client::for_workflow(workflow_id)?
        .command(Command::Set { task, outputs })
        .await
}

pub async fn kill(workflow_id: &str, tasks: Vec<String>) -> Result<String, CliError> {
    Client::for_workflow(workflow_id)?
        .command(Command::Kill { tasks })
        .await
}

pub async fn poll(workflow_id: &str, tasks: Vec<String>) -> Result<String, CliError> {
    Client::for_workflow(workflow_id)?
        .command(Command::Poll { tasks })
        .await
}

pub async fn reload(workflow_id: &str) -> Result<String, CliError> {
    Client::for_workflow(workflow_id)?.command(Command::Reload).await
}

pub async fn broadcast(
    workflow_id: &str,
    points: Vec<String>,
    namespaces: Vec<String>,
    settings: Vec<String>,
    clear: bool,
    expire: Option<String>,
) -> Result<String, CliError> {
    let mut parsed = HashMap::new();
    for setting in &settings {
        let Some((key, value)) = setting.split_once('=') else {
            return Err(CliError::User(format!(
                "bad --set value (want key=value): {setting}"
            )));
        };
        parsed.insert(key.trim().to_string(), value.trim().to_string());
    }
    if parsed.is_empty() && !clear && expire.is_none() {
        return Err(CliError::User(
            "broadcast needs --set, --clear, or --expire".to_string(),
        ));
    }
    Client::for_workflow(workflow_id)?
        .command(Command::Broadcast {
            cycle_points: points,
            namespaces,
            settings: parsed,
            clear,
            expire,
        })
        .await
}

pub async fn status(workflow_id: &str) -> Result<String, CliError> {
    use rota_daemon::protocol::{Request, Response};
    let client = Client::for_workflow(workflow_id)?;
    match client.request(&Request::Status).await? {
        Response::Status { report } => {
            let mut out = String::new();
            out.push_str(&format!(
                "{}: {} task(s){}{}\n",
                report.workflow_id,
                report.pool_size,
                if report.paused { " [paused]" } else { "" },
                if report.stalled { " [stalled]" } else { "" },
            ));
            for task in &report.tasks {
                out.push_str(&format!(
                    "  {} {}{}\n",
                    task.id,
                    task.state,
                    if task.is_held { " (held)" } else { "" },
                ));
            }
            Ok(out)
        }
        Response::Error { message } => Err(CliError::User(message)),
        other => Err(CliError::Transport(format!("unexpected response: {other:?}"))),
    }
}

#[cfg(test)]
#[path = "control_tests.rs"]
mod tests;
