// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! rota: the workflow scheduler CLI.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use clap::{ArgAction, Parser, Subcommand};
use rota_cli::commands::{clean, control, message, play, state};
use rota_cli::exit::CliError;

#[derive(Parser)]
#[command(name = "rota", version, about = "Cycling workflow scheduler")]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Start (or restart) a workflow's scheduler
    Play { workflow_id: String },

    /// Stop a running workflow
    Stop {
        workflow_id: String,
        /// Don't wait for active jobs (twice: skip event handling too)
        #[arg(long, action = ArgAction::Count)]
        now: u8,
        /// Kill active jobs before stopping
        #[arg(long)]
        kill: bool,
    },

    /// Pause the workflow (nothing new submits)
    Pause { workflow_id: String },

    /// Resume a paused workflow
    Resume { workflow_id: String },

    /// Force tasks to run, ignoring unsatisfied prerequisites
    Trigger {
        workflow_id: String,
        /// Task selectors, `point/name`
        tasks: Vec<String>,
        /// Flow assignment: new, all, none, or flow numbers
        #[arg(long)]
        flow: Option<String>,
    },

    /// Hold tasks (they are never ready while held)
    Hold {
        workflow_id: String,
        tasks: Vec<String>,
    },

    /// Release held tasks
    Release {
        workflow_id: String,
        tasks: Vec<String>,
    },

    /// Artificially complete task outputs
    Set {
        workflow_id: String,
        /// Task selector, `point/name[:output]`
        task: String,
        /// Outputs to complete (default: succeeded)
        #[arg(long = "out")]
        outputs: Vec<String>,
    },

    /// Kill running jobs
    Kill {
        workflow_id: String,
        tasks: Vec<String>,
    },

    /// Poll jobs for their batch status now
    Poll {
        workflow_id: String,
        tasks: Vec<String>,
    },

    /// Reload the workflow definition
    Reload { workflow_id: String },

    /// Override runtime settings of matching tasks
    Broadcast {
        workflow_id: String,
        /// Cycle point scope (repeatable; `*` for all)
        #[arg(short = 'p', long = "point")]
        points: Vec<String>,
        /// Task name scope (repeatable; default root)
        #[arg(short = 'n', long = "namespace")]
        namespaces: Vec<String>,
        /// Setting, `key=value` (repeatable)
        #[arg(short = 's', long = "set")]
        settings: Vec<String>,
        /// Clear matching broadcasts instead of setting
        #[arg(long)]
        clear: bool,
        /// Expire point-scoped broadcasts earlier than this point
        #[arg(long)]
        expire: Option<String>,
    },

    /// Report job progress (invoked by job scripts)
    Message {
        workflow_id: String,
        /// Job token, `cycle/name/NN`
        job: String,
        messages: Vec<String>,
    },

    /// Query another workflow's state database
    WorkflowState {
        /// Target, `workflow-id//point/task[:selector]`
        target: String,
        #[arg(long, default_value_t = 1)]
        max_polls: u32,
        /// Seconds between polls
        #[arg(long, default_value_t = 10)]
        interval: u64,
        /// Match task messages/outputs rather than status
        #[arg(long)]
        messages: bool,
    },

    /// Show a running workflow's task pool
    Status { workflow_id: String },

    /// Remove a stopped workflow's run directory
    Clean { workflow_id: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(output) => {
            if !output.is_empty() {
                println!("{output}");
            }
        }
        Err(e) => {
            eprintln!("rota: {e:#}");
            let code = e
                .downcast_ref::<CliError>()
                .map(CliError::exit_code)
                .unwrap_or(1);
            std::process::exit(code);
        }
    }
}

async fn run(command: Cmd) -> anyhow::Result<String> {
    let output = match command {
        Cmd::Play { workflow_id } => play::play(&workflow_id).await?,
        Cmd::Stop {
            workflow_id,
            now,
            kill,
        } => control::stop(&workflow_id, now, kill).await?,
        Cmd::Pause { workflow_id } => control::pause(&workflow_id).await?,
        Cmd::Resume { workflow_id } => control::resume(&workflow_id).await?,
        Cmd::Trigger {
            workflow_id,
            tasks,
            flow,
        } => control::trigger(&workflow_id, tasks, flow).await?,
        Cmd::Hold { workflow_id, tasks } => control::hold(&workflow_id, tasks).await?,
        Cmd::Release { workflow_id, tasks } => control::release(&workflow_id, tasks).await?,
        Cmd::Set {
            workflow_id,
            task,
            outputs,
        } => control::set(&workflow_id, task, outputs).await?,
        Cmd::Kill { workflow_id, tasks } => control::kill(&workflow_id, tasks).await?,
        Cmd::Poll { workflow_id, tasks } => control::poll(&workflow_id, tasks).await?,
        Cmd::Reload { workflow_id } => control::reload(&workflow_id).await?,
        Cmd::Broadcast {
            workflow_id,
            points,
            namespaces,
            settings,
            clear,
            expire,
        } => control::broadcast(&workflow_id, points, namespaces, settings, clear, expire).await?,
        Cmd::Message {
            workflow_id,
            job,
            messages,
        } => message::message(&workflow_id, job, messages).await?,
        Cmd::WorkflowState {
            target,
            max_polls,
            interval,
            messages,
        } => state::workflow_state(&target, max_polls, interval, messages).await?,
        Cmd::Status { workflow_id } => control::status(&workflow_id).await?,
        Cmd::Clean { workflow_id } => clean::clean(&workflow_id).await?,
    };
    Ok(output)
}
