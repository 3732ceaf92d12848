// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! rotad: the rota workflow scheduler daemon.
//!
//! Usually started by `rota play`, which waits for the contact file to
//! appear. One process per running workflow.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::sync::Arc;
use std::time::Duration;

use rota_core::clock::SystemClock;
use rota_daemon::lifecycle::{self, StartupResult};
use rota_daemon::listener::{ListenCtx, Listener};
use rota_daemon::scheduler::{Scheduler, ShutdownReason};
use rota_platform::ShellDriverFactory;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

/// Scheduler tick interval (~1s, configurable via `ROTA_TICK_MS`).
fn tick_interval() -> Duration {
    std::env::var("ROTA_TICK_MS")
        .ok()
        .and_then(|ms| ms.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(1))
}

#[tokio::main]
async fn main() {
    let exit_code = run().await;
    std::process::exit(exit_code);
}

async fn run() -> i32 {
    let mut args = std::env::args().skip(1);
    let workflow_id = match args.next() {
        Some(arg) if arg == "--help" || arg == "-h" => {
            println!("rotad {}", env!("CARGO_PKG_VERSION"));
            println!("rota workflow scheduler daemon");
            println!();
            println!("USAGE:");
            println!("    rotad <workflow-id>");
            println!();
            println!("The daemon is typically started by `rota play` and should not");
            println!("be invoked directly. It listens on a TCP port recorded in the");
            println!("workflow's contact file.");
            return 0;
        }
        Some(arg) if arg == "--version" || arg == "-V" => {
            println!("rotad {}", env!("CARGO_PKG_VERSION"));
            return 0;
        }
        Some(id) => id,
        None => {
            eprintln!("Usage: rotad <workflow-id>");
            return 1;
        }
    };

    let run_dir = match lifecycle::run_dir_for(&workflow_id) {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("rotad: {e}");
            return 1;
        }
    };

    let _log_guard = match setup_logging(&run_dir) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("rotad: cannot set up logging: {e}");
            return 1;
        }
    };

    info!(workflow = %workflow_id, run_dir = %run_dir.display(), "starting scheduler");

    let StartupResult {
        config,
        db,
        listener: tcp_listener,
        port,
        secret,
        is_restart,
        ..
    } = match lifecycle::startup(&run_dir).await {
        Ok(result) => result,
        Err(e) => {
            error!("failed to start: {e}");
            eprintln!("rotad: {e}");
            return 1;
        }
    };

    let mut scheduler = Scheduler::new(
        Arc::clone(&config),
        workflow_id.clone(),
        run_dir.clone(),
        db,
        Arc::new(ShellDriverFactory::default()),
        SystemClock,
    );

    let startup_result = if is_restart {
        info!("restarting from the state database");
        scheduler.restart()
    } else {
        info!("cold start");
        scheduler.cold_start()
    };
    if let Err(e) = startup_result {
        error!("failed to initialize the task pool: {e}");
        lifecycle::remove_contact_file(&run_dir);
        return 1;
    }

    // Spawn the listener task
    let ctx = Arc::new(ListenCtx {
        intake: scheduler.intake_sender(),
        events: scheduler.event_sender(),
        secret,
        calendar: config.calendar,
    });
    tokio::spawn(Listener::new(tcp_listener, ctx).run());

    info!(port, "scheduler ready");
    println!("READY");

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("cannot install SIGTERM handler: {e}");
            return 1;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!("cannot install SIGINT handler: {e}");
            return 1;
        }
    };

    // NOTE: the interval lives outside the loop so ticks keep their
    // cadence during bursts of activity.
    let mut ticker = tokio::time::interval(tick_interval());
    let reason = loop {
        tokio::select! {
            _ = ticker.tick() => {
                match scheduler.tick().await {
                    Ok(Some(reason)) => break reason,
                    Ok(None) => {}
                    Err(e) => {
                        // Unhandled tick errors attempt a clean shutdown
                        // with a final checkpoint
                        error!("scheduler tick failed: {e}");
                        break ShutdownReason::Fatal(e.to_string());
                    }
                }
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                break ShutdownReason::Stop(rota_core::command::StopMode::Now);
            }
            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                break ShutdownReason::Stop(rota_core::command::StopMode::Now);
            }
        }
    };

    if let Err(e) = scheduler.finalize() {
        error!("failed to write final checkpoint: {e}");
    }
    lifecycle::remove_contact_file(&run_dir);

    match reason {
        ShutdownReason::Finished | ShutdownReason::Stop(_) => {
            info!("scheduler stopped");
            0
        }
        ShutdownReason::StallTimeout => {
            error!("scheduler aborted on stall timeout");
            1
        }
        ShutdownReason::InactivityTimeout => {
            error!("scheduler aborted on inactivity timeout");
            1
        }
        ShutdownReason::Fatal(message) => {
            error!("scheduler aborted: {message}");
            1
        }
    }
}

/// Maximum scheduler log size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated logs to keep.
const MAX_ROTATED_LOGS: u32 = 3;

fn setup_logging(
    run_dir: &std::path::Path,
) -> std::io::Result<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_dir = rota_engine::paths::scheduler_log_dir(run_dir);
    std::fs::create_dir_all(&log_dir)?;
    let log_path = rota_engine::paths::scheduler_log_path(run_dir);
    rotate_log_if_needed(&log_path);

    let file_appender = tracing_appender::rolling::never(&log_dir, "log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}

/// Shift `log` -> `log.1` -> `log.2` -> `log.3` when over the size cap.
/// Best-effort: rotation failures never block startup.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };
    if size < MAX_LOG_SIZE {
        return;
    }
    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let _ = std::fs::rename(format!("{log_str}.{i}"), format!("{log_str}.{}", i + 1));
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}
