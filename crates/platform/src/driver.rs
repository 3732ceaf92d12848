// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The platform driver abstraction.

use crate::error::PlatformError;
use async_trait::async_trait;
use rota_config::PlatformDef;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// A job as known to its batch system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedJob {
    pub platform: String,
    /// The host the job was submitted through
    pub host: String,
    pub job_id: String,
}

/// Result of polling a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollStatus {
    /// Accepted but not yet running
    Queued,
    /// Executing
    RunningNow,
    /// Gone from the batch system; consult `job.status` for the outcome
    Exited,
}

/// Capabilities a platform provides: submit, poll, kill, install, clean.
///
/// Implementations must not block the scheduler: the job manager runs
/// them on spawned tasks and feeds results back over a channel.
#[async_trait]
pub trait PlatformDriver: Send + Sync + 'static {
    /// Submit the rendered job script; returns the batch system's job id.
    async fn submit(&self, script: &Path, job_dir: &Path) -> Result<SubmittedJob, PlatformError>;

    async fn poll(&self, job: &SubmittedJob) -> Result<PollStatus, PlatformError>;

    async fn kill(&self, job: &SubmittedJob) -> Result<(), PlatformError>;

    /// Copy the job directory tree to the platform's install target.
    async fn install(&self, src: &Path) -> Result<(), PlatformError>;

    /// Remove installed files from the platform's install target.
    async fn clean(&self, target: &Path) -> Result<(), PlatformError>;
}

/// Builds a driver for a resolved platform definition.
///
/// The scheduler keeps one factory; the job manager asks it for drivers
/// as tasks resolve their platforms at submit time.
pub trait DriverFactory: Send + Sync + 'static {
    fn driver_for(&self, platform: &PlatformDef) -> Arc<dyn PlatformDriver>;
}
