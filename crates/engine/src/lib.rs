// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rota-engine: the task pool and job lifecycle machinery

pub mod error;
pub mod events;
pub mod jobs;
pub mod paths;
pub mod pool;
pub mod proxy;
pub mod script;
pub mod timers;

pub use error::EngineError;
pub use events::{SchedulerEvent, SubmitOutcome};
pub use jobs::JobManager;
pub use pool::TaskPool;
pub use proxy::TaskProxy;
pub use timers::{TimerKind, Timers};
