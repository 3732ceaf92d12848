// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rota-storage: the SQLite state database.
//!
//! Every task transition the scheduler makes is recorded here, one
//! transaction per main-loop tick. Restart reads the `task_pool`,
//! `task_outputs`, and `task_prerequisites` tables back to reconstruct
//! the pool exactly.

pub mod checkpoint;
pub mod db;
pub mod error;

pub use checkpoint::CheckpointEvent;
pub use db::{DbOp, JobRow, OutputsRow, PoolRow, PrereqRow, StateDb};
pub use error::DbError;
