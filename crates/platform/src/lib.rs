// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rota-platform: job submission drivers for local and remote batch systems

pub mod batch;
pub mod command;
pub mod driver;
pub mod error;
pub mod hosts;
pub mod shell;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeDriverFactory, FakeExecutor, FakePlatform, PlatformCall};

pub use command::{CommandExecutor, CommandOutput, ShellExecutor};
pub use driver::{DriverFactory, PlatformDriver, PollStatus, SubmittedJob};
pub use error::PlatformError;
pub use hosts::HostPool;
pub use shell::{ShellDriver, ShellDriverFactory};
