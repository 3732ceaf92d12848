// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job status messages.
//!
//! Running jobs report state with short text messages, either over the
//! scheduler's message channel or via the `job.status` file picked up by
//! polling. `parse` accepts the wire forms; unrecognised text becomes a
//! custom message at INFO severity.

use crate::outputs;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity tag on custom messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        };
        write!(f, "{s}")
    }
}

/// A message from a job about its own progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum JobMessage {
    Started,
    Succeeded,
    Failed {
        /// Signal name when the job was killed, e.g. `SIGTERM`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signal: Option<String>,
    },
    /// Platform preemption: the job will restart without consuming a retry
    Vacated {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signal: Option<String>,
    },
    /// Emission of a declared custom output: `name=message`
    Output { output: String, message: String },
    /// Free-text message with severity
    Custom { severity: Severity, text: String },
}

impl JobMessage {
    /// Parse the wire form.
    ///
    /// `started`, `succeeded`, `failed`, `failed/SIGTERM`,
    /// `vacated/SIGKILL`, `WARNING: text`, `CRITICAL: text`,
    /// `name=the quick brown fox`.
    pub fn parse(text: &str) -> JobMessage {
        let text = text.trim();
        match text {
            outputs::OUT_STARTED => return JobMessage::Started,
            outputs::OUT_SUCCEEDED => return JobMessage::Succeeded,
            outputs::OUT_FAILED => return JobMessage::Failed { signal: None },
            "vacated" => return JobMessage::Vacated { signal: None },
            _ => {}
        }
        if let Some(signal) = text.strip_prefix("failed/") {
            return JobMessage::Failed {
                signal: Some(signal.to_string()),
            };
        }
        if let Some(signal) = text.strip_prefix("vacated/") {
            return JobMessage::Vacated {
                signal: Some(signal.to_string()),
            };
        }
        if let Some(rest) = text.strip_prefix("WARNING:") {
            return JobMessage::Custom {
                severity: Severity::Warning,
                text: rest.trim().to_string(),
            };
        }
        if let Some(rest) = text.strip_prefix("CRITICAL:") {
            return JobMessage::Custom {
                severity: Severity::Critical,
                text: rest.trim().to_string(),
            };
        }
        if let Some((output, message)) = text.split_once('=') {
            let output = output.trim();
            if !output.is_empty() && !output.contains(char::is_whitespace) {
                return JobMessage::Output {
                    output: output.to_string(),
                    message: message.trim().to_string(),
                };
            }
        }
        JobMessage::Custom {
            severity: Severity::Info,
            text: text.to_string(),
        }
    }
}

impl fmt::Display for JobMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobMessage::Started => write!(f, "started"),
            JobMessage::Succeeded => write!(f, "succeeded"),
            JobMessage::Failed { signal: None } => write!(f, "failed"),
            JobMessage::Failed {
                signal: Some(signal),
            } => write!(f, "failed/{signal}"),
            JobMessage::Vacated { signal: None } => write!(f, "vacated"),
            JobMessage::Vacated {
                signal: Some(signal),
            } => write!(f, "vacated/{signal}"),
            JobMessage::Output { output, message } => write!(f, "{output}={message}"),
            JobMessage::Custom { severity, text } => match severity {
                Severity::Info => write!(f, "{text}"),
                _ => write!(f, "{severity}: {text}"),
            },
        }
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
