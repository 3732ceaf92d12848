// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::flow::FlowSpec;

#[test]
fn serializes_with_command_tag() {
    let json = serde_json::to_value(&Command::Pause).unwrap();
    assert_eq!(json["command"], "pause");
}

#[test]
fn stop_mode_defaults_to_normal() {
    let cmd: Command = serde_json::from_str(r#"{"command":"stop"}"#).unwrap();
    assert_eq!(
        cmd,
        Command::Stop {
            mode: StopMode::Normal
        }
    );
}

#[test]
fn trigger_flow_defaults_to_all() {
    let cmd: Command =
        serde_json::from_str(r#"{"command":"trigger","tasks":["1/foo"]}"#).unwrap();
    assert_eq!(
        cmd,
        Command::Trigger {
            tasks: vec!["1/foo".to_string()],
            flow: FlowSpec::All,
        }
    );
}

#[test]
fn round_trips() {
    let cmds = vec![
        Command::Resume,
        Command::Stop {
            mode: StopMode::Kill,
        },
        Command::Hold {
            tasks: vec!["2/bar".into()],
        },
        Command::Set {
            task: "1/foo".into(),
            outputs: vec!["succeeded".into()],
        },
        Command::Reload,
    ];
    for cmd in cmds {
        let json = serde_json::to_string(&cmd).unwrap();
        let back: Command = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cmd);
    }
}

#[test]
fn names_are_stable() {
    assert_eq!(Command::Reload.name(), "reload");
    assert_eq!(
        Command::Stop {
            mode: StopMode::Now
        }
        .name(),
        "stop"
    );
}
