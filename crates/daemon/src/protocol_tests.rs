// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use rota_core::command::StopMode;

#[tokio::test]
async fn frame_round_trips() {
    let request = Request::Command {
        command: Command::Stop {
            mode: StopMode::Kill,
        },
    };
    let mut buf = Vec::new();
    write_frame(&mut buf, &request).await.unwrap();

    let mut cursor = std::io::Cursor::new(buf);
    let back: Request = read_frame(&mut cursor).await.unwrap();
    assert_eq!(back, request);
}

#[tokio::test]
async fn oversized_frame_is_rejected() {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(MAX_FRAME + 1).to_be_bytes());
    let mut cursor = std::io::Cursor::new(buf);
    let result: Result<Request, _> = read_frame(&mut cursor).await;
    assert!(matches!(result, Err(ProtocolError::FrameTooLarge(_))));
}

#[tokio::test]
async fn truncated_frame_is_an_io_error() {
    let mut buf = Vec::new();
    buf.extend_from_slice(&100u32.to_be_bytes());
    buf.extend_from_slice(b"short");
    let mut cursor = std::io::Cursor::new(buf);
    let result: Result<Request, _> = read_frame(&mut cursor).await;
    assert!(matches!(result, Err(ProtocolError::Io(_))));
}

#[test]
fn request_serializes_with_type_tag() {
    let json = serde_json::to_value(&Request::Ping).unwrap();
    assert_eq!(json["type"], "Ping");
}

#[yare::parameterized(
    simple    = { "1/foo/01", ("1", "foo", 1) },
    datetime  = { "20200101T0000Z/bar/12", ("20200101T0000Z", "bar", 12) },
)]
fn job_token_parses(token: &str, expected: (&str, &str, u32)) {
    let (cycle, name, submit) = parse_job_token(token).unwrap();
    assert_eq!(
        (cycle.as_str(), name.as_str(), submit),
        expected
    );
}

#[test]
fn bad_job_token_is_none() {
    assert!(parse_job_token("no-slashes").is_none());
    assert!(parse_job_token("1/foo/not-a-number").is_none());
}

#[tokio::test]
async fn message_request_round_trips() {
    let request = Request::Message {
        secret: "s3cret".to_string(),
        job: "1/foo/01".to_string(),
        messages: vec!["started".to_string(), "x=the quick brown fox".to_string()],
    };
    let mut buf = Vec::new();
    write_frame(&mut buf, &request).await.unwrap();
    let mut cursor = std::io::Cursor::new(buf);
    let back: Request = read_frame(&mut cursor).await.unwrap();
    assert_eq!(back, request);
}
