// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::protocol::{read_frame, write_frame, Request, Response};
use rota_core::command::Command;
use tokio::sync::mpsc;

struct Wiring {
    addr: std::net::SocketAddr,
    intake_rx: mpsc::Receiver<Intake>,
    event_rx: mpsc::Receiver<SchedulerEvent>,
}

async fn start_listener() -> Wiring {
    let (intake_tx, intake_rx) = mpsc::channel(8);
    let (event_tx, event_rx) = mpsc::channel(8);
    let tcp = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = tcp.local_addr().expect("addr");
    let ctx = Arc::new(ListenCtx {
        intake: intake_tx,
        events: event_tx,
        secret: "s3cret".to_string(),
        calendar: None,
    });
    tokio::spawn(Listener::new(tcp, ctx).run());
    Wiring {
        addr,
        intake_rx,
        event_rx,
    }
}

async fn roundtrip(addr: std::net::SocketAddr, request: &Request) -> Response {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    write_frame(&mut stream, request).await.expect("write");
    read_frame(&mut stream).await.expect("read")
}

#[tokio::test]
async fn ping_pongs() {
    let wiring = start_listener().await;
    let response = roundtrip(wiring.addr, &Request::Ping).await;
    assert!(matches!(response, Response::Pong));
}

#[tokio::test]
async fn command_routes_to_intake_and_replies() {
    let mut wiring = start_listener().await;
    let addr = wiring.addr;

    let client = tokio::spawn(async move {
        roundtrip(
            addr,
            &Request::Command {
                command: Command::Pause,
            },
        )
        .await
    });

    // Play the scheduler's role: answer the control request
    let Some(Intake::Control { command, reply }) = wiring.intake_rx.recv().await else {
        panic!("expected a control request");
    };
    assert_eq!(command, Command::Pause);
    reply.send(Ok("paused".to_string())).unwrap();

    let response = client.await.unwrap();
    assert!(matches!(response, Response::Ok { message } if message == "paused"));
}

#[tokio::test]
async fn authenticated_message_becomes_events() {
    let mut wiring = start_listener().await;

    let response = roundtrip(
        wiring.addr,
        &Request::Message {
            secret: "s3cret".to_string(),
            job: "1/foo/01".to_string(),
            messages: vec!["started".to_string(), "succeeded".to_string()],
        },
    )
    .await;
    assert!(matches!(response, Response::Ok { .. }));

    // FIFO: started then succeeded, both for submit 1
    let first = wiring.event_rx.recv().await.unwrap();
    let SchedulerEvent::Message {
        task,
        submit_num,
        message,
    } = first
    else {
        panic!("expected a message event");
    };
    assert_eq!(task.to_string(), "1/foo");
    assert_eq!(submit_num, 1);
    assert_eq!(message, JobMessage::Started);

    let second = wiring.event_rx.recv().await.unwrap();
    assert!(matches!(
        second,
        SchedulerEvent::Message {
            message: JobMessage::Succeeded,
            ..
        }
    ));
}

#[tokio::test]
async fn bad_secret_is_rejected() {
    let mut wiring = start_listener().await;

    let response = roundtrip(
        wiring.addr,
        &Request::Message {
            secret: "wrong".to_string(),
            job: "1/foo/01".to_string(),
            messages: vec!["started".to_string()],
        },
    )
    .await;
    assert!(matches!(response, Response::Error { .. }));
    assert!(
        wiring.event_rx.try_recv().is_err(),
        "no events from an unauthenticated client"
    );
}

#[tokio::test]
async fn bad_job_token_is_an_error() {
    let wiring = start_listener().await;
    let response = roundtrip(
        wiring.addr,
        &Request::Message {
            secret: "s3cret".to_string(),
            job: "nonsense".to_string(),
            messages: vec!["started".to_string()],
        },
    )
    .await;
    assert!(matches!(response, Response::Error { .. }));
}

#[tokio::test]
async fn status_query_round_trips() {
    let mut wiring = start_listener().await;
    let addr = wiring.addr;

    let client = tokio::spawn(async move { roundtrip(addr, &Request::Status).await });

    let Some(Intake::Query { reply }) = wiring.intake_rx.recv().await else {
        panic!("expected a query");
    };
    reply
        .send(crate::scheduler::StatusReport {
            workflow_id: "demo".to_string(),
            paused: false,
            stalled: false,
            pool_size: 0,
            state_counts: Default::default(),
            tasks: vec![],
        })
        .unwrap();

    let response = client.await.unwrap();
    assert!(matches!(response, Response::Status { report } if report.workflow_id == "demo"));
}
