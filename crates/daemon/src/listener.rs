// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TCP listener task: accepts connections, decodes frames, and routes
//! requests to the scheduler over typed channels.

use crate::protocol::{self, Request, Response};
use crate::scheduler::Intake;
use rota_core::message::JobMessage;
use rota_core::point::{Calendar, CyclePoint};
use rota_core::task::TaskId;
use rota_engine::events::SchedulerEvent;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};

/// Shared context for connection handlers.
pub struct ListenCtx {
    pub intake: mpsc::Sender<Intake>,
    pub events: mpsc::Sender<SchedulerEvent>,
    /// Shared secret from `.service/secret`, required on job messages
    pub secret: String,
    pub calendar: Option<Calendar>,
}

/// The accept loop. One bounded task per connection.
pub struct Listener {
    listener: TcpListener,
    ctx: Arc<ListenCtx>,
}

impl Listener {
    pub fn new(listener: TcpListener, ctx: Arc<ListenCtx>) -> Self {
        Self { listener, ctx }
    }

    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "connection accepted");
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, ctx).await {
                            tracing::debug!(error = %e, "connection closed with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                }
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    ctx: Arc<ListenCtx>,
) -> Result<(), protocol::ProtocolError> {
    let request: Request = protocol::read_frame(&mut stream).await?;
    let response = dispatch(request, &ctx).await;
    protocol::write_frame(&mut stream, &response).await
}

async fn dispatch(request: Request, ctx: &ListenCtx) -> Response {
    match request {
        Request::Ping => Response::Pong,

        Request::Command { command } => {
            let (reply_tx, reply_rx) = oneshot::channel();
            let sent = ctx
                .intake
                .send(Intake::Control {
                    command,
                    reply: reply_tx,
                })
                .await;
            if sent.is_err() {
                return Response::Error {
                    message: "scheduler is shutting down".to_string(),
                };
            }
            match reply_rx.await {
                Ok(Ok(message)) => Response::Ok { message },
                Ok(Err(message)) => Response::Error { message },
                Err(_) => Response::Error {
                    message: "scheduler dropped the request".to_string(),
                },
            }
        }

        Request::Message {
            secret,
            job,
            messages,
        } => {
            if secret != ctx.secret {
                tracing::warn!("job message with bad secret rejected");
                return Response::Error {
                    message: "authentication failed".to_string(),
                };
            }
            let Some((cycle, name, submit_num)) = protocol::parse_job_token(&job) else {
                return Response::Error {
                    message: format!("bad job token: {job}"),
                };
            };
            let Ok(point) = CyclePoint::parse(&cycle, ctx.calendar) else {
                return Response::Error {
                    message: format!("bad cycle point in job token: {cycle}"),
                };
            };
            let task = TaskId::new(name, point);
            // FIFO per connection: messages from one job arrive in order
            for text in &messages {
                let event = SchedulerEvent::Message {
                    task: task.clone(),
                    submit_num,
                    message: JobMessage::parse(text),
                };
                if ctx.events.send(event).await.is_err() {
                    return Response::Error {
                        message: "scheduler is shutting down".to_string(),
                    };
                }
            }
            Response::Ok {
                message: format!("{} message(s) accepted", messages.len()),
            }
        }

        Request::Status => {
            let (reply_tx, reply_rx) = oneshot::channel();
            let sent = ctx.intake.send(Intake::Query { reply: reply_tx }).await;
            if sent.is_err() {
                return Response::Error {
                    message: "scheduler is shutting down".to_string(),
                };
            }
            match reply_rx.await {
                Ok(report) => Response::Status { report },
                Err(_) => Response::Error {
                    message: "scheduler dropped the query".to_string(),
                },
            }
        }
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
