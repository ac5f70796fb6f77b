// SPDX-License-Identifier: Apache-2.0

//! Unix-socket accept loop for the local API.
//!
//! One task per connection; requests within a connection are handled
//! strictly in order (the loop below never starts reading the next request
//! until the previous response has been written), while separate
//! connections proceed independently.

use crate::lifecycle::AppEngine;
use crate::protocol::{self, ProtocolError, Request, Response, DEFAULT_TIMEOUT, PROTOCOL_VERSION};
use std::sync::Arc;
use teleclaude_core::queue::MessageType;
use teleclaude_core::session::SessionId;
use teleclaude_engine::{EnqueueInbound, SessionFilter};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, warn};

pub async fn run(listener: UnixListener, engine: Arc<AppEngine>, shutdown: Arc<tokio::sync::Notify>) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => {
                        let engine = Arc::clone(&engine);
                        let shutdown = Arc::clone(&shutdown);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, &engine, &shutdown).await {
                                match e {
                                    ProtocolError::ConnectionClosed => debug!("client disconnected"),
                                    ProtocolError::Timeout => warn!("connection timed out"),
                                    other => error!(error = %other, "connection error"),
                                }
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "accept failed"),
                }
            }
            _ = shutdown.notified() => break,
        }
    }
}

async fn handle_connection(mut stream: UnixStream, engine: &Arc<AppEngine>, shutdown: &Arc<tokio::sync::Notify>) -> Result<(), ProtocolError> {
    loop {
        let request = protocol::read_request(&mut stream, DEFAULT_TIMEOUT).await?;
        let response = dispatch(request, engine, shutdown).await;
        protocol::write_response(&mut stream, &response, DEFAULT_TIMEOUT).await?;
    }
}

async fn dispatch(request: Request, engine: &Arc<AppEngine>, shutdown: &Arc<tokio::sync::Notify>) -> Response {
    match request {
        Request::Ping => Response::Pong,
        Request::Hello { .. } => Response::Hello { version: PROTOCOL_VERSION.to_string() },
        Request::Hook { envelope } => match engine.handle_agent_event(&envelope).await {
            Ok(()) => Response::Ok,
            Err(e) => Response::Error { message: e.to_string() },
        },
        Request::SendMessage { session_id, origin, content, source_message_id } => engine
            .enqueue_inbound(EnqueueInbound {
                session_id: SessionId::new(session_id),
                origin,
                message_type: MessageType::Text,
                content,
                source_message_id,
            })
            .map(|id| Response::Accepted { queued_id: id.to_string() })
            .unwrap_or_else(|e| Response::Error { message: e.to_string() }),
        Request::ListSessions => Response::Sessions { sessions: engine.list_sessions(SessionFilter::default()) },
        Request::GetSession { id } => Response::Session { session: engine.get_session(&SessionId::new(id)).map(Box::new) },
        Request::EndSession { id, reason } => engine
            .close_session(&SessionId::new(id), reason)
            .map(|_| Response::Ok)
            .unwrap_or_else(|e| Response::Error { message: e.to_string() }),
        Request::Escalate { id, reason } => {
            engine.enqueue_notification("escalations", id, reason);
            Response::Ok
        }
        Request::Shutdown => {
            shutdown.notify_waiters();
            Response::ShuttingDown
        }
    }
}
