// SPDX-License-Identifier: Apache-2.0

//! IPC protocol for the local Unix-socket API.
//!
//! Wire format: 4-byte big-endian length prefix, then a JSON payload.
//! Requests on one connection are handled in order; concurrent connections
//! are independent.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use teleclaude_core::hook::HookEnvelope;
use teleclaude_core::session::{AdapterKey, Session};
use thiserror::Error;

pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;
pub const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },
    #[error("connection closed")]
    ConnectionClosed,
    #[error("timeout")]
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    Ping,
    Hello { version: String },
    /// A short-lived hook-script process handing off a parsed envelope.
    Hook { envelope: HookEnvelope },
    /// An inbound chat message admitted by an adapter.
    SendMessage {
        session_id: String,
        origin: AdapterKey,
        content: String,
        source_message_id: Option<String>,
    },
    ListSessions,
    GetSession { id: String },
    EndSession { id: String, reason: String },
    /// Promote a session to human relay.
    Escalate { id: String, reason: String },
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Ok,
    Pong,
    Hello { version: String },
    ShuttingDown,
    Accepted { queued_id: String },
    Sessions { sessions: Vec<Session> },
    Session { session: Option<Box<Session>> },
    Error { message: String },
}

pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    let json = serde_json::to_vec(msg)?;
    if json.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge { size: json.len(), max: MAX_MESSAGE_SIZE });
    }
    Ok(json)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

pub async fn read_message<R: tokio::io::AsyncReadExt + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(ProtocolError::ConnectionClosed),
        Err(e) => return Err(ProtocolError::Io(e)),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge { size: len, max: MAX_MESSAGE_SIZE });
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

pub async fn write_message<W: tokio::io::AsyncWriteExt + Unpin>(writer: &mut W, data: &[u8]) -> Result<(), ProtocolError> {
    let len = data.len();
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge { size: len, max: MAX_MESSAGE_SIZE });
    }
    writer.write_all(&(len as u32).to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_request<R: tokio::io::AsyncReadExt + Unpin>(reader: &mut R, timeout: std::time::Duration) -> Result<Request, ProtocolError> {
    let bytes = tokio::time::timeout(timeout, read_message(reader)).await.map_err(|_| ProtocolError::Timeout)??;
    decode(&bytes)
}

pub async fn write_response<W: tokio::io::AsyncWriteExt + Unpin>(writer: &mut W, response: &Response, timeout: std::time::Duration) -> Result<(), ProtocolError> {
    let data = encode(response)?;
    tokio::time::timeout(timeout, write_message(writer, &data)).await.map_err(|_| ProtocolError::Timeout)?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_request_over_an_in_memory_pipe() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let req = Request::Ping;
        let bytes = encode(&req).unwrap();
        write_message(&mut client, &bytes).await.unwrap();
        let decoded: Request = decode(&read_message(&mut server).await.unwrap()).unwrap();
        assert!(matches!(decoded, Request::Ping));
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let huge = "x".repeat(MAX_MESSAGE_SIZE + 1);
        let err = encode(&Request::Hello { version: huge }).unwrap_err();
        assert!(matches!(err, ProtocolError::MessageTooLarge { .. }));
    }
}
