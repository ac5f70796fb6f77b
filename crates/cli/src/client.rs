// SPDX-License-Identifier: Apache-2.0

//! Unix-socket client for talking to `teleclauded`.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use teleclaude_daemon::protocol::{self, ProtocolError};
use teleclaude_daemon::{Request, Response, DEFAULT_TIMEOUT};
use thiserror::Error;
use tokio::net::UnixStream;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("daemon not running")]
    DaemonNotRunning,
    #[error("failed to start daemon: {0}")]
    DaemonStartFailed(String),
    #[error("timed out waiting for the daemon to come up")]
    StartTimeout,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

fn socket_path() -> PathBuf {
    std::env::var("DAEMON_SOCKET_PATH").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("/tmp/teleclaude-api.sock"))
}

/// Connect to an already-running daemon; does not attempt to start one.
pub async fn connect() -> Result<UnixStream, ClientError> {
    UnixStream::connect(socket_path()).await.map_err(|_| ClientError::DaemonNotRunning)
}

pub async fn send_request(request: Request) -> Result<Response, ClientError> {
    let mut stream = connect().await?;
    let bytes = protocol::encode(&request)?;
    protocol::write_message(&mut stream, &bytes).await?;
    let response_bytes = tokio::time::timeout(DEFAULT_TIMEOUT, protocol::read_message(&mut stream)).await.map_err(|_| ProtocolError::Timeout)??;
    Ok(protocol::decode(&response_bytes)?)
}

/// Spawn `teleclauded` detached, then poll the socket until it accepts a
/// connection or `timeout` elapses.
pub async fn start_daemon(timeout: Duration) -> Result<(), ClientError> {
    let binary = daemon_binary_path();
    Command::new(&binary)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| ClientError::DaemonStartFailed(e.to_string()))?;

    let start = Instant::now();
    while start.elapsed() < timeout {
        if connect().await.is_ok() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    Err(ClientError::StartTimeout)
}

pub async fn stop_daemon() -> Result<(), ClientError> {
    send_request(Request::Shutdown).await?;
    Ok(())
}

fn daemon_binary_path() -> PathBuf {
    if let Ok(path) = std::env::var("TELECLAUDE_DAEMON_BIN") {
        return PathBuf::from(path);
    }
    std::env::current_exe().ok().and_then(|p| p.parent().map(|dir| dir.join("teleclauded"))).unwrap_or_else(|| PathBuf::from("teleclauded"))
}
