// SPDX-License-Identifier: Apache-2.0

//! Session management: the tmux pane each coordinated session runs in.

mod noop;
mod tmux;

pub use noop::NoOpSessionAdapter;
pub use tmux::TmuxAdapter;

#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeSession, FakeSessionAdapter, SessionCall};

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("command failed: {0}")]
    CommandFailed(String),
}

/// Adapter for managing the tmux pane a session's CLI agent runs in.
#[async_trait]
pub trait SessionAdapter: Clone + Send + Sync + 'static {
    /// Spawn a new tmux session running `cmd` in `cwd`.
    async fn spawn(
        &self,
        name: &str,
        cwd: &Path,
        cmd: &str,
        env: &[(String, String)],
    ) -> Result<String, SessionError>;

    /// Send input followed by the session's submit key (`Enter`).
    async fn send(&self, id: &str, input: &str) -> Result<(), SessionError>;

    /// Send literal text with no key-name interpretation (e.g. for
    /// strings starting with `-` or containing tmux key syntax).
    async fn send_literal(&self, id: &str, text: &str) -> Result<(), SessionError>;

    /// Send the Enter key on its own.
    async fn send_enter(&self, id: &str) -> Result<(), SessionError>;

    /// Kill the session's pane. Idempotent: killing an already-dead
    /// session is not an error.
    async fn kill(&self, id: &str) -> Result<(), SessionError>;

    async fn is_alive(&self, id: &str) -> Result<bool, SessionError>;

    /// Capture the trailing `lines` of pane output.
    async fn capture_output(&self, id: &str, lines: u32) -> Result<String, SessionError>;

    /// Check whether a process matching `pattern` is running inside the pane.
    async fn is_process_running(&self, id: &str, pattern: &str) -> Result<bool, SessionError>;

    /// Exit code of the pane's process, or `None` while it's still running.
    async fn get_exit_code(&self, id: &str) -> Result<Option<i32>, SessionError>;
}
