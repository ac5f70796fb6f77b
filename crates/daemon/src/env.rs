// SPDX-License-Identifier: Apache-2.0

//! State-directory and tunable resolution from environment variables.

use std::path::PathBuf;

/// Directory holding the WAL, snapshot, lock file, and log. Resolution
/// order mirrors XDG conventions: an explicit override first, then the
/// platform state-home, then a dotfile fallback.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("TELECLAUDE_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(state_home) = dirs::state_dir() {
        return state_home.join("teleclaude");
    }
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".local/state/teleclaude")
}

/// Unix-socket path for the local API.
pub fn socket_path() -> PathBuf {
    std::env::var("DAEMON_SOCKET_PATH").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("/tmp/teleclaude-api.sock"))
}

/// Poll interval for the daemon's due-timer sweep. Read once at startup:
/// `tokio::select!` re-evaluates its branches every iteration, so an
/// in-loop `sleep()` of this duration would reset on every unrelated event.
pub fn timer_check_ms() -> u64 {
    std::env::var("TELECLAUDE_TIMER_CHECK_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(1000)
}

pub fn checkpoint_interval_secs() -> u64 {
    std::env::var("TELECLAUDE_CHECKPOINT_INTERVAL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(60)
}
