// SPDX-License-Identifier: Apache-2.0

//! Daemon startup and shutdown.
//!
//! Startup order mirrors crash-safety requirements rather than convenience:
//! the lock file is acquired before anything else is created or truncated,
//! so two daemons racing for the same state directory never corrupt it; the
//! Unix socket is bound last, only once state has been replayed and adapters
//! constructed, so a client that connects successfully always sees a fully
//! initialized daemon.

use crate::env;
use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use teleclaude_adapters::{ChatAdapter, LoopbackChatAdapter, TmuxAdapter};
use teleclaude_core::session::AdapterKey;
use teleclaude_core::{SystemClock, UuidIdGen};
use teleclaude_engine::Engine;
use teleclaude_storage::{load_snapshot, MaterializedState, SnapshotError, Wal, WalError};
use thiserror::Error;
use tokio::net::UnixListener;

pub type AppEngine = Engine<TmuxAdapter, UuidIdGen, SystemClock>;

#[derive(Debug, Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    pub socket_path: PathBuf,
    pub lock_path: PathBuf,
    pub wal_path: PathBuf,
    pub snapshot_path: PathBuf,
    pub log_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        let state_dir = env::state_dir();
        Self {
            socket_path: env::socket_path(),
            lock_path: state_dir.join("daemon.lock"),
            wal_path: state_dir.join("wal.jsonl"),
            snapshot_path: state_dir.join("snapshot.json"),
            log_path: state_dir.join("daemon.log"),
            state_dir,
        }
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to acquire exclusive lock: {0}")]
    LockFailed(#[source] std::io::Error),
    #[error("failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),
    #[error(transparent)]
    Wal(#[from] WalError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub struct DaemonState {
    pub config: Config,
    #[allow(dead_code)]
    lock_file: File,
    pub engine: Arc<AppEngine>,
}

pub struct StartupResult {
    pub daemon: DaemonState,
    pub listener: UnixListener,
}

/// Acquire the exclusive lock first, then build every directory/adapter
/// that startup needs. On any failure after the lock is held, the caller
/// is responsible for removing files this attempt created; a failure to
/// acquire the lock means another daemon owns them and nothing here should
/// be touched.
pub async fn startup() -> Result<StartupResult, LifecycleError> {
    let config = Config::load();
    std::fs::create_dir_all(&config.state_dir)?;

    let lock_file = OpenOptions::new().write(true).create(true).truncate(false).open(&config.lock_path)?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;
    {
        let mut f = &lock_file;
        f.set_len(0)?;
        write!(f, "{}", std::process::id())?;
    }

    let (state, processed_seq) = match load_snapshot(&config.snapshot_path)? {
        Some(snapshot) => (snapshot.state, snapshot.seq),
        None => (MaterializedState::default(), 0),
    };
    let mut state = state;

    let mut wal = Wal::open(&config.wal_path, processed_seq)?;
    for entry in wal.entries_after(processed_seq)? {
        state.apply_event(&entry.event);
    }

    let chat_adapters = build_chat_adapters();
    let engine = Engine::new(
        Arc::new(Mutex::new(state)),
        Arc::new(Mutex::new(wal)),
        TmuxAdapter::new(),
        chat_adapters,
        HashMap::new(),
        None,
        UuidIdGen,
        SystemClock,
    );

    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path).map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;

    Ok(StartupResult {
        daemon: DaemonState { config, lock_file, engine: Arc::new(engine) },
        listener,
    })
}

/// Register the in-process adapters every deployment gets for free: Web,
/// Tui, and Mcp all talk to the daemon directly and need no outbound
/// network transport. Telegram/Discord/WhatsApp are real `ChatAdapter`
/// implementations generic over `HttpTransport`, but this crate wires no
/// concrete network-backed transport for them, so they're never
/// registered here — `fan_out_message`/`ensure_ui_channels` already treat
/// a missing adapter as "not registered for this deployment", so a
/// deployment that wants one of those platforms brings its own transport
/// and registers the adapter before `startup()` is called.
fn build_chat_adapters() -> HashMap<AdapterKey, Arc<dyn ChatAdapter>> {
    let mut adapters: HashMap<AdapterKey, Arc<dyn ChatAdapter>> = HashMap::new();
    adapters.insert(AdapterKey::Web, Arc::new(LoopbackChatAdapter::new(AdapterKey::Web)));
    adapters.insert(AdapterKey::Tui, Arc::new(LoopbackChatAdapter::new(AdapterKey::Tui)));
    adapters.insert(AdapterKey::Mcp, Arc::new(LoopbackChatAdapter::new(AdapterKey::Mcp)));
    adapters
}

impl DaemonState {
    /// Snapshot the already-processed prefix and only then truncate the
    /// WAL: if the process crashes between the two, the snapshot load on
    /// next startup plus whatever WAL tail remains still reconstructs
    /// exactly what committed. Called periodically in the background and
    /// once more, synchronously, during `shutdown`.
    pub fn checkpoint(&self) -> Result<(), LifecycleError> {
        let processed_seq = {
            let mut wal = self.engine.wal.lock();
            wal.flush()?;
            wal.processed_seq()
        };
        if processed_seq == 0 {
            return Ok(());
        }
        let snapshot_state = self.engine.state.lock().clone();
        let snapshot = teleclaude_storage::Snapshot::new(processed_seq, snapshot_state);
        snapshot.save(&self.config.snapshot_path)?;
        self.engine.wal.lock().truncate_before(processed_seq)?;
        Ok(())
    }

    /// Checkpoint one last time, then release the socket and lock files.
    /// Tmux sessions are intentionally left running: they outlive the
    /// daemon so long-running agents keep making progress, and the next
    /// `startup()` reconnects to them through the ordinary session
    /// registry rather than a separate reconciliation pass.
    pub fn shutdown(&self) -> Result<(), LifecycleError> {
        self.checkpoint()?;
        let _ = std::fs::remove_file(&self.config.socket_path);
        let _ = std::fs::remove_file(&self.config.lock_path);
        Ok(())
    }
}
