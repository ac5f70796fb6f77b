// SPDX-License-Identifier: Apache-2.0

//! Background checkpointing with durable fsync.
//!
//! The checkpointer runs serialization and fsync off the lifecycle task
//! so a checkpoint never blocks inbound admission. The invariant that
//! matters: the snapshot (and its directory entry) must be durable
//! before the WAL is truncated, or a crash between truncation and
//! snapshot fsync loses events.
//!
//! ```text
//! Lifecycle task                 Background thread
//! ─────────────────              ──────────────────────────
//! clone state
//!   │
//!   └─────────────────────────→  serialize
//!                                write to .tmp
//!                                fsync .tmp
//!                                rename → snapshot
//!                                fsync directory
//!                                  │
//!   ←────────────────────────────┘ (completion signal)
//! truncate WAL (safe now)
//! ```
//!
//! `CheckpointWriter` abstracts the filesystem calls so checkpoint logic
//! (ordering, error propagation) can be exercised with a fake writer.

use crate::{MaterializedState, Snapshot, SnapshotError};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("checkpoint failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct CheckpointResult {
    pub seq: u64,
    pub size_bytes: u64,
}

/// Abstracts checkpoint I/O so fakes can exercise ordering and error
/// injection without touching a real filesystem.
pub trait CheckpointWriter: Send + Sync + 'static {
    fn write_tmp(&self, path: &Path, data: &[u8]) -> Result<(), CheckpointError>;
    fn fsync_file(&self, path: &Path) -> Result<(), CheckpointError>;
    fn rename(&self, from: &Path, to: &Path) -> Result<(), CheckpointError>;
    fn fsync_dir(&self, path: &Path) -> Result<(), CheckpointError>;
    fn file_size(&self, path: &Path) -> Result<u64, CheckpointError>;
}

#[derive(Clone)]
pub struct FsCheckpointWriter;

impl CheckpointWriter for FsCheckpointWriter {
    fn write_tmp(&self, path: &Path, data: &[u8]) -> Result<(), CheckpointError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = File::create(path)?;
        file.write_all(data)?;
        Ok(())
    }

    fn fsync_file(&self, path: &Path) -> Result<(), CheckpointError> {
        File::open(path)?.sync_all()?;
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), CheckpointError> {
        std::fs::rename(from, to)?;
        Ok(())
    }

    fn fsync_dir(&self, path: &Path) -> Result<(), CheckpointError> {
        File::open(path)?.sync_all()?;
        Ok(())
    }

    fn file_size(&self, path: &Path) -> Result<u64, CheckpointError> {
        Ok(std::fs::metadata(path)?.len())
    }
}

/// Handle to a checkpoint running on a background thread. Must be
/// waited on before the caller truncates the WAL.
pub struct CheckpointHandle {
    pub seq: u64,
    receiver: mpsc::Receiver<Result<CheckpointResult, CheckpointError>>,
    #[allow(dead_code)]
    handle: JoinHandle<()>,
}

impl CheckpointHandle {
    pub fn wait(self) -> Result<CheckpointResult, CheckpointError> {
        self.receiver
            .recv()
            .map_err(|_| CheckpointError::Failed("checkpoint thread panicked".into()))?
    }

    pub fn try_wait(&self) -> Option<Result<CheckpointResult, CheckpointError>> {
        self.receiver.try_recv().ok()
    }
}

/// Only one checkpoint runs at a time in practice — the lifecycle task
/// awaits the previous handle before starting a new one.
pub struct Checkpointer<W: CheckpointWriter = FsCheckpointWriter> {
    writer: W,
    snapshot_path: PathBuf,
}

impl Checkpointer<FsCheckpointWriter> {
    pub fn new(snapshot_path: PathBuf) -> Self {
        Self::with_writer(FsCheckpointWriter, snapshot_path)
    }
}

impl<W: CheckpointWriter + Clone> Checkpointer<W> {
    pub fn with_writer(writer: W, snapshot_path: PathBuf) -> Self {
        Self {
            writer,
            snapshot_path,
        }
    }

    /// Clone the state and spawn a thread to serialize and write the
    /// snapshot. The caller must `wait()` the returned handle before
    /// truncating the WAL up to `seq`.
    pub fn start(&self, seq: u64, state: &MaterializedState) -> CheckpointHandle {
        let state_clone = state.clone();
        let writer = self.writer.clone();
        let snapshot_path = self.snapshot_path.clone();

        let (tx, rx) = mpsc::channel();

        let handle = thread::spawn(move || {
            let result = checkpoint_blocking(&writer, seq, &state_clone, &snapshot_path);
            let _ = tx.send(result);
        });

        CheckpointHandle {
            seq,
            receiver: rx,
            handle,
        }
    }

    /// Synchronous checkpoint, used during graceful shutdown where
    /// there's no point backgrounding the work.
    pub fn checkpoint_sync(
        &self,
        seq: u64,
        state: &MaterializedState,
    ) -> Result<CheckpointResult, CheckpointError> {
        checkpoint_blocking(&self.writer, seq, state, &self.snapshot_path)
    }
}

fn checkpoint_blocking<W: CheckpointWriter>(
    writer: &W,
    seq: u64,
    state: &MaterializedState,
    snapshot_path: &Path,
) -> Result<CheckpointResult, CheckpointError> {
    let tmp_path = snapshot_path.with_extension("tmp");

    let snapshot = Snapshot::new(seq, state.clone());
    let json_bytes = serde_json::to_vec(&snapshot)?;

    writer.write_tmp(&tmp_path, &json_bytes)?;
    writer.fsync_file(&tmp_path)?;
    writer.rename(&tmp_path, snapshot_path)?;

    if let Some(parent) = snapshot_path.parent() {
        writer.fsync_dir(parent)?;
    }

    let size_bytes = writer
        .file_size(snapshot_path)
        .unwrap_or(json_bytes.len() as u64);

    Ok(CheckpointResult { seq, size_bytes })
}

/// Load a snapshot previously written by [`Checkpointer`].
pub fn load_snapshot(path: &Path) -> Result<Option<Snapshot>, SnapshotError> {
    Snapshot::load(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct RecordingWriter {
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl CheckpointWriter for RecordingWriter {
        fn write_tmp(&self, path: &Path, data: &[u8]) -> Result<(), CheckpointError> {
            self.calls.lock().push("write_tmp");
            FsCheckpointWriter.write_tmp(path, data)
        }
        fn fsync_file(&self, path: &Path) -> Result<(), CheckpointError> {
            self.calls.lock().push("fsync_file");
            FsCheckpointWriter.fsync_file(path)
        }
        fn rename(&self, from: &Path, to: &Path) -> Result<(), CheckpointError> {
            self.calls.lock().push("rename");
            FsCheckpointWriter.rename(from, to)
        }
        fn fsync_dir(&self, path: &Path) -> Result<(), CheckpointError> {
            self.calls.lock().push("fsync_dir");
            FsCheckpointWriter.fsync_dir(path)
        }
        fn file_size(&self, path: &Path) -> Result<u64, CheckpointError> {
            FsCheckpointWriter.file_size(path)
        }
    }

    #[test]
    fn checkpoint_sync_orders_write_fsync_rename_fsyncdir() {
        let dir = tempfile::tempdir().unwrap();
        let writer = RecordingWriter::default();
        let calls = writer.calls.clone();
        let checkpointer = Checkpointer::with_writer(writer, dir.path().join("snapshot.json"));

        let result = checkpointer
            .checkpoint_sync(7, &MaterializedState::default())
            .unwrap();

        assert_eq!(result.seq, 7);
        assert_eq!(
            calls.lock().as_slice(),
            ["write_tmp", "fsync_file", "rename", "fsync_dir"]
        );
    }

    #[test]
    fn background_checkpoint_is_loadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let checkpointer = Checkpointer::new(path.clone());

        let handle = checkpointer.start(3, &MaterializedState::default());
        let result = handle.wait().unwrap();
        assert_eq!(result.seq, 3);

        let loaded = load_snapshot(&path).unwrap().unwrap();
        assert_eq!(loaded.seq, 3);
    }
}
