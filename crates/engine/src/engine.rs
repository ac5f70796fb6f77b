// SPDX-License-Identifier: Apache-2.0

//! `Engine`: the value that owns every registry. Built once at daemon
//! startup and shared by `Arc` with every worker task; adapters and
//! generators are passed in at construction, with no init-time globals.

use crate::error::EngineError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use teleclaude_adapters::{ChatAdapter, SessionAdapter, Summarizer, TranscriptParser};
use teleclaude_core::event::Event;
use teleclaude_core::id::IdGen;
use teleclaude_core::session::{ActiveAgent, AdapterKey};
use teleclaude_core::Clock;
use teleclaude_storage::{MaterializedState, Wal};

/// Owns the durable state store and every adapter capability the engine
/// dispatches through. Generic over three capability axes: a session
/// (tmux) adapter, an id generator, and a clock.
pub struct Engine<S, G, C>
where
    S: SessionAdapter,
    G: IdGen,
    C: Clock,
{
    pub state: Arc<Mutex<MaterializedState>>,
    pub wal: Arc<Mutex<Wal>>,
    pub sessions: S,
    pub chat_adapters: HashMap<AdapterKey, Arc<dyn ChatAdapter>>,
    pub transcript_parsers: HashMap<ActiveAgent, Arc<dyn TranscriptParser>>,
    /// Best-effort collaborator for turn summarization. `None` means
    /// summarization is skipped entirely rather than failing the stop
    /// handler (same "absent capability" posture as an unregistered
    /// chat adapter, but without the error — summarization is optional).
    pub summarizer: Option<Arc<dyn Summarizer>>,
    pub id_gen: G,
    pub clock: C,
}

impl<S, G, C> Engine<S, G, C>
where
    S: SessionAdapter,
    G: IdGen,
    C: Clock,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: Arc<Mutex<MaterializedState>>,
        wal: Arc<Mutex<Wal>>,
        sessions: S,
        chat_adapters: HashMap<AdapterKey, Arc<dyn ChatAdapter>>,
        transcript_parsers: HashMap<ActiveAgent, Arc<dyn TranscriptParser>>,
        summarizer: Option<Arc<dyn Summarizer>>,
        id_gen: G,
        clock: C,
    ) -> Self {
        Self {
            state,
            wal,
            sessions,
            chat_adapters,
            transcript_parsers,
            summarizer,
            id_gen,
            clock,
        }
    }

    pub(crate) fn lock_state<T>(&self, f: impl FnOnce(&MaterializedState) -> T) -> T {
        let guard = self.state.lock();
        f(&guard)
    }

    pub(crate) fn lock_state_mut<T>(&self, f: impl FnOnce(&mut MaterializedState) -> T) -> T {
        let mut guard = self.state.lock();
        f(&mut guard)
    }

    /// Persist `event` to the WAL, then apply it to the in-memory state.
    /// WAL-first ordering is what makes crash replay reconstruct exactly
    /// what committed (see `teleclaude-storage::wal` module doc). Flushes
    /// synchronously rather than relying on the WAL's group-commit timer,
    /// since callers (command handlers, hook deliveries) need the ack they
    /// return to mean "durable".
    pub(crate) fn apply(&self, event: Event) -> Result<(), EngineError> {
        let mut wal = self.wal.lock();
        let seq = wal.append(&event)?;
        wal.flush()?;
        self.state.lock().apply_event(&event);
        wal.mark_processed(seq);
        Ok(())
    }

    pub(crate) fn chat_adapter(&self, key: &AdapterKey) -> Result<&Arc<dyn ChatAdapter>, EngineError> {
        self.chat_adapters
            .get(key)
            .ok_or_else(|| EngineError::ContractViolation(format!("no chat adapter registered for {key}")))
    }

    pub(crate) fn transcript_parser(&self, agent: ActiveAgent) -> Option<&Arc<dyn TranscriptParser>> {
        self.transcript_parsers.get(&agent)
    }
}
