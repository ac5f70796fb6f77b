// SPDX-License-Identifier: Apache-2.0

//! Shared test fixture: an `Engine` wired to fakes for every capability,
//! used across this crate's unit tests instead of each module hand-rolling
//! its own wiring.

use crate::engine::Engine;
use std::collections::HashMap;
use std::sync::Arc;
use teleclaude_adapters::{
    ChatAdapter, FakeChatAdapter, FakeSessionAdapter, FakeSummarizer, FakeTranscriptParser, Summarizer, TranscriptParser,
};
use teleclaude_core::clock::FakeClock;
use teleclaude_core::id::SequentialIdGen;
use teleclaude_core::session::{ActiveAgent, AdapterKey};
use teleclaude_storage::{MaterializedState, Wal};

pub type TestEngine = Engine<FakeSessionAdapter, SequentialIdGen, FakeClock>;

fn open_scratch_wal() -> Wal {
    let dir = tempfile::tempdir().expect("tempdir");
    let wal_path = dir.path().join("wal.jsonl");
    // Leak the tempdir so its files outlive this function call; acceptable
    // for short-lived test processes.
    Box::leak(Box::new(dir));
    Wal::open(&wal_path, 0).expect("wal open")
}

pub fn test_engine() -> TestEngine {
    let mut chat_adapters: HashMap<AdapterKey, Arc<dyn ChatAdapter>> = HashMap::new();
    chat_adapters.insert(AdapterKey::Telegram, Arc::new(FakeChatAdapter::new(AdapterKey::Telegram)));
    chat_adapters.insert(AdapterKey::Discord, Arc::new(FakeChatAdapter::new(AdapterKey::Discord)));
    chat_adapters.insert(AdapterKey::Tui, Arc::new(FakeChatAdapter::new(AdapterKey::Tui)));

    let mut transcript_parsers: HashMap<ActiveAgent, Arc<dyn TranscriptParser>> = HashMap::new();
    transcript_parsers.insert(ActiveAgent::Claude, Arc::new(FakeTranscriptParser::new(ActiveAgent::Claude)));

    let summarizer: Option<Arc<dyn Summarizer>> = Some(Arc::new(FakeSummarizer::new()));

    Engine::new(
        Arc::new(parking_lot::Mutex::new(MaterializedState::default())),
        Arc::new(parking_lot::Mutex::new(open_scratch_wal())),
        FakeSessionAdapter::default(),
        chat_adapters,
        transcript_parsers,
        summarizer,
        SequentialIdGen::new("sess"),
        FakeClock::default(),
    )
}

/// Handles to the concrete fakes, for tests that need to inspect recorded
/// calls in addition to driving the engine.
pub struct TestFixture {
    pub engine: TestEngine,
    pub telegram: Arc<FakeChatAdapter>,
    pub discord: Arc<FakeChatAdapter>,
    pub tui: Arc<FakeChatAdapter>,
}

pub fn test_fixture() -> TestFixture {
    let telegram = Arc::new(FakeChatAdapter::new(AdapterKey::Telegram));
    let discord = Arc::new(FakeChatAdapter::new(AdapterKey::Discord));
    let tui = Arc::new(FakeChatAdapter::new(AdapterKey::Tui));

    let mut chat_adapters: HashMap<AdapterKey, Arc<dyn ChatAdapter>> = HashMap::new();
    chat_adapters.insert(AdapterKey::Telegram, telegram.clone());
    chat_adapters.insert(AdapterKey::Discord, discord.clone());
    chat_adapters.insert(AdapterKey::Tui, tui.clone());

    let mut transcript_parsers: HashMap<ActiveAgent, Arc<dyn TranscriptParser>> = HashMap::new();
    transcript_parsers.insert(ActiveAgent::Claude, Arc::new(FakeTranscriptParser::new(ActiveAgent::Claude)));

    let summarizer: Option<Arc<dyn Summarizer>> = Some(Arc::new(FakeSummarizer::new()));

    let engine = Engine::new(
        Arc::new(parking_lot::Mutex::new(MaterializedState::default())),
        Arc::new(parking_lot::Mutex::new(open_scratch_wal())),
        FakeSessionAdapter::default(),
        chat_adapters,
        transcript_parsers,
        summarizer,
        SequentialIdGen::new("sess"),
        FakeClock::default(),
    );

    TestFixture {
        engine,
        telegram,
        discord,
        tui,
    }
}
